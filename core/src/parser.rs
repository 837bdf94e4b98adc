//! Fetch response parsing

use chrono::{DateTime, TimeZone, Utc};
use mailparse::{DispositionType, ParsedMail};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::codec::{decode_header, decode_mailbox_name, decode_text, parse_addresses};
use crate::error::{GmailboxError, GmailboxResult};
use crate::message::{Flag, Headers, Message};

static UID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bUID (\d+)").expect("valid regex"));
static FLAGS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bFLAGS \(([^)]*)\)").expect("valid regex"));
static THRID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"X-GM-THRID (\d+)").expect("valid regex"));
static MSGID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"X-GM-MSGID (\d+)").expect("valid regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}\b").expect("valid regex"));

const LABELS_TOKEN: &str = "X-GM-LABELS (";

/// One message from a `UID FETCH` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFetch {
    /// Fetch attribute line, e.g. `* 4 FETCH (UID 12 FLAGS (\Seen) X-GM-THRID 1 ...`
    pub metadata: String,
    /// Full RFC 822 message
    pub rfc822: Vec<u8>,
}

impl RawFetch {
    /// Build from a metadata line and message bytes
    pub fn new(metadata: impl Into<String>, rfc822: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata: metadata.into(),
            rfc822: rfc822.into(),
        }
    }

    /// UID named in the metadata line
    pub fn uid(&self) -> Option<u32> {
        UID_RE
            .captures(&self.metadata)
            .and_then(|caps| caps[1].parse().ok())
    }
}

impl Message {
    /// Populate every content field from a raw fetch.
    ///
    /// On error the message is left exactly as it was.
    pub fn parse(&mut self, raw: &RawFetch) -> GmailboxResult<()> {
        let mail = mailparse::parse_mail(&raw.rfc822)?;
        let mut parsed = Message::new(self.uid, self.mailbox.clone());

        for header in &mail.headers {
            let value = unfold(header.get_value_raw());
            parsed.headers.insert_first(header.get_key(), decode_header(value.trim()));
        }

        let raw_header = |name: &str| {
            mail.headers
                .iter()
                .find(|h| h.get_key().eq_ignore_ascii_case(name))
                .map(|h| unfold(h.get_value_raw()))
        };

        parsed.from = raw_header("From").and_then(|v| parse_addresses(&v).into_iter().next());
        parsed.to = raw_header("To").map(|v| parse_addresses(&v)).unwrap_or_default();
        parsed.cc = raw_header("Cc").map(|v| parse_addresses(&v)).unwrap_or_default();
        parsed.delivered_to = raw_header("Delivered-To")
            .map(|v| parse_addresses(&v))
            .unwrap_or_default();
        parsed.subject = parsed.headers.get("Subject").map(str::to_string);

        let (body, html_body) = extract_bodies(&mail)?;
        parsed.body = body;
        parsed.html_body = html_body;

        let date = parsed
            .headers
            .get("Date")
            .ok_or_else(|| GmailboxError::parse("message has no Date header"))?;
        parsed.sent_at = Some(parse_date(date)?);

        parsed.flags = parse_flags(&raw.metadata);
        parsed.thread_id = capture_u64(&THRID_RE, &raw.metadata);
        parsed.message_id = capture_u64(&MSGID_RE, &raw.metadata);
        parsed.labels = parse_labels(&raw.metadata);

        *self = parsed;
        Ok(())
    }
}

fn unfold(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace("\r\n", "").replace('\n', "")
}

fn extract_bodies(mail: &ParsedMail) -> GmailboxResult<(Option<String>, Option<String>)> {
    let mimetype = mail.ctype.mimetype.to_ascii_lowercase();
    let fallback = mail.ctype.params.get("charset").map(String::as_str);

    if mimetype.starts_with("multipart/") {
        let mut plain = None;
        let mut html = None;
        walk_parts(mail, fallback, &mut plain, &mut html)?;
        Ok((plain, html))
    } else if mimetype == "text/html" {
        Ok((None, Some(decode_part(mail, fallback)?)))
    } else if mimetype.starts_with("text/") {
        Ok((Some(decode_part(mail, fallback)?), None))
    } else {
        Ok((None, None))
    }
}

fn walk_parts(
    part: &ParsedMail,
    fallback: Option<&str>,
    plain: &mut Option<String>,
    html: &mut Option<String>,
) -> GmailboxResult<()> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            walk_parts(sub, fallback, plain, html)?;
        }
        return Ok(());
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return Ok(());
    }

    match part.ctype.mimetype.to_ascii_lowercase().as_str() {
        "text/plain" if plain.is_none() => *plain = Some(strip_delimiter_break(decode_part(part, fallback)?)),
        "text/html" if html.is_none() => *html = Some(strip_delimiter_break(decode_part(part, fallback)?)),
        _ => {}
    }
    Ok(())
}

/// Part charset, else the message charset, else us-ascii
fn decode_part(part: &ParsedMail, fallback: Option<&str>) -> GmailboxResult<String> {
    let charset = part
        .ctype
        .params
        .get("charset")
        .map(String::as_str)
        .or(fallback)
        .unwrap_or("us-ascii");
    let bytes = part.get_body_raw()?;
    Ok(decode_text(&bytes, charset))
}

/// The line break before a multipart boundary belongs to the delimiter
fn strip_delimiter_break(mut text: String) -> String {
    if text.ends_with("\r\n") {
        text.truncate(text.len() - 2);
    } else if text.ends_with('\n') {
        text.truncate(text.len() - 1);
    }
    text
}

/// Strict RFC 2822 first, then the lenient mailparse reader.
///
/// The lenient reader yields 0 for text it cannot make sense of, so its
/// result only counts when the value carries a four digit year.
fn parse_date(value: &str) -> GmailboxResult<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Ok(date.with_timezone(&Utc));
    }

    mailparse::dateparse(value)
        .ok()
        .filter(|ts| *ts > 0 && YEAR_RE.is_match(value))
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .ok_or_else(|| GmailboxError::parse(format!("unparseable Date header: {}", value)))
}

fn parse_flags(metadata: &str) -> HashSet<Flag> {
    FLAGS_RE
        .captures(metadata)
        .map(|caps| caps[1].split_whitespace().map(Flag::from_token).collect())
        .unwrap_or_default()
}

fn capture_u64(re: &Regex, metadata: &str) -> Option<u64> {
    re.captures(metadata).and_then(|caps| caps[1].parse().ok())
}

/// Parse the parenthesised `X-GM-LABELS` list.
///
/// Tokens are either quoted strings with `\\` and `\"` escapes or bare atoms.
fn parse_labels(metadata: &str) -> HashSet<String> {
    let start = match metadata.find(LABELS_TOKEN) {
        Some(idx) => idx + LABELS_TOKEN.len(),
        None => return HashSet::new(),
    };

    let mut labels = HashSet::new();
    let mut chars = metadata[start..].chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ')' => break,
            ' ' => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut token = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                token.push(escaped);
                            }
                        }
                        '"' => break,
                        other => token.push(other),
                    }
                }
                labels.insert(decode_mailbox_name(&token));
            }
            _ => {
                let mut token = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ' ' || c == ')' {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
                labels.insert(decode_mailbox_name(&token));
            }
        }
    }

    labels
}

//! Header, address and mailbox name encoding

use mailparse::{MailAddr, SingleInfo};
use std::fmt;

/// Characters that force a display name to be quoted
const NAME_SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

/// Charsets used for outgoing text parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// 7-bit text
    UsAscii,
    /// Anything else
    Utf8,
}

impl Charset {
    /// MIME label for the charset
    pub fn as_str(&self) -> &'static str {
        match self {
            Charset::UsAscii => "us-ascii",
            Charset::Utf8 => "utf-8",
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the narrowest charset able to carry `text`
pub fn guess_charset(text: &str) -> Charset {
    if text.is_ascii() {
        Charset::UsAscii
    } else {
        Charset::Utf8
    }
}

/// Decode RFC 2047 encoded words in a header value.
///
/// Values that already contain non-ASCII text are returned as they are.
/// Encoded words that cannot be decoded stay in their raw form.
pub fn decode_header(raw: &str) -> String {
    if !raw.is_ascii() || !raw.contains("=?") {
        return raw.to_string();
    }

    let line = format!("X: {}", raw);
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => raw.to_string(),
    }
}

/// Parse an address list header into `Name <addr>` strings.
///
/// Entries that do not parse are dropped.
pub fn parse_addresses(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    if let Some(list) = parse_address_list(raw) {
        return list;
    }

    split_top_level(raw, ',')
        .into_iter()
        .filter_map(|entry| parse_address_list(entry.trim()))
        .flatten()
        .collect()
}

fn parse_address_list(raw: &str) -> Option<Vec<String>> {
    if raw.is_empty() {
        return None;
    }

    let list = if raw.is_ascii() {
        let line = format!("To: {}", raw);
        let (header, _) = mailparse::parse_header(line.as_bytes()).ok()?;
        mailparse::addrparse_header(&header).ok()?
    } else {
        mailparse::addrparse(raw).ok()?
    };

    let mut out = Vec::new();
    for addr in list.iter() {
        match addr {
            MailAddr::Single(info) => out.extend(format_single(info)),
            MailAddr::Group(group) => out.extend(group.addrs.iter().filter_map(format_single)),
        }
    }
    Some(out)
}

fn format_single(info: &SingleInfo) -> Option<String> {
    let addr = info.addr.trim();
    if addr.is_empty() || !addr.contains('@') {
        return None;
    }

    match info.display_name.as_deref().map(decode_header) {
        Some(name) if !name.trim().is_empty() => Some(format_address(name.trim(), addr)),
        _ => Some(addr.to_string()),
    }
}

/// Render a display name and address as `Name <addr>`
pub fn format_address(name: &str, addr: &str) -> String {
    if name.contains(NAME_SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\" <{}>", escaped, addr)
    } else {
        format!("{} <{}>", name, addr)
    }
}

/// Bare address part of a `Name <addr>` string
pub fn address_of(formatted: &str) -> &str {
    match (formatted.rfind('<'), formatted.rfind('>')) {
        (Some(start), Some(end)) if start < end => formatted[start + 1..end].trim(),
        _ => formatted.trim(),
    }
}

/// Split on `separator` outside of quoted strings, comments and angle brackets
pub fn split_top_level(raw: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut depth = 0usize;

    for (idx, ch) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' | '(' if !in_quotes => depth += 1,
            '>' | ')' if !in_quotes => depth = depth.saturating_sub(1),
            c if c == separator && !in_quotes && depth == 0 => {
                parts.push(&raw[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Encode a display mailbox name into modified UTF-7 for the wire
pub fn encode_mailbox_name(name: &str) -> String {
    utf7_imap::encode_utf7_imap(name.to_string())
}

/// Decode a modified UTF-7 mailbox name from the wire
pub fn decode_mailbox_name(name: &str) -> String {
    utf7_imap::decode_utf7_imap(name.to_string())
}

/// Decode body bytes declared with `charset`.
///
/// Unknown labels fall back to lossy UTF-8.
pub fn decode_text(bytes: &[u8], charset: &str) -> String {
    match encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
        Some(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Quote a string for use as an IMAP quoted string
pub fn quote_imap_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

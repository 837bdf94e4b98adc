//! Replies and forwards built from a received message

use tracing::warn;

use crate::codec::address_of;
use crate::draft::{Attachment, Draft};
use crate::error::{GmailboxError, GmailboxResult};
use crate::message::Message;

const QUOTE_STYLE: &str = "margin:0 0 0 .8ex;border-left:1px #ccc solid;padding-left:1ex";
const FORWARD_MARKER: &str = "---------- Forwarded message ----------";

/// Options for [`Message::reply`], [`Message::reply_all`] and [`Message::forward`]
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Plain text written above the quote
    pub plain: Option<String>,
    /// HTML written above the quote
    pub html: Option<String>,
    /// Overrides the default recipients
    pub recipients: Vec<String>,
    /// Overrides the prefixed subject
    pub subject: Option<String>,
    /// `From` override
    pub sender: Option<String>,
    /// Overrides the computed `Cc` of a reply-all
    pub cc: Vec<String>,
    /// Blind copy recipients
    pub bcc: Vec<String>,
    pub attachments: Vec<Attachment>,
    /// Extra headers, added verbatim
    pub headers: Vec<(String, String)>,
    /// Quote the original below each supplied part
    pub append: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            plain: None,
            html: None,
            recipients: Vec::new(),
            subject: None,
            sender: None,
            cc: Vec::new(),
            bcc: Vec::new(),
            attachments: Vec::new(),
            headers: Vec::new(),
            append: true,
        }
    }
}

impl ComposeOptions {
    /// Defaults with quoting on
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the plain text reply
    pub fn plain(mut self, text: impl Into<String>) -> Self {
        self.plain = Some(text.into());
        self
    }

    /// Set the HTML reply
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Add a recipient, replacing the defaults
    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Use this subject as is
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Send as someone other than the session user
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Add a `Cc` recipient
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Add a blind copy recipient
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Attach a file
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Extra header added verbatim
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Turn quoting of the original on or off
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }
}

impl Message {
    /// Reply to the sender
    pub fn reply(&self, options: ComposeOptions) -> GmailboxResult<Draft> {
        let to = self.reply_recipients(&options)?;
        let mut draft = self.draft_from(options, "RE", to)?;
        self.chain_references(&mut draft);
        Ok(draft)
    }

    /// Reply to the sender, copying every other original recipient
    pub fn reply_all(&self, options: ComposeOptions) -> GmailboxResult<Draft> {
        let to = self.reply_recipients(&options)?;
        let cc = if options.cc.is_empty() {
            let excluded: Vec<&str> = to
                .iter()
                .chain(options.sender.iter())
                .map(|addr| address_of(addr))
                .collect();
            let mut cc: Vec<String> = Vec::new();
            for addr in self.to.iter().chain(&self.cc) {
                let bare = address_of(addr);
                let seen = excluded
                    .iter()
                    .copied()
                    .chain(cc.iter().map(|c| address_of(c)))
                    .any(|other| other.eq_ignore_ascii_case(bare));
                if !seen {
                    cc.push(addr.clone());
                }
            }
            cc
        } else {
            options.cc.clone()
        };

        let mut draft = self.draft_from(options, "RE", to)?;
        draft.cc = cc;
        self.chain_references(&mut draft);
        Ok(draft)
    }

    /// Forward to new recipients
    pub fn forward<I, S>(&self, recipients: I, options: ComposeOptions) -> GmailboxResult<Draft>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut to: Vec<String> = recipients.into_iter().map(Into::into).collect();
        to.extend(options.recipients.iter().cloned());
        if to.is_empty() {
            return Err(GmailboxError::precondition("forward needs at least one recipient"));
        }
        let mut draft = self.draft_from(options, "FW", to)?;
        self.chain_references(&mut draft);
        Ok(draft)
    }

    fn reply_recipients(&self, options: &ComposeOptions) -> GmailboxResult<Vec<String>> {
        if !options.recipients.is_empty() {
            return Ok(options.recipients.clone());
        }
        self.from
            .clone()
            .map(|from| vec![from])
            .ok_or_else(|| GmailboxError::precondition("message has no sender to reply to"))
    }

    fn draft_from(&self, options: ComposeOptions, prefix: &str, to: Vec<String>) -> GmailboxResult<Draft> {
        if options.append && !self.is_fetched() {
            return Err(GmailboxError::precondition(format!(
                "message {} in {} must be fetched before quoting",
                self.uid, self.mailbox
            )));
        }

        // The quote only goes into the parts the caller wrote
        let forward = prefix == "FW";
        let (plain, html) = if options.append {
            (
                options.plain.map(|text| join_parts(text, self.quoted_plain(forward))),
                options.html.map(|html| join_parts(html, self.quoted_html(forward))),
            )
        } else {
            (options.plain, options.html)
        };

        let subject = options
            .subject
            .unwrap_or_else(|| prefixed_subject(prefix, self.subject.as_deref().unwrap_or_default()));

        Ok(Draft {
            sender: options.sender,
            to,
            cc: options.cc,
            bcc: options.bcc,
            subject,
            plain,
            html,
            attachments: options.attachments,
            headers: options.headers,
            in_reply_to: None,
            references: None,
        })
    }

    fn chain_references(&self, draft: &mut Draft) {
        match self.headers.get("Message-ID") {
            Some(id) => {
                draft.in_reply_to = Some(id.to_string());
                draft.references = Some(match self.headers.get("References") {
                    Some(references) => format!("{} {}", references, id),
                    None => id.to_string(),
                });
            }
            None => warn!("Message {} in {} has no Message-ID to reply to", self.uid, self.mailbox),
        }
    }

    fn sent_at_display(&self) -> String {
        self.sent_at
            .map(|date| date.format("%a, %b %d, %Y at %I:%M %p").to_string())
            .unwrap_or_default()
    }

    fn quoted_plain(&self, forward: bool) -> Option<String> {
        let body = self.body.as_deref()?;
        if forward {
            return Some(format!("{}\n{}", self.forward_block().join("\n"), body));
        }

        let quoted: Vec<String> = body.lines().map(|line| format!("> {}", line)).collect();
        Some(format!("{}\n{}", self.quote_header(), quoted.join("\n")))
    }

    fn quoted_html(&self, forward: bool) -> Option<String> {
        let original = match (&self.html_body, &self.body) {
            (Some(html), _) => html.clone(),
            (None, Some(plain)) => escape_html(plain).lines().collect::<Vec<_>>().join("<br>\n"),
            (None, None) => return None,
        };

        let quote = if forward {
            let block: Vec<String> = self.forward_block().iter().map(|line| escape_html(line)).collect();
            format!("<div class=\"gmail_quote\">{}<br>\n{}</div>", block.join("<br>\n"), original)
        } else {
            format!(
                "<div class=\"gmail_quote\">{}<br>\n<blockquote style=\"{}\">{}</blockquote></div>",
                escape_html(&self.quote_header()),
                QUOTE_STYLE,
                original
            )
        };
        Some(quote)
    }

    fn quote_header(&self) -> String {
        format!(
            "On {}, {} wrote:",
            self.sent_at_display(),
            self.from.as_deref().unwrap_or("unknown sender")
        )
    }

    fn forward_block(&self) -> Vec<String> {
        vec![
            FORWARD_MARKER.to_string(),
            format!("From: {}", self.from.as_deref().unwrap_or_default()),
            format!("Date: {}", self.sent_at_display()),
            format!("Subject: {}", self.subject.as_deref().unwrap_or_default()),
            format!("To: {}", self.to.join(", ")),
            String::new(),
        ]
    }
}

/// `RE: subject` unless the subject already starts with that prefix
fn prefixed_subject(prefix: &str, subject: &str) -> String {
    let lower = subject.trim_start().to_ascii_lowercase();
    let already = match prefix {
        "FW" => lower.starts_with("fw:") || lower.starts_with("fwd:"),
        _ => lower.starts_with(&format!("{}:", prefix.to_ascii_lowercase())),
    };
    if already {
        subject.to_string()
    } else {
        format!("{}: {}", prefix, subject)
    }
}

fn join_parts(text: String, quote: Option<String>) -> String {
    match quote {
        Some(quote) => format!("{}\n\n{}", text, quote),
        None => text,
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RawFetch;

    const ORIGINAL: &str = "From: Alice <alice@example.com>\r\n\
        To: Me <me@gmail.com>, Bob <bob@example.com>\r\n\
        Cc: Carol <carol@example.com>, alice@example.com\r\n\
        Subject: Plans\r\n\
        Date: Fri, 1 Mar 2024 10:00:00 +0000\r\n\
        Message-ID: <plans@example.com>\r\n\
        References: <earlier@example.com>\r\n\
        Content-Type: multipart/alternative; boundary=\"b\"\r\n\
        \r\n\
        --b\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        Lunch?\r\n\
        Tomorrow at noon.\r\n\
        --b\r\n\
        Content-Type: text/html; charset=utf-8\r\n\
        \r\n\
        <p>Lunch?</p>\r\n\
        --b--\r\n";

    fn original() -> Message {
        let mut message = Message::new(1, "INBOX");
        message
            .parse(&RawFetch::new("* 1 FETCH (UID 1 FLAGS (\\Seen))", ORIGINAL.as_bytes()))
            .unwrap();
        message
    }

    #[test]
    fn test_subject_prefix_not_doubled() {
        assert_eq!(prefixed_subject("RE", "Plans"), "RE: Plans");
        assert_eq!(prefixed_subject("RE", "Re: Plans"), "Re: Plans");
        assert_eq!(prefixed_subject("RE", "RE: Plans"), "RE: Plans");
        assert_eq!(prefixed_subject("FW", "Fwd: Plans"), "Fwd: Plans");
        assert_eq!(prefixed_subject("FW", "Plans"), "FW: Plans");

        let mut message = original();
        message.subject = Some("re: Plans".to_string());
        let draft = message.reply(ComposeOptions::new().plain("Sure")).unwrap();
        assert_eq!(draft.subject, "re: Plans");
    }

    #[test]
    fn test_reply_quotes_original() {
        let draft = original()
            .reply(ComposeOptions::new().plain("Sure").html("<p>Sure</p>"))
            .unwrap();

        assert_eq!(draft.subject, "RE: Plans");
        assert_eq!(draft.to, vec!["Alice <alice@example.com>"]);
        assert!(draft.cc.is_empty());

        let plain = draft.plain.unwrap();
        assert!(plain.starts_with("Sure\n\n"));
        assert!(plain.contains("On Fri, Mar 01, 2024 at 10:00 AM, Alice <alice@example.com> wrote:"));
        assert!(plain.contains("> Lunch?\n> Tomorrow at noon."));

        let html = draft.html.unwrap();
        assert!(html.starts_with("<p>Sure</p>\n\n<div class=\"gmail_quote\">"));
        assert!(html.contains("<blockquote style=\"margin:0 0 0 .8ex;border-left:1px #ccc solid;padding-left:1ex\"><p>Lunch?</p>"));
        assert!(html.contains("Alice &lt;alice@example.com&gt; wrote:"));

        assert_eq!(draft.in_reply_to.as_deref(), Some("<plans@example.com>"));
        assert_eq!(
            draft.references.as_deref(),
            Some("<earlier@example.com> <plans@example.com>")
        );
    }

    #[test]
    fn test_quote_only_into_supplied_parts() {
        let draft = original().reply(ComposeOptions::new().plain("Sure")).unwrap();
        assert!(draft.plain.unwrap().contains("> Lunch?"));
        assert!(draft.html.is_none());

        let draft = original().reply(ComposeOptions::new().html("<p>Sure</p>")).unwrap();
        assert!(draft.plain.is_none());
        let html = draft.html.unwrap();
        assert!(html.starts_with("<p>Sure</p>"));
        assert!(html.contains("<blockquote"));

        let mut plain_only = original();
        plain_only.html_body = None;
        let draft = plain_only.forward(["dave@example.com"], ComposeOptions::new().html("<p>FYI</p>")).unwrap();
        let html = draft.html.unwrap();
        assert!(html.starts_with("<p>FYI</p>\n\n<div class=\"gmail_quote\">"));
        assert!(html.contains("Lunch?<br>\n"));
    }

    #[test]
    fn test_reply_all_copies_everyone_but_sender() {
        let draft = original()
            .reply_all(ComposeOptions::new().plain("Sure").sender("me@gmail.com"))
            .unwrap();

        assert_eq!(draft.to, vec!["Alice <alice@example.com>"]);
        assert_eq!(draft.cc, vec!["Bob <bob@example.com>", "Carol <carol@example.com>"]);
    }

    #[test]
    fn test_reply_without_append() {
        let draft = original()
            .reply(ComposeOptions::new().plain("Sure").append(false).recipient("bob@example.com"))
            .unwrap();

        assert_eq!(draft.plain.as_deref(), Some("Sure"));
        assert!(draft.html.is_none());
        assert_eq!(draft.to, vec!["bob@example.com"]);

        let unfetched = Message::new(2, "INBOX");
        let draft = unfetched.reply(ComposeOptions::new().plain("hi").append(false).recipient("bob@example.com"));
        assert!(draft.is_ok());
    }

    #[test]
    fn test_quoting_requires_fetched_message() {
        let mut unfetched = Message::new(2, "INBOX");
        unfetched.from = Some("alice@example.com".to_string());
        let result = unfetched.reply(ComposeOptions::new().plain("hi"));
        assert!(matches!(result, Err(GmailboxError::Precondition(_))));
    }

    #[test]
    fn test_forward() {
        let draft = original()
            .forward(["dave@example.com"], ComposeOptions::new().plain("FYI"))
            .unwrap();

        assert_eq!(draft.subject, "FW: Plans");
        assert_eq!(draft.to, vec!["dave@example.com"]);
        assert_eq!(draft.in_reply_to.as_deref(), Some("<plans@example.com>"));
        assert_eq!(
            draft.references.as_deref(),
            Some("<earlier@example.com> <plans@example.com>")
        );
        assert!(draft.html.is_none());

        let plain = draft.plain.unwrap();
        assert!(plain.starts_with("FYI\n\n---------- Forwarded message ----------\n"));
        assert!(plain.contains("From: Alice <alice@example.com>\n"));
        assert!(plain.contains("Subject: Plans\n"));
        assert!(plain.contains("Lunch?"));
        assert!(!plain.contains("> Lunch?"));

        let empty: [&str; 0] = [];
        let result = original().forward(empty, ComposeOptions::new());
        assert!(matches!(result, Err(GmailboxError::Precondition(_))));
    }

    #[test]
    fn test_reply_builds_into_message() {
        let draft = original().reply(ComposeOptions::new().plain("Sure")).unwrap();
        let out = draft.build("me@gmail.com", "gmail.com").unwrap();
        assert_eq!(out.recipients, vec!["alice@example.com"]);
    }
}

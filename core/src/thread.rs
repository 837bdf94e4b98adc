//! Thread assembly across the owning and sent mailboxes

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{GmailboxError, GmailboxResult};
use crate::mailbox::SpecialUse;
use crate::message::Message;
use crate::search::SearchQuery;
use crate::session::Session;

impl Message {
    /// Every message sharing this message's `X-GM-THRID`, oldest first.
    ///
    /// Searches the owning mailbox and then the sent mailbox. The mailbox
    /// selected before the call, or the owning mailbox when nothing was
    /// selected, is selected again afterwards, also on error.
    pub async fn fetch_thread(&mut self, session: &mut Session) -> GmailboxResult<Vec<Message>> {
        let original = session
            .current_mailbox()
            .map(str::to_string)
            .unwrap_or_else(|| self.mailbox.clone());
        let result = self.collect_thread(session).await;

        if let Err(e) = session.use_mailbox(&original).await {
            warn!("Could not reselect {} after thread fetch: {}", original, e);
            if result.is_ok() {
                return Err(e);
            }
        }
        result
    }

    async fn collect_thread(&mut self, session: &mut Session) -> GmailboxResult<Vec<Message>> {
        self.fetch(session).await?;
        let thread_id = self.thread_id.ok_or_else(|| {
            GmailboxError::precondition(format!(
                "message {} in {} has no thread id",
                self.uid, self.mailbox
            ))
        })?;

        let mut mailboxes = vec![self.mailbox.clone()];
        match session.special_name(SpecialUse::Sent) {
            Some(sent) if sent != self.mailbox => mailboxes.push(sent.to_string()),
            Some(_) => {}
            None => warn!("No sent mailbox, thread {} limited to {}", thread_id, self.mailbox),
        }

        let query = SearchQuery::new().thread_id(thread_id).prefetch();
        let mut thread: IndexMap<(String, u32), Message> = IndexMap::new();
        for mailbox in &mailboxes {
            let found = session.find(Some(mailbox.as_str()), &query).await?;
            debug!("Thread {} has {} messages in {}", thread_id, found.len(), mailbox);
            for message in found {
                thread
                    .entry((message.mailbox.clone(), message.uid))
                    .or_insert(message);
            }
        }
        thread
            .entry((self.mailbox.clone(), self.uid))
            .or_insert_with(|| self.clone());

        let mut messages: Vec<Message> = thread.into_values().collect();
        messages.sort_by_key(|message| message.sent_at);

        info!("Assembled thread {} with {} messages", thread_id, messages.len());
        Ok(messages)
    }
}

//! Deletion tracking.
//!
//! When a sender deletes a message for everyone, the transport emits
//! [`TransportEvent::MessagesDeleted`]. If the message is still in the
//! [`MessageCache`] under the same chat, its cached context is reported to
//! the operator. The entry is dropped only once the report went out, so a
//! failed report can be retried by a redelivered event while a successful
//! one is never repeated.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use wabot_core::{Bot, BoxedBot, MessageContext, MessageKey, Payload, SendOptions, TransportEvent};

use crate::cache::MessageCache;
use crate::plugin::EventHandler;

/// Reports deleted messages to the operator.
pub struct DeletionReporter {
    cache: Arc<MessageCache>,
    operator: String,
    /// Keys with a report in flight; handler calls may overlap.
    reporting: Mutex<HashSet<(String, String)>>,
}

impl DeletionReporter {
    /// Creates a reporter sending to the `operator` chat id.
    pub fn new(cache: Arc<MessageCache>, operator: impl Into<String>) -> Self {
        Self {
            cache,
            operator: operator.into(),
            reporting: Mutex::new(HashSet::new()),
        }
    }

    /// Handles a batch of deleted keys and returns how many were reported.
    pub async fn handle_deleted(&self, bot: &dyn Bot, keys: &[MessageKey]) -> usize {
        let mut reported = 0;

        for key in keys {
            if key.from_me {
                continue;
            }
            let Some(ctx) = self.cache.get(&key.remote_jid, &key.id) else {
                debug!(id = %key.id, chat = %key.remote_jid, "Deleted message not in cache");
                continue;
            };
            let claim = (key.remote_jid.clone(), key.id.clone());
            if !self.reporting.lock().insert(claim.clone()) {
                debug!(id = %key.id, "Deletion already being reported");
                continue;
            }

            let report = format_report(&ctx);
            match bot
                .send(&self.operator, Payload::text(report), SendOptions::default())
                .await
            {
                Ok(_) => {
                    self.cache.remove(&key.remote_jid, &key.id);
                    info!(id = %key.id, chat = %ctx.chat_id, sender = %ctx.sender, "Reported deleted message");
                    reported += 1;
                }
                Err(e) => {
                    warn!(id = %key.id, error = %e, "Failed to report deleted message, keeping it cached");
                }
            }
            self.reporting.lock().remove(&claim);
        }

        reported
    }
}

#[async_trait]
impl EventHandler for DeletionReporter {
    async fn on_event(&self, bot: &BoxedBot, event: &TransportEvent) {
        if let TransportEvent::MessagesDeleted(keys) = event {
            self.handle_deleted(bot.as_ref(), keys).await;
        }
    }
}

fn format_report(ctx: &MessageContext) -> String {
    let text = if ctx.text.is_empty() {
        "(no text)"
    } else {
        ctx.text.as_str()
    };
    format!(
        "🗑️ *Deleted message detected*\n\n\
         👤 *From:* {} ({})\n\
         💬 *Chat:* {}\n\
         📎 *Type:* {}\n\n\
         {}",
        ctx.sender_name,
        ctx.sender_number(),
        ctx.chat_id,
        ctx.kind,
        text
    )
}

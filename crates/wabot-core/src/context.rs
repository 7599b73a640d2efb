//! The normalized per-message context.
//!
//! A [`MessageContext`] is built once per inbound message by the normalizer
//! and shared as `Arc<MessageContext>` with the cache, the command dispatcher
//! and the reply-handler chain. It is never mutated after construction; the
//! only deferred part, the group facts, is computed on first access and then
//! cached for the lifetime of the value.

use tokio::sync::OnceCell;
use tracing::warn;

use crate::bot::{Bot, Participant};
use crate::jid;
use crate::message::{ContentKind, MessageKey};

/// Command-shape facts of a prefixed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandShape {
    /// Lower-cased first token after the prefix.
    pub name: String,
    /// Remaining whitespace-delimited tokens.
    pub args: Vec<String>,
    /// Arguments joined with single spaces.
    pub query: String,
}

/// Facts derived from group metadata.
///
/// All fields are empty/false for direct chats and when the metadata fetch
/// fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFacts {
    /// Group subject.
    pub name: String,
    /// Current participants.
    pub participants: Vec<Participant>,
    /// Normalized ids of all admins.
    pub admins: Vec<String>,
    /// Whether the sender holds an admin role.
    pub is_sender_admin: bool,
    /// Whether the bot holds an admin role.
    pub is_bot_admin: bool,
}

/// Normalized view of one inbound message.
#[derive(Debug, Clone)]
pub struct MessageContext {
    /// Key of the original message (used for quoting and reactions).
    pub key: MessageKey,
    /// Chat the message arrived in.
    pub chat_id: String,
    /// Resolved author.
    pub sender: String,
    /// Display name of the author.
    pub sender_name: String,
    /// Whether the chat is a group.
    pub is_group: bool,
    /// Whether the bot authored the message.
    pub is_from_self: bool,
    /// Whether the author is the bot itself or a configured owner.
    pub is_owner: bool,
    /// Content kind tag.
    pub kind: ContentKind,
    /// Extracted text or caption; never absent.
    pub text: String,
    /// Id of the quoted message, if this is a reply.
    pub quoted_id: Option<String>,
    /// Author of the quoted message.
    pub quoted_sender: Option<String>,
    /// Users mentioned in the message.
    pub mentioned: Vec<String>,
    /// Command-shape facts, present when the text starts with the prefix.
    pub command: Option<CommandShape>,
    group: OnceCell<GroupFacts>,
}

impl MessageContext {
    /// Creates a context for a message in `key.remote_jid` authored by `sender`.
    ///
    /// Every other field starts empty; the normalizer fills them in.
    pub fn new(key: MessageKey, sender: impl Into<String>) -> Self {
        let chat_id = key.remote_jid.clone();
        Self {
            is_group: jid::is_group(&chat_id),
            is_from_self: key.from_me,
            chat_id,
            key,
            sender: sender.into(),
            sender_name: String::new(),
            is_owner: false,
            kind: ContentKind::Unknown,
            text: String::new(),
            quoted_id: None,
            quoted_sender: None,
            mentioned: Vec::new(),
            command: None,
            group: OnceCell::new(),
        }
    }

    /// Returns the message id.
    pub fn id(&self) -> &str {
        &self.key.id
    }

    /// Returns the user part of the sender id (the phone number).
    pub fn sender_number(&self) -> &str {
        jid::user_part(&self.sender)
    }

    /// Returns `true` if the text has command shape.
    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }

    /// Returns the group facts, fetching group metadata on first access.
    ///
    /// Direct chats resolve to empty facts without calling the transport.
    /// A failed fetch is logged and also resolves to empty facts; the failure
    /// is cached like a success so it is not retried for this message.
    pub async fn group_facts(&self, bot: &dyn Bot) -> &GroupFacts {
        self.group
            .get_or_init(|| async {
                if !self.is_group {
                    return GroupFacts::default();
                }
                match bot.fetch_group_metadata(&self.chat_id).await {
                    Ok(meta) => {
                        let admins = meta.admins();
                        let sender = jid::normalize_user(&self.sender);
                        let bot_id = bot.normalized_id();
                        GroupFacts {
                            is_sender_admin: admins.contains(&sender),
                            is_bot_admin: admins.contains(&bot_id),
                            name: meta.subject,
                            participants: meta.participants,
                            admins,
                        }
                    }
                    Err(e) => {
                        warn!(chat = %self.chat_id, error = %e, "Failed to fetch group metadata");
                        GroupFacts::default()
                    }
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::GroupMetadata;
    use crate::testing::RecordingBot;

    fn group_meta() -> GroupMetadata {
        GroupMetadata {
            id: "1-2@g.us".into(),
            subject: "Dev Team".into(),
            participants: vec![
                Participant::admin("111@s.whatsapp.net"),
                Participant::admin("999@s.whatsapp.net"),
                Participant::member("222@s.whatsapp.net"),
            ],
        }
    }

    #[tokio::test]
    async fn test_group_facts_fetched_once() {
        let bot = RecordingBot::new("999:7@s.whatsapp.net").with_group(group_meta());
        let key = MessageKey::new("1-2@g.us", "M1").with_participant("111@s.whatsapp.net");
        let ctx = MessageContext::new(key, "111@s.whatsapp.net");

        let facts = ctx.group_facts(&bot).await;
        assert_eq!(facts.name, "Dev Team");
        assert!(facts.is_sender_admin);
        assert!(facts.is_bot_admin);

        ctx.group_facts(&bot).await;
        assert_eq!(bot.metadata_fetches(), 1);
    }

    #[tokio::test]
    async fn test_group_facts_degrade_on_failure() {
        let bot = RecordingBot::new("999@s.whatsapp.net");
        let key = MessageKey::new("1-2@g.us", "M1").with_participant("111@s.whatsapp.net");
        let ctx = MessageContext::new(key, "111@s.whatsapp.net");

        let facts = ctx.group_facts(&bot).await;
        assert_eq!(facts, &GroupFacts::default());
    }

    #[tokio::test]
    async fn test_direct_chat_skips_fetch() {
        let bot = RecordingBot::new("999@s.whatsapp.net").with_group(group_meta());
        let key = MessageKey::new("111@s.whatsapp.net", "M1");
        let ctx = MessageContext::new(key, "111@s.whatsapp.net");

        assert!(!ctx.group_facts(&bot).await.is_bot_admin);
        assert_eq!(bot.metadata_fetches(), 0);
    }
}

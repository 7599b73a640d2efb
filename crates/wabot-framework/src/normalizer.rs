//! Message normalizer.
//!
//! Turns one [`RawMessage`] into a [`MessageContext`]:
//!
//! 1. Events without content and events in the status broadcast channel are
//!    discarded.
//! 2. Ephemeral envelopes are unwrapped before the kind and text are read.
//! 3. The sender is the bot itself for self-authored messages, otherwise the
//!    group participant, otherwise the chat id.
//! 4. Text starting with the prefix gets command-shape facts.
//!
//! Group facts are not resolved here; [`MessageContext::group_facts`] fetches
//! them lazily.
//!
//! Participant-change stubs are acknowledged separately by
//! [`acknowledge_stubs`], for every event of a batch.

use std::collections::HashSet;

use tracing::{trace, warn};
use wabot_core::{Bot, CommandShape, MessageContext, RawMessage, jid};

/// Display name used when the sender did not publish one.
pub const DEFAULT_SENDER_NAME: &str = "Unknown";

/// Builds contexts from raw messages.
#[derive(Debug, Clone)]
pub struct Normalizer {
    prefix: String,
    /// Phone numbers (user parts) granted owner rights.
    owners: HashSet<String>,
}

impl Normalizer {
    /// Creates a normalizer for the given command prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            owners: HashSet::new(),
        }
    }

    /// Grants owner rights to the given numbers or user ids.
    pub fn with_owners<I, S>(mut self, owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.owners
            .extend(owners.into_iter().map(|o| jid::user_part(o.as_ref()).to_string()));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Normalizes one raw message, or returns `None` if it must be discarded.
    pub fn normalize(&self, raw: &RawMessage, bot_id: &str) -> Option<MessageContext> {
        let content = raw.content.as_ref()?;
        if jid::is_status_broadcast(&raw.key.remote_jid) {
            trace!(id = %raw.key.id, "Discarding status broadcast");
            return None;
        }

        let sender = if raw.key.from_me {
            jid::normalize_user(bot_id)
        } else {
            raw.key
                .participant
                .clone()
                .unwrap_or_else(|| raw.key.remote_jid.clone())
        };

        let mut ctx = MessageContext::new(raw.key.clone(), sender);
        let content = content.unwrap_ephemeral();

        ctx.kind = content.kind();
        ctx.text = content.text_body();
        ctx.sender_name = raw
            .push_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SENDER_NAME.to_string());

        let number = jid::user_part(&ctx.sender);
        ctx.is_owner = ctx.is_from_self
            || number == jid::user_part(bot_id)
            || self.owners.contains(number);

        if let Some(info) = content.context_info() {
            ctx.quoted_id = info.stanza_id.clone();
            ctx.quoted_sender = info.participant.clone();
            ctx.mentioned = info.mentioned_jid.clone();
        }

        ctx.command = parse_command(&ctx.text, &self.prefix);

        Some(ctx)
    }
}

/// Extracts command-shape facts from `text`.
///
/// The first whitespace-delimited token after the prefix, lower-cased, is the
/// name. A prefix followed by nothing (or only whitespace) is not a command.
pub fn parse_command(text: &str, prefix: &str) -> Option<CommandShape> {
    if prefix.is_empty() {
        return None;
    }
    let rest = text.strip_prefix(prefix)?;
    let mut tokens = rest.split_whitespace();
    let name = tokens.next()?.to_lowercase();
    let args: Vec<String> = tokens.map(str::to_string).collect();
    let query = args.join(" ");

    Some(CommandShape { name, args, query })
}

/// Acknowledges every participant-change stub of a batch.
///
/// Failures are logged; the batch is processed regardless.
pub async fn acknowledge_stubs(bot: &dyn Bot, batch: &[RawMessage]) {
    for raw in batch {
        if raw.stub_type.is_some_and(|s| s.is_participant_change())
            && let Err(e) = bot.send_ack(&raw.key).await
        {
            warn!(id = %raw.key.id, chat = %raw.key.remote_jid, error = %e, "Failed to acknowledge stub");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabot_core::testing::RecordingBot;
    use wabot_core::{
        ContentKind, ContextInfo, MediaContent, MessageContent, MessageKey, StubType,
    };

    const BOT: &str = "94700000000:3@s.whatsapp.net";

    fn normalizer() -> Normalizer {
        Normalizer::new(".").with_owners(["94711111111"])
    }

    #[test]
    fn test_text_is_never_absent() {
        let n = normalizer();
        for content in [
            MessageContent::Image(MediaContent::default()),
            MessageContent::Audio(MediaContent::default()),
            MessageContent::SystemStub,
            MessageContent::Unknown {
                type_name: "poll".into(),
            },
        ] {
            let raw = RawMessage::new(MessageKey::new("1@s.whatsapp.net", "M"), content);
            let ctx = n.normalize(&raw, BOT).unwrap();
            assert_eq!(ctx.text, "");
            assert!(ctx.command.is_none());
        }
    }

    #[test]
    fn test_ephemeral_caption_becomes_command() {
        let content = MessageContent::Ephemeral(Box::new(MessageContent::Video(MediaContent {
            caption: Some(".Kick @someone".into()),
            ..Default::default()
        })));
        let raw = RawMessage::new(
            MessageKey::new("1-2@g.us", "M1").with_participant("94722222222@s.whatsapp.net"),
            content,
        )
        .with_push_name("Nimal");

        let ctx = normalizer().normalize(&raw, BOT).unwrap();
        assert_eq!(ctx.kind, ContentKind::Video);
        assert!(ctx.is_group);
        assert_eq!(ctx.sender, "94722222222@s.whatsapp.net");
        assert_eq!(ctx.sender_name, "Nimal");
        let cmd = ctx.command.unwrap();
        assert_eq!(cmd.name, "kick");
        assert_eq!(cmd.args, vec!["@someone"]);
    }

    #[test]
    fn test_discards_contentless_and_broadcast() {
        let n = normalizer();
        let mut raw = RawMessage::new(MessageKey::new("1@s.whatsapp.net", "M"), MessageContent::text("x"));
        raw.content = None;
        assert!(n.normalize(&raw, BOT).is_none());

        let raw = RawMessage::new(
            MessageKey::new(jid::STATUS_BROADCAST, "M").with_participant("1@s.whatsapp.net"),
            MessageContent::text("story"),
        );
        assert!(n.normalize(&raw, BOT).is_none());
    }

    #[test]
    fn test_sender_resolution() {
        let n = normalizer();

        let own = RawMessage::new(
            MessageKey::new("1-2@g.us", "M").from_me(),
            MessageContent::text("hi"),
        );
        let ctx = n.normalize(&own, BOT).unwrap();
        assert_eq!(ctx.sender, "94700000000@s.whatsapp.net");
        assert!(ctx.is_owner);
        assert_eq!(ctx.sender_name, DEFAULT_SENDER_NAME);

        let direct = RawMessage::new(
            MessageKey::new("94711111111@s.whatsapp.net", "M"),
            MessageContent::text("hi"),
        );
        let ctx = n.normalize(&direct, BOT).unwrap();
        assert_eq!(ctx.sender, "94711111111@s.whatsapp.net");
        assert!(ctx.is_owner);
        assert!(!ctx.is_group);
    }

    #[test]
    fn test_quoted_and_mentions_are_extracted() {
        let content = MessageContent::Text {
            text: "2".into(),
            context: Some(ContextInfo {
                stanza_id: Some("MENU1".into()),
                participant: Some("94700000000@s.whatsapp.net".into()),
                mentioned_jid: vec!["94733333333@s.whatsapp.net".into()],
            }),
        };
        let raw = RawMessage::new(MessageKey::new("1@s.whatsapp.net", "M"), content);
        let ctx = normalizer().normalize(&raw, BOT).unwrap();
        assert_eq!(ctx.quoted_id.as_deref(), Some("MENU1"));
        assert_eq!(ctx.quoted_sender.as_deref(), Some("94700000000@s.whatsapp.net"));
        assert_eq!(ctx.mentioned.len(), 1);
    }

    #[test]
    fn test_parse_command() {
        let shape = parse_command(".  MENU   a  b", ".").unwrap();
        assert_eq!(shape.name, "menu");
        assert_eq!(shape.args, vec!["a", "b"]);
        assert_eq!(shape.query, "a b");

        assert!(parse_command(".", ".").is_none());
        assert!(parse_command(".   ", ".").is_none());
        assert!(parse_command("menu", ".").is_none());
        assert!(parse_command("!menu", "!").is_some());
    }

    #[tokio::test]
    async fn test_acknowledges_every_participant_stub() {
        let bot = RecordingBot::new(BOT);
        let mut first = RawMessage::new(MessageKey::new("1-2@g.us", "S1"), MessageContent::SystemStub)
            .with_stub(StubType::PARTICIPANT_CHANGE);
        first.content = None;
        let batch = vec![
            first,
            RawMessage::new(MessageKey::new("1-2@g.us", "T1"), MessageContent::text("hi")),
            RawMessage::new(MessageKey::new("1-2@g.us", "S2"), MessageContent::SystemStub)
                .with_stub(StubType::PARTICIPANT_CHANGE),
            RawMessage::new(MessageKey::new("1-2@g.us", "S3"), MessageContent::SystemStub)
                .with_stub(StubType(20)),
        ];

        acknowledge_stubs(&bot, &batch).await;

        let acked: Vec<_> = bot.acks().into_iter().map(|k| k.id).collect();
        assert_eq!(acked, vec!["S1", "S2"]);
    }
}

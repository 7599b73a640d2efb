//! Per-invocation handler arguments.

use std::sync::Arc;

use tracing::warn;
use wabot_core::{
    ApiResult, BoxedBot, GroupFacts, MessageContext, MessageKey, Payload, RawMessage, SendOptions,
};

use crate::command::{CommandInfo, CommandRegistry};
use crate::tracker::ReplyTracker;

/// Everything a command or reply handler gets to work with.
///
/// Cheap to clone: every shared part is behind an `Arc`.
#[derive(Clone)]
pub struct DispatchArgs {
    /// Live bot handle.
    pub bot: BoxedBot,
    /// The message as delivered by the transport.
    pub raw: Arc<RawMessage>,
    /// The normalized context of the message.
    pub ctx: Arc<MessageContext>,
    /// Matched command name (pattern or alias as typed, lower-cased).
    /// Empty for reply handlers on non-command messages.
    pub command: String,
    /// Positional arguments.
    pub args: Vec<String>,
    /// Arguments joined with single spaces.
    pub query: String,
    registry: Arc<CommandRegistry>,
    tracker: Arc<ReplyTracker>,
}

impl DispatchArgs {
    pub(crate) fn new(
        bot: BoxedBot,
        raw: Arc<RawMessage>,
        ctx: Arc<MessageContext>,
        registry: Arc<CommandRegistry>,
        tracker: Arc<ReplyTracker>,
    ) -> Self {
        let (command, args, query) = match &ctx.command {
            Some(shape) => (shape.name.clone(), shape.args.clone(), shape.query.clone()),
            None => (String::new(), Vec::new(), String::new()),
        };
        Self {
            bot,
            raw,
            ctx,
            command,
            args,
            query,
            registry,
            tracker,
        }
    }

    /// Replaces the command facts.
    pub(crate) fn with_invocation(mut self, command: String, args: Vec<String>, query: String) -> Self {
        self.command = command;
        self.args = args;
        self.query = query;
        self
    }

    /// Chat the message arrived in.
    pub fn chat_id(&self) -> &str {
        &self.ctx.chat_id
    }

    /// Resolved author of the message.
    pub fn sender(&self) -> &str {
        &self.ctx.sender
    }

    /// Returns the group facts, fetching group metadata on first access.
    pub async fn group_facts(&self) -> &GroupFacts {
        self.ctx.group_facts(self.bot.as_ref()).await
    }

    /// Sends a text reply into the originating chat, quoting the message.
    pub async fn reply(&self, text: impl Into<String>) -> ApiResult<MessageKey> {
        self.bot
            .send(
                &self.ctx.chat_id,
                Payload::text(text),
                SendOptions::quoting(&self.ctx.key),
            )
            .await
    }

    /// Sends an arbitrary payload into the originating chat, quoting the message.
    pub async fn send(&self, payload: Payload) -> ApiResult<MessageKey> {
        self.bot
            .send(&self.ctx.chat_id, payload, SendOptions::quoting(&self.ctx.key))
            .await
    }

    /// Reacts to the message with an emoji.
    ///
    /// Best effort: failures are logged.
    pub async fn react(&self, emoji: &str) {
        let payload = Payload::reaction(emoji, self.ctx.key.clone());
        if let Err(e) = self
            .bot
            .send(&self.ctx.chat_id, payload, SendOptions::default())
            .await
        {
            warn!(chat = %self.ctx.chat_id, emoji, error = %e, "Failed to send reaction");
        }
    }

    /// Remaps future quoted replies to `sent` onto `command`.
    pub fn track_reply(&self, sent: &MessageKey, command: &str) {
        self.tracker.track(&sent.remote_jid, &sent.id, command);
    }

    /// Returns the catalog of registered commands.
    pub fn catalog(&self) -> Vec<CommandInfo> {
        self.registry.catalog()
    }
}

impl std::fmt::Debug for DispatchArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchArgs")
            .field("message_id", &self.ctx.key.id)
            .field("chat_id", &self.ctx.chat_id)
            .field("command", &self.command)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

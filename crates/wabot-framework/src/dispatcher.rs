//! Message dispatcher.
//!
//! The [`Dispatcher`] is the per-message pipeline. Every message of a
//! `MessagesUpsert` batch goes through it one at a time, in delivery order:
//!
//! ```text
//!  RawMessage ──▶ Normalizer ──▶ MessageCache.put ──▶ Command lookup ──▶ ReplyChain
//!                   │ discard          (not self)        │ spawn             │ spawn
//!                   ▼                                     ▼                   ▼
//!                 (none)                            command task        reply task
//! ```
//!
//! 1. Participant-change stubs of the whole batch are acknowledged first.
//! 2. The message is normalized; discarded messages stop here.
//! 3. Messages not authored by the bot are cached.
//! 4. The invocation is resolved. A button reply maps to the button command
//!    with the selected id as query; a command-shaped text maps to its own
//!    name; a non-command reply to a tracked message maps to the tracked
//!    command with the text as query. Remapped invocations get
//!    `args = [query]`.
//! 5. If the name resolves to a command, a task is spawned that sends the
//!    configured reaction and then runs the handler. A failing or panicking
//!    handler is logged and answered with a generic failure reply.
//! 6. The reply chain runs its first matching handler in another task,
//!    whether or not a command matched.
//!
//! Handler tasks are never awaited by the pipeline, so a slow handler does
//! not hold up the message stream.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{Instrument, Level, debug, error, span, warn};
use wabot_core::{BoxedBot, MessageContent, MessageContext, RawMessage};

use crate::args::DispatchArgs;
use crate::cache::{DEFAULT_CACHE_CAPACITY, MessageCache};
use crate::command::CommandRegistry;
use crate::handler::run_guarded;
use crate::normalizer::{Normalizer, acknowledge_stubs};
use crate::reply::ReplyChain;
use crate::tracker::{DEFAULT_TRACKER_CAPACITY, ReplyTracker};

/// Command a button reply is routed to by default.
pub const DEFAULT_BUTTON_COMMAND: &str = "menu";

/// Reply sent when a command handler fails.
pub const DEFAULT_FAILURE_MESSAGE: &str = "❌ An error occurred while running that command.";

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Command prefix.
    pub prefix: String,
    /// Numbers granted owner rights.
    pub owners: Vec<String>,
    /// Capacity of the recent-message cache.
    pub cache_capacity: usize,
    /// Capacity of the reply tracker.
    pub tracker_capacity: usize,
    /// Command that button replies are routed to.
    pub button_command: String,
    /// Reply sent when a command handler fails.
    pub failure_message: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            prefix: ".".to_string(),
            owners: Vec::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            tracker_capacity: DEFAULT_TRACKER_CAPACITY,
            button_command: DEFAULT_BUTTON_COMMAND.to_string(),
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// What happened to one message.
#[derive(Debug, Default)]
pub struct Dispatched {
    /// Id of the message; `None` if it was discarded.
    pub message_id: Option<String>,
    /// Whether the message was inserted into the cache.
    pub cached: bool,
    /// Pattern of the command that was invoked.
    pub command: Option<String>,
    /// Name of the reply handler that was invoked.
    pub reply_handler: Option<String>,
    /// Spawned handler tasks.
    pub tasks: Vec<JoinHandle<()>>,
}

impl Dispatched {
    /// Returns `true` if the normalizer discarded the message.
    pub fn is_discarded(&self) -> bool {
        self.message_id.is_none()
    }

    /// Waits for every spawned handler task.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Handler task did not complete");
            }
        }
    }
}

/// A resolved command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    command: String,
    args: Vec<String>,
    query: String,
}

impl Invocation {
    fn remapped(command: String, query: String) -> Self {
        let args = if query.is_empty() {
            Vec::new()
        } else {
            vec![query.clone()]
        };
        Self {
            command,
            args,
            query,
        }
    }
}

/// The per-message pipeline.
pub struct Dispatcher {
    normalizer: Normalizer,
    cache: Arc<MessageCache>,
    registry: Arc<CommandRegistry>,
    replies: Arc<ReplyChain>,
    tracker: Arc<ReplyTracker>,
    button_command: String,
    failure_message: String,
}

impl Dispatcher {
    /// Creates a dispatcher with empty registries.
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            normalizer: Normalizer::new(config.prefix).with_owners(&config.owners),
            cache: Arc::new(MessageCache::new(config.cache_capacity)),
            registry: Arc::new(CommandRegistry::new()),
            replies: Arc::new(ReplyChain::new()),
            tracker: Arc::new(ReplyTracker::new(config.tracker_capacity)),
            button_command: config.button_command.to_lowercase(),
            failure_message: config.failure_message,
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn cache(&self) -> &Arc<MessageCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn replies(&self) -> &Arc<ReplyChain> {
        &self.replies
    }

    pub fn tracker(&self) -> &Arc<ReplyTracker> {
        &self.tracker
    }

    /// Processes a `MessagesUpsert` batch.
    ///
    /// Stubs are acknowledged for the whole batch before any message is routed.
    pub async fn dispatch_batch(&self, bot: &BoxedBot, batch: Vec<RawMessage>) -> Vec<Dispatched> {
        acknowledge_stubs(bot.as_ref(), &batch).await;
        batch
            .into_iter()
            .map(|raw| self.dispatch(bot, raw))
            .collect()
    }

    /// Routes one message. Must be called within a tokio runtime.
    pub fn dispatch(&self, bot: &BoxedBot, raw: RawMessage) -> Dispatched {
        let span = span!(Level::DEBUG, "dispatch", message_id = %raw.key.id);
        let _enter = span.enter();

        let Some(ctx) = self.normalizer.normalize(&raw, bot.id()) else {
            return Dispatched::default();
        };
        let ctx = Arc::new(ctx);
        let raw = Arc::new(raw);

        let mut outcome = Dispatched {
            message_id: Some(ctx.key.id.clone()),
            ..Default::default()
        };

        if !ctx.is_from_self {
            outcome.cached = self.cache.put(Arc::clone(&ctx));
        }

        let base = DispatchArgs::new(
            Arc::clone(bot),
            Arc::clone(&raw),
            Arc::clone(&ctx),
            Arc::clone(&self.registry),
            Arc::clone(&self.tracker),
        );

        if let Some(invocation) = self.resolve(&raw, &ctx) {
            match self.registry.lookup(&invocation.command) {
                Some(spec) => {
                    debug!(command = %spec.pattern(), chat = %ctx.chat_id, "Command matched");
                    outcome.command = Some(spec.pattern().to_string());

                    let args =
                        base.clone()
                            .with_invocation(invocation.command, invocation.args, invocation.query);
                    let failure_message = self.failure_message.clone();

                    outcome.tasks.push(tokio::spawn(async move {
                        if let Some(emoji) = spec.reaction() {
                            args.react(emoji).await;
                        }
                        if let Err(e) = run_guarded(spec.handler(), args.clone()).await {
                            error!(
                                command = %spec.pattern(),
                                chat = %args.ctx.chat_id,
                                error = %e,
                                "Command handler failed"
                            );
                            if let Err(e) = args.reply(failure_message).await {
                                warn!(chat = %args.ctx.chat_id, error = %e, "Failed to send failure reply");
                            }
                        }
                    }
                    .instrument(span.clone())));
                }
                None => {
                    debug!(command = %invocation.command, "No command registered under this name");
                }
            }
        }

        if let Some((name, task)) = self.replies.run(base) {
            outcome.reply_handler = Some(name);
            outcome.tasks.push(task);
        }

        outcome
    }

    fn resolve(&self, raw: &RawMessage, ctx: &MessageContext) -> Option<Invocation> {
        if let Some(MessageContent::ButtonReply { selected_id, .. }) =
            raw.content.as_ref().map(MessageContent::unwrap_ephemeral)
        {
            return Some(Invocation::remapped(
                self.button_command.clone(),
                selected_id.clone(),
            ));
        }

        if let Some(shape) = &ctx.command {
            return Some(Invocation {
                command: shape.name.clone(),
                args: shape.args.clone(),
                query: shape.query.clone(),
            });
        }

        let quoted = ctx.quoted_id.as_deref()?;
        let command = self.tracker.lookup(&ctx.chat_id, quoted)?;
        Some(Invocation::remapped(command, ctx.text.clone()))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("prefix", &self.normalizer.prefix())
            .field("command_count", &self.registry.len())
            .field("reply_handler_count", &self.replies.len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

//! # Wabot Framework
//!
//! Message processing on top of `wabot-core`.
//!
//! This layer provides:
//! - The [`Normalizer`] turning raw messages into contexts
//! - The bounded FIFO [`MessageCache`] and the [`DeletionReporter`] built on it
//! - The [`CommandRegistry`] with case-insensitive, alias-aware lookup
//! - The [`ReplyChain`] for non-command conversational flows
//! - The [`Dispatcher`] tying these together per message
//! - The [`Plugin`] trait and the [`PluginLoader`]
//!
//! Handlers are plain async functions taking [`DispatchArgs`]:
//!
//! ```rust,ignore
//! use wabot_framework::{CommandSpec, DispatchArgs, HandlerResult};
//!
//! async fn ping(args: DispatchArgs) -> HandlerResult {
//!     args.reply("pong").await?;
//!     Ok(())
//! }
//!
//! dispatcher.registry().register(CommandSpec::new("ping", ping).react("🏓"))?;
//! ```

pub mod args;
pub mod cache;
pub mod command;
pub mod deletion;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod normalizer;
pub mod plugin;
pub mod reply;
pub mod tracker;

pub use args::DispatchArgs;
pub use cache::{DEFAULT_CACHE_CAPACITY, MessageCache};
pub use command::{CommandInfo, CommandRegistry, CommandSpec};
pub use deletion::DeletionReporter;
pub use dispatcher::{Dispatched, Dispatcher, DispatcherConfig};
pub use error::{HandlerError, HandlerResult, RegistrationError, RegistrationResult};
pub use handler::{BoxFuture, BoxedHandler, Handler, into_handler};
pub use normalizer::{Normalizer, parse_command};
pub use plugin::{
    BoxedEventHandler, BoxedPlugin, EventHandler, EventHandlers, LoadReport, Plugin, PluginLoader,
    Registrar,
};
pub use reply::{ReplyChain, ReplyHandlerSpec};
pub use tracker::ReplyTracker;

//! # Wabot Runtime
//!
//! Keeps a bot session alive and wires everything together.
//!
//! This crate provides:
//! - Layered configuration ([`ConfigLoader`], [`WabotConfig`])
//! - Logging setup ([`LoggingBuilder`], [`logging::init_from_config`])
//! - Credential storage and restore ([`SessionStore`], [`SessionRestorer`])
//! - The connection [`Supervisor`]: reconnects, logout, event pumping
//! - The [`BotRuntime`] orchestrating the above with the bundled plugins
//!
//! ```rust,ignore
//! use wabot_runtime::BotRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = BotRuntime::builder()
//!         .transport(my_transport())
//!         .build()?;
//!
//!     // Until logout, Ctrl+C or SIGTERM.
//!     let reason = runtime.run().await?;
//!     println!("stopped: {reason:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod supervisor;

pub use config::{ConfigError, ConfigLoader, ConfigResult, WabotConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{BotRuntime, RuntimeBuilder};
pub use session::{
    BoxedSessionStore, FileSessionStore, HttpRemoteFetcher, MemorySessionStore, RemoteFetcher,
    SessionError, SessionRestorer, SessionResult, SessionSource, SessionStore,
};
pub use supervisor::{ReconnectGate, SessionState, Shutdown, Supervisor, SupervisorConfig};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{BotRuntime, Shutdown};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
    pub use wabot_core::prelude::*;
    pub use wabot_framework::{CommandSpec, DispatchArgs, HandlerResult, Plugin, Registrar};
}

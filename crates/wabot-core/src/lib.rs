//! # Wabot Core
//!
//! Shared vocabulary of the wabot message-processing core.
//!
//! This crate defines the contract between the external protocol
//! implementation (the *transport*) and the rest of the bot, plus the
//! normalized per-message context every handler works with.
//!
//! ## Modules
//!
//! - **Transport contract**: opening a connection and the events it emits
//!   ([`Transport`], [`Connection`], [`TransportEvent`])
//! - **Bot handle**: outbound calls on a live connection ([`Bot`], [`BoxedBot`])
//! - **Message model**: inbound content as a tagged union ([`RawMessage`],
//!   [`MessageContent`]) and outbound [`Payload`]s
//! - **Context**: the normalized view of one message ([`MessageContext`])
//! - **Chat ids**: helpers for classifying and normalizing chat identifiers ([`jid`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌───────────┐  TransportEvent  ┌────────────┐  MessageContext  ┌──────────┐
//! │ Transport │─────────────────▶│ Normalizer │─────────────────▶│ Handlers │
//! └───────────┘                  └────────────┘                  └──────────┘
//!       ▲                                                              │
//!       └──────────────────────── Bot::send ───────────────────────────┘
//! ```
//!
//! The normalizer and dispatcher live in `wabot-framework`; the connection
//! supervisor and session store live in `wabot-runtime`.

pub mod bot;
pub mod context;
pub mod error;
pub mod jid;
pub mod message;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bot::{
    AdminRole, Bot, BoxedBot, GroupMetadata, GroupSetting, Participant, ParticipantAction,
    ParticipantUpdate,
};
pub use context::{CommandShape, GroupFacts, MessageContext};
pub use error::{ApiError, ApiResult, TransportError, TransportResult};
pub use message::{
    ContentKind, ContextInfo, MediaContent, MessageContent, MessageKey, Payload, RawMessage,
    SendOptions, StubType,
};
pub use transport::{
    BoxedTransport, CloseReason, ConnectionState, Connection, Credentials, Transport,
    TransportEvent,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::bot::{Bot, BoxedBot};
    pub use super::context::MessageContext;
    pub use super::message::{ContentKind, MessageContent, MessageKey, Payload, RawMessage, SendOptions};
}

//! Transport contract.
//!
//! The transport implements the messaging protocol and is a black box to the
//! core. Opening it yields a [`Connection`]: a live [`Bot`](crate::Bot)
//! handle plus the stream of [`TransportEvent`]s for that connection.
//!
//! ```text
//! ┌───────────┐ connect(credentials) ┌────────────┐
//! │ Supervisor│─────────────────────▶│ Transport  │
//! │           │◀─────────────────────│ (protocol) │
//! └───────────┘  Connection {        └────────────┘
//!                  bot: BoxedBot,
//!                  events: Receiver<TransportEvent>,
//!                }
//! ```
//!
//! The stream ends when the connection is gone; a stream that ends without a
//! `Close` update is treated as a close with an unknown reason.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bot::BoxedBot;
use crate::error::TransportResult;
use crate::message::{MessageKey, RawMessage};

// =============================================================================
// Credentials
// =============================================================================

/// Opaque credential material required to open a connection without re-pairing.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(Vec<u8>);

impl Credentials {
    /// Wraps raw credential bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the credential and returns the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Events
// =============================================================================

/// Connection lifecycle reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

/// Why the transport closed the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CloseReason {
    /// The session was logged out remotely; the credential is dead.
    LoggedOut,
    /// The server asked for a restart.
    RestartRequired,
    /// The network connection was lost.
    ConnectionLost,
    /// Another client replaced this session.
    ConnectionReplaced,
    /// Timed out.
    TimedOut,
    /// Any other status code.
    Other(u16),
}

impl CloseReason {
    /// Returns `true` when the close is terminal for the session.
    pub fn is_logout(&self) -> bool {
        matches!(self, CloseReason::LoggedOut)
    }
}

/// Events emitted by an open connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection state changed.
    ConnectionUpdate {
        state: ConnectionState,
        close_reason: Option<CloseReason>,
    },
    /// The credential was rotated and must be persisted.
    CredentialsUpdate(Credentials),
    /// A batch of new messages, in delivery order.
    MessagesUpsert(Vec<RawMessage>),
    /// Messages were deleted ("deleted for everyone") by their senders.
    MessagesDeleted(Vec<MessageKey>),
}

impl TransportEvent {
    /// Convenience constructor for an `Open` update.
    pub fn open() -> Self {
        Self::ConnectionUpdate {
            state: ConnectionState::Open,
            close_reason: None,
        }
    }

    /// Convenience constructor for a `Close` update.
    pub fn close(reason: Option<CloseReason>) -> Self {
        Self::ConnectionUpdate {
            state: ConnectionState::Close,
            close_reason: reason,
        }
    }

    /// Returns a short name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            TransportEvent::ConnectionUpdate { .. } => "connection.update",
            TransportEvent::CredentialsUpdate(_) => "creds.update",
            TransportEvent::MessagesUpsert(_) => "messages.upsert",
            TransportEvent::MessagesDeleted(_) => "messages.delete",
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// An open transport connection.
pub struct Connection {
    /// Live handle for outbound calls.
    pub bot: BoxedBot,
    /// Inbound event stream for this connection.
    pub events: mpsc::Receiver<TransportEvent>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("bot_id", &self.bot.id())
            .finish_non_exhaustive()
    }
}

/// The external protocol implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection with the given credential.
    async fn connect(&self, credentials: Credentials) -> TransportResult<Connection>;
}

/// A shared Transport trait object.
pub type BoxedTransport = Arc<dyn Transport>;

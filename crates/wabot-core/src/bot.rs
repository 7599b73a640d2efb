//! Bot trait and related types.
//!
//! A [`Bot`] is the live handle of an open transport connection. Everything
//! the core and its plugins do to the outside world (sending, reacting,
//! acknowledging, querying group metadata) goes through it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::jid;
use crate::message::{MessageKey, Payload, SendOptions};

// =============================================================================
// Group Types
// =============================================================================

/// Admin role of a group participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    Admin,
    SuperAdmin,
}

/// A member of a group chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// User identifier.
    pub id: String,
    /// Admin role, `None` for regular members.
    #[serde(default)]
    pub admin: Option<AdminRole>,
}

impl Participant {
    /// Creates a regular member.
    pub fn member(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            admin: None,
        }
    }

    /// Creates an admin member.
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            admin: Some(AdminRole::Admin),
        }
    }
}

/// Group metadata as returned by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    /// Group identifier.
    pub id: String,
    /// Group subject (display name).
    #[serde(default)]
    pub subject: String,
    /// Current participants.
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl GroupMetadata {
    /// Returns the normalized ids of every participant holding an admin role.
    pub fn admins(&self) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| p.admin.is_some())
            .map(|p| jid::normalize_user(&p.id))
            .collect()
    }
}

/// Participant update actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

/// Result of a participant update for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantUpdate {
    /// Affected user.
    pub jid: String,
    /// Status code reported by the transport (`"200"` on success).
    pub status: String,
}

impl ParticipantUpdate {
    /// Returns `true` if the transport refused the update.
    pub fn is_forbidden(&self) -> bool {
        self.status == "403"
    }
}

/// Group-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSetting {
    /// Only admins may send messages.
    Announcement,
    /// All members may send messages.
    NotAnnouncement,
}

// =============================================================================
// Bot Trait
// =============================================================================

/// The live transport handle.
///
/// Only [`id`](Bot::id), [`send`](Bot::send) and
/// [`fetch_group_metadata`](Bot::fetch_group_metadata) are required. Group
/// administration calls default to [`ApiError::Unsupported`] so transports
/// and test doubles only implement what they actually offer.
#[async_trait]
pub trait Bot: Send + Sync {
    /// Returns the bot's own identifier, possibly with a device suffix.
    fn id(&self) -> &str;

    /// Returns the bot's identifier without device suffix.
    fn normalized_id(&self) -> String {
        jid::normalize_user(self.id())
    }

    /// Sends a payload to a chat.
    ///
    /// Returns the key of the sent message.
    async fn send(
        &self,
        chat: &str,
        payload: Payload,
        opts: SendOptions,
    ) -> ApiResult<MessageKey>;

    /// Fetches the metadata of a group chat.
    async fn fetch_group_metadata(&self, chat: &str) -> ApiResult<GroupMetadata>;

    /// Acknowledges a protocol notification.
    async fn send_ack(&self, _key: &MessageKey) -> ApiResult<()> {
        Err(ApiError::Unsupported("send_ack"))
    }

    /// Adds, removes, promotes or demotes group participants.
    async fn update_participants(
        &self,
        _chat: &str,
        _participants: &[String],
        _action: ParticipantAction,
    ) -> ApiResult<Vec<ParticipantUpdate>> {
        Err(ApiError::Unsupported("update_participants"))
    }

    /// Changes a group-wide setting.
    async fn update_group_setting(&self, _chat: &str, _setting: GroupSetting) -> ApiResult<()> {
        Err(ApiError::Unsupported("update_group_setting"))
    }

    /// Returns the invite code of a group.
    async fn group_invite_code(&self, _chat: &str) -> ApiResult<String> {
        Err(ApiError::Unsupported("group_invite_code"))
    }
}

/// A shared Bot trait object.
pub type BoxedBot = Arc<dyn Bot>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admins_are_normalized() {
        let meta = GroupMetadata {
            id: "1-2@g.us".into(),
            subject: "Test".into(),
            participants: vec![
                Participant::admin("111:4@s.whatsapp.net"),
                Participant::member("222@s.whatsapp.net"),
                Participant {
                    id: "333@s.whatsapp.net".into(),
                    admin: Some(AdminRole::SuperAdmin),
                },
            ],
        };
        assert_eq!(
            meta.admins(),
            vec!["111@s.whatsapp.net", "333@s.whatsapp.net"]
        );
    }
}

//! Test doubles for the transport contract.
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for
//! downstream crates' tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::bot::{Bot, GroupMetadata, GroupSetting, ParticipantAction, ParticipantUpdate};
use crate::error::{ApiError, ApiResult};
use crate::message::{MessageKey, Payload, SendOptions};

/// A message recorded by [`RecordingBot::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat: String,
    pub payload: Payload,
    pub opts: SendOptions,
}

impl SentMessage {
    /// Returns the text of a text payload.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text { text } => Some(text),
            Payload::Image { caption, .. } => caption.as_deref(),
            Payload::Reaction { .. } => None,
        }
    }
}

/// A [`Bot`] that records every outbound call.
pub struct RecordingBot {
    id: String,
    groups: HashMap<String, GroupMetadata>,
    fail_sends: bool,
    hang_chat: Option<String>,
    sent: Mutex<Vec<SentMessage>>,
    acks: Mutex<Vec<MessageKey>>,
    participant_updates: Mutex<Vec<(String, Vec<String>, ParticipantAction)>>,
    settings: Mutex<Vec<(String, GroupSetting)>>,
    metadata_fetches: AtomicUsize,
    next_id: AtomicUsize,
}

impl RecordingBot {
    /// Creates a bot with the given own identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            groups: HashMap::new(),
            fail_sends: false,
            hang_chat: None,
            sent: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
            participant_updates: Mutex::new(Vec::new()),
            settings: Mutex::new(Vec::new()),
            metadata_fetches: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Registers metadata returned by `fetch_group_metadata`.
    pub fn with_group(mut self, meta: GroupMetadata) -> Self {
        self.groups.insert(meta.id.clone(), meta);
        self
    }

    /// Makes every `send` fail with [`ApiError::NotConnected`].
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// Makes every `send` to `chat` wait forever.
    pub fn hanging_sends_to(mut self, chat: impl Into<String>) -> Self {
        self.hang_chat = Some(chat.into());
        self
    }

    /// Returns every recorded send.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Returns the texts of all recorded sends, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| m.text().map(str::to_string))
            .collect()
    }

    /// Returns every recorded reaction emoji.
    pub fn reactions(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match &m.payload {
                Payload::Reaction { emoji, .. } => Some(emoji.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns every acknowledged key.
    pub fn acks(&self) -> Vec<MessageKey> {
        self.acks.lock().clone()
    }

    /// Returns every participant update call.
    pub fn participant_updates(&self) -> Vec<(String, Vec<String>, ParticipantAction)> {
        self.participant_updates.lock().clone()
    }

    /// Returns every group setting change.
    pub fn settings(&self) -> Vec<(String, GroupSetting)> {
        self.settings.lock().clone()
    }

    /// Returns how many times group metadata was fetched.
    pub fn metadata_fetches(&self) -> usize {
        self.metadata_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bot for RecordingBot {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(
        &self,
        chat: &str,
        payload: Payload,
        opts: SendOptions,
    ) -> ApiResult<MessageKey> {
        if self.fail_sends {
            return Err(ApiError::NotConnected);
        }
        if self.hang_chat.as_deref() == Some(chat) {
            std::future::pending::<()>().await;
        }
        self.sent.lock().push(SentMessage {
            chat: chat.to_string(),
            payload,
            opts,
        });
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MessageKey::new(chat, format!("SENT-{n}")).from_me())
    }

    async fn fetch_group_metadata(&self, chat: &str) -> ApiResult<GroupMetadata> {
        self.metadata_fetches.fetch_add(1, Ordering::SeqCst);
        self.groups.get(chat).cloned().ok_or(ApiError::Rejected {
            status: 404,
            message: format!("unknown group {chat}"),
        })
    }

    async fn send_ack(&self, key: &MessageKey) -> ApiResult<()> {
        self.acks.lock().push(key.clone());
        Ok(())
    }

    async fn update_participants(
        &self,
        chat: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> ApiResult<Vec<ParticipantUpdate>> {
        self.participant_updates
            .lock()
            .push((chat.to_string(), participants.to_vec(), action));
        Ok(participants
            .iter()
            .map(|jid| ParticipantUpdate {
                jid: jid.clone(),
                status: "200".into(),
            })
            .collect())
    }

    async fn update_group_setting(&self, chat: &str, setting: GroupSetting) -> ApiResult<()> {
        self.settings.lock().push((chat.to_string(), setting));
        Ok(())
    }

    async fn group_invite_code(&self, _chat: &str) -> ApiResult<String> {
        Ok("AbCdEf123".into())
    }
}

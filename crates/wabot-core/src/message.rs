//! Inbound message model and outbound payloads.
//!
//! A [`RawMessage`] is what the transport delivers in a `MessagesUpsert`
//! batch. Its content is a [`MessageContent`] tagged union; every consumer
//! matches on it exhaustively instead of probing for fields.
//!
//! All types are `serde`-serializable so a transport bridge can build them
//! straight from JSON:
//!
//! ```json
//! {
//!   "key": { "remote_jid": "123-456@g.us", "id": "ABCD", "from_me": false,
//!            "participant": "94770000000@s.whatsapp.net" },
//!   "push_name": "Kamal",
//!   "content": { "type": "text", "data": { "text": ".menu" } }
//! }
//! ```

use serde::{Deserialize, Serialize};

// ============================================================================
// Message Key
// ============================================================================

/// Identifies a single message within a chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    /// Chat the message belongs to.
    pub remote_jid: String,
    /// Transport-assigned message id.
    pub id: String,
    /// Whether the message was authored by this session.
    #[serde(default)]
    pub from_me: bool,
    /// Author inside a group chat.
    #[serde(default)]
    pub participant: Option<String>,
}

impl MessageKey {
    /// Creates a key for a message in a direct chat.
    pub fn new(remote_jid: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            remote_jid: remote_jid.into(),
            id: id.into(),
            from_me: false,
            participant: None,
        }
    }

    /// Sets the group participant that authored the message.
    pub fn with_participant(mut self, participant: impl Into<String>) -> Self {
        self.participant = Some(participant.into());
        self
    }

    /// Marks the message as authored by this session.
    pub fn from_me(mut self) -> Self {
        self.from_me = true;
        self
    }
}

// ============================================================================
// Stub Types
// ============================================================================

/// Numeric system-stub code attached to protocol events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StubType(pub u32);

impl StubType {
    /// Group participant change; must be acknowledged back to the transport.
    pub const PARTICIPANT_CHANGE: StubType = StubType(68);

    /// Returns `true` for the participant-change subtype.
    pub fn is_participant_change(self) -> bool {
        self == Self::PARTICIPANT_CHANGE
    }
}

// ============================================================================
// Content
// ============================================================================

/// Reply/mention metadata attached to text and media content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    /// Id of the quoted message, if this is a reply.
    #[serde(default)]
    pub stanza_id: Option<String>,
    /// Author of the quoted message.
    #[serde(default)]
    pub participant: Option<String>,
    /// Users mentioned in the text.
    #[serde(default)]
    pub mentioned_jid: Vec<String>,
}

/// Image, video, audio and document payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaContent {
    /// Caption typed by the sender.
    #[serde(default)]
    pub caption: Option<String>,
    /// MIME type reported by the transport.
    #[serde(default)]
    pub mimetype: Option<String>,
    /// Reply/mention metadata.
    #[serde(default)]
    pub context: Option<ContextInfo>,
}

/// The content of an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain or extended text.
    Text {
        text: String,
        #[serde(default)]
        context: Option<ContextInfo>,
    },
    /// Image with optional caption.
    Image(MediaContent),
    /// Video with optional caption.
    Video(MediaContent),
    /// Voice note or audio file.
    Audio(MediaContent),
    /// Document with optional caption.
    Document(MediaContent),
    /// A quick-reply button press.
    ButtonReply {
        selected_id: String,
        #[serde(default)]
        display_text: Option<String>,
        #[serde(default)]
        context: Option<ContextInfo>,
    },
    /// Self-destructing envelope around the real content.
    Ephemeral(Box<MessageContent>),
    /// Protocol or system payload with no user-visible content.
    SystemStub,
    /// Content the transport could not classify.
    Unknown {
        #[serde(default)]
        type_name: String,
    },
}

impl MessageContent {
    /// Creates plain text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            context: None,
        }
    }

    /// Creates text content that replies to (quotes) another message.
    pub fn reply(text: impl Into<String>, quoted_id: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            context: Some(ContextInfo {
                stanza_id: Some(quoted_id.into()),
                ..Default::default()
            }),
        }
    }

    /// Strips every ephemeral envelope and returns the inner content.
    pub fn unwrap_ephemeral(&self) -> &MessageContent {
        let mut content = self;
        while let MessageContent::Ephemeral(inner) = content {
            content = inner;
        }
        content
    }

    /// Returns the kind tag for this content (after unwrapping ephemeral envelopes).
    pub fn kind(&self) -> ContentKind {
        match self.unwrap_ephemeral() {
            MessageContent::Text { .. } => ContentKind::Text,
            MessageContent::Image(_) => ContentKind::Image,
            MessageContent::Video(_) => ContentKind::Video,
            MessageContent::Audio(_) => ContentKind::Audio,
            MessageContent::Document(_) => ContentKind::Document,
            MessageContent::ButtonReply { .. } => ContentKind::ButtonReply,
            MessageContent::SystemStub => ContentKind::SystemStub,
            MessageContent::Unknown { .. } | MessageContent::Ephemeral(_) => ContentKind::Unknown,
        }
    }

    /// Extracts the user-visible text: the text itself, a media caption, or
    /// the button label. Everything else yields an empty string.
    pub fn text_body(&self) -> String {
        match self.unwrap_ephemeral() {
            MessageContent::Text { text, .. } => text.clone(),
            MessageContent::Image(media)
            | MessageContent::Video(media)
            | MessageContent::Audio(media)
            | MessageContent::Document(media) => media.caption.clone().unwrap_or_default(),
            MessageContent::ButtonReply { display_text, .. } => {
                display_text.clone().unwrap_or_default()
            }
            MessageContent::SystemStub
            | MessageContent::Unknown { .. }
            | MessageContent::Ephemeral(_) => String::new(),
        }
    }

    /// Returns the reply/mention metadata, if the content carries any.
    pub fn context_info(&self) -> Option<&ContextInfo> {
        match self.unwrap_ephemeral() {
            MessageContent::Text { context, .. } | MessageContent::ButtonReply { context, .. } => {
                context.as_ref()
            }
            MessageContent::Image(media)
            | MessageContent::Video(media)
            | MessageContent::Audio(media)
            | MessageContent::Document(media) => media.context.as_ref(),
            MessageContent::SystemStub
            | MessageContent::Unknown { .. }
            | MessageContent::Ephemeral(_) => None,
        }
    }
}

/// Kind tag of a message's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    ButtonReply,
    SystemStub,
    Unknown,
}

impl ContentKind {
    /// Returns `true` for image, video, audio and document content.
    pub fn is_media(self) -> bool {
        matches!(
            self,
            ContentKind::Image | ContentKind::Video | ContentKind::Audio | ContentKind::Document
        )
    }

    /// Returns the tag as a lowercase string.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::Document => "document",
            ContentKind::ButtonReply => "button_reply",
            ContentKind::SystemStub => "system_stub",
            ContentKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Raw Message
// ============================================================================

/// One inbound message event as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Message key.
    pub key: MessageKey,
    /// Display name the sender chose for themselves.
    #[serde(default)]
    pub push_name: Option<String>,
    /// Content, absent for bare protocol notifications.
    #[serde(default)]
    pub content: Option<MessageContent>,
    /// System-stub code, if this is a protocol notification.
    #[serde(default)]
    pub stub_type: Option<StubType>,
    /// Unix timestamp (seconds) of the message.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl RawMessage {
    /// Creates a message with the given key and content.
    pub fn new(key: MessageKey, content: MessageContent) -> Self {
        Self {
            key,
            push_name: None,
            content: Some(content),
            stub_type: None,
            timestamp: None,
        }
    }

    /// Sets the sender display name.
    pub fn with_push_name(mut self, name: impl Into<String>) -> Self {
        self.push_name = Some(name.into());
        self
    }

    /// Sets the system-stub code.
    pub fn with_stub(mut self, stub: StubType) -> Self {
        self.stub_type = Some(stub);
        self
    }
}

// ============================================================================
// Outbound Payloads
// ============================================================================

/// Content of an outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Plain text.
    Text { text: String },
    /// Image fetched by the transport from a URL.
    Image {
        url: String,
        #[serde(default)]
        caption: Option<String>,
    },
    /// Emoji reaction to an existing message.
    Reaction { emoji: String, target: MessageKey },
}

impl Payload {
    /// Creates a text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a reaction payload.
    pub fn reaction(emoji: impl Into<String>, target: MessageKey) -> Self {
        Self::Reaction {
            emoji: emoji.into(),
            target,
        }
    }
}

/// Options for an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Message to quote.
    #[serde(default)]
    pub quoted: Option<MessageKey>,
    /// Users to mention.
    #[serde(default)]
    pub mentions: Vec<String>,
}

impl SendOptions {
    /// Options quoting the given message.
    pub fn quoting(key: &MessageKey) -> Self {
        Self {
            quoted: Some(key.clone()),
            mentions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_ephemeral_unwraps_to_text() {
        let content = MessageContent::Ephemeral(Box::new(MessageContent::Ephemeral(Box::new(
            MessageContent::text("hi"),
        ))));
        assert_eq!(content.kind(), ContentKind::Text);
        assert_eq!(content.text_body(), "hi");
    }

    #[test]
    fn test_media_without_caption_is_empty_text() {
        let content = MessageContent::Image(MediaContent::default());
        assert_eq!(content.kind(), ContentKind::Image);
        assert_eq!(content.text_body(), "");
        assert_eq!(MessageContent::SystemStub.text_body(), "");
    }

    #[test]
    fn test_deserialize_raw_message_json() {
        let json = r#"{
            "key": { "remote_jid": "123-456@g.us", "id": "ABCD",
                     "participant": "94770000000@s.whatsapp.net" },
            "push_name": "Kamal",
            "content": { "type": "ephemeral",
                         "data": { "type": "image", "data": { "caption": ".menu" } } }
        }"#;
        let raw: RawMessage = serde_json::from_str(json).unwrap();
        assert!(!raw.key.from_me);
        let content = raw.content.unwrap();
        assert_eq!(content.kind(), ContentKind::Image);
        assert_eq!(content.text_body(), ".menu");
    }

    #[test]
    fn test_stub_type_participant_change() {
        assert!(StubType(68).is_participant_change());
        assert!(!StubType(1).is_participant_change());
    }
}

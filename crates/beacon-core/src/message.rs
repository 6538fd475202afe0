//! Message model for inbound conversational events.
//!
//! Every inbound message is exactly one of three closed variants:
//!
//! ```text
//! InboundMessage
//! ├── Private(PrivateMessage)  { sender, elements }
//! ├── Group(GroupMessage)      { group_id, group_name, sender, elements }
//! └── Temp(TempMessage)        { group_id, group_name, sender, elements }
//! ```
//!
//! Content is an ordered list of [`Segment`]s. Only [`Segment::Text`] contributes
//! to the derived plain text of a message.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric user identifier on the messaging backend.
pub type UserId = i64;

/// Numeric group identifier on the messaging backend.
pub type GroupId = i64;

/// Numeric message identifier, used as the persistence key.
pub type MessageId = u32;

// ============================================================================
// Segment
// ============================================================================

/// A single unit of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text content.
    Text(String),
    /// A mention of a user.
    Mention(UserId),
    /// Raw image bytes.
    Image(Vec<u8>),
    /// Any other element kind; the core only carries it through.
    Other {
        /// Backend-specific element kind.
        kind: String,
        /// Backend-specific element data.
        #[serde(default)]
        data: Value,
    },
}

impl Segment {
    /// Creates a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a mention segment.
    pub fn mention(target: UserId) -> Self {
        Self::Mention(target)
    }

    /// Creates an image segment.
    pub fn image(data: impl Into<Vec<u8>>) -> Self {
        Self::Image(data.into())
    }

    /// Returns the text content if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the mentioned user if this is a mention segment.
    pub fn as_mention(&self) -> Option<UserId> {
        match self {
            Self::Mention(target) => Some(*target),
            _ => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text(text) => write!(f, "{text}"),
            Segment::Mention(target) => write!(f, "@{target}"),
            Segment::Image(data) => write!(f, "[image:{} bytes]", data.len()),
            Segment::Other { kind, .. } => write!(f, "[{kind}]"),
        }
    }
}

/// Concatenates the text of every text segment, in order.
///
/// Returns an empty string when there are no text segments.
pub fn extract_plain_text(elements: &[Segment]) -> String {
    elements.iter().filter_map(Segment::as_text).collect()
}

// ============================================================================
// Sender
// ============================================================================

/// Information about the sender of a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    /// Sender's user ID.
    pub user_id: UserId,
    /// Nickname.
    #[serde(default)]
    pub nickname: String,
    /// Group card (group nickname), if any.
    #[serde(default)]
    pub card: Option<String>,
}

impl Sender {
    /// Creates a sender with only an ID.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    /// Sets the nickname.
    pub fn nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }
}

// ============================================================================
// Variants
// ============================================================================

/// A one-to-one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessage {
    /// Message ID.
    pub id: MessageId,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub time: u64,
    /// Sender information.
    pub sender: Sender,
    /// Message content.
    #[serde(default)]
    pub elements: Vec<Segment>,
}

/// A message posted in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMessage {
    /// Message ID.
    pub id: MessageId,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub time: u64,
    /// Group ID.
    pub group_id: GroupId,
    /// Group display name.
    #[serde(default)]
    pub group_name: String,
    /// Sender information.
    pub sender: Sender,
    /// Message content.
    #[serde(default)]
    pub elements: Vec<Segment>,
}

/// A temporary conversation started from a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempMessage {
    /// Message ID.
    pub id: MessageId,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub time: u64,
    /// The group the conversation was started from.
    pub group_id: GroupId,
    /// Group display name.
    #[serde(default)]
    pub group_name: String,
    /// Sender information.
    pub sender: Sender,
    /// Message content.
    #[serde(default)]
    pub elements: Vec<Segment>,
}

/// The closed set of delivery contexts a message can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// One-to-one conversation.
    Private,
    /// Group conversation.
    Group,
    /// Temporary conversation.
    Temp,
}

impl Variant {
    /// Returns the lowercase name of the variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Temp => "temp",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound message, tagged with its delivery variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// A private message.
    Private(PrivateMessage),
    /// A group message.
    Group(GroupMessage),
    /// A temporary-conversation message.
    Temp(TempMessage),
}

impl InboundMessage {
    /// Returns the variant tag.
    pub fn variant(&self) -> Variant {
        match self {
            Self::Private(_) => Variant::Private,
            Self::Group(_) => Variant::Group,
            Self::Temp(_) => Variant::Temp,
        }
    }

    /// Returns the message ID.
    pub fn id(&self) -> MessageId {
        match self {
            Self::Private(msg) => msg.id,
            Self::Group(msg) => msg.id,
            Self::Temp(msg) => msg.id,
        }
    }

    /// Returns the sender.
    pub fn sender(&self) -> &Sender {
        match self {
            Self::Private(msg) => &msg.sender,
            Self::Group(msg) => &msg.sender,
            Self::Temp(msg) => &msg.sender,
        }
    }

    /// Returns the group the message belongs to, if the variant has one.
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::Private(_) => None,
            Self::Group(msg) => Some(msg.group_id),
            Self::Temp(msg) => Some(msg.group_id),
        }
    }

    /// Returns the content elements.
    pub fn elements(&self) -> &[Segment] {
        match self {
            Self::Private(msg) => &msg.elements,
            Self::Group(msg) => &msg.elements,
            Self::Temp(msg) => &msg.elements,
        }
    }
}

impl From<PrivateMessage> for InboundMessage {
    fn from(msg: PrivateMessage) -> Self {
        Self::Private(msg)
    }
}

impl From<GroupMessage> for InboundMessage {
    fn from(msg: GroupMessage) -> Self {
        Self::Group(msg)
    }
}

impl From<TempMessage> for InboundMessage {
    fn from(msg: TempMessage) -> Self {
        Self::Temp(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_text_skips_non_text() {
        let elements = vec![
            Segment::text("/login"),
            Segment::mention(42),
            Segment::text(" extra"),
            Segment::image(vec![1, 2, 3]),
        ];
        assert_eq!(extract_plain_text(&elements), "/login extra");
    }

    #[test]
    fn test_extract_plain_text_empty() {
        assert_eq!(extract_plain_text(&[]), "");
        assert_eq!(extract_plain_text(&[Segment::mention(1)]), "");
    }

    #[test]
    fn test_group_accessors() {
        let msg: InboundMessage = GroupMessage {
            id: 7,
            time: 0,
            group_id: 100,
            group_name: "course".into(),
            sender: Sender::new(1),
            elements: vec![],
        }
        .into();
        assert_eq!(msg.variant(), Variant::Group);
        assert_eq!(msg.group_id(), Some(100));
        assert_eq!(msg.sender().user_id, 1);
        assert_eq!(msg.id(), 7);
    }

    #[test]
    fn test_serde_tagging() {
        let msg = InboundMessage::Private(PrivateMessage {
            id: 1,
            time: 0,
            sender: Sender::new(5),
            elements: vec![Segment::text("hi")],
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["message_type"], "private");
        assert_eq!(json["elements"][0]["type"], "text");

        let back: InboundMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}

//! Conversation, message and attachment types as the platform delivers them.
//!
//! Messages keep their raw JSON next to the decoded fields because video
//! attachments are archived as sidecar records of exactly what the API returned.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// One page of a paginated listing. `items` is optional because a page without
/// it is the platform's way of saying there is nothing more to read.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    pub items: Option<Vec<T>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PeerKind {
    User,
    Chat,
    Group,
    Other(String),
}

impl From<String> for PeerKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "user" => PeerKind::User,
            "chat" => PeerKind::Chat,
            "group" => PeerKind::Group,
            _ => PeerKind::Other(tag),
        }
    }
}

impl PeerKind {
    pub fn tag(&self) -> &str {
        match self {
            PeerKind::User => "user",
            PeerKind::Chat => "chat",
            PeerKind::Group => "group",
            PeerKind::Other(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationItem {
    pub conversation: ConversationInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationInfo {
    pub peer: Peer,
    #[serde(default)]
    pub chat_settings: Option<ChatSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Peer {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: PeerKind,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatSettings {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// A conversation resolved for display and for its output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub peer_id: i64,
    pub kind: PeerKind,
    pub title: String,
    pub folder_name: String,
    pub message_count: u64,
}

#[derive(Debug, Clone)]
pub struct Message {
    /// Forwarded copies often carry no id of their own; those decode as 0.
    pub id: i64,
    pub date: i64,
    pub peer_id: Option<i64>,
    pub attachments: Vec<Attachment>,
    pub fwd_messages: Vec<Message>,
    pub raw: Value,
}

#[derive(Deserialize)]
struct MessageFields {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    date: i64,
    #[serde(default)]
    peer_id: Option<i64>,
    #[serde(default)]
    attachments: Vec<Attachment>,
    #[serde(default)]
    fwd_messages: Vec<Message>,
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let fields = MessageFields::deserialize(&raw).map_err(serde::de::Error::custom)?;
        Ok(Message {
            id: fields.id,
            date: fields.date,
            peer_id: fields.peer_id,
            attachments: fields.attachments,
            fwd_messages: fields.fwd_messages,
            raw,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageVariant {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl ImageVariant {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Picks the variant with the largest area. Ties go to the first one seen.
pub fn best_variant(variants: &[ImageVariant]) -> Option<&ImageVariant> {
    let mut best: Option<&ImageVariant> = None;
    for variant in variants {
        if best.map_or(true, |b| variant.area() > b.area()) {
            best = Some(variant);
        }
    }
    best
}

#[derive(Debug, Clone, Deserialize)]
pub struct Photo {
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub sizes: Vec<ImageVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    #[serde(rename = "type", default)]
    pub type_code: i64,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub date: i64,
}

#[derive(Debug, Clone)]
pub struct Video {
    pub title: String,
    pub first_frame: Option<Vec<ImageVariant>>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub enum Attachment {
    Photo(Photo),
    Document(Document),
    Video(Video),
    /// Any kind the archiver does not save (audio, stickers, links, ...).
    Unknown(String),
}

#[derive(Deserialize)]
struct RawAttachment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    body: Map<String, Value>,
}

impl<'de> Deserialize<'de> for Attachment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let RawAttachment { kind, mut body } = RawAttachment::deserialize(deserializer)?;
        let Some(payload) = body.remove(&kind) else {
            return Ok(Attachment::Unknown(kind));
        };
        let attachment = match kind.as_str() {
            "photo" => Attachment::Photo(
                serde_json::from_value(payload).map_err(serde::de::Error::custom)?,
            ),
            "doc" => Attachment::Document(
                serde_json::from_value(payload).map_err(serde::de::Error::custom)?,
            ),
            "video" => {
                let title = payload
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let first_frame = match payload.get("first_frame") {
                    Some(frames) => Some(
                        Vec::<ImageVariant>::deserialize(frames)
                            .map_err(serde::de::Error::custom)?,
                    ),
                    None => None,
                };
                Attachment::Video(Video {
                    title,
                    first_frame,
                    raw: payload,
                })
            }
            _ => Attachment::Unknown(kind),
        };
        Ok(attachment)
    }
}

/// Messaging domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::media::MediaObject;

/// Direction of a message relative to the owner's number
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageDirection {
    Inbound,
    Outbound,
    #[serde(other)]
    Unknown,
}

/// Delivery state reported by the backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageState {
    Queued,
    Sent,
    Delivered,
    Undelivered,
    Failed,
    Received,
    #[serde(other)]
    Unknown,
}

/// An SMS or MMS message with its sealed fields already opened
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneMessage {
    pub id: String,
    pub owner: String,
    pub conversation: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub local: String,
    pub remote: String,
    pub body: String,
    pub direction: MessageDirection,
    pub state: MessageState,
    pub media: Vec<MediaObject>,
}

impl PhoneMessage {
    pub fn is_mms(&self) -> bool {
        !self.media.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationType {
    Individual,
    Group,
    #[serde(other)]
    Unknown,
}

/// A conversation between an owned number and one or more participants.
///
/// The id is the value carried in [`PhoneMessage::conversation`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneMessageConversation {
    pub id: String,
    pub owner: String,
    pub conversation_type: ConversationType,
    pub latest_message_id: String,
    pub latest_phone_message: Option<PhoneMessage>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Sort newest first, the order every message listing is returned in
pub fn sort_newest_first(messages: &mut [PhoneMessage]) {
    messages.sort_by(|a, b| b.created.cmp(&a.created));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: &str, created_ms: i64) -> PhoneMessage {
        let created = Utc.timestamp_millis_opt(created_ms).unwrap();
        PhoneMessage {
            id: id.to_string(),
            owner: "owner".to_string(),
            conversation: "tl-cnv-1".to_string(),
            created,
            updated: created,
            local: "+14155550100".to_string(),
            remote: "+14155550199".to_string(),
            body: "hi".to_string(),
            direction: MessageDirection::Outbound,
            state: MessageState::Sent,
            media: vec![],
        }
    }

    #[test]
    fn test_sort_newest_first() {
        let mut messages = vec![message("a", 1_000), message("c", 3_000), message("b", 2_000)];
        sort_newest_first(&mut messages);
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_direction_from_wire() {
        let direction: MessageDirection = serde_json::from_str("\"INBOUND\"").unwrap();
        assert_eq!(direction, MessageDirection::Inbound);
        let state: MessageState = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(state, MessageState::Unknown);
    }
}

/// Call record domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::media::MediaObject;

/// Direction of a call relative to the owner's number
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallDirection {
    Inbound,
    Outbound,
    #[serde(other)]
    Unknown,
}

/// Lifecycle of a call
///
/// - `Authorized`: outbound call authorized but not yet placed with the vendor
/// - `Queued`: queued before ringing
/// - `Ringing`
/// - `Answered`: answered and ongoing
/// - `Completed`: ended after being answered
/// - `Unanswered`: failed or was not answered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallRecordState {
    Authorized,
    Queued,
    Ringing,
    Answered,
    Completed,
    Unanswered,
    #[serde(other)]
    Unknown,
}

impl CallRecordState {
    /// Whether the call has finished, one way or another
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Unanswered)
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Authorized => "AUTHORIZED",
            Self::Queued => "QUEUED",
            Self::Ringing => "RINGING",
            Self::Answered => "ANSWERED",
            Self::Completed => "COMPLETED",
            Self::Unanswered => "UNANSWERED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Voicemail left on a call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoicemailData {
    pub id: String,
    pub duration_seconds: i32,
    pub media: MediaObject,
}

/// A call made to or from an owned number
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRecord {
    pub id: String,
    pub owner: String,
    pub sudo_owner: String,
    pub phone_number_id: String,
    pub direction: CallDirection,
    pub state: CallRecordState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub local_phone_number: String,
    pub remote_phone_number: String,
    pub duration_seconds: i32,
    pub voicemail: Option<VoicemailData>,
}

impl CallRecord {
    pub fn has_voicemail(&self) -> bool {
        self.voicemail.is_some()
    }
}

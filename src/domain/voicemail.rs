/// Voicemail domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::media::MediaObject;

/// A voicemail recording left for an owned number
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Voicemail {
    pub id: String,
    pub owner: String,
    pub sudo_owner: String,
    pub phone_number_id: String,
    pub call_record_id: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub local_phone_number: String,
    pub remote_phone_number: String,
    pub duration_seconds: i32,
    pub media: MediaObject,
}

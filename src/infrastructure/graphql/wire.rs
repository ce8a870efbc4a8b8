/// Response payloads as returned by the telephony API
///
/// Sealed fields are kept as their base64 transport encoding; opening them is
/// the application layer's job.
use serde::Deserialize;

use crate::domain::call_record::{CallDirection, CallRecordState};
use crate::domain::message::{ConversationType, MessageDirection, MessageState};
use crate::domain::phone_number::{PhoneNumberState, SearchState};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WireSupportedCountries {
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct WireGps {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireSearchResult {
    pub id: String,
    pub country: String,
    #[serde(default)]
    pub gps: Option<WireGps>,
    #[serde(default)]
    pub prefix: Option<String>,
    pub state: SearchState,
    #[serde(default)]
    pub results: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WirePhoneNumber {
    pub id: String,
    pub phone_number: String,
    #[serde(default)]
    pub country: Option<String>,
    pub state: PhoneNumberState,
    pub version: f64,
    pub created_at_epoch_ms: f64,
    pub updated_at_epoch_ms: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WirePublicKey {
    pub id: String,
    pub key_id: String,
    pub key_ring_id: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WireMedia {
    pub key: String,
    pub bucket: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireSealedMessage {
    pub id: String,
    pub owner: String,
    pub conversation: String,
    #[serde(default)]
    pub phone_number_id: Option<String>,
    pub remote_phone_number: String,
    pub local_phone_number: String,
    #[serde(default)]
    pub body: Option<String>,
    pub direction: MessageDirection,
    pub state: MessageState,
    #[serde(default)]
    pub media: Option<Vec<WireMedia>>,
    #[serde(default)]
    pub key_id: Option<String>,
    pub created_at_epoch_ms: f64,
    pub updated_at_epoch_ms: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireConversation {
    pub id: String,
    pub owner: String,
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    #[serde(default)]
    pub last_message: Option<String>,
    pub created_at_epoch_ms: f64,
    pub updated_at_epoch_ms: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireSealedVoicemailData {
    pub duration_seconds: String,
    pub media: WireMedia,
}

/// Per-key sealed copy of a call record's sensitive fields
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireCallRecordSealedData {
    pub key_id: String,
    #[serde(default)]
    pub algorithm: Option<String>,
    pub local_phone_number: String,
    pub remote_phone_number: String,
    pub duration_seconds: String,
    #[serde(default)]
    pub voicemail: Option<WireSealedVoicemailData>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireSealedCallRecord {
    pub id: String,
    pub owner: String,
    pub sudo_owner: String,
    pub phone_number_id: String,
    pub direction: CallDirection,
    pub state: CallRecordState,
    #[serde(default)]
    pub voicemail_id: Option<String>,
    pub created_at_epoch_ms: f64,
    pub updated_at_epoch_ms: f64,
    #[serde(default)]
    pub sealed: Vec<WireCallRecordSealedData>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireVoicemailSealedData {
    pub key_id: String,
    #[serde(default)]
    pub algorithm: Option<String>,
    pub local_phone_number: String,
    pub remote_phone_number: String,
    pub duration_seconds: String,
    pub media: WireMedia,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireSealedVoicemail {
    pub id: String,
    pub owner: String,
    pub sudo_owner: String,
    pub phone_number_id: String,
    #[serde(default)]
    pub call_record_id: Option<String>,
    pub created_at_epoch_ms: f64,
    pub updated_at_epoch_ms: f64,
    #[serde(default)]
    pub sealed: Vec<WireVoicemailSealedData>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireVendorAuthorization {
    pub vendor: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireVoiceCall {
    #[serde(default)]
    pub vendor_authorization: Option<WireVendorAuthorization>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireDeviceRegistration {
    #[serde(default)]
    pub vendor_authorizations: Vec<WireVendorAuthorization>,
}

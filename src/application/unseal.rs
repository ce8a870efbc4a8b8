/// Wire payload to domain object mapping
///
/// Sealed fields are base64 decoded and opened with the user's key pair.
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::call_record::{CallRecord, VoicemailData};
use crate::domain::keys::TelephonyKeyManager;
use crate::domain::media::MediaObject;
use crate::domain::message::{PhoneMessage, PhoneMessageConversation};
use crate::domain::phone_number::{GeoPoint, PhoneNumber, PhoneNumberSearchResult};
use crate::domain::shared::{Result, TelephonyError};
use crate::domain::voicemail::Voicemail;
use crate::infrastructure::crypto::sealed::{decode_field, duration_from_bytes};
use crate::infrastructure::graphql::wire::{
    WireConversation, WireMedia, WirePhoneNumber, WireSealedCallRecord, WireSealedMessage,
    WireSealedVoicemail, WireSearchResult,
};
use crate::infrastructure::metrics::record_decrypt_failure;

pub fn timestamp(epoch_ms: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(epoch_ms as i64).unwrap_or_default()
}

pub fn media(wire: &WireMedia) -> MediaObject {
    MediaObject::new(&wire.key, &wire.bucket, &wire.region)
}

pub fn phone_number(wire: WirePhoneNumber) -> PhoneNumber {
    PhoneNumber {
        id: wire.id,
        phone_number: wire.phone_number,
        state: wire.state,
        version: wire.version as i64,
        created: timestamp(wire.created_at_epoch_ms),
        updated: timestamp(wire.updated_at_epoch_ms),
    }
}

pub fn search_result(wire: WireSearchResult) -> PhoneNumberSearchResult {
    PhoneNumberSearchResult {
        id: wire.id,
        numbers: wire.results.unwrap_or_default(),
        country_code: wire.country,
        gps: wire.gps.map(|gps| GeoPoint {
            latitude: gps.latitude,
            longitude: gps.longitude,
        }),
        prefix: wire.prefix,
        state: wire.state,
    }
}

fn open_bytes(keys: &dyn TelephonyKeyManager, record: &str, encoded: &str) -> Result<Vec<u8>> {
    let sealed = decode_field(encoded)?;
    keys.decrypt_sealed_data(&sealed).map_err(|e| {
        record_decrypt_failure(record);
        warn!("Failed to open sealed {} field: {}", record, e);
        e
    })
}

fn open_text(keys: &dyn TelephonyKeyManager, record: &str, encoded: &str) -> Result<String> {
    let plain = open_bytes(keys, record, encoded)?;
    String::from_utf8(plain)
        .map_err(|e| TelephonyError::DecryptSealedData(format!("{} is not utf-8: {}", record, e)))
}

fn open_duration(keys: &dyn TelephonyKeyManager, record: &str, encoded: &str) -> Result<i32> {
    duration_from_bytes(&open_bytes(keys, record, encoded)?)
}

fn current_key_id(keys: &dyn TelephonyKeyManager) -> Result<String> {
    keys.key_id()?
        .ok_or_else(|| TelephonyError::DecryptSealedData("no key pair has been generated".into()))
}

pub fn message(wire: WireSealedMessage, keys: &dyn TelephonyKeyManager) -> Result<PhoneMessage> {
    let body = match wire.body.as_deref() {
        Some(sealed) => open_text(keys, "message", sealed)?,
        None => String::new(),
    };
    let remote = open_text(keys, "message", &wire.remote_phone_number)?;
    let local = open_text(keys, "message", &wire.local_phone_number)?;

    Ok(PhoneMessage {
        id: wire.id,
        owner: wire.owner,
        conversation: wire.conversation,
        created: timestamp(wire.created_at_epoch_ms),
        updated: timestamp(wire.updated_at_epoch_ms),
        local,
        remote,
        body,
        direction: wire.direction,
        state: wire.state,
        media: wire.media.iter().flatten().map(media).collect(),
    })
}

pub fn conversation(
    wire: WireConversation,
    latest: Option<PhoneMessage>,
) -> PhoneMessageConversation {
    PhoneMessageConversation {
        id: wire.id,
        owner: wire.owner,
        conversation_type: wire.conversation_type,
        latest_message_id: wire.last_message.unwrap_or_default(),
        latest_phone_message: latest,
        created: timestamp(wire.created_at_epoch_ms),
        updated: timestamp(wire.updated_at_epoch_ms),
    }
}

/// Open the copy of a call record sealed for the current key
pub fn call_record(wire: WireSealedCallRecord, keys: &dyn TelephonyKeyManager) -> Result<CallRecord> {
    let key_id = current_key_id(keys)?;
    let sealed = wire
        .sealed
        .iter()
        .find(|s| s.key_id == key_id)
        .ok_or_else(|| {
            record_decrypt_failure("call_record");
            TelephonyError::DecryptSealedData(format!(
                "call record {} has no data sealed for key {}",
                wire.id, key_id
            ))
        })?;

    let voicemail = match (&sealed.voicemail, &wire.voicemail_id) {
        (Some(data), Some(id)) => Some(VoicemailData {
            id: id.clone(),
            duration_seconds: open_duration(keys, "call_record", &data.duration_seconds)?,
            media: media(&data.media),
        }),
        _ => None,
    };

    Ok(CallRecord {
        local_phone_number: open_text(keys, "call_record", &sealed.local_phone_number)?,
        remote_phone_number: open_text(keys, "call_record", &sealed.remote_phone_number)?,
        duration_seconds: open_duration(keys, "call_record", &sealed.duration_seconds)?,
        voicemail,
        id: wire.id,
        owner: wire.owner,
        sudo_owner: wire.sudo_owner,
        phone_number_id: wire.phone_number_id,
        direction: wire.direction,
        state: wire.state,
        created: timestamp(wire.created_at_epoch_ms),
        updated: timestamp(wire.updated_at_epoch_ms),
    })
}

pub fn voicemail(wire: WireSealedVoicemail, keys: &dyn TelephonyKeyManager) -> Result<Voicemail> {
    let key_id = current_key_id(keys)?;
    let sealed = wire
        .sealed
        .iter()
        .find(|s| s.key_id == key_id)
        .ok_or_else(|| {
            record_decrypt_failure("voicemail");
            TelephonyError::DecryptSealedData(format!(
                "voicemail {} has no data sealed for key {}",
                wire.id, key_id
            ))
        })?;

    Ok(Voicemail {
        local_phone_number: open_text(keys, "voicemail", &sealed.local_phone_number)?,
        remote_phone_number: open_text(keys, "voicemail", &sealed.remote_phone_number)?,
        duration_seconds: open_duration(keys, "voicemail", &sealed.duration_seconds)?,
        media: media(&sealed.media),
        id: wire.id,
        owner: wire.owner,
        sudo_owner: wire.sudo_owner,
        phone_number_id: wire.phone_number_id,
        call_record_id: wire.call_record_id,
        created: timestamp(wire.created_at_epoch_ms),
        updated: timestamp(wire.updated_at_epoch_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call_record::{CallDirection, CallRecordState};
    use crate::domain::keys::MockTelephonyKeyManager;
    use crate::domain::message::{MessageDirection, MessageState};
    use crate::infrastructure::graphql::wire::WireCallRecordSealedData;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    /// Key manager whose "sealing" is the identity function
    fn passthrough_keys(key_id: &'static str) -> MockTelephonyKeyManager {
        let mut keys = MockTelephonyKeyManager::new();
        keys.expect_key_id()
            .returning(move || Ok(Some(key_id.to_string())));
        keys.expect_decrypt_sealed_data()
            .returning(|data| Ok(data.to_vec()));
        keys
    }

    fn b64(value: &[u8]) -> String {
        STANDARD.encode(value)
    }

    #[test]
    fn test_timestamp_from_epoch_ms() {
        let ts = timestamp(1_600_000_000_123.0);
        assert_eq!(ts.timestamp_millis(), 1_600_000_000_123);
    }

    #[test]
    fn test_message_opens_sealed_fields() {
        let keys = passthrough_keys("k1");
        let wire = WireSealedMessage {
            id: "m-1".into(),
            owner: "owner".into(),
            conversation: "tl-cnv-1".into(),
            phone_number_id: None,
            remote_phone_number: b64(b"+14155550199"),
            local_phone_number: b64(b"+14155550100"),
            body: None,
            direction: MessageDirection::Outbound,
            state: MessageState::Sent,
            media: Some(vec![WireMedia {
                key: "id/telephony/media/1.png".into(),
                bucket: "media".into(),
                region: "us-east-1".into(),
            }]),
            key_id: Some("k1".into()),
            created_at_epoch_ms: 1.0,
            updated_at_epoch_ms: 2.0,
        };

        let message = message(wire, &keys).unwrap();
        assert_eq!(message.remote, "+14155550199");
        assert_eq!(message.local, "+14155550100");
        assert_eq!(message.body, "");
        assert!(message.is_mms());
    }

    fn sealed_record(key_id: &str) -> WireCallRecordSealedData {
        WireCallRecordSealedData {
            key_id: key_id.into(),
            algorithm: None,
            local_phone_number: b64(b"+14155550100"),
            remote_phone_number: b64(b"+14155550199"),
            duration_seconds: b64(&42i32.to_be_bytes()),
            voicemail: None,
        }
    }

    fn wire_record(sealed: Vec<WireCallRecordSealedData>) -> WireSealedCallRecord {
        WireSealedCallRecord {
            id: "cr-1".into(),
            owner: "owner".into(),
            sudo_owner: "sudo".into(),
            phone_number_id: "pn-1".into(),
            direction: CallDirection::Outbound,
            state: CallRecordState::Completed,
            voicemail_id: None,
            created_at_epoch_ms: 1.0,
            updated_at_epoch_ms: 2.0,
            sealed,
        }
    }

    #[test]
    fn test_call_record_picks_entry_for_current_key() {
        let keys = passthrough_keys("k2");
        let mut other = sealed_record("k1");
        other.duration_seconds = b64(&7i32.to_be_bytes());

        let record = call_record(wire_record(vec![other, sealed_record("k2")]), &keys).unwrap();
        assert_eq!(record.duration_seconds, 42);
        assert_eq!(record.remote_phone_number, "+14155550199");
        assert!(!record.has_voicemail());
    }

    #[test]
    fn test_call_record_without_matching_key_fails() {
        let keys = passthrough_keys("k9");
        let err = call_record(wire_record(vec![sealed_record("k1")]), &keys).unwrap_err();
        assert!(matches!(err, TelephonyError::DecryptSealedData(_)));
    }
}

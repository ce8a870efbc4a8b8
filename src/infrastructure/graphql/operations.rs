/// Telephony GraphQL documents
///
/// Each constructor returns a ready to send [`GraphQlOperation`]; the root
/// field names the responses are read from are exported as `FIELD_*`.
use serde_json::{json, Value};

use super::client::GraphQlOperation;
use crate::domain::call_record::CallRecordState;
use crate::domain::media::MediaObject;

pub const FIELD_SUPPORTED_COUNTRIES: &str = "getSupportedCountries";
pub const FIELD_SEARCH_PHONE_NUMBERS: &str = "searchPhoneNumbers";
pub const FIELD_PHONE_NUMBER_SEARCH: &str = "phoneNumberSearch";
pub const FIELD_PROVISION_PHONE_NUMBER: &str = "provisionPhoneNumber";
pub const FIELD_DEPROVISION_PHONE_NUMBER: &str = "deprovisionPhoneNumber";
pub const FIELD_LIST_PHONE_NUMBERS: &str = "listPhoneNumbers";
pub const FIELD_GET_PHONE_NUMBER: &str = "getPhoneNumber";
pub const FIELD_CREATE_PUBLIC_KEY: &str = "createPublicKeyForTelephony";
pub const FIELD_SEND_MESSAGE: &str = "sendMessage";
pub const FIELD_GET_MESSAGE: &str = "getMessage";
pub const FIELD_LIST_MESSAGES: &str = "listMessages";
pub const FIELD_DELETE_MESSAGE: &str = "deleteMessage";
pub const FIELD_ON_MESSAGE: &str = "OnMessage";
pub const FIELD_GET_CONVERSATION: &str = "getConversation";
pub const FIELD_LIST_CONVERSATIONS: &str = "listConversations";
pub const FIELD_CREATE_VOICE_CALL: &str = "createVoiceCall";
pub const FIELD_GET_CALL_RECORD: &str = "getCallRecord";
pub const FIELD_LIST_CALL_RECORDS: &str = "listCallRecords";
pub const FIELD_DELETE_CALL_RECORD: &str = "deleteCallRecord";
pub const FIELD_ON_CALL_RECORD: &str = "OnCallRecord";
pub const FIELD_REGISTER_DEVICE: &str = "registerDeviceForIncomingCalls";
pub const FIELD_UNREGISTER_DEVICE: &str = "unregisterDeviceForIncomingCalls";
pub const FIELD_GET_VOICEMAIL: &str = "getVoicemail";
pub const FIELD_LIST_VOICEMAILS: &str = "listVoicemails";
pub const FIELD_DELETE_VOICEMAIL: &str = "deleteVoicemail";
pub const FIELD_ON_VOICEMAIL: &str = "OnVoicemail";

/// Push service devices register with for incoming calls
pub const PUSH_NOTIFICATION_SERVICE: &str = "FCM";

const PHONE_NUMBER_FRAGMENT: &str = r#"
fragment PhoneNumber on PhoneNumber {
  id
  phoneNumber
  country
  state
  version
  createdAtEpochMs
  updatedAtEpochMs
}"#;

const SEARCH_RESULT_FRAGMENT: &str = r#"
fragment AvailablePhoneNumberResult on AvailablePhoneNumberResult {
  id
  country
  gps { latitude longitude }
  prefix
  state
  results
}"#;

const MEDIA_FRAGMENT: &str = r#"
fragment S3MediaObject on S3MediaObject {
  key
  bucket
  region
}"#;

const SEALED_MESSAGE_FRAGMENT: &str = r#"
fragment SealedMessage on SealedMessage {
  id
  owner
  conversation
  phoneNumberId
  remotePhoneNumber
  localPhoneNumber
  body
  direction
  state
  media { ...S3MediaObject }
  keyId
  algorithm
  createdAtEpochMs
  updatedAtEpochMs
}"#;

const CONVERSATION_FRAGMENT: &str = r#"
fragment Conversation on Conversation {
  id
  owner
  type
  lastMessage
  createdAtEpochMs
  updatedAtEpochMs
}"#;

const SEALED_CALL_RECORD_FRAGMENT: &str = r#"
fragment SealedCallRecord on SealedCallRecord {
  id
  owner
  sudoOwner
  phoneNumberId
  direction
  state
  voicemailId
  createdAtEpochMs
  updatedAtEpochMs
  sealed {
    keyId
    algorithm
    localPhoneNumber
    remotePhoneNumber
    durationSeconds
    voicemail {
      durationSeconds
      media { ...S3MediaObject }
    }
  }
}"#;

const SEALED_VOICEMAIL_FRAGMENT: &str = r#"
fragment SealedVoicemail on SealedVoicemail {
  id
  owner
  sudoOwner
  phoneNumberId
  callRecordId
  createdAtEpochMs
  updatedAtEpochMs
  sealed {
    keyId
    algorithm
    localPhoneNumber
    remotePhoneNumber
    durationSeconds
    media { ...S3MediaObject }
  }
}"#;

const PUBLIC_KEY_FRAGMENT: &str = r#"
fragment PublicKey on PublicKey {
  id
  keyId
  keyRingId
  algorithm
  publicKey
  owner
  version
  createdAtEpochMs
  updatedAtEpochMs
}"#;

fn document(body: &str, fragments: &[&str]) -> String {
    let mut doc = body.trim().to_string();
    for fragment in fragments {
        doc.push_str(fragment);
    }
    doc
}

fn id_filter(value: &str) -> Value {
    json!({ "eq": value })
}

pub fn supported_countries() -> GraphQlOperation {
    GraphQlOperation::new(
        "GetSupportedCountries",
        document(
            "query GetSupportedCountries { getSupportedCountries { countries } }",
            &[],
        ),
        json!({}),
    )
}

const SEARCH_MUTATION: &str = r#"
mutation SearchPhoneNumbers($input: SearchPhoneNumbersInput!) {
  searchPhoneNumbers(input: $input) { ...AvailablePhoneNumberResult }
}"#;

pub fn search_by_country(country: &str, limit: u32) -> GraphQlOperation {
    GraphQlOperation::new(
        "SearchPhoneNumbers",
        document(SEARCH_MUTATION, &[SEARCH_RESULT_FRAGMENT]),
        json!({ "input": { "country": country, "limit": limit } }),
    )
}

pub fn search_by_prefix(country: &str, prefix: &str, limit: u32) -> GraphQlOperation {
    GraphQlOperation::new(
        "SearchPhoneNumbers",
        document(SEARCH_MUTATION, &[SEARCH_RESULT_FRAGMENT]),
        json!({ "input": { "country": country, "prefix": prefix, "limit": limit } }),
    )
}

pub fn search_by_gps(country: &str, latitude: f64, longitude: f64, limit: u32) -> GraphQlOperation {
    GraphQlOperation::new(
        "SearchPhoneNumbers",
        document(SEARCH_MUTATION, &[SEARCH_RESULT_FRAGMENT]),
        json!({
            "input": {
                "country": country,
                "gps": { "latitude": latitude, "longitude": longitude },
                "limit": limit,
            }
        }),
    )
}

pub fn phone_number_search(search_id: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "PhoneNumberSearch",
        document(
            "query PhoneNumberSearch($id: ID!) { phoneNumberSearch(id: $id) { ...AvailablePhoneNumberResult } }",
            &[SEARCH_RESULT_FRAGMENT],
        ),
        json!({ "id": search_id }),
    )
}

pub fn provision_phone_number(
    country: &str,
    phone_number: &str,
    ownership_proof: &str,
    key_ring_id: &str,
) -> GraphQlOperation {
    GraphQlOperation::new(
        "ProvisionPhoneNumber",
        document(
            "mutation ProvisionPhoneNumber($input: ProvisionPhoneNumberInput!) { provisionPhoneNumber(input: $input) { ...PhoneNumber } }",
            &[PHONE_NUMBER_FRAGMENT],
        ),
        json!({
            "input": {
                "country": country,
                "phoneNumber": phone_number,
                "ownerProofs": [ownership_proof],
                "keyRingId": key_ring_id,
            }
        }),
    )
}

pub fn deprovision_phone_number(phone_number: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "DeprovisionPhoneNumber",
        document(
            "mutation DeprovisionPhoneNumber($input: DeprovisionPhoneNumberInput!) { deprovisionPhoneNumber(input: $input) { ...PhoneNumber } }",
            &[PHONE_NUMBER_FRAGMENT],
        ),
        json!({ "input": { "phoneNumber": phone_number } }),
    )
}

pub fn list_phone_numbers(
    sudo_id: Option<&str>,
    limit: Option<u32>,
    next_token: Option<&str>,
) -> GraphQlOperation {
    let filter = sudo_id.map(|id| json!({ "sudoOwner": id_filter(id) }));
    GraphQlOperation::new(
        "ListPhoneNumbers",
        document(
            "query ListPhoneNumbers($filter: PhoneNumberFilterInput, $limit: Int, $nextToken: String) { listPhoneNumbers(filter: $filter, limit: $limit, nextToken: $nextToken) { items { ...PhoneNumber } nextToken } }",
            &[PHONE_NUMBER_FRAGMENT],
        ),
        json!({ "filter": filter, "limit": limit, "nextToken": next_token }),
    )
}

pub fn get_phone_number(id: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "GetPhoneNumber",
        document(
            "query GetPhoneNumber($id: ID!) { getPhoneNumber(id: $id) { ...PhoneNumber } }",
            &[PHONE_NUMBER_FRAGMENT],
        ),
        json!({ "id": id }),
    )
}

pub fn create_public_key(
    key_id: &str,
    key_ring_id: &str,
    public_key: &str,
    algorithm: &str,
) -> GraphQlOperation {
    GraphQlOperation::new(
        "CreatePublicKeyForTelephony",
        document(
            "mutation CreatePublicKeyForTelephony($input: CreatePublicKeyInput!) { createPublicKeyForTelephony(input: $input) { ...PublicKey } }",
            &[PUBLIC_KEY_FRAGMENT],
        ),
        json!({
            "input": {
                "keyId": key_id,
                "keyRingId": key_ring_id,
                "publicKey": public_key,
                "algorithm": algorithm,
            }
        }),
    )
}

pub fn send_message(from: &str, to: &str, body: &str, media: &[MediaObject]) -> GraphQlOperation {
    let mut input = json!({ "from": from, "to": to, "body": body });
    if !media.is_empty() {
        input["media"] = media
            .iter()
            .map(|m| json!({ "key": m.key, "bucket": m.bucket, "region": m.region }))
            .collect();
    }
    GraphQlOperation::new(
        "SendMessage",
        document(
            "mutation SendMessage($input: SendMessageInput!) { sendMessage(input: $input) }",
            &[],
        ),
        json!({ "input": input }),
    )
}

pub fn get_message(id: &str, key_id: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "GetMessage",
        document(
            "query GetMessage($id: ID!, $keyId: String!) { getMessage(id: $id, keyId: $keyId) { ...SealedMessage } }",
            &[SEALED_MESSAGE_FRAGMENT, MEDIA_FRAGMENT],
        ),
        json!({ "id": id, "keyId": key_id }),
    )
}

pub fn list_messages(
    conversation_id: &str,
    key_id: &str,
    limit: Option<u32>,
    next_token: Option<&str>,
) -> GraphQlOperation {
    GraphQlOperation::new(
        "ListMessages",
        document(
            "query ListMessages($filter: MessageFilterInput, $limit: Int, $nextToken: String) { listMessages(filter: $filter, limit: $limit, nextToken: $nextToken) { items { ...SealedMessage } nextToken } }",
            &[SEALED_MESSAGE_FRAGMENT, MEDIA_FRAGMENT],
        ),
        json!({
            "filter": {
                "conversation": id_filter(conversation_id),
                "keyId": id_filter(key_id),
            },
            "limit": limit,
            "nextToken": next_token,
        }),
    )
}

pub fn delete_message(id: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "DeleteMessage",
        document(
            "mutation DeleteMessage($id: ID!) { deleteMessage(id: $id) }",
            &[],
        ),
        json!({ "id": id }),
    )
}

pub fn on_message(owner: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "OnMessageReceived",
        document(
            "subscription OnMessageReceived($owner: ID!) { OnMessage(owner: $owner) { ...SealedMessage } }",
            &[SEALED_MESSAGE_FRAGMENT, MEDIA_FRAGMENT],
        ),
        json!({ "owner": owner }),
    )
}

pub fn get_conversation(id: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "GetConversation",
        document(
            "query GetConversation($id: ID!) { getConversation(id: $id) { ...Conversation } }",
            &[CONVERSATION_FRAGMENT],
        ),
        json!({ "id": id }),
    )
}

pub fn list_conversations(
    phone_number_id: &str,
    limit: Option<u32>,
    next_token: Option<&str>,
) -> GraphQlOperation {
    GraphQlOperation::new(
        "ListConversations",
        document(
            "query ListConversations($filter: ConversationFilterInput, $limit: Int, $nextToken: String) { listConversations(filter: $filter, limit: $limit, nextToken: $nextToken) { items { ...Conversation } nextToken } }",
            &[CONVERSATION_FRAGMENT],
        ),
        json!({
            "filter": { "phoneNumberId": id_filter(phone_number_id) },
            "limit": limit,
            "nextToken": next_token,
        }),
    )
}

pub fn create_voice_call(from: &str, to: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "CreateVoiceCall",
        document(
            "mutation CreateVoiceCall($input: CreateVoiceCallInput!) { createVoiceCall(input: $input) { vendorAuthorization { vendor accessToken } } }",
            &[],
        ),
        json!({ "input": { "from": from, "to": to } }),
    )
}

pub fn get_call_record(id: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "GetCallRecord",
        document(
            "query GetCallRecord($id: ID!) { getCallRecord(id: $id) { ...SealedCallRecord } }",
            &[SEALED_CALL_RECORD_FRAGMENT, MEDIA_FRAGMENT],
        ),
        json!({ "id": id }),
    )
}

/// Lists the finished calls of a number
pub fn list_call_records(
    phone_number_id: &str,
    limit: Option<u32>,
    next_token: Option<&str>,
) -> GraphQlOperation {
    let states: Vec<&str> = [CallRecordState::Completed, CallRecordState::Unanswered]
        .iter()
        .map(CallRecordState::as_wire)
        .collect();
    GraphQlOperation::new(
        "ListCallRecords",
        document(
            "query ListCallRecords($key: CallRecordKeyInput!, $filter: CallRecordFilterInput, $limit: Int, $nextToken: String) { listCallRecords(key: $key, filter: $filter, limit: $limit, nextToken: $nextToken) { items { ...SealedCallRecord } nextToken } }",
            &[SEALED_CALL_RECORD_FRAGMENT, MEDIA_FRAGMENT],
        ),
        json!({
            "key": { "phoneNumberId": phone_number_id },
            "filter": { "state": { "in": states } },
            "limit": limit,
            "nextToken": next_token,
        }),
    )
}

pub fn delete_call_record(id: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "DeleteCallRecord",
        document(
            "mutation DeleteCallRecord($id: ID!) { deleteCallRecord(id: $id) }",
            &[],
        ),
        json!({ "id": id }),
    )
}

pub fn on_call_record(owner: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "OnCallRecord",
        document(
            "subscription OnCallRecord($owner: ID!) { OnCallRecord(owner: $owner) { ...SealedCallRecord } }",
            &[SEALED_CALL_RECORD_FRAGMENT, MEDIA_FRAGMENT],
        ),
        json!({ "owner": owner }),
    )
}

pub fn register_device_for_incoming_calls() -> GraphQlOperation {
    GraphQlOperation::new(
        "RegisterDeviceForIncomingCalls",
        document(
            "mutation RegisterDeviceForIncomingCalls($input: DeviceRegistrationInput!) { registerDeviceForIncomingCalls(input: $input) { vendorAuthorizations { vendor accessToken } } }",
            &[],
        ),
        json!({ "input": { "pushNotificationService": PUSH_NOTIFICATION_SERVICE } }),
    )
}

pub fn unregister_device_for_incoming_calls() -> GraphQlOperation {
    GraphQlOperation::new(
        "UnregisterDeviceForIncomingCalls",
        document(
            "mutation UnregisterDeviceForIncomingCalls($input: DeviceRegistrationInput!) { unregisterDeviceForIncomingCalls(input: $input) { vendorAuthorizations { vendor accessToken } } }",
            &[],
        ),
        json!({ "input": { "pushNotificationService": PUSH_NOTIFICATION_SERVICE } }),
    )
}

pub fn get_voicemail(id: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "GetVoicemail",
        document(
            "query GetVoicemail($id: ID!) { getVoicemail(id: $id) { ...SealedVoicemail } }",
            &[SEALED_VOICEMAIL_FRAGMENT, MEDIA_FRAGMENT],
        ),
        json!({ "id": id }),
    )
}

pub fn list_voicemails(
    phone_number_id: &str,
    limit: Option<u32>,
    next_token: Option<&str>,
) -> GraphQlOperation {
    GraphQlOperation::new(
        "ListVoicemails",
        document(
            "query ListVoicemails($key: VoicemailKeyInput!, $limit: Int, $nextToken: String) { listVoicemails(key: $key, limit: $limit, nextToken: $nextToken) { items { ...SealedVoicemail } nextToken } }",
            &[SEALED_VOICEMAIL_FRAGMENT, MEDIA_FRAGMENT],
        ),
        json!({
            "key": { "phoneNumberId": phone_number_id },
            "limit": limit,
            "nextToken": next_token,
        }),
    )
}

pub fn delete_voicemail(id: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "DeleteVoicemail",
        document(
            "mutation DeleteVoicemail($id: ID!) { deleteVoicemail(id: $id) }",
            &[],
        ),
        json!({ "id": id }),
    )
}

pub fn on_voicemail(owner: &str) -> GraphQlOperation {
    GraphQlOperation::new(
        "OnVoicemail",
        document(
            "subscription OnVoicemail($owner: ID!) { OnVoicemail(owner: $owner) { ...SealedVoicemail } }",
            &[SEALED_VOICEMAIL_FRAGMENT, MEDIA_FRAGMENT],
        ),
        json!({ "owner": owner }),
    )
}

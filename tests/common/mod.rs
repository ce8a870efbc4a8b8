//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;

use telephony_sdk::config::Config;
use telephony_sdk::domain::call_record::CallRecord;
use telephony_sdk::domain::keys::TelephonyKeyManager;
use telephony_sdk::domain::message::PhoneMessage;
use telephony_sdk::domain::phone_number::{PhoneNumber, PhoneNumberState};
use telephony_sdk::domain::subscriber::{
    CallRecordSubscriber, ConnectionState, PhoneMessageSubscriber, TelephonySubscriber,
    VoicemailSubscriber,
};
use telephony_sdk::domain::voicemail::Voicemail;
use telephony_sdk::infrastructure::crypto::sealed;
use telephony_sdk::infrastructure::graphql::{
    GraphQlClient, GraphQlOperation, GraphQlResponse, GraphQlSubscription, SubscriptionEvent,
    SubscriptionHandle,
};
use telephony_sdk::infrastructure::session::{StaticOwnershipProofIssuer, StaticUserSession};
use telephony_sdk::infrastructure::storage::ObjectStore;
use telephony_sdk::{Result, TelephonyClient, TelephonyClientBuilder, TelephonyError};

pub const OWNER: &str = "owner-subject";
pub const IDENTITY: &str = "us-east-1:identity";
pub const KEY_ID: &str = "test-key-id";
pub const KEY_RING_ID: &str = "test-key-ring";
pub const LOCAL: &str = "+14155550100";
pub const REMOTE: &str = "+14155550199";

// ===== Keys =====

fn test_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("Failed to generate test key")
    })
}

pub fn public_key() -> RsaPublicKey {
    test_key().to_public_key()
}

/// Seal `plain` for the test key and base64 encode it, as the backend does
pub fn seal_field(plain: &[u8]) -> String {
    sealed::encode_field(&sealed::seal(&public_key(), plain).expect("Failed to seal"))
}

pub fn seal_text(plain: &str) -> String {
    seal_field(plain.as_bytes())
}

pub fn seal_duration(seconds: i32) -> String {
    seal_field(&seconds.to_be_bytes())
}

/// Key manager holding a fixed key pair
pub struct TestKeys {
    has_key_pair: AtomicBool,
    pub generated: AtomicUsize,
    pub removed: AtomicBool,
}

impl TestKeys {
    pub fn new() -> Self {
        Self::with_key_pair(true)
    }

    pub fn with_key_pair(has_key_pair: bool) -> Self {
        Self {
            has_key_pair: AtomicBool::new(has_key_pair),
            generated: AtomicUsize::new(0),
            removed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TelephonyKeyManager for TestKeys {
    fn owner(&self) -> Result<String> {
        Ok(OWNER.to_string())
    }

    fn key_id(&self) -> Result<Option<String>> {
        Ok(self
            .has_key_pair
            .load(Ordering::SeqCst)
            .then(|| KEY_ID.to_string()))
    }

    fn key_ring_id(&self) -> Result<Option<String>> {
        Ok(self
            .has_key_pair
            .load(Ordering::SeqCst)
            .then(|| KEY_RING_ID.to_string()))
    }

    fn has_key_pair(&self) -> Result<bool> {
        Ok(self.has_key_pair.load(Ordering::SeqCst))
    }

    async fn generate_key_pair(&self) -> Result<()> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        self.has_key_pair.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn decrypt_sealed_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        sealed::open(test_key(), data)
    }

    fn remove_all_keys(&self) -> Result<()> {
        self.removed.store(true, Ordering::SeqCst);
        self.has_key_pair.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ===== GraphQL =====

#[derive(Clone, Default)]
pub struct FakeHandle {
    pub cancelled: Arc<AtomicBool>,
}

impl SubscriptionHandle for FakeHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

pub struct FakeSubscription {
    pub name: &'static str,
    pub variables: Value,
    pub events: mpsc::Sender<SubscriptionEvent>,
    pub handle: FakeHandle,
}

/// Scripted GraphQL backend.
///
/// Responses are queued per operation name. The last queued response of an
/// operation is repeated for every further call.
#[derive(Default)]
pub struct FakeGraphQl {
    responses: Mutex<HashMap<&'static str, VecDeque<GraphQlResponse>>>,
    executed: Mutex<Vec<GraphQlOperation>>,
    subscriptions: Mutex<Vec<FakeSubscription>>,
    fail_subscribe: AtomicBool,
}

impl FakeGraphQl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, operation: &'static str, data: Value) {
        self.push(operation, GraphQlResponse::from_data(data));
    }

    pub fn push(&self, operation: &'static str, response: GraphQlResponse) {
        self.responses
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(response);
    }

    pub fn fail_subscriptions(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    pub fn executed(&self) -> Vec<GraphQlOperation> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_names(&self) -> Vec<&'static str> {
        self.executed().iter().map(|op| op.name).collect()
    }

    pub fn last(&self, operation: &str) -> GraphQlOperation {
        self.executed()
            .into_iter()
            .rev()
            .find(|op| op.name == operation)
            .unwrap_or_else(|| panic!("{} was never executed", operation))
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn subscription_handle(&self, index: usize) -> FakeHandle {
        self.subscriptions.lock().unwrap()[index].handle.clone()
    }

    pub fn subscription_variables(&self, index: usize) -> Value {
        self.subscriptions.lock().unwrap()[index].variables.clone()
    }

    /// Deliver `event` on the most recent subscription named `operation`
    pub async fn emit(&self, operation: &str, event: SubscriptionEvent) {
        let sender = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.name == operation)
            .map(|s| s.events.clone())
            .unwrap_or_else(|| panic!("no {} subscription", operation));
        sender.send(event).await.expect("Subscription receiver dropped");
    }
}

#[async_trait]
impl GraphQlClient for FakeGraphQl {
    async fn execute(&self, operation: GraphQlOperation) -> Result<GraphQlResponse> {
        let name = operation.name;
        self.executed.lock().unwrap().push(operation);

        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .get_mut(name)
            .ok_or_else(|| TelephonyError::Transport(format!("no scripted response for {}", name)))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| TelephonyError::Transport(format!("no response left for {}", name)))
        }
    }

    async fn subscribe(&self, operation: GraphQlOperation) -> Result<GraphQlSubscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TelephonyError::Transport("realtime endpoint unreachable".into()));
        }
        let (tx, rx) = mpsc::channel(16);
        let handle = FakeHandle::default();
        self.subscriptions.lock().unwrap().push(FakeSubscription {
            name: operation.name,
            variables: operation.variables,
            events: tx,
            handle: handle.clone(),
        });
        Ok(GraphQlSubscription {
            handle: Box::new(handle),
            events: rx,
        })
    }
}

// ===== Storage =====

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), (Bytes, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (body.into(), "application/octet-stream".to_string()),
        );
    }

    /// (bucket, key, content type) of every stored object
    pub fn entries(&self) -> Vec<(String, String, String)> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|((bucket, key), (_, content_type))| {
                (bucket.clone(), key.clone(), content_type.clone())
            })
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (body, content_type.to_string()),
        );
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(body, _)| body.clone())
            .ok_or_else(|| TelephonyError::FileDownload(format!("{}/{} not found", bucket, key)))
    }
}

// ===== Client =====

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.polling.interval_ms = 1;
    config.polling.max_attempts = 5;
    config
}

pub struct Harness {
    pub client: TelephonyClient,
    pub graphql: Arc<FakeGraphQl>,
    pub store: Arc<MemoryObjectStore>,
    pub keys: Arc<TestKeys>,
    pub session: Arc<StaticUserSession>,
}

pub async fn harness() -> Harness {
    harness_with(TestKeys::new(), None).await
}

pub async fn harness_with(
    keys: TestKeys,
    vendor: Option<Arc<dyn telephony_sdk::domain::calling::VoiceCallingVendor>>,
) -> Harness {
    let graphql = FakeGraphQl::new();
    let store = MemoryObjectStore::new();
    let keys = Arc::new(keys);
    let session = Arc::new(StaticUserSession::new("token", OWNER, IDENTITY));

    let mut builder = TelephonyClientBuilder::new()
        .config(test_config())
        .user_session(session.clone())
        .ownership_proof_issuer(Arc::new(StaticOwnershipProofIssuer::new("proof-jwt")))
        .graphql_client(graphql.clone())
        .object_store(store.clone())
        .key_manager(keys.clone());
    if let Some(vendor) = vendor {
        builder = builder.calling_vendor(vendor);
    }
    let client = builder.build().await.expect("Failed to build client");

    Harness {
        client,
        graphql,
        store,
        keys,
        session,
    }
}

pub fn local_number() -> PhoneNumber {
    PhoneNumber {
        id: "pn-1".to_string(),
        phone_number: LOCAL.to_string(),
        state: PhoneNumberState::Complete,
        version: 1,
        created: chrono::Utc::now(),
        updated: chrono::Utc::now(),
    }
}

// ===== Payloads =====

pub fn phone_number_json(id: &str, number: &str, state: &str) -> Value {
    json!({
        "id": id,
        "phoneNumber": number,
        "country": "US",
        "state": state,
        "version": 1,
        "createdAtEpochMs": 1_600_000_000_000.0,
        "updatedAtEpochMs": 1_600_000_000_000.0,
    })
}

pub fn sealed_message_json(id: &str, body: &str, created_ms: f64) -> Value {
    json!({
        "id": id,
        "owner": OWNER,
        "conversation": "tl-cnv-test",
        "remotePhoneNumber": seal_text(REMOTE),
        "localPhoneNumber": seal_text(LOCAL),
        "body": seal_text(body),
        "direction": "OUTBOUND",
        "state": "SENT",
        "media": [],
        "keyId": KEY_ID,
        "createdAtEpochMs": created_ms,
        "updatedAtEpochMs": created_ms,
    })
}

pub fn sealed_call_record_json(id: &str, duration: i32, created_ms: f64) -> Value {
    json!({
        "id": id,
        "owner": OWNER,
        "sudoOwner": "sudo-1",
        "phoneNumberId": "pn-1",
        "direction": "OUTBOUND",
        "state": "COMPLETED",
        "voicemailId": null,
        "createdAtEpochMs": created_ms,
        "updatedAtEpochMs": created_ms,
        "sealed": [{
            "keyId": KEY_ID,
            "algorithm": sealed::SEALING_ALGORITHM,
            "localPhoneNumber": seal_text(LOCAL),
            "remotePhoneNumber": seal_text(REMOTE),
            "durationSeconds": seal_duration(duration),
            "voicemail": null,
        }],
    })
}

pub fn sealed_voicemail_json(id: &str, duration: i32, created_ms: f64) -> Value {
    json!({
        "id": id,
        "owner": OWNER,
        "sudoOwner": "sudo-1",
        "phoneNumberId": "pn-1",
        "callRecordId": "cr-1",
        "createdAtEpochMs": created_ms,
        "updatedAtEpochMs": created_ms,
        "sealed": [{
            "keyId": KEY_ID,
            "algorithm": sealed::SEALING_ALGORITHM,
            "localPhoneNumber": seal_text(LOCAL),
            "remotePhoneNumber": seal_text(REMOTE),
            "durationSeconds": seal_duration(duration),
            "media": { "key": "vm/vm-1.m4a", "bucket": "telephony-media", "region": "us-east-1" },
        }],
    })
}

// ===== Subscribers =====

/// Records everything it is told
#[derive(Default)]
pub struct RecordingSubscriber {
    pub states: Mutex<Vec<ConnectionState>>,
    pub messages: Mutex<Vec<PhoneMessage>>,
    pub call_records: Mutex<Vec<CallRecord>>,
    pub voicemails: Mutex<Vec<Voicemail>>,
}

impl RecordingSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl TelephonySubscriber for RecordingSubscriber {
    fn connection_status_changed(&self, state: ConnectionState) {
        self.states.lock().unwrap().push(state);
    }
}

impl PhoneMessageSubscriber for RecordingSubscriber {
    fn phone_message_received(&self, message: PhoneMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

impl CallRecordSubscriber for RecordingSubscriber {
    fn call_record_received(&self, call_record: CallRecord) {
        self.call_records.lock().unwrap().push(call_record);
    }
}

impl VoicemailSubscriber for RecordingSubscriber {
    fn voicemail_updated(&self, voicemail: Voicemail) {
        self.voicemails.lock().unwrap().push(voicemail);
    }
}

/// Wait up to a second for `condition` to hold
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}

//! Subscription manager
//!
//! Fans notifications from one realtime channel (messages, call records or
//! voicemails) out to any number of named subscribers. The channel itself is
//! opened when the first subscriber arrives and closed when the last leaves.
//!
//! The subscriber map and the watcher slot are only touched under `inner`.
//! Callbacks and `SubscriptionHandle::cancel` always run after the lock is
//! released, so a subscriber may unsubscribe from inside its own callback.

use serde_json::Value;
use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::call_record::CallRecord;
use crate::domain::message::PhoneMessage;
use crate::domain::shared::{Result, TelephonyError};
use crate::domain::subscriber::{ConnectionState, Subscriber};
use crate::domain::voicemail::Voicemail;
use crate::infrastructure::graphql::{
    GraphQlClient, GraphQlOperation, SubscriptionEvent, SubscriptionHandle,
};
use crate::infrastructure::metrics::{record_subscription_event, update_subscribers};

enum WatcherSlot {
    /// No channel and nobody opening one
    Idle,
    /// A caller is opening the channel
    Connecting,
    Active {
        generation: u64,
        handle: Box<dyn SubscriptionHandle>,
    },
}

struct Inner {
    subscribers: HashMap<String, Subscriber>,
    watcher: WatcherSlot,
    generation: u64,
}

impl Inner {
    /// Take the active handle, leaving the slot idle. A pending connect is
    /// left alone; `attach_watcher` resolves it.
    fn take_watcher(&mut self) -> Option<Box<dyn SubscriptionHandle>> {
        match mem::replace(&mut self.watcher, WatcherSlot::Idle) {
            WatcherSlot::Active { handle, .. } => Some(handle),
            WatcherSlot::Connecting => {
                self.watcher = WatcherSlot::Connecting;
                None
            }
            WatcherSlot::Idle => None,
        }
    }

    fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers.values().cloned().collect()
    }
}

pub struct SubscriptionManager {
    channel: &'static str,
    inner: Mutex<Inner>,
}

impl SubscriptionManager {
    /// `channel` names the realtime channel in logs and metrics
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            inner: Mutex::new(Inner {
                subscribers: HashMap::new(),
                watcher: WatcherSlot::Idle,
                generation: 0,
            }),
        }
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add `subscriber` under `id`, replacing any previous one.
    ///
    /// Returns true when the caller must open the channel and then report
    /// back through [`attach_watcher`](Self::attach_watcher) or
    /// [`watcher_failed`](Self::watcher_failed).
    pub fn replace_subscriber(&self, id: impl Into<String>, subscriber: Subscriber) -> bool {
        let id = id.into();
        let (must_connect, count) = {
            let mut inner = self.lock();
            inner.subscribers.insert(id.clone(), subscriber);
            let must_connect = matches!(inner.watcher, WatcherSlot::Idle);
            if must_connect {
                inner.watcher = WatcherSlot::Connecting;
            }
            (must_connect, inner.subscribers.len())
        };
        debug!("{}: subscriber {} registered ({} total)", self.channel, id, count);
        update_subscribers(self.channel, count);
        must_connect
    }

    /// Install the handle of a newly opened channel.
    ///
    /// Returns the watcher generation, or `None` when every subscriber left
    /// while the channel was opening, in which case the handle is cancelled.
    pub fn attach_watcher(&self, handle: Box<dyn SubscriptionHandle>) -> Option<u64> {
        let (stale, generation) = {
            let mut inner = self.lock();
            if inner.subscribers.is_empty() {
                inner.watcher = WatcherSlot::Idle;
                (Some(handle), None)
            } else {
                inner.generation += 1;
                let generation = inner.generation;
                let previous = mem::replace(
                    &mut inner.watcher,
                    WatcherSlot::Active { generation, handle },
                );
                let stale = match previous {
                    WatcherSlot::Active { handle, .. } => Some(handle),
                    _ => None,
                };
                (stale, Some(generation))
            }
        };

        if let Some(handle) = stale {
            debug!("{}: cancelling superseded channel", self.channel);
            handle.cancel();
        }
        if let Some(generation) = generation {
            info!("{}: realtime channel attached (generation {})", self.channel, generation);
        }
        generation
    }

    /// Opening the channel failed. Every subscriber is told it is
    /// disconnected and removed.
    pub fn watcher_failed(&self) {
        {
            let mut inner = self.lock();
            if matches!(inner.watcher, WatcherSlot::Connecting) {
                inner.watcher = WatcherSlot::Idle;
            }
        }
        warn!("{}: realtime channel failed to open", self.channel);
        self.connection_status_changed(ConnectionState::Disconnected);
    }

    pub fn remove_subscriber(&self, id: &str) {
        let (handle, count) = {
            let mut inner = self.lock();
            inner.subscribers.remove(id);
            let handle = if inner.subscribers.is_empty() {
                inner.take_watcher()
            } else {
                None
            };
            (handle, inner.subscribers.len())
        };
        debug!("{}: subscriber {} removed ({} left)", self.channel, id, count);
        update_subscribers(self.channel, count);
        if let Some(handle) = handle {
            info!("{}: last subscriber left, closing channel", self.channel);
            handle.cancel();
        }
    }

    pub fn remove_all_subscribers(&self) {
        let handle = {
            let mut inner = self.lock();
            inner.subscribers.clear();
            inner.take_watcher()
        };
        update_subscribers(self.channel, 0);
        if let Some(handle) = handle {
            info!("{}: all subscribers removed, closing channel", self.channel);
            handle.cancel();
        }
    }

    /// Tell every subscriber about a channel state change. On
    /// `Disconnected` all subscribers are dropped and the channel is closed.
    pub fn connection_status_changed(&self, state: ConnectionState) {
        let (subscribers, handle) = {
            let mut inner = self.lock();
            let subscribers = inner.snapshot();
            let handle = match state {
                ConnectionState::Disconnected => {
                    inner.subscribers.clear();
                    inner.take_watcher()
                }
                ConnectionState::Connected => None,
            };
            (subscribers, handle)
        };

        info!(
            "{}: channel {} ({} subscribers)",
            self.channel,
            state,
            subscribers.len()
        );
        if state == ConnectionState::Disconnected {
            update_subscribers(self.channel, 0);
        }
        if let Some(handle) = handle {
            handle.cancel();
        }
        for subscriber in subscribers {
            subscriber.connection_status_changed(state);
        }
    }

    /// The channel of `generation` ended on its own. Ignored when that
    /// channel has already been replaced or closed.
    pub fn watcher_closed(&self, generation: u64) {
        let current = {
            let inner = self.lock();
            matches!(inner.watcher, WatcherSlot::Active { generation: g, .. } if g == generation)
        };
        if current {
            self.connection_status_changed(ConnectionState::Disconnected);
        } else {
            debug!("{}: ignoring close of stale channel {}", self.channel, generation);
        }
    }

    pub fn phone_message_received(&self, message: &PhoneMessage) {
        let subscribers = self.lock().snapshot();
        let delivered = subscribers
            .iter()
            .filter(|s| s.deliver_phone_message(message))
            .count();
        debug!("{}: message {} delivered to {}", self.channel, message.id, delivered);
    }

    pub fn call_record_received(&self, call_record: &CallRecord) {
        let subscribers = self.lock().snapshot();
        let delivered = subscribers
            .iter()
            .filter(|s| s.deliver_call_record(call_record))
            .count();
        debug!("{}: call record {} delivered to {}", self.channel, call_record.id, delivered);
    }

    pub fn voicemail_updated(&self, voicemail: &Voicemail) {
        let subscribers = self.lock().snapshot();
        let delivered = subscribers
            .iter()
            .filter(|s| s.deliver_voicemail(voicemail))
            .count();
        debug!("{}: voicemail {} delivered to {}", self.channel, voicemail.id, delivered);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn has_subscriber(&self, id: &str) -> bool {
        self.lock().subscribers.contains_key(id)
    }

    /// Whether a channel is open
    pub fn is_watching(&self) -> bool {
        matches!(self.lock().watcher, WatcherSlot::Active { .. })
    }

    /// Drain `events` of channel `generation`, handing data payloads to
    /// `on_data` until the channel ends.
    pub fn watch<F>(
        self: &Arc<Self>,
        generation: u64,
        mut events: mpsc::Receiver<SubscriptionEvent>,
        on_data: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Value) + Send + 'static,
    {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SubscriptionEvent::Data(data) => {
                        record_subscription_event(manager.channel, "data");
                        on_data(data);
                    }
                    SubscriptionEvent::Errors(errors) => {
                        record_subscription_event(manager.channel, "errors");
                        for error in errors {
                            warn!("{}: subscription error: {}", manager.channel, error.message);
                        }
                    }
                    SubscriptionEvent::Completed => {
                        record_subscription_event(manager.channel, "completed");
                        break;
                    }
                    SubscriptionEvent::Failed(reason) => {
                        record_subscription_event(manager.channel, "failed");
                        warn!("{}: subscription failed: {}", manager.channel, reason);
                        break;
                    }
                }
            }
            manager.watcher_closed(generation);
        })
    }
}

/// Register `subscriber` and, when it is the first one, open the channel
/// with `operation`. `on_data` receives every data payload.
pub async fn establish<F>(
    manager: &Arc<SubscriptionManager>,
    graphql: &dyn GraphQlClient,
    id: String,
    subscriber: Subscriber,
    operation: GraphQlOperation,
    on_data: F,
    error: fn(String) -> TelephonyError,
) -> Result<()>
where
    F: Fn(Value) + Send + 'static,
{
    if !manager.replace_subscriber(id, subscriber) {
        return Ok(());
    }
    let pending = PendingConnect::new(manager);

    match graphql.subscribe(operation).await {
        Ok(subscription) => {
            pending.disarm();
            if let Some(generation) = manager.attach_watcher(subscription.handle) {
                manager.watch(generation, subscription.events, on_data);
                manager.connection_status_changed(ConnectionState::Connected);
            }
            Ok(())
        }
        Err(e) => {
            pending.disarm();
            manager.watcher_failed();
            Err(error(e.to_string()))
        }
    }
}

/// Fails the pending connect of `manager` when dropped while armed, so an
/// `establish` future dropped mid-subscribe does not leave the slot in
/// `Connecting`.
struct PendingConnect<'a> {
    manager: &'a SubscriptionManager,
    armed: bool,
}

impl<'a> PendingConnect<'a> {
    fn new(manager: &'a SubscriptionManager) -> Self {
        Self {
            manager,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("{}: channel open abandoned", self.manager.channel);
            self.manager.watcher_failed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call_record::CallRecord;
    use crate::domain::message::{MessageDirection, MessageState};
    use crate::domain::subscriber::{
        CallRecordSubscriber, PhoneMessageSubscriber, TelephonySubscriber,
    };
    use crate::infrastructure::graphql::{GraphQlResponse, GraphQlSubscription};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Weak;

    #[derive(Clone, Default)]
    struct FakeHandle {
        cancelled: Arc<AtomicBool>,
    }

    impl SubscriptionHandle for FakeHandle {
        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingSubscriber {
        messages: AtomicUsize,
        connected: AtomicUsize,
        disconnected: AtomicUsize,
    }

    impl TelephonySubscriber for CountingSubscriber {
        fn connection_status_changed(&self, state: ConnectionState) {
            match state {
                ConnectionState::Connected => self.connected.fetch_add(1, Ordering::SeqCst),
                ConnectionState::Disconnected => self.disconnected.fetch_add(1, Ordering::SeqCst),
            };
        }
    }

    impl PhoneMessageSubscriber for CountingSubscriber {
        fn phone_message_received(&self, _message: PhoneMessage) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CallRecordSubscriber for CountingSubscriber {
        fn call_record_received(&self, _call_record: CallRecord) {}
    }

    /// Unsubscribes itself from inside the callback
    struct SelfRemovingSubscriber {
        manager: Weak<SubscriptionManager>,
        received: AtomicUsize,
    }

    impl TelephonySubscriber for SelfRemovingSubscriber {
        fn connection_status_changed(&self, _state: ConnectionState) {}
    }

    impl PhoneMessageSubscriber for SelfRemovingSubscriber {
        fn phone_message_received(&self, _message: PhoneMessage) {
            self.received.fetch_add(1, Ordering::SeqCst);
            if let Some(manager) = self.manager.upgrade() {
                manager.remove_subscriber("self");
            }
        }
    }

    fn message() -> PhoneMessage {
        PhoneMessage {
            id: "m-1".into(),
            owner: "owner".into(),
            conversation: "tl-cnv-1".into(),
            created: Utc::now(),
            updated: Utc::now(),
            local: "+14155550100".into(),
            remote: "+14155550199".into(),
            body: "hello".into(),
            direction: MessageDirection::Inbound,
            state: MessageState::Received,
            media: vec![],
        }
    }

    fn message_subscriber(s: &Arc<CountingSubscriber>) -> Subscriber {
        Subscriber::PhoneMessage(s.clone())
    }

    #[test]
    fn test_first_subscriber_opens_channel() {
        let manager = SubscriptionManager::new("messages");
        let a = Arc::new(CountingSubscriber::default());
        let b = Arc::new(CountingSubscriber::default());

        assert!(manager.replace_subscriber("a", message_subscriber(&a)));
        // channel is connecting, second subscriber piggybacks
        assert!(!manager.replace_subscriber("b", message_subscriber(&b)));
        // replacing an existing id does not reconnect either
        assert!(!manager.replace_subscriber("a", message_subscriber(&a)));
        assert_eq!(manager.subscriber_count(), 2);

        let generation = manager.attach_watcher(Box::new(FakeHandle::default()));
        assert_eq!(generation, Some(1));
        assert!(manager.is_watching());
    }

    #[test]
    fn test_last_removal_cancels_channel() {
        let manager = SubscriptionManager::new("messages");
        let a = Arc::new(CountingSubscriber::default());
        let handle = FakeHandle::default();

        manager.replace_subscriber("a", message_subscriber(&a));
        manager.replace_subscriber("b", message_subscriber(&a));
        manager.attach_watcher(Box::new(handle.clone()));

        manager.remove_subscriber("a");
        assert!(!handle.cancelled.load(Ordering::SeqCst));

        manager.remove_subscriber("b");
        assert!(handle.cancelled.load(Ordering::SeqCst));
        assert!(!manager.is_watching());

        // next subscriber opens a fresh channel
        assert!(manager.replace_subscriber("c", message_subscriber(&a)));
    }

    #[test]
    fn test_attach_after_everyone_left_cancels_immediately() {
        let manager = SubscriptionManager::new("messages");
        let a = Arc::new(CountingSubscriber::default());
        let handle = FakeHandle::default();

        assert!(manager.replace_subscriber("a", message_subscriber(&a)));
        manager.remove_subscriber("a");

        assert_eq!(manager.attach_watcher(Box::new(handle.clone())), None);
        assert!(handle.cancelled.load(Ordering::SeqCst));
        assert!(manager.replace_subscriber("a", message_subscriber(&a)));
    }

    #[test]
    fn test_subscriber_joining_while_connecting_keeps_single_connect() {
        let manager = SubscriptionManager::new("messages");
        let a = Arc::new(CountingSubscriber::default());

        assert!(manager.replace_subscriber("a", message_subscriber(&a)));
        manager.remove_subscriber("a");
        // still connecting from the first call
        assert!(!manager.replace_subscriber("b", message_subscriber(&a)));

        let handle = FakeHandle::default();
        assert!(manager.attach_watcher(Box::new(handle.clone())).is_some());
        assert!(!handle.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_disconnect_clears_and_notifies() {
        let manager = SubscriptionManager::new("messages");
        let a = Arc::new(CountingSubscriber::default());
        let b = Arc::new(CountingSubscriber::default());
        let handle = FakeHandle::default();

        manager.replace_subscriber("a", message_subscriber(&a));
        manager.replace_subscriber("b", message_subscriber(&b));
        manager.attach_watcher(Box::new(handle.clone()));

        manager.connection_status_changed(ConnectionState::Connected);
        assert_eq!(a.connected.load(Ordering::SeqCst), 1);
        assert_eq!(manager.subscriber_count(), 2);

        manager.connection_status_changed(ConnectionState::Disconnected);
        assert_eq!(a.disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(b.disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(manager.subscriber_count(), 0);
        assert!(handle.cancelled.load(Ordering::SeqCst));
        assert!(!manager.is_watching());
    }

    #[test]
    fn test_typed_dispatch_skips_other_capabilities() {
        let manager = SubscriptionManager::new("mixed");
        let messages = Arc::new(CountingSubscriber::default());
        let records = Arc::new(CountingSubscriber::default());

        manager.replace_subscriber("messages", Subscriber::PhoneMessage(messages.clone()));
        manager.replace_subscriber("records", Subscriber::CallRecord(records.clone()));

        manager.phone_message_received(&message());

        assert_eq!(messages.messages.load(Ordering::SeqCst), 1);
        assert_eq!(records.messages.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscriber_can_unsubscribe_during_dispatch() {
        let manager = Arc::new(SubscriptionManager::new("messages"));
        let handle = FakeHandle::default();
        let subscriber = Arc::new(SelfRemovingSubscriber {
            manager: Arc::downgrade(&manager),
            received: AtomicUsize::new(0),
        });

        manager.replace_subscriber("self", Subscriber::PhoneMessage(subscriber.clone()));
        manager.attach_watcher(Box::new(handle.clone()));

        manager.phone_message_received(&message());

        assert_eq!(subscriber.received.load(Ordering::SeqCst), 1);
        assert_eq!(manager.subscriber_count(), 0);
        assert!(handle.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stale_generation_close_is_ignored() {
        let manager = SubscriptionManager::new("messages");
        let a = Arc::new(CountingSubscriber::default());

        manager.replace_subscriber("a", message_subscriber(&a));
        let first = manager.attach_watcher(Box::new(FakeHandle::default())).unwrap();
        manager.remove_subscriber("a");

        manager.replace_subscriber("b", message_subscriber(&a));
        let second = manager.attach_watcher(Box::new(FakeHandle::default())).unwrap();
        assert_ne!(first, second);

        manager.watcher_closed(first);
        assert_eq!(manager.subscriber_count(), 1);

        manager.watcher_closed(second);
        assert_eq!(manager.subscriber_count(), 0);
        assert_eq!(a.disconnected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_watcher_failed_resets_and_drops_subscribers() {
        let manager = SubscriptionManager::new("messages");
        let a = Arc::new(CountingSubscriber::default());

        assert!(manager.replace_subscriber("a", message_subscriber(&a)));
        manager.watcher_failed();

        assert_eq!(a.disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(manager.subscriber_count(), 0);
        assert!(manager.replace_subscriber("a", message_subscriber(&a)));
    }

    /// First `subscribe` never resolves, later ones succeed
    #[derive(Default)]
    struct StallingGraphQl {
        calls: AtomicUsize,
        senders: Mutex<Vec<mpsc::Sender<SubscriptionEvent>>>,
    }

    #[async_trait]
    impl GraphQlClient for StallingGraphQl {
        async fn execute(&self, _operation: GraphQlOperation) -> Result<GraphQlResponse> {
            Err(TelephonyError::Transport("not scripted".into()))
        }

        async fn subscribe(&self, _operation: GraphQlOperation) -> Result<GraphQlSubscription> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            let (tx, events) = mpsc::channel(1);
            self.senders.lock().unwrap().push(tx);
            Ok(GraphQlSubscription {
                handle: Box::new(FakeHandle::default()),
                events,
            })
        }
    }

    fn on_message() -> GraphQlOperation {
        GraphQlOperation::new("OnMessageReceived", "subscription { x }".into(), serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_dropped_establish_does_not_block_next_subscriber() {
        let manager = Arc::new(SubscriptionManager::new("messages"));
        let graphql = StallingGraphQl::default();
        let a = Arc::new(CountingSubscriber::default());
        let b = Arc::new(CountingSubscriber::default());

        let first = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            establish(
                &manager,
                &graphql,
                "a".into(),
                message_subscriber(&a),
                on_message(),
                |_| {},
                TelephonyError::SubscribeToMessages,
            ),
        )
        .await;
        assert!(first.is_err());
        assert_eq!(a.disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(manager.subscriber_count(), 0);

        establish(
            &manager,
            &graphql,
            "b".into(),
            message_subscriber(&b),
            on_message(),
            |_| {},
            TelephonyError::SubscribeToMessages,
        )
        .await
        .unwrap();

        assert_eq!(graphql.calls.load(Ordering::SeqCst), 2);
        assert!(manager.is_watching());
        assert_eq!(b.connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watch_forwards_data_then_disconnects_on_failure() {
        let manager = Arc::new(SubscriptionManager::new("messages"));
        let a = Arc::new(CountingSubscriber::default());
        manager.replace_subscriber("a", message_subscriber(&a));
        let generation = manager.attach_watcher(Box::new(FakeHandle::default())).unwrap();

        let (tx, rx) = mpsc::channel(4);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let task = manager.watch(generation, rx, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(SubscriptionEvent::Data(serde_json::json!({"OnMessage": {}})))
            .await
            .unwrap();
        tx.send(SubscriptionEvent::Failed("socket reset".into()))
            .await
            .unwrap();
        task.await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(a.disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(manager.subscriber_count(), 0);
    }
}

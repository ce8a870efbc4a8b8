/// Stream adapter for telephony notifications
///
/// Register a [`TelephonyEventBroadcaster`] as message, call record and
/// voicemail subscriber and consume the notifications as a broadcast stream.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::call_record::CallRecord;
use crate::domain::message::PhoneMessage;
use crate::domain::subscriber::{
    CallRecordSubscriber, ConnectionState, PhoneMessageSubscriber, TelephonySubscriber,
    VoicemailSubscriber,
};
use crate::domain::voicemail::Voicemail;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelephonyEvent {
    ConnectionChanged {
        state: ConnectionState,
        timestamp: i64,
    },
    MessageReceived {
        message: PhoneMessage,
        timestamp: i64,
    },
    CallRecordReceived {
        call_record: CallRecord,
        timestamp: i64,
    },
    VoicemailUpdated {
        voicemail: Voicemail,
        timestamp: i64,
    },
}

impl TelephonyEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionChanged { .. } => "connection_changed",
            Self::MessageReceived { .. } => "message_received",
            Self::CallRecordReceived { .. } => "call_record_received",
            Self::VoicemailUpdated { .. } => "voicemail_updated",
        }
    }
}

pub struct TelephonyEventBroadcaster {
    tx: broadcast::Sender<TelephonyEvent>,
}

impl Default for TelephonyEventBroadcaster {
    /// Capacity of 1000 events
    fn default() -> Self {
        Self::new(1000)
    }
}

impl TelephonyEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelephonyEvent> {
        self.tx.subscribe()
    }

    /// Publish `event`; dropped with a warning when nobody listens
    pub fn broadcast(&self, event: TelephonyEvent) {
        debug!("Broadcasting {}", event.name());
        if let Err(e) = self.tx.send(event) {
            warn!("Failed to broadcast event: {}", e);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl TelephonySubscriber for TelephonyEventBroadcaster {
    fn connection_status_changed(&self, state: ConnectionState) {
        self.broadcast(TelephonyEvent::ConnectionChanged {
            state,
            timestamp: Utc::now().timestamp(),
        });
    }
}

impl PhoneMessageSubscriber for TelephonyEventBroadcaster {
    fn phone_message_received(&self, message: PhoneMessage) {
        self.broadcast(TelephonyEvent::MessageReceived {
            message,
            timestamp: Utc::now().timestamp(),
        });
    }
}

impl CallRecordSubscriber for TelephonyEventBroadcaster {
    fn call_record_received(&self, call_record: CallRecord) {
        self.broadcast(TelephonyEvent::CallRecordReceived {
            call_record,
            timestamp: Utc::now().timestamp(),
        });
    }
}

impl VoicemailSubscriber for TelephonyEventBroadcaster {
    fn voicemail_updated(&self, voicemail: Voicemail) {
        self.broadcast(TelephonyEvent::VoicemailUpdated {
            voicemail,
            timestamp: Utc::now().timestamp(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::media::MediaObject;

    fn voicemail() -> Voicemail {
        Voicemail {
            id: "vm-1".into(),
            owner: "owner".into(),
            sudo_owner: "sudo".into(),
            phone_number_id: "pn-1".into(),
            call_record_id: Some("cr-1".into()),
            created: Utc::now(),
            updated: Utc::now(),
            local_phone_number: "+14155550100".into(),
            remote_phone_number: "+14155550199".into(),
            duration_seconds: 12,
            media: MediaObject::new("k", "b", "us-east-1"),
        }
    }

    #[tokio::test]
    async fn test_broadcaster_republishes_notifications() {
        let broadcaster = TelephonyEventBroadcaster::default();
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.connection_status_changed(ConnectionState::Connected);
        broadcaster.voicemail_updated(voicemail());

        match rx.recv().await.unwrap() {
            TelephonyEvent::ConnectionChanged { state, .. } => {
                assert_eq!(state, ConnectionState::Connected)
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            TelephonyEvent::VoicemailUpdated { voicemail, .. } => {
                assert_eq!(voicemail.duration_seconds, 12)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = TelephonyEvent::ConnectionChanged {
            state: ConnectionState::Disconnected,
            timestamp: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection_changed");
        assert_eq!(json["state"], "disconnected");
    }

    #[test]
    fn test_broadcast_without_receivers_does_not_panic() {
        let broadcaster = TelephonyEventBroadcaster::new(4);
        broadcaster.connection_status_changed(ConnectionState::Connected);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}

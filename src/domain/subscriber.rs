//! Realtime subscriber capabilities
//!
//! A subscriber registers one of a small closed set of capabilities. The
//! [`Subscriber`] enum carries the registered capability so notifications can
//! be routed only to the subscribers that understand them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::call_record::CallRecord;
use super::message::PhoneMessage;
use super::voicemail::Voicemail;

/// State of the realtime channel a subscriber is attached to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Base capability shared by every subscriber and listener
pub trait TelephonySubscriber: Send + Sync {
    /// Called when the realtime channel connects or drops. After
    /// `Disconnected` the subscriber has been removed and must subscribe again.
    fn connection_status_changed(&self, state: ConnectionState);
}

pub trait PhoneMessageSubscriber: TelephonySubscriber {
    fn phone_message_received(&self, message: PhoneMessage);
}

pub trait CallRecordSubscriber: TelephonySubscriber {
    fn call_record_received(&self, call_record: CallRecord);
}

pub trait VoicemailSubscriber: TelephonySubscriber {
    fn voicemail_updated(&self, voicemail: Voicemail);
}

/// A registered subscriber together with its capability
#[derive(Clone)]
pub enum Subscriber {
    PhoneMessage(Arc<dyn PhoneMessageSubscriber>),
    CallRecord(Arc<dyn CallRecordSubscriber>),
    Voicemail(Arc<dyn VoicemailSubscriber>),
}

impl Subscriber {
    pub fn kind(&self) -> SubscriberKind {
        match self {
            Self::PhoneMessage(_) => SubscriberKind::PhoneMessage,
            Self::CallRecord(_) => SubscriberKind::CallRecord,
            Self::Voicemail(_) => SubscriberKind::Voicemail,
        }
    }

    pub fn connection_status_changed(&self, state: ConnectionState) {
        match self {
            Self::PhoneMessage(s) => s.connection_status_changed(state),
            Self::CallRecord(s) => s.connection_status_changed(state),
            Self::Voicemail(s) => s.connection_status_changed(state),
        }
    }

    /// Delivers the message if this subscriber handles messages.
    /// Returns whether it was delivered.
    pub fn deliver_phone_message(&self, message: &PhoneMessage) -> bool {
        match self {
            Self::PhoneMessage(s) => {
                s.phone_message_received(message.clone());
                true
            }
            _ => false,
        }
    }

    pub fn deliver_call_record(&self, call_record: &CallRecord) -> bool {
        match self {
            Self::CallRecord(s) => {
                s.call_record_received(call_record.clone());
                true
            }
            _ => false,
        }
    }

    pub fn deliver_voicemail(&self, voicemail: &Voicemail) -> bool {
        match self {
            Self::Voicemail(s) => {
                s.voicemail_updated(voicemail.clone());
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscriber").field(&self.kind()).finish()
    }
}

/// Capability tag, used for logging and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberKind {
    PhoneMessage,
    CallRecord,
    Voicemail,
}

impl SubscriberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhoneMessage => "phone_message",
            Self::CallRecord => "call_record",
            Self::Voicemail => "voicemail",
        }
    }
}

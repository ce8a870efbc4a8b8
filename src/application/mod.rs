//! Application layer - Client facades and use cases
//!
//! This layer orchestrates the domain objects and infrastructure adapters:
//! - `TelephonyClient`: phone numbers, messaging and conversations
//! - `TelephonyCalling`: voice calls, call records and voicemail
//! - Subscription fan-out for realtime notifications
//! - The user's key ring

pub mod builder;
pub mod calling;
pub mod key_manager;
pub mod requests;
pub mod subscription_manager;
pub mod telephony_client;
pub mod unseal;

pub use builder::TelephonyClientBuilder;
pub use calling::{TelephonyCalling, DEFAULT_CALL_RECORD_SUBSCRIBER, DEFAULT_VOICEMAIL_SUBSCRIBER};
pub use key_manager::DefaultTelephonyKeyManager;
pub use subscription_manager::SubscriptionManager;
pub use telephony_client::{TelephonyClient, DEFAULT_MESSAGE_SUBSCRIBER};

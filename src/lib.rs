//! Telephony SDK - Phone numbers, messaging and voice calling in Rust
//!
//! A Domain-Driven Design client for a GraphQL telephony backend: number
//! search and provisioning, end-to-end sealed SMS/MMS, call records,
//! voicemail, realtime subscriptions and vendor-backed voice calls.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use application::{TelephonyCalling, TelephonyClient, TelephonyClientBuilder};
pub use config::Config;
pub use domain::shared::error::TelephonyError;
pub use domain::shared::result::Result;
pub use interface::{TelephonyEvent, TelephonyEventBroadcaster};

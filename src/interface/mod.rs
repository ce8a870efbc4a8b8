//! Interface layer - Surfaces for SDK consumers
//!
//! This layer handles:
//! - Republishing subscriber callbacks as broadcast event streams

pub mod events;

pub use events::{TelephonyEvent, TelephonyEventBroadcaster};

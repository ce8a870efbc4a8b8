//! Domain layer - Telephony entities, subscriber capabilities and ports
//!
//! This layer contains:
//! - Entities: phone numbers, messages, call records, voicemails
//! - Value Objects: conversation ids, list tokens, media references
//! - Ports: key management, user session and voice vendor traits

pub mod call_record;
pub mod calling;
pub mod keys;
pub mod media;
pub mod message;
pub mod phone_number;
pub mod session;
pub mod shared;
pub mod subscriber;
pub mod voicemail;

// Re-export commonly used types
pub use shared::{Result, TelephonyError};

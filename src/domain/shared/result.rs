//! Telephony result type

use super::error::TelephonyError;

/// Standard result type for telephony operations
pub type Result<T> = std::result::Result<T, TelephonyError>;

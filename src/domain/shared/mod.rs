//! Shared kernel - Common types used across all telephony contexts

pub mod error;
pub mod result;
pub mod value_objects;

pub use error::TelephonyError;
pub use result::Result;
pub use value_objects::*;

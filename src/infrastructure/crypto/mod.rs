//! Sealed field cryptography and key storage

pub mod key_store;
pub mod sealed;

pub use key_store::{FileKeyStore, InMemoryKeyStore};
pub use sealed::{open, open_duration, open_string, seal, SEALING_ALGORITHM};

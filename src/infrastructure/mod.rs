//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - GraphQL transport (HTTP and realtime websocket)
//! - Sealed data cryptography and key stores
//! - S3 media storage
//! - Session adapters and metrics

pub mod crypto;
pub mod graphql;
pub mod metrics;
pub mod session;
pub mod storage;

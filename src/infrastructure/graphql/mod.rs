//! GraphQL API access

pub mod client;
pub mod http;
pub mod operations;
pub mod realtime;
pub mod wire;

pub use client::{
    GraphQlClient, GraphQlError, GraphQlOperation, GraphQlResponse, GraphQlSubscription,
    SubscriptionEvent, SubscriptionHandle,
};
pub use http::HttpGraphQlClient;

#[cfg(test)]
pub use client::MockGraphQlClient;

/// Request helpers shared by the client facades
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::shared::{Result, TelephonyError};
use crate::infrastructure::graphql::GraphQlResponse;

/// Constructor of the operation specific error variant
pub type ErrorKind = fn(String) -> TelephonyError;

/// Fail with `kind` if the backend reported any error
pub fn check(response: &GraphQlResponse, kind: ErrorKind) -> Result<()> {
    match response.first_error() {
        Some(error) => Err(kind(error.message.clone())),
        None => Ok(()),
    }
}

/// Decode the top-level `field` of a successful response
pub fn expect_field<T: DeserializeOwned>(
    response: &GraphQlResponse,
    field: &str,
    kind: ErrorKind,
) -> Result<T> {
    check(response, kind)?;
    response
        .field(field)
        .map_err(|e| kind(format!("malformed {}: {}", field, e)))?
        .ok_or_else(|| kind(format!("no {} in response", field)))
}

/// Decode the payload of a subscription notification. Malformed payloads
/// are logged and skipped.
pub fn notification<T: DeserializeOwned>(data: &Value, field: &str) -> Option<T> {
    let payload = data.get(field).filter(|v| !v.is_null())?;
    match serde_json::from_value(payload.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Dropping malformed {} notification: {}", field, e);
            None
        }
    }
}

/// Outcome of one polling attempt
pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// Repeat `attempt` every `interval` until it is ready, fails, or
/// `max_attempts` runs out.
pub async fn poll<T, F, Fut>(
    what: &str,
    interval: Duration,
    max_attempts: u32,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>>>,
{
    for n in 1..=max_attempts {
        if let Poll::Ready(value) = attempt().await? {
            return Ok(value);
        }
        debug!("{} still pending after attempt {}/{}", what, n, max_attempts);
        if n < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(TelephonyError::Timeout(format!(
        "{} did not finish after {} attempts",
        what, max_attempts
    )))
}

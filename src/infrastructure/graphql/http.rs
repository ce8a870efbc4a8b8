/// HTTP GraphQL client
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::client::{GraphQlClient, GraphQlOperation, GraphQlResponse, GraphQlSubscription};
use super::realtime;
use crate::config::ApiConfig;
use crate::domain::session::UserSession;
use crate::domain::shared::{Result, TelephonyError};
use crate::infrastructure::metrics::{record_graphql_request, Timer};

/// Queries and mutations over HTTPS POST, subscriptions over websocket.
/// Every request carries the session's bearer token.
pub struct HttpGraphQlClient {
    http: reqwest::Client,
    api_url: String,
    realtime_url: String,
    timeout: Duration,
    session: Arc<dyn UserSession>,
}

impl HttpGraphQlClient {
    pub fn new(config: &ApiConfig, session: Arc<dyn UserSession>) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelephonyError::InvalidConfig(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            realtime_url: config.realtime_url.clone(),
            timeout,
            session,
        })
    }
}

fn request_error(e: reqwest::Error) -> TelephonyError {
    if e.is_timeout() {
        TelephonyError::Timeout(e.to_string())
    } else {
        TelephonyError::Transport(e.to_string())
    }
}

#[async_trait]
impl GraphQlClient for HttpGraphQlClient {
    async fn execute(&self, operation: GraphQlOperation) -> Result<GraphQlResponse> {
        let timer = Timer::start();
        let name = operation.name;
        let token = self.session.access_token().await?;
        debug!("GraphQL {} -> {}", name, self.api_url);

        let response = match self
            .http
            .post(&self.api_url)
            .bearer_auth(token)
            .json(&operation)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                record_graphql_request(name, "transport_error", timer.elapsed());
                warn!("GraphQL {} transport error: {}", name, e);
                return Err(request_error(e));
            }
        };

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        // Some gateways answer GraphQL errors with a non-2xx status
        let result = match serde_json::from_str::<GraphQlResponse>(&body) {
            Ok(parsed) if status.is_success() || parsed.has_errors() => Ok(parsed),
            Ok(_) => Err(TelephonyError::Transport(format!(
                "{} returned HTTP {}",
                name, status
            ))),
            Err(e) => Err(TelephonyError::Transport(format!(
                "{} returned HTTP {} with an invalid body: {}",
                name, status, e
            ))),
        };

        let outcome = match &result {
            Ok(r) if r.has_errors() => "graphql_error",
            Ok(_) => "ok",
            Err(_) => "transport_error",
        };
        record_graphql_request(name, outcome, timer.elapsed());
        if let Ok(r) = &result {
            if let Some(error) = r.first_error() {
                debug!("GraphQL {} returned error: {}", name, error.message);
            }
        }
        result
    }

    async fn subscribe(&self, operation: GraphQlOperation) -> Result<GraphQlSubscription> {
        let token = self.session.access_token().await?;
        debug!("GraphQL subscription {} -> {}", operation.name, self.realtime_url);
        realtime::subscribe(&self.realtime_url, &token, operation, self.timeout).await
    }
}

/// GraphQL client port
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::shared::Result;

/// A named GraphQL document with its variables
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphQlOperation {
    #[serde(rename = "operationName")]
    pub name: &'static str,
    pub query: String,
    pub variables: Value,
}

impl GraphQlOperation {
    pub fn new(name: &'static str, query: String, variables: Value) -> Self {
        Self {
            name,
            query,
            variables,
        }
    }
}

/// One entry of the `errors` array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphQlError {
    pub message: String,
    #[serde(rename = "errorType", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            extensions: None,
        }
    }

    pub fn with_type(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: Some(error_type.into()),
            extensions: None,
        }
    }

    /// Backend error type, either top level or under `extensions`
    pub fn error_type(&self) -> Option<&str> {
        self.error_type.as_deref().or_else(|| {
            self.extensions
                .as_ref()
                .and_then(|ext| ext.get("errorType"))
                .and_then(Value::as_str)
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

impl GraphQlResponse {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    pub fn from_errors(errors: Vec<GraphQlError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    pub fn errors(&self) -> &[GraphQlError] {
        self.errors.as_deref().unwrap_or(&[])
    }

    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    pub fn first_error(&self) -> Option<&GraphQlError> {
        self.errors().first()
    }

    /// Deserialize the top-level field `name` of `data`.
    /// A missing or null field yields `Ok(None)`.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> std::result::Result<Option<T>, serde_json::Error> {
        match self.data.as_ref().and_then(|d| d.get(name)) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some),
        }
    }
}

/// Notification delivered on a realtime subscription
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Data(Value),
    Errors(Vec<GraphQlError>),
    /// The server ended the subscription
    Completed,
    /// The connection failed
    Failed(String),
}

/// Handle of an established realtime subscription
pub trait SubscriptionHandle: Send + Sync {
    /// Stop the subscription. Idempotent.
    fn cancel(&self);
}

/// An established subscription and its event stream
pub struct GraphQlSubscription {
    pub handle: Box<dyn SubscriptionHandle>,
    pub events: mpsc::Receiver<SubscriptionEvent>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphQlClient: Send + Sync {
    /// Run a query or mutation. GraphQL errors are returned in the response,
    /// only transport failures produce `Err`.
    async fn execute(&self, operation: GraphQlOperation) -> Result<GraphQlResponse>;

    /// Start a realtime subscription. Resolves once the server accepted it.
    async fn subscribe(&self, operation: GraphQlOperation) -> Result<GraphQlSubscription>;
}

/// Assembles a [`TelephonyClient`] from configuration and optional
/// replacements for its collaborators.
use std::sync::Arc;
use tracing::info;

use super::key_manager::DefaultTelephonyKeyManager;
use super::telephony_client::TelephonyClient;
use crate::config::Config;
use crate::domain::calling::VoiceCallingVendor;
use crate::domain::keys::{KeyStore, TelephonyKeyManager};
use crate::domain::session::{OwnershipProofIssuer, UserSession};
use crate::domain::shared::{Result, TelephonyError};
use crate::infrastructure::crypto::{FileKeyStore, InMemoryKeyStore};
use crate::infrastructure::graphql::{GraphQlClient, HttpGraphQlClient};
use crate::infrastructure::storage::{ObjectStore, S3ObjectStore};

#[derive(Default)]
pub struct TelephonyClientBuilder {
    config: Option<Config>,
    session: Option<Arc<dyn UserSession>>,
    proof_issuer: Option<Arc<dyn OwnershipProofIssuer>>,
    graphql: Option<Arc<dyn GraphQlClient>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    key_store: Option<Arc<dyn KeyStore>>,
    key_manager: Option<Arc<dyn TelephonyKeyManager>>,
    vendor: Option<Arc<dyn VoiceCallingVendor>>,
}

impl TelephonyClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn user_session(mut self, session: Arc<dyn UserSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn ownership_proof_issuer(mut self, issuer: Arc<dyn OwnershipProofIssuer>) -> Self {
        self.proof_issuer = Some(issuer);
        self
    }

    pub fn graphql_client(mut self, graphql: Arc<dyn GraphQlClient>) -> Self {
        self.graphql = Some(graphql);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn key_store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.key_store = Some(store);
        self
    }

    /// Replaces the default key manager; `key_store` is ignored when set
    pub fn key_manager(mut self, manager: Arc<dyn TelephonyKeyManager>) -> Self {
        self.key_manager = Some(manager);
        self
    }

    pub fn calling_vendor(mut self, vendor: Arc<dyn VoiceCallingVendor>) -> Self {
        self.vendor = Some(vendor);
        self
    }

    pub async fn build(self) -> Result<TelephonyClient> {
        let config = self
            .config
            .ok_or_else(|| TelephonyError::InvalidConfig("config is required".to_string()))?;
        config.validate()?;
        let session = self
            .session
            .ok_or_else(|| TelephonyError::InvalidConfig("user session is required".to_string()))?;
        let proof_issuer = self.proof_issuer.ok_or_else(|| {
            TelephonyError::InvalidConfig("ownership proof issuer is required".to_string())
        })?;

        let graphql: Arc<dyn GraphQlClient> = match self.graphql {
            Some(graphql) => graphql,
            None => Arc::new(HttpGraphQlClient::new(&config.api, session.clone())?),
        };
        let object_store: Arc<dyn ObjectStore> = match self.object_store {
            Some(store) => store,
            None => Arc::new(S3ObjectStore::new(&config.storage).await),
        };
        let keys: Arc<dyn TelephonyKeyManager> = match self.key_manager {
            Some(keys) => keys,
            None => {
                let store: Arc<dyn KeyStore> = match (self.key_store, &config.keys.store_dir) {
                    (Some(store), _) => store,
                    (None, Some(dir)) => Arc::new(FileKeyStore::open(dir)?),
                    (None, None) => Arc::new(InMemoryKeyStore::new()),
                };
                Arc::new(DefaultTelephonyKeyManager::new(
                    store,
                    session.clone(),
                    graphql.clone(),
                    config.keys.namespace.clone(),
                ))
            }
        };

        info!(
            "Telephony client ready (api {}, vendor {})",
            config.api.api_url,
            self.vendor.as_ref().map(|v| v.name()).unwrap_or("none")
        );
        Ok(TelephonyClient::from_parts(
            config,
            session,
            proof_issuer,
            graphql,
            object_store,
            keys,
            self.vendor,
        ))
    }
}

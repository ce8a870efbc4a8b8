/// Key ring of the signed-in user
///
/// Every entry is named after the user's identity id, so several users can
/// share one store.
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::RsaPrivateKey;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::keys::{KeyStore, TelephonyKeyManager};
use crate::domain::session::UserSession;
use crate::domain::shared::{Result, TelephonyError};
use crate::infrastructure::crypto::sealed;
use crate::infrastructure::graphql::operations::{self, FIELD_CREATE_PUBLIC_KEY};
use crate::infrastructure::graphql::wire::WirePublicKey;
use crate::infrastructure::graphql::GraphQlClient;

/// Modulus size; the sealed envelope expects a 256 byte key block
const KEY_BITS: usize = 2048;

struct CachedKey {
    name: String,
    key: RsaPrivateKey,
}

pub struct DefaultTelephonyKeyManager {
    store: Arc<dyn KeyStore>,
    session: Arc<dyn UserSession>,
    graphql: Arc<dyn GraphQlClient>,
    namespace: String,
    cached: Mutex<Option<CachedKey>>,
}

impl DefaultTelephonyKeyManager {
    pub fn new(
        store: Arc<dyn KeyStore>,
        session: Arc<dyn UserSession>,
        graphql: Arc<dyn GraphQlClient>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            session,
            graphql,
            namespace: namespace.into(),
            cached: Mutex::new(None),
        }
    }

    fn identity(&self) -> Result<String> {
        self.session.identity_id().ok_or(TelephonyError::NotSignedIn)
    }

    fn private_key_name(&self, identity: &str) -> String {
        format!("{}.{}", self.namespace, identity)
    }

    fn key_id_name(&self, identity: &str) -> String {
        format!("{}.com.sudoplatform.keyId{}", self.namespace, identity)
    }

    fn key_ring_id_name(&self, identity: &str) -> String {
        format!("{}.com.sudoplatform.keyRingId{}", self.namespace, identity)
    }

    fn read_password(&self, name: &str) -> Result<Option<String>> {
        match self.store.password(name)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| TelephonyError::KeyStore(format!("{} is not utf-8: {}", name, e))),
            None => Ok(None),
        }
    }

    /// Run `f` with the current private key, loading it into the cache first
    fn with_private_key<T>(&self, f: impl FnOnce(&RsaPrivateKey) -> Result<T>) -> Result<T> {
        let name = self.private_key_name(&self.identity()?);
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());

        if cached.as_ref().map(|c| c.name != name).unwrap_or(true) {
            let der = self.store.private_key(&name)?.ok_or_else(|| {
                TelephonyError::DecryptSealedData("no private key available".to_string())
            })?;
            let key = RsaPrivateKey::from_pkcs8_der(&der)
                .map_err(|e| TelephonyError::KeyStore(format!("corrupt private key: {}", e)))?;
            debug!("Loaded private key {}", name);
            *cached = Some(CachedKey { name, key });
        }

        match cached.as_ref() {
            Some(entry) => f(&entry.key),
            None => Err(TelephonyError::DecryptSealedData(
                "no private key available".to_string(),
            )),
        }
    }
}

#[async_trait]
impl TelephonyKeyManager for DefaultTelephonyKeyManager {
    fn owner(&self) -> Result<String> {
        self.session.subject().ok_or(TelephonyError::NotSignedIn)
    }

    fn key_id(&self) -> Result<Option<String>> {
        let identity = self.identity()?;
        self.read_password(&self.key_id_name(&identity))
    }

    fn key_ring_id(&self) -> Result<Option<String>> {
        let identity = self.identity()?;
        self.read_password(&self.key_ring_id_name(&identity))
    }

    fn has_key_pair(&self) -> Result<bool> {
        let identity = self.identity()?;
        Ok(self.store.private_key(&self.private_key_name(&identity))?.is_some()
            && self.key_id()?.is_some())
    }

    /// The public key is registered before anything is persisted, so a failed
    /// registration leaves no half-created key ring behind.
    async fn generate_key_pair(&self) -> Result<()> {
        let identity = self.identity()?;
        info!("Generating telephony key pair for {}", identity);

        let private_key = tokio::task::spawn_blocking(|| {
            RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
        })
        .await
        .map_err(|e| TelephonyError::CreatePublicKey(format!("key generation aborted: {}", e)))?
        .map_err(|e| TelephonyError::CreatePublicKey(format!("key generation failed: {}", e)))?;

        let public_der = private_key
            .to_public_key()
            .to_pkcs1_der()
            .map_err(|e| TelephonyError::CreatePublicKey(e.to_string()))?;
        let private_der = private_key
            .to_pkcs8_der()
            .map_err(|e| TelephonyError::CreatePublicKey(e.to_string()))?;

        let key_id = Uuid::new_v4().to_string();
        let key_ring_id = Uuid::new_v4().to_string();

        let response = self
            .graphql
            .execute(operations::create_public_key(
                &key_id,
                &key_ring_id,
                &STANDARD.encode(public_der.as_bytes()),
                sealed::SEALING_ALGORITHM,
            ))
            .await?;
        if let Some(error) = response.first_error() {
            warn!("Public key registration rejected: {}", error.message);
            return Err(TelephonyError::CreatePublicKey(error.message.clone()));
        }
        let registered: WirePublicKey = response
            .field(FIELD_CREATE_PUBLIC_KEY)
            .map_err(|e| TelephonyError::CreatePublicKey(e.to_string()))?
            .ok_or_else(|| TelephonyError::CreatePublicKey("no public key returned".to_string()))?;

        let name = self.private_key_name(&identity);
        self.store.store_private_key(&name, private_der.as_bytes())?;
        self.store
            .store_password(&self.key_id_name(&identity), key_id.as_bytes())?;
        self.store
            .store_password(&self.key_ring_id_name(&identity), key_ring_id.as_bytes())?;
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = Some(CachedKey {
            name,
            key: private_key,
        });

        info!(
            "Registered public key {} in key ring {}",
            registered.key_id, registered.key_ring_id
        );
        Ok(())
    }

    fn decrypt_sealed_data(&self, sealed_data: &[u8]) -> Result<Vec<u8>> {
        self.with_private_key(|key| sealed::open(key, sealed_data))
    }

    fn remove_all_keys(&self) -> Result<()> {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.store.remove_all()?;
        info!("Removed all telephony keys");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::MockUserSession;
    use crate::infrastructure::crypto::InMemoryKeyStore;
    use crate::infrastructure::graphql::{GraphQlError, GraphQlResponse, MockGraphQlClient};
    use serde_json::json;

    fn session() -> MockUserSession {
        let mut session = MockUserSession::new();
        session
            .expect_identity_id()
            .returning(|| Some("us-east-1:identity".to_string()));
        session
            .expect_subject()
            .returning(|| Some("subject".to_string()));
        session
    }

    #[test]
    fn test_missing_key_pair() {
        let manager = DefaultTelephonyKeyManager::new(
            Arc::new(InMemoryKeyStore::new()),
            Arc::new(session()),
            Arc::new(MockGraphQlClient::new()),
            "tel",
        );

        assert_eq!(manager.owner().unwrap(), "subject");
        assert!(!manager.has_key_pair().unwrap());
        assert_eq!(manager.key_id().unwrap(), None);
        assert!(matches!(
            manager.decrypt_sealed_data(&[0u8; 300]),
            Err(TelephonyError::DecryptSealedData(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_registers_then_opens_sealed_data() {
        let store = Arc::new(InMemoryKeyStore::new());
        let mut graphql = MockGraphQlClient::new();
        graphql
            .expect_execute()
            .withf(|op| {
                op.name == "CreatePublicKeyForTelephony"
                    && op.variables["input"]["algorithm"] == "RSAEncryptionOAEPAESCBC"
            })
            .times(1)
            .returning(|op| {
                let input = &op.variables["input"];
                Ok(GraphQlResponse::from_data(json!({
                    "createPublicKeyForTelephony": {
                        "id": "pk-1",
                        "keyId": input["keyId"],
                        "keyRingId": input["keyRingId"],
                        "algorithm": input["algorithm"],
                    }
                })))
            });

        let manager = DefaultTelephonyKeyManager::new(
            store.clone(),
            Arc::new(session()),
            Arc::new(graphql),
            "tel",
        );
        manager.generate_key_pair().await.unwrap();

        assert!(manager.has_key_pair().unwrap());
        let key_id = manager.key_id().unwrap().unwrap();
        assert!(Uuid::parse_str(&key_id).is_ok());
        assert!(store
            .password("tel.com.sudoplatform.keyIdus-east-1:identity")
            .unwrap()
            .is_some());

        let der = store.private_key("tel.us-east-1:identity").unwrap().unwrap();
        let public = RsaPrivateKey::from_pkcs8_der(&der).unwrap().to_public_key();
        let blob = sealed::seal(&public, b"+14155550100").unwrap();
        assert_eq!(manager.decrypt_sealed_data(&blob).unwrap(), b"+14155550100");

        manager.remove_all_keys().unwrap();
        assert!(!manager.has_key_pair().unwrap());
    }

    #[tokio::test]
    async fn test_rejected_registration_persists_nothing() {
        let store = Arc::new(InMemoryKeyStore::new());
        let mut graphql = MockGraphQlClient::new();
        graphql.expect_execute().returning(|_| {
            Ok(GraphQlResponse::from_errors(vec![GraphQlError::new(
                "key ring limit reached",
            )]))
        });

        let manager = DefaultTelephonyKeyManager::new(
            store.clone(),
            Arc::new(session()),
            Arc::new(graphql),
            "tel",
        );
        let err = manager.generate_key_pair().await.unwrap_err();

        assert_eq!(
            err,
            TelephonyError::CreatePublicKey("key ring limit reached".into())
        );
        assert!(!manager.has_key_pair().unwrap());
    }
}

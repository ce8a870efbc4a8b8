/// Key ring ports
use async_trait::async_trait;

use super::shared::Result;

/// Persistent storage for the key ring of one user
#[cfg_attr(test, mockall::automock)]
pub trait KeyStore: Send + Sync {
    /// PKCS#8 DER encoded private key stored under `name`
    fn private_key(&self, name: &str) -> Result<Option<Vec<u8>>>;

    fn store_private_key(&self, name: &str, der: &[u8]) -> Result<()>;

    fn password(&self, name: &str) -> Result<Option<Vec<u8>>>;

    fn store_password(&self, name: &str, value: &[u8]) -> Result<()>;

    fn remove_all(&self) -> Result<()>;
}

/// Generates, registers and uses the key pair that opens sealed fields
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelephonyKeyManager: Send + Sync {
    /// Subject of the signed-in user
    fn owner(&self) -> Result<String>;

    /// Id of the registered key pair, if one has been generated
    fn key_id(&self) -> Result<Option<String>>;

    fn key_ring_id(&self) -> Result<Option<String>>;

    fn has_key_pair(&self) -> Result<bool>;

    /// Generates a fresh key pair and registers its public half with the backend
    async fn generate_key_pair(&self) -> Result<()>;

    fn decrypt_sealed_data(&self, sealed: &[u8]) -> Result<Vec<u8>>;

    fn remove_all_keys(&self) -> Result<()>;
}

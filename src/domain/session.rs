/// Identity ports
///
/// Sign-in and ownership proofs belong to external identity services; the SDK
/// only consumes them through these traits.
use async_trait::async_trait;

use super::shared::Result;

/// The signed-in user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserSession: Send + Sync {
    fn is_registered(&self) -> bool;

    /// User subject, the owner of every record
    fn subject(&self) -> Option<String>;

    /// Federated identity id, used to namespace keys and uploads
    fn identity_id(&self) -> Option<String>;

    /// Bearer token for the GraphQL API
    async fn access_token(&self) -> Result<String>;

    async fn reset(&self) -> Result<()>;
}

/// Issues proofs that the user owns a sudo, required to provision numbers
#[async_trait]
pub trait OwnershipProofIssuer: Send + Sync {
    async fn ownership_proof(&self, sudo_id: &str, audience: &str) -> Result<String>;
}

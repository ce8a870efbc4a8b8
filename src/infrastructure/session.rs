/// Fixed-credential session and ownership proof issuer
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::config::SessionConfig;
use crate::domain::session::{OwnershipProofIssuer, UserSession};
use crate::domain::shared::{Result, TelephonyError};

/// Session backed by a pre-issued token; used by the bundled binary and tests
pub struct StaticUserSession {
    access_token: String,
    subject: String,
    identity_id: String,
    signed_in: AtomicBool,
}

impl StaticUserSession {
    pub fn new(
        access_token: impl Into<String>,
        subject: impl Into<String>,
        identity_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            subject: subject.into(),
            identity_id: identity_id.into(),
            signed_in: AtomicBool::new(true),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.access_token, &config.subject, &config.identity_id)
    }
}

#[async_trait]
impl UserSession for StaticUserSession {
    fn is_registered(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    fn subject(&self) -> Option<String> {
        self.is_registered().then(|| self.subject.clone())
    }

    fn identity_id(&self) -> Option<String> {
        self.is_registered().then(|| self.identity_id.clone())
    }

    async fn access_token(&self) -> Result<String> {
        if !self.is_registered() {
            return Err(TelephonyError::NotSignedIn);
        }
        Ok(self.access_token.clone())
    }

    async fn reset(&self) -> Result<()> {
        info!("Signing out static session {}", self.subject);
        self.signed_in.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Issues a fixed proof, for backends that accept a pre-signed token
pub struct StaticOwnershipProofIssuer {
    proof: String,
}

impl StaticOwnershipProofIssuer {
    pub fn new(proof: impl Into<String>) -> Self {
        Self {
            proof: proof.into(),
        }
    }
}

#[async_trait]
impl OwnershipProofIssuer for StaticOwnershipProofIssuer {
    async fn ownership_proof(&self, _sudo_id: &str, _audience: &str) -> Result<String> {
        Ok(self.proof.clone())
    }
}

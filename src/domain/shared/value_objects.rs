//! Shared value objects used across the telephony contexts

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const CONVERSATION_PREFIX: &str = "tl-cnv-";

/// Deterministic identifier grouping every message exchanged between a local
/// and a remote phone number for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    /// Derive the identifier for `local` and `remote` as seen by `owner`.
    ///
    /// The owner is normally a UUID subject and is used directly as the v5
    /// namespace. Other owner strings are first hashed into a namespace under
    /// the OID namespace so derivation never fails.
    pub fn derive(owner: &str, local: &str, remote: &str) -> Self {
        let namespace = Uuid::parse_str(owner)
            .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, owner.as_bytes()));
        let name = format!("{}{}", local, remote);
        let id = Uuid::new_v5(&namespace, name.as_bytes());
        Self(format!("{}{}", CONVERSATION_PREFIX, id.hyphenated()).to_lowercase())
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

/// One page of results plus the cursor of the next page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelephonyListToken<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> TelephonyListToken<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_token: None,
        }
    }

    /// True when no further pages are available
    pub fn is_last_page(&self) -> bool {
        self.next_token.is_none()
    }

    pub fn map<U, F>(self, f: F) -> TelephonyListToken<U>
    where
        F: FnMut(T) -> U,
    {
        TelephonyListToken {
            items: self.items.into_iter().map(f).collect(),
            next_token: self.next_token,
        }
    }
}

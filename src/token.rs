//! Token pair and session record.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex characters kept from the SHA-256 of the access token in log lines.
const FINGERPRINT_LEN: usize = 12;

/// Opaque bearer credentials issued by the identity provider.
///
/// Never parsed locally, only forwarded. A refresh supersedes the whole pair.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    access_token: String,
    refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Short, non-reversible identifier safe to put in logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.access_token.as_bytes());
        let mut fp = hex::encode(digest);
        fp.truncate(FINGERPRINT_LEN);
        fp
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// One authenticated identity for the current page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: String,
    pub email: String,
    pub tokens: TokenPair,
}

impl SessionRecord {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, tokens: TokenPair) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            tokens,
        }
    }
}

//! Query-parameter session store.
//!
//! Tokens live in a single URL parameter (`s` by default) as URL-safe base64
//! of `"<access>|<refresh>"`. A malformed value is treated as absent.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{SessionStore, StoreKind, StoreRead};
use crate::codec::{self, Transport};
use crate::token::TokenPair;

/// The current page URL's query parameters.
///
/// Cloning shares the same map, so the host and the store see each other's
/// edits.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    params: Arc<Mutex<BTreeMap<String, String>>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string (`a=1&b=two`, with or without a leading `?`).
    /// Pairs that fail percent-decoding are skipped.
    pub fn parse(query: &str) -> Self {
        let mut params = BTreeMap::new();
        for pair in query.trim_start_matches('?').split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let (Ok(key), Ok(value)) = (
                urlencoding::decode(&key.replace('+', " ")).map(|k| k.into_owned()),
                urlencoding::decode(&value.replace('+', " ")).map(|v| v.into_owned()),
            ) else {
                tracing::debug!("Skipping undecodable query parameter");
                continue;
            };
            params.insert(key, value);
        }
        Self {
            params: Arc::new(Mutex::new(params)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.params.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.params
            .lock()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.params.lock().remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.params.lock().is_empty()
    }

    /// Render back to a query string, keys in sorted order, without `?`.
    pub fn to_query_string(&self) -> String {
        self.params
            .lock()
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// [`SessionStore`] over one URL query parameter.
pub struct QueryParamStore {
    params: QueryParams,
    key: String,
}

impl QueryParamStore {
    pub fn new(params: QueryParams, key: &str) -> Self {
        Self {
            params,
            key: key.to_string(),
        }
    }
}

impl SessionStore for QueryParamStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Query
    }

    fn read(&self) -> StoreRead {
        let Some(raw) = self.params.get(&self.key) else {
            return StoreRead::Absent;
        };
        match codec::decode(&raw, Transport::UrlSafe) {
            Ok(tokens) => StoreRead::Payload(tokens),
            Err(e) => {
                tracing::warn!(store = "query", param = %self.key, "Ignoring malformed session parameter: {e}");
                StoreRead::Absent
            }
        }
    }

    /// A pair the parameter cannot carry is not written, and any older
    /// value is dropped so it is not restored in place of the new session.
    fn write(&self, tokens: &TokenPair) {
        match codec::encode(tokens, Transport::UrlSafe) {
            Ok(encoded) => {
                self.params.set(&self.key, &encoded);
                tracing::debug!(store = "query", fingerprint = %tokens.fingerprint(), "Session parameter saved");
            }
            Err(e) => {
                self.params.remove(&self.key);
                tracing::warn!(store = "query", param = %self.key, fingerprint = %tokens.fingerprint(), "Not saving session parameter: {e}");
            }
        }
    }

    fn clear(&self) {
        self.params.remove(&self.key);
    }
}

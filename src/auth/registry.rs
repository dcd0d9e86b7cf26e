//! Explicit registry of credential token caches.
//!
//! One token cache exists per credential identity. Rather than a
//! process-wide singleton, the registry is an ordinary object owned by
//! whatever constructs RPC channels; its lifetime is that constructor's
//! concern. Only identities the caller marks shareable are cached and
//! handed out to later lookups; non-shareable identities (for example,
//! file-based credentials) get a fresh cache per call.

use crate::auth::token_cache::{CredentialTokenCache, TokenSource};
use crate::core::config::AuthConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of token caches keyed by credential identity.
pub struct TokenCacheRegistry {
    config: AuthConfig,
    caches: Mutex<HashMap<String, Arc<CredentialTokenCache>>>,
}

impl TokenCacheRegistry {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            config: config.clone(),
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the cache for a credential identity, creating it from
    /// `make_source` on first use. A newly created cache immediately
    /// starts a background refresh so the first call is unlikely to block
    /// on an expired header.
    ///
    /// `shareable` controls whether the cache is retained for later
    /// lookups under the same key.
    pub fn get_or_create(
        &self,
        key: &str,
        shareable: bool,
        make_source: impl FnOnce() -> Arc<dyn TokenSource>,
    ) -> Arc<CredentialTokenCache> {
        if shareable {
            if let Some(existing) = self.caches.lock().get(key) {
                return Arc::clone(existing);
            }
        }

        let cache = Arc::new(CredentialTokenCache::new(make_source(), &self.config));
        // Warm the header before the first call needs it.
        cache.async_refresh();

        if shareable {
            self.caches
                .lock()
                .insert(key.to_string(), Arc::clone(&cache));
        }
        cache
    }

    /// Number of retained caches.
    pub fn len(&self) -> usize {
        self.caches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.lock().is_empty()
    }
}

//! Cached, self-refreshing bearer-token header.
//!
//! [`CredentialTokenCache`] keeps the `Authorization` header value for
//! outgoing calls usable without blocking every call on the credential
//! source. The cached header is classified by freshness against the
//! current time:
//!
//! 1. `Good`: fine to use, no refresh needed.
//! 2. `Stale`: fine to use, but a background refresh is kicked off so the
//!    header is replaced before it expires.
//! 3. `Expired`: cannot be used; the caller blocks on a refresh.
//! 4. `Exception`: a terminal refresh failure is cached and returned on
//!    every call until a later refresh succeeds.
//!
//! Only one refresh runs at a time. Expired-path callers that find a
//! refresh already in progress wait on it rather than starting another;
//! stale-path triggers never wait.

use crate::auth::backoff::ExponentialBackoff;
use crate::core::completion::CancelToken;
use crate::core::config::AuthConfig;
use crate::core::error::CredentialError;
use crate::core::time::{Clock, SystemClock};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Poll interval while waiting on a refresh another thread is running.
const REFRESH_WAIT: Duration = Duration::from_millis(250);

/// A token as returned by the credential source. `expires_at_ms` of `None`
/// means the token never expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at_ms: Option<u64>,
}

/// Failure modes of a single token fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Worth retrying with backoff.
    #[error("recoverable token fetch failure: {0}")]
    Recoverable(String),

    /// Not worth retrying; cached as terminal immediately.
    #[error("permanent token fetch failure: {0}")]
    Permanent(String),
}

/// The single credential operation this cache drives.
pub trait TokenSource: Send + Sync {
    /// Fetch a fresh token. `Ok(None)` is treated as a recoverable
    /// failure ("no token returned").
    fn fetch_token(&self) -> Result<Option<AccessToken>, FetchError>;
}

/// Freshness classification of the cached header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Good,
    Stale,
    Expired,
    Exception,
}

/// One immutable generation of the cached header. Replaced atomically on
/// each refresh, never mutated in place.
struct CachedHeader {
    /// The header value, or the terminal error of the refresh that
    /// produced this generation.
    value: Result<String, CredentialError>,
    /// Instant after which the header counts as stale; `None` never goes
    /// stale.
    stale_at_ms: Option<u64>,
    /// Instant after which the header counts as expired; `None` never
    /// expires.
    expire_at_ms: Option<u64>,
}

impl CachedHeader {
    fn from_token(token: &AccessToken, config: &AuthConfig) -> Self {
        let (stale_at_ms, expire_at_ms) = match token.expires_at_ms {
            Some(expires_at_ms) => (
                Some(expires_at_ms.saturating_sub(config.stale_offset_ms)),
                Some(expires_at_ms.saturating_sub(config.expire_offset_ms)),
            ),
            None => (None, None),
        };
        Self {
            value: Ok(format!("Bearer {}", token.value)),
            stale_at_ms,
            expire_at_ms,
        }
    }

    fn from_error(error: CredentialError) -> Self {
        Self {
            value: Err(error),
            stale_at_ms: None,
            expire_at_ms: None,
        }
    }

    fn state(&self, now_ms: u64) -> CacheState {
        if self.value.is_err() {
            return CacheState::Exception;
        }
        match self.stale_at_ms {
            None => CacheState::Good,
            Some(stale_at_ms) if now_ms < stale_at_ms => CacheState::Good,
            Some(_) => match self.expire_at_ms {
                Some(expire_at_ms) if now_ms < expire_at_ms => CacheState::Stale,
                _ => CacheState::Expired,
            },
        }
    }
}

/// Cached bearer-token header with synchronous and asynchronous refresh.
pub struct CredentialTokenCache {
    source: Arc<dyn TokenSource>,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    cache: Mutex<Option<Arc<CachedHeader>>>,
    /// True while a refresh is in flight. Guards refresh mutual exclusion;
    /// `refresh_done` wakes Expired-path waiters.
    refreshing: Mutex<bool>,
    refresh_done: Condvar,
}

impl CredentialTokenCache {
    pub fn new(source: Arc<dyn TokenSource>, config: &AuthConfig) -> Self {
        Self::with_clock(source, config, Arc::new(SystemClock), CancelToken::new())
    }

    pub fn with_clock(
        source: Arc<dyn TokenSource>,
        config: &AuthConfig,
        clock: Arc<dyn Clock>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            source,
            config: config.clone(),
            clock,
            cancel,
            cache: Mutex::new(None),
            refreshing: Mutex::new(false),
            refresh_done: Condvar::new(),
        }
    }

    /// The cancellation token that aborts in-flight refresh retries.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current freshness classification. An empty cache is `Expired`.
    pub fn state(&self) -> CacheState {
        match self.cached() {
            Some(cached) => cached.state(self.clock.now_ms()),
            None => CacheState::Expired,
        }
    }

    /// Get the `Authorization` header value for the next call.
    ///
    /// Good and Stale headers return immediately (Stale also kicks off a
    /// background refresh). Expired blocks until a refresh completes. A
    /// cached terminal error is returned on every call until a refresh
    /// succeeds.
    pub fn get_header(self: &Arc<Self>) -> Result<String, CredentialError> {
        match self.state() {
            CacheState::Good => {}
            CacheState::Stale => self.async_refresh(),
            CacheState::Expired => self.sync_refresh(),
            CacheState::Exception => {}
        }
        match self.cached() {
            Some(cached) => cached.value.clone(),
            // Only reachable when a refresh wait was cancelled before any
            // generation was ever cached.
            None => Err(CredentialError::Cancelled),
        }
    }

    /// Kick off a refresh on a background thread and return immediately.
    /// The triggering caller never waits on it.
    pub fn async_refresh(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("token-refresh".into())
            .spawn(move || {
                cache.do_refresh();
            });
        if let Err(error) = spawned {
            tracing::warn!(%error, "failed to spawn background token refresh");
        }
    }

    /// Refresh synchronously. If another thread is already refreshing,
    /// wait until its result lands (or the cache turns Good) instead of
    /// starting a redundant refresh.
    ///
    /// The in-progress check and the claim of the refresh slot happen
    /// under one lock acquisition, so a caller either performs the
    /// refresh itself or waits on the one in flight; it can never slip
    /// through between the two and return without a new generation.
    pub fn sync_refresh(self: &Arc<Self>) {
        let mut refreshing = self.refreshing.lock();
        if *refreshing {
            while *refreshing && self.state() != CacheState::Good {
                if self.cancel.is_cancelled() {
                    return;
                }
                self.refresh_done.wait_for(&mut refreshing, REFRESH_WAIT);
            }
            return;
        }
        if self.state() == CacheState::Good {
            return;
        }
        *refreshing = true;
        drop(refreshing);
        self.run_refresh();
    }

    /// Run one refresh if none is in flight and the cache is not already
    /// Good. Returns whether this thread performed the refresh.
    fn do_refresh(&self) -> bool {
        {
            let mut refreshing = self.refreshing.lock();
            if *refreshing || self.state() == CacheState::Good {
                return false;
            }
            *refreshing = true;
        }
        self.run_refresh();
        true
    }

    /// Fetch and publish a new cache generation. The caller must already
    /// hold the refresh slot (`refreshing == true`).
    fn run_refresh(&self) {
        let element = self.refresh_with_retry();
        {
            let mut refreshing = self.refreshing.lock();
            *self.cache.lock() = Some(Arc::new(element));
            *refreshing = false;
        }
        self.refresh_done.notify_all();
    }

    /// Fetch a token, retrying recoverable failures with exponential
    /// backoff until the elapsed budget runs out. Always produces a new
    /// cache generation: a header on success, a terminal error otherwise.
    fn refresh_with_retry(&self) -> CachedHeader {
        tracing::info!("refreshing the access token");
        let mut backoff: Option<ExponentialBackoff> = None;
        loop {
            let failure = match self.source.fetch_token() {
                Ok(Some(token)) => {
                    tracing::info!("refreshed the access token");
                    return CachedHeader::from_token(&token, &self.config);
                }
                Ok(None) => "token source returned no token".to_string(),
                Err(FetchError::Recoverable(message)) => message,
                Err(FetchError::Permanent(message)) => {
                    tracing::warn!(%message, "permanent failure refreshing the access token");
                    return CachedHeader::from_error(CredentialError::Refresh { message });
                }
            };
            tracing::warn!(message = %failure, "recoverable failure refreshing the access token");

            let policy = backoff.get_or_insert_with(|| {
                ExponentialBackoff::new(&self.config, Arc::clone(&self.clock))
            });
            match policy.next_delay() {
                None => {
                    tracing::warn!(
                        budget_ms = self.config.backoff_max_elapsed_ms,
                        "exhausted the retry budget for token refresh"
                    );
                    return CachedHeader::from_error(CredentialError::Refresh { message: failure });
                }
                Some(delay) => {
                    if self.cancel.wait_for(delay) {
                        tracing::warn!("token refresh cancelled while backing off");
                        return CachedHeader::from_error(CredentialError::Cancelled);
                    }
                }
            }
        }
    }

    fn cached(&self) -> Option<Arc<CachedHeader>> {
        self.cache.lock().clone()
    }
}

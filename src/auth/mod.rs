//! Credential caching: bearer-token freshness and refresh with backoff.

pub mod backoff;
pub mod registry;
pub mod token_cache;

pub use backoff::ExponentialBackoff;
pub use registry::TokenCacheRegistry;
pub use token_cache::{AccessToken, CacheState, CredentialTokenCache, FetchError, TokenSource};

//! Address and Token Directories
//!
//! In-memory, bidirectional name directories that grow as transfers are
//! observed. Both caches are safe to share between a foreground caller and a
//! background poller: each one guards its forward map and its reverse index
//! behind a single lock, so readers never see a half-applied rename.
//!
//! - [`AddressCache`]: identifier → display name (+ realness), name → identifiers
//! - [`TokenCache`]: token id → symbol, normalized symbol (with synonyms) → ids

pub mod address_cache;
pub mod state;
pub mod synonyms;
pub mod token_cache;

pub use address_cache::AddressCache;
pub use state::{AddressCacheState, AddressEntry, TokenCacheState};
pub use synonyms::SynonymTable;
pub use token_cache::TokenCache;

/// Marker used upstream and internally for "no value known"
pub const UNKNOWN: &str = "N/A";

/// True when a key is unusable as a directory key
pub(crate) fn is_unknown(key: &str) -> bool {
    key.is_empty() || key == UNKNOWN
}

//! Transfer Monitor
//!
//! Polls an on-chain intelligence API for large transfers, normalizes the
//! loosely shaped payloads into display-ready records and learns address and
//! token names along the way, so later filters can be expressed by name.
//!
//! Features:
//! - Boundary decoding of raw transfers into closed types
//! - Address/entity resolution into a shared [`directory::AddressCache`]
//! - Token symbol resolution with synonym groups
//! - Name-based filters resolved into upstream query parameters
//! - Background polling with cooperative cancellation

pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod monitor;
pub mod normalizer;
pub mod params;
pub mod raw;
pub mod resolver;

pub use client::{ArkhamClient, TransferSource};
pub use config::MonitorConfig;
pub use error::{ApiError, MonitorError, Result};
pub use filter::{FilterCriteria, FilterUpdate, TransactionFilter, DEFAULT_LIMIT};
pub use monitor::{CacheSnapshot, PollerState, StopOutcome, TransferMonitor};
pub use normalizer::{NormalizedRecord, RecordNormalizer};
pub use params::{ParamValue, QueryParams};
pub use resolver::{IdentifierResolver, ResolvedAddress};

#[cfg(test)]
mod tests;

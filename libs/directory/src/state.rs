//! Serializable cache state for snapshot/restore
//!
//! Sets are exported as sorted sequences so two exports of equal caches are
//! byte-identical; on import the order is irrelevant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the address directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    /// Current display name
    pub name: String,

    /// Sticky: true once any observation carried entity or label metadata
    pub is_real: bool,
}

/// Exported form of an [`AddressCache`](crate::AddressCache)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressCacheState {
    /// identifier → entry
    pub cache: BTreeMap<String, AddressEntry>,

    /// display name → identifiers
    pub name_to_ids: BTreeMap<String, Vec<String>>,
}

/// Exported form of a [`TokenCache`](crate::TokenCache)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCacheState {
    /// token id → uppercased symbol
    pub id_to_symbol: BTreeMap<String, String>,

    /// normalized symbol → token ids
    pub symbol_to_ids: BTreeMap<String, Vec<String>>,
}

//! Address directory
//!
//! Maps raw on-chain identifiers to the best display name seen so far and
//! keeps a reverse index from display name to every identifier stored under
//! it. Several identifiers may share one name (an exchange's hot wallets).

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::is_unknown;
use crate::state::{AddressCacheState, AddressEntry};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, AddressEntry>,
    name_to_ids: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn detach(&mut self, name: &str, identifier: &str) {
        if let Some(ids) = self.name_to_ids.get_mut(name) {
            ids.remove(identifier);
            if ids.is_empty() {
                self.name_to_ids.remove(name);
            }
        }
    }
}

/// Thread-safe identifier ↔ display name directory
#[derive(Debug, Default)]
pub struct AddressCache {
    inner: RwLock<Inner>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of `identifier`.
    ///
    /// Absent, empty and `"N/A"` identifiers are ignored. An empty or `"N/A"`
    /// display name falls back to the identifier itself. Realness is sticky:
    /// once true it stays true.
    pub fn update(&self, identifier: Option<&str>, display_name: &str, is_real_name: bool) {
        let identifier = match identifier {
            Some(id) if !is_unknown(id) => id,
            _ => return,
        };
        let name = if is_unknown(display_name) {
            identifier
        } else {
            display_name
        };

        let mut inner = self.inner.write();
        let renamed_from = match inner.entries.get_mut(identifier) {
            Some(entry) => {
                entry.is_real |= is_real_name;
                if entry.name != name {
                    Some(std::mem::replace(&mut entry.name, name.to_string()))
                } else {
                    None
                }
            }
            None => {
                inner.entries.insert(
                    identifier.to_string(),
                    AddressEntry {
                        name: name.to_string(),
                        is_real: is_real_name,
                    },
                );
                None
            }
        };

        if let Some(old_name) = renamed_from {
            debug!("Renaming {} from '{}' to '{}'", identifier, old_name, name);
            inner.detach(&old_name, identifier);
        }
        inner
            .name_to_ids
            .entry(name.to_string())
            .or_default()
            .insert(identifier.to_string());
    }

    /// Current display name of an identifier
    pub fn get_name(&self, identifier: &str) -> Option<String> {
        self.inner
            .read()
            .entries
            .get(identifier)
            .map(|entry| entry.name.clone())
    }

    /// Whether any observation of `identifier` carried real metadata
    pub fn is_real(&self, identifier: &str) -> Option<bool> {
        self.inner
            .read()
            .entries
            .get(identifier)
            .map(|entry| entry.is_real)
    }

    /// Identifiers currently stored under `name` (empty when unknown)
    pub fn get_identifiers_by_name(&self, name: &str) -> HashSet<String> {
        self.inner
            .read()
            .name_to_ids
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Sorted distinct names backed by at least one real identifier
    pub fn get_all_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        let names: BTreeSet<&String> = inner
            .name_to_ids
            .iter()
            .filter(|(_, ids)| {
                ids.iter()
                    .any(|id| inner.entries.get(id).is_some_and(|entry| entry.is_real))
            })
            .map(|(name, _)| name)
            .collect();

        names.into_iter().cloned().collect()
    }

    /// Union of the identifiers behind each name. An empty list yields an
    /// empty set; callers decide whether that means "no filter".
    pub fn find_identifiers_by_names<S: AsRef<str>>(&self, names: &[S]) -> HashSet<String> {
        let inner = self.inner.read();
        names
            .iter()
            .filter_map(|name| inner.name_to_ids.get(name.as_ref()))
            .flat_map(|ids| ids.iter().cloned())
            .collect()
    }

    /// Number of known identifiers
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Export the full bidirectional index
    pub fn get_state(&self) -> AddressCacheState {
        let inner = self.inner.read();
        AddressCacheState {
            cache: inner
                .entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect(),
            name_to_ids: inner
                .name_to_ids
                .iter()
                .map(|(name, ids)| {
                    let mut ids: Vec<String> = ids.iter().cloned().collect();
                    ids.sort();
                    (name.clone(), ids)
                })
                .collect(),
        }
    }

    /// Replace all content with `state`
    pub fn load_state(&self, state: AddressCacheState) {
        let entries: HashMap<String, AddressEntry> = state.cache.into_iter().collect();
        let name_to_ids: HashMap<String, HashSet<String>> = state
            .name_to_ids
            .into_iter()
            .map(|(name, ids)| (name, ids.into_iter().collect()))
            .collect();

        let mut inner = self.inner.write();
        inner.entries = entries;
        inner.name_to_ids = name_to_ids;
        debug!("Loaded {} addresses into cache", inner.entries.len());
    }
}

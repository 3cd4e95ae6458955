//! Token directory
//!
//! Maps token ids to uppercased symbols. The reverse index is closed over
//! synonym groups: an id registered under any alias of a group is returned
//! when querying any other alias of that group.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::state::TokenCacheState;
use crate::synonyms::SynonymTable;
use crate::{is_unknown, UNKNOWN};

#[derive(Debug, Default)]
struct Inner {
    id_to_symbol: HashMap<String, String>,
    symbol_to_ids: HashMap<String, HashSet<String>>,
}

/// Thread-safe token id ↔ symbol directory
#[derive(Debug, Default)]
pub struct TokenCache {
    synonyms: SynonymTable,
    inner: RwLock<Inner>,
}

impl TokenCache {
    /// Cache using the built-in synonym groups
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache using a custom synonym table
    pub fn with_synonyms(synonyms: SynonymTable) -> Self {
        Self {
            synonyms,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    /// Record that `token_id` trades under `symbol`.
    ///
    /// The symbol is uppercased (`"N/A"` when absent) and the id joins the
    /// bucket of every member of the symbol's synonym group. If the id was
    /// known under a different symbol it first leaves that symbol's group.
    pub fn update(&self, token_id: Option<&str>, symbol: Option<&str>) {
        let token_id = match token_id {
            Some(id) if !is_unknown(id) => id,
            _ => return,
        };
        let symbol = match symbol {
            Some(s) if !s.is_empty() => s.to_uppercase(),
            _ => UNKNOWN.to_string(),
        };

        let mut inner = self.inner.write();
        let previous = inner
            .id_to_symbol
            .insert(token_id.to_string(), symbol.clone());

        if let Some(old_symbol) = previous.filter(|old| *old != symbol) {
            debug!("Token {} changed symbol {} -> {}", token_id, old_symbol, symbol);
            for member in self.synonyms.group(&old_symbol) {
                if let Some(ids) = inner.symbol_to_ids.get_mut(&member) {
                    ids.remove(token_id);
                    if ids.is_empty() {
                        inner.symbol_to_ids.remove(&member);
                    }
                }
            }
        }

        for member in self.synonyms.group(&symbol) {
            inner
                .symbol_to_ids
                .entry(member)
                .or_default()
                .insert(token_id.to_string());
        }
    }

    /// Stored symbol of a token id
    pub fn get_symbol(&self, token_id: &str) -> Option<String> {
        self.inner.read().id_to_symbol.get(token_id).cloned()
    }

    /// Token ids registered under `symbol` or any of its synonyms
    /// (case-insensitive)
    pub fn get_ids(&self, symbol: &str) -> HashSet<String> {
        self.inner
            .read()
            .symbol_to_ids
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Sorted symbols that have at least one id
    pub fn get_all_symbols(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut symbols: Vec<String> = inner
            .symbol_to_ids
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// Union of [`get_ids`](Self::get_ids) over `symbols`
    pub fn find_ids_by_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> HashSet<String> {
        let inner = self.inner.read();
        symbols
            .iter()
            .filter_map(|symbol| inner.symbol_to_ids.get(&symbol.as_ref().to_uppercase()))
            .flat_map(|ids| ids.iter().cloned())
            .collect()
    }

    /// Copy of the symbol → ids index, empty buckets omitted
    pub fn get_symbol_to_ids_map(&self) -> HashMap<String, HashSet<String>> {
        self.inner
            .read()
            .symbol_to_ids
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(symbol, ids)| (symbol.clone(), ids.clone()))
            .collect()
    }

    /// Number of known token ids
    pub fn len(&self) -> usize {
        self.inner.read().id_to_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().id_to_symbol.is_empty()
    }

    /// Export both indexes
    pub fn get_state(&self) -> TokenCacheState {
        let inner = self.inner.read();
        TokenCacheState {
            id_to_symbol: inner
                .id_to_symbol
                .iter()
                .map(|(id, symbol)| (id.clone(), symbol.clone()))
                .collect(),
            symbol_to_ids: inner
                .symbol_to_ids
                .iter()
                .map(|(symbol, ids)| {
                    let mut ids: Vec<String> = ids.iter().cloned().collect();
                    ids.sort();
                    (symbol.clone(), ids)
                })
                .collect(),
        }
    }

    /// Replace all content with `state`
    pub fn load_state(&self, state: TokenCacheState) {
        let id_to_symbol: HashMap<String, String> = state.id_to_symbol.into_iter().collect();
        let symbol_to_ids: HashMap<String, HashSet<String>> = state
            .symbol_to_ids
            .into_iter()
            .map(|(symbol, ids)| (symbol, ids.into_iter().collect()))
            .collect();

        let mut inner = self.inner.write();
        inner.id_to_symbol = id_to_symbol;
        inner.symbol_to_ids = symbol_to_ids;
        debug!("Loaded {} tokens into cache", inner.id_to_symbol.len());
    }
}

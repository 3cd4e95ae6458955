//! Token symbol synonym groups
//!
//! Each alias maps to a canonical symbol; the canonical symbol maps to itself.
//! All aliases sharing a canonical target form one group.

use std::collections::HashMap;

/// Built-in groups: BTC ≡ BITCOIN, ETH ≡ WETH
const DEFAULT_SYNONYMS: &[(&str, &str)] = &[
    ("BTC", "BITCOIN"),
    ("BITCOIN", "BITCOIN"),
    ("ETH", "WETH"),
    ("WETH", "WETH"),
];

/// Alias → canonical symbol table, keys and values uppercased
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymTable {
    aliases: HashMap<String, String>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_SYNONYMS.iter().copied())
    }
}

impl SynonymTable {
    /// Build a table from alias/canonical pairs. Canonical targets are
    /// registered as aliases of themselves.
    pub fn from_pairs<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let mut table = Self {
            aliases: HashMap::new(),
        };
        for (alias, canonical) in pairs {
            table.insert(alias.as_ref(), canonical.as_ref());
        }
        table
    }

    /// Default groups extended with extra pairs
    pub fn with_extra<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let mut table = Self::default();
        for (alias, canonical) in pairs {
            table.insert(alias.as_ref(), canonical.as_ref());
        }
        table
    }

    fn insert(&mut self, alias: &str, canonical: &str) {
        let alias = alias.to_uppercase();
        let canonical = canonical.to_uppercase();
        self.aliases
            .entry(canonical.clone())
            .or_insert_with(|| canonical.clone());
        self.aliases.insert(alias, canonical);
    }

    /// Canonical form of a symbol; symbols outside every group are their own
    /// canonical form
    pub fn canonical(&self, symbol: &str) -> String {
        let upper = symbol.to_uppercase();
        match self.aliases.get(&upper) {
            Some(canonical) => canonical.clone(),
            None => upper,
        }
    }

    /// Every symbol (aliases and canonical) in the group of `symbol`,
    /// including `symbol` itself
    pub fn group(&self, symbol: &str) -> Vec<String> {
        let upper = symbol.to_uppercase();
        let canonical = self.canonical(&upper);

        let mut members: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, target)| **target == canonical)
            .map(|(alias, _)| alias.clone())
            .collect();
        if !members.contains(&canonical) {
            members.push(canonical);
        }
        if !members.contains(&upper) {
            members.push(upper);
        }
        members.sort();
        members
    }
}

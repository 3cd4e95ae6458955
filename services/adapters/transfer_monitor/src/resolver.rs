//! Identifier resolution for transfer participants
//!
//! Derives `(identifier, display name, realness)` from a decoded address field
//! and folds the result into the shared [`AddressCache`].
//!
//! The identifier is only ever the on-chain address string. Entity and label
//! names feed the display name but never become keys: two unrelated addresses
//! of one entity must not collapse into one key, and an entity name is not a
//! valid upstream filter parameter. Entity-only observations therefore produce
//! a display name that is never indexed.

use directory::{AddressCache, UNKNOWN};
use std::sync::Arc;

use crate::raw::{AddressField, AddressObject};

/// Outcome of resolving one side of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub identifier: Option<String>,
    pub display_name: String,
    pub is_real: bool,
}

impl ResolvedAddress {
    fn unknown() -> Self {
        Self {
            identifier: None,
            display_name: UNKNOWN.to_string(),
            is_real: false,
        }
    }
}

/// Resolves address fields and records them in the address directory
#[derive(Debug, Clone)]
pub struct IdentifierResolver {
    cache: Arc<AddressCache>,
}

impl IdentifierResolver {
    pub fn new(cache: Arc<AddressCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<AddressCache> {
        &self.cache
    }

    /// Resolve one address field and update the cache
    pub fn resolve(&self, field: &AddressField) -> ResolvedAddress {
        let resolved = describe(field);
        // No-op inside the cache when there is no identifier
        self.cache.update(
            resolved.identifier.as_deref(),
            &resolved.display_name,
            resolved.is_real,
        );
        resolved
    }

    /// Resolve a transfer side: the single-address field first, then the head
    /// of the multi-address list when the primary yielded no identifier
    pub fn resolve_side(&self, primary: &AddressField, list_head: &AddressField) -> ResolvedAddress {
        let resolved = self.resolve(primary);
        if resolved.identifier.is_none() && !list_head.is_absent() {
            return self.resolve(list_head);
        }
        resolved
    }
}

/// Pure resolution without touching any cache
pub fn describe(field: &AddressField) -> ResolvedAddress {
    match field {
        AddressField::Absent => ResolvedAddress::unknown(),
        AddressField::Plain(address) => ResolvedAddress {
            identifier: Some(address.clone()),
            display_name: shorten_address(address),
            is_real: false,
        },
        AddressField::Object(object) => describe_object(object),
    }
}

fn describe_object(object: &AddressObject) -> ResolvedAddress {
    let entity = object.entity.as_ref().map(|entity| match &entity.kind {
        Some(kind) => format!("{}({})", entity.name, capitalize(kind)),
        None => entity.name.clone(),
    });

    let display_name = match (entity.as_deref(), object.label.as_deref(), object.address.as_deref()) {
        (Some(entity), Some(label), _) => format!("{} - {}", entity, label),
        (Some(entity), None, _) => entity.to_string(),
        (None, Some(label), _) => label.to_string(),
        (None, None, Some(address)) => shorten_address(address),
        (None, None, None) => UNKNOWN.to_string(),
    };

    ResolvedAddress {
        identifier: object.address.clone(),
        display_name,
        is_real: object.entity.is_some() || object.label.is_some(),
    }
}

/// `first5...last5` for addresses longer than ten characters
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..5].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        address.to_string()
    }
}

/// First character uppercased, the rest lowercased
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

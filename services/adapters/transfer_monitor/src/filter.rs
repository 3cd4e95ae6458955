//! Filter criteria and their resolution into upstream query parameters
//!
//! Names and symbols are resolved into identifier sets once, when the filter
//! is updated. Later cache growth does not refresh an existing filter; apply
//! the filter again to re-resolve.
//!
//! A dimension whose names resolve to no identifiers is left out of the
//! query entirely, so the upstream request is not constrained on it. Callers
//! that need "match nothing" semantics enable client-side matching (see
//! [`TransactionFilter::matches`]).

use directory::{AddressCache, TokenCache};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::normalizer::NormalizedRecord;
use crate::params::{ParamValue, QueryParams};

/// Default `limit` query parameter
pub const DEFAULT_LIMIT: u32 = 100;

/// New criteria for [`TransactionFilter::update`]; every field replaces the
/// previous value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterUpdate {
    pub min_usd: Option<f64>,
    /// Upstream time window, e.g. `24h`, `7d`
    pub lookback: Option<String>,
    pub token_symbols: Option<Vec<String>>,
    pub from_names: Option<Vec<String>>,
    pub to_names: Option<Vec<String>>,
}

/// Active criteria with their resolved identifier sets.
///
/// `None` means the dimension is inactive; `Some` with an empty set means it
/// is active but nothing in the caches satisfies it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub min_usd: Option<f64>,
    pub lookback: Option<String>,
    pub token_symbols: Option<Vec<String>>,
    pub from_names: Option<Vec<String>>,
    pub to_names: Option<Vec<String>>,
    pub token_ids: Option<HashSet<String>>,
    pub from_ids: Option<HashSet<String>>,
    pub to_ids: Option<HashSet<String>>,
}

/// Holds the single active filter of a monitoring session
#[derive(Debug)]
pub struct TransactionFilter {
    address_cache: Arc<AddressCache>,
    token_cache: Arc<TokenCache>,
    criteria: FilterCriteria,
}

impl TransactionFilter {
    pub fn new(address_cache: Arc<AddressCache>, token_cache: Arc<TokenCache>) -> Self {
        Self {
            address_cache,
            token_cache,
            criteria: FilterCriteria::default(),
        }
    }

    /// Replace the criteria and resolve names and symbols against the caches
    pub fn update(&mut self, update: FilterUpdate) {
        let FilterUpdate {
            min_usd,
            lookback,
            token_symbols,
            from_names,
            to_names,
        } = update;

        // An empty list is the same as no list
        let token_symbols = token_symbols.filter(|list| !list.is_empty());
        let from_names = from_names.filter(|list| !list.is_empty());
        let to_names = to_names.filter(|list| !list.is_empty());
        let lookback = lookback.filter(|window| !window.is_empty());

        let token_ids = token_symbols
            .as_deref()
            .map(|symbols| self.token_cache.find_ids_by_symbols(symbols));
        let from_ids = from_names
            .as_deref()
            .map(|names| self.address_cache.find_identifiers_by_names(names));
        let to_ids = to_names
            .as_deref()
            .map(|names| self.address_cache.find_identifiers_by_names(names));

        info!(
            "Filters updated: USD>={:?}, lookback={:?}, tokens={:?}, from={:?}, to={:?}",
            min_usd, lookback, token_symbols, from_names, to_names
        );

        self.criteria = FilterCriteria {
            min_usd,
            lookback,
            token_symbols,
            from_names,
            to_names,
            token_ids,
            from_ids,
            to_ids,
        };
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Query parameters for the current criteria
    pub fn get_api_params(&self, limit: u32) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("limit", limit);

        if let Some(lookback) = &self.criteria.lookback {
            params.insert("timeLast", lookback.as_str());
        }
        if let Some(min_usd) = self.criteria.min_usd {
            params.insert("usdGte", usd_param(min_usd));
        }

        insert_id_param(&mut params, "tokens", self.criteria.token_ids.as_ref());
        insert_id_param(&mut params, "fromAddresses", self.criteria.from_ids.as_ref());
        insert_id_param(&mut params, "toAddresses", self.criteria.to_ids.as_ref());
        params
    }

    /// Post-fetch check against the resolved criteria. An active dimension
    /// with an empty resolved set matches nothing.
    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        if let Some(min_usd) = self.criteria.min_usd {
            match record.usd_numeric {
                Some(usd) if usd >= min_usd => {}
                _ => return false,
            }
        }

        id_allowed(self.criteria.token_ids.as_ref(), Some(record.token_id.as_str()))
            && id_allowed(self.criteria.from_ids.as_ref(), record.from_identifier.as_deref())
            && id_allowed(self.criteria.to_ids.as_ref(), record.to_identifier.as_deref())
    }
}

/// `usdGte` value: an integer when there is no fractional part
pub fn usd_param(min_usd: f64) -> ParamValue {
    if min_usd.fract() == 0.0 && min_usd.abs() < i64::MAX as f64 {
        ParamValue::Integer(min_usd as i64)
    } else {
        ParamValue::Text(min_usd.to_string())
    }
}

fn insert_id_param(params: &mut QueryParams, key: &str, ids: Option<&HashSet<String>>) {
    let Some(ids) = ids else {
        return;
    };
    if ids.is_empty() {
        debug!("Filter '{}' is active but resolved to no identifiers, not sending it", key);
        return;
    }

    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let value = sorted.join(",").to_lowercase();
    debug!("Adding API parameter '{}': {}", key, value);
    params.insert(key, value);
}

fn id_allowed(allowed: Option<&HashSet<String>>, id: Option<&str>) -> bool {
    match (allowed, id) {
        (None, _) => true,
        (Some(allowed), Some(id)) => allowed.contains(id),
        (Some(_), None) => false,
    }
}

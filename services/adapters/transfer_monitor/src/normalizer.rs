//! Record normalization
//!
//! Turns raw transfer objects into [`NormalizedRecord`]s, populating the
//! address and token directories as a side effect. Normalization never fails
//! on a malformed field; only a non-object transfer is skipped.

use directory::{AddressCache, TokenCache, UNKNOWN};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::format::{format_quantity, format_timestamp, format_usd, usd_numeric};
use crate::raw::RawTransfer;
use crate::resolver::IdentifierResolver;

/// Namespace prefix of locally derived transaction ids
pub const SYNTHETIC_TX_PREFIX: &str = "arkham_client_generated";

/// Token id used when neither a token id nor a chain is present
pub const UNKNOWN_CHAIN: &str = "UNKNOWN_CHAIN";

/// One transfer ready for display and filtering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    /// `YYYY-MM-DD HH:MM:SS`, or the raw timestamp when unparsable
    pub timestamp: String,
    pub chain: String,
    pub from: String,
    pub to: String,
    pub symbol: String,
    pub quantity: String,
    pub usd: String,

    pub from_identifier: Option<String>,
    pub to_identifier: Option<String>,
    pub token_id: String,
    /// Unrounded USD value for comparisons
    pub usd_numeric: Option<f64>,
    /// Native hash/txid, a synthetic digest, or `"N/A"`
    pub tx_id: String,
    /// Original transfer object
    pub raw: Value,
}

/// Normalizes raw transfers against shared directories
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    resolver: IdentifierResolver,
    token_cache: Arc<TokenCache>,
}

impl RecordNormalizer {
    pub fn new(address_cache: Arc<AddressCache>, token_cache: Arc<TokenCache>) -> Self {
        Self {
            resolver: IdentifierResolver::new(address_cache),
            token_cache,
        }
    }

    pub fn address_cache(&self) -> &Arc<AddressCache> {
        self.resolver.cache()
    }

    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.token_cache
    }

    /// Normalize one transfer; `None` when `value` is not an object
    pub fn normalize_one(&self, value: &Value) -> Option<NormalizedRecord> {
        let Some(raw) = RawTransfer::from_value(value) else {
            warn!("Skipping invalid transfer record: {}", value);
            return None;
        };

        let from = self.resolver.resolve_side(&raw.from, &raw.from_list_head);
        let to = self.resolver.resolve_side(&raw.to, &raw.to_list_head);
        let (token_id, symbol) = self.register_token(&raw);

        let tx_id = match raw.tx_hash.clone() {
            Some(hash) => hash,
            None => synthetic_tx_id(
                &raw,
                from.identifier.as_deref(),
                to.identifier.as_deref(),
                &token_id,
            ),
        };

        Some(NormalizedRecord {
            timestamp: format_timestamp(raw.block_timestamp.as_deref()),
            chain: raw.chain.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            from: from.display_name,
            to: to.display_name,
            symbol,
            quantity: format_quantity(raw.unit_value.as_ref()),
            usd: format_usd(raw.historical_usd.as_ref()),
            from_identifier: from.identifier,
            to_identifier: to.identifier,
            token_id,
            usd_numeric: usd_numeric(raw.historical_usd.as_ref()),
            tx_id,
            raw: value.clone(),
        })
    }

    /// Normalize a `{transfers: [...], count}` response
    pub fn normalize_batch(&self, response: &Value) -> Vec<NormalizedRecord> {
        let Some(transfers) = response.get("transfers").and_then(Value::as_array) else {
            warn!("API response does not contain a transfers list");
            return Vec::new();
        };

        let records: Vec<NormalizedRecord> = transfers
            .iter()
            .filter_map(|transfer| self.normalize_one(transfer))
            .collect();

        if !records.is_empty() {
            let upstream_count = response
                .get("count")
                .and_then(Value::as_u64)
                .unwrap_or(records.len() as u64);
            info!(
                "Processed {} transfers (API count: {})",
                records.len(),
                upstream_count
            );
        }
        records
    }

    /// Token id and display symbol with chain fallbacks, recorded in the token
    /// directory either way
    fn register_token(&self, raw: &RawTransfer) -> (String, String) {
        let chain_upper = raw.chain.as_ref().map(|chain| chain.to_uppercase());

        let token_id = raw
            .token_id
            .clone()
            .or_else(|| chain_upper.clone())
            .unwrap_or_else(|| UNKNOWN_CHAIN.to_string());
        let symbol = raw
            .token_symbol
            .clone()
            .or_else(|| raw.token_name.clone())
            .or(chain_upper)
            .unwrap_or_else(|| UNKNOWN.to_string());

        self.token_cache.update(Some(token_id.as_str()), Some(symbol.as_str()));
        (token_id, symbol)
    }
}

/// Deterministic id over the fields that identify a transfer
fn synthetic_tx_id(
    raw: &RawTransfer,
    from_id: Option<&str>,
    to_id: Option<&str>,
    token_id: &str,
) -> String {
    let unit_value = raw.unit_value.as_ref().map(|value| value.to_value());
    let parts = [
        serde_json::to_string(&raw.block_timestamp),
        serde_json::to_string(&from_id),
        serde_json::to_string(&to_id),
        serde_json::to_string(token_id),
        serde_json::to_string(&unit_value),
        serde_json::to_string(&raw.chain),
    ];

    let input = match parts.into_iter().collect::<Result<Vec<_>, _>>() {
        Ok(parts) => parts.join("|"),
        Err(e) => {
            warn!("Failed to derive transaction id: {}, using {}", e, UNKNOWN);
            return UNKNOWN.to_string();
        }
    };

    let digest = Sha256::digest(input.as_bytes());
    let tx_id = format!("{}:{}", SYNTHETIC_TX_PREFIX, hex::encode(digest));
    debug!("Derived transaction id {} from {}", tx_id, input);
    tx_id
}

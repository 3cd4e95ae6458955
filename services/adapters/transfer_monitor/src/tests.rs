//! Tests for TransferMonitor

use super::*;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// Source replaying canned responses, then empty batches
struct CannedSource {
    responses: parking_lot::Mutex<VecDeque<std::result::Result<Value, ApiError>>>,
    seen_params: parking_lot::Mutex<Vec<QueryParams>>,
}

impl CannedSource {
    fn new(responses: Vec<std::result::Result<Value, ApiError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: parking_lot::Mutex::new(responses.into()),
            seen_params: parking_lot::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TransferSource for CannedSource {
    async fn fetch(&self, params: &QueryParams) -> std::result::Result<Value, ApiError> {
        self.seen_params.lock().push(params.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({"transfers": [], "count": 0})))
    }
}

fn eth_transfer(hash: &str, from: &str, usd: f64) -> Value {
    json!({
        "transactionHash": hash,
        "fromAddress": {
            "address": from,
            "arkhamEntity": {"name": "Binance", "type": "cex"}
        },
        "toAddress": "0xreceiver0000000000000000000000000000000",
        "tokenId": "ethereum",
        "tokenSymbol": "ETH",
        "chain": "ethereum",
        "unitValue": "12.5",
        "historicalUSD": usd,
        "blockTimestamp": "2025-05-05T10:30:00Z"
    })
}

#[tokio::test]
async fn test_initialize_cache_populates_directories() {
    let source = CannedSource::new(vec![Ok(json!({
        "transfers": [eth_transfer("0x1", "0xbinance1", 1_000_000.0)],
        "count": 1
    }))]);
    let monitor = TransferMonitor::with_source(source.clone(), MonitorConfig::default());

    monitor.initialize_cache("1d", 100000.0, 100).await.unwrap();

    assert_eq!(monitor.known_address_names(), vec!["Binance(Cex)"]);
    assert_eq!(monitor.known_token_symbols(), vec!["ETH", "WETH"]);
    assert!(monitor.last_batch().is_empty());

    let params = source.seen_params.lock()[0].clone();
    assert_eq!(params.get("timeLast"), Some(&ParamValue::Text("1d".to_string())));
    assert_eq!(params.get("usdGte"), Some(&ParamValue::Integer(100000)));
    assert_eq!(params.get("limit"), Some(&ParamValue::Integer(100)));
}

#[tokio::test]
async fn test_initialize_cache_surfaces_api_errors() {
    let source = CannedSource::new(vec![Err(ApiError::Authentication)]);
    let monitor = TransferMonitor::with_source(source, MonitorConfig::default());

    let err = monitor.initialize_cache("1d", 100000.0, 100).await.unwrap_err();
    assert!(matches!(err, MonitorError::Api(ApiError::Authentication)));
}

#[tokio::test]
async fn test_get_transactions_uses_resolved_filters() {
    let source = CannedSource::new(vec![
        Ok(json!({"transfers": [eth_transfer("0x1", "0xbinance1", 500_000.0)], "count": 1})),
        Ok(json!({"transfers": [eth_transfer("0x2", "0xbinance1", 750_000.0)], "count": 1})),
    ]);
    let monitor = TransferMonitor::with_source(source.clone(), MonitorConfig::default());

    monitor.initialize_cache("1d", 100000.0, 100).await.unwrap();
    monitor.set_filters(FilterUpdate {
        min_usd: Some(250000.5),
        from_names: Some(vec!["Binance(Cex)".to_string()]),
        ..Default::default()
    });

    let records = monitor.get_transactions(20).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tx_id, "0x2");
    assert_eq!(monitor.last_batch(), records);

    let params = source.seen_params.lock()[1].clone();
    assert_eq!(params.get("fromAddresses"), Some(&ParamValue::Text("0xbinance1".to_string())));
    assert_eq!(params.get("usdGte"), Some(&ParamValue::Text("250000.5".to_string())));
    assert_eq!(params.get("limit"), Some(&ParamValue::Integer(20)));
}

#[tokio::test]
async fn test_fetch_error_clears_last_batch() {
    let source = CannedSource::new(vec![
        Ok(json!({"transfers": [eth_transfer("0x1", "0xa", 1.0)], "count": 1})),
        Err(ApiError::Http {
            status: 500,
            body: "boom".to_string(),
        }),
    ]);
    let monitor = TransferMonitor::with_source(source, MonitorConfig::default());

    assert_eq!(monitor.get_transactions(10).await.unwrap().len(), 1);
    assert_eq!(monitor.last_batch().len(), 1);

    let err = monitor.get_transactions(10).await.unwrap_err();
    assert!(matches!(err, MonitorError::Api(ApiError::Http { status: 500, .. })));
    assert!(monitor.last_batch().is_empty());
}

#[tokio::test]
async fn test_client_side_filtering_is_opt_in() {
    let batch = json!({"transfers": [eth_transfer("0x1", "0xa", 1.0)], "count": 1});
    let unsatisfiable = FilterUpdate {
        token_symbols: Some(vec!["DOGE".to_string()]),
        ..Default::default()
    };

    let default_monitor =
        TransferMonitor::with_source(CannedSource::new(vec![Ok(batch.clone())]), MonitorConfig::default());
    default_monitor.set_filters(unsatisfiable.clone());
    assert!(!default_monitor.api_params(10).contains_key("tokens"));
    assert_eq!(default_monitor.get_transactions(10).await.unwrap().len(), 1);

    let config = MonitorConfig {
        client_side_filtering: true,
        ..Default::default()
    };
    let filtering_monitor = TransferMonitor::with_source(CannedSource::new(vec![Ok(batch)]), config);
    filtering_monitor.set_filters(unsatisfiable);
    assert!(filtering_monitor.get_transactions(10).await.unwrap().is_empty());
    assert_eq!(filtering_monitor.last_batch().len(), 1);
}

#[tokio::test]
async fn test_export_import_state() {
    let source = CannedSource::new(vec![Ok(json!({
        "transfers": [eth_transfer("0x1", "0xbinance1", 1.0)],
        "count": 1
    }))]);
    let monitor = TransferMonitor::with_source(source, MonitorConfig::default());
    monitor.get_transactions(10).await.unwrap();

    let snapshot = monitor.export_state();
    let json = serde_json::to_string(&snapshot).unwrap();

    let restored = TransferMonitor::with_source(CannedSource::new(vec![]), MonitorConfig::default());
    restored.import_state(serde_json::from_str(&json).unwrap());
    assert_eq!(restored.known_address_names(), monitor.known_address_names());
    assert_eq!(restored.token_symbol_map(), monitor.token_symbol_map());

    // Only the token section: the address cache stays as it is
    restored.import_state(CacheSnapshot {
        address_cache: None,
        token_cache: Some(Default::default()),
    });
    assert_eq!(restored.known_address_names(), vec!["Binance(Cex)"]);
    assert!(restored.known_token_symbols().is_empty());
}

#[tokio::test]
async fn test_shared_caches_between_monitors() {
    let addresses = Arc::new(directory::AddressCache::new());
    let tokens = Arc::new(directory::TokenCache::new());

    let first = TransferMonitor::with_parts(
        CannedSource::new(vec![Ok(json!({
            "transfers": [eth_transfer("0x1", "0xbinance1", 1.0)],
            "count": 1
        }))]),
        MonitorConfig::default(),
        addresses.clone(),
        tokens.clone(),
    );
    let second = TransferMonitor::with_parts(
        CannedSource::new(vec![]),
        MonitorConfig::default(),
        addresses,
        tokens,
    );

    first.get_transactions(10).await.unwrap();
    assert_eq!(second.known_address_names(), vec!["Binance(Cex)"]);
    assert_eq!(second.token_cache().get_ids("weth").len(), 1);
}

#[tokio::test]
async fn test_configured_synonyms_extend_defaults() {
    let mut config = MonitorConfig::default();
    config
        .token_synonyms
        .insert("xbt".to_string(), "bitcoin".to_string());
    let monitor = TransferMonitor::with_source(CannedSource::new(vec![]), config);

    monitor.token_cache().update(Some("bitcoin"), Some("BTC"));
    assert_eq!(monitor.token_cache().get_ids("XBT").len(), 1);
    assert_eq!(monitor.token_cache().get_ids("ETH").len(), 0);
}

#[tokio::test]
async fn test_stop_when_not_running() {
    let monitor = TransferMonitor::with_source(CannedSource::new(vec![]), MonitorConfig::default());
    assert_eq!(monitor.poller_state(), PollerState::Idle);
    assert_eq!(
        monitor.stop_polling(std::time::Duration::from_secs(1)).await,
        StopOutcome::NotRunning
    );
}

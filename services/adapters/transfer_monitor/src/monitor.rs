//! Transfer Monitor
//!
//! Owns the address and token directories, the active filter and the
//! transport, and runs the background polling loop. The directories are the
//! only state shared with the polling task; both are lock-guarded.

use directory::{AddressCache, AddressCacheState, SynonymTable, TokenCache, TokenCacheState, UNKNOWN};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::client::{ArkhamClient, TransferSource};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::filter::{usd_param, FilterCriteria, FilterUpdate, TransactionFilter};
use crate::normalizer::{NormalizedRecord, RecordNormalizer};
use crate::params::QueryParams;

/// Lifecycle of the background poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Stopping,
}

/// Result of [`TransferMonitor::stop_polling`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No poller was running
    NotRunning,
    /// The poller exited within the timeout
    Stopped,
    /// The poller was signalled but had not exited when the timeout elapsed.
    /// It is not aborted and exits at its next cycle boundary.
    TimedOut,
}

/// Serialized form of both directories.
///
/// A missing section leaves the corresponding cache untouched on import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSnapshot {
    pub address_cache: Option<AddressCacheState>,
    pub token_cache: Option<TokenCacheState>,
}

/// State shared between the caller and the polling task
struct Shared {
    source: Arc<dyn TransferSource>,
    normalizer: RecordNormalizer,
    filter: RwLock<TransactionFilter>,
    last_batch: Mutex<Vec<NormalizedRecord>>,
    state: Mutex<PollerState>,
    client_side_filtering: bool,
}

impl Shared {
    /// Fetch with the current filter parameters and normalize the response
    async fn fetch_and_normalize(&self, limit: u32) -> Result<Vec<NormalizedRecord>> {
        let params = self.filter.read().get_api_params(limit);
        debug!("Fetching transfers with {:?}", params);

        match self.source.fetch(&params).await {
            Ok(response) => {
                let records = self.normalizer.normalize_batch(&response);
                *self.last_batch.lock() = records.clone();
                Ok(records)
            }
            Err(e) => {
                self.last_batch.lock().clear();
                Err(e.into())
            }
        }
    }

    /// Records that pass the post-fetch filter, when it is enabled
    fn select(&self, records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
        if !self.client_side_filtering {
            return records;
        }
        let filter = self.filter.read();
        records.into_iter().filter(|record| filter.matches(record)).collect()
    }
}

struct Poller {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Monitors large transfers through a [`TransferSource`]
pub struct TransferMonitor {
    config: MonitorConfig,
    address_cache: Arc<AddressCache>,
    token_cache: Arc<TokenCache>,
    shared: Arc<Shared>,
    poller: Mutex<Option<Poller>>,
}

impl TransferMonitor {
    /// Monitor backed by the HTTP client
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let client = ArkhamClient::new(&config)?;
        info!("Transfer Monitor initialized, API URL: {}", client.base_url());
        Ok(Self::with_source(Arc::new(client), config))
    }

    /// Monitor with its own fresh directories and an injected source
    pub fn with_source(source: Arc<dyn TransferSource>, config: MonitorConfig) -> Self {
        let address_cache = Arc::new(AddressCache::new());
        let token_cache = Arc::new(TokenCache::with_synonyms(SynonymTable::with_extra(
            config.token_synonyms.iter(),
        )));
        Self::with_parts(source, config, address_cache, token_cache)
    }

    /// Monitor over directories that may be shared with other collaborators
    pub fn with_parts(
        source: Arc<dyn TransferSource>,
        config: MonitorConfig,
        address_cache: Arc<AddressCache>,
        token_cache: Arc<TokenCache>,
    ) -> Self {
        let shared = Arc::new(Shared {
            source,
            normalizer: RecordNormalizer::new(address_cache.clone(), token_cache.clone()),
            filter: RwLock::new(TransactionFilter::new(address_cache.clone(), token_cache.clone())),
            last_batch: Mutex::new(Vec::new()),
            state: Mutex::new(PollerState::Idle),
            client_side_filtering: config.client_side_filtering,
        });

        Self {
            config,
            address_cache,
            token_cache,
            shared,
            poller: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn address_cache(&self) -> &Arc<AddressCache> {
        &self.address_cache
    }

    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.token_cache
    }

    pub fn normalizer(&self) -> &RecordNormalizer {
        &self.shared.normalizer
    }

    /// One fetch that only populates the directories
    pub async fn initialize_cache(&self, lookback: &str, min_usd: f64, limit: u32) -> Result<()> {
        info!(
            "Initializing cache: lookback={}, usd_gte={}, limit={}",
            lookback, min_usd, limit
        );
        let mut params = QueryParams::new();
        params.insert("timeLast", lookback);
        params.insert("usdGte", usd_param(min_usd));
        params.insert("limit", limit);

        let response = self.shared.source.fetch(&params).await.map_err(|e| {
            error!("API error while initializing cache: {}", e);
            e
        })?;
        self.shared.normalizer.normalize_batch(&response);

        info!(
            "Cache initialized: {} addresses, {} tokens",
            self.address_cache.get_all_names().len(),
            self.token_cache.get_all_symbols().len()
        );
        Ok(())
    }

    /// Replace the active filter criteria
    pub fn set_filters(&self, update: FilterUpdate) {
        self.shared.filter.write().update(update);
    }

    pub fn filter_criteria(&self) -> FilterCriteria {
        self.shared.filter.read().criteria().clone()
    }

    /// Query parameters the next fetch will send
    pub fn api_params(&self, limit: u32) -> QueryParams {
        self.shared.filter.read().get_api_params(limit)
    }

    /// One-shot fetch with the current filters
    pub async fn get_transactions(&self, limit: u32) -> Result<Vec<NormalizedRecord>> {
        let records = self.shared.fetch_and_normalize(limit).await.map_err(|e| {
            error!("API error while fetching transfers: {}", e);
            e
        })?;
        let records = self.shared.select(records);
        info!("Found {} transfers after filtering", records.len());
        Ok(records)
    }

    /// Records produced by the most recent fetch
    pub fn last_batch(&self) -> Vec<NormalizedRecord> {
        self.shared.last_batch.lock().clone()
    }

    pub fn known_address_names(&self) -> Vec<String> {
        self.address_cache.get_all_names()
    }

    pub fn known_token_symbols(&self) -> Vec<String> {
        self.token_cache.get_all_symbols()
    }

    pub fn token_symbol_map(&self) -> HashMap<String, HashSet<String>> {
        self.token_cache.get_symbol_to_ids_map()
    }

    pub fn export_state(&self) -> CacheSnapshot {
        CacheSnapshot {
            address_cache: Some(self.address_cache.get_state()),
            token_cache: Some(self.token_cache.get_state()),
        }
    }

    /// Replace the directories present in `snapshot`
    pub fn import_state(&self, snapshot: CacheSnapshot) {
        match snapshot.address_cache {
            Some(state) => {
                self.address_cache.load_state(state);
                info!("Address cache restored with {} entries", self.address_cache.len());
            }
            None => warn!("Snapshot has no address_cache section, address cache left unchanged"),
        }
        match snapshot.token_cache {
            Some(state) => {
                self.token_cache.load_state(state);
                info!("Token cache restored with {} entries", self.token_cache.len());
            }
            None => warn!("Snapshot has no token_cache section, token cache left unchanged"),
        }
    }

    pub fn poller_state(&self) -> PollerState {
        *self.shared.state.lock()
    }

    /// Start the background poller; must be called inside a tokio runtime.
    ///
    /// `callback` runs once per transfer not present in the previous batch.
    /// Its errors and panics are logged and do not stop the loop. Returns
    /// `false` without doing anything when a poller is already active.
    pub fn start_polling<F>(&self, interval: Duration, callback: F) -> bool
    where
        F: Fn(&NormalizedRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut poller = self.poller.lock();
        {
            let mut state = self.shared.state.lock();
            if *state != PollerState::Idle {
                warn!("Polling is already running ({:?}), ignoring start", *state);
                return false;
            }
            *state = PollerState::Running;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_polling_loop(
            self.shared.clone(),
            interval,
            self.config.default_limit,
            callback,
            stop_rx,
        ));
        *poller = Some(Poller { stop_tx, handle });
        true
    }

    /// Signal the poller and wait up to `timeout` for it to exit
    pub async fn stop_polling(&self, timeout: Duration) -> StopOutcome {
        let Some(Poller { stop_tx, handle }) = self.poller.lock().take() else {
            info!("Polling is not running");
            return StopOutcome::NotRunning;
        };

        info!("Stopping transfer polling");
        {
            let mut state = self.shared.state.lock();
            if *state == PollerState::Running {
                *state = PollerState::Stopping;
            }
        }
        // The task may already have exited and dropped its receiver
        let _ = stop_tx.send(true);

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {
                info!("Transfer polling stopped");
                StopOutcome::Stopped
            }
            Ok(Err(e)) => {
                error!("Polling task terminated abnormally: {}", e);
                *self.shared.state.lock() = PollerState::Idle;
                StopOutcome::Stopped
            }
            Err(_) => {
                warn!("Polling task did not finish within {:?}", timeout);
                StopOutcome::TimedOut
            }
        }
    }
}

impl Drop for TransferMonitor {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            let _ = poller.stop_tx.send(true);
        }
    }
}

async fn run_polling_loop<F>(
    shared: Arc<Shared>,
    interval: Duration,
    limit: u32,
    callback: F,
    mut stop_rx: watch::Receiver<bool>,
) where
    F: Fn(&NormalizedRecord) -> anyhow::Result<()> + Send + Sync + 'static,
{
    info!("Starting transfer polling every {:?}", interval);
    let mut previous_ids: HashSet<String> = HashSet::new();

    loop {
        if *stop_rx.borrow() {
            break;
        }
        let started = Instant::now();

        let records = match shared.fetch_and_normalize(limit).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to fetch transfers: {}", e);
                Vec::new()
            }
        };
        let current_ids: HashSet<String> = records
            .iter()
            .filter(|record| record.tx_id != UNKNOWN)
            .map(|record| record.tx_id.clone())
            .collect();

        let mut reported = 0usize;
        for record in shared.select(records) {
            if record.tx_id == UNKNOWN || previous_ids.contains(&record.tx_id) {
                continue;
            }
            reported += 1;
            match catch_unwind(AssertUnwindSafe(|| callback(&record))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Transfer callback failed for {}: {:#}", record.tx_id, e),
                Err(_) => error!("Transfer callback panicked for {}", record.tx_id),
            }
        }
        if reported > 0 {
            info!("Detected {} new transfers", reported);
        }
        previous_ids = current_ids;

        let elapsed = started.elapsed();
        let wait = interval.saturating_sub(elapsed);
        debug!("Polling cycle took {:?}, sleeping {:?}", elapsed, wait);

        tokio::select! {
            _ = sleep(wait) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    *shared.state.lock() = PollerState::Idle;
    info!("Transfer polling loop exited");
}

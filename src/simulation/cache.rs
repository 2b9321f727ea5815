//! Content-addressed cache of finished simulations.
//!
//! A run is fully determined by its price series and parameters, so the key
//! is a SHA-256 digest over a canonical encoding of both. Equal inputs always
//! map to the same entry, however the decimals were originally scaled.
//!
//! ```text
//! cache_key(series, params) -> "9f2c..."   // hex SHA-256
//! SimulationCache
//! ├── entries   // key -> Arc<SimulationOutput>
//! └── order     // insertion order, oldest evicted first
//! ```

use super::{MarginSimulator, SimulationError, SimulationOutput, SimulationParameters};
use crate::data::PriceObservation;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Bumped whenever the encoding below or the recurrence changes.
const KEY_VERSION: &str = "hms-sim-v1";

/// Hex SHA-256 of the simulation inputs.
pub fn cache_key(series: &[PriceObservation], params: &SimulationParameters) -> String {
    let mut hasher = Sha256::new();

    hasher.update(KEY_VERSION.as_bytes());
    hasher.update(b"\n");
    hasher.update(
        format!(
            "q={};h={};m={};i={};w={};c={}\n",
            params.quantity.normalize(),
            params.hedge_ratio.normalize(),
            params.margin_rate.normalize(),
            params.inject_threshold_multiple.normalize(),
            params.withdraw_threshold_multiple.normalize(),
            params.cycle_days,
        )
        .as_bytes(),
    );

    hasher.update(format!("n={}\n", series.len()).as_bytes());
    for obs in series {
        hasher.update(
            format!(
                "{}|{}|{}\n",
                obs.date,
                obs.spot_price.normalize(),
                obs.futures_price.normalize()
            )
            .as_bytes(),
        );
    }

    hex::encode(hasher.finalize())
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<SimulationOutput>>,
    order: VecDeque<String>,
}

/// Bounded, thread-safe memo of simulation outputs.
pub struct SimulationCache {
    state: RwLock<CacheState>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SimulationCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached output for these inputs, simulating on a miss.
    ///
    /// Misses run the lenient simulator. Errors are returned and never cached.
    pub async fn get_or_simulate(
        &self,
        series: &[PriceObservation],
        params: &SimulationParameters,
    ) -> Result<Arc<SimulationOutput>, SimulationError> {
        let key = cache_key(series, params);

        if let Some(output) = self.state.read().await.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Simulation cache hit: {}", &key[..12]);
            return Ok(Arc::clone(output));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Simulation cache miss: {}", &key[..12]);

        let output = Arc::new(MarginSimulator::new(params.clone()).simulate(series)?);

        let mut state = self.state.write().await;
        // Another task may have filled the slot while we were simulating
        if let Some(existing) = state.entries.get(&key) {
            return Ok(Arc::clone(existing));
        }

        while state.entries.len() >= self.max_entries {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }

        state.order.push_back(key.clone());
        state.entries.insert(key, Arc::clone(&output));

        Ok(output)
    }

    /// Look up an entry by key without simulating.
    pub async fn get(&self, key: &str) -> Option<Arc<SimulationOutput>> {
        self.state.read().await.entries.get(key).cloned()
    }

    /// Remove one entry. Returns true if it was present.
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut state = self.state.write().await;
        state.order.retain(|k| k != key);
        state.entries.remove(key).is_some()
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.order.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl fmt::Debug for SimulationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationCache")
            .field("max_entries", &self.max_entries)
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

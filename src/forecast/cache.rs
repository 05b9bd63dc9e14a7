//! # Forecast cache
//!
//! Bounded LRU map from fingerprint to [`ForecastResult`] with an absolute TTL, plus
//! single-flight coalescing of concurrent computations.
//!
//! ## Lock discipline
//!
//! All bookkeeping lives behind one `parking_lot::Mutex` that is only held for map
//! updates and never across an `.await`. The caller that finds neither a fresh entry nor
//! a running computation becomes the leader for that fingerprint and publishes its
//! outcome on a `watch` channel that every later caller subscribes to.
//!
//! - A success is stored and handed to all waiters.
//! - A failure is handed to all waiters but never stored.
//! - If the leader is dropped before finishing, the channel closes and the waiters race
//!   to claim the fingerprint again; one of them computes, the rest wait on it.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::ForecastResult;
use crate::error::PipelineError;

type Outcome = Result<Arc<ForecastResult>, PipelineError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub expirations: u64,
}

struct CachedEntry {
    value: Arc<ForecastResult>,
    inserted_at: Instant,
    tick: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CachedEntry>,
    /// Access tick to fingerprint; the first key is the least recently used.
    recency: BTreeMap<u64, String>,
    tick: u64,
    in_flight: HashMap<String, watch::Receiver<Option<Outcome>>>,
    stats: CacheStats,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn fresh(&mut self, fingerprint: &str, ttl: Duration) -> Option<Arc<ForecastResult>> {
        let (old_tick, expired) = {
            let entry = self.entries.get(fingerprint)?;
            (entry.tick, entry.inserted_at.elapsed() >= ttl)
        };
        self.recency.remove(&old_tick);

        if expired {
            self.entries.remove(fingerprint);
            self.stats.expirations += 1;
            debug!(fingerprint, "cache entry expired");
            return None;
        }

        let tick = self.next_tick();
        self.recency.insert(tick, fingerprint.to_string());
        let entry = self.entries.get_mut(fingerprint)?;
        entry.tick = tick;
        Some(Arc::clone(&entry.value))
    }

    fn insert(&mut self, fingerprint: &str, value: Arc<ForecastResult>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if let Some(old) = self.entries.remove(fingerprint) {
            self.recency.remove(&old.tick);
        }
        let tick = self.next_tick();
        self.recency.insert(tick, fingerprint.to_string());
        self.entries.insert(
            fingerprint.to_string(),
            CachedEntry {
                value,
                inserted_at: Instant::now(),
                tick,
            },
        );

        while self.entries.len() > capacity {
            let Some((_, victim)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&victim);
            self.stats.evictions += 1;
            debug!(fingerprint = %victim, "cache entry evicted");
        }
    }
}

enum Claim {
    Hit(Arc<ForecastResult>),
    Wait(watch::Receiver<Option<Outcome>>),
    Lead(watch::Sender<Option<Outcome>>),
}

pub struct ForecastCache {
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl ForecastCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether a fresh entry exists, without touching its recency.
    pub fn contains(&self, fingerprint: &str) -> bool {
        let state = self.state.lock();
        state
            .entries
            .get(fingerprint)
            .is_some_and(|e| e.inserted_at.elapsed() < self.ttl)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
            ..state.stats
        }
    }

    /// Returns the cached result for `fingerprint`, or runs `compute` at most once across
    /// all concurrent callers with the same fingerprint.
    pub async fn get_or_compute<F, Fut>(&self, fingerprint: &str, compute: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ForecastResult, PipelineError>>,
    {
        let tx = loop {
            match self.claim(fingerprint) {
                Claim::Hit(value) => return Ok(value),
                Claim::Lead(tx) => break tx,
                Claim::Wait(mut rx) => {
                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(done) => (*done).clone(),
                        Err(_) => None,
                    };
                    if let Some(outcome) = outcome {
                        return outcome;
                    }
                    debug!(fingerprint, "in-flight computation abandoned, retrying");
                }
            }
        };

        let mut flight = InFlight {
            cache: self,
            fingerprint,
            tx,
            done: false,
        };
        let outcome = compute().await.map(Arc::new);
        flight.complete(&outcome);
        outcome
    }

    fn claim(&self, fingerprint: &str) -> Claim {
        let mut state = self.state.lock();
        if let Some(value) = state.fresh(fingerprint, self.ttl) {
            state.stats.hits += 1;
            debug!(fingerprint, "cache hit");
            return Claim::Hit(value);
        }
        if let Some(rx) = state.in_flight.get(fingerprint) {
            let rx = rx.clone();
            state.stats.coalesced += 1;
            debug!(fingerprint, "joining in-flight computation");
            return Claim::Wait(rx);
        }
        let (tx, rx) = watch::channel(None);
        state.in_flight.insert(fingerprint.to_string(), rx);
        state.stats.misses += 1;
        debug!(fingerprint, "cache miss");
        Claim::Lead(tx)
    }
}

/// Leadership of one fingerprint's computation. Dropping it unfinished closes the
/// channel so that waiters can take over.
struct InFlight<'a> {
    cache: &'a ForecastCache,
    fingerprint: &'a str,
    tx: watch::Sender<Option<Outcome>>,
    done: bool,
}

impl InFlight<'_> {
    fn complete(&mut self, outcome: &Outcome) {
        {
            let mut state = self.cache.state.lock();
            state.in_flight.remove(self.fingerprint);
            if let Ok(value) = outcome {
                state.insert(self.fingerprint, Arc::clone(value), self.cache.capacity);
            }
        }
        self.tx.send_replace(Some(outcome.clone()));
        self.done = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cache.state.lock().in_flight.remove(self.fingerprint);
            debug!(fingerprint = self.fingerprint, "computation cancelled");
        }
    }
}

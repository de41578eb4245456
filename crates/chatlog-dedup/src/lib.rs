//! Bounded, time-expiring duplicate detection for inbound chat messages.
//!
//! The cache remembers message fingerprints for `ttl_seconds` and never holds
//! more than `max_size` of them. Eviction follows insertion order: a repeat
//! sighting does not refresh an entry's position or timestamp.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chatlog_contract::InboundMessage;
use chatlog_core::{SharedClock, SystemClock};
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

pub const DEFAULT_DEDUP_MAX_SIZE: usize = 5_000;
pub const DEFAULT_DEDUP_TTL_SECONDS: u64 = 60;
const FINGERPRINT_DELIMITER: char = '|';

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `DedupConfig` used across chatlog components.
pub struct DedupConfig {
    pub max_size: usize,
    pub ttl_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_DEDUP_MAX_SIZE,
            ttl_seconds: DEFAULT_DEDUP_TTL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Deterministic key derived from a message's semantic fields.
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the fingerprint of `message`: type, sender id, content, and
/// conversation id, followed by the media references in their given order.
///
/// The type is the client's raw type string, so two client types that
/// normalize to the same kind stay distinct. Messages without one fall back
/// to the normalized kind.
pub fn fingerprint(message: &InboundMessage) -> Fingerprint {
    let mut parts: Vec<&str> = vec![
        fingerprint_type(message),
        message.sender.id.as_str(),
        message.content(),
        message.conversation_id(),
    ];
    parts.extend(message.media_references().iter().map(String::as_str));

    let mut key = String::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            key.push(FINGERPRINT_DELIMITER);
        }
        key.push_str(part);
    }
    Fingerprint(key)
}

fn fingerprint_type(message: &InboundMessage) -> &str {
    match message.raw_type.trim() {
        "" => message.kind().as_str(),
        raw_type => raw_type,
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: Fingerprint,
    message: Arc<InboundMessage>,
    inserted_at_ms: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    order: VecDeque<CacheEntry>,
    keys: HashSet<Fingerprint>,
}

impl CacheState {
    fn expire(&mut self, now_ms: u64, ttl_ms: u64) -> usize {
        let before = self.order.len();
        let keys = &mut self.keys;
        self.order.retain(|entry| {
            let expired = now_ms.saturating_sub(entry.inserted_at_ms) >= ttl_ms;
            if expired {
                keys.remove(&entry.fingerprint);
            }
            !expired
        });
        before - self.order.len()
    }

    fn evict_oldest(&mut self) -> Option<Fingerprint> {
        let entry = self.order.pop_front()?;
        self.keys.remove(&entry.fingerprint);
        Some(entry.fingerprint)
    }
}

/// Explicitly owned duplicate filter; share it behind `Arc` across handlers.
pub struct DedupCache {
    config: DedupConfig,
    clock: SharedClock,
    state: Mutex<CacheState>,
}

impl fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupCache")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

impl DedupCache {
    pub fn new(config: DedupConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: DedupConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> DedupConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.lock_state().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the first-seen message recorded under `key`, if still cached.
    pub fn snapshot(&self, key: &Fingerprint) -> Option<Arc<InboundMessage>> {
        self.lock_state()
            .order
            .iter()
            .find(|entry| &entry.fingerprint == key)
            .map(|entry| Arc::clone(&entry.message))
    }

    /// Returns true when an equivalent message was accepted within the TTL;
    /// otherwise records `message` and returns false.
    pub fn is_duplicate(&self, message: &InboundMessage) -> bool {
        let key = fingerprint(message);
        let ttl_ms = self.config.ttl_seconds.saturating_mul(1_000);

        let mut state = self.lock_state();
        let now_ms = self.clock.now_unix_ms();
        let expired = state.expire(now_ms, ttl_ms);
        if expired > 0 {
            tracing::debug!(expired, "dedup cache expired entries");
        }

        if state.keys.contains(&key) {
            tracing::info!(fingerprint = %key, "detected duplicate message");
            return true;
        }

        state.keys.insert(key.clone());
        state.order.push_back(CacheEntry {
            fingerprint: key,
            message: Arc::new(message.clone()),
            inserted_at_ms: now_ms,
        });
        while state.order.len() > self.config.max_size {
            if let Some(evicted) = state.evict_oldest() {
                tracing::debug!(fingerprint = %evicted, "dedup cache evicted oldest entry");
            }
        }
        debug_assert!(state.order.len() <= self.config.max_size);
        debug_assert_eq!(state.order.len(), state.keys.len());
        false
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

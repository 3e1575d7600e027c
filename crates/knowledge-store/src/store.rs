use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use pagewarden_core_types::{SharedClock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::PersistenceError;
use crate::persistence::{
    KnowledgePersistence, KnowledgeSnapshot, MemoryPersistence, LEARNED_KEY_PREFIX,
};

pub const DEFAULT_LEARNED_CAP: usize = 50;

/// How many learned selectors a context keeps.
///
/// Eviction is by insertion order: the oldest learned entry goes first, no
/// matter how often it has succeeded since.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetentionPolicy {
    InsertionOrder { cap: usize },
    Unbounded,
}

impl RetentionPolicy {
    pub fn cap(&self) -> Option<usize> {
        match self {
            RetentionPolicy::InsertionOrder { cap } => Some(*cap),
            RetentionPolicy::Unbounded => None,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::InsertionOrder {
            cap: DEFAULT_LEARNED_CAP,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedSelector {
    pub selector: String,
    pub learned_at_ms: i64,
}

impl LearnedSelector {
    pub fn storage_key(&self) -> String {
        format!("{LEARNED_KEY_PREFIX}{}", self.learned_at_ms)
    }
}

fn parse_learned_key(key: &str) -> Option<i64> {
    key.strip_prefix(LEARNED_KEY_PREFIX)?.parse().ok()
}

#[derive(Clone, Debug, Default)]
struct ContextEntry {
    keyed: BTreeMap<String, String>,
    /// Oldest first, ordered by timestamp.
    learned: VecDeque<LearnedSelector>,
}

impl ContextEntry {
    fn is_empty(&self) -> bool {
        self.keyed.is_empty() && self.learned.is_empty()
    }

    fn insert_learned(&mut self, entry: LearnedSelector) {
        let position = self
            .learned
            .iter()
            .rposition(|existing| existing.learned_at_ms <= entry.learned_at_ms)
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.learned.insert(position, entry);
    }

    fn enforce(&mut self, retention: RetentionPolicy) -> usize {
        let Some(cap) = retention.cap() else {
            return 0;
        };
        let mut evicted = 0;
        while self.learned.len() > cap {
            self.learned.pop_front();
            evicted += 1;
        }
        evicted
    }
}

#[derive(Debug, Default)]
struct StoreMetrics {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    learns: AtomicU64,
    evictions: AtomicU64,
    flush_failures: AtomicU64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatsSnapshot {
    pub contexts: usize,
    pub keyed_entries: usize,
    pub learned_entries: usize,
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub learns: u64,
    pub evictions: u64,
    pub flush_failures: u64,
}

/// Process-wide selector knowledge.
///
/// Reads never block on writers of other contexts; writes are last-write-wins
/// per `(context, key)`. Every mutation is followed by a flush.
pub struct KnowledgeStore {
    contexts: DashMap<String, ContextEntry>,
    persistence: Arc<dyn KnowledgePersistence>,
    retention: RetentionPolicy,
    clock: SharedClock,
    last_learned_ms: AtomicI64,
    flush_lock: Mutex<()>,
    metrics: StoreMetrics,
}

pub type SharedKnowledgeStore = Arc<KnowledgeStore>;

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("contexts", &self.contexts.len())
            .field("retention", &self.retention)
            .finish()
    }
}

impl KnowledgeStore {
    /// Empty store that flushes to `persistence`. Call [`KnowledgeStore::load`] to hydrate it.
    pub fn new(persistence: Arc<dyn KnowledgePersistence>) -> Self {
        Self {
            contexts: DashMap::new(),
            persistence,
            retention: RetentionPolicy::default(),
            clock: SystemClock::shared(),
            last_learned_ms: AtomicI64::new(0),
            flush_lock: Mutex::new(()),
            metrics: StoreMetrics::default(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPersistence::new()))
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds and hydrates a store; a failed load is logged and leaves it empty.
    pub fn open(
        persistence: Arc<dyn KnowledgePersistence>,
        retention: RetentionPolicy,
        clock: SharedClock,
    ) -> Self {
        let store = Self::new(persistence)
            .with_retention(retention)
            .with_clock(clock);
        if let Err(err) = store.load() {
            warn!(error = %err, "knowledge load failed; starting with an empty store");
        }
        store
    }

    /// Replaces in-memory state with the persisted snapshot.
    pub fn load(&self) -> Result<(), PersistenceError> {
        let snapshot = self.persistence.load()?;
        self.restore(snapshot);
        Ok(())
    }

    fn restore(&self, snapshot: KnowledgeSnapshot) {
        self.contexts.clear();
        let mut newest = 0i64;
        for (context, entries) in snapshot.contexts {
            let mut entry = ContextEntry::default();
            for (key, selector) in entries {
                match parse_learned_key(&key) {
                    Some(learned_at_ms) => {
                        newest = newest.max(learned_at_ms);
                        entry.insert_learned(LearnedSelector {
                            selector,
                            learned_at_ms,
                        });
                    }
                    None => {
                        entry.keyed.insert(key, selector);
                    }
                }
            }
            entry.enforce(self.retention);
            if !entry.is_empty() {
                self.contexts.insert(context, entry);
            }
        }
        self.last_learned_ms.fetch_max(newest, Ordering::SeqCst);
        info!(contexts = self.contexts.len(), "knowledge loaded");
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    pub fn get(&self, context: &str, key: &str) -> Option<String> {
        self.metrics.lookups.fetch_add(1, Ordering::Relaxed);
        let found = self
            .contexts
            .get(context)
            .and_then(|entry| entry.keyed.get(key).cloned());
        if found.is_some() {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Upserts a keyed selector. Empty selectors and keys in the learned
    /// namespace are refused and reported as `false`.
    pub fn set(&self, context: &str, key: &str, selector: &str) -> bool {
        if selector.trim().is_empty() || key.starts_with(LEARNED_KEY_PREFIX) {
            warn!(context, key, "refusing knowledge write");
            return false;
        }
        let previous = self
            .contexts
            .entry(context.to_string())
            .or_default()
            .keyed
            .insert(key.to_string(), selector.to_string());
        debug!(context, key, selector, replaced = previous.is_some(), "knowledge set");
        self.flush_logged("set");
        true
    }

    pub fn remove(&self, context: &str, key: &str) -> Option<String> {
        let removed = self
            .contexts
            .get_mut(context)
            .and_then(|mut entry| entry.keyed.remove(key));
        if removed.is_some() {
            self.contexts.remove_if(context, |_, entry| entry.is_empty());
            self.flush_logged("remove");
        }
        removed
    }

    /// Drops every keyed and learned selector of `context`.
    pub fn clear_context(&self, context: &str) -> bool {
        let existed = self.contexts.remove(context).is_some();
        if existed {
            info!(context, "knowledge context cleared");
            self.flush_logged("clear_context");
        }
        existed
    }

    /// Records a selector that dismissed an obstruction in `context`.
    pub fn learn(&self, context: &str, selector: &str) -> Option<LearnedSelector> {
        if selector.trim().is_empty() {
            return None;
        }
        let learned = LearnedSelector {
            selector: selector.to_string(),
            learned_at_ms: self.next_learned_ms(),
        };
        let evicted = {
            let mut entry = self.contexts.entry(context.to_string()).or_default();
            entry.insert_learned(learned.clone());
            entry.enforce(self.retention)
        };
        self.metrics.learns.fetch_add(1, Ordering::Relaxed);
        if evicted > 0 {
            self.metrics
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(context, evicted, "learned selectors evicted");
        }
        info!(context, selector, key = %learned.storage_key(), "learned dismissal selector");
        self.flush_logged("learn");
        Some(learned)
    }

    /// Learned selectors for `context`, most recent first.
    pub fn list_learned(&self, context: &str) -> Vec<String> {
        self.learned_entries(context)
            .into_iter()
            .map(|entry| entry.selector)
            .collect()
    }

    pub fn learned_entries(&self, context: &str) -> Vec<LearnedSelector> {
        self.contexts
            .get(context)
            .map(|entry| entry.learned.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_selectors(&self, context: &str) -> bool {
        self.contexts
            .get(context)
            .map(|entry| !entry.is_empty())
            .unwrap_or(false)
    }

    /// Keyed selectors of `context`; learned entries are not included.
    pub fn selectors_for(&self, context: &str) -> BTreeMap<String, String> {
        self.contexts
            .get(context)
            .map(|entry| entry.keyed.clone())
            .unwrap_or_default()
    }

    pub fn list_contexts(&self) -> Vec<String> {
        let mut contexts: Vec<String> = self
            .contexts
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        contexts.sort();
        contexts
    }

    pub fn snapshot(&self) -> KnowledgeSnapshot {
        let mut snapshot = KnowledgeSnapshot::default();
        for entry in self.contexts.iter() {
            let mut map = entry.value().keyed.clone();
            for learned in &entry.value().learned {
                map.insert(learned.storage_key(), learned.selector.clone());
            }
            snapshot.contexts.insert(entry.key().clone(), map);
        }
        snapshot
    }

    /// Writes the current state. Saves are serialized so the last save always
    /// carries the newest snapshot.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        let _guard = self.flush_lock.lock();
        let snapshot = self.snapshot();
        self.persistence.save(&snapshot)
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        let mut stats = StoreStatsSnapshot {
            lookups: self.metrics.lookups.load(Ordering::Relaxed),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            learns: self.metrics.learns.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
            flush_failures: self.metrics.flush_failures.load(Ordering::Relaxed),
            ..StoreStatsSnapshot::default()
        };
        for entry in self.contexts.iter() {
            stats.contexts += 1;
            stats.keyed_entries += entry.value().keyed.len();
            stats.learned_entries += entry.value().learned.len();
        }
        stats
    }

    fn flush_logged(&self, operation: &'static str) {
        if let Err(err) = self.flush() {
            self.metrics.flush_failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, operation, "knowledge persist failed");
        }
    }

    /// Strictly increasing per store, so two learns in one millisecond get distinct keys.
    fn next_learned_ms(&self) -> i64 {
        let now = self.clock.unix_millis();
        let mut last = self.last_learned_ms.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self.last_learned_ms.compare_exchange(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

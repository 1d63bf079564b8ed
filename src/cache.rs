use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CacheSettings;
use crate::types::ClassificationResult;

struct CacheEntry {
    value: ClassificationResult,
    inserted_at: Instant,
}

struct CacheTable {
    entries: HashMap<String, CacheEntry>,
    // Keys in insertion order; the front is the eviction candidate.
    insertion_order: VecDeque<String>,
}

/// Bounded, time-expiring store of classification results keyed by a content
/// hash. Expiry is lazy: expired entries read as absent and are removed when
/// next touched. At capacity, inserting a new key evicts exactly one
/// oldest-inserted entry.
pub struct ResultCache {
    table: Mutex<CacheTable>,
    ttl: Duration,
    capacity: usize,
}

impl ResultCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            table: Mutex::new(CacheTable {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
            ttl: settings.ttl,
            capacity: settings.capacity.max(1),
        }
    }

    /// Content hash of the normalized input. Callers pass text already
    /// trimmed and lowercased; image locators are hashed as given.
    pub fn key_for(input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<ClassificationResult> {
        let mut guard = self.table.lock();
        let table = &mut *guard;

        match table.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                table.entries.remove(key);
                if let Some(pos) = table.insertion_order.iter().position(|k| k == key) {
                    table.insertion_order.remove(pos);
                }
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, value: ClassificationResult) {
        let mut guard = self.table.lock();
        let table = &mut *guard;
        let now = Instant::now();

        if let Some(entry) = table.entries.get_mut(&key) {
            entry.value = value;
            entry.inserted_at = now;
            // Re-insertion counts as a fresh insert for eviction order.
            if let Some(pos) = table.insertion_order.iter().position(|k| *k == key) {
                table.insertion_order.remove(pos);
            }
            table.insertion_order.push_back(key);
            return;
        }

        if table.entries.len() >= self.capacity {
            while let Some(oldest) = table.insertion_order.pop_front() {
                if table.entries.remove(&oldest).is_some() {
                    break;
                }
            }
        }

        table.insertion_order.push_back(key.clone());
        table.entries.insert(key, CacheEntry { value, inserted_at: now });
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

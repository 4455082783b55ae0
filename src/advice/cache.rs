//! Bounded, expiring advice cache
//!
//! Keyed by `{label}_{language}`. When full, the entry inserted longest ago
//! is evicted, whether or not it was read since; re-inserting a key makes
//! it the newest. Expired entries are dropped on read.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::AdvicePayload;

/// A finished payload and whether it came from the fallback path
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAdvice {
    pub payload: AdvicePayload,
    pub degraded: bool,
}

struct Slot {
    advice: CachedAdvice,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Slot>,
    /// Insertion order; stale sequence numbers are skipped lazily
    order: VecDeque<(u64, String)>,
    next_seq: u64,
}

impl Inner {
    fn evict_oldest(&mut self) {
        while let Some((seq, key)) = self.order.pop_front() {
            if self.entries.get(&key).map(|slot| slot.seq) == Some(seq) {
                self.entries.remove(&key);
                return;
            }
        }
    }
}

pub struct AdviceCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl AdviceCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn key(label: &str, language: &str) -> String {
        format!("{}_{}", label, language)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<CachedAdvice> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<CachedAdvice> {
        let mut inner = self.lock();
        let expired = match inner.entries.get(key) {
            Some(slot) if now.saturating_duration_since(slot.inserted_at) < self.ttl => {
                return Some(slot.advice.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: String, advice: CachedAdvice) {
        self.insert_at(key, advice, Instant::now());
    }

    pub fn insert_at(&self, key: String, advice: CachedAdvice, now: Instant) {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner.order.push_back((seq, key.clone()));
        inner.entries.insert(
            key,
            Slot {
                advice,
                inserted_at: now,
                seq,
            },
        );

        while inner.entries.len() > self.capacity {
            inner.evict_oldest();
        }
        // keep the order queue from growing without bound under churn
        if inner.order.len() > self.capacity * 4 {
            let Inner { entries, order, .. } = &mut *inner;
            order.retain(|(seq, key)| entries.get(key).map(|slot| slot.seq) == Some(*seq));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

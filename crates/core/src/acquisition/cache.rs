//! Response cache (§4.4): TTL + LRU eviction, keyed primarily by a
//! canonical identifier but also look-up-able by any alternate identifier
//! the same record is known under (e.g. a DOI and an arXiv ID resolving
//! to the same paper).
//!
//! Grounded on the rate limiter/circuit breaker registries' `DashMap`
//! idiom, generalized with an explicit LRU order tracked in a
//! `parking_lot::Mutex<VecDeque<_>>` since `DashMap` alone has no ordered
//! eviction story.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_size: usize,
    pub paper_ttl: Duration,
    pub search_ttl: Duration,
    pub author_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            paper_ttl: Duration::from_secs(7 * 24 * 3600),
            search_ttl: Duration::from_secs(3600),
            author_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// What kind of record is being cached, so the right TTL is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Paper,
    Search,
    Author,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
    aliases: Vec<String>,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// A TTL + LRU cache over values of type `V`, with alternate-identifier
/// indexing: a value inserted under `key` with `aliases` can be looked up
/// by `key` or by any of `aliases`.
pub struct ResponseCache<V> {
    config: CacheConfig,
    entries: DashMap<String, Entry<V>>,
    aliases: DashMap<String, String>,
    order: Mutex<VecDeque<String>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            aliases: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    fn ttl_for(&self, kind: EntryKind) -> Duration {
        match kind {
            EntryKind::Paper => self.config.paper_ttl,
            EntryKind::Search => self.config.search_ttl,
            EntryKind::Author => self.config.author_ttl,
        }
    }

    /// Insert `value` under canonical `key`, additionally indexed by
    /// `aliases`. Evicts the least-recently-inserted entry if the cache
    /// is at capacity.
    pub fn insert(&self, key: &str, aliases: &[String], kind: EntryKind, value: V) {
        let ttl = self.ttl_for(kind);
        if !self.entries.contains_key(key) {
            let mut order = self.order.lock();
            order.push_back(key.to_string());
            while order.len() > self.config.max_size {
                if let Some(evicted) = order.pop_front() {
                    if let Some((_, entry)) = self.entries.remove(&evicted) {
                        for alias in entry.aliases {
                            self.aliases.remove(&alias);
                        }
                    }
                }
            }
        }
        for alias in aliases {
            self.aliases.insert(alias.clone(), key.to_string());
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
                aliases: aliases.to_vec(),
            },
        );
    }

    /// Look up by canonical key or any registered alias. Expired entries
    /// are treated as absent and lazily removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let canonical = self
            .aliases
            .get(key)
            .map(|r| r.clone())
            .unwrap_or_else(|| key.to_string());

        let expired = match self.entries.get(&canonical) {
            Some(entry) => entry.is_expired(),
            None => return None,
        };
        if expired {
            if let Some((_, entry)) = self.entries.remove(&canonical) {
                for alias in entry.aliases {
                    self.aliases.remove(&alias);
                }
            }
            return None;
        }
        self.entries.get(&canonical).map(|e| e.value.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_alias_finds_canonical_entry() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.insert(
            "doi:10.1/abc",
            &["arxiv:1234.5678".to_string()],
            EntryKind::Paper,
            "paper-data".to_string(),
        );
        assert_eq!(cache.get("doi:10.1/abc").as_deref(), Some("paper-data"));
        assert_eq!(cache.get("arxiv:1234.5678").as_deref(), Some("paper-data"));
        assert_eq!(cache.get("unknown"), None);
    }

    #[test]
    fn expired_entries_are_treated_as_absent() {
        let cache = ResponseCache::new(CacheConfig {
            max_size: 10,
            paper_ttl: Duration::from_millis(10),
            search_ttl: Duration::from_secs(3600),
            author_ttl: Duration::from_secs(3600),
        });
        cache.insert("k", &[], EntryKind::Paper, 1u32);
        assert_eq!(cache.get("k"), Some(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let cache = ResponseCache::new(CacheConfig {
            max_size: 2,
            paper_ttl: Duration::from_secs(3600),
            search_ttl: Duration::from_secs(3600),
            author_ttl: Duration::from_secs(3600),
        });
        cache.insert("a", &[], EntryKind::Paper, 1u32);
        cache.insert("b", &[], EntryKind::Paper, 2u32);
        cache.insert("c", &[], EntryKind::Paper, 3u32);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }
}

use std::collections::HashMap;

use crate::common::{PageKey, Timestamp};

/// Tracks recency and evictability for a single resident page
#[derive(Debug)]
struct AccessInfo {
    /// Timestamp of the most recent access
    last_access: Timestamp,
    /// Whether this page may currently be evicted
    is_evictable: bool,
}

/// Least-recently-used replacement policy.
///
/// Every access stamps the page with a monotonically increasing timestamp.
/// `evict` picks the evictable page with the oldest stamp. Pinned pages are
/// marked non-evictable and are never chosen.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Next timestamp to hand out
    current_timestamp: Timestamp,
    /// Access information per tracked page
    entries: HashMap<PageKey, AccessInfo>,
    /// Number of evictable pages
    num_evictable: usize,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an access to `key`, making it the most recently used page.
    /// A page seen for the first time starts out non-evictable.
    pub fn record_access(&mut self, key: PageKey) {
        let timestamp = self.current_timestamp;
        self.current_timestamp += 1;

        self.entries
            .entry(key)
            .and_modify(|info| info.last_access = timestamp)
            .or_insert(AccessInfo {
                last_access: timestamp,
                is_evictable: false,
            });
    }

    /// Sets whether a tracked page may be evicted.
    pub fn set_evictable(&mut self, key: PageKey, is_evictable: bool) {
        if let Some(info) = self.entries.get_mut(&key) {
            if info.is_evictable != is_evictable {
                if is_evictable {
                    self.num_evictable += 1;
                } else {
                    self.num_evictable -= 1;
                }
                info.is_evictable = is_evictable;
            }
        }
    }

    /// Removes and returns the least recently used evictable page.
    pub fn evict(&mut self) -> Option<PageKey> {
        let victim = self
            .entries
            .iter()
            .filter(|(_, info)| info.is_evictable)
            .min_by_key(|(_, info)| info.last_access)
            .map(|(key, _)| *key)?;

        self.entries.remove(&victim);
        self.num_evictable -= 1;
        Some(victim)
    }

    /// Stops tracking a page.
    pub fn remove(&mut self, key: PageKey) {
        if let Some(info) = self.entries.remove(&key) {
            if info.is_evictable {
                self.num_evictable -= 1;
            }
        }
    }

    /// Returns the number of evictable pages.
    pub fn size(&self) -> usize {
        self.num_evictable
    }
}

//! An in-memory cache of rendered pages. Entries expire after a fixed time-to-live; nothing
//! invalidates them early except `clear`.
use bytes::Bytes;
use moka::sync::Cache;
use std::time::Duration;

/// Most pages kept at once. Past this, moka evicts the least useful entries.
const MAX_ENTRIES: u64 = 256;

#[derive(Debug)]
pub struct PageCache {
    /// `None` when caching is disabled.
    pages: Option<Cache<String, Bytes>>,
}

impl PageCache {
    /// A zero TTL disables caching.
    pub fn new(ttl: Duration) -> Self {
        let pages = if ttl == Duration::from_secs(0) {
            None
        } else {
            Some(
                Cache::builder()
                    .max_capacity(MAX_ENTRIES)
                    .time_to_live(ttl)
                    .build(),
            )
        };
        Self { pages }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.pages.as_ref().and_then(|pages| pages.get(key))
    }

    pub fn put(&self, key: String, body: Bytes) {
        if let Some(pages) = &self.pages {
            pages.insert(key, body);
        }
    }

    /// Returns how many live pages were dropped.
    pub fn clear(&self) -> usize {
        guard!(let Some(pages) = &self.pages else {
            return 0;
        });
        let dropped = pages.iter().count();
        pages.invalidate_all();
        dropped
    }
}

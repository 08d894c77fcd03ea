//! Round-robin credential rotation for outbound API calls.
//!
//! A [`KeyRing`] owns a fixed pool of credentials and hands out the next
//! one on each acquisition, spreading load evenly across keys to stay
//! under per-key rate limits. The cursor is a single atomic counter, so
//! acquisition is O(1), lock-free, and safe under concurrent callers.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed, non-empty pool of opaque credential strings with an atomic
/// rotation cursor. Share between callers with `Arc<KeyRing>`.
pub struct KeyRing {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyRing {
    /// Build a ring from the configured pool, dropping blank entries.
    ///
    /// An empty pool is a startup configuration error: the capability was
    /// configured but cannot ever make a call.
    pub fn new(keys: Vec<String>) -> Result<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .collect();
        if keys.is_empty() {
            bail!("Credential pool is empty; configure at least one API key");
        }
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Acquire the next credential in round-robin order.
    ///
    /// Wraps modulo pool size; every acquisition returns some pool member
    /// and the sequence is uniform across members. `Relaxed` is enough:
    /// only the counter value matters, no other memory is published.
    pub fn next(&self) -> &str {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        &self.keys[idx]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

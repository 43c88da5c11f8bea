//! Time-bounded result cache.
//!
//! Shields the expensive aggregate reads (health overview, recommendation
//! listings) from being recomputed on every request. Writers that change
//! the underlying data invalidate the matching key, so staleness is
//! bounded by the TTL only between writes.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Cache key for the health overview payload.
pub const HEALTH_OVERVIEW_KEY: &str = "health_overview";
/// TTL for the health overview payload.
pub const HEALTH_OVERVIEW_TTL: Duration = Duration::from_secs(60);
/// Cache key for the recommendations listing.
pub const RECOMMENDATIONS_KEY: &str = "recommendations";
/// TTL for the recommendations listing.
pub const RECOMMENDATIONS_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct Slot {
    value: Option<Value>,
    computed_at: Instant,
    generation: u64,
}

/// Keyed TTL cache with explicit invalidation.
///
/// The lock is never held across an await; a computation that raced an
/// `invalidate` is returned to its caller but not stored, so readers can
/// never observe a value older than the invalidation.
#[derive(Debug, Default)]
pub struct ResultCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value when fresh; otherwise run `compute`, store
    /// its output, and return it.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let observed_generation = {
            let slots = self.slots.lock().unwrap();
            match slots.get(key) {
                Some(slot) => {
                    if let Some(value) = &slot.value {
                        if slot.computed_at.elapsed() < ttl {
                            tracing::debug!("Cache hit for {}", key);
                            return Ok(value.clone());
                        }
                    }
                    slot.generation
                }
                None => 0,
            }
        };

        let value = compute().await?;

        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: None,
            computed_at: Instant::now(),
            generation: 0,
        });
        // An invalidation bumped the generation while we were computing;
        // our value predates it and must not be stored.
        if slot.generation == observed_generation {
            slot.value = Some(value.clone());
            slot.computed_at = Instant::now();
        }
        Ok(value)
    }

    /// Drop the stored value for `key`; the next read recomputes it
    /// regardless of TTL.
    pub fn invalidate(&self, key: &str) {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: None,
            computed_at: Instant::now(),
            generation: 0,
        });
        slot.value = None;
        slot.generation += 1;
    }
}

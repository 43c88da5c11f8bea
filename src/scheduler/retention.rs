//! Retention manager: caps stored probe history per target.

use std::sync::Arc;

use crate::db::{DbError, Store};
use crate::registry::TargetRegistry;

/// Maximum stored probe results kept per target.
pub const MAX_RESULTS_PER_TARGET: i64 = 1000;

/// Deletes each target's excess history beyond the retention cap.
pub struct RetentionManager {
    store: Arc<Store>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Trim one target's history to the cap; returns rows deleted.
    ///
    /// The boundary is the row id of the 1000th most recent result, so the
    /// sweep only ever touches rows that existed at the count query; rows
    /// inserted mid-sweep carry larger ids and survive. Ties cannot occur:
    /// ids are unique and strictly increasing.
    pub fn sweep(&self, target_id: &str) -> Result<usize, DbError> {
        let total = self.store.count_probe_results(target_id)?;
        if total <= MAX_RESULTS_PER_TARGET {
            return Ok(0);
        }

        let Some(cutoff_id) = self
            .store
            .nth_newest_probe_result_id(target_id, MAX_RESULTS_PER_TARGET)?
        else {
            return Ok(0);
        };

        let deleted = self
            .store
            .delete_probe_results_before(target_id, cutoff_id)?;
        tracing::info!("Cleaned {} old results for {}", deleted, target_id);
        Ok(deleted)
    }

    /// Sweep every registered target, continuing past per-target failures.
    pub fn sweep_all(&self, registry: &TargetRegistry) {
        tracing::info!("Starting retention sweep");
        for target in registry.all() {
            if let Err(e) = self.sweep(&target.id) {
                tracing::error!("Retention sweep failed for {}: {}", target.id, e);
            }
        }
        tracing::info!("Retention sweep complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProbeResult;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn seeded_store(rows: usize) -> (NamedTempFile, Arc<Store>) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        for _ in 0..rows {
            let result = ProbeResult::healthy("svc", 1, json!({}));
            store.insert_probe_result(&result).unwrap();
        }
        (tmp, store)
    }

    #[test]
    fn sweep_keeps_the_newest_thousand() {
        let (_tmp, store) = seeded_store(1500);
        let manager = RetentionManager::new(store.clone());

        let deleted = manager.sweep("svc").unwrap();
        assert_eq!(deleted, 500);
        assert_eq!(store.count_probe_results("svc").unwrap(), 1000);

        // Every survivor sits above the deleted range.
        let oldest_kept = store
            .nth_newest_probe_result_id("svc", MAX_RESULTS_PER_TARGET)
            .unwrap()
            .unwrap();
        assert!(oldest_kept > 500);

        // Running again immediately is a no-op.
        assert_eq!(manager.sweep("svc").unwrap(), 0);
        assert_eq!(store.count_probe_results("svc").unwrap(), 1000);
    }

    #[test]
    fn sweep_below_cap_deletes_nothing() {
        let (_tmp, store) = seeded_store(10);
        let manager = RetentionManager::new(store.clone());

        assert_eq!(manager.sweep("svc").unwrap(), 0);
        assert_eq!(store.count_probe_results("svc").unwrap(), 10);
    }

    #[test]
    fn rows_inserted_after_the_boundary_survive() {
        let (_tmp, store) = seeded_store(1200);
        let manager = RetentionManager::new(store.clone());

        // Simulate a concurrent writer landing between the boundary query
        // and the delete: new rows have larger ids than the cutoff.
        let cutoff = store
            .nth_newest_probe_result_id("svc", MAX_RESULTS_PER_TARGET)
            .unwrap()
            .unwrap();
        let late = ProbeResult::healthy("svc", 2, json!({}));
        let late_id = store.insert_probe_result(&late).unwrap();
        assert!(late_id > cutoff);

        manager.sweep("svc").unwrap();
        let survivors = store.recent_probe_results("svc", 2000).unwrap();
        assert!(survivors.iter().any(|r| r.id == Some(late_id)));
    }

    #[test]
    fn sweep_all_covers_the_fleet() {
        let (_tmp, store) = seeded_store(1100);
        let manager = RetentionManager::new(store.clone());
        let registry = TargetRegistry::from_toml_str(
            r#"
[[targets]]
id = "svc"
display_name = "Service"
base_address = "http://localhost:3000"
probe_path = "/api/status"
cadence_seconds = 300
priority = "high"

[[targets]]
id = "empty"
display_name = "Empty"
base_address = "http://localhost:3001"
probe_path = "/api/status"
cadence_seconds = 600
priority = "medium"
"#,
        )
        .unwrap();

        manager.sweep_all(&registry);
        assert_eq!(store.count_probe_results("svc").unwrap(), 1000);
        assert_eq!(store.count_probe_results("empty").unwrap(), 0);
    }
}

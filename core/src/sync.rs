use anyhow::Result;
use serde::Serialize;

use crate::models::{EntityType, PendingSync, Product};

/// Remote backend that accepts queued local mutations.
///
/// Called synchronously, one queued row at a time, oldest first. Returning
/// `Ok` confirms the mutation and removes it from the queue; an error leaves
/// it queued and marks the entity as failed.
pub trait SyncBackend: Send + Sync {
    fn push(&self, change: &PendingSync) -> Result<()>;
}

/// Source of shared catalog products.
pub trait CatalogSource: Send + Sync {
    fn fetch_products(&self) -> Result<Vec<Product>>;
}

/// Backend used when no remote is configured. Every change is acknowledged.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

impl SyncBackend for OfflineBackend {
    fn push(&self, _change: &PendingSync) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCatalog;

impl CatalogSource for EmptyCatalog {
    fn fetch_products(&self) -> Result<Vec<Product>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub error: String,
}

/// Outcome of one pass over the pending-sync queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncOperation;
    use chrono::Utc;

    #[test]
    fn test_offline_backend_acknowledges() {
        let change = PendingSync {
            id: "q1".to_string(),
            entity_type: EntityType::Receipt,
            entity_id: "r1".to_string(),
            operation: SyncOperation::Create,
            payload: "{}".to_string(),
            created_at: Utc::now(),
            retry_count: 0,
            last_error: None,
        };
        assert!(OfflineBackend.push(&change).is_ok());
        assert!(EmptyCatalog.fetch_products().unwrap().is_empty());
    }

    #[test]
    fn test_report_serializes_failures() {
        let report = SyncReport {
            attempted: 2,
            synced: 1,
            failed: vec![SyncFailure {
                entity_type: EntityType::PantryItem,
                entity_id: "i1".to_string(),
                error: "backend unavailable".to_string(),
            }],
        };
        assert!(!report.is_clean());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed"][0]["entity_type"], "PANTRY_ITEM");
        assert_eq!(json["synced"], 1);
    }
}

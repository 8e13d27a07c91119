//! # Batch Planner
//!
//! Turns pending outbox entries into document-store commits.
//!
//! ```text
//!  outbox (oldest first)           plan
//!  ─────────────────────           ──────────────────────────────────────
//!  PRODUCT p1  v1  ─┐
//!  SALE    s1       │  coalesce    one write per (collection, document),
//!  PRODUCT p1  v2  ─┘  ────────►   latest payload wins, every outbox id
//!  MOVEMENT m1                     it replaces is acknowledged with it
//!  ...
//!                      chunk       batches of ≤ max_ops_per_batch writes
//!                      ────────►
//!                      quota       stop at the writes left for today;
//!                      ────────►   the rest stays pending ("deferred")
//! ```

use std::collections::HashMap;

use minimarket_core::{entity, SyncOutboxEntry};

use crate::config::MAX_OPS_PER_BATCH;
use crate::error::SyncError;
use crate::store::DocumentWrite;

/// Cloud collection name for an outbox entity type.
pub fn collection_for(entity_type: &str) -> Option<&'static str> {
    match entity_type {
        entity::PRODUCT => Some("products"),
        entity::CATEGORY => Some("categories"),
        entity::SALE => Some("sales"),
        entity::MOVEMENT => Some("movements"),
        entity::USER => Some("users"),
        entity::SETTINGS => Some("settings"),
        _ => None,
    }
}

/// A document write plus the outbox entries it acknowledges.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedWrite {
    pub write: DocumentWrite,
    pub outbox_ids: Vec<String>,
}

/// Writes committed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub writes: Vec<PlannedWrite>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn documents(&self) -> Vec<DocumentWrite> {
        self.writes.iter().map(|w| w.write.clone()).collect()
    }

    pub fn outbox_ids(&self) -> Vec<String> {
        self.writes
            .iter()
            .flat_map(|w| w.outbox_ids.iter().cloned())
            .collect()
    }
}

/// The result of planning one sync run.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub batches: Vec<Batch>,
    /// Entries whose payload cannot be written, with the reason.
    pub invalid: Vec<(String, SyncError)>,
    /// Entries left for a later run because the quota ran out.
    pub deferred: usize,
}

impl SyncPlan {
    pub fn total_writes(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

/// Plans batches for `entries` (oldest first).
///
/// At most `remaining_quota` writes are planned and no batch exceeds
/// `max_ops_per_batch` (itself capped at [`MAX_OPS_PER_BATCH`]).
pub fn plan(
    entries: &[SyncOutboxEntry],
    store_id: &str,
    max_ops_per_batch: usize,
    remaining_quota: u64,
) -> SyncPlan {
    let max_ops = max_ops_per_batch.clamp(1, MAX_OPS_PER_BATCH);
    let mut plan = SyncPlan::default();

    let mut writes: Vec<PlannedWrite> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for entry in entries {
        let collection = match collection_for(&entry.entity_type) {
            Some(c) => format!("stores/{}/{}", store_id, c),
            None => {
                plan.invalid.push((
                    entry.id.clone(),
                    SyncError::InvalidPayload {
                        id: entry.id.clone(),
                        reason: format!("unknown entity type {}", entry.entity_type),
                    },
                ));
                continue;
            }
        };

        let data: serde_json::Value = match serde_json::from_str(&entry.payload) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            Ok(_) => {
                plan.invalid.push((
                    entry.id.clone(),
                    SyncError::InvalidPayload {
                        id: entry.id.clone(),
                        reason: "payload is not a JSON object".to_string(),
                    },
                ));
                continue;
            }
            Err(e) => {
                plan.invalid.push((
                    entry.id.clone(),
                    SyncError::InvalidPayload {
                        id: entry.id.clone(),
                        reason: e.to_string(),
                    },
                ));
                continue;
            }
        };

        let key = (collection.clone(), entry.entity_id.clone());
        match index.get(&key) {
            Some(&i) => {
                let planned = &mut writes[i];
                planned.write.data = data;
                planned.outbox_ids.push(entry.id.clone());
            }
            None => {
                if writes.len() as u64 >= remaining_quota {
                    plan.deferred += 1;
                    continue;
                }
                index.insert(key, writes.len());
                writes.push(PlannedWrite {
                    write: DocumentWrite {
                        collection,
                        document_id: entry.entity_id.clone(),
                        data,
                    },
                    outbox_ids: vec![entry.id.clone()],
                });
            }
        }
    }

    let mut batch = Batch::default();
    for write in writes {
        if batch.len() == max_ops {
            plan.batches.push(std::mem::take(&mut batch));
        }
        batch.writes.push(write);
    }
    if !batch.is_empty() {
        plan.batches.push(batch);
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, entity_type: &str, entity_id: &str, payload: &str) -> SyncOutboxEntry {
        SyncOutboxEntry {
            id: id.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            payload: payload.to_string(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            synced_at: None,
        }
    }

    fn sales(n: usize) -> Vec<SyncOutboxEntry> {
        (0..n)
            .map(|i| entry(&format!("o{}", i), entity::SALE, &format!("s{}", i), "{}"))
            .collect()
    }

    #[test]
    fn test_chunks_at_batch_limit() {
        let plan = plan(&sales(1201), "s1", 500, 20_000);
        let sizes: Vec<usize> = plan.batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![500, 500, 201]);
        assert_eq!(plan.deferred, 0);
    }

    #[test]
    fn test_batch_size_capped_at_provider_limit() {
        let plan = plan(&sales(900), "s1", 10_000, 20_000);
        assert!(plan.batches.iter().all(|b| b.len() <= MAX_OPS_PER_BATCH));
    }

    #[test]
    fn test_coalesces_same_document() {
        let entries = vec![
            entry("o1", entity::PRODUCT, "p1", r#"{"stock": 10}"#),
            entry("o2", entity::SALE, "s1", r#"{"total": 5}"#),
            entry("o3", entity::PRODUCT, "p1", r#"{"stock": 9}"#),
        ];
        let plan = plan(&entries, "bodega", 500, 100);

        assert_eq!(plan.total_writes(), 2);
        let first = &plan.batches[0].writes[0];
        assert_eq!(first.write.collection, "stores/bodega/products");
        assert_eq!(first.write.data["stock"], 9);
        assert_eq!(first.outbox_ids, vec!["o1", "o3"]);
        assert_eq!(plan.batches[0].outbox_ids().len(), 3);
    }

    #[test]
    fn test_quota_defers_remaining_documents() {
        let plan = plan(&sales(10), "s1", 500, 4);
        assert_eq!(plan.total_writes(), 4);
        assert_eq!(plan.deferred, 6);

        let none = super::plan(&sales(3), "s1", 500, 0);
        assert!(none.batches.is_empty());
        assert_eq!(none.deferred, 3);
    }

    #[test]
    fn test_invalid_entries_reported() {
        let entries = vec![
            entry("o1", "WIDGET", "w1", "{}"),
            entry("o2", entity::SALE, "s1", "not json"),
            entry("o3", entity::SALE, "s2", "[1, 2]"),
            entry("o4", entity::SALE, "s3", "{}"),
        ];
        let plan = plan(&entries, "s1", 500, 100);
        assert_eq!(plan.invalid.len(), 3);
        assert_eq!(plan.total_writes(), 1);
    }
}

//! Orphan detection across the two stores.
//!
//! Neither upload workflow is transactional: the presigned workflow can leave
//! a record whose object was never written, and the direct workflow can leave
//! an object whose record insert failed. This sweep correlates the two sides
//! and reports the differences. It never deletes anything.

use crate::photo_store::PhotoStore;
use crate::s3_storage::S3Storage;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, instrument};

/// Result of one reconciliation sweep
#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    /// Storage keys of records with no backing object
    pub records_without_object: Vec<String>,
    /// Object keys with no metadata record
    pub objects_without_record: Vec<String>,
    /// Total records examined
    pub record_count: usize,
    /// Total objects examined
    pub object_count: usize,
}

/// Run a sweep: list both sides and diff their key sets
#[instrument(skip(store, storage))]
pub async fn run(store: &PhotoStore, storage: &S3Storage) -> Result<ReconcileReport> {
    let record_keys: BTreeSet<String> = store.list_storage_keys().await?.into_iter().collect();
    let object_keys: BTreeSet<String> = storage.list_keys().await?.into_iter().collect();

    let (records_without_object, objects_without_record) = diff_keys(&record_keys, &object_keys);

    info!(
        record_count = record_keys.len(),
        object_count = object_keys.len(),
        orphaned_records = records_without_object.len(),
        orphaned_objects = objects_without_record.len(),
        "Reconciliation sweep completed"
    );

    Ok(ReconcileReport {
        records_without_object,
        objects_without_record,
        record_count: record_keys.len(),
        object_count: object_keys.len(),
    })
}

fn diff_keys(
    record_keys: &BTreeSet<String>,
    object_keys: &BTreeSet<String>,
) -> (Vec<String>, Vec<String>) {
    let records_without_object = record_keys.difference(object_keys).cloned().collect();
    let objects_without_record = object_keys.difference(record_keys).cloned().collect();
    (records_without_object, objects_without_record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_keys() {
        let records = keys(&["photos/a.jpg", "photos/b.jpg", "photos/c.jpg"]);
        let objects = keys(&["photos/b.jpg", "photos/c.jpg", "photos/d.jpg"]);

        let (orphan_records, orphan_objects) = diff_keys(&records, &objects);
        assert_eq!(orphan_records, vec!["photos/a.jpg"]);
        assert_eq!(orphan_objects, vec!["photos/d.jpg"]);
    }

    #[test]
    fn test_diff_keys_consistent_stores() {
        let both = keys(&["photos/a.jpg"]);
        let (orphan_records, orphan_objects) = diff_keys(&both, &both);
        assert!(orphan_records.is_empty());
        assert!(orphan_objects.is_empty());
    }
}

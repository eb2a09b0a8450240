//! Map-based record store with legacy-format migration
//!
//! The canonical persisted representation is a JSON object keying records by
//! id. Earlier clients wrote a plain array of records; that form is migrated
//! to the map transparently on first read and the migrated form persisted
//! back before being returned. Shape anomalies are recovered locally (logged,
//! empty map substituted); genuine I/O failures always propagate.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use promptvault_core::{Record, RecordId, StoreResult};

use crate::backend::StorageBackend;

/// How a write combines with the persisted map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Read the latest persisted map and union the caller's entries on top.
    /// Used for creates and updates to shrink clobber windows.
    Merge,
    /// Persist the caller's map verbatim. Mandatory for deletions: a merge
    /// would resurrect a deleted key if a concurrent read raced ahead of
    /// the delete.
    Replace,
}

/// Shape of the raw backing value, classified before any migration runs.
#[derive(Debug)]
pub enum StoredValue<R> {
    /// Canonical id-keyed map.
    Canonical(HashMap<RecordId, R>),
    /// Ordered sequence written by legacy clients.
    Legacy(Vec<R>),
    /// Key absent (or JSON null).
    Empty,
    /// Neither object-map nor sequence.
    Malformed,
}

/// Store for one record kind, bound to one backing key.
pub struct RecordStore<R> {
    backend: Arc<dyn StorageBackend>,
    key: String,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> RecordStore<R> {
    pub fn new(backend: Arc<dyn StorageBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            _record: PhantomData,
        }
    }

    /// Backing key this store reads and writes.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Classify a raw backing value. Pure over the payload; does no I/O.
    ///
    /// Individual entries that fail to deserialize are skipped with a
    /// warning: upstream writers are dynamically typed and a single bad
    /// entry must not take the whole library down.
    pub fn classify(raw: Option<&Bytes>) -> StoredValue<R> {
        let Some(bytes) = raw else {
            return StoredValue::Empty;
        };

        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(_) => return StoredValue::Malformed,
        };

        match value {
            Value::Object(entries) => {
                let mut records = HashMap::with_capacity(entries.len());
                for (id, entry) in entries {
                    match serde_json::from_value::<R>(entry) {
                        Ok(record) => {
                            records.insert(RecordId::from(id), record);
                        }
                        Err(err) => {
                            warn!(
                                entity = R::ENTITY,
                                id = %id,
                                error = %err,
                                "skipping map entry that does not deserialize"
                            );
                        }
                    }
                }
                StoredValue::Canonical(records)
            }
            Value::Array(items) => {
                let mut records = Vec::with_capacity(items.len());
                for entry in items {
                    match serde_json::from_value::<R>(entry) {
                        Ok(record) => records.push(record),
                        Err(err) => {
                            warn!(
                                entity = R::ENTITY,
                                error = %err,
                                "skipping sequence entry that does not deserialize"
                            );
                        }
                    }
                }
                StoredValue::Legacy(records)
            }
            Value::Null => StoredValue::Empty,
            _ => StoredValue::Malformed,
        }
    }

    /// Current persisted map.
    ///
    /// Legacy sequences are migrated to the canonical map form, persisted
    /// back once, and returned. An absent key yields an empty map. A
    /// malformed value yields an empty map after a warning; it is never an
    /// error.
    pub async fn read(&self) -> StoreResult<HashMap<RecordId, R>> {
        let raw = self.backend.get(&self.key).await?;

        match Self::classify(raw.as_ref()) {
            StoredValue::Canonical(records) => Ok(records),
            StoredValue::Legacy(items) => {
                debug!(
                    entity = R::ENTITY,
                    key = %self.key,
                    count = items.len(),
                    "migrating legacy sequence to map form"
                );
                let mut records = HashMap::with_capacity(items.len());
                for record in items {
                    records.insert(record.id().clone(), record);
                }
                self.persist(&records).await?;
                Ok(records)
            }
            StoredValue::Empty => Ok(HashMap::new()),
            StoredValue::Malformed => {
                warn!(
                    entity = R::ENTITY,
                    key = %self.key,
                    "backing value is neither a map nor a sequence; substituting an empty map"
                );
                Ok(HashMap::new())
            }
        }
    }

    /// Persist `records` according to `mode`.
    pub async fn write(
        &self,
        records: HashMap<RecordId, R>,
        mode: WriteMode,
    ) -> StoreResult<()> {
        match mode {
            WriteMode::Replace => self.persist(&records).await,
            WriteMode::Merge => {
                let mut merged = self.read().await?;
                merged.extend(records);
                self.persist(&merged).await
            }
        }
    }

    async fn persist(&self, records: &HashMap<RecordId, R>) -> StoreResult<()> {
        let payload = serde_json::to_vec(records)?;
        self.backend.put(&self.key, Bytes::from(payload)).await
    }

    /// Externally visible list form: ascending `created_at`, ties broken by
    /// id lexical order. Stable for any given map state.
    pub fn to_sorted_list(records: &HashMap<RecordId, R>) -> Vec<R> {
        let mut list: Vec<R> = records.values().cloned().collect();
        list.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use promptvault_core::PromptRecord;

    use crate::memory::MemoryStorageBackend;

    fn record(id: &str, created_secs: i64) -> PromptRecord {
        PromptRecord {
            id: RecordId::new(id),
            name: format!("name-{id}"),
            template: format!("template-{id}"),
            description: String::new(),
            created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            updated_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
        }
    }

    fn store(backend: &MemoryStorageBackend) -> RecordStore<PromptRecord> {
        RecordStore::new(Arc::new(backend.clone()), "prompt_library")
    }

    #[test]
    fn test_classify_absent_is_empty() {
        let classified = RecordStore::<PromptRecord>::classify(None);
        assert!(matches!(classified, StoredValue::Empty));
    }

    #[test]
    fn test_classify_map_is_canonical() {
        let raw = Bytes::from(
            r#"{"p1":{"id":"p1","name":"n","template":"t"}}"#,
        );
        match RecordStore::<PromptRecord>::classify(Some(&raw)) {
            StoredValue::Canonical(records) => {
                assert_eq!(records.len(), 1);
                assert!(records.contains_key(&RecordId::new("p1")));
            }
            other => panic!("expected canonical, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_array_is_legacy() {
        let raw = Bytes::from(r#"[{"id":"p1","name":"n","template":"t"}]"#);
        match RecordStore::<PromptRecord>::classify(Some(&raw)) {
            StoredValue::Legacy(records) => assert_eq!(records.len(), 1),
            other => panic!("expected legacy, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_scalar_is_malformed() {
        for raw in [r#""a string""#, "42", "true", "not json at all"] {
            let raw = Bytes::from(raw);
            assert!(matches!(
                RecordStore::<PromptRecord>::classify(Some(&raw)),
                StoredValue::Malformed
            ));
        }
    }

    #[test]
    fn test_classify_skips_undecodable_entries() {
        let raw = Bytes::from(
            r#"{"p1":{"id":"p1","name":"n","template":"t"},"p2":"garbage"}"#,
        );
        match RecordStore::<PromptRecord>::classify(Some(&raw)) {
            StoredValue::Canonical(records) => {
                assert_eq!(records.len(), 1);
                assert!(records.contains_key(&RecordId::new("p1")));
            }
            other => panic!("expected canonical, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_migrates_legacy_and_persists_map() {
        let backend = MemoryStorageBackend::new();
        backend
            .put(
                "prompt_library",
                Bytes::from(
                    r#"[{"id":"p1","name":"a","template":"t1"},{"id":"p2","name":"b","template":"t2"}]"#,
                ),
            )
            .await
            .unwrap();

        let store = store(&backend);
        let records = store.read().await.unwrap();
        assert_eq!(records.len(), 2);

        // The backing value is now the map form.
        let raw = backend.raw("prompt_library").unwrap();
        let value: Value = serde_json::from_slice(&raw).unwrap();
        assert!(value.is_object());
        assert!(value.get("p1").is_some());
        assert!(value.get("p2").is_some());
    }

    #[tokio::test]
    async fn test_read_malformed_yields_empty_map() {
        let backend = MemoryStorageBackend::new();
        backend
            .put("prompt_library", Bytes::from("\"oops\""))
            .await
            .unwrap();

        let store = store(&backend);
        let records = store.read().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_merge_write_unions_with_persisted_map() {
        let backend = MemoryStorageBackend::new();
        let store = store(&backend);

        let first = record("p1", 100);
        let mut delta = HashMap::new();
        delta.insert(first.id.clone(), first.clone());
        store.write(delta, WriteMode::Merge).await.unwrap();

        let second = record("p2", 200);
        let mut delta = HashMap::new();
        delta.insert(second.id.clone(), second.clone());
        store.write(delta, WriteMode::Merge).await.unwrap();

        let records = store.read().await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_write_drops_missing_keys() {
        let backend = MemoryStorageBackend::new();
        let store = store(&backend);

        let mut records = HashMap::new();
        for (id, secs) in [("p1", 100), ("p2", 200)] {
            let r = record(id, secs);
            records.insert(r.id.clone(), r);
        }
        store.write(records.clone(), WriteMode::Replace).await.unwrap();

        records.remove(&RecordId::new("p1"));
        store.write(records, WriteMode::Replace).await.unwrap();

        let remaining = store.read().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains_key(&RecordId::new("p2")));
    }

    #[test]
    fn test_sorted_list_orders_by_created_at_then_id() {
        let mut records = HashMap::new();
        for (id, secs) in [("c", 300), ("a", 100), ("b", 200), ("d", 100)] {
            let r = record(id, secs);
            records.insert(r.id.clone(), r);
        }

        let list = RecordStore::<PromptRecord>::to_sorted_list(&records);
        let ids: Vec<&str> = list.iter().map(|r| r.id.as_str()).collect();
        // "a" and "d" share a timestamp; id order breaks the tie.
        assert_eq!(ids, vec!["a", "d", "b", "c"]);

        // Deterministic across calls on the same map.
        let again = RecordStore::<PromptRecord>::to_sorted_list(&records);
        let ids_again: Vec<&str> = again.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ids_again);
    }
}

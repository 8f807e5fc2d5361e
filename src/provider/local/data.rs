// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local collections.
//!
//! Batches and transactions stage every write against a copy of the touched
//! collections and swap the copies in only when all writes succeed.
//!
//! Queries run the way a document backend runs them: the part
//! [`DocumentTranslator`] can express is scanned in id order page by page,
//! offsets are skipped by advancing the cursor, and the rest is finished
//! in-process.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::debug;

use super::{new_id, require_non_empty, LocalBackend};
use crate::provider::pagination::{fetch_all, fetch_with_offset, CursorSource};
use crate::provider::query::{evaluate, matches};
use crate::provider::translate::DocumentTranslator;
use crate::provider::traits::{DataProvider, ErrorCode, ProviderError, ProviderResult};
use crate::provider::types::{
    now_millis, BatchWriteResult, Filter, Operation, Page, Query, Record, Transaction,
    TransactionResult, WriteOp,
};

type Collection = BTreeMap<String, Record>;

fn validate_collection(collection: &str) -> ProviderResult<()> {
    require_non_empty("collection", collection)?;
    if collection.contains('/') {
        return Err(ProviderError::invalid_argument(format!(
            "collection name '{}' must not contain '/'",
            collection
        )));
    }
    Ok(())
}

fn require_object(data: &Value) -> ProviderResult<()> {
    if !data.is_object() {
        return Err(ProviderError::invalid_argument("record data must be a JSON object"));
    }
    Ok(())
}

/// Shallow merge: top-level keys of `patch` replace those in `target`.
fn merge(target: &mut Value, patch: Value) {
    if let (Some(target), Value::Object(patch)) = (target.as_object_mut(), patch) {
        for (key, value) in patch {
            target.insert(key, value);
        }
    }
}

fn apply_create(
    records: &mut Collection,
    collection: &str,
    id: Option<&str>,
    data: Value,
) -> ProviderResult<Record> {
    validate_collection(collection)?;
    require_object(&data)?;

    let id = match id {
        Some(id) => {
            require_non_empty("record id", id)?;
            id.to_string()
        }
        None => new_id(),
    };
    if records.contains_key(&id) {
        return Err(ProviderError::new(
            ErrorCode::AlreadyExists,
            format!("{}/{} already exists", collection, id),
        ));
    }

    let now = now_millis();
    let record = Record {
        id: id.clone(),
        collection: collection.to_string(),
        data,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    records.insert(id, record.clone());
    Ok(record)
}

fn apply_update(
    records: &mut Collection,
    collection: &str,
    id: &str,
    data: Value,
    expected_version: Option<u64>,
) -> ProviderResult<Record> {
    require_object(&data)?;
    let record = records
        .get_mut(id)
        .ok_or_else(|| ProviderError::not_found(format!("{}/{}", collection, id)))?;

    if let Some(expected) = expected_version {
        if record.version != expected {
            return Err(ProviderError::conflict(format!(
                "{}/{} is at version {}, expected {}",
                collection, id, record.version, expected
            )));
        }
    }

    merge(&mut record.data, data);
    record.version += 1;
    record.updated_at = now_millis();
    Ok(record.clone())
}

fn apply_upsert(records: &mut Collection, collection: &str, id: &str, data: Value) -> ProviderResult<Record> {
    validate_collection(collection)?;
    require_non_empty("record id", id)?;
    require_object(&data)?;

    let now = now_millis();
    let record = match records.get(id) {
        Some(existing) => Record {
            data,
            version: existing.version + 1,
            updated_at: now,
            ..existing.clone()
        },
        None => Record {
            id: id.to_string(),
            collection: collection.to_string(),
            data,
            version: 1,
            created_at: now,
            updated_at: now,
        },
    };
    records.insert(id.to_string(), record.clone());
    Ok(record)
}

impl LocalBackend {
    /// Apply `ops` atomically; nothing is visible unless every op succeeds.
    fn apply_writes(&self, ops: &[WriteOp]) -> ProviderResult<Vec<String>> {
        if ops.len() > self.config.batch_limit {
            return Err(ProviderError::invalid_argument(format!(
                "{} writes exceeds the batch limit of {}",
                ops.len(),
                self.config.batch_limit
            )));
        }

        let mut collections = self.collections.write();
        let mut staged: BTreeMap<String, Collection> = BTreeMap::new();
        let mut ids = Vec::with_capacity(ops.len());

        for op in ops {
            let name = op.collection();
            if !staged.contains_key(name) {
                let current = collections.get(name).cloned().unwrap_or_default();
                staged.insert(name.to_string(), current);
            }
            let Some(records) = staged.get_mut(name) else {
                continue;
            };

            let id = match op {
                WriteOp::Create { collection, id, data } => {
                    apply_create(records, collection, id.as_deref(), data.clone())?.id
                }
                WriteOp::Update { collection, id, data, expected_version } => {
                    apply_update(records, collection, id, data.clone(), *expected_version)?.id
                }
                WriteOp::Upsert { collection, id, data } => {
                    apply_upsert(records, collection, id, data.clone())?.id
                }
                WriteOp::Delete { id, .. } => {
                    records.remove(id);
                    id.clone()
                }
            };
            ids.push(id);
        }

        for (name, records) in staged {
            collections.insert(name, records);
        }
        Ok(ids)
    }
}

#[async_trait]
impl DataProvider for LocalBackend {
    fn max_batch_size(&self) -> usize {
        self.config.batch_limit
    }

    async fn create_record(
        &self,
        collection: &str,
        id: Option<&str>,
        data: Value,
    ) -> ProviderResult<Record> {
        self.enter(Operation::CreateRecord)?;
        validate_collection(collection)?;
        let mut collections = self.collections.write();
        let records = collections.entry(collection.to_string()).or_default();
        apply_create(records, collection, id, data)
    }

    async fn get_record(&self, collection: &str, id: &str) -> ProviderResult<Option<Record>> {
        self.enter(Operation::GetRecord)?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> ProviderResult<Record> {
        self.enter(Operation::UpdateRecord)?;
        let mut collections = self.collections.write();
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| ProviderError::not_found(format!("{}/{}", collection, id)))?;
        apply_update(records, collection, id, data, expected_version)
    }

    async fn delete_record(&self, collection: &str, id: &str) -> ProviderResult<()> {
        self.enter(Operation::DeleteRecord)?;
        if let Some(records) = self.collections.write().get_mut(collection) {
            records.remove(id);
        }
        Ok(())
    }

    async fn query_records(&self, query: &Query) -> ProviderResult<Vec<Record>> {
        self.enter(Operation::QueryRecords)?;
        let translated = DocumentTranslator::translate(query);
        let native: Vec<Filter> = query
            .filters
            .iter()
            .filter(|f| !translated.residual.contains(f))
            .cloned()
            .collect();
        let scan = Scan {
            backend: self,
            collection: &query.collection,
            filters: &native,
        };

        // Id order is the scan order, so only other sorts need every match
        if query.sort.is_empty() && !translated.window_in_process {
            let offset = translated.emulated_offset.unwrap_or(0);
            return fetch_with_offset(&scan, offset, query.limit, SCAN_PAGE_SIZE).await;
        }

        let rows = fetch_all(&scan, SCAN_PAGE_SIZE).await?;
        if translated.window_in_process {
            return Ok(translated.finish(rows, query));
        }
        let window = Query {
            filters: Vec::new(),
            ..query.clone()
        };
        Ok(evaluate(rows, &window))
    }

    async fn count_records(&self, query: &Query) -> ProviderResult<u64> {
        self.enter(Operation::CountRecords)?;
        let collections = self.collections.read();
        let Some(records) = collections.get(&query.collection) else {
            return Ok(0);
        };
        Ok(evaluate(records.values().cloned(), &query.unbounded()).len() as u64)
    }

    async fn batch_write(&self, ops: &[WriteOp]) -> ProviderResult<BatchWriteResult> {
        self.enter(Operation::BatchWrite)?;
        let ids = self.apply_writes(ops)?;
        debug!(written = ids.len(), "Applied local batch");
        Ok(BatchWriteResult {
            written: ids.len(),
            ids,
        })
    }

    async fn transaction(&self, transaction: &Transaction) -> ProviderResult<TransactionResult> {
        self.enter(Operation::Transaction)?;

        // Reads observe the state before any of the transaction's writes
        let reads = {
            let collections = self.collections.read();
            transaction
                .reads
                .iter()
                .map(|r| {
                    collections
                        .get(&r.collection)
                        .and_then(|records| records.get(&r.id))
                        .cloned()
                })
                .collect()
        };
        let written = self.apply_writes(&transaction.writes)?.len();

        Ok(TransactionResult { reads, written })
    }

    async fn list_collections(&self) -> ProviderResult<Vec<String>> {
        self.enter(Operation::ListCollections)?;
        Ok(self
            .collections
            .read()
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn list_records(
        &self,
        collection: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> ProviderResult<Page<Record>> {
        self.enter(Operation::ListRecords)?;
        Ok(self.page_of(collection, cursor, limit, &[]))
    }
}

/// Records fetched per page when a query scans a collection.
const SCAN_PAGE_SIZE: usize = 100;

impl LocalBackend {
    /// Up to `limit` records matching `filters`, in id order after `cursor`.
    fn page_of(&self, collection: &str, cursor: Option<&str>, limit: usize, filters: &[Filter]) -> Page<Record> {
        let collections = self.collections.read();
        let Some(records) = collections.get(collection) else {
            return Page::last(Vec::new());
        };

        let start = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Unbounded,
        };
        let mut remaining = records
            .range((start, Bound::Unbounded))
            .map(|(_, r)| r)
            .filter(|r| matches(r, filters));
        let items: Vec<Record> = remaining.by_ref().take(limit.max(1)).cloned().collect();
        let next_cursor = match remaining.next() {
            Some(_) => items.last().map(|r| r.id.clone()),
            None => None,
        };
        Page { items, next_cursor }
    }
}

/// Cursor over the records of one collection that pass the native filters.
struct Scan<'a> {
    backend: &'a LocalBackend,
    collection: &'a str,
    filters: &'a [Filter],
}

#[async_trait]
impl CursorSource for Scan<'_> {
    type Item = Record;

    async fn page(&self, cursor: Option<&str>, page_size: usize) -> ProviderResult<Page<Record>> {
        Ok(self.backend.page_of(self.collection, cursor, page_size, self.filters))
    }
}

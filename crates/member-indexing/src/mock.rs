//! In-memory collaborators for tests.
//!
//! [`InMemoryMemberStore`] can hide a member for its first few fetches to mimic a
//! lagging read replica. [`InMemoryIndex`] evaluates the same search requests as
//! the real index and can be told to fail writes or deletes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use member_types::{parse_date, AttributeDefinition, FlattenedDocument, MemberSnapshot};

use crate::client::{project_source, IndexClient, SearchHit, SearchRequest, SortOrder};
use crate::error::SyncError;
use crate::store::MemberStore;

/// Minimal flattened document for seeding an index.
pub fn document(id: &str, tenant_id: &str, joined_at: &str) -> FlattenedDocument {
    let mut body = serde_json::Map::new();
    body.insert("uuid_memberId".to_string(), Value::from(id));
    body.insert("uuid_tenantId".to_string(), Value::from(tenant_id));
    body.insert("date_joinedAt".to_string(), Value::from(joined_at));
    FlattenedDocument::new(id, body)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// [`MemberStore`] held in memory.
#[derive(Default)]
pub struct InMemoryMemberStore {
    /// member id -> snapshots in insertion order
    members: Mutex<BTreeMap<String, Vec<MemberSnapshot>>>,
    definitions: Mutex<HashMap<String, Vec<AttributeDefinition>>>,
    /// tenant id -> queued member ids
    pending: Mutex<BTreeMap<String, BTreeSet<String>>>,
    synced: Mutex<Vec<String>>,
    /// member id -> fetches left during which the member stays invisible
    hidden: Mutex<HashMap<String, usize>>,
    claim_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot and queue its member, like a write to the real store.
    pub fn insert_snapshot(&self, snapshot: MemberSnapshot) {
        lock(&self.pending)
            .entry(snapshot.tenant_id.clone())
            .or_default()
            .insert(snapshot.id.clone());
        lock(&self.members)
            .entry(snapshot.id.clone())
            .or_default()
            .push(snapshot);
    }

    pub fn set_attribute_definitions(&self, tenant_id: &str, definitions: Vec<AttributeDefinition>) {
        lock(&self.definitions).insert(tenant_id.to_string(), definitions);
    }

    /// Delete a member's snapshots, leaving any queue entry behind.
    pub fn vanish(&self, member_id: &str) {
        lock(&self.members).remove(member_id);
    }

    /// Make the member invisible to its next `fetches` fetches.
    pub fn hide_for_fetches(&self, member_id: &str, fetches: usize) {
        lock(&self.hidden).insert(member_id.to_string(), fetches);
    }

    /// Acknowledge members outside of any sync run.
    ///
    /// Returns how many of `member_ids` were still queued.
    pub fn mark_synced_now(&self, member_ids: &[String]) -> usize {
        let mut pending = lock(&self.pending);
        let mut removed = 0;
        for id in member_ids {
            if pending.values_mut().any(|queue| queue.remove(id)) {
                removed += 1;
            }
        }
        lock(&self.synced).extend(member_ids.iter().cloned());
        removed
    }

    pub fn pending_ids(&self, tenant_id: &str) -> Vec<String> {
        lock(&self.pending)
            .get(tenant_id)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every id acknowledged so far, in order, with repeats.
    pub fn synced_ids(&self) -> Vec<String> {
        lock(&self.synced).clone()
    }

    pub fn claim_calls(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn is_hidden(&self, member_id: &str) -> bool {
        let mut hidden = lock(&self.hidden);
        match hidden.get_mut(member_id) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn reset_pending(&self, tenant_id: &str) -> Result<usize, SyncError> {
        let ids: BTreeSet<String> = lock(&self.members)
            .iter()
            .filter(|(_, rows)| rows.iter().any(|r| r.tenant_id == tenant_id))
            .map(|(id, _)| id.clone())
            .collect();
        let count = ids.len();
        lock(&self.pending).insert(tenant_id.to_string(), ids);
        Ok(count)
    }

    async fn claim_pending(
        &self,
        tenant_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<String>, SyncError> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.pending)
            .get(tenant_id)
            .map(|queue| {
                queue
                    .iter()
                    .skip(page * page_size)
                    .take(page_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_snapshots(&self, member_ids: &[String]) -> Result<Vec<MemberSnapshot>, SyncError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = Vec::new();
        for id in member_ids {
            if self.is_hidden(id) {
                continue;
            }
            if let Some(snapshots) = lock(&self.members).get(id) {
                rows.extend(snapshots.iter().cloned());
            }
        }
        Ok(rows)
    }

    async fn fetch_attribute_definitions(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<AttributeDefinition>, SyncError> {
        Ok(lock(&self.definitions)
            .get(tenant_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_synced(&self, member_ids: &[String]) -> Result<usize, SyncError> {
        Ok(self.mark_synced_now(member_ids))
    }

    async fn existing_ids(
        &self,
        tenant_id: &str,
        member_ids: &[String],
    ) -> Result<Vec<String>, SyncError> {
        let members = lock(&self.members);
        Ok(member_ids
            .iter()
            .filter(|id| {
                members
                    .get(id.as_str())
                    .is_some_and(|rows| rows.iter().any(|r| r.tenant_id == tenant_id))
            })
            .cloned()
            .collect())
    }
}

/// [`IndexClient`] held in memory, one document map per index name.
#[derive(Default)]
pub struct InMemoryIndex {
    indices: Mutex<HashMap<String, BTreeMap<String, FlattenedDocument>>>,
    deleted: Mutex<Vec<String>>,
    search_calls: AtomicUsize,
    /// Successful writes allowed before writes start failing
    writes_left: Mutex<Option<usize>>,
    /// Successful deletes allowed before deletes start failing
    deletes_left: Mutex<Option<usize>>,
}

fn sort_key(doc: &FlattenedDocument, field: &str) -> Option<DateTime<Utc>> {
    doc.field(field)
        .and_then(Value::as_str)
        .and_then(|raw| parse_date(raw).ok())
}

/// Consume one unit of a failure budget. Returns false once it is exhausted.
fn take_budget(budget: &Mutex<Option<usize>>) -> bool {
    let mut budget = lock(budget);
    match budget.as_mut() {
        None => true,
        Some(0) => false,
        Some(left) => {
            *left -= 1;
            true
        }
    }
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly.
    pub fn insert(&self, index: &str, document: FlattenedDocument) {
        lock(&self.indices)
            .entry(index.to_string())
            .or_default()
            .insert(document.id.clone(), document);
    }

    pub fn document(&self, index: &str, id: &str) -> Option<FlattenedDocument> {
        lock(&self.indices).get(index).and_then(|docs| docs.get(id).cloned())
    }

    /// Document ids of an index in id order.
    pub fn ids(&self, index: &str) -> Vec<String> {
        lock(&self.indices)
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, index: &str) -> usize {
        lock(&self.indices).get(index).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, index: &str) -> bool {
        self.len(index) == 0
    }

    /// Ids passed to delete, in call order.
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Let `n` writes succeed, then fail every write.
    pub fn fail_writes_after(&self, n: usize) {
        *lock(&self.writes_left) = Some(n);
    }

    /// Let `n` deletes succeed, then fail every delete.
    pub fn fail_deletes_after(&self, n: usize) {
        *lock(&self.deletes_left) = Some(n);
    }

    fn upsert(&self, index: &str, documents: &[FlattenedDocument]) -> Result<(), SyncError> {
        if !take_budget(&self.writes_left) {
            return Err(SyncError::Index("injected write failure".to_string()));
        }
        let mut indices = lock(&self.indices);
        let docs = indices.entry(index.to_string()).or_default();
        for document in documents {
            docs.insert(document.id.clone(), document.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl IndexClient for InMemoryIndex {
    async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, SyncError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let indices = lock(&self.indices);
        let Some(docs) = indices.get(index) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<(Option<DateTime<Utc>>, &FlattenedDocument)> = docs
            .values()
            .filter(|doc| {
                doc.field(&request.filter.field).and_then(Value::as_str)
                    == Some(request.filter.value.as_str())
            })
            .map(|doc| (sort_key(doc, &request.sort.field), doc))
            .filter(|(key, _)| match (request.search_after, key) {
                (Some(cursor), Some(key)) => *key > cursor.0,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();

        matching.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        if request.sort.order == SortOrder::Desc {
            matching.reverse();
        }

        Ok(matching
            .into_iter()
            .take(request.size)
            .map(|(_, doc)| SearchHit {
                id: doc.id.clone(),
                source: project_source(doc.body.clone(), request.source_fields.as_deref()),
            })
            .collect())
    }

    async fn bulk_write(
        &self,
        index: &str,
        documents: &[FlattenedDocument],
    ) -> Result<(), SyncError> {
        self.upsert(index, documents)
    }

    async fn write(&self, index: &str, document: &FlattenedDocument) -> Result<(), SyncError> {
        self.upsert(index, std::slice::from_ref(document))
    }

    async fn delete(&self, index: &str, id: &str) -> Result<(), SyncError> {
        if !take_budget(&self.deletes_left) {
            return Err(SyncError::Index(format!("injected delete failure for {}", id)));
        }
        if let Some(docs) = lock(&self.indices).get_mut(index) {
            docs.remove(id);
        }
        lock(&self.deleted).push(id.to_string());
        Ok(())
    }
}

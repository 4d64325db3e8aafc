//! Tables: named document collections with cached search
//!
//! Every mutation is a read-modify-write of the whole storage snapshot,
//! done while holding the storage lock, followed by a query cache flush.
//! Searches with a cacheable query are memoized in an LRU cache keyed by
//! the query's [`LookupKey`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use pocketcache::{CacheStats, LruCache};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::TableConfig;
use crate::document::{DocId, Document, Fields, IntoDocument};
use crate::error::{Error, Result};
use crate::operations::Operation;
use crate::query::{LookupKey, Query};
use crate::storage::{StorageHandle, TableData};

/// Which documents an operation applies to
///
/// At most one of the three forms may be set. `get`, `contains` and
/// `remove` need exactly one; `update` treats an empty selector as
/// "every document".
#[derive(Debug, Clone, Default)]
pub struct Selector {
    doc_id: Option<DocId>,
    cond: Option<Query>,
    doc_ids: Option<Vec<DocId>>,
}

#[derive(Debug)]
enum Target {
    Id(DocId),
    Cond(Query),
    Ids(Vec<DocId>),
}

impl Selector {
    /// Empty selector
    pub fn new() -> Self {
        Self::default()
    }

    /// Select by a single ID
    pub fn doc_id(mut self, doc_id: DocId) -> Self {
        self.doc_id = Some(doc_id);
        self
    }

    /// Select documents matching a query
    pub fn cond(mut self, cond: Query) -> Self {
        self.cond = Some(cond);
        self
    }

    /// Select by a list of IDs
    pub fn doc_ids<I: IntoIterator<Item = DocId>>(mut self, doc_ids: I) -> Self {
        self.doc_ids = Some(doc_ids.into_iter().collect());
        self
    }

    fn target(self, op: &str) -> Result<Option<Target>> {
        let given = [
            self.doc_id.is_some(),
            self.cond.is_some(),
            self.doc_ids.is_some(),
        ]
        .iter()
        .filter(|&&set| set)
        .count();

        if given > 1 {
            return Err(Error::usage(format!(
                "{} accepts only one of doc_id, cond or doc_ids",
                op
            )));
        }

        Ok(match (self.doc_id, self.cond, self.doc_ids) {
            (Some(id), _, _) => Some(Target::Id(id)),
            (_, Some(cond), _) => Some(Target::Cond(cond)),
            (_, _, Some(ids)) => Some(Target::Ids(ids)),
            _ => None,
        })
    }

    fn required(self, op: &str) -> Result<Target> {
        self.target(op)?.ok_or_else(|| {
            Error::usage(format!("{} requires one of doc_id, cond or doc_ids", op))
        })
    }
}

impl From<DocId> for Selector {
    fn from(doc_id: DocId) -> Self {
        Selector::new().doc_id(doc_id)
    }
}

impl From<Query> for Selector {
    fn from(cond: Query) -> Self {
        Selector::new().cond(cond)
    }
}

impl From<&Query> for Selector {
    fn from(cond: &Query) -> Self {
        Selector::new().cond(cond.clone())
    }
}

impl From<Vec<DocId>> for Selector {
    fn from(doc_ids: Vec<DocId>) -> Self {
        Selector::new().doc_ids(doc_ids)
    }
}

impl From<&[DocId]> for Selector {
    fn from(doc_ids: &[DocId]) -> Self {
        Selector::new().doc_ids(doc_ids.iter().copied())
    }
}

/// Result of [`Table::get`]: a single optional document for the `doc_id`
/// and `cond` forms, a list for the `doc_ids` form
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Lookup by ID or by condition
    One(Option<Document>),
    /// Lookup by a list of IDs, in the order given, missing IDs skipped
    Many(Vec<Document>),
}

impl Fetched {
    /// The single document (the first one for the list form)
    pub fn one(self) -> Option<Document> {
        match self {
            Fetched::One(doc) => doc,
            Fetched::Many(docs) => docs.into_iter().next(),
        }
    }

    /// All fetched documents
    pub fn many(self) -> Vec<Document> {
        match self {
            Fetched::One(doc) => doc.into_iter().collect(),
            Fetched::Many(docs) => docs,
        }
    }
}

/// Change applied by [`Table::update`]
#[derive(Debug, Clone)]
pub enum Update {
    /// Merge these fields into each document
    Fields(Fields),
    /// Run this transform on each document
    Operation(Operation),
}

impl Update {
    fn apply(&self, doc: &mut Fields) -> Result<()> {
        match self {
            Update::Fields(fields) => {
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
                Ok(())
            }
            Update::Operation(op) => op.apply(doc),
        }
    }
}

/// Anything usable as the change of an update
pub trait IntoUpdate {
    /// Convert, failing if a value is not a JSON object
    fn into_update(self) -> Result<Update>;
}

impl IntoUpdate for Update {
    fn into_update(self) -> Result<Update> {
        Ok(self)
    }
}

impl IntoUpdate for Fields {
    fn into_update(self) -> Result<Update> {
        Ok(Update::Fields(self))
    }
}

impl IntoUpdate for Operation {
    fn into_update(self) -> Result<Update> {
        Ok(Update::Operation(self))
    }
}

impl IntoUpdate for Value {
    fn into_update(self) -> Result<Update> {
        match self {
            Value::Object(fields) => Ok(Update::Fields(fields)),
            other => Err(Error::usage(format!("update fields must be a mapping, got {}", other))),
        }
    }
}

/// Next-ID bookkeeping for one table
#[derive(Debug)]
struct IdCounter {
    next: Option<DocId>,
    first: DocId,
}

impl IdCounter {
    fn new(first: DocId) -> Self {
        Self { next: None, first }
    }

    /// Hand out a fresh ID, established lazily from the largest stored one
    fn allocate(&mut self, table: &TableData) -> Result<DocId> {
        let mut id = match self.next {
            Some(id) if !table.contains_key(&id) => id,
            _ => self.from_table(table)?,
        };
        // Stale counter: another handle wrote to this table
        while table.contains_key(&id) {
            id = id.next().ok_or_else(exhausted)?;
        }
        self.next = id.next();
        Ok(id)
    }

    /// Account for a caller-chosen ID
    fn claim(&mut self, id: DocId) -> Result<()> {
        let following = id
            .next()
            .ok_or_else(|| Error::usage(format!("document ID {} is out of range", id)))?;
        if let Some(next) = self.next {
            if id >= next {
                self.next = Some(following);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.next = None;
    }

    fn from_table(&self, table: &TableData) -> Result<DocId> {
        match table.keys().next_back() {
            Some(max) => Ok(max.next().ok_or_else(exhausted)?.max(self.first)),
            None => Ok(self.first),
        }
    }
}

fn exhausted() -> Error {
    Error::usage("no document IDs left in this table")
}

fn insert_new(
    table: &mut TableData,
    ids: &mut IdCounter,
    doc_id: Option<DocId>,
    fields: Fields,
) -> Result<DocId> {
    let id = match doc_id {
        Some(id) => {
            if table.contains_key(&id) {
                return Err(Error::DuplicateId(id));
            }
            ids.claim(id)?;
            id
        }
        None => ids.allocate(table)?,
    };
    table.insert(id, fields);
    Ok(id)
}

fn matching_ids(table: &TableData, cond: &Query) -> Result<Vec<DocId>> {
    let mut ids = Vec::new();
    for (id, fields) in table {
        if cond.evaluate(fields)? {
            ids.push(*id);
        }
    }
    Ok(ids)
}

/// IDs an update or remove applies to; missing explicit IDs are skipped
fn target_ids(table: &TableData, target: Option<&Target>) -> Result<Vec<DocId>> {
    match target {
        None => Ok(table.keys().copied().collect()),
        Some(Target::Id(id)) => Ok(table.contains_key(id).then_some(*id).into_iter().collect()),
        Some(Target::Ids(ids)) => {
            let mut seen = BTreeSet::new();
            Ok(ids
                .iter()
                .copied()
                .filter(|id| table.contains_key(id) && seen.insert(*id))
                .collect())
        }
        Some(Target::Cond(cond)) => matching_ids(table, cond),
    }
}

fn document(id: &DocId, fields: &Fields) -> Document {
    Document::new(fields.clone(), *id)
}

/// A named collection of documents inside a storage snapshot
pub struct Table {
    name: String,
    storage: StorageHandle,
    config: TableConfig,
    ids: Mutex<IdCounter>,
    query_cache: Mutex<LruCache<LookupKey, Vec<Document>>>,
    stats: CacheStats,

    /// Bumped by every committed write, before the cache is cleared
    generation: AtomicU64,
}

impl Table {
    /// Create a table handle over `storage`
    ///
    /// Nothing is written until the first mutation.
    pub fn new(name: impl Into<String>, storage: StorageHandle, config: TableConfig) -> Self {
        let cache = LruCache::with_capacity(config.query_cache_capacity);
        Self {
            name: name.into(),
            storage,
            ids: Mutex::new(IdCounter::new(config.first_id)),
            config,
            query_cache: Mutex::new(cache),
            stats: CacheStats::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage the table reads from and writes to
    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    /// Settings the table was created with
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Query cache statistics
    pub fn cache_stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Insert a document, returning its ID
    ///
    /// A [`Document`] keeps its own ID and fails with
    /// [`Error::DuplicateId`] if that ID is taken.
    pub fn insert<D: IntoDocument>(&self, doc: D) -> Result<DocId> {
        let (doc_id, fields) = doc.into_document()?;
        let id = self.update_table(|table, ids| insert_new(table, ids, doc_id, fields))?;
        debug!(table = %self.name, id = %id, "inserted document");
        Ok(id)
    }

    /// Insert several documents with a single storage write
    ///
    /// Fails as a whole (nothing is written) if any document is not a
    /// mapping or reuses a taken ID, including one taken earlier in the
    /// same batch.
    pub fn insert_multiple<I, D>(&self, docs: I) -> Result<Vec<DocId>>
    where
        I: IntoIterator<Item = D>,
        D: IntoDocument,
    {
        let docs = docs
            .into_iter()
            .map(IntoDocument::into_document)
            .collect::<Result<Vec<_>>>()?;

        let inserted = self.update_table(|table, ids| {
            docs.into_iter()
                .map(|(doc_id, fields)| insert_new(table, ids, doc_id, fields))
                .collect::<Result<Vec<_>>>()
        })?;
        debug!(table = %self.name, count = inserted.len(), "inserted documents");
        Ok(inserted)
    }

    /// Every document, in ID order
    pub fn all(&self) -> Result<Vec<Document>> {
        Ok(self
            .read_table()?
            .iter()
            .map(|(id, fields)| document(id, fields))
            .collect())
    }

    /// Iterate over a snapshot of the table
    pub fn iter(&self) -> Result<impl Iterator<Item = Document>> {
        Ok(self.all()?.into_iter())
    }

    /// Documents matching `cond`
    ///
    /// Results of cacheable queries are served from the query cache until
    /// the next write to this table.
    pub fn search(&self, cond: &Query) -> Result<Vec<Document>> {
        if let Some(key) = cond.lookup_key() {
            if let Some(cached) = self.query_cache.lock().get(key) {
                self.stats.record_hit();
                trace!(table = %self.name, "query cache hit");
                return Ok(cached.clone());
            }
        }

        self.stats.record_miss();
        trace!(table = %self.name, cacheable = cond.is_cacheable(), "query cache miss");

        let (generation, table) = self.read_table_at()?;
        let mut docs = Vec::new();
        for (id, fields) in &table {
            if cond.evaluate(fields)? {
                docs.push(document(id, fields));
            }
        }

        if let Some(key) = cond.lookup_key() {
            self.remember(key, generation, &docs);
        }

        Ok(docs)
    }

    /// Cache a search result read at `generation`, unless a write has
    /// committed since
    fn remember(&self, key: &LookupKey, generation: u64, docs: &[Document]) {
        let mut cache = self.query_cache.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            trace!(table = %self.name, "table changed during search, result not cached");
            return;
        }

        let evicted = cache.put(key.clone(), docs.to_vec());
        self.stats.record_insert();
        if evicted.is_some() {
            self.stats.record_eviction();
        }
    }

    /// Fetch by exactly one of ID, condition or ID list
    ///
    /// ```
    /// use pocketdb::{query::field, Database, DocId, Selector};
    /// use serde_json::json;
    ///
    /// let db = Database::in_memory();
    /// let users = db.table("users");
    /// users.insert(json!({"name": "Ada"})).unwrap();
    ///
    /// let by_id = users.get(DocId(1)).unwrap().one();
    /// let by_cond = users.get(field("name").eq("Ada")).unwrap().one();
    /// assert_eq!(by_id, by_cond);
    ///
    /// assert!(users.get(Selector::new()).is_err());
    /// ```
    pub fn get(&self, selector: impl Into<Selector>) -> Result<Fetched> {
        let selector: Selector = selector.into();
        let target = selector.required("get")?;
        let table = self.read_table()?;

        Ok(match target {
            Target::Id(id) => Fetched::One(table.get(&id).map(|fields| document(&id, fields))),
            Target::Cond(cond) => {
                let mut found = None;
                for (id, fields) in &table {
                    if cond.evaluate(fields)? {
                        found = Some(document(id, fields));
                        break;
                    }
                }
                Fetched::One(found)
            }
            Target::Ids(ids) => Fetched::Many(
                ids.iter()
                    .filter_map(|id| table.get(id).map(|fields| document(id, fields)))
                    .collect(),
            ),
        })
    }

    /// Whether a document with this ID, or matching this condition, exists
    pub fn contains(&self, selector: impl Into<Selector>) -> Result<bool> {
        let selector: Selector = selector.into();
        match selector.required("contains")? {
            Target::Ids(_) => Err(Error::usage("contains does not accept doc_ids")),
            Target::Id(id) => Ok(self.read_table()?.contains_key(&id)),
            Target::Cond(cond) => {
                for fields in self.read_table()?.values() {
                    if cond.evaluate(fields)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Apply `change` to the selected documents (all of them for an empty
    /// selector), returning the IDs touched
    pub fn update(&self, change: impl IntoUpdate, selector: impl Into<Selector>) -> Result<Vec<DocId>> {
        let change = change.into_update()?;
        let selector: Selector = selector.into();
        let target = selector.target("update")?;

        let updated = self.update_table(|table, _| {
            let ids = target_ids(table, target.as_ref())?;
            for id in &ids {
                if let Some(doc) = table.get_mut(id) {
                    change.apply(doc)?;
                }
            }
            Ok(ids)
        })?;
        debug!(table = %self.name, count = updated.len(), "updated documents");
        Ok(updated)
    }

    /// Apply several `(change, condition)` pairs in one write
    ///
    /// Pairs run in order and each one sees the effects of the previous
    /// ones. Returns the touched IDs of every pair, concatenated.
    pub fn update_multiple<I, U>(&self, updates: I) -> Result<Vec<DocId>>
    where
        I: IntoIterator<Item = (U, Query)>,
        U: IntoUpdate,
    {
        let updates = updates
            .into_iter()
            .map(|(change, cond)| Ok((change.into_update()?, cond)))
            .collect::<Result<Vec<_>>>()?;

        let updated = self.update_table(|table, _| {
            let mut updated = Vec::new();
            for (change, cond) in &updates {
                for id in matching_ids(table, cond)? {
                    if let Some(doc) = table.get_mut(&id) {
                        change.apply(doc)?;
                    }
                    updated.push(id);
                }
            }
            Ok(updated)
        })?;
        debug!(table = %self.name, count = updated.len(), "updated documents");
        Ok(updated)
    }

    /// Update matching documents, or insert `doc` if nothing matches
    ///
    /// A [`Document`] is matched by its own ID and `cond` is ignored;
    /// anything else needs `cond`.
    pub fn upsert<D: IntoDocument>(&self, doc: D, cond: Option<&Query>) -> Result<Vec<DocId>> {
        let (doc_id, fields) = doc.into_document()?;
        if doc_id.is_none() && cond.is_none() {
            return Err(Error::usage(
                "upsert needs a condition or a document with an ID",
            ));
        }

        let change = Update::Fields(fields.clone());
        self.update_table(|table, ids| {
            let matched: Vec<DocId> = match (doc_id, cond) {
                (Some(id), _) => table.contains_key(&id).then_some(id).into_iter().collect(),
                (None, Some(cond)) => matching_ids(table, cond)?,
                (None, None) => Vec::new(),
            };

            if matched.is_empty() {
                return Ok(vec![insert_new(table, ids, doc_id, fields)?]);
            }

            for id in &matched {
                if let Some(doc) = table.get_mut(id) {
                    change.apply(doc)?;
                }
            }
            Ok(matched)
        })
    }

    /// Remove the selected documents, returning the IDs actually removed
    pub fn remove(&self, selector: impl Into<Selector>) -> Result<Vec<DocId>> {
        let selector: Selector = selector.into();
        let target = selector.required("remove")?;

        let removed = self.update_table(|table, _| {
            let ids = target_ids(table, Some(&target))?;
            for id in &ids {
                table.remove(id);
            }
            Ok(ids)
        })?;
        debug!(table = %self.name, count = removed.len(), "removed documents");
        Ok(removed)
    }

    /// Remove every document and restart IDs from the configured first ID
    pub fn truncate(&self) -> Result<()> {
        self.update_table(|table, ids| {
            table.clear();
            ids.reset();
            Ok(())
        })?;
        debug!(table = %self.name, "truncated table");
        Ok(())
    }

    /// Number of documents matching `cond`
    pub fn count(&self, cond: &Query) -> Result<usize> {
        Ok(self.search(cond)?.len())
    }

    /// Drop cached query results; stored documents are untouched
    pub fn clear_cache(&self) {
        self.query_cache.lock().clear();
        self.stats.record_invalidation();
    }

    /// Number of documents in the table
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_table()?.len())
    }

    /// True if the table holds no documents
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_table()?.is_empty())
    }

    /// This table's partition together with the write generation it was
    /// read at
    fn read_table_at(&self) -> Result<(u64, TableData)> {
        self.storage.with(|storage| {
            let generation = self.generation.load(Ordering::SeqCst);
            let table = storage
                .read()?
                .and_then(|mut snapshot| snapshot.remove(&self.name))
                .unwrap_or_default();
            Ok((generation, table))
        })
    }

    fn read_table(&self) -> Result<TableData> {
        Ok(self
            .storage
            .read()?
            .and_then(|mut snapshot| snapshot.remove(&self.name))
            .unwrap_or_default())
    }

    /// Read-modify-write of this table's partition
    ///
    /// Nothing is written if `f` fails. The query cache is cleared after a
    /// successful write, before the storage lock is released.
    fn update_table<T>(&self, f: impl FnOnce(&mut TableData, &mut IdCounter) -> Result<T>) -> Result<T> {
        let mut ids = self.ids.lock();

        self.storage.with(|storage| {
            let mut snapshot = storage.read()?.unwrap_or_default();
            let mut table = snapshot.remove(&self.name).unwrap_or_default();

            let out = f(&mut table, &mut *ids)?;

            snapshot.insert(self.name.clone(), table);
            storage.write(&snapshot)?;
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.clear_cache();
            Ok(out)
        })
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("cached_queries", &self.query_cache.lock().len())
            .field("storage", &self.storage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{delete, increment};
    use crate::query::field;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn table() -> Table {
        Table::new("t", StorageHandle::new(MemoryStorage::new()), TableConfig::default())
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let t = table();
        assert_eq!(t.insert(json!({"a": 1})).unwrap(), DocId(1));
        assert_eq!(t.insert(json!({"b": 2})).unwrap(), DocId(2));
        assert_eq!(t.len().unwrap(), 2);
    }

    #[test]
    fn test_insert_non_mapping() {
        let t = table();
        let err = t.insert(json!([1, 2, 3])).unwrap_err();
        assert!(err.is_usage());
        assert!(t.is_empty().unwrap());
    }

    #[test]
    fn test_insert_document_keeps_id() {
        let t = table();
        let id = t.insert(Document::new(fields(json!({"k": "v"})), DocId(5))).unwrap();
        assert_eq!(id, DocId(5));

        // Generated IDs continue after the largest stored one
        assert_eq!(t.insert(json!({"k": "w"})).unwrap(), DocId(6));

        let err = t.insert(Document::new(Fields::new(), DocId(5))).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(DocId(5))));
    }

    #[test]
    fn test_claimed_id_moves_counter() {
        let t = table();
        t.insert(json!({"a": 1})).unwrap();
        t.insert(Document::new(Fields::new(), DocId(2))).unwrap();
        assert_eq!(t.insert(json!({"a": 3})).unwrap(), DocId(3));
    }

    #[test]
    fn test_insert_multiple_is_atomic() {
        let t = table();
        let docs = vec![
            Document::new(fields(json!({"a": 1})), DocId(7)),
            Document::new(fields(json!({"a": 2})), DocId(7)),
        ];

        assert!(matches!(t.insert_multiple(docs), Err(Error::DuplicateId(DocId(7)))));
        assert!(t.is_empty().unwrap());

        assert!(t.insert_multiple(vec![json!({"a": 1}), json!(2)]).unwrap_err().is_usage());
        assert!(t.is_empty().unwrap());
    }

    #[test]
    fn test_first_id_from_config() {
        let config = TableConfig {
            first_id: DocId(100),
            ..TableConfig::default()
        };
        let t = Table::new("t", StorageHandle::new(MemoryStorage::new()), config);

        assert_eq!(t.insert(json!({})).unwrap(), DocId(100));
        t.truncate().unwrap();
        assert_eq!(t.insert(json!({})).unwrap(), DocId(100));
    }

    #[test]
    fn test_selector_rules() {
        let t = table();
        t.insert(json!({"a": 1})).unwrap();

        assert!(t.get(Selector::new()).unwrap_err().is_usage());
        assert!(t
            .get(Selector::new().doc_id(DocId(1)).doc_ids([DocId(1)]))
            .unwrap_err()
            .is_usage());
        assert!(t.contains(vec![DocId(1)]).unwrap_err().is_usage());
        assert!(t.remove(Selector::new()).unwrap_err().is_usage());
        assert!(t
            .update(json!({"b": 1}), Selector::new().doc_id(DocId(1)).cond(Query::noop()))
            .unwrap_err()
            .is_usage());
    }

    #[test]
    fn test_update_operation_error_writes_nothing() {
        let t = table();
        t.insert(json!({"n": 1})).unwrap();
        t.insert(json!({"m": 1})).unwrap();

        let err = t.update(increment("n"), Selector::new()).unwrap_err();
        assert!(matches!(err, Error::FieldNotFound(_)));
        assert_eq!(t.get(DocId(1)).unwrap().one().unwrap()["n"], 1);
    }

    #[test]
    fn test_update_by_ids_skips_missing() {
        let t = table();
        t.insert(json!({"a": 1})).unwrap();

        let ids = t.update(delete("a"), vec![DocId(1), DocId(9)]).unwrap();
        assert_eq!(ids, vec![DocId(1)]);
        assert_eq!(t.all().unwrap(), vec![Document::new(Fields::new(), DocId(1))]);
    }

    #[test]
    fn test_search_uses_cache() {
        let t = table();
        t.insert(json!({"a": 1})).unwrap();
        let q = field("a").eq(1);

        t.search(&q).unwrap();
        t.search(&q).unwrap();
        assert_eq!(t.cache_stats().hits(), 1);
        assert_eq!(t.cache_stats().misses(), 1);

        let uncached = field("a").test(|v: &Value| *v == 1);
        t.search(&uncached).unwrap();
        t.search(&uncached).unwrap();
        assert_eq!(t.cache_stats().hits(), 1);
        assert_eq!(t.cache_stats().inserts(), 1);
    }

    #[test]
    fn test_cache_capacity_evicts() {
        let config = TableConfig {
            query_cache_capacity: Some(1),
            ..TableConfig::default()
        };
        let t = Table::new("t", StorageHandle::new(MemoryStorage::new()), config);

        t.search(&field("a").eq(1)).unwrap();
        t.search(&field("a").eq(2)).unwrap();
        t.search(&field("a").eq(1)).unwrap();

        assert_eq!(t.cache_stats().hits(), 0);
        assert_eq!(t.cache_stats().evictions(), 2);
    }

    #[test]
    fn test_result_read_before_write_is_not_cached() {
        let t = table();
        t.insert(json!({"a": 2})).unwrap();
        let q = field("a").eq(1);

        // A search reads, then a write commits before it fills the cache
        let (generation, data) = t.read_table_at().unwrap();
        assert!(data.values().all(|doc| !q.evaluate(doc).unwrap()));
        t.insert(json!({"a": 1})).unwrap();
        t.remember(q.lookup_key().unwrap(), generation, &[]);

        assert_eq!(t.search(&q).unwrap().len(), 1);
        assert_eq!(t.cache_stats().hits(), 0);

        // Unchanged generation: the result is kept
        let (generation, _) = t.read_table_at().unwrap();
        t.clear_cache();
        t.remember(q.lookup_key().unwrap(), generation, &[]);
        assert!(t.search(&q).unwrap().is_empty());
        assert_eq!(t.cache_stats().hits(), 1);
    }

    #[test]
    fn test_largest_doc_id() {
        let t = table();

        let err = t.insert(Document::new(Fields::new(), DocId(u64::MAX))).unwrap_err();
        assert!(err.is_usage());
        assert!(t.is_empty().unwrap());
        assert_eq!(t.insert(json!({})).unwrap(), DocId(1));

        t.insert(Document::new(Fields::new(), DocId(u64::MAX - 1))).unwrap();
        assert_eq!(t.insert(json!({})).unwrap(), DocId(u64::MAX));
        assert!(t.insert(json!({})).unwrap_err().is_usage());
        assert_eq!(t.len().unwrap(), 3);
    }

    #[test]
    fn test_repeated_ids_touched_once() {
        let t = table();
        t.insert_multiple(vec![json!({"n": 0}), json!({"n": 0})]).unwrap();

        let updated = t.update(increment("n"), vec![DocId(2), DocId(1), DocId(2)]).unwrap();
        assert_eq!(updated, vec![DocId(2), DocId(1)]);
        assert_eq!(t.get(DocId(2)).unwrap().one().unwrap()["n"], 1);

        assert_eq!(t.remove(vec![DocId(2), DocId(2)]).unwrap(), vec![DocId(2)]);
    }
}

//! Storage backbone: one `redb` database, JSON rows, composite string
//! keys.
//!
//! Row keys are `"{kind}:{id:020}"`; the zero-padded id keeps rows for
//! one family contiguous and ordered under prefix scans. All writes are
//! ACID: every multi-step mutation in this crate runs inside a single
//! `redb` write transaction, and redb serializes write transactions, so
//! read-check-write sequences (inventory consume, cycle-check-then-link)
//! are race-free without any extra locking. Dropping an uncommitted
//! transaction rolls back, so partial writes are never observable.

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use tracing::debug;

use crate::error::{LabError, Result};
use crate::model::{EntityId, EntityKind, Record};

/// Entity rows: `"{kind}:{id:020}"` -> JSON record.
pub(crate) const ENTITIES: TableDefinition<&str, &str> = TableDefinition::new("entities");
/// Forward edge rows: `"{relation}:{a:020}:{b:020}"` -> JSON edge.
pub(crate) const EDGES: TableDefinition<&str, &str> = TableDefinition::new("edges");
/// Reverse edge index: `"{relation}:{b:020}:{a:020}"` -> forward key.
/// Maintained in the same transaction as the forward row.
pub(crate) const EDGES_REV: TableDefinition<&str, &str> = TableDefinition::new("edges_rev");
/// Single-row bookkeeping: `"next_id"` -> next unallocated entity id.
pub(crate) const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

pub(crate) fn entity_key(kind: EntityKind, id: EntityId) -> String {
    format!("{}:{:020}", kind.as_str(), id.0)
}

pub(crate) fn kind_prefix(kind: EntityKind) -> String {
    format!("{}:", kind.as_str())
}

/// Labgraph research graph database.
///
/// An embedded, serverless store for laboratory entities, their typed
/// relationships, and inventory accounting. All writes are ACID
/// (backed by `redb`). The database file uses the `.labgraph`
/// extension by convention.
///
/// # Example
///
/// ```rust,no_run
/// use labgraph::LabGraph;
///
/// let graph = LabGraph::open("research.labgraph").unwrap();
/// ```
pub struct LabGraph {
    pub(crate) db: Database,
}

impl LabGraph {
    /// Open or create a Labgraph database at the given path.
    ///
    /// The file will be created if it does not exist. The `.labgraph`
    /// extension is conventional but not enforced.
    pub fn open(path: &str) -> Result<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Create an in-memory database (no file I/O).
    ///
    /// Useful for testing and ephemeral workloads; data is lost when
    /// the instance is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(ENTITIES)?;
        write_txn.open_table(EDGES)?;
        write_txn.open_table(EDGES_REV)?;
        write_txn.open_table(META)?;
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Allocate the next entity id inside an open write transaction.
    /// The counter row commits atomically with the row that uses it.
    pub(crate) fn next_id_in(txn: &WriteTransaction) -> Result<EntityId> {
        let mut meta = txn.open_table(META)?;
        let next: u64 = meta.get("next_id")?.map(|g| g.value()).unwrap_or(1);
        meta.insert("next_id", next + 1)?;
        Ok(EntityId(next))
    }

    pub(crate) fn exists_in(txn: &WriteTransaction, kind: EntityKind, id: EntityId) -> Result<bool> {
        let table = txn.open_table(ENTITIES)?;
        let found = table.get(entity_key(kind, id).as_str())?.is_some();
        Ok(found)
    }

    pub(crate) fn read_row_in<R: Record>(
        txn: &WriteTransaction,
        id: EntityId,
    ) -> Result<Option<R>> {
        let table = txn.open_table(ENTITIES)?;
        let raw: Option<String> = table
            .get(entity_key(R::KIND, id).as_str())?
            .map(|g| g.value().to_string());
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn write_row_in<R: Record>(txn: &WriteTransaction, record: &R) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut table = txn.open_table(ENTITIES)?;
        table.insert(entity_key(R::KIND, record.id()).as_str(), json.as_str())?;
        Ok(())
    }

    pub(crate) fn delete_row_in(
        txn: &WriteTransaction,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<bool> {
        let mut table = txn.open_table(ENTITIES)?;
        let removed = table.remove(entity_key(kind, id).as_str())?.is_some();
        Ok(removed)
    }

    /// Decode every row of one family inside an open write transaction.
    pub(crate) fn scan_kind_in<R: Record>(txn: &WriteTransaction) -> Result<Vec<R>> {
        let table = txn.open_table(ENTITIES)?;
        let prefix = kind_prefix(R::KIND);
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if k.value().starts_with(&prefix) {
                out.push(serde_json::from_str(v.value())?);
            }
        }
        Ok(out)
    }

    /// Insert a new entity. The id is allocated and the timestamps are
    /// stamped inside the same transaction that persists the row.
    pub fn create<R: Record>(
        &self,
        build: impl FnOnce(EntityId, DateTime<Utc>) -> R,
    ) -> Result<R> {
        self.create_checked(build, &[])
    }

    /// Insert a new entity after verifying that every `(kind, id)` in
    /// `refs` exists. The checks run inside the insert transaction, so
    /// a concurrent delete cannot leave a dangling foreign key.
    pub fn create_checked<R: Record>(
        &self,
        build: impl FnOnce(EntityId, DateTime<Utc>) -> R,
        refs: &[(EntityKind, EntityId)],
    ) -> Result<R> {
        let txn = self.db.begin_write()?;
        for (kind, id) in refs {
            if !Self::exists_in(&txn, *kind, *id)? {
                return Err(LabError::not_found(*kind, *id));
            }
        }
        let id = Self::next_id_in(&txn)?;
        let now = Utc::now();
        let record = build(id, now);
        Self::write_row_in(&txn, &record)?;
        txn.commit()?;
        debug!(kind = R::KIND.as_str(), %id, "created entity");
        Ok(record)
    }

    pub fn get<R: Record>(&self, id: EntityId) -> Result<R> {
        self.get_opt(id)?
            .ok_or_else(|| LabError::not_found(R::KIND, id))
    }

    pub fn get_opt<R: Record>(&self, id: EntityId) -> Result<Option<R>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTITIES)?;
        let raw: Option<String> = table
            .get(entity_key(R::KIND, id).as_str())?
            .map(|g| g.value().to_string());
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, kind: EntityKind, id: EntityId) -> Result<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTITIES)?;
        Ok(table.get(entity_key(kind, id).as_str())?.is_some())
    }

    /// Overwrite an existing entity and bump its `updated_at`.
    ///
    /// This is the generic field-update path. It is NOT the inventory
    /// decrement path; see [`LabGraph::consume`].
    pub fn replace<R: Record>(&self, record: R) -> Result<R> {
        self.replace_checked(record, &[])
    }

    /// Overwrite after verifying foreign-key targets, like
    /// [`LabGraph::create_checked`].
    pub fn replace_checked<R: Record>(
        &self,
        mut record: R,
        refs: &[(EntityKind, EntityId)],
    ) -> Result<R> {
        let txn = self.db.begin_write()?;
        for (kind, id) in refs {
            if !Self::exists_in(&txn, *kind, *id)? {
                return Err(LabError::not_found(*kind, *id));
            }
        }
        if !Self::exists_in(&txn, R::KIND, record.id())? {
            return Err(LabError::not_found(R::KIND, record.id()));
        }
        record.touch(Utc::now());
        Self::write_row_in(&txn, &record)?;
        txn.commit()?;
        Ok(record)
    }

    /// Decode every row of one family, ordered by id.
    pub fn list_all<R: Record>(&self) -> Result<Vec<R>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTITIES)?;
        let prefix = kind_prefix(R::KIND);
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if k.value().starts_with(&prefix) {
                out.push(serde_json::from_str(v.value())?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use tempfile::NamedTempFile;

    fn open_temp_db() -> (LabGraph, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let graph = LabGraph::open(&path).unwrap();
        (graph, file)
    }

    #[test]
    fn create_and_get_round_trip() {
        let graph = LabGraph::open_in_memory().unwrap();
        let cat = graph
            .create(|id, now| testutil::catalyst(id, now, "Ru/MgO", "5.0"))
            .unwrap();

        let fetched: crate::model::Catalyst = graph.get(cat.id).unwrap();
        assert_eq!(fetched.name, "Ru/MgO");
        assert_eq!(fetched.yield_amount, cat.yield_amount);
    }

    #[test]
    fn ids_are_allocated_monotonically() {
        let graph = LabGraph::open_in_memory().unwrap();
        let a = graph
            .create(|id, now| testutil::catalyst(id, now, "a", "1"))
            .unwrap();
        let b = graph
            .create(|id, now| testutil::catalyst(id, now, "b", "1"))
            .unwrap();
        assert!(b.id > a.id, "ids must grow monotonically");
    }

    #[test]
    fn get_missing_entity_is_not_found() {
        let graph = LabGraph::open_in_memory().unwrap();
        let err = graph.get::<crate::model::Catalyst>(EntityId(42)).unwrap_err();
        match err {
            LabError::NotFound { kind, id } => {
                assert_eq!(kind, EntityKind::Catalyst);
                assert_eq!(id, EntityId(42));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn list_all_is_scoped_to_one_family() {
        let graph = LabGraph::open_in_memory().unwrap();
        graph
            .create(|id, now| testutil::catalyst(id, now, "cat", "1"))
            .unwrap();
        graph
            .create(|id, now| testutil::method(id, now, "impregnation"))
            .unwrap();

        let catalysts: Vec<crate::model::Catalyst> = graph.list_all().unwrap();
        let methods: Vec<crate::model::Method> = graph.list_all().unwrap();
        assert_eq!(catalysts.len(), 1);
        assert_eq!(methods.len(), 1);
    }

    #[test]
    fn replace_bumps_updated_at() {
        let graph = LabGraph::open_in_memory().unwrap();
        let mut cat = graph
            .create(|id, now| testutil::catalyst(id, now, "Ru/MgO", "5.0"))
            .unwrap();
        let created = cat.updated_at;

        cat.name = "Ru/MgO calcined".to_string();
        let updated = graph.replace(cat).unwrap();
        assert_eq!(updated.name, "Ru/MgO calcined");
        assert!(updated.updated_at >= created);
    }

    #[test]
    fn create_checked_rejects_missing_reference() {
        let graph = LabGraph::open_in_memory().unwrap();
        let err = graph
            .create_checked(
                |id, now| testutil::sample(id, now, "S-1", "2.0"),
                &[(EntityKind::Catalyst, EntityId(99))],
            )
            .unwrap_err();
        assert!(matches!(err, LabError::NotFound { .. }));
    }

    #[test]
    fn entities_and_counter_survive_reopen() {
        let (graph, file) = open_temp_db();
        let path = file.path().to_str().unwrap().to_string();
        let first = graph
            .create(|id, now| testutil::catalyst(id, now, "persisted", "1"))
            .unwrap();
        drop(graph);

        let reopened = LabGraph::open(&path).unwrap();
        let fetched: crate::model::Catalyst = reopened.get(first.id).unwrap();
        assert_eq!(fetched.name, "persisted");

        let second = reopened
            .create(|id, now| testutil::catalyst(id, now, "later", "1"))
            .unwrap();
        assert!(
            second.id > first.id,
            "id counter must not reset across reopen"
        );
    }
}

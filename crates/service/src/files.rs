//! File metadata. The bytes live in an external object store; rows
//! here carry the path and lifecycle state.
//!
//! Files are the one family with a soft-delete lifecycle: `remove`
//! marks the row deleted and reversible, `restore` undoes it, and
//! `purge` is the separate, irreversible hard-delete path that honors
//! the usual restrict-or-cascade reference rules.

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use labgraph::{validate, EntityId, EntityKind, File, Result};

use crate::{matches_search, Lab};

#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub search: Option<String>,
    /// Soft-deleted rows are hidden unless explicitly requested.
    pub include_deleted: bool,
}

impl Lab {
    pub fn list_files(&self, filter: &FileFilter) -> Result<Vec<File>> {
        let mut out = Vec::new();
        for file in self.graph.list_all::<File>()? {
            if file.is_deleted && !filter.include_deleted {
                continue;
            }
            if !matches_search(&file.name, &filter.search) {
                continue;
            }
            out.push(file);
        }
        Ok(out)
    }

    /// Soft-deleted files remain fetchable by id.
    pub fn get_file(&self, id: EntityId) -> Result<File> {
        self.graph.get(id)
    }

    pub fn create_file(&self, payload: &Value) -> Result<File> {
        let draft = validate::file_create(payload)?;
        self.graph.create(|id, now| draft.into_record(id, now))
    }

    pub fn update_file(&self, id: EntityId, payload: &Value) -> Result<File> {
        let mut current: File = self.graph.get(id)?;
        validate::file_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    /// Soft delete: hide the row, keep it restorable. Idempotent.
    pub fn delete_file(&self, id: EntityId) -> Result<File> {
        let mut file: File = self.graph.get(id)?;
        if file.is_deleted {
            return Ok(file);
        }
        file.is_deleted = true;
        file.deleted_at = Some(Utc::now());
        let file = self.graph.replace(file)?;
        debug!(%id, "file soft-deleted");
        Ok(file)
    }

    /// Undo a soft delete. A file that was never deleted passes
    /// through unchanged.
    pub fn restore_file(&self, id: EntityId) -> Result<File> {
        let mut file: File = self.graph.get(id)?;
        if !file.is_deleted {
            return Ok(file);
        }
        file.is_deleted = false;
        file.deleted_at = None;
        let file = self.graph.replace(file)?;
        debug!(%id, "file restored");
        Ok(file)
    }

    /// Permanently remove the row. Irreversible; restricted while
    /// characterizations or experiments reference it, unless forced.
    pub fn purge_file(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::File, id, force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labgraph::LabError;
    use serde_json::json;

    fn lab() -> Lab {
        Lab::open_in_memory().unwrap()
    }

    fn make(lab: &Lab, name: &str) -> File {
        lab.create_file(&json!({ "name": name, "path": format!("/objects/{name}") }))
            .unwrap()
    }

    #[test]
    fn soft_delete_hides_restore_reveals() {
        let lab = lab();
        let file = make(&lab, "spectrum.csv");

        let deleted = lab.delete_file(file.id).unwrap();
        assert!(deleted.is_deleted);
        assert!(deleted.deleted_at.is_some());

        let listed = lab.list_files(&FileFilter::default()).unwrap();
        assert!(listed.is_empty(), "default listing hides deleted files");

        let with_deleted = lab
            .list_files(&FileFilter {
                include_deleted: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(with_deleted.len(), 1);

        let restored = lab.restore_file(file.id).unwrap();
        assert!(!restored.is_deleted);
        assert!(restored.deleted_at.is_none());
        assert_eq!(lab.list_files(&FileFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn soft_delete_is_idempotent() {
        let lab = lab();
        let file = make(&lab, "spectrum.csv");
        let first = lab.delete_file(file.id).unwrap();
        let second = lab.delete_file(file.id).unwrap();
        assert_eq!(
            first.deleted_at, second.deleted_at,
            "repeat delete must not move the deletion timestamp"
        );
    }

    #[test]
    fn purge_is_restricted_while_referenced() {
        let lab = lab();
        let file = make(&lab, "xrd-raw.csv");
        lab.create_characterization(&json!({
            "characterization_type": "xrd",
            "raw_data_file_id": file.id.0,
        }))
        .unwrap();

        let err = lab.purge_file(file.id, false).unwrap_err();
        assert!(matches!(err, LabError::RestrictedByReferences(_)));

        lab.purge_file(file.id, true).unwrap();
        let err = lab.get_file(file.id).unwrap_err();
        assert!(matches!(err, LabError::NotFound { .. }));
    }

    #[test]
    fn soft_delete_leaves_references_intact() {
        let lab = lab();
        let file = make(&lab, "xrd-raw.csv");
        let c = lab
            .create_characterization(&json!({
                "characterization_type": "xrd",
                "raw_data_file_id": file.id.0,
            }))
            .unwrap();

        lab.delete_file(file.id).unwrap();
        let view = lab
            .get_characterization(c.id, &crate::Include::none())
            .unwrap();
        assert_eq!(
            view.characterization.raw_data_file_id,
            Some(file.id),
            "soft delete must not touch referrers"
        );
    }
}

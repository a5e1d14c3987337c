//! High-level entity service built on the Labgraph engine.
//!
//! [`Lab`] wraps a [`labgraph::LabGraph`] with the per-family
//! operation set a presentation layer consumes: list with filters and
//! eager-loading includes, get, create/update from wire JSON, delete
//! with restrict-or-cascade semantics, relationship endpoints, and the
//! inventory consume ledger.
//!
//! Relations are attached to responses only when asked for through an
//! [`Include`] set; a relation that was not requested is absent from
//! the view (not `null`, not an empty list), so callers can tell "not
//! loaded" from "empty".
//!
//! # Usage
//!
//! ```rust,no_run
//! use labgraph_service::{Include, Lab};
//! use serde_json::json;
//!
//! let lab = Lab::open("./research.labgraph").unwrap();
//!
//! let catalyst = lab
//!     .create_catalyst(&json!({ "name": "Ru/MgO", "yield_amount": "5.0" }))
//!     .unwrap();
//!
//! let include = Include::parse("input_catalysts,output_catalysts",
//!     labgraph_service::catalysts::INCLUDES).unwrap();
//! let view = lab.get_catalyst(catalyst.id, &include).unwrap();
//! assert_eq!(view.input_catalysts.as_deref(), Some(&[][..]));
//! ```

use labgraph::Record;

pub mod analyzers;
pub mod catalysts;
pub mod characterizations;
pub mod experiments;
pub mod files;
pub mod groups;
mod include;
pub mod methods;
pub mod observations;
pub mod references;
pub mod samples;

pub use include::Include;
pub use labgraph::{
    Analyzer, AnalyzerKind, Carrier, Catalyst, Characterization, CharacterizationType, Chemical,
    Consumption, Contaminant, EntityId, Experiment, ExperimentKind, FieldError, FieldErrorKind,
    File, Group, LabError, LabGraph, Method, Observation, Reactor, Relation, Result, Sample,
    Support, User, Waveform,
};

/// Entity service over one Labgraph database.
pub struct Lab {
    pub(crate) graph: LabGraph,
}

impl Lab {
    /// Open or create a lab database at the given path.
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self {
            graph: LabGraph::open(path)?,
        })
    }

    /// In-memory lab, for tests and ephemeral workloads.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            graph: LabGraph::open_in_memory()?,
        })
    }

    /// Wrap an already-open engine.
    pub fn from_graph(graph: LabGraph) -> Self {
        Self { graph }
    }

    /// Direct access to the underlying engine.
    pub fn graph(&self) -> &LabGraph {
        &self.graph
    }

    /// Hydrate a batch of related records by id.
    pub(crate) fn load_many<R: Record>(&self, ids: &[EntityId]) -> Result<Vec<R>> {
        ids.iter().map(|id| self.graph.get(*id)).collect()
    }

    /// Hydrate an optional foreign key. `Ok(None)` means the key was
    /// unset, not that the target is missing: a dangling id is a
    /// storage-level error.
    pub(crate) fn load_fk<R: Record>(&self, id: Option<EntityId>) -> Result<Option<R>> {
        match id {
            Some(id) => Ok(Some(self.graph.get(id)?)),
            None => Ok(None),
        }
    }
}

/// Case-insensitive substring match used by the `search` filters.
pub(crate) fn matches_search(haystack: &str, needle: &Option<String>) -> bool {
    match needle {
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

/// Like [`matches_search`] for optional text columns; `None` never
/// matches a present search term.
pub(crate) fn matches_search_opt(haystack: &Option<String>, needle: &Option<String>) -> bool {
    match (haystack, needle) {
        (_, None) => true,
        (Some(hay), needle) => matches_search(hay, needle),
        (None, Some(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn lab_state_survives_reopen() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let (catalyst_id, input_id) = {
            let lab = Lab::open(&path).unwrap();
            let input = lab
                .create_catalyst(&json!({ "name": "precursor", "yield_amount": "10" }))
                .unwrap();
            let catalyst = lab
                .create_catalyst(&json!({
                    "name": "calcined",
                    "yield_amount": "8",
                    "input_catalyst_ids": [input.id.0],
                }))
                .unwrap();
            lab.consume_catalyst(catalyst.id, &json!({ "amount": "1.5", "notes": "first run" }))
                .unwrap();
            (catalyst.id, input.id)
        };

        let lab = Lab::open(&path).unwrap();
        let include = Include::parse("input_catalysts", catalysts::INCLUDES).unwrap();
        let view = lab.get_catalyst(catalyst_id, &include).unwrap();
        assert_eq!(view.catalyst.remaining_amount.to_string(), "6.5");
        assert_eq!(view.catalyst.consumptions.len(), 1);
        assert_eq!(view.input_catalysts.unwrap()[0].id, input_id);
    }
}

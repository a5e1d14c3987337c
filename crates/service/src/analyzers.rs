//! Analyzer instruments: a small polymorphic family (FTIR / OES) with
//! disjoint variant fields, referenced but never owned by experiments.

use serde_json::Value;

use labgraph::{resolver, schema, Analyzer, EntityId, EntityKind, Result};

use crate::{matches_search, Lab};

#[derive(Debug, Clone, Default)]
pub struct AnalyzerFilter {
    pub search: Option<String>,
    pub analyzer_type: Option<String>,
}

impl Lab {
    pub fn list_analyzers(&self, filter: &AnalyzerFilter) -> Result<Vec<Analyzer>> {
        if let Some(tag) = &filter.analyzer_type {
            schema::variant_schema(EntityKind::Analyzer, tag)?;
        }

        let mut out = Vec::new();
        for analyzer in self.graph.list_all::<Analyzer>()? {
            if !matches_search(&analyzer.name, &filter.search) {
                continue;
            }
            if let Some(tag) = &filter.analyzer_type {
                if analyzer.analyzer_type() != tag {
                    continue;
                }
            }
            out.push(analyzer);
        }
        Ok(out)
    }

    pub fn get_analyzer(&self, id: EntityId) -> Result<Analyzer> {
        self.graph.get(id)
    }

    pub fn create_analyzer(&self, payload: &Value) -> Result<Analyzer> {
        let draft = resolver::analyzer_create(payload)?;
        self.graph.create(|id, now| draft.into_record(id, now))
    }

    pub fn update_analyzer(&self, id: EntityId, payload: &Value) -> Result<Analyzer> {
        let mut current: Analyzer = self.graph.get(id)?;
        resolver::analyzer_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_analyzer(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Analyzer, id, force)
    }
}

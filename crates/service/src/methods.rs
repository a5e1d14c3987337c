//! Preparation methods and their ingredient lists.
//!
//! Methods soft-deprecate through `is_active`: an inactive method
//! stays readable (and linked samples keep pointing at it) but drops
//! out of default listings.

use serde::Serialize;
use serde_json::Value;

use labgraph::{validate, Chemical, EntityId, EntityKind, Method, Relation, Result};

use crate::{matches_search, Include, Lab};

pub const INCLUDES: &[&str] = &["chemicals"];

#[derive(Debug, Clone, Default)]
pub struct MethodFilter {
    pub search: Option<String>,
    /// Default listings hide deprecated methods.
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodView {
    #[serde(flatten)]
    pub method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chemicals: Option<Vec<Chemical>>,
}

impl Lab {
    fn method_view(&self, method: Method, include: &Include) -> Result<MethodView> {
        let chemicals = if include.has("chemicals") {
            Some(self.load_many(&self.graph.neighbors(Relation::MethodChemicals, method.id)?)?)
        } else {
            None
        };
        Ok(MethodView { method, chemicals })
    }

    pub fn list_methods(&self, filter: &MethodFilter, include: &Include) -> Result<Vec<MethodView>> {
        let mut out = Vec::new();
        for method in self.graph.list_all::<Method>()? {
            if !method.is_active && !filter.include_inactive {
                continue;
            }
            if !matches_search(&method.name, &filter.search) {
                continue;
            }
            out.push(self.method_view(method, include)?);
        }
        Ok(out)
    }

    pub fn get_method(&self, id: EntityId, include: &Include) -> Result<MethodView> {
        let method = self.graph.get(id)?;
        self.method_view(method, include)
    }

    pub fn create_method(&self, payload: &Value) -> Result<Method> {
        let draft = validate::method_create(payload)?;
        self.graph.create(|id, now| draft.into_record(id, now))
    }

    pub fn update_method(&self, id: EntityId, payload: &Value) -> Result<Method> {
        let mut current: Method = self.graph.get(id)?;
        validate::method_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_method(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Method, id, force)
    }

    pub fn add_method_chemical(&self, method: EntityId, chemical: EntityId) -> Result<()> {
        self.graph.link(Relation::MethodChemicals, method, chemical)
    }

    pub fn remove_method_chemical(&self, method: EntityId, chemical: EntityId) -> Result<()> {
        self.graph.unlink(Relation::MethodChemicals, method, chemical)
    }
}

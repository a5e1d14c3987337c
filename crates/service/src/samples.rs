//! Sample operations. Samples share the catalyst inventory invariant
//! and carry up to three optional provenance links (source catalyst,
//! support, preparation method).

use serde::Serialize;
use serde_json::Value;

use labgraph::{validate, Catalyst, EntityId, EntityKind, Method, Result, Sample, Support};

use crate::{matches_search, Include, Lab};

pub const INCLUDES: &[&str] = &["catalyst", "support", "method"];

#[derive(Debug, Clone, Default)]
pub struct SampleFilter {
    pub search: Option<String>,
    pub catalyst_id: Option<EntityId>,
    pub support_id: Option<EntityId>,
    pub method_id: Option<EntityId>,
    pub depleted: Option<bool>,
}

/// Single-valued includes are doubly optional: the outer level is
/// "was it requested", the inner level is "is the key set".
#[derive(Debug, Clone, Serialize)]
pub struct SampleView {
    #[serde(flatten)]
    pub sample: Sample,
    pub is_depleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalyst: Option<Option<Catalyst>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support: Option<Option<Support>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Option<Method>>,
}

impl Lab {
    fn sample_view(&self, sample: Sample, include: &Include) -> Result<SampleView> {
        let catalyst = if include.has("catalyst") {
            Some(self.load_fk(sample.catalyst_id)?)
        } else {
            None
        };
        let support = if include.has("support") {
            Some(self.load_fk(sample.support_id)?)
        } else {
            None
        };
        let method = if include.has("method") {
            Some(self.load_fk(sample.method_id)?)
        } else {
            None
        };
        Ok(SampleView {
            is_depleted: sample.is_depleted(),
            sample,
            catalyst,
            support,
            method,
        })
    }

    pub fn list_samples(&self, filter: &SampleFilter, include: &Include) -> Result<Vec<SampleView>> {
        let mut out = Vec::new();
        for sample in self.graph.list_all::<Sample>()? {
            if !matches_search(&sample.name, &filter.search) {
                continue;
            }
            if filter.catalyst_id.is_some() && sample.catalyst_id != filter.catalyst_id {
                continue;
            }
            if filter.support_id.is_some() && sample.support_id != filter.support_id {
                continue;
            }
            if filter.method_id.is_some() && sample.method_id != filter.method_id {
                continue;
            }
            if let Some(want) = filter.depleted {
                if sample.is_depleted() != want {
                    continue;
                }
            }
            out.push(self.sample_view(sample, include)?);
        }
        Ok(out)
    }

    pub fn get_sample(&self, id: EntityId, include: &Include) -> Result<SampleView> {
        let sample = self.graph.get(id)?;
        self.sample_view(sample, include)
    }

    pub fn create_sample(&self, payload: &Value) -> Result<Sample> {
        let draft = validate::sample_create(payload)?;
        let refs = draft.foreign_refs();
        self.graph
            .create_checked(|id, now| draft.into_record(id, now), &refs)
    }

    pub fn update_sample(&self, id: EntityId, payload: &Value) -> Result<Sample> {
        let mut current: Sample = self.graph.get(id)?;
        validate::sample_update(&mut current, payload)?;
        let refs = current.foreign_refs();
        self.graph.replace_checked(current, &refs)
    }

    pub fn delete_sample(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Sample, id, force)
    }

    pub fn consume_sample(&self, id: EntityId, payload: &Value) -> Result<Sample> {
        let req = validate::consume_request(payload)?;
        self.graph.consume(id, req.amount, req.notes)
    }
}

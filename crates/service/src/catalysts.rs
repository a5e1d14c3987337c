//! Catalyst operations: CRUD, derivation chain maintenance, and the
//! consume ledger.

use serde::Serialize;
use serde_json::Value;

use labgraph::{validate, Catalyst, EntityId, EntityKind, Relation, Result};

use crate::{matches_search, Include, Lab};

/// Relations attachable to catalyst responses.
pub const INCLUDES: &[&str] = &["input_catalysts", "output_catalysts"];

#[derive(Debug, Clone, Default)]
pub struct CatalystFilter {
    /// Case-insensitive substring over the name.
    pub search: Option<String>,
    /// Keep only depleted (or only non-depleted) batches.
    pub depleted: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalystView {
    #[serde(flatten)]
    pub catalyst: Catalyst,
    /// Derived from the remaining amount, never stored.
    pub is_depleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_catalysts: Option<Vec<Catalyst>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_catalysts: Option<Vec<Catalyst>>,
}

impl Lab {
    fn catalyst_view(&self, catalyst: Catalyst, include: &Include) -> Result<CatalystView> {
        let input_catalysts = if include.has("input_catalysts") {
            Some(self.load_many(&self.graph.input_catalysts(catalyst.id)?)?)
        } else {
            None
        };
        let output_catalysts = if include.has("output_catalysts") {
            Some(self.load_many(&self.graph.output_catalysts(catalyst.id)?)?)
        } else {
            None
        };
        Ok(CatalystView {
            is_depleted: catalyst.is_depleted(),
            catalyst,
            input_catalysts,
            output_catalysts,
        })
    }

    pub fn list_catalysts(
        &self,
        filter: &CatalystFilter,
        include: &Include,
    ) -> Result<Vec<CatalystView>> {
        let mut out = Vec::new();
        for catalyst in self.graph.list_all::<Catalyst>()? {
            if !matches_search(&catalyst.name, &filter.search) {
                continue;
            }
            if let Some(want) = filter.depleted {
                if catalyst.is_depleted() != want {
                    continue;
                }
            }
            out.push(self.catalyst_view(catalyst, include)?);
        }
        Ok(out)
    }

    pub fn get_catalyst(&self, id: EntityId, include: &Include) -> Result<CatalystView> {
        let catalyst = self.graph.get(id)?;
        self.catalyst_view(catalyst, include)
    }

    /// Create from a wire payload. A supplied `input_catalyst_ids`
    /// list becomes derivation edges in the same transaction as the
    /// new row.
    pub fn create_catalyst(&self, payload: &Value) -> Result<Catalyst> {
        let draft = validate::catalyst_create(payload)?;
        let inputs = draft.input_catalyst_ids.clone();
        self.graph
            .create_catalyst_with_inputs(|id, now| draft.into_record(id, now), &inputs)
    }

    /// Partial update. When the payload carries `input_catalyst_ids`,
    /// the derivation input set is reconciled to match it.
    pub fn update_catalyst(&self, id: EntityId, payload: &Value) -> Result<Catalyst> {
        let mut current: Catalyst = self.graph.get(id)?;
        let inputs = validate::catalyst_update(&mut current, payload)?;
        self.graph.update_catalyst_with_inputs(current, inputs)
    }

    pub fn delete_catalyst(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Catalyst, id, force)
    }

    /// Withdraw material: `{ "amount": ..., "notes": ... }`.
    pub fn consume_catalyst(&self, id: EntityId, payload: &Value) -> Result<Catalyst> {
        let req = validate::consume_request(payload)?;
        self.graph.consume(id, req.amount, req.notes)
    }

    /// Record `input` as a derivation input of `catalyst`.
    pub fn add_catalyst_input(&self, catalyst: EntityId, input: EntityId) -> Result<()> {
        self.graph.link_derivation(input, catalyst)
    }

    pub fn remove_catalyst_input(&self, catalyst: EntityId, input: EntityId) -> Result<()> {
        self.graph.unlink(Relation::CatalystDerivation, input, catalyst)
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

    fn make(lab: &Lab, name: &str, amount: &str) -> Catalyst {
        lab.create_catalyst(&json!({ "name": name, "yield_amount": amount }))
            .unwrap()
    }

    #[test]
    fn omitted_includes_are_absent_not_empty() {
        let lab = lab();
        let cat = make(&lab, "Ru/MgO", "5.0");

        let bare = lab.get_catalyst(cat.id, &Include::none()).unwrap();
        assert!(bare.input_catalysts.is_none(), "not requested => absent");

        let include = Include::parse("input_catalysts", INCLUDES).unwrap();
        let loaded = lab.get_catalyst(cat.id, &include).unwrap();
        assert_eq!(
            loaded.input_catalysts.as_deref(),
            Some(&[][..]),
            "requested but empty => empty list, not absent"
        );

        let json = serde_json::to_value(&loaded).unwrap();
        assert!(json.get("input_catalysts").is_some());
        assert!(json.get("output_catalysts").is_none());
    }

    #[test]
    fn create_with_inputs_links_the_derivation_chain() {
        let lab = lab();
        let parent = make(&lab, "precursor", "10");
        let child = lab
            .create_catalyst(&json!({
                "name": "calcined",
                "yield_amount": "8",
                "input_catalyst_ids": [parent.id.0],
            }))
            .unwrap();

        let include = Include::parse("input_catalysts,output_catalysts", INCLUDES).unwrap();
        let view = lab.get_catalyst(child.id, &include).unwrap();
        let inputs = view.input_catalysts.unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].id, parent.id);

        let parent_view = lab.get_catalyst(parent.id, &include).unwrap();
        assert_eq!(parent_view.output_catalysts.unwrap()[0].id, child.id);
    }

    #[test]
    fn reciprocal_input_link_is_cyclic() {
        let lab = lab();
        let a = make(&lab, "A", "1");
        let b = make(&lab, "B", "1");

        lab.add_catalyst_input(b.id, a.id).unwrap();
        let err = lab.add_catalyst_input(a.id, b.id).unwrap_err();
        assert!(matches!(err, LabError::CyclicReference(_)));

        let err = lab
            .update_catalyst(a.id, &json!({ "input_catalyst_ids": [a.id.0] }))
            .unwrap_err();
        assert!(matches!(err, LabError::CyclicReference(_)));
    }

    #[test]
    fn depleted_filter_uses_the_derived_predicate() {
        let lab = lab();
        let fresh = make(&lab, "fresh", "5.0");
        let spent = make(&lab, "spent", "1.0");
        lab.consume_catalyst(spent.id, &json!({ "amount": "1.0" }))
            .unwrap();

        let depleted = lab
            .list_catalysts(
                &CatalystFilter {
                    depleted: Some(true),
                    ..Default::default()
                },
                &Include::none(),
            )
            .unwrap();
        assert_eq!(depleted.len(), 1);
        assert_eq!(depleted[0].catalyst.id, spent.id);

        let live = lab
            .list_catalysts(
                &CatalystFilter {
                    depleted: Some(false),
                    ..Default::default()
                },
                &Include::none(),
            )
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].catalyst.id, fresh.id);
    }

    #[test]
    fn search_filter_is_case_insensitive() {
        let lab = lab();
        make(&lab, "Ru/MgO", "1");
        make(&lab, "Ni/Al2O3", "1");

        let hits = lab
            .list_catalysts(
                &CatalystFilter {
                    search: Some("ru/mg".into()),
                    ..Default::default()
                },
                &Include::none(),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].catalyst.name, "Ru/MgO");
    }

    #[test]
    fn consume_endpoint_enforces_the_ledger_rules() {
        let lab = lab();
        let cat = make(&lab, "Ru/MgO", "1.0");

        let err = lab
            .consume_catalyst(cat.id, &json!({ "amount": "2.0" }))
            .unwrap_err();
        assert!(matches!(err, LabError::InsufficientInventory { .. }));

        let err = lab
            .consume_catalyst(cat.id, &json!({ "amount": 0 }))
            .unwrap_err();
        assert!(matches!(err, LabError::InvalidAmount(_)));

        let after = lab
            .consume_catalyst(cat.id, &json!({ "amount": "0.4", "notes": "XRD" }))
            .unwrap();
        assert_eq!(after.remaining_amount.to_string(), "0.6");
        assert_eq!(after.consumptions.len(), 1);
    }
}

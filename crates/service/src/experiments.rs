//! Experiment operations: polymorphic CRUD plus the attributed
//! contaminant/carrier relations.
//!
//! The contaminant ppm and carrier ratio live on the edge record, not
//! on either endpoint, so the same contaminant can appear in many
//! experiments at different concentrations. Hydrated views pair each
//! neighbor with its edge attribute.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use labgraph::{
    resolver, schema, Analyzer, Carrier, Contaminant, EntityId, EntityKind, Experiment,
    ExperimentKind, FieldErrorKind, File, Group, LabError, Reactor, Relation, Result, Sample,
    User, Waveform,
};

use crate::{matches_search_opt, Include, Lab};

pub const INCLUDES: &[&str] = &[
    "samples",
    "groups",
    "users",
    "contaminants",
    "carriers",
    "reactor",
    "analyzer",
    "waveform",
    "processed_data_file",
];

#[derive(Debug, Clone, Default)]
pub struct ExperimentFilter {
    pub search: Option<String>,
    /// Narrow to one variant family, pre-resolved server-side.
    pub experiment_type: Option<String>,
    pub reactor_id: Option<EntityId>,
    pub analyzer_id: Option<EntityId>,
}

/// A contaminant together with its concentration in this experiment.
#[derive(Debug, Clone, Serialize)]
pub struct ContaminantLink {
    #[serde(flatten)]
    pub contaminant: Contaminant,
    pub ppm: Option<Decimal>,
}

/// A carrier gas together with its mixing ratio in this experiment.
#[derive(Debug, Clone, Serialize)]
pub struct CarrierLink {
    #[serde(flatten)]
    pub carrier: Carrier,
    pub ratio: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentView {
    #[serde(flatten)]
    pub experiment: Experiment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<Sample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<Group>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<User>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contaminants: Option<Vec<ContaminantLink>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carriers: Option<Vec<CarrierLink>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactor: Option<Option<Reactor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<Option<Analyzer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Option<Waveform>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_data_file: Option<Option<File>>,
}

fn ensure_non_negative(name: &'static str, attr: Option<Decimal>) -> Result<()> {
    if let Some(v) = attr {
        if v < Decimal::ZERO {
            return Err(LabError::field(
                name,
                FieldErrorKind::OutOfRange,
                "must be >= 0",
            ));
        }
    }
    Ok(())
}

impl Lab {
    fn experiment_view(&self, experiment: Experiment, include: &Include) -> Result<ExperimentView> {
        let samples = if include.has("samples") {
            Some(self.load_many(&self.graph.neighbors(Relation::ExperimentSamples, experiment.id)?)?)
        } else {
            None
        };
        let groups = if include.has("groups") {
            Some(self.load_many(&self.graph.neighbors(Relation::ExperimentGroups, experiment.id)?)?)
        } else {
            None
        };
        let users = if include.has("users") {
            Some(self.load_many(&self.graph.neighbors(Relation::ExperimentUsers, experiment.id)?)?)
        } else {
            None
        };
        let contaminants = if include.has("contaminants") {
            let mut links = Vec::new();
            for edge in self
                .graph
                .neighbor_edges(Relation::ExperimentContaminants, experiment.id)?
            {
                links.push(ContaminantLink {
                    contaminant: self.graph.get(edge.b)?,
                    ppm: edge.attr,
                });
            }
            Some(links)
        } else {
            None
        };
        let carriers = if include.has("carriers") {
            let mut links = Vec::new();
            for edge in self
                .graph
                .neighbor_edges(Relation::ExperimentCarriers, experiment.id)?
            {
                links.push(CarrierLink {
                    carrier: self.graph.get(edge.b)?,
                    ratio: edge.attr,
                });
            }
            Some(links)
        } else {
            None
        };
        let reactor = if include.has("reactor") {
            Some(self.load_fk(experiment.reactor_id)?)
        } else {
            None
        };
        let analyzer = if include.has("analyzer") {
            Some(self.load_fk(experiment.analyzer_id)?)
        } else {
            None
        };
        let waveform = if include.has("waveform") {
            let waveform_id = match &experiment.kind {
                ExperimentKind::Plasma { waveform_id, .. } => *waveform_id,
                _ => None,
            };
            Some(self.load_fk(waveform_id)?)
        } else {
            None
        };
        let processed_data_file = if include.has("processed_data_file") {
            Some(self.load_fk(experiment.processed_data_file_id)?)
        } else {
            None
        };
        Ok(ExperimentView {
            experiment,
            samples,
            groups,
            users,
            contaminants,
            carriers,
            reactor,
            analyzer,
            waveform,
            processed_data_file,
        })
    }

    pub fn list_experiments(
        &self,
        filter: &ExperimentFilter,
        include: &Include,
    ) -> Result<Vec<ExperimentView>> {
        // Resolve the variant filter up front so a typo fails loudly
        // instead of returning an empty list.
        if let Some(tag) = &filter.experiment_type {
            schema::variant_schema(EntityKind::Experiment, tag)?;
        }

        let mut out = Vec::new();
        for exp in self.graph.list_all::<Experiment>()? {
            if !matches_search_opt(&exp.purpose, &filter.search) {
                continue;
            }
            if let Some(tag) = &filter.experiment_type {
                if exp.experiment_type() != tag {
                    continue;
                }
            }
            if filter.reactor_id.is_some() && exp.reactor_id != filter.reactor_id {
                continue;
            }
            if filter.analyzer_id.is_some() && exp.analyzer_id != filter.analyzer_id {
                continue;
            }
            out.push(self.experiment_view(exp, include)?);
        }
        Ok(out)
    }

    pub fn get_experiment(&self, id: EntityId, include: &Include) -> Result<ExperimentView> {
        let exp = self.graph.get(id)?;
        self.experiment_view(exp, include)
    }

    pub fn create_experiment(&self, payload: &Value) -> Result<Experiment> {
        let draft = resolver::experiment_create(payload)?;
        let refs = draft.foreign_refs();
        self.graph
            .create_checked(|id, now| draft.into_record(id, now), &refs)
    }

    pub fn update_experiment(&self, id: EntityId, payload: &Value) -> Result<Experiment> {
        let mut current: Experiment = self.graph.get(id)?;
        resolver::experiment_update(&mut current, payload)?;
        let refs = current.foreign_refs();
        self.graph.replace_checked(current, &refs)
    }

    pub fn delete_experiment(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Experiment, id, force)
    }

    // -- plain memberships -------------------------------------------------

    pub fn add_experiment_sample(&self, experiment: EntityId, sample: EntityId) -> Result<()> {
        self.graph.link(Relation::ExperimentSamples, experiment, sample)
    }

    pub fn remove_experiment_sample(&self, experiment: EntityId, sample: EntityId) -> Result<()> {
        self.graph
            .unlink(Relation::ExperimentSamples, experiment, sample)
    }

    pub fn add_experiment_group(&self, experiment: EntityId, group: EntityId) -> Result<()> {
        self.graph.link(Relation::ExperimentGroups, experiment, group)
    }

    pub fn remove_experiment_group(&self, experiment: EntityId, group: EntityId) -> Result<()> {
        self.graph
            .unlink(Relation::ExperimentGroups, experiment, group)
    }

    pub fn add_experiment_user(&self, experiment: EntityId, user: EntityId) -> Result<()> {
        self.graph.link(Relation::ExperimentUsers, experiment, user)
    }

    pub fn remove_experiment_user(&self, experiment: EntityId, user: EntityId) -> Result<()> {
        self.graph.unlink(Relation::ExperimentUsers, experiment, user)
    }

    // -- attributed relations ----------------------------------------------

    /// Link a contaminant with an optional concentration. The ppm is
    /// attached to the edge and mutable afterward via
    /// [`Lab::set_contaminant_ppm`].
    pub fn add_experiment_contaminant(
        &self,
        experiment: EntityId,
        contaminant: EntityId,
        ppm: Option<Decimal>,
    ) -> Result<()> {
        ensure_non_negative("ppm", ppm)?;
        self.graph
            .link_attributed(Relation::ExperimentContaminants, experiment, contaminant, ppm)
    }

    pub fn set_contaminant_ppm(
        &self,
        experiment: EntityId,
        contaminant: EntityId,
        ppm: Option<Decimal>,
    ) -> Result<()> {
        ensure_non_negative("ppm", ppm)?;
        self.graph
            .update_attr(Relation::ExperimentContaminants, experiment, contaminant, ppm)
    }

    pub fn remove_experiment_contaminant(
        &self,
        experiment: EntityId,
        contaminant: EntityId,
    ) -> Result<()> {
        self.graph
            .unlink(Relation::ExperimentContaminants, experiment, contaminant)
    }

    pub fn add_experiment_carrier(
        &self,
        experiment: EntityId,
        carrier: EntityId,
        ratio: Option<Decimal>,
    ) -> Result<()> {
        ensure_non_negative("ratio", ratio)?;
        self.graph
            .link_attributed(Relation::ExperimentCarriers, experiment, carrier, ratio)
    }

    pub fn set_carrier_ratio(
        &self,
        experiment: EntityId,
        carrier: EntityId,
        ratio: Option<Decimal>,
    ) -> Result<()> {
        ensure_non_negative("ratio", ratio)?;
        self.graph
            .update_attr(Relation::ExperimentCarriers, experiment, carrier, ratio)
    }

    pub fn remove_experiment_carrier(&self, experiment: EntityId, carrier: EntityId) -> Result<()> {
        self.graph
            .unlink(Relation::ExperimentCarriers, experiment, carrier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lab() -> Lab {
        Lab::open_in_memory().unwrap()
    }

    fn dec(n: u64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn contaminant_ppm_round_trip() {
        let lab = lab();
        let exp = lab
            .create_experiment(&json!({ "experiment_type": "plasma" }))
            .unwrap();
        let h2s = lab
            .create_contaminant(&json!({ "name": "hydrogen sulfide", "formula": "H2S" }))
            .unwrap();

        lab.add_experiment_contaminant(exp.id, h2s.id, Some(dec(50)))
            .unwrap();

        let include = Include::parse("contaminants", INCLUDES).unwrap();
        let view = lab.get_experiment(exp.id, &include).unwrap();
        let links = view.contaminants.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].contaminant.id, h2s.id);
        assert_eq!(links[0].ppm, Some(dec(50)));

        lab.set_contaminant_ppm(exp.id, h2s.id, Some(dec(75))).unwrap();
        let view = lab.get_experiment(exp.id, &include).unwrap();
        assert_eq!(view.contaminants.unwrap()[0].ppm, Some(dec(75)));

        lab.remove_experiment_contaminant(exp.id, h2s.id).unwrap();
        let view = lab.get_experiment(exp.id, &include).unwrap();
        assert!(view.contaminants.unwrap().is_empty());
    }

    #[test]
    fn ppm_update_requires_an_existing_edge() {
        let lab = lab();
        let exp = lab
            .create_experiment(&json!({ "experiment_type": "misc" }))
            .unwrap();
        let h2s = lab.create_contaminant(&json!({ "name": "H2S" })).unwrap();

        let err = lab
            .set_contaminant_ppm(exp.id, h2s.id, Some(dec(10)))
            .unwrap_err();
        assert!(matches!(err, LabError::EdgeNotFound { .. }));
    }

    #[test]
    fn same_contaminant_differs_per_experiment() {
        let lab = lab();
        let h2s = lab.create_contaminant(&json!({ "name": "H2S" })).unwrap();
        let exp_a = lab
            .create_experiment(&json!({ "experiment_type": "plasma" }))
            .unwrap();
        let exp_b = lab
            .create_experiment(&json!({ "experiment_type": "plasma" }))
            .unwrap();

        lab.add_experiment_contaminant(exp_a.id, h2s.id, Some(dec(50)))
            .unwrap();
        lab.add_experiment_contaminant(exp_b.id, h2s.id, Some(dec(500)))
            .unwrap();

        let include = Include::parse("contaminants", INCLUDES).unwrap();
        let a = lab.get_experiment(exp_a.id, &include).unwrap();
        let b = lab.get_experiment(exp_b.id, &include).unwrap();
        assert_eq!(a.contaminants.unwrap()[0].ppm, Some(dec(50)));
        assert_eq!(
            b.contaminants.unwrap()[0].ppm,
            Some(dec(500)),
            "ppm is an edge attribute, not a contaminant column"
        );
    }

    #[test]
    fn variant_filter_narrows_the_union() {
        let lab = lab();
        lab.create_experiment(&json!({ "experiment_type": "plasma" }))
            .unwrap();
        lab.create_experiment(&json!({ "experiment_type": "photocatalysis" }))
            .unwrap();
        lab.create_experiment(&json!({ "experiment_type": "misc" }))
            .unwrap();

        let hits = lab
            .list_experiments(
                &ExperimentFilter {
                    experiment_type: Some("plasma".into()),
                    ..Default::default()
                },
                &Include::none(),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].experiment.experiment_type(), "plasma");

        let err = lab
            .list_experiments(
                &ExperimentFilter {
                    experiment_type: Some("electrolysis".into()),
                    ..Default::default()
                },
                &Include::none(),
            )
            .unwrap_err();
        assert!(matches!(err, LabError::UnknownVariant { .. }));
    }

    #[test]
    fn reactor_restrict_then_force_detaches() {
        let lab = lab();
        let reactor = lab
            .create_reactor(&json!({ "name": "DBD cell", "reactor_type": "dielectric barrier" }))
            .unwrap();
        let exp = lab
            .create_experiment(&json!({
                "experiment_type": "plasma",
                "reactor_id": reactor.id.0,
            }))
            .unwrap();

        let err = lab.delete_reactor(reactor.id, false).unwrap_err();
        assert!(matches!(err, LabError::RestrictedByReferences(_)));

        lab.delete_reactor(reactor.id, true).unwrap();
        let after = lab.get_experiment(exp.id, &Include::none()).unwrap();
        assert_eq!(
            after.experiment.reactor_id, None,
            "forced delete must detach the referrer"
        );
    }

    #[test]
    fn cross_variant_field_fails_loudly_at_the_boundary() {
        let lab = lab();
        let err = lab
            .create_experiment(&json!({
                "experiment_type": "plasma",
                "wavelength_nm": "450",
            }))
            .unwrap_err();
        assert!(matches!(err, LabError::UnknownField { .. }));
    }

    #[test]
    fn discriminator_change_is_immutable_field() {
        let lab = lab();
        let exp = lab
            .create_experiment(&json!({ "experiment_type": "plasma" }))
            .unwrap();
        let err = lab
            .update_experiment(exp.id, &json!({ "experiment_type": "misc" }))
            .unwrap_err();
        assert!(matches!(err, LabError::ImmutableField(_)));
    }
}

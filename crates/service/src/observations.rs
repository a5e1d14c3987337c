//! Observations: semi-structured run notes. The three payload maps
//! (`conditions`, `calcination_parameters`, `data`) have no fixed
//! keys; the `has_calcination_data` flag is computed from map
//! non-emptiness at read time, so it can never drift from the payload.

use serde::Serialize;
use serde_json::Value;

use labgraph::{
    validate, Catalyst, EntityId, EntityKind, File, Observation, Relation, Result, Sample, User,
};

use crate::{matches_search_opt, Include, Lab};

pub const INCLUDES: &[&str] = &["catalysts", "samples", "files", "users"];

#[derive(Debug, Clone, Default)]
pub struct ObservationFilter {
    pub search: Option<String>,
    pub has_calcination_data: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObservationView {
    #[serde(flatten)]
    pub observation: Observation,
    /// Derived from `calcination_parameters` non-emptiness.
    pub has_calcination_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalysts: Option<Vec<Catalyst>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<Sample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<File>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<User>>,
}

impl Lab {
    fn observation_view(
        &self,
        observation: Observation,
        include: &Include,
    ) -> Result<ObservationView> {
        let catalysts = if include.has("catalysts") {
            Some(self.load_many(
                &self
                    .graph
                    .neighbors(Relation::ObservationCatalysts, observation.id)?,
            )?)
        } else {
            None
        };
        let samples = if include.has("samples") {
            Some(self.load_many(
                &self
                    .graph
                    .neighbors(Relation::ObservationSamples, observation.id)?,
            )?)
        } else {
            None
        };
        let files = if include.has("files") {
            Some(
                self.load_many(&self.graph.neighbors(Relation::ObservationFiles, observation.id)?)?,
            )
        } else {
            None
        };
        let users = if include.has("users") {
            Some(
                self.load_many(&self.graph.neighbors(Relation::ObservationUsers, observation.id)?)?,
            )
        } else {
            None
        };
        Ok(ObservationView {
            has_calcination_data: observation.has_calcination_data(),
            observation,
            catalysts,
            samples,
            files,
            users,
        })
    }

    pub fn list_observations(
        &self,
        filter: &ObservationFilter,
        include: &Include,
    ) -> Result<Vec<ObservationView>> {
        let mut out = Vec::new();
        for obs in self.graph.list_all::<Observation>()? {
            if !matches_search_opt(&obs.name, &filter.search) {
                continue;
            }
            if let Some(want) = filter.has_calcination_data {
                if obs.has_calcination_data() != want {
                    continue;
                }
            }
            out.push(self.observation_view(obs, include)?);
        }
        Ok(out)
    }

    pub fn get_observation(&self, id: EntityId, include: &Include) -> Result<ObservationView> {
        let obs = self.graph.get(id)?;
        self.observation_view(obs, include)
    }

    pub fn create_observation(&self, payload: &Value) -> Result<Observation> {
        let draft = validate::observation_create(payload)?;
        self.graph.create(|id, now| draft.into_record(id, now))
    }

    pub fn update_observation(&self, id: EntityId, payload: &Value) -> Result<Observation> {
        let mut current: Observation = self.graph.get(id)?;
        validate::observation_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_observation(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Observation, id, force)
    }

    pub fn add_observation_catalyst(&self, observation: EntityId, catalyst: EntityId) -> Result<()> {
        self.graph
            .link(Relation::ObservationCatalysts, observation, catalyst)
    }

    pub fn remove_observation_catalyst(
        &self,
        observation: EntityId,
        catalyst: EntityId,
    ) -> Result<()> {
        self.graph
            .unlink(Relation::ObservationCatalysts, observation, catalyst)
    }

    pub fn add_observation_sample(&self, observation: EntityId, sample: EntityId) -> Result<()> {
        self.graph
            .link(Relation::ObservationSamples, observation, sample)
    }

    pub fn remove_observation_sample(&self, observation: EntityId, sample: EntityId) -> Result<()> {
        self.graph
            .unlink(Relation::ObservationSamples, observation, sample)
    }

    pub fn add_observation_file(&self, observation: EntityId, file: EntityId) -> Result<()> {
        self.graph.link(Relation::ObservationFiles, observation, file)
    }

    pub fn remove_observation_file(&self, observation: EntityId, file: EntityId) -> Result<()> {
        self.graph
            .unlink(Relation::ObservationFiles, observation, file)
    }

    pub fn add_observation_user(&self, observation: EntityId, user: EntityId) -> Result<()> {
        self.graph.link(Relation::ObservationUsers, observation, user)
    }

    pub fn remove_observation_user(&self, observation: EntityId, user: EntityId) -> Result<()> {
        self.graph
            .unlink(Relation::ObservationUsers, observation, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lab() -> Lab {
        Lab::open_in_memory().unwrap()
    }

    #[test]
    fn calcination_flag_filters_without_being_stored() {
        let lab = lab();
        lab.create_observation(&json!({
            "name": "calcined run",
            "calcination_parameters": { "ramp_rate": "5 C/min" },
        }))
        .unwrap();
        lab.create_observation(&json!({ "name": "plain run" })).unwrap();

        let with = lab
            .list_observations(
                &ObservationFilter {
                    has_calcination_data: Some(true),
                    ..Default::default()
                },
                &Include::none(),
            )
            .unwrap();
        assert_eq!(with.len(), 1);
        assert_eq!(with[0].observation.name.as_deref(), Some("calcined run"));
        assert!(with[0].has_calcination_data);

        // Clearing the map flips the derived flag with no extra write.
        let id = with[0].observation.id;
        lab.update_observation(id, &json!({ "calcination_parameters": {} }))
            .unwrap();
        let view = lab.get_observation(id, &Include::none()).unwrap();
        assert!(!view.has_calcination_data);
    }

    #[test]
    fn observers_link_through_the_user_relation() {
        let lab = lab();
        let obs = lab.create_observation(&json!({})).unwrap();
        let user = lab
            .create_user(&json!({ "name": "R. Cole", "email": "rc@lab.example" }))
            .unwrap();

        lab.add_observation_user(obs.id, user.id).unwrap();
        let include = Include::parse("users", INCLUDES).unwrap();
        let view = lab.get_observation(obs.id, &include).unwrap();
        assert_eq!(view.users.unwrap()[0].id, user.id);

        lab.remove_observation_user(obs.id, user.id).unwrap();
        let view = lab.get_observation(obs.id, &include).unwrap();
        assert!(view.users.unwrap().is_empty());
    }
}

//! Characterization records: typed measurements (XRD, BET, ...)
//! linked to the catalysts and samples they were run on, with optional
//! raw and processed data files.

use serde::Serialize;
use serde_json::Value;

use labgraph::{
    validate, Catalyst, Characterization, CharacterizationType, EntityId, EntityKind, File,
    Relation, Result, Sample,
};

use crate::{matches_search_opt, Include, Lab};

pub const INCLUDES: &[&str] = &["catalysts", "samples", "raw_data_file", "processed_data_file"];

#[derive(Debug, Clone, Default)]
pub struct CharacterizationFilter {
    pub search: Option<String>,
    pub characterization_type: Option<CharacterizationType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CharacterizationView {
    #[serde(flatten)]
    pub characterization: Characterization,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalysts: Option<Vec<Catalyst>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<Sample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data_file: Option<Option<File>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_data_file: Option<Option<File>>,
}

impl Lab {
    fn characterization_view(
        &self,
        characterization: Characterization,
        include: &Include,
    ) -> Result<CharacterizationView> {
        let catalysts = if include.has("catalysts") {
            Some(self.load_many(
                &self
                    .graph
                    .neighbors(Relation::CharacterizationCatalysts, characterization.id)?,
            )?)
        } else {
            None
        };
        let samples = if include.has("samples") {
            Some(self.load_many(
                &self
                    .graph
                    .neighbors(Relation::CharacterizationSamples, characterization.id)?,
            )?)
        } else {
            None
        };
        let raw_data_file = if include.has("raw_data_file") {
            Some(self.load_fk(characterization.raw_data_file_id)?)
        } else {
            None
        };
        let processed_data_file = if include.has("processed_data_file") {
            Some(self.load_fk(characterization.processed_data_file_id)?)
        } else {
            None
        };
        Ok(CharacterizationView {
            characterization,
            catalysts,
            samples,
            raw_data_file,
            processed_data_file,
        })
    }

    pub fn list_characterizations(
        &self,
        filter: &CharacterizationFilter,
        include: &Include,
    ) -> Result<Vec<CharacterizationView>> {
        let mut out = Vec::new();
        for c in self.graph.list_all::<Characterization>()? {
            if !matches_search_opt(&c.name, &filter.search) {
                continue;
            }
            if let Some(want) = filter.characterization_type {
                if c.characterization_type != want {
                    continue;
                }
            }
            out.push(self.characterization_view(c, include)?);
        }
        Ok(out)
    }

    pub fn get_characterization(
        &self,
        id: EntityId,
        include: &Include,
    ) -> Result<CharacterizationView> {
        let c = self.graph.get(id)?;
        self.characterization_view(c, include)
    }

    pub fn create_characterization(&self, payload: &Value) -> Result<Characterization> {
        let draft = validate::characterization_create(payload)?;
        let refs = draft.foreign_refs();
        self.graph
            .create_checked(|id, now| draft.into_record(id, now), &refs)
    }

    pub fn update_characterization(&self, id: EntityId, payload: &Value) -> Result<Characterization> {
        let mut current: Characterization = self.graph.get(id)?;
        validate::characterization_update(&mut current, payload)?;
        let refs = current.foreign_refs();
        self.graph.replace_checked(current, &refs)
    }

    pub fn delete_characterization(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph
            .delete_entity(EntityKind::Characterization, id, force)
    }

    pub fn add_characterization_catalyst(
        &self,
        characterization: EntityId,
        catalyst: EntityId,
    ) -> Result<()> {
        self.graph
            .link(Relation::CharacterizationCatalysts, characterization, catalyst)
    }

    pub fn remove_characterization_catalyst(
        &self,
        characterization: EntityId,
        catalyst: EntityId,
    ) -> Result<()> {
        self.graph
            .unlink(Relation::CharacterizationCatalysts, characterization, catalyst)
    }

    pub fn add_characterization_sample(
        &self,
        characterization: EntityId,
        sample: EntityId,
    ) -> Result<()> {
        self.graph
            .link(Relation::CharacterizationSamples, characterization, sample)
    }

    pub fn remove_characterization_sample(
        &self,
        characterization: EntityId,
        sample: EntityId,
    ) -> Result<()> {
        self.graph
            .unlink(Relation::CharacterizationSamples, characterization, sample)
    }
}

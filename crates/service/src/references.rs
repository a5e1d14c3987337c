//! Flat reference entities: chemicals, supports, reactors, waveforms,
//! contaminants, carriers, and users. Plain CRUD; the interesting
//! behavior (restrict-or-cascade on delete, edge attributes) lives in
//! the engine and is exercised through the owning families.

use serde_json::Value;

use labgraph::{
    validate, Carrier, Chemical, Contaminant, EntityId, EntityKind, Reactor, Result, Support,
    User, Waveform,
};

use crate::{matches_search, Lab};

#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    pub search: Option<String>,
}

impl Lab {
    fn list_named<R, F>(&self, filter: &NameFilter, name_of: F) -> Result<Vec<R>>
    where
        R: labgraph::Record,
        F: Fn(&R) -> &str,
    {
        let mut out = Vec::new();
        for record in self.graph.list_all::<R>()? {
            if matches_search(name_of(&record), &filter.search) {
                out.push(record);
            }
        }
        Ok(out)
    }

    // -- chemicals ---------------------------------------------------------

    pub fn list_chemicals(&self, filter: &NameFilter) -> Result<Vec<Chemical>> {
        self.list_named(filter, |c: &Chemical| &c.name)
    }

    pub fn get_chemical(&self, id: EntityId) -> Result<Chemical> {
        self.graph.get(id)
    }

    pub fn create_chemical(&self, payload: &Value) -> Result<Chemical> {
        let draft = validate::chemical_create(payload)?;
        self.graph.create(|id, now| Chemical {
            id,
            name: draft.name,
            formula: draft.detail,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_chemical(&self, id: EntityId, payload: &Value) -> Result<Chemical> {
        let mut current: Chemical = self.graph.get(id)?;
        validate::chemical_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_chemical(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Chemical, id, force)
    }

    // -- supports ----------------------------------------------------------

    pub fn list_supports(&self, filter: &NameFilter) -> Result<Vec<Support>> {
        self.list_named(filter, |s: &Support| &s.name)
    }

    pub fn get_support(&self, id: EntityId) -> Result<Support> {
        self.graph.get(id)
    }

    pub fn create_support(&self, payload: &Value) -> Result<Support> {
        let draft = validate::support_create(payload)?;
        self.graph.create(|id, now| Support {
            id,
            name: draft.name,
            material: draft.detail,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_support(&self, id: EntityId, payload: &Value) -> Result<Support> {
        let mut current: Support = self.graph.get(id)?;
        validate::support_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_support(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Support, id, force)
    }

    // -- reactors ----------------------------------------------------------

    pub fn list_reactors(&self, filter: &NameFilter) -> Result<Vec<Reactor>> {
        self.list_named(filter, |r: &Reactor| &r.name)
    }

    pub fn get_reactor(&self, id: EntityId) -> Result<Reactor> {
        self.graph.get(id)
    }

    pub fn create_reactor(&self, payload: &Value) -> Result<Reactor> {
        let draft = validate::reactor_create(payload)?;
        self.graph.create(|id, now| Reactor {
            id,
            name: draft.name,
            reactor_type: draft.detail,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_reactor(&self, id: EntityId, payload: &Value) -> Result<Reactor> {
        let mut current: Reactor = self.graph.get(id)?;
        validate::reactor_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_reactor(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Reactor, id, force)
    }

    // -- waveforms ---------------------------------------------------------

    pub fn list_waveforms(&self, filter: &NameFilter) -> Result<Vec<Waveform>> {
        self.list_named(filter, |w: &Waveform| &w.name)
    }

    pub fn get_waveform(&self, id: EntityId) -> Result<Waveform> {
        self.graph.get(id)
    }

    pub fn create_waveform(&self, payload: &Value) -> Result<Waveform> {
        let draft = validate::waveform_create(payload)?;
        self.graph.create(|id, now| draft.into_record(id, now))
    }

    pub fn update_waveform(&self, id: EntityId, payload: &Value) -> Result<Waveform> {
        let mut current: Waveform = self.graph.get(id)?;
        validate::waveform_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_waveform(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Waveform, id, force)
    }

    // -- contaminants ------------------------------------------------------

    pub fn list_contaminants(&self, filter: &NameFilter) -> Result<Vec<Contaminant>> {
        self.list_named(filter, |c: &Contaminant| &c.name)
    }

    pub fn get_contaminant(&self, id: EntityId) -> Result<Contaminant> {
        self.graph.get(id)
    }

    pub fn create_contaminant(&self, payload: &Value) -> Result<Contaminant> {
        let draft = validate::contaminant_create(payload)?;
        self.graph.create(|id, now| Contaminant {
            id,
            name: draft.name,
            formula: draft.detail,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_contaminant(&self, id: EntityId, payload: &Value) -> Result<Contaminant> {
        let mut current: Contaminant = self.graph.get(id)?;
        validate::contaminant_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_contaminant(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Contaminant, id, force)
    }

    // -- carriers ----------------------------------------------------------

    pub fn list_carriers(&self, filter: &NameFilter) -> Result<Vec<Carrier>> {
        self.list_named(filter, |c: &Carrier| &c.name)
    }

    pub fn get_carrier(&self, id: EntityId) -> Result<Carrier> {
        self.graph.get(id)
    }

    pub fn create_carrier(&self, payload: &Value) -> Result<Carrier> {
        let draft = validate::carrier_create(payload)?;
        self.graph.create(|id, now| Carrier {
            id,
            name: draft.name,
            formula: draft.detail,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_carrier(&self, id: EntityId, payload: &Value) -> Result<Carrier> {
        let mut current: Carrier = self.graph.get(id)?;
        validate::carrier_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_carrier(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Carrier, id, force)
    }

    // -- users -------------------------------------------------------------

    pub fn list_users(&self, filter: &NameFilter) -> Result<Vec<User>> {
        self.list_named(filter, |u: &User| &u.name)
    }

    pub fn get_user(&self, id: EntityId) -> Result<User> {
        self.graph.get(id)
    }

    pub fn create_user(&self, payload: &Value) -> Result<User> {
        let draft = validate::user_create(payload)?;
        self.graph.create(|id, now| User {
            id,
            name: draft.name,
            email: draft.detail,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_user(&self, id: EntityId, payload: &Value) -> Result<User> {
        let mut current: User = self.graph.get(id)?;
        validate::user_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    /// User deletions cascade: their observation and experiment
    /// memberships are dropped silently.
    pub fn delete_user(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::User, id, force)
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

    #[test]
    fn reference_crud_round_trip() {
        let lab = lab();
        let chem = lab
            .create_chemical(&json!({ "name": "ruthenium chloride", "formula": "RuCl3" }))
            .unwrap();
        assert_eq!(chem.formula.as_deref(), Some("RuCl3"));

        let updated = lab
            .update_chemical(chem.id, &json!({ "formula": null }))
            .unwrap();
        assert_eq!(updated.formula, None);

        lab.delete_chemical(chem.id, false).unwrap();
        assert!(matches!(
            lab.get_chemical(chem.id).unwrap_err(),
            LabError::NotFound { .. }
        ));
    }

    #[test]
    fn user_delete_cascades_memberships() {
        let lab = lab();
        let user = lab.create_user(&json!({ "name": "R. Cole" })).unwrap();
        let obs = lab.create_observation(&json!({})).unwrap();
        let exp = lab
            .create_experiment(&json!({ "experiment_type": "misc" }))
            .unwrap();
        lab.add_observation_user(obs.id, user.id).unwrap();
        lab.add_experiment_user(exp.id, user.id).unwrap();

        lab.delete_user(user.id, false).unwrap();

        let include = crate::Include::parse("users", crate::observations::INCLUDES).unwrap();
        let view = lab.get_observation(obs.id, &include).unwrap();
        assert!(view.users.unwrap().is_empty());
    }

    #[test]
    fn waveform_delete_restricts_while_a_plasma_experiment_uses_it() {
        let lab = lab();
        let wave = lab
            .create_waveform(&json!({ "name": "20 kHz sine", "shape": "sine" }))
            .unwrap();
        lab.create_experiment(&json!({
            "experiment_type": "plasma",
            "waveform_id": wave.id.0,
        }))
        .unwrap();

        let err = lab.delete_waveform(wave.id, false).unwrap_err();
        assert!(matches!(err, LabError::RestrictedByReferences(_)));

        lab.delete_waveform(wave.id, true).unwrap();
    }
}

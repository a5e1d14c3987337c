//! Experiment groups: named collections for cross-experiment
//! comparison. Group membership is a plain set; deleting a group
//! silently drops its membership edges.

use serde::Serialize;
use serde_json::Value;

use labgraph::{validate, EntityId, EntityKind, Experiment, File, Group, Relation, Result};

use crate::{matches_search, Include, Lab};

pub const INCLUDES: &[&str] = &["experiments", "files"];

#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    #[serde(flatten)]
    pub group: Group,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiments: Option<Vec<Experiment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<File>>,
}

impl Lab {
    fn group_view(&self, group: Group, include: &Include) -> Result<GroupView> {
        let experiments = if include.has("experiments") {
            // Membership edges are owned by the experiment side.
            Some(self.load_many(&self.graph.reverse_neighbors(Relation::ExperimentGroups, group.id)?)?)
        } else {
            None
        };
        let files = if include.has("files") {
            Some(self.load_many(&self.graph.neighbors(Relation::GroupFiles, group.id)?)?)
        } else {
            None
        };
        Ok(GroupView {
            group,
            experiments,
            files,
        })
    }

    pub fn list_groups(&self, filter: &GroupFilter, include: &Include) -> Result<Vec<GroupView>> {
        let mut out = Vec::new();
        for group in self.graph.list_all::<Group>()? {
            if !matches_search(&group.name, &filter.search) {
                continue;
            }
            out.push(self.group_view(group, include)?);
        }
        Ok(out)
    }

    pub fn get_group(&self, id: EntityId, include: &Include) -> Result<GroupView> {
        let group = self.graph.get(id)?;
        self.group_view(group, include)
    }

    pub fn create_group(&self, payload: &Value) -> Result<Group> {
        let draft = validate::group_create(payload)?;
        self.graph.create(|id, now| draft.into_record(id, now))
    }

    pub fn update_group(&self, id: EntityId, payload: &Value) -> Result<Group> {
        let mut current: Group = self.graph.get(id)?;
        validate::group_update(&mut current, payload)?;
        self.graph.replace(current)
    }

    pub fn delete_group(&self, id: EntityId, force: bool) -> Result<()> {
        self.graph.delete_entity(EntityKind::Group, id, force)
    }

    pub fn add_group_experiment(&self, group: EntityId, experiment: EntityId) -> Result<()> {
        self.graph.link(Relation::ExperimentGroups, experiment, group)
    }

    pub fn remove_group_experiment(&self, group: EntityId, experiment: EntityId) -> Result<()> {
        self.graph
            .unlink(Relation::ExperimentGroups, experiment, group)
    }

    pub fn add_group_file(&self, group: EntityId, file: EntityId) -> Result<()> {
        self.graph.link(Relation::GroupFiles, group, file)
    }

    pub fn remove_group_file(&self, group: EntityId, file: EntityId) -> Result<()> {
        self.graph.unlink(Relation::GroupFiles, group, file)
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
    fn groups_collect_experiments_for_comparison() {
        let lab = lab();
        let group = lab
            .create_group(&json!({ "name": "NH3 screening Q3" }))
            .unwrap();
        let exp_a = lab
            .create_experiment(&json!({ "experiment_type": "plasma" }))
            .unwrap();
        let exp_b = lab
            .create_experiment(&json!({ "experiment_type": "photocatalysis" }))
            .unwrap();

        lab.add_group_experiment(group.id, exp_a.id).unwrap();
        lab.add_group_experiment(group.id, exp_b.id).unwrap();

        let include = Include::parse("experiments", INCLUDES).unwrap();
        let view = lab.get_group(group.id, &include).unwrap();
        let members = view.experiments.unwrap();
        assert_eq!(members.len(), 2);

        // Deleting the group cascades membership, not the experiments.
        lab.delete_group(group.id, false).unwrap();
        assert!(lab
            .get_experiment(exp_a.id, &Include::none())
            .is_ok());
    }
}

//! Relationship Graph Store: typed edges between entities.
//!
//! Three relation kinds share one storage shape:
//!
//! - plain many-to-many (set semantics: link twice is a no-op, unlink
//!   of a missing edge is a no-op),
//! - attributed many-to-many (a scalar lives on the edge itself, never
//!   on either endpoint),
//! - self-referential derivation (catalyst -> catalyst, kept acyclic by
//!   a depth-first check run inside the same write transaction as the
//!   insert).
//!
//! Forward rows are keyed `"{relation}:{a:020}:{b:020}"`; a reverse
//! index keyed `"{relation}:{b:020}:{a:020}"` makes "who references
//! me" queries a prefix scan. Both rows commit in one transaction.
//!
//! Deleting an entity sweeps its edges and scalar foreign-key
//! referrers under the relation's declared policy: CASCADE drops
//! silently, RESTRICT refuses unless the caller forces, and a forced
//! delete detaches referrers in the same transaction. Either the whole
//! sweep commits or none of it does.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, WriteTransaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{LabError, Result};
use crate::model::{
    Catalyst, Characterization, EntityId, EntityKind, Experiment, ExperimentKind, Record, Sample,
};
use crate::store::{LabGraph, EDGES, EDGES_REV};

/// What happens to edges pointing at an entity when it is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Drop the edges silently.
    Cascade,
    /// Refuse the delete while edges exist, unless forced.
    Restrict,
}

/// Every typed relation the engine stores. The first endpoint is the
/// owning side; its edges always cascade when the owner is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    MethodChemicals,
    CharacterizationCatalysts,
    CharacterizationSamples,
    ObservationCatalysts,
    ObservationSamples,
    ObservationFiles,
    ObservationUsers,
    ExperimentSamples,
    ExperimentGroups,
    ExperimentUsers,
    ExperimentContaminants,
    ExperimentCarriers,
    GroupFiles,
    CatalystDerivation,
}

impl Relation {
    pub const ALL: [Relation; 14] = [
        Relation::MethodChemicals,
        Relation::CharacterizationCatalysts,
        Relation::CharacterizationSamples,
        Relation::ObservationCatalysts,
        Relation::ObservationSamples,
        Relation::ObservationFiles,
        Relation::ObservationUsers,
        Relation::ExperimentSamples,
        Relation::ExperimentGroups,
        Relation::ExperimentUsers,
        Relation::ExperimentContaminants,
        Relation::ExperimentCarriers,
        Relation::GroupFiles,
        Relation::CatalystDerivation,
    ];

    /// Stable key prefix; also the relation's display name.
    pub fn prefix(&self) -> &'static str {
        match self {
            Relation::MethodChemicals => "method_chemicals",
            Relation::CharacterizationCatalysts => "characterization_catalysts",
            Relation::CharacterizationSamples => "characterization_samples",
            Relation::ObservationCatalysts => "observation_catalysts",
            Relation::ObservationSamples => "observation_samples",
            Relation::ObservationFiles => "observation_files",
            Relation::ObservationUsers => "observation_users",
            Relation::ExperimentSamples => "experiment_samples",
            Relation::ExperimentGroups => "experiment_groups",
            Relation::ExperimentUsers => "experiment_users",
            Relation::ExperimentContaminants => "experiment_contaminants",
            Relation::ExperimentCarriers => "experiment_carriers",
            Relation::GroupFiles => "group_files",
            Relation::CatalystDerivation => "catalyst_derivation",
        }
    }

    /// `(owner kind, other kind)`. For the derivation relation the
    /// owner side is the input catalyst and the other side the output.
    pub fn endpoints(&self) -> (EntityKind, EntityKind) {
        match self {
            Relation::MethodChemicals => (EntityKind::Method, EntityKind::Chemical),
            Relation::CharacterizationCatalysts => {
                (EntityKind::Characterization, EntityKind::Catalyst)
            }
            Relation::CharacterizationSamples => {
                (EntityKind::Characterization, EntityKind::Sample)
            }
            Relation::ObservationCatalysts => (EntityKind::Observation, EntityKind::Catalyst),
            Relation::ObservationSamples => (EntityKind::Observation, EntityKind::Sample),
            Relation::ObservationFiles => (EntityKind::Observation, EntityKind::File),
            Relation::ObservationUsers => (EntityKind::Observation, EntityKind::User),
            Relation::ExperimentSamples => (EntityKind::Experiment, EntityKind::Sample),
            Relation::ExperimentGroups => (EntityKind::Experiment, EntityKind::Group),
            Relation::ExperimentUsers => (EntityKind::Experiment, EntityKind::User),
            Relation::ExperimentContaminants => (EntityKind::Experiment, EntityKind::Contaminant),
            Relation::ExperimentCarriers => (EntityKind::Experiment, EntityKind::Carrier),
            Relation::GroupFiles => (EntityKind::Group, EntityKind::File),
            Relation::CatalystDerivation => (EntityKind::Catalyst, EntityKind::Catalyst),
        }
    }

    /// Relations whose edges carry a scalar attribute.
    pub fn attributed(&self) -> bool {
        matches!(
            self,
            Relation::ExperimentContaminants | Relation::ExperimentCarriers
        )
    }

    /// Policy applied when the non-owning endpoint is deleted.
    /// Contaminants and carriers are protected references; memberships
    /// elsewhere are plain set entries and cascade.
    pub fn other_delete_policy(&self) -> DeletePolicy {
        match self {
            Relation::ExperimentContaminants | Relation::ExperimentCarriers => {
                DeletePolicy::Restrict
            }
            _ => DeletePolicy::Cascade,
        }
    }
}

/// A first-class edge record. The attribute belongs to the edge: the
/// same contaminant has a different ppm in every experiment it is
/// linked to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub a: EntityId,
    pub b: EntityId,
    pub attr: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

fn edge_key(rel: Relation, a: EntityId, b: EntityId) -> String {
    format!("{}:{:020}:{:020}", rel.prefix(), a.0, b.0)
}

fn rev_key(rel: Relation, a: EntityId, b: EntityId) -> String {
    format!("{}:{:020}:{:020}", rel.prefix(), b.0, a.0)
}

fn owner_prefix(rel: Relation, a: EntityId) -> String {
    format!("{}:{:020}:", rel.prefix(), a.0)
}

/// Last key segment of a reverse-index row is the owning endpoint.
fn parse_tail_id(key: &str) -> Result<EntityId> {
    key.rsplit(':')
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .map(EntityId)
        .ok_or_else(|| LabError::Storage(format!("malformed edge key `{key}`")))
}

impl LabGraph {
    fn read_edge_in(txn: &WriteTransaction, rel: Relation, a: EntityId, b: EntityId) -> Result<Option<Edge>> {
        let table = txn.open_table(EDGES)?;
        let raw: Option<String> = table
            .get(edge_key(rel, a, b).as_str())?
            .map(|g| g.value().to_string());
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Insert forward row + reverse index. Returns false (and writes
    /// nothing) when the edge already exists: relationship state is a
    /// set, not a log.
    fn insert_edge_in(
        txn: &WriteTransaction,
        rel: Relation,
        a: EntityId,
        b: EntityId,
        attr: Option<Decimal>,
    ) -> Result<bool> {
        if Self::read_edge_in(txn, rel, a, b)?.is_some() {
            return Ok(false);
        }
        let edge = Edge {
            a,
            b,
            attr,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&edge)?;
        {
            let mut table = txn.open_table(EDGES)?;
            table.insert(edge_key(rel, a, b).as_str(), json.as_str())?;
        }
        {
            let mut rev = txn.open_table(EDGES_REV)?;
            rev.insert(rev_key(rel, a, b).as_str(), edge_key(rel, a, b).as_str())?;
        }
        Ok(true)
    }

    fn remove_edge_in(txn: &WriteTransaction, rel: Relation, a: EntityId, b: EntityId) -> Result<bool> {
        let removed = {
            let mut table = txn.open_table(EDGES)?;
            let hit = table.remove(edge_key(rel, a, b).as_str())?.is_some();
            hit
        };
        let mut rev = txn.open_table(EDGES_REV)?;
        rev.remove(rev_key(rel, a, b).as_str())?;
        Ok(removed)
    }

    fn forward_edges_in(txn: &WriteTransaction, rel: Relation, a: EntityId) -> Result<Vec<Edge>> {
        let table = txn.open_table(EDGES)?;
        let prefix = owner_prefix(rel, a);
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if k.value().starts_with(&prefix) {
                out.push(serde_json::from_str(v.value())?);
            }
        }
        Ok(out)
    }

    fn reverse_ids_in(txn: &WriteTransaction, rel: Relation, b: EntityId) -> Result<Vec<EntityId>> {
        let table = txn.open_table(EDGES_REV)?;
        let prefix = owner_prefix(rel, b);
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (k, _v) = entry?;
            if k.value().starts_with(&prefix) {
                out.push(parse_tail_id(k.value())?);
            }
        }
        Ok(out)
    }

    fn ensure_exists_in(txn: &WriteTransaction, kind: EntityKind, id: EntityId) -> Result<()> {
        if Self::exists_in(txn, kind, id)? {
            Ok(())
        } else {
            Err(LabError::not_found(kind, id))
        }
    }

    /// Link two entities. Idempotent: linking an already-linked pair is
    /// a no-op success. Derivation links are routed through the cycle
    /// check automatically.
    pub fn link(&self, rel: Relation, a: EntityId, b: EntityId) -> Result<()> {
        if rel == Relation::CatalystDerivation {
            return self.link_derivation(a, b);
        }
        self.link_inner(rel, a, b, None)
    }

    /// Link with an edge attribute (ppm, ratio). The attribute is
    /// optional at link time and independently mutable afterward via
    /// [`LabGraph::update_attr`]. Linking an existing pair is a no-op
    /// and leaves the stored attribute untouched.
    pub fn link_attributed(
        &self,
        rel: Relation,
        a: EntityId,
        b: EntityId,
        attr: Option<Decimal>,
    ) -> Result<()> {
        if !rel.attributed() {
            return Err(LabError::InvariantViolation(format!(
                "relation `{}` does not carry an edge attribute",
                rel.prefix()
            )));
        }
        self.link_inner(rel, a, b, attr)
    }

    fn link_inner(
        &self,
        rel: Relation,
        a: EntityId,
        b: EntityId,
        attr: Option<Decimal>,
    ) -> Result<()> {
        let (owner_kind, other_kind) = rel.endpoints();
        let txn = self.db.begin_write()?;
        Self::ensure_exists_in(&txn, owner_kind, a)?;
        Self::ensure_exists_in(&txn, other_kind, b)?;
        let inserted = Self::insert_edge_in(&txn, rel, a, b, attr)?;
        txn.commit()?;
        if inserted {
            debug!(relation = rel.prefix(), %a, %b, "linked");
        }
        Ok(())
    }

    /// Remove an edge. Unlinking a pair that is not linked is a no-op
    /// success, not an error.
    pub fn unlink(&self, rel: Relation, a: EntityId, b: EntityId) -> Result<()> {
        let txn = self.db.begin_write()?;
        let removed = Self::remove_edge_in(&txn, rel, a, b)?;
        txn.commit()?;
        if removed {
            debug!(relation = rel.prefix(), %a, %b, "unlinked");
        }
        Ok(())
    }

    /// Set the scalar attribute on an existing edge.
    ///
    /// Unlike link, this requires the edge to exist: updating an
    /// attribute on a missing link is a caller bug, not a set
    /// operation.
    pub fn update_attr(
        &self,
        rel: Relation,
        a: EntityId,
        b: EntityId,
        attr: Option<Decimal>,
    ) -> Result<()> {
        if !rel.attributed() {
            return Err(LabError::InvariantViolation(format!(
                "relation `{}` does not carry an edge attribute",
                rel.prefix()
            )));
        }
        let txn = self.db.begin_write()?;
        let mut edge = Self::read_edge_in(&txn, rel, a, b)?.ok_or(LabError::EdgeNotFound {
            relation: rel.prefix(),
            a,
            b,
        })?;
        edge.attr = attr;
        let json = serde_json::to_string(&edge)?;
        {
            let mut table = txn.open_table(EDGES)?;
            table.insert(edge_key(rel, a, b).as_str(), json.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Fetch one edge, if linked.
    pub fn edge(&self, rel: Relation, a: EntityId, b: EntityId) -> Result<Option<Edge>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EDGES)?;
        let raw: Option<String> = table
            .get(edge_key(rel, a, b).as_str())?
            .map(|g| g.value().to_string());
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Ids linked from `owner`, in id order.
    pub fn neighbors(&self, rel: Relation, owner: EntityId) -> Result<Vec<EntityId>> {
        Ok(self
            .neighbor_edges(rel, owner)?
            .into_iter()
            .map(|e| e.b)
            .collect())
    }

    /// Edges owned by `owner`, attributes included.
    pub fn neighbor_edges(&self, rel: Relation, owner: EntityId) -> Result<Vec<Edge>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EDGES)?;
        let prefix = owner_prefix(rel, owner);
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if k.value().starts_with(&prefix) {
                out.push(serde_json::from_str(v.value())?);
            }
        }
        Ok(out)
    }

    /// Ids that link *to* `other` through this relation.
    pub fn reverse_neighbors(&self, rel: Relation, other: EntityId) -> Result<Vec<EntityId>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EDGES_REV)?;
        let prefix = owner_prefix(rel, other);
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (k, _v) = entry?;
            if k.value().starts_with(&prefix) {
                out.push(parse_tail_id(k.value())?);
            }
        }
        Ok(out)
    }

    /// Catalysts recorded as inputs of `catalyst`.
    pub fn input_catalysts(&self, catalyst: EntityId) -> Result<Vec<EntityId>> {
        self.reverse_neighbors(Relation::CatalystDerivation, catalyst)
    }

    /// Catalysts derived from `catalyst`.
    pub fn output_catalysts(&self, catalyst: EntityId) -> Result<Vec<EntityId>> {
        self.neighbors(Relation::CatalystDerivation, catalyst)
    }

    /// Refuse the insert `parent -> child` if it would close a cycle:
    /// depth-first walk from `child` along existing derivation edges,
    /// searching for `parent`. Runs inside the caller's write
    /// transaction, so a concurrent link cannot sneak a cycle in
    /// between the check and the insert (redb serializes writers).
    /// Fails closed: any traversal error refuses the link.
    fn ensure_acyclic_in(txn: &WriteTransaction, parent: EntityId, child: EntityId) -> Result<()> {
        if parent == child {
            return Err(LabError::CyclicReference(format!(
                "catalyst {parent} cannot be its own input"
            )));
        }
        let mut stack = vec![child];
        let mut visited: HashSet<EntityId> = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for edge in Self::forward_edges_in(txn, Relation::CatalystDerivation, current)? {
                if edge.b == parent {
                    return Err(LabError::CyclicReference(format!(
                        "catalyst {parent} is already derived from catalyst {child}"
                    )));
                }
                stack.push(edge.b);
            }
        }
        Ok(())
    }

    /// Record `parent` as an input of `child` in the derivation chain.
    pub fn link_derivation(&self, parent: EntityId, child: EntityId) -> Result<()> {
        let txn = self.db.begin_write()?;
        Self::ensure_exists_in(&txn, EntityKind::Catalyst, parent)?;
        Self::ensure_exists_in(&txn, EntityKind::Catalyst, child)?;
        if Self::read_edge_in(&txn, Relation::CatalystDerivation, parent, child)?.is_some() {
            return Ok(()); // already linked
        }
        Self::ensure_acyclic_in(&txn, parent, child)?;
        Self::insert_edge_in(&txn, Relation::CatalystDerivation, parent, child, None)?;
        txn.commit()?;
        debug!(%parent, %child, "derivation linked");
        Ok(())
    }

    /// Create a catalyst and its derivation inputs in one transaction.
    pub fn create_catalyst_with_inputs(
        &self,
        build: impl FnOnce(EntityId, DateTime<Utc>) -> Catalyst,
        inputs: &[EntityId],
    ) -> Result<Catalyst> {
        let txn = self.db.begin_write()?;
        for input in inputs {
            Self::ensure_exists_in(&txn, EntityKind::Catalyst, *input)?;
        }
        let id = Self::next_id_in(&txn)?;
        let now = Utc::now();
        let record = build(id, now);
        Self::write_row_in(&txn, &record)?;
        for input in inputs {
            Self::ensure_acyclic_in(&txn, *input, id)?;
            Self::insert_edge_in(&txn, Relation::CatalystDerivation, *input, id, None)?;
        }
        txn.commit()?;
        debug!(%id, inputs = inputs.len(), "created catalyst");
        Ok(record)
    }

    /// Overwrite a catalyst and, when a new input set is supplied,
    /// reconcile its derivation edges to match, all in one transaction.
    pub fn update_catalyst_with_inputs(
        &self,
        mut record: Catalyst,
        inputs: Option<Vec<EntityId>>,
    ) -> Result<Catalyst> {
        let txn = self.db.begin_write()?;
        if !Self::exists_in(&txn, EntityKind::Catalyst, record.id())? {
            return Err(LabError::not_found(EntityKind::Catalyst, record.id()));
        }
        record.touch(Utc::now());
        Self::write_row_in(&txn, &record)?;

        if let Some(desired) = inputs {
            let desired: HashSet<EntityId> = desired.into_iter().collect();
            let current: HashSet<EntityId> =
                Self::reverse_ids_in(&txn, Relation::CatalystDerivation, record.id())?
                    .into_iter()
                    .collect();
            for stale in current.difference(&desired) {
                Self::remove_edge_in(&txn, Relation::CatalystDerivation, *stale, record.id())?;
            }
            for added in desired.difference(&current) {
                Self::ensure_exists_in(&txn, EntityKind::Catalyst, *added)?;
                Self::ensure_acyclic_in(&txn, *added, record.id())?;
                Self::insert_edge_in(
                    &txn,
                    Relation::CatalystDerivation,
                    *added,
                    record.id(),
                    None,
                )?;
            }
        }

        txn.commit()?;
        Ok(record)
    }

    // -- delete ------------------------------------------------------------

    /// Hard-delete an entity, enforcing the declared edge and
    /// foreign-key policies. Without `force`, any RESTRICT reference
    /// refuses the whole operation; with `force`, protected edges are
    /// dropped and scalar referrers are detached, all atomically.
    pub fn delete_entity(&self, kind: EntityKind, id: EntityId, force: bool) -> Result<()> {
        let txn = self.db.begin_write()?;
        if !Self::exists_in(&txn, kind, id)? {
            return Err(LabError::not_found(kind, id));
        }

        let mut blockers = Vec::new();
        if !force {
            for rel in Relation::ALL {
                let (_, other_kind) = rel.endpoints();
                if other_kind == kind && rel.other_delete_policy() == DeletePolicy::Restrict {
                    let referrers = Self::reverse_ids_in(&txn, rel, id)?;
                    if !referrers.is_empty() {
                        blockers.push(format!(
                            "{kind} {id} is referenced via {} by {} edge(s)",
                            rel.prefix(),
                            referrers.len()
                        ));
                    }
                }
            }
            blockers.extend(Self::fk_blockers(&txn, kind, id)?);
        }
        if !blockers.is_empty() {
            return Err(LabError::RestrictedByReferences(blockers.join("; ")));
        }

        // Point of no return: everything below commits or nothing does.
        for rel in Relation::ALL {
            let (owner_kind, other_kind) = rel.endpoints();
            if owner_kind == kind {
                for edge in Self::forward_edges_in(&txn, rel, id)? {
                    Self::remove_edge_in(&txn, rel, id, edge.b)?;
                }
            }
            if other_kind == kind {
                for referrer in Self::reverse_ids_in(&txn, rel, id)? {
                    Self::remove_edge_in(&txn, rel, referrer, id)?;
                }
            }
        }
        Self::detach_fk_referrers(&txn, kind, id)?;
        Self::delete_row_in(&txn, kind, id)?;
        txn.commit()?;
        if force {
            warn!(%kind, %id, "force-deleted entity with references");
        } else {
            debug!(%kind, %id, "deleted entity");
        }
        Ok(())
    }

    /// Describe scalar foreign keys pointing at `(kind, id)`.
    fn fk_blockers(txn: &WriteTransaction, kind: EntityKind, id: EntityId) -> Result<Vec<String>> {
        let mut blockers = Vec::new();
        let mut note = |referrer: EntityKind, referrer_id: EntityId, field: &str| {
            blockers.push(format!(
                "{kind} {id} is referenced by {referrer} {referrer_id} ({field})"
            ));
        };
        match kind {
            EntityKind::Catalyst => {
                for s in Self::scan_kind_in::<Sample>(txn)? {
                    if s.catalyst_id == Some(id) {
                        note(EntityKind::Sample, s.id, "catalyst_id");
                    }
                }
            }
            EntityKind::Support => {
                for s in Self::scan_kind_in::<Sample>(txn)? {
                    if s.support_id == Some(id) {
                        note(EntityKind::Sample, s.id, "support_id");
                    }
                }
            }
            EntityKind::Method => {
                for s in Self::scan_kind_in::<Sample>(txn)? {
                    if s.method_id == Some(id) {
                        note(EntityKind::Sample, s.id, "method_id");
                    }
                }
            }
            EntityKind::Reactor => {
                for e in Self::scan_kind_in::<Experiment>(txn)? {
                    if e.reactor_id == Some(id) {
                        note(EntityKind::Experiment, e.id, "reactor_id");
                    }
                }
            }
            EntityKind::Analyzer => {
                for e in Self::scan_kind_in::<Experiment>(txn)? {
                    if e.analyzer_id == Some(id) {
                        note(EntityKind::Experiment, e.id, "analyzer_id");
                    }
                }
            }
            EntityKind::Waveform => {
                for e in Self::scan_kind_in::<Experiment>(txn)? {
                    if let ExperimentKind::Plasma { waveform_id, .. } = &e.kind {
                        if *waveform_id == Some(id) {
                            note(EntityKind::Experiment, e.id, "waveform_id");
                        }
                    }
                }
            }
            EntityKind::File => {
                for c in Self::scan_kind_in::<Characterization>(txn)? {
                    if c.raw_data_file_id == Some(id) {
                        note(EntityKind::Characterization, c.id, "raw_data_file_id");
                    }
                    if c.processed_data_file_id == Some(id) {
                        note(EntityKind::Characterization, c.id, "processed_data_file_id");
                    }
                }
                for e in Self::scan_kind_in::<Experiment>(txn)? {
                    if e.processed_data_file_id == Some(id) {
                        note(EntityKind::Experiment, e.id, "processed_data_file_id");
                    }
                }
            }
            _ => {}
        }
        Ok(blockers)
    }

    /// Null out scalar foreign keys pointing at `(kind, id)` and
    /// rewrite the referrers. Only reached on a forced delete or when
    /// no referrers exist.
    fn detach_fk_referrers(txn: &WriteTransaction, kind: EntityKind, id: EntityId) -> Result<()> {
        let now = Utc::now();
        match kind {
            EntityKind::Catalyst | EntityKind::Support | EntityKind::Method => {
                for mut s in Self::scan_kind_in::<Sample>(txn)? {
                    let hit = match kind {
                        EntityKind::Catalyst => s.catalyst_id == Some(id),
                        EntityKind::Support => s.support_id == Some(id),
                        _ => s.method_id == Some(id),
                    };
                    if hit {
                        match kind {
                            EntityKind::Catalyst => s.catalyst_id = None,
                            EntityKind::Support => s.support_id = None,
                            _ => s.method_id = None,
                        }
                        s.touch(now);
                        Self::write_row_in(txn, &s)?;
                    }
                }
            }
            EntityKind::Reactor | EntityKind::Analyzer | EntityKind::Waveform => {
                for mut e in Self::scan_kind_in::<Experiment>(txn)? {
                    let mut hit = false;
                    match kind {
                        EntityKind::Reactor if e.reactor_id == Some(id) => {
                            e.reactor_id = None;
                            hit = true;
                        }
                        EntityKind::Analyzer if e.analyzer_id == Some(id) => {
                            e.analyzer_id = None;
                            hit = true;
                        }
                        EntityKind::Waveform => {
                            if let ExperimentKind::Plasma { waveform_id, .. } = &mut e.kind {
                                if *waveform_id == Some(id) {
                                    *waveform_id = None;
                                    hit = true;
                                }
                            }
                        }
                        _ => {}
                    }
                    if hit {
                        e.touch(now);
                        Self::write_row_in(txn, &e)?;
                    }
                }
            }
            EntityKind::File => {
                for mut c in Self::scan_kind_in::<Characterization>(txn)? {
                    let mut hit = false;
                    if c.raw_data_file_id == Some(id) {
                        c.raw_data_file_id = None;
                        hit = true;
                    }
                    if c.processed_data_file_id == Some(id) {
                        c.processed_data_file_id = None;
                        hit = true;
                    }
                    if hit {
                        c.touch(now);
                        Self::write_row_in(txn, &c)?;
                    }
                }
                for mut e in Self::scan_kind_in::<Experiment>(txn)? {
                    if e.processed_data_file_id == Some(id) {
                        e.processed_data_file_id = None;
                        e.touch(now);
                        Self::write_row_in(txn, &e)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

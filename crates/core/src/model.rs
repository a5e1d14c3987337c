//! Canonical entity shapes for the research graph.
//!
//! Every record carries an integer [`EntityId`] plus creation and
//! last-modified timestamps. Polymorphic families (Experiment,
//! Analyzer) are tagged unions: the discriminator is a serde tag, so a
//! stored row is one logical record and reads reconstitute the variant
//! without virtual dispatch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Open key-value payload with no fixed schema (Observation blobs).
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Stable integer identifier, allocated from a monotone counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every entity family the engine stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Catalyst,
    Sample,
    Method,
    Chemical,
    Support,
    Characterization,
    Observation,
    Experiment,
    Analyzer,
    Reactor,
    Waveform,
    Contaminant,
    Carrier,
    File,
    Group,
    User,
}

impl EntityKind {
    /// Stable storage prefix. Row keys are `"{kind}:{id:020}"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Catalyst => "catalyst",
            EntityKind::Sample => "sample",
            EntityKind::Method => "method",
            EntityKind::Chemical => "chemical",
            EntityKind::Support => "support",
            EntityKind::Characterization => "characterization",
            EntityKind::Observation => "observation",
            EntityKind::Experiment => "experiment",
            EntityKind::Analyzer => "analyzer",
            EntityKind::Reactor => "reactor",
            EntityKind::Waveform => "waveform",
            EntityKind::Contaminant => "contaminant",
            EntityKind::Carrier => "carrier",
            EntityKind::File => "file",
            EntityKind::Group => "group",
            EntityKind::User => "user",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored record the engine can persist and fetch by id.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    fn id(&self) -> EntityId;
    /// Bump the last-modified timestamp. Called by the store on every write.
    fn touch(&mut self, at: DateTime<Utc>);
}

/// One audit-trail entry appended by a consume operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumption {
    pub amount: Decimal,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Consumable entities
// ---------------------------------------------------------------------------

/// Remaining amounts at or below this are considered depleted.
/// Keeps the predicate stable across many small exact-decimal decrements.
pub fn depletion_epsilon() -> Decimal {
    Decimal::new(1, 6) // 0.000001
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalyst {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    /// Total amount produced by the synthesis, in grams.
    pub yield_amount: Decimal,
    /// Amount still on the shelf. Invariant: `0 <= remaining <= yield`.
    pub remaining_amount: Decimal,
    /// Append-only consume audit trail.
    pub consumptions: Vec<Consumption>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Catalyst {
    /// Derived, never stored: remaining is (approximately) zero.
    pub fn is_depleted(&self) -> bool {
        self.remaining_amount <= depletion_epsilon()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub yield_amount: Decimal,
    pub remaining_amount: Decimal,
    /// Source catalyst this sample was prepared from, if any.
    pub catalyst_id: Option<EntityId>,
    pub support_id: Option<EntityId>,
    pub method_id: Option<EntityId>,
    pub consumptions: Vec<Consumption>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sample {
    pub fn is_depleted(&self) -> bool {
        self.remaining_amount <= depletion_epsilon()
    }

    /// Scalar foreign keys this record points at, for referential
    /// checks at write time.
    pub fn foreign_refs(&self) -> Vec<(EntityKind, EntityId)> {
        let mut refs = Vec::new();
        if let Some(id) = self.catalyst_id {
            refs.push((EntityKind::Catalyst, id));
        }
        if let Some(id) = self.support_id {
            refs.push((EntityKind::Support, id));
        }
        if let Some(id) = self.method_id {
            refs.push((EntityKind::Method, id));
        }
        refs
    }
}

// ---------------------------------------------------------------------------
// Methods and reference entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    /// Soft deprecation: inactive methods stay readable but are
    /// excluded from "active" default listings.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chemical {
    pub id: EntityId,
    pub name: String,
    pub formula: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Support {
    pub id: EntityId,
    pub name: String,
    pub material: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reactor {
    pub id: EntityId,
    pub name: String,
    pub reactor_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    pub id: EntityId,
    pub name: String,
    pub shape: Option<String>,
    pub frequency_hz: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contaminant {
    pub id: EntityId,
    pub name: String,
    pub formula: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    pub id: EntityId,
    pub name: String,
    pub formula: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Characterizations and observations
// ---------------------------------------------------------------------------

/// Closed set of characterization techniques.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterizationType {
    Xrd,
    Bet,
    Tem,
    Sem,
    Xps,
    Tpd,
}

impl CharacterizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterizationType::Xrd => "xrd",
            CharacterizationType::Bet => "bet",
            CharacterizationType::Tem => "tem",
            CharacterizationType::Sem => "sem",
            CharacterizationType::Xps => "xps",
            CharacterizationType::Tpd => "tpd",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "xrd" => Some(CharacterizationType::Xrd),
            "bet" => Some(CharacterizationType::Bet),
            "tem" => Some(CharacterizationType::Tem),
            "sem" => Some(CharacterizationType::Sem),
            "xps" => Some(CharacterizationType::Xps),
            "tpd" => Some(CharacterizationType::Tpd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characterization {
    pub id: EntityId,
    pub characterization_type: CharacterizationType,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub raw_data_file_id: Option<EntityId>,
    pub processed_data_file_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Characterization {
    pub fn foreign_refs(&self) -> Vec<(EntityKind, EntityId)> {
        let mut refs = Vec::new();
        if let Some(id) = self.raw_data_file_id {
            refs.push((EntityKind::File, id));
        }
        if let Some(id) = self.processed_data_file_id {
            refs.push((EntityKind::File, id));
        }
        refs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: EntityId,
    pub name: Option<String>,
    /// Reaction conditions, free-form keys.
    pub conditions: JsonMap,
    /// Calcination parameters, free-form keys.
    pub calcination_parameters: JsonMap,
    /// Measured data, free-form keys.
    pub data: JsonMap,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Observation {
    /// Derived purely from payload non-emptiness; there is no stored
    /// flag to drift out of sync with the map.
    pub fn has_calcination_data(&self) -> bool {
        !self.calcination_parameters.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Polymorphic families
// ---------------------------------------------------------------------------

/// Variant payload of an experiment. The serde tag is the family
/// discriminator: one stored row, one logical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "experiment_type", rename_all = "snake_case")]
pub enum ExperimentKind {
    Plasma {
        waveform_id: Option<EntityId>,
        power_w: Option<Decimal>,
        duty_on_ms: Option<Decimal>,
        duty_off_ms: Option<Decimal>,
    },
    Photocatalysis {
        wavelength_nm: Option<Decimal>,
        power_w: Option<Decimal>,
    },
    Misc {
        description: Option<String>,
    },
}

impl ExperimentKind {
    pub fn experiment_type(&self) -> &'static str {
        match self {
            ExperimentKind::Plasma { .. } => "plasma",
            ExperimentKind::Photocatalysis { .. } => "photocatalysis",
            ExperimentKind::Misc { .. } => "misc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: EntityId,
    pub purpose: Option<String>,
    pub reactor_id: Option<EntityId>,
    pub analyzer_id: Option<EntityId>,
    pub processed_data_file_id: Option<EntityId>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub kind: ExperimentKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    pub fn experiment_type(&self) -> &'static str {
        self.kind.experiment_type()
    }

    pub fn foreign_refs(&self) -> Vec<(EntityKind, EntityId)> {
        let mut refs = Vec::new();
        if let Some(id) = self.reactor_id {
            refs.push((EntityKind::Reactor, id));
        }
        if let Some(id) = self.analyzer_id {
            refs.push((EntityKind::Analyzer, id));
        }
        if let Some(id) = self.processed_data_file_id {
            refs.push((EntityKind::File, id));
        }
        if let ExperimentKind::Plasma {
            waveform_id: Some(id),
            ..
        } = self.kind
        {
            refs.push((EntityKind::Waveform, id));
        }
        refs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analyzer_type", rename_all = "snake_case")]
pub enum AnalyzerKind {
    Ftir {
        spectral_range: Option<String>,
        resolution: Option<Decimal>,
    },
    Oes {
        wavelength_range: Option<String>,
        integration_time_ms: Option<Decimal>,
    },
}

impl AnalyzerKind {
    pub fn analyzer_type(&self) -> &'static str {
        match self {
            AnalyzerKind::Ftir { .. } => "ftir",
            AnalyzerKind::Oes { .. } => "oes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analyzer {
    pub id: EntityId,
    pub name: String,
    #[serde(flatten)]
    pub kind: AnalyzerKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Analyzer {
    pub fn analyzer_type(&self) -> &'static str {
        self.kind.analyzer_type()
    }
}

// ---------------------------------------------------------------------------
// Files and groups
// ---------------------------------------------------------------------------

/// File *metadata*. The bytes live in an external object store at `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: EntityId,
    pub name: String,
    pub path: String,
    pub media_type: Option<String>,
    pub size_bytes: Option<u64>,
    /// Soft-delete marker, reversible via restore. Permanent removal
    /// is a separate irreversible path.
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Record impls
// ---------------------------------------------------------------------------

macro_rules! impl_record {
    ($ty:ty, $kind:expr) => {
        impl Record for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> EntityId {
                self.id
            }

            fn touch(&mut self, at: DateTime<Utc>) {
                self.updated_at = at;
            }
        }
    };
}

impl_record!(Catalyst, EntityKind::Catalyst);
impl_record!(Sample, EntityKind::Sample);
impl_record!(Method, EntityKind::Method);
impl_record!(Chemical, EntityKind::Chemical);
impl_record!(Support, EntityKind::Support);
impl_record!(Characterization, EntityKind::Characterization);
impl_record!(Observation, EntityKind::Observation);
impl_record!(Experiment, EntityKind::Experiment);
impl_record!(Analyzer, EntityKind::Analyzer);
impl_record!(Reactor, EntityKind::Reactor);
impl_record!(Waveform, EntityKind::Waveform);
impl_record!(Contaminant, EntityKind::Contaminant);
impl_record!(Carrier, EntityKind::Carrier);
impl_record!(File, EntityKind::File);
impl_record!(Group, EntityKind::Group);
impl_record!(User, EntityKind::User);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experiment_round_trips_with_flattened_discriminator() {
        let exp = Experiment {
            id: EntityId(7),
            purpose: Some("NH3 synthesis screening".into()),
            reactor_id: None,
            analyzer_id: None,
            processed_data_file_id: None,
            notes: None,
            kind: ExperimentKind::Plasma {
                waveform_id: Some(EntityId(3)),
                power_w: Some(Decimal::new(125, 1)),
                duty_on_ms: None,
                duty_off_ms: None,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&exp).unwrap();
        assert_eq!(json["experiment_type"], "plasma");
        assert_eq!(json["waveform_id"], 3);

        let back: Experiment = serde_json::from_value(json).unwrap();
        assert_eq!(back.experiment_type(), "plasma");
    }

    #[test]
    fn depletion_is_derived_with_epsilon() {
        let mut cat = Catalyst {
            id: EntityId(1),
            name: "Ru/MgO".into(),
            description: None,
            yield_amount: Decimal::new(5, 0),
            remaining_amount: Decimal::new(5, 0),
            consumptions: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!cat.is_depleted());

        cat.remaining_amount = Decimal::new(1, 7); // 0.0000001 g
        assert!(cat.is_depleted(), "sub-epsilon remainder counts as depleted");
    }

    #[test]
    fn calcination_flag_tracks_map_emptiness() {
        let mut obs = Observation {
            id: EntityId(2),
            name: None,
            conditions: JsonMap::new(),
            calcination_parameters: JsonMap::new(),
            data: JsonMap::new(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!obs.has_calcination_data());

        obs.calcination_parameters
            .insert("ramp_rate".into(), serde_json::json!("5 C/min"));
        assert!(obs.has_calcination_data());
    }
}

//! Schema Registry: the single table of truth for what each entity
//! family accepts on the wire.
//!
//! Validation and the polymorphic resolver both dispatch on these
//! static tables; variant logic lives here once instead of being
//! scattered across per-endpoint checks.

use serde_json::Value;

use crate::error::{FieldError, FieldErrorKind, LabError, Result};
use crate::model::{EntityKind, JsonMap};

/// Wire-level type of a field, used for shallow admissibility checks.
/// Semantic parsing (decimal strings, enum membership, id fit) happens
/// in the coercion layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    /// Exact decimal; accepts a JSON string or number on the wire.
    Decimal,
    Integer,
    Boolean,
    /// Foreign key to another family.
    Ref(EntityKind),
    /// Open key-value object with no fixed keys.
    Json,
    /// List of entity ids.
    IdList,
    /// Closed string set.
    Enumerated(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    /// Must be present on create. Update is always partial.
    pub required: bool,
    /// Accepts an explicit JSON `null` (clears the field on update).
    pub nullable: bool,
}

const fn field(name: &'static str, ty: FieldType, required: bool, nullable: bool) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required,
        nullable,
    }
}

/// One variant of a polymorphic family: discriminator value plus the
/// fields legal only for that variant.
#[derive(Debug, Clone, Copy)]
pub struct PolyVariant {
    pub tag: &'static str,
    pub fields: &'static [FieldSpec],
}

#[derive(Debug, Clone, Copy)]
pub struct FamilySchema {
    pub kind: EntityKind,
    /// Fields shared by every record of the family.
    pub fields: &'static [FieldSpec],
    /// Discriminator field name, for polymorphic families.
    pub discriminator: Option<&'static str>,
    pub variants: &'static [PolyVariant],
}

pub const CHARACTERIZATION_TYPES: &[&str] = &["xrd", "bet", "tem", "sem", "xps", "tpd"];

const CATALYST_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("description", FieldType::Text, false, true),
    field("yield_amount", FieldType::Decimal, true, false),
    field("remaining_amount", FieldType::Decimal, false, false),
    field("input_catalyst_ids", FieldType::IdList, false, false),
];

const SAMPLE_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("description", FieldType::Text, false, true),
    field("yield_amount", FieldType::Decimal, true, false),
    field("remaining_amount", FieldType::Decimal, false, false),
    field("catalyst_id", FieldType::Ref(EntityKind::Catalyst), false, true),
    field("support_id", FieldType::Ref(EntityKind::Support), false, true),
    field("method_id", FieldType::Ref(EntityKind::Method), false, true),
];

const METHOD_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("description", FieldType::Text, false, true),
    field("is_active", FieldType::Boolean, false, false),
];

const CHEMICAL_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("formula", FieldType::Text, false, true),
];

const SUPPORT_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("material", FieldType::Text, false, true),
];

const REACTOR_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("reactor_type", FieldType::Text, false, true),
];

const WAVEFORM_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("shape", FieldType::Text, false, true),
    field("frequency_hz", FieldType::Decimal, false, true),
];

const CONTAMINANT_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("formula", FieldType::Text, false, true),
];

const CARRIER_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("formula", FieldType::Text, false, true),
];

const USER_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("email", FieldType::Text, false, true),
];

const CHARACTERIZATION_FIELDS: &[FieldSpec] = &[
    field(
        "characterization_type",
        FieldType::Enumerated(CHARACTERIZATION_TYPES),
        true,
        false,
    ),
    field("name", FieldType::Text, false, true),
    field("notes", FieldType::Text, false, true),
    field("raw_data_file_id", FieldType::Ref(EntityKind::File), false, true),
    field(
        "processed_data_file_id",
        FieldType::Ref(EntityKind::File),
        false,
        true,
    ),
];

const OBSERVATION_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, false, true),
    field("conditions", FieldType::Json, false, false),
    field("calcination_parameters", FieldType::Json, false, false),
    field("data", FieldType::Json, false, false),
    field("notes", FieldType::Text, false, true),
];

const EXPERIMENT_BASE_FIELDS: &[FieldSpec] = &[
    field("purpose", FieldType::Text, false, true),
    field("reactor_id", FieldType::Ref(EntityKind::Reactor), false, true),
    field("analyzer_id", FieldType::Ref(EntityKind::Analyzer), false, true),
    field(
        "processed_data_file_id",
        FieldType::Ref(EntityKind::File),
        false,
        true,
    ),
    field("notes", FieldType::Text, false, true),
];

const EXPERIMENT_PLASMA_FIELDS: &[FieldSpec] = &[
    field("waveform_id", FieldType::Ref(EntityKind::Waveform), false, true),
    field("power_w", FieldType::Decimal, false, true),
    field("duty_on_ms", FieldType::Decimal, false, true),
    field("duty_off_ms", FieldType::Decimal, false, true),
];

const EXPERIMENT_PHOTOCATALYSIS_FIELDS: &[FieldSpec] = &[
    field("wavelength_nm", FieldType::Decimal, false, true),
    field("power_w", FieldType::Decimal, false, true),
];

const EXPERIMENT_MISC_FIELDS: &[FieldSpec] =
    &[field("description", FieldType::Text, false, true)];

const EXPERIMENT_VARIANTS: &[PolyVariant] = &[
    PolyVariant {
        tag: "plasma",
        fields: EXPERIMENT_PLASMA_FIELDS,
    },
    PolyVariant {
        tag: "photocatalysis",
        fields: EXPERIMENT_PHOTOCATALYSIS_FIELDS,
    },
    PolyVariant {
        tag: "misc",
        fields: EXPERIMENT_MISC_FIELDS,
    },
];

const ANALYZER_BASE_FIELDS: &[FieldSpec] = &[field("name", FieldType::Text, true, false)];

const ANALYZER_FTIR_FIELDS: &[FieldSpec] = &[
    field("spectral_range", FieldType::Text, false, true),
    field("resolution", FieldType::Decimal, false, true),
];

const ANALYZER_OES_FIELDS: &[FieldSpec] = &[
    field("wavelength_range", FieldType::Text, false, true),
    field("integration_time_ms", FieldType::Decimal, false, true),
];

const ANALYZER_VARIANTS: &[PolyVariant] = &[
    PolyVariant {
        tag: "ftir",
        fields: ANALYZER_FTIR_FIELDS,
    },
    PolyVariant {
        tag: "oes",
        fields: ANALYZER_OES_FIELDS,
    },
];

const FILE_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("path", FieldType::Text, true, false),
    field("media_type", FieldType::Text, false, true),
    field("size_bytes", FieldType::Integer, false, true),
];

const GROUP_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, false),
    field("description", FieldType::Text, false, true),
];

const fn plain(kind: EntityKind, fields: &'static [FieldSpec]) -> FamilySchema {
    FamilySchema {
        kind,
        fields,
        discriminator: None,
        variants: &[],
    }
}

const SCHEMAS: &[FamilySchema] = &[
    plain(EntityKind::Catalyst, CATALYST_FIELDS),
    plain(EntityKind::Sample, SAMPLE_FIELDS),
    plain(EntityKind::Method, METHOD_FIELDS),
    plain(EntityKind::Chemical, CHEMICAL_FIELDS),
    plain(EntityKind::Support, SUPPORT_FIELDS),
    plain(EntityKind::Characterization, CHARACTERIZATION_FIELDS),
    plain(EntityKind::Observation, OBSERVATION_FIELDS),
    FamilySchema {
        kind: EntityKind::Experiment,
        fields: EXPERIMENT_BASE_FIELDS,
        discriminator: Some("experiment_type"),
        variants: EXPERIMENT_VARIANTS,
    },
    FamilySchema {
        kind: EntityKind::Analyzer,
        fields: ANALYZER_BASE_FIELDS,
        discriminator: Some("analyzer_type"),
        variants: ANALYZER_VARIANTS,
    },
    plain(EntityKind::Reactor, REACTOR_FIELDS),
    plain(EntityKind::Waveform, WAVEFORM_FIELDS),
    plain(EntityKind::Contaminant, CONTAMINANT_FIELDS),
    plain(EntityKind::Carrier, CARRIER_FIELDS),
    plain(EntityKind::File, FILE_FIELDS),
    plain(EntityKind::Group, GROUP_FIELDS),
    plain(EntityKind::User, USER_FIELDS),
];

pub fn family_schema(kind: EntityKind) -> &'static FamilySchema {
    SCHEMAS
        .iter()
        .find(|s| s.kind == kind)
        .expect("every EntityKind has a registered schema")
}

/// Look up the field set for one variant of a polymorphic family.
///
/// An unknown discriminator value is a caller error, never retried.
pub fn variant_schema(kind: EntityKind, tag: &str) -> Result<&'static PolyVariant> {
    let schema = family_schema(kind);
    schema
        .variants
        .iter()
        .find(|v| v.tag == tag)
        .ok_or_else(|| LabError::UnknownVariant {
            family: kind,
            value: tag.to_string(),
        })
}

/// Whether create requires the field or update may supply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

fn admissible(ty: FieldType, value: &Value) -> bool {
    match ty {
        FieldType::Text => value.is_string(),
        FieldType::Decimal => value.is_string() || value.is_number(),
        FieldType::Integer => value.is_u64(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Ref(_) => value.is_u64(),
        FieldType::Json => value.is_object(),
        FieldType::IdList => value.is_array(),
        FieldType::Enumerated(_) => value.is_string(),
    }
}

fn type_name(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Text => "a string",
        FieldType::Decimal => "a decimal string or number",
        FieldType::Integer => "an unsigned integer",
        FieldType::Boolean => "a boolean",
        FieldType::Ref(_) => "an entity id",
        FieldType::Json => "an object",
        FieldType::IdList => "an array of entity ids",
        FieldType::Enumerated(_) => "one of the permitted values",
    }
}

/// Check a wire payload against the registry: unknown keys, required
/// fields (create only), explicit nulls on non-nullable fields, and
/// shallow JSON types. For polymorphic families, `tag` selects the
/// variant; keys belonging to a *different* variant are rejected with
/// [`LabError::UnknownField`] naming the variant they belong to, never
/// silently dropped.
///
/// Semantic coercion (decimal parsing, enum membership) is the
/// validation layer's job; this pass only gates shape.
pub fn check_shape(
    kind: EntityKind,
    tag: Option<&str>,
    payload: &JsonMap,
    mode: Mode,
) -> Result<()> {
    let schema = family_schema(kind);
    let variant = match (schema.discriminator, tag) {
        (Some(_), Some(t)) => Some(variant_schema(kind, t)?),
        _ => None,
    };

    let lookup = |name: &str| -> Option<&'static FieldSpec> {
        schema
            .fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| variant.and_then(|v| v.fields.iter().find(|f| f.name == name)))
    };

    let mut errors = Vec::new();

    for (key, value) in payload {
        if Some(key.as_str()) == schema.discriminator {
            continue; // resolver validated the discriminator already
        }
        match lookup(key) {
            Some(spec) => {
                if value.is_null() {
                    if !spec.nullable {
                        errors.push(FieldError::new(
                            key.as_str(),
                            FieldErrorKind::NotNullable,
                            "field does not accept null",
                        ));
                    }
                } else if !admissible(spec.ty, value) {
                    errors.push(FieldError::new(
                        key.as_str(),
                        FieldErrorKind::InvalidFormat,
                        format!("expected {}", type_name(spec.ty)),
                    ));
                }
            }
            None => {
                // A key legal for a sibling variant is a contract
                // violation with a precise name.
                if let Some(other) = schema
                    .variants
                    .iter()
                    .find(|v| v.fields.iter().any(|f| f.name == key))
                {
                    return Err(LabError::UnknownField {
                        field: key.clone(),
                        variant: other.tag.to_string(),
                    });
                }
                errors.push(FieldError::new(
                    key.as_str(),
                    FieldErrorKind::UnknownField,
                    format!("not part of the {kind} schema"),
                ));
            }
        }
    }

    if mode == Mode::Create {
        let required = schema
            .fields
            .iter()
            .chain(variant.map(|v| v.fields.iter()).into_iter().flatten())
            .filter(|f| f.required);
        for spec in required {
            match payload.get(spec.name) {
                None => errors.push(FieldError::new(
                    spec.name,
                    FieldErrorKind::Missing,
                    "required on create",
                )),
                Some(Value::Null) => errors.push(FieldError::new(
                    spec.name,
                    FieldErrorKind::NotNullable,
                    "required field cannot be null",
                )),
                Some(_) => {}
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(LabError::validation(errors))
    }
}

//! Validation & coercion: wire-format JSON in, typed drafts out.
//!
//! Every entry point returns either a fully typed value or a
//! [`LabError`] carrying field-level diagnostics, never both. Shape
//! gating (unknown keys, required fields, nullability) is delegated to
//! the schema registry; this layer does the semantic work: exact
//! decimal parsing, id coercion, and the cross-field inventory and
//! self-reference rules.
//!
//! Update is always partial: an absent key leaves the field untouched,
//! an explicit `null` clears a nullable field. Open payload maps
//! (Observation blobs) are replaced as whole units, never merged.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{FieldError, FieldErrorKind, LabError, Result};
use crate::model::{
    Catalyst, Characterization, CharacterizationType, Chemical, EntityId, EntityKind, File, Group,
    JsonMap, Method, Observation, Reactor, Sample, Support, User, Waveform,
};
use crate::schema::{self, Mode};

/// Payloads must be JSON objects; anything else is malformed input.
pub(crate) fn as_object(payload: &Value) -> Result<&JsonMap> {
    payload.as_object().ok_or_else(|| {
        LabError::field(
            "payload",
            FieldErrorKind::InvalidFormat,
            "payload must be a JSON object",
        )
    })
}

/// Tri-state view of one payload key.
pub(crate) enum FieldValue<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> FieldValue<T> {
    pub(crate) fn value(self) -> Option<T> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Typed field extraction with error accumulation. Callers drain the
/// fields they expect, then `finish()` converts any accumulated
/// failures into a single [`LabError::Validation`].
pub(crate) struct Fields<'a> {
    map: &'a JsonMap,
    errors: Vec<FieldError>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(map: &'a JsonMap) -> Self {
        Self {
            map,
            errors: Vec::new(),
        }
    }

    fn invalid(&mut self, name: &str, message: impl Into<String>) {
        self.errors
            .push(FieldError::new(name, FieldErrorKind::InvalidFormat, message));
    }

    pub(crate) fn string(&mut self, name: &str) -> FieldValue<String> {
        match self.map.get(name) {
            None => FieldValue::Absent,
            Some(Value::Null) => FieldValue::Null,
            Some(Value::String(s)) => FieldValue::Value(s.clone()),
            Some(_) => {
                self.invalid(name, "expected a string");
                FieldValue::Absent
            }
        }
    }

    pub(crate) fn boolean(&mut self, name: &str) -> FieldValue<bool> {
        match self.map.get(name) {
            None => FieldValue::Absent,
            Some(Value::Null) => FieldValue::Null,
            Some(Value::Bool(b)) => FieldValue::Value(*b),
            Some(_) => {
                self.invalid(name, "expected a boolean");
                FieldValue::Absent
            }
        }
    }

    pub(crate) fn integer(&mut self, name: &str) -> FieldValue<u64> {
        match self.map.get(name) {
            None => FieldValue::Absent,
            Some(Value::Null) => FieldValue::Null,
            Some(v) => match v.as_u64() {
                Some(n) => FieldValue::Value(n),
                None => {
                    self.invalid(name, "expected an unsigned integer");
                    FieldValue::Absent
                }
            },
        }
    }

    /// Exact decimal coercion: accepts `"12.5"` and `12.5` alike.
    pub(crate) fn decimal(&mut self, name: &str) -> FieldValue<Decimal> {
        match self.map.get(name) {
            None => FieldValue::Absent,
            Some(Value::Null) => FieldValue::Null,
            Some(Value::String(s)) => match parse_decimal(s) {
                Some(d) => FieldValue::Value(d),
                None => {
                    self.invalid(name, format!("`{s}` is not a decimal number"));
                    FieldValue::Absent
                }
            },
            Some(Value::Number(n)) => match parse_decimal(&n.to_string()) {
                Some(d) => FieldValue::Value(d),
                None => {
                    self.invalid(name, "number is not representable as a decimal");
                    FieldValue::Absent
                }
            },
            Some(_) => {
                self.invalid(name, "expected a decimal string or number");
                FieldValue::Absent
            }
        }
    }

    /// Decimal that must be `>= 0` (amounts, concentrations).
    pub(crate) fn non_negative_decimal(&mut self, name: &str) -> FieldValue<Decimal> {
        match self.decimal(name) {
            FieldValue::Value(d) if d < Decimal::ZERO => {
                self.errors.push(FieldError::new(
                    name,
                    FieldErrorKind::OutOfRange,
                    "must be >= 0",
                ));
                FieldValue::Absent
            }
            other => other,
        }
    }

    pub(crate) fn id(&mut self, name: &str) -> FieldValue<EntityId> {
        match self.integer(name) {
            FieldValue::Value(n) => FieldValue::Value(EntityId(n)),
            FieldValue::Null => FieldValue::Null,
            FieldValue::Absent => FieldValue::Absent,
        }
    }

    pub(crate) fn id_list(&mut self, name: &str) -> FieldValue<Vec<EntityId>> {
        match self.map.get(name) {
            None => FieldValue::Absent,
            Some(Value::Null) => FieldValue::Null,
            Some(Value::Array(items)) => {
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_u64() {
                        Some(n) => ids.push(EntityId(n)),
                        None => {
                            self.invalid(name, "expected an array of entity ids");
                            return FieldValue::Absent;
                        }
                    }
                }
                FieldValue::Value(ids)
            }
            Some(_) => {
                self.invalid(name, "expected an array of entity ids");
                FieldValue::Absent
            }
        }
    }

    pub(crate) fn object(&mut self, name: &str) -> FieldValue<JsonMap> {
        match self.map.get(name) {
            None => FieldValue::Absent,
            Some(Value::Null) => FieldValue::Null,
            Some(Value::Object(m)) => FieldValue::Value(m.clone()),
            Some(_) => {
                self.invalid(name, "expected an object");
                FieldValue::Absent
            }
        }
    }

    pub(crate) fn characterization_type(&mut self, name: &str) -> FieldValue<CharacterizationType> {
        match self.string(name) {
            FieldValue::Value(s) => match CharacterizationType::parse(&s) {
                Some(t) => FieldValue::Value(t),
                None => {
                    self.invalid(
                        name,
                        format!("`{s}` is not one of {:?}", schema::CHARACTERIZATION_TYPES),
                    );
                    FieldValue::Absent
                }
            },
            other => match other {
                FieldValue::Null => FieldValue::Null,
                _ => FieldValue::Absent,
            },
        }
    }

    pub(crate) fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(LabError::validation(self.errors))
        }
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

/// Cross-field inventory rule shared by Catalyst and Sample.
fn resolve_inventory_pair(
    yield_amount: Decimal,
    remaining: Option<Decimal>,
) -> Result<(Decimal, Decimal)> {
    // Omitted remaining means a freshly synthesized, untouched batch.
    let remaining = remaining.unwrap_or(yield_amount);
    ensure_remaining_within_yield(yield_amount, remaining)?;
    Ok((yield_amount, remaining))
}

pub(crate) fn ensure_remaining_within_yield(
    yield_amount: Decimal,
    remaining: Decimal,
) -> Result<()> {
    if remaining > yield_amount {
        return Err(LabError::InvariantViolation(format!(
            "remaining_amount {remaining} exceeds yield_amount {yield_amount}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Catalysts and samples
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CatalystDraft {
    pub name: String,
    pub description: Option<String>,
    pub yield_amount: Decimal,
    pub remaining_amount: Decimal,
    pub input_catalyst_ids: Vec<EntityId>,
}

impl CatalystDraft {
    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> Catalyst {
        Catalyst {
            id,
            name: self.name,
            description: self.description,
            yield_amount: self.yield_amount,
            remaining_amount: self.remaining_amount,
            consumptions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn catalyst_create(payload: &Value) -> Result<CatalystDraft> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Catalyst, None, map, Mode::Create)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value().unwrap_or_default();
    let description = f.string("description").value();
    let yield_amount = f.non_negative_decimal("yield_amount").value();
    let remaining = f.non_negative_decimal("remaining_amount").value();
    let input_catalyst_ids = f.id_list("input_catalyst_ids").value().unwrap_or_default();
    f.finish()?;

    let yield_amount = yield_amount.unwrap_or(Decimal::ZERO);
    let (yield_amount, remaining_amount) = resolve_inventory_pair(yield_amount, remaining)?;

    Ok(CatalystDraft {
        name,
        description,
        yield_amount,
        remaining_amount,
        input_catalyst_ids,
    })
}

/// Applies a partial update. Returns the new derivation input set when
/// the payload carries one, so the caller can reconcile edges in the
/// same operation.
pub fn catalyst_update(current: &mut Catalyst, payload: &Value) -> Result<Option<Vec<EntityId>>> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Catalyst, None, map, Mode::Update)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value();
    let description = f.string("description");
    let yield_amount = f.non_negative_decimal("yield_amount").value();
    let remaining = f.non_negative_decimal("remaining_amount").value();
    let inputs = f.id_list("input_catalyst_ids").value();
    f.finish()?;

    if let Some(inputs) = &inputs {
        if inputs.contains(&current.id) {
            return Err(LabError::CyclicReference(format!(
                "catalyst {} cannot be its own input",
                current.id
            )));
        }
    }

    if let Some(v) = name {
        current.name = v;
    }
    match description {
        FieldValue::Value(v) => current.description = Some(v),
        FieldValue::Null => current.description = None,
        FieldValue::Absent => {}
    }
    if let Some(v) = yield_amount {
        current.yield_amount = v;
    }
    if let Some(v) = remaining {
        current.remaining_amount = v;
    }
    ensure_remaining_within_yield(current.yield_amount, current.remaining_amount)?;

    Ok(inputs)
}

#[derive(Debug, Clone)]
pub struct SampleDraft {
    pub name: String,
    pub description: Option<String>,
    pub yield_amount: Decimal,
    pub remaining_amount: Decimal,
    pub catalyst_id: Option<EntityId>,
    pub support_id: Option<EntityId>,
    pub method_id: Option<EntityId>,
}

impl SampleDraft {
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

    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> Sample {
        Sample {
            id,
            name: self.name,
            description: self.description,
            yield_amount: self.yield_amount,
            remaining_amount: self.remaining_amount,
            catalyst_id: self.catalyst_id,
            support_id: self.support_id,
            method_id: self.method_id,
            consumptions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn sample_create(payload: &Value) -> Result<SampleDraft> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Sample, None, map, Mode::Create)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value().unwrap_or_default();
    let description = f.string("description").value();
    let yield_amount = f.non_negative_decimal("yield_amount").value();
    let remaining = f.non_negative_decimal("remaining_amount").value();
    let catalyst_id = f.id("catalyst_id").value();
    let support_id = f.id("support_id").value();
    let method_id = f.id("method_id").value();
    f.finish()?;

    let yield_amount = yield_amount.unwrap_or(Decimal::ZERO);
    let (yield_amount, remaining_amount) = resolve_inventory_pair(yield_amount, remaining)?;

    Ok(SampleDraft {
        name,
        description,
        yield_amount,
        remaining_amount,
        catalyst_id,
        support_id,
        method_id,
    })
}

pub fn sample_update(current: &mut Sample, payload: &Value) -> Result<()> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Sample, None, map, Mode::Update)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value();
    let description = f.string("description");
    let yield_amount = f.non_negative_decimal("yield_amount").value();
    let remaining = f.non_negative_decimal("remaining_amount").value();
    let catalyst_id = f.id("catalyst_id");
    let support_id = f.id("support_id");
    let method_id = f.id("method_id");
    f.finish()?;

    if let Some(v) = name {
        current.name = v;
    }
    match description {
        FieldValue::Value(v) => current.description = Some(v),
        FieldValue::Null => current.description = None,
        FieldValue::Absent => {}
    }
    if let Some(v) = yield_amount {
        current.yield_amount = v;
    }
    if let Some(v) = remaining {
        current.remaining_amount = v;
    }
    match catalyst_id {
        FieldValue::Value(v) => current.catalyst_id = Some(v),
        FieldValue::Null => current.catalyst_id = None,
        FieldValue::Absent => {}
    }
    match support_id {
        FieldValue::Value(v) => current.support_id = Some(v),
        FieldValue::Null => current.support_id = None,
        FieldValue::Absent => {}
    }
    match method_id {
        FieldValue::Value(v) => current.method_id = Some(v),
        FieldValue::Null => current.method_id = None,
        FieldValue::Absent => {}
    }
    ensure_remaining_within_yield(current.yield_amount, current.remaining_amount)
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MethodDraft {
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

impl MethodDraft {
    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> Method {
        Method {
            id,
            name: self.name,
            description: self.description,
            is_active: self.is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn method_create(payload: &Value) -> Result<MethodDraft> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Method, None, map, Mode::Create)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value().unwrap_or_default();
    let description = f.string("description").value();
    let is_active = f.boolean("is_active").value().unwrap_or(true);
    f.finish()?;

    Ok(MethodDraft {
        name,
        description,
        is_active,
    })
}

pub fn method_update(current: &mut Method, payload: &Value) -> Result<()> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Method, None, map, Mode::Update)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value();
    let description = f.string("description");
    let is_active = f.boolean("is_active").value();
    f.finish()?;

    if let Some(v) = name {
        current.name = v;
    }
    match description {
        FieldValue::Value(v) => current.description = Some(v),
        FieldValue::Null => current.description = None,
        FieldValue::Absent => {}
    }
    if let Some(v) = is_active {
        current.is_active = v;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Characterizations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CharacterizationDraft {
    pub characterization_type: CharacterizationType,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub raw_data_file_id: Option<EntityId>,
    pub processed_data_file_id: Option<EntityId>,
}

impl CharacterizationDraft {
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

    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> Characterization {
        Characterization {
            id,
            characterization_type: self.characterization_type,
            name: self.name,
            notes: self.notes,
            raw_data_file_id: self.raw_data_file_id,
            processed_data_file_id: self.processed_data_file_id,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn characterization_create(payload: &Value) -> Result<CharacterizationDraft> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Characterization, None, map, Mode::Create)?;

    let mut f = Fields::new(map);
    let characterization_type = f.characterization_type("characterization_type").value();
    let name = f.string("name").value();
    let notes = f.string("notes").value();
    let raw_data_file_id = f.id("raw_data_file_id").value();
    let processed_data_file_id = f.id("processed_data_file_id").value();
    f.finish()?;

    let characterization_type =
        characterization_type.unwrap_or(CharacterizationType::Xrd);

    Ok(CharacterizationDraft {
        characterization_type,
        name,
        notes,
        raw_data_file_id,
        processed_data_file_id,
    })
}

pub fn characterization_update(current: &mut Characterization, payload: &Value) -> Result<()> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Characterization, None, map, Mode::Update)?;

    let mut f = Fields::new(map);
    let characterization_type = f.characterization_type("characterization_type").value();
    let name = f.string("name");
    let notes = f.string("notes");
    let raw_data_file_id = f.id("raw_data_file_id");
    let processed_data_file_id = f.id("processed_data_file_id");
    f.finish()?;

    if let Some(v) = characterization_type {
        current.characterization_type = v;
    }
    match name {
        FieldValue::Value(v) => current.name = Some(v),
        FieldValue::Null => current.name = None,
        FieldValue::Absent => {}
    }
    match notes {
        FieldValue::Value(v) => current.notes = Some(v),
        FieldValue::Null => current.notes = None,
        FieldValue::Absent => {}
    }
    match raw_data_file_id {
        FieldValue::Value(v) => current.raw_data_file_id = Some(v),
        FieldValue::Null => current.raw_data_file_id = None,
        FieldValue::Absent => {}
    }
    match processed_data_file_id {
        FieldValue::Value(v) => current.processed_data_file_id = Some(v),
        FieldValue::Null => current.processed_data_file_id = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ObservationDraft {
    pub name: Option<String>,
    pub conditions: JsonMap,
    pub calcination_parameters: JsonMap,
    pub data: JsonMap,
    pub notes: Option<String>,
}

impl ObservationDraft {
    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> Observation {
        Observation {
            id,
            name: self.name,
            conditions: self.conditions,
            calcination_parameters: self.calcination_parameters,
            data: self.data,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn observation_create(payload: &Value) -> Result<ObservationDraft> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Observation, None, map, Mode::Create)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value();
    let conditions = f.object("conditions").value().unwrap_or_default();
    let calcination_parameters = f
        .object("calcination_parameters")
        .value()
        .unwrap_or_default();
    let data = f.object("data").value().unwrap_or_default();
    let notes = f.string("notes").value();
    f.finish()?;

    Ok(ObservationDraft {
        name,
        conditions,
        calcination_parameters,
        data,
        notes,
    })
}

pub fn observation_update(current: &mut Observation, payload: &Value) -> Result<()> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Observation, None, map, Mode::Update)?;

    let mut f = Fields::new(map);
    let name = f.string("name");
    // Payload maps are atomic sub-objects: providing one replaces the
    // stored map wholesale so it stays internally consistent.
    let conditions = f.object("conditions").value();
    let calcination_parameters = f.object("calcination_parameters").value();
    let data = f.object("data").value();
    let notes = f.string("notes");
    f.finish()?;

    match name {
        FieldValue::Value(v) => current.name = Some(v),
        FieldValue::Null => current.name = None,
        FieldValue::Absent => {}
    }
    if let Some(v) = conditions {
        current.conditions = v;
    }
    if let Some(v) = calcination_parameters {
        current.calcination_parameters = v;
    }
    if let Some(v) = data {
        current.data = v;
    }
    match notes {
        FieldValue::Value(v) => current.notes = Some(v),
        FieldValue::Null => current.notes = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Files and groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileDraft {
    pub name: String,
    pub path: String,
    pub media_type: Option<String>,
    pub size_bytes: Option<u64>,
}

impl FileDraft {
    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> File {
        File {
            id,
            name: self.name,
            path: self.path,
            media_type: self.media_type,
            size_bytes: self.size_bytes,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn file_create(payload: &Value) -> Result<FileDraft> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::File, None, map, Mode::Create)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value().unwrap_or_default();
    let path = f.string("path").value().unwrap_or_default();
    let media_type = f.string("media_type").value();
    let size_bytes = f.integer("size_bytes").value();
    f.finish()?;

    Ok(FileDraft {
        name,
        path,
        media_type,
        size_bytes,
    })
}

pub fn file_update(current: &mut File, payload: &Value) -> Result<()> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::File, None, map, Mode::Update)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value();
    let path = f.string("path").value();
    let media_type = f.string("media_type");
    let size_bytes = f.integer("size_bytes");
    f.finish()?;

    if let Some(v) = name {
        current.name = v;
    }
    if let Some(v) = path {
        current.path = v;
    }
    match media_type {
        FieldValue::Value(v) => current.media_type = Some(v),
        FieldValue::Null => current.media_type = None,
        FieldValue::Absent => {}
    }
    match size_bytes {
        FieldValue::Value(v) => current.size_bytes = Some(v),
        FieldValue::Null => current.size_bytes = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct GroupDraft {
    pub name: String,
    pub description: Option<String>,
}

impl GroupDraft {
    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> Group {
        Group {
            id,
            name: self.name,
            description: self.description,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn group_create(payload: &Value) -> Result<GroupDraft> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Group, None, map, Mode::Create)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value().unwrap_or_default();
    let description = f.string("description").value();
    f.finish()?;

    Ok(GroupDraft { name, description })
}

pub fn group_update(current: &mut Group, payload: &Value) -> Result<()> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Group, None, map, Mode::Update)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value();
    let description = f.string("description");
    f.finish()?;

    if let Some(v) = name {
        current.name = v;
    }
    match description {
        FieldValue::Value(v) => current.description = Some(v),
        FieldValue::Null => current.description = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Simple reference entities
// ---------------------------------------------------------------------------

/// Name plus one optional detail column; covers the flat reference
/// families (chemical, support, reactor, contaminant, carrier, user).
#[derive(Debug, Clone)]
pub struct ReferenceDraft {
    pub name: String,
    pub detail: Option<String>,
}

fn reference_create(kind: EntityKind, detail_field: &str, payload: &Value) -> Result<ReferenceDraft> {
    let map = as_object(payload)?;
    schema::check_shape(kind, None, map, Mode::Create)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value().unwrap_or_default();
    let detail = f.string(detail_field).value();
    f.finish()?;

    Ok(ReferenceDraft { name, detail })
}

/// Applies `name` and the detail column; returns what changed.
fn reference_update(
    kind: EntityKind,
    detail_field: &str,
    payload: &Value,
) -> Result<(Option<String>, FieldValue<String>)> {
    let map = as_object(payload)?;
    schema::check_shape(kind, None, map, Mode::Update)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value();
    let detail = f.string(detail_field);
    f.finish()?;

    Ok((name, detail))
}

pub fn chemical_create(payload: &Value) -> Result<ReferenceDraft> {
    reference_create(EntityKind::Chemical, "formula", payload)
}

pub fn chemical_update(current: &mut Chemical, payload: &Value) -> Result<()> {
    let (name, formula) = reference_update(EntityKind::Chemical, "formula", payload)?;
    if let Some(v) = name {
        current.name = v;
    }
    match formula {
        FieldValue::Value(v) => current.formula = Some(v),
        FieldValue::Null => current.formula = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

pub fn support_create(payload: &Value) -> Result<ReferenceDraft> {
    reference_create(EntityKind::Support, "material", payload)
}

pub fn support_update(current: &mut Support, payload: &Value) -> Result<()> {
    let (name, material) = reference_update(EntityKind::Support, "material", payload)?;
    if let Some(v) = name {
        current.name = v;
    }
    match material {
        FieldValue::Value(v) => current.material = Some(v),
        FieldValue::Null => current.material = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

pub fn reactor_create(payload: &Value) -> Result<ReferenceDraft> {
    reference_create(EntityKind::Reactor, "reactor_type", payload)
}

pub fn reactor_update(current: &mut Reactor, payload: &Value) -> Result<()> {
    let (name, reactor_type) = reference_update(EntityKind::Reactor, "reactor_type", payload)?;
    if let Some(v) = name {
        current.name = v;
    }
    match reactor_type {
        FieldValue::Value(v) => current.reactor_type = Some(v),
        FieldValue::Null => current.reactor_type = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

pub fn contaminant_create(payload: &Value) -> Result<ReferenceDraft> {
    reference_create(EntityKind::Contaminant, "formula", payload)
}

pub fn contaminant_update(current: &mut crate::model::Contaminant, payload: &Value) -> Result<()> {
    let (name, formula) = reference_update(EntityKind::Contaminant, "formula", payload)?;
    if let Some(v) = name {
        current.name = v;
    }
    match formula {
        FieldValue::Value(v) => current.formula = Some(v),
        FieldValue::Null => current.formula = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

pub fn carrier_create(payload: &Value) -> Result<ReferenceDraft> {
    reference_create(EntityKind::Carrier, "formula", payload)
}

pub fn carrier_update(current: &mut crate::model::Carrier, payload: &Value) -> Result<()> {
    let (name, formula) = reference_update(EntityKind::Carrier, "formula", payload)?;
    if let Some(v) = name {
        current.name = v;
    }
    match formula {
        FieldValue::Value(v) => current.formula = Some(v),
        FieldValue::Null => current.formula = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

pub fn user_create(payload: &Value) -> Result<ReferenceDraft> {
    reference_create(EntityKind::User, "email", payload)
}

pub fn user_update(current: &mut User, payload: &Value) -> Result<()> {
    let (name, email) = reference_update(EntityKind::User, "email", payload)?;
    if let Some(v) = name {
        current.name = v;
    }
    match email {
        FieldValue::Value(v) => current.email = Some(v),
        FieldValue::Null => current.email = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

// Waveforms carry a decimal column, so they get their own validators.

#[derive(Debug, Clone)]
pub struct WaveformDraft {
    pub name: String,
    pub shape: Option<String>,
    pub frequency_hz: Option<Decimal>,
}

impl WaveformDraft {
    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> Waveform {
        Waveform {
            id,
            name: self.name,
            shape: self.shape,
            frequency_hz: self.frequency_hz,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn waveform_create(payload: &Value) -> Result<WaveformDraft> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Waveform, None, map, Mode::Create)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value().unwrap_or_default();
    let shape = f.string("shape").value();
    let frequency_hz = f.non_negative_decimal("frequency_hz").value();
    f.finish()?;

    Ok(WaveformDraft {
        name,
        shape,
        frequency_hz,
    })
}

pub fn waveform_update(current: &mut Waveform, payload: &Value) -> Result<()> {
    let map = as_object(payload)?;
    schema::check_shape(EntityKind::Waveform, None, map, Mode::Update)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value();
    let shape = f.string("shape");
    let frequency_hz = f.non_negative_decimal("frequency_hz");
    f.finish()?;

    if let Some(v) = name {
        current.name = v;
    }
    match shape {
        FieldValue::Value(v) => current.shape = Some(v),
        FieldValue::Null => current.shape = None,
        FieldValue::Absent => {}
    }
    match frequency_hz {
        FieldValue::Value(v) => current.frequency_hz = Some(v),
        FieldValue::Null => current.frequency_hz = None,
        FieldValue::Absent => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Consume requests
// ---------------------------------------------------------------------------

/// Wire form of the inventory consume operation.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    pub amount: Decimal,
    pub notes: Option<String>,
}

/// Coerce a consume payload: `amount` (decimal string or number,
/// required) plus optional `notes`. Amount positivity is the ledger's
/// check; this only handles format.
pub fn consume_request(payload: &Value) -> Result<ConsumeRequest> {
    let map = as_object(payload)?;

    for key in map.keys() {
        if key != "amount" && key != "notes" {
            return Err(LabError::field(
                key.as_str(),
                FieldErrorKind::UnknownField,
                "not part of a consume request",
            ));
        }
    }

    let mut f = Fields::new(map);
    let amount = f.decimal("amount").value();
    let notes = f.string("notes").value();
    f.finish()?;

    let amount = amount.ok_or_else(|| {
        LabError::field("amount", FieldErrorKind::Missing, "required")
    })?;

    Ok(ConsumeRequest { amount, notes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn consume_request_coerces_amount() {
        let req = consume_request(&json!({ "amount": "0.25", "notes": "BET run" })).unwrap();
        assert_eq!(req.amount, Decimal::from_str("0.25").unwrap());
        assert_eq!(req.notes.as_deref(), Some("BET run"));

        let err = consume_request(&json!({ "amount": "lots" })).unwrap_err();
        assert!(matches!(err, LabError::Validation { .. }));

        let err = consume_request(&json!({ "notes": "no amount" })).unwrap_err();
        assert!(matches!(err, LabError::Validation { .. }));
    }

    #[test]
    fn decimal_amounts_coerce_from_strings_and_numbers() {
        let draft = catalyst_create(&json!({
            "name": "Ru/MgO",
            "yield_amount": "12.500",
            "remaining_amount": 10.25,
        }))
        .unwrap();
        assert_eq!(draft.yield_amount, Decimal::from_str("12.500").unwrap());
        assert_eq!(draft.remaining_amount, Decimal::from_str("10.25").unwrap());
    }

    #[test]
    fn non_numeric_amount_is_invalid_format() {
        let err = catalyst_create(&json!({
            "name": "Ru/MgO",
            "yield_amount": "a lot",
        }))
        .unwrap_err();
        match err {
            LabError::Validation { errors } => {
                assert_eq!(errors[0].field, "yield_amount");
                assert_eq!(errors[0].kind, FieldErrorKind::InvalidFormat);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn omitted_remaining_defaults_to_yield() {
        let draft = catalyst_create(&json!({
            "name": "Ru/MgO",
            "yield_amount": "5.0",
        }))
        .unwrap();
        assert_eq!(draft.remaining_amount, draft.yield_amount);
    }

    #[test]
    fn remaining_above_yield_violates_invariant() {
        let err = catalyst_create(&json!({
            "name": "Ru/MgO",
            "yield_amount": "5.0",
            "remaining_amount": "7.0",
        }))
        .unwrap_err();
        assert!(matches!(err, LabError::InvariantViolation(_)));
    }

    #[test]
    fn negative_amount_is_out_of_range() {
        let err = catalyst_create(&json!({
            "name": "Ru/MgO",
            "yield_amount": "-1",
        }))
        .unwrap_err();
        match err {
            LabError::Validation { errors } => {
                assert_eq!(errors[0].kind, FieldErrorKind::OutOfRange);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn catalyst_cannot_list_itself_as_input_on_update() {
        let mut current = catalyst_create(&json!({
            "name": "Ru/MgO",
            "yield_amount": "5.0",
        }))
        .unwrap()
        .into_record(EntityId(9), Utc::now());

        let err = catalyst_update(&mut current, &json!({ "input_catalyst_ids": [9] })).unwrap_err();
        assert!(matches!(err, LabError::CyclicReference(_)));
    }

    #[test]
    fn unknown_key_is_rejected_not_dropped() {
        let err = method_create(&json!({
            "name": "Impregnation",
            "solvent": "ethanol",
        }))
        .unwrap_err();
        match err {
            LabError::Validation { errors } => {
                assert_eq!(errors[0].field, "solvent");
                assert_eq!(errors[0].kind, FieldErrorKind::UnknownField);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn update_null_clears_nullable_field_only() {
        let mut method = method_create(&json!({
            "name": "Impregnation",
            "description": "wet impregnation",
        }))
        .unwrap()
        .into_record(EntityId(1), Utc::now());

        method_update(&mut method, &json!({ "description": null })).unwrap();
        assert_eq!(method.description, None);

        let err = method_update(&mut method, &json!({ "name": null })).unwrap_err();
        assert!(matches!(err, LabError::Validation { .. }));
    }

    #[test]
    fn observation_maps_replace_wholesale() {
        let mut obs = observation_create(&json!({
            "calcination_parameters": { "ramp_rate": "5 C/min", "hold_h": 4 },
        }))
        .unwrap()
        .into_record(EntityId(1), Utc::now());
        assert!(obs.has_calcination_data());

        observation_update(&mut obs, &json!({ "calcination_parameters": {} })).unwrap();
        assert!(!obs.has_calcination_data(), "empty map replaces, not merges");
    }
}

//! Polymorphic Resolver: create/update validation that differs by
//! variant, behind a uniform discriminated read shape.
//!
//! The discriminator selects a variant field set from the schema
//! registry. Fields legal only for a *different* variant are rejected
//! by name (silent dropping would hide client bugs), and the
//! discriminator itself is immutable after creation. Stored rows embed
//! the discriminator as a serde tag, so reads reconstitute the tagged
//! union without any per-variant storage.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{FieldErrorKind, LabError, Result};
use crate::model::{
    Analyzer, AnalyzerKind, EntityId, EntityKind, Experiment, ExperimentKind, JsonMap,
};
use crate::schema::{self, Mode};
use crate::validate::{as_object, FieldValue, Fields};

/// Pull and validate the discriminator for a polymorphic family.
///
/// On create the discriminator is required and must name a registered
/// variant. On update it may be omitted (the stored value stands) but
/// may not change.
fn discriminator(
    kind: EntityKind,
    map: &JsonMap,
    mode: Mode,
    current: Option<&str>,
) -> Result<String> {
    let field = schema::family_schema(kind)
        .discriminator
        .expect("polymorphic family has a discriminator");

    match map.get(field) {
        None => match (mode, current) {
            (Mode::Update, Some(tag)) => Ok(tag.to_string()),
            _ => Err(LabError::field(
                field,
                FieldErrorKind::Missing,
                "required on create",
            )),
        },
        Some(Value::String(tag)) => {
            schema::variant_schema(kind, tag)?;
            if mode == Mode::Update {
                if let Some(current) = current {
                    if tag != current {
                        return Err(LabError::ImmutableField(field.to_string()));
                    }
                }
            }
            Ok(tag.clone())
        }
        Some(_) => Err(LabError::field(
            field,
            FieldErrorKind::InvalidFormat,
            "expected a string",
        )),
    }
}

// ---------------------------------------------------------------------------
// Experiments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExperimentDraft {
    pub purpose: Option<String>,
    pub reactor_id: Option<EntityId>,
    pub analyzer_id: Option<EntityId>,
    pub processed_data_file_id: Option<EntityId>,
    pub notes: Option<String>,
    pub kind: ExperimentKind,
}

impl ExperimentDraft {
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

    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> Experiment {
        Experiment {
            id,
            purpose: self.purpose,
            reactor_id: self.reactor_id,
            analyzer_id: self.analyzer_id,
            processed_data_file_id: self.processed_data_file_id,
            notes: self.notes,
            kind: self.kind,
            created_at: now,
            updated_at: now,
        }
    }
}

fn experiment_kind_from(f: &mut Fields<'_>, tag: &str) -> ExperimentKind {
    match tag {
        "plasma" => ExperimentKind::Plasma {
            waveform_id: f.id("waveform_id").value(),
            power_w: f.non_negative_decimal("power_w").value(),
            duty_on_ms: f.non_negative_decimal("duty_on_ms").value(),
            duty_off_ms: f.non_negative_decimal("duty_off_ms").value(),
        },
        "photocatalysis" => ExperimentKind::Photocatalysis {
            wavelength_nm: f.non_negative_decimal("wavelength_nm").value(),
            power_w: f.non_negative_decimal("power_w").value(),
        },
        _ => ExperimentKind::Misc {
            description: f.string("description").value(),
        },
    }
}

pub fn experiment_create(payload: &Value) -> Result<ExperimentDraft> {
    let map = as_object(payload)?;
    let tag = discriminator(EntityKind::Experiment, map, Mode::Create, None)?;
    schema::check_shape(EntityKind::Experiment, Some(&tag), map, Mode::Create)?;

    let mut f = Fields::new(map);
    let purpose = f.string("purpose").value();
    let reactor_id = f.id("reactor_id").value();
    let analyzer_id = f.id("analyzer_id").value();
    let processed_data_file_id = f.id("processed_data_file_id").value();
    let notes = f.string("notes").value();
    let kind = experiment_kind_from(&mut f, &tag);
    f.finish()?;

    Ok(ExperimentDraft {
        purpose,
        reactor_id,
        analyzer_id,
        processed_data_file_id,
        notes,
        kind,
    })
}

pub fn experiment_update(current: &mut Experiment, payload: &Value) -> Result<()> {
    let map = as_object(payload)?;
    let tag = discriminator(
        EntityKind::Experiment,
        map,
        Mode::Update,
        Some(current.experiment_type()),
    )?;
    schema::check_shape(EntityKind::Experiment, Some(&tag), map, Mode::Update)?;

    let mut f = Fields::new(map);
    let purpose = f.string("purpose");
    let reactor_id = f.id("reactor_id");
    let analyzer_id = f.id("analyzer_id");
    let processed_data_file_id = f.id("processed_data_file_id");
    let notes = f.string("notes");

    let waveform_id = f.id("waveform_id");
    let power_w = f.non_negative_decimal("power_w");
    let duty_on_ms = f.non_negative_decimal("duty_on_ms");
    let duty_off_ms = f.non_negative_decimal("duty_off_ms");
    let wavelength_nm = f.non_negative_decimal("wavelength_nm");
    let description = f.string("description");
    f.finish()?;

    apply_opt(&mut current.purpose, purpose);
    apply_opt(&mut current.reactor_id, reactor_id);
    apply_opt(&mut current.analyzer_id, analyzer_id);
    apply_opt(&mut current.processed_data_file_id, processed_data_file_id);
    apply_opt(&mut current.notes, notes);

    match &mut current.kind {
        ExperimentKind::Plasma {
            waveform_id: w,
            power_w: p,
            duty_on_ms: on,
            duty_off_ms: off,
        } => {
            apply_opt(w, waveform_id);
            apply_opt(p, power_w);
            apply_opt(on, duty_on_ms);
            apply_opt(off, duty_off_ms);
        }
        ExperimentKind::Photocatalysis {
            wavelength_nm: wl,
            power_w: p,
        } => {
            apply_opt(wl, wavelength_nm);
            apply_opt(p, power_w);
        }
        ExperimentKind::Misc { description: d } => {
            apply_opt(d, description);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Analyzers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AnalyzerDraft {
    pub name: String,
    pub kind: AnalyzerKind,
}

impl AnalyzerDraft {
    pub fn into_record(self, id: EntityId, now: DateTime<Utc>) -> Analyzer {
        Analyzer {
            id,
            name: self.name,
            kind: self.kind,
            created_at: now,
            updated_at: now,
        }
    }
}

fn analyzer_kind_from(f: &mut Fields<'_>, tag: &str) -> AnalyzerKind {
    match tag {
        "ftir" => AnalyzerKind::Ftir {
            spectral_range: f.string("spectral_range").value(),
            resolution: f.non_negative_decimal("resolution").value(),
        },
        _ => AnalyzerKind::Oes {
            wavelength_range: f.string("wavelength_range").value(),
            integration_time_ms: f.non_negative_decimal("integration_time_ms").value(),
        },
    }
}

pub fn analyzer_create(payload: &Value) -> Result<AnalyzerDraft> {
    let map = as_object(payload)?;
    let tag = discriminator(EntityKind::Analyzer, map, Mode::Create, None)?;
    schema::check_shape(EntityKind::Analyzer, Some(&tag), map, Mode::Create)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value().unwrap_or_default();
    let kind = analyzer_kind_from(&mut f, &tag);
    f.finish()?;

    Ok(AnalyzerDraft { name, kind })
}

pub fn analyzer_update(current: &mut Analyzer, payload: &Value) -> Result<()> {
    let map = as_object(payload)?;
    let tag = discriminator(
        EntityKind::Analyzer,
        map,
        Mode::Update,
        Some(current.analyzer_type()),
    )?;
    schema::check_shape(EntityKind::Analyzer, Some(&tag), map, Mode::Update)?;

    let mut f = Fields::new(map);
    let name = f.string("name").value();
    let spectral_range = f.string("spectral_range");
    let resolution = f.non_negative_decimal("resolution");
    let wavelength_range = f.string("wavelength_range");
    let integration_time_ms = f.non_negative_decimal("integration_time_ms");
    f.finish()?;

    if let Some(v) = name {
        current.name = v;
    }
    match &mut current.kind {
        AnalyzerKind::Ftir {
            spectral_range: sr,
            resolution: r,
        } => {
            apply_opt(sr, spectral_range);
            apply_opt(r, resolution);
        }
        AnalyzerKind::Oes {
            wavelength_range: wr,
            integration_time_ms: it,
        } => {
            apply_opt(wr, wavelength_range);
            apply_opt(it, integration_time_ms);
        }
    }
    Ok(())
}

// Partial-update application: absent leaves, null clears, value sets.

fn apply_opt<T>(slot: &mut Option<T>, value: FieldValue<T>) {
    match value {
        FieldValue::Value(v) => *slot = Some(v),
        FieldValue::Null => *slot = None,
        FieldValue::Absent => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_selects_the_variant_field_set() {
        let draft = experiment_create(&json!({
            "experiment_type": "plasma",
            "purpose": "NH3 synthesis",
            "power_w": "12.5",
            "duty_on_ms": 10,
            "duty_off_ms": 90,
        }))
        .unwrap();
        match draft.kind {
            ExperimentKind::Plasma {
                power_w: Some(p), ..
            } => assert_eq!(p.to_string(), "12.5"),
            other => panic!("expected plasma variant, got {other:?}"),
        }
    }

    #[test]
    fn cross_variant_field_is_unknown_field() {
        let err = experiment_create(&json!({
            "experiment_type": "plasma",
            "wavelength_nm": "450",
        }))
        .unwrap_err();
        match err {
            LabError::UnknownField { field, variant } => {
                assert_eq!(field, "wavelength_nm");
                assert_eq!(variant, "photocatalysis");
            }
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[test]
    fn unknown_discriminator_is_rejected() {
        let err = experiment_create(&json!({
            "experiment_type": "electrolysis",
        }))
        .unwrap_err();
        assert!(matches!(err, LabError::UnknownVariant { .. }));
    }

    #[test]
    fn missing_discriminator_on_create_is_a_field_error() {
        let err = experiment_create(&json!({ "purpose": "test" })).unwrap_err();
        match err {
            LabError::Validation { errors } => {
                assert_eq!(errors[0].field, "experiment_type");
                assert_eq!(errors[0].kind, FieldErrorKind::Missing);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn discriminator_is_immutable_on_update() {
        let mut exp = experiment_create(&json!({ "experiment_type": "plasma" }))
            .unwrap()
            .into_record(EntityId(1), Utc::now());

        let err =
            experiment_update(&mut exp, &json!({ "experiment_type": "misc" })).unwrap_err();
        match err {
            LabError::ImmutableField(field) => assert_eq!(field, "experiment_type"),
            other => panic!("expected ImmutableField, got {other:?}"),
        }

        // Restating the current value is not a change.
        experiment_update(
            &mut exp,
            &json!({ "experiment_type": "plasma", "power_w": 30 }),
        )
        .unwrap();
        assert!(matches!(
            exp.kind,
            ExperimentKind::Plasma {
                power_w: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn update_without_discriminator_uses_the_stored_variant() {
        let mut exp = experiment_create(&json!({ "experiment_type": "photocatalysis" }))
            .unwrap()
            .into_record(EntityId(1), Utc::now());

        experiment_update(&mut exp, &json!({ "wavelength_nm": "365" })).unwrap();
        match exp.kind {
            ExperimentKind::Photocatalysis {
                wavelength_nm: Some(wl),
                ..
            } => assert_eq!(wl.to_string(), "365"),
            other => panic!("expected photocatalysis variant, got {other:?}"),
        }
    }

    #[test]
    fn analyzer_variants_are_disjoint() {
        let draft = analyzer_create(&json!({
            "analyzer_type": "ftir",
            "name": "Bruker Vertex 70",
            "spectral_range": "4000-400 cm-1",
        }))
        .unwrap();
        assert!(matches!(draft.kind, AnalyzerKind::Ftir { .. }));

        let err = analyzer_create(&json!({
            "analyzer_type": "ftir",
            "name": "Bruker Vertex 70",
            "integration_time_ms": 100,
        }))
        .unwrap_err();
        match err {
            LabError::UnknownField { variant, .. } => assert_eq!(variant, "oes"),
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }
}

//! Record builders shared by the crate's test modules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::model::{
    Catalyst, Chemical, Contaminant, EntityId, Experiment, ExperimentKind, Group, Method, Sample,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub(crate) fn catalyst(id: EntityId, now: DateTime<Utc>, name: &str, amount: &str) -> Catalyst {
    Catalyst {
        id,
        name: name.to_string(),
        description: None,
        yield_amount: dec(amount),
        remaining_amount: dec(amount),
        consumptions: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn sample(id: EntityId, now: DateTime<Utc>, name: &str, amount: &str) -> Sample {
    Sample {
        id,
        name: name.to_string(),
        description: None,
        yield_amount: dec(amount),
        remaining_amount: dec(amount),
        catalyst_id: None,
        support_id: None,
        method_id: None,
        consumptions: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn method(id: EntityId, now: DateTime<Utc>, name: &str) -> Method {
    Method {
        id,
        name: name.to_string(),
        description: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn chemical(id: EntityId, now: DateTime<Utc>, name: &str) -> Chemical {
    Chemical {
        id,
        name: name.to_string(),
        formula: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn contaminant(id: EntityId, now: DateTime<Utc>, name: &str) -> Contaminant {
    Contaminant {
        id,
        name: name.to_string(),
        formula: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn group(id: EntityId, now: DateTime<Utc>, name: &str) -> Group {
    Group {
        id,
        name: name.to_string(),
        description: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn experiment_plasma(id: EntityId, now: DateTime<Utc>) -> Experiment {
    Experiment {
        id,
        purpose: None,
        reactor_id: None,
        analyzer_id: None,
        processed_data_file_id: None,
        notes: None,
        kind: ExperimentKind::Plasma {
            waveform_id: None,
            power_w: None,
            duty_on_ms: None,
            duty_off_ms: None,
        },
        created_at: now,
        updated_at: now,
    }
}

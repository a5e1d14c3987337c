//! Inventory Ledger: the only sanctioned way to reduce
//! `remaining_amount`.
//!
//! `consume` runs the whole read-check-decrement inside one redb write
//! transaction. redb serializes write transactions, so two racing
//! consumes are ordered: the loser re-reads the already-decremented
//! value and fails with `InsufficientInventory` instead of driving the
//! counter negative. No lock beyond the storage engine's own writer
//! serialization is needed; [`crate::error::LabError::Conflict`]
//! remains in the taxonomy for callers layering optimistic retries
//! over a multi-writer backend.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{LabError, Result};
use crate::model::{Catalyst, Consumption, EntityId, Record, Sample};
use crate::store::LabGraph;

/// An entity tracking consumable material through a yield/remaining
/// pair and an append-only consumption trail.
pub trait Consumable: Record {
    fn yield_amount(&self) -> Decimal;
    fn remaining_amount(&self) -> Decimal;
    fn set_remaining_amount(&mut self, value: Decimal);
    fn push_consumption(&mut self, entry: Consumption);
}

impl Consumable for Catalyst {
    fn yield_amount(&self) -> Decimal {
        self.yield_amount
    }

    fn remaining_amount(&self) -> Decimal {
        self.remaining_amount
    }

    fn set_remaining_amount(&mut self, value: Decimal) {
        self.remaining_amount = value;
    }

    fn push_consumption(&mut self, entry: Consumption) {
        self.consumptions.push(entry);
    }
}

impl Consumable for Sample {
    fn yield_amount(&self) -> Decimal {
        self.yield_amount
    }

    fn remaining_amount(&self) -> Decimal {
        self.remaining_amount
    }

    fn set_remaining_amount(&mut self, value: Decimal) {
        self.remaining_amount = value;
    }

    fn push_consumption(&mut self, entry: Consumption) {
        self.consumptions.push(entry);
    }
}

impl LabGraph {
    /// Withdraw `amount` from an entity's remaining inventory.
    ///
    /// Fails with [`LabError::InvalidAmount`] for `amount <= 0` and
    /// with [`LabError::InsufficientInventory`] when the request
    /// exceeds what is left; the stored value is never clamped and is
    /// left untouched on failure. On success the decrement and the
    /// appended [`Consumption`] entry commit atomically and the
    /// updated entity is returned.
    pub fn consume<R: Consumable>(
        &self,
        id: EntityId,
        amount: Decimal,
        notes: Option<String>,
    ) -> Result<R> {
        if amount <= Decimal::ZERO {
            return Err(LabError::InvalidAmount(amount));
        }

        let txn = self.db.begin_write()?;
        let mut record: R =
            Self::read_row_in(&txn, id)?.ok_or_else(|| LabError::not_found(R::KIND, id))?;

        let remaining = record.remaining_amount();
        if amount > remaining {
            // Dropping the transaction rolls back; nothing was written.
            return Err(LabError::InsufficientInventory {
                requested: amount,
                remaining,
            });
        }

        let now = Utc::now();
        record.set_remaining_amount(remaining - amount);
        record.push_consumption(Consumption {
            amount,
            notes,
            at: now,
        });
        record.touch(now);
        Self::write_row_in(&txn, &record)?;
        txn.commit()?;

        debug!(kind = R::KIND.as_str(), %id, %amount, "consumed inventory");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use std::str::FromStr;
    use std::sync::Arc;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn consume_decrements_and_appends_audit_entry() {
        let graph = LabGraph::open_in_memory().unwrap();
        let cat = graph
            .create(|id, now| testutil::catalyst(id, now, "Ru/MgO", "5.0"))
            .unwrap();

        let after: Catalyst = graph
            .consume(cat.id, dec("1.5"), Some("XRD pellet".into()))
            .unwrap();
        assert_eq!(after.remaining_amount, dec("3.5"));
        assert_eq!(after.consumptions.len(), 1);
        assert_eq!(after.consumptions[0].notes.as_deref(), Some("XRD pellet"));

        let after: Catalyst = graph.consume(cat.id, dec("0.5"), None).unwrap();
        assert_eq!(after.remaining_amount, dec("3.0"));
        assert_eq!(after.consumptions.len(), 2, "audit trail appends in order");
        assert_eq!(after.consumptions[0].amount, dec("1.5"));
        assert_eq!(after.consumptions[1].amount, dec("0.5"));
    }

    #[test]
    fn overdraw_fails_and_leaves_remaining_unchanged() {
        let graph = LabGraph::open_in_memory().unwrap();
        let cat = graph
            .create(|id, now| testutil::catalyst(id, now, "Ru/MgO", "2.0"))
            .unwrap();

        let err = graph
            .consume::<Catalyst>(cat.id, dec("2.5"), None)
            .unwrap_err();
        match err {
            LabError::InsufficientInventory {
                requested,
                remaining,
            } => {
                assert_eq!(requested, dec("2.5"));
                assert_eq!(remaining, dec("2.0"));
            }
            other => panic!("expected InsufficientInventory, got {other:?}"),
        }

        let unchanged: Catalyst = graph.get(cat.id).unwrap();
        assert_eq!(unchanged.remaining_amount, dec("2.0"));
        assert!(unchanged.consumptions.is_empty());
    }

    #[test]
    fn non_positive_amounts_are_invalid() {
        let graph = LabGraph::open_in_memory().unwrap();
        let cat = graph
            .create(|id, now| testutil::catalyst(id, now, "Ru/MgO", "2.0"))
            .unwrap();

        let err = graph
            .consume::<Catalyst>(cat.id, Decimal::ZERO, None)
            .unwrap_err();
        assert!(matches!(err, LabError::InvalidAmount(_)));

        let err = graph
            .consume::<Catalyst>(cat.id, dec("-1"), None)
            .unwrap_err();
        assert!(matches!(err, LabError::InvalidAmount(_)));
    }

    #[test]
    fn samples_consume_through_the_same_ledger() {
        let graph = LabGraph::open_in_memory().unwrap();
        let sample = graph
            .create(|id, now| testutil::sample(id, now, "S-1", "1.0"))
            .unwrap();

        let after: Sample = graph.consume(sample.id, dec("0.4"), None).unwrap();
        assert_eq!(after.remaining_amount, dec("0.6"));
    }

    #[test]
    fn exact_depletion_reaches_zero_not_negative() {
        let graph = LabGraph::open_in_memory().unwrap();
        let cat = graph
            .create(|id, now| testutil::catalyst(id, now, "Ru/MgO", "0.3"))
            .unwrap();

        // Three exact decrements; floating point would drift here.
        for _ in 0..3 {
            graph.consume::<Catalyst>(cat.id, dec("0.1"), None).unwrap();
        }
        let done: Catalyst = graph.get(cat.id).unwrap();
        assert_eq!(done.remaining_amount, Decimal::ZERO);
        assert!(done.is_depleted());

        let err = graph
            .consume::<Catalyst>(cat.id, dec("0.1"), None)
            .unwrap_err();
        assert!(matches!(err, LabError::InsufficientInventory { .. }));
    }

    #[test]
    fn concurrent_consumes_never_drive_remaining_negative() {
        let graph = Arc::new(LabGraph::open_in_memory().unwrap());
        let cat = graph
            .create(|id, now| testutil::catalyst(id, now, "Ru/MgO", "1.0"))
            .unwrap();

        // Eight threads each try to take 0.3 g of a 1.0 g batch; at
        // most three can succeed.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let graph = Arc::clone(&graph);
                let id = cat.id;
                std::thread::spawn(move || graph.consume::<Catalyst>(id, dec("0.3"), None))
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => successes += 1,
                Err(LabError::InsufficientInventory { .. }) | Err(LabError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(successes <= 3, "1.0 g admits at most three 0.3 g draws");

        let final_state: Catalyst = graph.get(cat.id).unwrap();
        assert!(final_state.remaining_amount >= Decimal::ZERO);
        assert_eq!(
            final_state.remaining_amount,
            dec("1.0") - dec("0.3") * Decimal::from(successes),
        );
    }
}

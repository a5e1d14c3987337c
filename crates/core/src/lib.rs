//! Labgraph — embedded laboratory research graph engine.
//!
//! The core primitives are typed entity records (catalysts, samples,
//! characterizations, observations, experiments, and their reference
//! entities) and first-class relationship edges between them, stored
//! in an embedded `redb` database. The engine enforces the invariants
//! the research graph depends on:
//!
//! - inventory accounting: `0 <= remaining_amount <= yield_amount` at
//!   all times, decremented only through the atomic consume ledger;
//! - acyclic catalyst derivation chains, checked inside the same
//!   transaction as the link;
//! - many-to-many edges that carry their own scalar payload (a
//!   contaminant's ppm belongs to the experiment edge, not to either
//!   endpoint);
//! - polymorphic families (experiments, analyzers) validated per
//!   variant but read back as one tagged union;
//! - soft-deleted file metadata coexisting with
//!   restrict-or-cascade hard deletes elsewhere.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use labgraph::{LabGraph, Catalyst};
//! use labgraph::validate;
//! use serde_json::json;
//!
//! let graph = LabGraph::open("research.labgraph").unwrap();
//!
//! let draft = validate::catalyst_create(&json!({
//!     "name": "Ru/MgO",
//!     "yield_amount": "5.0",
//! }))
//! .unwrap();
//! let catalyst = graph
//!     .create(|id, now| draft.into_record(id, now))
//!     .unwrap();
//!
//! // Withdraw material through the ledger; the invariant holds.
//! let catalyst: Catalyst = graph
//!     .consume(catalyst.id, "0.25".parse().unwrap(), None)
//!     .unwrap();
//! assert!(!catalyst.is_depleted());
//! ```

pub mod error;
pub mod graph;
pub mod inventory;
pub mod model;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod validate;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{FieldError, FieldErrorKind, LabError, Result};
pub use graph::{DeletePolicy, Edge, Relation};
pub use inventory::Consumable;
pub use model::{
    depletion_epsilon, Analyzer, AnalyzerKind, Carrier, Catalyst, Characterization,
    CharacterizationType, Chemical, Consumption, Contaminant, EntityId, EntityKind, Experiment,
    ExperimentKind, File, Group, JsonMap, Method, Observation, Reactor, Record, Sample, Support,
    User, Waveform,
};
pub use store::LabGraph;

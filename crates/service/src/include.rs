//! Eager-loading include sets.
//!
//! Parsed from the comma-separated form the boundary uses
//! (`"method,input_catalysts"`). Unknown names are rejected rather
//! than ignored, so a typo cannot silently turn into a missing
//! relation. The include contract exists so an external cache can key
//! entries by `(family, id, include set)` without the engine knowing
//! about caching at all.

use std::collections::HashSet;

use labgraph::{FieldErrorKind, LabError, Result};

#[derive(Debug, Clone, Default)]
pub struct Include(HashSet<String>);

impl Include {
    /// The empty set: attach nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse a comma-separated relation list against the family's
    /// allowed names. Whitespace around names is tolerated; empty
    /// segments are ignored.
    pub fn parse(spec: &str, allowed: &[&str]) -> Result<Self> {
        let mut set = HashSet::new();
        for raw in spec.split(',') {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            if !allowed.contains(&name) {
                return Err(LabError::field(
                    "include",
                    FieldErrorKind::UnknownField,
                    format!("`{name}` is not an includable relation (allowed: {allowed:?})"),
                ));
            }
            set.insert(name.to_string());
        }
        Ok(Self(set))
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_names_and_whitespace() {
        let inc = Include::parse(" catalyst, method ", &["catalyst", "support", "method"]).unwrap();
        assert!(inc.has("catalyst"));
        assert!(inc.has("method"));
        assert!(!inc.has("support"));
    }

    #[test]
    fn unknown_name_is_a_validation_error() {
        let err = Include::parse("catalyst,typo", &["catalyst"]).unwrap_err();
        assert!(matches!(err, LabError::Validation { .. }));
    }

    #[test]
    fn empty_spec_is_the_empty_set() {
        let inc = Include::parse("", &["catalyst"]).unwrap();
        assert!(inc.is_empty());
    }
}

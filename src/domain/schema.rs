//! Snapshot of which fields each element carried when it was imported.
//!
//! The snapshot is an ordinary value: capture it once after import, keep it
//! next to the collection, and hand it to
//! [`Validator::validate`](crate::domain::Validator::validate) to be warned
//! about data that has since been lost.

use std::collections::{BTreeSet, HashMap};

use crate::domain::{CostElement, field};

/// Per-element set of non-default field names, keyed by external identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalSchema {
    fields: HashMap<String, BTreeSet<&'static str>>,
}

impl OriginalSchema {
    /// Records the non-default fields of every element.
    #[must_use]
    pub fn capture(elements: &[CostElement]) -> Self {
        let fields = elements
            .iter()
            .map(|element| (identity(element), field::non_default_fields(element)))
            .collect();
        Self { fields }
    }

    /// The fields recorded for an identity.
    #[must_use]
    pub fn fields_of(&self, identity: &str) -> Option<&BTreeSet<&'static str>> {
        self.fields.get(identity)
    }

    /// Fields that were set at capture time but are now at their default.
    ///
    /// Elements unknown to the snapshot (e.g. added after import) report
    /// nothing.
    #[must_use]
    pub fn missing_fields(&self, element: &CostElement) -> Vec<&'static str> {
        let Some(original) = self.fields.get(&identity(element)) else {
            return Vec::new();
        };
        let current = field::non_default_fields(element);
        original.difference(&current).copied().collect()
    }

    /// Number of elements captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The external identity of an element: `Id2` when present, otherwise the
/// group id and calculation id.
#[must_use]
pub fn identity(element: &CostElement) -> String {
    if element.id2.is_empty() {
        format!("{}#{}", element.id, element.calculation_id)
    } else {
        element.id2.clone()
    }
}

//! Domain model and engines for cost-estimate documents.
//!
//! This module contains the cost element model, the SPEC parameter codec,
//! the field registry, and the validation, WBS and undo/redo engines. Nothing
//! in here touches the filesystem.

/// The cost element model.
pub mod cost_element;
pub use cost_element::{CatalogAssignment, CostElement, ElementHandle, PropertiesSource};

mod config;
pub use config::Config;

pub mod field;
pub use field::{FieldError, FieldKind, FieldValue};

pub mod number;

pub mod properties;
pub use properties::{SpecKey, SpecParameters};

pub mod change_tracker;
pub use change_tracker::{CellChange, ChangeSet, ChangeTracker};

pub mod schema;
pub use schema::OriginalSchema;

pub mod validation;
pub use validation::{ValidationIssue, ValidationLimits, ValidationResult, Validator, validate};

pub mod wbs;
pub use wbs::{WbsStrategy, WbsTree};

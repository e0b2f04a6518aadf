//! Cost estimating for building services.
//!
//! Cost elements are read from `cefexport` interchange files, edited with
//! undo/redo, validated, and written back out.

pub mod domain;
pub use domain::{
    ChangeSet, ChangeTracker, Config, CostElement, ElementHandle, OriginalSchema, ValidationResult,
    Validator, WbsStrategy, WbsTree,
};

/// Interchange, export and session file formats.
pub mod storage;
pub use storage::{ExportError, ExportMode, ImportError};

pub mod project;
pub use project::{CellRef, ProjectError, ProjectManager, SelectionSource};

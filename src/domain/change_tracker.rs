//! # Undo/Redo
//!
//! Tracks field-level edits and replays them in either direction.
//!
//! - Every user action produces one [`ChangeSet`] of [`CellChange`]s
//! - Undo writes each change's old value and moves the set to the redo stack
//! - Redo writes the new values and moves the set back
//! - Recording a new set clears the redo stack
//! - Both stacks are bounded; the oldest entry is evicted first
//!
//! Replaying a value goes through the field registry, so it is coerced to the
//! field's declared type. A value that cannot be coerced, or whose element no
//! longer exists, is skipped and reported; the rest of the set still applies.

use std::collections::VecDeque;

use serde::Serialize;

use crate::domain::{
    CostElement, ElementHandle,
    field::{self, Access, FieldError, FieldValue},
};

/// Default number of undo (and redo) levels.
pub const DEFAULT_DEPTH: usize = 50;

/// One field edit: the target cell plus the value before and after.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellChange {
    /// The element that owns the field.
    pub element: ElementHandle,
    /// Registry name of the field.
    pub field: String,
    /// Value before the edit.
    pub old: FieldValue,
    /// Value after the edit.
    pub new: FieldValue,
}

/// The cell changes of one logical user action.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    changes: Vec<CellChange>,
    description: Option<String>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a human-readable description, e.g. "Paste".
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a change.
    pub fn push(&mut self, change: CellChange) {
        self.changes.push(change);
    }

    /// Writes `value` to a field and records the change.
    ///
    /// Nothing is recorded if the write fails or leaves the value unchanged.
    /// Writing a SPEC mirror also records the regenerated `Properties` blob,
    /// after the mirror, so that undo restores the original blob verbatim.
    ///
    /// A cell written more than once in the same set is kept as a single
    /// change holding the first old value and the last new value.
    ///
    /// # Errors
    ///
    /// Propagates registry errors (unknown field, derived field, coercion).
    pub fn apply(
        &mut self,
        element: &mut CostElement,
        field_name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), FieldError> {
        let descriptor = field::lookup(field_name)
            .ok_or_else(|| FieldError::UnknownField(field_name.to_string()))?;
        let blob_before = (descriptor.access == Access::SpecMirror)
            .then(|| FieldValue::Text(element.properties().to_string()));

        let old = descriptor.set(element, value.into())?;
        let new = descriptor.get(element);
        self.merge(CellChange {
            element: element.handle(),
            field: descriptor.name.to_string(),
            old,
            new,
        });

        if let Some(old) = blob_before {
            self.merge(CellChange {
                element: element.handle(),
                field: "Properties".to_string(),
                old,
                new: FieldValue::Text(element.properties().to_string()),
            });
        }
        Ok(())
    }

    // An earlier change to the same cell is folded into this one, which moves
    // to the end so replay order still follows the most recent write.
    fn merge(&mut self, mut change: CellChange) {
        if let Some(index) = self
            .changes
            .iter()
            .position(|earlier| earlier.element == change.element && earlier.field == change.field)
        {
            change.old = self.changes.remove(index).old;
        }
        if change.old != change.new {
            self.changes.push(change);
        }
    }

    /// The recorded changes, in the order they were made.
    #[must_use]
    pub fn changes(&self) -> &[CellChange] {
        &self.changes
    }

    /// The description, if one was given.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Number of recorded changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// A cell change that could not be replayed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChangeFailure {
    /// The owning element is no longer in the collection.
    #[error("element {element} no longer exists; {field} was not restored")]
    MissingElement {
        /// Handle of the missing element.
        element: ElementHandle,
        /// Field that was skipped.
        field: String,
    },
    /// The field rejected the value.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// The result of an undo or redo.
#[derive(Debug)]
pub struct Replay<'a> {
    /// The change set that was replayed.
    pub change_set: &'a ChangeSet,
    /// Changes that were skipped.
    pub failures: Vec<ChangeFailure>,
}

impl Replay<'_> {
    /// Whether every change in the set was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Undo,
    Redo,
}

/// Bounded undo and redo stacks of [`ChangeSet`]s.
#[derive(Debug)]
pub struct ChangeTracker {
    undo_stack: VecDeque<ChangeSet>,
    redo_stack: VecDeque<ChangeSet>,
    depth: usize,
}

impl ChangeTracker {
    /// Creates a tracker with [`DEFAULT_DEPTH`] levels.
    #[must_use]
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_DEPTH)
    }

    /// Creates a tracker holding at most `depth` entries per stack.
    ///
    /// A depth of zero is treated as one.
    #[must_use]
    pub fn with_depth(depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            depth: depth.max(1),
        }
    }

    /// Records a change set. Empty sets are ignored; otherwise the redo stack
    /// is cleared.
    pub fn record(&mut self, change_set: ChangeSet) {
        if change_set.is_empty() {
            return;
        }
        push_bounded(&mut self.undo_stack, change_set, self.depth);
        self.redo_stack.clear();
    }

    /// Reverts the most recent change set by writing every old value.
    ///
    /// Returns `None` when there is nothing to undo.
    pub fn undo(&mut self, elements: &mut [CostElement]) -> Option<Replay<'_>> {
        let change_set = self.undo_stack.pop_back()?;
        let failures = replay(&change_set, elements, Direction::Undo);
        push_bounded(&mut self.redo_stack, change_set, self.depth);
        let change_set = self.redo_stack.back()?;
        Some(Replay {
            change_set,
            failures,
        })
    }

    /// Re-applies the most recently undone change set by writing every new
    /// value.
    ///
    /// Returns `None` when there is nothing to redo.
    pub fn redo(&mut self, elements: &mut [CostElement]) -> Option<Replay<'_>> {
        let change_set = self.redo_stack.pop_back()?;
        let failures = replay(&change_set, elements, Direction::Redo);
        push_bounded(&mut self.undo_stack, change_set, self.depth);
        let change_set = self.undo_stack.back()?;
        Some(Replay {
            change_set,
            failures,
        })
    }

    /// Whether there is anything to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Whether there is anything to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo levels available.
    #[must_use]
    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redo levels available.
    #[must_use]
    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Description of the next undo, if it has one.
    #[must_use]
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().and_then(ChangeSet::description)
    }

    /// Description of the next redo, if it has one.
    #[must_use]
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().and_then(ChangeSet::description)
    }

    /// Drops all history.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded(stack: &mut VecDeque<ChangeSet>, change_set: ChangeSet, depth: usize) {
    stack.push_back(change_set);
    while stack.len() > depth {
        stack.pop_front();
    }
}

fn replay(
    change_set: &ChangeSet,
    elements: &mut [CostElement],
    direction: Direction,
) -> Vec<ChangeFailure> {
    let mut failures = Vec::new();

    for change in &change_set.changes {
        let Some(element) = elements
            .iter_mut()
            .find(|element| element.handle() == change.element)
        else {
            tracing::warn!(field = %change.field, "skipping change for a removed element");
            failures.push(ChangeFailure::MissingElement {
                element: change.element,
                field: change.field.clone(),
            });
            continue;
        };

        let value = match direction {
            Direction::Undo => change.old.clone(),
            Direction::Redo => change.new.clone(),
        };

        if let Err(error) = field::set(element, &change.field, value) {
            tracing::warn!("skipping change: {error}");
            failures.push(error.into());
        }
    }

    failures
}

//! The editing session around one estimate.
//!
//! A [`ProjectManager`] owns the element collection together with everything
//! that has to stay in step with it: the undo history, the field snapshot
//! taken at import, and the configuration. All edits go through it so that
//! each user action becomes exactly one undoable [`ChangeSet`].

use std::path::Path;

use tracing::instrument;

use crate::{
    domain::{
        ChangeSet, ChangeTracker, Config, CostElement, ElementHandle, FieldError, FieldValue,
        OriginalSchema, ValidationIssue, ValidationResult, Validator, WbsStrategy, WbsTree,
        change_tracker::Replay,
    },
    storage::{self, DocumentKind, ExportError, ExportMode, ImportError},
};

/// One selected cell: an element and a registry field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRef {
    /// The element.
    pub element: ElementHandle,
    /// Registry name of the field.
    pub field: String,
}

impl CellRef {
    /// Creates a cell reference.
    pub fn new(element: ElementHandle, field: impl Into<String>) -> Self {
        Self {
            element,
            field: field.into(),
        }
    }
}

/// Supplies the cells a paste or clear applies to, in selection order.
///
/// Implemented by whatever front end owns the selection; the project never
/// inspects it directly.
pub trait SelectionSource {
    /// The selected cells.
    fn selected_cells(&self) -> Vec<CellRef>;
}

impl SelectionSource for [CellRef] {
    fn selected_cells(&self) -> Vec<CellRef> {
        self.to_vec()
    }
}

impl SelectionSource for Vec<CellRef> {
    fn selected_cells(&self) -> Vec<CellRef> {
        self.clone()
    }
}

/// Errors raised by project operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// A document could not be read.
    #[error(transparent)]
    Import(#[from] ImportError),

    /// A document could not be written.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Export was refused because validation found errors.
    #[error("export blocked by {} validation error(s)", .errors.len())]
    ValidationFailed {
        /// The blocking findings.
        errors: Vec<ValidationIssue>,
    },

    /// No element has this handle.
    #[error("no element with handle {0}")]
    UnknownElement(ElementHandle),

    /// A field rejected a write.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Outcome of a multi-cell edit.
#[derive(Debug, Default)]
pub struct EditReport {
    /// Number of cells whose value changed.
    pub changed: usize,
    /// Cells that were left alone, with the reason.
    pub skipped: Vec<(CellRef, ProjectError)>,
}

/// Owns an element collection and its undo history.
#[derive(Debug)]
pub struct ProjectManager {
    elements: Vec<CostElement>,
    tracker: ChangeTracker,
    schema: Option<OriginalSchema>,
    config: Config,
}

impl Default for ProjectManager {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ProjectManager {
    /// Creates an empty project.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            elements: Vec::new(),
            tracker: ChangeTracker::with_depth(config.undo_depth()),
            schema: None,
            config,
        }
    }

    /// Creates a project around an existing collection. No field snapshot
    /// is taken.
    #[must_use]
    pub fn with_elements(config: Config, elements: Vec<CostElement>) -> Self {
        Self {
            elements,
            ..Self::new(config)
        }
    }

    /// Opens an interchange file or a session, whichever `path` holds.
    ///
    /// A field snapshot is taken for interchange files only.
    ///
    /// # Errors
    ///
    /// Fails if the document cannot be read.
    pub fn open(path: &Path, config: Config) -> Result<Self, ProjectError> {
        let (kind, elements) = storage::load(path)?;
        let mut project = Self::with_elements(config, elements);
        if kind == DocumentKind::Interchange {
            project.schema = Some(OriginalSchema::capture(&project.elements));
        }
        Ok(project)
    }

    /// Replaces the collection with the contents of an interchange file.
    ///
    /// Clears the undo history and takes a fresh field snapshot.
    ///
    /// # Errors
    ///
    /// Fails if the document cannot be read; the project is left unchanged.
    pub fn import_document(&mut self, path: &Path) -> Result<(), ProjectError> {
        let elements = storage::import_document(path)?;
        self.schema = Some(OriginalSchema::capture(&elements));
        self.elements = elements;
        self.tracker.clear();
        Ok(())
    }

    /// Validates and writes the collection.
    ///
    /// Errors block the export unless `force` is set. The validation result
    /// (including any warnings) is returned on success.
    ///
    /// # Errors
    ///
    /// Fails with [`ProjectError::ValidationFailed`] when blocked, or if the
    /// document cannot be written.
    #[instrument(skip(self))]
    pub fn export_document(
        &self,
        path: &Path,
        mode: ExportMode,
        force: bool,
    ) -> Result<ValidationResult, ProjectError> {
        let result = self.validate();
        if !result.is_valid() {
            if !force {
                return Err(ProjectError::ValidationFailed {
                    errors: result.errors,
                });
            }
            tracing::warn!(
                "Exporting despite {} validation error(s)",
                result.errors.len()
            );
        }
        storage::export_document(&self.elements, path, mode)?;
        Ok(result)
    }

    /// Validates the collection against the configured limits and the import
    /// snapshot.
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        Validator::new(self.config.validation_limits()).validate(&self.elements, self.schema.as_ref())
    }

    /// Saves the collection as a session.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn save_session(&self, path: &Path) -> Result<(), ProjectError> {
        storage::save_session(&self.elements, path)?;
        Ok(())
    }

    /// Replaces the collection with a saved session. The undo history is
    /// cleared and the field snapshot dropped.
    ///
    /// # Errors
    ///
    /// Fails if the session cannot be read; the project is left unchanged.
    pub fn load_session(&mut self, path: &Path) -> Result<(), ProjectError> {
        self.elements = storage::load_session(path)?;
        self.schema = None;
        self.tracker.clear();
        Ok(())
    }

    /// The elements, in display order.
    #[must_use]
    pub fn elements(&self) -> &[CostElement] {
        &self.elements
    }

    /// The element with the given handle.
    #[must_use]
    pub fn element(&self, handle: ElementHandle) -> Option<&CostElement> {
        self.elements.iter().find(|element| element.handle() == handle)
    }

    fn position(&self, handle: ElementHandle) -> Result<usize, ProjectError> {
        self.elements
            .iter()
            .position(|element| element.handle() == handle)
            .ok_or(ProjectError::UnknownElement(handle))
    }

    /// The field snapshot taken at import, if any.
    #[must_use]
    pub const fn schema(&self) -> Option<&OriginalSchema> {
        self.schema.as_ref()
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Writes one field and records it as an undoable action.
    ///
    /// # Errors
    ///
    /// Fails if the element does not exist or the field rejects the value.
    pub fn edit(
        &mut self,
        handle: ElementHandle,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), ProjectError> {
        let position = self.position(handle)?;
        let mut change_set = ChangeSet::new().with_description(format!("Edit {field}"));
        change_set.apply(&mut self.elements[position], field, value)?;
        self.tracker.record(change_set);
        Ok(())
    }

    /// Pastes `values` into the selected cells as one undoable action.
    ///
    /// A single value fills every selected cell. Otherwise values are paired
    /// with cells in selection order; surplus cells or values are ignored.
    /// Cells that reject their value are skipped and reported.
    pub fn paste<S>(&mut self, selection: &S, values: &[String]) -> EditReport
    where
        S: SelectionSource + ?Sized,
    {
        let cells = selection.selected_cells();
        let pairs: Vec<(CellRef, &str)> = match values {
            [] => Vec::new(),
            [value] => cells.into_iter().map(|cell| (cell, value.as_str())).collect(),
            _ => cells
                .into_iter()
                .zip(values.iter().map(String::as_str))
                .collect(),
        };

        self.apply_to_cells(
            "Paste",
            pairs
                .into_iter()
                .map(|(cell, value)| (cell, FieldValue::Text(value.to_string()))),
        )
    }

    /// Resets the selected cells to their defaults as one undoable action.
    pub fn clear<S>(&mut self, selection: &S) -> EditReport
    where
        S: SelectionSource + ?Sized,
    {
        let cells = selection.selected_cells();
        let mut defaults = Vec::with_capacity(cells.len());
        let mut report = EditReport::default();
        for cell in cells {
            match crate::domain::field::lookup(&cell.field) {
                Some(descriptor) => defaults.push((cell, descriptor.default_value())),
                None => {
                    let error = FieldError::UnknownField(cell.field.clone());
                    report.skipped.push((cell, error.into()));
                }
            }
        }

        let mut applied = self.apply_to_cells("Clear", defaults);
        applied.skipped.append(&mut report.skipped);
        applied
    }

    fn apply_to_cells(
        &mut self,
        description: &str,
        cells: impl IntoIterator<Item = (CellRef, FieldValue)>,
    ) -> EditReport {
        let mut change_set = ChangeSet::new().with_description(description);
        let mut report = EditReport::default();

        for (cell, value) in cells {
            let outcome = self.position(cell.element).and_then(|position| {
                change_set
                    .apply(&mut self.elements[position], &cell.field, value)
                    .map_err(ProjectError::from)
            });
            if let Err(error) = outcome {
                tracing::warn!("{description}: skipping {}: {error}", cell.field);
                report.skipped.push((cell, error));
            }
        }

        report.changed = change_set.len();
        self.tracker.record(change_set);
        report
    }

    /// Reverts the most recent action. Returns `None` when there is nothing
    /// to undo.
    pub fn undo(&mut self) -> Option<Replay<'_>> {
        self.tracker.undo(&mut self.elements)
    }

    /// Re-applies the most recently undone action. Returns `None` when there
    /// is nothing to redo.
    pub fn redo(&mut self) -> Option<Replay<'_>> {
        self.tracker.redo(&mut self.elements)
    }

    /// The undo history.
    #[must_use]
    pub const fn history(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Appends a new, empty element.
    ///
    /// It gets the next free numeric `Id` and a fresh `Id2`. Adding, cloning
    /// and removing elements are not part of the undo history.
    pub fn add_element(&mut self) -> ElementHandle {
        let next_id = self
            .elements
            .iter()
            .map(CostElement::numeric_id)
            .max()
            .unwrap_or(0)
            + 1;
        let mut element = CostElement::new();
        element.id = next_id.to_string();
        element.id2 = uuid::Uuid::new_v4().to_string();
        let handle = element.handle();
        tracing::debug!("Added element {}", element.id);
        self.elements.push(element);
        handle
    }

    /// Inserts a copy of an element directly after it.
    ///
    /// # Errors
    ///
    /// Fails if the element does not exist.
    pub fn clone_element(&mut self, handle: ElementHandle) -> Result<ElementHandle, ProjectError> {
        let position = self.position(handle)?;
        let copy = self.elements[position].duplicate();
        let copy_handle = copy.handle();
        self.elements.insert(position + 1, copy);
        Ok(copy_handle)
    }

    /// Removes an element and returns it.
    ///
    /// Recorded changes that refer to it are skipped on undo/redo.
    ///
    /// # Errors
    ///
    /// Fails if the element does not exist.
    pub fn remove_element(&mut self, handle: ElementHandle) -> Result<CostElement, ProjectError> {
        let position = self.position(handle)?;
        Ok(self.elements.remove(position))
    }

    /// The catalog tree, using the configured strategy.
    #[must_use]
    pub fn wbs_tree(&self) -> WbsTree {
        self.wbs_tree_with(self.config.wbs_strategy)
    }

    /// The catalog tree, using `strategy`.
    #[must_use]
    pub fn wbs_tree_with(&self, strategy: WbsStrategy) -> WbsTree {
        WbsTree::build(&self.elements, strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with(count: usize) -> (ProjectManager, Vec<ElementHandle>) {
        let mut project = ProjectManager::default();
        let handles = (0..count).map(|_| project.add_element()).collect();
        (project, handles)
    }

    #[test]
    fn add_element_assigns_next_id() {
        let (project, handles) = project_with(2);
        let ids: Vec<_> = project.elements().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(!project.element(handles[0]).unwrap().id2.is_empty());
    }

    #[test]
    fn edit_undo_redo() {
        let (mut project, handles) = project_with(1);
        let handle = handles[0];

        project.edit(handle, "Up", 10.0).unwrap();
        project.edit(handle, "Up", 20.0).unwrap();
        project.edit(handle, "Up", 30.0).unwrap();

        project.undo().unwrap();
        assert_eq!(project.element(handle).unwrap().up, 20.0);
        project.undo().unwrap();
        assert_eq!(project.element(handle).unwrap().up, 10.0);
        project.redo().unwrap();
        assert_eq!(project.element(handle).unwrap().up, 20.0);

        project.undo().unwrap();
        project.edit(handle, "Note", "new edit").unwrap();
        assert!(project.redo().is_none());
    }

    #[test]
    fn edit_rejects_unknown_elements_and_fields() {
        let (mut project, handles) = project_with(1);
        assert!(matches!(
            project.edit(ElementHandle::new(), "Up", 1.0),
            Err(ProjectError::UnknownElement(_))
        ));
        assert!(matches!(
            project.edit(handles[0], "UpResult", 1.0),
            Err(ProjectError::Field(FieldError::ReadOnly("UpResult")))
        ));
        assert!(!project.history().can_undo());
    }

    #[test]
    fn paste_single_value_fills_selection_as_one_action() {
        let (mut project, handles) = project_with(3);
        let selection: Vec<CellRef> = handles.iter().map(|h| CellRef::new(*h, "Qu")).collect();

        let report = project.paste(&selection, &["m".to_string()]);

        assert_eq!(report.changed, 3);
        assert!(project.elements().iter().all(|e| e.qu == "m"));
        assert_eq!(project.history().undo_levels(), 1);

        project.undo().unwrap();
        assert!(project.elements().iter().all(|e| e.qu.is_empty()));
    }

    #[test]
    fn paste_pairs_values_and_skips_bad_cells() {
        let (mut project, handles) = project_with(2);
        let selection = vec![
            CellRef::new(handles[0], "Up"),
            CellRef::new(handles[1], "Up"),
        ];

        let report = project.paste(&selection, &["12,5".to_string(), "abc".to_string()]);

        assert_eq!(report.changed, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(project.element(handles[0]).unwrap().up, 12.5);
        assert_eq!(project.element(handles[1]).unwrap().up, 0.0);
    }

    #[test]
    fn clear_resets_and_is_undoable() {
        let (mut project, handles) = project_with(1);
        let handle = handles[0];
        project.edit(handle, "Text", "Pipe").unwrap();
        project.edit(handle, "Up", 4.0).unwrap();

        let selection = [CellRef::new(handle, "Text"), CellRef::new(handle, "Up")];
        let report = project.clear(&selection[..]);
        assert_eq!(report.changed, 2);
        assert!(project.element(handle).unwrap().text.is_empty());

        project.undo().unwrap();
        let element = project.element(handle).unwrap();
        assert_eq!(element.text, "Pipe");
        assert_eq!(element.up, 4.0);
    }

    #[test]
    fn clone_inserts_copy_after_source() {
        let (mut project, handles) = project_with(2);
        project.edit(handles[0], "Name", "Valve").unwrap();

        let copy = project.clone_element(handles[0]).unwrap();

        let elements = project.elements();
        assert_eq!(elements[1].handle(), copy);
        assert_eq!(elements[1].name, "Valve");
        assert_ne!(elements[1].id2, elements[0].id2);
    }

    #[test]
    fn undo_after_removal_reports_missing_element() {
        let (mut project, handles) = project_with(1);
        project.edit(handles[0], "Up", 3.0).unwrap();
        project.remove_element(handles[0]).unwrap();

        let replay = project.undo().unwrap();
        assert!(!replay.is_complete());
    }

    #[test]
    fn export_is_gated_by_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.xml");
        let (mut project, handles) = project_with(1);
        project.edit(handles[0], "QtyResult", -1.0).unwrap();

        let blocked = project.export_document(&path, ExportMode::Cef, false);
        assert!(matches!(blocked, Err(ProjectError::ValidationFailed { .. })));
        assert!(!path.exists());

        let forced = project.export_document(&path, ExportMode::Cef, true).unwrap();
        assert!(!forced.is_valid());
        assert!(path.exists());
    }

    #[test]
    fn import_takes_a_snapshot_and_clears_history() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("estimate.xml");
        let (mut project, handles) = project_with(1);
        project.edit(handles[0], "Name", "Valve").unwrap();
        project.edit(handles[0], "Text", "Ball valve").unwrap();
        project.edit(handles[0], "Note", "check").unwrap();
        project.export_document(&path, ExportMode::Cef, true).unwrap();

        project.import_document(&path).unwrap();
        assert!(!project.history().can_undo());
        assert!(project.schema().is_some());

        let handle = project.elements()[0].handle();
        project.edit(handle, "Note", "").unwrap();
        let result = project.validate();
        assert!(result.warnings.iter().any(|w| w.field == Some("Note")));
    }

    #[test]
    fn session_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("work.session");
        let (mut project, handles) = project_with(2);
        project.edit(handles[1], "Up", 7.5).unwrap();
        project.save_session(&path).unwrap();

        let reopened = ProjectManager::open(&path, Config::default()).unwrap();
        assert_eq!(reopened.elements().len(), 2);
        assert_eq!(reopened.elements()[1].up, 7.5);
        assert!(reopened.schema().is_none());
    }
}

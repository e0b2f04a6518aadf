//! Session files: the working collection saved as-is.
//!
//! Unlike the interchange format there is no grouping: each element is one
//! `<Element>` with one child per stored registry field, so whatever the
//! registry can read it can restore. Derived fields and the SPEC mirrors are
//! not written; the mirrors are decoded again from `Properties`.

use crate::{
    domain::{
        CatalogAssignment, CostElement,
        field::{self, Access, FIELDS, FieldValue},
    },
    storage::xml::{self, WriteError, XmlError, XmlNode, XmlWriter},
};

/// Root element name.
pub const ROOT: &str = "NovaAvaProject";

/// Format version written to the root element.
pub const VERSION: &str = "1";

/// Serializes the working collection.
///
/// # Errors
///
/// Fails if the XML writer reports an error.
pub fn write(elements: &[CostElement]) -> Result<String, WriteError> {
    let mut writer = XmlWriter::new()?;
    writer.start(ROOT, &[("version", VERSION)])?;
    writer.start("Elements", &[])?;

    for element in elements {
        writer.start("Element", &[])?;

        for field in FIELDS.iter().filter(|field| field.access == Access::Editable) {
            writer.leaf(field.name, &field.get(element).to_string())?;
        }

        if !element.catalog_assignments.is_empty() {
            writer.start("CatalogAssignments", &[])?;
            for assignment in &element.catalog_assignments {
                writer.start("CatalogAssignment", &[])?;
                writer.leaf("CatalogName", &assignment.catalog_name)?;
                writer.leaf("CatalogType", &assignment.catalog_type)?;
                writer.leaf("Name", &assignment.name)?;
                writer.leaf("Number", &assignment.number)?;
                writer.leaf("Reference", &assignment.reference)?;
                writer.end("CatalogAssignment")?;
            }
            writer.end("CatalogAssignments")?;
        }

        if !element.additional_data.is_empty() {
            writer.start("AdditionalData", &[])?;
            for (key, value) in &element.additional_data {
                writer.leaf_with("Entry", &[("Key", key.as_str())], value)?;
            }
            writer.end("AdditionalData")?;
        }

        writer.end("Element")?;
    }

    writer.end("Elements")?;
    writer.end(ROOT)?;
    Ok(writer.finish())
}

/// Parses a session document.
///
/// # Errors
///
/// Fails only if the text is not well-formed XML. Values that do not fit
/// their field are skipped with a warning.
pub fn read(text: &str) -> Result<Vec<CostElement>, XmlError> {
    let root = xml::parse(text)?;
    Ok(read_document(&root))
}

/// Restores the `<Element>` nodes under `root`.
#[must_use]
pub fn read_document(root: &XmlNode) -> Vec<CostElement> {
    let container = root.child("Elements").unwrap_or(root);
    container.children_named("Element").map(read_element).collect()
}

fn read_element(node: &XmlNode) -> CostElement {
    let mut element = CostElement::new();
    let mut additional_data = None;

    for child in &node.children {
        if child.is("CatalogAssignments") {
            // restored verbatim; the flat catalog fields were saved separately
            element.catalog_assignments = child
                .children_named("CatalogAssignment")
                .map(|node| CatalogAssignment {
                    catalog_name: node.child_text("CatalogName").to_string(),
                    catalog_type: node.child_text("CatalogType").to_string(),
                    name: node.child_text("Name").to_string(),
                    number: node.child_text("Number").to_string(),
                    reference: node.child_text("Reference").to_string(),
                })
                .collect();
            continue;
        }
        if child.is("AdditionalData") {
            additional_data = Some(child);
            continue;
        }

        let Some(descriptor) = field::lookup(&child.name) else {
            tracing::debug!("Ignoring unknown session field <{}>", child.name);
            continue;
        };
        if descriptor.access != Access::Editable {
            continue;
        }
        if let Err(e) = descriptor.set(&mut element, FieldValue::Text(child.text().to_string())) {
            tracing::warn!("Skipping session value: {e}");
        }
    }

    // after Properties, which replaces the `spec:` entries
    if let Some(block) = additional_data {
        for entry in block.children_named("Entry") {
            if let Some(key) = entry.attribute("Key") {
                element
                    .additional_data
                    .insert(key.to_string(), entry.text().to_string());
            }
        }
    }

    element
}

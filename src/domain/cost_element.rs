use std::{collections::BTreeMap, fmt};

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::properties::{self, SpecKey, SpecParameters};

/// Prefix under which unrecognised SPEC blob keys are kept in
/// [`CostElement::additional_data`].
pub const SPEC_KEY_PREFIX: &str = "spec:";

/// Prefix under which unrecognised calculation-level interchange fields are
/// kept in [`CostElement::additional_data`].
pub const CALC_KEY_PREFIX: &str = "calc/";

/// A stable, in-memory handle for one element.
///
/// Handles are never written to the interchange format. They let change
/// records and selections point at an element independently of its position
/// in the collection, which shifts as elements are added and removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementHandle(Uuid);

impl ElementHandle {
    /// Mints a fresh handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ElementHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A link from a cost element to an entry in an external reference catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogAssignment {
    /// Name of the catalog.
    pub catalog_name: String,
    /// Type of the catalog (the top level of the WBS view).
    pub catalog_type: String,
    /// Name of the catalog entry.
    pub name: String,
    /// Number of the catalog entry.
    pub number: String,
    /// Free-form reference.
    pub reference: String,
}

impl CatalogAssignment {
    /// Whether every field is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.catalog_name.is_empty()
            && self.catalog_type.is_empty()
            && self.name.is_empty()
            && self.number.is_empty()
            && self.reference.is_empty()
    }
}

/// Which side of the `Properties` / SPEC mirror pair is authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PropertiesSource {
    /// The serialized blob was written last (e.g. by import); the mirrors are
    /// decoded from it.
    #[default]
    Blob,
    /// A mirror field was edited; the blob was regenerated from the mirrors.
    Mirrors,
}

/// One priced calculation line merged with the header of the cost element it
/// belongs to.
///
/// All calculations of one external cost element share the same [`id`] and
/// header fields. Exactly one of them is normally the root
/// (`parent_calc_id == 0`).
///
/// [`id`]: CostElement::id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostElement {
    #[serde(skip)]
    pub(crate) handle: ElementHandle,

    // identity
    /// Identity of the cost element group. Shared by all its calculations.
    pub id: String,
    /// Globally unique identity of the calculation.
    pub id2: String,
    /// Mirrors the calculation's id field.
    pub ident: String,
    /// Id of the calculation within the group.
    pub calculation_id: i64,
    /// Id of the parent calculation; `0` marks the root calculation.
    pub parent_calc_id: i64,
    /// Sibling order among the calculations of the group.
    pub order: i64,
    /// External BIM GUID.
    pub id5: String,
    /// External BIM GUID of the type object.
    pub id6: String,

    // header
    /// Element type.
    pub element_type: String,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    properties: String,
    properties_source: PropertiesSource,
    spec: SpecParameters,
    /// Filter expression.
    pub filter: String,
    /// Comma-separated ids of child elements.
    pub children: String,
    /// Openings.
    pub openings: String,
    /// Creation timestamp.
    pub created: Option<NaiveDateTime>,
    /// Id of the parent element.
    pub parent: String,
    /// IFC entity type.
    pub ifc_type: String,
    /// Material, expected when `ifc_type` is set.
    pub material: String,
    /// Dimension, expected when `ifc_type` is set.
    pub dimension: String,

    // catalog (denormalised from assignment[0])
    /// Name of the first catalog assignment.
    pub catalog_name: String,
    /// Type of the first catalog assignment.
    pub catalog_type: String,
    /// Entry name of the first catalog assignment.
    pub catalog_item_name: String,
    /// Entry number of the first catalog assignment.
    pub catalog_number: String,
    /// Reference of the first catalog assignment.
    pub catalog_reference: String,
    /// All catalog assignments, in document order.
    pub catalog_assignments: Vec<CatalogAssignment>,

    // calculation
    /// BIM key.
    pub bim_key: String,
    /// Short text.
    pub text: String,
    /// Long text.
    pub long_text: String,
    /// Quantity as entered. May be a formula.
    pub qty: String,
    /// Evaluated quantity.
    pub qty_result: f64,
    /// Quantity unit.
    pub qu: String,
    /// Unit price.
    pub up: f64,
    /// Unit price breakdown.
    pub up_bkdn: String,
    /// Unit price components 1 to 6.
    pub up_comp: [f64; 6],
    /// Time per quantity unit.
    pub time_qu: f64,
    /// Item total.
    pub it: f64,
    /// VAT rate (percent).
    pub vat: f64,
    /// VAT amount.
    pub vat_value: f64,
    /// Tax rate (percent).
    pub tax: f64,
    /// Tax amount.
    pub tax_value: f64,
    /// Gross item total.
    pub it_gross: f64,
    /// Line sum.
    pub sum: f64,
    /// Formula marker; when set, `qty` is a formula.
    pub vob: String,
    /// Formula.
    pub vob_formula: String,
    /// Formula condition.
    pub vob_condition: String,
    /// Formula type.
    pub vob_type: String,
    /// Formula factor.
    pub vob_factor: f64,
    /// Ordinal number.
    pub on: String,
    /// Additional text.
    pub additional: String,
    /// Percentage of the total.
    pub perc_total: f64,
    /// Whether the line is marked.
    pub marked: bool,
    /// Percentage of the marked total.
    pub perc_marked: f64,
    /// Procurement unit.
    pub proc_unit: String,
    /// Display colour.
    pub color: String,
    /// Note.
    pub note: String,

    /// Fields this engine does not model, preserved verbatim.
    pub additional_data: BTreeMap<String, String>,
}

impl Default for CostElement {
    fn default() -> Self {
        Self {
            handle: ElementHandle::new(),
            id: String::new(),
            id2: String::new(),
            ident: String::new(),
            calculation_id: 0,
            parent_calc_id: 0,
            order: 0,
            id5: String::new(),
            id6: String::new(),
            element_type: String::new(),
            name: String::new(),
            description: String::new(),
            properties: String::new(),
            properties_source: PropertiesSource::default(),
            spec: SpecParameters::default(),
            filter: String::new(),
            children: String::new(),
            openings: String::new(),
            created: None,
            parent: String::new(),
            ifc_type: String::new(),
            material: String::new(),
            dimension: String::new(),
            catalog_name: String::new(),
            catalog_type: String::new(),
            catalog_item_name: String::new(),
            catalog_number: String::new(),
            catalog_reference: String::new(),
            catalog_assignments: Vec::new(),
            bim_key: String::new(),
            text: String::new(),
            long_text: String::new(),
            qty: String::new(),
            qty_result: 0.0,
            qu: String::new(),
            up: 0.0,
            up_bkdn: String::new(),
            up_comp: [0.0; 6],
            time_qu: 0.0,
            it: 0.0,
            vat: 0.0,
            vat_value: 0.0,
            tax: 0.0,
            tax_value: 0.0,
            it_gross: 0.0,
            sum: 0.0,
            vob: String::new(),
            vob_formula: String::new(),
            vob_condition: String::new(),
            vob_type: String::new(),
            vob_factor: 0.0,
            on: String::new(),
            additional: String::new(),
            perc_total: 0.0,
            marked: false,
            perc_marked: 0.0,
            proc_unit: String::new(),
            color: String::new(),
            note: String::new(),
            additional_data: BTreeMap::new(),
        }
    }
}

impl CostElement {
    /// Creates an empty element with a fresh handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The element's in-memory handle.
    #[must_use]
    pub const fn handle(&self) -> ElementHandle {
        self.handle
    }

    /// Gives a plain clone its own handle.
    pub(crate) fn renew_handle(&mut self) {
        self.handle = ElementHandle::new();
    }

    /// Copies this element under a fresh handle and a fresh calculation
    /// identity (`id2`). Everything else, including catalog assignments and
    /// unknown fields, is copied.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            handle: ElementHandle::new(),
            id2: Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }

    /// Evaluated quantity times unit price. Always derived.
    #[must_use]
    pub fn up_result(&self) -> f64 {
        self.qty_result * self.up
    }

    /// Whether this is the root calculation of its group.
    #[must_use]
    pub const fn is_parent_node(&self) -> bool {
        self.parent_calc_id == 0
    }

    /// Indentation level in the calculation tree: `0` for the root, `1`
    /// otherwise.
    #[must_use]
    pub const fn tree_level(&self) -> i64 {
        if self.is_parent_node() { 0 } else { 1 }
    }

    /// The serialized SPEC parameter blob.
    #[must_use]
    pub fn properties(&self) -> &str {
        &self.properties
    }

    /// Which of `properties` and the SPEC mirrors was written last.
    #[must_use]
    pub const fn properties_source(&self) -> PropertiesSource {
        self.properties_source
    }

    /// The SPEC parameters mirrored out of `properties`.
    #[must_use]
    pub const fn spec(&self) -> &SpecParameters {
        &self.spec
    }

    /// Replaces the blob, making it authoritative.
    ///
    /// The blob is decoded: the six mirrors are overwritten and any
    /// unrecognised keys replace the previous `spec:` entries of
    /// [`additional_data`](Self::additional_data).
    pub fn set_properties(&mut self, blob: String) {
        let decoded = properties::decode(&blob);
        self.spec = decoded.spec_parameters();
        self.additional_data
            .retain(|key, _| !key.starts_with(SPEC_KEY_PREFIX));
        for (key, value) in decoded.unrecognised() {
            self.additional_data
                .insert(format!("{SPEC_KEY_PREFIX}{key}"), value.to_string());
        }
        self.properties = blob;
        self.properties_source = PropertiesSource::Blob;
    }

    /// Writes one SPEC mirror, making the mirrors authoritative and
    /// regenerating the blob from them.
    pub fn set_spec(&mut self, key: SpecKey, value: String) {
        self.spec.set(key, value);
        self.regenerate_properties();
    }

    /// Re-encodes the blob from the six mirrors, followed by the unrecognised
    /// keys kept under `spec:` in [`additional_data`](Self::additional_data).
    pub fn regenerate_properties(&mut self) {
        let mirrors = SpecKey::ORDER
            .iter()
            .map(|key| (key.as_str(), self.spec.get(*key)));
        let kept = self.additional_data.iter().filter_map(|(key, value)| {
            key.strip_prefix(SPEC_KEY_PREFIX)
                .map(|key| (key, value.as_str()))
        });
        self.properties = properties::encode_pairs(mirrors.chain(kept));
        self.properties_source = PropertiesSource::Mirrors;
    }

    /// Replaces all catalog assignments and denormalises the first onto the
    /// flat catalog fields.
    pub fn set_catalog_assignments(&mut self, assignments: Vec<CatalogAssignment>) {
        let first = assignments.first().cloned().unwrap_or_default();
        self.catalog_name = first.catalog_name;
        self.catalog_type = first.catalog_type;
        self.catalog_item_name = first.name;
        self.catalog_number = first.number;
        self.catalog_reference = first.reference;
        self.catalog_assignments = assignments;
    }

    /// The first catalog assignment as currently shown on the flat fields.
    #[must_use]
    pub fn primary_catalog_assignment(&self) -> CatalogAssignment {
        CatalogAssignment {
            catalog_name: self.catalog_name.clone(),
            catalog_type: self.catalog_type.clone(),
            name: self.catalog_item_name.clone(),
            number: self.catalog_number.clone(),
            reference: self.catalog_reference.clone(),
        }
    }

    /// The numeric value of `id`, or `0` when it is not numeric.
    #[must_use]
    pub fn numeric_id(&self) -> i64 {
        self.id.trim().parse().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_result_is_derived() {
        let element = CostElement {
            qty_result: 2.5,
            up: 4.0,
            ..CostElement::default()
        };
        assert_eq!(element.up_result(), 10.0);
    }

    #[test]
    fn root_flags_follow_parent_calc_id() {
        let mut element = CostElement::new();
        assert!(element.is_parent_node());
        assert_eq!(element.tree_level(), 0);

        element.parent_calc_id = 7;
        assert!(!element.is_parent_node());
        assert_eq!(element.tree_level(), 1);
    }

    #[test]
    fn setting_blob_populates_mirrors() {
        let mut element = CostElement::new();
        element.set_properties(
            r#"a:2:{s:4:"size";s:4:"DN50";s:6:"colour";s:3:"red";}"#.to_string(),
        );

        assert_eq!(element.spec().size, "DN50");
        assert_eq!(element.properties_source(), PropertiesSource::Blob);
        assert_eq!(
            element.additional_data.get("spec:colour").map(String::as_str),
            Some("red")
        );
    }

    #[test]
    fn setting_mirror_regenerates_blob() {
        let mut element = CostElement::new();
        element.set_properties(r#"a:1:{s:4:"size";s:4:"DN50";}"#.to_string());
        element.set_spec(SpecKey::Material, "Steel".to_string());

        assert_eq!(element.properties_source(), PropertiesSource::Mirrors);
        assert_eq!(
            element.properties(),
            r#"a:2:{s:4:"size";s:4:"DN50";s:8:"material";s:5:"Steel";}"#
        );
    }

    #[test]
    fn regenerated_blob_keeps_unrecognised_keys() {
        let mut element = CostElement::new();
        element.set_properties(
            r#"a:2:{s:4:"name";s:5:"Valve";s:8:"pressure";s:4:"PN16";}"#.to_string(),
        );
        element.set_spec(SpecKey::Material, "Brass".to_string());

        assert_eq!(
            element.properties(),
            r#"a:3:{s:4:"name";s:5:"Valve";s:8:"material";s:5:"Brass";s:8:"pressure";s:4:"PN16";}"#
        );
    }

    #[test]
    fn first_assignment_is_denormalised() {
        let mut element = CostElement::new();
        element.set_catalog_assignments(vec![
            CatalogAssignment {
                catalog_type: "Valves".to_string(),
                number: "V100".to_string(),
                name: "Ball valves".to_string(),
                ..CatalogAssignment::default()
            },
            CatalogAssignment {
                catalog_type: "Pipes".to_string(),
                ..CatalogAssignment::default()
            },
        ]);

        assert_eq!(element.catalog_type, "Valves");
        assert_eq!(element.catalog_number, "V100");
        assert_eq!(element.catalog_item_name, "Ball valves");
        assert_eq!(element.catalog_assignments.len(), 2);
    }

    #[test]
    fn duplicate_gets_fresh_identity() {
        let mut original = CostElement::new();
        original.id = "10".to_string();
        original.id2 = "abc".to_string();

        let copy = original.duplicate();
        assert_eq!(copy.id, "10");
        assert_ne!(copy.id2, original.id2);
        assert_ne!(copy.handle(), original.handle());
    }

    #[test]
    fn non_numeric_id_sorts_as_zero() {
        let element = CostElement {
            id: "A-1".to_string(),
            ..CostElement::default()
        };
        assert_eq!(element.numeric_id(), 0);
    }
}

//! String-keyed access to the scalar fields of a [`CostElement`].
//!
//! Paste, clear, change tracking, undo/redo and the session format all need
//! to read and write fields by name. They share the single [`FIELDS`] table
//! below instead of matching on field names themselves. Every write goes
//! through [`FieldValue::coerce`] so a value captured as text can be replayed
//! into a numeric field and vice versa.

use std::{collections::BTreeSet, fmt};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::domain::{
    CostElement,
    number::{parse_decimal, parse_integer},
    properties::SpecKey,
};

/// Timestamp layout used by both file formats.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    /// Free text.
    Text,
    /// A floating point amount.
    Decimal,
    /// A whole number.
    Integer,
    /// A flag.
    Bool,
    /// An optional timestamp.
    DateTime,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Decimal => "decimal",
            Self::Integer => "integer",
            Self::Bool => "boolean",
            Self::DateTime => "date-time",
        };
        f.write_str(name)
    }
}

/// How a field may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Access {
    /// Plain read/write field.
    Editable,
    /// Computed from other fields; writes are rejected.
    Derived,
    /// One of the six SPEC mirrors; writing it regenerates `Properties`.
    SpecMirror,
}

/// A dynamically typed field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    /// Text value.
    Text(String),
    /// Decimal value.
    Decimal(f64),
    /// Integer value.
    Integer(i64),
    /// Boolean value.
    Bool(bool),
    /// Timestamp value.
    DateTime(Option<NaiveDateTime>),
}

impl FieldValue {
    /// The default ("empty") value of a kind.
    #[must_use]
    pub const fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => Self::Text(String::new()),
            FieldKind::Decimal => Self::Decimal(0.0),
            FieldKind::Integer => Self::Integer(0),
            FieldKind::Bool => Self::Bool(false),
            FieldKind::DateTime => Self::DateTime(None),
        }
    }

    /// Whether this is the default value of its own kind.
    #[must_use]
    pub fn is_default(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Decimal(value) => *value == 0.0,
            Self::Integer(value) => *value == 0,
            Self::Bool(value) => !value,
            Self::DateTime(value) => value.is_none(),
        }
    }

    /// Converts the value to `kind`, on a best-effort basis.
    ///
    /// Text is parsed leniently (`,` or `.` decimals, `0`/`1`/`true`/`false`
    /// flags, ISO timestamps); empty text converts to the kind's default.
    ///
    /// # Errors
    ///
    /// Returns a [`CoercionError`] naming `field` when the value has no
    /// sensible representation in `kind`.
    pub fn coerce(self, kind: FieldKind, field: &str) -> Result<Self, CoercionError> {
        let fail = |value: &Self| CoercionError {
            field: field.to_string(),
            value: value.to_string(),
            kind,
        };

        let coerced = match (kind, &self) {
            (FieldKind::Text, Self::Text(_))
            | (FieldKind::Decimal, Self::Decimal(_))
            | (FieldKind::Integer, Self::Integer(_))
            | (FieldKind::Bool, Self::Bool(_))
            | (FieldKind::DateTime, Self::DateTime(_)) => Some(self.clone()),

            (FieldKind::Text, other) => Some(Self::Text(other.to_string())),

            (_, Self::Text(text)) if text.trim().is_empty() => Some(Self::default_for(kind)),

            (FieldKind::Decimal, Self::Text(text)) => parse_decimal(text).map(Self::Decimal),
            #[allow(clippy::cast_precision_loss)]
            (FieldKind::Decimal, Self::Integer(value)) => Some(Self::Decimal(*value as f64)),
            (FieldKind::Decimal, Self::Bool(value)) => {
                Some(Self::Decimal(if *value { 1.0 } else { 0.0 }))
            }

            (FieldKind::Integer, Self::Text(text)) => parse_integer(text).map(Self::Integer),
            #[allow(clippy::cast_possible_truncation)]
            (FieldKind::Integer, Self::Decimal(value)) if value.fract() == 0.0 => {
                Some(Self::Integer(*value as i64))
            }
            (FieldKind::Integer, Self::Bool(value)) => Some(Self::Integer(i64::from(*value))),

            (FieldKind::Bool, Self::Text(text)) => parse_bool(text).map(Self::Bool),
            (FieldKind::Bool, Self::Integer(value)) => Some(Self::Bool(*value != 0)),
            (FieldKind::Bool, Self::Decimal(value)) => Some(Self::Bool(*value != 0.0)),

            (FieldKind::DateTime, Self::Text(text)) => {
                parse_date_time(text).map(|value| Self::DateTime(Some(value)))
            }

            _ => None,
        };

        coerced.ok_or_else(|| fail(&self))
    }

    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            other => other.to_string(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn into_decimal(self) -> f64 {
        match self {
            Self::Decimal(value) => value,
            Self::Integer(value) => value as f64,
            _ => 0.0,
        }
    }

    fn into_integer(self) -> i64 {
        match self {
            Self::Integer(value) => value,
            _ => 0,
        }
    }

    fn into_bool(self) -> bool {
        matches!(self, Self::Bool(true))
    }

    fn into_date_time(self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(value) => value,
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Decimal(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Bool(value) => f.write_str(if *value { "1" } else { "0" }),
            Self::DateTime(Some(value)) => write!(f, "{}", value.format(DATE_TIME_FORMAT)),
            Self::DateTime(None) => Ok(()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Parses a flag as written in interchange files and typed by users.
#[must_use]
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "x" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Parses a timestamp in `yyyy-MM-ddTHH:mm:ss`, `yyyy-MM-dd HH:mm:ss` or
/// `yyyy-MM-dd` form.
#[must_use]
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// A value could not be converted to a field's declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot store '{value}' in {field}: expected a {kind} value")]
pub struct CoercionError {
    /// Name of the target field.
    pub field: String,
    /// The offending value, as text.
    pub value: String,
    /// The declared type of the field.
    pub kind: FieldKind,
}

/// Errors raised by registry access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// No field with this name exists.
    #[error("unknown field '{0}'")]
    UnknownField(String),
    /// The field is computed and cannot be written.
    #[error("field '{0}' is derived and cannot be written")]
    ReadOnly(&'static str),
    /// The value could not be converted.
    #[error(transparent)]
    Coercion(#[from] CoercionError),
}

/// Describes one field: its stable name, type, and accessors.
#[derive(Clone, Copy)]
pub struct FieldDescriptor {
    /// Stable field name.
    pub name: &'static str,
    /// Declared type.
    pub kind: FieldKind,
    /// Write access.
    pub access: Access,
    get: fn(&CostElement) -> FieldValue,
    set: fn(&mut CostElement, FieldValue),
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl FieldDescriptor {
    /// Reads the field.
    #[must_use]
    pub fn get(&self, element: &CostElement) -> FieldValue {
        (self.get)(element)
    }

    /// Coerces and writes `value`, returning the previous value.
    ///
    /// # Errors
    ///
    /// Fails if the field is derived or the value cannot be coerced. The
    /// element is left untouched in both cases.
    pub fn set(&self, element: &mut CostElement, value: FieldValue) -> Result<FieldValue, FieldError> {
        if self.access == Access::Derived {
            return Err(FieldError::ReadOnly(self.name));
        }
        let value = value.coerce(self.kind, self.name)?;
        let old = self.get(element);
        (self.set)(element, value);
        Ok(old)
    }

    /// The value [`clear`](Self::clear) writes.
    #[must_use]
    pub const fn default_value(&self) -> FieldValue {
        FieldValue::default_for(self.kind)
    }

    /// Resets the field to its default, returning the previous value.
    ///
    /// # Errors
    ///
    /// Fails if the field is derived.
    pub fn clear(&self, element: &mut CostElement) -> Result<FieldValue, FieldError> {
        self.set(element, self.default_value())
    }
}

macro_rules! field {
    (Text, $name:literal, $($path:tt)+) => {
        FieldDescriptor {
            name: $name,
            kind: FieldKind::Text,
            access: Access::Editable,
            get: |e| FieldValue::Text(e.$($path)+.clone()),
            set: |e, v| e.$($path)+ = v.into_text(),
        }
    };
    (Decimal, $name:literal, $($path:tt)+) => {
        FieldDescriptor {
            name: $name,
            kind: FieldKind::Decimal,
            access: Access::Editable,
            get: |e| FieldValue::Decimal(e.$($path)+),
            set: |e, v| e.$($path)+ = v.into_decimal(),
        }
    };
    (Integer, $name:literal, $($path:tt)+) => {
        FieldDescriptor {
            name: $name,
            kind: FieldKind::Integer,
            access: Access::Editable,
            get: |e| FieldValue::Integer(e.$($path)+),
            set: |e, v| e.$($path)+ = v.into_integer(),
        }
    };
    (Bool, $name:literal, $($path:tt)+) => {
        FieldDescriptor {
            name: $name,
            kind: FieldKind::Bool,
            access: Access::Editable,
            get: |e| FieldValue::Bool(e.$($path)+),
            set: |e, v| e.$($path)+ = v.into_bool(),
        }
    };
    (DateTime, $name:literal, $($path:tt)+) => {
        FieldDescriptor {
            name: $name,
            kind: FieldKind::DateTime,
            access: Access::Editable,
            get: |e| FieldValue::DateTime(e.$($path)+),
            set: |e, v| e.$($path)+ = v.into_date_time(),
        }
    };
}

macro_rules! spec_mirror {
    ($name:literal, $key:ident, $attr:ident) => {
        FieldDescriptor {
            name: $name,
            kind: FieldKind::Text,
            access: Access::SpecMirror,
            get: |e| FieldValue::Text(e.spec().$attr.clone()),
            set: |e, v| e.set_spec(SpecKey::$key, v.into_text()),
        }
    };
}

/// Every registered field, in display order.
pub static FIELDS: &[FieldDescriptor] = &[
    field!(Text, "Id", id),
    field!(Text, "Id2", id2),
    field!(Text, "Ident", ident),
    field!(Integer, "CalculationId", calculation_id),
    field!(Integer, "ParentCalcId", parent_calc_id),
    field!(Integer, "Order", order),
    FieldDescriptor {
        name: "IsParentNode",
        kind: FieldKind::Bool,
        access: Access::Derived,
        get: |e| FieldValue::Bool(e.is_parent_node()),
        set: |_, _| {},
    },
    FieldDescriptor {
        name: "TreeLevel",
        kind: FieldKind::Integer,
        access: Access::Derived,
        get: |e| FieldValue::Integer(e.tree_level()),
        set: |_, _| {},
    },
    field!(Text, "Id5", id5),
    field!(Text, "Id6", id6),
    field!(Text, "Type", element_type),
    field!(Text, "Name", name),
    field!(Text, "Description", description),
    FieldDescriptor {
        name: "Properties",
        kind: FieldKind::Text,
        access: Access::Editable,
        get: |e| FieldValue::Text(e.properties().to_string()),
        set: |e, v| e.set_properties(v.into_text()),
    },
    spec_mirror!("SpecName", Name, name),
    spec_mirror!("SpecSize", Size, size),
    spec_mirror!("SpecType", Type, kind),
    spec_mirror!("SpecFilter", Filter, filter),
    spec_mirror!("SpecManufacturer", Manufacturer, manufacturer),
    spec_mirror!("SpecMaterial", Material, material),
    field!(Text, "Filter", filter),
    field!(Text, "Children", children),
    field!(Text, "Openings", openings),
    field!(DateTime, "Created", created),
    field!(Text, "Parent", parent),
    field!(Text, "IfcType", ifc_type),
    field!(Text, "Material", material),
    field!(Text, "Dimension", dimension),
    field!(Text, "CatalogName", catalog_name),
    field!(Text, "CatalogType", catalog_type),
    field!(Text, "CatalogItemName", catalog_item_name),
    field!(Text, "CatalogNumber", catalog_number),
    field!(Text, "CatalogReference", catalog_reference),
    field!(Text, "BimKey", bim_key),
    field!(Text, "Text", text),
    field!(Text, "LongText", long_text),
    field!(Text, "Qty", qty),
    field!(Decimal, "QtyResult", qty_result),
    field!(Text, "Qu", qu),
    field!(Decimal, "Up", up),
    FieldDescriptor {
        name: "UpResult",
        kind: FieldKind::Decimal,
        access: Access::Derived,
        get: |e| FieldValue::Decimal(e.up_result()),
        set: |_, _| {},
    },
    field!(Text, "UpBkdn", up_bkdn),
    field!(Decimal, "UpComp1", up_comp[0]),
    field!(Decimal, "UpComp2", up_comp[1]),
    field!(Decimal, "UpComp3", up_comp[2]),
    field!(Decimal, "UpComp4", up_comp[3]),
    field!(Decimal, "UpComp5", up_comp[4]),
    field!(Decimal, "UpComp6", up_comp[5]),
    field!(Decimal, "TimeQu", time_qu),
    field!(Decimal, "It", it),
    field!(Decimal, "Vat", vat),
    field!(Decimal, "VatValue", vat_value),
    field!(Decimal, "Tax", tax),
    field!(Decimal, "TaxValue", tax_value),
    field!(Decimal, "ItGross", it_gross),
    field!(Decimal, "Sum", sum),
    field!(Text, "Vob", vob),
    field!(Text, "VobFormula", vob_formula),
    field!(Text, "VobCondition", vob_condition),
    field!(Text, "VobType", vob_type),
    field!(Decimal, "VobFactor", vob_factor),
    field!(Text, "On", on),
    field!(Text, "Additional", additional),
    field!(Decimal, "PercTotal", perc_total),
    field!(Bool, "Marked", marked),
    field!(Decimal, "PercMarked", perc_marked),
    field!(Text, "ProcUnit", proc_unit),
    field!(Text, "Color", color),
    field!(Text, "Note", note),
];

/// Looks up a field by name, ignoring ASCII case.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static FieldDescriptor> {
    let name = name.trim();
    FIELDS
        .iter()
        .find(|field| field.name.eq_ignore_ascii_case(name))
}

fn require(name: &str) -> Result<&'static FieldDescriptor, FieldError> {
    lookup(name).ok_or_else(|| FieldError::UnknownField(name.to_string()))
}

/// Reads a field by name.
///
/// # Errors
///
/// Fails if no such field exists.
pub fn get(element: &CostElement, name: &str) -> Result<FieldValue, FieldError> {
    Ok(require(name)?.get(element))
}

/// Coerces and writes a field by name, returning the previous value.
///
/// # Errors
///
/// Fails if the field does not exist, is derived, or the value cannot be
/// coerced to its declared type.
pub fn set(
    element: &mut CostElement,
    name: &str,
    value: impl Into<FieldValue>,
) -> Result<FieldValue, FieldError> {
    require(name)?.set(element, value.into())
}

/// Resets a field by name to its default, returning the previous value.
///
/// # Errors
///
/// Fails if the field does not exist or is derived.
pub fn clear(element: &mut CostElement, name: &str) -> Result<FieldValue, FieldError> {
    require(name)?.clear(element)
}

/// Names of the stored (non-derived) fields that hold a non-default value.
#[must_use]
pub fn non_default_fields(element: &CostElement) -> BTreeSet<&'static str> {
    FIELDS
        .iter()
        .filter(|field| field.access != Access::Derived)
        .filter(|field| !field.get(element).is_default())
        .map(|field| field.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::PropertiesSource;

    #[test]
    fn names_are_unique() {
        let names: BTreeSet<_> = FIELDS
            .iter()
            .map(|field| field.name.to_ascii_lowercase())
            .collect();
        assert_eq!(names.len(), FIELDS.len());
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(lookup("qtyresult").map(|f| f.name), Some("QtyResult"));
        assert!(lookup("NoSuchField").is_none());
    }

    #[test]
    fn set_coerces_text_into_decimal() {
        let mut element = CostElement::new();
        let old = set(&mut element, "Up", "12,5").unwrap();
        assert_eq!(old, FieldValue::Decimal(0.0));
        assert_eq!(element.up, 12.5);
    }

    #[test]
    fn failed_coercion_leaves_element_untouched() {
        let mut element = CostElement::new();
        element.up = 3.0;
        let error = set(&mut element, "Up", "three").unwrap_err();
        assert!(matches!(error, FieldError::Coercion(_)));
        assert_eq!(element.up, 3.0);
    }

    #[test]
    fn derived_fields_are_read_only() {
        let mut element = CostElement::new();
        assert_eq!(
            set(&mut element, "UpResult", 5.0),
            Err(FieldError::ReadOnly("UpResult"))
        );
        assert_eq!(
            set(&mut element, "IsParentNode", false),
            Err(FieldError::ReadOnly("IsParentNode"))
        );
    }

    #[test]
    fn derived_fields_track_their_sources() {
        let mut element = CostElement::new();
        set(&mut element, "QtyResult", 4.0).unwrap();
        set(&mut element, "Up", 2.5).unwrap();
        assert_eq!(get(&element, "UpResult"), Ok(FieldValue::Decimal(10.0)));

        set(&mut element, "ParentCalcId", "3").unwrap();
        assert_eq!(get(&element, "TreeLevel"), Ok(FieldValue::Integer(1)));
    }

    #[test]
    fn writing_a_mirror_regenerates_properties() {
        let mut element = CostElement::new();
        set(&mut element, "SpecSize", "DN65").unwrap();
        assert_eq!(element.properties_source(), PropertiesSource::Mirrors);
        assert_eq!(element.properties(), r#"a:1:{s:4:"size";s:4:"DN65";}"#);
    }

    #[test]
    fn clear_resets_to_default() {
        let mut element = CostElement::new();
        element.text = "Pipe".to_string();
        element.marked = true;
        clear(&mut element, "Text").unwrap();
        clear(&mut element, "Marked").unwrap();
        assert!(element.text.is_empty());
        assert!(!element.marked);
    }

    #[test_case(FieldValue::from("1"), FieldKind::Bool, FieldValue::Bool(true); "text flag")]
    #[test_case(FieldValue::from("7"), FieldKind::Integer, FieldValue::Integer(7); "text integer")]
    #[test_case(FieldValue::Integer(3), FieldKind::Decimal, FieldValue::Decimal(3.0); "integer to decimal")]
    #[test_case(FieldValue::Decimal(1.5), FieldKind::Text, FieldValue::from("1.5"); "decimal to text")]
    #[test_case(FieldValue::from(""), FieldKind::Decimal, FieldValue::Decimal(0.0); "empty text")]
    fn coerces(value: FieldValue, kind: FieldKind, expected: FieldValue) {
        assert_eq!(value.coerce(kind, "Field"), Ok(expected));
    }

    #[test]
    fn coercion_failures_name_the_field() {
        let error = FieldValue::Decimal(1.5)
            .coerce(FieldKind::Integer, "Order")
            .unwrap_err();
        assert_eq!(error.field, "Order");
        assert_eq!(error.kind, FieldKind::Integer);
    }

    #[test]
    fn parses_timestamps() {
        let parsed = parse_date_time("2024-03-01T08:30:00").unwrap();
        assert_eq!(parsed.format(DATE_TIME_FORMAT).to_string(), "2024-03-01T08:30:00");
        assert!(parse_date_time("2024-03-01").is_some());
        assert!(parse_date_time("yesterday").is_none());
    }

    #[test]
    fn non_default_fields_skip_derived_and_empty() {
        let mut element = CostElement::new();
        element.id = "1".to_string();
        element.up = 2.0;
        let fields = non_default_fields(&element);
        assert!(fields.contains("Id"));
        assert!(fields.contains("Up"));
        assert!(!fields.contains("IsParentNode"));
        assert!(!fields.contains("Text"));
    }
}

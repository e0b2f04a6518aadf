//! The `cefexport` interchange format.
//!
//! On disk a cost element is one `<costelement>` carrying the header fields
//! shared by all its calculation rows, and a `<cecalculations>` block with one
//! `<cecalculation>` per row. In memory every row is its own [`CostElement`].
//! Reading fans a document out into one element per calculation; writing fans
//! the elements back in, grouped by `Id`.

use std::collections::HashMap;

use crate::{
    domain::{
        CatalogAssignment, CostElement,
        cost_element::{CALC_KEY_PREFIX, SPEC_KEY_PREFIX},
        field::{DATE_TIME_FORMAT, parse_bool, parse_date_time},
        number::{self, AMOUNT_PLACES, PERCENT_PLACES},
    },
    storage::xml::{self, WriteError, XmlError, XmlNode, XmlWriter},
};

/// Root element name.
pub const ROOT: &str = "cefexport";

/// Format version written to the root element.
pub const VERSION: &str = "2";

/// Written in place of the quantity when it is computed by a formula.
pub const FORMULA_QUANTITY: &str = "DXQuantity";

/// Parses a document into one element per calculation.
///
/// # Errors
///
/// Fails only if the text is not well-formed XML. Missing or unreadable
/// fields fall back to their defaults.
pub fn read(text: &str) -> Result<Vec<CostElement>, XmlError> {
    let root = xml::parse(text)?;
    Ok(read_document(&root))
}

/// Fans the `<costelement>` nodes under `root` out into elements.
#[must_use]
pub fn read_document(root: &XmlNode) -> Vec<CostElement> {
    let container = root.child("costelements").unwrap_or(root);
    let mut elements = Vec::new();

    for node in container.children_named("costelement") {
        let header = read_header(node);
        let calculations: Vec<&XmlNode> = node
            .child("cecalculations")
            .map(|block| block.children_named("cecalculation").collect())
            .unwrap_or_default();

        if calculations.is_empty() {
            tracing::debug!("Cost element {:?} has no calculations", header.id);
            elements.push(header);
            continue;
        }

        for calculation in calculations {
            let mut element = header.clone();
            element.renew_handle();
            read_calculation(&mut element, calculation);
            elements.push(element);
        }
    }

    elements
}

fn read_header(node: &XmlNode) -> CostElement {
    let mut element = CostElement::new();
    element.id = node.attribute("id").unwrap_or_default().trim().to_string();
    let mut properties = String::new();

    for child in &node.children {
        let text = child.text();
        match child.name.to_ascii_lowercase().as_str() {
            "id" => {
                if element.id.is_empty() {
                    element.id = text.to_string();
                }
            }
            "type" => element.element_type = text.to_string(),
            "name" => element.name = text.to_string(),
            "description" => element.description = text.to_string(),
            "properties" => properties = text.to_string(),
            "filter" => element.filter = text.to_string(),
            "children" => element.children = text.to_string(),
            "openings" => element.openings = text.to_string(),
            "created" => element.created = date_time(text),
            "parent" => element.parent = text.to_string(),
            "id5" => element.id5 = text.to_string(),
            "id6" => element.id6 = text.to_string(),
            "ifctype" => element.ifc_type = text.to_string(),
            "material" => element.material = text.to_string(),
            "dimension" => element.dimension = text.to_string(),
            "cecatalogassigns" => element.set_catalog_assignments(catalog_assignments(child)),
            "cecalculations" => {}
            _ => keep_unknown(&mut element, child.name.clone(), child),
        }
    }

    if !properties.is_empty() {
        element.set_properties(properties);
    }

    element
}

fn catalog_assignments(block: &XmlNode) -> Vec<CatalogAssignment> {
    block
        .children_named("cecatalogassign")
        .map(|node| CatalogAssignment {
            catalog_name: node.child_text("catalogname").to_string(),
            catalog_type: node.child_text("catalogtype").to_string(),
            name: node.child_text("name").to_string(),
            number: node.child_text("number").to_string(),
            reference: node.child_text("reference").to_string(),
        })
        .filter(|assignment| !assignment.is_empty())
        .collect()
}

fn read_calculation(element: &mut CostElement, node: &XmlNode) {
    for child in &node.children {
        let text = child.text();
        let tag = child.name.to_ascii_lowercase();
        match tag.as_str() {
            "id" => {
                element.ident = text.to_string();
                element.calculation_id = integer(&tag, text);
            }
            "parent" => element.parent_calc_id = integer(&tag, text),
            "order" => element.order = integer(&tag, text),
            "ident" => element.id2 = text.to_string(),
            "bimkey" => element.bim_key = text.to_string(),
            "text" => element.text = text.to_string(),
            "longtext" => element.long_text = text.to_string(),
            "qty" => element.qty = text.to_string(),
            "qty_result" => element.qty_result = decimal(&tag, text),
            "qu" => element.qu = text.to_string(),
            "up" => element.up = decimal(&tag, text),
            // recomputed from qty_result and up
            "up_result" => {}
            "upbkdn" => element.up_bkdn = text.to_string(),
            "upcomp1" | "upcomp2" | "upcomp3" | "upcomp4" | "upcomp5" | "upcomp6" => {
                let slot = usize::from(tag.as_bytes()[6] - b'1');
                element.up_comp[slot] = decimal(&tag, text);
            }
            "timequ" => element.time_qu = decimal(&tag, text),
            "it" => element.it = decimal(&tag, text),
            "vat" => element.vat = decimal(&tag, text),
            "vatvalue" => element.vat_value = decimal(&tag, text),
            "tax" => element.tax = decimal(&tag, text),
            "taxvalue" => element.tax_value = decimal(&tag, text),
            "itgross" => element.it_gross = decimal(&tag, text),
            "sum" => element.sum = decimal(&tag, text),
            "vob" => element.vob = text.to_string(),
            "vob_formula" => element.vob_formula = text.to_string(),
            "vob_condition" => element.vob_condition = text.to_string(),
            "vob_type" => element.vob_type = text.to_string(),
            "vob_factor" => element.vob_factor = decimal(&tag, text),
            "on" => element.on = text.to_string(),
            "additional" => element.additional = text.to_string(),
            "perctotal" => element.perc_total = decimal(&tag, text),
            "marked" => element.marked = flag(text),
            "percmarked" => element.perc_marked = decimal(&tag, text),
            "procunit" => element.proc_unit = text.to_string(),
            "color" => element.color = text.to_string(),
            "note" => element.note = text.to_string(),
            _ => keep_unknown(element, format!("{CALC_KEY_PREFIX}{}", child.name), child),
        }
    }
}

fn keep_unknown(element: &mut CostElement, key: String, node: &XmlNode) {
    if node.is_leaf() {
        element.additional_data.insert(key, node.text().to_string());
    } else {
        tracing::debug!("Skipping unrecognised block <{}>", node.name);
    }
}

fn decimal(tag: &str, text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    number::parse_decimal(text).unwrap_or_else(|| {
        tracing::debug!("Could not read <{tag}> value {text:?} as a number, using 0");
        0.0
    })
}

fn integer(tag: &str, text: &str) -> i64 {
    if text.is_empty() {
        return 0;
    }
    number::parse_integer(text).unwrap_or_else(|| {
        tracing::debug!("Could not read <{tag}> value {text:?} as an integer, using 0");
        0
    })
}

fn flag(text: &str) -> bool {
    parse_bool(text)
        .or_else(|| number::parse_decimal(text).map(|value| value != 0.0))
        .unwrap_or_else(|| {
            tracing::debug!("Could not read <marked> value {text:?} as a flag, using 0");
            false
        })
}

fn date_time(text: &str) -> Option<chrono::NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    let parsed = parse_date_time(text);
    if parsed.is_none() {
        tracing::debug!("Could not read <created> value {text:?} as a timestamp");
    }
    parsed
}

/// Serializes elements, fanning calculations back in under their `Id`.
///
/// Groups appear in order of first appearance. The header fields come from
/// the group's root calculation (or its first element when no root exists),
/// and only that element's primary catalog assignment is written.
///
/// # Errors
///
/// Fails if the XML writer reports an error.
pub fn write(elements: &[CostElement]) -> Result<String, WriteError> {
    let mut writer = XmlWriter::new()?;
    writer.start(ROOT, &[("version", VERSION)])?;
    writer.start("costelements", &[])?;

    for (id, group) in group_by_id(elements) {
        let header = group
            .iter()
            .copied()
            .find(|element| element.is_parent_node())
            .unwrap_or(group[0]);

        writer.start("costelement", &[("id", id)])?;
        write_header(&mut writer, header)?;

        let mut calculations = group.clone();
        calculations.sort_by_key(|element| element.order);

        writer.start("cecalculations", &[])?;
        for element in calculations {
            write_calculation(&mut writer, element)?;
        }
        writer.end("cecalculations")?;
        writer.end("costelement")?;
    }

    writer.end("costelements")?;
    writer.end(ROOT)?;
    Ok(writer.finish())
}

fn group_by_id(elements: &[CostElement]) -> Vec<(&str, Vec<&CostElement>)> {
    let mut groups: Vec<(&str, Vec<&CostElement>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for element in elements {
        let id = element.id.as_str();
        let position = *positions.entry(id).or_insert_with(|| {
            groups.push((id, Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(element);
    }
    groups
}

fn write_header(writer: &mut XmlWriter, element: &CostElement) -> Result<(), WriteError> {
    writer.leaf("type", &element.element_type)?;
    writer.leaf("name", &element.name)?;
    writer.leaf("description", &element.description)?;
    writer.cdata_leaf("properties", element.properties())?;
    writer.leaf("filter", &element.filter)?;
    writer.leaf("children", &element.children)?;
    writer.leaf("openings", &element.openings)?;
    let created = element
        .created
        .map(|created| created.format(DATE_TIME_FORMAT).to_string())
        .unwrap_or_default();
    writer.leaf("created", &created)?;

    for (tag, value) in [
        ("parent", &element.parent),
        ("id5", &element.id5),
        ("id6", &element.id6),
        ("ifctype", &element.ifc_type),
        ("material", &element.material),
        ("dimension", &element.dimension),
    ] {
        if !value.is_empty() {
            writer.leaf(tag, value)?;
        }
    }

    for (key, value) in &element.additional_data {
        if !key.starts_with(CALC_KEY_PREFIX) && !key.starts_with(SPEC_KEY_PREFIX) {
            write_kept_field(writer, key, value)?;
        }
    }

    let assignment = element.primary_catalog_assignment();
    if !assignment.is_empty() {
        writer.start("cecatalogassigns", &[])?;
        writer.start("cecatalogassign", &[])?;
        writer.leaf("catalogname", &assignment.catalog_name)?;
        writer.leaf("catalogtype", &assignment.catalog_type)?;
        writer.leaf("name", &assignment.name)?;
        writer.leaf("number", &assignment.number)?;
        writer.leaf("reference", &assignment.reference)?;
        writer.end("cecatalogassign")?;
        writer.end("cecatalogassigns")?;
    }

    Ok(())
}

fn write_calculation(writer: &mut XmlWriter, element: &CostElement) -> Result<(), WriteError> {
    let amount = |value: f64| number::format_decimal(value, AMOUNT_PLACES);
    let percent = |value: f64| number::format_decimal(value, PERCENT_PLACES);

    writer.start("cecalculation", &[])?;
    writer.leaf("id", &calculation_id_text(element))?;
    writer.leaf("parent", &element.parent_calc_id.to_string())?;
    writer.leaf("order", &element.order.to_string())?;
    writer.leaf("ident", &element.id2)?;
    writer.leaf("bimkey", &element.bim_key)?;
    writer.cdata_leaf("text", &element.text)?;
    writer.cdata_leaf("longtext", &element.long_text)?;

    let qty = if element.vob.is_empty() {
        element.qty.as_str()
    } else {
        FORMULA_QUANTITY
    };
    writer.leaf("qty", qty)?;
    writer.leaf("qty_result", &amount(element.qty_result))?;
    writer.leaf("qu", &element.qu)?;
    writer.leaf("up", &amount(element.up))?;
    writer.leaf("up_result", &amount(element.up_result()))?;
    writer.leaf("upbkdn", &element.up_bkdn)?;
    for (slot, value) in element.up_comp.iter().enumerate() {
        writer.leaf(&format!("upcomp{}", slot + 1), &amount(*value))?;
    }
    writer.leaf("timequ", &amount(element.time_qu))?;
    writer.leaf("it", &amount(element.it))?;
    writer.leaf("vat", &percent(element.vat))?;
    writer.leaf("vatvalue", &amount(element.vat_value))?;
    writer.leaf("tax", &percent(element.tax))?;
    writer.leaf("taxvalue", &amount(element.tax_value))?;
    writer.leaf("itgross", &amount(element.it_gross))?;
    writer.leaf("sum", &amount(element.sum))?;
    writer.leaf("vob", &element.vob)?;
    writer.leaf("vob_formula", &element.vob_formula)?;
    writer.leaf("vob_condition", &element.vob_condition)?;
    writer.leaf("vob_type", &element.vob_type)?;
    writer.leaf("vob_factor", &amount(element.vob_factor))?;
    writer.leaf("on", &element.on)?;
    writer.cdata_leaf("additional", &element.additional)?;
    writer.leaf("perctotal", &percent(element.perc_total))?;
    writer.leaf("marked", if element.marked { "1" } else { "0" })?;
    writer.leaf("percmarked", &percent(element.perc_marked))?;
    writer.leaf("procunit", &element.proc_unit)?;
    writer.leaf("color", &element.color)?;
    writer.leaf("note", &element.note)?;

    for (key, value) in &element.additional_data {
        if let Some(tag) = key.strip_prefix(CALC_KEY_PREFIX) {
            write_kept_field(writer, tag, value)?;
        }
    }

    writer.end("cecalculation")
}

/// Writes a preserved unknown field back under its own tag. Keys that cannot
/// be element names (e.g. `site note` from a session entry) are left out.
fn write_kept_field(writer: &mut XmlWriter, tag: &str, value: &str) -> Result<(), WriteError> {
    if xml::is_element_name(tag) {
        writer.leaf(tag, value)
    } else {
        tracing::debug!(tag, "not exporting a field whose key is not an element name");
        Ok(())
    }
}

/// The calculation `<id>`: the `Ident` text when it is not a plain number,
/// so non-numeric identifiers survive; the numeric `CalculationId` otherwise.
fn calculation_id_text(element: &CostElement) -> String {
    let ident = element.ident.trim();
    if ident.is_empty() || number::parse_integer(ident).is_some() {
        element.calculation_id.to_string()
    } else {
        ident.to_string()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::SpecKey;

    const TWO_CALCULATIONS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cefexport version="2">
  <costelements>
    <costelement id="100">
      <type>Pipe</type>
      <name>Copper pipe</name>
      <description/>
      <properties><![CDATA[a:2:{s:4:"name";s:6:"Copper";s:4:"size";s:5:"DN 15";}]]></properties>
      <created>2024-03-01T08:30:00</created>
      <supplier>ACME</supplier>
      <cecatalogassigns>
        <cecatalogassign>
          <catalogname>Main</catalogname>
          <catalogtype>Pipes</catalogtype>
          <name>Copper</name>
          <number>P100</number>
          <reference>R1</reference>
        </cecatalogassign>
      </cecatalogassigns>
      <cecalculations>
        <cecalculation>
          <id>1</id>
          <parent>0</parent>
          <order>2</order>
          <ident>calc-a</ident>
          <text><![CDATA[ Supply pipe ]]></text>
          <qty>12,5</qty>
          <qty_result>12,5</qty_result>
          <up>4.20</up>
          <marked>1</marked>
          <budget>17</budget>
        </cecalculation>
        <cecalculation>
          <id>2</id>
          <parent>1</parent>
          <order>1</order>
          <ident>calc-b</ident>
          <text>Install pipe</text>
          <qty_result>oops</qty_result>
          <up>1.5</up>
        </cecalculation>
      </cecalculations>
    </costelement>
  </costelements>
</cefexport>
"#;

    #[test]
    fn fans_out_one_element_per_calculation() {
        let elements = read(TWO_CALCULATIONS).unwrap();
        assert_eq!(elements.len(), 2);

        let [first, second] = elements.as_slice() else {
            unreachable!()
        };
        assert_eq!(first.id, "100");
        assert_eq!(second.id, "100");
        assert_eq!(second.name, "Copper pipe");
        assert_eq!(second.catalog_number, "P100");
        assert_ne!(first.handle(), second.handle());

        assert!(first.is_parent_node());
        assert_eq!(first.tree_level(), 0);
        assert!(!second.is_parent_node());
        assert_eq!(second.tree_level(), 1);

        assert_eq!(first.ident, "1");
        assert_eq!(first.calculation_id, 1);
        assert_eq!(first.id2, "calc-a");
    }

    #[test]
    fn reads_values_leniently() {
        let elements = read(TWO_CALCULATIONS).unwrap();
        assert_eq!(elements[0].text, "Supply pipe");
        assert_eq!(elements[0].qty_result, 12.5);
        assert_eq!(elements[0].up, 4.2);
        assert!(elements[0].marked);
        assert_eq!(elements[1].qty_result, 0.0);
        assert_eq!(
            elements[0].created.map(|c| c.format(DATE_TIME_FORMAT).to_string()),
            Some("2024-03-01T08:30:00".to_string())
        );
    }

    #[test]
    fn decodes_properties_on_import() {
        let elements = read(TWO_CALCULATIONS).unwrap();
        assert_eq!(elements[1].spec().get(SpecKey::Name), "Copper");
        assert_eq!(elements[1].spec().get(SpecKey::Size), "DN 15");
    }

    #[test]
    fn keeps_unknown_fields() {
        let elements = read(TWO_CALCULATIONS).unwrap();
        assert_eq!(elements[0].additional_data.get("supplier").map(String::as_str), Some("ACME"));
        assert_eq!(elements[0].additional_data.get("calc/budget").map(String::as_str), Some("17"));
        assert!(!elements[1].additional_data.contains_key("calc/budget"));

        let xml = write(&elements).unwrap();
        assert!(xml.contains("<supplier>ACME</supplier>"));
        assert!(xml.contains("<budget>17</budget>"));
    }

    #[test]
    fn element_without_calculations_keeps_its_header() {
        let elements = read(
            r#"<cefexport><costelements><costelement id="5"><name>Lonely</name></costelement></costelements></cefexport>"#,
        )
        .unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].name, "Lonely");
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(read("<cefexport><costelements></cefexport>").is_err());
    }

    #[test]
    fn fans_in_by_id_with_calculations_in_order() {
        let elements = read(TWO_CALCULATIONS).unwrap();
        let xml = write(&elements).unwrap();

        assert_eq!(xml.matches("<costelement ").count(), 1);
        let install = xml.find("Install pipe").unwrap();
        let supply = xml.find("Supply pipe").unwrap();
        assert!(install < supply, "calculations must follow Order");

        let again = read(&xml).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].text, "Install pipe");
        assert_eq!(again[1].up, 4.2);
    }

    #[test]
    fn header_comes_from_root_calculation() {
        let mut child = CostElement::new();
        child.id = "7".to_string();
        child.parent_calc_id = 1;
        child.name = "From child".to_string();
        let mut root = CostElement::new();
        root.id = "7".to_string();
        root.name = "From root".to_string();

        let xml = write(&[child, root]).unwrap();
        assert!(xml.contains("<name>From root</name>"));
        assert!(!xml.contains("From child"));
    }

    #[test]
    fn formula_quantity_replaces_qty() {
        let mut element = CostElement::new();
        element.id = "1".to_string();
        element.qty = "3*4".to_string();
        element.qty_result = 12.0;
        element.vob = "X".to_string();

        let xml = write(&[element]).unwrap();
        assert!(xml.contains("<qty>DXQuantity</qty>"));
        assert!(xml.contains("<qty_result>12.000</qty_result>"));
    }

    #[test]
    fn raw_qty_is_written_without_formula() {
        let mut element = CostElement::new();
        element.id = "1".to_string();
        element.qty = "3*4".to_string();
        let xml = write(&[element]).unwrap();
        assert!(xml.contains("<qty>3*4</qty>"));
    }

    #[test_case("vat", "<vat>19.00</vat>"; "percent field")]
    #[test_case("vatvalue", "<vatvalue>19.000</vatvalue>"; "amount field")]
    fn decimals_are_fixed_point(_field: &str, expected: &str) {
        let mut element = CostElement::new();
        element.id = "1".to_string();
        element.vat = 19.0;
        element.vat_value = 19.0;
        let xml = write(&[element]).unwrap();
        assert!(xml.contains(expected), "{xml}");
    }

    #[test]
    fn text_fields_are_wrapped_in_cdata() {
        let mut element = CostElement::new();
        element.id = "1".to_string();
        element.text = "Pipe & fitting".to_string();
        element.additional = "extra".to_string();
        let xml = write(&[element]).unwrap();
        assert!(xml.contains("<text><![CDATA[Pipe & fitting]]></text>"));
        assert!(xml.contains("<additional><![CDATA[extra]]></additional>"));
        assert!(xml.contains("<longtext/>"));
    }

    #[test]
    fn only_primary_catalog_assignment_is_written() {
        let mut element = CostElement::new();
        element.id = "1".to_string();
        element.set_catalog_assignments(vec![
            CatalogAssignment {
                number: "A1".to_string(),
                ..CatalogAssignment::default()
            },
            CatalogAssignment {
                number: "B2".to_string(),
                ..CatalogAssignment::default()
            },
        ]);
        let xml = write(&[element]).unwrap();
        assert!(xml.contains("<number>A1</number>"));
        assert!(!xml.contains("B2"));
    }

    #[test]
    fn non_numeric_calculation_ids_survive() {
        let mut element = CostElement::new();
        element.id = "1".to_string();
        element.ident = "0zXyGuidLike".to_string();
        let xml = write(&[element]).unwrap();
        assert!(xml.contains("<id>0zXyGuidLike</id>"));
    }

    #[test]
    fn kept_fields_with_unusable_names_are_left_out() {
        let mut element = CostElement::new();
        element.id = "1".to_string();
        for key in ["colour", "site note", "calc/weight", "calc/net weight", "1st"] {
            element.additional_data.insert(key.to_string(), "x".to_string());
        }

        let xml = write(&[element]).unwrap();
        assert!(!xml.contains("site note"));
        assert!(!xml.contains("net weight"));

        let elements = read(&xml).unwrap();
        let kept: Vec<&str> = elements[0].additional_data.keys().map(String::as_str).collect();
        assert_eq!(kept, ["calc/weight", "colour"]);
    }
}

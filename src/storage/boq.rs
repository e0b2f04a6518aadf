//! Flat bill-of-quantities export.
//!
//! One `<Item>` per element, no grouping. There is no reader for this format.

use crate::{
    domain::{
        CostElement,
        number::{self, AMOUNT_PLACES},
    },
    storage::xml::{WriteError, XmlWriter},
};

/// Serializes elements as `Award/BoQ/Item` records.
///
/// # Errors
///
/// Fails if the XML writer reports an error.
pub fn write(elements: &[CostElement]) -> Result<String, WriteError> {
    let amount = |value: f64| number::format_decimal(value, AMOUNT_PLACES);

    let mut writer = XmlWriter::new()?;
    writer.start("Award", &[])?;
    writer.start("BoQ", &[])?;

    for element in elements {
        writer.start("Item", &[("RNoPart", element.id.as_str())])?;
        writer.leaf("Description", &element.text)?;
        writer.cdata_leaf("LongText", &element.long_text)?;
        writer.leaf("Unit", &element.qu)?;
        writer.leaf("Qty", &amount(element.qty_result))?;
        writer.leaf("UP", &amount(element.up))?;
        writer.leaf("Total", &amount(element.up_result()))?;
        writer.cdata_leaf("Properties", element.properties())?;
        writer.end("Item")?;
    }

    writer.end("BoQ")?;
    writer.end("Award")?;
    Ok(writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::xml;

    #[test]
    fn writes_one_item_per_element() {
        let mut first = CostElement::new();
        first.id = "7".to_string();
        first.text = "Ball valve".to_string();
        first.qu = "pcs".to_string();
        first.qty_result = 2.0;
        first.up = 12.5;
        let mut second = first.clone();
        second.parent_calc_id = 1;

        let document = write(&[first, second]).unwrap();
        let root = xml::parse(&document).unwrap();

        let boq = root.child("BoQ").unwrap();
        let items: Vec<_> = boq.children_named("Item").collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].attribute("RNoPart"), Some("7"));
        assert_eq!(items[0].child_text("Description"), "Ball valve");
        assert_eq!(items[0].child_text("Unit"), "pcs");
        assert_eq!(items[0].child_text("Qty"), "2.000");
        assert_eq!(items[0].child_text("UP"), "12.500");
        assert_eq!(items[0].child_text("Total"), "25.000");
    }
}

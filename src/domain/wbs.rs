//! Work-breakdown-structure view of a flat element collection.
//!
//! The [`WbsTree`] groups elements by catalog taxonomy:
//!
//! - level 0: catalog type (`"Uncategorized"` when empty)
//! - level 1: catalog number within the type, labelled with the catalog item
//!   name (`"Unnamed Category"` when empty)
//! - level 2: the elements themselves
//!
//! Elements without a catalog number are left out of the tree.

use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{CostElement, ElementHandle};

/// Label for elements without a catalog type.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Label for catalog numbers without an item name.
pub const UNNAMED_CATEGORY: &str = "Unnamed Category";

/// How the root (catalog type) level is ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WbsStrategy {
    /// Create type groups as elements are encountered, then sort the roots by
    /// name.
    #[default]
    SortedRoots,
    /// Create one group per distinct catalog type up front, sorted by name,
    /// and attach elements without re-sorting. Types that only occur on
    /// elements without a catalog number show up as empty groups.
    InsertionOrderRoots,
}

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WbsNodeKind {
    /// Level 0: a catalog type.
    CatalogType,
    /// Level 1: a catalog number.
    Category,
    /// Level 2: an element, by its position in the input slice.
    Element {
        /// Position in the slice the tree was built from.
        index: usize,
        /// The element's handle.
        handle: ElementHandle,
    },
}

/// A node of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WbsNode {
    /// What the node stands for.
    pub kind: WbsNodeKind,
    /// Catalog number, or the element `Id` for leaves.
    pub number: String,
    /// Display label.
    pub name: String,
    /// Child nodes.
    pub children: Vec<WbsNode>,
}

impl WbsNode {
    fn group(kind: WbsNodeKind, number: String, name: String) -> Self {
        Self {
            kind,
            number,
            name,
            children: Vec::new(),
        }
    }
}

/// One row of the flattened tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WbsRow {
    /// Indentation level (0, 1 or 2).
    pub depth: usize,
    /// What the row stands for.
    pub kind: WbsNodeKind,
    /// Catalog number, or the element `Id` for leaves.
    pub number: String,
    /// Display label.
    pub name: String,
}

/// A three-level catalog tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WbsTree {
    /// Catalog type groups.
    pub roots: Vec<WbsNode>,
}

impl WbsTree {
    /// Groups `elements` into a tree.
    ///
    /// Elements are visited in ascending numeric `Id` order (non-numeric ids
    /// count as `0`, ties keep input order). Groups are created on first
    /// encounter and reused.
    #[must_use]
    pub fn build(elements: &[CostElement], strategy: WbsStrategy) -> Self {
        let mut order: Vec<usize> = (0..elements.len()).collect();
        order.sort_by_key(|&index| elements[index].numeric_id());

        let mut roots: Vec<WbsNode> = Vec::new();
        let mut type_positions: HashMap<String, usize> = HashMap::new();

        if strategy == WbsStrategy::InsertionOrderRoots {
            let mut types: Vec<String> = elements.iter().map(catalog_type_label).collect();
            types.sort();
            types.dedup();
            for name in types {
                type_positions.insert(name.clone(), roots.len());
                roots.push(WbsNode::group(WbsNodeKind::CatalogType, String::new(), name));
            }
        }

        let mut category_positions: HashMap<(usize, String), usize> = HashMap::new();

        for index in order {
            let element = &elements[index];
            let number = element.catalog_number.trim();
            if number.is_empty() {
                continue;
            }

            let type_name = catalog_type_label(element);
            let root_position = *type_positions.entry(type_name.clone()).or_insert_with(|| {
                roots.push(WbsNode::group(
                    WbsNodeKind::CatalogType,
                    String::new(),
                    type_name,
                ));
                roots.len() - 1
            });

            let root = &mut roots[root_position];
            let category_position = *category_positions
                .entry((root_position, number.to_string()))
                .or_insert_with(|| {
                    let name = match element.catalog_item_name.trim() {
                        "" => UNNAMED_CATEGORY.to_string(),
                        name => name.to_string(),
                    };
                    root.children.push(WbsNode::group(
                        WbsNodeKind::Category,
                        number.to_string(),
                        name,
                    ));
                    root.children.len() - 1
                });

            root.children[category_position].children.push(WbsNode {
                kind: WbsNodeKind::Element {
                    index,
                    handle: element.handle(),
                },
                number: element.id.clone(),
                name: element.name.clone(),
                children: Vec::new(),
            });
        }

        if strategy == WbsStrategy::SortedRoots {
            roots.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Self { roots }
    }

    /// Pre-order depth-first listing for display.
    ///
    /// Roots keep their tree order; siblings below the root are ordered by
    /// (number, name), comparing numbers numerically where both parse.
    #[must_use]
    pub fn flatten(&self) -> Vec<WbsRow> {
        let mut rows = Vec::new();
        for root in &self.roots {
            push_rows(root, 0, &mut rows);
        }
        rows
    }

    /// Number of element leaves in the tree.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.roots
            .iter()
            .flat_map(|root| &root.children)
            .map(|category| category.children.len())
            .sum()
    }
}

fn catalog_type_label(element: &CostElement) -> String {
    match element.catalog_type.trim() {
        "" => UNCATEGORIZED.to_string(),
        name => name.to_string(),
    }
}

fn push_rows(node: &WbsNode, depth: usize, rows: &mut Vec<WbsRow>) {
    rows.push(WbsRow {
        depth,
        kind: node.kind,
        number: node.number.clone(),
        name: node.name.clone(),
    });

    let mut children: Vec<&WbsNode> = node.children.iter().collect();
    children.sort_by(|a, b| compare_numbers(&a.number, &b.number).then_with(|| a.name.cmp(&b.name)));
    for child in children {
        push_rows(child, depth + 1, rows);
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
    }
}

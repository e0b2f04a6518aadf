//! This bench reads, validates and writes back a generated estimate with a
//! few thousand calculation rows.

#![allow(missing_docs)]

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use novaava::{
    CostElement, ExportMode, Validator,
    domain::{SpecKey, field},
    storage::{self, cef},
};
use tempfile::TempDir;

/// Generates `groups` cost elements with three calculations each.
fn generate(groups: usize) -> Vec<CostElement> {
    let mut elements = Vec::with_capacity(groups * 3);
    for group in 1..=groups {
        for calculation in 1..=3_i64 {
            let mut element = CostElement::new();
            element.id = group.to_string();
            element.id2 = format!("calc-{group}-{calculation}");
            element.calculation_id = calculation;
            element.parent_calc_id = if calculation == 1 { 0 } else { 1 };
            element.order = calculation;
            element.name = format!("Element {group}");
            element.text = format!("Supply and install item {group}.{calculation}");
            element.qu = "m".to_string();
            field::set(&mut element, "QtyResult", "12,5").unwrap();
            element.up = 4.2;
            element.sum = element.up_result();
            element.catalog_type = "Pipes".to_string();
            element.catalog_number = format!("P{}", group % 40);
            element.set_spec(SpecKey::Size, format!("DN {}", 15 + group % 10));
            elements.push(element);
        }
    }
    elements
}

fn import_export(c: &mut Criterion) {
    let elements = generate(1000);
    let document = cef::write(&elements).unwrap();

    c.bench_function("import", |b| {
        b.iter(|| cef::read(&document).unwrap());
    });

    c.bench_function("validate", |b| {
        let validator = Validator::default();
        b.iter(|| validator.validate(&elements, None));
    });

    c.bench_function("export", |b| {
        b.iter_batched(
            || TempDir::new().unwrap(),
            |tmp_dir| {
                storage::export_document(&elements, &tmp_dir.path().join("out.xml"), ExportMode::Cef)
                    .unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, import_export);
criterion_main!(benches);

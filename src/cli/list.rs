use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use novaava::{
    Config, CostElement, ProjectManager,
    domain::number::{AMOUNT_PLACES, format_decimal},
};
use serde::Serialize;
use tracing::instrument;

use super::terminal::{self, Colorize};

/// Command arguments for `ava list`.
#[derive(Debug, Parser)]
#[command(about = "List the elements of a document")]
pub struct List {
    /// Interchange or session file to read
    file: PathBuf,

    /// Output format (default: table).
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,

    /// Only list root calculations.
    #[arg(long)]
    roots: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Serialize)]
struct Row<'a> {
    id: &'a str,
    ident: &'a str,
    level: i64,
    text: &'a str,
    qty: f64,
    unit: &'a str,
    up: f64,
    total: f64,
    catalog_number: &'a str,
}

impl<'a> From<&'a CostElement> for Row<'a> {
    fn from(element: &'a CostElement) -> Self {
        Self {
            id: &element.id,
            ident: &element.ident,
            level: element.tree_level(),
            text: &element.text,
            qty: element.qty_result,
            unit: &element.qu,
            up: element.up,
            total: element.up_result(),
            catalog_number: &element.catalog_number,
        }
    }
}

impl List {
    #[instrument(level = "debug", skip(self, config))]
    pub fn run(self, config: Config) -> anyhow::Result<()> {
        let project = ProjectManager::open(&self.file, config)?;
        let rows: Vec<Row<'_>> = project
            .elements()
            .iter()
            .filter(|element| !self.roots || element.is_parent_node())
            .map(Row::from)
            .collect();

        match self.output {
            OutputFormat::Table => print_table(&rows),
            OutputFormat::Json => {
                serde_json::to_writer_pretty(std::io::stdout(), &rows)?;
                println!();
            }
        }
        Ok(())
    }
}

fn print_table(rows: &[Row<'_>]) {
    if rows.is_empty() {
        println!("{}", "No elements".dim());
        return;
    }

    let narrow = terminal::is_narrow();
    let text_width = if narrow { 24 } else { 40 };
    let amount = |value: f64| format_decimal(value, AMOUNT_PLACES);

    let header = if narrow {
        format!("{:<8} {:<text_width$} {:>12}", "ID", "TEXT", "TOTAL")
    } else {
        format!(
            "{:<8} {:<8} {:<text_width$} {:>10} {:<6} {:>10} {:>12}",
            "ID", "IDENT", "TEXT", "QTY", "UNIT", "UP", "TOTAL"
        )
    };
    println!("{}", header.info());

    for row in rows {
        let indent = if row.level > 0 { "  " } else { "" };
        let text = terminal::truncate(
            &format!("{indent}{}", row.text),
            text_width,
        );
        if narrow {
            println!("{:<8} {text:<text_width$} {:>12}", row.id, amount(row.total));
        } else {
            println!(
                "{:<8} {:<8} {text:<text_width$} {:>10} {:<6} {:>10} {:>12}",
                row.id,
                row.ident,
                amount(row.qty),
                row.unit,
                amount(row.up),
                amount(row.total)
            );
        }
    }

    let total: f64 = rows.iter().map(|row| row.total).sum();
    println!(
        "{}",
        format!("{} elements, total {}", rows.len(), amount(total)).dim()
    );
}

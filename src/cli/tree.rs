use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use novaava::{
    Config, ProjectManager, WbsStrategy,
    domain::wbs::WbsNodeKind,
};
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
#[command(about = "Show the catalog tree of a document")]
pub struct Tree {
    /// Interchange or session file to read
    file: PathBuf,

    /// How catalog types are ordered (defaults to the configured strategy)
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Print the tree as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Sort catalog types by name
    Sorted,
    /// Create all catalog types up front, in name order
    InsertionOrder,
}

impl From<Strategy> for WbsStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Sorted => Self::SortedRoots,
            Strategy::InsertionOrder => Self::InsertionOrderRoots,
        }
    }
}

impl Tree {
    #[instrument(level = "debug", skip(self, config))]
    pub fn run(self, config: Config) -> anyhow::Result<()> {
        let project = ProjectManager::open(&self.file, config)?;
        let tree = match self.strategy {
            Some(strategy) => project.wbs_tree_with(strategy.into()),
            None => project.wbs_tree(),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&tree)?);
            return Ok(());
        }

        for row in tree.flatten() {
            let indent = "  ".repeat(row.depth);
            match row.kind {
                WbsNodeKind::CatalogType => println!("{indent}{}", row.name.info()),
                WbsNodeKind::Category => println!("{indent}{} {}", row.number, row.name),
                WbsNodeKind::Element { .. } => {
                    println!("{indent}{}", format!("{} {}", row.number, row.name).dim());
                }
            }
        }

        let excluded = project.elements().len() - tree.element_count();
        if excluded > 0 {
            println!(
                "{}",
                format!("{excluded} elements without catalog number not shown").dim()
            );
        }
        Ok(())
    }
}

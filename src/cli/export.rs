use std::{io::IsTerminal, path::PathBuf};

use clap::Parser;
use novaava::{Config, ExportMode, ProjectError, ProjectManager, ValidationResult};
use tracing::instrument;

use super::{terminal::Colorize, validate::print_issues};

#[derive(Debug, Parser)]
#[command(about = "Write a document in the interchange or bill-of-quantities format")]
pub struct Export {
    /// Interchange or session file to read
    input: PathBuf,

    /// File to write
    output: PathBuf,

    /// Target format
    #[arg(long, value_enum, default_value_t)]
    mode: Mode,

    /// Export even if validation finds errors
    #[arg(long)]
    force: bool,

    /// Skip the confirmation prompt when validation finds errors
    #[arg(long, short)]
    yes: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Mode {
    /// Grouped interchange format
    #[default]
    Cef,
    /// Flat bill of quantities
    Boq,
}

impl From<Mode> for ExportMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Cef => Self::Cef,
            Mode::Boq => Self::Boq,
        }
    }
}

impl Export {
    #[instrument(level = "debug", skip(self, config))]
    pub fn run(self, config: Config) -> anyhow::Result<()> {
        let project = ProjectManager::open(&self.input, config)?;
        let mode = ExportMode::from(self.mode);

        let result = match project.export_document(&self.output, mode, self.force) {
            Ok(result) => result,
            Err(ProjectError::ValidationFailed { errors }) => {
                print_issues(
                    &ValidationResult {
                        errors,
                        warnings: Vec::new(),
                    },
                    true,
                );
                if !self.confirm()? {
                    println!("Cancelled");
                    std::process::exit(130);
                }
                project.export_document(&self.output, mode, true)?
            }
            Err(e) => return Err(e.into()),
        };

        if !result.warnings.is_empty() {
            println!(
                "{}",
                format!("{} warnings (run 'ava validate' for details)", result.warnings.len())
                    .dim()
            );
        }
        println!(
            "{}",
            format!(
                "✓ Wrote {} elements to {} ({mode})",
                project.elements().len(),
                self.output.display()
            )
            .success()
        );
        Ok(())
    }

    fn confirm(&self) -> anyhow::Result<bool> {
        if self.yes {
            return Ok(true);
        }
        if !std::io::stdin().is_terminal() {
            anyhow::bail!("Validation failed; rerun with --force or --yes to export anyway");
        }
        Ok(dialoguer::Confirm::new()
            .with_prompt("Validation found errors. Export anyway?")
            .default(false)
            .interact()?)
    }
}

use std::path::PathBuf;

use clap::Parser;
use novaava::{Config, ProjectManager, ValidationResult, domain::validation::Severity};
use tracing::instrument;

use super::terminal::{self, Colorize};

#[derive(Debug, Parser)]
#[command(about = "Check a document and report errors and warnings")]
pub struct Validate {
    /// Interchange or session file to check
    file: PathBuf,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Only report errors
    #[arg(long, short)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
    Summary,
}

impl Validate {
    #[instrument(level = "debug", skip(self, config))]
    pub fn run(self, config: Config) -> anyhow::Result<()> {
        let project = ProjectManager::open(&self.file, config)?;
        let result = project.validate();

        match self.output {
            OutputFormat::Table => self.output_table(&result, project.elements().len()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            OutputFormat::Summary => println!(
                "errors={} warnings={}",
                result.errors.len(),
                result.warnings.len()
            ),
        }

        if !result.is_valid() {
            std::process::exit(2);
        }

        Ok(())
    }

    fn output_table(&self, result: &ValidationResult, element_count: usize) {
        print_issues(result, self.quiet);

        if result.is_clean() {
            println!("{}", format!("✓ {element_count} elements, no issues").success());
        } else {
            println!(
                "\n{}",
                format!(
                    "Summary: {} errors, {} warnings in {element_count} elements",
                    result.errors.len(),
                    result.warnings.len()
                )
                .warning()
            );
        }
    }
}

/// Prints one line per finding, errors first. Warnings are skipped when
/// `errors_only` is set.
pub fn print_issues(result: &ValidationResult, errors_only: bool) {
    let width = terminal::terminal_width().map_or(usize::MAX, usize::from);

    for (severity, issue) in result.issues() {
        if errors_only && severity == Severity::Warning {
            continue;
        }
        let location = match (issue.element_id.as_str(), issue.field) {
            ("", None) => String::new(),
            ("", Some(field)) => format!("[{field}] "),
            (id, None) => format!("[{id}] "),
            (id, Some(field)) => format!("[{id}/{field}] "),
        };
        let line = terminal::truncate(&format!("{location}{}", issue.message), width.saturating_sub(2));
        match severity {
            Severity::Error => println!("{} {line}", "✗".error()),
            Severity::Warning => println!("{} {}", "!".warning(), line.dim()),
        }
    }
}

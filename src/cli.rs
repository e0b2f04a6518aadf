use std::path::PathBuf;

mod export;
mod list;
mod properties;
mod terminal;
mod tree;
mod validate;

use anyhow::Context;
use clap::ArgAction;
use export::Export;
use list::List;
use novaava::Config;
use properties::Properties;
use tree::Tree;
use validate::Validate;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        let config = match &self.config {
            Some(path) => Config::load(path)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => Config::default(),
        };

        self.command.run(config)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false)
            .with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Check a document and report errors and warnings
    Validate(Validate),

    /// Write a document in the interchange or bill-of-quantities format
    ///
    /// Export is refused when validation finds errors, unless forced or
    /// confirmed.
    Export(Export),

    /// List the elements of a document
    List(List),

    /// Show the catalog tree of a document
    Tree(Tree),

    /// Encode or decode a SPEC parameter blob
    #[command(subcommand)]
    Properties(Properties),
}

impl Command {
    fn run(self, config: Config) -> anyhow::Result<()> {
        match self {
            Self::Validate(command) => command.run(config)?,
            Self::Export(command) => command.run(config)?,
            Self::List(command) => command.run(config)?,
            Self::Tree(command) => command.run(config)?,
            Self::Properties(command) => command.run()?,
        }
        Ok(())
    }
}

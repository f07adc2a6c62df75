//! CLI argument definitions

use crate::settings::{AgentMode, InspectSettings};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Inspect nginx configurations: logs, status endpoints and certificates
#[derive(Parser)]
#[command(name = "ngx-inspect")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Color output
    #[arg(long, value_enum, default_value = "auto")]
    pub color: ColorChoice,

    /// Settings file (.toml, .yaml or .yml)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the tokens of a single file
    Lex(LexArgs),

    /// Parse a configuration and every file it includes
    Parse(InspectArgs),

    /// Print the merged configuration tree
    Tree(TreeArgs),

    /// Print logs, status URLs and certificates found in a configuration
    Summary(InspectArgs),

    /// Print the files and directories a configuration consists of
    Structure(InspectArgs),

    /// Parse, then report whether the files on disk changed since
    Check(InspectArgs),
}

#[derive(clap::Args)]
pub struct LexArgs {
    /// File to tokenize
    #[arg(default_value = "/etc/nginx/nginx.conf")]
    pub input: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct InspectArgs {
    /// Main configuration file
    #[arg(default_value = "/etc/nginx/nginx.conf")]
    pub input: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Abort a file at its first directive error
    #[arg(long)]
    pub strict: bool,

    /// Report secret file locations too
    #[arg(long)]
    pub privileged: bool,

    /// Comma-separated globs of logs to leave out
    #[arg(long)]
    pub exclude_logs: Option<String>,

    /// Do not collect ssl_certificate files
    #[arg(long)]
    pub no_ssl: bool,
}

impl InspectArgs {
    /// Apply command line overrides on top of file settings
    pub fn apply(&self, settings: &mut InspectSettings) {
        if self.strict {
            settings.strict = true;
        }
        if self.privileged {
            settings.mode = AgentMode::Privileged;
        }
        if let Some(exclude) = &self.exclude_logs {
            settings.exclude_logs = exclude.clone();
        }
        if self.no_ssl {
            settings.upload_ssl = false;
        }
    }
}

#[derive(clap::Args)]
pub struct TreeArgs {
    #[command(flatten)]
    pub inspect: InspectArgs,

    /// Keep the (file, line) provenance of every value
    #[arg(long)]
    pub provenance: bool,
}

#[derive(ValueEnum, Clone, Copy, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

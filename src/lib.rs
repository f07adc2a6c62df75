//! nginx configuration inspector
//!
//! Parses an nginx configuration tree the way nginx reads it, merges every
//! included file into one dense tree and extracts log files, log formats,
//! status and API endpoints and TLS certificates from it. A cheap skim of
//! `include` references decides when a full re-parse is due.

pub mod cli;
pub mod extract;
pub mod inventory;
pub mod ir;
pub mod parsers;
pub mod settings;

pub use inventory::{DirectoryListing, Inventory, Skimmer};
pub use ir::{DenseTree, ProvenanceIndex, SemanticSummary};
pub use parsers::nginx::{DirectiveRules, ParsePayload};
pub use parsers::{ParseError, ParseMode, ParseOptions};
pub use settings::{AgentMode, InspectSettings};

use extract::extract;
use parsers::nginx::{densify, iglob, Densified, NginxParser, ParseOutput};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum InspectError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid settings in {}: {message}", .path.display())]
    Settings { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, InspectError>;

/// Everything one parse pass produced
#[derive(Debug, Clone, Default)]
pub struct ParsePass {
    pub payload: ParsePayload,
    pub tree: DenseTree,
    pub index: ProvenanceIndex,
    /// Absolute include patterns, as written
    pub includes: Vec<PathBuf>,
    pub inventory: Inventory,
    pub summary: SemanticSummary,
}

/// Parse, densify and extract `main` in one pass.
///
/// Caches used along the way live only for the duration of the call.
pub fn run_pass(
    main: &Path,
    settings: &InspectSettings,
    rules: &DirectiveRules,
) -> Result<ParsePass> {
    let parser = NginxParser::new(rules, settings.parse_options());
    let output = parser.parse(main)?;
    let densified = densify(&output.payload, main, &settings.ignored_directives());
    let summary = extract(&densified, &settings.extract_options());
    let inventory = pass_inventory(&output, &densified, settings.upload_ssl);

    Ok(ParsePass {
        payload: output.payload,
        tree: densified.tree,
        index: densified.index,
        includes: densified.includes,
        inventory,
        summary,
    })
}

/// Inventory of every file a pass read or referenced
fn pass_inventory(output: &ParseOutput, densified: &Densified, certificates: bool) -> Inventory {
    let mut inventory = Inventory::default();
    for unit in &output.payload.config {
        inventory.add_file(&unit.file, true);
    }
    for (dir, failure) in &output.broken_directories {
        inventory.mark_broken_directory(dir, failure.clone());
    }
    for pattern in &densified.includes {
        if let Some(dir_pattern) = pattern.parent() {
            for dir in iglob(dir_pattern) {
                inventory.add_directory(&dir, true);
            }
        }
        for path in iglob(pattern) {
            inventory.add_file(&path, true);
        }
    }
    if certificates {
        for cert in &densified.ssl_certificates {
            if let Some(dir) = cert.parent() {
                inventory.add_directory(dir, true);
            }
        }
    }
    inventory
}

/// One monitored nginx configuration.
///
/// Holds the results of the last completed pass. Calls must be serialized
/// by the owner; nothing here locks.
#[derive(Debug)]
pub struct NginxConfig {
    main: PathBuf,
    settings: InspectSettings,
    rules: DirectiveRules,
    skimmer: Skimmer,
    pass: Option<ParsePass>,
    /// Published summary, possibly from an earlier clean pass
    summary: SemanticSummary,
    summary_is_clean: bool,
    /// Skim taken right after the last full parse
    baseline: Option<Inventory>,
}

impl NginxConfig {
    pub fn new(main: impl Into<PathBuf>, settings: InspectSettings) -> Self {
        let main = main.into();
        let rules = settings.rules();
        let skimmer = Skimmer::new(&main, settings.upload_ssl);
        Self {
            main,
            settings,
            rules,
            skimmer,
            pass: None,
            summary: SemanticSummary::default(),
            summary_is_clean: false,
            baseline: None,
        }
    }

    pub fn main(&self) -> &Path {
        &self.main
    }

    pub fn settings(&self) -> &InspectSettings {
        &self.settings
    }

    /// Run a complete pass and publish its results.
    ///
    /// A pass with errors still publishes its payload and tree, but the
    /// summary of the last clean pass is kept until a clean pass replaces
    /// it. When the main file cannot be read nothing is published.
    pub fn full_parse(&mut self) -> Result<()> {
        let pass = run_pass(&self.main, &self.settings, &self.rules)?;

        if pass.payload.is_ok() {
            self.summary = pass.summary.clone();
            self.summary_is_clean = true;
        } else if self.summary_is_clean {
            warn!(
                file = %self.main.display(),
                errors = pass.payload.errors.len(),
                "configuration has errors, keeping previous summary"
            );
        } else {
            self.summary = pass.summary.clone();
        }

        self.baseline = Some(self.skimmer.skim(&self.main));
        self.pass = Some(pass);
        Ok(())
    }

    /// Whether anything on disk changed since the last full parse.
    ///
    /// Compares a fresh skim with the one taken at the last full parse and
    /// re-stats every file that pass read. Directory changes alone never
    /// count.
    pub fn needs_reparse(&self) -> bool {
        let (Some(baseline), Some(pass)) = (&self.baseline, &self.pass) else {
            info!(file = %self.main.display(), "no previous parse");
            return true;
        };

        let skimmed = self.skimmer.skim(&self.main);
        if skimmed.files_differ(baseline) {
            info!(file = %self.main.display(), "referenced files changed");
            return true;
        }

        let mut current = Inventory::default();
        for path in pass.inventory.files.keys().chain(pass.inventory.broken_files.keys()) {
            current.add_file(path, true);
        }
        if current.files_differ(&pass.inventory) {
            info!(file = %self.main.display(), "parsed files changed");
            return true;
        }

        info!(file = %self.main.display(), "configuration unchanged");
        false
    }

    /// Re-parse only when [`needs_reparse`](Self::needs_reparse) says so.
    /// Returns whether a pass ran.
    pub fn refresh(&mut self) -> Result<bool> {
        if !self.needs_reparse() {
            return Ok(false);
        }
        self.full_parse()?;
        Ok(true)
    }

    pub fn pass(&self) -> Option<&ParsePass> {
        self.pass.as_ref()
    }

    pub fn payload(&self) -> Option<&ParsePayload> {
        self.pass.as_ref().map(|p| &p.payload)
    }

    pub fn tree(&self) -> Option<&DenseTree> {
        self.pass.as_ref().map(|p| &p.tree)
    }

    /// The dense tree without provenance
    pub fn simplify(&self) -> serde_json::Value {
        self.tree()
            .map(ir::simplify)
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()))
    }

    pub fn summary(&self) -> &SemanticSummary {
        &self.summary
    }

    pub fn inventory(&self) -> Option<&Inventory> {
        self.pass.as_ref().map(|p| &p.inventory)
    }

    pub fn directory_map(&self) -> BTreeMap<PathBuf, DirectoryListing> {
        self.inventory()
            .map(Inventory::directory_map)
            .unwrap_or_default()
    }
}

//! Inspection settings
//!
//! Settings live under an `[nginx]` table in a TOML or YAML file:
//!
//! ```toml
//! [nginx]
//! exclude_logs = "/var/log/nginx/debug/,*.tmp.log"
//! upload_ssl = true
//! mode = "unprivileged"
//! ```

use crate::extract::{parse_excludes, ExtractOptions};
use crate::parsers::nginx::{DirectiveRules, IGNORED_DIRECTIVES};
use crate::parsers::{ParseMode, ParseOptions};
use crate::InspectError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Whether the agent may report secrets' locations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Privileged,
    #[default]
    Unprivileged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectSettings {
    /// Comma-separated globs of log files to leave out of the summary
    pub exclude_logs: String,
    /// Collect `ssl_certificate` files
    pub upload_ssl: bool,
    pub mode: AgentMode,
    /// Abort a file at its first directive error
    pub strict: bool,
    /// Treat directives missing from the rule table as errors
    pub reject_unknown: bool,
    /// Additional directives to drop from the dense tree
    pub ignore_directives: Vec<String>,
}

impl Default for InspectSettings {
    fn default() -> Self {
        Self {
            exclude_logs: String::new(),
            upload_ssl: true,
            mode: AgentMode::Unprivileged,
            strict: false,
            reject_unknown: false,
            ignore_directives: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    nginx: InspectSettings,
}

impl InspectSettings {
    /// Load from a `.toml`, `.yaml` or `.yml` file
    pub fn load(path: &Path) -> Result<Self, InspectError> {
        let content = fs::read_to_string(path).map_err(|source| InspectError::Settings {
            path: path.to_path_buf(),
            message: source.to_string(),
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        Self::from_text(&content, ext).map_err(|message| InspectError::Settings {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse settings text in the given format (`toml`, `yaml` or `yml`)
    pub fn from_text(content: &str, format: &str) -> Result<Self, String> {
        let file: SettingsFile = match format {
            "toml" => toml::from_str(content).map_err(|e| e.message().to_string())?,
            "yaml" | "yml" => serde_yaml::from_str(content).map_err(|e| e.to_string())?,
            other => return Err(format!("unsupported settings format '{}'", other)),
        };
        Ok(file.nginx)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            mode: if self.strict {
                ParseMode::Strict
            } else {
                ParseMode::Tolerant
            },
            follow_includes: true,
        }
    }

    pub fn rules(&self) -> DirectiveRules {
        if self.reject_unknown {
            DirectiveRules::strict()
        } else {
            DirectiveRules::nginx()
        }
    }

    /// Directives the densifier drops
    pub fn ignored_directives(&self) -> BTreeSet<String> {
        let mut ignored: BTreeSet<String> = self.ignore_directives.iter().cloned().collect();
        if self.mode == AgentMode::Unprivileged {
            ignored.extend(IGNORED_DIRECTIVES.iter().map(|d| d.to_string()));
        }
        ignored
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            exclude_logs: parse_excludes(&self.exclude_logs),
            collect_certificates: self.upload_ssl,
        }
    }
}

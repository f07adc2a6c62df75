//! Semantic summary of a configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Facts derived from the dense tree that the agent reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticSummary {
    /// Access log target to its format and file facts
    pub access_logs: BTreeMap<String, AccessLog>,
    /// Error log target to its level and file facts
    pub error_logs: BTreeMap<String, ErrorLog>,
    /// `log_format` name to its format string
    pub log_formats: BTreeMap<String, String>,
    pub stub_status_urls: Vec<String>,
    pub plus_status_external_urls: Vec<String>,
    pub plus_status_internal_urls: Vec<String>,
    pub api_external_urls: Vec<String>,
    pub api_internal_urls: Vec<String>,
    pub ssl_certificates: BTreeMap<PathBuf, CertificateInfo>,
}

impl SemanticSummary {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLog {
    /// `None` means the default `combined` format
    pub format: Option<String>,
    /// Unset for targets that are not files (`syslog:`)
    pub permissions: Option<String>,
    pub readable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
    pub level: String,
    pub permissions: Option<String>,
    pub readable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub size: u64,
    pub mtime: i64,
    pub permissions: String,
    pub readable: bool,
    /// Decoded from the first certificate in the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x509: Option<CertificateDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDetails {
    pub subject: CertificateName,
    pub issuer: CertificateName,
    /// DNS subject alternative names, or the subject common name without them
    pub names: Vec<String>,
    /// Validity bounds as unix timestamps
    pub not_before: i64,
    pub not_after: i64,
    pub serial: String,
    pub signature_algorithm: String,
}

/// The distinguished name attributes an agent reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

//! Access and error log targets

use crate::parsers::nginx::split_args;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const ERROR_LOG_LEVELS: &[&str] = &[
    "debug", "info", "notice", "warn", "error", "crit", "alert", "emerg",
];

/// Where a log directive writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    /// `syslog:server=...`
    Syslog(String),
    Stderr,
    /// `memory:32m` cyclic buffer
    Memory(String),
}

impl LogTarget {
    /// Classify a log path, resolving relative files against `base_dir`
    pub fn parse(raw: &str, base_dir: &Path) -> Self {
        if raw.starts_with("syslog:") {
            Self::Syslog(raw.to_string())
        } else if raw == "stderr" {
            Self::Stderr
        } else if raw.starts_with("memory:") {
            Self::Memory(raw.to_string())
        } else {
            let path = Path::new(raw);
            if path.is_absolute() {
                Self::File(path.to_path_buf())
            } else {
                Self::File(base_dir.join(path))
            }
        }
    }

    pub fn key(&self) -> String {
        match self {
            Self::File(path) => path.to_string_lossy().into_owned(),
            Self::Syslog(s) | Self::Memory(s) => s.clone(),
            Self::Stderr => "stderr".to_string(),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            _ => None,
        }
    }
}

/// `access_log path [format [buffer=...] [if=...]]`.
/// Returns `None` for `access_log off`.
pub fn parse_access_log(value: &str) -> Option<(String, Option<String>)> {
    let mut parts = split_args(value).into_iter();
    let path = parts.next()?;
    if path == "off" || path.is_empty() {
        return None;
    }
    let format = parts.next().filter(|f| !f.contains('='));
    Some((path, format))
}

/// `error_log path [level]`; unknown or missing levels become `error`
pub fn parse_error_log(value: &str) -> Option<(String, &'static str)> {
    let mut parts = split_args(value).into_iter();
    let path = parts.next()?;
    if path.is_empty() {
        return None;
    }
    let level = parts
        .next()
        .and_then(|l| ERROR_LOG_LEVELS.iter().find(|known| **known == l))
        .copied()
        .unwrap_or("error");
    Some((path, level))
}

/// One `exclude_logs` entry, split into a directory and a file name part
#[derive(Debug, Clone)]
pub struct ExcludePattern {
    dir: Option<Pattern>,
    file: Option<Pattern>,
}

impl ExcludePattern {
    pub fn new(pattern: &str) -> Option<Self> {
        let (dir, file) = match pattern.rfind('/') {
            Some(i) => (&pattern[..=i], &pattern[i + 1..]),
            None => ("", pattern),
        };
        let compile = |p: &str| -> Result<Option<Pattern>, glob::PatternError> {
            if p.is_empty() {
                Ok(None)
            } else {
                Pattern::new(p).map(Some)
            }
        };
        match (compile(dir), compile(file)) {
            (Ok(dir), Ok(file)) => Some(Self { dir, file }),
            (Err(e), _) | (_, Err(e)) => {
                warn!(pattern, error = %e, "ignoring invalid exclude_logs pattern");
                None
            }
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        let (dir, file) = match text.rfind('/') {
            Some(i) => (&text[..=i], &text[i + 1..]),
            None => ("", text.as_ref()),
        };
        self.dir.as_ref().map_or(true, |p| p.matches(dir))
            && self.file.as_ref().map_or(true, |p| p.matches(file))
    }
}

/// Parse a comma-separated `exclude_logs` setting
pub fn parse_excludes(setting: &str) -> Vec<ExcludePattern> {
    setting
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(ExcludePattern::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(path: &str, format: Option<&str>) -> Option<(String, Option<String>)> {
        Some((path.to_string(), format.map(str::to_string)))
    }

    #[test]
    fn test_access_log_parts() {
        assert_eq!(
            parse_access_log("/var/log/nginx/access.log main buffer=32k"),
            access("/var/log/nginx/access.log", Some("main"))
        );
        assert_eq!(
            parse_access_log("/var/log/a.log gzip=9"),
            access("/var/log/a.log", None)
        );
        assert_eq!(parse_access_log("off"), None);
    }

    #[test]
    fn test_quoted_log_paths_keep_their_spaces() {
        assert_eq!(
            parse_access_log("'/var/log/my logs/a.log' main"),
            access("/var/log/my logs/a.log", Some("main"))
        );
        assert_eq!(
            parse_access_log("\"/srv/it's logs/a.log\""),
            access("/srv/it's logs/a.log", None)
        );
        assert_eq!(
            parse_error_log("'/var/log/my logs/e.log' crit"),
            Some(("/var/log/my logs/e.log".to_string(), "crit"))
        );
    }

    #[test]
    fn test_error_log_levels() {
        let error = |value: &str| parse_error_log(value).map(|(_, level)| level);
        assert_eq!(error("/var/log/e.log warn"), Some("warn"));
        assert_eq!(error("/var/log/e.log"), Some("error"));
        assert_eq!(error("/var/log/e.log loud"), Some("error"));
    }

    #[test]
    fn test_log_targets() {
        let base = Path::new("/etc/nginx");
        assert_eq!(
            LogTarget::parse("logs/a.log", base),
            LogTarget::File(PathBuf::from("/etc/nginx/logs/a.log"))
        );
        assert_eq!(LogTarget::parse("stderr", base), LogTarget::Stderr);
        assert!(matches!(
            LogTarget::parse("syslog:server=unix:/dev/log", base),
            LogTarget::Syslog(_)
        ));
        assert!(matches!(LogTarget::parse("memory:32m", base), LogTarget::Memory(_)));
    }

    #[test]
    fn test_exclude_patterns() {
        let path = Path::new("/var/log/nginx/access.log");
        let excluded = |setting: &str| parse_excludes(setting).iter().any(|p| p.matches(path));

        assert!(excluded("*.log"));
        assert!(excluded("/var/log/nginx/"));
        assert!(excluded("/var/log/nginx/*.log"));
        assert!(excluded("/tmp/*, access.log"));
        assert!(!excluded("/var/log/other/"));
        assert!(!excluded("*.txt"));
        assert!(!excluded(""));
    }
}

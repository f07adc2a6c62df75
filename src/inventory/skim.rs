//! Lexer-free scan for `include` and `ssl_certificate` references

use super::Inventory;
use crate::inventory::FsFailure;
use crate::parsers::nginx::{absolutize, iglob};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A statement start followed by a bare, double or single quoted value.
/// The caller checks that a `;` follows the match.
const REFERENCE_PATTERN: &str =
    r##"(?:^|[;{}])\s*(include|ssl_certificate)\s+(?:"([^"#;]*)"|'([^'#;]*)'|([^\s"'#;]+))\s*"##;

/// Follows `include` (and optionally `ssl_certificate`) references by
/// pattern matching alone, recording inventory for every file reached
#[derive(Debug, Clone)]
pub struct Skimmer {
    base_dir: PathBuf,
    include_certificates: bool,
    reference: Regex,
}

impl Skimmer {
    pub fn new(main_config: &Path, include_certificates: bool) -> Self {
        Self {
            base_dir: main_config.parent().map(Path::to_path_buf).unwrap_or_default(),
            include_certificates,
            reference: Regex::new(REFERENCE_PATTERN).expect("reference pattern is valid"),
        }
    }

    pub fn skim(&self, main_config: &Path) -> Inventory {
        let mut inventory = Inventory::default();
        let mut visited = HashSet::new();
        self.skim_file(main_config, &mut inventory, &mut visited);
        debug!(
            file = %main_config.display(),
            files = inventory.files.len(),
            broken = inventory.broken_files.len(),
            "skimmed configuration"
        );
        inventory
    }

    fn skim_file(&self, file: &Path, inventory: &mut Inventory, visited: &mut HashSet<PathBuf>) {
        if !visited.insert(file.to_path_buf()) {
            return;
        }
        let text = match fs::read(file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                inventory.mark_broken_file(file, FsFailure::from_io(&e));
                return;
            }
        };
        inventory.add_file(file, false);

        for line in text.lines() {
            let wanted = line.contains("include")
                || (self.include_certificates && line.contains("ssl_certificate"));
            if !wanted {
                continue;
            }

            for (directive, value) in self.references(line) {
                let pattern = absolutize(&self.base_dir, &value);
                if let Some(dir_pattern) = pattern.parent() {
                    for dir in iglob(dir_pattern) {
                        inventory.add_directory(&dir, true);
                    }
                }
                for path in iglob(&pattern) {
                    if directive == "include" {
                        self.skim_file(&path, inventory, visited);
                    } else {
                        inventory.add_file(&path, false);
                    }
                }
            }
        }
    }

    /// `(directive, path)` pairs of the complete statements on one line
    fn references(&self, line: &str) -> Vec<(String, String)> {
        let mut found = Vec::new();
        for caps in self.reference.captures_iter(line) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if !line[whole.end()..].starts_with(';') {
                continue;
            }
            let directive = &caps[1];
            if directive == "ssl_certificate" && !self.include_certificates {
                continue;
            }
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            found.push((directive.to_string(), value));
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_references() {
        let skimmer = Skimmer::new(Path::new("/etc/nginx/nginx.conf"), true);
        assert_eq!(
            skimmer.references("    include conf.d/*.conf;"),
            vec![("include".to_string(), "conf.d/*.conf".to_string())]
        );
        assert_eq!(
            skimmer.references(r#"server { ssl_certificate "/certs/a b.crt"; include 'x.conf' ;"#),
            vec![
                ("ssl_certificate".to_string(), "/certs/a b.crt".to_string()),
                ("include".to_string(), "x.conf".to_string()),
            ]
        );
        assert!(skimmer.references("# include commented.conf;").is_empty());
        assert!(skimmer.references("ssl_certificate_key key.pem;").is_empty());
        assert!(skimmer.references("include unterminated").is_empty());

        let no_certs = Skimmer::new(Path::new("/etc/nginx/nginx.conf"), false);
        assert!(no_certs.references("ssl_certificate a.crt;").is_empty());
    }

    #[test]
    fn test_skim_follows_includes() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("nginx.conf");
        fs::create_dir(dir.path().join("conf.d")).unwrap();
        fs::write(
            &main,
            "http {\n    include conf.d/*.conf;\n    include missing.conf;\n}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("conf.d/site.conf"),
            "server { ssl_certificate site.crt; include nginx.conf; }\n",
        )
        .unwrap();
        fs::write(dir.path().join("site.crt"), "cert").unwrap();

        let inventory = Skimmer::new(&main, true).skim(&main);
        assert!(inventory.files.contains_key(&main));
        assert!(inventory.files.contains_key(&dir.path().join("conf.d/site.conf")));
        assert!(inventory.broken_files.contains_key(&dir.path().join("missing.conf")));
        assert!(inventory.directories.contains_key(&dir.path().join("conf.d")));

        assert!(inventory.files.contains_key(&dir.path().join("site.crt")));

        let without_certs = Skimmer::new(&main, false).skim(&main);
        assert!(!without_certs.files.contains_key(&dir.path().join("site.crt")));
    }

    #[test]
    fn test_touching_a_file_changes_the_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("nginx.conf");
        fs::write(&main, "user nginx;\n").unwrap();
        let skimmer = Skimmer::new(&main, false);

        let before = skimmer.skim(&main);
        File::options()
            .write(true)
            .open(&main)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        let after = skimmer.skim(&main);

        assert!(before.files_differ(&after));
    }
}

//! Semantic extraction from the dense tree
//!
//! Walks the tree once, collecting log targets and formats, status and API
//! endpoints, and certificate files. Log exclusion is applied after the walk.

mod certificate;
mod listen;
mod location;
mod logs;

pub use certificate::certificate_details;
pub use listen::{parse_listen, Listen};
pub use location::{exemplar, location_path};
pub use logs::{parse_access_log, parse_error_log, parse_excludes, ExcludePattern, LogTarget};

use crate::inventory::{is_readable, stat};
use crate::ir::{AccessLog, CertificateInfo, DenseTree, DenseValue, ErrorLog, SemanticSummary};
use crate::parsers::nginx::Densified;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Policy inputs of the extractor
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub exclude_logs: Vec<ExcludePattern>,
    pub collect_certificates: bool,
}

/// Reduce a densified configuration to its semantic summary
pub fn extract(densified: &Densified, options: &ExtractOptions) -> SemanticSummary {
    let mut walker = Walker {
        densified,
        summary: SemanticSummary::default(),
    };
    walker.walk(&densified.tree, Scope::Main);

    let mut summary = walker.summary;
    if !options.exclude_logs.is_empty() {
        let excluded = |target: &str| {
            let path = Path::new(target);
            path.is_absolute() && options.exclude_logs.iter().any(|p| p.matches(path))
        };
        summary.access_logs.retain(|target, _| !excluded(target));
        summary.error_logs.retain(|target, _| !excluded(target));
    }

    if options.collect_certificates {
        for cert in &densified.ssl_certificates {
            summary
                .ssl_certificates
                .insert(cert.clone(), certificate_info(cert));
        }
    }

    debug!(
        access_logs = summary.access_logs.len(),
        error_logs = summary.error_logs.len(),
        stub_status = summary.stub_status_urls.len(),
        "extracted summary"
    );
    summary
}

fn certificate_info(path: &Path) -> CertificateInfo {
    let Ok(entry) = stat(path) else {
        return CertificateInfo {
            size: 0,
            mtime: 0,
            permissions: "0000".to_string(),
            readable: false,
            x509: None,
        };
    };

    let x509 = fs::read(path).ok().and_then(|data| certificate_details(&data));
    if x509.is_none() {
        debug!(path = %path.display(), "no decodable certificate");
    }

    CertificateInfo {
        size: entry.size,
        mtime: entry.mtime,
        permissions: entry.permissions,
        readable: is_readable(path),
        x509,
    }
}

/// Permission bits and readability of a log file
fn file_facts(path: &Path) -> (Option<String>, Option<bool>) {
    let permissions = stat(path)
        .map(|e| e.permissions)
        .unwrap_or_else(|_| "0000".to_string());
    (Some(permissions), Some(is_readable(path)))
}

/// What the walker is inside of
#[derive(Debug, Clone)]
enum Scope {
    Main,
    Http,
    Server(Server),
    Other,
}

#[derive(Debug, Clone)]
struct Server {
    listens: Vec<Listen>,
    /// First usable `server_name`, for external URLs
    name: Option<String>,
}

impl Server {
    fn from_block(block: &DenseTree) -> Self {
        let ssl_on = block
            .get("ssl")
            .map(|v| v.texts().iter().any(|(t, _)| t.eq_ignore_ascii_case("on")))
            .unwrap_or(false);

        let mut listens: Vec<Listen> = block
            .get("listen")
            .map(|v| {
                v.texts()
                    .into_iter()
                    .filter_map(|(t, _)| parse_listen(t, ssl_on))
                    .collect()
            })
            .unwrap_or_default();
        if block.get("listen").is_none() {
            listens.push(Listen {
                ssl: ssl_on,
                ..Listen::default()
            });
        }

        let name = block
            .get("server_name")
            .and_then(|v| v.texts().first().map(|(t, _)| t.to_string()))
            .and_then(|names| names.split_whitespace().next().map(str::to_string))
            .filter(|n| usable_server_name(n));

        Self { listens, name }
    }
}

fn usable_server_name(name: &str) -> bool {
    !name.is_empty()
        && name != "_"
        && !name.contains('*')
        && !name.starts_with('~')
        && !name.starts_with('.')
}

#[derive(Clone, Copy)]
enum StatusKind {
    Stub,
    Plus,
    Api,
}

struct Walker<'a> {
    densified: &'a Densified,
    summary: SemanticSummary,
}

impl Walker<'_> {
    fn base_dir(&self, index: usize) -> &Path {
        self.densified
            .index
            .file_of(index)
            .and_then(Path::parent)
            .unwrap_or(Path::new("/"))
    }

    fn walk(&mut self, block: &DenseTree, scope: Scope) {
        for (cmd, value) in block {
            match cmd.as_str() {
                "access_log" => self.access_logs(value),
                "error_log" => self.error_logs(value),
                "log_format" => self.log_formats(value),
                "http" if matches!(scope, Scope::Main) => {
                    for (_, http, _) in value.blocks() {
                        self.walk(http, Scope::Http);
                    }
                }
                "server" if matches!(scope, Scope::Http) => {
                    for (_, server, _) in value.blocks() {
                        let cx = Server::from_block(server);
                        if server.contains_key("stub_status") {
                            self.status_urls(StatusKind::Stub, &cx, "/");
                        }
                        self.walk(server, Scope::Server(cx));
                    }
                }
                "location" => {
                    if let Scope::Server(cx) = &scope {
                        for (key, location, _) in value.blocks() {
                            self.location(cx, key.unwrap_or_default(), location);
                        }
                    } else {
                        for (_, location, _) in value.blocks() {
                            self.walk(location, Scope::Other);
                        }
                    }
                }
                _ => {
                    let inner = match &scope {
                        Scope::Server(_) => scope.clone(),
                        _ => Scope::Other,
                    };
                    for (_, child, _) in value.blocks() {
                        self.walk(child, inner.clone());
                    }
                }
            }
        }
    }

    fn location(&mut self, server: &Server, key: &str, block: &DenseTree) {
        if let Some(path) = location_path(key) {
            for (directive, kind) in [
                ("stub_status", StatusKind::Stub),
                ("status", StatusKind::Plus),
                ("api", StatusKind::Api),
            ] {
                if block.contains_key(directive) {
                    self.status_urls(kind, server, &path);
                }
            }
        }
        self.walk(block, Scope::Server(server.clone()));
    }

    fn status_urls(&mut self, kind: StatusKind, server: &Server, path: &str) {
        let summary = &mut self.summary;
        let (internal, external) = match kind {
            StatusKind::Stub => (&mut summary.stub_status_urls, None),
            StatusKind::Plus => (
                &mut summary.plus_status_internal_urls,
                Some(&mut summary.plus_status_external_urls),
            ),
            StatusKind::Api => (
                &mut summary.api_internal_urls,
                Some(&mut summary.api_external_urls),
            ),
        };

        for listen in &server.listens {
            push_unique(internal, listen.url(path));
        }
        if let (Some(external), Some(name)) = (external, &server.name) {
            for listen in &server.listens {
                let public = Listen {
                    host: name.clone(),
                    ..listen.clone()
                };
                push_unique(external, public.url(path));
            }
        }
    }

    fn access_logs(&mut self, value: &DenseValue) {
        for (text, index) in value.texts() {
            let Some((raw, format)) = parse_access_log(text) else {
                continue;
            };
            let target = LogTarget::parse(&raw, self.base_dir(index));
            let (permissions, readable) = target.file().map(file_facts).unwrap_or_default();
            self.summary.access_logs.insert(
                target.key(),
                AccessLog {
                    format,
                    permissions,
                    readable,
                },
            );
        }
    }

    fn error_logs(&mut self, value: &DenseValue) {
        for (text, index) in value.texts() {
            let Some((raw, level)) = parse_error_log(text) else {
                continue;
            };
            let target = LogTarget::parse(&raw, self.base_dir(index));
            let (permissions, readable) = target.file().map(file_facts).unwrap_or_default();
            self.summary.error_logs.insert(
                target.key(),
                ErrorLog {
                    level: level.to_string(),
                    permissions,
                    readable,
                },
            );
        }
    }

    fn log_formats(&mut self, value: &DenseValue) {
        if let DenseValue::Keyed(formats) = value {
            for (name, leaf) in formats {
                if let Some(format) = leaf.text() {
                    self.summary
                        .log_formats
                        .insert(name.clone(), format.to_string());
                }
            }
        }
    }
}

fn push_unique(urls: &mut Vec<String>, url: String) {
    if !urls.contains(&url) {
        urls.push(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::nginx::{densify, DirectiveRules, NginxParser, ParsePayload};
    use crate::parsers::ParseOptions;
    use std::collections::BTreeSet;

    fn summarize(input: &str, options: &ExtractOptions) -> SemanticSummary {
        let rules = DirectiveRules::nginx();
        let main = Path::new("/etc/nginx/nginx.conf");
        let unit = NginxParser::new(&rules, ParseOptions::default()).parse_source(main, input);
        let payload = ParsePayload {
            config: vec![unit],
            ..Default::default()
        };
        let densified = densify(&payload, main, &BTreeSet::new());
        extract(&densified, options)
    }

    #[test]
    fn test_stub_status_with_port_only_listen() {
        let summary = summarize(
            "http { server { listen 81; location /status { stub_status; } } }",
            &ExtractOptions::default(),
        );
        assert_eq!(summary.stub_status_urls, vec!["http://127.0.0.1:81/status"]);
        assert!(summary.plus_status_external_urls.is_empty());
    }

    #[test]
    fn test_status_urls_keep_first_seen_order() {
        let input = r#"
            http {
                server {
                    listen 81;
                    location /zeta { stub_status; }
                    location /alpha { stub_status; }
                    location = /zz_api { api; }
                    location = /api { api; }
                }
            }
        "#;
        let summary = summarize(input, &ExtractOptions::default());
        assert_eq!(
            summary.stub_status_urls,
            vec!["http://127.0.0.1:81/zeta", "http://127.0.0.1:81/alpha"]
        );
        assert_eq!(
            summary.api_internal_urls,
            vec!["http://127.0.0.1:81/zz_api", "http://127.0.0.1:81/api"]
        );
    }

    #[test]
    fn test_quoted_log_path_with_spaces() {
        let summary = summarize(
            r#"http { access_log "/var/log/my logs/a.log" main; }"#,
            &ExtractOptions::default(),
        );
        let keys: Vec<_> = summary.access_logs.keys().collect();
        assert_eq!(keys, vec!["/var/log/my logs/a.log"]);
        assert_eq!(
            summary.access_logs["/var/log/my logs/a.log"].format.as_deref(),
            Some("main")
        );
    }

    #[test]
    fn test_plus_and_api_urls() {
        let input = r#"
            http {
                server {
                    listen 80;
                    server_name www.example.com example.com;
                    location /status { status; }
                    location = /api { api write=on; }
                }
                server {
                    listen 443 ssl;
                    location /status { status; }
                }
            }
        "#;
        let summary = summarize(input, &ExtractOptions::default());
        assert_eq!(
            summary.plus_status_internal_urls,
            vec!["http://127.0.0.1:80/status", "https://127.0.0.1:443/status"]
        );
        assert_eq!(
            summary.plus_status_external_urls,
            vec!["http://www.example.com:80/status"]
        );
        assert_eq!(summary.api_internal_urls, vec!["http://127.0.0.1:80/api"]);
        assert_eq!(summary.api_external_urls, vec!["http://www.example.com:80/api"]);
    }

    #[test]
    fn test_status_urls_are_deduplicated() {
        let input = r#"
            http {
                server { location /nginx_status { stub_status; } }
                server { location /nginx_status { stub_status on; } }
                server { listen 8080; location ~ ^/(basic|nginx)_status$ { stub_status; } }
            }
        "#;
        let summary = summarize(input, &ExtractOptions::default());
        insta::assert_debug_snapshot!(summary.stub_status_urls, @r#"
        [
            "http://127.0.0.1:80/nginx_status",
            "http://127.0.0.1:8080/basic_status",
        ]
        "#);
    }

    #[test]
    fn test_logs_and_formats() {
        let input = r#"
            error_log /var/log/nginx/error.log warn;
            http {
                log_format main '$remote_addr - $status';
                access_log /var/log/nginx/access.log main;
                access_log syslog:server=10.0.0.1 main;
                access_log off;
                server {
                    access_log logs/site.log;
                }
            }
        "#;
        let summary = summarize(input, &ExtractOptions::default());

        assert_eq!(summary.log_formats["main"], "$remote_addr - $status");
        assert_eq!(summary.error_logs["/var/log/nginx/error.log"].level, "warn");

        let access = &summary.access_logs;
        assert_eq!(access.len(), 3);
        assert_eq!(access["/var/log/nginx/access.log"].format.as_deref(), Some("main"));
        assert_eq!(access["/etc/nginx/logs/site.log"].format, None);
        let syslog = &access["syslog:server=10.0.0.1"];
        assert_eq!(syslog.permissions, None);
        assert_eq!(syslog.readable, None);
    }

    #[test]
    fn test_excluded_logs_are_dropped() {
        let input = r#"
            error_log /var/log/nginx/error.log;
            http { access_log /var/log/nginx/access.log; access_log /srv/app.txt; }
        "#;
        let options = ExtractOptions {
            exclude_logs: parse_excludes("*.log"),
            ..Default::default()
        };
        let summary = summarize(input, &options);
        assert!(summary.error_logs.is_empty());
        assert_eq!(summary.access_logs.keys().collect::<Vec<_>>(), vec!["/srv/app.txt"]);
    }

    #[test]
    fn test_certificates_follow_the_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("site.crt");
        std::fs::write(&cert, "-----BEGIN CERTIFICATE-----\n").unwrap();
        let input = format!("http {{ server {{ ssl_certificate {}; }} }}", cert.display());

        let with = summarize(
            &input,
            &ExtractOptions {
                collect_certificates: true,
                ..Default::default()
            },
        );
        let info = &with.ssl_certificates[&cert];
        assert!(info.readable);
        assert_eq!(info.size, 28);
        assert_eq!(info.x509, None);

        let without = summarize(&input, &ExtractOptions::default());
        assert!(without.ssl_certificates.is_empty());
    }
}

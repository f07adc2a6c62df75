//! Statement lists to dense tree conversion
//!
//! Every file's statements are converted once per pass and merged into the
//! including block wherever an `include` refers to them. How repeated
//! directives combine is decided by the directive name alone:
//!
//! - `log_format` is keyed by its name, blocks with arguments by their
//!   argument string (`location /api`)
//! - `include` and `server` blocks are always sequences
//! - `http`, `events` and `types` are never sequences, later ones overwrite
//! - everything else is a scalar until it repeats

use super::include::absolutize;
use super::{ParsePayload, Statement};
use crate::ir::{DenseTree, DenseValue, Leaf, LeafValue, ProvenanceIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ARGDICT_DIRECTIVES: &[&str] = &["log_format"];
const ALWAYS_PACK_DIRECTIVES: &[&str] = &["include"];
const ALWAYS_PACK_BLOCKS: &[&str] = &["server"];
const NEVER_PACK_BLOCKS: &[&str] = &["http", "events", "types"];

/// Directives naming secrets, dropped unless running privileged
pub const IGNORED_DIRECTIVES: &[&str] = &[
    "ssl_certificate_key",
    "ssl_client_certificate",
    "ssl_password_file",
    "ssl_stapling_file",
    "ssl_trusted_certificate",
    "auth_basic_user_file",
    "secure_link_secret",
];

fn is_argdict(cmd: &str) -> bool {
    ARGDICT_DIRECTIVES.contains(&cmd)
}

fn is_always_packed(cmd: &str, is_block: bool) -> bool {
    if is_block {
        ALWAYS_PACK_BLOCKS.contains(&cmd)
    } else {
        ALWAYS_PACK_DIRECTIVES.contains(&cmd)
    }
}

fn is_never_packed(cmd: &str) -> bool {
    NEVER_PACK_BLOCKS.contains(&cmd)
}

/// Output of one densify pass
#[derive(Debug, Clone, Default)]
pub struct Densified {
    pub tree: DenseTree,
    pub index: ProvenanceIndex,
    /// Absolute include patterns, first-seen order
    pub includes: Vec<PathBuf>,
    /// Absolute certificate paths, first-seen order
    pub ssl_certificates: Vec<PathBuf>,
}

/// Converted files of the current pass
#[derive(Debug, Default)]
struct ConvertCache {
    converted: HashMap<PathBuf, DenseTree>,
    in_progress: HashSet<PathBuf>,
}

/// Build the dense tree of `main` from a parse payload
pub fn densify(payload: &ParsePayload, main: &Path, ignored: &BTreeSet<String>) -> Densified {
    let parsed: HashMap<&Path, &[Statement]> = payload
        .config
        .iter()
        .filter(|unit| !unit.parsed.is_empty())
        .map(|unit| (unit.file.as_path(), unit.parsed.as_slice()))
        .collect();

    let converter = Converter {
        parsed,
        base_dir: main.parent().map(Path::to_path_buf).unwrap_or_default(),
        ignored,
    };

    let mut cache = ConvertCache::default();
    let mut out = Densified::default();
    let tree = converter.convert_file(main, &mut cache, &mut out);
    out.tree = tree;
    debug!(
        file = %main.display(),
        leaves = out.index.len(),
        includes = out.includes.len(),
        "densified configuration"
    );
    out
}

struct Converter<'a> {
    parsed: HashMap<&'a Path, &'a [Statement]>,
    base_dir: PathBuf,
    ignored: &'a BTreeSet<String>,
}

impl Converter<'_> {
    fn convert_file(&self, file: &Path, cache: &mut ConvertCache, out: &mut Densified) -> DenseTree {
        if let Some(tree) = cache.converted.get(file) {
            return tree.clone();
        }
        let Some(stmts) = self.parsed.get(file).copied() else {
            return DenseTree::new();
        };
        if !cache.in_progress.insert(file.to_path_buf()) {
            warn!(file = %file.display(), "file includes itself, skipping");
            return DenseTree::new();
        }

        let tree = self.convert_block(file, stmts, cache, out);

        cache.in_progress.remove(file);
        cache.converted.insert(file.to_path_buf(), tree.clone());
        tree
    }

    fn convert_block(
        &self,
        file: &Path,
        stmts: &[Statement],
        cache: &mut ConvertCache,
        out: &mut Densified,
    ) -> DenseTree {
        let mut block = DenseTree::new();

        for stmt in stmts {
            let cmd = stmt.directive.as_str();
            if self.ignored.contains(cmd) {
                continue;
            }

            let value = match &stmt.block {
                Some(inner) => LeafValue::Block(self.convert_block(file, inner, cache, out)),
                None => LeafValue::Text(argstring(stmt)),
            };

            if matches!(cmd, "access_log" | "error_log") {
                if let LeafValue::Text(text) = &value {
                    let empty = stmt.args.first().map_or(true, |a| a.is_empty());
                    if empty || has_unconditional_variable(text) {
                        continue;
                    }
                }
            }

            let index = out.index.add(file, stmt.line);
            store_directive(&mut block, stmt, Leaf { value, index });

            if cmd == "include" {
                if let Some(pattern) = stmt.first_arg() {
                    let pattern = absolutize(&self.base_dir, pattern);
                    if !out.includes.contains(&pattern) {
                        out.includes.push(pattern);
                    }
                }
                for included in stmt.includes.iter().flatten() {
                    let tree = self.convert_file(included, cache, out);
                    merge_blocks(&mut block, tree);
                }
            } else if cmd == "ssl_certificate" {
                if let Some(cert) = stmt.first_arg() {
                    if !cert.is_empty() && !has_unconditional_variable(cert) {
                        // nginx resolves certificates against its prefix, not the including file
                        let cert = absolutize(&self.base_dir, cert);
                        if !out.ssl_certificates.contains(&cert) {
                            out.ssl_certificates.push(cert);
                        }
                    }
                }
            }
        }

        block
    }
}

/// Contains a `$variable` that is not an `if=$condition`
fn has_unconditional_variable(value: &str) -> bool {
    value.contains('$') && !value.contains(" if=$")
}

/// Store one statement's value into `block` according to the packing rules
pub fn store_directive(block: &mut DenseTree, stmt: &Statement, leaf: Leaf) {
    let cmd = stmt.directive.as_str();

    let key = if is_argdict(cmd) {
        stmt.first_arg().map(str::to_string)
    } else if stmt.is_block() && !stmt.args.is_empty() {
        Some(join_args(&stmt.args))
    } else {
        None
    };
    if let Some(key) = key {
        match block.get_mut(cmd) {
            Some(DenseValue::Keyed(map)) => {
                map.insert(key, leaf);
            }
            _ => {
                block.insert(cmd.to_string(), DenseValue::Keyed(BTreeMap::from([(key, leaf)])));
            }
        }
        return;
    }

    if is_always_packed(cmd, stmt.is_block()) {
        match block.get_mut(cmd) {
            Some(DenseValue::Many(leaves)) => leaves.push(leaf),
            _ => {
                block.insert(cmd.to_string(), DenseValue::Many(vec![leaf]));
            }
        }
        return;
    }

    let existing = if is_never_packed(cmd) {
        None
    } else {
        block.remove(cmd)
    };
    let value = match existing {
        Some(DenseValue::Many(mut leaves)) => {
            leaves.push(leaf);
            DenseValue::Many(leaves)
        }
        Some(DenseValue::Leaf(first)) => DenseValue::Many(vec![first, leaf]),
        Some(DenseValue::Keyed(_)) | None => DenseValue::Leaf(leaf),
    };
    block.insert(cmd.to_string(), value);
}

/// Merge an included file's tree into the including block
pub fn merge_blocks(a: &mut DenseTree, b: DenseTree) {
    for (cmd, incoming) in b {
        let existing = if is_never_packed(&cmd) {
            None
        } else {
            a.remove(&cmd)
        };
        let merged = match (existing, incoming) {
            (None, incoming) => incoming,
            (Some(DenseValue::Keyed(mut x)), DenseValue::Keyed(y)) => {
                x.extend(y);
                DenseValue::Keyed(x)
            }
            (Some(DenseValue::Many(mut x)), DenseValue::Many(y)) => {
                x.extend(y);
                DenseValue::Many(x)
            }
            (Some(DenseValue::Many(mut x)), DenseValue::Leaf(y)) => {
                x.push(y);
                DenseValue::Many(x)
            }
            (Some(DenseValue::Leaf(x)), DenseValue::Many(y)) => {
                let mut leaves = vec![x];
                leaves.extend(y);
                DenseValue::Many(leaves)
            }
            (Some(DenseValue::Leaf(x)), DenseValue::Leaf(y)) => DenseValue::Many(vec![x, y]),
            // keyed and unkeyed values do not mix
            (Some(_), incoming) => incoming,
        };
        a.insert(cmd, merged);
    }
}

/// A statement's arguments as one string
pub fn argstring(stmt: &Statement) -> String {
    if stmt.args.is_empty() {
        return String::new();
    }
    if is_argdict(&stmt.directive) {
        let mut rest = &stmt.args[1..];
        if rest.first().is_some_and(|a| a.starts_with("escape=")) {
            rest = &rest[1..];
        }
        return rest.iter().map(|a| unescape(a)).collect();
    }
    join_args(&stmt.args)
}

fn join_args(args: &[String]) -> String {
    args.iter().map(|a| enquote(a)).collect::<Vec<_>>().join(" ")
}

/// Quote an argument that is empty or contains unescaped whitespace
pub fn enquote(arg: &str) -> String {
    if !arg.is_empty() && !has_unescaped_space(arg) {
        return arg.to_string();
    }
    if arg.contains('\'') && !arg.contains('"') {
        format!("\"{}\"", arg)
    } else {
        format!("'{}'", arg)
    }
}

/// Split a string built by [`argstring`] back into its arguments.
///
/// Quotes added by [`enquote`] are removed. Escapes stay as written.
pub fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                current.push(c);
                current.extend(chars.next());
                started = true;
            }
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') if !started => {
                quote = Some(c);
                started = true;
            }
            (None, c) if c.is_whitespace() => {
                if started {
                    args.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            _ => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        args.push(current);
    }
    args
}

fn has_unescaped_space(arg: &str) -> bool {
    let mut chars = arg.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c.is_whitespace() {
            return true;
        }
    }
    false
}

/// Resolve backslash escapes; unknown escapes are kept as written
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('x') => {
                let hex: String = chars.clone().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) if hex.len() == 2 => {
                        out.push(char::from(byte));
                        chars.nth(1);
                    }
                    _ => out.push_str("\\x"),
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::simplify;
    use crate::parsers::nginx::{DirectiveRules, NginxParser};
    use crate::parsers::ParseOptions;
    use serde_json::json;
    use std::fs;

    fn densify_str(input: &str) -> Densified {
        let rules = DirectiveRules::nginx();
        let main = Path::new("/etc/nginx/nginx.conf");
        let unit = NginxParser::new(&rules, ParseOptions::default()).parse_source(main, input);
        let payload = ParsePayload {
            config: vec![unit],
            ..Default::default()
        };
        let ignored = IGNORED_DIRECTIVES.iter().map(|s| s.to_string()).collect();
        densify(&payload, main, &ignored)
    }

    fn densify_dir(dir: &Path) -> Densified {
        let rules = DirectiveRules::nginx();
        let main = dir.join("nginx.conf");
        let output = NginxParser::new(&rules, ParseOptions::default())
            .parse(&main)
            .unwrap();
        densify(&output.payload, &main, &BTreeSet::new())
    }

    #[test]
    fn test_repeated_directive_is_promoted_in_order() {
        let tree = densify_str("http {\n gzip_types a;\n gzip_types b;\n gzip_types c;\n}\n").tree;
        assert_eq!(simplify(&tree), json!({"http": {"gzip_types": ["a", "b", "c"]}}));
    }

    #[test]
    fn test_packing_rules() {
        let input = r#"
            user nginx;
            events { worker_connections 1024; }
            http {
                log_format main '$remote_addr ' '"$request"';
                log_format short $status;
                server { listen 80; location /a { return 200; } }
            }
        "#;
        let tree = densify_str(input).tree;
        assert_eq!(
            simplify(&tree),
            json!({
                "user": "nginx",
                "events": {"worker_connections": "1024"},
                "http": {
                    "log_format": {
                        "main": "$remote_addr \"$request\"",
                        "short": "$status",
                    },
                    "server": [{"listen": "80", "location": {"/a": {"return": "200"}}}],
                },
            })
        );
    }

    #[test]
    fn test_provenance_points_at_statement() {
        let densified = densify_str("user nginx;\nworker_processes 2;\n");
        let DenseValue::Leaf(leaf) = &densified.tree["worker_processes"] else {
            panic!("expected a scalar");
        };
        assert_eq!(
            densified.index.get(leaf.index),
            Some((Path::new("/etc/nginx/nginx.conf"), 2))
        );
    }

    #[test]
    fn test_variable_logs_are_skipped() {
        let input = r#"
            http {
                access_log /var/log/nginx/$host.log;
                access_log /var/log/nginx/cond.log combined if=$loggable;
                access_log "";
                error_log /var/log/nginx/error.log warn;
            }
        "#;
        let tree = densify_str(input).tree;
        assert_eq!(
            simplify(&tree),
            json!({
                "http": {
                    "access_log": "/var/log/nginx/cond.log combined if=$loggable",
                    "error_log": "/var/log/nginx/error.log warn",
                },
            })
        );
    }

    #[test]
    fn test_ignored_directives_are_dropped() {
        let input = "http { ssl_certificate a.crt; ssl_certificate_key a.key; }";
        let densified = densify_str(input);
        assert_eq!(
            simplify(&densified.tree),
            json!({"http": {"ssl_certificate": "a.crt"}})
        );
        assert_eq!(
            densified.ssl_certificates,
            vec![PathBuf::from("/etc/nginx/a.crt")]
        );
    }

    #[test]
    fn test_variable_certificates_are_not_collected() {
        let densified = densify_str("http { ssl_certificate /certs/$ssl_server_name.crt; }");
        assert!(densified.ssl_certificates.is_empty());
    }

    #[test]
    fn test_log_format_escape_parameter_is_dropped() {
        let tree = densify_str("http { log_format json escape=json '{\"s\":\"$status\"}'; }").tree;
        assert_eq!(
            simplify(&tree),
            json!({"http": {"log_format": {"json": "{\"s\":\"$status\"}"}}})
        );
    }

    #[test]
    fn test_included_file_is_merged_at_every_site() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("nginx.conf"),
            "http {\n    include shared.conf;\n    server {\n        include shared.conf;\n    }\n}\n",
        )
        .unwrap();
        fs::write(dir.path().join("shared.conf"), "gzip on;\ngzip_types text/css;\n").unwrap();

        let densified = densify_dir(dir.path());
        assert_eq!(
            simplify(&densified.tree),
            json!({
                "http": {
                    "include": ["shared.conf"],
                    "gzip": "on",
                    "gzip_types": "text/css",
                    "server": [{
                        "include": ["shared.conf"],
                        "gzip": "on",
                        "gzip_types": "text/css",
                    }],
                },
            })
        );
        assert_eq!(densified.includes, vec![dir.path().join("shared.conf")]);
    }

    #[test]
    fn test_included_certificate_resolves_against_main_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sites")).unwrap();
        fs::write(dir.path().join("nginx.conf"), "http { include sites/a.conf; }\n").unwrap();
        fs::write(
            dir.path().join("sites/a.conf"),
            "server { ssl_certificate certs/a.crt; }\n",
        )
        .unwrap();

        let densified = densify_dir(dir.path());
        assert_eq!(densified.ssl_certificates, vec![dir.path().join("certs/a.crt")]);
    }

    #[test]
    fn test_merge_extends_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("nginx.conf"),
            "events { worker_connections 512; }\ninclude extra.conf;\nhttp { server { listen 80; } }\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("extra.conf"),
            "events { worker_connections 1024; }\n",
        )
        .unwrap();

        let densified = densify_dir(dir.path());
        assert_eq!(
            simplify(&densified.tree)["events"],
            json!({"worker_connections": "1024"})
        );

        let mut a = densify_str("http { server { listen 80; } }").tree;
        let b = densify_str("http { server { listen 81; } }").tree;
        let DenseValue::Leaf(Leaf { value: LeafValue::Block(mut http_a), .. }) = a.remove("http").unwrap() else {
            panic!("http is a scalar block");
        };
        let DenseValue::Leaf(Leaf { value: LeafValue::Block(http_b), .. }) = b["http"].clone() else {
            panic!("http is a scalar block");
        };
        merge_blocks(&mut http_a, http_b);
        assert_eq!(
            simplify(&http_a),
            json!({"server": [{"listen": "80"}, {"listen": "81"}]})
        );
    }

    #[test]
    fn test_self_include_terminates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("nginx.conf"), "include nginx.conf;\nuser nginx;\n").unwrap();

        let densified = densify_dir(dir.path());
        assert_eq!(
            simplify(&densified.tree),
            json!({"include": ["nginx.conf"], "user": "nginx"})
        );
    }

    #[test]
    fn test_enquote() {
        assert_eq!(enquote("/var/log/a.log"), "/var/log/a.log");
        assert_eq!(enquote(""), "''");
        assert_eq!(enquote("a b"), "'a b'");
        assert_eq!(enquote("it's here"), "\"it's here\"");
        assert_eq!(enquote(r"a\ b"), r"a\ b");
    }

    #[test]
    fn test_split_args_undoes_enquote() {
        let args = vec![
            "/var/log/my logs/a.log".to_string(),
            "main".to_string(),
            String::new(),
            "it's".to_string(),
            "it's here".to_string(),
            r"a\ b".to_string(),
        ];
        assert_eq!(split_args(&join_args(&args)), args);
        assert_eq!(split_args("  = /status  "), vec!["=", "/status"]);
        assert!(split_args("").is_empty());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\tb\n"), "a\tb\n");
        assert_eq!(unescape(r#"\"q\""#), "\"q\"");
        assert_eq!(unescape(r"\x41\d"), r"A\d");
    }
}

//! Concrete request paths for `location` blocks

use crate::parsers::nginx::split_args;
use regex_syntax::hir::{Class, Hir, HirKind};

/// A request path that the location with this key would match.
///
/// Prefix and exact locations give their path. Regex locations (`~`, `~*`)
/// give an exemplar string generated from the regex. Named locations and
/// anything not starting with `/` give `None`.
pub fn location_path(key: &str) -> Option<String> {
    let parts = split_args(key);
    let raw = parts.last()?.as_str();
    let modifier = if parts.len() > 1 { parts[0].as_str() } else { "" };

    if modifier == "~" || modifier == "~*" {
        let path = exemplar(raw)?;
        return Some(if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        });
    }

    raw.starts_with('/').then(|| raw.to_string())
}

/// One string the regex matches: first alternative, fewest repetitions
pub fn exemplar(pattern: &str) -> Option<String> {
    let hir = regex_syntax::parse(pattern).ok()?;
    let mut out = String::new();
    write_exemplar(&hir, &mut out);
    Some(out)
}

const PREFERRED: &[char] = &['a', '0', '_', '-', '/'];

fn write_exemplar(hir: &Hir, out: &mut String) {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => {}
        HirKind::Literal(literal) => out.push_str(&String::from_utf8_lossy(&literal.0)),
        HirKind::Class(Class::Unicode(class)) => {
            let contains = |c: char| class.ranges().iter().any(|r| r.start() <= c && c <= r.end());
            let pick = PREFERRED
                .iter()
                .copied()
                .find(|c| contains(*c))
                .or_else(|| class.ranges().first().map(|r| r.start()));
            out.extend(pick);
        }
        HirKind::Class(Class::Bytes(class)) => {
            out.extend(class.ranges().first().map(|r| char::from(r.start())));
        }
        HirKind::Repetition(rep) => {
            for _ in 0..rep.min {
                write_exemplar(&rep.sub, out);
            }
        }
        HirKind::Capture(capture) => write_exemplar(&capture.sub, out),
        HirKind::Concat(parts) => {
            for part in parts {
                write_exemplar(part, out);
            }
        }
        HirKind::Alternation(alternatives) => {
            if let Some(first) = alternatives.first() {
                write_exemplar(first, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_and_exact_locations() {
        assert_eq!(location_path("/nginx_status"), Some("/nginx_status".into()));
        assert_eq!(location_path("= /basic_status"), Some("/basic_status".into()));
        assert_eq!(location_path("^~ /images/"), Some("/images/".into()));
        assert_eq!(location_path("'/with space'"), Some("/with space".into()));
        assert_eq!(location_path("= '/a b/status'"), Some("/a b/status".into()));
        assert_eq!(location_path("@fallback"), None);
        assert_eq!(location_path("status"), None);
    }

    #[test]
    fn test_regex_locations() {
        assert_eq!(location_path("~ ^/nginx_status$"), Some("/nginx_status".into()));
        assert_eq!(location_path("~ /(nginx_status|status)"), Some("/nginx_status".into()));
        assert_eq!(location_path("~* ^/Status"), Some("/Status".into()));
        assert_eq!(location_path("~ status_weird_(thing|some)"), Some("/status_weird_thing".into()));
        assert_eq!(location_path("~ ^/v[0-9]+/api"), Some("/v0/api".into()));
        assert_eq!(location_path("~ ^/(broken"), None);
    }

    #[test]
    fn test_exemplar_skips_optional_parts() {
        assert_eq!(exemplar(r"^/stat(us)?\.?$").as_deref(), Some("/stat"));
        assert_eq!(exemplar(r"/x.+").as_deref(), Some("/xa"));
    }
}

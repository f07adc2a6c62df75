//! Directive rule table
//!
//! Rules use nginx's own bitmask layout: low bits encode accepted argument
//! counts and block-ness, high bits encode the contexts a directive may
//! appear in. The table is immutable once built and is handed to the parser
//! by reference.

use super::Statement;
use crate::parsers::{ParseError, Violation};
use std::collections::HashMap;
use std::path::Path;

const NOARGS: u32 = 0x0000_0001;
const TAKE1: u32 = 0x0000_0002;
const TAKE2: u32 = 0x0000_0004;
const TAKE3: u32 = 0x0000_0008;
const TAKE4: u32 = 0x0000_0010;
const BLOCK: u32 = 0x0000_0100;
const FLAG: u32 = 0x0000_0200;
const ANY: u32 = 0x0000_0400;
const ONEMORE: u32 = 0x0000_0800;
const TWOMORE: u32 = 0x0000_1000;

const TAKE12: u32 = TAKE1 | TAKE2;
const TAKE23: u32 = TAKE2 | TAKE3;
const TAKE34: u32 = TAKE3 | TAKE4;
const TAKE123: u32 = TAKE1 | TAKE2 | TAKE3;
const TAKE1234: u32 = TAKE1 | TAKE2 | TAKE3 | TAKE4;

const MAIN: u32 = 0x0004_0000;
const EVENT: u32 = 0x0008_0000;
const MAIL_MAIN: u32 = 0x0010_0000;
const MAIL_SRV: u32 = 0x0020_0000;
const STREAM_MAIN: u32 = 0x0040_0000;
const STREAM_SRV: u32 = 0x0080_0000;
const STREAM_UPS: u32 = 0x0100_0000;
const HTTP_MAIN: u32 = 0x0200_0000;
const HTTP_SRV: u32 = 0x0400_0000;
const HTTP_LOC: u32 = 0x0800_0000;
const HTTP_UPS: u32 = 0x1000_0000;
const HTTP_SIF: u32 = 0x2000_0000;
const HTTP_LIF: u32 = 0x4000_0000;
const HTTP_LMT: u32 = 0x8000_0000;

const HTTP_MSL: u32 = HTTP_MAIN | HTTP_SRV | HTTP_LOC;
const ANY_CONF: u32 = MAIN
    | EVENT
    | MAIL_MAIN
    | MAIL_SRV
    | STREAM_MAIN
    | STREAM_SRV
    | STREAM_UPS
    | HTTP_MAIN
    | HTTP_SRV
    | HTTP_LOC
    | HTTP_UPS
    | HTTP_SIF
    | HTTP_LIF
    | HTTP_LMT;

const ARG_MASK: u32 = 0x0000_ffff;

/// Block contexts the rule table can validate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Main,
    Events,
    Mail,
    MailServer,
    Stream,
    StreamServer,
    StreamUpstream,
    Http,
    HttpServer,
    HttpLocation,
    HttpUpstream,
    HttpServerIf,
    HttpLocationIf,
    HttpLimitExcept,
}

impl Context {
    fn mask(self) -> u32 {
        match self {
            Self::Main => MAIN,
            Self::Events => EVENT,
            Self::Mail => MAIL_MAIN,
            Self::MailServer => MAIL_SRV,
            Self::Stream => STREAM_MAIN,
            Self::StreamServer => STREAM_SRV,
            Self::StreamUpstream => STREAM_UPS,
            Self::Http => HTTP_MAIN,
            Self::HttpServer => HTTP_SRV,
            Self::HttpLocation => HTTP_LOC,
            Self::HttpUpstream => HTTP_UPS,
            Self::HttpServerIf => HTTP_SIF,
            Self::HttpLocationIf => HTTP_LIF,
            Self::HttpLimitExcept => HTTP_LMT,
        }
    }
}

/// Nesting path of block directives, e.g. `http > server > location`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ContextPath(Vec<String>);

impl ContextPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// The path inside a block opened by `directive`.
    /// Locations nested in locations share one context.
    pub fn enter(&self, directive: &str) -> Self {
        if self.0.first().map(String::as_str) == Some("http") && directive == "location" {
            return Self(vec!["http".to_string(), "location".to_string()]);
        }
        let mut inner = self.0.clone();
        inner.push(directive.to_string());
        Self(inner)
    }

    /// The known context this path denotes, if any (`types`, `map`, ... are not)
    pub fn context(&self) -> Option<Context> {
        let parts: Vec<&str> = self.0.iter().map(String::as_str).collect();
        let ctx = match parts.as_slice() {
            [] => Context::Main,
            ["events"] => Context::Events,
            ["mail"] => Context::Mail,
            ["mail", "server"] => Context::MailServer,
            ["stream"] => Context::Stream,
            ["stream", "server"] => Context::StreamServer,
            ["stream", "upstream"] => Context::StreamUpstream,
            ["http"] => Context::Http,
            ["http", "server"] => Context::HttpServer,
            ["http", "location"] => Context::HttpLocation,
            ["http", "upstream"] => Context::HttpUpstream,
            ["http", "server", "if"] => Context::HttpServerIf,
            ["http", "location", "if"] => Context::HttpLocationIf,
            ["http", "location", "limit_except"] => Context::HttpLimitExcept,
            _ => return None,
        };
        Some(ctx)
    }
}

/// One way a directive may legally be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule(u32);

impl Rule {
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn allows(self, ctx: Context) -> bool {
        self.0 & ctx.mask() != 0
    }

    pub fn is_block(self) -> bool {
        self.0 & BLOCK != 0
    }

    fn check(self, args: &[String], opens_block: bool) -> Result<(), Violation> {
        if self.is_block() && !opens_block {
            return Err(Violation::MissingBlock);
        }
        if !self.is_block() && opens_block {
            return Err(Violation::NotTerminated);
        }

        let n = args.len();
        let arity = self.0 & ARG_MASK;
        let is_flag = |arg: &str| arg.eq_ignore_ascii_case("on") || arg.eq_ignore_ascii_case("off");

        if (n <= 7 && (arity >> n) & 1 == 1)
            || (arity & FLAG != 0 && n == 1 && is_flag(&args[0]))
            || arity & ANY != 0
            || (arity & ONEMORE != 0 && n >= 1)
            || (arity & TWOMORE != 0 && n >= 2)
        {
            Ok(())
        } else if arity & FLAG != 0 && n == 1 {
            Err(Violation::InvalidFlag)
        } else {
            Err(Violation::ArgumentCount)
        }
    }
}

/// Immutable directive name to rule lookup
#[derive(Debug, Clone)]
pub struct DirectiveRules {
    rules: HashMap<&'static str, Vec<Rule>>,
    reject_unknown: bool,
}

impl DirectiveRules {
    /// Rules for the stock nginx modules most configurations use.
    /// Unknown directives (third-party modules) pass unchecked.
    pub fn nginx() -> Self {
        let rules = NGINX_RULES
            .iter()
            .map(|(name, bits)| (*name, bits.iter().map(|b| Rule::new(*b)).collect()))
            .collect();
        Self {
            rules,
            reject_unknown: false,
        }
    }

    /// Like [`DirectiveRules::nginx`], but unknown directives are errors
    pub fn strict() -> Self {
        Self {
            reject_unknown: true,
            ..Self::nginx()
        }
    }

    /// A copy of this table with `name` governed by `rules`
    pub fn with_directive(mut self, name: &'static str, rules: Vec<Rule>) -> Self {
        self.rules.insert(name, rules);
        self
    }

    pub fn knows(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Validate one statement found at `ctx`; `opens_block` says whether it
    /// was terminated by `{` rather than `;`
    pub fn analyze(
        &self,
        file: &Path,
        stmt: &Statement,
        opens_block: bool,
        ctx: &ContextPath,
    ) -> Result<(), ParseError> {
        let name = stmt.directive.as_str();
        let Some(masks) = self.rules.get(name) else {
            if self.reject_unknown {
                return Err(ParseError::Directive {
                    file: file.to_path_buf(),
                    line: stmt.line,
                    message: format!("unknown directive \"{}\"", name),
                    violation: Violation::UnknownDirective,
                });
            }
            return Ok(());
        };
        let Some(context) = ctx.context() else {
            return Ok(());
        };

        let allowed: Vec<Rule> = masks.iter().copied().filter(|r| r.allows(context)).collect();
        if allowed.is_empty() {
            return Err(ParseError::DirectiveContext {
                file: file.to_path_buf(),
                line: stmt.line,
                message: format!("\"{}\" directive is not allowed here", name),
            });
        }

        // the first rule is what nginx expects, so its complaint wins
        let mut violation = Violation::ArgumentCount;
        for rule in allowed.iter().rev() {
            match rule.check(&stmt.args, opens_block) {
                Ok(()) => return Ok(()),
                Err(v) => violation = v,
            }
        }

        let message = match violation {
            Violation::MissingBlock => format!("directive \"{}\" has no opening \"{{\"", name),
            Violation::NotTerminated => format!("directive \"{}\" is not terminated by \";\"", name),
            Violation::InvalidFlag => format!(
                "invalid value \"{}\" in \"{}\" directive, it must be \"on\" or \"off\"",
                stmt.args[0], name
            ),
            _ => format!("invalid number of arguments in \"{}\" directive", name),
        };
        Err(ParseError::DirectiveArguments {
            file: file.to_path_buf(),
            line: stmt.line,
            message,
            violation,
        })
    }
}

impl Default for DirectiveRules {
    fn default() -> Self {
        Self::nginx()
    }
}

static NGINX_RULES: &[(&str, &[u32])] = &[
    // core
    ("user", &[MAIN | TAKE12]),
    ("worker_processes", &[MAIN | TAKE1]),
    ("worker_rlimit_nofile", &[MAIN | TAKE1]),
    ("worker_cpu_affinity", &[MAIN | ONEMORE]),
    ("worker_priority", &[MAIN | TAKE1]),
    ("worker_shutdown_timeout", &[MAIN | TAKE1]),
    ("working_directory", &[MAIN | TAKE1]),
    ("pid", &[MAIN | TAKE1]),
    ("lock_file", &[MAIN | TAKE1]),
    ("daemon", &[MAIN | FLAG]),
    ("master_process", &[MAIN | FLAG]),
    ("pcre_jit", &[MAIN | FLAG]),
    ("timer_resolution", &[MAIN | TAKE1]),
    ("thread_pool", &[MAIN | TAKE23]),
    ("env", &[MAIN | TAKE1]),
    ("load_module", &[MAIN | TAKE1]),
    ("include", &[ANY_CONF | TAKE1]),
    (
        "error_log",
        &[MAIN | HTTP_MSL | MAIL_MAIN | MAIL_SRV | STREAM_MAIN | STREAM_SRV | ONEMORE],
    ),
    ("events", &[MAIN | BLOCK | NOARGS]),
    ("http", &[MAIN | BLOCK | NOARGS]),
    ("mail", &[MAIN | BLOCK | NOARGS]),
    ("stream", &[MAIN | BLOCK | NOARGS]),
    // events
    ("worker_connections", &[EVENT | TAKE1]),
    ("use", &[EVENT | TAKE1]),
    ("multi_accept", &[EVENT | FLAG]),
    ("accept_mutex", &[EVENT | FLAG]),
    ("accept_mutex_delay", &[EVENT | TAKE1]),
    ("debug_connection", &[EVENT | TAKE1]),
    // http core
    (
        "server",
        &[
            HTTP_MAIN | BLOCK | NOARGS,
            HTTP_UPS | ONEMORE,
            STREAM_MAIN | BLOCK | NOARGS,
            STREAM_UPS | ONEMORE,
            MAIL_MAIN | BLOCK | NOARGS,
        ],
    ),
    ("location", &[HTTP_SRV | HTTP_LOC | BLOCK | TAKE12]),
    ("upstream", &[HTTP_MAIN | BLOCK | TAKE1, STREAM_MAIN | BLOCK | TAKE1]),
    ("listen", &[HTTP_SRV | ONEMORE, STREAM_SRV | ONEMORE, MAIL_SRV | ONEMORE]),
    ("server_name", &[HTTP_SRV | ONEMORE, MAIL_MAIN | MAIL_SRV | TAKE1]),
    ("root", &[HTTP_MSL | HTTP_LIF | TAKE1]),
    ("alias", &[HTTP_LOC | TAKE1]),
    ("index", &[HTTP_MSL | ONEMORE]),
    ("try_files", &[HTTP_SRV | HTTP_LOC | TWOMORE]),
    ("internal", &[HTTP_LOC | NOARGS]),
    ("types", &[HTTP_MSL | BLOCK | NOARGS]),
    ("default_type", &[HTTP_MSL | TAKE1]),
    ("limit_except", &[HTTP_LOC | BLOCK | ONEMORE]),
    ("sendfile", &[HTTP_MSL | HTTP_LIF | FLAG]),
    ("tcp_nopush", &[HTTP_MSL | FLAG]),
    ("tcp_nodelay", &[HTTP_MSL | FLAG]),
    ("aio", &[HTTP_MSL | TAKE1]),
    ("directio", &[HTTP_MSL | TAKE1]),
    ("output_buffers", &[HTTP_MSL | TAKE2]),
    ("keepalive_timeout", &[HTTP_MSL | TAKE12]),
    ("keepalive_requests", &[HTTP_MSL | TAKE1]),
    ("send_timeout", &[HTTP_MSL | TAKE1]),
    ("reset_timedout_connection", &[HTTP_MSL | FLAG]),
    ("types_hash_max_size", &[HTTP_MSL | TAKE1]),
    ("types_hash_bucket_size", &[HTTP_MSL | TAKE1]),
    ("server_names_hash_max_size", &[HTTP_MAIN | TAKE1]),
    ("server_names_hash_bucket_size", &[HTTP_MAIN | TAKE1]),
    ("server_tokens", &[HTTP_MSL | TAKE1]),
    ("server_name_in_redirect", &[HTTP_MSL | FLAG]),
    ("port_in_redirect", &[HTTP_MSL | FLAG]),
    ("absolute_redirect", &[HTTP_MSL | FLAG]),
    ("underscores_in_headers", &[HTTP_MAIN | HTTP_SRV | FLAG]),
    ("client_max_body_size", &[HTTP_MSL | TAKE1]),
    ("client_body_buffer_size", &[HTTP_MSL | TAKE1]),
    ("client_body_timeout", &[HTTP_MSL | TAKE1]),
    ("client_header_timeout", &[HTTP_MAIN | HTTP_SRV | TAKE1]),
    ("client_header_buffer_size", &[HTTP_MAIN | HTTP_SRV | TAKE1]),
    ("large_client_header_buffers", &[HTTP_MAIN | HTTP_SRV | TAKE2]),
    ("open_file_cache", &[HTTP_MSL | TAKE12]),
    ("error_page", &[HTTP_MSL | HTTP_LIF | TWOMORE]),
    ("recursive_error_pages", &[HTTP_MSL | FLAG]),
    ("satisfy", &[HTTP_MSL | TAKE1]),
    ("resolver", &[HTTP_MSL | ONEMORE, STREAM_MAIN | STREAM_SRV | ONEMORE]),
    ("resolver_timeout", &[HTTP_MSL | TAKE1]),
    ("log_not_found", &[HTTP_MSL | FLAG]),
    ("http2", &[HTTP_MAIN | HTTP_SRV | FLAG]),
    ("autoindex", &[HTTP_MSL | FLAG]),
    ("charset", &[HTTP_MSL | HTTP_LIF | TAKE1]),
    // rewrite
    ("if", &[HTTP_SRV | HTTP_LOC | BLOCK | ONEMORE]),
    (
        "return",
        &[HTTP_SRV | HTTP_SIF | HTTP_LOC | HTTP_LIF | TAKE12, STREAM_SRV | TAKE1],
    ),
    ("rewrite", &[HTTP_SRV | HTTP_SIF | HTTP_LOC | HTTP_LIF | TAKE23]),
    (
        "set",
        &[HTTP_SRV | HTTP_SIF | HTTP_LOC | HTTP_LIF | TAKE2, STREAM_SRV | TAKE2],
    ),
    ("break", &[HTTP_SRV | HTTP_SIF | HTTP_LOC | HTTP_LIF | NOARGS]),
    // logging
    ("log_format", &[HTTP_MAIN | TWOMORE, STREAM_MAIN | TWOMORE]),
    (
        "access_log",
        &[HTTP_MSL | HTTP_LIF | HTTP_LMT | ONEMORE, STREAM_MAIN | STREAM_SRV | ONEMORE],
    ),
    ("open_log_file_cache", &[HTTP_MSL | TAKE1234]),
    // gzip
    ("gzip", &[HTTP_MSL | HTTP_LIF | FLAG]),
    ("gzip_types", &[HTTP_MSL | ONEMORE]),
    ("gzip_disable", &[HTTP_MSL | ONEMORE]),
    ("gzip_comp_level", &[HTTP_MSL | TAKE1]),
    ("gzip_min_length", &[HTTP_MSL | TAKE1]),
    ("gzip_proxied", &[HTTP_MSL | ONEMORE]),
    ("gzip_vary", &[HTTP_MSL | FLAG]),
    ("gzip_http_version", &[HTTP_MSL | TAKE1]),
    ("gzip_buffers", &[HTTP_MSL | TAKE2]),
    ("gzip_static", &[HTTP_MSL | TAKE1]),
    // proxy
    ("proxy_pass", &[HTTP_LOC | HTTP_LIF | HTTP_LMT | TAKE1, STREAM_SRV | TAKE1]),
    ("proxy_set_header", &[HTTP_MSL | TAKE2]),
    ("proxy_buffering", &[HTTP_MSL | FLAG]),
    ("proxy_request_buffering", &[HTTP_MSL | FLAG]),
    ("proxy_buffers", &[HTTP_MSL | TAKE2]),
    ("proxy_buffer_size", &[HTTP_MSL | TAKE1]),
    ("proxy_busy_buffers_size", &[HTTP_MSL | TAKE1]),
    ("proxy_connect_timeout", &[HTTP_MSL | TAKE1, STREAM_MAIN | STREAM_SRV | TAKE1]),
    ("proxy_read_timeout", &[HTTP_MSL | TAKE1]),
    ("proxy_send_timeout", &[HTTP_MSL | TAKE1]),
    ("proxy_timeout", &[STREAM_MAIN | STREAM_SRV | TAKE1]),
    ("proxy_redirect", &[HTTP_MSL | TAKE12]),
    ("proxy_http_version", &[HTTP_MSL | TAKE1]),
    ("proxy_hide_header", &[HTTP_MSL | TAKE1]),
    ("proxy_pass_header", &[HTTP_MSL | TAKE1]),
    ("proxy_intercept_errors", &[HTTP_MSL | FLAG]),
    ("proxy_next_upstream", &[HTTP_MSL | ONEMORE]),
    ("proxy_cache", &[HTTP_MSL | TAKE1]),
    ("proxy_cache_key", &[HTTP_MSL | TAKE1]),
    ("proxy_cache_valid", &[HTTP_MSL | ONEMORE]),
    ("proxy_cache_path", &[HTTP_MAIN | TWOMORE]),
    ("proxy_ssl_verify", &[HTTP_MSL | FLAG]),
    // fastcgi / uwsgi
    ("fastcgi_pass", &[HTTP_LOC | HTTP_LIF | TAKE1]),
    ("fastcgi_param", &[HTTP_MSL | TAKE23]),
    ("fastcgi_index", &[HTTP_MSL | TAKE1]),
    ("fastcgi_split_path_info", &[HTTP_LOC | TAKE1]),
    ("fastcgi_read_timeout", &[HTTP_MSL | TAKE1]),
    ("fastcgi_buffers", &[HTTP_MSL | TAKE2]),
    ("fastcgi_buffer_size", &[HTTP_MSL | TAKE1]),
    ("fastcgi_intercept_errors", &[HTTP_MSL | FLAG]),
    ("uwsgi_pass", &[HTTP_LOC | HTTP_LIF | TAKE1]),
    ("uwsgi_param", &[HTTP_MSL | TAKE23]),
    // headers
    ("add_header", &[HTTP_MSL | HTTP_LIF | TAKE23]),
    ("expires", &[HTTP_MSL | HTTP_LIF | TAKE12]),
    ("sub_filter", &[HTTP_MSL | TAKE2]),
    // access
    ("allow", &[HTTP_MSL | HTTP_LMT | TAKE1, STREAM_MAIN | STREAM_SRV | TAKE1]),
    ("deny", &[HTTP_MSL | HTTP_LMT | TAKE1, STREAM_MAIN | STREAM_SRV | TAKE1]),
    ("auth_basic", &[HTTP_MSL | HTTP_LMT | TAKE1]),
    ("auth_basic_user_file", &[HTTP_MSL | HTTP_LMT | TAKE1]),
    ("secure_link_secret", &[HTTP_LOC | TAKE1]),
    ("real_ip_header", &[HTTP_MSL | TAKE1]),
    ("set_real_ip_from", &[HTTP_MSL | TAKE1]),
    // limits
    ("limit_req_zone", &[HTTP_MAIN | TAKE34]),
    ("limit_req", &[HTTP_MSL | TAKE123]),
    ("limit_conn_zone", &[HTTP_MAIN | TAKE2]),
    ("limit_conn", &[HTTP_MSL | TAKE2]),
    // variables from blocks
    ("map", &[HTTP_MAIN | BLOCK | TAKE2, STREAM_MAIN | BLOCK | TAKE2]),
    ("geo", &[HTTP_MAIN | BLOCK | TAKE12, STREAM_MAIN | BLOCK | TAKE12]),
    ("split_clients", &[HTTP_MAIN | BLOCK | TAKE2]),
    // upstream
    ("keepalive", &[HTTP_UPS | TAKE1]),
    ("least_conn", &[HTTP_UPS | NOARGS, STREAM_UPS | NOARGS]),
    ("ip_hash", &[HTTP_UPS | NOARGS]),
    ("hash", &[HTTP_UPS | TAKE12, STREAM_UPS | TAKE12]),
    ("zone", &[HTTP_UPS | TAKE12, STREAM_UPS | TAKE12]),
    // status
    ("stub_status", &[HTTP_SRV | HTTP_LOC | NOARGS | TAKE1]),
    ("status", &[HTTP_LOC | NOARGS | TAKE1]),
    ("status_zone", &[HTTP_SRV | HTTP_LOC | HTTP_LIF | TAKE1]),
    ("api", &[HTTP_LOC | NOARGS | TAKE1]),
    // ssl
    ("ssl", &[HTTP_MAIN | HTTP_SRV | FLAG, MAIL_MAIN | MAIL_SRV | FLAG]),
    (
        "ssl_certificate",
        &[HTTP_MAIN | HTTP_SRV | TAKE1, STREAM_MAIN | STREAM_SRV | TAKE1, MAIL_MAIN | MAIL_SRV | TAKE1],
    ),
    (
        "ssl_certificate_key",
        &[HTTP_MAIN | HTTP_SRV | TAKE1, STREAM_MAIN | STREAM_SRV | TAKE1, MAIL_MAIN | MAIL_SRV | TAKE1],
    ),
    ("ssl_protocols", &[HTTP_MAIN | HTTP_SRV | ONEMORE, STREAM_MAIN | STREAM_SRV | ONEMORE]),
    ("ssl_ciphers", &[HTTP_MAIN | HTTP_SRV | TAKE1, STREAM_MAIN | STREAM_SRV | TAKE1]),
    ("ssl_prefer_server_ciphers", &[HTTP_MAIN | HTTP_SRV | FLAG]),
    ("ssl_session_cache", &[HTTP_MAIN | HTTP_SRV | TAKE12]),
    ("ssl_session_timeout", &[HTTP_MAIN | HTTP_SRV | TAKE1]),
    ("ssl_dhparam", &[HTTP_MAIN | HTTP_SRV | TAKE1]),
    ("ssl_client_certificate", &[HTTP_MAIN | HTTP_SRV | TAKE1]),
    ("ssl_trusted_certificate", &[HTTP_MAIN | HTTP_SRV | TAKE1]),
    ("ssl_password_file", &[HTTP_MAIN | HTTP_SRV | TAKE1]),
    ("ssl_verify_client", &[HTTP_MAIN | HTTP_SRV | TAKE1]),
    ("ssl_stapling", &[HTTP_MAIN | HTTP_SRV | FLAG]),
    ("ssl_stapling_file", &[HTTP_MAIN | HTTP_SRV | TAKE1]),
    ("ssl_stapling_verify", &[HTTP_MAIN | HTTP_SRV | FLAG]),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(directive: &str, args: &[&str]) -> Statement {
        Statement::new(directive, 1).with_args(args.iter().map(|a| a.to_string()).collect())
    }

    fn ctx(parts: &[&str]) -> ContextPath {
        parts.iter().fold(ContextPath::root(), |c, p| c.enter(p))
    }

    #[test]
    fn test_nested_location_context() {
        let path = ctx(&["http", "server", "location", "location"]);
        assert_eq!(path.context(), Some(Context::HttpLocation));
        assert_eq!(ctx(&["http", "server", "if"]).context(), Some(Context::HttpServerIf));
        assert_eq!(ctx(&["http", "types"]).context(), None);
    }

    #[test]
    fn test_http_not_allowed_in_events() {
        let rules = DirectiveRules::nginx();
        let err = rules
            .analyze(Path::new("nginx.conf"), &stmt("http", &[]), true, &ctx(&["events"]))
            .unwrap_err();
        assert_eq!(err.violation(), Some(Violation::NotAllowedHere));
        assert_eq!(err.reason(), "\"http\" directive is not allowed here");
    }

    #[test]
    fn test_argument_count() {
        let rules = DirectiveRules::nginx();
        let err = rules
            .analyze(Path::new("f"), &stmt("worker_connections", &[]), false, &ctx(&["events"]))
            .unwrap_err();
        assert_eq!(err.violation(), Some(Violation::ArgumentCount));
        assert!(rules
            .analyze(Path::new("f"), &stmt("keepalive_timeout", &["65", "60"]), false, &ctx(&["http"]))
            .is_ok());
    }

    #[test]
    fn test_block_termination() {
        let rules = DirectiveRules::nginx();
        let err = rules
            .analyze(Path::new("f"), &stmt("listen", &["80"]), true, &ctx(&["http", "server"]))
            .unwrap_err();
        assert_eq!(err.violation(), Some(Violation::NotTerminated));
        assert_eq!(err.reason(), "directive \"listen\" is not terminated by \";\"");

        let err = rules
            .analyze(Path::new("f"), &stmt("http", &[]), false, &ctx(&[]))
            .unwrap_err();
        assert_eq!(err.violation(), Some(Violation::MissingBlock));
    }

    #[test]
    fn test_flag_values() {
        let rules = DirectiveRules::nginx();
        let http = ctx(&["http"]);
        assert!(rules.analyze(Path::new("f"), &stmt("gzip", &["On"]), false, &http).is_ok());
        let err = rules
            .analyze(Path::new("f"), &stmt("gzip", &["yes"]), false, &http)
            .unwrap_err();
        assert_eq!(err.violation(), Some(Violation::InvalidFlag));
    }

    #[test]
    fn test_server_in_upstream_is_a_simple_directive() {
        let rules = DirectiveRules::nginx();
        let ups = ctx(&["http", "upstream"]);
        assert!(rules
            .analyze(Path::new("f"), &stmt("server", &["10.0.0.1:8080", "weight=2"]), false, &ups)
            .is_ok());
    }

    #[test]
    fn test_unknown_directives() {
        let lenient = DirectiveRules::nginx();
        let strict = DirectiveRules::strict();
        let s = stmt("more_set_headers", &["X-A: b"]);
        assert!(lenient.analyze(Path::new("f"), &s, false, &ctx(&["http"])).is_ok());
        let err = strict.analyze(Path::new("f"), &s, false, &ctx(&["http"])).unwrap_err();
        assert_eq!(err.violation(), Some(Violation::UnknownDirective));
    }

    #[test]
    fn test_unknown_contexts_are_not_validated() {
        let rules = DirectiveRules::nginx();
        let s = stmt("listen", &[]);
        assert!(rules.analyze(Path::new("f"), &s, false, &ctx(&["http", "map"])).is_ok());
    }

    #[test]
    fn test_custom_rule_variant() {
        let rules = DirectiveRules::nginx().with_directive("vhost_traffic_status", vec![Rule::new(HTTP_MAIN | FLAG)]);
        assert!(rules.knows("vhost_traffic_status"));
        assert!(!DirectiveRules::nginx().knows("vhost_traffic_status"));
    }
}

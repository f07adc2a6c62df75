//! `listen` directive parsing

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize},
    sequence::{delimited, pair, preceded},
    IResult,
};

/// Where a server accepts connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listen {
    /// Host as it appears in a URL (`127.0.0.1`, `[::1]`, `example.com`)
    pub host: String,
    pub port: u16,
    pub ssl: bool,
}

impl Listen {
    pub fn scheme(&self) -> &'static str {
        if self.ssl {
            "https"
        } else {
            "http"
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}://{}:{}{}", self.scheme(), self.host, self.port, path)
    }
}

impl Default for Listen {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 80,
            ssl: false,
        }
    }
}

fn port(input: &str) -> IResult<&str, u16> {
    map_res(digit1, str::parse)(input)
}

fn ipv6(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('['), is_not("]"), char(']')))(input)
}

/// `80`, `[::]:80`, `[::1]`, `*:80`, `10.0.0.1:8080`, `example.com`
fn address(input: &str) -> IResult<&str, (Option<&str>, Option<u16>)> {
    alt((
        all_consuming(map(port, |p| (None, Some(p)))),
        all_consuming(map(pair(ipv6, opt(preceded(char(':'), port))), |(h, p)| {
            (Some(h), p)
        })),
        all_consuming(map(pair(is_not(":"), opt(preceded(char(':'), port))), |(h, p)| {
            (Some(h), p)
        })),
    ))(input)
}

fn is_unix_socket(input: &str) -> bool {
    let unix: IResult<&str, &str> = tag("unix:")(input);
    unix.is_ok()
}

/// Parse a `listen` value such as `[::]:443 ssl http2`.
/// Unix sockets and unparseable addresses yield `None`.
pub fn parse_listen(value: &str, server_ssl: bool) -> Option<Listen> {
    let mut parts = value.split_whitespace();
    let addr = parts.next()?;
    if is_unix_socket(addr) {
        return None;
    }
    let ssl = server_ssl || parts.any(|p| p == "ssl");

    let (_, (host, port)) = address(addr).ok()?;
    let host = match host {
        None | Some("*") | Some("0.0.0.0") => "127.0.0.1",
        Some("[::]") => "[::1]",
        Some(host) => host,
    };
    Some(Listen {
        host: host.to_string(),
        port: port.unwrap_or(80),
        ssl,
    })
}

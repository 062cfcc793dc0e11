//! Endpoint extraction from free-form process output.
//!
//! bitlite announces where the phone listens with two labeled tokens, e.g.
//! `Phone IP: 192.168.1.5` and `Port: 8080`. They may come in either order,
//! with any text (newlines included) between them.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Phone IP: ([0-9.]+)|Port: ([0-9]+)").expect("static regex is valid")
});

/// Where the remote link should be opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Build an endpoint. Returns `None` for an empty host or port 0.
    pub fn new(host: impl Into<String>, port: u16) -> Option<Self> {
        let host = host.into();
        if host.is_empty() || port == 0 {
            return None;
        }
        Some(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// `scheme://host:port`, with no path or query.
    pub fn url(&self, scheme: &str) -> String {
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A labeled value found in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Host(Ipv4Addr),
    Port(u16),
    /// The label was present but its value is unusable (bad address,
    /// port outside 1..=65535).
    Malformed(String),
}

/// A token together with the byte offset just past its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMatch {
    pub token: Token,
    pub end: usize,
}

/// Recognizes the endpoint tokens in text.
///
/// Implementations only describe the text format; buffering across chunks
/// lives in [`super::DiscoveryScanner`].
pub trait EndpointExtractor {
    /// All tokens in `text`, in order of appearance.
    fn tokens(&self, text: &str) -> Vec<TokenMatch>;

    /// Scan complete text for an endpoint.
    ///
    /// The first valid host and the first valid port win; malformed
    /// occurrences are skipped. End of text terminates a token.
    fn scan(&self, text: &str) -> Option<Endpoint> {
        let mut host = None;
        let mut port = None;
        for m in self.tokens(text) {
            match m.token {
                Token::Host(ip) if host.is_none() => host = Some(ip),
                Token::Port(p) if port.is_none() => port = Some(p),
                _ => {}
            }
            if let (Some(ip), Some(p)) = (host, port) {
                return Endpoint::new(ip.to_string(), p);
            }
        }
        None
    }
}

/// Extractor for bitlite's `Phone IP: <ipv4>` / `Port: <decimal>` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhoneIpExtractor;

impl EndpointExtractor for PhoneIpExtractor {
    fn tokens(&self, text: &str) -> Vec<TokenMatch> {
        TOKEN_RE
            .captures_iter(text)
            .filter_map(|caps| {
                if let Some(host) = caps.get(1) {
                    // A sentence may end right after the address.
                    let token = host
                        .as_str()
                        .trim_end_matches('.')
                        .parse::<Ipv4Addr>()
                        .map_or_else(|_| Token::Malformed(host.as_str().to_string()), Token::Host);
                    return Some(TokenMatch {
                        token,
                        end: host.end(),
                    });
                }
                let port = caps.get(2)?;
                let token = match port.as_str().parse::<u16>() {
                    Ok(p) if p != 0 => Token::Port(p),
                    _ => Token::Malformed(port.as_str().to_string()),
                };
                Some(TokenMatch {
                    token,
                    end: port.end(),
                })
            })
            .collect()
    }
}

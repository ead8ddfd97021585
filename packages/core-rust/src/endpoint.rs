//! Host:port endpoints and self-identity.
//!
//! An [`Endpoint`] is the address of one process in the cluster. Parsing
//! accepts `host` or `host:port`; an unspecified port means "the default
//! process port". Self-identity is decided against an explicit
//! [`ProcessIdentity`] rather than process globals, so handlers and tests
//! carry the identity they mean.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The default listening port when an endpoint leaves it unspecified.
pub const DEFAULT_PORT: u16 = 7100;

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// An immutable `host[:port]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    /// `None` means "default process port".
    port: Option<u16>,
}

/// Error parsing an endpoint string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    #[error("endpoint has an empty host")]
    EmptyHost,
    #[error("endpoint has a bad port: {0:?}")]
    BadPort(String),
}

impl Endpoint {
    /// Builds an endpoint from parts. An explicit port of `None` defers to
    /// the default process port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The host label as given.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The effective port: the explicit one, or [`DEFAULT_PORT`].
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// `true` when the host is a loopback alias.
    #[must_use]
    pub fn is_local_host(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
    }

    /// `true` when this endpoint identifies the running process: the
    /// effective port equals the process port and the host is either the
    /// process hostname (compared by first label) or a loopback alias.
    #[must_use]
    pub fn is_self(&self, identity: &ProcessIdentity) -> bool {
        if self.port() != identity.port {
            return false;
        }
        same_hostname(&identity.hostname, &self.host) || self.is_local_host()
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(EndpointParseError::EmptyHost);
        }
        match s.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(EndpointParseError::EmptyHost);
                }
                let port: u16 = port
                    .parse()
                    .ok()
                    .filter(|p| *p > 0)
                    .ok_or_else(|| EndpointParseError::BadPort(port.to_string()))?;
                Ok(Self {
                    host: host.to_string(),
                    port: Some(port),
                })
            }
            None => Ok(Self {
                host: s.to_string(),
                port: None,
            }),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(p) => write!(f, "{}:{p}", self.host),
            None => write!(f, "{}", self.host),
        }
    }
}

// Lexicographic on host, then numeric on effective port.
impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.host
            .cmp(&other.host)
            .then_with(|| self.port().cmp(&other.port()))
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// ProcessIdentity
// ---------------------------------------------------------------------------

/// The identity of the running process: its hostname and listening port.
///
/// Constructed once at startup and passed to whatever needs to answer
/// "is this endpoint me?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub hostname: String,
    pub port: u16,
}

impl ProcessIdentity {
    #[must_use]
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// The endpoint other processes would use to reach this one.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.hostname.clone(), Some(self.port))
    }
}

/// `true` when two strings name the same host, comparing only the label
/// before the first dot: `"nyc1"` and `"nyc1.acme.com"` match.
#[must_use]
pub fn same_hostname(a: &str, b: &str) -> bool {
    let first = |s: &str| s.split('.').next().unwrap_or(s).to_string();
    first(a) == first(b)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- parsing --

    #[test]
    fn parses_host_and_port() {
        let e: Endpoint = "db1.acme.com:27018".parse().unwrap();
        assert_eq!(e.host(), "db1.acme.com");
        assert_eq!(e.port(), 27018);
        assert_eq!(e.to_string(), "db1.acme.com:27018");
    }

    #[test]
    fn parses_bare_host_with_default_port() {
        let e: Endpoint = "db1".parse().unwrap();
        assert_eq!(e.host(), "db1");
        assert_eq!(e.port(), DEFAULT_PORT);
        assert_eq!(e.to_string(), "db1");
    }

    #[test]
    fn rejects_empty_host() {
        assert_eq!("".parse::<Endpoint>(), Err(EndpointParseError::EmptyHost));
        assert_eq!(
            ":123".parse::<Endpoint>(),
            Err(EndpointParseError::EmptyHost)
        );
    }

    #[test]
    fn rejects_bad_ports() {
        for s in ["h:0", "h:-1", "h:abc", "h:99999", "h:"] {
            assert!(
                matches!(s.parse::<Endpoint>(), Err(EndpointParseError::BadPort(_))),
                "{s} should fail"
            );
        }
    }

    // -- ordering --

    #[test]
    fn orders_by_host_then_port() {
        let a: Endpoint = "a:2".parse().unwrap();
        let b: Endpoint = "a:3".parse().unwrap();
        let c: Endpoint = "b:1".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    // -- identity --

    #[test]
    fn same_hostname_compares_first_label() {
        assert!(same_hostname("nyc1", "nyc1.acme.com"));
        assert!(same_hostname("nyc1.foo.com", "nyc1.acme.com"));
        assert!(!same_hostname("nyc1", "nyc2.acme.com"));
    }

    #[test]
    fn local_host_aliases() {
        for h in ["localhost", "127.0.0.1", "::1"] {
            assert!(Endpoint::new(h, None).is_local_host());
        }
        assert!(!Endpoint::new("db1", None).is_local_host());
    }

    #[test]
    fn is_self_requires_matching_port() {
        let me = ProcessIdentity::new("db1.acme.com", 7100);
        assert!("db1:7100".parse::<Endpoint>().unwrap().is_self(&me));
        assert!("localhost:7100".parse::<Endpoint>().unwrap().is_self(&me));
        assert!(!"db1:7101".parse::<Endpoint>().unwrap().is_self(&me));
        assert!(!"db2:7100".parse::<Endpoint>().unwrap().is_self(&me));
    }

    #[test]
    fn is_self_uses_default_port_when_unspecified() {
        let me = ProcessIdentity::new("db1", DEFAULT_PORT);
        assert!("db1".parse::<Endpoint>().unwrap().is_self(&me));
        let elsewhere = ProcessIdentity::new("db1", DEFAULT_PORT + 1);
        assert!(!"db1".parse::<Endpoint>().unwrap().is_self(&elsewhere));
    }

    #[test]
    fn identity_endpoint_resolves_to_self() {
        let me = ProcessIdentity::new("db1", 7200);
        assert!(me.endpoint().is_self(&me));
    }
}

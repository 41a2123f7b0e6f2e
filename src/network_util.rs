//! Address classification and local port probing.
//!
//! These helpers answer two questions the bootstrap keeps asking: can a
//! discovered address be advertised to peers, and which local ports are
//! still usable. Classification never fails on malformed input; it returns
//! a boolean verdict and leaves the decision to the caller.

use std::net::AddrParseError;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Reserved IPv4 networks, as `(base, mask)` pairs.
const PRIVATE_NETWORKS: [(u32, u32); 4] = [
    // 10.0.0.0, 255.0.0.0, RFC 1918
    (0x0A00_0000, 0xFF00_0000),
    // 172.16.0.0, 255.240.0.0, RFC 1918
    (0xAC10_0000, 0xFFF0_0000),
    // 192.168.0.0, 255.255.0.0, RFC 1918
    (0xC0A8_0000, 0xFFFF_0000),
    // 127.0.0.0, 255.0.0.0, RFC 3330
    (0x7F00_0000, 0xFF00_0000),
];

/// How long a local connect attempt may take before the port counts as free.
const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// The IANA registered-port range sampled by [`find_free_port`].
pub const FREE_PORT_RANGE: RangeInclusive<u16> = 1025..=49151;

/// Upper bound on free-port sampling before giving up.
const MAX_PORT_ATTEMPTS: usize = 1 << 16;

/// True iff the string parses as a dotted-quad IPv4 address.
pub fn is_valid_ipv4(address: &str) -> bool {
    Ipv4Addr::from_str(address).is_ok()
}

/// True iff `port` lies in the valid TCP range `1..=65535`.
pub fn is_valid_port(port: i64) -> bool {
    0 < port && port <= i64::from(u16::MAX)
}

/// True iff the transport protocol is one this node can speak.
pub fn is_valid_protocol(protocol: &str) -> bool {
    protocol == "tcp"
}

/// True iff the address is the loopback interface or its hostname alias.
pub fn is_loopback(address: &str) -> bool {
    address.starts_with("127.0.0.") || address == "localhost"
}

/// True iff the address is loopback or falls in a reserved private range.
///
/// A peer cannot be reached through an address for which this returns true,
/// and a NAT probe reporting one indicates a double-NAT setup. Input that is
/// not a valid IPv4 address classifies as not-private.
pub fn is_private(address: &str) -> bool {
    if is_loopback(address) {
        return true;
    }
    let Ok(parsed) = Ipv4Addr::from_str(address) else {
        return false;
    };
    let bits = u32::from(parsed);
    PRIVATE_NETWORKS
        .iter()
        .any(|(base, mask)| bits & mask == *base)
}

/// IP protocol version of a numeric address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

/// Determines the IP version of a numeric address.
///
/// DNS names are the `Err` case; callers treat them as IPv4-style since a
/// hostname's version is not discoverable from its syntax.
pub fn ip_version(address: &str) -> Result<IpVersion, AddrParseError> {
    Ok(match IpAddr::from_str(address)? {
        IpAddr::V4(_) => IpVersion::V4,
        IpAddr::V6(_) => IpVersion::V6,
    })
}

/// A `scheme://host:port` endpoint split into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointUri {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UriParseError {
    #[error("URI {0:?} does not match scheme://host:port")]
    Malformed(String),

    #[error("port in URI {0:?} exceeds 65535")]
    PortOutOfRange(String),
}

fn endpoint_uri_regex() -> &'static Regex {
    static ENDPOINT_URI_RE: OnceLock<Regex> = OnceLock::new();
    ENDPOINT_URI_RE.get_or_init(|| Regex::new(r"^(\w+)://([\w.]+):(\d+)$").expect("static pattern"))
}

/// Splits a `scheme://host:port` URI, where the host is alphanumeric-or-dot.
pub fn parse_endpoint_uri(uri: &str) -> Result<EndpointUri, UriParseError> {
    let captures = endpoint_uri_regex()
        .captures(uri)
        .ok_or_else(|| UriParseError::Malformed(uri.to_string()))?;
    let port = captures[3]
        .parse::<u16>()
        .map_err(|_| UriParseError::PortOutOfRange(uri.to_string()))?;

    Ok(EndpointUri {
        scheme: captures[1].to_string(),
        host: captures[2].to_string(),
        port,
    })
}

/// Formats the transport URL under which a peer advertises itself.
///
/// IPv6 addresses must be bracket-delimited to disambiguate the port
/// separator; downstream URI parsing relies on this exact convention.
/// Hostnames get the IPv4-style form. Never fails.
pub fn format_peer_url(address: &str, port: u16) -> String {
    match ip_version(address) {
        Ok(IpVersion::V6) => format!("tcp://[{address}]:{port}"),
        _ => format!("tcp://{address}:{port}"),
    }
}

/// True iff some process already answers on `127.0.0.1:port`.
///
/// Any connection error, refused and timed out included, reads as "free".
/// That trades precision for liveness: a transient network-stack error can
/// report a bound port as free, but the probe itself never fails.
pub fn is_port_open_locally(port: u16) -> bool {
    let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&target, PORT_PROBE_TIMEOUT).is_ok()
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PortProbeError {
    #[error("no free TCP port in {min}-{max} after {attempts} attempts")]
    Exhausted { min: u16, max: u16, attempts: usize },
}

/// Samples uniformly random ports in `range` until one tests as free.
///
/// The result is only best-effort: another process may grab the port between
/// the probe and the caller's bind. Attempts are bounded so that a nearly
/// exhausted port table surfaces as an error instead of a hang.
pub fn find_free_port(range: RangeInclusive<u16>) -> Result<u16, PortProbeError> {
    let mut rng = rand::rng();
    for _ in 0..MAX_PORT_ATTEMPTS {
        let port = rng.random_range(range.clone());
        if !is_port_open_locally(port) {
            return Ok(port);
        }
        debug!(port, "local TCP port is taken, sampling another");
    }

    Err(PortProbeError::Exhausted {
        min: *range.start(),
        max: *range.end(),
        attempts: MAX_PORT_ATTEMPTS,
    })
}

#[cfg(test)]
mod network_util_tests {
    use std::net::TcpListener;

    use assert2::assert;

    use super::*;

    #[test]
    fn dotted_quad_validation() {
        assert!(is_valid_ipv4("192.168.1.1"));
        assert!(is_valid_ipv4("8.8.8.8"));
        assert!(!is_valid_ipv4("256.0.0.1"));
        assert!(!is_valid_ipv4("example.com"));
        assert!(!is_valid_ipv4("fe80::1"));
    }

    #[test]
    fn port_and_protocol_validation() {
        assert!(is_valid_port(1));
        assert!(is_valid_port(65535));
        assert!(!is_valid_port(0));
        assert!(!is_valid_port(65536));
        assert!(is_valid_protocol("tcp"));
        assert!(!is_valid_protocol("udp"));
    }

    #[test]
    fn loopback_classification() {
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("127.0.0.254"));
        assert!(is_loopback("localhost"));
        assert!(!is_loopback("10.0.0.1"));
        assert!(!is_loopback("8.8.8.8"));
    }

    #[test]
    fn private_ranges_classify_as_private() {
        for addr in [
            "10.0.0.1",
            "10.255.255.254",
            "172.16.0.1",
            "172.31.255.254",
            "192.168.0.1",
            "192.168.255.254",
            "127.0.0.1",
        ] {
            assert!(is_private(addr), "{addr} must classify as private");
        }
    }

    #[test]
    fn public_addresses_classify_as_public() {
        for addr in ["8.8.8.8", "1.1.1.1", "172.32.0.1", "11.0.0.1"] {
            assert!(!is_private(addr), "{addr} must classify as public");
        }
    }

    #[test]
    fn malformed_input_is_not_private() {
        assert!(!is_private("not-an-ip"));
        assert!(!is_private(""));
        assert!(!is_private("10.0.0"));
    }

    #[test]
    fn ip_version_discrimination() {
        assert!(ip_version("192.168.1.5") == Ok(IpVersion::V4));
        assert!(ip_version("fe80::1") == Ok(IpVersion::V6));
        assert!(ip_version("example.com").is_err());
    }

    #[test]
    fn peer_url_for_ipv4() {
        assert!(format_peer_url("192.168.1.5", 1234) == "tcp://192.168.1.5:1234");
    }

    #[test]
    fn peer_url_for_ipv6_is_bracketed() {
        assert!(format_peer_url("fe80::1", 1234) == "tcp://[fe80::1]:1234");
    }

    #[test]
    fn peer_url_for_hostname_does_not_fail() {
        assert!(format_peer_url("seed.bazaar.network", 12345) == "tcp://seed.bazaar.network:12345");
    }

    #[test]
    fn endpoint_uri_round_trip() {
        let parsed = parse_endpoint_uri("tcp://example.com:1234").unwrap();
        assert!(parsed.scheme == "tcp");
        assert!(parsed.host == "example.com");
        assert!(parsed.port == 1234);
    }

    #[test]
    fn endpoint_uri_rejects_malformed_input() {
        for uri in [
            "example.com:1234",
            "tcp://example.com",
            "tcp://example com:1234",
            "tcp://example.com:1234/path",
            "",
        ] {
            assert!(matches!(
                parse_endpoint_uri(uri),
                Err(UriParseError::Malformed(_))
            ));
        }
    }

    #[test]
    fn endpoint_uri_rejects_oversized_port() {
        assert!(matches!(
            parse_endpoint_uri("tcp://example.com:99999"),
            Err(UriParseError::PortOutOfRange(_))
        ));
    }

    #[test]
    fn bound_port_tests_as_open() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_open_locally(port));
    }

    #[test]
    fn found_port_tests_as_free_at_return_time() {
        let port = find_free_port(FREE_PORT_RANGE).unwrap();
        assert!(FREE_PORT_RANGE.contains(&port));
        assert!(!is_port_open_locally(port));
    }
}

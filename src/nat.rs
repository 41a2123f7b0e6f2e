//! NAT discovery, consumed by the context resolver as a single-shot probe.
//!
//! The resolver only wants an answer to "what address and port does the rest
//! of the internet see for this process" and tolerates not getting one. An
//! absent [`NatStatus`] is a degraded-mode signal, not an error; the resolved
//! configuration then falls back to compiled defaults.

use std::net::IpAddr;
use std::net::UdpSocket;
use std::time::Duration;

use anyhow::bail;
use anyhow::ensure;
use anyhow::Context;
use anyhow::Result;
use rand::RngCore;
use tracing::debug;
use tracing::warn;

/// Externally visible address and port, as reported by a discovery server.
///
/// Consumed once during context resolution and discarded; never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NatStatus {
    pub external_ip: IpAddr,
    pub external_port: u16,
}

/// A single-shot source of NAT traversal results.
pub trait NatStatusProvider {
    /// Probes once. `None` means NAT traversal is unavailable; no retries
    /// are performed on behalf of the caller.
    fn probe(&self) -> Option<NatStatus>;
}

/// Discovery servers consulted when no extra pool entries are registered.
pub const DEFAULT_STUN_SERVERS: [&str; 3] = [
    "stun.l.google.com:19302",
    "stun1.l.google.com:19302",
    "stun.cloudflare.com:3478",
];

const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS: u16 = 0x0101;
const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const STUN_MAGIC_COOKIE: u32 = 0x2112_A442;
const STUN_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// STUN-backed NAT discovery over a pool of binding servers.
///
/// The pool starts from [`DEFAULT_STUN_SERVERS`] and can be extended once at
/// process start via [`Self::register_additional_servers`].
#[derive(Clone, Debug)]
pub struct StunNatProvider {
    servers: Vec<String>,
}

impl StunNatProvider {
    pub fn standard() -> Self {
        Self {
            servers: DEFAULT_STUN_SERVERS.map(String::from).to_vec(),
        }
    }

    /// Extends the discovery pool with `host:port` endpoints.
    ///
    /// Idempotent: endpoints already in the pool are dropped.
    pub fn register_additional_servers<I, S>(&mut self, endpoints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for endpoint in endpoints {
            let endpoint = endpoint.into();
            if !self.servers.contains(&endpoint) {
                self.servers.push(endpoint);
            }
        }
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }
}

impl NatStatusProvider for StunNatProvider {
    fn probe(&self) -> Option<NatStatus> {
        for server in &self.servers {
            match binding_request(server) {
                Ok(status) => {
                    debug!(%server, external_ip = %status.external_ip, "NAT probe succeeded");
                    return Some(status);
                }
                Err(err) => debug!(%server, %err, "NAT probe attempt failed"),
            }
        }

        warn!("NAT traversal unavailable; public address and port fall back to defaults");
        None
    }
}

/// Sends one RFC 5389 binding request and decodes the mapped address.
fn binding_request(server: &str) -> Result<NatStatus> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).context("binding probe socket")?;
    socket.set_read_timeout(Some(STUN_PROBE_TIMEOUT))?;

    let mut transaction_id = [0u8; 12];
    rand::rng().fill_bytes(&mut transaction_id);

    let mut request = Vec::with_capacity(20);
    request.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
    request.extend_from_slice(&0u16.to_be_bytes());
    request.extend_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
    request.extend_from_slice(&transaction_id);

    socket
        .send_to(&request, server)
        .with_context(|| format!("sending binding request to {server}"))?;

    let mut response = [0u8; 548];
    let (length, _) = socket
        .recv_from(&mut response)
        .with_context(|| format!("awaiting binding response from {server}"))?;

    parse_binding_response(&response[..length], &transaction_id)
}

fn parse_binding_response(packet: &[u8], transaction_id: &[u8; 12]) -> Result<NatStatus> {
    ensure!(packet.len() >= 20, "truncated STUN header");

    let message_type = u16::from_be_bytes([packet[0], packet[1]]);
    ensure!(
        message_type == BINDING_SUCCESS,
        "unexpected STUN message type {message_type:#06x}"
    );
    ensure!(&packet[8..20] == transaction_id, "transaction id mismatch");

    let message_length = usize::from(u16::from_be_bytes([packet[2], packet[3]]));
    let end = 20 + message_length.min(packet.len() - 20);
    let mut attributes = &packet[20..end];

    while attributes.len() >= 4 {
        let attribute_type = u16::from_be_bytes([attributes[0], attributes[1]]);
        let attribute_length = usize::from(u16::from_be_bytes([attributes[2], attributes[3]]));
        let value = attributes
            .get(4..4 + attribute_length)
            .context("truncated STUN attribute")?;

        match attribute_type {
            ATTR_XOR_MAPPED_ADDRESS => return decode_mapped_address(value, true),
            ATTR_MAPPED_ADDRESS => return decode_mapped_address(value, false),
            _ => {}
        }

        // attribute values are padded to 32-bit boundaries
        let padded = attribute_length + (4 - attribute_length % 4) % 4;
        attributes = attributes.get(4 + padded..).unwrap_or(&[]);
    }

    bail!("binding response carries no mapped address")
}

fn decode_mapped_address(value: &[u8], xored: bool) -> Result<NatStatus> {
    ensure!(value.len() >= 8, "mapped address attribute too short");

    // family: 0x01 = IPv4, 0x02 = IPv6. The probe socket is IPv4-only, so a
    // conforming server always answers with family 0x01.
    let family = value[1];
    ensure!(family == 0x01, "unsupported mapped address family {family:#04x}");

    let mut external_port = u16::from_be_bytes([value[2], value[3]]);
    let mut octets = [value[4], value[5], value[6], value[7]];
    if xored {
        external_port ^= (STUN_MAGIC_COOKIE >> 16) as u16;
        for (octet, key) in octets.iter_mut().zip(STUN_MAGIC_COOKIE.to_be_bytes()) {
            *octet ^= key;
        }
    }

    Ok(NatStatus {
        external_ip: IpAddr::from(octets),
        external_port,
    })
}

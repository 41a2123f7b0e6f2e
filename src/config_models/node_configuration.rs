use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::log_level::LogLevel;
use crate::network_util;

/// Credentials for the auxiliary messaging transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingCredentials {
    pub user: String,
    pub pass: String,
    pub port: u16,
}

/// The fully resolved, immutable set of parameters needed to start exactly
/// one node instance.
///
/// Public fields are read-only, enforced by #[readonly::make]; a record is
/// sealed once by [`NodeConfigurationBuilder::seal`] and reconfiguration
/// means producing a new record. After launch the record is owned by the
/// node runtime; the bootstrap never reads it again.
#[readonly::make]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfiguration {
    /// Externally reachable IP or hostname. Empty while unresolved.
    pub public_address: String,
    pub public_port: u16,
    pub http_address: String,
    /// `None` means the node starter picks a random free port.
    pub http_port: Option<u16>,
    /// Absolute path of this instance's store, unique within a batch.
    pub storage_path: PathBuf,
    pub log_path: PathBuf,
    pub log_level: LogLevel,
    /// Stable market identifier; generated later by the runtime if absent.
    pub identity: Option<String>,
    pub seed_peers: Vec<String>,
    pub seed_mode_enabled: bool,
    pub development_mode_enabled: bool,
    pub upnp_disabled: bool,
    pub nat_check_disabled: bool,
    pub browser_launch_disabled: bool,
    pub storage_encryption_disabled: bool,
    pub ip_monitoring_enabled: bool,
    pub messaging: Option<MessagingCredentials>,
}

impl NodeConfiguration {
    /// The transport URL under which this node advertises itself, or `None`
    /// while the public address is unresolved.
    pub fn peer_url(&self) -> Option<String> {
        if self.public_address.is_empty() {
            return None;
        }
        Some(network_util::format_peer_url(
            &self.public_address,
            self.public_port,
        ))
    }
}

/// Assembles the fields of a [`NodeConfiguration`] before the record is
/// sealed. Only the resolver constructs one.
#[derive(Clone, Debug, Default)]
pub struct NodeConfigurationBuilder {
    pub public_address: String,
    pub public_port: u16,
    pub http_address: String,
    pub http_port: Option<u16>,
    pub storage_path: PathBuf,
    pub log_path: PathBuf,
    pub log_level: LogLevel,
    pub identity: Option<String>,
    pub seed_peers: Vec<String>,
    pub seed_mode_enabled: bool,
    pub development_mode_enabled: bool,
    pub upnp_disabled: bool,
    pub nat_check_disabled: bool,
    pub browser_launch_disabled: bool,
    pub storage_encryption_disabled: bool,
    pub ip_monitoring_enabled: bool,
    pub messaging: Option<MessagingCredentials>,
}

impl NodeConfigurationBuilder {
    pub fn seal(self) -> NodeConfiguration {
        NodeConfiguration {
            public_address: self.public_address,
            public_port: self.public_port,
            http_address: self.http_address,
            http_port: self.http_port,
            storage_path: self.storage_path,
            log_path: self.log_path,
            log_level: self.log_level,
            identity: self.identity,
            seed_peers: self.seed_peers,
            seed_mode_enabled: self.seed_mode_enabled,
            development_mode_enabled: self.development_mode_enabled,
            upnp_disabled: self.upnp_disabled,
            nat_check_disabled: self.nat_check_disabled,
            browser_launch_disabled: self.browser_launch_disabled,
            storage_encryption_disabled: self.storage_encryption_disabled,
            ip_monitoring_enabled: self.ip_monitoring_enabled,
            messaging: self.messaging,
        }
    }
}

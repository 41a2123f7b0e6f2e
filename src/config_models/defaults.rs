//! Compiled-in configuration defaults.
//!
//! One immutable [`Defaults`] value is constructed at process start and
//! passed by reference into the resolver. An optional JSON configuration
//! file overlays individual fields; command-line values still win over
//! both (see [`super::resolver`]).

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use directories::ProjectDirs;
use serde::Deserialize;

use super::log_level::LogLevel;

/// Default peer-to-peer port. Doubles as the CLI sentinel: a `--public-port`
/// equal to this value is indistinguishable from "not given" and loses to a
/// NAT-discovered port.
pub const DEFAULT_P2P_PORT: u16 = 12345;

/// Default bind address of the local control interface.
pub const DEFAULT_HTTP_ADDRESS: &str = "127.0.0.1";

/// Fallback port of the auxiliary messaging transport API.
pub const DEFAULT_MESSAGING_PORT: u16 = 8444;

/// Number of instances started by development mode when `-n` is not given.
pub const DEFAULT_DEV_NODE_COUNT: u16 = 3;

const DEFAULT_STORE_FILE: &str = "bazaar.db";
const DEFAULT_DEV_STORE_TEMPLATE: &str = "bazaar-dev-{}.db";
const DEFAULT_LOG_FILE: &str = "production.log";

const DEFAULT_SEED_HOSTNAMES: [&str; 5] = [
    "seed.bazaar.network",
    "seed2.bazaar.network",
    "seed.openmarkets.io",
    "us.seed.bazaar.network",
    "eu.seed.bazaar.network",
];

/// The compiled-in defaults consulted by the resolver.
#[derive(Clone, Debug)]
pub struct Defaults {
    pub p2p_port: u16,
    pub http_address: String,
    /// `None` means a random free port is picked at instance start.
    pub http_port: Option<u16>,
    pub store_dir: PathBuf,
    pub store_file: String,
    /// Per-instance storage filename template for development mode. Must
    /// contain a `{}` placeholder for the 1-based instance number.
    pub dev_store_template: String,
    pub log_dir: PathBuf,
    pub log_file: String,
    pub log_level: LogLevel,
    pub dev_node_count: u16,
    pub seed_hostnames: Vec<String>,
    pub messaging_port: u16,
    pub development: bool,
    pub seed_mode: bool,
    pub upnp_disabled: bool,
    pub nat_check_disabled: bool,
    pub browser_launch_disabled: bool,
    pub storage_encryption_disabled: bool,
    pub ip_monitoring: bool,
}

impl Defaults {
    /// The stock defaults.
    ///
    /// Store and log directories live under the platform data directory
    /// (e.g. `~/.local/share/bazaar` on Linux), falling back to relative
    /// `db/` and `logs/` when no home directory can be determined.
    pub fn standard() -> Self {
        let project_dirs = ProjectDirs::from("org", "bazaar", "bazaar");
        let (store_dir, log_dir) = match &project_dirs {
            Some(dirs) => (dirs.data_dir().join("db"), dirs.data_dir().join("logs")),
            None => (PathBuf::from("db"), PathBuf::from("logs")),
        };

        Self {
            p2p_port: DEFAULT_P2P_PORT,
            http_address: DEFAULT_HTTP_ADDRESS.to_string(),
            http_port: None,
            store_dir,
            store_file: DEFAULT_STORE_FILE.to_string(),
            dev_store_template: DEFAULT_DEV_STORE_TEMPLATE.to_string(),
            log_dir,
            log_file: DEFAULT_LOG_FILE.to_string(),
            log_level: LogLevel::default(),
            dev_node_count: DEFAULT_DEV_NODE_COUNT,
            seed_hostnames: DEFAULT_SEED_HOSTNAMES.map(String::from).to_vec(),
            messaging_port: DEFAULT_MESSAGING_PORT,
            development: false,
            seed_mode: false,
            upnp_disabled: false,
            nat_check_disabled: false,
            browser_launch_disabled: false,
            storage_encryption_disabled: false,
            ip_monitoring: false,
        }
    }

    /// Stock defaults overlaid with the fields present in a JSON
    /// configuration file. Absent fields keep their stock values.
    pub fn with_config_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {}", path.display()))?;
        let file: FileConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing configuration file {}", path.display()))?;

        Ok(Self::standard().overlaid(file))
    }

    fn overlaid(mut self, file: FileConfig) -> Self {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = file.$field {
                    self.$field = value;
                })*
            };
        }

        overlay!(
            p2p_port,
            http_address,
            http_port,
            store_dir,
            store_file,
            dev_store_template,
            log_dir,
            log_file,
            log_level,
            dev_node_count,
            seed_hostnames,
            messaging_port,
            development,
            seed_mode,
            upnp_disabled,
            nat_check_disabled,
            browser_launch_disabled,
            storage_encryption_disabled,
            ip_monitoring,
        );
        self
    }

    /// Default storage-file path for a production instance.
    pub fn store_path(&self) -> PathBuf {
        self.store_dir.join(&self.store_file)
    }

    /// Default log-file path.
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }
}

/// Partial configuration as read from `--config-file`. Absent (or `null`)
/// fields leave the stock default in place.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    p2p_port: Option<u16>,
    http_address: Option<String>,
    #[allow(clippy::option_option)]
    http_port: Option<Option<u16>>,
    store_dir: Option<PathBuf>,
    store_file: Option<String>,
    dev_store_template: Option<String>,
    log_dir: Option<PathBuf>,
    log_file: Option<String>,
    log_level: Option<LogLevel>,
    dev_node_count: Option<u16>,
    seed_hostnames: Option<Vec<String>>,
    messaging_port: Option<u16>,
    development: Option<bool>,
    seed_mode: Option<bool>,
    upnp_disabled: Option<bool>,
    nat_check_disabled: Option<bool>,
    browser_launch_disabled: Option<bool>,
    storage_encryption_disabled: Option<bool>,
    ip_monitoring: Option<bool>,
}

#[cfg(test)]
mod defaults_tests {
    use std::env;

    use assert2::assert;
    use rand::distr::Alphanumeric;
    use rand::distr::SampleString;

    use super::*;

    fn scratch_file(contents: &str) -> PathBuf {
        let name = Alphanumeric.sample_string(&mut rand::rng(), 16);
        let path = env::temp_dir().join(format!("bazaar-defaults-{name}.json"));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn standard_defaults_are_sane() {
        let defaults = Defaults::standard();

        assert!(defaults.p2p_port == 12345);
        assert!(defaults.http_address == "127.0.0.1");
        assert!(defaults.http_port.is_none());
        assert!(defaults.dev_node_count == 3);
        assert!(defaults.seed_hostnames.len() == 5);
        assert!(defaults.dev_store_template.contains("{}"));
        assert!(!defaults.development);
    }

    #[test]
    fn config_file_overlays_present_fields_only() {
        let path = scratch_file(r#"{"p2p_port": 9999, "seed_mode": true}"#);
        let defaults = Defaults::with_config_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(defaults.p2p_port == 9999);
        assert!(defaults.seed_mode);
        // untouched fields keep their stock values
        assert!(defaults.http_address == "127.0.0.1");
        assert!(defaults.dev_node_count == 3);
    }

    #[test]
    fn config_file_with_unknown_field_is_rejected() {
        let path = scratch_file(r#"{"p2p_prot": 9999}"#);
        let result = Defaults::with_config_file(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let path = env::temp_dir().join("bazaar-defaults-does-not-exist.json");
        assert!(Defaults::with_config_file(&path).is_err());
    }
}

//! Merges command-line input, compiled defaults and NAT discovery into an
//! ordered batch of immutable [`NodeConfiguration`] records.
//!
//! Precedence per field, highest first: explicit CLI value (when
//! distinguishable from its sentinel) > NAT-derived value (public address
//! and port only) > compiled default. Development mode expands the batch to
//! one record per instance, each with its own storage path.
//!
//! Resolution has no side effects; directories and stores are created later
//! by the provisioner.

use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;

use super::cli_args::StartArgs;
use super::defaults;
use super::defaults::Defaults;
use super::node_configuration::MessagingCredentials;
use super::node_configuration::NodeConfiguration;
use super::node_configuration::NodeConfigurationBuilder;
use crate::nat::NatStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigResolutionError {
    #[error("{what} port must lie in 1-65535")]
    PortOutOfRange { what: &'static str },

    #[error("development storage template {template:?} has no {{}} placeholder")]
    InvalidStorageTemplate { template: String },

    #[error("development mode needs at least one instance")]
    NoInstances,
}

/// Resolves the effective configuration for one bootstrap invocation.
///
/// Returns one record in production mode and `dev_node_count` records in
/// development mode, in launch order. Fails before any record is built when
/// a port is out of range or the development storage template is unusable.
pub fn resolve(
    cli: &StartArgs,
    defaults: &Defaults,
    nat_status: Option<&NatStatus>,
) -> Result<Vec<NodeConfiguration>, ConfigResolutionError> {
    let development_mode = cli.development_mode || defaults.development;

    // public address: explicit CLI value, else NAT discovery, else unresolved
    let public_address = match (&cli.public_address, nat_status) {
        (Some(address), _) => address.clone(),
        (None, Some(nat)) => nat.external_ip.to_string(),
        (None, None) => String::new(),
    };

    // public port: a CLI value equal to the sentinel is indistinguishable
    // from "not given" and loses to the NAT-discovered port
    let public_port = if cli.public_port != defaults::DEFAULT_P2P_PORT {
        cli.public_port
    } else if let Some(nat) = nat_status {
        nat.external_port
    } else {
        defaults.p2p_port
    };
    validate_port("public", i64::from(public_port))?;

    let http_port = cli.http_port.or(defaults.http_port);
    if let Some(port) = http_port {
        validate_port("http", i64::from(port))?;
    }

    let messaging = resolve_messaging(cli, defaults)?;

    let log_path = cli.log_path.clone().unwrap_or_else(|| defaults.log_path());
    let log_level = cli.log_level.unwrap_or(defaults.log_level);

    // the default seed list is only ever extended, never replaced
    let mut seed_peers = defaults.seed_hostnames.clone();
    seed_peers.extend(cli.seeds.iter().cloned());

    let builder = NodeConfigurationBuilder {
        public_address,
        public_port,
        http_address: cli.http_address.clone(),
        http_port,
        // filled in per record below
        storage_path: PathBuf::new(),
        log_path,
        log_level,
        identity: cli.identity.clone(),
        seed_peers,
        seed_mode_enabled: cli.seed_mode || defaults.seed_mode,
        development_mode_enabled: development_mode,
        // NAT traversal is meaningless on loopback setups, so development
        // mode forces both escape hatches off
        upnp_disabled: cli.disable_upnp || defaults.upnp_disabled || development_mode,
        nat_check_disabled: cli.disable_nat_check
            || defaults.nat_check_disabled
            || development_mode,
        browser_launch_disabled: cli.disable_browser_launch || defaults.browser_launch_disabled,
        storage_encryption_disabled: cli.disable_storage_encryption
            || defaults.storage_encryption_disabled,
        ip_monitoring_enabled: cli.enable_ip_monitoring || defaults.ip_monitoring,
        messaging,
    };

    let configs = if development_mode {
        let count = cli.dev_node_count.unwrap_or(defaults.dev_node_count);
        if count == 0 {
            return Err(ConfigResolutionError::NoInstances);
        }

        let mut batch = Vec::with_capacity(usize::from(count));
        for instance in 1..=count {
            let mut instance_builder = builder.clone();
            instance_builder.storage_path = dev_store_path(defaults, instance)?;
            batch.push(instance_builder.seal());
        }
        batch
    } else {
        let mut production_builder = builder;
        production_builder.storage_path = cli
            .storage_path
            .clone()
            .unwrap_or_else(|| defaults.store_path());
        vec![production_builder.seal()]
    };

    debug_assert!(
        configs
            .iter()
            .map(|config| &config.storage_path)
            .collect::<HashSet<_>>()
            .len()
            == configs.len(),
        "storage paths within a batch must be pairwise distinct"
    );

    Ok(configs)
}

/// Storage path of the `instance`-th development node (1-based).
fn dev_store_path(
    defaults: &Defaults,
    instance: u16,
) -> Result<PathBuf, ConfigResolutionError> {
    let template = &defaults.dev_store_template;
    if !template.contains("{}") {
        return Err(ConfigResolutionError::InvalidStorageTemplate {
            template: template.clone(),
        });
    }

    let file_name = template.replacen("{}", &instance.to_string(), 1);
    Ok(defaults.store_dir.join(file_name))
}

/// Messaging credentials materialize only when both user and password were
/// given; the port falls back to its default.
fn resolve_messaging(
    cli: &StartArgs,
    defaults: &Defaults,
) -> Result<Option<MessagingCredentials>, ConfigResolutionError> {
    let (Some(user), Some(pass)) = (&cli.messaging_user, &cli.messaging_pass) else {
        return Ok(None);
    };

    let port = cli.messaging_port.unwrap_or(defaults.messaging_port);
    validate_port("messaging", i64::from(port))?;

    Ok(Some(MessagingCredentials {
        user: user.clone(),
        pass: pass.clone(),
        port,
    }))
}

fn validate_port(what: &'static str, port: i64) -> Result<(), ConfigResolutionError> {
    if crate::network_util::is_valid_port(port) {
        Ok(())
    } else {
        Err(ConfigResolutionError::PortOutOfRange { what })
    }
}

#[cfg(test)]
mod resolver_tests {
    use std::collections::HashSet;
    use std::net::IpAddr;
    use std::str::FromStr;

    use assert2::assert;

    use super::*;
    use crate::config_models::log_level::LogLevel;

    fn nat_status(ip: &str, port: u16) -> NatStatus {
        NatStatus {
            external_ip: IpAddr::from_str(ip).unwrap(),
            external_port: port,
        }
    }

    #[test]
    fn production_mode_yields_a_single_record() {
        let configs = resolve(&StartArgs::default(), &Defaults::standard(), None).unwrap();

        assert!(configs.len() == 1);
        let config = &configs[0];
        assert!(config.public_address.is_empty());
        assert!(config.public_port == 12345);
        assert!(!config.development_mode_enabled);
        assert!(!config.nat_check_disabled);
    }

    #[test]
    fn nat_status_fills_unresolved_address_and_port() {
        let nat = nat_status("203.0.113.77", 9999);
        let configs = resolve(&StartArgs::default(), &Defaults::standard(), Some(&nat)).unwrap();

        let config = &configs[0];
        assert!(config.public_address == "203.0.113.77");
        // CLI port equals the default sentinel, so NAT wins over the default
        assert!(config.public_port == 9999);
    }

    #[test]
    fn explicit_cli_port_beats_nat_status() {
        let mut cli = StartArgs::default();
        cli.public_port = 4567;
        let nat = nat_status("203.0.113.77", 9999);

        let configs = resolve(&cli, &Defaults::standard(), Some(&nat)).unwrap();
        assert!(configs[0].public_port == 4567);
    }

    #[test]
    fn explicit_cli_address_beats_nat_status() {
        let mut cli = StartArgs::default();
        cli.public_address = Some("198.51.100.4".to_string());
        let nat = nat_status("203.0.113.77", 9999);

        let configs = resolve(&cli, &Defaults::standard(), Some(&nat)).unwrap();
        assert!(configs[0].public_address == "198.51.100.4");
    }

    #[test]
    fn development_mode_expands_to_distinct_storage_paths() {
        let mut cli = StartArgs::default();
        cli.development_mode = true;
        cli.dev_node_count = Some(3);
        let nat = nat_status("203.0.113.77", 9999);

        let configs = resolve(&cli, &Defaults::standard(), Some(&nat)).unwrap();

        assert!(configs.len() == 3);
        let paths: HashSet<_> = configs.iter().map(|c| c.storage_path.clone()).collect();
        assert!(paths.len() == 3);
        for config in &configs {
            assert!(config.public_address == configs[0].public_address);
            assert!(config.seed_peers == configs[0].seed_peers);
            assert!(config.development_mode_enabled);
        }
    }

    #[test]
    fn development_mode_disables_nat_check_and_upnp() {
        let mut cli = StartArgs::default();
        cli.development_mode = true;

        let configs = resolve(&cli, &Defaults::standard(), None).unwrap();
        for config in &configs {
            assert!(config.nat_check_disabled);
            assert!(config.upnp_disabled);
        }
    }

    #[test]
    fn development_count_defaults_and_cli_override() {
        let mut cli = StartArgs::default();
        cli.development_mode = true;

        let defaults = Defaults::standard();
        assert!(resolve(&cli, &defaults, None).unwrap().len() == 3);

        cli.dev_node_count = Some(5);
        assert!(resolve(&cli, &defaults, None).unwrap().len() == 5);
    }

    #[test]
    fn zero_development_instances_is_rejected() {
        let mut cli = StartArgs::default();
        cli.development_mode = true;
        cli.dev_node_count = Some(0);

        let result = resolve(&cli, &Defaults::standard(), None);
        assert!(result == Err(ConfigResolutionError::NoInstances));
    }

    #[test]
    fn broken_storage_template_is_rejected_before_any_record() {
        let mut cli = StartArgs::default();
        cli.development_mode = true;
        let mut defaults = Defaults::standard();
        defaults.dev_store_template = "bazaar-dev.db".to_string();

        let result = resolve(&cli, &defaults, None);
        assert!(matches!(
            result,
            Err(ConfigResolutionError::InvalidStorageTemplate { .. })
        ));
    }

    #[test]
    fn seed_peers_extend_but_never_replace_defaults() {
        let mut cli = StartArgs::default();
        cli.seeds = vec!["extra.example.org".to_string()];

        let defaults = Defaults::standard();
        let configs = resolve(&cli, &defaults, None).unwrap();

        let seeds = &configs[0].seed_peers;
        assert!(seeds.len() == defaults.seed_hostnames.len() + 1);
        assert!(seeds.starts_with(&defaults.seed_hostnames));
        assert!(seeds.last().map(String::as_str) == Some("extra.example.org"));
    }

    #[test]
    fn messaging_credentials_need_user_and_pass() {
        let mut cli = StartArgs::default();
        cli.messaging_user = Some("alice".to_string());
        let defaults = Defaults::standard();

        assert!(resolve(&cli, &defaults, None).unwrap()[0].messaging.is_none());

        cli.messaging_pass = Some("hunter2".to_string());
        let configs = resolve(&cli, &defaults, None).unwrap();
        let messaging = configs[0].messaging.as_ref().unwrap();
        assert!(messaging.user == "alice");
        assert!(messaging.pass == "hunter2");
        assert!(messaging.port == defaults::DEFAULT_MESSAGING_PORT);
    }

    #[test]
    fn scalar_overrides_win_over_defaults() {
        let mut cli = StartArgs::default();
        cli.http_address = "0.0.0.0".to_string();
        cli.http_port = Some(8080);
        cli.log_level = Some(LogLevel::Warning);
        cli.identity = Some("m-42".to_string());
        cli.seed_mode = true;
        cli.enable_ip_monitoring = true;

        let configs = resolve(&cli, &Defaults::standard(), None).unwrap();
        let config = &configs[0];
        assert!(config.http_address == "0.0.0.0");
        assert!(config.http_port == Some(8080));
        assert!(config.log_level == LogLevel::Warning);
        assert!(config.identity.as_deref() == Some("m-42"));
        assert!(config.seed_mode_enabled);
        assert!(config.ip_monitoring_enabled);
    }

    #[test]
    fn cli_storage_path_wins_in_production_mode() {
        let mut cli = StartArgs::default();
        cli.storage_path = Some(PathBuf::from("/tmp/custom/store.db"));

        let configs = resolve(&cli, &Defaults::standard(), None).unwrap();
        assert!(configs[0].storage_path == PathBuf::from("/tmp/custom/store.db"));
    }
}

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

use super::defaults;
use super::log_level::LogLevel;

/// The `bazaar-core` command-line program bootstraps one or more marketplace
/// node instances.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve the effective configuration, provision per-instance storage
    /// and start the node instance(s).
    Start(StartArgs),

    /// Stop a running node.
    Stop,

    /// Report the status of a running node.
    Status,
}

/// Flags of the `start` subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct StartArgs {
    /// Externally reachable IP address or hostname for this node.
    ///
    /// When omitted, the address reported by NAT discovery is advertised;
    /// without NAT discovery the address stays unresolved.
    #[clap(short = 'i', long, value_name = "ADDR")]
    pub public_address: Option<String>,

    /// Externally reachable peer-to-peer port.
    ///
    /// An explicit value different from the default wins over the port
    /// discovered via NAT traversal.
    #[clap(short = 'p', long, default_value_t = defaults::DEFAULT_P2P_PORT, value_name = "PORT")]
    pub public_port: u16,

    /// Control-interface bind IP (use 0.0.0.0 for any).
    #[clap(short = 'k', long, default_value = defaults::DEFAULT_HTTP_ADDRESS, value_name = "ADDR")]
    pub http_address: String,

    /// Control-interface port. A random free port is picked when omitted.
    #[clap(short = 'q', long, value_name = "PORT")]
    pub http_port: Option<u16>,

    /// Log file path.
    #[clap(short = 'l', long = "log", value_name = "FILE")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity of the launched instance(s).
    #[clap(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Run several local instances with isolated storage instead of one
    /// production node. Implies --disable-upnp and --disable-nat-check.
    #[clap(short = 'd', long = "development-mode")]
    pub development_mode: bool,

    /// Number of development-mode instances to start.
    #[clap(short = 'n', long, value_name = "COUNT")]
    pub dev_node_count: Option<u16>,

    /// Storage file path. Ignored in development mode, where per-instance
    /// paths derive from a numbered template.
    #[clap(long = "storage-path", alias = "database", value_name = "FILE")]
    pub storage_path: Option<PathBuf>,

    /// Messaging transport API username.
    #[clap(long = "messaging-user", alias = "bmuser", value_name = "USER")]
    pub messaging_user: Option<String>,

    /// Messaging transport API password.
    #[clap(long = "messaging-pass", alias = "bmpass", value_name = "PASS")]
    pub messaging_pass: Option<String>,

    /// Messaging transport API port (e.g. 8444).
    #[clap(long = "messaging-port", alias = "bmport", value_name = "PORT")]
    pub messaging_port: Option<u16>,

    /// Stable market identifier for this node.
    #[clap(short = 'u', long = "identity", alias = "market-id", value_name = "ID")]
    pub identity: Option<String>,

    /// Disable automatic UPnP port mappings.
    #[clap(short = 'j', long)]
    pub disable_upnp: bool,

    /// Disable public address and port discovery via NAT traversal.
    #[clap(long = "disable-nat-check", alias = "disable-stun-check")]
    pub disable_nat_check: bool,

    /// Act as a seed for other nodes joining the network.
    #[clap(short = 'S', long)]
    pub seed_mode: bool,

    /// Extra seed peers, appended to the built-in seed list.
    ///
    /// E.g.: --seed seed.example.org --seed 203.0.113.9
    #[clap(short = 's', long = "seed", value_name = "HOST")]
    pub seeds: Vec<String>,

    /// Don't open the preferred web browser automatically on start.
    #[clap(long = "disable-browser-launch", alias = "disable-open-browser")]
    pub disable_browser_launch: bool,

    /// Disable encryption of the on-disk store.
    #[clap(long = "disable-storage-encryption", alias = "disable-sqlite-crypt")]
    pub disable_storage_encryption: bool,

    /// Path to a JSON configuration file. Its values override the built-in
    /// defaults; explicit command-line values still win.
    #[clap(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Re-check the public IP address periodically. Useful when your IP is
    /// expected to change rapidly.
    #[clap(long = "enable-ip-monitoring", alias = "enable-ip-checker")]
    pub enable_ip_monitoring: bool,
}

impl Default for StartArgs {
    fn default() -> Self {
        let args = Args::parse_from(["bazaar-core", "start"]);
        match args.command {
            Command::Start(start_args) => start_args,
            _ => unreachable!("the start subcommand was given"),
        }
    }
}

#[cfg(test)]
mod cli_args_tests {
    use assert2::assert;
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn argument_grammar_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn default_start_args() {
        let args = StartArgs::default();

        assert!(args.public_address.is_none());
        assert!(args.public_port == 12345);
        assert!(args.http_address == "127.0.0.1");
        assert!(args.http_port.is_none());
        assert!(!args.development_mode);
        assert!(args.seeds.is_empty());
        assert!(!args.disable_nat_check);
    }

    #[test]
    fn start_flags_parse() {
        let args = Args::parse_from([
            "bazaar-core",
            "start",
            "-i",
            "203.0.113.5",
            "-p",
            "4567",
            "-d",
            "-n",
            "5",
            "--seed",
            "a.example.org",
            "--seed",
            "b.example.org",
            "--disable-storage-encryption",
        ]);

        let Command::Start(start) = args.command else {
            panic!("expected the start subcommand");
        };
        assert!(start.public_address.as_deref() == Some("203.0.113.5"));
        assert!(start.public_port == 4567);
        assert!(start.development_mode);
        assert!(start.dev_node_count == Some(5));
        assert!(start.seeds == ["a.example.org", "b.example.org"]);
        assert!(start.disable_storage_encryption);
    }

    #[test]
    fn legacy_aliases_still_parse() {
        let args = Args::parse_from([
            "bazaar-core",
            "start",
            "--disable-stun-check",
            "--bmuser",
            "alice",
            "--bmpass",
            "hunter2",
            "--market-id",
            "m-1",
        ]);

        let Command::Start(start) = args.command else {
            panic!("expected the start subcommand");
        };
        assert!(start.disable_nat_check);
        assert!(start.messaging_user.as_deref() == Some("alice"));
        assert!(start.messaging_pass.as_deref() == Some("hunter2"));
        assert!(start.identity.as_deref() == Some("m-1"));
    }

    #[test]
    fn invalid_subcommand_is_rejected() {
        assert!(Args::try_parse_from(["bazaar-core", "restart"]).is_err());
        assert!(Args::try_parse_from(["bazaar-core"]).is_err());
    }

    #[test]
    fn stop_and_status_take_no_flags() {
        assert!(matches!(
            Args::parse_from(["bazaar-core", "stop"]).command,
            Command::Stop
        ));
        assert!(matches!(
            Args::parse_from(["bazaar-core", "status"]).command,
            Command::Status
        ));
    }
}

//! Bootstrap subsystem of a peer-to-peer marketplace node.
//!
//! One `start` invocation reconciles command-line overrides, compiled
//! defaults and NAT discovery into an ordered batch of immutable
//! [`NodeConfiguration`](config_models::node_configuration::NodeConfiguration)
//! records, provisions isolated storage for each, and hands the whole batch
//! to a single node-starter task. After that handoff the records are owned
//! by the launched runtimes; this subsystem never reads them again.

pub mod config_models;
pub mod launcher;
pub mod nat;
pub mod network_util;
mod node;
pub mod provision;

use anyhow::bail;
use anyhow::Result;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::config_models::cli_args::StartArgs;
use crate::config_models::defaults::Defaults;
use crate::config_models::node_configuration::NodeConfiguration;
use crate::config_models::resolver;
use crate::nat::NatStatusProvider;
use crate::nat::StunNatProvider;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extra discovery endpoints registered into the NAT probe pool, once, at
/// process start.
const ADDITIONAL_STUN_SERVERS: [&str; 2] =
    ["stun.bazaar.network:3478", "stun2.bazaar.network:3478"];

/// Resolves, provisions and launches the node instance batch.
///
/// The returned handle belongs to the node-starter task; it resolves when
/// every launched instance has terminated.
pub async fn bootstrap(cli: StartArgs) -> Result<JoinHandle<()>> {
    let defaults = match &cli.config_file {
        Some(path) => Defaults::with_config_file(path)?,
        None => Defaults::standard(),
    };

    if cli.development_mode {
        info!("development mode: NAT discovery and UPnP mappings are off");
    }

    let nat_status = if cli.development_mode || cli.disable_nat_check || defaults.nat_check_disabled
    {
        None
    } else {
        let mut provider = StunNatProvider::standard();
        provider.register_additional_servers(ADDITIONAL_STUN_SERVERS);

        info!("checking NAT status");
        let status = provider.probe();
        if let Some(status) = &status {
            info!(
                external_ip = %status.external_ip,
                external_port = status.external_port,
                "NAT discovery succeeded"
            );
            if network_util::is_private(&status.external_ip.to_string()) {
                warn!(
                    "NAT discovery reports a private address; this node is \
                     likely behind a double NAT and may be unreachable"
                );
            }
        }
        status
    };

    let configs = resolver::resolve(&cli, &defaults, nat_status.as_ref())?;
    info!(instances = configs.len(), "resolved configuration batch");

    let provisioned = provision_batch(configs).await?;

    let handle = launcher::launch(provisioned)?;
    Ok(handle)
}

/// Provisions every configuration of a batch concurrently.
///
/// Storage paths within a batch are pairwise distinct, so the instances
/// cannot interfere. One instance failing to provision does not abort its
/// siblings; it is dropped from the batch with a warning. An empty result
/// is an error.
async fn provision_batch(configs: Vec<NodeConfiguration>) -> Result<Vec<NodeConfiguration>> {
    let tasks = configs
        .into_iter()
        .map(|config| {
            tokio::task::spawn_blocking(move || {
                let outcome = provision::provision(&config);
                (config, outcome)
            })
        })
        .collect::<Vec<_>>();

    let mut ready = Vec::with_capacity(tasks.len());
    for joined in join_all(tasks).await {
        let (config, outcome) = joined.expect("provisioning task panicked");
        match outcome {
            Ok(provision::Provisioned::Created) => {
                info!(store = %config.storage_path.display(), "instance store bootstrapped");
                ready.push(config);
            }
            Ok(provision::Provisioned::AlreadyExisted) => ready.push(config),
            Err(err) => {
                warn!(
                    store = %config.storage_path.display(),
                    %err,
                    "provisioning failed; skipping this instance"
                );
            }
        }
    }

    if ready.is_empty() {
        bail!("no node instance could be provisioned");
    }
    Ok(ready)
}

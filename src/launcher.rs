//! Hands a resolved configuration batch to a single node-starter task.
//!
//! The handoff is message-passing: the batch is serialized once and sent
//! over a channel to an independently running starter task. The parent
//! performs no further synchronization after the send. Exactly one spawn,
//! no retries; a failed handoff is fatal to the whole bootstrap attempt.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::config_models::node_configuration::NodeConfiguration;
use crate::network_util;
use crate::network_util::PortProbeError;
use crate::node;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("could not serialize the configuration batch: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("could not hand the configuration batch to the node starter")]
    Handoff,
}

/// Ports actually bound by one instance, assigned in batch order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstancePorts {
    pub p2p: u16,
    pub http: u16,
}

/// Spawns the node starter and sends it the batch.
///
/// Returns as soon as the starter task exists and the batch message is on
/// the channel; node startup itself is not awaited. The returned handle
/// resolves when every instance has terminated.
pub fn launch(configs: Vec<NodeConfiguration>) -> Result<JoinHandle<()>, LaunchError> {
    let payload = bincode::serialize(&configs)?;
    info!(
        instances = configs.len(),
        bytes = payload.len(),
        "handing configuration batch to the node starter"
    );

    let (batch_tx, batch_rx) = mpsc::channel::<Vec<u8>>(1);
    let handle = tokio::spawn(node_starter(batch_rx));
    batch_tx.try_send(payload).map_err(|_| LaunchError::Handoff)?;

    Ok(handle)
}

/// Receives the one batch message and brings up one runtime per entry.
///
/// Instances are started in the exact order the resolver produced them;
/// ports and log streams are assigned by that sequence number.
async fn node_starter(mut batch_rx: mpsc::Receiver<Vec<u8>>) {
    let Some(payload) = batch_rx.recv().await else {
        // sender dropped without a batch; nothing to start
        return;
    };

    let configs: Vec<NodeConfiguration> = match bincode::deserialize(&payload) {
        Ok(configs) => configs,
        Err(err) => {
            error!(%err, "configuration batch is undecodable, starting nothing");
            return;
        }
    };

    let mut instances = Vec::with_capacity(configs.len());
    for (sequence, config) in configs.into_iter().enumerate() {
        match instance_ports(&config, sequence) {
            Ok(ports) => {
                debug!(sequence, p2p = ports.p2p, http = ports.http, "instance ports assigned");
                instances.push(tokio::spawn(node::run(config, sequence, ports)));
            }
            Err(err) => {
                error!(sequence, %err, "no usable port assignment, skipping instance");
            }
        }
    }

    for instance in instances {
        if let Err(err) = instance.await {
            error!(%err, "node instance task aborted");
        }
    }
}

/// Per-instance port assignment.
///
/// Development instances share one resolved record; a sequence offset keeps
/// their listeners apart. An unset http port means a random free one.
fn instance_ports(
    config: &NodeConfiguration,
    sequence: usize,
) -> Result<InstancePorts, PortProbeError> {
    let p2p = if config.development_mode_enabled {
        config
            .public_port
            .checked_add(sequence as u16)
            .map_or_else(|| network_util::find_free_port(network_util::FREE_PORT_RANGE), Ok)?
    } else {
        config.public_port
    };

    let http = match config.http_port {
        Some(port) => port,
        None => network_util::find_free_port(network_util::FREE_PORT_RANGE)?,
    };

    Ok(InstancePorts { p2p, http })
}

//! The runtime boundary of a single launched instance.
//!
//! The bootstrap's responsibility ends at bringing the instance onto the
//! network: bind the peer listener, advertise the peer URL, surface the
//! seed list. Everything protocol-shaped past the accepted socket, the
//! handshake included, belongs to the market runtime that takes over from
//! here.

use tokio::net::TcpListener;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config_models::node_configuration::NodeConfiguration;
use crate::launcher::InstancePorts;

pub(crate) async fn run(config: NodeConfiguration, sequence: usize, ports: InstancePorts) {
    info!(
        sequence,
        p2p_port = ports.p2p,
        http_port = ports.http,
        store = %config.storage_path.display(),
        log = %config.log_path.display(),
        level = %config.log_level,
        "starting node instance"
    );

    if let Some(peer_url) = config.peer_url() {
        info!(sequence, %peer_url, "advertising");
    } else {
        warn!(sequence, "public address unresolved; not advertising a peer URL");
    }
    for seed in &config.seed_peers {
        debug!(sequence, %seed, "seed peer");
    }

    let listener = match TcpListener::bind(("0.0.0.0", ports.p2p)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(
                sequence,
                port = ports.p2p,
                %err,
                "could not bind the peer listener; is another instance running?"
            );
            return;
        }
    };
    info!(sequence, port = ports.p2p, "listening for peer connections");

    loop {
        match listener.accept().await {
            Ok((stream, peer_address)) => {
                debug!(sequence, %peer_address, "incoming peer connection");
                // handshake and peer loop are owned by the market runtime
                drop(stream);
            }
            Err(err) => warn!(sequence, %err, "failed to accept peer connection"),
        }
    }
}

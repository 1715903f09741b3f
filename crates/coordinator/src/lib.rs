pub mod api;
pub mod config;
pub mod handler;
pub mod logging;
pub mod moocher;
pub mod persistence;
pub mod result;
pub mod service;
pub mod submit;

use std::sync::Arc;

use hashwork_core::ids::PeerId;
use transport::{PeerNode, TransportConfig, TransportError};

use crate::config::{NodeConfig, ServiceParams};
use crate::service::{Coordinator, Sinks};

pub use crate::service::CoordinatorError;

pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub node: PeerNode,
    pub config: NodeConfig,
}

/// Bind the peer listener, start the coordinator and its background tasks,
/// then dial the configured bootnodes.
///
/// Calling [`Coordinator::stop`] tears everything down, including the
/// transport.
pub async fn launch(config: NodeConfig, sinks: Sinks) -> Result<Arc<AppState>, TransportError> {
    let peer_id = PeerId(rand::random());
    let (node, events) = PeerNode::new(TransportConfig::new(config.p2p_addr, peer_id)).await?;
    let coordinator = Coordinator::new(peer_id, &config.service, sinks);
    coordinator.start();

    coordinator
        .tracker
        .spawn(handler::run_peer_handler(Arc::clone(&coordinator), events));

    tokio::spawn({
        let node = node.clone();
        async move {
            if let Err(e) = node.run().await {
                tracing::error!(error = %e, "peer listener failed");
            }
        }
    });

    coordinator.tracker.spawn({
        let node = node.clone();
        let shutdown = coordinator.shutdown_token();
        async move {
            shutdown.cancelled().await;
            node.shutdown();
        }
    });

    if let Some(auto) = config.service.auto_submit.clone() {
        coordinator
            .tracker
            .spawn(moocher::run_auto_submit(Arc::clone(&coordinator), auto));
    }

    let p2p_addr = node.local_addr()?;
    tracing::info!(
        node = %peer_id.short(),
        %p2p_addr,
        worker = coordinator.is_worker(),
        max_difficulty = coordinator.max_difficulty(),
        "node started"
    );

    for addr in &config.bootnodes {
        if let Err(e) = node.connect(*addr).await {
            tracing::warn!(%addr, error = %e, "failed to dial bootnode");
        }
    }

    Ok(Arc::new(AppState {
        coordinator,
        node,
        config,
    }))
}

/// Start a node on ephemeral localhost ports with no persistence.
pub async fn setup_test_node(service: ServiceParams) -> Arc<AppState> {
    let config = NodeConfig {
        api_addr: "127.0.0.1:0".parse().unwrap(),
        p2p_addr: "127.0.0.1:0".parse().unwrap(),
        service,
        ..NodeConfig::default()
    };
    launch(config, Sinks::default()).await.unwrap()
}

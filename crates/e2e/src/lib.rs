//! Helpers for running several nodes in one process.

use std::sync::Arc;
use std::time::Duration;

use coordinator::config::{NodeConfig, ServiceParams};
use coordinator::service::Sinks;
use coordinator::AppState;
use tokio::time::{sleep, timeout};

/// Launch a node on an ephemeral localhost port, dialing `bootnodes`.
pub async fn spawn_node(
    service: ServiceParams,
    bootnodes: Vec<std::net::SocketAddr>,
    sinks: Sinks,
) -> Arc<AppState> {
    let config = NodeConfig {
        api_addr: "127.0.0.1:0".parse().unwrap(),
        p2p_addr: "127.0.0.1:0".parse().unwrap(),
        bootnodes,
        service,
        ..NodeConfig::default()
    };
    coordinator::launch(config, sinks).await.unwrap()
}

/// Poll `condition` every 10ms until it holds. Returns false on timeout.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    timeout(limit, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

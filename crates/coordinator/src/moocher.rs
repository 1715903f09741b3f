use std::sync::Arc;

use rand::Rng;

use crate::config::AutoSubmit;
use crate::service::{Coordinator, CoordinatorError};

/// Periodically submit random jobs while this node is not a worker.
///
/// Stops when the coordinator shuts down.
pub async fn run_auto_submit(coordinator: Arc<Coordinator>, params: AutoSubmit) {
    let shutdown = coordinator.shutdown_token();
    let mut ticker = tokio::time::interval(params.interval);
    ticker.tick().await; // skip immediate first tick

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if coordinator.is_worker() {
            continue;
        }

        let (data, difficulty) = {
            let mut rng = rand::thread_rng();
            let mut data = vec![0u8; params.data_size];
            rng.fill(&mut data[..]);
            (data, rng.gen_range(params.min_difficulty..=params.max_difficulty))
        };

        match coordinator.submit_request(data, difficulty) {
            Ok(job_id) => tracing::debug!(%job_id, difficulty, "auto-submitted job"),
            Err(e @ CoordinatorError::NoWorker { .. }) => tracing::debug!(error = %e, "nothing to submit to"),
            Err(e) => tracing::warn!(error = %e, "auto-submit failed"),
        }
    }
    tracing::debug!("auto-submit stopped");
}

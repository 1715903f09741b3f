use std::sync::Arc;
use std::time::Duration;

use hashwork_core::ids::{JobId, PeerId};
use hashwork_core::job::{Request, Skills};
use hashwork_core::wire::MAX_PAYLOAD_SIZE;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use transport::{PeerHandle, TransportError};

use crate::config::ServiceParams;
use crate::result::{ExpiredSink, ResultLedger};
use crate::submit::{LedgerError, SubmissionLedger};

/// Receives every verified result, exactly once, when it is acknowledged.
pub type SaveSink = Arc<dyn Fn(SavedResult) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedResult {
    pub node_id: PeerId,
    pub request_id: JobId,
    pub difficulty: u8,
    pub data: Vec<u8>,
    pub nonce: Vec<u8>,
    pub hash: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct Sinks {
    pub save: Option<SaveSink>,
    pub expired: Option<ExpiredSink>,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("no worker available for difficulty {difficulty} and {size} bytes")]
    NoWorker { difficulty: u8, size: usize },

    #[error("requested difficulty {requested} exceeds ceiling {max}")]
    DifficultyTooHigh { requested: u8, max: u8 },

    #[error("payload of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge { size: usize, max: u16 },

    #[error("peer {peer} sent an incorrect result for job {id}")]
    InvalidResult { id: JobId, peer: String },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: String,
    pub difficulty: u8,
    pub max_payload_size: u16,
}

/// Local job lifecycle, logged when a job leaves the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    TimedOut,
    Cancelled,
    Failed,
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobOutcome::Completed => "completed",
            JobOutcome::TimedOut => "timed-out",
            JobOutcome::Cancelled => "cancelled",
            JobOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub worker: bool,
    pub max_difficulty: u8,
    pub current_jobs: usize,
    pub max_jobs: usize,
    pub pending_results: usize,
    pub outstanding_submissions: usize,
    pub last_serial: u64,
    pub peers: Vec<PeerInfo>,
}

pub(crate) struct PeerEntry {
    pub(crate) peer: PeerHandle,
    pub(crate) skills: Skills,
}

impl PeerEntry {
    fn info(&self) -> PeerInfo {
        PeerInfo {
            peer_id: self.peer.id().to_string(),
            difficulty: self.skills.difficulty,
            max_payload_size: self.skills.max_payload_size,
        }
    }
}

pub(crate) struct NodeState {
    pub(crate) max_difficulty: u8,
    pub(crate) current_jobs: usize,
    /// Connected peers in connection order.
    pub(crate) peers: Vec<PeerEntry>,
}

/// Mediates between peer messages, the two ledgers and the hashing engine.
///
/// One instance per running node. Message handlers live in `handler.rs`.
pub struct Coordinator {
    pub(crate) node_id: PeerId,
    pub(crate) max_jobs: usize,
    pub(crate) max_time_per_job: Duration,
    pub(crate) max_payload_size: u16,
    pub(crate) state: RwLock<NodeState>,
    pub(crate) submits: SubmissionLedger,
    pub(crate) results: Arc<ResultLedger>,
    pub(crate) save: Option<SaveSink>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tracker: TaskTracker,
}

impl Coordinator {
    pub fn new(node_id: PeerId, params: &ServiceParams, sinks: Sinks) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            max_jobs: params.max_jobs,
            max_time_per_job: params.max_time_per_job,
            max_payload_size: match params.max_payload_size {
                0 => MAX_PAYLOAD_SIZE,
                n => n.min(MAX_PAYLOAD_SIZE),
            },
            state: RwLock::new(NodeState {
                max_difficulty: params.max_difficulty,
                current_jobs: 0,
                peers: Vec::new(),
            }),
            submits: SubmissionLedger::new(params.submits_capacity),
            results: Arc::new(ResultLedger::new(
                params.results_capacity,
                params.release_delay,
                sinks.expired,
            )),
            save: sinks.save,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn node_id(&self) -> PeerId {
        self.node_id
    }

    pub fn submits(&self) -> &SubmissionLedger {
        &self.submits
    }

    pub fn results(&self) -> &ResultLedger {
        &self.results
    }

    pub fn is_worker(&self) -> bool {
        self.state.read().max_difficulty > 0
    }

    pub fn max_difficulty(&self) -> u8 {
        self.state.read().max_difficulty
    }

    pub fn set_difficulty(&self, difficulty: u8) {
        let mut state = self.state.write();
        tracing::info!(
            from = state.max_difficulty,
            to = difficulty,
            "max difficulty changed"
        );
        state.max_difficulty = difficulty;
    }

    pub fn current_jobs(&self) -> usize {
        self.state.read().current_jobs
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    /// Skills advertised by each connected peer, in connection order.
    pub fn peers(&self) -> Vec<(PeerId, Skills)> {
        self.state
            .read()
            .peers
            .iter()
            .map(|e| (e.peer.id(), e.skills))
            .collect()
    }

    /// Connected peers that advertised a non-zero difficulty.
    pub fn workers(&self) -> Vec<PeerInfo> {
        self.state
            .read()
            .peers
            .iter()
            .filter(|e| e.skills.is_worker())
            .map(PeerEntry::info)
            .collect()
    }

    /// The skills this node announces to new peers.
    pub fn skills(&self) -> Skills {
        Skills {
            difficulty: self.max_difficulty(),
            max_payload_size: self.max_payload_size,
        }
    }

    /// Launch the result expiry sweep.
    pub fn start(&self) {
        self.tracker
            .spawn(Arc::clone(&self.results).sweep(self.shutdown.clone()));
    }

    /// Cancel the sweep and any running jobs.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!(node = %self.node_id.short(), "stopping coordinator");
        }
        self.shutdown.cancel();
        self.tracker.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Resolves once every tracked task has finished. Only completes after
    /// [`Coordinator::stop`].
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    pub fn on_connect(&self, peer: PeerHandle) {
        let skills = self.skills();
        {
            let mut state = self.state.write();
            if !state.peers.iter().any(|e| e.peer.id() == peer.id()) {
                state.peers.push(PeerEntry {
                    peer: peer.clone(),
                    skills: Skills::default(),
                });
            }
        }

        tracing::info!(
            peer = %peer.id().short(),
            difficulty = skills.difficulty,
            "peer joined, sending skills"
        );
        if let Err(e) = peer.send(skills) {
            tracing::warn!(peer = %peer.id().short(), error = %e, "failed to send skills");
        }
    }

    pub fn on_disconnect(&self, peer_id: &PeerId) {
        let mut state = self.state.write();
        state.peers.retain(|e| e.peer.id() != *peer_id);
        tracing::debug!(peer = %peer_id.short(), remaining = state.peers.len(), "peer left");
    }

    /// Send a new job to the first connected worker able to take it.
    ///
    /// The submission is only recorded once the send succeeded.
    pub fn submit_request(&self, data: Vec<u8>, difficulty: u8) -> Result<JobId, CoordinatorError> {
        let (peer, id) = {
            let state = self.state.read();
            let peer = state
                .peers
                .iter()
                .find(|e| !e.peer.is_closed() && e.skills.accepts(difficulty, data.len()))
                .map(|e| e.peer.clone())
                .ok_or(CoordinatorError::NoWorker {
                    difficulty,
                    size: data.len(),
                })?;
            (peer, JobId::derive(&data, self.submits.inc_serial()))
        };

        let request = Request {
            id,
            data,
            difficulty,
        };
        peer.send(request.clone())?;
        if let Err(e) = self.submits.put(request, id) {
            tracing::error!(job_id = %id, error = %e, "failed to record submission");
        }

        tracing::debug!(
            node = %self.node_id.short(),
            job_id = %id,
            worker = %peer.id().short(),
            difficulty,
            "submitted job"
        );
        Ok(id)
    }

    pub fn status(&self) -> NodeStatus {
        let state = self.state.read();
        NodeStatus {
            node_id: self.node_id.to_string(),
            worker: state.max_difficulty > 0,
            max_difficulty: state.max_difficulty,
            current_jobs: state.current_jobs,
            max_jobs: self.max_jobs,
            pending_results: self.results.count(),
            outstanding_submissions: self.submits.len(),
            last_serial: self.submits.last_serial(),
            peers: state.peers.iter().map(PeerEntry::info).collect(),
        }
    }
}

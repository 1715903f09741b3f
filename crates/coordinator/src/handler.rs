use std::sync::Arc;

use hashwork_core::enums::{ProtocolMessage, StatusCode};
use hashwork_core::ids::JobId;
use hashwork_core::job::{JobResult, Request, Skills, Status};
use hashwork_core::wire::MAX_PAYLOAD_SIZE;
use pow::PowError;
use tokio::sync::mpsc;
use transport::{PeerEvent, PeerHandle};

use crate::service::{Coordinator, CoordinatorError, JobOutcome, PeerEntry, SavedResult};

/// Holds one unit of `current_jobs` and gives it back when dropped.
struct JobSlot {
    coordinator: Arc<Coordinator>,
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        let mut state = self.coordinator.state.write();
        state.current_jobs = state.current_jobs.saturating_sub(1);
    }
}

impl Coordinator {
    pub fn handle_message(
        self: &Arc<Self>,
        from: &PeerHandle,
        message: ProtocolMessage,
    ) -> Result<(), CoordinatorError> {
        tracing::trace!(peer = %from.id().short(), kind = message.kind(), "message received");
        match message {
            ProtocolMessage::Skills(skills) => {
                self.handle_skills(from, skills);
                Ok(())
            }
            ProtocolMessage::Status(status) => {
                self.handle_status(from, status);
                Ok(())
            }
            ProtocolMessage::Request(request) => self.handle_request(from, request),
            ProtocolMessage::Result(result) => self.handle_result(from, result),
        }
    }

    fn handle_skills(&self, from: &PeerHandle, skills: Skills) {
        // Nothing larger than one frame can be sent, whatever the peer claims.
        let skills = skills.capped(MAX_PAYLOAD_SIZE);
        let mut state = self.state.write();
        match state.peers.iter_mut().find(|e| e.peer.id() == from.id()) {
            Some(entry) => entry.skills = skills,
            None => state.peers.push(PeerEntry {
                peer: from.clone(),
                skills,
            }),
        }
        tracing::info!(
            peer = %from.id().short(),
            difficulty = skills.difficulty,
            max_payload_size = skills.max_payload_size,
            "peer advertised skills"
        );
    }

    fn handle_status(&self, from: &PeerHandle, status: Status) {
        let worker = self.is_worker();
        match status.code {
            StatusCode::ThanksABunch => {
                if worker && self.results.delete(&status.id) {
                    tracing::debug!(job_id = %status.id, peer = %from.id().short(), "result acknowledged");
                }
            }
            StatusCode::Busy | StatusCode::AreYouKidding | StatusCode::GaveUp => {
                if !worker {
                    tracing::info!(
                        job_id = %status.id,
                        peer = %from.id().short(),
                        code = %status.code,
                        "job not completed by peer"
                    );
                }
            }
        }
    }

    fn handle_request(
        self: &Arc<Self>,
        from: &PeerHandle,
        request: Request,
    ) -> Result<(), CoordinatorError> {
        let id = request.id;
        let slot = {
            let mut state = self.state.write();
            // Every running job holds a reserved slot in the result ledger.
            let reserved = self.results.count() + state.current_jobs;
            if state.current_jobs >= self.max_jobs || reserved >= self.results.capacity() {
                drop(state);
                tracing::warn!(job_id = %id, peer = %from.id().short(), "too busy, refusing job");
                self.reply(from, id, StatusCode::Busy);
                return Ok(());
            }

            let max = state.max_difficulty;
            if max == 0 || request.difficulty > max {
                drop(state);
                self.reply(from, id, StatusCode::AreYouKidding);
                return Err(CoordinatorError::DifficultyTooHigh {
                    requested: request.difficulty,
                    max,
                });
            }

            if request.data.len() > self.max_payload_size as usize {
                drop(state);
                self.reply(from, id, StatusCode::AreYouKidding);
                return Err(CoordinatorError::PayloadTooLarge {
                    size: request.data.len(),
                    max: self.max_payload_size,
                });
            }

            state.current_jobs += 1;
            JobSlot {
                coordinator: Arc::clone(self),
            }
        };

        tracing::debug!(
            job_id = %id,
            peer = %from.id().short(),
            difficulty = request.difficulty,
            "job admitted"
        );
        self.tracker
            .spawn(Arc::clone(self).run_job(from.clone(), request, slot));
        Ok(())
    }

    async fn run_job(self: Arc<Self>, from: PeerHandle, request: Request, slot: JobSlot) {
        let id = request.id;
        let difficulty = request.difficulty;
        let outcome = pow::solve(request.data, difficulty, self.max_time_per_job, &self.shutdown).await;

        let (outcome, reply): (JobOutcome, ProtocolMessage) = match outcome {
            Ok(solution) => {
                let result = JobResult {
                    id,
                    nonce: solution.nonce,
                    hash: solution.hash,
                };
                if !self.results.put(id, result.clone()) {
                    tracing::warn!(job_id = %id, "result not stored, ledger full or duplicate");
                }
                tracing::debug!(job_id = %id, attempts = solution.attempts, "solution found");
                (JobOutcome::Completed, result.into())
            }
            Err(e) => {
                let outcome = match e {
                    PowError::TimedOut(_) => JobOutcome::TimedOut,
                    PowError::Cancelled => JobOutcome::Cancelled,
                    _ => JobOutcome::Failed,
                };
                tracing::debug!(job_id = %id, error = %e, "search ended without solution");
                let gave_up = Status {
                    id,
                    code: StatusCode::GaveUp,
                };
                (outcome, gave_up.into())
            }
        };

        drop(slot);
        tracing::info!(job_id = %id, difficulty, outcome = %outcome, "job finished");

        if let Err(e) = from.send(reply) {
            tracing::warn!(job_id = %id, peer = %from.id().short(), error = %e, "failed to deliver job reply");
        }
    }

    fn handle_result(&self, from: &PeerHandle, result: JobResult) -> Result<(), CoordinatorError> {
        let id = result.id;
        let Some(request) = self.submits.get(&id) else {
            tracing::debug!(job_id = %id, peer = %from.id().short(), "result for unknown job");
            return Ok(());
        };

        if !pow::verify(&result.hash, &request.data, &result.nonce, request.difficulty) {
            return Err(CoordinatorError::InvalidResult {
                id,
                peer: from.id().short(),
            });
        }

        // A concurrent duplicate may have already consumed the submission.
        if self.submits.remove(&id).is_none() {
            return Ok(());
        }

        self.reply(from, id, StatusCode::ThanksABunch);

        tracing::info!(
            job_id = %id,
            peer = %from.id().short(),
            nonce = %hex::encode(&result.nonce),
            hash = %hex::encode(&result.hash),
            "got result"
        );
        if let Some(save) = &self.save {
            save(SavedResult {
                node_id: self.node_id,
                request_id: id,
                difficulty: request.difficulty,
                data: request.data,
                nonce: result.nonce,
                hash: result.hash,
            });
        }
        Ok(())
    }

    fn reply(&self, to: &PeerHandle, id: JobId, code: StatusCode) {
        if let Err(e) = to.send(Status { id, code }) {
            tracing::warn!(job_id = %id, peer = %to.id().short(), code = %code, error = %e, "failed to send status");
        }
    }
}

/// Drive the coordinator from transport events until shutdown.
///
/// Peers that send an incorrect result are disconnected.
pub async fn run_peer_handler(
    coordinator: Arc<Coordinator>,
    mut rx: mpsc::Receiver<PeerEvent>,
) {
    let shutdown = coordinator.shutdown_token();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            PeerEvent::Connected(peer) => coordinator.on_connect(peer),
            PeerEvent::Disconnected(id) => coordinator.on_disconnect(&id),
            PeerEvent::Message { from, message } => {
                match coordinator.handle_message(&from, message) {
                    Ok(()) => {}
                    Err(e @ CoordinatorError::InvalidResult { .. }) => {
                        tracing::warn!(peer = %from.id().short(), error = %e, "dropping misbehaving peer");
                        from.disconnect();
                    }
                    Err(e) => {
                        tracing::warn!(peer = %from.id().short(), error = %e, "error handling message");
                    }
                }
            }
        }
    }
    tracing::debug!("peer handler stopped");
}

//! Person-profile jobs
//!
//! Core generation hands one job per new customer segment to a sink and
//! moves on; profiles are generated independently in the background.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Orchestrator;
use crate::HypothesisError;
use crate::domain::CustomerSegment;

/// Generate a profile for one segment of a hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct PersonProfileJob {
    pub hypothesis_id: String,
    pub user_id: String,
    pub segment_id: String,
    pub segment_name: String,
    pub segment_description: String,
}

impl PersonProfileJob {
    /// `None` for a segment that has no id yet
    pub fn for_segment(hypothesis_id: &str, user_id: &str, segment: &CustomerSegment) -> Option<Self> {
        let segment_id = segment.id.clone()?;
        Some(Self {
            hypothesis_id: hypothesis_id.to_string(),
            user_id: user_id.to_string(),
            segment_id,
            segment_name: segment.name.clone(),
            segment_description: segment.description.clone(),
        })
    }
}

/// Where profile jobs are submitted
pub trait ProfileJobSink: Send + Sync {
    fn submit(&self, job: PersonProfileJob) -> Result<(), HypothesisError>;
}

/// Unbounded in-process job queue
#[derive(Clone)]
pub struct ProfileQueue {
    tx: mpsc::UnboundedSender<PersonProfileJob>,
}

impl ProfileQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PersonProfileJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProfileJobSink for ProfileQueue {
    fn submit(&self, job: PersonProfileJob) -> Result<(), HypothesisError> {
        debug!(segment_id = %job.segment_id, hypothesis_id = %job.hypothesis_id, "ProfileQueue::submit: called");
        self.tx
            .send(job)
            .map_err(|_| HypothesisError::Store("profile worker has stopped".to_string()))
    }
}

/// Drain the queue, running every job as its own task
///
/// The worker only holds a weak handle, so it stops once the last caller
/// drops the orchestrator (which closes the queue); running jobs are awaited
/// first.
pub fn spawn_profile_worker(
    orchestrator: &Arc<Orchestrator>,
    mut rx: mpsc::UnboundedReceiver<PersonProfileJob>,
) -> JoinHandle<()> {
    let orchestrator = Arc::downgrade(orchestrator);
    tokio::spawn(async move {
        info!("Profile worker started");
        let mut running = Vec::new();
        while let Some(job) = rx.recv().await {
            let Some(orchestrator) = orchestrator.upgrade() else {
                warn!(segment_id = %job.segment_id, "Orchestrator is gone, dropping profile job");
                break;
            };
            running.push(tokio::spawn(async move {
                let segment_id = job.segment_id.clone();
                match orchestrator.generate_person_profile(&job).await {
                    Ok(Some(profile)) => info!(%segment_id, profile_id = %profile.id, "Person profile generated"),
                    Ok(None) => info!(%segment_id, "Segment is gone, profile skipped"),
                    Err(e) => error!(%segment_id, error = %e, "Person profile generation failed"),
                }
            }));
            running.retain(|handle: &JoinHandle<()>| !handle.is_finished());
        }
        for handle in running {
            let _ = handle.await;
        }
        info!("Profile worker stopped");
    })
}

/// Run every job queued right now, concurrently, and wait for all of them
///
/// For one-shot callers that cannot keep a worker alive. Returns how many
/// profiles were stored.
pub async fn run_pending(orchestrator: &Orchestrator, rx: &mut mpsc::UnboundedReceiver<PersonProfileJob>) -> usize {
    let mut jobs = Vec::new();
    while let Ok(job) = rx.try_recv() {
        jobs.push(job);
    }
    debug!(count = jobs.len(), "run_pending: called");

    let results = futures::future::join_all(jobs.iter().map(|job| orchestrator.generate_person_profile(job))).await;
    let mut stored = 0;
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(Some(_)) => stored += 1,
            Ok(None) => info!(segment_id = %job.segment_id, "Segment is gone, profile skipped"),
            Err(e) => error!(segment_id = %job.segment_id, error = %e, "Person profile generation failed"),
        }
    }
    stored
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{
    Mutex,
    mpsc::{self, Receiver, Sender},
    watch,
};
use uuid::Uuid;

use crate::{
    error::EngineError,
    metrics::MetricsRegistry,
    models::{ExecutionLimits, ExecutionRequest, ExecutionResult, JobSnapshot, JobState},
    profile::LanguageProfile,
    sandbox::CancelFlag,
};

#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: Uuid,
    pub request: ExecutionRequest,
    pub profile: LanguageProfile,
    pub limits: ExecutionLimits,
}

#[derive(Debug)]
struct JobEntry {
    language: String,
    state: watch::Sender<JobState>,
    cancel: Arc<CancelFlag>,
    result: Option<ExecutionResult>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct Scheduler {
    sender: Sender<QueuedJob>,
    receiver: Arc<Mutex<Receiver<QueuedJob>>>,
    jobs: Arc<DashMap<Uuid, JobEntry>>,
    metrics: Arc<MetricsRegistry>,
}

impl Scheduler {
    pub fn new(capacity: usize, metrics: Arc<MetricsRegistry>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            jobs: Arc::new(DashMap::new()),
            metrics,
        }
    }

    pub fn submit(
        &self,
        profile: LanguageProfile,
        request: ExecutionRequest,
        limits: ExecutionLimits,
    ) -> Result<Uuid, EngineError> {
        let id = Uuid::new_v4();
        let (state, _) = watch::channel(JobState::Queued);
        self.jobs.insert(
            id,
            JobEntry {
                language: profile.id.clone(),
                state,
                cancel: Arc::new(CancelFlag::default()),
                result: None,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
            },
        );

        let job = QueuedJob {
            id,
            request,
            profile,
            limits,
        };
        if self.sender.try_send(job).is_err() {
            self.jobs.remove(&id);
            self.metrics.overloaded();
            return Err(EngineError::Overloaded);
        }
        self.metrics.submitted();
        Ok(id)
    }

    pub async fn wait(&self, id: Uuid) -> Result<ExecutionResult, EngineError> {
        let mut state = {
            let entry = self.jobs.get(&id).ok_or(EngineError::NotFound)?;
            entry.state.subscribe()
        };
        loop {
            let terminal = state.borrow_and_update().is_terminal();
            if terminal {
                break;
            }
            if state.changed().await.is_err() {
                return Err(EngineError::Internal(
                    "job state channel closed before a terminal state".into(),
                ));
            }
        }
        let entry = self.jobs.get(&id).ok_or(EngineError::NotFound)?;
        entry
            .result
            .clone()
            .ok_or_else(|| EngineError::Internal("job finished without a result".into()))
    }

    pub fn cancel(&self, id: Uuid) -> Result<(), EngineError> {
        let entry = self.jobs.get(&id).ok_or(EngineError::NotFound)?;
        entry.cancel.cancel();
        Ok(())
    }

    pub fn snapshot(&self, id: Uuid) -> Result<JobSnapshot, EngineError> {
        let entry = self.jobs.get(&id).ok_or(EngineError::NotFound)?;
        Ok(JobSnapshot {
            id,
            language: entry.language.clone(),
            state: *entry.state.borrow(),
            created_at: entry.created_at,
            started_at: entry.started_at,
            finished_at: entry.finished_at,
        })
    }

    pub fn forget(&self, id: Uuid) -> Result<(), EngineError> {
        let terminal = {
            let entry = self.jobs.get(&id).ok_or(EngineError::NotFound)?;
            entry.state.borrow().is_terminal()
        };
        if !terminal {
            return Err(EngineError::InvalidRequest(
                "job is still in flight".into(),
            ));
        }
        self.jobs.remove(&id);
        Ok(())
    }

    pub(crate) fn receiver(&self) -> Arc<Mutex<Receiver<QueuedJob>>> {
        self.receiver.clone()
    }

    pub(crate) fn cancel_flag(&self, id: Uuid) -> Option<Arc<CancelFlag>> {
        self.jobs.get(&id).map(|entry| entry.cancel.clone())
    }

    pub(crate) fn update_state(&self, id: Uuid, state: JobState) {
        if let Some(mut entry) = self.jobs.get_mut(&id) {
            if entry.started_at.is_none() && state != JobState::Queued {
                entry.started_at = Some(Utc::now());
            }
            entry.state.send_replace(state);
        }
    }

    pub(crate) fn finish(&self, id: Uuid, result: ExecutionResult) {
        let status = result.status;
        // metrics first: waiters wake on the state flip and may read them
        self.metrics.finished(status);
        if let Some(mut entry) = self.jobs.get_mut(&id) {
            entry.finished_at = Some(Utc::now());
            entry.result = Some(result);
            entry.state.send_replace(JobState::Finished(status));
        }
    }
}

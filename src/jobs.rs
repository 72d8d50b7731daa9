//! Background solve jobs.
//!
//! A submission returns a job record straight away; the solve itself runs on
//! tokio's blocking pool and the record is updated when it ends, so callers
//! poll the job instead of re-reading the timetable.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::data::{Period, RunReport, ScheduleParameters, ScheduleScore, SolveStatus};
use crate::engine::{self, EngineOptions};
use crate::error::Error;
use crate::store::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub period: Period,
    pub parameters: ScheduleParameters,
    pub state: JobState,
    pub status: Option<SolveStatus>,
    pub classes_created: usize,
    pub score: Option<ScheduleScore>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    fn new(period: Period, parameters: ScheduleParameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            period,
            parameters,
            state: JobState::Queued,
            status: None,
            classes_created: 0,
            score: None,
            error: None,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }

    fn finish(&mut self, report: RunReport) {
        self.state = JobState::Finished;
        self.status = Some(report.status);
        self.classes_created = report.classes_created;
        self.score = report.score;
        self.completed_at = Some(Utc::now());
    }

    fn fail(&mut self, error: String) {
        self.state = JobState::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }
}

/// Finished or failed jobs kept for polling before the oldest are dropped.
pub const DEFAULT_JOB_RETENTION: usize = 256;

/// Submits solves and keeps their job records.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<MemoryStore>,
    options: Arc<EngineOptions>,
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    retention: usize,
}

impl JobRunner {
    pub fn new(store: Arc<MemoryStore>, options: EngineOptions) -> Self {
        Self {
            store,
            options: Arc::new(options),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention: DEFAULT_JOB_RETENTION,
        }
    }

    /// Keeps at most `retention` terminal jobs; queued and running jobs are
    /// never evicted.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Queues a solve for `period` and returns its record without waiting.
    pub async fn submit(&self, period: Period, parameters: ScheduleParameters) -> Job {
        let job = Job::new(period, parameters);
        {
            let mut jobs = self.jobs.write().await;
            evict_finished(&mut jobs, self.retention);
            jobs.insert(job.id, job.clone());
        }
        info!("Queued job {} for timetable {}", job.id, job.period.timetable);

        let runner = self.clone();
        let (id, period) = (job.id, job.period.clone());
        tokio::spawn(async move {
            runner.update(id, |job| job.state = JobState::Running).await;

            let store = Arc::clone(&runner.store);
            let options = Arc::clone(&runner.options);
            let result = tokio::task::spawn_blocking(move || {
                engine::run(&store, &period, parameters, &options)
            })
            .await;

            match result {
                Ok(Ok(report)) => {
                    info!("Job {id} finished: {}", report.status);
                    runner.update(id, |job| job.finish(report)).await;
                }
                Ok(Err(e)) => {
                    error!("Job {id} failed: {e}");
                    runner.update(id, |job| job.fail(e.to_string())).await;
                }
                Err(e) => {
                    let e = Error::Worker(e.to_string());
                    error!("Job {id} failed: {e}");
                    runner.update(id, |job| job.fail(e.to_string())).await;
                }
            }
        });

        job
    }

    async fn update(&self, id: Uuid, apply: impl FnOnce(&mut Job)) {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            apply(job);
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.submitted_at);
        jobs
    }
}

/// Drops the oldest terminal jobs until at most `keep` remain.
fn evict_finished(jobs: &mut HashMap<Uuid, Job>, keep: usize) {
    let finished: Vec<(DateTime<Utc>, Uuid)> = jobs
        .values()
        .filter(|j| j.state.is_terminal())
        .map(|j| (j.completed_at.unwrap_or(j.submitted_at), j.id))
        .sorted()
        .collect();
    let excess = finished.len().saturating_sub(keep);
    for (_, id) in &finished[..excess] {
        jobs.remove(id);
    }
    if excess > 0 {
        debug!("Evicted {excess} finished jobs");
    }
}

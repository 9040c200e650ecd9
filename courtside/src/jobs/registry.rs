//! In-memory job state, keyed by match and analysis kind.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::artifact::{Hand, MapKind};

/// The analyses that can be requested for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "variant", rename_all = "snake_case")]
pub enum JobKind {
    Pose,
    Angles,
    Velocity(Hand),
    Map(MapKind),
    Players,
    FirstFrame,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Pose => f.write_str("pose"),
            JobKind::Angles => f.write_str("angles"),
            JobKind::Velocity(hand) => write!(f, "velocity-{hand}"),
            JobKind::Map(kind) => write!(f, "map-{kind}"),
            JobKind::Players => f.write_str("players"),
            JobKind::FirstFrame => f.write_str("first-frame"),
        }
    }
}

/// Lifecycle of one (match, kind) pair. A pair with no record is unstarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Unstarted,
    Running,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Unstarted => "unstarted",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JobKey {
    match_id: String,
    kind: JobKind,
}

/// Snapshot of one job's state.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub kind: JobKind,
    pub state: JobState,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

type JobTable = HashMap<JobKey, JobRecord>;

/// Returned by [`JobRegistry::claim`] when the pair is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyRunning;

/// Shared registry of job states.
///
/// `claim` is the only way into `Running`, and it is atomic: of any number of
/// concurrent claims for the same pair exactly one succeeds.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<JobTable>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a pair.
    pub fn state(&self, match_id: &str, kind: JobKind) -> JobState {
        let key = JobKey {
            match_id: match_id.to_string(),
            kind,
        };
        self.jobs
            .lock()
            .get(&key)
            .map_or(JobState::Unstarted, |record| record.state)
    }

    /// Records for one match, ordered by kind name.
    pub fn list(&self, match_id: &str) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .jobs
            .lock()
            .iter()
            .filter(|(key, _)| key.match_id == match_id)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|record| record.kind.to_string());
        records
    }

    /// Move a pair into `Running`.
    ///
    /// Fails if the pair is already running. The returned claim must be
    /// finished with [`JobClaim::complete`] or [`JobClaim::fail`]; dropping
    /// it restores whatever state the pair had before.
    pub fn claim(&self, match_id: &str, kind: JobKind) -> Result<JobClaim, AlreadyRunning> {
        let key = JobKey {
            match_id: match_id.to_string(),
            kind,
        };

        let mut jobs = self.jobs.lock();
        let previous = jobs.get(&key).cloned();
        if previous
            .as_ref()
            .is_some_and(|record| record.state == JobState::Running)
        {
            return Err(AlreadyRunning);
        }

        jobs.insert(
            key.clone(),
            JobRecord {
                kind,
                state: JobState::Running,
                updated_at: Utc::now(),
                detail: None,
            },
        );

        Ok(JobClaim {
            jobs: Arc::clone(&self.jobs),
            key,
            previous,
            finished: false,
        })
    }
}

/// Exclusive right to run one (match, kind) pair.
#[derive(Debug)]
pub struct JobClaim {
    jobs: Arc<Mutex<JobTable>>,
    key: JobKey,
    previous: Option<JobRecord>,
    finished: bool,
}

impl JobClaim {
    pub fn match_id(&self) -> &str {
        &self.key.match_id
    }

    pub fn kind(&self) -> JobKind {
        self.key.kind
    }

    /// Mark the pair `Done`.
    pub fn complete(self) {
        self.finish(JobState::Done, None);
    }

    /// Mark the pair `Failed` with a short reason.
    pub fn fail(self, detail: impl Into<String>) {
        self.finish(JobState::Failed, Some(detail.into()));
    }

    fn finish(mut self, state: JobState, detail: Option<String>) {
        self.finished = true;
        self.jobs.lock().insert(
            self.key.clone(),
            JobRecord {
                kind: self.key.kind,
                state,
                updated_at: Utc::now(),
                detail,
            },
        );
    }
}

impl Drop for JobClaim {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut jobs = self.jobs.lock();
        match self.previous.take() {
            Some(record) => {
                jobs.insert(self.key.clone(), record);
            }
            None => {
                jobs.remove(&self.key);
            }
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on error messages retained per job; the count keeps growing.
pub const MAX_ERROR_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Sync,
    BatchRestore,
    MboxImport,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Sync => "sync",
            JobKind::BatchRestore => "batch_restore",
            JobKind::MboxImport => "mbox_import",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle. Transitions only move forward; terminal states are final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for a worker slot
    Queued,
    /// Import only: counting records before the real pass
    Estimating,
    Running,
    /// Import only: the streaming pass
    Importing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Estimating => "estimating",
            JobState::Running => "running",
            JobState::Importing => "importing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Estimating => 1,
            JobState::Running | JobState::Importing => 2,
            JobState::Completed | JobState::Failed | JobState::Cancelled => 3,
        }
    }

    /// Whether moving from `self` to `next` respects the lifecycle order.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a tracked job as seen by pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    /// Account the job works on
    pub subject_id: String,
    pub subject_name: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub folders_processed: u64,
    /// Messages archived (sync, import) or items delivered (restore)
    pub processed: u64,
    /// Records skipped because they were already archived
    pub skipped: u64,
    /// Estimate for imports, exact for restores, unknown for syncs
    pub total: Option<u64>,
    pub error_count: u64,
    pub errors: Vec<String>,
    /// Reason for a Failed job
    pub failure: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Job {
    pub fn new(id: String, kind: JobKind, subject_id: String, subject_name: String) -> Self {
        Self {
            id,
            kind,
            subject_id,
            subject_name,
            state: JobState::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            folders_processed: 0,
            processed: 0,
            skipped: 0,
            total: None,
            error_count: 0,
            errors: Vec::new(),
            failure: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Count an item-level error, keeping a bounded sample of messages.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        if self.errors.len() < MAX_ERROR_SAMPLES {
            self.errors.push(message.into());
        }
    }

    pub fn start(&mut self, state: JobState) {
        self.state = state;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn complete(&mut self) {
        self.finish(JobState::Completed);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.finish(JobState::Failed);
    }

    pub fn cancel(&mut self) {
        self.finish(JobState::Cancelled);
    }

    fn finish(&mut self, state: JobState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }
}

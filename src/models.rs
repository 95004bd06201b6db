use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub source: String,
    #[serde(default)]
    pub stdin: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub limits: Option<LimitsOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsOverride {
    pub cpu_time_ms: Option<u64>,
    pub wall_clock_ms: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub max_processes: Option<u32>,
    pub max_output_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub cpu_time_ms: u64,
    pub wall_clock_ms: u64,
    pub memory_bytes: u64,
    pub max_processes: u32,
    pub max_output_bytes: usize,
}

impl ExecutionLimits {
    pub fn merged(mut self, overrides: &LimitsOverride) -> Self {
        if let Some(v) = overrides.cpu_time_ms {
            self.cpu_time_ms = v;
        }
        if let Some(v) = overrides.wall_clock_ms {
            self.wall_clock_ms = v;
        }
        if let Some(v) = overrides.memory_bytes {
            self.memory_bytes = v;
        }
        if let Some(v) = overrides.max_processes {
            self.max_processes = v;
        }
        if let Some(v) = overrides.max_output_bytes {
            self.max_output_bytes = v;
        }
        self
    }

    pub fn normalized(mut self) -> Self {
        self.cpu_time_ms = self.cpu_time_ms.clamp(50, 120_000);
        self.wall_clock_ms = self.wall_clock_ms.clamp(50, 300_000);
        self.memory_bytes = self
            .memory_bytes
            .clamp(16 * 1024 * 1024, 8 * 1024 * 1024 * 1024);
        self.max_processes = self.max_processes.clamp(1, 4096);
        self.max_output_bytes = self.max_output_bytes.clamp(1024, 16 * 1024 * 1024);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    CompilationFailed,
    RuntimeFailed,
    TimedOut,
    ResourceExceeded,
    Cancelled,
    UnsupportedLanguage,
    InternalError,
}

impl ExecutionStatus {
    pub fn is_user_failure(&self) -> bool {
        matches!(
            self,
            Self::CompilationFailed | Self::RuntimeFailed | Self::TimedOut | Self::ResourceExceeded
        )
    }

    pub fn is_engine_fault(&self) -> bool {
        matches!(self, Self::InternalError)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub job_id: Uuid,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Provisioning,
    Compiling,
    Running,
    Finished(ExecutionStatus),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub language: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

use std::path::Path;

use uuid::Uuid;

use crate::{
    models::{ExecutionResult, ExecutionStatus},
    sandbox::{StageReport, StageVerdict},
};

pub fn from_compile(job_id: Uuid, workspace: &Path, report: StageReport) -> ExecutionResult {
    let status = match report.verdict {
        StageVerdict::Completed => ExecutionStatus::CompilationFailed,
        StageVerdict::TimedOut => ExecutionStatus::TimedOut,
        StageVerdict::Cancelled => ExecutionStatus::Cancelled,
        StageVerdict::Killed => ExecutionStatus::ResourceExceeded,
    };
    ExecutionResult {
        job_id,
        status,
        stdout: redact(&report.stdout, workspace),
        stderr: redact(&report.stderr, workspace),
        exit_code: report.exit_code,
        duration_ms: report.duration.as_millis() as u64,
        truncated: report.truncated,
    }
}

pub fn from_run(
    job_id: Uuid,
    workspace: &Path,
    compile: Option<&StageReport>,
    run: StageReport,
) -> ExecutionResult {
    let status = match run.verdict {
        StageVerdict::Completed if run.exit_code == Some(0) => ExecutionStatus::Succeeded,
        StageVerdict::Completed => ExecutionStatus::RuntimeFailed,
        StageVerdict::TimedOut => ExecutionStatus::TimedOut,
        StageVerdict::Cancelled => ExecutionStatus::Cancelled,
        StageVerdict::Killed => ExecutionStatus::ResourceExceeded,
    };
    let compile_duration = compile.map(|report| report.duration).unwrap_or_default();
    ExecutionResult {
        job_id,
        status,
        stdout: redact(&run.stdout, workspace),
        stderr: redact(&run.stderr, workspace),
        exit_code: run.exit_code,
        duration_ms: (run.duration + compile_duration).as_millis() as u64,
        truncated: run.truncated,
    }
}

pub fn unsupported_language(job_id: Uuid, language: &str) -> ExecutionResult {
    ExecutionResult {
        job_id,
        status: ExecutionStatus::UnsupportedLanguage,
        stdout: String::new(),
        stderr: format!("language is not supported: {language}"),
        exit_code: None,
        duration_ms: 0,
        truncated: false,
    }
}

pub fn rejected_at_provisioning(job_id: Uuid, reason: String) -> ExecutionResult {
    ExecutionResult {
        job_id,
        status: ExecutionStatus::CompilationFailed,
        stdout: String::new(),
        stderr: reason,
        exit_code: None,
        duration_ms: 0,
        truncated: false,
    }
}

pub fn cancelled_before_start(job_id: Uuid) -> ExecutionResult {
    ExecutionResult {
        job_id,
        status: ExecutionStatus::Cancelled,
        stdout: String::new(),
        stderr: String::new(),
        exit_code: None,
        duration_ms: 0,
        truncated: false,
    }
}

pub fn engine_fault(job_id: Uuid) -> ExecutionResult {
    // detail stays in the logs; callers never see host paths or backtraces
    ExecutionResult {
        job_id,
        status: ExecutionStatus::InternalError,
        stdout: String::new(),
        stderr: String::new(),
        exit_code: None,
        duration_ms: 0,
        truncated: false,
    }
}

fn redact(text: &str, workspace: &Path) -> String {
    let root = workspace.to_string_lossy();
    text.replace(&format!("{root}/"), "").replace(root.as_ref(), "")
}

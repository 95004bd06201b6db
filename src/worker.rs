use std::sync::Arc;

use crate::{
    format,
    metrics::MetricsRegistry,
    models::{ExecutionResult, JobState},
    queue::{QueuedJob, Scheduler},
    sandbox::{CancelFlag, SandboxBackend, StageSpec},
    workspace::{ProvisionError, WorkspaceManager},
};

pub fn spawn_worker_pool(
    workers: usize,
    scheduler: Scheduler,
    workspaces: WorkspaceManager,
    metrics: Arc<MetricsRegistry>,
    sandbox: Arc<dyn SandboxBackend>,
) {
    for worker_id in 0..workers {
        let scheduler = scheduler.clone();
        let workspaces = workspaces.clone();
        let metrics = metrics.clone();
        let sandbox = sandbox.clone();
        tokio::spawn(async move {
            worker_loop(worker_id, scheduler, workspaces, metrics, sandbox).await;
        });
    }
}

async fn worker_loop(
    worker_id: usize,
    scheduler: Scheduler,
    workspaces: WorkspaceManager,
    metrics: Arc<MetricsRegistry>,
    sandbox: Arc<dyn SandboxBackend>,
) {
    let receiver = scheduler.receiver();
    loop {
        let job = {
            let mut locked = receiver.lock().await;
            locked.recv().await
        };
        let Some(job) = job else {
            tracing::info!(worker_id, "job queue closed, worker exiting");
            break;
        };

        tracing::info!(
            worker_id,
            job_id = %job.id,
            language = %job.profile.id,
            backend = sandbox.name(),
            "starting execution"
        );
        metrics.started();
        let result = run_job(&job, &scheduler, &workspaces, sandbox.as_ref()).await;
        tracing::info!(
            worker_id,
            job_id = %job.id,
            status = ?result.status,
            duration_ms = result.duration_ms,
            "execution finished"
        );
        scheduler.finish(job.id, result);
    }
}

async fn run_job(
    job: &QueuedJob,
    scheduler: &Scheduler,
    workspaces: &WorkspaceManager,
    sandbox: &dyn SandboxBackend,
) -> ExecutionResult {
    let Some(cancel) = scheduler.cancel_flag(job.id) else {
        tracing::error!(job_id = %job.id, "job entry vanished before execution");
        return format::engine_fault(job.id);
    };
    if cancel.is_cancelled() {
        return format::cancelled_before_start(job.id);
    }

    scheduler.update_state(job.id, JobState::Provisioning);
    let handle = match workspaces
        .provision(job.id, &job.profile, &job.request.source)
        .await
    {
        Ok(handle) => handle,
        Err(ProvisionError::AmbiguousEntry(reason)) => {
            return format::rejected_at_provisioning(job.id, reason);
        }
        Err(ProvisionError::Io(err)) => {
            tracing::error!(job_id = %job.id, error = %err, "workspace provisioning failed");
            return format::engine_fault(job.id);
        }
    };

    let spec = StageSpec {
        workspace: handle.root().to_path_buf(),
        scratch: handle.scratch().to_path_buf(),
        profile: job.profile.clone(),
        limits: job.limits.clone(),
        args: job.request.args.clone(),
    };

    let result = execute_stages(job, scheduler, sandbox, &spec, &cancel).await;
    workspaces.release(handle).await;

    match result {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(job_id = %job.id, error = %err, "sandbox backend fault");
            format::engine_fault(job.id)
        }
    }
}

async fn execute_stages(
    job: &QueuedJob,
    scheduler: &Scheduler,
    sandbox: &dyn SandboxBackend,
    spec: &StageSpec,
    cancel: &CancelFlag,
) -> anyhow::Result<ExecutionResult> {
    let compile = if spec.profile.compile_command.is_some() {
        scheduler.update_state(job.id, JobState::Compiling);
        let report = sandbox.compile(spec, cancel).await?;
        if !report.success() {
            // never run stale or missing artifacts
            return Ok(format::from_compile(job.id, &spec.workspace, report));
        }
        Some(report)
    } else {
        None
    };

    scheduler.update_state(job.id, JobState::Running);
    let run = sandbox.run(spec, &job.request.stdin, cancel).await?;
    Ok(format::from_run(
        job.id,
        &spec.workspace,
        compile.as_ref(),
        run,
    ))
}

use std::{sync::Arc, time::Duration};

use uuid::Uuid;

use crate::{
    config::EngineConfig,
    error::EngineError,
    format,
    metrics::MetricsRegistry,
    models::{ExecutionLimits, ExecutionRequest, ExecutionResult, JobSnapshot},
    profile::{LanguageProfile, ProfileRegistry},
    queue::Scheduler,
    sandbox::{ProcessSandbox, SandboxBackend},
    worker::spawn_worker_pool,
    workspace::WorkspaceManager,
};

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    registry: ProfileRegistry,
    scheduler: Scheduler,
    metrics: Arc<MetricsRegistry>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let sandbox = Arc::new(ProcessSandbox::new(
            config.isolation,
            Duration::from_millis(config.kill_grace_ms),
        ));
        Self::with_backend(config, ProfileRegistry::builtin(), sandbox)
    }

    pub fn with_backend(
        config: EngineConfig,
        registry: ProfileRegistry,
        sandbox: Arc<dyn SandboxBackend>,
    ) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.workspace_root).map_err(|err| {
            EngineError::Workspace(format!(
                "cannot create workspace root {}: {err}",
                config.workspace_root.display()
            ))
        })?;
        let metrics = Arc::new(MetricsRegistry::new());
        let scheduler = Scheduler::new(config.queue_capacity, metrics.clone());
        let workspaces = WorkspaceManager::new(config.workspace_root.clone());
        spawn_worker_pool(
            config.max_concurrent_jobs.max(1),
            scheduler.clone(),
            workspaces,
            metrics.clone(),
            sandbox,
        );
        Ok(Self {
            config,
            registry,
            scheduler,
            metrics,
        })
    }

    pub async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult, EngineError> {
        let id = match self.submit(request) {
            Ok(id) => id,
            Err(EngineError::UnsupportedLanguage(language)) => {
                return Ok(format::unsupported_language(Uuid::new_v4(), &language));
            }
            Err(err) => return Err(err),
        };
        self.wait(id).await
    }

    pub fn submit(&self, request: ExecutionRequest) -> Result<Uuid, EngineError> {
        let profile = self
            .registry
            .lookup(&request.language)
            .ok_or_else(|| EngineError::UnsupportedLanguage(request.language.clone()))?
            .clone();
        validate(&self.config, &request)?;
        let limits = self.resolve_limits(&profile, request.limits.as_ref());
        self.scheduler.submit(profile, request, limits)
    }

    pub async fn wait(&self, id: Uuid) -> Result<ExecutionResult, EngineError> {
        self.scheduler.wait(id).await
    }

    pub fn cancel(&self, id: Uuid) -> Result<(), EngineError> {
        self.scheduler.cancel(id)
    }

    pub fn snapshot(&self, id: Uuid) -> Result<JobSnapshot, EngineError> {
        self.scheduler.snapshot(id)
    }

    pub fn forget(&self, id: Uuid) -> Result<(), EngineError> {
        self.scheduler.forget(id)
    }

    pub fn supported_languages(&self) -> Vec<&str> {
        self.registry.ids()
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    fn resolve_limits(
        &self,
        profile: &LanguageProfile,
        requested: Option<&crate::models::LimitsOverride>,
    ) -> ExecutionLimits {
        let mut limits = self.config.default_limits.clone().merged(&profile.limits);
        if let Some(overrides) = self.config.language_limits.get(&profile.id) {
            limits = limits.merged(overrides);
        }
        if let Some(overrides) = requested {
            limits = limits.merged(overrides);
        }
        limits.normalized()
    }
}

fn validate(config: &EngineConfig, request: &ExecutionRequest) -> Result<(), EngineError> {
    if request.source.trim().is_empty() {
        return Err(EngineError::InvalidRequest("source is empty".into()));
    }
    if request.source.len() > config.max_source_bytes {
        return Err(EngineError::InvalidRequest("source too large".into()));
    }
    if request.stdin.len() > config.max_stdin_bytes {
        return Err(EngineError::InvalidRequest("stdin too large".into()));
    }
    if request.args.len() > config.max_args {
        return Err(EngineError::InvalidRequest("too many runtime args".into()));
    }
    if let Some(limits) = &request.limits {
        if limits.wall_clock_ms == Some(0)
            || limits.cpu_time_ms == Some(0)
            || limits.memory_bytes == Some(0)
            || limits.max_output_bytes == Some(0)
        {
            return Err(EngineError::InvalidRequest(
                "limits must be greater than zero".into(),
            ));
        }
    }
    Ok(())
}

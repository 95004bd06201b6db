mod process;

use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{models::ExecutionLimits, profile::LanguageProfile};

pub use process::ProcessSandbox;

#[derive(Debug, Clone)]
pub struct StageSpec {
    pub workspace: PathBuf,
    pub scratch: PathBuf,
    pub profile: LanguageProfile,
    pub limits: ExecutionLimits,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageVerdict {
    Completed,
    TimedOut,
    Cancelled,
    Killed,
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub verdict: StageVerdict,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub truncated: bool,
}

impl StageReport {
    pub fn success(&self) -> bool {
        self.verdict == StageVerdict::Completed && self.exit_code == Some(0)
    }
}

#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            // register before checking so a concurrent cancel() is never missed
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn compile(&self, spec: &StageSpec, cancel: &CancelFlag) -> anyhow::Result<StageReport>;
    async fn run(
        &self,
        spec: &StageSpec,
        stdin: &str,
        cancel: &CancelFlag,
    ) -> anyhow::Result<StageReport>;
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{CancelFlag, StageReport, StageVerdict};

    #[test]
    fn success_requires_clean_exit() {
        let report = StageReport {
            verdict: StageVerdict::Completed,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: "warning: unused".into(),
            duration: Duration::from_millis(5),
            truncated: false,
        };
        assert!(report.success());

        let failed = StageReport {
            exit_code: Some(1),
            ..report.clone()
        };
        assert!(!failed.success());

        let killed = StageReport {
            verdict: StageVerdict::Killed,
            exit_code: None,
            ..report
        };
        assert!(!killed.success());
    }

    #[tokio::test]
    async fn cancel_wakes_pending_waiters() {
        let flag = Arc::new(CancelFlag::default());
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        flag.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after cancel")
            .unwrap();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_set() {
        let flag = CancelFlag::default();
        flag.cancel();
        tokio::time::timeout(Duration::from_millis(100), flag.cancelled())
            .await
            .expect("already-cancelled flag should not block");
    }
}

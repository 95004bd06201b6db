use std::{
    process::Stdio,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anyhow::Context;
use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
};

use crate::{
    config::IsolationMode,
    models::ExecutionLimits,
    sandbox::{CancelFlag, SandboxBackend, StageReport, StageSpec, StageVerdict},
};

const DRAIN_WINDOW: Duration = Duration::from_millis(500);

pub struct ProcessSandbox {
    isolation: IsolationMode,
    kill_grace: Duration,
}

impl ProcessSandbox {
    pub fn new(isolation: IsolationMode, kill_grace: Duration) -> Self {
        if isolation == IsolationMode::BestEffort {
            tracing::info!("sandbox isolation is best-effort; namespace denial degrades silently");
        }
        Self {
            isolation,
            kill_grace,
        }
    }
}

#[async_trait]
impl SandboxBackend for ProcessSandbox {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn compile(&self, spec: &StageSpec, cancel: &CancelFlag) -> anyhow::Result<StageReport> {
        let template = spec
            .profile
            .compile_command
            .as_deref()
            .context("profile has no compile command")?;
        let argv = spec.profile.render_command(template, &spec.workspace);
        self.run_stage(spec, argv, "", cancel).await
    }

    async fn run(
        &self,
        spec: &StageSpec,
        stdin: &str,
        cancel: &CancelFlag,
    ) -> anyhow::Result<StageReport> {
        let mut argv = spec
            .profile
            .render_command(&spec.profile.run_command, &spec.workspace);
        argv.extend(spec.args.iter().cloned());
        self.run_stage(spec, argv, stdin, cancel).await
    }
}

enum Waited {
    Exited(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

impl ProcessSandbox {
    async fn run_stage(
        &self,
        spec: &StageSpec,
        argv: Vec<String>,
        stdin: &str,
        cancel: &CancelFlag,
    ) -> anyhow::Result<StageReport> {
        if cancel.is_cancelled() {
            return Ok(cancelled_before_spawn());
        }

        let (program, rest) = argv.split_first().context("empty command template")?;
        let mut cmd = Command::new(program);
        cmd.args(rest)
            .current_dir(&spec.workspace)
            .env_clear()
            .env(
                "PATH",
                std::env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".into()),
            )
            .env("HOME", &spec.scratch)
            .env("TMPDIR", &spec.scratch)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &spec.profile.env {
            cmd.env(key, value);
        }
        apply_isolation(&mut cmd, &spec.limits, self.isolation);

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        let pid = child.id();

        if let Some(mut pipe) = child.stdin.take() {
            let bytes = stdin.as_bytes().to_vec();
            tokio::spawn(async move {
                let _ = pipe.write_all(&bytes).await;
                let _ = pipe.shutdown().await;
            });
        }

        let cap = spec.limits.max_output_bytes;
        let stdout_pipe = child.stdout.take().context("missing stdout pipe")?;
        let stderr_pipe = child.stderr.take().context("missing stderr pipe")?;
        let stdout_sink = Arc::new(OutputSink::default());
        let stderr_sink = Arc::new(OutputSink::default());
        let stdout_task = tokio::spawn(pump(stdout_pipe, cap, stdout_sink.clone()));
        let stderr_task = tokio::spawn(pump(stderr_pipe, cap, stderr_sink.clone()));

        let wall_clock = Duration::from_millis(spec.limits.wall_clock_ms);
        let waited = tokio::select! {
            waited = tokio::time::timeout(wall_clock, child.wait()) => match waited {
                Ok(status) => Waited::Exited(status.context("wait for sandboxed child failed")?),
                Err(_) => {
                    self.terminate_group(&mut child, pid).await;
                    Waited::TimedOut
                }
            },
            _ = cancel.cancelled() => {
                self.terminate_group(&mut child, pid).await;
                Waited::Cancelled
            }
        };

        // pipes EOF once the process group is gone; the window only matters if
        // submitted code re-parented a writer into a fresh session
        drain(stdout_task).await;
        drain(stderr_task).await;
        let (stdout, stdout_truncated) = stdout_sink.snapshot();
        let (stderr, stderr_truncated) = stderr_sink.snapshot();

        let (verdict, exit_code) = match waited {
            Waited::Exited(status) => match status.code() {
                Some(code) => (StageVerdict::Completed, Some(code)),
                None => (signal_verdict(&status), None),
            },
            Waited::TimedOut => (StageVerdict::TimedOut, None),
            Waited::Cancelled => (StageVerdict::Cancelled, None),
        };

        Ok(StageReport {
            verdict,
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration: started.elapsed(),
            truncated: stdout_truncated || stderr_truncated,
        })
    }

    async fn terminate_group(&self, child: &mut Child, pid: Option<u32>) {
        signal_group(pid, TERM);
        let reaped = tokio::time::timeout(self.kill_grace, child.wait())
            .await
            .is_ok();
        if !reaped {
            signal_group(pid, KILL);
            let _ = child.kill().await;
        }
        let _ = child.wait().await;
    }
}

fn cancelled_before_spawn() -> StageReport {
    StageReport {
        verdict: StageVerdict::Cancelled,
        exit_code: None,
        stdout: String::new(),
        stderr: String::new(),
        duration: Duration::ZERO,
        truncated: false,
    }
}

#[derive(Debug, Default)]
struct OutputSink {
    inner: Mutex<SinkState>,
}

#[derive(Debug, Default)]
struct SinkState {
    data: Vec<u8>,
    truncated: bool,
}

impl OutputSink {
    fn snapshot(&self) -> (Vec<u8>, bool) {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        (state.data.clone(), state.truncated)
    }
}

async fn pump<R>(mut reader: R, cap: usize, sink: Arc<OutputSink>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut state = sink.inner.lock().unwrap_or_else(|e| e.into_inner());
                let kept = state.data.len();
                if kept < cap {
                    let remaining = cap - kept;
                    state.data.extend_from_slice(&chunk[..remaining.min(n)]);
                    if n > remaining {
                        state.truncated = true;
                    }
                } else {
                    state.truncated = true;
                }
            }
        }
    }
}

async fn drain(task: tokio::task::JoinHandle<()>) {
    let abort = task.abort_handle();
    if tokio::time::timeout(DRAIN_WINDOW, task).await.is_err() {
        abort.abort();
    }
}

#[cfg(unix)]
const TERM: libc::c_int = libc::SIGTERM;
#[cfg(unix)]
const KILL: libc::c_int = libc::SIGKILL;
#[cfg(not(unix))]
const TERM: i32 = 0;
#[cfg(not(unix))]
const KILL: i32 = 0;

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: libc::c_int) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as libc::pid_t), signal);
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _signal: i32) {}

#[cfg(unix)]
fn signal_verdict(status: &std::process::ExitStatus) -> StageVerdict {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(libc::SIGXCPU) => StageVerdict::TimedOut,
        _ => StageVerdict::Killed,
    }
}

#[cfg(not(unix))]
fn signal_verdict(_status: &std::process::ExitStatus) -> StageVerdict {
    StageVerdict::Killed
}

#[cfg(unix)]
fn apply_isolation(cmd: &mut Command, limits: &ExecutionLimits, mode: IsolationMode) {
    use std::io;

    let cpu_secs = limits.cpu_time_ms.div_ceil(1000).max(1);
    let memory_bytes = limits.memory_bytes;
    let max_processes = limits.max_processes as u64;
    let enforced = mode == IsolationMode::Enforced;

    unsafe {
        cmd.pre_exec(move || {
            // post-fork, pre-exec: raw syscalls only, no allocation or logging
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            #[cfg(target_os = "linux")]
            {
                let rc = libc::unshare(libc::CLONE_NEWUSER | libc::CLONE_NEWNET);
                if rc != 0 && enforced {
                    return Err(io::Error::last_os_error());
                }
                let set = |resource, value: u64| {
                    let limit = libc::rlimit {
                        rlim_cur: value as libc::rlim_t,
                        rlim_max: value as libc::rlim_t,
                    };
                    libc::setrlimit(resource, &limit)
                };
                let applied = [
                    set(libc::RLIMIT_CPU, cpu_secs),
                    set(libc::RLIMIT_AS, memory_bytes),
                    set(libc::RLIMIT_NPROC, max_processes),
                    set(libc::RLIMIT_FSIZE, memory_bytes),
                    set(libc::RLIMIT_CORE, 0),
                ];
                if enforced && applied.iter().any(|rc| *rc != 0) {
                    return Err(io::Error::last_os_error());
                }
            }
            #[cfg(not(target_os = "linux"))]
            {
                let _ = (cpu_secs, memory_bytes, max_processes, enforced);
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_isolation(_cmd: &mut Command, _limits: &ExecutionLimits, _mode: IsolationMode) {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{OutputSink, pump};

    #[tokio::test]
    async fn pump_caps_output_and_marks_truncation() {
        let sink = Arc::new(OutputSink::default());
        pump(&b"0123456789abcdef"[..], 8, sink.clone()).await;
        let (data, truncated) = sink.snapshot();
        assert_eq!(data, b"01234567");
        assert!(truncated);
    }

    #[tokio::test]
    async fn pump_keeps_exact_cap_without_truncation() {
        let sink = Arc::new(OutputSink::default());
        pump(&b"12345678"[..], 8, sink.clone()).await;
        let (data, truncated) = sink.snapshot();
        assert_eq!(data, b"12345678");
        assert!(!truncated);
    }

    #[tokio::test]
    async fn pump_handles_empty_stream() {
        let sink = Arc::new(OutputSink::default());
        pump(&b""[..], 8, sink.clone()).await;
        let (data, truncated) = sink.snapshot();
        assert!(data.is_empty());
        assert!(!truncated);
    }
}

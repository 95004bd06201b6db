#![cfg(unix)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use runbox::{
    Engine, EngineConfig, ExecutionRequest, ExecutionStatus, IsolationMode, JobState,
    LimitsOverride,
    profile::{LanguageProfile, ProfileRegistry},
    sandbox::ProcessSandbox,
};
use tempfile::TempDir;
use uuid::Uuid;

fn sh_profile(id: &str, compile_command: Option<Vec<String>>) -> LanguageProfile {
    LanguageProfile {
        id: id.into(),
        source_name: "main.sh".into(),
        compile_command,
        run_command: vec!["sh".into(), "{source}".into()],
        env: Vec::new(),
        fixed_entry: false,
        limits: LimitsOverride::default(),
    }
}

fn sh_engine() -> (Engine, TempDir) {
    let workspace_root = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        max_concurrent_jobs: 2,
        queue_capacity: 64,
        workspace_root: workspace_root.path().to_path_buf(),
        kill_grace_ms: 300,
        isolation: IsolationMode::BestEffort,
        ..EngineConfig::default()
    };
    let registry = ProfileRegistry::new([
        sh_profile("sh", None),
        sh_profile(
            "sh-badcc",
            Some(vec![
                "sh".into(),
                "-c".into(),
                "echo compile error >&2; exit 1".into(),
            ]),
        ),
        sh_profile("sh-okcc", Some(vec!["sh".into(), "-c".into(), "exit 0".into()])),
    ]);
    let sandbox = Arc::new(ProcessSandbox::new(
        config.isolation,
        Duration::from_millis(config.kill_grace_ms),
    ));
    let engine = Engine::with_backend(config, registry, sandbox).unwrap();
    (engine, workspace_root)
}

fn sh_request(source: &str) -> ExecutionRequest {
    ExecutionRequest {
        language: "sh".into(),
        source: source.into(),
        stdin: String::new(),
        args: Vec::new(),
        limits: None,
    }
}

async fn wait_for_state(engine: &Engine, id: Uuid, wanted: JobState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if engine.snapshot(id).unwrap().state == wanted {
            return;
        }
        assert!(Instant::now() < deadline, "job never reached {wanted:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prints_a_fixed_string() {
    let (engine, _root) = sh_engine();
    let result = engine.execute(sh_request("echo hello world")).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.stdout, "hello world\n");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_code, Some(0));
    assert!(!result.truncated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn echoes_stdin_back() {
    let (engine, _root) = sh_engine();
    let mut request = sh_request("read line\necho \"$line\"");
    request.stdin = "hello\n".into();
    let result = engine.execute(request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert!(result.stdout.contains("hello"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preserves_stdout_and_stderr_separately() {
    let (engine, _root) = sh_engine();
    let result = engine
        .execute(sh_request("echo visible\necho warning >&2"))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.stdout, "visible\n");
    assert_eq!(result.stderr, "warning\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nonzero_exit_is_a_runtime_failure() {
    let (engine, _root) = sh_engine();
    let result = engine.execute(sh_request("exit 3")).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::RuntimeFailed);
    assert_eq!(result.exit_code, Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_compile_skips_the_run_stage() {
    let (engine, _root) = sh_engine();
    let mut request = sh_request("echo should never run");
    request.language = "sh-badcc".into();
    let result = engine.execute(request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::CompilationFailed);
    assert!(result.stderr.contains("compile error"));
    assert_eq!(result.stdout, "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn successful_compile_proceeds_to_run() {
    let (engine, _root) = sh_engine();
    let mut request = sh_request("echo built and ran");
    request.language = "sh-okcc".into();
    let result = engine.execute(request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.stdout, "built and ran\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn infinite_loop_is_killed_at_the_wall_clock_limit() {
    let (engine, root) = sh_engine();
    let mut request = sh_request("sleep 30 &\nwhile :; do :; done");
    request.limits = Some(LimitsOverride {
        wall_clock_ms: Some(300),
        ..LimitsOverride::default()
    });

    let started = Instant::now();
    let result = engine.execute(request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::TimedOut);
    assert_eq!(result.exit_code, None);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_output_is_truncated_not_failed() {
    let (engine, _root) = sh_engine();
    let mut request = sh_request(
        "i=0\nwhile [ $i -lt 5000 ]; do echo 0123456789012345; i=$((i+1)); done",
    );
    request.limits = Some(LimitsOverride {
        max_output_bytes: Some(2048),
        ..LimitsOverride::default()
    });
    let result = engine.execute(request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert!(result.truncated);
    assert!(result.stdout.len() <= 2048);
    assert!(result.stdout.starts_with("0123456789012345\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn identical_requests_run_in_isolated_workspaces() {
    let (engine, root) = sh_engine();
    let first = engine.execute(sh_request("echo same")).await.unwrap();
    let second = engine.execute(sh_request("echo same")).await.unwrap();

    assert_eq!(first.status, ExecutionStatus::Succeeded);
    assert_eq!(second.status, ExecutionStatus::Succeeded);
    assert_ne!(first.job_id, second.job_id);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_a_running_process_reclaims_everything() {
    let (engine, root) = sh_engine();
    let id = engine.submit(sh_request("sleep 30")).unwrap();
    wait_for_state(&engine, id, JobState::Running).await;

    let started = Instant::now();
    engine.cancel(id).unwrap();
    let result = engine.wait(id).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn workspace_paths_never_leak_into_output() {
    let (engine, root) = sh_engine();
    let result = engine.execute(sh_request("pwd")).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert!(!result.stdout.contains("job-"));
    assert!(!result.stdout.contains(&root.path().to_string_lossy().into_owned()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runtime_args_are_forwarded() {
    let (engine, _root) = sh_engine();
    let mut request = sh_request("echo \"$1\"");
    request.args = vec!["first-arg".into()];
    let result = engine.execute(request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.stdout, "first-arg\n");
}

fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn python_profile_runs_when_the_interpreter_exists() {
    if !python3_available() {
        eprintln!("skipping: python3 not installed");
        return;
    }

    let workspace_root = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        workspace_root: workspace_root.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = Engine::new(config).unwrap();

    let request = ExecutionRequest {
        language: "python".into(),
        source: "import sys\nline = sys.stdin.readline().strip()\nprint(f\"got {line}\")".into(),
        stdin: "snake\n".into(),
        args: Vec::new(),
        limits: None,
    };
    let result = engine.execute(request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded, "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "got snake\n");
}

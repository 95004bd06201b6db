use std::{collections::HashMap, env, path::PathBuf, str::FromStr};

use crate::models::{ExecutionLimits, LimitsOverride};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
    pub default_limits: ExecutionLimits,
    pub language_limits: HashMap<String, LimitsOverride>,
    pub workspace_root: PathBuf,
    pub kill_grace_ms: u64,
    pub isolation: IsolationMode,
    pub max_source_bytes: usize,
    pub max_stdin_bytes: usize,
    pub max_args: usize,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            queue_capacity: 1024,
            default_limits: ExecutionLimits {
                cpu_time_ms: 3000,
                wall_clock_ms: 5000,
                memory_bytes: 256 * 1024 * 1024,
                max_processes: 256,
                max_output_bytes: 64 * 1024,
            },
            language_limits: HashMap::new(),
            workspace_root: env::temp_dir().join("runbox"),
            kill_grace_ms: 500,
            isolation: IsolationMode::BestEffort,
            max_source_bytes: 256_000,
            max_stdin_bytes: 256_000,
            max_args: 16,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs),
            queue_capacity: env_parse("QUEUE_CAPACITY", defaults.queue_capacity),
            default_limits: ExecutionLimits {
                cpu_time_ms: env_parse("DEFAULT_CPU_TIME_MS", defaults.default_limits.cpu_time_ms),
                wall_clock_ms: env_parse(
                    "DEFAULT_WALL_CLOCK_MS",
                    defaults.default_limits.wall_clock_ms,
                ),
                memory_bytes: env_parse("DEFAULT_MEMORY_BYTES", defaults.default_limits.memory_bytes),
                max_processes: env_parse(
                    "DEFAULT_MAX_PROCESSES",
                    defaults.default_limits.max_processes,
                ),
                max_output_bytes: env_parse(
                    "MAX_OUTPUT_BYTES",
                    defaults.default_limits.max_output_bytes,
                ),
            },
            language_limits: parse_language_limits(
                &env::var("LANGUAGE_LIMITS").unwrap_or_default(),
            ),
            workspace_root: env::var("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            kill_grace_ms: env_parse("KILL_GRACE_MS", defaults.kill_grace_ms),
            isolation: env_parse("ISOLATION", defaults.isolation),
            max_source_bytes: env_parse("MAX_SOURCE_BYTES", defaults.max_source_bytes),
            max_stdin_bytes: env_parse("MAX_STDIN_BYTES", defaults.max_stdin_bytes),
            max_args: env_parse("MAX_ARGS", defaults.max_args),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationMode {
    Enforced,
    #[default]
    BestEffort,
}

impl FromStr for IsolationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enforced" => Ok(Self::Enforced),
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            _ => Err(format!("unsupported isolation mode: {s}")),
        }
    }
}

fn parse_language_limits(input: &str) -> HashMap<String, LimitsOverride> {
    let mut map = HashMap::new();
    for raw in input.split(';') {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((language, assignments)) = entry.split_once(':') else {
            continue;
        };
        let mut overrides = LimitsOverride::default();
        for assignment in assignments.split(',') {
            let Some((key, value)) = assignment.split_once('=') else {
                continue;
            };
            match key.trim() {
                "cpu_time_ms" => overrides.cpu_time_ms = value.trim().parse().ok(),
                "wall_clock_ms" => overrides.wall_clock_ms = value.trim().parse().ok(),
                "memory_bytes" => overrides.memory_bytes = value.trim().parse().ok(),
                "max_processes" => overrides.max_processes = value.trim().parse().ok(),
                "max_output_bytes" => overrides.max_output_bytes = value.trim().parse().ok(),
                _ => {}
            }
        }
        map.insert(language.trim().to_ascii_lowercase(), overrides);
    }
    map
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

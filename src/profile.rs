use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::models::LimitsOverride;

#[derive(Debug, Clone)]
pub struct LanguageProfile {
    pub id: String,
    pub source_name: String,
    pub compile_command: Option<Vec<String>>,
    pub run_command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub fixed_entry: bool,
    pub limits: LimitsOverride,
}

impl LanguageProfile {
    pub fn source_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.source_name)
    }

    pub fn render_command(&self, argv: &[String], workspace: &Path) -> Vec<String> {
        let source = self.source_path(workspace);
        let bin = workspace.join("app");
        argv.iter()
            .map(|arg| {
                arg.replace("{source}", &source.to_string_lossy())
                    .replace("{workspace}", &workspace.to_string_lossy())
                    .replace("{bin}", &bin.to_string_lossy())
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct ProfileRegistry {
    profiles: HashMap<String, LanguageProfile>,
}

impl ProfileRegistry {
    pub fn new(profiles: impl IntoIterator<Item = LanguageProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.id.clone(), profile))
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_profiles())
    }

    pub fn lookup(&self, id: &str) -> Option<&LanguageProfile> {
        self.profiles.get(id.trim().to_ascii_lowercase().as_str())
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

fn builtin_profiles() -> Vec<LanguageProfile> {
    vec![
        LanguageProfile {
            id: "python".into(),
            source_name: "main.py".into(),
            compile_command: None,
            run_command: argv(&["python3", "-I", "{source}"]),
            env: pairs(&[("PYTHONDONTWRITEBYTECODE", "1"), ("PYTHONUNBUFFERED", "1")]),
            fixed_entry: false,
            limits: LimitsOverride::default(),
        },
        LanguageProfile {
            id: "javascript".into(),
            source_name: "main.js".into(),
            compile_command: None,
            run_command: argv(&["node", "{source}"]),
            env: Vec::new(),
            fixed_entry: false,
            limits: LimitsOverride {
                memory_bytes: Some(1024 * 1024 * 1024),
                ..LimitsOverride::default()
            },
        },
        LanguageProfile {
            id: "typescript".into(),
            source_name: "main.ts".into(),
            compile_command: Some(argv(&["tsc", "--outDir", "{workspace}", "{source}"])),
            run_command: argv(&["node", "{workspace}/main.js"]),
            env: Vec::new(),
            fixed_entry: false,
            limits: LimitsOverride {
                wall_clock_ms: Some(20_000),
                cpu_time_ms: Some(15_000),
                memory_bytes: Some(2 * 1024 * 1024 * 1024),
                ..LimitsOverride::default()
            },
        },
        LanguageProfile {
            id: "java".into(),
            source_name: "Main.java".into(),
            compile_command: Some(argv(&["javac", "{source}"])),
            run_command: argv(&["java", "-Xmx256m", "-cp", "{workspace}", "Main"]),
            env: Vec::new(),
            fixed_entry: true,
            limits: LimitsOverride {
                wall_clock_ms: Some(20_000),
                cpu_time_ms: Some(15_000),
                memory_bytes: Some(4 * 1024 * 1024 * 1024),
                ..LimitsOverride::default()
            },
        },
        LanguageProfile {
            id: "rust".into(),
            source_name: "main.rs".into(),
            compile_command: Some(argv(&["rustc", "-O", "{source}", "-o", "{bin}"])),
            run_command: argv(&["{bin}"]),
            env: Vec::new(),
            fixed_entry: false,
            limits: LimitsOverride {
                wall_clock_ms: Some(30_000),
                cpu_time_ms: Some(20_000),
                memory_bytes: Some(2 * 1024 * 1024 * 1024),
                ..LimitsOverride::default()
            },
        },
        LanguageProfile {
            id: "c".into(),
            source_name: "main.c".into(),
            compile_command: Some(argv(&["gcc", "-O2", "{source}", "-o", "{bin}"])),
            run_command: argv(&["{bin}"]),
            env: Vec::new(),
            fixed_entry: false,
            limits: LimitsOverride {
                wall_clock_ms: Some(15_000),
                cpu_time_ms: Some(10_000),
                ..LimitsOverride::default()
            },
        },
    ]
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

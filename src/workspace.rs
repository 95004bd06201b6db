use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::profile::LanguageProfile;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{0}")]
    AmbiguousEntry(String),
    #[error("workspace io failure: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct WorkspaceHandle {
    root: PathBuf,
    scratch: PathBuf,
    released: bool,
}

impl WorkspaceHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }
}

impl Drop for WorkspaceHandle {
    fn drop(&mut self) {
        // backstop for panic/early-return paths; release() is the normal exit
        if !self.released {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    pub async fn provision(
        &self,
        job_id: Uuid,
        profile: &LanguageProfile,
        source: &str,
    ) -> Result<WorkspaceHandle, ProvisionError> {
        if profile.fixed_entry {
            let declared = public_type_count(source);
            if declared > 1 {
                return Err(ProvisionError::AmbiguousEntry(format!(
                    "submission declares {declared} public top-level types; expected exactly one"
                )));
            }
        }

        let root = self.base.join(format!("job-{}", job_id.as_simple()));
        let scratch = root.join("scratch");
        tokio::fs::create_dir_all(&scratch).await?;
        // sandboxed processes may run as the overflow uid inside a user
        // namespace; the workspace must stay writable for them
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for path in [&root, &scratch] {
                tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777)).await?;
            }
        }
        tokio::fs::write(profile.source_path(&root), source).await?;

        Ok(WorkspaceHandle {
            root,
            scratch,
            released: false,
        })
    }

    pub async fn release(&self, mut handle: WorkspaceHandle) {
        handle.released = true;
        if let Err(err) = tokio::fs::remove_dir_all(&handle.root).await {
            tracing::warn!(path = %handle.root.display(), error = %err, "workspace removal failed");
        }
    }
}

fn public_type_count(source: &str) -> usize {
    source
        .lines()
        .map(str::trim_start)
        .filter(|line| {
            ["public class ", "public interface ", "public enum ", "public record "]
                .iter()
                .any(|prefix| line.starts_with(prefix))
        })
        .count()
}

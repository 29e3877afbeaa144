//! Launching the external deploy command

use chrono::{DateTime, Utc};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::HookConfig;
use crate::error::HookError;

/// One deploy to launch: a project directory and the commit to check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployInvocation {
    pub project_path: PathBuf,
    pub commit_hash: String,
    pub dispatched_at: DateTime<Utc>,
}

impl DeployInvocation {
    pub fn new(project_path: PathBuf, commit_hash: String) -> Self {
        Self {
            project_path,
            commit_hash,
            dispatched_at: Utc::now(),
        }
    }
}

/// Starts deploys without waiting for them.
///
/// `launch` reports only whether the deploy could be started. What the deploy
/// does afterwards never reaches the caller.
pub trait Dispatcher: Send + Sync {
    fn launch(&self, invocation: &DeployInvocation, config: &HookConfig) -> Result<(), HookError>;
}

/// Runs `<deploy_command> <project path> <commit>` with the toolkit directory
/// first on `PATH` and all standard streams closed.
///
/// Must be called from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandDispatcher;

impl Dispatcher for CommandDispatcher {
    fn launch(&self, invocation: &DeployInvocation, config: &HookConfig) -> Result<(), HookError> {
        let search_path = toolkit_search_path(&config.toolkit_path)?;

        let mut command = std::process::Command::new(&config.deploy_command);
        command
            .arg(&invocation.project_path)
            .arg(&invocation.commit_hash)
            .env("PATH", search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group, so a Ctrl-C aimed at the server leaves deploys running.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = Command::from(command).spawn().map_err(|e| {
            error!(
                "Failed to start '{}' for {}: {}",
                config.deploy_command,
                invocation.project_path.display(),
                e
            );
            HookError::DispatchFailure(e.to_string())
        })?;

        info!(
            "Started deploy of {} at {} (pid {:?})",
            invocation.project_path.display(),
            invocation.commit_hash,
            child.id()
        );

        // Reap the child in the background. Its outcome is only logged.
        let project = invocation.project_path.clone();
        let started = invocation.dispatched_at;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    let elapsed = Utc::now() - started;
                    info!(
                        "Deploy of {} finished after {}s",
                        project.display(),
                        elapsed.num_seconds()
                    );
                }
                Ok(status) => warn!("Deploy of {} exited with {}", project.display(), status),
                Err(e) => warn!("Lost track of deploy of {}: {}", project.display(), e),
            }
        });

        Ok(())
    }
}

/// `toolkit_path` followed by the server's own `PATH` entries.
pub fn toolkit_search_path(toolkit_path: &Path) -> Result<OsString, HookError> {
    let mut entries = vec![toolkit_path.to_path_buf()];
    if let Some(existing) = env::var_os("PATH") {
        entries.extend(env::split_paths(&existing));
    }
    env::join_paths(entries)
        .map_err(|e| HookError::DispatchFailure(format!("invalid toolkit path: {}", e)))
}

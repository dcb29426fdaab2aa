use std::process::Stdio;
use std::sync::Arc;

use axis_events::{EventKind, Hub};
use axis_protocol::{AutomationPayload, AutomationState};
use tracing::{info, warn};

pub(crate) const DEFAULT_PROGRAM: &str = "copilot";

#[derive(Debug, thiserror::Error)]
pub(crate) enum LaunchError {
    #[error("task must not be empty")]
    EmptyTask,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Starts an external automation run. Implementations return once the run
/// has been started and never wait for it.
pub(crate) trait Launcher: Send + Sync {
    fn launch(&self, task: &str) -> Result<(), LaunchError>;
}

/// Runs `<program> -p <task> --allow-all` with the server's stdout/stderr.
pub(crate) struct CommandLauncher {
    program: String,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, task: &str) -> Result<(), LaunchError> {
        let mut child = tokio::process::Command::new(&self.program)
            .arg("-p")
            .arg(task)
            .arg("--allow-all")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let pid = child.id();
        let program = self.program.clone();
        // Reap in the background; the outcome is only logged.
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(target: "axis::automation", %program, ?pid, %status, "automation run exited"),
                Err(err) => warn!(target: "axis::automation", %program, ?pid, %err, "automation run wait failed"),
            }
        });
        Ok(())
    }
}

pub(crate) struct AutomationGateway {
    launcher: Arc<dyn Launcher>,
    hub: Hub,
}

impl AutomationGateway {
    pub fn new(launcher: Arc<dyn Launcher>, hub: Hub) -> Self {
        Self { launcher, hub }
    }

    /// Start one run for `task` and announce the outcome of the launch.
    pub fn dispatch(&self, task: &str) -> Result<(), LaunchError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(LaunchError::EmptyTask);
        }
        match self.launcher.launch(task) {
            Ok(()) => {
                info!(target: "axis::automation", task, "automation started");
                self.hub.publish(
                    EventKind::Automation,
                    &AutomationPayload {
                        state: AutomationState::Started,
                        task: task.to_string(),
                        error: None,
                    },
                );
                Ok(())
            }
            Err(err) => {
                warn!(target: "axis::automation", task, %err, "automation launch failed");
                self.hub.publish(
                    EventKind::Automation,
                    &AutomationPayload {
                        state: AutomationState::Error,
                        task: task.to_string(),
                        error: Some(err.to_string()),
                    },
                );
                Err(err)
            }
        }
    }
}

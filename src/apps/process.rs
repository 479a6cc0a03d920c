//! Child process supervision for applications and goods.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

/// A program that can be started and stopped repeatedly
#[derive(Debug)]
pub struct ManagedProcess {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl ManagedProcess {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: Mutex::new(None),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Spawn the program; a no-op when it is already running
    pub async fn start(&self) -> Result<Option<u32>> {
        let mut slot = self.child.lock().await;

        if let Some(child) = slot.as_mut() {
            if child.try_wait()?.is_none() {
                return Ok(child.id());
            }
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.program))?;

        let pid = child.id();
        info!(program = %self.program, ?pid, "Process started");
        *slot = Some(child);
        Ok(pid)
    }

    /// Kill the program and reap it, waiting at most `grace`
    pub async fn stop(&self, grace: Duration) -> Result<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        if child.try_wait()?.is_some() {
            return Ok(());
        }

        child
            .start_kill()
            .with_context(|| format!("Failed to kill '{}'", self.program))?;

        match timeout(grace, child.wait()).await {
            Ok(status) => {
                let status = status.with_context(|| format!("Failed to reap '{}'", self.program))?;
                info!(program = %self.program, %status, "Process stopped");
            }
            Err(_) => warn!(program = %self.program, ?grace, "Process did not exit in time"),
        }

        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_stop() {
        let process = ManagedProcess::new("sleep", vec!["30".to_string()]);

        process.start().await.unwrap();
        assert!(process.is_running().await);

        process.stop(Duration::from_secs(2)).await.unwrap();
        assert!(!process.is_running().await);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let process = ManagedProcess::new("/nonexistent/rulegate-app", Vec::new());
        let err = process.start().await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn test_stop_when_never_started() {
        let process = ManagedProcess::new("sleep", Vec::new());
        process.stop(Duration::from_millis(10)).await.unwrap();
    }
}

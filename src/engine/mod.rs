//! External-engine adapter.
//!
//! Supervises the ndt7 client subprocess for one run, translating its JSON
//! event lines into [`TestEvent`]s on the shared channel. The `--demo`
//! variant feeds the same channel from a synthetic source.

mod demo;

use crate::model::{RunConfig, TestEvent};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// True when a session could start right now: either the demo source or a
/// resolvable client executable.
pub fn client_available(cfg: &RunConfig) -> bool {
    cfg.demo || resolve_client(&cfg.client_path).is_some()
}

/// Resolve the configured executable: taken as a path when it has one,
/// otherwise searched on PATH.
fn resolve_client(bin: &str) -> Option<PathBuf> {
    let candidate = Path::new(bin);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(bin))
        .find(|full| full.is_file())
}

pub struct TestEngine {
    cfg: RunConfig,
}

impl TestEngine {
    pub fn new(cfg: RunConfig) -> Self {
        Self { cfg }
    }

    /// Drive one full measurement run, forwarding every engine event. A
    /// returned error means the run ended without a terminal event; the
    /// caller folds it into an error event.
    pub async fn run(self, event_tx: mpsc::UnboundedSender<TestEvent>) -> Result<()> {
        if self.cfg.demo {
            return demo::run(&event_tx).await;
        }
        self.run_client(&event_tx).await
    }

    async fn run_client(&self, event_tx: &mpsc::UnboundedSender<TestEvent>) -> Result<()> {
        let client = resolve_client(&self.cfg.client_path)
            .with_context(|| format!("ndt7 client `{}` not found", self.cfg.client_path))?;

        let mut child = Command::new(&client)
            .arg("--format=jsonl")
            .arg(format!("--client-name={}", self.cfg.client_name))
            .arg(format!("--client-version={}", self.cfg.client_version))
            .arg(format!("--download-worker={}", self.cfg.download_worker))
            .arg(format!("--upload-worker={}", self.cfg.upload_worker))
            .args(
                self.cfg
                    .user_accepted_data_policy
                    .then_some("--accept-data-policy"),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch {}", client.display()))?;

        let stdout = child.stdout.take().context("client stdout unavailable")?;
        let stderr = child.stderr.take();

        // Drain stderr so the child never blocks on it; keep the last line
        // for the exit diagnostic.
        let stderr_task = tokio::spawn(async move {
            let mut last_line = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        last_line = line;
                    }
                }
            }
            last_line
        });

        let mut saw_terminal = false;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await.context("read client output")? {
            // Lines that are not events (progress noise, banners) are dropped.
            let Ok(event) = serde_json::from_str::<TestEvent>(&line) else {
                continue;
            };
            saw_terminal |= matches!(
                event,
                TestEvent::UploadComplete | TestEvent::Error { .. }
            );
            if event_tx.send(event).is_err() {
                child.start_kill().ok();
                break;
            }
        }

        let status = child.wait().await.context("wait for client exit")?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !saw_terminal {
            let detail = if stderr_tail.is_empty() {
                String::new()
            } else {
                format!(": {stderr_tail}")
            };
            anyhow::bail!("ndt7 client exited ({status}) before completing the run{detail}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_search_path_and_paths_hit_disk() {
        // A bare name that cannot exist on PATH.
        assert!(resolve_client("ndt7-client-that-does-not-exist-anywhere").is_none());
        // A relative path skips the PATH search entirely.
        assert!(resolve_client("./ndt7-client-that-does-not-exist-anywhere").is_none());
    }
}

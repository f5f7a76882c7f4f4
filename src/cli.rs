use crate::engine::{self, TestEngine};
use crate::model::{MeasurementPayload, MeasurementSource, RunConfig, TestEvent};
use crate::session::{status_text, SessionController, SessionPhase, StartOutcome};
use crate::storage::Store;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "ndt7-dash",
    version,
    about = "ndt7 speed dashboard with optional TUI"
)]
pub struct Cli {
    /// Print the saved session record as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print a text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Accept the M-Lab data policy for this and future runs
    #[arg(long)]
    pub accept_data_policy: bool,

    /// Use the built-in demo engine instead of a real ndt7 client
    #[arg(long)]
    pub demo: bool,

    /// Automatically start a test when the dashboard launches
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub test_on_launch: bool,

    /// Name or path of the ndt7 client binary
    #[arg(long, default_value = "ndt7-client")]
    pub client: String,

    /// Client name reported to the measurement service
    #[arg(long, default_value = "lyvt-speed-lab")]
    pub client_name: String,

    /// Client version reported to the measurement service
    #[arg(long, default_value = "1.0.0")]
    pub client_version: String,

    /// Download worker script handed to the client
    #[arg(long, default_value = "ndt7-download-worker.min.js")]
    pub download_worker: String,

    /// Upload worker script handed to the client
    #[arg(long, default_value = "ndt7-upload-worker.min.js")]
    pub upload_worker: String,

    /// Export the session archive as JSON after the run
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,
}

pub async fn run(args: Cli) -> Result<()> {
    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(args, false).await;
        }
    }

    let json = args.json;
    run_headless(args, json).await
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        user_accepted_data_policy: args.accept_data_policy,
        client_name: args.client_name.clone(),
        client_version: args.client_version.clone(),
        download_worker: args.download_worker.clone(),
        upload_worker: args.upload_worker.clone(),
        client_path: args.client.clone(),
        demo: args.demo,
    }
}

/// Progress line for text mode, written to stderr so stdout stays parseable.
/// Server-sourced ticks carry no throughput figure and stay quiet.
fn progress_line(event: &TestEvent) -> Option<String> {
    match event {
        TestEvent::ServerChosen { server } => Some(format!("Node: {}", server.node_label())),
        TestEvent::DownloadStart => Some("== Download ==".into()),
        TestEvent::UploadStart => Some("== Upload ==".into()),
        TestEvent::DownloadMeasurement { payload } => {
            client_mbps(payload).map(|m| format!("Download: {:.2} Mbps", m))
        }
        TestEvent::UploadMeasurement { payload } => {
            client_mbps(payload).map(|m| format!("Upload: {:.2} Mbps", m))
        }
        _ => None,
    }
}

fn client_mbps(payload: &Option<MeasurementPayload>) -> Option<f64> {
    let payload = payload.as_ref()?;
    if payload.source != Some(MeasurementSource::Client) {
        return None;
    }
    payload
        .data
        .as_ref()?
        .mean_client_mbps
        .filter(|m| m.is_finite())
}

/// Run one session without a TUI and print the outcome. `json` selects the
/// saved record as pretty JSON on stdout instead of the text summary.
async fn run_headless(args: Cli, json: bool) -> Result<()> {
    let mut session = SessionController::new(Store::open_default());
    if args.accept_data_policy && !session.consent() {
        session.set_consent(true).ok();
    }
    if !session.consent() {
        anyhow::bail!(
            "{}. Pass --accept-data-policy to accept it.",
            status_text::CONSENT_PROMPT
        );
    }

    let mut cfg = build_config(&args);
    cfg.user_accepted_data_policy = true;

    let outcome = session.request_start(engine::client_available(&cfg));
    if outcome == StartOutcome::EngineMissing {
        anyhow::bail!("{}: {}", status_text::CLIENT_MISSING, cfg.client_path);
    }
    if outcome != StartOutcome::Started {
        anyhow::bail!(status_text::CONSENT_PROMPT);
    }

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<TestEvent>();
    let engine = TestEngine::new(cfg);
    let handle = tokio::spawn(async move { engine.run(evt_tx).await });

    while let Some(ev) = evt_rx.recv().await {
        if !json {
            if let Some(line) = progress_line(&ev) {
                let _ = out_tx.send(OutputLine::Stderr(line));
            }
        }
        session.handle_event(ev);
    }

    // The channel closed, so the engine task is done. Fold a failure back in
    // as an error event so the session reaches a terminal phase.
    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => session.handle_event(TestEvent::Error {
            message: format!("{e:#}"),
        }),
        Err(e) => session.handle_event(TestEvent::Error {
            message: format!("engine task failed: {e}"),
        }),
    }

    let failed = session.phase() == SessionPhase::Error;
    if failed {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "{}: {}",
            status_text::FAILED,
            session.last_error().unwrap_or("unknown error")
        )));
    } else if json {
        let record = session
            .store()
            .load_history()
            .into_iter()
            .next()
            .context("no session record was saved")?;
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&record)?));
    } else {
        let summary = crate::text_summary::build_text_summary(&session.snapshot());
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    if let Some(path) = args.export_json.as_deref() {
        session.store().export_history(path)?;
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "Exported: {}",
            path.display()
        )));
    }

    drop(out_tx);
    let _ = out_handle.await;

    if failed {
        anyhow::bail!(
            "{}",
            session.last_error().unwrap_or(status_text::FAILED)
        );
    }
    Ok(())
}

//! Run lifecycle controller.
//!
//! Launches one engine task per start command and folds its outcome back
//! into the event stream for whichever presentation layer is listening.

use crate::engine::TestEngine;
use crate::model::{RunConfig, TestEvent};
use anyhow::Result;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers. Each start carries its own config so a
/// consent grant made after launch reaches the client flags.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    StartTest(RunConfig),
    Quit,
}

/// Internal handle for a running engine task.
struct RunCtx {
    handle: Option<tokio::task::JoinHandle<Result<()>>>,
}

fn start_run(cfg: RunConfig, event_tx: UnboundedSender<TestEvent>) -> RunCtx {
    let engine = TestEngine::new(cfg);
    let handle = tokio::spawn(async move { engine.run(event_tx).await });
    RunCtx {
        handle: Some(handle),
    }
}

/// Orchestrate engine runs based on UI commands. An engine task that returns
/// an error, or dies outright, surfaces as an error event so the session
/// always reaches a terminal state.
pub(crate) async fn run_controller(
    event_tx: UnboundedSender<TestEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut run_ctx: Option<RunCtx> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::StartTest(cfg)) => {
                        // The session layer already guards re-entry; a start
                        // racing an unfinished task is dropped here too.
                        if run_ctx.is_none() {
                            run_ctx = Some(start_run(cfg, event_tx.clone()));
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Aborting the task drops the child handle, which
                        // kills the subprocess.
                        if let Some(ctx) = &mut run_ctx {
                            if let Some(handle) = ctx.handle.take() {
                                handle.abort();
                            }
                        }
                        break;
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it
            // can be dropped when another branch is chosen and completion is
            // never observed.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(handle) = ctx.handle.as_mut() {
                        return Some(handle.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    if let Some(ctx) = &mut run_ctx {
                        ctx.handle.take();
                    }
                    match join_res {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            let _ = event_tx.send(TestEvent::Error {
                                message: format!("{e:#}"),
                            });
                        }
                        Err(e) => {
                            let _ = event_tx.send(TestEvent::Error {
                                message: format!("engine task failed: {e}"),
                            });
                        }
                    }
                    run_ctx = None;
                }
            }
        }
    }

    Ok(())
}

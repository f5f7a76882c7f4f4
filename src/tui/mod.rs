mod charts;

use crate::cli::Cli;
use crate::engine;
use crate::model::{TestEvent, Theme};
use crate::orchestrator::{self, UiCommand};
use crate::session::{SessionController, SessionPhase, Snapshot, StartOutcome, StatusKind};
use crate::stats::{BadgeTone, ConsistencyBadge, JitterBadge, LossBadge, PingStability};
use crate::storage::{self, Store};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub const EMPTY_HISTORY_TEXT: &str = "No sessions yet. Run a test to build your archive.";

/// State owned by the UI thread. Everything measurement-related lives in the
/// session controller; this is only chrome.
struct UiState {
    tab: usize,
    theme: Theme,
    info: String,
    history: Vec<crate::model::HistoryRecord>,
    last_exported_path: Option<String>,
}

pub async fn run(args: Cli) -> Result<()> {
    // Unbounded channels avoid backpressure and task switching in the hot path.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TestEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(args, event_rx, cmd_tx));

    let res = orchestrator::run_controller(event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    args: Cli,
    mut event_rx: UnboundedReceiver<TestEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // The session controller is owned by the UI thread only; engine events
    // reach it through the channel, never by shared mutation.
    let mut session = SessionController::new(Store::open_default());
    if args.accept_data_policy && !session.consent() {
        session.set_consent(true).ok();
    }

    let mut ui = UiState {
        tab: 0,
        theme: session.store().theme(),
        info: String::new(),
        history: session.store().load_history(),
        last_exported_path: None,
    };

    if args.test_on_launch {
        try_start(&args, &mut session, &cmd_tx, &mut ui);
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut prev_phase = session.phase();

    let res = loop {
        // Drain events without blocking to keep the UI responsive; the
        // unbounded channel means the engine never stalls on a slow redraw.
        while let Ok(ev) = event_rx.try_recv() {
            session.handle_event(ev);
        }
        if session.phase() != prev_phase {
            if session.phase() == SessionPhase::Success {
                ui.history = session.store().load_history();
                ui.info = "Saved to archive".into();
            }
            prev_phase = session.phase();
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &session, &ui)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('r')) => {
                        try_start(&args, &mut session, &cmd_tx, &mut ui);
                    }
                    (_, KeyCode::Char('c')) => {
                        let granted = !session.consent();
                        match session.set_consent(granted) {
                            Ok(()) => {
                                ui.info = if granted {
                                    "Data policy accepted".into()
                                } else {
                                    "Data policy consent revoked".into()
                                };
                            }
                            Err(e) => {
                                ui.info = format!("Consent not persisted: {e:#}");
                            }
                        }
                    }
                    (_, KeyCode::Char('t')) => {
                        ui.theme = ui.theme.toggle();
                        session.store_mut().set_theme(ui.theme).ok();
                    }
                    (_, KeyCode::Tab) => {
                        ui.tab = (ui.tab + 1) % 3;
                    }
                    (_, KeyCode::Char('?')) => {
                        ui.tab = 2;
                    }
                    (_, KeyCode::Char('x')) => {
                        if ui.tab == 1 {
                            match session.store_mut().clear_history() {
                                Ok(()) => {
                                    ui.history.clear();
                                    ui.info = "Archive cleared".into();
                                }
                                Err(e) => {
                                    ui.info = format!("Clear failed: {e:#}");
                                }
                            }
                        }
                    }
                    (_, KeyCode::Char('e')) => {
                        if ui.tab == 1 && !ui.history.is_empty() {
                            match export_history_json(session.store()) {
                                Ok(p) => {
                                    ui.last_exported_path =
                                        Some(p.to_string_lossy().to_string());
                                    ui.info = format!(
                                        "Exported JSON: {} (press 'y' to copy path)",
                                        p.display()
                                    );
                                }
                                Err(e) => {
                                    ui.info = format!("JSON export failed: {e:#}");
                                }
                            }
                        }
                    }
                    (_, KeyCode::Char('y')) => {
                        if ui.tab == 1 {
                            if let Some(ref path) = ui.last_exported_path {
                                match copy_to_clipboard(path) {
                                    Ok(_) => {
                                        ui.info = format!(
                                            "Copied to clipboard: {}",
                                            short_path(path)
                                        );
                                    }
                                    Err(e) => {
                                        ui.info = format!("Clipboard copy failed: {e:#}");
                                    }
                                }
                            } else {
                                ui.info =
                                    "No exported file path to copy. Export first (e)".into();
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// Apply the session start guards and, when they pass, hand the orchestrator
/// a config that reflects the current consent state.
fn try_start(
    args: &Cli,
    session: &mut SessionController,
    cmd_tx: &UnboundedSender<UiCommand>,
    ui: &mut UiState,
) {
    let mut cfg = crate::cli::build_config(args);
    cfg.user_accepted_data_policy = session.consent();
    match session.request_start(engine::client_available(&cfg)) {
        StartOutcome::Started => {
            ui.info.clear();
            let _ = cmd_tx.send(UiCommand::StartTest(cfg));
        }
        StartOutcome::AlreadyRunning => {
            ui.info = "A test is already running".into();
        }
        StartOutcome::ConsentRequired => {
            ui.info = "Press 'c' to accept the data policy".into();
        }
        StartOutcome::EngineMissing => {
            ui.info = format!(
                "No ndt7 client at '{}'. Install it or pass --demo",
                cfg.client_path
            );
        }
    }
}

fn base_style(theme: Theme) -> Style {
    match theme {
        Theme::Dark => Style::default(),
        Theme::Light => Style::default().fg(Color::Black).bg(Color::White),
    }
}

fn tone_style(tone: BadgeTone) -> Style {
    match tone {
        BadgeTone::Success => Style::default().fg(Color::Green),
        BadgeTone::Warning => Style::default().fg(Color::Yellow),
        BadgeTone::Error => Style::default().fg(Color::Red),
    }
}

fn status_style(kind: StatusKind) -> Style {
    match kind {
        StatusKind::Idle => Style::default().fg(Color::Gray),
        StatusKind::Active => Style::default().fg(Color::Yellow),
        StatusKind::Success => Style::default().fg(Color::Green),
        StatusKind::Error => Style::default().fg(Color::Red),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, session: &SessionController, ui: &UiState) {
    let base = base_style(ui.theme);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Dashboard"),
        Line::from("Archive"),
        Line::from("Help"),
    ])
    .select(ui.tab)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("ndt7-dash")
            .style(base),
    )
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match ui.tab {
        0 => draw_dashboard(chunks[1], f, session, ui),
        1 => draw_history(chunks[1], f, ui),
        _ => draw_help(chunks[1], f, ui),
    }
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, session: &SessionController, ui: &UiState) {
    if area.height < 23 {
        return draw_dashboard_compact(area, f, session, ui);
    }

    let snap = session.snapshot();
    let base = base_style(ui.theme);

    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(5), // metric cards
                Constraint::Length(4), // quality badges
                Constraint::Min(8),    // live graph
                Constraint::Length(6), // status row
            ]
            .as_ref(),
        )
        .split(area);

    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage(34),
                Constraint::Percentage(33),
                Constraint::Percentage(33),
            ]
            .as_ref(),
        )
        .split(main[0]);

    render_metric_card(
        f,
        cards[0],
        "Download",
        snap.state.last_download,
        snap.stats.peak_download,
        snap.stats.avg_download,
        charts::DOWNLOAD_COLOR,
        base,
    );
    render_metric_card(
        f,
        cards[1],
        "Upload",
        snap.state.last_upload,
        snap.stats.peak_upload,
        snap.stats.avg_upload,
        charts::UPLOAD_COLOR,
        base,
    );
    render_ping_card(f, cards[2], &snap, session.has_samples(), base);

    let quality = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25); 4].as_ref())
        .split(main[1]);

    let has_samples = session.has_samples();
    let jitter_badge = JitterBadge::classify(snap.stats.jitter);
    render_quality_cell(
        f,
        quality[0],
        "Jitter",
        format!("{:.1} ms", snap.stats.jitter),
        (jitter_badge.label(), jitter_badge.tone()),
        has_samples,
        "pending",
        base,
    );
    let loss_badge = LossBadge::classify(snap.stats.packet_loss);
    render_quality_cell(
        f,
        quality[1],
        "Packet loss",
        format!("{:.1}%", snap.stats.packet_loss),
        (loss_badge.label(), loss_badge.tone()),
        has_samples,
        "estimating…",
        base,
    );
    let consistency_badge = ConsistencyBadge::classify(snap.stats.consistency);
    render_quality_cell(
        f,
        quality[2],
        "Consistency",
        format!("{}%", snap.stats.consistency),
        (consistency_badge.label(), consistency_badge.tone()),
        has_samples,
        "pending",
        base,
    );
    render_best_cell(f, quality[3], ui, base);

    charts::draw_speed_graph(f, main[2], &snap.state.graph_samples, base);

    let mut status_lines = vec![Line::from(vec![
        Span::styled("Status: ", Style::default().fg(Color::Gray)),
        Span::styled(
            snap.status.label,
            status_style(snap.status.kind).add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled("Node: ", Style::default().fg(Color::Gray)),
        Span::raw(snap.state.server_label.clone()),
        Span::raw("   "),
        Span::styled("Policy: ", Style::default().fg(Color::Gray)),
        Span::styled(
            if snap.consent { "accepted" } else { "not accepted" },
            if snap.consent {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Red)
            },
        ),
    ])];
    if let Some(err) = snap.last_error {
        status_lines.push(Line::from(vec![
            Span::styled("Error: ", Style::default().fg(Color::Red)),
            Span::raw(err),
        ]));
    }
    if !ui.info.is_empty() {
        status_lines.push(Line::from(vec![
            Span::styled("Info: ", Style::default().fg(Color::Gray)),
            Span::raw(ui.info.clone()),
        ]));
    }
    status_lines.push(Line::from(
        "Keys: r run | c consent | t theme | tab switch | ? help | q quit",
    ));

    let status = Paragraph::new(status_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Status")
            .style(base),
    );
    f.render_widget(status, main[3]);
}

fn draw_dashboard_compact(
    area: Rect,
    f: &mut ratatui::Frame,
    session: &SessionController,
    ui: &UiState,
) {
    let snap = session.snapshot();
    let base = base_style(ui.theme);

    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(5),
                Constraint::Min(5),
                Constraint::Length(4),
            ]
            .as_ref(),
        )
        .split(area);

    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage(34),
                Constraint::Percentage(33),
                Constraint::Percentage(33),
            ]
            .as_ref(),
        )
        .split(main[0]);

    render_metric_card(
        f,
        cards[0],
        "Download",
        snap.state.last_download,
        snap.stats.peak_download,
        snap.stats.avg_download,
        charts::DOWNLOAD_COLOR,
        base,
    );
    render_metric_card(
        f,
        cards[1],
        "Upload",
        snap.state.last_upload,
        snap.stats.peak_upload,
        snap.stats.avg_upload,
        charts::UPLOAD_COLOR,
        base,
    );
    render_ping_card(f, cards[2], &snap, session.has_samples(), base);

    charts::draw_speed_graph(f, main[1], &snap.state.graph_samples, base);

    let mut status_lines = vec![Line::from(vec![
        Span::styled("Status: ", Style::default().fg(Color::Gray)),
        Span::styled(
            snap.status.label,
            status_style(snap.status.kind).add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled("Node: ", Style::default().fg(Color::Gray)),
        Span::raw(snap.state.server_label.clone()),
    ])];
    status_lines.push(Line::from(
        "Keys: r run | c consent | t theme | tab switch | ? help | q quit",
    ));
    let status = Paragraph::new(status_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Status")
            .style(base),
    );
    f.render_widget(status, main[2]);
}

fn render_metric_card(
    f: &mut ratatui::Frame,
    area: Rect,
    title: &str,
    now: f64,
    peak: f64,
    avg: f64,
    accent: Color,
    base: Style,
) {
    let lines = vec![
        Line::from(vec![
            Span::styled(
                format!("{:>7.1}", now),
                Style::default().fg(accent).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" Mbps"),
        ]),
        Line::from(vec![
            Span::styled("peak ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:.1}", peak)),
            Span::styled("   avg ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:.1}", avg)),
        ]),
    ];
    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(title.to_string(), Style::default().fg(accent)))
            .style(base),
    );
    f.render_widget(p, area);
}

fn render_ping_card(
    f: &mut ratatui::Frame,
    area: Rect,
    snap: &Snapshot,
    has_samples: bool,
    base: Style,
) {
    let stability = PingStability::classify(snap.stats.jitter);
    let badge = if has_samples {
        Span::styled(
            stability.label(),
            tone_style(stability.tone()).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled("pending", Style::default().fg(Color::Gray))
    };
    let lines = vec![
        Line::from(vec![
            Span::styled(
                format!("{:>7.0}", snap.state.last_ping),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" ms"),
        ]),
        Line::from(vec![
            Span::styled("avg ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:.0} ms", snap.stats.avg_ping)),
            Span::raw("   "),
            badge,
        ]),
    ];
    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled("Ping", Style::default().fg(Color::Yellow)))
            .style(base),
    );
    f.render_widget(p, area);
}

fn render_quality_cell(
    f: &mut ratatui::Frame,
    area: Rect,
    title: &str,
    value: String,
    badge: (&'static str, BadgeTone),
    has_samples: bool,
    placeholder: &'static str,
    base: Style,
) {
    let lines = if has_samples {
        vec![
            Line::from(value),
            Line::from(Span::styled(
                badge.0,
                tone_style(badge.1).add_modifier(Modifier::BOLD),
            )),
        ]
    } else {
        vec![
            Line::from("-"),
            Line::from(Span::styled(placeholder, Style::default().fg(Color::Gray))),
        ]
    };
    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title.to_string())
            .style(base),
    );
    f.render_widget(p, area);
}

fn render_best_cell(f: &mut ratatui::Frame, area: Rect, ui: &UiState, base: Style) {
    let lines = match storage::best_record(&ui.history) {
        Some(best) => vec![
            Line::from(format!("{:.1} Mbps @ {}", best.download_avg, best.node)),
            Line::from(Span::styled(
                "all-time download",
                Style::default().fg(Color::Gray),
            )),
        ],
        None => vec![
            Line::from("-"),
            Line::from(Span::styled(
                "no runs yet",
                Style::default().fg(Color::Gray),
            )),
        ],
    };
    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Best")
            .style(base),
    );
    f.render_widget(p, area);
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, ui: &UiState) {
    let base = base_style(ui.theme);
    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(vec![
        Span::raw(format!(
            "Archive ({} of {} slots) - ",
            ui.history.len(),
            storage::MAX_HISTORY
        )),
        Span::styled("e", Style::default().fg(Color::Magenta)),
        Span::raw(": export JSON, "),
        Span::styled("y", Style::default().fg(Color::Magenta)),
        Span::raw(": copy path, "),
        Span::styled("x", Style::default().fg(Color::Magenta)),
        Span::raw(": clear"),
    ]));
    lines.push(Line::from(""));

    if ui.history.is_empty() {
        lines.push(Line::from(EMPTY_HISTORY_TEXT));
    } else {
        for (idx, r) in ui.history.iter().enumerate() {
            lines.push(Line::from(vec![
                Span::styled(format!("{:>2}. ", idx + 1), Style::default().fg(Color::Gray)),
                Span::styled(format_timestamp(r.timestamp), Style::default().fg(Color::Gray)),
                Span::raw("  "),
                Span::styled(
                    format!("DL {:>6.1} Mbps", r.download_avg),
                    Style::default().fg(charts::DOWNLOAD_COLOR),
                ),
                Span::raw("  "),
                Span::styled(
                    format!("UL {:>6.1} Mbps", r.upload_avg),
                    Style::default().fg(charts::UPLOAD_COLOR),
                ),
                Span::raw("  "),
                Span::raw(format!("ping {:>3.0} ms", r.ping_avg)),
                Span::raw("  "),
                Span::raw(format!("jitter {:>4.1}", r.jitter)),
                Span::raw("  "),
                Span::raw(format!("loss {:.1}%", r.packet_loss)),
                Span::raw("  "),
                Span::styled(r.node.clone(), Style::default().fg(Color::Blue)),
            ]));
        }
        if let Some(best) = storage::best_record(&ui.history) {
            lines.push(Line::from(""));
            lines.push(Line::from(vec![
                Span::styled("Best: ", Style::default().fg(Color::Gray)),
                Span::styled(
                    format!("{:.1} Mbps @ {}", best.download_avg, best.node),
                    Style::default().fg(Color::Green),
                ),
            ]));
        }
    }

    if let Some(ref path) = ui.last_exported_path {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Last exported: ", Style::default().fg(Color::Gray)),
            Span::styled(path.clone(), Style::default().fg(Color::Cyan)),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Press ", Style::default().fg(Color::Gray)),
            Span::styled("y", Style::default().fg(Color::Magenta)),
            Span::styled(" to copy path to clipboard", Style::default().fg(Color::Gray)),
        ]));
    }

    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Archive")
            .style(base),
    );
    f.render_widget(p, area);
}

fn draw_help(area: Rect, f: &mut ratatui::Frame, ui: &UiState) {
    let base = base_style(ui.theme);
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("r", Style::default().fg(Color::Magenta)),
            Span::raw("           Run a test"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("c", Style::default().fg(Color::Magenta)),
            Span::raw("           Accept/revoke the data policy"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("t", Style::default().fg(Color::Magenta)),
            Span::raw("           Toggle dark/light theme"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("tab", Style::default().fg(Color::Magenta)),
            Span::raw("         Switch tabs"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("?", Style::default().fg(Color::Magenta)),
            Span::raw("           Show this help"),
        ]),
        Line::from(""),
        Line::from("Archive tab:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("e", Style::default().fg(Color::Magenta)),
            Span::raw("           Export archive as JSON"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("y", Style::default().fg(Color::Magenta)),
            Span::raw("           Copy exported path to clipboard"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("x", Style::default().fg(Color::Magenta)),
            Span::raw("           Clear the archive"),
        ]),
        Line::from(""),
        Line::from("Data policy:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled(
                "https://www.measurementlab.net/privacy/",
                Style::default().fg(Color::Cyan),
            ),
        ]),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Help")
            .style(base),
    );
    f.render_widget(p, area);
}

/// Local wall-clock rendering of a stored unix-millisecond stamp. Falls back
/// to UTC when the local offset cannot be determined.
fn format_timestamp(unix_ms: i64) -> String {
    let Ok(utc) = time::OffsetDateTime::from_unix_timestamp_nanos(unix_ms as i128 * 1_000_000)
    else {
        return "-".into();
    };
    let (dt, suffix) = match time::UtcOffset::current_local_offset() {
        Ok(offset) => (utc.to_offset(offset), ""),
        Err(_) => (utc, " UTC"),
    };
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{}",
        dt.year(),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        suffix
    )
}

/// Export the archive into the current directory with a timestamped name.
/// Returns the absolute path of the exported file.
fn export_history_json(store: &Store) -> Result<std::path::PathBuf> {
    let now = time::OffsetDateTime::now_utc();
    let default_name = format!(
        "ndt7-dash-history-{:04}{:02}{:02}-{:02}{:02}{:02}.json",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    );
    let current_dir = std::env::current_dir().context("get current directory")?;
    let path = current_dir.join(default_name);
    store.export_history(&path)?;
    Ok(path)
}

fn short_path(path: &str) -> String {
    if path.chars().count() > 60 {
        let head: String = path.chars().take(57).collect();
        format!("{}...", head)
    } else {
        path.to_string()
    }
}

// Global clipboard manager channel - initialized once on first use
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Initialize the clipboard manager thread if not already initialized.
/// A background thread processes clipboard writes sequentially and keeps each
/// clipboard instance alive long enough for clipboard managers to read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Copy text to clipboard without blocking the UI thread.
fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}

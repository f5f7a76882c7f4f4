use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::canvas::{Canvas, Line as CanvasLine, Points},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::chart;
use crate::model::SampleRing;

/// Series palette, shared with the metric cards.
pub const DOWNLOAD_COLOR: Color = Color::Rgb(167, 139, 250);
pub const UPLOAD_COLOR: Color = Color::Rgb(125, 211, 252);

// Dimmed variants painted under the bright lines as a glow.
const DOWNLOAD_HALO: Color = Color::Rgb(76, 57, 138);
const UPLOAD_HALO: Color = Color::Rgb(44, 85, 102);

pub const EMPTY_GRAPH_TEXT: &str = "Accept & start to stream real ndt7 data";

/// Helper function to draw a line on a canvas
fn draw_line(
    ctx: &mut ratatui::widgets::canvas::Context,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    color: Color,
) {
    ctx.draw(&CanvasLine {
        x1,
        y1,
        x2,
        y2,
        color,
    });
}

fn paint_series(ctx: &mut ratatui::widgets::canvas::Context, points: &[(f64, f64)], color: Color) {
    for pair in points.windows(2) {
        draw_line(ctx, pair[0].0, pair[0].1, pair[1].0, pair[1].1, color);
    }
    if points.len() == 1 {
        ctx.draw(&Points {
            coords: points,
            color,
        });
    }
}

/// Render the live speed graph: download and upload polylines on one shared
/// scale, each drawn twice (halo pass below, bright pass on top).
pub fn draw_speed_graph(f: &mut Frame, area: Rect, samples: &SampleRing, base: Style) {
    let title = Line::from(vec![
        Span::raw("Live throughput (Mbps)  "),
        Span::styled("download", Style::default().fg(DOWNLOAD_COLOR)),
        Span::raw(" / "),
        Span::styled("upload", Style::default().fg(UPLOAD_COLOR)),
        Span::styled(
            format!("  {} samples", samples.len()),
            Style::default().fg(Color::Gray),
        ),
    ]);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(base);

    if samples.is_empty() {
        let empty = Paragraph::new(EMPTY_GRAPH_TEXT)
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let width = area.width.saturating_sub(2).max(1) as f64;
    let y_max = chart::y_scale(samples);
    let download = chart::polyline(samples, width, |s| s.download);
    let upload = chart::polyline(samples, width, |s| s.upload);
    // Vertical spread of the halo lines, in graph units.
    let glow = y_max / 40.0;

    let canvas = Canvas::default()
        .block(block)
        .x_bounds([0.0, width])
        .y_bounds([0.0, y_max])
        .paint(move |ctx| {
            for dy in [-glow, glow] {
                let shifted: Vec<(f64, f64)> = download
                    .iter()
                    .map(|(x, y)| (*x, (y + dy).clamp(0.0, y_max)))
                    .collect();
                paint_series(ctx, &shifted, DOWNLOAD_HALO);
                let shifted: Vec<(f64, f64)> = upload
                    .iter()
                    .map(|(x, y)| (*x, (y + dy).clamp(0.0, y_max)))
                    .collect();
                paint_series(ctx, &shifted, UPLOAD_HALO);
            }
            ctx.layer();
            paint_series(ctx, &download, DOWNLOAD_COLOR);
            paint_series(ctx, &upload, UPLOAD_COLOR);
        });
    f.render_widget(canvas, area);
}

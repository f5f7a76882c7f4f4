//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for text mode from a finished session.

use crate::session::Snapshot;
use crate::stats::{ConsistencyBadge, LossBadge, PingStability};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from the final session snapshot.
pub(crate) fn build_text_summary(snap: &Snapshot) -> TextSummary {
    let stats = snap.stats;
    let mut lines = Vec::new();

    lines.push(format!("Node: {}", snap.state.server_label));
    lines.push(format!(
        "Download: avg {:.2} peak {:.2} Mbps ({} samples, consistency {}% {})",
        stats.avg_download,
        stats.peak_download,
        snap.state.download_values.len(),
        stats.consistency,
        ConsistencyBadge::classify(stats.consistency).label()
    ));
    lines.push(format!(
        "Upload:   avg {:.2} peak {:.2} Mbps ({} samples)",
        stats.avg_upload,
        stats.peak_upload,
        snap.state.upload_values.len()
    ));
    lines.push(format!(
        "Ping: avg {:.0} ms (jitter {:.1} ms, {})",
        stats.avg_ping,
        stats.jitter,
        PingStability::classify(stats.jitter).label()
    ));
    lines.push(format!(
        "Packet loss: {:.1}% ({})",
        stats.packet_loss,
        LossBadge::classify(stats.packet_loss).label()
    ));

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MeasurementState, SessionPhase, StatusKind, StatusLine};
    use crate::model::SessionStats;

    #[test]
    fn summary_lines_carry_final_metrics() {
        let mut state = MeasurementState::default();
        state.server_label = "Frankfurt, DE".to_string();
        state.download_values = vec![94.0, 95.0];
        state.upload_values = vec![30.0];

        let snap = Snapshot {
            phase: SessionPhase::Success,
            status: StatusLine {
                kind: StatusKind::Success,
                label: "Finished measurements",
            },
            stats: SessionStats {
                peak_download: 95.0,
                peak_upload: 30.0,
                avg_download: 94.5,
                avg_upload: 30.0,
                avg_ping: 15.0,
                jitter: 0.8,
                consistency: 99,
                packet_loss: 0.2,
            },
            state: &state,
            last_error: None,
            consent: true,
        };

        let summary = build_text_summary(&snap);
        assert_eq!(summary.lines[0], "Node: Frankfurt, DE");
        assert!(summary.lines[1].contains("avg 94.50"));
        assert!(summary.lines[1].contains("consistency 99% great"));
        assert!(summary.lines[3].contains("15 ms"));
        assert!(summary.lines[3].contains("Excellent"));
        assert!(summary.lines[4].contains("0.2% (clean)"));
    }
}

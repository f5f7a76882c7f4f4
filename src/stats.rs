//! Pure statistics over session sample buffers, and the fixed-threshold
//! quality classifications derived from them.

use crate::model::{MeasurementData, SessionStats};
use crate::session::MeasurementState;

/// Arithmetic mean; 0 for an empty slice.
pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Largest value; 0 for an empty slice.
pub fn max_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Population standard deviation (divide by N); 0 for an empty slice.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = average(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Inverse-dispersion score in 0..=100: dispersion is charged against the
/// mean as a percentage penalty. A single value scores 100, none score 0.
pub fn consistency(values: &[f64]) -> u8 {
    if values.len() < 2 {
        return if values.len() == 1 { 100 } else { 0 };
    }
    let mean = average(values);
    if mean == 0.0 {
        return 0;
    }
    let score = 100.0 - 100.0 * std_dev(values) / mean;
    score.clamp(0.0, 100.0).round() as u8
}

/// Retransmitted share of acked bytes, as a percentage, taken from the most
/// recent server telemetry only. 0 when the counters are absent or unusable.
pub fn packet_loss(last: Option<&MeasurementData>) -> f64 {
    let Some(tcp) = last.and_then(|data| data.tcp_info.as_ref()) else {
        return 0.0;
    };
    let Some(acked) = tcp.bytes_acked else {
        return 0.0;
    };
    if !acked.is_finite() || acked <= 0.0 {
        return 0.0;
    }
    let retrans = tcp.bytes_retrans.unwrap_or(0.0).max(0.0);
    100.0 * retrans / acked
}

/// Full snapshot over the current buffers.
pub fn compute_stats(state: &MeasurementState) -> SessionStats {
    SessionStats {
        peak_download: max_of(&state.download_values),
        peak_upload: max_of(&state.upload_values),
        avg_download: average(&state.download_values),
        avg_upload: average(&state.upload_values),
        avg_ping: average(&state.ping_values),
        jitter: std_dev(&state.ping_values),
        consistency: consistency(&state.download_values),
        packet_loss: packet_loss(state.last_server_measurement.as_ref()),
    }
}

mod thresholds {
    pub const JITTER_STABLE_MS: f64 = 6.0;
    pub const JITTER_MODERATE_MS: f64 = 12.0;
    pub const LOSS_CLEAN_PCT: f64 = 0.5;
    pub const LOSS_MINOR_PCT: f64 = 1.5;
    pub const CONSISTENCY_GREAT: u8 = 90;
    pub const CONSISTENCY_GOOD: u8 = 75;
    pub const PING_EXCELLENT_MS: f64 = 5.0;
    pub const PING_OK_MS: f64 = 12.0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeTone {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterBadge {
    Stable,
    Moderate,
    Spiky,
}

impl JitterBadge {
    pub fn classify(jitter_ms: f64) -> Self {
        if jitter_ms < thresholds::JITTER_STABLE_MS {
            JitterBadge::Stable
        } else if jitter_ms < thresholds::JITTER_MODERATE_MS {
            JitterBadge::Moderate
        } else {
            JitterBadge::Spiky
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            JitterBadge::Stable => "stable",
            JitterBadge::Moderate => "moderate",
            JitterBadge::Spiky => "spiky",
        }
    }

    pub fn tone(self) -> BadgeTone {
        match self {
            JitterBadge::Stable => BadgeTone::Success,
            JitterBadge::Moderate => BadgeTone::Warning,
            JitterBadge::Spiky => BadgeTone::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossBadge {
    Clean,
    Minor,
    Noticeable,
}

impl LossBadge {
    pub fn classify(loss_pct: f64) -> Self {
        if loss_pct < thresholds::LOSS_CLEAN_PCT {
            LossBadge::Clean
        } else if loss_pct < thresholds::LOSS_MINOR_PCT {
            LossBadge::Minor
        } else {
            LossBadge::Noticeable
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LossBadge::Clean => "clean",
            LossBadge::Minor => "minor",
            LossBadge::Noticeable => "noticeable",
        }
    }

    pub fn tone(self) -> BadgeTone {
        match self {
            LossBadge::Clean => BadgeTone::Success,
            LossBadge::Minor => BadgeTone::Warning,
            LossBadge::Noticeable => BadgeTone::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyBadge {
    Great,
    Good,
    Unstable,
}

impl ConsistencyBadge {
    pub fn classify(score: u8) -> Self {
        if score >= thresholds::CONSISTENCY_GREAT {
            ConsistencyBadge::Great
        } else if score >= thresholds::CONSISTENCY_GOOD {
            ConsistencyBadge::Good
        } else {
            ConsistencyBadge::Unstable
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConsistencyBadge::Great => "great",
            ConsistencyBadge::Good => "good",
            ConsistencyBadge::Unstable => "unstable",
        }
    }

    pub fn tone(self) -> BadgeTone {
        match self {
            ConsistencyBadge::Great => BadgeTone::Success,
            ConsistencyBadge::Good => BadgeTone::Warning,
            ConsistencyBadge::Unstable => BadgeTone::Error,
        }
    }
}

/// Ping steadiness rating shown next to the latency card, driven by jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStability {
    Excellent,
    Ok,
    Unstable,
}

impl PingStability {
    pub fn classify(jitter_ms: f64) -> Self {
        if jitter_ms < thresholds::PING_EXCELLENT_MS {
            PingStability::Excellent
        } else if jitter_ms < thresholds::PING_OK_MS {
            PingStability::Ok
        } else {
            PingStability::Unstable
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PingStability::Excellent => "Excellent",
            PingStability::Ok => "OK",
            PingStability::Unstable => "Unstable",
        }
    }

    pub fn tone(self) -> BadgeTone {
        match self {
            PingStability::Excellent => BadgeTone::Success,
            PingStability::Ok => BadgeTone::Warning,
            PingStability::Unstable => BadgeTone::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TcpInfo;

    fn server_data(acked: Option<f64>, retrans: Option<f64>) -> MeasurementData {
        MeasurementData {
            mean_client_mbps: None,
            tcp_info: Some(TcpInfo {
                min_rtt: None,
                bytes_acked: acked,
                bytes_retrans: retrans,
            }),
        }
    }

    #[test]
    fn average_of_empty_is_zero() {
        assert_eq!(average(&[]), 0.0);
        assert_eq!(average(&[2.0, 4.0, 6.0]), 4.0);
    }

    #[test]
    fn max_of_empty_is_zero() {
        assert_eq!(max_of(&[]), 0.0);
        assert_eq!(max_of(&[3.0, 9.5, 1.0]), 9.5);
    }

    #[test]
    fn std_dev_is_population_form() {
        assert_eq!(std_dev(&[5.0, 5.0, 5.0]), 0.0);
        assert_eq!(std_dev(&[0.0, 10.0]), 5.0);
        assert_eq!(std_dev(&[]), 0.0);
    }

    #[test]
    fn consistency_degenerate_inputs() {
        assert_eq!(consistency(&[]), 0);
        assert_eq!(consistency(&[7.0]), 100);
        assert_eq!(consistency(&[10.0, 10.0]), 100);
        assert_eq!(consistency(&[0.0, 0.0]), 0);
    }

    #[test]
    fn consistency_stays_in_range() {
        // Dispersion far beyond the mean would go negative without the clamp.
        assert_eq!(consistency(&[1.0, 1000.0]), 0);
        for window in [&[90.0, 100.0][..], &[5.0, 6.0, 7.0][..], &[0.1, 80.0, 0.1][..]] {
            let score = consistency(window);
            assert!(score <= 100);
        }
    }

    #[test]
    fn packet_loss_requires_usable_acked_count() {
        assert_eq!(packet_loss(None), 0.0);
        assert_eq!(packet_loss(Some(&MeasurementData::default())), 0.0);
        assert_eq!(packet_loss(Some(&server_data(None, Some(10.0)))), 0.0);
        assert_eq!(packet_loss(Some(&server_data(Some(0.0), Some(10.0)))), 0.0);
        assert_eq!(packet_loss(Some(&server_data(Some(-5.0), Some(10.0)))), 0.0);
        assert_eq!(
            packet_loss(Some(&server_data(Some(f64::NAN), Some(10.0)))),
            0.0
        );
        assert_eq!(
            packet_loss(Some(&server_data(Some(f64::INFINITY), Some(10.0)))),
            0.0
        );
    }

    #[test]
    fn packet_loss_clamps_negative_retransmits() {
        assert_eq!(packet_loss(Some(&server_data(Some(1000.0), Some(-4.0)))), 0.0);
        assert_eq!(packet_loss(Some(&server_data(Some(1000.0), None))), 0.0);
        assert_eq!(packet_loss(Some(&server_data(Some(1000.0), Some(15.0)))), 1.5);
    }

    #[test]
    fn compute_stats_reads_all_buffers() {
        let mut state = MeasurementState::default();
        state.download_values = vec![40.0, 45.0];
        state.upload_values = vec![30.0];
        state.ping_values = vec![0.0, 10.0];
        state.last_server_measurement = Some(server_data(Some(200.0), Some(1.0)));

        let stats = compute_stats(&state);
        assert_eq!(stats.avg_download, 42.5);
        assert_eq!(stats.peak_download, 45.0);
        assert_eq!(stats.avg_upload, 30.0);
        assert_eq!(stats.peak_upload, 30.0);
        assert_eq!(stats.avg_ping, 5.0);
        assert_eq!(stats.jitter, 5.0);
        assert_eq!(stats.packet_loss, 0.5);
    }

    #[test]
    fn badge_threshold_boundaries() {
        assert_eq!(JitterBadge::classify(5.9), JitterBadge::Stable);
        assert_eq!(JitterBadge::classify(6.0), JitterBadge::Moderate);
        assert_eq!(JitterBadge::classify(12.0), JitterBadge::Spiky);

        assert_eq!(LossBadge::classify(0.0), LossBadge::Clean);
        assert_eq!(LossBadge::classify(0.5), LossBadge::Minor);
        assert_eq!(LossBadge::classify(1.5), LossBadge::Noticeable);

        assert_eq!(ConsistencyBadge::classify(90), ConsistencyBadge::Great);
        assert_eq!(ConsistencyBadge::classify(75), ConsistencyBadge::Good);
        assert_eq!(ConsistencyBadge::classify(74), ConsistencyBadge::Unstable);

        assert_eq!(PingStability::classify(4.9), PingStability::Excellent);
        assert_eq!(PingStability::classify(5.0), PingStability::Ok);
        assert_eq!(PingStability::classify(12.0), PingStability::Unstable);
    }
}

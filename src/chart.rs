//! Geometry for the live speed graph, kept free of terminal types so the
//! scale and polyline math can be checked without a backend.

use crate::model::{Sample, SampleRing};

/// Ring capacity for graph points.
pub const GRAPH_LIMIT: usize = 200;

/// Y-axis floor in Mbps; low-throughput sessions keep a readable scale.
pub const SCALE_FLOOR_MBPS: f64 = 60.0;

/// Headroom above the observed peak so the line never touches the top edge.
pub const SCALE_HEADROOM: f64 = 1.1;

/// Append a graph point, evicting the oldest beyond the cap.
pub fn push_sample(ring: &mut SampleRing, sample: Sample) {
    ring.push_back(sample);
    while ring.len() > GRAPH_LIMIT {
        ring.pop_front();
    }
}

/// Upper y bound for the graph: `max(60, 1.1 x peak)` across both series.
pub fn y_scale(samples: &SampleRing) -> f64 {
    let peak = samples
        .iter()
        .map(|s| s.download.max(s.upload))
        .fold(0.0, f64::max);
    SCALE_FLOOR_MBPS.max(SCALE_HEADROOM * peak)
}

/// Horizontal distance between consecutive points. A single point gets the
/// full width; it still lands at x = 0.
pub fn x_step(width: f64, count: usize) -> f64 {
    if count > 1 {
        width / (count - 1) as f64
    } else {
        width
    }
}

/// Points for one series in graph coordinates: x spread over `0..=width`
/// left-to-right in sample order, y in Mbps.
pub fn polyline<F>(samples: &SampleRing, width: f64, value: F) -> Vec<(f64, f64)>
where
    F: Fn(&Sample) -> f64,
{
    let step = x_step(width, samples.len());
    samples
        .iter()
        .enumerate()
        .map(|(i, s)| (i as f64 * step, value(s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;

    fn sample(download: f64, upload: f64) -> Sample {
        Sample { download, upload }
    }

    #[test]
    fn ring_caps_at_limit_and_evicts_oldest() {
        let mut ring = SampleRing::new();
        for i in 0..(GRAPH_LIMIT + 1) {
            push_sample(&mut ring, sample(i as f64, 0.0));
        }
        assert_eq!(ring.len(), GRAPH_LIMIT);
        assert_eq!(ring.front().unwrap().download, 1.0);
        assert_eq!(ring.back().unwrap().download, GRAPH_LIMIT as f64);
    }

    #[test]
    fn y_scale_has_floor_and_headroom() {
        let mut ring = SampleRing::new();
        assert_eq!(y_scale(&ring), SCALE_FLOOR_MBPS);

        push_sample(&mut ring, sample(10.0, 4.0));
        assert_eq!(y_scale(&ring), SCALE_FLOOR_MBPS);

        push_sample(&mut ring, sample(100.0, 4.0));
        assert!((y_scale(&ring) - 110.0).abs() < 1e-9);

        // The upload series can set the peak too.
        push_sample(&mut ring, sample(5.0, 200.0));
        assert!((y_scale(&ring) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn x_step_spreads_points_over_width() {
        assert_eq!(x_step(400.0, 5), 100.0);
        assert_eq!(x_step(400.0, 2), 400.0);
        assert_eq!(x_step(400.0, 1), 400.0);
        assert_eq!(x_step(400.0, 0), 400.0);
    }

    #[test]
    fn polyline_orders_points_chronologically() {
        let mut ring = SampleRing::new();
        push_sample(&mut ring, sample(10.0, 1.0));
        push_sample(&mut ring, sample(20.0, 2.0));
        push_sample(&mut ring, sample(30.0, 3.0));

        let download = polyline(&ring, 100.0, |s| s.download);
        assert_eq!(download, vec![(0.0, 10.0), (50.0, 20.0), (100.0, 30.0)]);

        let upload = polyline(&ring, 100.0, |s| s.upload);
        assert_eq!(upload, vec![(0.0, 1.0), (50.0, 2.0), (100.0, 3.0)]);
    }

    #[test]
    fn single_point_sits_at_origin() {
        let mut ring = SampleRing::new();
        push_sample(&mut ring, sample(42.5, 0.0));
        assert_eq!(polyline(&ring, 100.0, |s| s.download), vec![(0.0, 42.5)]);
    }
}

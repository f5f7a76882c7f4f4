//! Synthetic event source for `--demo`: the full session sequence with
//! generated readings, over the same channel contract as the real client.

use crate::model::{
    MeasurementData, MeasurementPayload, MeasurementSource, ServerInfo, ServerLocation, TcpInfo,
    TestEvent,
};
use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

const TICKS_PER_PHASE: usize = 40;
const TICK: Duration = Duration::from_millis(150);

const SITES: &[(&str, &str, &str)] = &[
    ("Frankfurt", "DE", "fra02"),
    ("Amsterdam", "NL", "ams03"),
    ("London", "GB", "lhr05"),
    ("New York", "US", "lga07"),
];

pub(super) async fn run(event_tx: &mpsc::UnboundedSender<TestEvent>) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    let download_base = rng.gen_range(80.0..160.0);
    let upload_base = download_base * rng.gen_range(0.25..0.45);
    let rtt_ms = rng.gen_range(8.0..28.0);

    send(event_tx, TestEvent::ServerDiscovery)?;
    sleep(Duration::from_millis(500)).await;
    send(
        event_tx,
        TestEvent::ServerChosen {
            server: pick_server(&mut rng),
        },
    )?;
    sleep(Duration::from_millis(300)).await;

    send(event_tx, TestEvent::DownloadStart)?;
    stream_phase(event_tx, &mut rng, download_base, rtt_ms, |payload| {
        TestEvent::DownloadMeasurement { payload }
    })
    .await?;
    send(event_tx, TestEvent::DownloadComplete)?;
    sleep(Duration::from_millis(400)).await;

    send(event_tx, TestEvent::UploadStart)?;
    stream_phase(event_tx, &mut rng, upload_base, rtt_ms, |payload| {
        TestEvent::UploadMeasurement { payload }
    })
    .await?;
    send(event_tx, TestEvent::UploadComplete)?;
    Ok(())
}

fn send(event_tx: &mpsc::UnboundedSender<TestEvent>, event: TestEvent) -> Result<()> {
    event_tx
        .send(event)
        .map_err(|_| anyhow!("event channel closed"))
}

/// One phase: a bounded random walk of client throughput ticks, with server
/// telemetry interleaved every fifth tick.
async fn stream_phase<F>(
    event_tx: &mpsc::UnboundedSender<TestEvent>,
    rng: &mut StdRng,
    base: f64,
    rtt_ms: f64,
    make: F,
) -> Result<()>
where
    F: Fn(Option<MeasurementPayload>) -> TestEvent,
{
    let mut mbps = base * rng.gen_range(0.55..0.75);
    let mut acked: f64 = 0.0;
    let mut retrans: f64 = 0.0;

    for tick in 0..TICKS_PER_PHASE {
        sleep(TICK).await;
        mbps = (mbps + rng.gen_range(-6.0..8.0)).clamp(base * 0.5, base * 1.1);
        send(event_tx, make(Some(client_payload(mbps))))?;

        if tick % 5 == 4 {
            acked += mbps / 8.0 * 1e6 * TICK.as_secs_f64() * 5.0;
            if rng.gen_bool(0.3) {
                retrans += rng.gen_range(0.0..acked * 0.001);
            }
            let rtt = (rtt_ms + rng.gen_range(-1.5..2.5)).max(1.0);
            send(
                event_tx,
                make(Some(server_payload(rtt * 1000.0, acked, retrans))),
            )?;
        }
    }
    Ok(())
}

fn client_payload(mbps: f64) -> MeasurementPayload {
    MeasurementPayload {
        source: Some(MeasurementSource::Client),
        data: Some(MeasurementData {
            mean_client_mbps: Some(mbps),
            tcp_info: None,
        }),
    }
}

fn server_payload(min_rtt_us: f64, acked: f64, retrans: f64) -> MeasurementPayload {
    MeasurementPayload {
        source: Some(MeasurementSource::Server),
        data: Some(MeasurementData {
            mean_client_mbps: None,
            tcp_info: Some(TcpInfo {
                min_rtt: Some(min_rtt_us),
                bytes_acked: Some(acked),
                bytes_retrans: Some(retrans),
            }),
        }),
    }
}

fn pick_server(rng: &mut StdRng) -> ServerInfo {
    let (city, country, site) = SITES[rng.gen_range(0..SITES.len())];
    ServerInfo {
        location: Some(ServerLocation {
            city: Some(city.to_string()),
            country: Some(country.to_string()),
        }),
        site: Some(site.to_string()),
    }
}

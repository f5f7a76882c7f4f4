//! Session lifecycle: a state machine that folds engine events into the
//! measurement buffers, recomputes statistics on every accepted sample, and
//! lands finished sessions in the history.

use anyhow::Result;

use crate::chart;
use crate::model::{
    HistoryRecord, MeasurementData, MeasurementPayload, MeasurementSource, Sample, SampleRing,
    SessionStats, TestEvent,
};
use crate::stats;
use crate::storage::Store;

/// Node label shown before discovery reports a real one.
pub const DEFAULT_NODE: &str = "FRA-1";

pub mod status_text {
    pub const IDLE: &str = "Idle";
    pub const READY: &str = "Ready when you are";
    pub const CONSENT_PROMPT: &str = "Accept the policy to run a test";
    pub const CLIENT_MISSING: &str = "ndt7 client missing";
    pub const LOCATING: &str = "Locating node…";
    pub const MEASURING_DOWNLOAD: &str = "Measuring download…";
    pub const PREPARING_UPLOAD: &str = "Preparing upload…";
    pub const MEASURING_UPLOAD: &str = "Measuring upload…";
    pub const FINISHED: &str = "Finished measurements";
    pub const FAILED: &str = "Test failed";
}

/// Per-session sample buffers and latest scalar readings.
#[derive(Debug, Clone)]
pub struct MeasurementState {
    pub running: bool,
    pub download_values: Vec<f64>,
    pub upload_values: Vec<f64>,
    pub ping_values: Vec<f64>,
    pub graph_samples: SampleRing,
    pub last_server_measurement: Option<MeasurementData>,
    pub last_download: f64,
    pub last_upload: f64,
    pub last_ping: f64,
    pub server_label: String,
}

impl Default for MeasurementState {
    fn default() -> Self {
        Self {
            running: false,
            download_values: Vec::new(),
            upload_values: Vec::new(),
            ping_values: Vec::new(),
            graph_samples: SampleRing::new(),
            last_server_measurement: None,
            last_download: 0.0,
            last_upload: 0.0,
            last_ping: 0.0,
            server_label: DEFAULT_NODE.to_string(),
        }
    }
}

impl MeasurementState {
    /// Clear every per-session buffer. The node label is kept until the next
    /// discovery reports one.
    fn reset_for_run(&mut self) {
        self.running = true;
        self.download_values.clear();
        self.upload_values.clear();
        self.ping_values.clear();
        self.graph_samples.clear();
        self.last_server_measurement = None;
        self.last_download = 0.0;
        self.last_upload = 0.0;
        self.last_ping = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Discovering,
    MeasuringDownload,
    MeasuringUpload,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Idle,
    Active,
    Success,
    Error,
}

/// The status chip: a tone plus a fixed label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Guards passed; the caller should launch the engine now.
    Started,
    AlreadyRunning,
    ConsentRequired,
    EngineMissing,
}

enum MeasurementKind {
    Download,
    Upload,
}

/// Everything the presentation layer needs for one draw.
pub struct Snapshot<'a> {
    pub phase: SessionPhase,
    pub status: StatusLine,
    pub stats: SessionStats,
    pub state: &'a MeasurementState,
    pub last_error: Option<&'a str>,
    pub consent: bool,
}

/// Owns the measurement session: start guards, the event reactor, and the
/// history write at completion.
pub struct SessionController {
    pub state: MeasurementState,
    phase: SessionPhase,
    status: StatusLine,
    stats: SessionStats,
    consent: bool,
    last_error: Option<String>,
    store: Store,
}

impl SessionController {
    pub fn new(store: Store) -> Self {
        let consent = store.consent();
        Self {
            state: MeasurementState::default(),
            phase: SessionPhase::Idle,
            status: StatusLine {
                kind: StatusKind::Idle,
                label: status_text::IDLE,
            },
            stats: SessionStats::default(),
            consent,
            last_error: None,
            store,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn status(&self) -> StatusLine {
        self.status
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn consent(&self) -> bool {
        self.consent
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// True once any measurement has been accepted this session; the UI shows
    /// placeholder badges until then.
    pub fn has_samples(&self) -> bool {
        !self.state.download_values.is_empty()
            || !self.state.upload_values.is_empty()
            || !self.state.ping_values.is_empty()
            || self.state.last_server_measurement.is_some()
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            phase: self.phase,
            status: self.status,
            stats: self.stats,
            state: &self.state,
            last_error: self.last_error.as_deref(),
            consent: self.consent,
        }
    }

    /// Record the consent decision and persist it. Granting consent clears a
    /// pending prompt; revoking never interrupts a running session.
    pub fn set_consent(&mut self, granted: bool) -> Result<()> {
        self.consent = granted;
        if granted && self.status.label == status_text::CONSENT_PROMPT {
            self.status = StatusLine {
                kind: StatusKind::Idle,
                label: status_text::READY,
            };
        }
        self.store.set_consent(granted)
    }

    /// Apply the start guards in order: running, consent, engine presence.
    /// Only `Started` transitions out of the rest state.
    pub fn request_start(&mut self, engine_ready: bool) -> StartOutcome {
        if self.state.running {
            return StartOutcome::AlreadyRunning;
        }
        if !self.consent {
            self.phase = SessionPhase::Idle;
            self.status = StatusLine {
                kind: StatusKind::Idle,
                label: status_text::CONSENT_PROMPT,
            };
            return StartOutcome::ConsentRequired;
        }
        if !engine_ready {
            self.phase = SessionPhase::Idle;
            self.status = StatusLine {
                kind: StatusKind::Error,
                label: status_text::CLIENT_MISSING,
            };
            return StartOutcome::EngineMissing;
        }
        self.begin();
        StartOutcome::Started
    }

    fn begin(&mut self) {
        self.state.reset_for_run();
        self.stats = SessionStats::default();
        self.last_error = None;
        self.phase = SessionPhase::Discovering;
        self.status = StatusLine {
            kind: StatusKind::Active,
            label: status_text::LOCATING,
        };
    }

    /// Fold one engine event into the session. Events outside a running
    /// session carry no meaning and are dropped.
    pub fn handle_event(&mut self, event: TestEvent) {
        if !self.state.running {
            return;
        }
        match event {
            TestEvent::Error { message } => self.fail(message),
            TestEvent::ServerDiscovery => {
                self.status = StatusLine {
                    kind: StatusKind::Active,
                    label: status_text::LOCATING,
                };
            }
            TestEvent::ServerChosen { server } => {
                self.state.server_label = server.node_label();
            }
            TestEvent::DownloadStart => {
                self.phase = SessionPhase::MeasuringDownload;
                self.status = StatusLine {
                    kind: StatusKind::Active,
                    label: status_text::MEASURING_DOWNLOAD,
                };
            }
            TestEvent::DownloadMeasurement { payload } => {
                self.handle_measurement(MeasurementKind::Download, payload);
            }
            TestEvent::DownloadComplete => {
                self.status = StatusLine {
                    kind: StatusKind::Active,
                    label: status_text::PREPARING_UPLOAD,
                };
            }
            TestEvent::UploadStart => {
                self.phase = SessionPhase::MeasuringUpload;
                self.status = StatusLine {
                    kind: StatusKind::Active,
                    label: status_text::MEASURING_UPLOAD,
                };
            }
            TestEvent::UploadMeasurement { payload } => {
                self.handle_measurement(MeasurementKind::Upload, payload);
            }
            TestEvent::UploadComplete => self.finalize(),
        }
    }

    fn handle_measurement(&mut self, kind: MeasurementKind, payload: Option<MeasurementPayload>) {
        let Some(payload) = payload else { return };
        let Some(data) = payload.data else { return };
        match payload.source {
            Some(MeasurementSource::Client) => {
                let Some(mbps) = data.mean_client_mbps.filter(|v| v.is_finite()) else {
                    return;
                };
                match kind {
                    MeasurementKind::Download => {
                        self.state.last_download = mbps;
                        self.state.download_values.push(mbps);
                    }
                    MeasurementKind::Upload => {
                        self.state.last_upload = mbps;
                        self.state.upload_values.push(mbps);
                    }
                }
                // The non-updated series contributes its latest known value.
                chart::push_sample(
                    &mut self.state.graph_samples,
                    Sample {
                        download: self.state.last_download,
                        upload: self.state.last_upload,
                    },
                );
                self.stats = stats::compute_stats(&self.state);
            }
            Some(MeasurementSource::Server) => {
                let rtt_us = data
                    .tcp_info
                    .as_ref()
                    .and_then(|tcp| tcp.min_rtt)
                    .filter(|v| v.is_finite());
                if let Some(rtt_us) = rtt_us {
                    let ping_ms = rtt_us / 1000.0;
                    self.state.last_ping = ping_ms;
                    self.state.ping_values.push(ping_ms);
                }
                self.state.last_server_measurement = Some(data);
                self.stats = stats::compute_stats(&self.state);
            }
            None => {}
        }
    }

    fn finalize(&mut self) {
        self.stats = stats::compute_stats(&self.state);
        let record = HistoryRecord {
            timestamp: unix_ms_now(),
            node: self.state.server_label.clone(),
            download_avg: self.stats.avg_download,
            upload_avg: self.stats.avg_upload,
            ping_avg: self.stats.avg_ping,
            jitter: self.stats.jitter,
            packet_loss: self.stats.packet_loss,
        };
        self.store.push_history(record).ok();
        self.state.running = false;
        self.phase = SessionPhase::Success;
        self.status = StatusLine {
            kind: StatusKind::Success,
            label: status_text::FINISHED,
        };
    }

    fn fail(&mut self, message: String) {
        self.state.running = false;
        self.phase = SessionPhase::Error;
        self.status = StatusLine {
            kind: StatusKind::Error,
            label: status_text::FAILED,
        };
        self.last_error = Some(message);
    }
}

fn unix_ms_now() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ServerInfo, ServerLocation, TcpInfo};

    fn controller(consent: bool) -> SessionController {
        let mut store = Store::in_memory();
        store.set_consent(consent).unwrap();
        SessionController::new(store)
    }

    fn client_payload(mbps: f64) -> Option<MeasurementPayload> {
        Some(MeasurementPayload {
            source: Some(MeasurementSource::Client),
            data: Some(MeasurementData {
                mean_client_mbps: Some(mbps),
                tcp_info: None,
            }),
        })
    }

    fn server_payload(min_rtt: Option<f64>, acked: Option<f64>, retrans: Option<f64>) -> Option<MeasurementPayload> {
        Some(MeasurementPayload {
            source: Some(MeasurementSource::Server),
            data: Some(MeasurementData {
                mean_client_mbps: None,
                tcp_info: Some(TcpInfo {
                    min_rtt,
                    bytes_acked: acked,
                    bytes_retrans: retrans,
                }),
            }),
        })
    }

    fn frankfurt() -> ServerInfo {
        ServerInfo {
            location: Some(ServerLocation {
                city: Some("Frankfurt".to_string()),
                country: Some("DE".to_string()),
            }),
            site: None,
        }
    }

    #[test]
    fn start_without_consent_stays_idle() {
        let mut session = controller(false);
        assert_eq!(session.request_start(true), StartOutcome::ConsentRequired);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(!session.state.running);
        assert_eq!(session.status().label, status_text::CONSENT_PROMPT);

        // Events without a running session leave every buffer untouched.
        session.handle_event(TestEvent::DownloadMeasurement {
            payload: client_payload(42.5),
        });
        assert!(session.state.download_values.is_empty());
        assert!(session.state.graph_samples.is_empty());
        assert!(session.store().load_history().is_empty());
    }

    #[test]
    fn start_without_engine_stays_idle_with_error_status() {
        let mut session = controller(true);
        assert_eq!(session.request_start(false), StartOutcome::EngineMissing);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(!session.state.running);
        assert_eq!(session.status().kind, StatusKind::Error);
        assert_eq!(session.status().label, status_text::CLIENT_MISSING);
    }

    #[test]
    fn start_while_running_is_a_no_op() {
        let mut session = controller(true);
        assert_eq!(session.request_start(true), StartOutcome::Started);
        session.handle_event(TestEvent::DownloadStart);
        session.handle_event(TestEvent::DownloadMeasurement {
            payload: client_payload(10.0),
        });

        assert_eq!(session.request_start(true), StartOutcome::AlreadyRunning);
        assert_eq!(session.state.download_values, vec![10.0]);
        assert_eq!(session.phase(), SessionPhase::MeasuringDownload);
    }

    #[test]
    fn full_session_walkthrough() {
        let mut session = controller(true);
        assert_eq!(session.request_start(true), StartOutcome::Started);
        assert_eq!(session.phase(), SessionPhase::Discovering);
        assert_eq!(session.status().label, status_text::LOCATING);
        assert!(!session.has_samples());

        session.handle_event(TestEvent::ServerDiscovery);
        session.handle_event(TestEvent::ServerChosen { server: frankfurt() });
        assert_eq!(session.state.server_label, "Frankfurt, DE");

        session.handle_event(TestEvent::DownloadStart);
        assert_eq!(session.phase(), SessionPhase::MeasuringDownload);
        assert_eq!(session.status().label, status_text::MEASURING_DOWNLOAD);

        session.handle_event(TestEvent::DownloadMeasurement {
            payload: client_payload(42.5),
        });
        assert_eq!(session.state.last_download, 42.5);
        assert_eq!(session.state.graph_samples.len(), 1);
        assert_eq!(
            *session.state.graph_samples.back().unwrap(),
            Sample {
                download: 42.5,
                upload: 0.0
            }
        );
        assert!(session.has_samples());
        assert_eq!(session.stats().avg_download, 42.5);

        // Ping arrives as server telemetry during the download phase.
        session.handle_event(TestEvent::DownloadMeasurement {
            payload: server_payload(Some(15_000.0), None, None),
        });
        assert_eq!(session.state.ping_values, vec![15.0]);
        assert_eq!(session.stats().avg_ping, 15.0);

        session.handle_event(TestEvent::DownloadComplete);
        assert_eq!(session.status().label, status_text::PREPARING_UPLOAD);
        assert_eq!(session.phase(), SessionPhase::MeasuringDownload);

        session.handle_event(TestEvent::UploadStart);
        assert_eq!(session.phase(), SessionPhase::MeasuringUpload);

        session.handle_event(TestEvent::UploadMeasurement {
            payload: client_payload(30.0),
        });
        assert_eq!(
            *session.state.graph_samples.back().unwrap(),
            Sample {
                download: 42.5,
                upload: 30.0
            }
        );

        session.handle_event(TestEvent::UploadComplete);
        assert_eq!(session.phase(), SessionPhase::Success);
        assert_eq!(session.status().label, status_text::FINISHED);
        assert!(!session.state.running);

        let history = session.store().load_history();
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record.node, "Frankfurt, DE");
        assert_eq!(record.download_avg, 42.5);
        assert_eq!(record.upload_avg, 30.0);
        assert_eq!(record.ping_avg, 15.0);
        assert_eq!(record.jitter, 0.0);
        assert_eq!(record.packet_loss, 0.0);
        assert!(record.timestamp > 0);
    }

    #[test]
    fn malformed_payloads_are_dropped_silently() {
        let mut session = controller(true);
        session.request_start(true);
        session.handle_event(TestEvent::DownloadStart);

        session.handle_event(TestEvent::DownloadMeasurement { payload: None });
        session.handle_event(TestEvent::DownloadMeasurement {
            payload: Some(MeasurementPayload {
                source: Some(MeasurementSource::Client),
                data: None,
            }),
        });
        session.handle_event(TestEvent::DownloadMeasurement {
            payload: Some(MeasurementPayload {
                source: None,
                data: Some(MeasurementData::default()),
            }),
        });
        session.handle_event(TestEvent::DownloadMeasurement {
            payload: client_payload(f64::NAN),
        });

        assert!(session.state.download_values.is_empty());
        assert!(session.state.graph_samples.is_empty());
        assert!(session.state.running);
        assert_eq!(session.phase(), SessionPhase::MeasuringDownload);
    }

    #[test]
    fn server_telemetry_without_rtt_still_updates_loss_source() {
        let mut session = controller(true);
        session.request_start(true);
        session.handle_event(TestEvent::UploadStart);
        session.handle_event(TestEvent::UploadMeasurement {
            payload: server_payload(None, Some(1000.0), Some(15.0)),
        });

        assert!(session.state.ping_values.is_empty());
        assert!(session.state.last_server_measurement.is_some());
        assert_eq!(session.stats().packet_loss, 1.5);
    }

    #[test]
    fn engine_error_aborts_without_history() {
        let mut session = controller(true);
        session.request_start(true);
        session.handle_event(TestEvent::DownloadStart);
        session.handle_event(TestEvent::DownloadMeasurement {
            payload: client_payload(88.0),
        });
        session.handle_event(TestEvent::Error {
            message: "socket closed".to_string(),
        });

        assert_eq!(session.phase(), SessionPhase::Error);
        assert_eq!(session.status().label, status_text::FAILED);
        assert!(!session.state.running);
        assert_eq!(session.last_error(), Some("socket closed"));
        assert!(session.store().load_history().is_empty());

        // Late events after the failure are ignored.
        session.handle_event(TestEvent::UploadComplete);
        assert_eq!(session.phase(), SessionPhase::Error);
        assert!(session.store().load_history().is_empty());
    }

    #[test]
    fn restart_clears_buffers_but_keeps_node_label() {
        let mut session = controller(true);
        session.request_start(true);
        session.handle_event(TestEvent::ServerChosen { server: frankfurt() });
        session.handle_event(TestEvent::DownloadStart);
        session.handle_event(TestEvent::DownloadMeasurement {
            payload: client_payload(50.0),
        });
        session.handle_event(TestEvent::UploadComplete);
        assert_eq!(session.phase(), SessionPhase::Success);

        assert_eq!(session.request_start(true), StartOutcome::Started);
        assert_eq!(session.phase(), SessionPhase::Discovering);
        assert!(session.state.download_values.is_empty());
        assert!(session.state.graph_samples.is_empty());
        assert_eq!(session.state.last_download, 0.0);
        assert_eq!(session.state.server_label, "Frankfurt, DE");
        assert!(!session.has_samples());
    }

    #[test]
    fn graph_points_reuse_latest_scalar_of_other_series() {
        let mut session = controller(true);
        session.request_start(true);
        session.handle_event(TestEvent::DownloadStart);
        session.handle_event(TestEvent::DownloadMeasurement {
            payload: client_payload(10.0),
        });
        session.handle_event(TestEvent::UploadStart);
        session.handle_event(TestEvent::UploadMeasurement {
            payload: client_payload(20.0),
        });
        session.handle_event(TestEvent::UploadMeasurement {
            payload: client_payload(22.0),
        });

        let points: Vec<Sample> = session.state.graph_samples.iter().copied().collect();
        assert_eq!(
            points,
            vec![
                Sample {
                    download: 10.0,
                    upload: 0.0
                },
                Sample {
                    download: 10.0,
                    upload: 20.0
                },
                Sample {
                    download: 10.0,
                    upload: 22.0
                },
            ]
        );
    }

    #[test]
    fn consent_grant_clears_prompt_and_persists() {
        let mut session = controller(false);
        session.request_start(true);
        assert_eq!(session.status().label, status_text::CONSENT_PROMPT);

        session.set_consent(true).unwrap();
        assert!(session.consent());
        assert!(session.store().consent());
        assert_eq!(session.status().label, status_text::READY);
        assert_eq!(session.request_start(true), StartOutcome::Started);
    }
}

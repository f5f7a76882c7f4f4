use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Settings handed to the external ndt7 client for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub user_accepted_data_policy: bool,
    pub client_name: String,
    pub client_version: String,
    pub download_worker: String,
    pub upload_worker: String,
    pub client_path: String,
    pub demo: bool,
}

/// Events delivered by the measurement engine, one JSON line per event.
/// The tag values mirror the ndt7 client callback names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TestEvent {
    Error {
        #[serde(default)]
        message: String,
    },
    ServerDiscovery,
    ServerChosen {
        server: ServerInfo,
    },
    DownloadStart,
    DownloadMeasurement {
        #[serde(default)]
        payload: Option<MeasurementPayload>,
    },
    DownloadComplete,
    UploadStart,
    UploadMeasurement {
        #[serde(default)]
        payload: Option<MeasurementPayload>,
    },
    UploadComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementSource {
    Client,
    Server,
}

/// One measurement callback payload as emitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementPayload {
    #[serde(rename = "Source", default)]
    pub source: Option<MeasurementSource>,
    #[serde(rename = "Data", default)]
    pub data: Option<MeasurementData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementData {
    #[serde(rename = "MeanClientMbps", default)]
    pub mean_client_mbps: Option<f64>,
    #[serde(rename = "TCPInfo", default)]
    pub tcp_info: Option<TcpInfo>,
}

/// Server-side TCP counters. MinRTT is in microseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TcpInfo {
    #[serde(rename = "MinRTT", default)]
    pub min_rtt: Option<f64>,
    #[serde(rename = "BytesAcked", default)]
    pub bytes_acked: Option<f64>,
    #[serde(rename = "BytesRetrans", default)]
    pub bytes_retrans: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub location: Option<ServerLocation>,
    #[serde(default)]
    pub site: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl ServerInfo {
    /// Human-readable node label: "City, Country" when known, else the site
    /// code, else the bare network name.
    pub fn node_label(&self) -> String {
        if let Some(city) = self.location.as_ref().and_then(|loc| loc.city.as_deref()) {
            let country = self.location.as_ref().and_then(|loc| loc.country.as_deref());
            return match country {
                Some(country) => format!("{}, {}", city, country),
                None => city.to_string(),
            };
        }
        match &self.site {
            Some(site) => site.clone(),
            None => "M-Lab".to_string(),
        }
    }
}

/// One graph point: the latest known download/upload pair at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub download: f64,
    pub upload: f64,
}

pub type SampleRing = VecDeque<Sample>;

/// Aggregates derived from the current sample buffers. Recomputed on every
/// accepted measurement, never stored.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub peak_download: f64,
    pub peak_upload: f64,
    pub avg_download: f64,
    pub avg_upload: f64,
    pub avg_ping: f64,
    pub jitter: f64,
    pub consistency: u8,
    pub packet_loss: f64,
}

/// One finished session, as persisted. Field names match the stored JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    pub node: String,
    pub download_avg: f64,
    pub upload_avg: f64,
    pub ping_avg: f64,
    pub jitter: f64,
    pub packet_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_key(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn from_key(key: &str) -> Self {
        match key {
            "light" => Theme::Light,
            _ => Theme::Dark,
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

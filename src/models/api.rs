use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response for `GET /api/version`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
}

/// Response for `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthResponse {
    /// Always "healthy" while the server answers
    pub status: String,
    /// Application version
    pub version: String,
    /// Implementation language and compiler target
    pub prog_lang: String,
    /// Host name of the machine
    pub host_name: String,
    /// Operating system family
    pub operating_system: String,
    /// When the snapshot was taken
    pub time: DateTime<Utc>,
    /// Seconds since the current run started
    pub uptime_seconds: u64,
    /// Run number, incremented on every restart
    pub generation: u64,
    /// Open client connections
    pub connections: usize,
}

/// Kind of metric carried in a monitoring entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// Value of a monitoring entry: absent, numeric or text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    #[default]
    Absent,
    Number(serde_json::Number),
    Text(String),
}

impl MetricValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, MetricValue::Absent)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Number(value.into())
    }
}

impl From<f64> for MetricValue {
    /// Non-finite values have no JSON representation and become `Absent`.
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value).map_or(MetricValue::Absent, MetricValue::Number)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// One entry of `GET /api/monitoring`.
///
/// Field names are capitalized to match the monitoring collector's format.
/// `Value` and `Metric` are omitted when absent, which tells the collector
/// not to record a statistic for the entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoringEntry {
    pub service: String,
    pub host: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "MetricValue::is_absent")]
    pub value: MetricValue,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricKind>,
}

impl MonitoringEntry {
    /// An informational entry without a statistic.
    pub fn info(service: &str, host: &str, description: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            host: host.to_string(),
            state: "OK".to_string(),
            value: MetricValue::Absent,
            description: description.into(),
            metric: None,
        }
    }

    /// An entry carrying a statistic.
    pub fn metric(
        service: &str,
        host: &str,
        kind: MetricKind,
        value: impl Into<MetricValue>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            metric: Some(kind),
            ..Self::info(service, host, description)
        }
    }
}

mod api;

pub use api::{
    HealthResponse, MetricKind, MetricValue, MonitoringEntry, VersionResponse,
};

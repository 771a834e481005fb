// ── Alarm domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How urgent an alarm is. Ordered so that `Critical` is the greatest.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Workflow state of an alarm.
///
/// `Historical` marks records that arrived through the bulk history fetch
/// without a backend status of their own.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AlarmStatus {
    Active,
    Acknowledged,
    Resolved,
    Historical,
}

impl AlarmStatus {
    /// Whether an operator still has to act on the alarm.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Historical)
    }
}

/// Which surface produced the alarm record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlarmSource {
    Api,
    LocalSse,
    GlobalSse,
    BackupPolling,
    Manager,
}

/// Ingestion channel a raw record arrived on.
///
/// Determines the alarm's [`AlarmSource`], whether it counts as live,
/// and the fallback severity/status used by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    /// Bulk `GET /alarms/historical` load.
    Historical,
    /// Fleet-wide event stream.
    GlobalStream,
    /// Event stream scoped to one device.
    LocalStream,
    /// Fallback poll while the stream is down.
    Polling,
    /// Injected by an operator or another service.
    Manual,
}

impl Channel {
    pub fn source(self) -> AlarmSource {
        match self {
            Self::Historical => AlarmSource::Api,
            Self::GlobalStream => AlarmSource::GlobalSse,
            Self::LocalStream => AlarmSource::LocalSse,
            Self::Polling => AlarmSource::BackupPolling,
            Self::Manual => AlarmSource::Manager,
        }
    }

    /// Everything except the bulk history fetch is live.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Historical)
    }
}

/// GPS position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Vehicle telemetry attached to an alarm.
///
/// Boolean flags are tri-state: `None` means the record did not report
/// the flag at all, which renders as "N/A" rather than "No".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmMetrics {
    pub speed: Option<f64>,
    pub acceleration: Option<f64>,
    pub drowsiness: Option<bool>,
    pub rash_driving: Option<bool>,
    pub collision: Option<bool>,
}

/// Canonical alarm, as held in the reconciled set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: String,
    pub device_id: Option<String>,
    pub alarm_type: String,
    pub description: String,
    pub severity: Severity,
    pub status: AlarmStatus,
    pub is_live: bool,
    pub occurred_at: DateTime<Utc>,
    pub location: Option<Location>,
    pub preview_url: Option<String>,
    pub download_url: Option<String>,
    pub metrics: AlarmMetrics,
    pub source: AlarmSource,
}

impl Alarm {
    /// Critical and still waiting for an operator.
    pub fn is_unacknowledged_critical(&self) -> bool {
        self.severity == Severity::Critical && self.status.is_open()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn severity_orders_critical_highest() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn enums_round_trip_through_strings() {
        assert_eq!(Severity::from_str("CRITICAL").unwrap(), Severity::Critical);
        assert_eq!(AlarmStatus::Acknowledged.to_string(), "acknowledged");
        assert_eq!(AlarmSource::BackupPolling.to_string(), "backup_polling");
        assert_eq!(Channel::GlobalStream.to_string(), "global_stream");
    }

    #[test]
    fn only_history_is_not_live() {
        assert!(!Channel::Historical.is_live());
        assert!(Channel::Polling.is_live());
        assert_eq!(Channel::LocalStream.source(), AlarmSource::LocalSse);
    }

    #[test]
    fn alarm_serializes_camel_case() {
        let alarm = Alarm {
            id: "A1".into(),
            device_id: None,
            alarm_type: "Collision".into(),
            description: "No description".into(),
            severity: Severity::Critical,
            status: AlarmStatus::Active,
            is_live: true,
            occurred_at: DateTime::from_timestamp(0, 0).unwrap(),
            location: None,
            preview_url: None,
            download_url: None,
            metrics: AlarmMetrics::default(),
            source: AlarmSource::GlobalSse,
        };
        let json = serde_json::to_value(&alarm).unwrap();
        assert_eq!(json["isLive"], true);
        assert_eq!(json["source"], "global_sse");
        assert!(json["metrics"]["rashDriving"].is_null());
    }
}

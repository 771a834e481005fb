// Wire types for the alarm backend.
//
// Alarm records are kept as raw JSON: the backend is inconsistent about
// field names across endpoints, and canonicalization belongs to
// `fleetalarm-core`. Only the envelopes around them are typed here.

use serde::Deserialize;

/// A single alarm record exactly as the backend sent it.
pub type RawRecord = serde_json::Value;

/// Candidate identifier fields, in priority order.
///
/// Shared by the stream's connection-local de-dup pass and the core
/// normalizer so both agree on what "the same alarm" means.
pub const ID_FIELDS: &[&str] = &["alarmId", "alarm_id", "id", "alertId", "alert_id"];

/// Extract the backend identifier of a raw record, if it carries one.
///
/// Numeric ids are stringified; empty strings count as absent.
pub fn record_id(raw: &RawRecord) -> Option<String> {
    ID_FIELDS.iter().find_map(|field| match raw.get(*field)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Response of `GET /alarms/historical`.
///
/// Some deployments return a bare array, others wrap it in an object
/// under `data`, `alarms`, `content` or `items`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum HistoryPage {
    Bare(Vec<RawRecord>),
    Wrapped {
        #[serde(alias = "alarms", alias = "content", alias = "items")]
        data: Vec<RawRecord>,
    },
}

impl HistoryPage {
    pub(crate) fn into_records(self) -> Vec<RawRecord> {
        match self {
            Self::Bare(records) | Self::Wrapped { data: records } => records,
        }
    }
}

/// Response of the acknowledge / resolve endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct MutationResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Status mutations the backend accepts for a single alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmAction {
    Acknowledge,
    Resolve,
}

impl AlarmAction {
    /// Trailing path segment: `POST /alarms/{id}/{segment}`.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Acknowledge => "acknowledge",
            Self::Resolve => "resolve",
        }
    }
}

impl std::fmt::Display for AlarmAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path_segment())
    }
}

// ── Raw record → canonical Alarm ──
//
// The backend is inconsistent about field names across endpoints and
// firmware versions. Each logical field has an ordered list of candidate
// keys, tried in priority order. Normalization is total: every missing or
// malformed field degrades to a default, never to an error.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{Alarm, AlarmMetrics, AlarmStatus, Channel, Location, Severity};

// ── Field table ──────────────────────────────────────────────────────

const DEVICE_FIELDS: &[&str] = &["deviceId", "device_id", "vehicleId", "vehicle_id", "imei"];
const TYPE_FIELDS: &[&str] = &["alarmType", "alarm_type", "type", "eventType", "event_type"];
const DESCRIPTION_FIELDS: &[&str] = &["description", "message", "details", "alarmDescription"];
const SEVERITY_FIELDS: &[&str] = &["severity", "level", "priority"];
const STATUS_FIELDS: &[&str] = &["status", "state", "alarmStatus"];
const TIME_FIELDS: &[&str] = &[
    "alarmTime",
    "alarm_time",
    "timestamp",
    "createdAt",
    "created_at",
    "eventTime",
];
const LOCATION_OBJECTS: &[&str] = &["location", "gps", "position"];
const LAT_FIELDS: &[&str] = &["lat", "latitude"];
const LON_FIELDS: &[&str] = &["lon", "lng", "longitude"];
const PREVIEW_FIELDS: &[&str] = &["previewUrl", "preview_url", "imageUrl", "thumbnailUrl"];
const DOWNLOAD_FIELDS: &[&str] = &["downloadUrl", "download_url", "videoUrl", "fileUrl"];
const SPEED_FIELDS: &[&str] = &["speed", "vehicleSpeed"];
const ACCELERATION_FIELDS: &[&str] = &["acceleration", "accel", "gForce"];
const DROWSINESS_FIELDS: &[&str] = &["drowsiness", "isDrowsy"];
const RASH_DRIVING_FIELDS: &[&str] = &["rashDriving", "rash_driving"];
const COLLISION_FIELDS: &[&str] = &["collision", "isCollision"];

const DEFAULT_ALARM_TYPE: &str = "Unknown";
const DEFAULT_DESCRIPTION: &str = "No description";

/// Epoch values above this are milliseconds, below are seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Keyword → severity for records without an explicit severity.
/// Checked in order; the first match wins.
const SEVERITY_KEYWORDS: &[(&str, Severity)] = &[
    ("collision", Severity::Critical),
    ("crash", Severity::Critical),
    ("sos", Severity::Critical),
    ("fire", Severity::Critical),
    ("drowsiness", Severity::High),
    ("fatigue", Severity::High),
    ("rash", Severity::High),
    ("overspeed", Severity::High),
    ("harsh", Severity::High),
    ("distraction", Severity::Medium),
    ("phone", Severity::Medium),
    ("smoking", Severity::Medium),
    ("seatbelt", Severity::Medium),
    ("lane", Severity::Medium),
];

// ── Public entry points ──────────────────────────────────────────────

/// Normalize a raw backend record received on `channel`.
pub fn normalize(raw: &Value, channel: Channel) -> Alarm {
    normalize_at(raw, channel, Utc::now())
}

/// Like [`normalize`], with an explicit "now" for records without a time.
pub fn normalize_at(raw: &Value, channel: Channel, now: DateTime<Utc>) -> Alarm {
    let empty = Map::new();
    let record = raw.as_object().unwrap_or(&empty);

    let device_id = first(record, DEVICE_FIELDS).and_then(as_text);
    let alarm_type = first(record, TYPE_FIELDS)
        .and_then(as_text)
        .unwrap_or_else(|| DEFAULT_ALARM_TYPE.to_owned());
    let description = first(record, DESCRIPTION_FIELDS)
        .and_then(as_text)
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_owned());

    let reported_at = first(record, TIME_FIELDS).and_then(as_timestamp);
    let occurred_at = reported_at.unwrap_or(now);

    let id = fleetalarm_api::models::record_id(raw).unwrap_or_else(|| {
        synthesize_id(reported_at, now, device_id.as_deref(), &alarm_type)
    });

    let severity = first(record, SEVERITY_FIELDS)
        .and_then(as_text)
        .and_then(|s| parse_severity(&s))
        .or_else(|| infer_severity(&alarm_type))
        .unwrap_or(if channel.is_live() {
            Severity::Medium
        } else {
            Severity::Low
        });

    let status = first(record, STATUS_FIELDS)
        .and_then(as_text)
        .and_then(|s| parse_status(&s))
        .unwrap_or(if channel.is_live() {
            AlarmStatus::Active
        } else {
            AlarmStatus::Historical
        });

    Alarm {
        id,
        device_id,
        alarm_type,
        description,
        severity,
        status,
        is_live: channel.is_live(),
        occurred_at,
        location: location(record),
        preview_url: first(record, PREVIEW_FIELDS).and_then(as_text),
        download_url: first(record, DOWNLOAD_FIELDS).and_then(as_text),
        metrics: AlarmMetrics {
            speed: first(record, SPEED_FIELDS).and_then(as_number),
            acceleration: first(record, ACCELERATION_FIELDS).and_then(as_number),
            drowsiness: first(record, DROWSINESS_FIELDS).map(as_flag),
            rash_driving: first(record, RASH_DRIVING_FIELDS).map(as_flag),
            collision: first(record, COLLISION_FIELDS).map(as_flag),
        },
        source: channel.source(),
    }
}

// ── Vocabulary ───────────────────────────────────────────────────────

/// Case-insensitive severity, including the aliases some firmwares send.
pub fn parse_severity(raw: &str) -> Option<Severity> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "critical" | "fatal" | "emergency" => Some(Severity::Critical),
        "high" | "severe" | "major" => Some(Severity::High),
        "medium" | "warning" | "warn" | "moderate" => Some(Severity::Medium),
        "low" | "info" | "minor" => Some(Severity::Low),
        _ => None,
    }
}

/// Case-insensitive status with aliases.
pub fn parse_status(raw: &str) -> Option<AlarmStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "active" | "open" | "new" => Some(AlarmStatus::Active),
        "acknowledged" | "ack" | "acked" => Some(AlarmStatus::Acknowledged),
        "resolved" | "closed" => Some(AlarmStatus::Resolved),
        "historical" => Some(AlarmStatus::Historical),
        _ => None,
    }
}

/// Severity implied by the alarm type, if any keyword matches.
pub fn infer_severity(alarm_type: &str) -> Option<Severity> {
    let lowered = alarm_type.to_ascii_lowercase();
    SEVERITY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, severity)| *severity)
}

// ── Field access ─────────────────────────────────────────────────────

/// First candidate field that is present and not JSON `null`.
fn first<'a>(record: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .find_map(|field| record.get(*field).filter(|v| !v.is_null()))
}

/// Non-empty trimmed string; numbers and booleans are stringified.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Finite float from a JSON number or numeric string.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// `true`, `"true"`, `1` and `"1"` are true; anything else present is false.
fn as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// RFC 3339, naive `YYYY-MM-DD HH:MM:SS` (UTC), or epoch seconds/millis.
fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            s.parse::<f64>().ok().and_then(from_epoch)
        }
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let millis = if raw >= EPOCH_MILLIS_THRESHOLD {
        raw
    } else {
        raw * 1000.0
    };
    DateTime::from_timestamp_millis(millis as i64)
}

/// Nested `location {lat, lon}` (or `gps`/`position`), else flat fields.
fn location(record: &Map<String, Value>) -> Option<Location> {
    let nested = LOCATION_OBJECTS
        .iter()
        .find_map(|field| record.get(*field).and_then(Value::as_object));

    let from = |map: &Map<String, Value>| {
        let lat = first(map, LAT_FIELDS).and_then(as_number)?;
        let lon = first(map, LON_FIELDS).and_then(as_number)?;
        Some(Location { lat, lon })
    };

    nested.and_then(from).or_else(|| from(record))
}

/// Fallback id for records that carry no backend identifier.
///
/// Deterministic when the record reports its own time, so the same alarm
/// seen on two channels still collapses to one entry. Without a time the
/// id must be unique per call, which defeats cross-channel de-dup.
fn synthesize_id(
    reported_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    device_id: Option<&str>,
    alarm_type: &str,
) -> String {
    if let Some(at) = reported_at {
        return format!(
            "alarm_{}_{}_{}",
            at.timestamp_millis(),
            device_id.unwrap_or("none"),
            alarm_type
        );
    }

    let id = format!("alarm_{}_{}", now.timestamp_millis(), uuid::Uuid::new_v4().simple());
    debug!(alarm_id = %id, "record has neither id nor time, synthesized a random id");
    id
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::AlarmSource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn stream_record_scenario() {
        let raw = json!({
            "alarmId": "A1",
            "timestamp": "2024-01-01T00:00:00Z",
            "severity": "critical",
            "speed": "55.5",
        });
        let alarm = normalize_at(&raw, Channel::GlobalStream, now());

        assert_eq!(alarm.id, "A1");
        assert_eq!(alarm.severity, Severity::Critical);
        assert_eq!(alarm.metrics.speed, Some(55.5));
        assert_eq!(alarm.status, AlarmStatus::Active);
        assert!(alarm.is_live);
        assert_eq!(alarm.source, AlarmSource::GlobalSse);
        assert_eq!(alarm.occurred_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn empty_record_degrades_to_defaults() {
        let alarm = normalize_at(&json!({}), Channel::Historical, now());

        assert!(alarm.id.starts_with("alarm_"));
        assert_eq!(alarm.device_id, None);
        assert_eq!(alarm.alarm_type, "Unknown");
        assert_eq!(alarm.description, "No description");
        assert_eq!(alarm.severity, Severity::Low);
        assert_eq!(alarm.status, AlarmStatus::Historical);
        assert!(!alarm.is_live);
        assert_eq!(alarm.occurred_at, now());
        assert_eq!(alarm.location, None);
        assert_eq!(alarm.metrics, AlarmMetrics::default());
    }

    #[test]
    fn non_object_input_is_tolerated() {
        let alarm = normalize_at(&json!("garbage"), Channel::Polling, now());
        assert_eq!(alarm.alarm_type, "Unknown");
        assert_eq!(alarm.severity, Severity::Medium);
        assert_eq!(alarm.source, AlarmSource::BackupPolling);
    }

    #[test]
    fn flags_are_tri_state() {
        let absent = normalize_at(&json!({ "id": "x" }), Channel::Polling, now());
        assert_eq!(absent.metrics.drowsiness, None);

        let null = normalize_at(&json!({ "id": "x", "drowsiness": null }), Channel::Polling, now());
        assert_eq!(null.metrics.drowsiness, None);

        let f = normalize_at(&json!({ "id": "x", "drowsiness": false }), Channel::Polling, now());
        assert_eq!(f.metrics.drowsiness, Some(false));

        let t = normalize_at(&json!({ "id": "x", "drowsiness": true }), Channel::Polling, now());
        assert_eq!(t.metrics.drowsiness, Some(true));

        let coerced = normalize_at(
            &json!({ "id": "x", "rashDriving": "1", "collision": 1, "drowsiness": "yes" }),
            Channel::Polling,
            now(),
        );
        assert_eq!(coerced.metrics.rash_driving, Some(true));
        assert_eq!(coerced.metrics.collision, Some(true));
        assert_eq!(coerced.metrics.drowsiness, Some(false));
    }

    #[test]
    fn non_numeric_numbers_become_none() {
        let raw = json!({ "id": "x", "speed": "fast", "acceleration": [1], "lat": "1.5" });
        let alarm = normalize_at(&raw, Channel::Polling, now());
        assert_eq!(alarm.metrics.speed, None);
        assert_eq!(alarm.metrics.acceleration, None);
        // Latitude alone is not a location.
        assert_eq!(alarm.location, None);
    }

    #[test]
    fn field_priority_order_is_respected() {
        let raw = json!({
            "id": "generic",
            "alert_id": "alert",
            "alarmId": "explicit",
            "type": "Fallback",
            "alarmType": "Overspeed",
        });
        let alarm = normalize_at(&raw, Channel::Historical, now());
        assert_eq!(alarm.id, "explicit");
        assert_eq!(alarm.alarm_type, "Overspeed");
    }

    #[test]
    fn location_nested_and_flat() {
        let nested = json!({ "id": "n", "location": { "latitude": 12.5, "lng": "77.25" } });
        assert_eq!(
            normalize_at(&nested, Channel::Polling, now()).location,
            Some(Location { lat: 12.5, lon: 77.25 })
        );

        let flat = json!({ "id": "f", "lat": "-33.9", "longitude": 151.2 });
        assert_eq!(
            normalize_at(&flat, Channel::Polling, now()).location,
            Some(Location { lat: -33.9, lon: 151.2 })
        );
    }

    #[test]
    fn timestamps_accept_epoch_seconds_and_millis() {
        let secs = normalize_at(&json!({ "id": "s", "createdAt": 1_704_067_200 }), Channel::Polling, now());
        let millis = normalize_at(
            &json!({ "id": "m", "alarmTime": "1704067200000" }),
            Channel::Polling,
            now(),
        );
        let naive = normalize_at(
            &json!({ "id": "n", "timestamp": "2024-01-01 00:00:00" }),
            Channel::Polling,
            now(),
        );
        assert_eq!(secs.occurred_at, millis.occurred_at);
        assert_eq!(secs.occurred_at, naive.occurred_at);
        assert_eq!(secs.occurred_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn unparseable_time_falls_back_to_now() {
        let alarm = normalize_at(&json!({ "id": "x", "timestamp": "yesterday" }), Channel::Polling, now());
        assert_eq!(alarm.occurred_at, now());
    }

    #[test]
    fn severity_aliases_and_inference() {
        assert_eq!(parse_severity("WARNING"), Some(Severity::Medium));
        assert_eq!(parse_severity("info"), Some(Severity::Low));
        assert_eq!(parse_severity("Severe"), Some(Severity::High));
        assert_eq!(parse_severity("purple"), None);

        assert_eq!(infer_severity("Forward Collision Warning"), Some(Severity::Critical));
        assert_eq!(infer_severity("DrowsinessDetected"), Some(Severity::High));
        assert_eq!(infer_severity("Phone usage"), Some(Severity::Medium));
        assert_eq!(infer_severity("Door open"), None);

        // An unknown explicit severity still falls through to inference.
        let raw = json!({ "id": "x", "severity": "purple", "alarmType": "SOS button" });
        assert_eq!(normalize_at(&raw, Channel::Historical, now()).severity, Severity::Critical);
    }

    #[test]
    fn status_aliases() {
        assert_eq!(parse_status("ACK"), Some(AlarmStatus::Acknowledged));
        assert_eq!(parse_status("closed"), Some(AlarmStatus::Resolved));
        assert_eq!(parse_status("new"), Some(AlarmStatus::Active));

        let raw = json!({ "id": "x", "status": "resolved" });
        assert_eq!(normalize_at(&raw, Channel::Historical, now()).status, AlarmStatus::Resolved);
    }

    #[test]
    fn synthesized_id_is_stable_when_time_is_known() {
        let raw = json!({ "deviceId": "truck-7", "alarmType": "Overspeed", "timestamp": 1_704_067_200 });
        let a = normalize_at(&raw, Channel::Polling, now());
        let b = normalize_at(&raw, Channel::GlobalStream, now());
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, "alarm_1704067200000_truck-7_Overspeed");
    }

    #[test]
    fn synthesized_id_without_time_is_unique() {
        let raw = json!({ "alarmType": "Overspeed" });
        let a = normalize_at(&raw, Channel::Polling, now());
        let b = normalize_at(&raw, Channel::Polling, now());
        assert_ne!(a.id, b.id);
    }
}

// ── Filter predicates for alarm snapshots ──
//
// Used by the CLI to narrow snapshots without re-querying the backend.

use std::sync::Arc;

use crate::model::{Alarm, AlarmStatus, Severity};

/// Filter predicate over canonical alarms.
pub enum AlarmFilter {
    All,
    /// Only alarms from the stream or polling channels.
    Live,
    /// Alarms an operator still has to act on.
    Active,
    /// Alarms at or above the given severity.
    BySeverity(Severity),
    ByStatus(AlarmStatus),
    ByDevice(String),
    Custom(Box<dyn Fn(&Alarm) -> bool + Send + Sync>),
}

impl AlarmFilter {
    pub fn matches(&self, alarm: &Alarm) -> bool {
        match self {
            Self::All => true,
            Self::Live => alarm.is_live,
            Self::Active => alarm.status.is_open(),
            Self::BySeverity(min) => alarm.severity >= *min,
            Self::ByStatus(status) => alarm.status == *status,
            Self::ByDevice(device) => alarm.device_id.as_deref() == Some(device.as_str()),
            Self::Custom(f) => f(alarm),
        }
    }

    /// Apply the filter to a snapshot, keeping canonical order.
    pub fn apply(&self, alarms: &[Arc<Alarm>]) -> Vec<Arc<Alarm>> {
        alarms
            .iter()
            .filter(|a| self.matches(a))
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for AlarmFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Live => f.write_str("Live"),
            Self::Active => f.write_str("Active"),
            Self::BySeverity(s) => f.debug_tuple("BySeverity").field(s).finish(),
            Self::ByStatus(s) => f.debug_tuple("ByStatus").field(s).finish(),
            Self::ByDevice(d) => f.debug_tuple("ByDevice").field(d).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Channel;
    use crate::normalize::normalize;
    use serde_json::json;

    fn sample() -> Vec<Arc<Alarm>> {
        vec![
            Arc::new(normalize(
                &json!({ "id": "1", "alarmType": "Collision", "deviceId": "t1" }),
                Channel::GlobalStream,
            )),
            Arc::new(normalize(
                &json!({ "id": "2", "alarmType": "Seatbelt", "status": "resolved" }),
                Channel::Historical,
            )),
            Arc::new(normalize(
                &json!({ "id": "3", "alarmType": "Door", "status": "ack" }),
                Channel::Polling,
            )),
        ]
    }

    fn ids(alarms: &[Arc<Alarm>]) -> Vec<&str> {
        alarms.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn live_and_active() {
        let alarms = sample();
        assert_eq!(ids(&AlarmFilter::Live.apply(&alarms)), vec!["1", "3"]);
        assert_eq!(ids(&AlarmFilter::Active.apply(&alarms)), vec!["1"]);
    }

    #[test]
    fn severity_is_a_floor() {
        let alarms = sample();
        let high = AlarmFilter::BySeverity(Severity::High).apply(&alarms);
        assert_eq!(ids(&high), vec!["1"]);
        let medium = AlarmFilter::BySeverity(Severity::Medium).apply(&alarms);
        assert_eq!(ids(&medium), vec!["1", "2", "3"]);
    }

    #[test]
    fn device_status_and_custom() {
        let alarms = sample();
        assert_eq!(ids(&AlarmFilter::ByDevice("t1".into()).apply(&alarms)), vec!["1"]);
        assert_eq!(
            ids(&AlarmFilter::ByStatus(AlarmStatus::Acknowledged).apply(&alarms)),
            vec!["3"]
        );
        let custom = AlarmFilter::Custom(Box::new(|a| a.alarm_type.starts_with('S')));
        assert_eq!(ids(&custom.apply(&alarms)), vec!["2"]);
    }
}

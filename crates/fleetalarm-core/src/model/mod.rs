// ── Alarm domain model ──
//
// The canonical representation every ingestion channel is normalized
// into. Consumers (CLI, dashboards) depend only on these types.

pub mod alarm;

pub use alarm::{Alarm, AlarmMetrics, AlarmSource, AlarmStatus, Channel, Location, Severity};

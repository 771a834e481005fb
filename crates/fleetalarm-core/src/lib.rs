// fleetalarm-core: Alarm ingestion and reconciliation between fleetalarm-api and consumers.

pub mod config;
pub mod error;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod polling;
pub mod reconciler;
pub mod store;
pub mod stream;

mod command;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ReconcilerConfig, TlsVerification};
pub use error::CoreError;
pub use merge::{DEFAULT_CAPACITY, merge, merge_with_capacity};
pub use normalize::{normalize, normalize_at};
pub use notify::{NotificationSideEffects, NotificationSink, NotifyError};
pub use polling::{PollEvent, PollingFallback};
pub use reconciler::{HistoryLoad, Liveness, Reconciler, ReconcilerEvent};
pub use store::{AlarmCounts, AlarmSnapshot, AlarmStore, IngestOutcome};
pub use stream::{AlarmFilter, AlarmStream};

pub use model::{Alarm, AlarmMetrics, AlarmSource, AlarmStatus, Channel, Location, Severity};

pub use fleetalarm_api::{AlarmAction, RawRecord, ReconnectConfig};

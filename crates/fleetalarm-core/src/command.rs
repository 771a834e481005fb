// ── Reconciler commands ──
//
// Every mutation of the canonical set flows through the reconciler's
// command channel, so the store has a single owner. Each command carries
// a oneshot for its reply.

use fleetalarm_api::RawRecord;
use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::model::{Alarm, AlarmStatus, Channel};
use crate::store::IngestOutcome;

pub(crate) enum ReconcilerCommand {
    /// Normalize and ingest one raw record.
    Ingest {
        raw: RawRecord,
        channel: Channel,
        reply: oneshot::Sender<IngestOutcome>,
    },
    /// Ingest already-normalized alarms with a single snapshot publish.
    IngestBatch {
        alarms: Vec<Alarm>,
        reply: oneshot::Sender<usize>,
    },
    /// Optimistic local status change.
    Transition {
        id: String,
        target: AlarmStatus,
        reply: oneshot::Sender<Result<bool, CoreError>>,
    },
}

impl std::fmt::Debug for ReconcilerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ingest { channel, .. } => write!(f, "Ingest({channel})"),
            Self::IngestBatch { alarms, .. } => write!(f, "IngestBatch({})", alarms.len()),
            Self::Transition { id, target, .. } => write!(f, "Transition({id} -> {target})"),
        }
    }
}

// ── Canonical alarm store ──
//
// The reconciled set plus the session-wide `seen` ids. Owned by exactly
// one task (the reconciler actor), so it needs no interior locking;
// readers get immutable snapshots through a `watch` channel.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::CoreError;
use crate::merge::newest_first;
use crate::model::{Alarm, AlarmStatus, Severity};

/// Snapshot type published to subscribers.
pub type AlarmSnapshot = Arc<Vec<Arc<Alarm>>>;

/// What [`AlarmStore::ingest`] did with an alarm.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// First time this id was seen in the session.
    New(Arc<Alarm>),
    /// Known id whose canonical entry changed.
    Updated(Arc<Alarm>),
    /// Known id, nothing to change (or the entry was already evicted).
    Unchanged,
}

impl IngestOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}

/// Badge counters over the canonical set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlarmCounts {
    pub total: usize,
    pub live: usize,
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub critical: usize,
    pub unacknowledged_critical: usize,
}

/// Canonical alarm set: one entry per id, newest first, capped.
pub struct AlarmStore {
    alarms: Vec<Arc<Alarm>>,
    seen: HashSet<String>,
    capacity: usize,
    snapshot: watch::Sender<AlarmSnapshot>,
}

impl AlarmStore {
    pub fn new(capacity: usize) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            alarms: Vec::new(),
            seen: HashSet::new(),
            capacity,
            snapshot,
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Fold one normalized alarm into the set and publish a snapshot.
    pub fn ingest(&mut self, alarm: Alarm) -> IngestOutcome {
        let outcome = self.apply(alarm);
        if !matches!(outcome, IngestOutcome::Unchanged) {
            self.publish();
        }
        outcome
    }

    /// Fold a batch, publishing a single snapshot at the end.
    pub fn ingest_batch(&mut self, alarms: Vec<Alarm>) -> Vec<IngestOutcome> {
        let outcomes: Vec<IngestOutcome> = alarms.into_iter().map(|a| self.apply(a)).collect();
        if outcomes.iter().any(|o| !matches!(o, IngestOutcome::Unchanged)) {
            self.publish();
        }
        outcomes
    }

    /// Move an alarm to `target` locally.
    ///
    /// Returns `Ok(true)` if the status changed, `Ok(false)` if it was
    /// already there. Allowed moves: open → acknowledged, anything but
    /// resolved → resolved.
    pub fn transition(&mut self, id: &str, target: AlarmStatus) -> Result<bool, CoreError> {
        let Some(index) = self.position(id) else {
            return Err(CoreError::AlarmNotFound { id: id.to_owned() });
        };

        let current = self.alarms[index].status;
        if current == target {
            return Ok(false);
        }

        let allowed = match target {
            AlarmStatus::Acknowledged => current.is_open(),
            AlarmStatus::Resolved => true,
            AlarmStatus::Active | AlarmStatus::Historical => false,
        };
        if !allowed {
            return Err(CoreError::InvalidTransition {
                id: id.to_owned(),
                from: current,
                to: target,
            });
        }

        Arc::make_mut(&mut self.alarms[index]).status = target;
        debug!(alarm_id = id, from = %current, to = %target, "status transition");
        self.publish();
        Ok(true)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<Arc<Alarm>> {
        self.position(id).map(|i| Arc::clone(&self.alarms[i]))
    }

    /// Whether the id was ever ingested this session (even if evicted).
    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> AlarmSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AlarmSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn counts(&self) -> AlarmCounts {
        count(&self.alarms)
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn apply(&mut self, alarm: Alarm) -> IngestOutcome {
        if self.seen.contains(&alarm.id) {
            return self.update_existing(alarm);
        }

        self.seen.insert(alarm.id.clone());
        let alarm = Arc::new(alarm);
        let index = self
            .alarms
            .partition_point(|existing| newest_first(existing, &alarm).is_lt());
        self.alarms.insert(index, Arc::clone(&alarm));

        if self.alarms.len() > self.capacity {
            for evicted in self.alarms.drain(self.capacity..) {
                trace!(alarm_id = %evicted.id, "evicted by capacity");
            }
        }

        IngestOutcome::New(alarm)
    }

    /// Known id: live data replaces non-live data, anything replaces
    /// non-live data, and a historical refresh of a live entry may only
    /// carry an operator action (acknowledged / resolved) over to it.
    /// Status never moves backwards.
    fn update_existing(&mut self, incoming: Alarm) -> IngestOutcome {
        let Some(index) = self.position(&incoming.id) else {
            return IngestOutcome::Unchanged;
        };
        let existing = &self.alarms[index];

        let mut updated = if incoming.is_live || !existing.is_live {
            incoming
        } else {
            let status = if progress(incoming.status) > 0 {
                incoming.status
            } else {
                existing.status
            };
            Alarm {
                status,
                ..(**existing).clone()
            }
        };
        if progress(updated.status) < progress(existing.status) {
            updated.status = existing.status;
        }

        if updated == **existing {
            return IngestOutcome::Unchanged;
        }

        let updated = Arc::new(updated);
        self.alarms.remove(index);
        let index = self
            .alarms
            .partition_point(|other| newest_first(other, &updated).is_lt());
        self.alarms.insert(index, Arc::clone(&updated));
        IngestOutcome::Updated(updated)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.alarms.iter().position(|a| a.id == id)
    }

    fn publish(&self) {
        let snapshot: Vec<Arc<Alarm>> = self.alarms.clone();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(snapshot));
    }
}

/// Workflow progress rank; historical records have not been acted on.
fn progress(status: AlarmStatus) -> u8 {
    match status {
        AlarmStatus::Active | AlarmStatus::Historical => 0,
        AlarmStatus::Acknowledged => 1,
        AlarmStatus::Resolved => 2,
    }
}

/// Compute badge counters over any alarm slice.
pub fn count(alarms: &[Arc<Alarm>]) -> AlarmCounts {
    alarms.iter().fold(AlarmCounts::default(), |mut c, alarm| {
        c.total += 1;
        if alarm.is_live {
            c.live += 1;
        }
        match alarm.status {
            AlarmStatus::Active => c.active += 1,
            AlarmStatus::Acknowledged => c.acknowledged += 1,
            AlarmStatus::Resolved => c.resolved += 1,
            AlarmStatus::Historical => {}
        }
        if alarm.severity == Severity::Critical {
            c.critical += 1;
        }
        if alarm.is_unacknowledged_critical() {
            c.unacknowledged_critical += 1;
        }
        c
    })
}

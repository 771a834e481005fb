// ── Alarm list merging ──
//
// Folds any number of alarm lists into one duplicate-free list ordered
// newest first. Later lists win only with a live variant, so a history
// refresh can never clobber what the stream already delivered.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::Alarm;

/// Maximum size of the canonical set.
pub const DEFAULT_CAPACITY: usize = 500;

/// Merge `lists` with the default capacity.
pub fn merge<I, L>(lists: I) -> Vec<Alarm>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = Alarm>,
{
    merge_with_capacity(lists, DEFAULT_CAPACITY)
}

/// Concatenate `lists` in order, keep one alarm per id (a later entry
/// replaces an earlier one only if it is live), sort newest first and
/// keep the `capacity` most recent.
///
/// Idempotent: merging an already-merged list returns it unchanged.
pub fn merge_with_capacity<I, L>(lists: I, capacity: usize) -> Vec<Alarm>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = Alarm>,
{
    let mut by_id: HashMap<String, Alarm> = HashMap::new();

    for alarm in lists.into_iter().flatten() {
        match by_id.get_mut(&alarm.id) {
            Some(existing) => {
                if alarm.is_live {
                    *existing = alarm;
                }
            }
            None => {
                by_id.insert(alarm.id.clone(), alarm);
            }
        }
    }

    let mut merged: Vec<Alarm> = by_id.into_values().collect();
    merged.sort_by(newest_first);
    merged.truncate(capacity);
    merged
}

/// Canonical order: descending `occurred_at`, ties broken by id so the
/// result does not depend on hash iteration order.
pub(crate) fn newest_first(a: &Alarm, b: &Alarm) -> Ordering {
    b.occurred_at
        .cmp(&a.occurred_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AlarmMetrics, AlarmSource, AlarmStatus, Severity};
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    fn alarm(id: &str, minute: i64, is_live: bool) -> Alarm {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Alarm {
            id: id.into(),
            device_id: None,
            alarm_type: "Overspeed".into(),
            description: "No description".into(),
            severity: Severity::High,
            status: if is_live {
                AlarmStatus::Active
            } else {
                AlarmStatus::Historical
            },
            is_live,
            occurred_at: base + Duration::minutes(minute),
            location: None,
            preview_url: None,
            download_url: None,
            metrics: AlarmMetrics::default(),
            source: if is_live {
                AlarmSource::GlobalSse
            } else {
                AlarmSource::Api
            },
        }
    }

    fn ids(alarms: &[Alarm]) -> Vec<&str> {
        alarms.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn orders_newest_first() {
        let merged = merge([vec![alarm("a", 1, false), alarm("c", 3, false), alarm("b", 2, false)]]);
        assert_eq!(ids(&merged), vec!["c", "b", "a"]);
    }

    #[test]
    fn live_variant_replaces_historical() {
        let historical = alarm("x", 1, false);
        let mut live = alarm("x", 1, true);
        live.description = "from stream".into();

        let merged = merge([vec![historical], vec![live.clone()]]);
        assert_eq!(merged, vec![live]);
    }

    #[test]
    fn later_historical_does_not_replace_existing() {
        let live = alarm("x", 1, true);
        let mut historical = alarm("x", 1, false);
        historical.description = "stale".into();

        let merged = merge([vec![live.clone()], vec![historical]]);
        assert_eq!(merged, vec![live]);
    }

    #[test]
    fn later_live_replaces_earlier_live() {
        let first = alarm("x", 1, true);
        let mut second = alarm("x", 1, true);
        second.status = AlarmStatus::Resolved;

        let merged = merge([vec![first], vec![second.clone()]]);
        assert_eq!(merged, vec![second]);
    }

    #[test]
    fn caps_at_most_recent() {
        let many: Vec<Alarm> = (0..600).map(|i| alarm(&format!("a{i:03}"), i, true)).collect();
        let merged = merge([many]);

        assert_eq!(merged.len(), 500);
        assert_eq!(merged.first().unwrap().id, "a599");
        assert_eq!(merged.last().unwrap().id, "a100");
    }

    #[test]
    fn merge_is_idempotent() {
        let lists = vec![
            vec![alarm("a", 5, false), alarm("b", 5, false), alarm("c", 1, false)],
            vec![alarm("b", 5, true), alarm("d", 9, true)],
        ];
        let once = merge(lists);
        let twice = merge([once.clone()]);
        assert_eq!(once, twice);
        // Equal timestamps are ordered by id.
        assert_eq!(ids(&once), vec!["d", "a", "b", "c"]);
    }
}

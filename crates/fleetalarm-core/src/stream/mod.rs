// ── Reactive alarm subscriptions ──
//
// Subscription types for consuming canonical-set changes from the
// reconciler without touching its state.

mod filter;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::AlarmSnapshot;

pub use filter::AlarmFilter;

/// A subscription to the canonical alarm set.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct AlarmStream {
    current: AlarmSnapshot,
    receiver: watch::Receiver<AlarmSnapshot>,
}

impl AlarmStream {
    pub(crate) fn new(mut receiver: watch::Receiver<AlarmSnapshot>) -> Self {
        // Mark the current value seen so `changed()` waits for the next one.
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation time (or at the last `changed()`).
    pub fn current(&self) -> &AlarmSnapshot {
        &self.current
    }

    /// The latest snapshot (may have changed since creation).
    pub fn latest(&self) -> AlarmSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the reconciler has shut down.
    pub async fn changed(&mut self) -> Option<AlarmSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> AlarmWatchStream {
        AlarmWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then a new one each time the
/// canonical set changes.
pub struct AlarmWatchStream {
    inner: WatchStream<AlarmSnapshot>,
}

impl Stream for AlarmWatchStream {
    type Item = AlarmSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

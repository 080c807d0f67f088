// ── Snapshot feed ──
//
// Subscription handle over the coordinator's current-value cell.
// Level-triggered: a slow consumer skips intermediate snapshots and only
// ever sees the latest one.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Snapshot;

pub(crate) type SnapshotCell = Option<Arc<Snapshot>>;

/// A subscription to published snapshots.
///
/// Provides point-in-time access plus change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct SnapshotStream {
    current: SnapshotCell,
    receiver: watch::Receiver<SnapshotCell>,
}

impl SnapshotStream {
    pub(crate) fn new(mut receiver: watch::Receiver<SnapshotCell>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Snapshot seen at creation or at the last `changed()`.
    pub fn current(&self) -> Option<&Arc<Snapshot>> {
        self.current.as_ref()
    }

    /// Latest published snapshot (may be newer than `current`).
    pub fn latest(&self) -> SnapshotCell {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publish. Returns `None` once the coordinator is
    /// gone.
    pub async fn changed(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            self.receiver.changed().await.ok()?;
            let snap = self.receiver.borrow_and_update().clone();
            if let Some(snap) = snap {
                self.current = Some(Arc::clone(&snap));
                return Some(snap);
            }
        }
    }

    /// Whether a publish happened that this handle has not consumed yet.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::from_changes(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each newly published snapshot.
pub struct SnapshotWatchStream {
    inner: WatchStream<SnapshotCell>,
}

impl Stream for SnapshotWatchStream {
    type Item = Arc<Snapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Some(snap))) => return Poll::Ready(Some(snap)),
                // The cell only holds `None` before the first publish.
                Poll::Ready(Some(None)) => {}
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

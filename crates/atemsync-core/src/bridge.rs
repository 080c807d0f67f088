// ── Push-event bridge ──
//
// The device library delivers notifications on its own thread. The bridge
// classifies each one and, for state-changing kinds, enqueues a refresh
// trigger on the coordinator's unbounded channel. The callback never blocks
// and never touches coordinator state directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::link::{DeviceEvent, DeviceLink, EventCallback, LinkError};

// ── EventKind ────────────────────────────────────────────────────────

/// Classification of a push notification by its protocol command code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `PrgI`
    ProgramChanged,
    /// `PrvI`
    PreviewChanged,
    /// `_ver`
    VersionChanged,
    /// `_pin`
    ModelChanged,
    /// `InPr`
    InputsChanged,
    /// Anything else: tally, timecode, heartbeats, ...
    Other(String),
}

impl EventKind {
    pub fn from_command(command: &str) -> Self {
        match command {
            "PrgI" => Self::ProgramChanged,
            "PrvI" => Self::PreviewChanged,
            "_ver" => Self::VersionChanged,
            "_pin" => Self::ModelChanged,
            "InPr" => Self::InputsChanged,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Whether this kind changes anything a snapshot reports.
    pub fn triggers_refresh(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

// ── RefreshTrigger ───────────────────────────────────────────────────

/// Why a refresh was queued on the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTrigger {
    Event(EventKind),
    /// Poll interval elapsed.
    Poll,
    Reconnected,
    Command,
    Manual,
}

pub(crate) type TriggerSender = mpsc::UnboundedSender<RefreshTrigger>;
pub(crate) type TriggerReceiver = mpsc::UnboundedReceiver<RefreshTrigger>;

// ── EventBridge ──────────────────────────────────────────────────────

/// Counters for events seen by the bridge callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub observed: u64,
    pub forwarded: u64,
}

/// Adapter between the link's callback thread and the coordinator queue.
///
/// Cheaply cloneable. At most one callback is ever registered per bridge.
#[derive(Clone)]
pub struct EventBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    registered: AtomicBool,
    tx: ArcSwapOption<TriggerSender>,
    observed: AtomicU64,
    forwarded: AtomicU64,
}

impl EventBridge {
    pub(crate) fn new(tx: TriggerSender) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                registered: AtomicBool::new(false),
                tx: ArcSwapOption::from_pointee(tx),
                observed: AtomicU64::new(0),
                forwarded: AtomicU64::new(0),
            }),
        }
    }

    /// Register the callback with `link`.
    ///
    /// Returns `Ok(false)` without touching the link if a callback is
    /// already registered. Blocking: call from the blocking pool.
    pub fn register(&self, link: &dyn DeviceLink) -> Result<bool, LinkError> {
        if self
            .inner
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("event callback already registered");
            return Ok(false);
        }

        let inner = Arc::clone(&self.inner);
        let callback: EventCallback = Arc::new(move |event: DeviceEvent| inner.deliver(&event));

        if let Err(e) = link.register_event(callback) {
            self.inner.registered.store(false, Ordering::Release);
            return Err(e);
        }

        info!("switcher event callback registered");
        Ok(true)
    }

    pub fn is_registered(&self) -> bool {
        self.inner.registered.load(Ordering::Acquire)
    }

    /// Detach from the coordinator. The registered callback stays with the
    /// link but becomes inert. Returns `false` if already released.
    pub fn release(&self) -> bool {
        let released = self.inner.tx.swap(None).is_some();
        if released {
            debug!("event bridge released");
        }
        released
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            observed: self.inner.observed.load(Ordering::Relaxed),
            forwarded: self.inner.forwarded.load(Ordering::Relaxed),
        }
    }
}

impl BridgeInner {
    /// Runs on the link's delivery thread.
    fn deliver(&self, event: &DeviceEvent) {
        self.observed.fetch_add(1, Ordering::Relaxed);

        let kind = EventKind::from_command(&event.command);
        if !kind.triggers_refresh() {
            trace!(
                command = %event.command,
                name = event.name.as_deref().unwrap_or(""),
                "ignoring switcher event"
            );
            return;
        }

        debug!(
            command = %event.command,
            name = event.name.as_deref().unwrap_or(""),
            "switcher event, queueing refresh"
        );

        let guard = self.tx.load();
        let Some(tx) = &*guard else {
            trace!("event bridge released, dropping event");
            return;
        };

        // Unbounded send never blocks; it only fails once the coordinator
        // has dropped its receiver.
        if tx.send(RefreshTrigger::Event(kind)).is_ok() {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }
}

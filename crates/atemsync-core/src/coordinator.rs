// ── Sync coordinator ──
//
// Top-level orchestrator for one switcher. Runs the first connect, owns the
// refresh driver (event queue + poll interval), publishes snapshots through
// a watch channel and routes control commands. Refreshes are serialized by
// an async lock so manual callers and the driver never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use strum::Display;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bridge::{BridgeStats, EventBridge, RefreshTrigger, TriggerReceiver, TriggerSender};
use crate::builder::SnapshotBuilder;
use crate::command::{Command, CommandEnvelope};
use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::link::DeviceLink;
use crate::model::{DEFAULT_PROFILE, InputSelector, Snapshot};
use crate::stream::{SnapshotCell, SnapshotStream};
use crate::supervisor::{ConnectionState, ConnectionSupervisor};

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── CoordinatorPhase ─────────────────────────────────────────────────

/// Lifecycle phase of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CoordinatorPhase {
    Uninitialized,
    FirstRefreshing,
    /// Last published snapshot was connected.
    Steady,
    /// Last published snapshot was disconnected or errored.
    Degraded,
    Stopped,
}

// ── SyncCoordinator ──────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`. Background tasks hold
/// only weak references, so dropping the last handle without calling
/// [`shutdown()`](Self::shutdown) still stops them and closes the session.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: SyncConfig,
    link: Arc<dyn DeviceLink>,
    supervisor: ConnectionSupervisor,
    bridge: EventBridge,
    builder: SnapshotBuilder,
    snapshot: watch::Sender<SnapshotCell>,
    phase: watch::Sender<CoordinatorPhase>,
    refresh_tx: TriggerSender,
    refresh_rx: Mutex<Option<TriggerReceiver>>,
    refresh_lock: Mutex<()>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl SyncCoordinator {
    /// Create a coordinator. Does NOT connect; call
    /// [`first_refresh()`](Self::first_refresh) to bring it up.
    pub fn new(link: Arc<dyn DeviceLink>, config: SyncConfig) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (snapshot, _) = watch::channel(None);
        let (phase, _) = watch::channel(CoordinatorPhase::Uninitialized);
        let cancel = CancellationToken::new();

        let supervisor = ConnectionSupervisor::new(
            Arc::clone(&link),
            &config,
            refresh_tx.clone(),
            cancel.child_token(),
        );

        Self {
            inner: Arc::new(CoordinatorInner {
                bridge: EventBridge::new(refresh_tx.clone()),
                builder: SnapshotBuilder::new(Arc::clone(&link)),
                config,
                link,
                supervisor,
                snapshot,
                phase,
                refresh_tx,
                refresh_rx: Mutex::new(Some(refresh_rx)),
                refresh_lock: Mutex::new(()),
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel,
                task_handles: Mutex::new(Vec::new()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Address of the switcher this coordinator mirrors.
    pub fn address(&self) -> &str {
        &self.inner.config.address
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.inner.supervisor
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect, publish the first snapshot and start background tasks.
    ///
    /// An unreachable switcher is fatal here: nothing is published and the
    /// coordinator returns to [`CoordinatorPhase::Uninitialized`] so the
    /// host can retry. Calling this again after success returns the latest
    /// snapshot.
    pub async fn first_refresh(&self) -> Result<Arc<Snapshot>, CoreError> {
        if self.is_shut_down() {
            return Err(CoreError::Internal("coordinator is stopped".into()));
        }
        self.inner.config.validate()?;

        let started = self.inner.phase.send_if_modified(|phase| {
            if *phase == CoordinatorPhase::Uninitialized {
                *phase = CoordinatorPhase::FirstRefreshing;
                true
            } else {
                false
            }
        });
        if !started {
            return self
                .snapshot()
                .ok_or_else(|| CoreError::Internal("first refresh already in progress".into()));
        }

        // Polling still works without push events.
        let bridge = self.inner.bridge.clone();
        let link = Arc::clone(&self.inner.link);
        match tokio::task::spawn_blocking(move || bridge.register(link.as_ref())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "event registration failed, falling back to polling"),
            Err(e) => warn!(error = %e, "event registration worker failed"),
        }

        let address = self.inner.config.address.clone();
        if let Err(e) = self.inner.supervisor.connect(&address).await {
            self.inner
                .phase
                .send_replace(CoordinatorPhase::Uninitialized);
            return Err(e);
        }

        let snapshot = self.refresh().await;

        self.spawn_tasks().await;
        info!(
            address = %address,
            program = snapshot.program.label(),
            preview = snapshot.preview.label(),
            "switcher sync started"
        );
        Ok(snapshot)
    }

    /// Stop background tasks, release the event bridge and close the
    /// session. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            debug!("coordinator already stopped");
            return;
        }

        self.inner.phase.send_replace(CoordinatorPhase::Stopped);
        self.inner.cancel.cancel();
        self.inner.supervisor.cancel_reconnect().await;

        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task failed");
            }
        }

        self.inner.bridge.release();
        self.inner.supervisor.disconnect().await;
        info!(address = %self.inner.config.address, "switcher sync stopped");
    }

    fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Build and publish a snapshot now.
    ///
    /// A down link publishes a disconnected snapshot immediately and leaves
    /// recovery to the supervisor's reconnect loop.
    pub async fn refresh(&self) -> Arc<Snapshot> {
        let _refresh = self.inner.refresh_lock.lock().await;

        if self.is_shut_down() {
            return self
                .snapshot()
                .unwrap_or_else(|| Arc::new(Snapshot::disconnected()));
        }

        if !self.inner.supervisor.ensure_connected().await {
            return self.publish(Snapshot::disconnected());
        }

        let builder = self.inner.builder.clone();
        let snapshot = match tokio::task::spawn_blocking(move || builder.build()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "snapshot worker failed");
                Snapshot::error(&e.to_string())
            }
        };

        if !snapshot.is_connected() {
            // Dropped between the liveness check and the reads.
            self.inner.supervisor.ensure_connected().await;
        }

        self.publish(snapshot)
    }

    /// Queue a refresh for the driver task. Never blocks.
    pub fn request_refresh(&self) {
        self.queue_refresh(RefreshTrigger::Manual);
    }

    fn queue_refresh(&self, trigger: RefreshTrigger) {
        if self.inner.refresh_tx.send(trigger).is_err() {
            debug!("refresh driver gone, request dropped");
        }
    }

    fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let next = if snapshot.is_connected() {
            CoordinatorPhase::Steady
        } else {
            CoordinatorPhase::Degraded
        };

        // Phase first: a subscriber woken by the snapshot sees a matching phase.
        self.inner.phase.send_if_modified(|phase| {
            if *phase == next || *phase == CoordinatorPhase::Stopped {
                return false;
            }
            *phase = next;
            true
        });
        self.inner.snapshot.send_replace(Some(Arc::clone(&snapshot)));

        debug!(
            connection = %snapshot.connection,
            program = snapshot.program.label(),
            preview = snapshot.preview.label(),
            "snapshot published"
        );
        snapshot
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.inner.snapshot.subscribe())
    }

    /// Latest published snapshot, `None` before the first refresh.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.snapshot.borrow().clone()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.state()
    }

    pub fn phase(&self) -> CoordinatorPhase {
        *self.inner.phase.borrow()
    }

    /// Subscribe to phase changes.
    pub fn phases(&self) -> watch::Receiver<CoordinatorPhase> {
        self.inner.phase.subscribe()
    }

    pub fn bridge_stats(&self) -> BridgeStats {
        self.inner.bridge.stats()
    }

    // ── Command execution ────────────────────────────────────────────

    /// Execute a control command against the switcher.
    ///
    /// Sends the command through the internal channel to the command
    /// processor task and awaits the result.
    pub async fn execute(&self, command: Command) -> Result<(), CoreError> {
        if !matches!(
            self.phase(),
            CoordinatorPhase::Steady | CoordinatorPhase::Degraded
        ) {
            return Err(CoreError::DeviceDisconnected);
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::DeviceDisconnected)?;

        rx.await.map_err(|_| CoreError::DeviceDisconnected)?
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn spawn_tasks(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        let weak = Arc::downgrade(&self.inner);

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            handles.push(tokio::spawn(command_processor_task(
                Weak::clone(&weak),
                rx,
                self.inner.cancel.clone(),
            )));
        }

        if let Some(rx) = self.inner.refresh_rx.lock().await.take() {
            handles.push(tokio::spawn(refresh_driver_task(
                weak,
                rx,
                self.inner.config.poll_interval,
                self.inner.cancel.clone(),
            )));
        }
    }
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(address = %self.config.address, "coordinator dropped without shutdown");
        self.cancel.cancel();
        self.bridge.release();
        if !self.link.is_connected() {
            return;
        }

        let link = Arc::clone(&self.link);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || link.disconnect());
            }
            Err(_) => link.disconnect(),
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Single consumer of the refresh queue. Also ticks the poll interval.
/// Queued triggers that pile up during a refresh are coalesced into the
/// next one.
async fn refresh_driver_task(
    coordinator: Weak<CoordinatorInner>,
    mut rx: TriggerReceiver,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut interval = poll_timer(poll_interval);

    loop {
        let trigger = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            trigger = rx.recv() => {
                let Some(trigger) = trigger else { break };
                trigger
            }
            () = next_tick(&mut interval) => RefreshTrigger::Poll,
        };

        let mut coalesced = 0u32;
        while rx.try_recv().is_ok() {
            coalesced += 1;
        }

        let Some(inner) = coordinator.upgrade() else { break };
        trace!(?trigger, coalesced, "refresh triggered");
        SyncCoordinator { inner }.refresh().await;
    }

    debug!("refresh driver stopped");
}

fn poll_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    // First tick one period out; the first snapshot is already published.
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Process commands from the mpsc channel one at a time.
async fn command_processor_task(
    coordinator: Weak<CoordinatorInner>,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let Some(inner) = coordinator.upgrade() else { break };
                let result = route_command(&SyncCoordinator { inner }, envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────────

/// A command with its input resolved to a source id.
#[derive(Debug, Clone, Copy)]
enum Action {
    Cut,
    Auto,
    Program(u16),
    Preview(u16),
}

async fn route_command(coordinator: &SyncCoordinator, command: Command) -> Result<(), CoreError> {
    let model = coordinator
        .snapshot()
        .and_then(|snap| snap.model_name().map(str::to_owned))
        .unwrap_or_else(|| DEFAULT_PROFILE.name.to_owned());

    let resolve = |input: &InputSelector| {
        input.resolve(&model).inspect_err(|e| {
            warn!(%command, error = %e, "command dropped");
        })
    };
    let action = match &command {
        Command::Cut => Action::Cut,
        Command::AutoTransition => Action::Auto,
        Command::SetProgramInput { input } => Action::Program(resolve(input)?),
        Command::SetPreviewInput { input } => Action::Preview(resolve(input)?),
    };

    if !coordinator.inner.supervisor.ensure_connected().await {
        warn!(%command, "switcher disconnected, command rejected");
        // Replace the stale connected snapshot before answering.
        coordinator.refresh().await;
        return Err(CoreError::DeviceDisconnected);
    }

    let link = Arc::clone(&coordinator.inner.link);
    tokio::task::spawn_blocking(move || match action {
        Action::Cut => link.cut(),
        Action::Auto => link.auto_transition(),
        Action::Program(id) => link.set_program_input(id),
        Action::Preview(id) => link.set_preview_input(id),
    })
    .await??;

    info!(%command, ?action, "command executed");
    coordinator.queue_refresh(RefreshTrigger::Command);
    Ok(())
}

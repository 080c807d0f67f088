// ── Connection supervisor ──
//
// Owns the connect / verify / retry state machine for one switcher. It is
// the only component that opens or closes the link session. Transitions
// are serialized through an async lock; the reconnect loop is single-flight.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::{RefreshTrigger, TriggerSender};
use crate::config::{RetryPolicy, SyncConfig};
use crate::error::CoreError;
use crate::link::DeviceLink;

/// Slack on top of the link's own handshake wait before the outer timeout
/// gives up on a connect worker.
const CONNECT_GRACE: Duration = Duration::from_secs(1);

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Connecting => f.write_str("Connecting"),
            Self::Connected => f.write_str("Connected"),
            Self::Reconnecting { attempt } => write!(f, "Reconnecting (attempt {attempt})"),
        }
    }
}

// ── RetryBudget ──────────────────────────────────────────────────────

/// Attempts left in one reconnect cycle. Created per cycle, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryBudget {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            attempts_made: 0,
            max_attempts: policy.max_attempts,
            backoff: policy.backoff,
        }
    }

    /// Claim the next attempt, returning its 1-based number.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts_made += 1;
        Some(self.attempts_made)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

/// How a reconnect cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Reconnected { attempts: u32 },
    Exhausted { attempts: u32 },
    Cancelled,
}

/// Result of probing an address before accepting it as configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub address: String,
    pub model: Option<String>,
}

// ── ConnectionSupervisor ─────────────────────────────────────────────

struct ReconnectTask {
    handle: JoinHandle<ReconnectOutcome>,
    cancel: CancellationToken,
}

/// Connection lifecycle owner for a single switcher.
///
/// Cheaply cloneable; clones share the same state.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    link: Arc<dyn DeviceLink>,
    address: ArcSwap<String>,
    connect_timeout: Duration,
    settle_delay: Duration,
    retry: RetryPolicy,
    state: watch::Sender<ConnectionState>,
    transition: Mutex<()>,
    reconnect: Mutex<Option<ReconnectTask>>,
    reconnect_launches: AtomicU64,
    refresh_tx: TriggerSender,
    cancel: CancellationToken,
}

impl ConnectionSupervisor {
    pub(crate) fn new(
        link: Arc<dyn DeviceLink>,
        config: &SyncConfig,
        refresh_tx: TriggerSender,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(SupervisorInner {
                link,
                address: ArcSwap::from_pointee(config.address.clone()),
                connect_timeout: config.connect_timeout,
                settle_delay: config.settle_delay,
                retry: config.retry,
                state,
                transition: Mutex::new(()),
                reconnect: Mutex::new(None),
                reconnect_launches: AtomicU64::new(0),
                refresh_tx,
                cancel,
            }),
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Whether a reconnect loop is currently running.
    pub async fn reconnect_in_flight(&self) -> bool {
        self.inner
            .reconnect
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Number of reconnect loops launched so far.
    pub fn reconnect_launches(&self) -> u64 {
        self.inner.reconnect_launches.load(Ordering::Relaxed)
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Open the session and wait for the handshake.
    ///
    /// Bounded by the configured connect timeout. Failure leaves the state
    /// `Disconnected` and surfaces as [`CoreError::SetupUnreachable`].
    pub async fn connect(&self, address: &str) -> Result<ConnectionState, CoreError> {
        let _transition = self.inner.transition.lock().await;
        self.inner.address.store(Arc::new(address.to_owned()));
        self.set_state(ConnectionState::Connecting);

        if let Err(reason) = self.attempt_connect(address).await {
            self.set_state(ConnectionState::Disconnected);
            error!(address, %reason, "failed to connect to switcher");
            return Err(CoreError::SetupUnreachable {
                address: address.to_owned(),
                reason,
            });
        }

        self.set_state(ConnectionState::Connected);
        info!(address, "connected to switcher");

        // Give the device time to push its initial state dump.
        if !self.inner.settle_delay.is_zero() {
            tokio::time::sleep(self.inner.settle_delay).await;
        }

        Ok(ConnectionState::Connected)
    }

    /// Non-blocking liveness check.
    ///
    /// When the link is down this marks the state `Disconnected`, launches
    /// the reconnect loop unless one is already running, and returns
    /// `false` without waiting for it.
    pub async fn ensure_connected(&self) -> bool {
        if self.inner.link.is_connected() {
            // The link may have recovered on its own after a cycle gave up.
            self.inner.state.send_if_modified(|state| {
                if *state == ConnectionState::Disconnected {
                    *state = ConnectionState::Connected;
                    true
                } else {
                    false
                }
            });
            return true;
        }

        let lost = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
        if lost {
            warn!("switcher connection lost");
        }

        self.launch_reconnect().await;
        false
    }

    /// Start a reconnect cycle unless one is already running.
    ///
    /// Returns `true` if a new loop was spawned.
    pub async fn launch_reconnect(&self) -> bool {
        let mut slot = self.inner.reconnect.lock().await;

        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            debug!("reconnect already in flight");
            return false;
        }
        if self.inner.cancel.is_cancelled() {
            debug!("supervisor stopped, not reconnecting");
            return false;
        }

        let cancel = self.inner.cancel.child_token();
        let handle = tokio::spawn(reconnect_loop(self.clone(), cancel.clone()));
        *slot = Some(ReconnectTask { handle, cancel });
        self.inner.reconnect_launches.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Cancel and join the running reconnect loop, if any.
    pub async fn cancel_reconnect(&self) {
        let task = self.inner.reconnect.lock().await.take();
        let Some(task) = task else { return };

        task.cancel.cancel();
        match task.handle.await {
            Ok(outcome) => debug!(?outcome, "reconnect loop stopped"),
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(error = %e, "reconnect loop panicked"),
        }
    }

    /// Close the session. Idempotent.
    pub async fn disconnect(&self) {
        let _transition = self.inner.transition.lock().await;
        let link = Arc::clone(&self.inner.link);
        if let Err(e) = tokio::task::spawn_blocking(move || link.disconnect()).await {
            warn!(error = %e, "disconnect worker failed");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Stop all supervisor activity and close the session.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.cancel_reconnect().await;
        self.disconnect().await;
    }

    // ── Internals ────────────────────────────────────────────────────

    fn set_state(&self, next: ConnectionState) {
        self.inner.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "connection state");
            *state = next;
            true
        });
    }

    /// One connect + handshake wait on the blocking pool.
    async fn attempt_connect(&self, address: &str) -> Result<(), String> {
        let link = Arc::clone(&self.inner.link);
        let address = address.to_owned();
        let wait = self.inner.connect_timeout;

        let worker = tokio::task::spawn_blocking(move || {
            let connected = link.connect(&address)?;
            Ok::<_, crate::link::LinkError>(connected || link.wait_for_connection(wait))
        });

        match tokio::time::timeout(wait + CONNECT_GRACE, worker).await {
            Ok(Ok(Ok(true))) => Ok(()),
            Ok(Ok(Ok(false))) | Err(_) => Err(format!(
                "no handshake within {:.1}s",
                wait.as_secs_f64()
            )),
            Ok(Ok(Err(e))) => Err(e.message),
            Ok(Err(e)) => Err(format!("connect worker failed: {e}")),
        }
    }
}

// ── Reconnect loop ───────────────────────────────────────────────────

/// Background task: sleep, attempt, repeat until connected or the budget
/// runs out. Exhaustion is terminal for this cycle; the next poll tick,
/// event or manual refresh starts a fresh one.
async fn reconnect_loop(
    supervisor: ConnectionSupervisor,
    cancel: CancellationToken,
) -> ReconnectOutcome {
    let inner = &supervisor.inner;
    let address = inner.address.load_full();
    let mut budget = RetryBudget::new(inner.retry);

    info!(
        address = %address,
        max_attempts = budget.max_attempts,
        backoff_ms = u64::try_from(budget.backoff.as_millis()).unwrap_or(u64::MAX),
        "starting reconnect loop"
    );

    while let Some(attempt) = budget.next_attempt() {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            () = tokio::time::sleep(budget.backoff) => {}
        }

        let transition = tokio::select! {
            biased;
            () = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            guard = inner.transition.lock() => guard,
        };
        supervisor.set_state(ConnectionState::Reconnecting { attempt });

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            result = supervisor.attempt_connect(&address) => result,
        };

        // A handshake that lands after the wait still counts.
        if result.is_ok() || inner.link.is_connected() {
            supervisor.set_state(ConnectionState::Connected);
            info!(attempt, "reconnected to switcher");
            // Coordinator may already be gone during shutdown.
            let _ = inner.refresh_tx.send(RefreshTrigger::Reconnected);
            return ReconnectOutcome::Reconnected { attempts: attempt };
        }

        supervisor.set_state(ConnectionState::Disconnected);
        drop(transition);
        if let Err(reason) = result {
            warn!(
                attempt,
                max_attempts = budget.max_attempts,
                %reason,
                "reconnect attempt failed"
            );
        }
    }

    let _transition = tokio::select! {
        biased;
        () = cancel.cancelled() => return ReconnectOutcome::Cancelled,
        guard = inner.transition.lock() => guard,
    };

    if inner.link.is_connected() {
        supervisor.set_state(ConnectionState::Connected);
        info!(attempts = budget.attempts_made, "switcher came up after last attempt");
        let _ = inner.refresh_tx.send(RefreshTrigger::Reconnected);
        return ReconnectOutcome::Reconnected {
            attempts: budget.attempts_made,
        };
    }

    error!(
        address = %address,
        attempts = budget.attempts_made,
        "failed to reconnect to switcher after multiple attempts"
    );

    // Drop any half-open session so the next cycle starts clean.
    let link = Arc::clone(&inner.link);
    let _ = tokio::task::spawn_blocking(move || link.disconnect()).await;
    supervisor.set_state(ConnectionState::Disconnected);

    ReconnectOutcome::Exhausted {
        attempts: budget.attempts_made,
    }
}

// ── Setup probe ──────────────────────────────────────────────────────

/// Check that `address` answers before accepting it as configuration.
///
/// Opens a throwaway session, waits up to `timeout` for the handshake,
/// reads the model name and always closes the session again.
pub async fn probe(
    link: Arc<dyn DeviceLink>,
    address: &str,
    timeout: Duration,
) -> Result<ProbeReport, CoreError> {
    info!(address, "probing switcher");

    let target = address.to_owned();
    let worker = tokio::task::spawn_blocking(move || {
        let outcome = link
            .connect(&target)
            .map(|connected| connected || link.wait_for_connection(timeout))
            .map(|up| up.then(|| link.model_name().ok()));

        if link.is_connected() {
            link.disconnect();
            debug!(address = %target, "closed probe session");
        }
        outcome
    });

    let unreachable = |reason: String| CoreError::SetupUnreachable {
        address: address.to_owned(),
        reason,
    };

    match tokio::time::timeout(timeout + CONNECT_GRACE, worker).await {
        Ok(Ok(Ok(Some(model)))) => {
            info!(address, model = model.as_deref().unwrap_or("unknown"), "switcher reachable");
            Ok(ProbeReport {
                address: address.to_owned(),
                model,
            })
        }
        Ok(Ok(Ok(None))) | Err(_) => Err(unreachable(format!(
            "no handshake within {:.1}s",
            timeout.as_secs_f64()
        ))),
        Ok(Ok(Err(e))) => Err(unreachable(e.message)),
        Ok(Err(e)) => Err(unreachable(format!("probe worker failed: {e}"))),
    }
}

/// [`probe`] using the address and probe timeout from `config`.
pub async fn probe_config(
    link: Arc<dyn DeviceLink>,
    config: &SyncConfig,
) -> Result<ProbeReport, CoreError> {
    config.validate()?;
    probe(link, config.address.trim(), config.probe_timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_attempts() {
        let mut budget = RetryBudget::new(RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        });

        assert_eq!(budget.next_attempt(), Some(1));
        assert_eq!(budget.next_attempt(), Some(2));
        assert!(!budget.is_exhausted());
        assert_eq!(budget.next_attempt(), Some(3));
        assert!(budget.is_exhausted());
        assert_eq!(budget.next_attempt(), None);
        assert_eq!(budget.attempts_made, 3);
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.to_string(),
            "Reconnecting (attempt 2)"
        );
    }
}

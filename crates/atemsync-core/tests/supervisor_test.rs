// Integration tests for the connection supervisor and setup probe.

mod common;

use std::time::{Duration, Instant};

use atemsync_core::{ConnectionState, CoreError, SyncCoordinator, probe, probe_config};

use common::{ADDRESS, FakeSwitcher, MODEL, init_test_logging, test_config};

// ── Probe ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_probe_reads_model_and_closes_session() {
    init_test_logging();
    let fake = FakeSwitcher::new();

    let report = probe(fake.as_link(), ADDRESS, Duration::from_millis(100))
        .await
        .unwrap();

    assert_eq!(report.address, ADDRESS);
    assert_eq!(report.model.as_deref(), Some(MODEL));
    assert_eq!(fake.disconnect_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_probe_tolerates_missing_model() {
    let fake = FakeSwitcher::new();
    fake.set_model(None);

    let report = probe(fake.as_link(), ADDRESS, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(report.model, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_probe_unreachable_within_bound() {
    init_test_logging();
    let fake = FakeSwitcher::unreachable();

    let started = Instant::now();
    let err = probe(fake.as_link(), ADDRESS, Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::SetupUnreachable { ref address, .. } if address == ADDRESS));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(fake.disconnect_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_probe_config_uses_configured_timeout() {
    init_test_logging();
    let mut config = test_config();
    config.probe_timeout = Duration::from_millis(300);

    let report = probe_config(FakeSwitcher::new().as_link(), &config)
        .await
        .unwrap();
    assert_eq!(report.model.as_deref(), Some(MODEL));

    let started = Instant::now();
    let err = probe_config(FakeSwitcher::unreachable().as_link(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SetupUnreachable { .. }));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_probe_config_rejects_invalid_config() {
    let fake = FakeSwitcher::new();
    let mut config = test_config();
    config.address = "  ".into();

    assert!(probe_config(fake.as_link(), &config).await.is_err());
    assert_eq!(fake.connect_count(), 0);
}

// ── Supervisor ──────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_walks_through_states() {
    init_test_logging();
    let fake = FakeSwitcher::new();
    let coordinator = SyncCoordinator::new(fake.as_link(), test_config());
    let supervisor = coordinator.supervisor().clone();
    let mut states = supervisor.state();

    assert_eq!(supervisor.current_state(), ConnectionState::Disconnected);
    let state = supervisor.connect(ADDRESS).await.unwrap();

    assert_eq!(state, ConnectionState::Connected);
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_is_idempotent() {
    let fake = FakeSwitcher::new();
    let coordinator = SyncCoordinator::new(fake.as_link(), test_config());
    let supervisor = coordinator.supervisor().clone();

    supervisor.disconnect().await;
    supervisor.connect(ADDRESS).await.unwrap();
    supervisor.disconnect().await;
    supervisor.disconnect().await;

    assert_eq!(supervisor.current_state(), ConnectionState::Disconnected);
    assert!(!supervisor.reconnect_in_flight().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ensure_connected_launches_single_loop() {
    init_test_logging();
    let fake = FakeSwitcher::new();
    let mut config = test_config();
    config.retry.backoff = Duration::from_millis(500);
    let coordinator = SyncCoordinator::new(fake.as_link(), config);
    let supervisor = coordinator.supervisor().clone();

    supervisor.connect(ADDRESS).await.unwrap();
    assert!(supervisor.ensure_connected().await);
    assert_eq!(supervisor.reconnect_launches(), 0);

    fake.drop_connection();
    assert!(!supervisor.ensure_connected().await);
    assert!(!supervisor.ensure_connected().await);
    assert!(!supervisor.launch_reconnect().await);

    assert_eq!(supervisor.current_state(), ConnectionState::Disconnected);
    assert_eq!(supervisor.reconnect_launches(), 1);

    supervisor.cancel_reconnect().await;
    assert!(!supervisor.reconnect_in_flight().await);
    assert_eq!(fake.connect_count(), 1, "cancelled during backoff");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_reports_attempt_number() {
    init_test_logging();
    let fake = FakeSwitcher::new();
    let coordinator = SyncCoordinator::new(fake.as_link(), test_config());
    let supervisor = coordinator.supervisor().clone();
    supervisor.connect(ADDRESS).await.unwrap();

    let mut states = supervisor.state();
    fake.drop_connection();
    supervisor.ensure_connected().await;

    let seen = tokio::time::timeout(
        Duration::from_secs(2),
        states.wait_for(|state| matches!(state, ConnectionState::Reconnecting { .. })),
    )
    .await
    .expect("reconnecting within deadline")
    .map(|state| *state)
    .unwrap();

    assert_eq!(seen, ConnectionState::Reconnecting { attempt: 1 });
    supervisor.cancel_reconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_handshake_keeps_session() {
    init_test_logging();
    let fake = FakeSwitcher::new();
    let coordinator = SyncCoordinator::new(fake.as_link(), test_config());
    let supervisor = coordinator.supervisor().clone();
    supervisor.connect(ADDRESS).await.unwrap();

    fake.drop_connection();
    fake.late_handshake(true);
    assert!(!supervisor.ensure_connected().await);
    fake.set_reachable(true);

    let mut states = supervisor.state();
    tokio::time::timeout(
        Duration::from_secs(2),
        states.wait_for(|state| *state == ConnectionState::Connected),
    )
    .await
    .expect("connected within deadline")
    .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while supervisor.reconnect_in_flight().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reconnect loop ends");

    assert_eq!(supervisor.current_state(), ConnectionState::Connected);
    assert_eq!(fake.disconnect_count(), 0, "late session kept open");
    assert_eq!(supervisor.reconnect_launches(), 1);
}

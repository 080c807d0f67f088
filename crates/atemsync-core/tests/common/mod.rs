// Shared fixtures for atemsync-core integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

use atemsync_core::{
    DeviceEvent, DeviceLink, EventCallback, LinkError, RetryPolicy, Snapshot, SnapshotStream,
    SyncConfig,
};

pub const ADDRESS: &str = "10.1.2.3";
pub const MODEL: &str = "ATEM Mini Extreme ISO";

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log lines captured by [`capture_logs`].
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route this thread's events into a buffer until the guard drops.
/// Pair with a current-thread runtime so every task logs here.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}

/// Short real-time timings so a full reconnect cycle fits in a test.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        address: ADDRESS.into(),
        poll_interval: Duration::ZERO,
        connect_timeout: Duration::from_millis(100),
        probe_timeout: Duration::from_millis(100),
        settle_delay: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        },
    }
}

/// Wait for the next publish, failing the test after `within`.
pub async fn next_snapshot(stream: &mut SnapshotStream, within: Duration) -> Arc<Snapshot> {
    tokio::time::timeout(within, stream.changed())
        .await
        .expect("snapshot within deadline")
        .expect("coordinator alive")
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ── FakeSwitcher ────────────────────────────────────────────────────

/// Scriptable in-memory switcher.
///
/// `reachable` decides whether `connect` brings the session up. Reads
/// return the scripted values or fail when the matching `fail_*` flag is
/// set. Control calls are recorded in `controls`.
pub struct FakeSwitcher {
    reachable: AtomicBool,
    connected: AtomicBool,
    program: AtomicU32,
    preview: AtomicU32,
    model: Mutex<Option<String>>,
    fail_program: AtomicBool,
    fail_preview: AtomicBool,
    reject_controls: AtomicBool,
    late_handshake: AtomicBool,
    callback: Mutex<Option<EventCallback>>,
    connect_attempts: Mutex<Vec<Instant>>,
    disconnects: AtomicU32,
    registrations: AtomicU32,
    controls: Mutex<Vec<String>>,
}

impl FakeSwitcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            program: AtomicU32::new(1),
            preview: AtomicU32::new(2001),
            model: Mutex::new(Some(MODEL.to_owned())),
            fail_program: AtomicBool::new(false),
            fail_preview: AtomicBool::new(false),
            reject_controls: AtomicBool::new(false),
            late_handshake: AtomicBool::new(false),
            callback: Mutex::new(None),
            connect_attempts: Mutex::new(Vec::new()),
            disconnects: AtomicU32::new(0),
            registrations: AtomicU32::new(0),
            controls: Mutex::new(Vec::new()),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        let fake = Self::new();
        fake.set_reachable(false);
        fake
    }

    pub fn as_link(self: &Arc<Self>) -> Arc<dyn DeviceLink> {
        Arc::clone(self) as Arc<dyn DeviceLink>
    }

    // ── Scripting ───────────────────────────────────────────────────

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Session drops and the device stops answering.
    pub fn drop_connection(&self) {
        self.set_reachable(false);
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn set_program(&self, id: u16) {
        self.program.store(u32::from(id), Ordering::SeqCst);
    }

    pub fn set_preview(&self, id: u16) {
        self.preview.store(u32::from(id), Ordering::SeqCst);
    }

    pub fn set_model(&self, model: Option<&str>) {
        *self.model.lock().unwrap() = model.map(str::to_owned);
    }

    pub fn fail_program(&self, fail: bool) {
        self.fail_program.store(fail, Ordering::SeqCst);
    }

    pub fn reject_controls(&self, reject: bool) {
        self.reject_controls.store(reject, Ordering::SeqCst);
    }

    /// Handshake completes only after `wait_for_connection` has given up.
    pub fn late_handshake(&self, late: bool) {
        self.late_handshake.store(late, Ordering::SeqCst);
    }

    /// Deliver `event` from a foreign thread, as the device library does.
    pub fn emit(&self, event: DeviceEvent) {
        let callback = self.callback.lock().unwrap().clone();
        let Some(callback) = callback else {
            panic!("no event callback registered");
        };
        std::thread::spawn(move || callback(event))
            .join()
            .unwrap();
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.connect_attempts.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connect_attempts.lock().unwrap().len()
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn registration_count(&self) -> u32 {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn controls(&self) -> Vec<String> {
        self.controls.lock().unwrap().clone()
    }

    fn control(&self, call: String) -> Result<(), LinkError> {
        if self.reject_controls.load(Ordering::SeqCst) {
            return Err(LinkError::new("command rejected"));
        }
        self.controls.lock().unwrap().push(call);
        Ok(())
    }
}

impl DeviceLink for FakeSwitcher {
    fn connect(&self, _address: &str) -> Result<bool, LinkError> {
        self.connect_attempts.lock().unwrap().push(Instant::now());
        if self.late_handshake.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Ok(false);
        }
        let up = self.reachable.load(Ordering::SeqCst);
        self.connected.store(up, Ordering::SeqCst);
        Ok(up)
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn wait_for_connection(&self, timeout: Duration) -> bool {
        if self.is_connected() {
            return true;
        }
        std::thread::sleep(timeout);
        if self.late_handshake.load(Ordering::SeqCst) {
            let up = self.reachable.load(Ordering::SeqCst);
            self.connected.store(up, Ordering::SeqCst);
            return false;
        }
        self.is_connected()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn register_event(&self, callback: EventCallback) -> Result<(), LinkError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock().unwrap() = Some(callback);
        Ok(())
    }

    fn program_input(&self) -> Result<u16, LinkError> {
        if self.fail_program.load(Ordering::SeqCst) {
            return Err(LinkError::new("program read timed out"));
        }
        Ok(u16::try_from(self.program.load(Ordering::SeqCst)).unwrap())
    }

    fn preview_input(&self) -> Result<u16, LinkError> {
        if self.fail_preview.load(Ordering::SeqCst) {
            return Err(LinkError::new("preview read timed out"));
        }
        Ok(u16::try_from(self.preview.load(Ordering::SeqCst)).unwrap())
    }

    fn model_name(&self) -> Result<String, LinkError> {
        self.model
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LinkError::new("model not reported"))
    }

    fn cut(&self) -> Result<(), LinkError> {
        self.control("cut".into())
    }

    fn auto_transition(&self) -> Result<(), LinkError> {
        self.control("auto".into())
    }

    fn set_program_input(&self, input: u16) -> Result<(), LinkError> {
        self.control(format!("program={input}"))
    }

    fn set_preview_input(&self, input: u16) -> Result<(), LinkError> {
        self.control(format!("preview={input}"))
    }
}

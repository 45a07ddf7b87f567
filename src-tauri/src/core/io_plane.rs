//! C3 — the I/O plane.
//!
//! One reader thread per active PTY drains its master endpoint and publishes
//! Output/Exit events, tagged by session id, onto a single event bus. See
//! SPEC_FULL.md §4.3.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::core::pty_pool::{wait_for_child_exit, PtyHandle};
use crate::events::{
    SessionExitEvent, SessionOutputEvent, SESSION_EXIT_EVENT, SESSION_OUTPUT_EVENT,
};

/// Where reader threads publish events. In the running application this is
/// `tauri::AppHandle::emit`; tests use a plain channel so the plane can be
/// exercised without a Tauri runtime.
pub trait EventSink: Send + Sync + 'static {
    fn output(&self, event: SessionOutputEvent);
    fn exit(&self, event: SessionExitEvent);
}

/// The production sink: publishes onto the Tauri event bus so the frontend's
/// `listen("session.output", ...)` / `listen("session.exit", ...)` see them.
pub struct TauriEventSink {
    app: tauri::AppHandle,
}

impl TauriEventSink {
    pub fn new(app: tauri::AppHandle) -> Self {
        Self { app }
    }
}

impl EventSink for TauriEventSink {
    fn output(&self, event: SessionOutputEvent) {
        use tauri::Emitter;
        if let Err(err) = self.app.emit(SESSION_OUTPUT_EVENT, &event) {
            eprintln!("emit {SESSION_OUTPUT_EVENT} failed: {err}");
        }
    }

    fn exit(&self, event: SessionExitEvent) {
        use tauri::Emitter;
        if let Err(err) = self.app.emit(SESSION_EXIT_EVENT, &event) {
            eprintln!("emit {SESSION_EXIT_EVENT} failed: {err}");
        }
    }
}

/// One entry per session whose reader task is currently running.
pub struct ReaderHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Detach the reader: stop publishing further events for this session
    /// and drop the thread join handle without blocking on it. Any bytes
    /// already read but not yet delivered are discarded — the caller (a
    /// session destroy) has indicated it no longer cares.
    pub fn detach(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join = None;
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Spawns the reader task for `session_id` against `handle`'s master
/// endpoint. The task reads until EOF/zero-byte/error, publishing an Output
/// Event per successful read, then waits for the child to be reaped and
/// publishes exactly one Exit Event.
///
/// Shares the child process handle (via [`PtyHandle::clone_child`]) so the
/// reader task can reap it itself; `handle`'s master/writer stay with the
/// session table for writes and resizes, and the child handle stays with
/// `handle` too — a recycled PTY keeps the same long-lived child, so the
/// next session that claims it can spawn its own reader against it.
pub fn spawn_reader<S: EventSink>(
    session_id: usize,
    handle: &mut PtyHandle,
    sink: Arc<S>,
) -> std::io::Result<ReaderHandle> {
    let mut reader = handle
        .clone_reader()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let child = handle.clone_child().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "PTY has no child process attached")
    })?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_thread = stop.clone();

    let join = thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            if stop_for_thread.load(Ordering::SeqCst) {
                return;
            }

            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if stop_for_thread.load(Ordering::SeqCst) {
                        return;
                    }
                    sink.output(SessionOutputEvent {
                        session_id,
                        data_b64: BASE64.encode(&buf[..n]),
                    });
                }
                Err(_) => break,
            }
        }

        if stop_for_thread.load(Ordering::SeqCst) {
            return;
        }

        let exit_code = wait_for_child_exit(child);
        sink.exit(SessionExitEvent {
            session_id,
            exit_code,
        });
    });

    Ok(ReaderHandle {
        stop,
        join: Some(join),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pty_pool::{spawn_pty, PoolConfig, ProcessPool, ReleaseMode, SharedProcessPool};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingSink {
        outputs: Mutex<Vec<SessionOutputEvent>>,
        exits: Mutex<Vec<SessionExitEvent>>,
    }

    impl EventSink for RecordingSink {
        fn output(&self, event: SessionOutputEvent) {
            self.outputs.lock().unwrap().push(event);
        }
        fn exit(&self, event: SessionExitEvent) {
            self.exits.lock().unwrap().push(event);
        }
    }

    #[test]
    fn echo_roundtrip_emits_output_then_exit() {
        let cfg = PoolConfig::default();
        let mut handle = spawn_pty(&cfg, None, None, &[]).expect("spawn shell");
        handle.write_str("echo HELLO_IO_PLANE\r\n").unwrap();
        handle.write_str("exit\r\n").unwrap();

        let sink = Arc::new(RecordingSink::default());
        let reader = spawn_reader(1, &mut handle, sink.clone()).expect("spawn_reader");

        // Give the shell time to echo and exit.
        thread::sleep(Duration::from_millis(800));
        reader.detach();

        let concatenated: String = sink
            .outputs
            .lock()
            .unwrap()
            .iter()
            .map(|e| String::from_utf8(BASE64.decode(&e.data_b64).unwrap()).unwrap())
            .collect();
        assert!(
            concatenated.contains("HELLO_IO_PLANE"),
            "expected echo output, got: {concatenated:?}"
        );
    }

    /// Regression test: a handle recycled after a clean destroy must still
    /// be able to host a working reader for the next session that claims
    /// it. Previously `spawn_reader` permanently took the child out of the
    /// handle, so the second `spawn_reader` against the recycled handle
    /// failed and the reused session emitted no output/exit events at all.
    #[test]
    fn spawn_reader_works_again_after_recycle() {
        let cfg = PoolConfig {
            initial_pool_size: 0,
            max_pool_size: 1,
            recycle_enabled: true,
            warmup_timeout: Duration::from_secs(5),
            recycle_ready_timeout: Duration::from_secs(5),
            ..PoolConfig::default()
        };
        let pool: SharedProcessPool = Arc::new(Mutex::new(ProcessPool::new(cfg)));

        let mut handle1 = ProcessPool::claim(pool.clone()).expect("first claim");
        let sink = Arc::new(RecordingSink::default());
        let reader1 = spawn_reader(1, &mut handle1, sink.clone()).expect("first spawn_reader");
        reader1.detach();
        ProcessPool::release(pool.clone(), handle1, ReleaseMode::Clean);

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if pool.lock().unwrap().stats().idle == 1 {
                break;
            }
            assert!(Instant::now() < deadline, "handle was not recycled back to idle");
            thread::sleep(Duration::from_millis(50));
        }

        let mut handle2 = ProcessPool::claim(pool.clone()).expect("second claim reuses recycled handle");
        let reader2 = spawn_reader(2, &mut handle2, sink.clone())
            .expect("spawn_reader must still succeed on a recycled handle");

        handle2.write_str("echo HELLO_AFTER_RECYCLE\r\n").unwrap();
        thread::sleep(Duration::from_millis(800));
        reader2.detach();

        let concatenated: String = sink
            .outputs
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.session_id == 2)
            .map(|e| String::from_utf8(BASE64.decode(&e.data_b64).unwrap()).unwrap())
            .collect();
        assert!(
            concatenated.contains("HELLO_AFTER_RECYCLE"),
            "expected echo output on the reused session, got: {concatenated:?}"
        );
    }
}

//! C1 — the PTY pool.
//!
//! Spawns, warms, holds, recycles, and retires pseudo-terminal-backed child
//! processes on demand. See SPEC_FULL.md §4.1.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub initial_pool_size: usize, // default: 2, range 0-12
    pub max_pool_size: usize,     // default: 4, range 1-64
    pub max_active: usize,        // default: 12, range 1-64
    pub recycle_enabled: bool,    // default: true
    pub max_pty_age: Duration,    // default: 30 minutes

    pub warmup_delay: Duration,             // default: 100ms between spawns
    pub warmup_timeout: Duration,           // default: 5s
    pub recycle_ready_timeout: Duration,    // default: 2s
    pub refill_after_claim_delay: Duration, // default: 100ms

    // Mechanism, not policy — fixed defaults, not part of the tunable range.
    pub spawn_shell_login_arg: Option<String>,
    pub default_shell: String,
    pub default_pty_size: PtySize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let default_shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
        Self {
            initial_pool_size: 2,
            max_pool_size: 4,
            max_active: 12,
            recycle_enabled: true,
            max_pty_age: Duration::from_secs(30 * 60),
            warmup_delay: Duration::from_millis(100),
            warmup_timeout: Duration::from_secs(5),
            recycle_ready_timeout: Duration::from_secs(2),
            refill_after_claim_delay: Duration::from_millis(100),
            spawn_shell_login_arg: Some("--login".to_string()),
            default_shell,
            default_pty_size: PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            },
        }
    }
}

impl PoolConfig {
    /// Clamp user-supplied values into the ranges the Pool Configuration
    /// entity documents, rather than rejecting the whole config.
    pub fn clamped(mut self) -> Self {
        self.initial_pool_size = self.initial_pool_size.min(12);
        self.max_pool_size = self.max_pool_size.clamp(1, 64);
        self.max_active = self.max_active.clamp(1, 64);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub active: usize,
    pub spawning_idle: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtyState {
    Warming,
    Idle,
    Active,
    Recycling,
    Dead,
}

/// How a handle is being returned to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Normal session teardown: eligible for recycling.
    Clean,
    /// A faulty shell state (failed mid-`create`, or caller otherwise knows
    /// the PTY is in an unknown state). Always killed, never recycled.
    Dirty,
}

pub struct PtyHandle {
    pub pid: Option<u32>,
    pub shell: String,
    pub created_at: Instant,
    pub state: PtyState,

    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    // Shared with the I/O plane's reader task (see `clone_child`) so a
    // recycled handle reused by a later session still has a child to wait
    // on — the underlying shell process outlives any single session's
    // reader task.
    child: Option<Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>>>,
}

impl PtyHandle {
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn kill(&mut self) {
        self.terminate(Duration::from_secs(3));
        self.state = PtyState::Dead;
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_all(s.as_bytes())
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })?;
        Ok(())
    }

    pub fn clone_reader(&self) -> Result<Box<dyn Read + Send>> {
        self.master.try_clone_reader().context("try_clone_reader")
    }

    /// Hands the I/O plane's reader task a shared handle to the child
    /// process, which it reaps and reads the exit code from after observing
    /// EOF on the master. The child is *shared*, not moved: recycling
    /// returns this same `PtyHandle` to the idle pool with the same child
    /// still attached, so the next session to claim it can spawn its own
    /// reader against the same long-lived process.
    pub fn clone_child(&self) -> Option<Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>>> {
        self.child.clone()
    }

    /// Poll the master endpoint for output matching `marker`, up to `timeout`.
    /// Returns everything captured up to and including the marker.
    fn wait_for_marker(&mut self, marker: &str, timeout: Duration) -> Result<String> {
        wait_for_predicate(&*self.master, timeout, |captured| {
            captured.contains(marker)
        })
    }

    /// Same, but also accepts a prompt-looking tail as a secondary signal —
    /// used only for warm-up/recycle readiness, never for ad hoc markers.
    fn wait_for_ready(&mut self, marker: &str, timeout: Duration) -> Result<String> {
        wait_for_predicate(&*self.master, timeout, |captured| {
            captured.contains(marker) || tail_looks_like_prompt(captured)
        })
    }

    fn send_ready_marker(&mut self, token: &str) -> Result<String> {
        // %s keeps the literal "__SYNK_READY__:<token>" out of the echoed input.
        let cmd = format!("printf \"__SYNK_READY__:%s\\\\n\" \"{token}\"\r\n");
        self.write_str(&cmd)?;
        Ok(format!("__SYNK_READY__:{token}"))
    }

    fn warm_to_idle(&mut self, token: &str, timeout: Duration) -> Result<()> {
        self.state = PtyState::Warming;
        let marker = self.send_ready_marker(token)?;
        self.wait_for_ready(&marker, timeout)?;
        self.state = PtyState::Idle;
        Ok(())
    }

    fn recycle_to_idle(&mut self, token: &str, timeout: Duration) -> Result<()> {
        self.state = PtyState::Recycling;
        let _ = self.write_all(b"\x03"); // interrupt
        let _ = self.write_str("cd ~\r\nclear\r\nreset\r\n");

        let marker = self.send_ready_marker(token)?;
        self.wait_for_ready(&marker, timeout)?;
        self.state = PtyState::Idle;
        Ok(())
    }

    pub fn debug_roundtrip_echo(&mut self, timeout: Duration) -> Result<String> {
        let token = unique_token("echo");
        let marker = format!("__SYNK_ECHO__:{token}");
        self.write_str(&format!("echo {marker}\r\n"))?;
        self.wait_for_marker(&marker, timeout)
    }

    fn terminate(&mut self, grace: Duration) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }

        let Some(child) = self.child.clone() else {
            // No child was ever attached (shouldn't happen for a spawned
            // handle). Give the grace window and escalate blind.
            thread::sleep(grace);
            #[cfg(unix)]
            if let Some(pid) = self.pid {
                unsafe {
                    libc::kill(pid as i32, libc::SIGKILL);
                }
            }
            return;
        };

        let start = Instant::now();
        while start.elapsed() < grace {
            let result = child.lock().expect("child mutex poisoned").try_wait();
            match result {
                Ok(Some(_)) => return,
                Ok(None) => {}
                Err(_) => break,
            }
            thread::sleep(Duration::from_millis(50));
        }

        #[cfg(unix)]
        if let Some(pid) = self.pid {
            unsafe {
                libc::kill(pid as i32, libc::SIGKILL);
            }
        }

        let _ = child.lock().expect("child mutex poisoned").kill();

        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(500) {
            let result = child.lock().expect("child mutex poisoned").try_wait();
            if matches!(result, Ok(Some(_))) {
                return;
            }
            thread::sleep(Duration::from_millis(25));
        }
    }
}

/// Blocks until `child` exits and translates the result into an exit code.
/// Used by the I/O plane's reader task after it observes EOF on the master,
/// against the shared handle obtained via [`PtyHandle::clone_child`].
pub fn wait_for_child_exit(child: Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>>) -> i32 {
    match child.lock().expect("child mutex poisoned").wait() {
        Ok(status) => {
            if status.success() {
                0
            } else {
                1
            }
        }
        Err(_) => 1,
    }
}

#[cfg(unix)]
fn wait_for_predicate(
    master: &(dyn MasterPty + Send),
    timeout: Duration,
    mut done: impl FnMut(&str) -> bool,
) -> Result<String> {
    let fd = master
        .as_raw_fd()
        .ok_or_else(|| anyhow!("MasterPty::as_raw_fd() not available"))?;

    let mut reader = master.try_clone_reader().context("try_clone_reader")?;

    let start = Instant::now();
    let mut captured = String::new();

    while start.elapsed() < timeout {
        let remaining = timeout.saturating_sub(start.elapsed());
        let timeout_ms: i32 = remaining
            .as_millis()
            .min(i32::MAX as u128)
            .try_into()
            .unwrap_or(i32::MAX);

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        let rc = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms) };
        if rc < 0 {
            return Err(anyhow!(std::io::Error::last_os_error())).context("poll(master_fd)");
        }
        if rc == 0 || (pfd.revents & libc::POLLIN) == 0 {
            continue;
        }

        let mut buf = [0u8; 4096];
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        captured.push_str(&String::from_utf8_lossy(&buf[..n]));

        const CAPTURE_MAX: usize = 1024 * 1024;
        if captured.len() > CAPTURE_MAX {
            captured.drain(..captured.len().saturating_sub(CAPTURE_MAX));
        }

        if done(&captured) {
            return Ok(captured);
        }
    }

    Err(anyhow!("timeout waiting for readiness"))
        .with_context(|| format!("timeout={timeout:?}"))
}

#[cfg(not(unix))]
fn wait_for_predicate(
    _master: &(dyn MasterPty + Send),
    _timeout: Duration,
    _done: impl FnMut(&str) -> bool,
) -> Result<String> {
    Err(anyhow!(
        "PTY readiness polling is only implemented for unix targets"
    ))
}

pub struct ProcessPool {
    idle_pool: VecDeque<PtyHandle>,
    active_count: usize,
    config: PoolConfig,
    spawning_idle: usize,
}

pub type SharedProcessPool = Arc<Mutex<ProcessPool>>;

impl ProcessPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            idle_pool: VecDeque::new(),
            active_count: 0,
            config: config.clamped(),
            spawning_idle: 0,
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle_pool.len(),
            active: self.active_count,
            spawning_idle: self.spawning_idle,
        }
    }

    pub fn reconfigure(pool: SharedProcessPool, config: PoolConfig) {
        let mut guard = pool.lock().expect("pool mutex poisoned");
        guard.config = config.clamped();
    }

    /// Spawns `initial_pool_size` warm handles, staggered by `warmup_delay`.
    /// Returns once every staggered spawn has been *launched* — not once
    /// every handle has reached `Idle`.
    pub fn initialize(pool: SharedProcessPool) -> Result<(), CoreError> {
        let (config, target) = {
            let guard = pool.lock().expect("pool mutex poisoned");
            (guard.config.clone(), guard.config.initial_pool_size)
        };

        if target == 0 {
            return Ok(());
        }

        // The first spawn happens synchronously so a hard-broken environment
        // (no PTY support, missing shell) surfaces as InitializationFailed
        // instead of silently warming up nothing.
        let first = spawn_shell_pty(&config).and_then(|mut h| {
            let token = unique_token("warm0");
            h.warm_to_idle(&token, config.warmup_timeout)?;
            Ok(h)
        });

        let first = match first {
            Ok(h) => h,
            Err(err) => {
                return Err(CoreError::InitializationFailed(format!("{err:#}")));
            }
        };

        {
            let mut guard = pool.lock().expect("pool mutex poisoned");
            guard.idle_pool.push_back(first);
        }

        if target > 1 {
            let remaining = target - 1;
            thread::spawn(move || {
                for i in 1..=remaining {
                    thread::sleep(config.warmup_delay);
                    match spawn_shell_pty(&config).and_then(|mut h| {
                        let token = unique_token(&format!("warm{i}"));
                        h.warm_to_idle(&token, config.warmup_timeout)?;
                        Ok(h)
                    }) {
                        Ok(handle) => {
                            let mut guard = pool.lock().expect("pool mutex poisoned");
                            if guard.idle_pool.len() < guard.config.max_pool_size {
                                guard.idle_pool.push_back(handle);
                            } else {
                                drop(guard);
                                let mut h = handle;
                                h.kill();
                            }
                        }
                        Err(err) => {
                            eprintln!("pty_pool warmup spawn {i}/{target} failed: {err:#}");
                        }
                    }
                }
            });
        }

        Ok(())
    }

    /// Selects the oldest `Idle` handle and marks it `Active`. Spawns
    /// on-demand if the pool is empty and the active ceiling allows it.
    pub fn claim(pool: SharedProcessPool) -> Result<PtyHandle, CoreError> {
        let claimed_from_idle: Option<PtyHandle> = {
            let mut guard = pool.lock().expect("pool mutex poisoned");

            if guard.active_count >= guard.config.max_active {
                return Err(CoreError::PoolExhausted(format!(
                    "max_active_sessions ({}) reached",
                    guard.config.max_active
                )));
            }

            let mut claimed = None;
            while let Some(mut h) = guard.idle_pool.pop_front() {
                if h.age() > guard.config.max_pty_age {
                    h.kill();
                    continue;
                }
                h.state = PtyState::Active;
                claimed = Some(h);
                break;
            }
            if claimed.is_some() {
                guard.active_count += 1;
            }
            claimed
        };

        let handle = if let Some(h) = claimed_from_idle {
            h
        } else {
            let (config, active_count, max_active) = {
                let guard = pool.lock().expect("pool mutex poisoned");
                (
                    guard.config.clone(),
                    guard.active_count,
                    guard.config.max_active,
                )
            };
            if active_count >= max_active {
                return Err(CoreError::PoolExhausted(format!(
                    "max_active_sessions ({max_active}) reached"
                )));
            }

            let spawned = spawn_shell_pty(&config).and_then(|mut h| {
                let token = unique_token("ondemand");
                h.warm_to_idle(&token, config.warmup_timeout)?;
                Ok(h)
            });

            let mut h = match spawned {
                Ok(h) => h,
                Err(err) => return Err(CoreError::SpawnFailed(format!("{err:#}"))),
            };
            h.state = PtyState::Active;

            let mut guard = pool.lock().expect("pool mutex poisoned");
            guard.active_count += 1;
            h
        };

        schedule_refill_if_needed(pool);
        Ok(handle)
    }

    pub fn release(pool: SharedProcessPool, handle: PtyHandle, mode: ReleaseMode) {
        let config = {
            let mut guard = pool.lock().expect("pool mutex poisoned");
            guard.active_count = guard.active_count.saturating_sub(1);
            guard.config.clone()
        };

        let mut handle = handle;

        // An age-expired handle is always retired, never recycled, regardless
        // of recycle_enabled.
        let should_recycle =
            mode == ReleaseMode::Clean && config.recycle_enabled && handle.age() < config.max_pty_age;

        if should_recycle {
            let token = unique_token("recycle");
            if handle
                .recycle_to_idle(&token, config.recycle_ready_timeout)
                .is_ok()
            {
                let mut guard = pool.lock().expect("pool mutex poisoned");
                if guard.idle_pool.len() < guard.config.max_pool_size {
                    guard.idle_pool.push_back(handle);
                } else {
                    drop(guard);
                    handle.kill();
                }
                schedule_refill_if_needed(pool);
                return;
            }
        }

        handle.kill();
        schedule_refill_if_needed(pool);
    }

    /// Terminate with SIGTERM, grace window, then SIGKILL; reap every child.
    /// Returns only after every child has been reaped.
    pub fn shutdown(pool: SharedProcessPool) {
        let idle = {
            let mut guard = pool.lock().expect("pool mutex poisoned");
            std::mem::take(&mut guard.idle_pool)
        };
        for mut h in idle {
            h.kill();
        }
    }

    pub fn debug_roundtrip(pool: SharedProcessPool) -> Result<String, CoreError> {
        let mut handle = Self::claim(pool.clone())?;
        let output = handle
            .debug_roundtrip_echo(Duration::from_secs(2))
            .map_err(|e| CoreError::IoError(format!("{e:#}")))?;
        Self::release(pool, handle, ReleaseMode::Clean);
        Ok(output)
    }
}

fn schedule_refill_if_needed(pool: SharedProcessPool) {
    let should_spawn = {
        let mut guard = pool.lock().expect("pool mutex poisoned");
        let cfg = &guard.config;
        let desired = cfg.initial_pool_size.min(cfg.max_pool_size);
        if guard.idle_pool.len() + guard.spawning_idle >= desired {
            return;
        }
        guard.spawning_idle += 1;
        true
    };

    if !should_spawn {
        return;
    }

    thread::spawn(move || {
        let cfg = { pool.lock().expect("pool mutex poisoned").config.clone() };
        thread::sleep(cfg.refill_after_claim_delay);

        let spawned = spawn_shell_pty(&cfg).and_then(|mut h| {
            let token = unique_token("refill");
            h.warm_to_idle(&token, cfg.warmup_timeout)?;
            Ok(h)
        });

        let mut guard = pool.lock().expect("pool mutex poisoned");
        guard.spawning_idle = guard.spawning_idle.saturating_sub(1);

        match spawned {
            Ok(h) => {
                let desired = guard.config.initial_pool_size.min(guard.config.max_pool_size);
                if guard.idle_pool.len() < desired {
                    guard.idle_pool.push_back(h);
                } else {
                    drop(guard);
                    let mut h = h;
                    h.kill();
                }
            }
            Err(err) => {
                eprintln!("pty_pool refill spawn failed: {err:#}");
            }
        }
    });
}

fn spawn_shell_pty(config: &PoolConfig) -> Result<PtyHandle> {
    spawn_pty(config, None, None, &[])
}

/// Spawns a PTY running either the login shell (`command = None`) or an
/// explicit command. Used by both pool warm-up and the session manager's
/// agent-launch step (which writes the command into an already-warm shell
/// instead of spawning it directly — see SessionManager::create).
pub fn spawn_pty(
    config: &PoolConfig,
    command: Option<&str>,
    cwd: Option<&std::path::Path>,
    env: &[(String, String)],
) -> Result<PtyHandle> {
    let pty_system = native_pty_system();
    let pair = pty_system.openpty(config.default_pty_size)?;

    let mut cmd = match command {
        Some(c) => CommandBuilder::new(c),
        None => {
            let mut c = CommandBuilder::new(&config.default_shell);
            if let Some(arg) = &config.spawn_shell_login_arg {
                c.arg(arg);
            }
            c
        }
    };
    cmd.env("TERM", "xterm-256color");
    if let Some(dir) = cwd {
        cmd.cwd(dir);
    }
    for (k, v) in env {
        cmd.env(k, v);
    }

    let child = pair.slave.spawn_command(cmd).context("spawn_command")?;
    drop(pair.slave);

    let writer = pair.master.take_writer().context("take_writer")?;
    let pid = child.process_id();

    Ok(PtyHandle {
        pid,
        shell: command.unwrap_or(&config.default_shell).to_string(),
        created_at: Instant::now(),
        state: PtyState::Warming,
        master: pair.master,
        writer,
        child: Some(Arc::new(Mutex::new(child))),
    })
}

fn unique_token(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos();
    format!("{prefix}-{nanos}")
}

fn tail_looks_like_prompt(captured: &str) -> bool {
    let clean = strip_ansi(captured);
    let clean_lines = clean.replace('\r', "\n");
    let tail = clean_lines.lines().last().unwrap_or("").trim_end_matches('\n');
    tail.ends_with("$ ") || tail.ends_with("# ") || tail.ends_with("% ") || tail.ends_with("> ")
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\x1b' {
            out.push(ch);
            continue;
        }

        if chars.peek() == Some(&'[') {
            let _ = chars.next();
            while let Some(c) = chars.next() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_ansi_removes_simple_csi() {
        let s = "hi\x1b[31mred\x1b[0m!";
        assert_eq!(strip_ansi(s), "hired!");
    }

    #[test]
    fn prompt_detection_matches_common_suffixes() {
        assert!(tail_looks_like_prompt("user@host:~$ "));
        assert!(tail_looks_like_prompt("root@host:~# "));
        assert!(tail_looks_like_prompt("zsh% "));
        assert!(tail_looks_like_prompt("PS> "));
        assert!(!tail_looks_like_prompt("not a prompt\nhello world\n"));
    }

    #[test]
    fn pool_config_clamps_out_of_range_values() {
        let cfg = PoolConfig {
            initial_pool_size: 999,
            max_pool_size: 0,
            max_active: 0,
            ..PoolConfig::default()
        }
        .clamped();
        assert_eq!(cfg.initial_pool_size, 12);
        assert_eq!(cfg.max_pool_size, 1);
        assert_eq!(cfg.max_active, 1);
    }

    #[test]
    fn warm_pool_starts_idle() {
        let cfg = PoolConfig {
            initial_pool_size: 2,
            max_pool_size: 4,
            warmup_timeout: Duration::from_secs(5),
            ..PoolConfig::default()
        };
        let pool: SharedProcessPool = Arc::new(Mutex::new(ProcessPool::new(cfg)));
        ProcessPool::initialize(pool.clone()).expect("initialize");

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let stats = pool.lock().unwrap().stats();
            if stats.idle == 2 {
                break;
            }
            assert!(Instant::now() < deadline, "pool never reached idle=2: {stats:?}");
            thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(pool.lock().unwrap().stats().active, 0);
    }

    #[test]
    fn claim_schedules_replenishment_back_to_idle_2() {
        let cfg = PoolConfig {
            initial_pool_size: 2,
            max_pool_size: 4,
            warmup_timeout: Duration::from_secs(5),
            refill_after_claim_delay: Duration::from_millis(10),
            ..PoolConfig::default()
        };
        let pool: SharedProcessPool = Arc::new(Mutex::new(ProcessPool::new(cfg.clone())));
        ProcessPool::initialize(pool.clone()).expect("initialize");

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.lock().unwrap().stats().idle < 2 {
            assert!(Instant::now() < deadline, "pool never warmed to idle=2");
            thread::sleep(Duration::from_millis(50));
        }

        let _claimed = ProcessPool::claim(pool.clone()).expect("claim");
        assert_eq!(pool.lock().unwrap().stats().active, 1);

        // Replenishment is scheduled asynchronously and never blocks the
        // claim above; give it up to 2x warmup_timeout to land back at idle=2.
        let deadline = Instant::now() + cfg.warmup_timeout * 2;
        loop {
            let stats = pool.lock().unwrap().stats();
            if stats.idle == 2 {
                break;
            }
            assert!(Instant::now() < deadline, "pool never replenished to idle=2: {stats:?}");
            thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(pool.lock().unwrap().stats().active, 1);
    }

    #[test]
    fn claim_then_release_recycles_by_default() {
        let cfg = PoolConfig {
            initial_pool_size: 1,
            max_pool_size: 1,
            ..PoolConfig::default()
        };
        let pool: SharedProcessPool = Arc::new(Mutex::new(ProcessPool::new(cfg)));
        ProcessPool::initialize(pool.clone()).expect("initialize");
        thread::sleep(Duration::from_millis(500));

        let handle = ProcessPool::claim(pool.clone()).expect("claim");
        assert_eq!(pool.lock().unwrap().stats().active, 1);

        ProcessPool::release(pool.clone(), handle, ReleaseMode::Clean);
        assert_eq!(pool.lock().unwrap().stats().active, 0);
    }

    #[test]
    fn max_active_ceiling_returns_pool_exhausted() {
        let cfg = PoolConfig {
            initial_pool_size: 0,
            max_pool_size: 1,
            max_active: 1,
            ..PoolConfig::default()
        };
        let pool: SharedProcessPool = Arc::new(Mutex::new(ProcessPool::new(cfg)));
        ProcessPool::initialize(pool.clone()).expect("initialize");

        let _first = ProcessPool::claim(pool.clone()).expect("first claim succeeds");
        let second = ProcessPool::claim(pool.clone());
        assert!(matches!(second, Err(CoreError::PoolExhausted(_))));
    }

    #[test]
    fn dirty_release_never_recycles() {
        let cfg = PoolConfig {
            initial_pool_size: 0,
            max_pool_size: 2,
            ..PoolConfig::default()
        };
        let pool: SharedProcessPool = Arc::new(Mutex::new(ProcessPool::new(cfg)));
        ProcessPool::initialize(pool.clone()).expect("initialize");
        let handle = ProcessPool::claim(pool.clone()).expect("claim");
        ProcessPool::release(pool.clone(), handle, ReleaseMode::Dirty);
        // Dirty release kills rather than recycles; refill is scheduled, not instant.
        let stats = pool.lock().unwrap().stats();
        assert_eq!(stats.active, 0);
    }
}

//! C2 — the session manager.
//!
//! Turns a claim-from-the-pool into a fully configured, running session
//! inside that PTY, and mediates all subsequent interaction. See
//! SPEC_FULL.md §4.2.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::core::agent_detection::{AgentType, SharedAgentRegistry};
use crate::core::io_plane::{spawn_reader, EventSink, ReaderHandle};
use crate::core::launch_resolver::{self, LaunchArgs};
use crate::core::pty_pool::{ProcessPool, PtyHandle, ReleaseMode, SharedProcessPool};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionArgs {
    pub agent_kind: AgentType,
    pub project_path: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub codex_provider: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: usize,
    pub pane_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: usize,
    pub pane_index: usize,
    pub agent_type: AgentType,
    pub project_path: String,
    pub working_dir: Option<String>,
    pub branch: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    #[serde(default)]
    pub env_overrides: HashMap<String, String>,
}

struct SessionRecord {
    info: SessionInfo,
    handle: Option<PtyHandle>,
    reader: Option<ReaderHandle>,
}

pub type SharedSessionManager = Arc<Mutex<SessionManager>>;

pub struct SessionManager {
    pool: SharedProcessPool,
    agents: SharedAgentRegistry,
    next_session_id: usize,
    sessions: HashMap<usize, SessionRecord>,
    sink: Option<Arc<dyn EventSink>>,
}

impl SessionManager {
    pub fn new(pool: SharedProcessPool, agents: SharedAgentRegistry) -> Self {
        Self {
            pool,
            agents,
            next_session_id: 1,
            sessions: HashMap::new(),
            sink: None,
        }
    }

    /// Wires the I/O plane's event sink. Sessions created before this is
    /// called simply don't get a reader task — useful for unit-testing the
    /// manager without a live `AppHandle`.
    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = Some(sink);
    }

    /// Lazily installs a sink the first time it's needed — used by the
    /// `session_create` command, which only has a live `AppHandle` to build
    /// a [`TauriEventSink`] from once a request actually arrives.
    pub fn ensure_sink(&mut self, make: impl FnOnce() -> Arc<dyn EventSink>) {
        if self.sink.is_none() {
            self.sink = Some(make());
        }
    }

    fn lowest_free_pane_index(&self) -> usize {
        let mut used: Vec<usize> = self.sessions.values().map(|r| r.info.pane_index).collect();
        used.sort_unstable();
        let mut candidate = 0usize;
        for idx in used {
            if idx == candidate {
                candidate += 1;
            } else if idx > candidate {
                break;
            }
        }
        candidate
    }

    pub fn create_session(&mut self, args: CreateSessionArgs) -> CoreResult<CreateSessionResponse> {
        let pane_index = self.lowest_free_pane_index();
        self.create_session_at_pane(pane_index, args)
    }

    /// Re-creates a session from a snapshot pane, bypassing pane-index
    /// allocation (the caller — `snapshot::apply` — controls it so the
    /// restored topology matches the snapshot exactly).
    pub(crate) fn create_session_at(
        &mut self,
        pane_index: usize,
        args: CreateSessionArgs,
    ) -> CoreResult<CreateSessionResponse> {
        debug_assert!(
            self.sessions.values().all(|r| r.info.pane_index != pane_index),
            "create_session_at must only be used for unoccupied pane indices"
        );
        self.create_session_at_pane(pane_index, args)
    }

    fn create_session_at_pane(
        &mut self,
        pane_index: usize,
        args: CreateSessionArgs,
    ) -> CoreResult<CreateSessionResponse> {
        let session_id = self.next_session_id;
        let mut handle = ProcessPool::claim(self.pool.clone())?;

        let configured = self.configure_claimed_handle(&mut handle, &args);
        let (warning, effective_kind) = match configured {
            Ok(v) => v,
            Err(err) => {
                // Any failure after a PTY has been claimed returns it to the
                // pool as Dead, never Recycling — a faulty shell state must
                // not be reused.
                ProcessPool::release(self.pool.clone(), handle, ReleaseMode::Dirty);
                return Err(err);
            }
        };

        let reader = match self.sink.clone() {
            Some(sink) => match spawn_reader(session_id, &mut handle, sink) {
                Ok(r) => Some(r),
                Err(err) => {
                    eprintln!("session {session_id}: failed to start reader task: {err}");
                    None
                }
            },
            None => None,
        };

        self.next_session_id += 1;
        self.sessions.insert(
            session_id,
            SessionRecord {
                info: SessionInfo {
                    session_id,
                    pane_index,
                    agent_type: effective_kind,
                    project_path: args.project_path.clone(),
                    working_dir: Some(
                        args.working_dir
                            .clone()
                            .unwrap_or_else(|| args.project_path.clone()),
                    ),
                    branch: args.branch.clone(),
                    skills: args.skills.clone(),
                    mcp_servers: args.mcp_servers.clone(),
                    env_overrides: args.env.clone(),
                },
                handle: Some(handle),
                reader,
            },
        );

        Ok(CreateSessionResponse {
            session_id,
            pane_index,
            warning,
        })
    }

    /// Steps 4-5 of §4.2 `create`: cd into the working directory, inject
    /// per-session environment, then launch the agent command (or leave the
    /// login shell in place for `terminal`). Returns the warning (if the
    /// agent binary was missing and we downgraded) and the agent kind the
    /// session actually ended up running.
    fn configure_claimed_handle(
        &self,
        handle: &mut PtyHandle,
        args: &CreateSessionArgs,
    ) -> CoreResult<(Option<String>, AgentType)> {
        let working_dir = args
            .working_dir
            .clone()
            .unwrap_or_else(|| args.project_path.clone());
        if working_dir.trim().is_empty() {
            return Err(CoreError::InvalidArgument("working_dir is empty".to_string()));
        }

        let cd_cmd = format!("cd '{}'\r\n", shell_single_quote_escape(&working_dir));
        handle
            .write_str(&cd_cmd)
            .map_err(|e| CoreError::IoError(format!("{e:#}")))?;

        for (key, value) in &args.env {
            handle
                .write_str(&export_cmd(key, value))
                .map_err(|e| CoreError::IoError(format!("{e:#}")))?;
        }

        if args.agent_kind == AgentType::Terminal {
            return Ok((None, AgentType::Terminal));
        }

        let resolved = launch_resolver::resolve(
            args.agent_kind,
            LaunchArgs {
                model: args.model.as_deref(),
                codex_provider: args.codex_provider.as_deref(),
            },
        );

        let Some(resolved) = resolved else {
            return Ok((None, AgentType::Terminal));
        };

        let runnable = launch_resolver::command_is_runnable(&resolved.command)
            || self
                .agents
                .lock()
                .expect("agent registry mutex poisoned")
                .is_installed(args.agent_kind);

        if !runnable {
            return Ok((
                Some(format!(
                    "{} not found on PATH; started a plain shell",
                    resolved.command
                )),
                AgentType::Terminal,
            ));
        }

        for (key, value) in &resolved.env {
            handle
                .write_str(&export_cmd(key, value))
                .map_err(|e| CoreError::IoError(format!("{e:#}")))?;
        }

        let mut launch_cmd = resolved.command.clone();
        for arg in &resolved.args {
            launch_cmd.push(' ');
            launch_cmd.push_str(&shell_single_quote_escape(arg));
        }
        handle
            .write_str(&format!("{launch_cmd}\r\n"))
            .map_err(|e| CoreError::IoError(format!("{e:#}")))?;

        Ok((None, args.agent_kind))
    }

    pub fn write(&mut self, session_id: usize, data: &[u8]) -> CoreResult<()> {
        let Some(record) = self.sessions.get_mut(&session_id) else {
            return Err(CoreError::no_such_session(session_id));
        };
        // Writes after the child has exited are silently dropped.
        if let Some(handle) = record.handle.as_mut() {
            let _ = handle.write_all(data);
        }
        Ok(())
    }

    pub fn resize(&mut self, session_id: usize, cols: u16, rows: u16) -> CoreResult<()> {
        if cols == 0 || rows == 0 {
            return Err(CoreError::InvalidArgument(
                "cols and rows must be positive".to_string(),
            ));
        }
        // Silent on unknown sessions per §4.2.
        if let Some(record) = self.sessions.get_mut(&session_id) {
            if let Some(handle) = record.handle.as_mut() {
                let _ = handle.resize(cols, rows);
            }
        }
        Ok(())
    }

    /// Idempotent: destroying an already-destroyed session returns success.
    pub fn destroy_session(&mut self, session_id: usize) -> CoreResult<()> {
        let Some(mut record) = self.sessions.remove(&session_id) else {
            return Ok(());
        };

        if let Some(reader) = record.reader.take() {
            reader.detach();
        }

        if let Some(handle) = record.handle.take() {
            ProcessPool::release(self.pool.clone(), handle, ReleaseMode::Clean);
        }

        Ok(())
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self.sessions.values().map(|r| r.info.clone()).collect();
        out.sort_by_key(|s| s.pane_index);
        out
    }

    /// Destroys every live session in current pane-index order — used by
    /// `snapshot::apply`'s teardown step before re-creating the snapshot's
    /// panes.
    pub fn destroy_all_ordered(&mut self) {
        let mut ids: Vec<(usize, usize)> = self
            .sessions
            .values()
            .map(|r| (r.info.pane_index, r.info.session_id))
            .collect();
        ids.sort_unstable();
        for (_, id) in ids {
            let _ = self.destroy_session(id);
        }
    }

    pub fn shutdown(&mut self) {
        self.destroy_all_ordered();
    }
}

impl Clone for SessionInfo {
    fn clone(&self) -> Self {
        SessionInfo {
            session_id: self.session_id,
            pane_index: self.pane_index,
            agent_type: self.agent_type,
            project_path: self.project_path.clone(),
            working_dir: self.working_dir.clone(),
            branch: self.branch.clone(),
            skills: self.skills.clone(),
            mcp_servers: self.mcp_servers.clone(),
            env_overrides: self.env_overrides.clone(),
        }
    }
}

fn export_cmd(key: &str, value: &str) -> String {
    format!(
        "export {}='{}'\r\n",
        shell_identifier_sanitize(key),
        shell_single_quote_escape(value)
    )
}

fn shell_single_quote_escape(s: &str) -> String {
    s.replace('\'', "'\\''")
}

fn shell_identifier_sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent_detection::AgentRegistry;
    use crate::core::pty_pool::PoolConfig;
    use std::time::Duration;

    fn manager_with_pool(max_active: usize) -> SessionManager {
        let cfg = PoolConfig {
            initial_pool_size: 0,
            max_pool_size: 2,
            max_active,
            warmup_timeout: Duration::from_secs(5),
            ..PoolConfig::default()
        };
        let pool = Arc::new(Mutex::new(ProcessPool::new(cfg)));
        let agents = Arc::new(Mutex::new(AgentRegistry::detect()));
        SessionManager::new(pool, agents)
    }

    fn terminal_args(project_path: &str) -> CreateSessionArgs {
        CreateSessionArgs {
            agent_kind: AgentType::Terminal,
            project_path: project_path.to_string(),
            branch: None,
            working_dir: None,
            model: None,
            env: HashMap::new(),
            codex_provider: None,
            skills: Vec::new(),
            mcp_servers: Vec::new(),
        }
    }

    #[test]
    fn create_assigns_monotonic_ids_and_dense_pane_indices() {
        let mut mgr = manager_with_pool(4);
        let a = mgr.create_session(terminal_args("/tmp")).unwrap();
        let b = mgr.create_session(terminal_args("/tmp")).unwrap();
        assert_eq!(a.pane_index, 0);
        assert_eq!(b.pane_index, 1);
        assert!(b.session_id > a.session_id);
    }

    #[test]
    fn destroy_then_create_reuses_lowest_pane_index_with_fresh_id() {
        let mut mgr = manager_with_pool(4);
        let a = mgr.create_session(terminal_args("/tmp")).unwrap();
        mgr.destroy_session(a.session_id).unwrap();
        let b = mgr.create_session(terminal_args("/tmp")).unwrap();
        assert_eq!(b.pane_index, 0);
        assert!(b.session_id > a.session_id);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut mgr = manager_with_pool(4);
        let a = mgr.create_session(terminal_args("/tmp")).unwrap();
        mgr.destroy_session(a.session_id).unwrap();
        assert!(mgr.destroy_session(a.session_id).is_ok());
    }

    #[test]
    fn fourth_create_fails_with_pool_exhausted_at_ceiling_three() {
        let mut mgr = manager_with_pool(3);
        let a = mgr.create_session(terminal_args("/tmp")).unwrap();
        let b = mgr.create_session(terminal_args("/tmp")).unwrap();
        let c = mgr.create_session(terminal_args("/tmp")).unwrap();
        assert_eq!((a.pane_index, b.pane_index, c.pane_index), (0, 1, 2));
        let d = mgr.create_session(terminal_args("/tmp"));
        assert!(matches!(d, Err(CoreError::PoolExhausted(_))));
    }

    #[test]
    fn resize_rejects_non_positive_dimensions() {
        let mut mgr = manager_with_pool(2);
        let a = mgr.create_session(terminal_args("/tmp")).unwrap();
        assert!(matches!(
            mgr.resize(a.session_id, 0, 24),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            mgr.resize(a.session_id, 80, 0),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn resize_on_unknown_session_is_silent() {
        let mut mgr = manager_with_pool(2);
        assert!(mgr.resize(9999, 80, 24).is_ok());
    }

    #[test]
    fn write_on_unknown_session_fails() {
        let mut mgr = manager_with_pool(2);
        assert!(matches!(
            mgr.write(9999, b"hi"),
            Err(CoreError::NoSuchSession(_))
        ));
    }

    #[test]
    fn list_sessions_sorted_by_pane_index() {
        let mut mgr = manager_with_pool(4);
        let a = mgr.create_session(terminal_args("/tmp")).unwrap();
        let _b = mgr.create_session(terminal_args("/tmp")).unwrap();
        mgr.destroy_session(a.session_id).unwrap();
        let _c = mgr.create_session(terminal_args("/tmp")).unwrap();
        let listed = mgr.list_sessions();
        let indices: Vec<usize> = listed.iter().map(|s| s.pane_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }
}

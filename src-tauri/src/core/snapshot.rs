//! C4 — the snapshot engine.
//!
//! Persists session topology to JSON and can replay it through the session
//! manager. Restoration re-creates sessions; it never restores scrollback or
//! agent memory. See SPEC_FULL.md §4.4.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::agent_detection::AgentType;
use crate::core::session_manager::{CreateSessionArgs, SessionManager};
use crate::error::{CoreError, CoreResult};

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayoutSnapshot {
    pub session_count: usize,
    pub layout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPaneSnapshot {
    pub pane_index: usize,
    pub agent_type: AgentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub worktree_enabled: bool,
    pub working_dir: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    #[serde(default)]
    pub env_overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub version: u32,
    pub name: String,
    pub saved_at: String,
    pub project_path: String,
    pub orchestration_mode: String,
    pub grid_layout: GridLayoutSnapshot,
    pub sessions: Vec<SessionPaneSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshotMeta {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub saved_at: String,
    pub project_path: String,
    pub session_count: usize,
    pub layout: String,
}

/// Result of `apply`: the freshly created sessions plus any per-pane
/// warnings (missing working directory, missing agent binary).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub session_ids: Vec<usize>,
    pub warnings: Vec<String>,
}

fn grid_for_count(count: usize) -> (usize, usize) {
    match count {
        0 | 1 => (1, 1),
        2 => (2, 1),
        3 | 4 => (2, 2),
        5 | 6 => (3, 2),
        7..=9 => (3, 3),
        _ => (4, 3),
    }
}

fn slugify_filename(name: &str) -> String {
    let mut out = String::new();
    let mut prev_dash = false;

    for ch in name.chars() {
        let c = ch.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
            out.push(c);
            prev_dash = false;
            continue;
        }
        if !out.is_empty() && !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    if out.is_empty() {
        "snapshot".to_string()
    } else {
        out
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// A pane as captured for the purpose of building a snapshot — the thin
/// slice of `SessionInfo` the engine actually persists.
pub struct SnapshotPaneInput {
    pub pane_index: usize,
    pub agent_type: AgentType,
    pub branch: Option<String>,
    pub working_dir: String,
    pub worktree_enabled: bool,
    pub skills: Vec<String>,
    pub mcp_servers: Vec<String>,
    pub env_overrides: HashMap<String, String>,
}

pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf) -> CoreResult<Self> {
        fs::create_dir_all(&dir).map_err(|e| CoreError::IoError(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path_for_id(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn named_id(&self, name: &str) -> String {
        slugify_filename(name)
    }

    fn autosave_id(&self, project_path: &str) -> String {
        let leaf = Path::new(project_path)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(project_path);
        format!("{}-autosave", slugify_filename(leaf))
    }

    fn build(
        &self,
        project_path: &str,
        orchestration_mode: &str,
        name: &str,
        mut panes: Vec<SnapshotPaneInput>,
    ) -> SessionSnapshot {
        panes.sort_by_key(|p| p.pane_index);
        let count = panes.len();
        let (cols, rows) = grid_for_count(count);

        SessionSnapshot {
            version: SCHEMA_VERSION,
            name: name.to_string(),
            saved_at: now_rfc3339(),
            project_path: project_path.to_string(),
            orchestration_mode: orchestration_mode.to_string(),
            grid_layout: GridLayoutSnapshot {
                session_count: count,
                layout: format!("{cols}x{rows}"),
            },
            sessions: panes
                .into_iter()
                .map(|p| SessionPaneSnapshot {
                    pane_index: p.pane_index,
                    agent_type: p.agent_type,
                    branch: p.branch,
                    worktree_enabled: p.worktree_enabled,
                    working_dir: p.working_dir,
                    skills: p.skills,
                    mcp_servers: p.mcp_servers,
                    env_overrides: p.env_overrides,
                })
                .collect(),
        }
    }

    fn write(&self, id: &str, snapshot: &SessionSnapshot) -> CoreResult<()> {
        let path = self.path_for_id(id);
        let text = serde_json::to_string_pretty(snapshot)
            .map_err(|e| CoreError::IoError(format!("serialize snapshot: {e}")))?;
        fs::write(&path, format!("{text}\n"))
            .map_err(|e| CoreError::IoError(format!("write {}: {e}", path.display())))
    }

    fn meta(id: &str, snapshot: &SessionSnapshot, kind: &str) -> SessionSnapshotMeta {
        SessionSnapshotMeta {
            id: id.to_string(),
            name: snapshot.name.clone(),
            kind: kind.to_string(),
            saved_at: snapshot.saved_at.clone(),
            project_path: snapshot.project_path.clone(),
            session_count: snapshot.grid_layout.session_count,
            layout: snapshot.grid_layout.layout.clone(),
        }
    }

    pub fn save_named(
        &self,
        project_path: &str,
        name: &str,
        orchestration_mode: &str,
        panes: Vec<SnapshotPaneInput>,
    ) -> CoreResult<SessionSnapshotMeta> {
        let id = self.named_id(name);
        let snapshot = self.build(project_path, orchestration_mode, name, panes);
        self.write(&id, &snapshot)?;
        Ok(Self::meta(&id, &snapshot, "named"))
    }

    /// Best-effort: failures are logged, never bubbled — callers on the
    /// autosave timer/debounce path should not crash the UI over a disk
    /// hiccup.
    pub fn save_autosave(
        &self,
        project_path: &str,
        orchestration_mode: &str,
        panes: Vec<SnapshotPaneInput>,
    ) {
        let id = self.autosave_id(project_path);
        let snapshot = self.build(project_path, orchestration_mode, "autosave", panes);
        if let Err(err) = self.write(&id, &snapshot) {
            eprintln!("snapshot autosave failed for {project_path}: {err}");
        }
    }

    pub fn load(&self, id: &str) -> CoreResult<SessionSnapshot> {
        let clean = slugify_filename(id);
        let path = self.path_for_id(&clean);
        let text = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(format!("snapshot {id} not found"))
            } else {
                CoreError::IoError(format!("read {}: {e}", path.display()))
            }
        })?;
        let snapshot: SessionSnapshot = serde_json::from_str(&text)
            .map_err(|e| CoreError::SchemaMismatch(format!("parse snapshot {id}: {e}")))?;
        if snapshot.version != SCHEMA_VERSION {
            return Err(CoreError::SchemaMismatch(format!(
                "unrecognized snapshot schema version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    pub fn list(&self, project_path: Option<&str>) -> CoreResult<Vec<SessionSnapshotMeta>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(CoreError::IoError(format!("read_dir {}: {e}", self.dir.display()))),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(snapshot) = self.load(id) else {
                continue;
            };
            if let Some(pp) = project_path {
                if snapshot.project_path != pp {
                    continue;
                }
            }
            let kind = if id.ends_with("-autosave") { "autosave" } else { "named" };
            out.push(Self::meta(id, &snapshot, kind));
        }

        out.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(out)
    }

    /// Drives the Session Manager: destroys every live session, then
    /// re-creates sessions in ascending pane-index order from `snapshot`.
    /// Fails before touching any session if `current_project_path` doesn't
    /// match the snapshot's recorded project.
    pub fn apply(
        &self,
        snapshot: &SessionSnapshot,
        current_project_path: &str,
        manager: &mut SessionManager,
    ) -> CoreResult<ApplyReport> {
        if snapshot.project_path != current_project_path {
            return Err(CoreError::InvalidArgument(format!(
                "snapshot project path {:?} does not match current project {:?}",
                snapshot.project_path, current_project_path
            )));
        }

        manager.destroy_all_ordered();

        let mut ordered = snapshot.sessions.clone();
        ordered.sort_by_key(|p| p.pane_index);

        let mut session_ids = Vec::with_capacity(ordered.len());
        let mut warnings = Vec::new();

        for pane in ordered {
            let mut working_dir = pane.working_dir.clone();
            if !Path::new(&working_dir).is_dir() {
                warnings.push(format!(
                    "pane {}: working directory {:?} no longer exists, falling back to project path",
                    pane.pane_index, working_dir
                ));
                working_dir = snapshot.project_path.clone();
            }

            let args = CreateSessionArgs {
                agent_kind: pane.agent_type,
                project_path: snapshot.project_path.clone(),
                branch: pane.branch.clone(),
                working_dir: Some(working_dir),
                model: None,
                env: pane.env_overrides.clone(),
                codex_provider: None,
                skills: pane.skills.clone(),
                mcp_servers: pane.mcp_servers.clone(),
            };

            let response = manager.create_session_at(pane.pane_index, args)?;
            if let Some(warning) = response.warning {
                warnings.push(format!("pane {}: {warning}", pane.pane_index));
            }
            session_ids.push(response.session_id);
        }

        Ok(ApplyReport { session_ids, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent_detection::AgentRegistry;
    use crate::core::pty_pool::{PoolConfig, ProcessPool};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn manager_with_pool(max_active: usize) -> SessionManager {
        let cfg = PoolConfig {
            initial_pool_size: 0,
            max_pool_size: 4,
            max_active,
            warmup_timeout: Duration::from_secs(5),
            ..PoolConfig::default()
        };
        let pool = Arc::new(Mutex::new(ProcessPool::new(cfg)));
        let agents = Arc::new(Mutex::new(AgentRegistry::detect()));
        SessionManager::new(pool, agents)
    }

    #[test]
    fn save_then_load_round_trips_byte_for_byte_after_normalization() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("sessions")).unwrap();

        let panes = vec![SnapshotPaneInput {
            pane_index: 0,
            agent_type: AgentType::Terminal,
            branch: None,
            working_dir: "/tmp".to_string(),
            worktree_enabled: false,
            skills: Vec::new(),
            mcp_servers: Vec::new(),
            env_overrides: HashMap::new(),
        }];

        let meta = store.save_named("/proj", "t", "manual", panes).unwrap();
        let loaded = store.load(&meta.id).unwrap();
        assert_eq!(loaded.project_path, "/proj");
        assert_eq!(loaded.sessions.len(), 1);
        assert_eq!(loaded.sessions[0].pane_index, 0);
    }

    #[test]
    fn load_unknown_id_fails_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("sessions")).unwrap();
        assert!(matches!(store.load("nope"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn apply_rejects_project_path_mismatch_before_touching_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("sessions")).unwrap();
        let mut mgr = manager_with_pool(4);

        let snapshot = store.build("/proj-a", "manual", "t", Vec::new());
        let result = store.apply(&snapshot, "/proj-b", &mut mgr);
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
        assert!(mgr.list_sessions().is_empty());
    }

    #[test]
    fn apply_restores_skills_and_mcp_servers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("sessions")).unwrap();
        let mut mgr = manager_with_pool(4);

        let project = tmp.path().to_string_lossy().to_string();
        let panes = vec![SnapshotPaneInput {
            pane_index: 0,
            agent_type: AgentType::Terminal,
            branch: None,
            working_dir: project.clone(),
            worktree_enabled: false,
            skills: vec!["rust-reviewer".to_string()],
            mcp_servers: vec!["filesystem".to_string()],
            env_overrides: HashMap::new(),
        }];
        let snapshot = store.build(&project, "manual", "t", panes);
        store.apply(&snapshot, &project, &mut mgr).unwrap();

        let listed = mgr.list_sessions();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].skills, vec!["rust-reviewer".to_string()]);
        assert_eq!(listed[0].mcp_servers, vec!["filesystem".to_string()]);
    }

    #[test]
    fn apply_recreates_sessions_in_pane_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("sessions")).unwrap();
        let mut mgr = manager_with_pool(4);

        let panes = vec![
            SnapshotPaneInput {
                pane_index: 0,
                agent_type: AgentType::Terminal,
                branch: None,
                working_dir: tmp.path().to_string_lossy().to_string(),
                worktree_enabled: false,
                skills: Vec::new(),
                mcp_servers: Vec::new(),
                env_overrides: HashMap::new(),
            },
            SnapshotPaneInput {
                pane_index: 1,
                agent_type: AgentType::Terminal,
                branch: None,
                working_dir: tmp.path().to_string_lossy().to_string(),
                worktree_enabled: false,
                skills: Vec::new(),
                mcp_servers: Vec::new(),
                env_overrides: HashMap::new(),
            },
        ];

        let project = tmp.path().to_string_lossy().to_string();
        let snapshot = store.build(&project, "manual", "t", panes);
        let report = store.apply(&snapshot, &project, &mut mgr).unwrap();
        assert_eq!(report.session_ids.len(), 2);

        let listed = mgr.list_sessions();
        let indices: Vec<usize> = listed.iter().map(|s| s.pane_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn apply_falls_back_to_project_path_for_missing_working_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("sessions")).unwrap();
        let mut mgr = manager_with_pool(4);

        let project = tmp.path().to_string_lossy().to_string();
        let panes = vec![SnapshotPaneInput {
            pane_index: 0,
            agent_type: AgentType::Terminal,
            branch: None,
            working_dir: "/definitely/not/a/real/dir/xyz".to_string(),
            worktree_enabled: false,
            skills: Vec::new(),
            mcp_servers: Vec::new(),
            env_overrides: HashMap::new(),
        }];
        let snapshot = store.build(&project, "manual", "t", panes);
        let report = store.apply(&snapshot, &project, &mut mgr).unwrap();
        assert_eq!(report.session_ids.len(), 1);
        assert_eq!(report.warnings.len(), 1);
    }
}

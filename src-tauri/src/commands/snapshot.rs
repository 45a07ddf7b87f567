//! `snapshot.*` commands — the client-facing surface over the Snapshot
//! Engine (C4). See SPEC_FULL.md §6.

use tauri::State;

use crate::core::session_manager::{SessionInfo, SharedSessionManager};
use crate::core::snapshot::{ApplyReport, SessionSnapshot, SessionSnapshotMeta, SnapshotPaneInput, SnapshotStore};
use crate::error::CoreError;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveNamedArgs {
    pub project_path: String,
    pub name: String,
    #[serde(default = "default_orchestration_mode")]
    pub orchestration_mode: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAutosaveArgs {
    pub project_path: String,
    #[serde(default = "default_orchestration_mode")]
    pub orchestration_mode: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSnapshotArgs {
    pub id: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplySnapshotArgs {
    pub snapshot: SessionSnapshot,
    pub current_project_path: String,
}

fn default_orchestration_mode() -> String {
    "manual".to_string()
}

fn panes_from_sessions(sessions: &[SessionInfo]) -> Vec<SnapshotPaneInput> {
    sessions
        .iter()
        .map(|s| SnapshotPaneInput {
            pane_index: s.pane_index,
            agent_type: s.agent_type,
            branch: s.branch.clone(),
            working_dir: s
                .working_dir
                .clone()
                .unwrap_or_else(|| s.project_path.clone()),
            worktree_enabled: false,
            skills: s.skills.clone(),
            mcp_servers: s.mcp_servers.clone(),
            env_overrides: s.env_overrides.clone(),
        })
        .collect()
}

#[tauri::command]
pub fn snapshot_save_named(
    app: tauri::AppHandle,
    manager: State<'_, SharedSessionManager>,
    args: SaveNamedArgs,
) -> Result<SessionSnapshotMeta, CoreError> {
    let store = store_for_app(&app)?;
    let sessions = manager
        .lock()
        .expect("session manager mutex poisoned")
        .list_sessions();
    store.save_named(
        &args.project_path,
        &args.name,
        &args.orchestration_mode,
        panes_from_sessions(&sessions),
    )
}

#[tauri::command]
pub fn snapshot_save_autosave(
    app: tauri::AppHandle,
    manager: State<'_, SharedSessionManager>,
    args: SaveAutosaveArgs,
) -> Result<(), CoreError> {
    let store = store_for_app(&app)?;
    let sessions = manager
        .lock()
        .expect("session manager mutex poisoned")
        .list_sessions();
    store.save_autosave(&args.project_path, &args.orchestration_mode, panes_from_sessions(&sessions));
    Ok(())
}

#[tauri::command]
pub fn snapshot_load(
    app: tauri::AppHandle,
    args: LoadSnapshotArgs,
) -> Result<SessionSnapshot, CoreError> {
    let store = store_for_app(&app)?;
    store.load(&args.id)
}

#[tauri::command]
pub fn snapshot_apply(
    app: tauri::AppHandle,
    manager: State<'_, SharedSessionManager>,
    args: ApplySnapshotArgs,
) -> Result<ApplyReport, CoreError> {
    let store = store_for_app(&app)?;
    let mut guard = manager.lock().expect("session manager mutex poisoned");
    store.apply(&args.snapshot, &args.current_project_path, &mut guard)
}

fn store_for_app(app: &tauri::AppHandle) -> Result<SnapshotStore, CoreError> {
    use tauri::path::BaseDirectory;
    use tauri::Manager;
    let dir = app
        .path()
        .resolve("ptydeck/sessions", BaseDirectory::Config)
        .map_err(|e| CoreError::IoError(format!("resolve sessions dir: {e}")))?;
    SnapshotStore::new(dir)
}

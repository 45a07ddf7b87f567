//! `session.*` commands — the client-facing surface over the Session
//! Manager (C2). See SPEC_FULL.md §6.

use tauri::State;

use crate::core::io_plane::TauriEventSink;
use crate::core::session_manager::{
    CreateSessionArgs, CreateSessionResponse, SessionInfo, SharedSessionManager,
};
use crate::error::CoreError;
use std::sync::Arc;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdArgs {
    pub session_id: usize,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWriteArgs {
    pub session_id: usize,
    /// Base-64 of the raw stdin bytes (symmetric with `session.output`'s
    /// `dataB64`).
    pub data_b64: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResizeArgs {
    pub session_id: usize,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroySessionResponse {
    pub success: bool,
}

#[tauri::command]
pub fn session_create(
    app: tauri::AppHandle,
    manager: State<'_, SharedSessionManager>,
    args: CreateSessionArgs,
) -> Result<CreateSessionResponse, CoreError> {
    let mut guard = manager.lock().expect("session manager mutex poisoned");
    guard.ensure_sink(|| Arc::new(TauriEventSink::new(app)));
    guard.create_session(args)
}

#[tauri::command]
pub fn session_destroy(
    manager: State<'_, SharedSessionManager>,
    args: SessionIdArgs,
) -> Result<DestroySessionResponse, CoreError> {
    let mut guard = manager.lock().expect("session manager mutex poisoned");
    guard
        .destroy_session(args.session_id)
        .map(|_| DestroySessionResponse { success: true })
}

#[tauri::command]
pub fn session_write(
    manager: State<'_, SharedSessionManager>,
    args: SessionWriteArgs,
) -> Result<(), CoreError> {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    let bytes = BASE64
        .decode(&args.data_b64)
        .map_err(|e| CoreError::InvalidArgument(format!("data_b64: {e}")))?;
    let mut guard = manager.lock().expect("session manager mutex poisoned");
    guard.write(args.session_id, &bytes)
}

#[tauri::command]
pub fn session_resize(
    manager: State<'_, SharedSessionManager>,
    args: SessionResizeArgs,
) -> Result<(), CoreError> {
    let mut guard = manager.lock().expect("session manager mutex poisoned");
    guard.resize(args.session_id, args.cols, args.rows)
}

#[tauri::command]
pub fn session_list(manager: State<'_, SharedSessionManager>) -> Result<Vec<SessionInfo>, CoreError> {
    let guard = manager.lock().expect("session manager mutex poisoned");
    Ok(guard.list_sessions())
}

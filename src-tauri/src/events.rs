//! Event payloads pushed to the client. See SPEC_FULL.md §6.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutputEvent {
    pub session_id: usize,
    pub data_b64: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExitEvent {
    pub session_id: usize,
    pub exit_code: i32,
}

/// Low-frequency; published on material pool state change (warm-up
/// completing, a claim, a release) rather than on a fixed interval.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatusEvent {
    pub idle: usize,
    pub active: usize,
    pub total: usize,
}

pub const SESSION_OUTPUT_EVENT: &str = "session.output";
pub const SESSION_EXIT_EVENT: &str = "session.exit";
pub const POOL_STATUS_EVENT: &str = "pool.status";

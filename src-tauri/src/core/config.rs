//! Pool Configuration persistence — the slice of the application's broader
//! settings file the core actually cares about. See SPEC_FULL.md §3.
//!
//! The full settings surface (AI provider keys, keyboard bindings, UI
//! layout, notifications, git defaults) belongs to the external collaborator
//! that owns the rest of the settings file; the core only reads and writes
//! the `performance` section.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::pty_pool::PoolConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PerformanceDisk {
    pub initial_pool_size: usize,
    pub max_pool_size: usize,
    pub max_active_sessions: usize,
    pub recycle_enabled: bool,
    pub max_pty_age_minutes: u64,
    pub warmup_delay_ms: u64,
}

impl Default for PerformanceDisk {
    fn default() -> Self {
        Self {
            initial_pool_size: 2,
            max_pool_size: 4,
            max_active_sessions: 12,
            recycle_enabled: true,
            max_pty_age_minutes: 30,
            warmup_delay_ms: 100,
        }
    }
}

/// Maps the on-disk `performance` section to the pool's runtime config,
/// clamping is left to `PoolConfig::clamped` (called by `ProcessPool::new`
/// and `reconfigure`).
pub fn pool_config_from_performance(p: &PerformanceDisk) -> PoolConfig {
    let mut cfg = PoolConfig::default();
    cfg.initial_pool_size = p.initial_pool_size;
    cfg.max_pool_size = p.max_pool_size;
    cfg.max_active = p.max_active_sessions;
    cfg.recycle_enabled = p.recycle_enabled;
    cfg.max_pty_age = Duration::from_secs(p.max_pty_age_minutes.saturating_mul(60));
    cfg.warmup_delay = Duration::from_millis(p.warmup_delay_ms);
    cfg
}

pub fn performance_get(path: &Path) -> Result<PerformanceDisk> {
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PerformanceDisk::default()),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    Ok(serde_json::from_str(&text).unwrap_or_default())
}

pub fn performance_set(path: &Path, view: &PerformanceDisk) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create config dir {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(view).context("serialize performance.json")?;
    fs::write(path, format!("{text}\n")).with_context(|| format!("write {}", path.display()))
}

pub fn performance_path(app: &tauri::AppHandle) -> Result<PathBuf> {
    use tauri::path::BaseDirectory;
    use tauri::Manager;
    app.path()
        .resolve("ptydeck/performance.json", BaseDirectory::Config)
        .context("resolve config path for performance.json")
}

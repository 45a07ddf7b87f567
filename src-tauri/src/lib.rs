mod commands;
mod core;
mod error;
mod events;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tauri::Manager;

use crate::commands::agents::agents_list;
use crate::commands::session::{
    session_create, session_destroy, session_list, session_resize, session_write,
};
use crate::commands::snapshot::{
    snapshot_apply, snapshot_load, snapshot_save_autosave, snapshot_save_named,
};
use crate::core::agent_detection::{AgentRegistry, SharedAgentRegistry};
use crate::core::config::{performance_get, performance_path, pool_config_from_performance};
use crate::core::pty_pool::{PoolConfig, PoolStats, ProcessPool, SharedProcessPool};
use crate::core::session_manager::{SessionManager, SharedSessionManager};
use crate::events::{PoolStatusEvent, POOL_STATUS_EVENT};

#[tauri::command]
fn debug_pool_stats(pool: tauri::State<'_, SharedProcessPool>) -> PoolStats {
    pool.inner().lock().expect("pool mutex poisoned").stats()
}

#[tauri::command]
fn debug_pool_roundtrip(pool: tauri::State<'_, SharedProcessPool>) -> Result<String, crate::error::CoreError> {
    ProcessPool::debug_roundtrip(pool.inner().clone())
}

/// Polls `pool.stats()` and publishes `pool.status` on material change —
/// cheap enough to run continuously, low-frequency enough not to flood the
/// IPC channel.
fn spawn_pool_status_watcher(app: tauri::AppHandle, pool: SharedProcessPool) {
    std::thread::spawn(move || {
        use tauri::Emitter;
        let mut last: Option<(usize, usize)> = None;
        loop {
            std::thread::sleep(Duration::from_millis(500));
            let stats = pool.lock().expect("pool mutex poisoned").stats();
            let key = (stats.idle, stats.active);
            if last != Some(key) {
                last = Some(key);
                let _ = app.emit(
                    POOL_STATUS_EVENT,
                    PoolStatusEvent {
                        idle: stats.idle,
                        active: stats.active,
                        total: stats.idle + stats.active,
                    },
                );
            }
        }
    });
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let pool: SharedProcessPool =
        Arc::new(Mutex::new(ProcessPool::new(PoolConfig::default())));
    let agents: SharedAgentRegistry = Arc::new(Mutex::new(AgentRegistry::detect()));
    let session_manager: SharedSessionManager =
        Arc::new(Mutex::new(SessionManager::new(pool.clone(), agents.clone())));

    let pool_for_setup = pool.clone();
    let app = tauri::Builder::default()
        .manage(pool.clone())
        .manage(agents)
        .manage(session_manager)
        .setup(move |app| {
            spawn_pool_status_watcher(app.handle().clone(), pool_for_setup.clone());
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            debug_pool_stats,
            debug_pool_roundtrip,
            agents_list,
            session_create,
            session_destroy,
            session_write,
            session_resize,
            session_list,
            snapshot_save_named,
            snapshot_save_autosave,
            snapshot_load,
            snapshot_apply,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    if let Ok(path) = performance_path(&app.handle()) {
        if let Ok(performance) = performance_get(&path) {
            ProcessPool::reconfigure(pool.clone(), pool_config_from_performance(&performance));
        }
    }
    if let Err(err) = ProcessPool::initialize(pool.clone()) {
        eprintln!("pool failed to initialize: {err}");
    }

    let did_shutdown = Arc::new(AtomicBool::new(false));
    let did_shutdown_2 = did_shutdown.clone();
    app.run(move |app_handle, event| {
        let should_shutdown = matches!(
            event,
            tauri::RunEvent::ExitRequested { .. } | tauri::RunEvent::Exit
        );
        if !should_shutdown {
            return;
        }
        if did_shutdown_2.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Ok(mut mgr) = app_handle
            .state::<SharedSessionManager>()
            .inner()
            .as_ref()
            .try_lock()
        {
            mgr.shutdown();
        }

        let pool = app_handle.state::<SharedProcessPool>().inner().clone();
        ProcessPool::shutdown(pool);
    });
}

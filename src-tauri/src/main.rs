// Prevents additional console window on Windows in release.
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod api;

use std::path::PathBuf;
use std::sync::Arc;

use directories::ProjectDirs;
use tauri::{Manager, WindowEvent};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;
use yijing_core::ai::OllamaClient;
use yijing_core::db::init_db;
use yijing_core::interpreter::Interpreter;
use yijing_core::settings::{SettingsStore, SqliteSettingsBackend};

use api::ApiState;

fn workspace_dir() -> PathBuf {
    if let Some(proj) = ProjectDirs::from("com", "Yijing", "Yijing") {
        proj.data_dir().to_path_buf()
    } else {
        std::env::temp_dir().join("Yijing")
    }
}

/// Install the tracing subscriber. `log` records from `yijing_core` are
/// bridged into it; `RUST_LOG` overrides the default `info` level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(tracing::Level::INFO.into()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    init_logging();

    tauri::Builder::default()
        .setup(|app| {
            let db = init_db(workspace_dir())?;
            let client = OllamaClient::new()?;
            let backend = Arc::new(SqliteSettingsBackend::new(db.clone()));
            let store = SettingsStore::new(backend.clone(), Arc::new(client.clone()));
            app.manage(ApiState {
                backend,
                store: Arc::new(Mutex::new(store)),
                interpreter: Interpreter::new(db, client),
            });
            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::ThemeChanged(theme) = event {
                let prefers_dark = matches!(theme, tauri::Theme::Dark);
                let state = window.state::<ApiState>().inner().clone();
                let app = window.app_handle().clone();
                tauri::async_runtime::spawn(async move {
                    let mut store = state.store.lock().await;
                    store.set_system_prefers_dark(prefers_dark);
                    api::emit_theme(&app, store.apply_theme());
                });
            }
        })
        .invoke_handler(tauri::generate_handler![
            api::ping,
            api::settings_load,
            api::settings_get,
            api::settings_get_all,
            api::settings_set,
            api::settings_set_theme,
            api::settings_set_system_theme,
            api::settings_set_font_size,
            api::settings_set_hexagram_style,
            api::settings_set_auto_save,
            api::settings_set_default_method,
            api::settings_set_ai_enabled,
            api::settings_set_ai_ollama_url,
            api::settings_set_ai_model,
            api::settings_set_ai_temperature,
            api::settings_set_ai_max_tokens,
            api::ai_check_ollama,
            api::ai_list_models,
            api::ai_interpret,
            api::ai_moving_yao_description
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

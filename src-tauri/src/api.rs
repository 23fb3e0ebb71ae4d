//! Tauri IPC commands invoked by the frontend.
//!
//! Commands are thin wrappers that lock the shared settings store, forward
//! the call to `yijing_core` and return JSON-friendly payloads. Ollama
//! connection checks run with the store unlocked.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tauri::{AppHandle, Emitter, State, Window};
use tokio::sync::Mutex;
use yijing_core::ai::{self, InterpretationRequest, OllamaChecker, OllamaModel, OllamaStatus};
use yijing_core::interpreter::Interpreter;
use yijing_core::settings::{
    DivinationMethod, FontSize, HexagramStyle, ResolvedTheme, SettingsBackend, SettingsSnapshot,
    SettingsStore, SqliteSettingsBackend, Theme,
};

pub const THEME_EVENT: &str = "theme://applied";
pub const PROGRESS_EVENT: &str = "ai://interpretation-progress";

/// Shared state injected into each Tauri command handler.
#[derive(Clone)]
pub struct ApiState {
    pub backend: Arc<SqliteSettingsBackend>,
    pub store: Arc<Mutex<SettingsStore>>,
    pub interpreter: Arc<Interpreter>,
}

#[derive(Clone, Serialize)]
pub struct InterpretationProgress {
    pub text: String,
}

/// Simple health-check endpoint for UI components.
#[tauri::command]
pub fn ping() -> serde_json::Value {
    serde_json::json!({ "ok": true })
}

/// Load persisted preferences once and return the resulting state.
#[tauri::command]
pub async fn settings_load(
    app: AppHandle,
    window: Window,
    state: State<'_, ApiState>,
) -> Result<SettingsSnapshot, String> {
    let check_due = {
        let mut store = state.store.lock().await;
        store.set_system_prefers_dark(matches!(window.theme(), Ok(tauri::Theme::Dark)));
        let check_due = store.load_persisted().await.map_err(|e| e.to_string())?;
        emit_theme(&app, store.apply_theme());
        check_due
    };
    if check_due {
        refresh_ollama(&state).await;
    }
    Ok(state.store.lock().await.snapshot())
}

#[tauri::command]
pub async fn settings_get(state: State<'_, ApiState>) -> Result<SettingsSnapshot, String> {
    Ok(state.store.lock().await.snapshot())
}

/// Raw key/value view of the persisted settings.
#[tauri::command]
pub async fn settings_get_all(
    state: State<'_, ApiState>,
) -> Result<HashMap<String, String>, String> {
    state.backend.get_all().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn settings_set(
    state: State<'_, ApiState>,
    key: String,
    value: String,
) -> Result<(), String> {
    let store = state.store.lock().await;
    store
        .save_setting(&key, &value)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn settings_set_theme(
    app: AppHandle,
    state: State<'_, ApiState>,
    value: Theme,
) -> Result<SettingsSnapshot, String> {
    let mut store = state.store.lock().await;
    store.set_theme(value).await.map_err(|e| e.to_string())?;
    emit_theme(&app, store.actual_theme());
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn settings_set_system_theme(
    app: AppHandle,
    state: State<'_, ApiState>,
    prefers_dark: bool,
) -> Result<SettingsSnapshot, String> {
    let mut store = state.store.lock().await;
    store.set_system_prefers_dark(prefers_dark);
    emit_theme(&app, store.apply_theme());
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn settings_set_font_size(
    state: State<'_, ApiState>,
    value: FontSize,
) -> Result<SettingsSnapshot, String> {
    let mut store = state.store.lock().await;
    store.set_font_size(value).await.map_err(|e| e.to_string())?;
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn settings_set_hexagram_style(
    state: State<'_, ApiState>,
    value: HexagramStyle,
) -> Result<SettingsSnapshot, String> {
    let mut store = state.store.lock().await;
    store
        .set_hexagram_style(value)
        .await
        .map_err(|e| e.to_string())?;
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn settings_set_auto_save(
    state: State<'_, ApiState>,
    value: bool,
) -> Result<SettingsSnapshot, String> {
    let mut store = state.store.lock().await;
    store.set_auto_save(value).await.map_err(|e| e.to_string())?;
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn settings_set_default_method(
    state: State<'_, ApiState>,
    value: DivinationMethod,
) -> Result<SettingsSnapshot, String> {
    let mut store = state.store.lock().await;
    store
        .set_default_method(value)
        .await
        .map_err(|e| e.to_string())?;
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn settings_set_ai_enabled(
    state: State<'_, ApiState>,
    value: bool,
) -> Result<SettingsSnapshot, String> {
    state
        .store
        .lock()
        .await
        .write_ai_enabled(value)
        .await
        .map_err(|e| e.to_string())?;
    if value {
        refresh_ollama(&state).await;
    }
    Ok(state.store.lock().await.snapshot())
}

#[tauri::command]
pub async fn settings_set_ai_ollama_url(
    state: State<'_, ApiState>,
    value: String,
) -> Result<SettingsSnapshot, String> {
    state
        .store
        .lock()
        .await
        .write_ai_ollama_url(value)
        .await
        .map_err(|e| e.to_string())?;
    refresh_ollama(&state).await;
    Ok(state.store.lock().await.snapshot())
}

#[tauri::command]
pub async fn settings_set_ai_model(
    state: State<'_, ApiState>,
    value: String,
) -> Result<SettingsSnapshot, String> {
    let mut store = state.store.lock().await;
    store.set_ai_model(value).await.map_err(|e| e.to_string())?;
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn settings_set_ai_temperature(
    state: State<'_, ApiState>,
    value: f32,
) -> Result<SettingsSnapshot, String> {
    let mut store = state.store.lock().await;
    store
        .set_ai_temperature(value)
        .await
        .map_err(|e| e.to_string())?;
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn settings_set_ai_max_tokens(
    state: State<'_, ApiState>,
    value: u32,
) -> Result<SettingsSnapshot, String> {
    let mut store = state.store.lock().await;
    store
        .set_ai_max_tokens(value)
        .await
        .map_err(|e| e.to_string())?;
    Ok(store.snapshot())
}

/// Check an Ollama server. Without `url` the configured one is re-checked and
/// the store is updated.
#[tauri::command]
pub async fn ai_check_ollama(
    state: State<'_, ApiState>,
    url: Option<String>,
) -> Result<OllamaStatus, String> {
    match url {
        Some(url) => state
            .interpreter
            .client()
            .check(&url)
            .await
            .map_err(|e| e.to_string()),
        None => Ok(refresh_ollama(&state).await),
    }
}

#[tauri::command]
pub async fn ai_list_models(
    state: State<'_, ApiState>,
    url: String,
) -> Result<Vec<OllamaModel>, String> {
    Ok(state.interpreter.client().get_available_models(&url).await)
}

/// Stream a reading, emitting the text accumulated so far on
/// [`PROGRESS_EVENT`] and returning the full text.
#[tauri::command]
pub async fn ai_interpret(
    app: AppHandle,
    state: State<'_, ApiState>,
    input: InterpretationRequest,
) -> Result<String, String> {
    // Snapshot the settings so the store is not locked for the whole stream.
    let settings = state.store.lock().await.ai_settings().clone();
    state
        .interpreter
        .interpret(&settings, &input, |text| {
            let _ = app.emit(
                PROGRESS_EVENT,
                InterpretationProgress {
                    text: text.to_string(),
                },
            );
        })
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn ai_moving_yao_description(positions: Vec<usize>) -> String {
    ai::moving_yao_description(&positions)
}

/// Check the configured server and store the result. The store is only
/// locked to read the URL and to write the status back.
async fn refresh_ollama(state: &ApiState) -> OllamaStatus {
    let (checker, url) = state.store.lock().await.ollama_target();
    let result = checker.check(&url).await;
    let mut store = state.store.lock().await;
    let connected = store.apply_ollama_status(&url, result);
    OllamaStatus {
        connected,
        models: store.available_models().to_vec(),
    }
}

pub fn emit_theme(app: &AppHandle, theme: ResolvedTheme) {
    if let Err(err) = app.emit(THEME_EVENT, theme) {
        log::warn!("failed to emit theme change: {err}");
    }
}

//! In-memory settings state backed by a [`SettingsBackend`].
//!
//! Setters update memory first and persist afterwards. A failed write is
//! returned to the caller but the in-memory value is kept, so the UI keeps
//! showing what the user picked.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use super::backend::SettingsBackend;
use super::prefs::{DivinationMethod, FontSize, HexagramStyle, ResolvedTheme, Theme};
use crate::ai::{default_ai_settings, AiSettings, OllamaChecker, OllamaModel, OllamaStatus};
use crate::errors::Result;

pub mod keys {
    pub const THEME: &str = "theme";
    pub const FONT_SIZE: &str = "fontSize";
    pub const HEXAGRAM_STYLE: &str = "hexagramStyle";
    pub const AUTO_SAVE: &str = "autoSave";
    pub const DEFAULT_METHOD: &str = "defaultMethod";
    pub const AI_ENABLED: &str = "aiEnabled";
    pub const AI_OLLAMA_URL: &str = "aiOllamaUrl";
    pub const AI_MODEL: &str = "aiModel";
    pub const AI_TEMPERATURE: &str = "aiTemperature";
    pub const AI_MAX_TOKENS: &str = "aiMaxTokens";
}

/// Serializable view of the store handed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub theme: Theme,
    pub actual_theme: ResolvedTheme,
    pub font_size: FontSize,
    pub hexagram_style: HexagramStyle,
    pub auto_save: bool,
    pub default_method: DivinationMethod,
    pub is_loaded: bool,
    pub ai_settings: AiSettings,
    pub ollama_connected: bool,
    pub available_models: Vec<OllamaModel>,
}

pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    checker: Arc<dyn OllamaChecker>,
    theme: Theme,
    font_size: FontSize,
    hexagram_style: HexagramStyle,
    auto_save: bool,
    default_method: DivinationMethod,
    is_loaded: bool,
    ai_settings: AiSettings,
    ollama_connected: bool,
    available_models: Vec<OllamaModel>,
    system_prefers_dark: bool,
    applied_theme: Option<ResolvedTheme>,
}

impl SettingsStore {
    pub fn new(backend: Arc<dyn SettingsBackend>, checker: Arc<dyn OllamaChecker>) -> Self {
        Self {
            backend,
            checker,
            theme: Theme::default(),
            font_size: FontSize::default(),
            hexagram_style: HexagramStyle::default(),
            auto_save: true,
            default_method: DivinationMethod::default(),
            is_loaded: false,
            ai_settings: default_ai_settings(),
            ollama_connected: false,
            available_models: Vec::new(),
            system_prefers_dark: false,
            applied_theme: None,
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn font_size(&self) -> FontSize {
        self.font_size
    }

    pub fn hexagram_style(&self) -> HexagramStyle {
        self.hexagram_style
    }

    pub fn auto_save(&self) -> bool {
        self.auto_save
    }

    pub fn default_method(&self) -> DivinationMethod {
        self.default_method
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn ai_settings(&self) -> &AiSettings {
        &self.ai_settings
    }

    pub fn ollama_connected(&self) -> bool {
        self.ollama_connected
    }

    pub fn available_models(&self) -> &[OllamaModel] {
        &self.available_models
    }

    pub fn applied_theme(&self) -> Option<ResolvedTheme> {
        self.applied_theme
    }

    pub fn actual_theme(&self) -> ResolvedTheme {
        match self.theme {
            Theme::Light => ResolvedTheme::Light,
            Theme::Dark => ResolvedTheme::Dark,
            Theme::System if self.system_prefers_dark => ResolvedTheme::Dark,
            Theme::System => ResolvedTheme::Light,
        }
    }

    /// Record the host colour-scheme preference used to resolve `Theme::System`.
    pub fn set_system_prefers_dark(&mut self, prefers_dark: bool) {
        self.system_prefers_dark = prefers_dark;
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            theme: self.theme,
            actual_theme: self.actual_theme(),
            font_size: self.font_size,
            hexagram_style: self.hexagram_style,
            auto_save: self.auto_save,
            default_method: self.default_method,
            is_loaded: self.is_loaded,
            ai_settings: self.ai_settings.clone(),
            ollama_connected: self.ollama_connected,
            available_models: self.available_models.clone(),
        }
    }

    /// Populate the store from the backend once. Later calls are no-ops.
    pub async fn load_settings(&mut self) -> Result<()> {
        if self.load_persisted().await? {
            self.check_ollama().await;
        }
        Ok(())
    }

    /// Read persisted values without contacting Ollama. Returns `true` when
    /// this call loaded the store with AI enabled, i.e. a connection check is
    /// due.
    pub async fn load_persisted(&mut self) -> Result<bool> {
        if self.is_loaded {
            return Ok(false);
        }

        let settings = match self.backend.get_all().await {
            Ok(settings) => settings,
            Err(err) => {
                log::error!("failed to load settings: {err}");
                return Err(err);
            }
        };
        self.apply_persisted(&settings);
        self.is_loaded = true;
        Ok(self.ai_settings.enabled)
    }

    fn apply_persisted(&mut self, settings: &HashMap<String, String>) {
        if let Some(theme) = parse_choice(settings, keys::THEME) {
            self.theme = theme;
        }
        if let Some(size) = parse_choice(settings, keys::FONT_SIZE) {
            self.font_size = size;
        }
        if let Some(style) = parse_choice(settings, keys::HEXAGRAM_STYLE) {
            self.hexagram_style = style;
        }
        if let Some(value) = settings.get(keys::AUTO_SAVE) {
            self.auto_save = value == "true";
        }
        if let Some(method) = parse_choice(settings, keys::DEFAULT_METHOD) {
            self.default_method = method;
        }

        if let Some(value) = settings.get(keys::AI_ENABLED) {
            self.ai_settings.enabled = value == "true";
        }
        if let Some(url) = non_empty(settings, keys::AI_OLLAMA_URL) {
            self.ai_settings.ollama_url = url.to_string();
        }
        if let Some(model) = non_empty(settings, keys::AI_MODEL) {
            self.ai_settings.model = model.to_string();
        }
        if let Some(raw) = non_empty(settings, keys::AI_TEMPERATURE) {
            match raw.trim().parse::<f32>() {
                Ok(value) if value.is_finite() => self.ai_settings.temperature = value,
                _ => log::warn!("ignoring invalid {} value {raw:?}", keys::AI_TEMPERATURE),
            }
        }
        if let Some(raw) = non_empty(settings, keys::AI_MAX_TOKENS) {
            match parse_leading_int(raw) {
                Some(value) => self.ai_settings.max_tokens = value,
                None => log::warn!("ignoring invalid {} value {raw:?}", keys::AI_MAX_TOKENS),
            }
        }
    }

    pub async fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        self.backend.set(key, value).await.map_err(|err| {
            log::error!("failed to save setting {key}: {err}");
            err
        })
    }

    pub async fn set_theme(&mut self, value: Theme) -> Result<()> {
        self.theme = value;
        self.save_setting(keys::THEME, value.as_str()).await?;
        self.apply_theme();
        Ok(())
    }

    pub async fn set_font_size(&mut self, value: FontSize) -> Result<()> {
        self.font_size = value;
        self.save_setting(keys::FONT_SIZE, value.as_str()).await
    }

    pub async fn set_hexagram_style(&mut self, value: HexagramStyle) -> Result<()> {
        self.hexagram_style = value;
        self.save_setting(keys::HEXAGRAM_STYLE, value.as_str()).await
    }

    pub async fn set_auto_save(&mut self, value: bool) -> Result<()> {
        self.auto_save = value;
        self.save_setting(keys::AUTO_SAVE, &value.to_string()).await
    }

    pub async fn set_default_method(&mut self, value: DivinationMethod) -> Result<()> {
        self.default_method = value;
        self.save_setting(keys::DEFAULT_METHOD, value.as_str()).await
    }

    /// Resolve the current theme and mark it as the one shown by the window.
    pub fn apply_theme(&mut self) -> ResolvedTheme {
        let resolved = self.actual_theme();
        self.applied_theme = Some(resolved);
        resolved
    }

    /// Check the configured Ollama server. Errors count as disconnected.
    pub async fn check_ollama(&mut self) -> bool {
        let (checker, url) = self.ollama_target();
        let result = checker.check(&url).await;
        self.apply_ollama_status(&url, result)
    }

    /// Checker and URL for a connection check run outside the store, so a
    /// slow server does not block other readers.
    pub fn ollama_target(&self) -> (Arc<dyn OllamaChecker>, String) {
        (self.checker.clone(), self.ai_settings.ollama_url.clone())
    }

    /// Record the outcome of checking `url`. A result for a URL that is no
    /// longer configured is dropped.
    pub fn apply_ollama_status(&mut self, url: &str, result: Result<OllamaStatus>) -> bool {
        if url != self.ai_settings.ollama_url {
            log::debug!("discarding ollama status for stale url {url}");
            return self.ollama_connected;
        }
        match result {
            Ok(status) => {
                self.ollama_connected = status.connected;
                self.available_models = status.models;
            }
            Err(err) => {
                log::warn!("ollama check failed: {err}");
                self.ollama_connected = false;
                self.available_models = Vec::new();
            }
        }
        self.ollama_connected
    }

    pub async fn set_ai_enabled(&mut self, value: bool) -> Result<()> {
        self.write_ai_enabled(value).await?;
        if value {
            self.check_ollama().await;
        }
        Ok(())
    }

    /// [`Self::set_ai_enabled`] without the follow-up connection check.
    pub async fn write_ai_enabled(&mut self, value: bool) -> Result<()> {
        self.ai_settings.enabled = value;
        self.save_setting(keys::AI_ENABLED, &value.to_string()).await
    }

    pub async fn set_ai_ollama_url(&mut self, value: String) -> Result<()> {
        self.write_ai_ollama_url(value).await?;
        self.check_ollama().await;
        Ok(())
    }

    /// [`Self::set_ai_ollama_url`] without the follow-up connection check.
    pub async fn write_ai_ollama_url(&mut self, value: String) -> Result<()> {
        self.ai_settings.ollama_url = value;
        let url = self.ai_settings.ollama_url.clone();
        self.save_setting(keys::AI_OLLAMA_URL, &url).await
    }

    pub async fn set_ai_model(&mut self, value: String) -> Result<()> {
        self.ai_settings.model = value;
        let model = self.ai_settings.model.clone();
        self.save_setting(keys::AI_MODEL, &model).await
    }

    pub async fn set_ai_temperature(&mut self, value: f32) -> Result<()> {
        self.ai_settings.temperature = value;
        self.save_setting(keys::AI_TEMPERATURE, &value.to_string()).await
    }

    pub async fn set_ai_max_tokens(&mut self, value: u32) -> Result<()> {
        self.ai_settings.max_tokens = value;
        self.save_setting(keys::AI_MAX_TOKENS, &value.to_string()).await
    }
}

fn non_empty<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn parse_choice<T>(settings: &HashMap<String, String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = non_empty(settings, key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("ignoring persisted {key}: {err}");
            None
        }
    }
}

/// Integer prefix of `raw` after leading whitespace, e.g. `"2048.5"` -> 2048.
fn parse_leading_int(raw: &str) -> Option<u32> {
    let trimmed = raw.trim_start();
    let digits = trimmed
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, c)| i + c.len_utf8())?;
    trimmed[..digits].parse().ok()
}

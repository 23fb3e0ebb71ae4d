//! Interpretation service that routes readings through the Ollama client and
//! records every invocation in the event log.
//!
//! Callers hand over the current [`AiSettings`] and the hexagram data; the
//! service refuses to contact the server while AI is switched off or no model
//! has been picked, so the UI gets a specific error instead of an HTTP 400.

use std::sync::Arc;

use serde_json::json;
use tokio::task::spawn_blocking;

use crate::ai::{AiSettings, InterpretationRequest, OllamaClient};
use crate::db::DbPool;
use crate::errors::{Result, YijingError};
use crate::logging::log_event;

const PREVIEW_CHARS: usize = 200;

pub struct Interpreter {
    pool: DbPool,
    client: OllamaClient,
}

impl Interpreter {
    pub fn new(pool: DbPool, client: OllamaClient) -> Arc<Self> {
        Arc::new(Self { pool, client })
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    /// Generate a reading, forwarding the text accumulated so far to
    /// `on_progress` as fragments arrive.
    pub async fn interpret<F>(
        &self,
        settings: &AiSettings,
        request: &InterpretationRequest,
        on_progress: F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        if !settings.enabled {
            return Err(YijingError::AiDisabled);
        }
        if settings.model.trim().is_empty() {
            return Err(YijingError::ModelNotSelected);
        }

        match self
            .client
            .generate_interpretation(settings, request, on_progress)
            .await
        {
            Ok(text) => {
                log_invocation_success(&self.pool, settings, request, &text).await;
                Ok(text)
            }
            Err(err) => {
                log_invocation_failure(&self.pool, settings, &err).await;
                Err(err)
            }
        }
    }
}

async fn log_invocation_success(
    pool: &DbPool,
    settings: &AiSettings,
    request: &InterpretationRequest,
    text: &str,
) {
    let data = json!({
        "model": settings.model,
        "hexagram": request.original_hexagram.name,
        "changed": request.changed_hexagram.as_ref().map(|h| h.name.clone()),
        "chars": text.chars().count(),
        "preview": text.chars().take(PREVIEW_CHARS).collect::<String>(),
    });
    record(pool, "info", "AI-0200", "AI interpretation succeeded", None, data).await;
}

async fn log_invocation_failure(pool: &DbPool, settings: &AiSettings, error: &YijingError) {
    let data = json!({
        "model": settings.model,
        "url": settings.ollama_url,
        "code": error.code(),
        "error": error.to_string(),
    });
    record(
        pool,
        "warn",
        "AI-0201",
        "AI interpretation failed",
        Some(error.explain()),
        data,
    )
    .await;
}

async fn record(
    pool: &DbPool,
    level: &'static str,
    code: &'static str,
    message: &'static str,
    explain: Option<&'static str>,
    data: serde_json::Value,
) {
    let pool = pool.clone();
    let outcome = spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        log_event(
            &conn,
            level,
            Some(code),
            "ai.interpretation",
            message,
            explain,
            Some(data),
        )
        .map_err(|e| e.to_string())
    })
    .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::warn!("could not record interpretation event: {err}"),
        Err(err) => log::warn!("interpretation event task failed: {err}"),
    }
}

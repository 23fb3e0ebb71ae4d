use thiserror::Error;

#[derive(Debug, Error)]
pub enum YijingError {
    #[error("Settings storage unavailable: {0}")]
    SettingsUnavailable(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Background task failed: {0}")]
    Task(String),
    #[error("AI interpretation is disabled")]
    AiDisabled,
    #[error("No Ollama model selected")]
    ModelNotSelected,
    #[error("Ollama request failed: {0}")]
    OllamaStatus(u16),
    #[error("Ollama reported an error: {0}")]
    OllamaStream(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl YijingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SettingsUnavailable(_) => "SET-1001",
            Self::Database(_) => "DB-1001",
            Self::Task(_) => "GEN-1001",
            Self::AiDisabled => "AI-1001",
            Self::ModelNotSelected => "AI-1002",
            Self::OllamaStatus(_) => "AI-1003",
            Self::OllamaStream(_) => "AI-1004",
            Self::Http(_) => "NET-1001",
            Self::Serialization(_) => "GEN-1002",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::SettingsUnavailable(_) => "The settings store could not be read or written.",
            Self::Database(_) => "The application could not access the SQLite database.",
            Self::Task(_) => "A background worker thread stopped unexpectedly.",
            Self::AiDisabled => "Enable AI interpretation in the settings before asking for a reading.",
            Self::ModelNotSelected => "Choose one of the models installed in Ollama first.",
            Self::OllamaStatus(_) => "The Ollama server answered with an error status.",
            Self::OllamaStream(_) => "The Ollama server aborted the generation.",
            Self::Http(_) => "The Ollama server could not be reached or timed out.",
            Self::Serialization(_) => "A payload could not be encoded or decoded as JSON.",
        }
    }
}

impl From<r2d2::Error> for YijingError {
    fn from(err: r2d2::Error) -> Self {
        Self::SettingsUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for YijingError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, YijingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_mentions_code() {
        let err = YijingError::OllamaStatus(404);
        assert_eq!(err.to_string(), "Ollama request failed: 404");
        assert_eq!(err.code(), "AI-1003");
    }

    #[test]
    fn every_variant_has_an_explanation() {
        let errors = [
            YijingError::SettingsUnavailable("x".into()),
            YijingError::AiDisabled,
            YijingError::ModelNotSelected,
            YijingError::OllamaStream("boom".into()),
        ];
        for err in errors {
            assert!(!err.explain().is_empty());
        }
    }
}

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::prompt::InterpretationRequest;
use super::stream::{GenerateChunk, NdjsonDecoder};
use super::{AiSettings, OllamaModel, OllamaStatus};
use crate::errors::{Result, YijingError};

/// Per-request deadlines for the three Ollama calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OllamaTimeouts {
    pub connection_check: Duration,
    pub list_models: Duration,
    pub generate: Duration,
}

impl Default for OllamaTimeouts {
    fn default() -> Self {
        Self {
            connection_check: Duration::from_secs(5),
            list_models: Duration::from_secs(10),
            generate: Duration::from_secs(120),
        }
    }
}

/// Reports whether an Ollama server is reachable and which models it serves.
#[async_trait]
pub trait OllamaChecker: Send + Sync {
    async fn check(&self, url: &str) -> Result<OllamaStatus>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Option<Vec<OllamaModel>>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    timeouts: OllamaTimeouts,
}

impl OllamaClient {
    pub fn new() -> Result<Self> {
        Self::with_timeouts(OllamaTimeouts::default())
    }

    pub fn with_timeouts(timeouts: OllamaTimeouts) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("Yijing-Core/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeouts })
    }

    /// `GET /api/tags`; any OK status counts as connected.
    pub async fn check_connection(&self, url: &str) -> bool {
        match self
            .client
            .get(endpoint(url, "/api/tags"))
            .timeout(self.timeouts.connection_check)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                log::debug!("ollama connection check against {url} failed: {err}");
                false
            }
        }
    }

    pub async fn get_available_models(&self, url: &str) -> Vec<OllamaModel> {
        let response = match self
            .client
            .get(endpoint(url, "/api/tags"))
            .timeout(self.timeouts.list_models)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                log::warn!("ollama model listing returned {}", response.status());
                return Vec::new();
            }
            Err(err) => {
                log::warn!("ollama model listing failed: {err}");
                return Vec::new();
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => tags.models.unwrap_or_default(),
            Err(err) => {
                log::warn!("ollama model listing was not valid JSON: {err}");
                Vec::new()
            }
        }
    }

    /// Stream a reading for `request`, calling `on_progress` with the text
    /// accumulated so far each time a fragment arrives.
    pub async fn generate_interpretation<F>(
        &self,
        settings: &AiSettings,
        request: &InterpretationRequest,
        mut on_progress: F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let prompt = request.prompt();
        let payload = GenerateRequest {
            model: &settings.model,
            prompt: &prompt,
            stream: true,
            options: GenerateOptions {
                temperature: settings.temperature,
                num_predict: settings.max_tokens,
            },
        };

        let response = self
            .client
            .post(endpoint(&settings.ollama_url, "/api/generate"))
            .json(&payload)
            .timeout(self.timeouts.generate)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(YijingError::OllamaStatus(response.status().as_u16()));
        }

        let mut body = response.bytes_stream();
        let mut decoder = NdjsonDecoder::new();
        let mut full_text = String::new();

        let mut done = false;

        'read: while let Some(bytes) = body.next().await {
            let bytes = bytes?;
            for chunk in decoder.push(&bytes) {
                if absorb(chunk, &mut full_text, &mut on_progress)? {
                    done = true;
                    break 'read;
                }
            }
        }
        if !done {
            if let Some(chunk) = decoder.finish() {
                absorb(chunk, &mut full_text, &mut on_progress)?;
            }
        }

        Ok(full_text)
    }
}

#[async_trait]
impl OllamaChecker for OllamaClient {
    async fn check(&self, url: &str) -> Result<OllamaStatus> {
        let connected = self.check_connection(url).await;
        let models = if connected {
            self.get_available_models(url).await
        } else {
            Vec::new()
        };
        Ok(OllamaStatus { connected, models })
    }
}

/// Fold one chunk into `full_text`. Returns `true` once the server marks the
/// reading as done.
fn absorb<F>(chunk: GenerateChunk, full_text: &mut String, on_progress: &mut F) -> Result<bool>
where
    F: FnMut(&str),
{
    if let Some(message) = chunk.error {
        return Err(YijingError::OllamaStream(message));
    }
    match chunk.response {
        Some(fragment) if !fragment.is_empty() => {
            full_text.push_str(&fragment);
            on_progress(full_text);
        }
        _ => {}
    }
    Ok(chunk.done)
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Hexagram;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> AiSettings {
        AiSettings {
            enabled: true,
            ollama_url: format!("{}/", server.uri()),
            model: "qwen2.5:7b".into(),
            temperature: 0.5,
            max_tokens: 800,
        }
    }

    fn request() -> InterpretationRequest {
        InterpretationRequest {
            question: Some("今年运势".into()),
            original_hexagram: Hexagram {
                name: "泰".into(),
                description: Some("地天泰".into()),
                guaci: "小往大来，吉亨".into(),
                tuanci: "天地交而万物通也".into(),
                xiangci: "天地交，泰".into(),
            },
            changed_hexagram: None,
            moving_yao_positions: vec![],
        }
    }

    fn impatient_client() -> OllamaClient {
        OllamaClient::with_timeouts(OllamaTimeouts {
            connection_check: Duration::from_millis(100),
            list_models: Duration::from_millis(100),
            generate: Duration::from_millis(100),
        })
        .unwrap()
    }

    #[test]
    fn default_timeouts_match_ollama_call_budgets() {
        let client = OllamaClient::new().unwrap();
        assert_eq!(client.timeouts, OllamaTimeouts::default());
        assert_eq!(client.timeouts.connection_check, Duration::from_secs(5));
        assert_eq!(client.timeouts.list_models, Duration::from_secs(10));
        assert_eq!(client.timeouts.generate, Duration::from_secs(120));
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        assert_eq!(
            endpoint("http://localhost:11434/", "/api/tags"),
            "http://localhost:11434/api/tags"
        );
    }

    #[tokio::test]
    async fn check_connection_reflects_status_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("not json", "text/plain"))
            .mount(&server)
            .await;

        let client = OllamaClient::new().unwrap();
        assert!(client.check_connection(&server.uri()).await);
        assert!(!client.check_connection("http://127.0.0.1:1").await);
    }

    #[tokio::test]
    async fn check_connection_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = OllamaClient::new().unwrap();
        assert!(!client.check_connection(&server.uri()).await);
        assert!(client.get_available_models(&server.uri()).await.is_empty());
    }

    #[tokio::test]
    async fn check_lists_models_when_connected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    { "name": "qwen2.5:7b", "size": 1 },
                    { "name": "llama3.1:8b" }
                ]
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new().unwrap();
        let status = client.check(&server.uri()).await.unwrap();
        assert!(status.connected);
        let names: Vec<_> = status.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["qwen2.5:7b", "llama3.1:8b"]);
    }

    #[tokio::test]
    async fn missing_model_list_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = OllamaClient::new().unwrap();
        assert!(client.get_available_models(&server.uri()).await.is_empty());
    }

    #[tokio::test]
    async fn generate_accumulates_streamed_fragments() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"response\":\"泰卦\",\"done\":false}\n",
            "\n",
            "{\"response\":\"通达\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true,\"eval_count\":12}"
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "qwen2.5:7b",
                "stream": true,
                "options": { "temperature": 0.5, "num_predict": 800 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaClient::new().unwrap();
        let mut progress = Vec::new();
        let text = client
            .generate_interpretation(&settings_for(&server), &request(), |t| {
                progress.push(t.to_string())
            })
            .await
            .unwrap();

        assert_eq!(text, "泰卦通达");
        assert_eq!(progress, ["泰卦", "泰卦通达"]);
    }

    #[tokio::test]
    async fn generate_reports_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = OllamaClient::new().unwrap();
        let err = client
            .generate_interpretation(&settings_for(&server), &request(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, YijingError::OllamaStatus(404)));
    }

    #[tokio::test]
    async fn generate_stops_on_stream_error() {
        let server = MockServer::start().await;
        let body = "{\"response\":\"半\"}\n{\"error\":\"out of memory\"}\n";
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let client = OllamaClient::new().unwrap();
        let err = client
            .generate_interpretation(&settings_for(&server), &request(), |_| {})
            .await
            .unwrap_err();
        match err {
            YijingError::OllamaStream(message) => assert_eq!(message, "out of memory"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn model_list_that_is_not_json_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("not json", "text/plain"))
            .mount(&server)
            .await;

        let client = OllamaClient::new().unwrap();
        assert!(client.get_available_models(&server.uri()).await.is_empty());
    }

    #[tokio::test]
    async fn slow_server_trips_request_timeouts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "models": [{ "name": "qwen2.5:7b" }] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("{\"response\":\"迟\",\"done\":true}\n", "application/x-ndjson")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = impatient_client();
        assert!(!client.check_connection(&server.uri()).await);
        assert!(client.get_available_models(&server.uri()).await.is_empty());

        let status = client.check(&server.uri()).await.unwrap();
        assert!(!status.connected);
        assert!(status.models.is_empty());

        let err = client
            .generate_interpretation(&settings_for(&server), &request(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, YijingError::Http(ref e) if e.is_timeout()), "{err}");
    }

    #[tokio::test]
    async fn generate_ignores_lines_after_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"response\":\"既济\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
            "{\"response\":\"多余\",\"done\":false}\n"
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let client = OllamaClient::new().unwrap();
        let text = client
            .generate_interpretation(&settings_for(&server), &request(), |_| {})
            .await
            .unwrap();
        assert_eq!(text, "既济");
    }
}

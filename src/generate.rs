//! Answer generator abstraction and implementations.
//!
//! The conversation engine treats the language model as a callable that
//! takes a question, the retrieved context, and the prior transcript and
//! returns answer text. Two providers are implemented behind the
//! [`AnswerGenerator`] trait:
//! - **[`OpenAiGenerator`]** — `POST /v1/chat/completions`
//! - **[`OllamaGenerator`]** — `POST /api/chat` on a local Ollama
//!
//! Both use the same retry strategy as the embedding providers: 429/5xx
//! and network errors retried with exponential backoff, other client
//! errors fatal.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::GenerateError;
use crate::models::ConversationTurn;

const SYSTEM_PROMPT: &str = "You answer questions about the user's documents. \
    Ground every answer in the document excerpts provided in the conversation. \
    If the excerpts contain no relevant information, say that no relevant \
    information was found in the selected documents; do not invent content.";

/// Everything the generator sees for one question.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    /// Source-tagged retrieved excerpts. May be empty; the system prompt
    /// covers the "nothing relevant found" case.
    pub context: &'a str,
    /// Prior turns, oldest first, already budget-evicted by the caller.
    pub history: &'a [ConversationTurn],
}

/// Trait for answer generation backends.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Produce an answer for `request`.
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerateError>;
}

/// Create the appropriate [`AnswerGenerator`] from configuration.
///
/// Supported providers: `"openai"`, `"ollama"`.
pub fn create_generator(
    config: &GenerationConfig,
) -> Result<Box<dyn AnswerGenerator>, GenerateError> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => Err(GenerateError::Config(format!(
            "unknown generation provider: {other}"
        ))),
    }
}

/// Build the chat message list both providers consume.
///
/// Order: system prompt, document excerpts, prior question/answer pairs
/// oldest first, then the new question.
fn build_messages(request: &GenerationRequest<'_>) -> Vec<serde_json::Value> {
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": SYSTEM_PROMPT,
    })];

    let excerpts = if request.context.is_empty() {
        "No document excerpts were retrieved for this question.".to_string()
    } else {
        format!("Document excerpts:\n\n{}", request.context)
    };
    messages.push(serde_json::json!({"role": "system", "content": excerpts}));

    for turn in request.history {
        messages.push(serde_json::json!({"role": "user", "content": turn.question}));
        messages.push(serde_json::json!({"role": "assistant", "content": turn.answer}));
    }

    messages.push(serde_json::json!({"role": "user", "content": request.question}));
    messages
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

// ============ OpenAI ============

/// Chat-completion generator using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiGenerator {
    model: String,
    api_key: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerateError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| GenerateError::Config("generation.model required for OpenAI".into()))?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            GenerateError::Config("OPENAI_API_KEY environment variable not set".into())
        })?;

        Ok(Self {
            model,
            api_key,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": build_messages(&request),
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_openai_chat(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("OpenAI API error {status}: {body_text}"));
                        continue;
                    }

                    return Err(GenerateError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(GenerateError::Exhausted {
            attempts: self.max_retries + 1,
            last: last_err.unwrap_or_else(|| "no response".into()),
        })
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String, GenerateError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or(GenerateError::EmptyResponse)
}

// ============ Ollama ============

/// Chat generator using a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    url: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerateError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| GenerateError::Config("generation.model required for Ollama".into()))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            url,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": build_messages(&request),
            "stream": false,
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = client
                .post(format!("{}/api/chat", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_ollama_chat(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("Ollama API error {status}: {body_text}"));
                        continue;
                    }

                    return Err(GenerateError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                Err(e) => {
                    last_err = Some(format!(
                        "Ollama connection error (is Ollama running at {}?): {e}",
                        self.url
                    ));
                    continue;
                }
            }
        }

        Err(GenerateError::Exhausted {
            attempts: self.max_retries + 1,
            last: last_err.unwrap_or_else(|| "no response".into()),
        })
    }
}

fn parse_ollama_chat(json: &serde_json::Value) -> Result<String, GenerateError> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or(GenerateError::EmptyResponse)
}

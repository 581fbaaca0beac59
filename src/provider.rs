//! Model Provider
//!
//! OpenAI-compatible chat-completions client plus the blocking adapters that let a
//! model act as a [`ContentGenerator`] or as the independent [`ContentScorer`] path.
//! Collaborator calls are synchronous from the scheduler's point of view, so each
//! adapter owns a tokio runtime and blocks on the async client.

use crate::error::{ApiError, GenerationError, ScoringError};
use crate::generation::{describe, humanize, ContentGenerator, Feedback};
use crate::phase::Phase;
use crate::quality::{RawScore, SectionBrief, COMPLETENESS, GRAMMAR, RELEVANCE, STRUCTURE};
use crate::types::{FactSheet, HIGHLIGHTS_KEY};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// `[provider]` configuration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Use the model for generation and as the second scoring path
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Inline key; prefer `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// Inline key first, then the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Model provider client
#[async_trait]
pub trait ModelProviderClient: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
    finish_reason: Option<String>,
}

fn status_error(status: u16, detail: String) -> ApiError {
    match status {
        401 => ApiError::ProviderAuthFailed(format!("Authentication failed: {}", detail)),
        429 => ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", detail)),
        _ => ApiError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, detail
        )),
    }
}

fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        status_error(status.as_u16(), error.to_string())
    } else if error.is_timeout() {
        ApiError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for any endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatibleClient {
    client: Client,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ModelProviderClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .map(|msg| WireMessage {
                    role: msg.role.as_str().to_string(),
                    content: msg.content,
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::ProviderError("No choices in response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content,
            model: completion.model,
            usage: completion.usage.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Blocking bridge over an async client, shared by the generator and scorer.
pub struct BlockingProvider {
    client: Arc<dyn ModelProviderClient>,
    runtime: tokio::runtime::Runtime,
    options: CompletionOptions,
    usage: Mutex<TokenUsage>,
}

impl BlockingProvider {
    pub fn new(client: Arc<dyn ModelProviderClient>, options: CompletionOptions) -> Result<Self, ApiError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(ApiError::ProviderError(
                "Cannot create a blocking provider from within an async runtime".to_string(),
            ));
        }
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| ApiError::ProviderError(format!("Failed to create runtime: {}", e)))?;
        Ok(Self {
            client,
            runtime,
            options,
            usage: Mutex::new(TokenUsage::default()),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ApiError> {
        if config.model.trim().is_empty() {
            return Err(ApiError::ProviderNotConfigured("model is empty".to_string()));
        }
        let client = OpenAiCompatibleClient::new(config)?;
        Self::new(Arc::new(client), config.options())
    }

    pub fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let response = self
            .runtime
            .block_on(self.client.complete(messages, self.options.clone()))?;
        self.usage.lock().add(response.usage);
        debug!(
            model = %response.model,
            total_tokens = response.usage.total_tokens,
            finish_reason = ?response.finish_reason,
            "Provider completion received"
        );
        Ok(response.content)
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Tokens consumed across every call so far.
    pub fn usage(&self) -> TokenUsage {
        *self.usage.lock()
    }
}

const GENERATOR_SYSTEM_PROMPT: &str = "You write concise, accurate markdown documentation \
for software repositories. Use only the facts you are given. Start with a level-2 heading \
for the section and use level-3 headings for subsections.";

const SCORER_SYSTEM_PROMPT: &str = "You review documentation drafts. Respond with JSON only: \
{\"criteria\": {\"completeness\": n, \"structure\": n, \"relevance\": n, \"grammar\": n}, \
\"overall\": n} where every n is a number from 0 to 100.";

fn render_facts(phase: &Phase, facts: &FactSheet) -> String {
    let mut out = String::new();
    let subset = facts.subset(&phase.required_tools);
    for (tool, value) in subset.facts() {
        let _ = writeln!(out, "[{}]", humanize(tool));
        if let Value::Object(map) = value {
            for (key, fact) in map.iter().filter(|(k, _)| k.as_str() != HIGHLIGHTS_KEY) {
                if let Some(text) = describe(fact) {
                    let _ = writeln!(out, "- {}: {}", humanize(key), text);
                }
            }
        } else if let Some(text) = describe(value) {
            let _ = writeln!(out, "- {}", text);
        }
    }
    for (tool, reason) in subset.gaps() {
        let _ = writeln!(out, "[{}] unavailable: {}", humanize(tool), reason);
    }
    out
}

/// Builds the user prompt for one section.
pub fn generation_prompt(phase: &Phase, facts: &FactSheet, feedback: Option<&Feedback>) -> String {
    let mut prompt = format!(
        "Write the \"{}\" section of the project documentation.\n",
        phase.title()
    );
    if !phase.expected_subsections.is_empty() {
        let _ = writeln!(
            prompt,
            "Include these subsections: {}.",
            phase.expected_subsections.join(", ")
        );
    }
    if phase.min_words > 0 {
        let _ = writeln!(prompt, "Write at least {} words.", phase.min_words);
    }
    let _ = writeln!(prompt, "\nFacts:\n{}", render_facts(phase, facts));
    if let Some(feedback) = feedback {
        let _ = writeln!(prompt, "{}", feedback.instructions());
        if let Some(previous) = &feedback.previous_draft {
            let _ = writeln!(prompt, "Previous draft:\n{}", previous);
        }
    }
    prompt
}

/// Model-backed generator.
pub struct ProviderGenerator {
    provider: Arc<BlockingProvider>,
}

impl ProviderGenerator {
    pub fn new(provider: Arc<BlockingProvider>) -> Self {
        Self { provider }
    }
}

impl ContentGenerator for ProviderGenerator {
    fn generate_content(
        &self,
        phase: &Phase,
        facts: &FactSheet,
        feedback: Option<&Feedback>,
    ) -> Result<String, GenerationError> {
        let messages = vec![
            ChatMessage::system(GENERATOR_SYSTEM_PROMPT),
            ChatMessage::user(generation_prompt(phase, facts, feedback)),
        ];
        Ok(self.provider.complete(messages)?.trim().to_string())
    }
}

/// Extract a score payload from model output that may wrap JSON in prose or fences.
pub fn parse_score_payload(text: &str) -> Result<RawScore, ScoringError> {
    let start = text
        .find('{')
        .ok_or_else(|| ScoringError::Malformed("no JSON object in response".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ScoringError::Malformed("unterminated JSON object".to_string()))?;
    let value: Value = serde_json::from_str(&text[start..=end])
        .map_err(|e| ScoringError::Malformed(e.to_string()))?;

    let mut criteria = BTreeMap::new();
    let source = value.get("criteria").unwrap_or(&value);
    for name in [COMPLETENESS, STRUCTURE, RELEVANCE, GRAMMAR] {
        if let Some(score) = source.get(name).and_then(Value::as_f64) {
            criteria.insert(name.to_string(), score);
        }
    }
    let overall = value.get("overall").and_then(Value::as_f64);
    if criteria.is_empty() && overall.is_none() {
        return Err(ScoringError::Malformed("no recognizable scores".to_string()));
    }
    Ok(RawScore { criteria, overall })
}

/// Model-backed scorer; the independent validator path.
pub struct ProviderScorer {
    provider: Arc<BlockingProvider>,
}

impl ProviderScorer {
    pub fn new(provider: Arc<BlockingProvider>) -> Self {
        Self { provider }
    }
}

impl crate::quality::ContentScorer for ProviderScorer {
    fn source(&self) -> &str {
        "provider"
    }

    fn score_content(&self, draft_text: &str, section: &SectionBrief) -> Result<RawScore, ScoringError> {
        let mut prompt = format!("Section: {}\n", section.title);
        if !section.expected_subsections.is_empty() {
            let _ = writeln!(
                prompt,
                "Expected subsections: {}",
                section.expected_subsections.join(", ")
            );
        }
        if !section.highlights.is_empty() {
            let _ = writeln!(prompt, "Key project terms: {}", section.highlights.join(", "));
        }
        let _ = writeln!(prompt, "Minimum words: {}\n\nDraft:\n{}", section.min_words, draft_text);

        let response = self.provider.complete(vec![
            ChatMessage::system(SCORER_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ])?;
        parse_score_payload(&response)
    }
}

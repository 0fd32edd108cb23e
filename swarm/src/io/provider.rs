//! HTTP chat-completion providers.
//!
//! xai, openai, groq and ollama speak the OpenAI chat-completions dialect;
//! anthropic uses its messages endpoint. Settings are resolved once from the
//! config plus environment, and a missing API key is reported as a
//! configuration error before any stage runs.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::agent::{Agent, AgentError, AgentRequest};
use crate::io::config::AgentConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

/// Supported generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Xai,
    Anthropic,
    OpenAi,
    Groq,
    Ollama,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Xai,
        Provider::Anthropic,
        Provider::OpenAi,
        Provider::Groq,
        Provider::Ollama,
    ];

    pub fn parse(name: &str) -> Result<Self, AgentError> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == name)
            .ok_or_else(|| {
                AgentError::Configuration(format!(
                    "Unsupported LLM_PROVIDER '{name}'. Use one of: xai, anthropic, openai, groq, ollama"
                ))
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Xai => "xai",
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
            Provider::Ollama => "ollama",
        }
    }

    /// Prefix of this provider's environment variables (`XAI_MODEL`, ...).
    fn env_prefix(self) -> &'static str {
        match self {
            Provider::Xai => "XAI",
            Provider::Anthropic => "ANTHROPIC",
            Provider::OpenAi => "OPENAI",
            Provider::Groq => "GROQ",
            Provider::Ollama => "OLLAMA",
        }
    }

    fn requires_key(self) -> bool {
        self != Provider::Ollama
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::Xai => "grok-4-latest",
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
            Provider::OpenAi => "gpt-4o",
            Provider::Groq => "llama-3.3-70b-versatile",
            Provider::Ollama => "llama3.1:8b",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Provider::Xai => "https://api.x.ai/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved provider settings.
#[derive(Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderSettings {
    /// Resolve settings from config and an environment lookup.
    ///
    /// Environment wins over the config file: `LLM_PROVIDER`, `TEMPERATURE`,
    /// `<PROVIDER>_MODEL`, `<PROVIDER>_BASE_URL`. The config model and base
    /// URL are ignored when `LLM_PROVIDER` selects a different provider. The
    /// key is read from `<PROVIDER>_API_KEY` only.
    pub fn resolve<F>(cfg: &AgentConfig, env: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        let provider = Provider::parse(&env("LLM_PROVIDER").unwrap_or_else(|| cfg.provider.clone()))?;
        let prefix = provider.env_prefix();

        let temperature = match env("TEMPERATURE") {
            Some(raw) => raw.trim().parse::<f32>().map_err(|_| {
                AgentError::Configuration(format!("TEMPERATURE must be a number (got '{raw}')"))
            })?,
            None => cfg.temperature,
        };

        let api_key = env(&format!("{prefix}_API_KEY"));
        if provider.requires_key() && api_key.is_none() {
            return Err(AgentError::Configuration(format!(
                "Missing required environment variable: {prefix}_API_KEY"
            )));
        }

        // Config model and URL belong to the configured provider only.
        let configured = Provider::parse(&cfg.provider).ok() == Some(provider);
        let model = env(&format!("{prefix}_MODEL"))
            .or_else(|| cfg.model.clone().filter(|_| configured))
            .unwrap_or_else(|| provider.default_model().to_string());
        let base_url = env(&format!("{prefix}_BASE_URL"))
            .or_else(|| cfg.base_url.clone().filter(|_| configured))
            .unwrap_or_else(|| provider.default_base_url().to_string());

        Ok(Self {
            provider,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn chat_body<'a>(settings: &'a ProviderSettings, request: &AgentRequest) -> ChatRequest<'a> {
    ChatRequest {
        model: &settings.model,
        messages: vec![
            Message::new("system", &request.system),
            Message::new("user", &request.prompt),
        ],
        temperature: settings.temperature,
        stream: false,
    }
}

fn anthropic_body<'a>(
    settings: &'a ProviderSettings,
    request: &'a AgentRequest,
) -> AnthropicRequest<'a> {
    AnthropicRequest {
        model: &settings.model,
        max_tokens: ANTHROPIC_MAX_TOKENS,
        system: &request.system,
        messages: vec![Message::new("user", &request.prompt)],
        // Anthropic caps temperature at 1.0.
        temperature: settings.temperature.min(1.0),
    }
}

fn parse_chat_response(body: &str) -> anyhow::Result<String> {
    let response: ChatResponse = serde_json::from_str(body).context("parse chat response")?;
    let text = response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("chat response has no message content"))?;
    non_empty(text)
}

fn parse_anthropic_response(body: &str) -> anyhow::Result<String> {
    let response: AnthropicResponse =
        serde_json::from_str(body).context("parse anthropic response")?;
    let text = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    non_empty(text)
}

fn non_empty(text: String) -> anyhow::Result<String> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(anyhow!("provider returned empty text"));
    }
    Ok(text)
}

/// Agent backed by an HTTP provider.
pub struct HttpAgent {
    settings: ProviderSettings,
    client: reqwest::blocking::Client,
}

impl HttpAgent {
    pub fn new(settings: ProviderSettings) -> Result<Self, AgentError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| AgentError::Configuration(format!("build http client: {err}")))?;
        info!(provider = %settings.provider, model = %settings.model, "http agent ready");
        Ok(Self { settings, client })
    }

    fn post_json<T: Serialize>(&self, url: &str, body: &T) -> anyhow::Result<String> {
        let mut builder = self.client.post(url).json(body);
        builder = match self.settings.provider {
            Provider::Anthropic => builder
                .header("x-api-key", self.settings.api_key.as_deref().unwrap_or_default())
                .header("anthropic-version", ANTHROPIC_VERSION),
            _ => match &self.settings.api_key {
                Some(key) => builder.bearer_auth(key),
                None => builder,
            },
        };

        let response = builder
            .send()
            .with_context(|| format!("send request to {url}"))?;
        let status = response.status();
        let text = response.text().context("read response body")?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "provider returned error status");
            let snippet: String = text.chars().take(500).collect();
            return Err(anyhow!("{} returned {status}: {snippet}", self.settings.provider));
        }
        Ok(text)
    }
}

impl Agent for HttpAgent {
    #[instrument(skip_all, fields(stage = %request.stage, provider = %self.settings.provider))]
    fn invoke(&self, request: &AgentRequest) -> Result<String, AgentError> {
        let base = &self.settings.base_url;
        let text = match self.settings.provider {
            Provider::Anthropic => {
                let body = anthropic_body(&self.settings, request);
                let raw = self.post_json(&format!("{base}/messages"), &body)?;
                parse_anthropic_response(&raw)?
            }
            _ => {
                let body = chat_body(&self.settings, request);
                let raw = self.post_json(&format!("{base}/chat/completions"), &body)?;
                parse_chat_response(&raw)?
            }
        };
        debug!(bytes = text.len(), "provider call completed");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Stage;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let err = ProviderSettings::resolve(&AgentConfig::default(), lookup(&[])).unwrap_err();
        match err {
            AgentError::Configuration(msg) => assert!(msg.contains("XAI_API_KEY")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_provider_lists_supported_ones() {
        let err =
            ProviderSettings::resolve(&AgentConfig::default(), lookup(&[("LLM_PROVIDER", "bard")]))
                .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(msg) if msg.contains("ollama")));
    }

    #[test]
    fn ollama_needs_no_key_and_uses_defaults() {
        let settings = ProviderSettings::resolve(
            &AgentConfig::default(),
            lookup(&[("LLM_PROVIDER", "Ollama")]),
        )
        .expect("resolve");
        assert_eq!(settings.provider, Provider::Ollama);
        assert_eq!(settings.model, "llama3.1:8b");
        assert_eq!(settings.base_url, "http://localhost:11434/v1");
        assert_eq!(settings.api_key, None);
    }

    #[test]
    fn env_overrides_config() {
        let cfg = AgentConfig {
            provider: "openai".to_string(),
            model: Some("from-config".to_string()),
            ..AgentConfig::default()
        };
        let settings = ProviderSettings::resolve(
            &cfg,
            lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_MODEL", "from-env"),
                ("OPENAI_BASE_URL", "http://proxy.local/v1/"),
                ("TEMPERATURE", "0.2"),
            ]),
        )
        .expect("resolve");
        assert_eq!(settings.model, "from-env");
        assert_eq!(settings.base_url, "http://proxy.local/v1");
        assert!((settings.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn env_provider_switch_ignores_config_model_and_url() {
        let cfg = AgentConfig {
            provider: "openai".to_string(),
            model: Some("gpt-4o".to_string()),
            base_url: Some("http://openai-proxy.local/v1".to_string()),
            ..AgentConfig::default()
        };
        let settings = ProviderSettings::resolve(
            &cfg,
            lookup(&[("LLM_PROVIDER", "anthropic"), ("ANTHROPIC_API_KEY", "sk-ant")]),
        )
        .expect("resolve");
        assert_eq!(settings.provider, Provider::Anthropic);
        assert_eq!(settings.model, Provider::Anthropic.default_model());
        assert_eq!(settings.base_url, Provider::Anthropic.default_base_url().trim_end_matches('/'));

        let same = ProviderSettings::resolve(
            &cfg,
            lookup(&[("LLM_PROVIDER", "openai"), ("OPENAI_API_KEY", "sk-test")]),
        )
        .expect("resolve");
        assert_eq!(same.model, "gpt-4o");
        assert_eq!(same.base_url, "http://openai-proxy.local/v1");
    }

    #[test]
    fn bad_temperature_is_a_configuration_error() {
        let err = ProviderSettings::resolve(
            &AgentConfig::default(),
            lookup(&[("XAI_API_KEY", "k"), ("TEMPERATURE", "hot")]),
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[test]
    fn debug_output_redacts_key() {
        let settings = ProviderSettings::resolve(
            &AgentConfig::default(),
            lookup(&[("XAI_API_KEY", "super-secret")]),
        )
        .expect("resolve");
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn chat_body_carries_system_and_user_messages() {
        let settings = ProviderSettings::resolve(
            &AgentConfig::default(),
            lookup(&[("XAI_API_KEY", "k")]),
        )
        .expect("resolve");
        let request = AgentRequest {
            stage: Stage::Critique,
            system: "be blunt".to_string(),
            prompt: "Goal: x".to_string(),
        };
        let body = serde_json::to_value(chat_body(&settings, &request)).expect("serialize");
        assert_eq!(body["model"], "grok-4-latest");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Goal: x");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn parses_chat_and_anthropic_responses() {
        let chat = r#"{"choices":[{"message":{"role":"assistant","content":"  hello  "}}]}"#;
        assert_eq!(parse_chat_response(chat).expect("chat"), "hello");

        let anthropic = r#"{"content":[{"type":"text","text":"Branch Name: x"},{"type":"tool_use"}]}"#;
        assert_eq!(
            parse_anthropic_response(anthropic).expect("anthropic"),
            "Branch Name: x"
        );

        assert!(parse_chat_response(r#"{"choices":[]}"#).is_err());
    }
}

//! Story text generation via Azure OpenAI chat completions.
//!
//! One request per story, JSON-object response format. The prompt template
//! lives in `dreamytales_core::narration`.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use dreamytales_core::narration::{parse_story_reply, story_prompt};
use dreamytales_core::types::{GeneratedStory, StorySettings, WriterConfig};

use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct StoryWriter {
    client: reqwest::Client,
    config: WriterConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl StoryWriter {
    pub fn new(config: WriterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    /// Write one story. `sequel` is the previous episode's text, if any.
    pub async fn write(
        &self,
        settings: &StorySettings,
        sequel: Option<&str>,
    ) -> Result<GeneratedStory> {
        settings.validate().map_err(Error::InvalidRequest)?;
        let url = self.url()?;
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let prompt = story_prompt(settings, sequel);
        let body = serde_json::json!({
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "response_format": { "type": "json_object" },
        });

        debug!(
            "writer: requesting story (theme={}, sequel={})",
            settings.theme,
            sequel.is_some()
        );

        let resp = self
            .client
            .post(&url)
            .header("api-key", api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!("writer: upstream error {status}: {text}");
            return Err(Error::Upstream {
                status,
                message: error_message(&text),
            });
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::Malformed(format!("Unreadable model response: {e}")))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::Malformed("No content from model".into()))?;

        parse_story_reply(&content).map_err(Error::Malformed)
    }

    fn url(&self) -> Result<String> {
        let c = &self.config;
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !(present(&c.endpoint) && present(&c.api_key) && present(&c.deployment)) {
            return Err(Error::Config(
                "AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY, AZURE_OPENAI_TEXT_DEPLOYMENT".into(),
            ));
        }
        let endpoint = c.endpoint.as_deref().unwrap_or_default().trim_end_matches('/');
        let deployment = c.deployment.as_deref().unwrap_or_default();
        Ok(format!(
            "{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={}",
            c.api_version
        ))
    }
}

/// Pull `error.message` out of an Azure error body, or fall back to the body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

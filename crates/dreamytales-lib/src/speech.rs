//! Speech synthesis via the Azure Speech REST API.
//!
//! Text goes out wrapped in SSML; compressed audio (MP3 by default) comes
//! back as one buffer.

use std::time::Duration;

use tracing::{debug, warn};

use dreamytales_core::narration::{Voice, build_ssml};
use dreamytales_core::types::SpeechConfig;

use crate::writer::error_message;
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "DreamyTales";

#[derive(Clone)]
pub struct SpeechClient {
    client: reqwest::Client,
    config: SpeechConfig,
}

impl SpeechClient {
    pub fn new(config: SpeechConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    /// Synthesize `text`. `voice` overrides the configured neural voice.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidRequest("Missing text".into()));
        }
        let key = self
            .config
            .key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("AZURE_SPEECH_KEY and AZURE_SPEECH_REGION".into()))?;

        let ssml = build_ssml(
            text,
            Voice {
                name: voice.unwrap_or(&self.config.voice),
                style: &self.config.style,
                rate: &self.config.rate,
                pitch: &self.config.pitch,
            },
        );

        debug!("speech: POST {} chars", text.chars().count());

        let resp = self
            .client
            .post(self.config.url())
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Ocp-Apim-Subscription-Region", &self.config.region)
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", &self.config.output_format)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .body(ssml)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!("speech: upstream error {status}: {text}");
            return Err(Error::Upstream {
                status,
                message: error_message(&text),
            });
        }

        let audio = resp.bytes().await?;
        if audio.is_empty() {
            return Err(Error::Malformed("Speech service returned no audio".into()));
        }
        debug!("speech: received {} bytes", audio.len());
        Ok(audio.to_vec())
    }
}

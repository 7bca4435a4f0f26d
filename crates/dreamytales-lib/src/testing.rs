//! Shared test fixtures: a local stand-in for the Azure APIs, a scriptable
//! audio output, and small audio/settings builders.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};

use dreamytales_core::types::{Language, SpeechConfig, StorySettings, VoiceName, WriterConfig};

use crate::output::AudioOutput;

pub(crate) fn settings() -> StorySettings {
    StorySettings {
        child_name: "Mia".into(),
        age: 5,
        main_character: "Bear".into(),
        secondary_characters: vec!["Owl".into()],
        scene: "Forest".into(),
        theme: "Bravery".into(),
        language: Language::English,
        custom_prompt: None,
        selected_voice: VoiceName::Nova,
    }
}

/// 16-bit mono 8 kHz PCM WAV of `seconds` length.
pub(crate) fn wav_tone(seconds: f32) -> Vec<u8> {
    const RATE: u32 = 8_000;
    let samples = (RATE as f32 * seconds) as u32;
    let data_len = samples * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&RATE.to_le_bytes());
    out.extend_from_slice(&(RATE * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..samples {
        let v: i16 = if (i / 20) % 2 == 0 { 3000 } else { -3000 };
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

// ─── Fake vendor ──────────────────────────────────────────────────────────

#[derive(Default)]
struct VendorState {
    chat_content: String,
    chat_failure: Option<(u16, String)>,
    audio: Vec<u8>,
    speech_failure: Option<(u16, String)>,
    chat_calls: usize,
    last_chat: Option<Value>,
    last_api_key: Option<String>,
    last_ssml: Option<String>,
    last_speech_key: Option<String>,
}

type Shared = Arc<Mutex<VendorState>>;

/// Azure OpenAI + Azure Speech stand-in on an ephemeral local port.
pub(crate) struct FakeVendor {
    addr: SocketAddr,
    state: Shared,
}

impl FakeVendor {
    pub(crate) async fn start() -> Self {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route(
                "/openai/deployments/{deployment}/chat/completions",
                post(chat),
            )
            .route("/cognitiveservices/v1", post(speech))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub(crate) fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            endpoint: Some(format!("http://{}", self.addr)),
            api_key: Some("test-key".into()),
            deployment: Some("story".into()),
            timeout_secs: 5,
            ..WriterConfig::default()
        }
    }

    pub(crate) fn speech_config(&self) -> SpeechConfig {
        SpeechConfig {
            key: Some("speech-key".into()),
            endpoint: Some(format!("http://{}", self.addr)),
            timeout_secs: 5,
            ..SpeechConfig::default()
        }
    }

    pub(crate) fn set_chat_content(&self, content: &str) {
        let mut s = self.state.lock().unwrap();
        s.chat_content = content.into();
        s.chat_failure = None;
    }

    pub(crate) fn fail_chat(&self, status: u16, body: &str) {
        self.state.lock().unwrap().chat_failure = Some((status, body.into()));
    }

    pub(crate) fn set_audio(&self, audio: Vec<u8>) {
        let mut s = self.state.lock().unwrap();
        s.audio = audio;
        s.speech_failure = None;
    }

    pub(crate) fn fail_speech(&self, status: u16, body: &str) {
        self.state.lock().unwrap().speech_failure = Some((status, body.into()));
    }

    pub(crate) fn chat_calls(&self) -> usize {
        self.state.lock().unwrap().chat_calls
    }

    pub(crate) fn last_chat_request(&self) -> Option<Value> {
        self.state.lock().unwrap().last_chat.clone()
    }

    pub(crate) fn last_api_key(&self) -> Option<String> {
        self.state.lock().unwrap().last_api_key.clone()
    }

    pub(crate) fn last_ssml(&self) -> Option<String> {
        self.state.lock().unwrap().last_ssml.clone()
    }

    pub(crate) fn last_speech_key(&self) -> Option<String> {
        self.state.lock().unwrap().last_speech_key.clone()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn failure(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, body).into_response()
}

async fn chat(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    let mut s = state.lock().unwrap();
    s.chat_calls += 1;
    s.last_chat = serde_json::from_slice(&body).ok();
    s.last_api_key = header_value(&headers, "api-key");
    if let Some((status, body)) = s.chat_failure.clone() {
        return failure(status, body);
    }
    axum::Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": s.chat_content } }]
    }))
    .into_response()
}

async fn speech(State(state): State<Shared>, headers: HeaderMap, body: String) -> Response {
    let mut s = state.lock().unwrap();
    s.last_ssml = Some(body);
    s.last_speech_key = header_value(&headers, "ocp-apim-subscription-key");
    if let Some((status, body)) = s.speech_failure.clone() {
        return failure(status, body);
    }
    ([(header::CONTENT_TYPE, "audio/mpeg")], s.audio.clone()).into_response()
}

// ─── Scriptable output ────────────────────────────────────────────────────

/// What a [`FakeOutput`] was asked to do, and what it will report.
#[derive(Default)]
pub(crate) struct FakeOutputState {
    pub calls: Vec<&'static str>,
    pub loaded: Option<Arc<[u8]>>,
    pub paused: bool,
    pub finished: bool,
    pub position: Duration,
    pub fail_play: bool,
}

#[derive(Clone)]
pub(crate) struct FakeOutput(pub Arc<Mutex<FakeOutputState>>);

impl FakeOutput {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(FakeOutputState {
            paused: true,
            ..FakeOutputState::default()
        })))
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().calls.clone()
    }

    pub(crate) fn with<T>(&self, f: impl FnOnce(&mut FakeOutputState) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }
}

impl AudioOutput for FakeOutput {
    fn load(&mut self, asset: Arc<[u8]>) -> Result<(), String> {
        self.with(|s| {
            s.calls.push("load");
            s.loaded = Some(asset);
            s.paused = true;
            s.finished = false;
            s.position = Duration::ZERO;
        });
        Ok(())
    }

    fn unload(&mut self) {
        self.with(|s| {
            s.calls.push("unload");
            s.loaded = None;
            s.paused = true;
        });
    }

    fn play(&mut self) -> Result<(), String> {
        self.with(|s| {
            s.calls.push("play");
            if s.fail_play || s.loaded.is_none() {
                return Err("device unavailable".to_string());
            }
            s.paused = false;
            Ok(())
        })
    }

    fn pause(&mut self) {
        self.with(|s| {
            s.calls.push("pause");
            s.paused = true;
        });
    }

    fn rewind(&mut self) -> Result<(), String> {
        self.with(|s| {
            s.calls.push("rewind");
            s.finished = false;
            s.position = Duration::ZERO;
            s.paused = true;
        });
        Ok(())
    }

    fn position(&self) -> Duration {
        self.0.lock().unwrap().position
    }

    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_secs(60))
    }

    fn is_paused(&self) -> bool {
        self.0.lock().unwrap().paused
    }

    fn is_finished(&self) -> bool {
        self.0.lock().unwrap().finished
    }
}

//! Shared types for the dreamytales ecosystem.
//!
//! Used by dreamytales-lib and the CLI. Keeping them here means consumers can
//! depend on the data model without pulling in tokio, rodio, or reqwest.
//! Wire names are camelCase so payloads match the browser front-end.

use serde::{Deserialize, Serialize};

/// Opaque story identifier.
pub type StoryId = String;

// ─── Story types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    Chinese,
    English,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceName {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Boy,
    Girl,
}

/// The child the stories are told for. Persisted across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub age: u32,
    pub gender: Gender,
}

/// Everything the text generator needs to write one story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorySettings {
    pub child_name: String,
    pub age: u32,
    /// The child's best animal friend.
    pub main_character: String,
    #[serde(default)]
    pub secondary_characters: Vec<String>,
    pub scene: String,
    pub theme: String,
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    pub selected_voice: VoiceName,
}

impl StorySettings {
    /// Reject settings the prompt cannot be built from.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("childName", self.child_name.as_str()),
            ("mainCharacter", self.main_character.as_str()),
            ("scene", self.scene.as_str()),
            ("theme", self.theme.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("invalid settings payload: {field} is empty"));
            }
        }
        if self.age == 0 {
            return Err("invalid settings payload: age is zero".into());
        }
        Ok(())
    }
}

/// A generated story. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub title: String,
    pub content: String,
    /// Where the narrated audio can be fetched from.
    pub audio_uri: String,
    pub settings: StorySettings,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Seconds; 0 when the asset's length could not be measured.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequel_to: Option<StoryId>,
}

/// Title and body returned by the text generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedStory {
    pub title: String,
    pub content: String,
}

// ─── Playback types ────────────────────────────────────────────────────────

/// How the queue moves on when asked for the next story.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayMode {
    #[default]
    Sequential,
    LoopOne,
    Shuffle,
}

impl PlayMode {
    /// Sequential → LoopOne → Shuffle → Sequential.
    pub fn next(self) -> Self {
        match self {
            PlayMode::Sequential => PlayMode::LoopOne,
            PlayMode::LoopOne => PlayMode::Shuffle,
            PlayMode::Shuffle => PlayMode::Sequential,
        }
    }
}

/// Observable narration state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Paused,
    Playing,
}

/// Short description of the current story for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub id: StoryId,
    pub title: String,
    pub main_character: String,
    pub duration: f64,
}

/// Player status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    pub current: Option<NowPlaying>,
    pub state: PlaybackState,
    /// The desired play flag, not the observed output state.
    pub playing: bool,
    pub mode: PlayMode,
    /// 0–100.
    pub progress: f64,
    pub elapsed: f64,
    pub filter: Option<String>,
    pub visible_count: usize,
    pub background_music: bool,
    pub background_playing: bool,
    pub last_error: Option<String>,
}

// ─── Configuration ─────────────────────────────────────────────────────────

/// Azure OpenAI text generation configuration.
///
/// Credentials are optional here: a missing value is reported on each
/// generation attempt instead of refusing to start.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: Option<String>,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            deployment: None,
            api_version: "2024-05-01-preview".into(),
            timeout_secs: 120,
        }
    }
}

/// Azure Speech synthesis configuration.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub key: Option<String>,
    pub region: String,
    /// Overrides the regional endpoint, e.g. for a local stand-in.
    pub endpoint: Option<String>,
    pub voice: String,
    pub style: String,
    pub rate: String,
    pub pitch: String,
    pub output_format: String,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            key: None,
            region: "japaneast".into(),
            endpoint: None,
            voice: "zh-CN-XiaoxiaoNeural".into(),
            style: "affectionate".into(),
            rate: "-15%".into(),
            pitch: "-5%".into(),
            output_format: "audio-16khz-128kbitrate-mono-mp3".into(),
            timeout_secs: 120,
        }
    }
}

impl SpeechConfig {
    pub fn url(&self) -> String {
        match &self.endpoint {
            Some(base) => format!("{}/cognitiveservices/v1", base.trim_end_matches('/')),
            None => format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                self.region
            ),
        }
    }
}

/// Background music bed configuration.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub background_music_url: Option<String>,
    pub background_volume: f32,
    pub narration_volume: f32,
    /// Start with the background bed enabled.
    pub background_enabled: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            background_music_url: Some(
                "https://cdn.pixabay.com/audio/2022/10/28/audio_65529f5b24.mp3".into(),
            ),
            background_volume: 0.15,
            narration_volume: 1.0,
            background_enabled: true,
        }
    }
}

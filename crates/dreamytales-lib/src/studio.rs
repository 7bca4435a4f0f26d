//! Studio — one story from settings to a playable entry in the player.
//!
//! ```text
//! generate(settings) → writer (title + body) → narration_text
//!     → speech (encoded audio) → measure → AssetStore → Player::add_story
//! ```
//!
//! All-or-nothing: a story only reaches the player once both its text and a
//! decodable narration exist. One generation runs at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{info, warn};

use dreamytales_core::narration::{SEQUEL_EXCERPT_CHARS, narration_text};
use dreamytales_core::types::{GeneratedStory, Story, StorySettings};

use crate::assets::{AssetStore, audio_uri};
use crate::output::measure_duration;
use crate::player::Player;
use crate::speech::SpeechClient;
use crate::writer::StoryWriter;
use crate::{Error, Result};

#[derive(Clone)]
pub struct Studio {
    writer: Arc<StoryWriter>,
    speech: Arc<SpeechClient>,
    assets: AssetStore,
    player: Player,
    generating: Arc<AtomicBool>,
}

/// Clears the generating flag however the attempt ends.
struct GeneratingGuard(Arc<AtomicBool>);

impl Drop for GeneratingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Studio {
    pub fn new(writer: StoryWriter, speech: SpeechClient, assets: AssetStore, player: Player) -> Self {
        Self {
            writer: Arc::new(writer),
            speech: Arc::new(speech),
            assets,
            player,
            generating: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// Write, narrate and enqueue a new story. `sequel_of` names the story
    /// this one continues.
    pub async fn generate(&self, settings: StorySettings, sequel_of: Option<&str>) -> Result<Story> {
        let _guard = self.begin()?;
        settings.validate().map_err(Error::InvalidRequest)?;

        let previous = match sequel_of {
            Some(id) => Some(
                self.player
                    .story(id)
                    .ok_or_else(|| Error::NotFound(id.to_string()))?,
            ),
            None => None,
        };
        let excerpt = previous.as_ref().map(|p| sequel_excerpt(&p.content));

        info!("studio: writing story (theme={})", settings.theme);
        let generated = self.writer.write(&settings, excerpt.as_deref()).await?;

        let text = narration_text(&generated);
        if text.trim().is_empty() {
            return Err(Error::Malformed("Story has no narratable text".into()));
        }

        info!("studio: narrating \"{}\"", generated.title);
        let audio: Arc<[u8]> = self.speech.synthesize(&text, None).await?.into();

        let asset = audio.clone();
        let duration = tokio::task::spawn_blocking(move || measure_duration(&asset))
            .await
            .map_err(|e| Error::Undecodable(e.to_string()))?
            .map_err(|e| {
                warn!("studio: narration audio rejected: {e}");
                Error::Undecodable(e)
            })?;

        let story = assemble(generated, settings, previous.map(|p| p.id), duration);
        self.assets.insert(story.id.clone(), audio);
        self.player.add_story(story.clone()).await?;

        info!("studio: story {} ready ({duration:.1}s)", story.id);
        Ok(story)
    }

    /// Text generation only.
    pub async fn write_text(
        &self,
        settings: &StorySettings,
        sequel_context: Option<&str>,
    ) -> Result<GeneratedStory> {
        let excerpt = sequel_context.map(sequel_excerpt);
        self.writer.write(settings, excerpt.as_deref()).await
    }

    /// Speech synthesis only.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>> {
        self.speech.synthesize(text, voice).await
    }

    fn begin(&self) -> Result<GeneratingGuard> {
        if self.generating.swap(true, Ordering::SeqCst) {
            return Err(Error::Busy);
        }
        Ok(GeneratingGuard(self.generating.clone()))
    }
}

/// The first [`SEQUEL_EXCERPT_CHARS`] characters of a previous episode.
pub fn sequel_excerpt(content: &str) -> String {
    content.chars().take(SEQUEL_EXCERPT_CHARS).collect()
}

fn assemble(
    generated: GeneratedStory,
    settings: StorySettings,
    sequel_to: Option<String>,
    duration: f64,
) -> Story {
    let id = uuid::Uuid::new_v4().to_string();
    Story {
        audio_uri: audio_uri(&id),
        id,
        title: generated.title,
        content: generated.content,
        settings,
        created_at: Utc::now().timestamp_millis(),
        duration,
        sequel_to,
    }
}

//! Queue cursor — which story is current, and which comes next.
//!
//! Navigation always runs over the *visible* list (stories matching the theme
//! filter, newest first). The current story may be hidden by the filter; it
//! stays current, and navigation restarts inside the visible subset.

use rand::Rng;

use crate::types::{PlayMode, Story, StoryId};

/// What a navigation call did to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Visible list empty or id unknown; nothing changed.
    Unchanged,
    /// `current` was (re)assigned and play was forced on.
    Moved,
    /// LoopOne: keep the current story and pulse pause → play.
    Pulse,
}

#[derive(Debug, Default)]
pub struct StoryQueue {
    stories: Vec<Story>,
    filter: Option<String>,
    current: Option<StoryId>,
    mode: PlayMode,
    playing: bool,
}

impl StoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Read access ─────────────────────────────────────────────────────

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn get(&self, id: &str) -> Option<&Story> {
        self.stories.iter().find(|s| s.id == id)
    }

    pub fn current(&self) -> Option<&Story> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Stories matching the active theme filter, order preserved.
    pub fn visible(&self) -> Vec<&Story> {
        self.stories
            .iter()
            .filter(|s| match &self.filter {
                Some(theme) => &s.settings.theme == theme,
                None => true,
            })
            .collect()
    }

    /// Distinct themes in the list, newest first.
    pub fn themes(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for story in &self.stories {
            if !seen.contains(&story.settings.theme) {
                seen.push(story.settings.theme.clone());
            }
        }
        seen
    }

    // ─── Mutations ───────────────────────────────────────────────────────

    /// Prepend a freshly generated story, make it current and start it.
    ///
    /// The filter is cleared so the new story is visible. A duplicate id is
    /// ignored.
    pub fn insert(&mut self, story: Story) -> Step {
        if self.get(&story.id).is_some() {
            return Step::Unchanged;
        }
        self.current = Some(story.id.clone());
        self.stories.insert(0, story);
        self.filter = None;
        self.playing = true;
        Step::Moved
    }

    pub fn set_filter(&mut self, theme: Option<String>) {
        self.filter = theme.filter(|t| !t.trim().is_empty());
    }

    /// Tap on a story: same story flips play/pause, another story starts it.
    pub fn select_or_toggle(&mut self, id: &str) -> Step {
        if self.current.as_deref() == Some(id) {
            self.playing = !self.playing;
            return Step::Moved;
        }
        if self.get(id).is_none() {
            return Step::Unchanged;
        }
        self.current = Some(id.to_string());
        self.playing = true;
        Step::Moved
    }

    /// The player's play/pause button.
    pub fn toggle_playing(&mut self) {
        self.playing = !self.playing;
    }

    /// Only the driver's reconciliation writes the flag this way.
    pub(crate) fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Next story per play mode. Also used on natural end of a story.
    pub fn advance<R: Rng>(&mut self, rng: &mut R) -> Step {
        let visible = self.visible();
        if visible.is_empty() {
            return Step::Unchanged;
        }
        let len = visible.len();
        let idx = self.position_in(&visible);

        let next = match self.mode {
            PlayMode::LoopOne => {
                self.playing = true;
                return Step::Pulse;
            }
            PlayMode::Shuffle => rng.gen_range(0..len),
            PlayMode::Sequential => idx.map_or(0, |i| (i + 1) % len),
        };

        self.current = Some(visible[next].id.clone());
        self.playing = true;
        Step::Moved
    }

    /// Previous story. Always sequential, whatever the play mode.
    pub fn retreat(&mut self) -> Step {
        let visible = self.visible();
        if visible.is_empty() {
            return Step::Unchanged;
        }
        let len = visible.len();
        let prev = match self.position_in(&visible) {
            Some(i) if i > 0 => i - 1,
            _ => len - 1,
        };

        self.current = Some(visible[prev].id.clone());
        self.playing = true;
        Step::Moved
    }

    pub fn cycle_mode(&mut self) -> PlayMode {
        self.mode = self.mode.next();
        self.mode
    }

    fn position_in(&self, visible: &[&Story]) -> Option<usize> {
        let current = self.current.as_deref()?;
        visible.iter().position(|s| s.id == current)
    }
}

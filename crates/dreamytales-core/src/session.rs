//! Session — the one owner of the story list, cursor, desired play flag and
//! playback driver.
//!
//! Every user action and every output report goes through a method here and
//! comes back out as a list of [`OutputCommand`]s for the audio layer. The
//! queue writes the current story, the driver writes the observed output
//! state, and the desired play flag lives in the queue; the driver only moves
//! it through `Reconcile` effects applied here.

use rand::Rng;

use crate::driver::{DriverEvent, Effect, OutputCommand, OutputEvent, PlaybackDriver, Track};
use crate::queue::{Step, StoryQueue};
use crate::types::{NowPlaying, PlayMode, PlayerStatus, Story};

#[derive(Debug)]
pub struct Session {
    queue: StoryQueue,
    driver: PlaybackDriver,
    bed_enabled: bool,
}

impl Session {
    pub fn new(background_music: bool) -> Self {
        Self {
            queue: StoryQueue::new(),
            driver: PlaybackDriver::new(),
            bed_enabled: background_music,
        }
    }

    pub fn queue(&self) -> &StoryQueue {
        &self.queue
    }

    pub fn driver(&self) -> &PlaybackDriver {
        &self.driver
    }

    pub fn background_music(&self) -> bool {
        self.bed_enabled
    }

    // ─── User actions ────────────────────────────────────────────────────

    pub fn add_story(&mut self, story: Story) -> Vec<OutputCommand> {
        match self.queue.insert(story) {
            Step::Unchanged => Vec::new(),
            _ => self.sync(),
        }
    }

    pub fn select_or_toggle(&mut self, id: &str) -> Vec<OutputCommand> {
        match self.queue.select_or_toggle(id) {
            Step::Unchanged => Vec::new(),
            _ => self.sync(),
        }
    }

    pub fn toggle_playing(&mut self) -> Vec<OutputCommand> {
        if self.queue.current().is_none() {
            return Vec::new();
        }
        self.queue.toggle_playing();
        self.sync()
    }

    pub fn next<R: Rng>(&mut self, rng: &mut R) -> Vec<OutputCommand> {
        let step = self.queue.advance(rng);
        self.after_step(step)
    }

    pub fn previous(&mut self) -> Vec<OutputCommand> {
        let step = self.queue.retreat();
        self.after_step(step)
    }

    pub fn cycle_mode(&mut self) -> PlayMode {
        self.queue.cycle_mode()
    }

    pub fn set_filter(&mut self, theme: Option<String>) {
        self.queue.set_filter(theme);
    }

    pub fn set_background_music(&mut self, enabled: bool) -> Vec<OutputCommand> {
        self.bed_enabled = enabled;
        self.sync()
    }

    pub fn toggle_background_music(&mut self) -> Vec<OutputCommand> {
        self.set_background_music(!self.bed_enabled)
    }

    // ─── Output reports ──────────────────────────────────────────────────

    /// Feed a lifecycle report from the audio layer back in.
    ///
    /// End of stream is the only path that advances the queue on its own.
    pub fn handle_output<R: Rng>(&mut self, event: OutputEvent, rng: &mut R) -> Vec<OutputCommand> {
        let effects = self.driver.step(DriverEvent::Output(event));
        let completed = effects.contains(&Effect::Completed);
        let mut commands = self.apply(effects);
        if completed {
            let step = self.queue.advance(rng);
            commands.extend(self.after_step(step));
        }
        commands
    }

    pub fn status(&self) -> PlayerStatus {
        let current = self.queue.current().map(|s| NowPlaying {
            id: s.id.clone(),
            title: s.title.clone(),
            main_character: s.settings.main_character.clone(),
            duration: s.duration,
        });
        PlayerStatus {
            current,
            state: self.driver.state(),
            playing: self.queue.is_playing(),
            mode: self.queue.mode(),
            progress: self.driver.progress(),
            elapsed: self.driver.elapsed(),
            filter: self.queue.filter().map(str::to_string),
            visible_count: self.queue.visible().len(),
            background_music: self.bed_enabled,
            background_playing: self.driver.bed_playing(),
            last_error: self.driver.last_error().map(str::to_string),
        }
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn after_step(&mut self, step: Step) -> Vec<OutputCommand> {
        match step {
            Step::Unchanged => Vec::new(),
            Step::Moved => self.sync(),
            Step::Pulse => {
                let pause = DriverEvent::Intent {
                    play: false,
                    bed_enabled: self.bed_enabled,
                };
                let resume = self.intent();
                let mut effects = self.driver.step(pause);
                effects.extend(self.driver.step(resume));
                self.apply(effects)
            }
        }
    }

    /// Bring the driver in line with the queue's current story and flag.
    fn sync(&mut self) -> Vec<OutputCommand> {
        let track = self.queue.current().map(|s| Track {
            id: s.id.clone(),
            duration: s.duration,
        });
        let intent = self.intent();
        let mut effects = self.driver.step(DriverEvent::TrackChanged(track));
        effects.extend(self.driver.step(intent));
        self.apply(effects)
    }

    fn intent(&self) -> DriverEvent {
        DriverEvent::Intent {
            play: self.queue.is_playing(),
            bed_enabled: self.bed_enabled,
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) -> Vec<OutputCommand> {
        let mut commands = Vec::new();
        for effect in effects {
            match effect {
                Effect::Command(c) => commands.push(c),
                Effect::Reconcile(playing) => {
                    self.queue.set_playing(playing);
                    // Driver already matches; only the bed can still move.
                    let intent = self.intent();
                    let follow = self.driver.step(intent);
                    commands.extend(self.apply(follow));
                }
                Effect::Completed => {}
            }
        }
        commands
    }
}

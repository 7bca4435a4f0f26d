//! Playback driver — turns (current story, desired play flag, music toggle)
//! into output commands.
//!
//! Pure reducer: [`PlaybackDriver::step`] consumes one [`DriverEvent`] and
//! returns the [`Effect`]s to carry out. Output lifecycle (start failures,
//! external pauses, end of stream, position samples) comes back in as
//! [`OutputEvent`]s. Nothing here touches a real device.
//!
//! ```text
//!   Idle ──track──▶ Paused ◀──intent(false) / external pause── Playing
//!                     │                                          ▲ │
//!                     └──────────── intent(true) ────────────────┘ │
//!   Idle ◀────────────────────── end of stream (Completed) ────────┘
//! ```

use crate::types::{PlaybackState, StoryId};

/// The story the driver is bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: StoryId,
    /// Stored duration in seconds, used until the output reports its own.
    pub duration: f64,
}

/// Instructions for the audio layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCommand {
    /// Bind the narration output to this story's asset, paused at zero.
    Load(StoryId),
    Unload,
    Play,
    Pause,
    /// Seek the narration back to the start.
    Rewind,
    BedPlay,
    BedPause,
}

/// Lifecycle reports from the audio layer.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Started,
    StartFailed(String),
    PausedExternally,
    ResumedExternally,
    Ended,
    Position { elapsed: f64, duration: Option<f64> },
    BedFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    TrackChanged(Option<Track>),
    Intent { play: bool, bed_enabled: bool },
    Output(OutputEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Command(OutputCommand),
    /// The narration reached its end; the queue should advance.
    Completed,
    /// The output disagrees with the desired flag; the flag should follow.
    Reconcile(bool),
}

#[derive(Debug, Default)]
pub struct PlaybackDriver {
    state: PlaybackState,
    track: Option<Track>,
    progress: f64,
    reported_duration: Option<f64>,
    bed_playing: bool,
    last_error: Option<String>,
}

impl PlaybackDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    /// 0–100.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Seconds into the current story, derived from progress.
    pub fn elapsed(&self) -> f64 {
        self.effective_duration() * self.progress / 100.0
    }

    pub fn bed_playing(&self) -> bool {
        self.bed_playing
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether position samples are wanted right now.
    pub fn wants_samples(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn step(&mut self, event: DriverEvent) -> Vec<Effect> {
        match event {
            DriverEvent::TrackChanged(track) => self.on_track(track),
            DriverEvent::Intent { play, bed_enabled } => self.on_intent(play, bed_enabled),
            DriverEvent::Output(output) => self.on_output(output),
        }
    }

    fn on_track(&mut self, track: Option<Track>) -> Vec<Effect> {
        if self.track.as_ref().map(|t| &t.id) == track.as_ref().map(|t| &t.id) {
            return Vec::new();
        }

        self.progress = 0.0;
        self.reported_duration = None;
        self.last_error = None;

        match track {
            Some(track) => {
                let id = track.id.clone();
                self.track = Some(track);
                self.state = PlaybackState::Paused;
                vec![Effect::Command(OutputCommand::Load(id))]
            }
            None => {
                self.track = None;
                self.state = PlaybackState::Idle;
                vec![Effect::Command(OutputCommand::Unload)]
            }
        }
    }

    fn on_intent(&mut self, play: bool, bed_enabled: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        let loaded = self.track.is_some();

        match (play, self.state) {
            (true, PlaybackState::Paused) if loaded => {
                self.state = PlaybackState::Playing;
                effects.push(Effect::Command(OutputCommand::Play));
            }
            // Finished story asked to play again: start over.
            (true, PlaybackState::Idle) if loaded => {
                self.progress = 0.0;
                self.state = PlaybackState::Playing;
                effects.push(Effect::Command(OutputCommand::Rewind));
                effects.push(Effect::Command(OutputCommand::Play));
            }
            (false, PlaybackState::Playing) => {
                self.state = PlaybackState::Paused;
                effects.push(Effect::Command(OutputCommand::Pause));
            }
            _ => {}
        }

        let bed = play && bed_enabled && loaded;
        if bed != self.bed_playing {
            self.bed_playing = bed;
            effects.push(Effect::Command(if bed {
                OutputCommand::BedPlay
            } else {
                OutputCommand::BedPause
            }));
        }

        effects
    }

    fn on_output(&mut self, event: OutputEvent) -> Vec<Effect> {
        match event {
            OutputEvent::Started => {
                self.last_error = None;
                Vec::new()
            }
            OutputEvent::StartFailed(reason) => {
                self.last_error = Some(reason);
                if self.track.is_some() {
                    self.state = PlaybackState::Paused;
                }
                vec![Effect::Reconcile(false)]
            }
            OutputEvent::PausedExternally if self.state == PlaybackState::Playing => {
                self.state = PlaybackState::Paused;
                vec![Effect::Reconcile(false)]
            }
            OutputEvent::ResumedExternally
                if self.state == PlaybackState::Paused && self.track.is_some() =>
            {
                self.state = PlaybackState::Playing;
                vec![Effect::Reconcile(true)]
            }
            OutputEvent::Ended if self.state == PlaybackState::Playing => {
                self.state = PlaybackState::Idle;
                self.progress = 100.0;
                vec![Effect::Completed]
            }
            OutputEvent::Position { elapsed, duration } if self.wants_samples() => {
                if let Some(d) = duration.filter(|d| d.is_finite() && *d > 0.0) {
                    self.reported_duration = Some(d);
                }
                self.progress = progress_percent(elapsed, self.effective_duration());
                Vec::new()
            }
            OutputEvent::BedFailed(_) => {
                self.bed_playing = false;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn effective_duration(&self) -> f64 {
        self.reported_duration
            .or_else(|| self.track.as_ref().map(|t| t.duration))
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(1.0)
    }
}

/// `min(elapsed / duration, 1) × 100`, clamped at zero.
pub fn progress_percent(elapsed: f64, duration: f64) -> f64 {
    if duration.is_nan() || duration <= 0.0 || !elapsed.is_finite() {
        return 0.0;
    }
    (elapsed / duration * 100.0).clamp(0.0, 100.0)
}

//! Player — session + audio outputs on a dedicated playback thread.
//!
//! ```text
//! Player::select(id) → [cmd_tx] → playback thread: Session::select_or_toggle
//!     → OutputCommands → narration / bed outputs
//!     → OutputEvents (start failed, ended, position) → Session → ...
//!     → status_tx / library_tx (watch snapshots)
//! ```
//!
//! The rodio `OutputStream` is `!Send`, so the thread opens the device and
//! owns every output for its whole life. While a story is loaded the thread
//! wakes every [`TICK`] to sample position, catch end of stream and notice
//! the output being paused or resumed behind its back; otherwise it blocks
//! on the command channel.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rodio::{OutputStream, OutputStreamHandle};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use dreamytales_core::driver::{OutputCommand, OutputEvent};
use dreamytales_core::session::Session;
use dreamytales_core::types::{PlaybackState, PlayerConfig, PlayerStatus, Story, StoryId};

use crate::assets::AssetStore;
use crate::output::{AudioOutput, RodioOutput, SilentOutput};
use crate::{Error, Result};

const TICK: Duration = Duration::from_millis(250);

/// Snapshot of the story list for readers outside the playback thread.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    /// Newest first.
    pub stories: Vec<Story>,
    /// Ids passing the active filter, in list order.
    pub visible: Vec<StoryId>,
    pub filter: Option<String>,
    pub themes: Vec<String>,
}

impl Library {
    pub fn visible_stories(&self) -> Vec<&Story> {
        self.visible
            .iter()
            .filter_map(|id| self.stories.iter().find(|s| &s.id == id))
            .collect()
    }
}

/// Cloneable handle to the playback thread. All methods except
/// [`Player::add_story`] and [`Player::settled`] return without waiting.
#[derive(Clone)]
pub struct Player {
    cmd_tx: mpsc::Sender<PlayerCmd>,
    status_rx: watch::Receiver<PlayerStatus>,
    library_rx: watch::Receiver<Library>,
}

// ─── Internal types ────────────────────────────────────────────────────────

enum PlayerCmd {
    AddStory(Box<Story>),
    Select(StoryId),
    Toggle,
    Next,
    Previous,
    CycleMode,
    ToggleMusic,
    SetFilter(Option<String>),
    LoadBed(Arc<[u8]>),
    /// Answered once every earlier command is applied and published.
    Settled(oneshot::Sender<()>),
}

impl PlayerCmd {
    fn changes_library(&self) -> bool {
        matches!(self, PlayerCmd::AddStory(_) | PlayerCmd::SetFilter(_))
    }
}

// ─── Handle ────────────────────────────────────────────────────────────────

impl Player {
    /// Spawn the playback thread on the default audio device.
    ///
    /// Without a device the player still runs; every start then fails and
    /// is reported through [`PlayerStatus::last_error`].
    pub fn spawn(config: PlayerConfig, assets: AssetStore) -> io::Result<Self> {
        Self::start(move |cmd_rx, status_tx, library_tx| {
            let device = OutputStream::try_default();
            let outputs = match &device {
                Ok((_stream, handle)) => open_outputs(handle, &config),
                Err(e) => Err(e.to_string()),
            };
            let (narration, bed) = outputs.unwrap_or_else(|e| {
                error!("playback: no audio output, running silent: {e}");
                silent_pair()
            });
            let core = PlayerCore::new(&config, narration, bed, assets);
            playback_loop(core, cmd_rx, status_tx, library_tx);
        })
    }

    /// Spawn the playback thread on caller-supplied outputs.
    pub fn with_outputs(
        config: PlayerConfig,
        assets: AssetStore,
        narration: Box<dyn AudioOutput + Send>,
        bed: Box<dyn AudioOutput + Send>,
    ) -> io::Result<Self> {
        Self::start(move |cmd_rx, status_tx, library_tx| {
            let core = PlayerCore::new(&config, narration, bed, assets);
            playback_loop(core, cmd_rx, status_tx, library_tx);
        })
    }

    fn start<F>(run: F) -> io::Result<Self>
    where
        F: FnOnce(mpsc::Receiver<PlayerCmd>, watch::Sender<PlayerStatus>, watch::Sender<Library>)
            + Send
            + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (status_tx, status_rx) = watch::channel(PlayerStatus::default());
        let (library_tx, library_rx) = watch::channel(Library::default());

        std::thread::Builder::new()
            .name("dreamytales-playback".into())
            .spawn(move || run(cmd_rx, status_tx, library_tx))?;

        Ok(Self {
            cmd_tx,
            status_rx,
            library_rx,
        })
    }

    /// Prepend a new story, make it current and start it.
    ///
    /// Resolves once the story is in the published [`Library`], so lookups
    /// by id succeed straight after.
    pub async fn add_story(&self, story: Story) -> Result<()> {
        self.send(PlayerCmd::AddStory(Box::new(story)))?;
        self.settled().await
    }

    /// Same story toggles play/pause; another story starts from the top.
    pub fn select(&self, id: &str) -> Result<()> {
        self.send(PlayerCmd::Select(id.to_string()))
    }

    pub fn toggle(&self) -> Result<()> {
        self.send(PlayerCmd::Toggle)
    }

    pub fn next(&self) -> Result<()> {
        self.send(PlayerCmd::Next)
    }

    pub fn previous(&self) -> Result<()> {
        self.send(PlayerCmd::Previous)
    }

    pub fn cycle_mode(&self) -> Result<()> {
        self.send(PlayerCmd::CycleMode)
    }

    pub fn toggle_music(&self) -> Result<()> {
        self.send(PlayerCmd::ToggleMusic)
    }

    /// `None` or a blank theme clears the filter.
    pub fn set_filter(&self, theme: Option<String>) -> Result<()> {
        self.send(PlayerCmd::SetFilter(theme))
    }

    /// Hand the downloaded background music to the bed output.
    pub fn load_bed(&self, audio: Arc<[u8]>) -> Result<()> {
        self.send(PlayerCmd::LoadBed(audio))
    }

    /// Wait until the playback thread has worked through every command sent
    /// before this call and published the resulting snapshots.
    pub async fn settled(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(PlayerCmd::Settled(tx))?;
        rx.await.map_err(|_| Error::PlayerGone)
    }

    pub fn status(&self) -> PlayerStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<PlayerStatus> {
        self.status_rx.clone()
    }

    pub fn library(&self) -> Library {
        self.library_rx.borrow().clone()
    }

    pub fn subscribe_library(&self) -> watch::Receiver<Library> {
        self.library_rx.clone()
    }

    pub fn story(&self, id: &str) -> Option<Story> {
        self.library_rx
            .borrow()
            .stories
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    fn send(&self, cmd: PlayerCmd) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| Error::PlayerGone)
    }
}

type OutputPair = (Box<dyn AudioOutput>, Box<dyn AudioOutput>);

fn open_outputs(handle: &OutputStreamHandle, config: &PlayerConfig) -> Result<OutputPair, String> {
    let narration = RodioOutput::new(handle, config.narration_volume, false)?;
    let bed = RodioOutput::new(handle, config.background_volume, true)?;
    Ok((Box::new(narration), Box::new(bed)))
}

fn silent_pair() -> OutputPair {
    (Box::new(SilentOutput::default()), Box::new(SilentOutput::default()))
}

// ─── Playback OS thread ───────────────────────────────────────────────────

fn playback_loop(
    mut core: PlayerCore,
    cmd_rx: mpsc::Receiver<PlayerCmd>,
    status_tx: watch::Sender<PlayerStatus>,
    library_tx: watch::Sender<Library>,
) {
    info!("playback: thread started");
    publish_status(&status_tx, &core);

    loop {
        let cmd = if core.wants_samples() {
            match cmd_rx.recv_timeout(TICK) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match cmd_rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };

        match cmd {
            Some(cmd) => {
                let library_changed = cmd.changes_library();
                core.handle(cmd);
                if library_changed {
                    library_tx.send_replace(core.library());
                }
            }
            None => core.tick(),
        }
        publish_status(&status_tx, &core);
    }

    core.stop();
    debug!("playback: all handles dropped, thread exiting");
}

fn publish_status(tx: &watch::Sender<PlayerStatus>, core: &PlayerCore) {
    let next = core.status();
    tx.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}

/// Everything the playback thread owns.
pub(crate) struct PlayerCore {
    session: Session,
    narration: Box<dyn AudioOutput>,
    bed: Box<dyn AudioOutput>,
    assets: AssetStore,
    rng: StdRng,
}

impl PlayerCore {
    pub(crate) fn new(
        config: &PlayerConfig,
        narration: Box<dyn AudioOutput>,
        bed: Box<dyn AudioOutput>,
        assets: AssetStore,
    ) -> Self {
        Self {
            session: Session::new(config.background_enabled),
            narration,
            bed,
            assets,
            rng: StdRng::from_entropy(),
        }
    }

    fn handle(&mut self, cmd: PlayerCmd) {
        let commands = match cmd {
            PlayerCmd::AddStory(story) => {
                debug!("player: new story {}", story.id);
                self.session.add_story(*story)
            }
            PlayerCmd::Select(id) => self.session.select_or_toggle(&id),
            PlayerCmd::Toggle => self.session.toggle_playing(),
            PlayerCmd::Next => self.session.next(&mut self.rng),
            PlayerCmd::Previous => self.session.previous(),
            PlayerCmd::CycleMode => {
                let mode = self.session.cycle_mode();
                debug!("player: mode {mode:?}");
                Vec::new()
            }
            PlayerCmd::ToggleMusic => self.session.toggle_background_music(),
            PlayerCmd::SetFilter(theme) => {
                self.session.set_filter(theme);
                Vec::new()
            }
            PlayerCmd::LoadBed(audio) => self.load_bed(audio),
            PlayerCmd::Settled(ack) => {
                // The caller may have stopped waiting.
                let _ = ack.send(());
                Vec::new()
            }
        };
        self.execute(commands);
    }

    fn load_bed(&mut self, audio: Arc<[u8]>) -> Vec<OutputCommand> {
        if let Err(e) = self.bed.load(audio) {
            warn!("player: background music unusable: {e}");
            return Vec::new();
        }
        info!("player: background music ready");
        // Re-assert the toggle so a bed that failed earlier starts now.
        let enabled = self.session.background_music();
        self.session.set_background_music(enabled)
    }

    /// Carry out commands, feeding each output report back into the session
    /// until nothing is left to do.
    fn execute(&mut self, commands: Vec<OutputCommand>) {
        let mut pending: VecDeque<OutputCommand> = commands.into();
        while let Some(cmd) = pending.pop_front() {
            debug!("player: {cmd:?}");
            let Some(report) = self.run(cmd) else {
                continue;
            };
            match &report {
                OutputEvent::StartFailed(reason) => {
                    warn!("player: narration failed to start: {reason}");
                    // The session has given up on playing; queued starts are stale.
                    pending.retain(|c| !matches!(c, OutputCommand::Play | OutputCommand::Rewind));
                }
                OutputEvent::BedFailed(reason) => warn!("player: background music failed: {reason}"),
                _ => {}
            }
            pending.extend(self.session.handle_output(report, &mut self.rng));
        }
    }

    fn run(&mut self, cmd: OutputCommand) -> Option<OutputEvent> {
        match cmd {
            OutputCommand::Load(id) => {
                let result = match self.assets.get(&id) {
                    Some(asset) => self.narration.load(asset),
                    None => {
                        self.narration.unload();
                        Err(format!("no audio for story {id}"))
                    }
                };
                result.err().map(OutputEvent::StartFailed)
            }
            OutputCommand::Unload => {
                self.narration.unload();
                None
            }
            OutputCommand::Play => Some(match self.narration.play() {
                Ok(()) => OutputEvent::Started,
                Err(e) => OutputEvent::StartFailed(e),
            }),
            OutputCommand::Pause => {
                self.narration.pause();
                None
            }
            OutputCommand::Rewind => self.narration.rewind().err().map(OutputEvent::StartFailed),
            OutputCommand::BedPlay => self.bed.play().err().map(OutputEvent::BedFailed),
            OutputCommand::BedPause => {
                self.bed.pause();
                None
            }
        }
    }

    /// Playing, or paused on a loaded story that could be resumed.
    fn wants_samples(&self) -> bool {
        let driver = self.session.driver();
        match driver.state() {
            PlaybackState::Playing => true,
            PlaybackState::Paused => driver.track().is_some(),
            PlaybackState::Idle => false,
        }
    }

    /// Sample the narration output and report what it is really doing.
    fn tick(&mut self) {
        let event = match self.session.driver().state() {
            PlaybackState::Playing => self.sample_playing(),
            PlaybackState::Paused if !self.narration.is_paused() => OutputEvent::ResumedExternally,
            _ => return,
        };
        if event == OutputEvent::Ended {
            debug!("player: narration finished");
        }
        let commands = self.session.handle_output(event, &mut self.rng);
        self.execute(commands);
    }

    fn sample_playing(&self) -> OutputEvent {
        if self.narration.is_finished() {
            OutputEvent::Ended
        } else if self.narration.is_paused() {
            OutputEvent::PausedExternally
        } else {
            OutputEvent::Position {
                elapsed: self.narration.position().as_secs_f64(),
                duration: self.narration.duration().map(|d| d.as_secs_f64()),
            }
        }
    }

    fn status(&self) -> PlayerStatus {
        self.session.status()
    }

    fn library(&self) -> Library {
        let queue = self.session.queue();
        Library {
            stories: queue.stories().to_vec(),
            visible: queue.visible().into_iter().map(|s| s.id.clone()).collect(),
            filter: queue.filter().map(str::to_string),
            themes: queue.themes(),
        }
    }

    fn stop(&mut self) {
        self.narration.pause();
        self.bed.pause();
    }
}

//! Audio outputs — the device side of narration and background playback.
//!
//! [`AudioOutput`] is the seam between the playback thread and a real
//! device. [`RodioOutput`] plays through a `rodio` sink; [`SilentOutput`]
//! stands in when no device could be opened, so every start fails without
//! taking the rest of the program down.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use rodio::{Decoder, OutputStreamHandle, Sink, Source};

pub trait AudioOutput {
    /// Bind an encoded asset, paused at the start.
    fn load(&mut self, asset: Arc<[u8]>) -> Result<(), String>;
    fn unload(&mut self);
    fn play(&mut self) -> Result<(), String>;
    fn pause(&mut self);
    /// Seek back to the start of the loaded asset.
    fn rewind(&mut self) -> Result<(), String>;
    fn position(&self) -> Duration;
    /// Length of the loaded asset, if the decoder knows it.
    fn duration(&self) -> Option<Duration>;
    fn is_paused(&self) -> bool;
    /// The loaded asset played through to its end.
    fn is_finished(&self) -> bool;
}

// ─── rodio ────────────────────────────────────────────────────────────────

pub struct RodioOutput {
    sink: Sink,
    asset: Option<Arc<[u8]>>,
    duration: Option<Duration>,
    /// Repeat the asset forever (background bed).
    looping: bool,
}

impl RodioOutput {
    pub fn new(handle: &OutputStreamHandle, volume: f32, looping: bool) -> Result<Self, String> {
        let sink = Sink::try_new(handle).map_err(|e| e.to_string())?;
        sink.pause();
        sink.set_volume(volume);
        Ok(Self {
            sink,
            asset: None,
            duration: None,
            looping,
        })
    }

    fn append_from_start(&mut self) -> Result<(), String> {
        let asset = self.asset.clone().ok_or("nothing loaded")?;
        let decoder = Decoder::new(Cursor::new(asset)).map_err(|e| e.to_string())?;
        if self.looping {
            self.sink.append(decoder.repeat_infinite());
        } else {
            self.duration = decoder.total_duration();
            self.sink.append(decoder);
        }
        Ok(())
    }
}

impl AudioOutput for RodioOutput {
    fn load(&mut self, asset: Arc<[u8]>) -> Result<(), String> {
        // clear() also pauses the sink
        self.sink.clear();
        self.asset = Some(asset);
        self.duration = None;
        if let Err(e) = self.append_from_start() {
            self.asset = None;
            return Err(e);
        }
        Ok(())
    }

    fn unload(&mut self) {
        self.sink.clear();
        self.asset = None;
        self.duration = None;
    }

    fn play(&mut self) -> Result<(), String> {
        if self.sink.empty() {
            self.append_from_start()?;
        }
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn rewind(&mut self) -> Result<(), String> {
        self.sink.clear();
        self.append_from_start()
    }

    fn position(&self) -> Duration {
        self.sink.get_pos()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn is_finished(&self) -> bool {
        self.asset.is_some() && self.sink.empty()
    }
}

// ─── Fallback ─────────────────────────────────────────────────────────────

/// Output used when no audio device is available.
#[derive(Default)]
pub struct SilentOutput {
    loaded: bool,
}

const NO_DEVICE: &str = "no audio output device";

impl AudioOutput for SilentOutput {
    fn load(&mut self, _asset: Arc<[u8]>) -> Result<(), String> {
        self.loaded = true;
        Ok(())
    }

    fn unload(&mut self) {
        self.loaded = false;
    }

    fn play(&mut self) -> Result<(), String> {
        Err(NO_DEVICE.into())
    }

    fn pause(&mut self) {}

    fn rewind(&mut self) -> Result<(), String> {
        Err(NO_DEVICE.into())
    }

    fn position(&self) -> Duration {
        Duration::ZERO
    }

    fn duration(&self) -> Option<Duration> {
        None
    }

    fn is_paused(&self) -> bool {
        true
    }

    fn is_finished(&self) -> bool {
        false
    }
}

// ─── Probing ──────────────────────────────────────────────────────────────

/// Decode `asset` far enough to know its length in seconds.
///
/// Uses the container's declared length when there is one, otherwise counts
/// samples. Fails when the bytes are not a format the decoder understands or
/// hold no audio at all.
pub fn measure_duration(asset: &Arc<[u8]>) -> Result<f64, String> {
    let decoder = Decoder::new(Cursor::new(asset.clone())).map_err(|e| e.to_string())?;
    if let Some(d) = decoder.total_duration().filter(|d| !d.is_zero()) {
        return Ok(d.as_secs_f64());
    }

    let rate = f64::from(decoder.sample_rate());
    let channels = f64::from(decoder.channels());
    let samples = decoder.count();
    if samples == 0 || rate == 0.0 || channels == 0.0 {
        return Err("no audio samples".into());
    }
    Ok(samples as f64 / (rate * channels))
}

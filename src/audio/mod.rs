/// Audio output using cpal
///
/// The sequencer core only needs two things from an audio engine: its clock
/// and a way to start a tone at a given time on that clock.
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

pub mod voice;

pub use voice::{Mixer, Tone, ToneEnvelope};

/// Monotonic engine time in seconds, engine-defined epoch.
pub trait AudioClock {
    fn current_time(&self) -> f64;
}

/// Starts one tone at `start_time` on the engine clock. Never sounds at call
/// time unless `start_time` is already due.
pub trait ToneEmitter {
    fn emit(&self, frequency: f32, start_time: f64);
}

pub trait AudioEngine: AudioClock + ToneEmitter + Send + Sync {}

impl<T: AudioClock + ToneEmitter + Send + Sync> AudioEngine for T {}

const TONE_QUEUE: usize = 1024;

/// Thread-safe side of the output stream.
#[derive(Clone)]
pub struct AudioHandle {
    tx: Sender<Tone>,
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl AudioClock for AudioHandle {
    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }
}

impl ToneEmitter for AudioHandle {
    fn emit(&self, frequency: f32, start_time: f64) {
        let start_frame = (start_time.max(0.0) * self.sample_rate as f64).round() as u64;
        if self.tx.try_send(Tone { frequency, start_frame }).is_err() {
            log::warn!("tone queue full, dropping {:.1} Hz at {:.3}s", frequency, start_time);
        }
    }
}

/// Owns the cpal stream; must stay alive (and on its creating thread) for
/// sound to play.
pub struct AudioOutput {
    _stream: cpal::Stream,
    handle: AudioHandle,
}

impl AudioOutput {
    pub fn new() -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<Tone>(TONE_QUEUE);
        let frames = Arc::new(AtomicU64::new(0));

        let (stream, sample_rate) = Self::setup_audio_stream(rx, Arc::clone(&frames))?;
        log::info!("audio output running at {} Hz", sample_rate);

        Ok(Self {
            _stream: stream,
            handle: AudioHandle {
                tx,
                frames,
                sample_rate,
            },
        })
    }

    pub fn handle(&self) -> AudioHandle {
        self.handle.clone()
    }

    fn setup_audio_stream(
        rx: Receiver<Tone>,
        frames: Arc<AtomicU64>,
    ) -> Result<(cpal::Stream, u32)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no default output device".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("no default output config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                let mut mixer = Mixer::new(sample_rate);
                device.build_output_stream(
                    &config.into(),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        while let Ok(tone) = rx.try_recv() {
                            mixer.schedule(tone);
                        }
                        mixer.render(data, channels);
                        frames.store(mixer.frame(), Ordering::Release);
                    },
                    |err| log::error!("audio stream error: {}", err),
                    None,
                )
            }
            other => {
                return Err(Error::Audio(format!(
                    "unsupported sample format {:?} (only f32 supported)",
                    other
                )))
            }
        }
        .map_err(|e| Error::Audio(format!("failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::Audio(format!("failed to play output stream: {}", e)))?;

        Ok((stream, sample_rate))
    }
}

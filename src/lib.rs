/// tileseq - a grid step sequencer library
///
/// This library provides the core components of a tile-grid sequencer:
/// - Grid store with drag-gesture editing
/// - Pitch table mapping rows to notes
/// - Lookahead scheduling on the audio engine's clock
/// - Transport state machine and a host playback thread
/// - Synthesized audio output via cpal
/// - The boundary to an external pattern assistant

pub mod assist;
pub mod audio;
pub mod config;
pub mod error;
pub mod pitch;
pub mod sequencer;

// Re-export commonly used types
pub use assist::{AssistReply, Assistant, CommandService, CompletionService};
pub use audio::{AudioClock, AudioEngine, AudioHandle, AudioOutput, ToneEmitter};
pub use config::Config;
pub use error::{Error, Result};
pub use pitch::{midi_note_name, PitchEntry, PitchTable};
pub use sequencer::playback::{lock_sequencer, PlaybackEngine, PlaybackEvent};
pub use sequencer::{CellPos, Grid, Sequencer, StepObserver, TransportState};

/// Core sequencer logic - grid state, transport and scheduling
///
/// Nothing in here knows about the UI. Edits come in through `Sequencer`
/// methods, playhead movement goes out through a `StepObserver`, and sound
/// goes out through an `AudioEngine`.
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{AudioClock, AudioEngine, ToneEmitter};
use crate::config::Config;
use crate::pitch::PitchTable;

pub mod grid;
pub mod playback;
pub mod scheduler;
pub mod timer;
pub mod transport;

pub use grid::{CellPos, DragGesture, ForcedMode, Grid};
pub use scheduler::LookaheadScheduler;
pub use timer::RepeatingTimer;
pub use transport::{Transport, TransportState};

/// Receives playhead updates. Calls happen on the scheduling thread and must
/// return promptly.
pub trait StepObserver {
    fn on_step_advance(&mut self, step: usize);

    /// Playing -> Stopped should also send the playhead back to step 0.
    fn on_transport_change(&mut self, _playing: bool) {}
}

#[derive(Debug, Default)]
pub struct NullObserver;

impl StepObserver for NullObserver {
    fn on_step_advance(&mut self, _step: usize) {}
}

/// Stand-in clock while no engine is attached; the transport only reads it
/// when starting, which it refuses to do without an engine.
struct IdleClock;

impl AudioClock for IdleClock {
    fn current_time(&self) -> f64 {
        0.0
    }
}

pub struct Sequencer {
    grid: Grid,
    pitches: PitchTable,
    transport: Transport,
    drag: DragGesture,
    engine: Option<Arc<dyn AudioEngine>>,
    observer: Box<dyn StepObserver + Send>,
}

impl Sequencer {
    pub fn new(config: &Config) -> Self {
        let seq = &config.sequencer;
        let grid = Grid::new(seq.grid_size, seq.max_grid_size);
        let pitches = PitchTable::generate(grid.size());

        Self {
            grid,
            pitches,
            transport: Transport::new(seq.bpm, &config.scheduling),
            drag: DragGesture::default(),
            engine: None,
            observer: Box::new(NullObserver),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn AudioEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn set_observer(&mut self, observer: Box<dyn StepObserver + Send>) {
        self.observer = observer;
    }

    pub fn has_audio(&self) -> bool {
        self.engine.is_some()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn pitches(&self) -> &PitchTable {
        &self.pitches
    }

    pub fn grid_size(&self) -> usize {
        self.grid.size()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn bpm(&self) -> u32 {
        self.transport.bpm()
    }

    pub fn current_step(&self) -> usize {
        self.transport.current_step()
    }

    pub fn virtual_clock(&self) -> f64 {
        self.transport.virtual_clock()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_active()
    }

    /// Stops playback, then reallocates the grid and its pitches. Returns the
    /// clamped size.
    pub fn set_grid_size(&mut self, size: usize) -> usize {
        self.stop();
        self.drag.end();
        let size = self.grid.resize(size);
        self.pitches = PitchTable::generate(size);
        log::info!("grid resized to {}x{}", size, size);
        size
    }

    pub fn set_bpm(&mut self, bpm: u32) -> u32 {
        let now = Instant::now();
        match &self.engine {
            Some(engine) => {
                self.transport
                    .set_bpm(bpm, now, &**engine, self.observer.as_mut())
            }
            None => self
                .transport
                .set_bpm(bpm, now, &IdleClock, self.observer.as_mut()),
        }
    }

    /// Returns false if already playing or there is no audio engine.
    pub fn start(&mut self) -> bool {
        match &self.engine {
            Some(engine) => {
                self.transport
                    .start(Instant::now(), &**engine, self.observer.as_mut())
            }
            None => {
                log::debug!("no audio engine; transport stays stopped");
                false
            }
        }
    }

    pub fn stop(&mut self) -> bool {
        self.transport.stop(self.observer.as_mut())
    }

    /// Returns whether the transport is playing afterwards.
    pub fn toggle_playback(&mut self) -> bool {
        if self.is_playing() {
            self.stop();
        } else {
            self.start();
        }
        self.is_playing()
    }

    /// Sounds `row` right now, outside the scheduling loop. Only while stopped.
    fn preview(&self, row: usize) {
        if self.transport.is_playing() {
            return;
        }
        if let (Some(engine), Some(frequency)) = (&self.engine, self.pitches.frequency(row)) {
            engine.emit(frequency, engine.current_time());
        }
    }

    fn after_edit(&self, row: usize, col: usize, changed: bool) -> bool {
        if changed && self.grid.is_active(row, col) {
            self.preview(row);
        }
        changed
    }

    pub fn set_cell(&mut self, row: usize, col: usize, active: bool) -> bool {
        let changed = self.grid.set_active(row, col, active);
        self.after_edit(row, col, changed)
    }

    pub fn toggle_cell(&mut self, row: usize, col: usize) -> bool {
        let changed = self.grid.toggle(row, col, None);
        self.after_edit(row, col, changed)
    }

    pub fn begin_drag(&mut self, row: usize, col: usize) -> bool {
        let changed = self.drag.begin(&mut self.grid, row, col);
        self.after_edit(row, col, changed)
    }

    pub fn drag_over(&mut self, row: usize, col: usize) -> bool {
        let changed = self.drag.extend(&mut self.grid, row, col);
        self.after_edit(row, col, changed)
    }

    pub fn end_drag(&mut self) {
        self.drag.end();
    }

    /// Stops playback and deactivates every tile.
    pub fn clear(&mut self) {
        self.stop();
        self.grid.clear();
    }

    /// Stops playback and replaces the grid with `cells`; out-of-range cells
    /// are dropped. Returns how many were applied.
    pub fn load_pattern(&mut self, cells: &[CellPos]) -> usize {
        self.stop();
        let applied = self.grid.bulk_load(cells);
        log::info!("loaded pattern: {} of {} cells applied", applied, cells.len());
        applied
    }

    /// Gives the scheduler a chance to run. Returns how long the caller may
    /// wait before pumping again.
    pub fn pump(&mut self, now: Instant) -> Duration {
        match &self.engine {
            Some(engine) => self.transport.pump(
                now,
                &self.grid,
                &self.pitches,
                &**engine,
                self.observer.as_mut(),
            ),
            None => self.transport.poll_interval(),
        }
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingObserver {
    pub steps: Vec<usize>,
    pub transport: Vec<bool>,
}

#[cfg(test)]
impl StepObserver for RecordingObserver {
    fn on_step_advance(&mut self, step: usize) {
        self.steps.push(step);
    }

    fn on_transport_change(&mut self, playing: bool) {
        self.transport.push(playing);
    }
}

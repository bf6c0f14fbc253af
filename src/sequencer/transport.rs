/// Transport - play/stop state, step cursor and the scheduler's lifecycle
use std::time::{Duration, Instant};

use super::grid::Grid;
use super::scheduler::LookaheadScheduler;
use super::timer::RepeatingTimer;
use super::StepObserver;
use crate::audio::{AudioClock, ToneEmitter};
use crate::config::{SchedulingSettings, MAX_BPM, MIN_BPM};
use crate::pitch::PitchTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
}

#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    bpm: u32,
    start_offset: f64,
    scheduler: LookaheadScheduler,
    timer: RepeatingTimer,
}

impl Transport {
    pub fn new(bpm: u32, settings: &SchedulingSettings) -> Self {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        Self {
            state: TransportState::Stopped,
            bpm,
            start_offset: settings.start_offset_secs,
            scheduler: LookaheadScheduler::new(bpm, settings.schedule_ahead_secs),
            timer: RepeatingTimer::new(settings.poll_interval()),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn current_step(&self) -> usize {
        self.scheduler.current_step()
    }

    pub fn virtual_clock(&self) -> f64 {
        self.scheduler.virtual_clock()
    }

    pub fn poll_interval(&self) -> Duration {
        self.timer.interval()
    }

    /// Stopped -> Playing. Step 0 is placed a little after the engine's
    /// current time so nothing is scheduled in the past. Returns false if
    /// already playing.
    pub fn start<C: AudioClock + ?Sized>(
        &mut self,
        now: Instant,
        clock: &C,
        observer: &mut dyn StepObserver,
    ) -> bool {
        if self.is_playing() {
            return false;
        }
        let start_time = clock.current_time() + self.start_offset;
        self.scheduler.reset(start_time, self.bpm);
        self.timer.arm(now);
        self.state = TransportState::Playing;
        observer.on_transport_change(true);
        log::info!("transport started at {} bpm, first step at {:.3}s", self.bpm, start_time);
        true
    }

    /// Playing -> Stopped. Only future scheduling is cancelled; tones already
    /// handed to the engine ring out. Returns false if already stopped.
    pub fn stop(&mut self, observer: &mut dyn StepObserver) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.timer.cancel();
        self.scheduler.reset(0.0, self.bpm);
        self.state = TransportState::Stopped;
        observer.on_transport_change(false);
        log::info!("transport stopped");
        true
    }

    /// Clamps and applies a new tempo. While playing this restarts the
    /// transport so the virtual clock is rebuilt under the new tempo instead
    /// of jumping mid-loop. Returns the tempo applied.
    pub fn set_bpm<C: AudioClock + ?Sized>(
        &mut self,
        bpm: u32,
        now: Instant,
        clock: &C,
        observer: &mut dyn StepObserver,
    ) -> u32 {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        if bpm == self.bpm {
            return bpm;
        }
        if self.stop(observer) {
            self.bpm = bpm;
            self.start(now, clock, observer);
        } else {
            self.bpm = bpm;
        }
        bpm
    }

    /// Runs the scheduler if the timer is due. Returns how long the host may
    /// wait before pumping again.
    pub fn pump<E: AudioClock + ToneEmitter + ?Sized>(
        &mut self,
        now: Instant,
        grid: &Grid,
        pitches: &PitchTable,
        engine: &E,
        observer: &mut dyn StepObserver,
    ) -> Duration {
        if !self.is_playing() {
            return self.timer.interval();
        }
        if self.timer.fire(now) {
            self.scheduler
                .schedule(engine.current_time(), grid, pitches, engine, observer);
        }
        self.timer
            .time_until_due(now)
            .unwrap_or_else(|| self.timer.interval())
    }
}

//! Lookahead scheduler.
//!
//! The scheduler is woken by a coarse, jittery timer but commits notes on the
//! audio engine's own clock. Each firing schedules every step whose time falls
//! before `now + schedule_ahead`, so a late firing catches up on all the steps
//! it missed instead of skipping them, and every step keeps its exact time.

use super::grid::Grid;
use super::StepObserver;
use crate::audio::ToneEmitter;
use crate::pitch::PitchTable;

/// Seconds per step: one sixteenth note at `bpm`.
pub fn step_duration(bpm: u32) -> f64 {
    60.0 / bpm as f64 / 4.0
}

#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    /// Engine time of step 0
    origin: f64,
    /// Steps committed since `origin`; the virtual clock is derived from this
    /// rather than accumulated, so it cannot drift.
    steps_scheduled: u64,
    step_duration: f64,
    schedule_ahead: f64,
    current_step: usize,
}

impl LookaheadScheduler {
    pub fn new(bpm: u32, schedule_ahead: f64) -> Self {
        Self {
            origin: 0.0,
            steps_scheduled: 0,
            step_duration: step_duration(bpm),
            schedule_ahead,
            current_step: 0,
        }
    }

    /// Rewinds to step 0, with step 0 sounding at `start_time`.
    pub fn reset(&mut self, start_time: f64, bpm: u32) {
        self.origin = start_time;
        self.steps_scheduled = 0;
        self.step_duration = step_duration(bpm);
        self.current_step = 0;
    }

    /// Engine time of the next step not yet scheduled.
    pub fn virtual_clock(&self) -> f64 {
        self.origin + self.steps_scheduled as f64 * self.step_duration
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Commits every step due before `now + schedule_ahead`. Cells are read
    /// here, at schedule time, so an edit made before its step is committed is
    /// honoured. Returns the number of steps scheduled.
    pub fn schedule<E: ToneEmitter + ?Sized>(
        &mut self,
        now: f64,
        grid: &Grid,
        pitches: &PitchTable,
        emitter: &E,
        observer: &mut dyn StepObserver,
    ) -> usize {
        let horizon = now + self.schedule_ahead;
        let size = grid.size();
        let mut scheduled = 0;

        while self.virtual_clock() < horizon {
            let time = self.virtual_clock();
            let step = self.current_step % size;

            for row in 0..size {
                if !grid.is_active(row, step) {
                    continue;
                }
                if let Some(frequency) = pitches.frequency(row) {
                    emitter.emit(frequency, time);
                }
            }
            observer.on_step_advance(step);

            self.current_step = (step + 1) % size;
            self.steps_scheduled += 1;
            scheduled += 1;
        }

        if scheduled > 1 {
            log::trace!("caught up {} steps in one firing", scheduled);
        }
        scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fake::FakeEngine;
    use crate::audio::AudioClock;
    use crate::sequencer::RecordingObserver;

    const AHEAD: f64 = 0.1;
    const POLL: f64 = 0.025;

    fn assert_emitted(got: (f32, f64), frequency: f32, time: f64) {
        assert_eq!(got.0, frequency);
        assert!((got.1 - time).abs() < 1e-9, "emitted at {} expected {}", got.1, time);
    }

    fn setup(size: usize) -> (Grid, PitchTable) {
        (Grid::new(size, 64), PitchTable::generate(64))
    }

    #[test]
    fn test_step_duration_is_sixteenth() {
        assert!((step_duration(120) - 0.125).abs() < 1e-12);
        assert!((step_duration(60) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_schedules_only_within_window() {
        let (mut grid, pitches) = setup(8);
        for col in 0..8 {
            grid.set_active(0, col, true);
        }
        let engine = FakeEngine::at(10.0);
        let mut observer = RecordingObserver::default();
        let mut sched = LookaheadScheduler::new(120, AHEAD);
        sched.reset(10.05, 120);

        let n = sched.schedule(engine.current_time(), &grid, &pitches, &engine, &mut observer);
        assert_eq!(n, 1);
        let emitted = engine.emissions();
        assert_eq!(emitted.len(), 1);
        assert_emitted(emitted[0], pitches.frequency(0).unwrap(), 10.05);
        assert_eq!(observer.steps, vec![0]);
        assert_eq!(sched.current_step(), 1);
        assert!((sched.virtual_clock() - 10.175).abs() < 1e-9);

        // nothing new is due until the clock reaches the next window
        let n = sched.schedule(10.05, &grid, &pitches, &engine, &mut observer);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_no_drift_under_jitter() {
        let (mut grid, pitches) = setup(16);
        for col in 0..16 {
            grid.set_active(5, col, true);
        }
        let engine = FakeEngine::at(0.0);
        let mut observer = RecordingObserver::default();
        let bpm = 137;
        let start = 0.05;
        let mut sched = LookaheadScheduler::new(bpm, AHEAD);
        sched.reset(start, bpm);

        // pseudo-random firing delays up to schedule_ahead - poll
        let mut seed: u32 = 12345;
        let max_jitter = AHEAD - POLL;
        for _ in 0..2000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let jitter = (seed >> 16) as f64 / 65536.0 * max_jitter;
            engine.advance(POLL + jitter);
            sched.schedule(engine.current_time(), &grid, &pitches, &engine, &mut observer);
        }

        let times: Vec<f64> = engine.emissions().iter().map(|(_, t)| *t).collect();
        assert!(times.len() > 500);
        let dur = step_duration(bpm);
        for (k, t) in times.iter().enumerate() {
            let expected = start + k as f64 * dur;
            assert!((t - expected).abs() < 1e-9, "step {} at {} expected {}", k, t, expected);
        }
    }

    #[test]
    fn test_late_firing_catches_up() {
        let (mut grid, pitches) = setup(8);
        grid.set_active(1, 0, true);
        grid.set_active(2, 1, true);
        grid.set_active(3, 2, true);
        let engine = FakeEngine::at(0.0);
        let mut observer = RecordingObserver::default();
        let mut sched = LookaheadScheduler::new(120, AHEAD);
        sched.reset(0.05, 120);

        sched.schedule(0.0, &grid, &pitches, &engine, &mut observer);
        assert_eq!(engine.take_emissions().len(), 1);

        // the callback stalls past two more step boundaries
        let n = sched.schedule(0.3, &grid, &pitches, &engine, &mut observer);
        assert_eq!(n, 2);
        let emitted = engine.take_emissions();
        assert_eq!(emitted.len(), 2);
        assert_emitted(emitted[0], pitches.frequency(2).unwrap(), 0.175);
        assert_emitted(emitted[1], pitches.frequency(3).unwrap(), 0.3);
        assert_eq!(observer.steps, vec![0, 1, 2]);
    }

    #[test]
    fn test_edit_before_commit_is_heard() {
        let (mut grid, pitches) = setup(4);
        let engine = FakeEngine::at(0.0);
        let mut observer = RecordingObserver::default();
        let mut sched = LookaheadScheduler::new(120, AHEAD);
        sched.reset(0.05, 120);
        sched.schedule(0.0, &grid, &pitches, &engine, &mut observer);

        grid.set_active(2, 1, true);
        sched.schedule(0.1, &grid, &pitches, &engine, &mut observer);
        let emitted = engine.emissions();
        assert_eq!(emitted.len(), 1);
        assert_emitted(emitted[0], pitches.frequency(2).unwrap(), 0.175);
    }

    #[test]
    fn test_step_wraps_and_unmapped_rows_are_silent() {
        let mut grid = Grid::new(4, 64);
        let pitches = PitchTable::generate(2);
        grid.set_active(3, 0, true);
        grid.set_active(1, 0, true);
        let engine = FakeEngine::at(0.0);
        let mut observer = RecordingObserver::default();
        let mut sched = LookaheadScheduler::new(120, AHEAD);
        sched.reset(0.0, 120);

        sched.schedule(0.5, &grid, &pitches, &engine, &mut observer);
        assert_eq!(observer.steps, vec![0, 1, 2, 3, 0]);
        assert_eq!(engine.emissions().len(), 2);
        assert!(engine
            .emissions()
            .iter()
            .all(|(f, _)| *f == pitches.frequency(1).unwrap()));
    }
}

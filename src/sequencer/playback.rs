/// Playback engine - the host thread that keeps the transport pumped
///
/// The sequencer itself never sleeps. This thread wakes when the transport's
/// timer is next due, pumps it, and forwards playhead changes to the UI over
/// a channel.
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{Sequencer, StepObserver};

const MIN_WAIT: Duration = Duration::from_millis(1);

/// Events kept for a UI that has stopped polling; older ones are discarded.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
    Started,
    Stopped,
}

/// Forwards scheduler callbacks as `PlaybackEvent`s without blocking. When
/// the queue is full the oldest event makes room for the newest.
#[derive(Clone)]
pub struct ChannelObserver {
    sender: Sender<PlaybackEvent>,
    overflow: Receiver<PlaybackEvent>,
}

impl ChannelObserver {
    fn send(&self, event: PlaybackEvent) {
        if let Err(TrySendError::Full(event)) = self.sender.try_send(event) {
            let _ = self.overflow.try_recv();
            let _ = self.sender.try_send(event);
        }
    }
}

impl StepObserver for ChannelObserver {
    fn on_step_advance(&mut self, step: usize) {
        self.send(PlaybackEvent::StepAdvanced(step));
    }

    fn on_transport_change(&mut self, playing: bool) {
        let event = if playing {
            PlaybackEvent::Started
        } else {
            PlaybackEvent::Stopped
        };
        self.send(event);
    }
}

/// Locks the shared sequencer. A panic while holding the lock leaves plain
/// data behind, so the guard is recovered rather than propagated.
pub fn lock_sequencer(sequencer: &Mutex<Sequencer>) -> MutexGuard<'_, Sequencer> {
    sequencer.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PlaybackEngine {
    sender: Sender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    is_running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(EVENT_CAPACITY);

        Self {
            sender,
            receiver,
            is_running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Observer to install on the sequencer so its events reach `poll_events`.
    pub fn observer(&self) -> ChannelObserver {
        ChannelObserver {
            sender: self.sender.clone(),
            overflow: self.receiver.clone(),
        }
    }

    pub fn start(&mut self, sequencer: Arc<Mutex<Sequencer>>) {
        if self.is_running.swap(true, Ordering::AcqRel) {
            return;
        }

        let is_running = Arc::clone(&self.is_running);

        self.worker = Some(thread::spawn(move || {
            log::debug!("playback thread running");
            while is_running.load(Ordering::Acquire) {
                let wait = lock_sequencer(&sequencer).pump(Instant::now());
                thread::sleep(wait.max(MIN_WAIT));
            }
            log::debug!("playback thread exiting");
        }));
    }

    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("playback thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        self.receiver.try_iter().collect()
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

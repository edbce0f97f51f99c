//! One-shot delayed callbacks used to arm batch flushes.

use crate::util::error::ScheduleError;
use log::trace;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

pub type FlushTask = Box<dyn FnOnce() + Send + 'static>;

const FLUSH_THREAD_NAME: &str = "pulse-flush";

/// Runs a task once, on some thread other than the caller's, after `delay`.
pub trait FlushScheduler: Send + Sync + 'static {
    fn schedule(&self, delay: Duration, task: FlushTask) -> Result<(), ScheduleError>;
}

/// Spawns a detached thread per task that sleeps out the delay and then runs it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl FlushScheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: FlushTask) -> Result<(), ScheduleError> {
        thread::Builder::new()
            .name(FLUSH_THREAD_NAME.to_string())
            .spawn(move || {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                trace!("event=pulse_timer_fired delay_us={}", delay.as_micros());
                task();
            })?;
        Ok(())
    }
}

/// Parks scheduled tasks until the owner fires them.
///
/// Lets embedders (and tests) drive flushes deterministically instead of by
/// wall-clock time. Fired tasks run on the thread calling `fire_*`.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    pending: VecDeque<(Duration, FlushTask)>,
    scheduled: usize,
    closed: bool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of tasks ever scheduled.
    pub fn scheduled(&self) -> usize {
        self.state.lock().scheduled
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Delays of the tasks still waiting, oldest first.
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.state
            .lock()
            .pending
            .iter()
            .map(|(delay, _)| *delay)
            .collect()
    }

    /// Runs the oldest pending task; returns false if none was waiting.
    pub fn fire_next(&self) -> bool {
        // Pop before running so the task may schedule again without deadlocking.
        let next = self.state.lock().pending.pop_front();
        match next {
            Some((_, task)) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs pending tasks until none remain; returns how many ran.
    pub fn fire_all(&self) -> usize {
        let mut fired = 0;
        while self.fire_next() {
            fired += 1;
        }
        fired
    }

    /// Rejects all future scheduling attempts.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}

impl FlushScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: FlushTask) -> Result<(), ScheduleError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ScheduleError::Closed);
        }
        state.scheduled += 1;
        state.pending.push_back((delay, task));
        Ok(())
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("pending", &state.pending.len())
            .field("scheduled", &state.scheduled)
            .field("closed", &state.closed)
            .finish()
    }
}

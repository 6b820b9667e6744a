use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::foundation::clock::{Clock, ManualClock};

/// Timers never re-arm faster than this, so a repeating timer cannot spin inside one tick.
pub const MIN_TIMER_DELAY_MS: f64 = 1.0;

/// Handle to a registered frame task or timer. Tokens are never reused by a loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskToken(u64);

/// What a per-frame task wants after running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameControl {
    Continue,
    Finish,
}

/// What a timer task wants after firing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimerControl {
    /// Fire again `delay_ms` after the deadline that just fired.
    Reschedule(f64),
    Finish,
}

pub type FrameTask = Box<dyn FnMut(f64) -> FrameControl>;
pub type TimerTask = Box<dyn FnMut(f64) -> TimerControl>;

/// Scheduling primitive the animation and trail services are written against.
///
/// A browser host maps `request_frames` onto `requestAnimationFrame` and timers onto
/// `setTimeout`; [`FrameLoop`] is the in-process implementation.
pub trait FrameClock {
    fn now_ms(&self) -> f64;

    /// Run `task` once per frame until it returns [`FrameControl::Finish`] or is cancelled.
    fn request_frames(&self, task: FrameTask) -> TaskToken;

    /// Run `task` after `delay_ms`; it may ask to be re-armed.
    fn set_timer(&self, delay_ms: f64, task: TimerTask) -> TaskToken;

    /// Drop a frame task or timer. Returns `false` for unknown or finished tokens.
    fn cancel(&self, token: TaskToken) -> bool;
}

enum Slot<T> {
    Idle(T),
    Running,
}

impl<T> Slot<T> {
    fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, Slot::Running) {
            Slot::Idle(task) => Some(task),
            Slot::Running => None,
        }
    }

    fn is_idle(&self) -> bool {
        matches!(self, Slot::Idle(_))
    }
}

struct TimerEntry {
    deadline: f64,
    slot: Slot<TimerTask>,
}

#[derive(Default)]
struct LoopState {
    next_token: u64,
    // Keyed by token, so iteration order is registration order.
    frames: BTreeMap<TaskToken, Slot<FrameTask>>,
    timers: HashMap<TaskToken, TimerEntry>,
    ticks: u64,
}

impl LoopState {
    fn issue(&mut self) -> TaskToken {
        self.next_token += 1;
        TaskToken(self.next_token)
    }

    fn next_due_timer(&self, now: f64) -> Option<TaskToken> {
        self.timers
            .iter()
            .filter(|(_, t)| t.slot.is_idle() && t.deadline <= now)
            .min_by(|(ta, a), (tb, b)| a.deadline.total_cmp(&b.deadline).then(ta.cmp(tb)))
            .map(|(token, _)| *token)
    }
}

/// Single-threaded frame and timer scheduler driven by explicit [`FrameLoop::tick`] calls.
pub struct FrameLoop {
    clock: Arc<dyn Clock>,
    state: RefCell<LoopState>,
}

impl FrameLoop {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RefCell::new(LoopState::default()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run one frame: every frame task registered before this call, then all due timers.
    ///
    /// Returns the frame timestamp handed to the tasks.
    pub fn tick(&self) -> f64 {
        let now = self.clock.now_ms();
        let due: Vec<TaskToken> = {
            let mut state = self.state.borrow_mut();
            state.ticks += 1;
            state.frames.keys().copied().collect()
        };
        for token in due {
            self.run_frame_task(token, now);
        }
        self.fire_due_timers(now);
        now
    }

    fn run_frame_task(&self, token: TaskToken, now: f64) {
        let task = {
            let mut state = self.state.borrow_mut();
            state.frames.get_mut(&token).and_then(Slot::take)
        };
        let Some(mut task) = task else {
            return;
        };

        let control = task(now);

        let mut state = self.state.borrow_mut();
        match control {
            FrameControl::Continue => {
                // Missing entry means the task was cancelled while it ran.
                if let Some(slot) = state.frames.get_mut(&token) {
                    *slot = Slot::Idle(task);
                }
            }
            FrameControl::Finish => {
                state.frames.remove(&token);
            }
        }
    }

    fn fire_due_timers(&self, now: f64) {
        loop {
            let picked = {
                let mut state = self.state.borrow_mut();
                let Some(token) = state.next_due_timer(now) else {
                    break;
                };
                state
                    .timers
                    .get_mut(&token)
                    .and_then(|t| t.slot.take().map(|task| (token, t.deadline, task)))
            };
            let Some((token, deadline, mut task)) = picked else {
                break;
            };

            let control = task(now);

            let mut state = self.state.borrow_mut();
            match control {
                TimerControl::Reschedule(delay_ms) => {
                    if let Some(entry) = state.timers.get_mut(&token) {
                        entry.deadline = deadline + sanitize_delay(delay_ms).max(MIN_TIMER_DELAY_MS);
                        entry.slot = Slot::Idle(task);
                    }
                }
                TimerControl::Finish => {
                    state.timers.remove(&token);
                }
            }
        }
    }

    pub fn pending_frames(&self) -> usize {
        self.state.borrow().frames.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state.borrow();
        state.frames.is_empty() && state.timers.is_empty()
    }

    pub fn ticks(&self) -> u64 {
        self.state.borrow().ticks
    }

    /// Earliest pending timer deadline, if any.
    pub fn next_deadline(&self) -> Option<f64> {
        self.state
            .borrow()
            .timers
            .values()
            .map(|t| t.deadline)
            .min_by(f64::total_cmp)
    }

    /// Drive the loop on virtual time: advance `clock` by `frame_ms` and tick, until
    /// `duration_ms` has elapsed. Returns the number of ticks run.
    pub fn run_virtual(&self, clock: &ManualClock, duration_ms: f64, frame_ms: f64) -> u64 {
        let frame_ms = sanitize_delay(frame_ms).max(MIN_TIMER_DELAY_MS);
        let end = clock.now_ms() + sanitize_delay(duration_ms);
        let mut ticks = 0;
        while clock.now_ms() < end {
            let step = frame_ms.min(end - clock.now_ms());
            clock.advance(step);
            self.tick();
            ticks += 1;
        }
        ticks
    }

    /// Drive the loop on the wall clock, sleeping `frame_ms` between ticks, until nothing is
    /// scheduled or `max_ms` of loop time has passed. Returns the number of ticks run.
    pub fn run_until_idle(&self, frame_ms: f64, max_ms: f64) -> u64 {
        let frame = std::time::Duration::from_secs_f64(sanitize_delay(frame_ms) / 1000.0);
        let start = self.clock.now_ms();
        let mut ticks = 0;
        loop {
            self.tick();
            ticks += 1;
            if self.is_idle() || self.clock.now_ms() - start >= max_ms {
                return ticks;
            }
            std::thread::sleep(frame);
        }
    }
}

impl FrameClock for FrameLoop {
    fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    fn request_frames(&self, task: FrameTask) -> TaskToken {
        let mut state = self.state.borrow_mut();
        let token = state.issue();
        state.frames.insert(token, Slot::Idle(task));
        token
    }

    fn set_timer(&self, delay_ms: f64, task: TimerTask) -> TaskToken {
        let deadline = self.clock.now_ms() + sanitize_delay(delay_ms);
        let mut state = self.state.borrow_mut();
        let token = state.issue();
        state.timers.insert(
            token,
            TimerEntry {
                deadline,
                slot: Slot::Idle(task),
            },
        );
        token
    }

    fn cancel(&self, token: TaskToken) -> bool {
        // Removed entries may own closures whose drop re-enters the loop; drop them unborrowed.
        let (frame, timer) = {
            let mut state = self.state.borrow_mut();
            (state.frames.remove(&token), state.timers.remove(&token))
        };
        let found = frame.is_some() || timer.is_some();
        if found {
            tracing::trace!(?token, "cancelled scheduled task");
        }
        found
    }
}

fn sanitize_delay(ms: f64) -> f64 {
    if ms.is_finite() { ms.max(0.0) } else { 0.0 }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/frame_loop.rs"]
mod tests;

//! Timer Service: multiplexes several independent logical timers onto one free-running hardware
//! counter.
//!
//! The Link Layer needs more than one outstanding deadline at a time (e.g. the next advertising
//! event and a connection event supervision deadline), but a typical radio MCU only exposes a
//! single free-running counter with a handful of independent compare channels. `TimerService`
//! hands out up to [`SLOTS`] logical timers, each backed by its own [`CompareChannel`], and runs
//! their callbacks from the channel's compare-match interrupt.

use crate::time::{Duration, Instant};

/// Number of logical timers this service can multiplex at once.
pub const SLOTS: usize = 4;

/// Correction subtracted from the next deadline of a repeated timer to compensate for the time
/// spent between the compare match firing and the timer being reprogrammed.
///
/// This must be re-measured and tuned for the concrete hardware target; 2 µs is a reasonable
/// starting point for a timer driven by a radio ISR on a Cortex-M0 at a few dozen MHz.
pub const DRIFT_FIX: u32 = 2;

/// A single hardware compare channel backing one logical timer.
///
/// Implementations are expected to read and write a single compare register of a free-running
/// counter shared by all channels (so that `now()` agrees across channels).
pub trait CompareChannel {
    /// Returns the current value of the free-running counter.
    fn now(&self) -> Instant;

    /// Arms the channel to fire its compare-match interrupt at `deadline`.
    fn arm(&mut self, deadline: Instant);

    /// Disarms the channel, preventing further compare-match interrupts.
    fn disarm(&mut self);

    /// Returns whether this channel's compare-match event is currently pending.
    fn is_pending(&self) -> bool;

    /// Clears this channel's pending compare-match event.
    fn clear_pending(&mut self);
}

/// Errors returned by [`TimerService`] operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerError {
    /// No free timer slot was available to satisfy `create`.
    OutOfMemory,
    /// The requested duration or timer id is not valid.
    Invalid,
    /// The timer is already running (`start` was called twice without an intervening `stop`).
    Already,
}

/// Whether a timer fires once or repeatedly.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// The timer disarms itself after firing once.
    OneShot,
    /// The timer automatically reschedules itself for another period after firing.
    Repeated,
}

/// Opaque handle to a logical timer created by [`TimerService::create`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimerId(u8);

fn noop_callback(_: TimerId) {}

struct Slot<T> {
    channel: T,
    kind: TimerKind,
    active: bool,
    period: Duration,
    deadline: Instant,
    callback: fn(TimerId),
}

/// Multiplexes up to [`SLOTS`] logical timers onto independent [`CompareChannel`]s.
pub struct TimerService<T: CompareChannel> {
    slots: [Option<Slot<T>>; SLOTS],
}

impl<T: CompareChannel> TimerService<T> {
    /// Creates an empty timer service with no logical timers allocated yet.
    pub fn new() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }

    /// Allocates a new logical timer backed by `channel`.
    ///
    /// The timer is created in the stopped state; call [`TimerService::start`] to arm it.
    pub fn create(&mut self, channel: T, kind: TimerKind) -> Result<TimerId, TimerError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(TimerError::OutOfMemory)?;
        let now = channel.now();
        self.slots[index] = Some(Slot {
            channel,
            kind,
            active: false,
            period: Duration::from_micros(0),
            deadline: now,
            callback: noop_callback,
        });
        Ok(TimerId(index as u8))
    }

    /// Starts (arms) `id` to fire `callback` after `micros` microseconds.
    ///
    /// For a [`TimerKind::Repeated`] timer, the same period is used for every subsequent firing.
    /// Returns [`TimerError::Already`] if the timer is currently running, and
    /// [`TimerError::Invalid`] if `micros` does not fit the hardware counter's range.
    pub fn start(&mut self, id: TimerId, micros: u32, callback: fn(TimerId)) -> Result<(), TimerError> {
        if micros >= 1 << 24 {
            return Err(TimerError::Invalid);
        }
        let slot = self.slot_mut(id)?;
        if slot.active {
            return Err(TimerError::Already);
        }
        let period = Duration::from_micros(micros);
        let deadline = slot.channel.now() + period;
        slot.period = period;
        slot.deadline = deadline;
        slot.callback = callback;
        slot.active = true;
        slot.channel.arm(deadline);
        Ok(())
    }

    /// Stops (disarms) a running timer. Idempotent: stopping an inactive timer is not an error.
    pub fn stop(&mut self, id: TimerId) -> Result<(), TimerError> {
        let slot = self.slot_mut(id)?;
        slot.channel.disarm();
        slot.active = false;
        Ok(())
    }

    /// Returns the time remaining until `id` next fires, or zero if it is not running.
    pub fn remaining(&self, id: TimerId) -> Result<Duration, TimerError> {
        let slot = self.slot(id)?;
        if !slot.active {
            return Ok(Duration::from_micros(0));
        }
        let now = slot.channel.now();
        Ok(slot.deadline.duration_since(now))
    }

    /// Services a compare-match interrupt for `id`, reprogramming the channel (for repeated
    /// timers) before invoking the registered callback.
    ///
    /// The channel is always reprogrammed or disarmed *before* the callback runs, so that a
    /// callback which calls back into this `TimerService` never observes its own timer still
    /// armed at the old deadline.
    pub fn fire(&mut self, id: TimerId) {
        let callback = {
            let slot = match self.slot_mut(id) {
                Ok(slot) => slot,
                Err(_) => return,
            };
            slot.channel.clear_pending();
            match slot.kind {
                TimerKind::Repeated => {
                    let fix = Duration::from_micros(DRIFT_FIX);
                    slot.deadline = slot.deadline + slot.period - fix;
                    slot.channel.arm(slot.deadline);
                }
                TimerKind::OneShot => {
                    slot.channel.disarm();
                    slot.active = false;
                }
            }
            slot.callback
        };
        callback(id);
    }

    fn slot(&self, id: TimerId) -> Result<&Slot<T>, TimerError> {
        self.slots[id.0 as usize]
            .as_ref()
            .ok_or(TimerError::Invalid)
    }

    fn slot_mut(&mut self, id: TimerId) -> Result<&mut Slot<T>, TimerError> {
        self.slots[id.0 as usize]
            .as_mut()
            .ok_or(TimerError::Invalid)
    }
}

impl<T: CompareChannel> Default for TimerService<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct MockChannel {
        now: u32,
        armed: Option<u32>,
        pending: bool,
    }

    impl MockChannel {
        fn new() -> Self {
            Self {
                now: 0,
                armed: None,
                pending: false,
            }
        }
    }

    impl CompareChannel for MockChannel {
        fn now(&self) -> Instant {
            Instant::from_raw_micros(self.now)
        }
        fn arm(&mut self, deadline: Instant) {
            self.armed = Some(deadline.raw_micros());
        }
        fn disarm(&mut self) {
            self.armed = None;
        }
        fn is_pending(&self) -> bool {
            self.pending
        }
        fn clear_pending(&mut self) {
            self.pending = false;
        }
    }

    #[test]
    fn one_shot_fires_once() {
        let mut svc = TimerService::new();
        let id = svc.create(MockChannel::new(), TimerKind::OneShot).unwrap();
        svc.start(id, 1000, |_| {}).unwrap();
        assert!(svc.start(id, 1000, |_| {}).is_err());
        svc.fire(id);
        assert_eq!(svc.remaining(id).unwrap(), Duration::from_micros(0));
        // restarting after it fired (and thus deactivated) must succeed
        svc.start(id, 1000, |_| {}).unwrap();
    }

    #[test]
    fn out_of_memory_when_full() {
        let mut svc = TimerService::new();
        for _ in 0..SLOTS {
            svc.create(MockChannel::new(), TimerKind::OneShot).unwrap();
        }
        assert_eq!(
            svc.create(MockChannel::new(), TimerKind::OneShot)
                .unwrap_err(),
            TimerError::OutOfMemory
        );
    }

    #[test]
    fn unknown_timer_id_is_invalid() {
        let svc: TimerService<MockChannel> = TimerService::new();
        assert_eq!(svc.remaining(TimerId(0)).unwrap_err(), TimerError::Invalid);
    }
}

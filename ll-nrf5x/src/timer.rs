//! Timer Service driver for the nRF52810's `TIMER` peripherals.
//!
//! Each nRF `TIMER` is a single free-running counter with four independent compare/capture (CC)
//! channels, which is exactly the hardware shape [`ll_core::timer_service::TimerService`] expects:
//! CC[0] is reserved to capture the counter for [`BleTimer::now`] (shared, read-only, never armed),
//! and CC[1..=3] back three [`CompareChannel`]s that `TimerService` multiplexes into the Link
//! Layer's `interval`, `singleShot` and `ifs` timers (§4.3's "at most one of each in use"
//! invariant). `TimerService`'s 4-slot capacity is intentionally one more than the 3 channels we
//! ever hand out here, mirroring the Link Layer never actually needing all four.

use {
    core::mem,
    ll_core::{
        link::NextUpdate,
        time::{Duration, Instant, Timer},
        timer_service::CompareChannel,
    },
    nrf52810_hal::nrf52810_pac::{TIMER0, TIMER1, TIMER2},
};

mod sealed {
    pub trait Sealed {}
}

/// Extension trait implemented for the nRF TIMER peripherals.
///
/// CC[0] is reserved for `now()` captures; CC[1], CC[2] and CC[3] are addressed by
/// [`Channel::arm`]/[`Channel::disarm`] through their channel index.
pub trait NrfTimerExt: sealed::Sealed {
    /// Creates a second handle to the same peripheral. Safe to use only for `now()` reads (CC[0]
    /// captures), never for arming, since two owners racing `set_interrupt` on the same CC
    /// register would corrupt each other's deadline.
    unsafe fn duplicate(&self) -> Self;

    /// Configures the timer to free-run at 1 MHz (16 MHz HFCLK / 16) in 32-bit mode.
    fn init(&mut self);

    /// Reads the current counter value via a CC[0] capture.
    fn now(&self) -> Instant;

    /// Arms compare channel `cc` (1..=3) to fire at `at`.
    fn arm(&mut self, cc: usize, at: Instant);

    /// Disarms and acknowledges compare channel `cc`.
    fn disarm(&mut self, cc: usize);

    /// Returns whether compare channel `cc`'s event is pending.
    fn is_pending(&self, cc: usize) -> bool;

    /// Acknowledges compare channel `cc`'s event without disabling its interrupt.
    fn clear_pending(&mut self, cc: usize);
}

macro_rules! impl_timer {
    ($ty:ident) => {
        impl NrfTimerExt for $ty {
            unsafe fn duplicate(&self) -> Self {
                mem::transmute_copy(self)
            }

            fn init(&mut self) {
                self.bitmode.write(|w| w.bitmode()._32bit());
                // 2^4 = 16; 16 MHz / 16 = 1 MHz = µs resolution.
                self.prescaler.write(|w| unsafe { w.prescaler().bits(4) });
                self.tasks_clear.write(|w| unsafe { w.bits(1) });
                self.tasks_start.write(|w| unsafe { w.bits(1) });
            }

            fn now(&self) -> Instant {
                self.tasks_capture[0].write(|w| unsafe { w.bits(1) });
                let micros = self.cc[0].read().bits();
                Instant::from_raw_micros(micros)
            }

            fn arm(&mut self, cc: usize, at: Instant) {
                self.cc[cc].write(|w| unsafe { w.bits(at.raw_micros()) });
                self.events_compare[cc].reset();
                match cc {
                    1 => self.intenset.write(|w| w.compare1().set()),
                    2 => self.intenset.write(|w| w.compare2().set()),
                    3 => self.intenset.write(|w| w.compare3().set()),
                    _ => unreachable!("only CC[1..=3] are armable"),
                }
            }

            fn disarm(&mut self, cc: usize) {
                match cc {
                    1 => self.intenclr.write(|w| w.compare1().clear()),
                    2 => self.intenclr.write(|w| w.compare2().clear()),
                    3 => self.intenclr.write(|w| w.compare3().clear()),
                    _ => unreachable!("only CC[1..=3] are armable"),
                }
                self.events_compare[cc].reset();
            }

            fn is_pending(&self, cc: usize) -> bool {
                self.events_compare[cc].read().bits() == 1u32
            }

            fn clear_pending(&mut self, cc: usize) {
                self.events_compare[cc].reset();
            }
        }

        impl sealed::Sealed for $ty {}
    };
}

impl_timer!(TIMER0);
impl_timer!(TIMER1);
impl_timer!(TIMER2);

/// One `TIMER` peripheral, owning the Link Layer's `now()` source and its three arm channels.
///
/// Use [`BleTimer::channel`] to hand out the [`CompareChannel`]s that back a
/// [`TimerService`](ll_core::timer_service::TimerService); `BleTimer` itself implements
/// [`Timer`] directly so it can also be used as `Config::Timer`.
pub struct BleTimer<T: NrfTimerExt> {
    inner: T,
}

impl<T: NrfTimerExt> BleTimer<T> {
    /// Initializes the timer peripheral and readies it for use.
    pub fn init(mut peripheral: T) -> Self {
        peripheral.init();
        Self { inner: peripheral }
    }

    /// Hands out compare channel `n` (1, 2 or 3) as a [`CompareChannel`].
    ///
    /// # Panics
    ///
    /// Panics if `n` is not in `1..=3`.
    pub fn channel(&self, n: usize) -> Channel<T> {
        assert!((1..=3).contains(&n), "nRF TIMER channel out of range");
        Channel {
            inner: unsafe { self.inner.duplicate() },
            cc: n,
        }
    }

    /// Provides access to the raw peripheral. Use with caution.
    pub fn inner(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: NrfTimerExt> Timer for BleTimer<T> {
    fn now(&self) -> Instant {
        self.inner.now()
    }
}

/// A single arm channel of a [`BleTimer`], implementing [`CompareChannel`].
///
/// Reads of `now()` go through a duplicated peripheral handle and always capture CC[0], so they
/// never disturb this channel's own armed deadline in CC[`Channel::cc`].
pub struct Channel<T: NrfTimerExt> {
    inner: T,
    cc: usize,
}

impl<T: NrfTimerExt> CompareChannel for Channel<T> {
    fn now(&self) -> Instant {
        self.inner.now()
    }

    fn arm(&mut self, deadline: Instant) {
        self.inner.arm(self.cc, deadline);
    }

    fn disarm(&mut self) {
        self.inner.disarm(self.cc);
    }

    fn is_pending(&self) -> bool {
        self.inner.is_pending(self.cc)
    }

    fn clear_pending(&mut self) {
        self.inner.clear_pending(self.cc);
    }
}

/// Mirrors the Link Layer's own `Cmd::next_update` onto a single hardware compare channel.
///
/// This is deliberately simpler than routing the Link Layer's deadline through `TimerService`:
/// at any given time the Link Layer only ever wants one wakeup (the state machine's own fields
/// track which of `interval`/`singleShot`/`ifs` that wakeup corresponds to), so one dedicated
/// channel, reprogrammed on every `update_timer` call, is all `LinkLayer::next_event` scheduling
/// needs. The remaining two channels of a `BleTimer` stay free for platform-level uses (e.g. a
/// log heartbeat), fulfilling the Timer Service's "several independent logical timers" contract
/// without the Link Layer itself needing more than one at a time.
pub struct Scheduler<T: NrfTimerExt> {
    channel: Channel<T>,
    next: Instant,
    armed: bool,
}

impl<T: NrfTimerExt> Scheduler<T> {
    /// Creates a scheduler driving the Link Layer's deadline from `channel`.
    pub fn new(channel: Channel<T>) -> Self {
        Self {
            channel,
            next: Instant::from_raw_micros(0),
            armed: false,
        }
    }

    /// Reprograms the channel according to the `NextUpdate` returned by the Link Layer.
    pub fn configure(&mut self, next: NextUpdate) {
        match next {
            NextUpdate::Keep => {
                if !self.armed {
                    self.channel.arm(self.next);
                    self.armed = true;
                }
            }
            NextUpdate::Disable => {
                self.channel.disarm();
                self.armed = false;
            }
            NextUpdate::At(instant) => {
                self.next = instant;
                self.channel.arm(instant);
                self.armed = true;
            }
        }
    }

    /// Returns whether this channel's deadline has fired. The caller must check this before
    /// calling `LinkLayer::update_timer` from the interrupt handler, and acknowledge with
    /// [`Scheduler::clear`] afterwards.
    pub fn is_pending(&self) -> bool {
        self.channel.is_pending()
    }

    /// Acknowledges the fired deadline.
    pub fn clear(&mut self) {
        self.channel.clear_pending();
    }
}

/// A fixed, measured correction applied by [`ll_core::timer_service::TimerService`] to repeated
/// timers' deadlines, compensating for this MCU's interrupt-entry latency (§9's "DRIFT_FIX").
///
/// Re-measure this for any other target; it is not derived from first principles.
pub const DRIFT_FIX_MICROS: u32 = ll_core::timer_service::DRIFT_FIX;

#[allow(dead_code)]
fn assert_duration_fits(ticks: Duration) {
    debug_assert!(ticks.as_micros() < 1 << 24);
}

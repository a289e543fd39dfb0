//! Fixed-rate tick abstraction driving the periodic TX scheduler.
use core::future::Future;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Ticker;

/// Source of scheduler ticks. The period must equal the `tick_ms` the TX
/// managers were configured with.
pub trait TickSource {
    /// Wait for the next tick.
    fn next_tick<'a>(&'a mut self) -> impl Future<Output = ()> + 'a;
}

impl TickSource for Ticker {
    fn next_tick<'a>(&'a mut self) -> impl Future<Output = ()> + 'a {
        self.next()
    }
}

/// Signal raised by a hardware timer interrupt once per tick.
///
/// The interrupt handler only calls `signal(())`; all scheduling work runs in
/// the task awaiting [`SignalTicks`]. Ticks raised while the task is busy
/// coalesce into one, like a binary semaphore.
pub type TickSignal = Signal<CriticalSectionRawMutex, ()>;

/// [`TickSource`] fed by a [`TickSignal`].
pub struct SignalTicks<'s>(pub &'s TickSignal);

impl TickSource for SignalTicks<'_> {
    fn next_tick<'a>(&'a mut self) -> impl Future<Output = ()> + 'a {
        self.0.wait()
    }
}

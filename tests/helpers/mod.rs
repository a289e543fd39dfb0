/// Test doubles simulating the CAN controller and tick source during integration tests.
use core::future::Future;
use rp_can_manager::{CanController, CanFrame, Filter, FilterId, TickSignal, TickSource, TransmitError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum BusError {
    Offline,
    Closed,
}

impl embedded_can::Error for BusError {
    fn kind(&self) -> embedded_can::ErrorKind {
        embedded_can::ErrorKind::Other
    }
}

#[allow(dead_code)]
/// In-memory controller: every accepted frame lands on an unbounded channel,
/// the other end plays the bus (or loops back into an RX manager).
pub struct MockController {
    tx: mpsc::UnboundedSender<CanFrame>,
    offline: bool,
    busy: AtomicBool,
    started: AtomicUsize,
    filters: Mutex<Vec<Filter>>,
}

#[allow(dead_code)]
impl MockController {
    /// Controller plus the receiving end of its bus.
    pub fn create_pair() -> (Self, mpsc::UnboundedReceiver<CanFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            tx,
            offline: false,
            busy: AtomicBool::new(false),
            started: AtomicUsize::new(0),
            filters: Mutex::new(Vec::new()),
        };
        (controller, rx)
    }

    /// Controller whose `start` always fails.
    pub fn offline() -> Self {
        let (mut controller, _rx) = Self::create_pair();
        controller.offline = true;
        controller
    }

    /// While busy, `try_send` reports no free mailbox and `send` times out.
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    pub fn start_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn filters(&self) -> Vec<Filter> {
        self.filters.lock().unwrap().clone()
    }

    fn push(&self, frame: &CanFrame) -> Result<(), TransmitError<BusError>> {
        self.tx
            .send(*frame)
            .map_err(|_| TransmitError::Controller(BusError::Closed))
    }
}

impl CanController for MockController {
    type Error = BusError;

    fn start(&self) -> Result<(), BusError> {
        if self.offline {
            return Err(BusError::Offline);
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn add_rx_filter(&self, filter: &Filter) -> Result<FilterId, BusError> {
        let mut filters = self.filters.lock().unwrap();
        filters.push(*filter);
        Ok(filters.len() - 1)
    }

    fn try_send(&self, frame: &CanFrame) -> Result<(), TransmitError<BusError>> {
        if self.busy.load(Ordering::SeqCst) {
            return Err(TransmitError::Busy);
        }
        self.push(frame)
    }

    async fn send<'a>(
        &'a self,
        frame: &'a CanFrame,
        timeout: embassy_time::Duration,
    ) -> Result<(), TransmitError<BusError>> {
        if self.busy.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_micros(timeout.as_micros())).await;
            return Err(TransmitError::Timeout);
        }
        self.push(frame)
    }
}

#[allow(dead_code)]
/// Tick source yielding `remaining` ticks at once, then raising `done` and stalling.
pub struct CountedTicks<'s> {
    pub remaining: u32,
    pub done: &'s TickSignal,
}

impl TickSource for CountedTicks<'_> {
    fn next_tick<'a>(&'a mut self) -> impl Future<Output = ()> + 'a {
        async move {
            if self.remaining == 0 {
                self.done.signal(());
                core::future::pending::<()>().await;
            }
            self.remaining -= 1;
        }
    }
}

#[allow(dead_code)]
/// Plays the timer interrupt: raises `tick` `count` times, each time waiting
/// for the scheduler to consume it, then raises `stop`.
pub async fn pulse_ticks(tick: &TickSignal, stop: &TickSignal, count: u32) {
    for _ in 0..count {
        tick.signal(());
        while tick.signaled() {
            tokio::task::yield_now().await;
        }
    }
    stop.signal(());
}

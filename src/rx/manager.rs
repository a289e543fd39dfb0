//! RX manager: owns the controller's broad hardware filter and the frame
//! queue, and dispatches queued frames to software listeners.
use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;

use crate::error::ManagerError;
use crate::filter::Filter;
use crate::frame::CanFrame;
use crate::load::{BitCounters, LoadMeter};
use crate::rx::listener::{FrameHandler, Listener, ListenerId, ListenerTable};
use crate::traits::controller::{CanController, FilterId};

/// Default number of frames the worker handles before yielding.
pub const DEFAULT_BATCH_LIMIT: usize = 16;
/// Default drop growth between two drop warnings.
pub const DEFAULT_WARN_EVERY_N_DROPS: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Runtime tuning of an [`RxManager`].
pub struct RxConfig {
    /// Frames processed per wake-up before the worker yields to other tasks.
    /// `0` is treated as `1`.
    pub batch_limit: usize,
    /// Emit a warning each time the drop counter grew by this much since the
    /// last warning. `0` disables the warning.
    pub warn_every_n_drops: u32,
}

impl RxConfig {
    pub const DEFAULT: Self = Self {
        batch_limit: DEFAULT_BATCH_LIMIT,
        warn_every_n_drops: DEFAULT_WARN_EVERY_N_DROPS,
    };
}

impl Default for RxConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Counters snapshot returned by [`RxManager::stats`].
pub struct RxStats {
    /// Frames accepted into the queue.
    pub queued: u32,
    /// Frames lost because the queue was full.
    pub dropped: u32,
    /// Frames taken off the queue and run through the listener table.
    pub dispatched: u32,
    /// Listener slots currently in use.
    pub listeners: usize,
}

/// Receive dispatcher shared by every driver on one CAN bus.
///
/// * `QUEUE` – depth of the interrupt-to-worker frame queue.
/// * `LISTENERS` – capacity of the listener table.
///
/// Construct it in `static` storage, call [`init`](Self::init) once, spawn
/// [`run`](Self::run) in its own task and feed it from the CAN interrupt with
/// [`on_frame`](Self::on_frame).
pub struct RxManager<'a, const QUEUE: usize, const LISTENERS: usize> {
    config: RxConfig,
    ready: AtomicBool,
    hw_filter: Mutex<CriticalSectionRawMutex, Cell<Option<FilterId>>>,
    queue: Channel<CriticalSectionRawMutex, CanFrame, QUEUE>,
    listeners: Mutex<CriticalSectionRawMutex, RefCell<ListenerTable<'a, LISTENERS>>>,
    bits: BitCounters,
    load: Mutex<CriticalSectionRawMutex, Cell<LoadMeter>>,
    queued: AtomicU32,
    dropped: AtomicU32,
    dispatched: AtomicU32,
    last_reported_drops: AtomicU32,
}

impl<'a, const QUEUE: usize, const LISTENERS: usize> RxManager<'a, QUEUE, LISTENERS> {
    pub const fn new(config: RxConfig) -> Self {
        Self {
            config,
            ready: AtomicBool::new(false),
            hw_filter: Mutex::new(Cell::new(None)),
            queue: Channel::new(),
            listeners: Mutex::new(RefCell::new(ListenerTable::new())),
            bits: BitCounters::new(),
            load: Mutex::new(Cell::new(LoadMeter::new())),
            queued: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            dispatched: AtomicU32::new(0),
            last_reported_drops: AtomicU32::new(0),
        }
    }

    //==================================================================================LIFECYCLE
    /// Start the controller and install the single accept-all hardware filter.
    ///
    /// Fails with [`ManagerError::NotReady`] when the controller cannot start
    /// and with [`ManagerError::AlreadyExists`] on a second call.
    pub fn init<C: CanController>(&self, controller: &C) -> Result<FilterId, ManagerError> {
        if self.is_ready() {
            return Err(ManagerError::AlreadyExists);
        }

        controller.start().map_err(|_err| {
            #[cfg(feature = "defmt")]
            defmt::error!("can_rx_manager: controller failed to start");
            ManagerError::NotReady
        })?;

        let filter_id = controller
            .add_rx_filter(&Filter::accept_all())
            .map_err(ManagerError::controller)?;

        self.hw_filter.lock(|cell| cell.set(Some(filter_id)));
        self.ready.store(true, Ordering::Release);

        #[cfg(feature = "defmt")]
        defmt::info!("can_rx_manager: ready, hardware filter {}", filter_id);

        Ok(filter_id)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Handle of the broad hardware filter installed by [`init`](Self::init).
    pub fn hw_filter(&self) -> Option<FilterId> {
        self.hw_filter.lock(Cell::get)
    }

    pub fn config(&self) -> RxConfig {
        self.config
    }

    //==================================================================================LISTENERS
    /// Register `handler` for every frame accepted by `filter`.
    ///
    /// The listener lands in the first free slot; dispatch follows slot order.
    pub fn register(
        &self,
        filter: &Filter,
        handler: &'a dyn FrameHandler,
    ) -> Result<ListenerId, ManagerError> {
        if !self.is_ready() {
            return Err(ManagerError::InvalidArgument);
        }

        let listener = Listener {
            filter: *filter,
            handler,
        };
        let id = self
            .listeners
            .lock(|table| table.borrow_mut().insert(listener))
            .ok_or(ManagerError::ResourceExhausted)?;

        #[cfg(feature = "defmt")]
        defmt::info!(
            "can_rx_manager: registered listener id={} filter_id={=u32:#x} mask={=u32:#x}",
            id.0,
            filter.id,
            filter.mask
        );

        Ok(id)
    }

    /// Release a listener slot.
    ///
    /// May race with an ongoing dispatch: a frame already being handed to this
    /// listener may still reach it, later frames will not.
    pub fn unregister(&self, id: ListenerId) -> Result<(), ManagerError> {
        if !self.is_ready() || id.0 >= LISTENERS {
            return Err(ManagerError::InvalidArgument);
        }
        self.listeners
            .lock(|table| table.borrow_mut().remove(id))
            .map(|_| ())
            .ok_or(ManagerError::NotFound)
    }

    //==================================================================================ARRIVAL
    /// Accept a frame from the controller. Interrupt safe and never blocks.
    ///
    /// Remote frames are ignored entirely: neither dispatched nor counted for
    /// bus load. Every other frame has its bits counted, even when the queue
    /// is full and the frame is dropped and counted as a drop.
    pub fn on_frame(&self, frame: &CanFrame) {
        if frame.is_remote() {
            return;
        }

        match self.queue.try_send(*frame) {
            Ok(()) => {
                self.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.bits.record(frame);
    }

    //==================================================================================WORKER
    /// Worker loop. Spawn once per manager; never returns.
    ///
    /// Sleeps on the queue when empty. After each batch that hit
    /// [`RxConfig::batch_limit`] it yields so other tasks of the same priority
    /// get to run during a burst.
    pub async fn run(&self) -> ! {
        let limit = self.batch_limit();
        loop {
            if self.process_batch().await >= limit {
                embassy_futures::yield_now().await;
            }
        }
    }

    /// Wait for one frame, dispatch it, then keep draining without waiting
    /// until the queue is empty or the batch limit is reached. Returns the
    /// number of frames handled.
    pub async fn process_batch(&self) -> usize {
        let limit = self.batch_limit();
        let mut frame = self.queue.receive().await;
        let mut batch = 0;
        loop {
            self.dispatch(&frame);
            self.report_drops();

            batch += 1;
            if batch >= limit {
                return batch;
            }
            match self.queue.try_receive() {
                Ok(next) => frame = next,
                Err(_) => return batch,
            }
        }
    }

    /// Hand `frame` to every matching listener in slot order and return how
    /// many were called.
    ///
    /// Each slot is re-read under the lock right before use and the lock is
    /// released before the handler runs, so handlers may register or
    /// unregister listeners themselves.
    pub fn dispatch(&self, frame: &CanFrame) -> usize {
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for index in 0..LISTENERS {
            let Some(listener) = self.listeners.lock(|table| table.borrow().get(index)) else {
                continue;
            };
            if !listener.filter.matches(frame) {
                continue;
            }
            listener.handler.on_frame(frame);
            delivered += 1;
        }
        delivered
    }

    fn report_drops(&self) {
        let every = self.config.warn_every_n_drops;
        if every == 0 {
            return;
        }
        let drops = self.dropped.load(Ordering::Relaxed);
        let last = self.last_reported_drops.load(Ordering::Relaxed);
        if drops.wrapping_sub(last) >= every {
            #[cfg(feature = "defmt")]
            defmt::warn!("can_rx_manager: {} frames dropped (cumulative)", drops);
            self.last_reported_drops.store(drops, Ordering::Relaxed);
        }
    }

    fn batch_limit(&self) -> usize {
        self.config.batch_limit.max(1)
    }

    //==================================================================================STATS
    pub fn stats(&self) -> RxStats {
        RxStats {
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            listeners: self.listeners.lock(|table| table.borrow().used()),
        }
    }

    /// Drop count at the time of the last drop warning.
    pub fn last_reported_drops(&self) -> u32 {
        self.last_reported_drops.load(Ordering::Relaxed)
    }

    /// Bus load in percent since the previous call, using the embassy clock.
    ///
    /// See [`calculate_load_at`](Self::calculate_load_at).
    pub fn calculate_load(&self, nominal_bps: u32, data_bps: u32) -> Result<f32, ManagerError> {
        let now_ms = embassy_time::Instant::now().as_millis();
        self.calculate_load_at(now_ms, nominal_bps, data_bps)
    }

    /// Bus load in percent between the previous call and `now_ms`.
    ///
    /// `nominal_bps` is the arbitration bit rate and must not be zero;
    /// `data_bps` is the CAN-FD data-phase rate, `0` meaning "same as nominal".
    /// The first call returns `0.0` and only records a baseline.
    pub fn calculate_load_at(
        &self,
        now_ms: u64,
        nominal_bps: u32,
        data_bps: u32,
    ) -> Result<f32, ManagerError> {
        let bits = self.bits.snapshot();
        self.load.lock(|cell| {
            let mut meter = cell.get();
            let load = meter.update(now_ms, bits, nominal_bps, data_bps);
            cell.set(meter);
            load
        })
    }
}

//! TX manager: multiplexes many logical senders onto one outgoing frame per
//! transmit id, sent on demand or periodically from the scheduler tick.
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Duration;

use crate::error::ManagerError;
use crate::frame::{CanFrame, FrameFlags, CAN_MAX_DLC, CAN_MAX_DLEN};
use crate::traits::controller::CanController;
use crate::tx::registry::{interval_ticks, FillBuffer, FrameEntry, Sender, SenderId, TxTables};

/// Default scheduler tick period.
pub const DEFAULT_TICK_MS: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxConfig {
    /// Period of the tick driving [`TxManager::tick`], in milliseconds.
    pub tick_ms: u32,
}

impl TxConfig {
    pub const DEFAULT: Self = Self {
        tick_ms: DEFAULT_TICK_MS,
    };

    /// Highest periodic rate the tick can serve.
    pub fn max_frequency(&self) -> u32 {
        1000 / self.tick_ms.max(1)
    }
}

impl Default for TxConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Counters snapshot returned by [`TxManager::stats`].
pub struct TxStats {
    /// Periodic frames accepted by the controller.
    pub periodic_sent: u32,
    /// Periodic frames the controller refused (mailboxes full or error).
    pub periodic_failed: u32,
    /// Transmissions cancelled because a fill handler failed.
    pub fill_failed: u32,
    /// Sender slots in use.
    pub senders: usize,
    /// Frame registry entries in use.
    pub frames: usize,
}

/// Transmit multiplexer for one CAN controller.
///
/// * `SENDERS` – capacity of the sender table.
/// * `FRAMES` – capacity of the frame registry (distinct transmit ids).
///
/// Event-driven frames go out through [`send`](Self::send). Periodic frames
/// go out from [`tick`](Self::tick), normally called by a
/// [`TxScheduler`](crate::tx::TxScheduler).
pub struct TxManager<'a, C: CanController, const SENDERS: usize, const FRAMES: usize> {
    controller: C,
    config: TxConfig,
    tables: Mutex<CriticalSectionRawMutex, TxTables<'a, SENDERS, FRAMES>>,
    periodic_sent: AtomicU32,
    periodic_failed: AtomicU32,
    fill_failed: AtomicU32,
}

impl<'a, C: CanController, const SENDERS: usize, const FRAMES: usize>
    TxManager<'a, C, SENDERS, FRAMES>
{
    pub const fn new(controller: C, config: TxConfig) -> Self {
        Self {
            controller,
            config,
            tables: Mutex::new(TxTables::new()),
            periodic_sent: AtomicU32::new(0),
            periodic_failed: AtomicU32::new(0),
            fill_failed: AtomicU32::new(0),
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn config(&self) -> TxConfig {
        self.config
    }

    //==================================================================================SENDERS
    /// Register a sender contributing to the frame `tx_id`.
    ///
    /// The first sender of a transmit id creates its registry entry from
    /// `dlc`, `flags` and `frequency_hz`; later senders join that entry and
    /// must ask for the same frequency. `rx_id` identifies the sender on
    /// [`unregister`](Self::unregister). Capacity is checked before anything
    /// is stored, so a failed call leaves both tables untouched.
    pub async fn register(
        &self,
        tx_id: u32,
        rx_id: u32,
        dlc: u8,
        flags: FrameFlags,
        frequency_hz: u16,
        fill: &'a dyn FillBuffer,
    ) -> Result<SenderId, ManagerError> {
        if dlc > CAN_MAX_DLC
            || (!flags.contains(FrameFlags::FD) && dlc as usize > CAN_MAX_DLEN)
            || frequency_hz as u32 > self.config.max_frequency()
        {
            return Err(ManagerError::InvalidArgument);
        }

        let mut tables = self.tables.lock().await;

        let existing = tables.frame_index(tx_id);
        if let Some(index) = existing {
            let entry = tables.entry(index).ok_or(ManagerError::Fault)?;
            if entry.frequency_hz != frequency_hz {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "can_tx_manager: tx_id {=u32:#x} already runs at {} Hz, refused {} Hz",
                    tx_id,
                    entry.frequency_hz,
                    frequency_hz
                );
                return Err(ManagerError::InvalidArgument);
            }
        }

        let slot = tables
            .free_sender_slot()
            .ok_or(ManagerError::ResourceExhausted)?;
        if existing.is_none() {
            if tables.registry_full() {
                return Err(ManagerError::ResourceExhausted);
            }
            tables.push_frame(FrameEntry {
                frame: CanFrame::template(tx_id, flags, dlc),
                frequency_hz,
                interval_ticks: interval_ticks(frequency_hz, self.config.tick_ms),
                tick_counter: 0,
            })?;

            #[cfg(feature = "defmt")]
            defmt::info!(
                "can_tx_manager: frame {=u32:#x} registered at {} Hz",
                tx_id,
                frequency_hz
            );
        }

        tables.set_sender(slot, Sender { tx_id, rx_id, fill });
        Ok(SenderId(slot))
    }

    /// Remove the sender registered for (`tx_id`, `rx_id`). The registry entry
    /// goes away with the last sender of its transmit id.
    pub async fn unregister(&self, tx_id: u32, rx_id: u32) -> Result<(), ManagerError> {
        let mut tables = self.tables.lock().await;
        tables
            .remove_sender(tx_id, rx_id)
            .ok_or(ManagerError::NotFound)?;

        if !tables.has_sender(tx_id) {
            if let Some(index) = tables.frame_index(tx_id) {
                tables.remove_frame(index);

                #[cfg(feature = "defmt")]
                defmt::info!("can_tx_manager: frame {=u32:#x} removed", tx_id);
            }
        }
        Ok(())
    }

    //==================================================================================SEND
    /// Fill and transmit the frame `tx_id` now.
    ///
    /// All fill handlers of the frame run under the table lock; the lock is
    /// released before waiting on the controller, for at most `timeout`.
    pub async fn send(&self, tx_id: u32, timeout: Duration) -> Result<(), ManagerError> {
        let frame = {
            let mut tables = self.tables.lock().await;
            if tables.frame_count() == 0 {
                return Err(ManagerError::InvalidArgument);
            }
            let index = tables.frame_index(tx_id).ok_or(ManagerError::NotFound)?;
            tables.fill(index).inspect_err(|_err| {
                self.fill_failed.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "defmt")]
                defmt::warn!("can_tx_manager: fill failed for {=u32:#x}: {}", tx_id, _err);
            })?
        };

        self.controller.send(&frame, timeout).await?;
        Ok(())
    }

    //==================================================================================PERIODIC
    /// Advance every periodic frame by one tick and queue those whose interval
    /// elapsed. Sends never wait: a full controller costs that cycle only.
    pub async fn tick(&self) {
        let mut tables = self.tables.lock().await;
        for index in 0..tables.frame_count() {
            if !tables.advance(index) {
                continue;
            }

            let frame = match tables.fill(index) {
                Ok(frame) => frame,
                Err(_err) => {
                    self.fill_failed.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "defmt")]
                    defmt::warn!("can_tx_manager: periodic fill failed: {}", _err);
                    continue;
                }
            };

            match self.controller.try_send(&frame) {
                Ok(()) => {
                    self.periodic_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(_err) => {
                    self.periodic_failed.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "defmt")]
                    defmt::warn!("can_tx_manager: periodic send of {=u32:#x} failed", frame.id);
                }
            }
        }
    }

    //==================================================================================STATS
    pub async fn stats(&self) -> TxStats {
        let tables = self.tables.lock().await;
        TxStats {
            periodic_sent: self.periodic_sent.load(Ordering::Relaxed),
            periodic_failed: self.periodic_failed.load(Ordering::Relaxed),
            fill_failed: self.fill_failed.load(Ordering::Relaxed),
            senders: tables.senders_used(),
            frames: tables.frame_count(),
        }
    }

    /// Copy of the registry entry for `tx_id`.
    pub async fn frame_entry(&self, tx_id: u32) -> Option<FrameEntry> {
        let tables = self.tables.lock().await;
        let index = tables.frame_index(tx_id)?;
        tables.entry(index).copied()
    }
}

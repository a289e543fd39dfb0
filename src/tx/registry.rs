//! Sender table and frame registry held by a [`TxManager`](super::TxManager).
//!
//! Senders are stored in a sparse slot array; the frame registry is dense
//! (`frames[..frame_count]`) and keyed by unique transmit id.
use crate::error::ManagerError;
use crate::frame::CanFrame;

/// Writes a sender's share of an outgoing frame.
///
/// Every sender registered on the same transmit id is called in slot order
/// on the same frame before it goes out, so each one only touches its own
/// bytes. Returning an error cancels that transmission.
///
/// Fill handlers run with the TX tables locked and must not call back into
/// the manager that owns them.
pub trait FillBuffer: Sync {
    fn fill(&self, frame: &mut CanFrame) -> Result<(), ManagerError>;
}

impl<F> FillBuffer for F
where
    F: Fn(&mut CanFrame) -> Result<(), ManagerError> + Sync,
{
    fn fill(&self, frame: &mut CanFrame) -> Result<(), ManagerError> {
        self(frame)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Slot index of a registered sender.
pub struct SenderId(pub usize);

/// A used slot of the sender table.
#[derive(Clone, Copy)]
pub(crate) struct Sender<'a> {
    pub(crate) tx_id: u32,
    /// Identifier the sender's device answers on. Together with `tx_id` it
    /// names the registration on unregister.
    pub(crate) rx_id: u32,
    pub(crate) fill: &'a dyn FillBuffer,
}

//==================================================================================FRAME_ENTRY
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// One outgoing frame of the registry.
pub struct FrameEntry {
    /// Template the fill handlers write into. Keeps the last sent content.
    pub frame: CanFrame,
    /// Periodic rate; `0` means event driven only.
    pub frequency_hz: u16,
    /// Ticks between two periodic sends.
    pub interval_ticks: u32,
    /// Ticks elapsed since the last periodic send.
    pub tick_counter: u32,
}

impl FrameEntry {
    pub const EMPTY: Self = Self {
        frame: CanFrame::EMPTY,
        frequency_hz: 0,
        interval_ticks: 0,
        tick_counter: 0,
    };

    pub fn is_periodic(&self) -> bool {
        self.frequency_hz > 0
    }
}

/// Ticks between two sends at `frequency_hz` with a `tick_ms` period,
/// rounded up and never zero for a periodic frame. `0` for event-driven frames.
pub fn interval_ticks(frequency_hz: u16, tick_ms: u32) -> u32 {
    if frequency_hz == 0 {
        return 0;
    }
    let ticks_per_period = (frequency_hz as u32).saturating_mul(tick_ms.max(1));
    1000u32.div_ceil(ticks_per_period).max(1)
}

//==================================================================================TABLES
pub(crate) struct TxTables<'a, const SENDERS: usize, const FRAMES: usize> {
    senders: [Option<Sender<'a>>; SENDERS],
    frames: [FrameEntry; FRAMES],
    frame_count: usize,
}

impl<'a, const SENDERS: usize, const FRAMES: usize> TxTables<'a, SENDERS, FRAMES> {
    pub(crate) const fn new() -> Self {
        Self {
            senders: [None; SENDERS],
            frames: [FrameEntry::EMPTY; FRAMES],
            frame_count: 0,
        }
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub(crate) fn senders_used(&self) -> usize {
        self.senders.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn frame_index(&self, tx_id: u32) -> Option<usize> {
        self.frames[..self.frame_count]
            .iter()
            .position(|entry| entry.frame.id == tx_id)
    }

    pub(crate) fn entry(&self, index: usize) -> Option<&FrameEntry> {
        self.frames[..self.frame_count].get(index)
    }

    pub(crate) fn free_sender_slot(&self) -> Option<usize> {
        self.senders.iter().position(Option::is_none)
    }

    pub(crate) fn registry_full(&self) -> bool {
        self.frame_count >= FRAMES
    }

    /// Append a registry entry. Capacity must have been checked.
    pub(crate) fn push_frame(&mut self, entry: FrameEntry) -> Result<usize, ManagerError> {
        let index = self.frame_count;
        let slot = self
            .frames
            .get_mut(index)
            .ok_or(ManagerError::ResourceExhausted)?;
        *slot = entry;
        self.frame_count += 1;
        Ok(index)
    }

    /// Remove a registry entry and shift the tail down to keep it dense.
    pub(crate) fn remove_frame(&mut self, index: usize) {
        if index >= self.frame_count {
            return;
        }
        self.frames.copy_within(index + 1..self.frame_count, index);
        self.frame_count -= 1;
        self.frames[self.frame_count] = FrameEntry::EMPTY;
    }

    pub(crate) fn set_sender(&mut self, slot: usize, sender: Sender<'a>) {
        self.senders[slot] = Some(sender);
    }

    /// Free the first slot registered for (`tx_id`, `rx_id`).
    pub(crate) fn remove_sender(&mut self, tx_id: u32, rx_id: u32) -> Option<SenderId> {
        let slot = self.senders.iter().position(|slot| {
            matches!(slot, Some(sender) if sender.tx_id == tx_id && sender.rx_id == rx_id)
        })?;
        self.senders[slot] = None;
        Some(SenderId(slot))
    }

    pub(crate) fn has_sender(&self, tx_id: u32) -> bool {
        self.senders
            .iter()
            .flatten()
            .any(|sender| sender.tx_id == tx_id)
    }

    /// Count one tick for a periodic entry. `true` when its interval elapsed,
    /// in which case the counter restarts from zero.
    pub(crate) fn advance(&mut self, index: usize) -> bool {
        let Some(entry) = self.frames[..self.frame_count].get_mut(index) else {
            return false;
        };
        if !entry.is_periodic() {
            return false;
        }
        entry.tick_counter += 1;
        if entry.tick_counter < entry.interval_ticks {
            return false;
        }
        entry.tick_counter = 0;
        true
    }

    /// Run every fill handler of the entry at `index` in slot order.
    ///
    /// Handlers work on a copy of the template; the template is only updated
    /// when all of them succeed, so a failed fill never leaks a half-written
    /// frame into a later send. Fails with [`ManagerError::InvalidArgument`]
    /// when no sender is registered for the entry.
    pub(crate) fn fill(&mut self, index: usize) -> Result<CanFrame, ManagerError> {
        let entry = self.frames[..self.frame_count]
            .get_mut(index)
            .ok_or(ManagerError::NotFound)?;
        let mut scratch = entry.frame;

        let mut filled = 0;
        for sender in self.senders.iter().flatten() {
            if sender.tx_id != scratch.id {
                continue;
            }
            sender.fill.fill(&mut scratch)?;
            filled += 1;
        }
        if filled == 0 {
            return Err(ManagerError::InvalidArgument);
        }

        entry.frame = scratch;
        Ok(scratch)
    }
}

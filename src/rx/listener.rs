//! Listener registrations held by an [`RxManager`](super::RxManager).
use crate::filter::Filter;
use crate::frame::CanFrame;

/// Receives the frames accepted by a listener filter.
///
/// Called from the RX worker task, never from interrupt context. The
/// implementor carries whatever state the consumer needs (the user context of
/// a C-style callback). Keep handlers short: the worker serves every listener
/// of the manager in turn.
pub trait FrameHandler: Sync {
    fn on_frame(&self, frame: &CanFrame);
}

impl<F> FrameHandler for F
where
    F: Fn(&CanFrame) + Sync,
{
    fn on_frame(&self, frame: &CanFrame) {
        self(frame)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Slot index of a registered listener.
///
/// Stable while the registration lives; the slot is handed to the next
/// registration once unregistered.
pub struct ListenerId(pub usize);

impl ListenerId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A used slot of the listener table.
#[derive(Clone, Copy)]
pub(crate) struct Listener<'a> {
    pub(crate) filter: Filter,
    pub(crate) handler: &'a dyn FrameHandler,
}

/// Fixed-capacity listener table. `None` marks a free slot.
pub(crate) struct ListenerTable<'a, const N: usize> {
    slots: [Option<Listener<'a>>; N],
}

impl<'a, const N: usize> ListenerTable<'a, N> {
    pub(crate) const fn new() -> Self {
        Self { slots: [None; N] }
    }

    /// Store a listener in the first free slot.
    pub(crate) fn insert(&mut self, listener: Listener<'a>) -> Option<ListenerId> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(listener);
        Some(ListenerId(index))
    }

    /// Free the slot; `None` when it was not in use.
    pub(crate) fn remove(&mut self, id: ListenerId) -> Option<Listener<'a>> {
        self.slots.get_mut(id.0)?.take()
    }

    pub(crate) fn get(&self, index: usize) -> Option<Listener<'a>> {
        self.slots.get(index).copied().flatten()
    }

    pub(crate) fn used(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

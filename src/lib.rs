//! `rp-can-manager` library: shared CAN bus access for the drivers of a
//! robot controller in a `no_std` environment. One RX manager demultiplexes
//! received frames to software listeners; one TX manager per controller
//! multiplexes many senders onto a single frame per transmit id, sent on
//! demand or periodically from a tick-driven scheduler.
#![no_std]

#[cfg(test)]
extern crate std;

//==================================================================================
/// Manager error taxonomy and controller transmit errors.
pub mod error;
/// Software acceptance filters.
pub mod filter;
/// Classic CAN / CAN-FD frame representation and DLC helpers.
pub mod frame;
/// Bus-load bit accounting and load percentage computation.
pub mod load;
/// Receive dispatcher: frame queue, listener table and worker.
pub mod rx;
/// Collaborator traits: CAN controller and tick source.
pub mod traits;
/// Transmit manager: sender table, frame registry and periodic scheduler.
pub mod tx;
//==================================================================================

pub use error::{ManagerError, TransmitError};
pub use filter::Filter;
pub use frame::{CanFrame, FrameFlags};
pub use rx::{FrameHandler, ListenerId, RxConfig, RxManager, RxStats};
pub use traits::controller::{CanController, FilterId};
pub use traits::tick_source::{SignalTicks, TickSignal, TickSource};
pub use tx::{
    FillBuffer, FrameEntry, PeriodicTick, SenderId, TxConfig, TxManager, TxScheduler, TxStats,
};

//! Transmit side: a sender table and a dense frame registry per manager, an
//! event send path and a tick-driven periodic scheduler.
//!
//! ```text
//! send(tx_id) ───────┐
//!                    ├──▶ frame registry[tx_id] ──fill()×senders──▶ controller
//! TickSource ─tick()─┘        (interval / tick counter)
//! ```
pub mod manager;
pub mod registry;
pub mod scheduler;

pub use manager::{TxConfig, TxManager, TxStats};
pub use registry::{FillBuffer, FrameEntry, SenderId};
pub use scheduler::{PeriodicTick, TxScheduler};

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

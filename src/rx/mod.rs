//! Receive side: one bounded frame queue fed from interrupt context and a
//! worker that demultiplexes each frame to the software listeners whose
//! filter matches.
//!
//! ```text
//! CAN interrupt ──on_frame()──▶ Channel<CanFrame, QUEUE> ──run()──▶ listeners[0..N]
//!       │                             (drop on full)                 (slot order)
//!       └── bus-load bit counters
//! ```
pub mod listener;
pub mod manager;

pub use listener::{FrameHandler, ListenerId};
pub use manager::{RxConfig, RxManager, RxStats};

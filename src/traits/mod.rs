//! Abstraction traits at the manager boundary: the CAN controller the
//! managers drive and the tick source pacing the periodic TX scheduler.
pub mod controller;
pub mod tick_source;

#[cfg(test)]
pub(crate) mod mock;

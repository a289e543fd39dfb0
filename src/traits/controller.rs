//! Minimal abstraction over a CAN controller driver. The managers depend only
//! on this trait, so they plug into any HAL (bxCAN, FDCAN, TWAI, SocketCAN...).
use crate::error::TransmitError;
use crate::filter::Filter;
use crate::frame::CanFrame;
use core::future::Future;
use embassy_time::Duration;

/// Handle of a hardware acceptance filter returned by the controller.
pub type FilterId = usize;

/// Contract a CAN controller driver fulfils for the managers.
///
/// Methods take `&self`: one controller is shared by an RX manager, a TX
/// manager and the periodic scheduler, so implementations use interior
/// mutability (or forward to a HAL that does).
///
/// Received frames are not pulled through this trait. The HAL interrupt
/// handler, or a task draining the HAL RX FIFO, pushes each frame into
/// [`RxManager::on_frame`](crate::rx::RxManager::on_frame).
pub trait CanController {
    type Error: embedded_can::Error;

    /// Bring the controller into operational mode. Starting an already running
    /// controller succeeds.
    fn start(&self) -> Result<(), Self::Error>;

    /// Install a hardware acceptance filter and return its handle.
    fn add_rx_filter(&self, filter: &Filter) -> Result<FilterId, Self::Error>;

    /// Queue a frame without waiting. Returns [`TransmitError::Busy`] when no
    /// mailbox is free.
    fn try_send(&self, frame: &CanFrame) -> Result<(), TransmitError<Self::Error>>;

    /// Queue a frame, waiting at most `timeout` for a free mailbox. Resolves
    /// once the controller has accepted or completed the transmission.
    fn send<'a>(
        &'a self,
        frame: &'a CanFrame,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransmitError<Self::Error>>> + 'a;
}

impl<T: CanController> CanController for &T {
    type Error = T::Error;

    fn start(&self) -> Result<(), Self::Error> {
        (**self).start()
    }

    fn add_rx_filter(&self, filter: &Filter) -> Result<FilterId, Self::Error> {
        (**self).add_rx_filter(filter)
    }

    fn try_send(&self, frame: &CanFrame) -> Result<(), TransmitError<Self::Error>> {
        (**self).try_send(frame)
    }

    fn send<'a>(
        &'a self,
        frame: &'a CanFrame,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransmitError<Self::Error>>> + 'a {
        (**self).send(frame, timeout)
    }
}

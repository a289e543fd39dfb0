//! In-memory controller for unit tests.
use crate::error::TransmitError;
use crate::filter::Filter;
use crate::frame::CanFrame;
use crate::traits::controller::{CanController, FilterId};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use embassy_time::Duration;
use std::sync::Mutex;
use std::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MockError;

impl embedded_can::Error for MockError {
    fn kind(&self) -> embedded_can::ErrorKind {
        embedded_can::ErrorKind::Other
    }
}

/// Records every accepted frame. `busy` makes both send paths fail.
pub(crate) struct MockController {
    fail_start: bool,
    busy: AtomicBool,
    filters: AtomicUsize,
    sent: Mutex<Vec<CanFrame>>,
}

impl MockController {
    pub(crate) const fn new() -> Self {
        Self {
            fail_start: false,
            busy: AtomicBool::new(false),
            filters: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<CanFrame> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn accept(&self, frame: &CanFrame) -> bool {
        if self.busy.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(*frame);
        true
    }
}

impl CanController for MockController {
    type Error = MockError;

    fn start(&self) -> Result<(), MockError> {
        if self.fail_start {
            Err(MockError)
        } else {
            Ok(())
        }
    }

    fn add_rx_filter(&self, _filter: &Filter) -> Result<FilterId, MockError> {
        Ok(self.filters.fetch_add(1, Ordering::SeqCst))
    }

    fn try_send(&self, frame: &CanFrame) -> Result<(), TransmitError<MockError>> {
        if self.accept(frame) {
            Ok(())
        } else {
            Err(TransmitError::Busy)
        }
    }

    async fn send<'a>(
        &'a self,
        frame: &'a CanFrame,
        _timeout: Duration,
    ) -> Result<(), TransmitError<MockError>> {
        if self.accept(frame) {
            Ok(())
        } else {
            Err(TransmitError::Timeout)
        }
    }
}

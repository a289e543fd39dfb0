//! Error definitions shared by the RX and TX managers.
//! Registration, unregistration and send calls report failures synchronously
//! through [`ManagerError`]; controller implementations report transmit
//! failures through [`TransmitError`].
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Failures surfaced by the manager APIs.
pub enum ManagerError {
    /// Malformed input, numeric range violation, or a manager that was never initialised.
    #[error("Invalid argument")]
    InvalidArgument,
    /// A collaborator (CAN controller) is not ready to serve the manager.
    #[error("Device not ready")]
    NotReady,
    /// The listener table, sender table or frame registry has no free slot.
    #[error("No free slot left")]
    ResourceExhausted,
    /// Lookup miss on unregister or send.
    #[error("Entry not found")]
    NotFound,
    /// The operation was already performed (e.g. second `init`).
    #[error("Already done")]
    AlreadyExists,
    /// Internal invariant violation.
    #[error("Internal fault")]
    Fault,
    /// The controller did not accept the frame before the deadline.
    #[error("Transmit timed out")]
    Timeout,
    /// Error reported by the CAN controller.
    #[error("CAN controller error: {0:?}")]
    Controller(embedded_can::ErrorKind),
}

impl ManagerError {
    /// Fold any controller error into its portable [`embedded_can::ErrorKind`].
    pub fn controller<E: embedded_can::Error>(err: E) -> Self {
        Self::Controller(err.kind())
    }
}

// `embedded_can::ErrorKind` has no `defmt::Format`; its `Debug` output is
// forwarded instead.
#[cfg(feature = "defmt")]
impl defmt::Format for ManagerError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::InvalidArgument => defmt::write!(f, "InvalidArgument"),
            Self::NotReady => defmt::write!(f, "NotReady"),
            Self::ResourceExhausted => defmt::write!(f, "ResourceExhausted"),
            Self::NotFound => defmt::write!(f, "NotFound"),
            Self::AlreadyExists => defmt::write!(f, "AlreadyExists"),
            Self::Fault => defmt::write!(f, "Fault"),
            Self::Timeout => defmt::write!(f, "Timeout"),
            Self::Controller(kind) => {
                defmt::write!(f, "Controller({})", defmt::Debug2Format(kind))
            }
        }
    }
}

// Every error type reaching a `defmt` log site must implement `Format`.
#[cfg(feature = "defmt")]
const _: () = {
    const fn assert_format<T: defmt::Format>() {}
    assert_format::<ManagerError>();
};

//==================================================================================TRANSMIT_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors returned by [`CanController`](crate::traits::controller::CanController) transmit paths.
pub enum TransmitError<E: core::fmt::Debug> {
    /// No transmit mailbox was free (non-blocking path only).
    #[error("TX mailbox full")]
    Busy,
    /// No transmit mailbox became free before the timeout elapsed.
    #[error("Transmit timed out")]
    Timeout,
    /// The controller refused or failed the transmission.
    #[error("CAN controller error: {0:?}")]
    Controller(E),
}

impl<E: embedded_can::Error> From<TransmitError<E>> for ManagerError {
    fn from(err: TransmitError<E>) -> Self {
        match err {
            TransmitError::Busy => ManagerError::ResourceExhausted,
            TransmitError::Timeout => ManagerError::Timeout,
            TransmitError::Controller(e) => ManagerError::controller(e),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

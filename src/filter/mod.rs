//! Software acceptance filters used by the RX dispatcher.
//!
//! The manager installs a single accept-all hardware filter and performs all
//! fine-grained matching here, so any number of listeners can share one
//! controller without exhausting hardware filter banks.
use crate::frame::{CanFrame, CAN_EXT_ID_MASK, CAN_STD_ID_MASK};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Identifier/mask pair selecting the frames a listener wants.
pub struct Filter {
    pub id: u32,
    /// Bits set here must agree between the frame and the filter identifier.
    pub mask: u32,
    /// Match extended (29-bit) frames instead of standard (11-bit) ones.
    pub extended: bool,
}

impl Filter {
    /// Filter on standard identifiers.
    pub const fn standard(id: u32, mask: u32) -> Self {
        Self {
            id,
            mask,
            extended: false,
        }
    }

    /// Filter on extended identifiers.
    pub const fn extended(id: u32, mask: u32) -> Self {
        Self {
            id,
            mask,
            extended: true,
        }
    }

    /// Exact match on a single standard identifier.
    pub const fn exact_standard(id: u32) -> Self {
        Self::standard(id, CAN_STD_ID_MASK)
    }

    /// Broad filter handed to the controller: id 0, mask 0.
    pub const fn accept_all() -> Self {
        Self::standard(0, 0)
    }

    /// `true` when `frame` passes this filter.
    ///
    /// Frames and filters of different identifier widths never match. Both
    /// identifiers are masked to their width before the mask comparison.
    pub fn matches(&self, frame: &CanFrame) -> bool {
        if frame.is_extended() != self.extended {
            return false;
        }
        let width = if self.extended {
            CAN_EXT_ID_MASK
        } else {
            CAN_STD_ID_MASK
        };
        let frame_id = frame.id & width;
        let filter_id = self.id & width;
        frame_id & self.mask == filter_id & self.mask
    }
}

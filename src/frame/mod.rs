//! In-memory representation of a classic CAN or CAN-FD frame, shared by the
//! RX dispatcher, the TX frame registry and controller implementations.
use embedded_can::{ExtendedId, Id, StandardId};

/// Mask selecting the 11 bits of a standard identifier.
pub const CAN_STD_ID_MASK: u32 = 0x7FF;
/// Mask selecting the 29 bits of an extended identifier.
pub const CAN_EXT_ID_MASK: u32 = 0x1FFF_FFFF;
/// Largest payload of a classic CAN frame.
pub const CAN_MAX_DLEN: usize = 8;
/// Largest payload of a CAN-FD frame.
pub const CANFD_MAX_DLEN: usize = 64;
/// Largest valid data length code.
pub const CAN_MAX_DLC: u8 = 15;

/// Payload length in bytes for each data length code.
pub const DLC_TO_LEN: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Payload length for `dlc`. Out-of-range codes yield 0.
pub fn dlc_to_len(dlc: u8) -> usize {
    DLC_TO_LEN.get(dlc as usize).copied().unwrap_or(0) as usize
}

/// Smallest data length code whose payload holds `len` bytes.
pub fn len_to_dlc(len: usize) -> Option<u8> {
    DLC_TO_LEN
        .iter()
        .position(|&l| l as usize >= len)
        .map(|dlc| dlc as u8)
}

//==================================================================================FRAME_FLAGS
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Frame format bits (extended identifier, remote request, FD format, bit-rate switch).
pub struct FrameFlags(pub u8);

impl FrameFlags {
    /// Standard 11-bit classic data frame.
    pub const NONE: Self = Self(0);
    /// 29-bit identifier (IDE).
    pub const EXTENDED: Self = Self(1 << 0);
    /// Remote transmission request.
    pub const REMOTE: Self = Self(1 << 1);
    /// CAN-FD format (FDF).
    pub const FD: Self = Self(1 << 2);
    /// CAN-FD bit-rate switch for the data phase.
    pub const BRS: Self = Self(1 << 3);

    /// `true` when every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl core::ops::BitOr for FrameFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

//==================================================================================CAN_FRAME
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw frame as seen on the bus.
pub struct CanFrame {
    /// Arbitration identifier, 11 or 29 significant bits depending on `flags`.
    pub id: u32,
    pub flags: FrameFlags,
    /// Data length code (0 to 15). See [`DLC_TO_LEN`].
    pub dlc: u8,
    /// Payload buffer. Only the first [`CanFrame::len`] bytes are meaningful.
    pub data: [u8; CANFD_MAX_DLEN],
}

impl Default for CanFrame {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl CanFrame {
    /// Standard data frame with id 0 and no payload.
    pub const EMPTY: Self = Self::template(0, FrameFlags::NONE, 0);

    /// Zero-filled frame with the given header, used as a TX template.
    pub const fn template(id: u32, flags: FrameFlags, dlc: u8) -> Self {
        Self {
            id,
            flags,
            dlc,
            data: [0; CANFD_MAX_DLEN],
        }
    }

    /// Classic data frame with a standard identifier.
    pub fn new_standard(id: u16, payload: &[u8]) -> Option<Self> {
        Self::with_payload(id as u32 & CAN_STD_ID_MASK, FrameFlags::NONE, payload)
    }

    /// Classic data frame with an extended identifier.
    pub fn new_extended(id: u32, payload: &[u8]) -> Option<Self> {
        Self::with_payload(id & CAN_EXT_ID_MASK, FrameFlags::EXTENDED, payload)
    }

    /// CAN-FD frame; `payload` is padded up to the next valid length.
    pub fn new_fd(id: u32, extended: bool, brs: bool, payload: &[u8]) -> Option<Self> {
        let mut flags = FrameFlags::FD;
        if extended {
            flags = flags | FrameFlags::EXTENDED;
        }
        if brs {
            flags = flags | FrameFlags::BRS;
        }
        let mask = if extended {
            CAN_EXT_ID_MASK
        } else {
            CAN_STD_ID_MASK
        };
        Self::with_payload(id & mask, flags, payload)
    }

    fn with_payload(id: u32, flags: FrameFlags, payload: &[u8]) -> Option<Self> {
        let max = if flags.contains(FrameFlags::FD) {
            CANFD_MAX_DLEN
        } else {
            CAN_MAX_DLEN
        };
        if payload.len() > max {
            return None;
        }
        let dlc = len_to_dlc(payload.len())?;
        let mut frame = Self::template(id, flags, dlc);
        frame.data[..payload.len()].copy_from_slice(payload);
        Some(frame)
    }

    pub fn is_extended(&self) -> bool {
        self.flags.contains(FrameFlags::EXTENDED)
    }

    pub fn is_remote(&self) -> bool {
        self.flags.contains(FrameFlags::REMOTE)
    }

    pub fn is_fd(&self) -> bool {
        self.flags.contains(FrameFlags::FD)
    }

    pub fn is_brs(&self) -> bool {
        self.flags.contains(FrameFlags::BRS)
    }

    /// Identifier masked to the width selected by the extended flag.
    pub fn raw_id(&self) -> u32 {
        if self.is_extended() {
            self.id & CAN_EXT_ID_MASK
        } else {
            self.id & CAN_STD_ID_MASK
        }
    }

    /// Payload length in bytes decoded from the DLC.
    pub fn len(&self) -> usize {
        dlc_to_len(self.dlc)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Meaningful payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Mutable view over the meaningful payload bytes.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.data[..len]
    }
}

//==================================================================================EMBEDDED_CAN
impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Standard(id) => Self::new_standard(id.as_raw(), data),
            Id::Extended(id) => Self::new_extended(id.as_raw(), data),
        }
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > CAN_MAX_DLEN {
            return None;
        }
        let (raw, flags) = match id.into() {
            Id::Standard(id) => (id.as_raw() as u32, FrameFlags::REMOTE),
            Id::Extended(id) => (id.as_raw(), FrameFlags::REMOTE | FrameFlags::EXTENDED),
        };
        Some(Self::template(raw, flags, dlc as u8))
    }

    fn is_extended(&self) -> bool {
        CanFrame::is_extended(self)
    }

    fn is_remote_frame(&self) -> bool {
        self.is_remote()
    }

    fn id(&self) -> Id {
        if CanFrame::is_extended(self) {
            Id::Extended(ExtendedId::new(self.raw_id()).unwrap_or(ExtendedId::ZERO))
        } else {
            Id::Standard(StandardId::new(self.raw_id() as u16).unwrap_or(StandardId::ZERO))
        }
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        if self.is_remote() {
            &[]
        } else {
            self.payload()
        }
    }
}

//! Bus-load estimation from received traffic.
//!
//! Every received frame is converted into an estimate of the bits it occupied
//! on the wire, split between the nominal (arbitration) bit rate and the
//! CAN-FD data-phase bit rate. The cumulative counters are wrapping `u32`
//! values; [`LoadMeter`] turns two snapshots into a load percentage.
use crate::error::ManagerError;
use crate::frame::CanFrame;
use core::sync::atomic::{AtomicU32, Ordering};

/// Approximate header, CRC and trailer bits of a standard-id frame.
pub const STD_FRAME_OVERHEAD_BITS: u32 = 47;
/// Approximate header, CRC and trailer bits of an extended-id frame.
pub const EXT_FRAME_OVERHEAD_BITS: u32 = 67;
/// CAN-FD CRC estimate for payloads up to [`FD_SHORT_CRC_MAX_LEN`] bytes.
pub const FD_CRC17_BITS: u32 = 17;
/// CAN-FD CRC estimate for longer payloads.
pub const FD_CRC21_BITS: u32 = 21;
pub const FD_SHORT_CRC_MAX_LEN: usize = 16;

//==================================================================================FRAME_BITS
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Wire bits of one frame, split by bit rate.
pub struct FrameBits {
    /// Bits sent at the nominal (arbitration) rate.
    pub nominal: u32,
    /// Bits sent at the data-phase rate (CAN-FD with BRS only).
    pub data: u32,
}

/// Estimate the wire bits of `frame`.
///
/// Classic frames count entirely at the nominal rate. CAN-FD frames send the
/// header at the nominal rate and payload plus CRC in the data phase; without
/// BRS the data phase also runs at the nominal rate and is folded into it.
pub fn frame_bits(frame: &CanFrame) -> FrameBits {
    let overhead = if frame.is_extended() {
        EXT_FRAME_OVERHEAD_BITS
    } else {
        STD_FRAME_OVERHEAD_BITS
    };
    // Remote frames announce a DLC but carry no payload.
    let len = if frame.is_remote() { 0 } else { frame.len() };
    let payload_bits = len as u32 * 8;

    if !frame.is_fd() {
        return FrameBits {
            nominal: overhead + payload_bits,
            data: 0,
        };
    }

    let crc_bits = if len <= FD_SHORT_CRC_MAX_LEN {
        FD_CRC17_BITS
    } else {
        FD_CRC21_BITS
    };
    let data_phase = payload_bits + crc_bits;
    if frame.is_brs() {
        FrameBits {
            nominal: overhead,
            data: data_phase,
        }
    } else {
        FrameBits {
            nominal: overhead + data_phase,
            data: 0,
        }
    }
}

/// Distance from `previous` to `current` on a counter that wraps at 2^32.
pub fn counter_delta(current: u32, previous: u32) -> u64 {
    if current >= previous {
        (current - previous) as u64
    } else {
        current as u64 + (1u64 << 32) - previous as u64
    }
}

//==================================================================================COUNTERS
/// Cumulative bit counters updated from interrupt context.
#[derive(Debug, Default)]
pub struct BitCounters {
    nominal: AtomicU32,
    data: AtomicU32,
}

impl BitCounters {
    pub const fn new() -> Self {
        Self {
            nominal: AtomicU32::new(0),
            data: AtomicU32::new(0),
        }
    }

    /// Account for one received frame. Lock-free; safe from an interrupt.
    pub fn record(&self, frame: &CanFrame) {
        let bits = frame_bits(frame);
        self.nominal.fetch_add(bits.nominal, Ordering::Relaxed);
        self.data.fetch_add(bits.data, Ordering::Relaxed);
    }

    /// Current raw counter values.
    pub fn snapshot(&self) -> FrameBits {
        FrameBits {
            nominal: self.nominal.load(Ordering::Relaxed),
            data: self.data.load(Ordering::Relaxed),
        }
    }
}

//==================================================================================LOAD_METER
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Snapshot {
    at_ms: u64,
    bits: FrameBits,
}

/// Converts successive counter snapshots into a bus-load percentage.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadMeter {
    last: Option<Snapshot>,
}

impl LoadMeter {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Load in percent over the interval since the previous call.
    ///
    /// The first call only records a baseline and returns `0.0`. A call in the
    /// same millisecond as the baseline also returns `0.0` and keeps the
    /// baseline. `data_bps == 0` means the data phase runs at `nominal_bps`.
    pub fn update(
        &mut self,
        now_ms: u64,
        bits: FrameBits,
        nominal_bps: u32,
        data_bps: u32,
    ) -> Result<f32, ManagerError> {
        if nominal_bps == 0 {
            return Err(ManagerError::InvalidArgument);
        }
        let data_bps = if data_bps == 0 { nominal_bps } else { data_bps };

        let Some(last) = self.last else {
            self.last = Some(Snapshot { at_ms: now_ms, bits });
            return Ok(0.0);
        };

        let elapsed_ms = now_ms.saturating_sub(last.at_ms);
        if elapsed_ms == 0 {
            return Ok(0.0);
        }

        let nominal_delta = counter_delta(bits.nominal, last.bits.nominal);
        let data_delta = counter_delta(bits.data, last.bits.data);

        let busy_s = nominal_delta as f64 / nominal_bps as f64 + data_delta as f64 / data_bps as f64;
        let elapsed_s = elapsed_ms as f64 / 1000.0;
        let load = (busy_s / elapsed_s * 100.0).clamp(0.0, 100.0);

        self.last = Some(Snapshot { at_ms: now_ms, bits });
        Ok(load as f32)
    }
}

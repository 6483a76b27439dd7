// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The physical correlator, driven through its register file.
//!
//! A register read is a two-byte transfer: the register address goes out and
//! the value comes back in the second byte. Writes set the top bit of the
//! address. Burst reads of the stream registers return one byte per extra
//! byte clocked.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::Path,
};

use byteorder::{ByteOrder, LittleEndian};
use chrono::Utc;
use log::trace;

use super::{CorrelatorHardware, DebugMode, HardwareError, HardwareStatus};
use crate::{
    constants::{NUM_PHASE_STEPS, RAW_WORD_BYTES, VIS_WORD_BYTES},
    correlator::{frame_len, RawFrame},
};

/// Register addresses and bit layout.
pub mod registers {
    /// bit 7: centring enable, bits 0-3: sample delay.
    pub const TC_CENTRE: u8 = 0x00;
    /// Read-only. bits 0-3: phase, bits 4-7: delta.
    pub const TC_STATUS: u8 = 0x01;
    /// bit 7: debug, bit 6: shift, bit 5: count.
    pub const TC_DEBUG: u8 = 0x02;
    /// bit 7: capture enable, bit 6: single source, bits 0-4: source antenna.
    pub const TC_SOURCE: u8 = 0x03;
    /// Raw acquisition stream (burst read).
    pub const AQ_STREAM: u8 = 0x07;
    /// Visibility stream (burst read).
    pub const VX_STREAM: u8 = 0x08;
    /// Write bit 7 to start an acquisition. Read bit 0: data ready.
    pub const AQ_SYSTEM: u8 = 0x0B;
    /// bit 7: visibilities enabled, bits 0-4: accumulation exponent.
    pub const VX_SYSTEM: u8 = 0x0C;
    /// Read-only. bit 7: visibilities ready.
    pub const VX_STATUS: u8 = 0x0D;
    /// Write bit 0 to reset.
    pub const SYS_RESET: u8 = 0x0F;

    pub const WRITE_CMD: u8 = 0x80;
    pub const ENABLE: u8 = 0x80;
}

use registers::*;

/// A full-duplex byte transport to the correlator.
pub trait RegisterTransport: Send {
    /// Clock out `tx`, filling `rx` (which is the same length) with what comes
    /// back.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> std::io::Result<()>;
}

/// A transport over a character device that echoes one byte for every byte
/// written.
pub struct DeviceTransport {
    file: File,
}

impl DeviceTransport {
    pub fn open(path: &Path) -> Result<DeviceTransport, HardwareError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| HardwareError::DeviceOpen {
                path: path.display().to_string(),
                err,
            })?;
        Ok(DeviceTransport { file })
    }
}

impl RegisterTransport for DeviceTransport {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> std::io::Result<()> {
        self.file.write_all(tx)?;
        self.file.flush()?;
        self.file.read_exact(rx)
    }
}

/// Convert the visibility stream into words. Each word is 4 little-endian
/// bytes holding a 31-bit magnitude, with the top bit as the sign.
pub fn vis_words_from_bytes(bytes: &[u8]) -> Vec<i64> {
    bytes
        .chunks_exact(VIS_WORD_BYTES)
        .map(|chunk| {
            let raw = LittleEndian::read_u32(chunk);
            let magnitude = i64::from(raw & 0x7FFF_FFFF);
            if raw & 0x8000_0000 != 0 {
                -magnitude
            } else {
                magnitude
            }
        })
        .collect()
}

pub struct TartCorrelator<T: RegisterTransport> {
    transport: T,
    num_antenna: usize,
    /// `permutation[k]` is the position in the hardware's output of
    /// canonical word `k`.
    permutation: Option<Vec<usize>>,
}

impl<T: RegisterTransport> TartCorrelator<T> {
    pub fn new(
        transport: T,
        num_antenna: usize,
        permutation: Option<Vec<usize>>,
    ) -> TartCorrelator<T> {
        TartCorrelator {
            transport,
            num_antenna,
            permutation,
        }
    }

    fn read_burst(&mut self, reg: u8, num: usize) -> Result<Vec<u8>, HardwareError> {
        let mut tx = vec![0; num + 1];
        tx[0] = reg & !WRITE_CMD;
        let mut rx = vec![0; num + 1];
        self.transport
            .transfer(&tx, &mut rx)
            .map_err(|err| HardwareError::Transfer { reg, err })?;
        rx.remove(0);
        Ok(rx)
    }

    fn update_register(&mut self, reg: u8, mask: u8, bits: u8) -> Result<(), HardwareError> {
        let current = self.read_register(reg)?;
        self.write_register(reg, (current & !mask) | (bits & mask))
    }
}

impl<T: RegisterTransport> CorrelatorHardware for TartCorrelator<T> {
    fn num_antenna(&self) -> usize {
        self.num_antenna
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, HardwareError> {
        let value = self.read_burst(reg, 1)?[0];
        trace!("read  0x{reg:02x} = 0b{value:08b}");
        Ok(value)
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), HardwareError> {
        trace!("write 0x{reg:02x} = 0b{value:08b}");
        let mut rx = [0; 2];
        self.transport
            .transfer(&[reg | WRITE_CMD, value], &mut rx)
            .map_err(|err| HardwareError::Transfer { reg, err })
    }

    fn reset(&mut self) -> Result<(), HardwareError> {
        self.write_register(SYS_RESET, 0x01)
    }

    fn set_debug(&mut self, mode: DebugMode) -> Result<(), HardwareError> {
        let bits = (u8::from(mode.on) << 7) | (u8::from(mode.shift) << 6) | (u8::from(mode.count) << 5);
        self.write_register(TC_DEBUG, bits)
    }

    fn set_capture(&mut self, on: bool, source: Option<usize>) -> Result<(), HardwareError> {
        let mut bits = u8::from(on) << 7;
        if let Some(s) = source {
            bits |= 0x40 | (s as u8 & 0x1F);
        }
        self.write_register(TC_SOURCE, bits)
    }

    fn set_centre(&mut self, on: bool) -> Result<(), HardwareError> {
        self.update_register(TC_CENTRE, ENABLE, u8::from(on) << 7)
    }

    fn set_sample_delay(&mut self, delay: u8) -> Result<(), HardwareError> {
        self.update_register(TC_CENTRE, 0x0F, delay % NUM_PHASE_STEPS)
    }

    fn start_vis(&mut self, n_samples_exp: u8) -> Result<(), HardwareError> {
        self.write_register(VX_SYSTEM, ENABLE | (n_samples_exp & 0x1F))
    }

    fn start_acquisition(&mut self) -> Result<(), HardwareError> {
        self.write_register(AQ_SYSTEM, ENABLE)
    }

    fn vis_ready(&mut self) -> Result<bool, HardwareError> {
        Ok(self.read_register(VX_STATUS)? & 0x80 != 0)
    }

    fn data_ready(&mut self) -> Result<bool, HardwareError> {
        Ok(self.read_register(AQ_SYSTEM)? & 0x01 != 0)
    }

    fn read_status(&mut self) -> Result<HardwareStatus, HardwareError> {
        let tc_status = self.read_register(TC_STATUS)?;
        let tc_centre = self.read_register(TC_CENTRE)?;
        let tc_debug = self.read_register(TC_DEBUG)?;
        let tc_source = self.read_register(TC_SOURCE)?;
        let vx_system = self.read_register(VX_SYSTEM)?;
        let vx_status = self.read_register(VX_STATUS)?;
        let aq_system = self.read_register(AQ_SYSTEM)?;

        Ok(HardwareStatus {
            timestamp: Utc::now(),
            phase: (tc_status & 0x0F) % NUM_PHASE_STEPS,
            delta: tc_status >> 4,
            centre: tc_centre & 0x80 != 0,
            sample_delay: tc_centre & 0x0F,
            debug: DebugMode {
                on: tc_debug & 0x80 != 0,
                shift: tc_debug & 0x40 != 0,
                count: tc_debug & 0x20 != 0,
            },
            capture: tc_source & 0x80 != 0,
            source: (tc_source & 0x40 != 0).then_some((tc_source & 0x1F) as usize),
            vis_ready: vx_status & 0x80 != 0,
            data_ready: aq_system & 0x01 != 0,
            vis_n_samples_exp: vx_system & 0x1F,
        })
    }

    fn read_vis_frame(&mut self) -> Result<RawFrame, HardwareError> {
        let num_words = frame_len(self.num_antenna);
        let bytes = self.read_burst(VX_STREAM, VIS_WORD_BYTES * num_words)?;
        let words = vis_words_from_bytes(&bytes);
        if words.len() != num_words {
            return Err(HardwareError::VisBufferLength {
                expected: VIS_WORD_BYTES * num_words,
                got: bytes.len(),
            });
        }

        let words = match &self.permutation {
            Some(perm) => perm
                .iter()
                .map(|&p| {
                    words.get(p).copied().ok_or(HardwareError::BadPermutation {
                        entry: p,
                        len: num_words,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => words,
        };
        Ok(RawFrame { words })
    }

    fn read_data(&mut self, num_words: usize) -> Result<Vec<u8>, HardwareError> {
        self.read_burst(AQ_STREAM, RAW_WORD_BYTES * num_words)
    }
}

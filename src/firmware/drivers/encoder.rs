//! Rotary position encoder (spec.md §2: "the rotary encoder
//! (`read_position() -> u32`) — a free-running absolute-or-incremental
//! position counter").
//!
//! The concrete driver below talks to a TLE5012B-style magnetic
//! encoder over SPI, returning its 15-bit raw angle widened into the
//! `u32` the control core expects. Any encoder that can produce a
//! monotonically-wrapping position counter fits the trait.
//!
//! The SPI transfer itself is not safe to run from the servo ISR
//! (spec.md §5: "the update MUST NOT ... block, or call into any
//! blocking primitive"), so [`Tle5012Encoder`] is driven from a
//! separate polling task instead and only ever publishes into a
//! [`LatchedEncoder`]. The ISR reads the latch, which is a plain
//! atomic load and never blocks.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_stm32::spi::Spi;

use crate::firmware::error::{FirmwareError, Result};

/// Position feedback, read once per servo-loop sample.
pub trait PositionEncoder {
    /// Read the current raw position. Implementations run from
    /// interrupt context on the hot path and must not block
    /// indefinitely or allocate.
    fn read_position(&mut self) -> Result<u32>;
}

/// Last-known-good encoder reading, shared between the polling task
/// that actually talks to the SPI peripheral and the servo ISR that
/// consumes it. `read_position` never fails and never blocks: a stale
/// reading is preferable to missing a sample deadline.
pub struct LatchedEncoder {
    raw: AtomicU32,
}

impl LatchedEncoder {
    pub const fn new() -> Self {
        Self { raw: AtomicU32::new(0) }
    }

    /// Called from the polling task once a transfer completes.
    pub fn publish(&self, raw: u32) {
        self.raw.store(raw, Ordering::Release);
    }

    /// Called from the servo ISR. Never blocks, never fails.
    pub fn read(&self) -> u32 {
        self.raw.load(Ordering::Acquire)
    }
}

/// Encoder angle resolution: 15 bits (TLE5012B raw output width).
const ANGLE_BITS: u32 = 15;

/// TLE5012B-style magnetic rotary encoder over SPI.
pub struct Tle5012Encoder<'d, T: embassy_stm32::spi::Instance> {
    spi: Spi<'d, T>,
}

impl<'d, T: embassy_stm32::spi::Instance> Tle5012Encoder<'d, T> {
    pub fn new(spi: Spi<'d, T>) -> Self {
        Self { spi }
    }

    /// Read the raw 15-bit angle register (command word `0x8021`, per
    /// the TLE5012B's short SPI read of the angle-value register).
    fn read_raw_angle(&mut self) -> Result<u16> {
        let command = [0x80u16, 0x21];
        let mut rx = [0u8; 4];
        let tx: [u8; 4] = [
            (command[0] >> 8) as u8,
            command[0] as u8,
            (command[1] >> 8) as u8,
            command[1] as u8,
        ];

        self.spi
            .blocking_transfer(&mut rx, &tx)
            .map_err(|_| FirmwareError::SensorReadError)?;

        let raw = u16::from_be_bytes([rx[2], rx[3]]) & ((1u16 << ANGLE_BITS) - 1);
        Ok(raw)
    }
}

impl<'d, T: embassy_stm32::spi::Instance> PositionEncoder for Tle5012Encoder<'d, T> {
    fn read_position(&mut self) -> Result<u32> {
        self.read_raw_angle().map(u32::from)
    }
}

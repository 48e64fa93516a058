//! Command-context task that owns the real encoder SPI transfer and
//! publishes each reading into [`servo_isr::ENCODER`] (spec.md §5: the
//! servo ISR itself must never block on the SPI bus).
//!
//! This task runs at the same nominal rate as the servo loop so the
//! latch is never more than one sample stale, but it is a plain
//! `embassy` `Ticker`-driven task, not the hardware timer interrupt:
//! jitter here only ages the latched reading, it never delays the ISR.

use embassy_stm32::peripherals::SPI1;
use embassy_time::{Duration, Ticker};

use crate::firmware::config::NOMINAL_UPDATE_HZ;
use crate::firmware::drivers::encoder::{PositionEncoder, Tle5012Encoder};

use super::servo_isr::ENCODER;

/// Encoder poll period in microseconds, matched to the servo loop's
/// nominal rate.
const POLL_PERIOD_US: u64 = 1_000_000 / NOMINAL_UPDATE_HZ as u64;

#[embassy_executor::task]
pub async fn run(mut encoder: Tle5012Encoder<'static, SPI1>) {
    let mut ticker = Ticker::every(Duration::from_micros(POLL_PERIOD_US));
    loop {
        ticker.next().await;
        match encoder.read_position() {
            Ok(raw) => ENCODER.publish(raw),
            Err(_) => defmt::debug!("encoder poll: read failed, keeping last latched value"),
        }
    }
}

//! Two-phase H-bridge actuation (spec.md §2: "the H-bridge driver ...
//! treated as a black-box actuator").
//!
//! [`PhaseDriver`] is the only surface the control core sees. The
//! concrete [`Drv8844PhaseDriver`] turns a phase-space value into two
//! PWM duty cycles via an integer sine lookup and manages the DRV8844's
//! enable/fault/reset pins, grounded on the driver's nSLEEP/nFAULT/
//! nRESET wiring used elsewhere on this board.

use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;

/// Phase units per electrical cycle of a two-phase stepper: four full
/// mechanical steps per electrical revolution.
const ELECTRICAL_CYCLE: i32 = 4 * crate::firmware::control::fixed_point::FULL_STEP;

/// Quarter-wave sine table, 0..=PI/2 in 65 steps, scaled to i16 full
/// range. Mirrored by [`sine_lookup`] to cover a full cycle.
const QUARTER_SINE: [i16; 65] = [
    0, 804, 1608, 2410, 3212, 4011, 4808, 5602, 6393, 7179, 7962, 8739, 9512, 10278, 11039, 11793,
    12539, 13279, 14010, 14732, 15446, 16151, 16846, 17530, 18204, 18868, 19519, 20159, 20787,
    21403, 22005, 22594, 23170, 23731, 24279, 24811, 25329, 25832, 26319, 26790, 27245, 27683,
    28105, 28510, 28898, 29268, 29621, 29956, 30273, 30571, 30852, 31113, 31356, 31580, 31785,
    31971, 32137, 32285, 32412, 32521, 32609, 32678, 32728, 32757, 32767,
];

/// Signed sine of `phase` (phase units, wraps at [`ELECTRICAL_CYCLE`]),
/// scaled to `i16::MAX`.
fn sine_lookup(phase: i32) -> i16 {
    let wrapped = phase.rem_euclid(ELECTRICAL_CYCLE);
    let quarter = ELECTRICAL_CYCLE / 4;
    let idx_in_quarter = |x: i32| (x * 64 / quarter).clamp(0, 64) as usize;

    match wrapped / quarter {
        0 => QUARTER_SINE[idx_in_quarter(wrapped)],
        1 => QUARTER_SINE[64 - idx_in_quarter(wrapped - quarter)],
        2 => -QUARTER_SINE[idx_in_quarter(wrapped - 2 * quarter)],
        _ => -QUARTER_SINE[64 - idx_in_quarter(wrapped - 3 * quarter)],
    }
}

fn cosine_lookup(phase: i32) -> i16 {
    sine_lookup(phase + ELECTRICAL_CYCLE / 4)
}

/// Actuation surface the control core drives once per sample. No
/// implementation may block or allocate: the hot path runs from
/// interrupt context (spec.md §5).
pub trait PhaseDriver {
    /// Command coil currents for `phase` (phase-space units, spec.md
    /// §4.1) scaled by `current_scale` (0..255).
    fn set_phase(&mut self, phase: i32, current_scale: u8);
    /// Enable H-bridge outputs.
    fn enable(&mut self);
    /// Disable H-bridge outputs (coast).
    fn disable(&mut self);
    /// Clear a latched fault and reinitialize driver logic.
    fn reset(&mut self);
    /// Hold the last commanded phase at a reduced, idle current.
    fn hold(&mut self, hold_current_scale: u8);
    /// `true` if the driver's fault line is asserted.
    fn is_fault(&self) -> bool;
}

/// DRV8844 dual H-bridge stepper driver.
///
/// Hardware wiring:
/// - nSLEEP (enable, active high)
/// - nFAULT (fault, active low)
/// - nRESET (reset, active low)
/// - two PWM channels driving the coil A / coil B current references.
pub struct Drv8844PhaseDriver<'d, T: embassy_stm32::timer::GeneralInstance4Channel> {
    enable: Output<'d>,
    fault: Input<'d>,
    reset: Output<'d>,
    pwm: SimplePwm<'d, T>,
    coil_a: Channel,
    coil_b: Channel,
    last_phase: i32,
}

impl<'d, T: embassy_stm32::timer::GeneralInstance4Channel> Drv8844PhaseDriver<'d, T> {
    pub fn new(
        enable_pin: embassy_stm32::Peri<'d, impl embassy_stm32::gpio::Pin>,
        fault_pin: embassy_stm32::Peri<'d, impl embassy_stm32::gpio::Pin>,
        reset_pin: embassy_stm32::Peri<'d, impl embassy_stm32::gpio::Pin>,
        pwm: SimplePwm<'d, T>,
        coil_a: Channel,
        coil_b: Channel,
    ) -> Self {
        Self {
            enable: Output::new(enable_pin, Level::Low, Speed::Medium),
            fault: Input::new(fault_pin, Pull::Up),
            reset: Output::new(reset_pin, Level::High, Speed::Medium),
            pwm,
            coil_a,
            coil_b,
            last_phase: 0,
        }
    }

    fn write_duty(&mut self, phase: i32, current_scale: u8) {
        let max_duty = i32::from(self.pwm.max_duty());
        let scale = i32::from(current_scale);

        let duty_a = sine_lookup(phase) as i32 * scale / 255 * max_duty / i16::MAX as i32;
        let duty_b = cosine_lookup(phase) as i32 * scale / 255 * max_duty / i16::MAX as i32;

        self.pwm.set_duty(self.coil_a, (duty_a.unsigned_abs()).min(max_duty as u32) as u16);
        self.pwm.set_duty(self.coil_b, (duty_b.unsigned_abs()).min(max_duty as u32) as u16);
    }
}

impl<'d, T: embassy_stm32::timer::GeneralInstance4Channel> PhaseDriver for Drv8844PhaseDriver<'d, T> {
    fn set_phase(&mut self, phase: i32, current_scale: u8) {
        self.last_phase = phase;
        self.write_duty(phase, current_scale);
    }

    fn enable(&mut self) {
        self.enable.set_high();
        defmt::debug!("phase driver enabled");
    }

    fn disable(&mut self) {
        self.enable.set_low();
        defmt::debug!("phase driver disabled");
    }

    fn reset(&mut self) {
        self.disable();
        self.reset.set_low();
        cortex_m::asm::delay(170); // ~1us at 170 MHz
        self.reset.set_high();
    }

    fn hold(&mut self, hold_current_scale: u8) {
        self.write_duty(self.last_phase, hold_current_scale);
    }

    fn is_fault(&self) -> bool {
        self.fault.is_low()
    }
}

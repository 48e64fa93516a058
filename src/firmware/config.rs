//! Platform timing constants and per-axis configuration structs.
//!
//! Per-axis configuration (`ServoStepperConfig`, `PidGains`) is otherwise
//! supplied at runtime by the `config_servo_stepper` / `set_mode` host
//! commands; what lives here is the platform-derived timing the control
//! core needs before any axis is configured.

/// Nominal system clock, matching the board's PLL configuration in
/// [`crate::firmware::clocks`].
pub const SYSCLK_HZ: u32 = 170_000_000;

/// Free-running tick rate of the hardware clock backing
/// [`crate::firmware::drivers::clock::SystemClock`]. One tick = 1 us.
pub const TICK_HZ: u32 = 1_000_000;

/// Nominal servo control loop frequency (spec target: 6 kHz).
pub const NOMINAL_UPDATE_HZ: u32 = 6_000;

/// Right-shift applied to `(t_now - last_sample_time)` to turn a tick
/// delta into the small integer `dt` the PID math is scaled around.
///
/// Derived at compile time from [`TICK_HZ`] and [`NOMINAL_UPDATE_HZ`]
/// rather than hand-picked, per the open question in spec.md §9(a): the
/// shift is the smallest value that brings the nominal tick-per-sample
/// count below 100, keeping `dt` "a small unsigned integer on the order
/// of tens" as spec.md requires.
pub const TIME_SCALE_SHIFT: u32 = derive_time_scale_shift(TICK_HZ, NOMINAL_UPDATE_HZ);

const fn derive_time_scale_shift(tick_hz: u32, update_hz: u32) -> u32 {
    let ticks_per_sample = tick_hz / update_hz;
    let mut shift = 0;
    let mut scaled = ticks_per_sample;
    while scaled >= 100 {
        scaled >>= 1;
        shift += 1;
    }
    shift
}

/// Per-axis static configuration, set by `config_servo_stepper` and
/// updated by the mode-transition commands (spec.md §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoStepperConfig {
    /// Denominator of the position→phase mapping. Must be nonzero
    /// whenever the axis is not `disabled` (spec.md §3 invariants).
    pub full_steps_per_rotation: u32,
    /// Converts virtual-stepper units into phase units. Signed so a
    /// negative value inverts encoder-vs-stepper direction sense
    /// (spec.md §9, open question (b)) without a separate flag.
    pub step_multiplier: i32,
    /// Actuator current scale (0..255) at full output.
    pub run_current_scale: u8,
    /// Actuator current scale (0..255) when idle within tolerance.
    pub hold_current_scale: u8,
    /// Phase offset applied in `torque` mode.
    pub excite_angle: i32,
}

impl ServoStepperConfig {
    pub const fn zeroed() -> Self {
        Self {
            full_steps_per_rotation: 0,
            step_multiplier: 1,
            run_current_scale: 0,
            hold_current_scale: 0,
            excite_angle: 0,
        }
    }
}

impl Default for ServoStepperConfig {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// PID gains, pre-scaled by the host (spec.md §9: "signed 16-bit gains,
/// pre-multiplied by `PID_SCALE_DIVISOR` at the host").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PidGains {
    pub kp: i16,
    pub ki: i16,
    pub kd: i16,
}

/// Number of successive encoder samples averaged during `pid_init`
/// (spec.md §4.4 "averaging variant", chosen over the single-sample
/// variant for robustness to encoder jitter).
pub const PID_INIT_SAMPLE_COUNT: u16 = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_scale_shift_keeps_dt_in_tens() {
        let ticks_per_sample = TICK_HZ / NOMINAL_UPDATE_HZ;
        let dt = ticks_per_sample >> TIME_SCALE_SHIFT;
        assert!(dt >= 1);
        assert!(dt < 100);
    }

    #[test]
    fn derive_is_const_evaluable() {
        const SHIFT: u32 = derive_time_scale_shift(1_000_000, 6_000);
        assert_eq!(SHIFT, TIME_SCALE_SHIFT);
    }

    #[test]
    fn zeroed_config_has_no_rotation_denominator() {
        let cfg = ServoStepperConfig::zeroed();
        assert_eq!(cfg.full_steps_per_rotation, 0);
    }
}

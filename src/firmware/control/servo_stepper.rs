//! The assembled per-axis servo-stepper (spec.md §2, §4.2, §4.4, §4.5,
//! §4.6): mode dispatch, the PID-init calibration protocol, and the
//! host-facing mode-transition commands, wired around the
//! [`super::pid`] core.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::firmware::config::{PidGains, ServoStepperConfig, PID_INIT_SAMPLE_COUNT};
use crate::firmware::drivers::phase_driver::PhaseDriver;
use crate::firmware::drivers::virtual_stepper::VirtualStepperSource;
use crate::firmware::error::{shutdown, FirmwareError};

use super::fixed_point::{position_to_phase, wrapped_phase_diff, FULL_STEP};
use super::mode::Mode;
use super::pid::{hybrid_pid_update, PidState};

/// Snapshot returned by `get_stats` (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct ServoStepperStats {
    pub error: i32,
    pub max_loop_time: u32,
}

/// One closed-loop servo-stepper axis.
///
/// `driver`/`vstepper` are borrowed references to the black-box
/// actuator and the upstream trajectory source respectively (spec.md
/// §1 "out of scope", §5 "Driver and virtual-stepper references are
/// borrowed"). The free-running clock is not owned here either: the
/// ISR glue reads it both to produce `t_now` and to bracket the update
/// call for `max_loop_time`. Everything else — mode dispatch,
/// calibration, the PID core — is owned here.
pub struct ServoStepper<'a, D, V> {
    driver: &'a mut D,
    vstepper: &'a V,
    config: ServoStepperConfig,
    gains: PidGains,
    pid: PidState,
    /// Current operating mode. Written last, with `Release` ordering,
    /// by every mode-entering command, and read first, with `Acquire`
    /// ordering, by `update()` — the ordering guarantee spec.md §5
    /// requires so the ISR never observes a mode change ahead of the
    /// configuration/PID-state stores that precede it.
    mode: AtomicU8,
    max_loop_time: u32,
}

impl<'a, D, V> ServoStepper<'a, D, V>
where
    D: PhaseDriver,
    V: VirtualStepperSource,
{
    /// `config_servo_stepper` (spec.md §6): allocate an instance. Starts
    /// `disabled`.
    pub fn new(driver: &'a mut D, vstepper: &'a V, full_steps_per_rotation: u32, step_multiplier: i32) -> Self {
        Self {
            driver,
            vstepper,
            config: ServoStepperConfig {
                full_steps_per_rotation,
                step_multiplier,
                ..ServoStepperConfig::zeroed()
            },
            gains: PidGains::default(),
            pid: PidState::default(),
            mode: AtomicU8::new(Mode::Disabled.as_u8()),
            max_loop_time: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_internal(self.mode.load(Ordering::Acquire))
    }

    /// `update(instance, raw_encoder_position)` (spec.md §4.2): the
    /// single ISR entry point. Reads the mode once, then dispatches.
    /// Must complete within the sample period: no allocation, no
    /// blocking. Returns whether this sample ran the `hybrid_pid` path,
    /// so the caller can gate `record_loop_time` to that mode alone
    /// (spec.md §4.6: `max_loop_time` tracks "a single `hybrid_pid`
    /// update", not every mode's dispatch).
    pub fn update(&mut self, raw_position: u32, t_now: u32) -> bool {
        match self.mode() {
            Mode::Disabled => false,
            Mode::OpenLoop => {
                let stp = (self.vstepper.get_position() as i32).wrapping_mul(self.config.step_multiplier);
                self.driver.set_phase(stp, self.config.run_current_scale);
                false
            }
            Mode::Torque => {
                let phase = position_to_phase(self.config.full_steps_per_rotation, raw_position) as i32;
                let phase = phase.wrapping_add(self.config.excite_angle);
                self.driver.set_phase(phase, self.config.run_current_scale);
                false
            }
            Mode::PidInit => {
                self.pid_init_sample(raw_position, t_now);
                false
            }
            Mode::HybridPid => {
                self.hybrid_pid_sample(raw_position, t_now);
                true
            }
        }
    }

    fn hybrid_pid_sample(&mut self, raw_position: u32, t_now: u32) {
        let mapped_phase = position_to_phase(self.config.full_steps_per_rotation, raw_position);
        let stp = (self.vstepper.get_position() as i32).wrapping_mul(self.config.step_multiplier);

        let out = hybrid_pid_update(
            &mut self.pid,
            &self.gains,
            self.config.run_current_scale,
            self.config.hold_current_scale,
            mapped_phase,
            stp,
            t_now,
        );
        self.driver.set_phase(out.next_phase, out.current_scale);
    }

    /// §4.4, averaging variant: accumulate an incremental mean of
    /// `PID_INIT_SAMPLE_COUNT` phase samples, rejecting any sample that
    /// deviates from the running mean by more than one full step.
    /// `phase_offset` doubles as the running-mean accumulator during
    /// this phase; it holds the final calibrated offset once init
    /// completes.
    fn pid_init_sample(&mut self, raw_position: u32, t_now: u32) {
        self.driver.hold(self.config.hold_current_scale);

        let phase = position_to_phase(self.config.full_steps_per_rotation, raw_position) as i32;
        let count = i32::from(self.pid.init_count);

        if count > 0 {
            let deviation = wrapped_phase_diff(phase, self.pid.phase_offset);
            if deviation.unsigned_abs() > FULL_STEP as u32 {
                shutdown(FirmwareError::EncoderVarianceTooLarge);
            }
        }

        let next_count = count + 1;
        let delta = wrapped_phase_diff(phase, self.pid.phase_offset);
        self.pid.phase_offset = self.pid.phase_offset.wrapping_add(delta / next_count);
        self.pid.init_count += 1;

        if self.pid.init_count >= PID_INIT_SAMPLE_COUNT {
            self.pid.last_phase = 0;
            self.pid.last_stp_pos = 0;
            self.pid.integral = 0;
            self.pid.error = 0;
            self.pid.last_sample_time = t_now;
            self.mode.store(Mode::HybridPid.as_u8(), Ordering::Release);
        }
    }

    /// `set_disabled` (spec.md §4.5). Always legal.
    pub fn set_disabled(&mut self) {
        self.driver.disable();
        self.pid.reset();
        self.mode.store(Mode::Disabled.as_u8(), Ordering::Release);
    }

    /// `set_open_loop` (spec.md §4.5). `flex` is reinterpreted as
    /// `hold_current_scale`. Always legal.
    pub fn set_open_loop(&mut self, run_current_scale: u8, hold_current_scale: u8) {
        self.config.run_current_scale = run_current_scale;
        self.config.hold_current_scale = hold_current_scale;
        self.driver.enable();
        self.pid.reset();
        self.mode.store(Mode::OpenLoop.as_u8(), Ordering::Release);
    }

    /// `set_torque` (spec.md §4.5). `flex` is reinterpreted as
    /// `excite_angle`. Always legal.
    pub fn set_torque(&mut self, run_current_scale: u8, excite_angle: i32) {
        self.config.run_current_scale = run_current_scale;
        self.config.excite_angle = excite_angle;
        self.driver.enable();
        self.pid.reset();
        self.mode.store(Mode::Torque.as_u8(), Ordering::Release);
    }

    /// `set_hpid` (spec.md §4.5): legal only from `open_loop` or
    /// `disabled`. Transitions into `pid_init`, not directly into
    /// `hybrid_pid` (spec.md §3 invariant: "transitions into hybrid_pid
    /// pass through pid_init first").
    pub fn set_hpid(&mut self, run_current_scale: u8, gains: PidGains) {
        match self.mode() {
            Mode::OpenLoop | Mode::Disabled => {}
            _ => shutdown(FirmwareError::IllegalModeTransition),
        }

        self.config.run_current_scale = run_current_scale;
        self.gains = gains;
        self.driver.enable();
        self.pid.reset();
        self.mode.store(Mode::PidInit.as_u8(), Ordering::Release);
    }

    /// Called by the ISR glue after bracketing a `hybrid_pid` `update()`
    /// call with `read_time()` (spec.md §4.6). The caller is responsible
    /// for only calling this when `update()` returned `true`.
    pub fn record_loop_time(&mut self, duration: u32) {
        if duration > self.max_loop_time {
            self.max_loop_time = duration;
        }
    }

    /// `get_stats` (spec.md §4.6). Read under interrupt-disable by the
    /// caller.
    pub fn get_stats(&self) -> ServoStepperStats {
        ServoStepperStats { error: self.pid.error, max_loop_time: self.max_loop_time }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FakeDriver {
        last_phase: i32,
        last_current: u8,
        enabled: bool,
        hold_calls: u32,
    }

    impl FakeDriver {
        fn new() -> Self {
            Self { last_phase: 0, last_current: 0, enabled: false, hold_calls: 0 }
        }
    }

    impl PhaseDriver for FakeDriver {
        fn set_phase(&mut self, phase: i32, current_scale: u8) {
            self.last_phase = phase;
            self.last_current = current_scale;
        }
        fn enable(&mut self) {
            self.enabled = true;
        }
        fn disable(&mut self) {
            self.enabled = false;
        }
        fn reset(&mut self) {}
        fn hold(&mut self, current_scale: u8) {
            self.hold_calls += 1;
            self.last_current = current_scale;
        }
        fn is_fault(&self) -> bool {
            false
        }
    }

    struct FakeVstepper(Cell<u32>);

    impl VirtualStepperSource for FakeVstepper {
        fn get_position(&self) -> u32 {
            self.0.get()
        }
    }

    #[test]
    fn starts_disabled() {
        let mut driver = FakeDriver::new();
        let vstepper = FakeVstepper(Cell::new(0));
        let axis = ServoStepper::new(&mut driver, &vstepper, 200, 256);
        assert_eq!(axis.mode(), Mode::Disabled);
    }

    #[test]
    fn disabled_update_is_a_no_op() {
        let mut driver = FakeDriver::new();
        let vstepper = FakeVstepper(Cell::new(0));
        let mut axis = ServoStepper::new(&mut driver, &vstepper, 200, 256);
        axis.update(12345, 10);
        assert_eq!(axis.driver.last_phase, 0);
        assert!(!axis.driver.enabled);
    }

    #[test]
    fn open_loop_drives_commanded_position() {
        let mut driver = FakeDriver::new();
        let vstepper = FakeVstepper(Cell::new(0));
        let mut axis = ServoStepper::new(&mut driver, &vstepper, 200, 256);
        axis.set_open_loop(255, 50);
        axis.vstepper.0.set(10);
        axis.update(0, 10);
        assert_eq!(axis.driver.last_phase, 2560);
        assert_eq!(axis.driver.last_current, 255);
    }

    #[test]
    fn torque_mode_applies_excite_angle() {
        let mut driver = FakeDriver::new();
        let vstepper = FakeVstepper(Cell::new(0));
        let mut axis = ServoStepper::new(&mut driver, &vstepper, 200, 256);
        axis.set_torque(200, 500);
        axis.update(0, 10);
        assert_eq!(axis.driver.last_phase, 500);
    }

    // P7: illegal transition from torque is fatal.
    #[test]
    #[should_panic]
    fn set_hpid_from_torque_is_fatal() {
        let mut driver = FakeDriver::new();
        let vstepper = FakeVstepper(Cell::new(0));
        let mut axis = ServoStepper::new(&mut driver, &vstepper, 200, 256);
        axis.set_torque(200, 0);
        axis.set_hpid(200, PidGains { kp: 1, ki: 0, kd: 0 });
    }

    // P7: set_hpid from open_loop succeeds and leaves mode = pid_init.
    #[test]
    fn set_hpid_from_open_loop_enters_pid_init() {
        let mut driver = FakeDriver::new();
        let vstepper = FakeVstepper(Cell::new(0));
        let mut axis = ServoStepper::new(&mut driver, &vstepper, 200, 256);
        axis.set_open_loop(255, 0);
        axis.set_hpid(255, PidGains { kp: 1024, ki: 0, kd: 0 });
        assert_eq!(axis.mode(), Mode::PidInit);
    }

    // Scenario 6: init variance fault.
    #[test]
    #[should_panic]
    fn pid_init_variance_fault() {
        let mut driver = FakeDriver::new();
        let vstepper = FakeVstepper(Cell::new(0));
        let mut axis = ServoStepper::new(&mut driver, &vstepper, 256, 1);
        axis.set_open_loop(255, 0);
        axis.set_hpid(255, PidGains::default());
        for (i, sample) in [1000u32, 1001, 1002, 100_000].into_iter().enumerate() {
            axis.update(sample, i as u32 * 20);
        }
    }

    #[test]
    fn pid_init_completes_after_sample_count_and_enters_hybrid_pid() {
        let mut driver = FakeDriver::new();
        let vstepper = FakeVstepper(Cell::new(0));
        let mut axis = ServoStepper::new(&mut driver, &vstepper, 256, 1);
        axis.set_open_loop(255, 0);
        axis.set_hpid(255, PidGains::default());
        for i in 0..PID_INIT_SAMPLE_COUNT {
            axis.update(10_000, u32::from(i) * 20);
        }
        assert_eq!(axis.mode(), Mode::HybridPid);
    }

    #[test]
    fn stats_report_error_and_loop_time() {
        let mut driver = FakeDriver::new();
        let vstepper = FakeVstepper(Cell::new(0));
        let mut axis = ServoStepper::new(&mut driver, &vstepper, 200, 256);
        axis.record_loop_time(42);
        axis.record_loop_time(10);
        axis.record_loop_time(99);
        let stats = axis.get_stats();
        assert_eq!(stats.max_loop_time, 99);
        assert_eq!(stats.error, 0);
    }
}

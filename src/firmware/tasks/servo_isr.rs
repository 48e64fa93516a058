//! The periodic timer interrupt that drives the servo loop (spec.md
//! §5, "ISR context"). This is the one place the firmware departs from
//! the rest of its otherwise all-`embassy`-async task model: the
//! update MUST run from a genuine hardware interrupt on a fixed
//! period, not a cooperatively-scheduled `Ticker`, because a
//! `hybrid_pid` update must never be delayed behind another task.

use core::cell::RefCell;

use cortex_m_rt::interrupt;
use critical_section::Mutex;
use embassy_stm32::peripherals::TIM1;

use crate::firmware::control::servo_stepper::ServoStepper;
use crate::firmware::drivers::clock::{HardwareClock, SystemClock};
use crate::firmware::drivers::encoder::LatchedEncoder;
use crate::firmware::drivers::phase_driver::Drv8844PhaseDriver;
use crate::firmware::drivers::virtual_stepper::AtomicVirtualStepper;

/// Concrete axis type this build's servo ISR drives.
pub type Axis = ServoStepper<'static, Drv8844PhaseDriver<'static, TIM1>, AtomicVirtualStepper>;

static AXIS: Mutex<RefCell<Option<Axis>>> = Mutex::new(RefCell::new(None));
static CLOCK: HardwareClock = HardwareClock;

/// Most recent encoder reading. Published by
/// [`super::encoder_poll::run`] from command context; read by the ISR
/// with a single atomic load, so the ISR never touches the SPI bus
/// itself (spec.md §5).
pub static ENCODER: LatchedEncoder = LatchedEncoder::new();

/// Install the axis this interrupt drives. Called once during startup,
/// before the timer peripheral is unmasked.
pub fn install(axis: Axis) {
    critical_section::with(|cs| {
        *AXIS.borrow(cs).borrow_mut() = Some(axis);
    });
}

/// Apply a command-context mutation to the installed axis under the
/// interrupt-disable critical section spec.md §5 requires ("the only
/// shared-mutable object is the per-instance control block ...
/// wrapped in a per-instance `irq_disable()`/`irq_enable()` pair").
pub fn with_axis<R>(f: impl FnOnce(&mut Axis) -> R) -> Option<R> {
    critical_section::with(|cs| AXIS.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Periodic timer interrupt, nominally firing at
/// [`crate::firmware::config::NOMINAL_UPDATE_HZ`]. Acknowledging the
/// timer peripheral's update-interrupt flag is a register-level detail
/// of whichever basic timer backs this vector and is out of this
/// crate's scope (spec.md §1): a full board-support layer clears it
/// here before returning.
#[interrupt]
fn TIM1_UP_TIM16() {
    let t_now = CLOCK.read_time();
    let raw_position = ENCODER.read();

    critical_section::with(|cs| {
        let mut axis_slot = AXIS.borrow(cs).borrow_mut();
        let Some(axis) = axis_slot.as_mut() else { return };

        let start = CLOCK.read_time();
        let ran_hybrid_pid = axis.update(raw_position, t_now);
        if ran_hybrid_pid {
            // max_loop_time tracks only hybrid_pid samples (spec.md
            // §4.6); disabled/open_loop/torque/pid_init dispatch is
            // cheap and not the latency this stat is meant to bound.
            let elapsed = CLOCK.read_time().wrapping_sub(start);
            axis.record_loop_time(elapsed);
        }
    });
}

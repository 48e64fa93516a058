//! Host command decoding and dispatch (spec.md §6 "External
//! Interfaces"). The host command/RPC transport and the `oid`
//! object-registry lookup are themselves out of scope (spec.md §1): by
//! the time a command reaches [`dispatch_set_mode`] / [`dispatch_get_stats`]
//! it is already bound to the axis it targets.

use crate::firmware::config::PidGains;
use crate::firmware::control::mode::Mode;
use crate::firmware::control::servo_stepper::{ServoStepper, ServoStepperStats};
use crate::firmware::drivers::phase_driver::PhaseDriver;
use crate::firmware::drivers::virtual_stepper::VirtualStepperSource;
use crate::firmware::error::{shutdown, FirmwareError};

/// `config_servo_stepper oid, driver_oid, vstepper_oid,
/// full_steps_per_rotation, step_multiplier` (spec.md §6). Allocation
/// happens once, at startup, by direct construction of a
/// [`ServoStepper`] (the concrete driver/vstepper/axis types are fixed
/// at compile time); this struct documents the wire shape of the
/// command for the host-facing transport.
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct ConfigServoStepperCommand {
    pub oid: u8,
    pub driver_oid: u8,
    pub vstepper_oid: u8,
    pub full_steps_per_rotation: u32,
    pub step_multiplier: i32,
}

/// A decoded `set_mode` command. `flex` is reinterpreted by the target
/// mode: hold-current for `open_loop`, excite-angle for `torque`,
/// ignored otherwise (spec.md §6).
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct SetModeCommand {
    pub oid: u8,
    pub mode_code: u8,
    pub run_current_scale: u8,
    pub flex: i32,
    pub gains: PidGains,
}

/// A decoded `get_stats` command.
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct GetStatsCommand {
    pub oid: u8,
}

/// `servo_stepper_stats oid=<u8> error=<i32> max_time=<u32>` (spec.md §6).
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct ServoStepperStatsResponse {
    pub oid: u8,
    pub error: i32,
    pub max_time: u32,
}

impl ServoStepperStatsResponse {
    pub fn from_stats(oid: u8, stats: ServoStepperStats) -> Self {
        Self { oid, error: stats.error, max_time: stats.max_loop_time }
    }
}

/// Apply a decoded `set_mode` command to its already-resolved axis
/// (spec.md §4.5).
pub fn dispatch_set_mode<D, V>(axis: &mut ServoStepper<'_, D, V>, cmd: SetModeCommand)
where
    D: PhaseDriver,
    V: VirtualStepperSource,
{
    let Some(mode) = Mode::from_host_code(cmd.mode_code) else {
        shutdown(FirmwareError::UnknownServoMode);
    };

    match mode {
        Mode::Disabled => axis.set_disabled(),
        Mode::OpenLoop => axis.set_open_loop(cmd.run_current_scale, cmd.flex as u8),
        Mode::Torque => axis.set_torque(cmd.run_current_scale, cmd.flex),
        Mode::HybridPid => axis.set_hpid(cmd.run_current_scale, cmd.gains),
        // Mode::from_host_code never produces PidInit (spec.md §4.5:
        // it is only entered as a side effect of set_hpid).
        Mode::PidInit => unreachable!("pid_init is not a host-selectable mode"),
    }
}

/// Apply a decoded `get_stats` command (spec.md §4.6).
pub fn dispatch_get_stats<D, V>(axis: &ServoStepper<'_, D, V>, cmd: GetStatsCommand) -> ServoStepperStatsResponse
where
    D: PhaseDriver,
    V: VirtualStepperSource,
{
    ServoStepperStatsResponse::from_stats(cmd.oid, axis.get_stats())
}

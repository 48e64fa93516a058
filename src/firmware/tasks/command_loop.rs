//! Command context (spec.md §5 "Command context"): an `embassy` task
//! draining decoded host commands and applying them to the installed
//! axis. The host command/RPC transport itself is out of scope
//! (spec.md §1) — whatever decodes wire frames into [`Command`]
//! pushes onto [`COMMANDS`]; this task only ever sees already-decoded
//! values.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::firmware::command::dispatch::{
    dispatch_get_stats, dispatch_set_mode, GetStatsCommand, ServoStepperStatsResponse, SetModeCommand,
};

use super::servo_isr::with_axis;

/// A decoded host command, queued for the command-context task.
pub enum Command {
    SetMode(SetModeCommand),
    GetStats(GetStatsCommand),
}

/// Host → core command queue.
pub static COMMANDS: Channel<CriticalSectionRawMutex, Command, 8> = Channel::new();

/// Core → host response queue (`servo_stepper_stats`, spec.md §6).
pub static RESPONSES: Channel<CriticalSectionRawMutex, ServoStepperStatsResponse, 8> = Channel::new();

/// Drain [`COMMANDS`] and dispatch each against the installed axis.
/// Every mutation runs inside [`with_axis`]'s critical section, so the
/// servo ISR never observes a partially-applied command (spec.md §5).
#[embassy_executor::task]
pub async fn run() {
    loop {
        match COMMANDS.receive().await {
            Command::SetMode(cmd) => {
                with_axis(|axis| dispatch_set_mode(axis, cmd));
            }
            Command::GetStats(cmd) => {
                if let Some(response) = with_axis(|axis| dispatch_get_stats(axis, cmd)) {
                    RESPONSES.send(response).await;
                }
            }
        }
    }
}

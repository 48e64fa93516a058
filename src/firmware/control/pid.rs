//! Hybrid PID controller — the core of the servo-stepper (spec.md §4.3).
//!
//! Error accumulates the divergence between commanded motion
//! (`d_stp`) and measured motion (`d_phase`) rather than a simple
//! position error, so a one-sample encoder glitch cannot be mistaken
//! for a persistent miscount. Derivative is taken on measured phase
//! (derivative-on-measurement) to avoid setpoint-change spikes, and the
//! integral is clamped with back-pressure anti-windup. Below half a
//! full step of accumulated error the loop trusts the commanded phase
//! outright and skips closed-loop correction — the "hybrid" shortcut.

use crate::firmware::config::{PidGains, TIME_SCALE_SHIFT};

use super::fixed_point::{clamp_i32, wrapped_phase_diff, FULL_STEP, HALF_STEP};

/// Fixed-point divisor the control-output blend is scaled by (spec.md §9:
/// gains are pre-multiplied by this at the host).
pub const PID_SCALE_DIVISOR: i32 = 1024;

/// Per-axis PID runtime state (spec.md §3 "Per-instance PID state").
#[derive(Debug, Clone, Copy, Default)]
pub struct PidState {
    /// Accumulated velocity-error integral, clamped to `±FULL_STEP`
    /// outside of a single update call (invariant P1).
    pub integral: i32,
    /// Running (unclamped) error — divergence between commanded and
    /// measured motion accumulated over the axis's lifetime.
    pub error: i32,
    /// Phase value corresponding to the encoder's zero-reference,
    /// established during `pid_init`.
    pub phase_offset: i32,
    /// Last computed encoder-derived phase (already offset-corrected).
    pub last_phase: i32,
    /// Last commanded virtual-stepper position, in phase units.
    pub last_stp_pos: i32,
    /// Wallclock tick of the last sample.
    pub last_sample_time: u32,
    /// Sample counter used only during `pid_init`.
    pub init_count: u16,
}

impl PidState {
    /// Clear all dynamic state. Used when entering `pid_init` and on
    /// every mode-entering command per spec.md §4.5 ("reset PID state
    /// as appropriate").
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Result of a single hybrid-PID sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridPidOutput {
    /// Phase to command to the driver this sample.
    pub next_phase: i32,
    /// Current scale (0..255) to command alongside `next_phase`.
    pub current_scale: u8,
    /// The clamped control output computed at step 8, before the
    /// hybrid shortcut decides whether to apply it. Exposed so tests
    /// can assert invariant P2 (`|co| <= FULL_STEP`) against the real
    /// computation rather than a hand-duplicated copy of it.
    pub co: i32,
}

/// Run one hybrid-PID sample (spec.md §4.3, steps 1-12).
///
/// `mapped_phase` is `position_to_phase(full_steps_per_rotation, p)`
/// (already computed by the caller, which owns the rotation
/// denominator); `stp` is the virtual stepper's commanded position
/// already multiplied by `step_multiplier` and wrapped into phase
/// units; `t_now` is the free-running hardware tick at this sample.
pub fn hybrid_pid_update(
    state: &mut PidState,
    gains: &PidGains,
    run_current_scale: u8,
    hold_current_scale: u8,
    mapped_phase: u32,
    stp: i32,
    t_now: u32,
) -> HybridPidOutput {
    // 1. Time step, clamped so a 0-tick gap never divides by zero.
    let raw_dt = t_now.wrapping_sub(state.last_sample_time);
    let dt = core::cmp::max(1, (raw_dt >> TIME_SCALE_SHIFT) as i32);

    // 2. Phase reading, offset-corrected into the controller's frame.
    let phase = (mapped_phase as i32).wrapping_sub(state.phase_offset);

    // 3. Phase delta with wrap correction.
    let d_phase = wrapped_phase_diff(phase, state.last_phase);

    // 4. Command delta.
    let d_stp = stp.wrapping_sub(state.last_stp_pos);

    // 5. Velocity-error accumulation (unclamped in storage).
    state.error = state.error.wrapping_add(d_stp.wrapping_sub(d_phase));
    let clamped_err = clamp_i32(state.error, FULL_STEP);

    // 6. Integral of clamped error, with anti-windup clamp.
    state.integral = state.integral.saturating_add(clamped_err.saturating_mul(dt));
    state.integral = clamp_i32(state.integral, FULL_STEP);

    // 7. Derivative on measured phase (derivative-on-measurement).
    let d_term = (i32::from(gains.kd).saturating_mul(d_phase)) / dt;

    // 8. Control output, fixed-point divisor PID_SCALE_DIVISOR.
    let kp_term = i32::from(gains.kp).saturating_mul(clamped_err);
    let ki_term = i32::from(gains.ki).saturating_mul(state.integral);
    let mut co = kp_term.saturating_add(ki_term).saturating_sub(d_term) / PID_SCALE_DIVISOR;
    co = clamp_i32(co, FULL_STEP);

    // 9. Current scaling: linear blend between hold and run current.
    let co_abs = co.unsigned_abs() as i32;
    let current_span = i32::from(run_current_scale) - i32::from(hold_current_scale);
    let current_scale =
        (co_abs.saturating_mul(current_span) / FULL_STEP + i32::from(hold_current_scale))
            .clamp(0, 255) as u8;

    // 10. Hybrid shortcut: only correct when accumulated error matters.
    let next_phase = if state.error.unsigned_abs() > HALF_STEP as u32 {
        phase.wrapping_add(co)
    } else {
        stp
    };

    // 12. Carry state forward for the next sample.
    state.last_phase = phase;
    state.last_stp_pos = stp;
    state.last_sample_time = t_now;

    HybridPidOutput { next_phase, current_scale, co }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gains(kp: i16, ki: i16, kd: i16) -> PidGains {
        PidGains { kp, ki, kd }
    }

    // P1: integral never exceeds FULL_STEP regardless of drive.
    #[test]
    fn integral_windup_clamp_scenario() {
        let mut state = PidState::default();
        let g = gains(0, 1024, 0);
        let mut t = 0u32;
        // Sustained +500 phase-unit error: command runs ahead of measured
        // phase by 500 every sample (d_stp=500, d_phase=0).
        for _ in 0..1000 {
            t = t.wrapping_add(20);
            let stp = state.last_stp_pos.wrapping_add(500);
            let out = hybrid_pid_update(&mut state, &g, 255, 0, 0, stp, t);
            assert!(out.current_scale <= 255);
        }
        assert_eq!(state.integral.abs(), FULL_STEP);
    }

    // Scenario 1: tracking a held setpoint produces zero error and zero
    // integral when Ki = 0 and nothing actually moves.
    #[test]
    fn tracking_step_scenario() {
        let mut state = PidState::default();
        let g = gains(1024, 0, 0);
        let full = 200u32;
        let raw_encoder = 10_000u32;
        // pid_init equivalent: anchor phase_offset to the constant reading.
        state.phase_offset =
            crate::firmware::control::fixed_point::position_to_phase(full, raw_encoder) as i32;
        let mapped = crate::firmware::control::fixed_point::position_to_phase(full, raw_encoder);

        let mut t = 0u32;
        for _ in 0..10 {
            t = t.wrapping_add(20);
            let out = hybrid_pid_update(&mut state, &g, 255, 0, mapped, 0, t);
            assert_eq!(out.next_phase, 0);
        }
        assert!(state.error >= 0);
        assert_eq!(state.integral, 0);
    }

    // Scenario 3: derivative on measurement rejects setpoint-change kick.
    // Kd is the only nonzero gain, and d_phase is 0 (the encoder did not
    // move), so the derivative term contributes nothing and co is driven
    // entirely by the zero Kp/Ki terms despite the 10_000-unit stepper
    // command.
    #[test]
    fn derivative_kick_rejection_scenario() {
        let mut state = PidState::default();
        let g = gains(0, 0, 1024);
        let out = hybrid_pid_update(&mut state, &g, 255, 0, 0, 10_000, 20);
        assert_eq!(out.co, 0, "a setpoint-change kick must not leak into co when only Kd is set");
        assert!(out.co.abs() <= FULL_STEP);
    }

    // Scenario 4: wrap boundary keeps d_phase small across a 2^24 crossing.
    #[test]
    fn wrap_boundary_scenario() {
        let mut state = PidState::default();
        let g = gains(0, 0, 0);
        let near_top = ((1u32 << 24) - 10) as i32;
        state.last_phase = near_top;
        state.phase_offset = 0;
        let mapped_near_zero = 10u32;
        let out = hybrid_pid_update(&mut state, &g, 255, 0, mapped_near_zero, 0, 20);
        // next_phase should reflect a small ~20-unit correction, not a
        // jump of nearly 2^24.
        assert!(out.next_phase.unsigned_abs() < 100);
    }

    // Scenario 5 / P6: quiescence shortcut feeds commanded phase directly.
    #[test]
    fn hybrid_shortcut_when_error_small() {
        let mut state = PidState::default();
        let g = gains(10, 0, 0);
        let mut t = 0u32;
        for bounce in [0i32, 50, -50, 80, -80, 20] {
            t = t.wrapping_add(20);
            let mapped = bounce.rem_euclid(1 << 24) as u32;
            let out = hybrid_pid_update(&mut state, &g, 255, 200, mapped, 0, t);
            assert_eq!(out.next_phase, 0, "expected feed-forward shortcut to hold");
            assert_eq!(out.current_scale, 200, "co~=0 should yield hold current");
        }
    }

    // P3: current scale never leaves [hold, run] when run >= hold.
    #[test]
    fn current_scale_stays_in_range() {
        let mut state = PidState::default();
        let g = gains(2000, 50, 10);
        let mut t = 0u32;
        for step in 0..200i32 {
            t = t.wrapping_add(20);
            let mapped = ((step * 37) as u32) & 0x00FF_FFFF;
            let out = hybrid_pid_update(&mut state, &g, 220, 40, mapped, step * 5, t);
            assert!(out.current_scale >= 40 && out.current_scale <= 220);
        }
    }

    #[test]
    fn reset_clears_dynamic_state() {
        let mut state = PidState::default();
        state.integral = 100;
        state.error = 50;
        state.last_phase = 10;
        state.last_stp_pos = 20;
        state.last_sample_time = 99;
        state.reset();
        assert_eq!(state.integral, 0);
        assert_eq!(state.error, 0);
        assert_eq!(state.last_phase, 0);
        assert_eq!(state.last_stp_pos, 0);
        assert_eq!(state.last_sample_time, 0);
    }
}

//! The servo-stepper operating-mode state machine (spec.md §3, §4.2).

/// Operating mode of a servo-stepper axis. Exactly one is active at any
/// time. Stored as a `u8` discriminant so it can live in an
/// [`core::sync::atomic::AtomicU8`] and be read by the ISR with a single
/// acquire load (spec.md §5 ordering guarantees).
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum Mode {
    Disabled = 0,
    OpenLoop = 1,
    Torque = 2,
    /// Calibration phase entered on the way from `open_loop`/`disabled`
    /// to `hybrid_pid`. Not directly host-selectable (spec.md §4.5 only
    /// exposes `set_disabled`/`set_open_loop`/`set_torque`/`set_hpid`).
    PidInit = 3,
    HybridPid = 4,
}

impl Mode {
    /// Decode a host-supplied mode code (spec.md §6: `mode∈{0..3}`).
    /// `PidInit` is deliberately not a valid host-supplied code — it is
    /// only ever entered internally by `set_hpid`.
    pub const fn from_host_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Disabled),
            1 => Some(Self::OpenLoop),
            2 => Some(Self::Torque),
            3 => Some(Self::HybridPid),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode this mode's own `#[repr(u8)]` discriminant, as stored in
    /// the instance's atomic mode flag. Distinct from
    /// [`Mode::from_host_code`]: the atomic field only ever holds a
    /// value this module itself wrote, so unrecognized codes fold to
    /// `Disabled` rather than needing an `Option`.
    pub const fn from_internal(code: u8) -> Self {
        match code {
            0 => Self::Disabled,
            1 => Self::OpenLoop,
            2 => Self::Torque,
            3 => Self::PidInit,
            _ => Self::HybridPid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_codes_round_trip_for_selectable_modes() {
        assert_eq!(Mode::from_host_code(0), Some(Mode::Disabled));
        assert_eq!(Mode::from_host_code(1), Some(Mode::OpenLoop));
        assert_eq!(Mode::from_host_code(2), Some(Mode::Torque));
        assert_eq!(Mode::from_host_code(3), Some(Mode::HybridPid));
    }

    #[test]
    fn pid_init_is_not_host_selectable() {
        assert_eq!(Mode::from_host_code(4), None);
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(Mode::from_host_code(5), None);
        assert_eq!(Mode::from_host_code(255), None);
    }

    #[test]
    fn internal_round_trip() {
        for m in [Mode::Disabled, Mode::OpenLoop, Mode::Torque, Mode::PidInit, Mode::HybridPid] {
            assert_eq!(Mode::from_internal(m.as_u8()), m);
        }
    }
}

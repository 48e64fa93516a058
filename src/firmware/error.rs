/// Firmware-wide error handling.
///
/// Provides a unified error type for all firmware operations,
/// enabling proper error propagation and recovery.

/// Firmware error types.
#[derive(Debug, Clone, Copy, defmt::Format, PartialEq)]
pub enum FirmwareError {
    /// Sensor read error (encoder SPI transfer failed).
    SensorReadError,

    // === Servo-stepper fatal conditions (spec.md §7) ===
    /// `set_hpid` issued while mode was neither `open_loop` nor `disabled`.
    IllegalModeTransition,

    /// `set_mode` received a mode code outside `0..=3`.
    UnknownServoMode,

    /// An encoder sample during `pid_init` deviated from the running
    /// mean by more than one full step.
    EncoderVarianceTooLarge,
}

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational only - no action required.
    Info,

    /// Warning - operation continues in degraded mode.
    Warning,

    /// Error - operation failed but system recoverable.
    Error,

    /// Critical - system cannot continue safely.
    Critical,
}

impl FirmwareError {
    /// Check if error is recoverable.
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::SensorReadError => true,

            // Fatal per spec.md §7: always non-recoverable, always `shutdown`.
            Self::IllegalModeTransition => false,
            Self::UnknownServoMode => false,
            Self::EncoderVarianceTooLarge => false,
        }
    }

    /// Get error severity.
    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::SensorReadError => ErrorSeverity::Error,

            Self::IllegalModeTransition => ErrorSeverity::Critical,
            Self::UnknownServoMode => ErrorSeverity::Critical,
            Self::EncoderVarianceTooLarge => ErrorSeverity::Critical,
        }
    }

    /// Check if error requires immediate motor stop.
    pub const fn requires_motor_stop(&self) -> bool {
        match self {
            Self::SensorReadError => false,
            Self::IllegalModeTransition => true,
            Self::UnknownServoMode => true,
            Self::EncoderVarianceTooLarge => true,
        }
    }

    /// Human-readable description. For the three fatal servo-stepper
    /// conditions this is the exact message spec.md §4.4/§4.5 mandates.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::SensorReadError => "Sensor read error",
            Self::IllegalModeTransition => "PID mode must transition from open-loop",
            Self::UnknownServoMode => "Unknown Servo Mode",
            Self::EncoderVarianceTooLarge => "Encoder variance too large",
        }
    }
}

/// Firmware result type (alias for convenience).
pub type Result<T> = core::result::Result<T, FirmwareError>;

/// Log and halt. Per spec.md §7, the three servo-stepper fatal
/// conditions (bad mode transition, unknown mode, encoder variance) are
/// non-recoverable: there is no local recovery path, only a halt.
#[inline(never)]
pub fn shutdown(error: FirmwareError) -> ! {
    defmt::error!("FATAL: {} ({})", error.description(), error);
    panic!("servo-stepper shutdown: {}", error.description());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
    }

    #[test]
    fn critical_errors_not_recoverable() {
        assert!(!FirmwareError::IllegalModeTransition.is_recoverable());
        assert!(!FirmwareError::UnknownServoMode.is_recoverable());
        assert!(!FirmwareError::EncoderVarianceTooLarge.is_recoverable());
    }

    #[test]
    fn sensor_read_error_is_recoverable() {
        assert!(FirmwareError::SensorReadError.is_recoverable());
    }

    #[test]
    fn motor_stop_conditions() {
        assert!(FirmwareError::EncoderVarianceTooLarge.requires_motor_stop());
        assert!(FirmwareError::IllegalModeTransition.requires_motor_stop());
        assert!(!FirmwareError::SensorReadError.requires_motor_stop());
    }

    #[test]
    fn fatal_messages_match_spec_wording() {
        assert_eq!(
            FirmwareError::IllegalModeTransition.description(),
            "PID mode must transition from open-loop"
        );
        assert_eq!(FirmwareError::UnknownServoMode.description(), "Unknown Servo Mode");
        assert_eq!(
            FirmwareError::EncoderVarianceTooLarge.description(),
            "Encoder variance too large"
        );
    }
}

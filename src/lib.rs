#![no_std]

// Public firmware modules
pub mod firmware;

// NOTE: this crate links against `embassy-stm32`/`cortex-m-rt`, which
// assume an ARM target. Build and test both `lib` and `tests/` against
// the target triple, not the host. The pure control-math modules
// (fixed_point, pid, mode) have no hardware dependency and carry their
// own `#[cfg(test)]` unit tests; `tests/` holds the integration tests
// that exercise the assembled `ServoStepper` end to end.

pub mod clock;
pub mod encoder;
pub mod phase_driver;
pub mod virtual_stepper;

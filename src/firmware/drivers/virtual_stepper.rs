//! Virtual stepper position source (spec.md §2: "the virtual stepper
//! (`get_position() -> u32`) — an upstream trajectory generator").
//!
//! Trajectory planning lives upstream of this crate; all the control
//! core needs is the current commanded position, read once per sample.
//! The command context advances it (e.g. in response to host step
//! commands) while the servo ISR only ever loads it.

use core::sync::atomic::{AtomicU32, Ordering};

/// Source of the commanded stepper position.
pub trait VirtualStepperSource {
    /// Current commanded position. Called once per sample from
    /// interrupt context.
    fn get_position(&self) -> u32;
}

/// Atomic-backed virtual stepper: the command context calls
/// [`AtomicVirtualStepper::set_position`], the ISR calls
/// [`VirtualStepperSource::get_position`]. No locking is required in
/// either direction because there is exactly one writer and the value
/// is a single machine word (spec.md §5).
pub struct AtomicVirtualStepper {
    position: AtomicU32,
}

impl AtomicVirtualStepper {
    pub const fn new() -> Self {
        Self { position: AtomicU32::new(0) }
    }

    pub fn set_position(&self, position: u32) {
        self.position.store(position, Ordering::Release);
    }

    pub fn advance(&self, delta: i32) {
        let _ = self
            .position
            .fetch_update(Ordering::Release, Ordering::Acquire, |p| {
                Some((p as i32).wrapping_add(delta) as u32)
            });
    }
}

impl Default for AtomicVirtualStepper {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualStepperSource for AtomicVirtualStepper {
    fn get_position(&self) -> u32 {
        self.position.load(Ordering::Acquire)
    }
}

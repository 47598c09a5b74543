//! The system reboot guard the facade (C11) acquires around a write.
//!
//! Real guard acquisition is a round-trip to a service manager external to
//! this core; callers plug in their own implementation. `NullGuard` is the
//! no-op used in tests and by callers that manage the guard themselves.

use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AcquireFailed(pub String);
impl fmt::Display for AcquireFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to acquire reboot guard: {}", self.0)
    }
}
impl std::error::Error for AcquireFailed {
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseFailed(pub String);
impl fmt::Display for ReleaseFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to release reboot guard: {}", self.0)
    }
}
impl std::error::Error for ReleaseFailed {
}

/// A held guard token; dropping it does not release the guard — callers
/// must call [`RebootGuard::release`] explicitly so release failure can be
/// reported rather than silently swallowed in a `Drop` impl.
pub trait RebootGuard: fmt::Debug {
    fn acquire(&self) -> Result<(), AcquireFailed>;
    fn release(&self) -> Result<(), ReleaseFailed>;
}

/// A guard that always succeeds; suitable for tests and for callers that
/// handle reboot inhibition outside the core.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullGuard;
impl RebootGuard for NullGuard {
    fn acquire(&self) -> Result<(), AcquireFailed> {
        Ok(())
    }

    fn release(&self) -> Result<(), ReleaseFailed> {
        Ok(())
    }
}

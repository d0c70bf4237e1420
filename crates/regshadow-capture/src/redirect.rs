//! Seam between the session lifecycle and the platform redirection mechanics.
//!
//! The session only needs install/remove pairing; how call targets are
//! actually redirected (import-table patching on Windows) stays behind this
//! trait, so the session contract is testable with a fake.

use crate::error::CaptureError;

pub trait Redirector {
    /// Install every redirection, or roll back and fail.
    ///
    /// Invariant: after an error return, no redirection is live — a partial
    /// installation must not leave the component able to reach the real store
    /// through an unhooked entry point while others are hooked, nor leave a
    /// dangling patched target.
    fn install(&mut self) -> Result<(), CaptureError>;

    /// Restore every original call target exactly.
    fn remove(&mut self) -> Result<(), CaptureError>;
}

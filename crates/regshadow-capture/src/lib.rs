//! Interception engine: make the fixed set of registration-store entry
//! points used by a loaded component observable without letting their
//! effects reach the real store.
//!
//! A driver loads a [`ComModule`], opens a [`CaptureSession`] over it,
//! invokes the component's register entry point, and finishes the session to
//! collect the ordered [`regshadow_common::RegistrationLog`]. Redirection is
//! import-table patching on Windows; other platforms report
//! [`CaptureError::NotSupported`]. The session contract itself (linearity,
//! reentrancy rejection, rollback) is platform-independent and is exercised
//! through the [`Redirector`] seam.
#![allow(unsafe_code)]

mod error;
pub use error::CaptureError;

mod recorder;
pub use recorder::{KeyRef, Recorder};

mod redirect;
pub use redirect::Redirector;

mod session;
pub use session::{CaptureConfig, CaptureSession};

mod module;
pub use module::{ComModule, REGISTER_ENTRY_POINT, UNREGISTER_ENTRY_POINT};

#[cfg(windows)]
mod hooks;

#[cfg(windows)]
mod iat;
#[cfg(windows)]
pub use iat::ImportTableRedirector;

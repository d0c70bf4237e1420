//! Capture session lifecycle.
//!
//! Ownership is linear: a session is created by [`CaptureSession::begin`],
//! lives while the driver invokes the component's register entry point, and is
//! consumed exactly once by [`CaptureSession::finish`], which returns the
//! accumulated log. The hook functions reach the session's recorder through a
//! process-wide slot; the slot doubles as the reentrancy guard — only one
//! session may exist per process.

use std::sync::Mutex;

use regshadow_common::RegistrationLog;
use tracing::warn;

use crate::error::CaptureError;
use crate::recorder::Recorder;
use crate::redirect::Redirector;

static ACTIVE: Mutex<Option<Recorder>> = Mutex::new(None);

/// Run `f` against the active session's recorder, if any.
///
/// Hook functions call this; a `None` return means a hooked call arrived
/// outside a session, which the hooks treat as a benign no-op.
pub(crate) fn with_active<R>(f: impl FnOnce(&mut Recorder) -> R) -> Option<R> {
    let mut slot = ACTIVE.lock().unwrap_or_else(|e| e.into_inner());
    slot.as_mut().map(f)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureConfig {
    /// Emit a human-readable line per captured call. Diagnostics only; never
    /// affects log content.
    pub trace: bool,
}

pub struct CaptureSession {
    redirector: Option<Box<dyn Redirector>>,
}

impl core::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("active", &self.redirector.is_some())
            .finish()
    }
}

impl CaptureSession {
    /// Begin a capture session for a loaded component module.
    #[cfg(windows)]
    pub fn begin(
        module: &crate::module::ComModule,
        config: CaptureConfig,
    ) -> Result<Self, CaptureError> {
        let redirector = crate::iat::ImportTableRedirector::for_module(module);
        Self::begin_with(Box::new(redirector), config)
    }

    #[cfg(not(windows))]
    pub fn begin(
        _module: &crate::module::ComModule,
        _config: CaptureConfig,
    ) -> Result<Self, CaptureError> {
        Err(CaptureError::NotSupported)
    }

    /// Begin a capture session over an explicit redirection backend.
    pub fn begin_with(
        mut redirector: Box<dyn Redirector>,
        config: CaptureConfig,
    ) -> Result<Self, CaptureError> {
        {
            let mut slot = ACTIVE.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_some() {
                return Err(CaptureError::ReentrantCapture);
            }
            *slot = Some(Recorder::new(config.trace));
        }

        if let Err(err) = redirector.install() {
            // The backend already rolled back its partial work; release the
            // slot so a later session can start.
            ACTIVE.lock().unwrap_or_else(|e| e.into_inner()).take();
            return Err(err);
        }

        Ok(Self {
            redirector: Some(redirector),
        })
    }

    /// End the session: restore original call targets and return the log.
    ///
    /// Safe to call after the component's registration call failed — the
    /// partial log is still delivered. A teardown failure is fatal (the
    /// process may have a dangling redirection) and takes precedence over the
    /// log.
    pub fn finish(mut self) -> Result<RegistrationLog, CaptureError> {
        let removal = match self.redirector.take() {
            Some(mut redirector) => redirector.remove(),
            None => Ok(()),
        };
        let recorder = ACTIVE.lock().unwrap_or_else(|e| e.into_inner()).take();
        removal?;
        Ok(recorder.map(Recorder::into_log).unwrap_or_default())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // A dropped-but-unfinished session (driver panic, early return) must
        // not leave live redirections or a claimed slot behind.
        if let Some(mut redirector) = self.redirector.take() {
            if let Err(err) = redirector.remove() {
                warn!(error = %err, "hook teardown failed during session drop");
            }
            ACTIVE.lock().unwrap_or_else(|e| e.into_inner()).take();
        }
    }
}

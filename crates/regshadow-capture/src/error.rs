use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("registration capture is not supported on this OS")]
    NotSupported,

    #[error("a capture session is already active in this process")]
    ReentrantCapture,

    #[error("failed to redirect '{symbol}' (os error {code})")]
    HookInstall { symbol: &'static str, code: u32 },

    #[error("failed to restore '{symbol}' (os error {code})")]
    HookTeardown { symbol: &'static str, code: u32 },

    #[error("failed to load module {path} (os error {code})")]
    ModuleLoad { path: PathBuf, code: u32 },

    #[error("module does not export '{symbol}'")]
    EntryPointMissing { symbol: &'static str },
}

impl CaptureError {
    /// Session-integrity violations are fatal for the whole run; everything
    /// else is fatal only for the file being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::ReentrantCapture | CaptureError::HookTeardown { .. }
        )
    }
}

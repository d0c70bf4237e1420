//! Component module loading and its register/unregister entry points.

#[cfg(windows)]
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::CaptureError;

pub const REGISTER_ENTRY_POINT: &str = "DllRegisterServer";
pub const UNREGISTER_ENTRY_POINT: &str = "DllUnregisterServer";

/// A loaded component module. The module stays loaded for the lifetime of
/// this value and is freed on drop.
pub struct ComModule {
    path: PathBuf,
    #[cfg(windows)]
    handle: windows_sys::Win32::Foundation::HMODULE,
}

impl ComModule {
    /// Load the component at `path`.
    #[cfg(windows)]
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        use windows_sys::Win32::Foundation::GetLastError;
        use windows_sys::Win32::System::LibraryLoader::LoadLibraryW;

        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        // SAFETY: `wide` is a NUL-terminated UTF-16 path that outlives the call.
        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        if handle.is_null() {
            return Err(CaptureError::ModuleLoad {
                path: path.to_path_buf(),
                code: unsafe { GetLastError() },
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            handle,
        })
    }

    #[cfg(not(windows))]
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let _ = path;
        Err(CaptureError::NotSupported)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(windows)]
    pub(crate) fn base_address(&self) -> *const u8 {
        self.handle as *const u8
    }

    /// Invoke the component's register entry point. Returns the raw status
    /// code; zero means success.
    pub fn register(&self) -> Result<i32, CaptureError> {
        self.invoke(REGISTER_ENTRY_POINT)
    }

    /// Invoke the component's unregister entry point.
    pub fn unregister(&self) -> Result<i32, CaptureError> {
        self.invoke(UNREGISTER_ENTRY_POINT)
    }

    #[cfg(windows)]
    fn invoke(&self, symbol: &'static str) -> Result<i32, CaptureError> {
        use windows_sys::Win32::System::LibraryLoader::GetProcAddress;

        let name = [symbol.as_bytes(), b"\0"].concat();
        // SAFETY: `name` is NUL-terminated and the module handle is live.
        let proc = unsafe { GetProcAddress(self.handle, name.as_ptr()) }
            .ok_or(CaptureError::EntryPointMissing { symbol })?;
        // SAFETY: both entry points are documented zero-argument stdcall
        // routines returning an HRESULT.
        let entry: unsafe extern "system" fn() -> i32 =
            unsafe { std::mem::transmute(proc) };
        Ok(unsafe { entry() })
    }

    #[cfg(not(windows))]
    fn invoke(&self, _symbol: &'static str) -> Result<i32, CaptureError> {
        Err(CaptureError::NotSupported)
    }
}

#[cfg(windows)]
impl Drop for ComModule {
    fn drop(&mut self) {
        use windows_sys::Win32::System::LibraryLoader::FreeLibrary;
        // SAFETY: the handle came from LoadLibraryW and is freed exactly once.
        unsafe {
            FreeLibrary(self.handle);
        }
    }
}

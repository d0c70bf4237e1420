//! Assembly version resolution, including the directives that read a
//! module's embedded version resource.

use std::path::Path;

use anyhow::Result;
use regshadow_manifest::AssemblyVersion;
use tracing::warn;

/// How the assembly version should be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSpec {
    Literal(AssemblyVersion),
    /// PRODUCTVERSION from the fixed-info block.
    Product { strip_build: bool },
    /// FILEVERSION from the fixed-info block.
    File { strip_build: bool },
}

impl VersionSpec {
    pub fn parse(value: &str) -> Result<Self> {
        let lowered = value.to_ascii_lowercase();
        let spec = match lowered.as_str() {
            "productversion" => VersionSpec::Product { strip_build: false },
            "productversion*" => VersionSpec::Product { strip_build: true },
            "fileversion" => VersionSpec::File { strip_build: false },
            "fileversion*" => VersionSpec::File { strip_build: true },
            _ => VersionSpec::Literal(value.parse::<AssemblyVersion>()?),
        };
        Ok(spec)
    }

    /// Resolve against a module. Directives that cannot be satisfied fall
    /// back to the default version, with a report.
    pub fn resolve(&self, module: &Path) -> AssemblyVersion {
        let (directive, strip_build) = match *self {
            VersionSpec::Literal(version) => return version,
            VersionSpec::Product { strip_build } => (Resource::Product, strip_build),
            VersionSpec::File { strip_build } => (Resource::File, strip_build),
        };
        match fixed_version(module, directive) {
            Some(version) if strip_build => version.without_build(),
            Some(version) => version,
            None => {
                warn!(
                    module = %module.display(),
                    "no version resource; using {}",
                    AssemblyVersion::DEFAULT
                );
                AssemblyVersion::DEFAULT
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Resource {
    Product,
    File,
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn fixed_version(module: &Path, which: Resource) -> Option<AssemblyVersion> {
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{
        GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW, VS_FIXEDFILEINFO,
    };

    let wide: Vec<u16> = module
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let root: Vec<u16> = "\\".encode_utf16().chain(std::iter::once(0)).collect();

    // SAFETY: all buffers are NUL-terminated and live across the calls; the
    // fixed-info pointer returned by VerQueryValueW points into `data`.
    unsafe {
        let mut handle = 0_u32;
        let size = GetFileVersionInfoSizeW(wide.as_ptr(), &mut handle);
        if size == 0 {
            return None;
        }
        let mut data = vec![0_u8; size as usize];
        if GetFileVersionInfoW(wide.as_ptr(), 0, size, data.as_mut_ptr().cast()) == 0 {
            return None;
        }
        let mut info: *mut VS_FIXEDFILEINFO = std::ptr::null_mut();
        let mut len = 0_u32;
        if VerQueryValueW(
            data.as_ptr().cast(),
            root.as_ptr(),
            std::ptr::addr_of_mut!(info).cast(),
            &mut len,
        ) == 0
            || info.is_null()
        {
            return None;
        }
        let (ms, ls) = match which {
            Resource::Product => ((*info).dwProductVersionMS, (*info).dwProductVersionLS),
            Resource::File => ((*info).dwFileVersionMS, (*info).dwFileVersionLS),
        };
        Some(AssemblyVersion::from_parts(
            (ms >> 16) as u16,
            (ms & 0xffff) as u16,
            (ls >> 16) as u16,
            (ls & 0xffff) as u16,
        ))
    }
}

#[cfg(not(windows))]
fn fixed_version(_module: &Path, _which: Resource) -> Option<AssemblyVersion> {
    None
}

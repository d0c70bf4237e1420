//! Import-table redirection for a loaded module.
//!
//! The registration surface a component can reach is its own import address
//! table, so redirection is a per-slot pointer swap there: find the advapi32
//! (or registry api-set) import descriptors, match the fixed symbol set by
//! name, and swap each resolved address for the matching hook. Originals are
//! saved per slot and restored exactly on removal. A failure mid-install
//! rolls back every slot already patched before the error is returned.
#![cfg(windows)]

use std::ffi::CStr;

use tracing::{debug, warn};
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::System::Diagnostics::Debug::IMAGE_DIRECTORY_ENTRY_IMPORT;
use windows_sys::Win32::System::Memory::{VirtualProtect, PAGE_PROTECTION_FLAGS, PAGE_READWRITE};
use windows_sys::Win32::System::SystemServices::{
    IMAGE_DOS_HEADER, IMAGE_DOS_SIGNATURE, IMAGE_IMPORT_BY_NAME, IMAGE_IMPORT_DESCRIPTOR,
    IMAGE_NT_SIGNATURE,
};

#[cfg(target_pointer_width = "64")]
use windows_sys::Win32::System::Diagnostics::Debug::IMAGE_NT_HEADERS64 as ImageNtHeaders;
#[cfg(target_pointer_width = "32")]
use windows_sys::Win32::System::Diagnostics::Debug::IMAGE_NT_HEADERS32 as ImageNtHeaders;

use crate::error::CaptureError;
use crate::hooks;
use crate::module::ComModule;
use crate::redirect::Redirector;

/// Thunk entries are pointer-sized; the high bit marks an ordinal import.
const ORDINAL_FLAG: usize = 1 << (usize::BITS - 1);

struct PatchSlot {
    slot: *mut usize,
    original: usize,
    symbol: &'static str,
}

pub struct ImportTableRedirector {
    base: *const u8,
    patched: Vec<PatchSlot>,
}

impl ImportTableRedirector {
    pub fn for_module(module: &ComModule) -> Self {
        Self {
            base: module.base_address(),
            patched: Vec::new(),
        }
    }

    /// True when `dll` is a module that exports the registration surface.
    fn is_registry_module(dll: &str) -> bool {
        dll.eq_ignore_ascii_case("advapi32.dll")
            || dll.to_ascii_lowercase().starts_with("api-ms-win-core-registry")
    }

    unsafe fn import_descriptors(
        &self,
    ) -> Result<Option<*const IMAGE_IMPORT_DESCRIPTOR>, CaptureError> {
        let dos = self.base as *const IMAGE_DOS_HEADER;
        if (*dos).e_magic != IMAGE_DOS_SIGNATURE {
            return Err(CaptureError::HookInstall {
                symbol: "<image>",
                code: 0,
            });
        }
        let nt = self.base.offset((*dos).e_lfanew as isize) as *const ImageNtHeaders;
        if (*nt).Signature != IMAGE_NT_SIGNATURE {
            return Err(CaptureError::HookInstall {
                symbol: "<image>",
                code: 0,
            });
        }
        let dir = (*nt).OptionalHeader.DataDirectory[IMAGE_DIRECTORY_ENTRY_IMPORT as usize];
        if dir.VirtualAddress == 0 || dir.Size == 0 {
            return Ok(None);
        }
        Ok(Some(
            self.base.add(dir.VirtualAddress as usize) as *const IMAGE_IMPORT_DESCRIPTOR
        ))
    }

    unsafe fn patch_descriptor(
        &mut self,
        descriptor: *const IMAGE_IMPORT_DESCRIPTOR,
        table: &[(&'static str, usize)],
    ) -> Result<(), CaptureError> {
        let names_rva = (*descriptor).Anonymous.OriginalFirstThunk;
        let addrs_rva = (*descriptor).FirstThunk;
        if names_rva == 0 || addrs_rva == 0 {
            return Ok(());
        }

        let mut name_thunk = self.base.add(names_rva as usize) as *const usize;
        let mut addr_thunk = self.base.add(addrs_rva as usize) as *mut usize;

        while *name_thunk != 0 {
            if *name_thunk & ORDINAL_FLAG == 0 {
                let import =
                    self.base.add(*name_thunk) as *const IMAGE_IMPORT_BY_NAME;
                let name = CStr::from_ptr((*import).Name.as_ptr().cast());
                if let Some(&(symbol, hook)) = table
                    .iter()
                    .find(|(symbol, _)| name.to_bytes() == symbol.as_bytes())
                {
                    let original = *addr_thunk;
                    write_slot(addr_thunk, hook, symbol, false)?;
                    debug!(symbol, "redirected import entry");
                    self.patched.push(PatchSlot {
                        slot: addr_thunk,
                        original,
                        symbol,
                    });
                }
            }
            name_thunk = name_thunk.add(1);
            addr_thunk = addr_thunk.add(1);
        }
        Ok(())
    }

    fn rollback(&mut self) {
        for patch in self.patched.drain(..).rev() {
            // Best effort: a slot we managed to patch is writable, so the
            // restore is expected to succeed.
            // SAFETY: `slot` still points into the live module's IAT.
            if let Err(err) = unsafe { write_slot(patch.slot, patch.original, patch.symbol, true) }
            {
                warn!(error = %err, "rollback of a redirected entry failed");
            }
        }
    }
}

impl Redirector for ImportTableRedirector {
    fn install(&mut self) -> Result<(), CaptureError> {
        let table = hooks::hook_table();
        // SAFETY: `base` is the base address of a module kept loaded by the
        // ComModule that produced this redirector.
        let result = unsafe {
            let Some(mut descriptor) = self.import_descriptors()? else {
                return Ok(());
            };
            loop {
                if (*descriptor).Name == 0 {
                    break Ok(());
                }
                let dll = CStr::from_ptr(self.base.add((*descriptor).Name as usize).cast());
                if Self::is_registry_module(&dll.to_string_lossy()) {
                    if let Err(err) = self.patch_descriptor(descriptor, &table) {
                        break Err(err);
                    }
                }
                descriptor = descriptor.add(1);
            }
        };
        if result.is_err() {
            self.rollback();
        }
        result
    }

    fn remove(&mut self) -> Result<(), CaptureError> {
        let mut failure = None;
        for patch in self.patched.drain(..).rev() {
            // SAFETY: the module outlives the session; slots are the same
            // addresses patched during install.
            if let Err(err) = unsafe { write_slot(patch.slot, patch.original, patch.symbol, true) }
            {
                // Keep restoring the remaining slots; report the first failure.
                warn!(symbol = patch.symbol, "failed to restore import entry");
                failure.get_or_insert(err);
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Swap one IAT slot under a transient protection change.
unsafe fn write_slot(
    slot: *mut usize,
    value: usize,
    symbol: &'static str,
    teardown: bool,
) -> Result<(), CaptureError> {
    let fail = |code: u32| {
        if teardown {
            CaptureError::HookTeardown { symbol, code }
        } else {
            CaptureError::HookInstall { symbol, code }
        }
    };

    let mut previous: PAGE_PROTECTION_FLAGS = 0;
    if VirtualProtect(
        slot.cast(),
        std::mem::size_of::<usize>(),
        PAGE_READWRITE,
        &mut previous,
    ) == 0
    {
        return Err(fail(GetLastError()));
    }

    slot.write_volatile(value);

    let mut scratch: PAGE_PROTECTION_FLAGS = 0;
    if VirtualProtect(slot.cast(), std::mem::size_of::<usize>(), previous, &mut scratch) == 0 {
        // The swap itself took effect; a failed protection restore leaves the
        // page writable but every target correct.
        warn!(symbol, "could not restore page protection on IAT slot");
    }
    Ok(())
}

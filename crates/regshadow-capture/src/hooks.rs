//! Replacement entry points for the fixed registration-store surface.
//!
//! Each hook records the call against the active session's recorder and
//! returns a synthesized success to the component without touching the real
//! store. Handles given out are the recorder's synthesized handles; the
//! component cannot tell them apart from real ones across this surface.
#![cfg(windows)]

use core::ffi::c_void;

use regshadow_common::{
    ValueKind, ROOT_CLASSES, ROOT_CURRENT_USER, ROOT_LOCAL_MACHINE, ROOT_USERS,
};
use windows_sys::core::{PCSTR, PCWSTR};
use windows_sys::Win32::Foundation::ERROR_SUCCESS;
use windows_sys::Win32::System::Registry::{
    HKEY, HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS,
    REG_CREATED_NEW_KEY,
};

use crate::recorder::KeyRef;
use crate::session;

/// Symbol names and replacement addresses for the import-table redirector.
pub(crate) fn hook_table() -> Vec<(&'static str, usize)> {
    vec![
        ("RegCreateKeyExW", shadow_reg_create_key_ex_w as usize),
        ("RegCreateKeyExA", shadow_reg_create_key_ex_a as usize),
        ("RegCreateKeyW", shadow_reg_create_key_w as usize),
        ("RegOpenKeyExW", shadow_reg_open_key_ex_w as usize),
        ("RegOpenKeyExA", shadow_reg_open_key_ex_a as usize),
        ("RegOpenKeyW", shadow_reg_open_key_w as usize),
        ("RegSetValueExW", shadow_reg_set_value_ex_w as usize),
        ("RegSetValueExA", shadow_reg_set_value_ex_a as usize),
        ("RegSetValueW", shadow_reg_set_value_w as usize),
        ("RegDeleteKeyW", shadow_reg_delete_key_w as usize),
        ("RegDeleteKeyA", shadow_reg_delete_key_a as usize),
        ("RegCloseKey", shadow_reg_close_key as usize),
    ]
}

fn key_ref(hkey: HKEY) -> KeyRef {
    let h = hkey as usize;
    if h == HKEY_CLASSES_ROOT as usize {
        KeyRef::Root(ROOT_CLASSES)
    } else if h == HKEY_CURRENT_USER as usize {
        KeyRef::Root(ROOT_CURRENT_USER)
    } else if h == HKEY_LOCAL_MACHINE as usize {
        KeyRef::Root(ROOT_LOCAL_MACHINE)
    } else if h == HKEY_USERS as usize {
        KeyRef::Root(ROOT_USERS)
    } else {
        KeyRef::Handle(h)
    }
}

unsafe fn read_wide(ptr: PCWSTR) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
}

unsafe fn read_ansi(ptr: PCSTR) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    let bytes = std::slice::from_raw_parts(ptr, len);
    bytes.iter().map(|&b| b as char).collect()
}

fn utf16_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|u| u.to_le_bytes())
        .collect()
}

/// Widen an ANSI string payload to UTF-16LE so the log carries one encoding.
/// Byte values map directly to code units, which also preserves the NUL
/// separators of multi-string payloads.
fn widen_payload(kind: ValueKind, data: &[u8]) -> Vec<u8> {
    match kind {
        ValueKind::String | ValueKind::ExpandString | ValueKind::MultiString => data
            .iter()
            .flat_map(|&b| (b as u16).to_le_bytes())
            .collect(),
        _ => data.to_vec(),
    }
}

unsafe fn data_slice<'a>(data: *const u8, len: u32) -> &'a [u8] {
    if data.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(data, len as usize)
    }
}

unsafe fn give_handle(phkresult: *mut HKEY, handle: usize) {
    if !phkresult.is_null() {
        *phkresult = handle as HKEY;
    }
}

pub(crate) unsafe extern "system" fn shadow_reg_create_key_ex_w(
    hkey: HKEY,
    lpsubkey: PCWSTR,
    _reserved: u32,
    _lpclass: PCWSTR,
    _dwoptions: u32,
    _samdesired: u32,
    _lpsecurityattributes: *const c_void,
    phkresult: *mut HKEY,
    lpdwdisposition: *mut u32,
) -> u32 {
    let sub = read_wide(lpsubkey);
    let handle = session::with_active(|rec| rec.key_create(key_ref(hkey), &sub)).unwrap_or(0);
    give_handle(phkresult, handle);
    if !lpdwdisposition.is_null() {
        *lpdwdisposition = REG_CREATED_NEW_KEY;
    }
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_create_key_ex_a(
    hkey: HKEY,
    lpsubkey: PCSTR,
    _reserved: u32,
    _lpclass: PCSTR,
    _dwoptions: u32,
    _samdesired: u32,
    _lpsecurityattributes: *const c_void,
    phkresult: *mut HKEY,
    lpdwdisposition: *mut u32,
) -> u32 {
    let sub = read_ansi(lpsubkey);
    let handle = session::with_active(|rec| rec.key_create(key_ref(hkey), &sub)).unwrap_or(0);
    give_handle(phkresult, handle);
    if !lpdwdisposition.is_null() {
        *lpdwdisposition = REG_CREATED_NEW_KEY;
    }
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_create_key_w(
    hkey: HKEY,
    lpsubkey: PCWSTR,
    phkresult: *mut HKEY,
) -> u32 {
    let sub = read_wide(lpsubkey);
    let handle = session::with_active(|rec| rec.key_create(key_ref(hkey), &sub)).unwrap_or(0);
    give_handle(phkresult, handle);
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_open_key_ex_w(
    hkey: HKEY,
    lpsubkey: PCWSTR,
    _uloptions: u32,
    _samdesired: u32,
    phkresult: *mut HKEY,
) -> u32 {
    let sub = read_wide(lpsubkey);
    let handle = session::with_active(|rec| rec.key_open(key_ref(hkey), &sub)).unwrap_or(0);
    give_handle(phkresult, handle);
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_open_key_ex_a(
    hkey: HKEY,
    lpsubkey: PCSTR,
    _uloptions: u32,
    _samdesired: u32,
    phkresult: *mut HKEY,
) -> u32 {
    let sub = read_ansi(lpsubkey);
    let handle = session::with_active(|rec| rec.key_open(key_ref(hkey), &sub)).unwrap_or(0);
    give_handle(phkresult, handle);
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_open_key_w(
    hkey: HKEY,
    lpsubkey: PCWSTR,
    phkresult: *mut HKEY,
) -> u32 {
    let sub = read_wide(lpsubkey);
    let handle = session::with_active(|rec| rec.key_open(key_ref(hkey), &sub)).unwrap_or(0);
    give_handle(phkresult, handle);
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_set_value_ex_w(
    hkey: HKEY,
    lpvaluename: PCWSTR,
    _reserved: u32,
    dwtype: u32,
    lpdata: *const u8,
    cbdata: u32,
) -> u32 {
    let name = read_wide(lpvaluename);
    let value_name = (!name.is_empty()).then_some(name);
    let data = data_slice(lpdata, cbdata);
    session::with_active(|rec| {
        rec.set_value(
            key_ref(hkey),
            value_name.as_deref(),
            ValueKind::from_raw(dwtype),
            data,
        );
    });
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_set_value_ex_a(
    hkey: HKEY,
    lpvaluename: PCSTR,
    _reserved: u32,
    dwtype: u32,
    lpdata: *const u8,
    cbdata: u32,
) -> u32 {
    let name = read_ansi(lpvaluename);
    let value_name = (!name.is_empty()).then_some(name);
    let kind = ValueKind::from_raw(dwtype);
    let data = widen_payload(kind, data_slice(lpdata, cbdata));
    session::with_active(|rec| {
        rec.set_value(key_ref(hkey), value_name.as_deref(), kind, &data);
    });
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_set_value_w(
    hkey: HKEY,
    lpsubkey: PCWSTR,
    _dwtype: u32,
    lpdata: PCWSTR,
    _cbdata: u32,
) -> u32 {
    let sub = read_wide(lpsubkey);
    let data = utf16_bytes(&read_wide(lpdata));
    session::with_active(|rec| rec.set_subkey_default(key_ref(hkey), &sub, &data));
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_delete_key_w(
    hkey: HKEY,
    lpsubkey: PCWSTR,
) -> u32 {
    let sub = read_wide(lpsubkey);
    session::with_active(|rec| rec.key_delete(key_ref(hkey), &sub));
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_delete_key_a(
    hkey: HKEY,
    lpsubkey: PCSTR,
) -> u32 {
    let sub = read_ansi(lpsubkey);
    session::with_active(|rec| rec.key_delete(key_ref(hkey), &sub));
    ERROR_SUCCESS
}

pub(crate) unsafe extern "system" fn shadow_reg_close_key(hkey: HKEY) -> u32 {
    session::with_active(|rec| rec.key_close(key_ref(hkey)));
    ERROR_SUCCESS
}

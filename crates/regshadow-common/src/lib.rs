//! Shared data contract between the capture engine and the manifest builder.
//!
//! A capture session produces a [`RegistrationLog`]: the ordered sequence of
//! registration-store calls a component made while its register entry point
//! ran. Order is semantically significant — later calls on the same key or
//! value supersede earlier ones, mirroring last-write-wins store semantics.

use serde::Serialize;

/// Logical operation of one intercepted registration-store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistryOp {
    KeyCreate,
    KeySetValue,
    KeyClose,
    KeyDelete,
}

/// Registry value type of a [`RegistryOp::KeySetValue`] call.
///
/// Unknown raw types pass through as [`ValueKind::Other`]; the engine does not
/// interpret them and the payload stays an opaque byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueKind {
    None,
    String,
    ExpandString,
    Binary,
    Dword,
    MultiString,
    Qword,
    Other(u32),
}

impl ValueKind {
    /// Map a raw `REG_*` type code to a kind.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ValueKind::None,
            1 => ValueKind::String,
            2 => ValueKind::ExpandString,
            3 => ValueKind::Binary,
            4 => ValueKind::Dword,
            7 => ValueKind::MultiString,
            11 => ValueKind::Qword,
            other => ValueKind::Other(other),
        }
    }
}

/// One intercepted registration-store call. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationCall {
    pub op: RegistryOp,
    /// Normalized key path, see [`normalize_key_path`].
    pub key_path: String,
    /// Value name for set calls; `None` addresses the key's default value.
    pub value_name: Option<String>,
    pub value_kind: ValueKind,
    pub data: Vec<u8>,
}

impl RegistrationCall {
    /// Decode the payload as a UTF-16LE string for `String`/`ExpandString`
    /// values. Trailing NULs are stripped.
    pub fn string_data(&self) -> Option<String> {
        match self.value_kind {
            ValueKind::String | ValueKind::ExpandString => {}
            _ => return None,
        }
        let units: Vec<u16> = self
            .data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let end = units
            .iter()
            .position(|&u| u == 0)
            .unwrap_or(units.len());
        Some(String::from_utf16_lossy(&units[..end]))
    }

    /// Decode the payload as a little-endian DWORD.
    pub fn dword_data(&self) -> Option<u32> {
        if self.value_kind != ValueKind::Dword || self.data.len() < 4 {
            return None;
        }
        Some(u32::from_le_bytes([
            self.data[0],
            self.data[1],
            self.data[2],
            self.data[3],
        ]))
    }
}

/// Ordered, append-only sequence of captured calls for one capture session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationLog {
    calls: Vec<RegistrationCall>,
}

impl RegistrationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: RegistrationCall) {
        self.calls.push(call);
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistrationCall> {
        self.calls.iter()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn into_vec(self) -> Vec<RegistrationCall> {
        self.calls
    }
}

impl<'a> IntoIterator for &'a RegistrationLog {
    type Item = &'a RegistrationCall;
    type IntoIter = std::slice::Iter<'a, RegistrationCall>;

    fn into_iter(self) -> Self::IntoIter {
        self.calls.iter()
    }
}

/// Canonical short names for the predefined root stores.
pub const ROOT_CLASSES: &str = "HKCR";
pub const ROOT_CURRENT_USER: &str = "HKCU";
pub const ROOT_LOCAL_MACHINE: &str = "HKLM";
pub const ROOT_USERS: &str = "HKU";

/// Pseudo-root for calls against handles the engine never issued.
pub const ROOT_EXTERNAL: &str = "<external>";

/// Normalize a captured key path.
///
/// Separators become single backslashes, leading/trailing separators are
/// trimmed, and a long-form root store prefix is mapped to its short name.
/// The casing of the remaining components is preserved — the store is
/// case-insensitive, so consumers must compare components case-insensitively,
/// but manifest attributes keep the component's own spelling.
pub fn normalize_key_path(raw: &str) -> String {
    let mut parts = raw
        .split(['\\', '/'])
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();

    if let Some(first) = parts.first() {
        let short = match () {
            _ if first.eq_ignore_ascii_case("HKEY_CLASSES_ROOT") => Some(ROOT_CLASSES),
            _ if first.eq_ignore_ascii_case("HKEY_CURRENT_USER") => Some(ROOT_CURRENT_USER),
            _ if first.eq_ignore_ascii_case("HKEY_LOCAL_MACHINE") => Some(ROOT_LOCAL_MACHINE),
            _ if first.eq_ignore_ascii_case("HKEY_USERS") => Some(ROOT_USERS),
            _ if first.eq_ignore_ascii_case(ROOT_CLASSES) => Some(ROOT_CLASSES),
            _ if first.eq_ignore_ascii_case(ROOT_CURRENT_USER) => Some(ROOT_CURRENT_USER),
            _ if first.eq_ignore_ascii_case(ROOT_LOCAL_MACHINE) => Some(ROOT_LOCAL_MACHINE),
            _ if first.eq_ignore_ascii_case(ROOT_USERS) => Some(ROOT_USERS),
            _ => None,
        };
        if let Some(short) = short {
            parts[0] = short;
        }
    }

    parts.join("\\")
}

/// Join a parent path and a sub path, normalizing the result.
pub fn join_key_path(parent: &str, sub: &str) -> String {
    if sub.is_empty() {
        return parent.to_string();
    }
    normalize_key_path(&format!("{parent}\\{sub}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_long_roots_to_short_names() {
        assert_eq!(normalize_key_path("HKEY_CLASSES_ROOT\\CLSID"), "HKCR\\CLSID");
        assert_eq!(
            normalize_key_path("hkey_local_machine\\Software\\Classes"),
            "HKLM\\Software\\Classes"
        );
    }

    #[test]
    fn normalize_collapses_separators_and_trims_edges() {
        assert_eq!(
            normalize_key_path("\\HKCR\\\\CLSID\\{X}\\"),
            "HKCR\\CLSID\\{X}"
        );
        assert_eq!(normalize_key_path("HKCR/CLSID/{X}"), "HKCR\\CLSID\\{X}");
    }

    #[test]
    fn normalize_preserves_component_casing() {
        assert_eq!(
            normalize_key_path("HKCR\\Foo.Bar\\CLSID"),
            "HKCR\\Foo.Bar\\CLSID"
        );
    }

    #[test]
    fn join_appends_and_normalizes() {
        assert_eq!(join_key_path("HKCR", "CLSID\\{X}"), "HKCR\\CLSID\\{X}");
        assert_eq!(join_key_path("HKCR\\CLSID", ""), "HKCR\\CLSID");
    }

    #[test]
    fn string_data_decodes_utf16le_and_strips_nul() {
        let text: Vec<u8> = "Apartment\0"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let call = RegistrationCall {
            op: RegistryOp::KeySetValue,
            key_path: "HKCR\\X".into(),
            value_name: Some("ThreadingModel".into()),
            value_kind: ValueKind::String,
            data: text,
        };
        assert_eq!(call.string_data().as_deref(), Some("Apartment"));
    }

    #[test]
    fn dword_data_rejects_wrong_kind() {
        let call = RegistrationCall {
            op: RegistryOp::KeySetValue,
            key_path: "HKCR\\X".into(),
            value_name: None,
            value_kind: ValueKind::Binary,
            data: vec![1, 0, 0, 0],
        };
        assert_eq!(call.dword_data(), None);
    }

    #[test]
    fn value_kind_passes_unknown_types_through() {
        assert_eq!(ValueKind::from_raw(4), ValueKind::Dword);
        assert_eq!(ValueKind::from_raw(42), ValueKind::Other(42));
    }
}

//! Capture-side state for one session: the synthesized key-handle table and
//! the ordered call log.
//!
//! Every intercepted call resolves its key handle here, is appended to the
//! log, and gets a synthesized success result. Key opens only populate the
//! handle table — the call-log contract has no open operation, and an open
//! on its own carries no registration data.

use std::collections::HashMap;

use regshadow_common::{
    join_key_path, RegistrationCall, RegistrationLog, RegistryOp, ValueKind, ROOT_EXTERNAL,
};
use tracing::{info, warn};

/// First synthesized handle value. Well clear of the predefined root-store
/// handles (0x8000_0000..) in either pointer width.
const HANDLE_BASE: usize = 0x5348_0010;

/// A key reference as seen by a hooked call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRef {
    /// One of the predefined root stores, by short name.
    Root(&'static str),
    /// A handle value; resolved against the session's handle table.
    Handle(usize),
}

pub struct Recorder {
    log: RegistrationLog,
    handles: HashMap<usize, String>,
    next_handle: usize,
    trace: bool,
}

impl Recorder {
    pub fn new(trace: bool) -> Self {
        Self {
            log: RegistrationLog::new(),
            handles: HashMap::new(),
            next_handle: HANDLE_BASE,
            trace,
        }
    }

    fn resolve(&self, key: KeyRef) -> String {
        match key {
            KeyRef::Root(name) => name.to_string(),
            KeyRef::Handle(h) => match self.handles.get(&h) {
                Some(path) => path.clone(),
                None => {
                    warn!(handle = h, "call against a handle this session never issued");
                    ROOT_EXTERNAL.to_string()
                }
            },
        }
    }

    fn issue_handle(&mut self, path: String) -> usize {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(handle, path);
        handle
    }

    /// Key creation: logs `KeyCreate` and issues a handle for the new key.
    pub fn key_create(&mut self, parent: KeyRef, sub: &str) -> usize {
        let path = join_key_path(&self.resolve(parent), sub);
        if self.trace {
            info!(target: "regshadow::trace", "RegCreateKey({path})");
        }
        self.log.push(RegistrationCall {
            op: RegistryOp::KeyCreate,
            key_path: path.clone(),
            value_name: None,
            value_kind: ValueKind::None,
            data: Vec::new(),
        });
        self.issue_handle(path)
    }

    /// Key open: issues a handle without logging.
    pub fn key_open(&mut self, parent: KeyRef, sub: &str) -> usize {
        let path = join_key_path(&self.resolve(parent), sub);
        if self.trace {
            info!(target: "regshadow::trace", "RegOpenKey({path})");
        }
        self.issue_handle(path)
    }

    pub fn set_value(
        &mut self,
        key: KeyRef,
        value_name: Option<&str>,
        value_kind: ValueKind,
        data: &[u8],
    ) {
        let path = self.resolve(key);
        if self.trace {
            info!(
                target: "regshadow::trace",
                "RegSetValue({path}, {}, {value_kind:?}, {} bytes)",
                value_name.unwrap_or("<default>"),
                data.len()
            );
        }
        self.log.push(RegistrationCall {
            op: RegistryOp::KeySetValue,
            key_path: path,
            value_name: value_name.map(str::to_string),
            value_kind,
            data: data.to_vec(),
        });
    }

    /// Legacy-style set of a subkey's default string value.
    pub fn set_subkey_default(&mut self, parent: KeyRef, sub: &str, data: &[u8]) {
        let path = join_key_path(&self.resolve(parent), sub);
        if self.trace {
            info!(target: "regshadow::trace", "RegSetValue({path}, <default>, String, {} bytes)", data.len());
        }
        self.log.push(RegistrationCall {
            op: RegistryOp::KeySetValue,
            key_path: path,
            value_name: None,
            value_kind: ValueKind::String,
            data: data.to_vec(),
        });
    }

    /// Logs `KeyClose` and retires the handle.
    pub fn key_close(&mut self, key: KeyRef) {
        let path = self.resolve(key);
        if self.trace {
            info!(target: "regshadow::trace", "RegCloseKey({path})");
        }
        self.log.push(RegistrationCall {
            op: RegistryOp::KeyClose,
            key_path: path,
            value_name: None,
            value_kind: ValueKind::None,
            data: Vec::new(),
        });
        if let KeyRef::Handle(h) = key {
            self.handles.remove(&h);
        }
    }

    pub fn key_delete(&mut self, parent: KeyRef, sub: &str) {
        let path = join_key_path(&self.resolve(parent), sub);
        if self.trace {
            info!(target: "regshadow::trace", "RegDeleteKey({path})");
        }
        self.log.push(RegistrationCall {
            op: RegistryOp::KeyDelete,
            key_path: path,
            value_name: None,
            value_kind: ValueKind::None,
            data: Vec::new(),
        });
    }

    pub fn into_log(self) -> RegistrationLog {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regshadow_common::ROOT_CLASSES;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().chain([0]).flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn create_then_set_resolves_full_path() {
        let mut rec = Recorder::new(false);
        let clsid = rec.key_create(KeyRef::Root(ROOT_CLASSES), "CLSID\\{11111111-0000-0000-0000-000000000001}");
        let inproc = rec.key_create(KeyRef::Handle(clsid), "InprocServer32");
        rec.set_value(
            KeyRef::Handle(inproc),
            Some("ThreadingModel"),
            ValueKind::String,
            &utf16("Apartment"),
        );

        let log = rec.into_log();
        let calls = log.into_vec();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2].key_path,
            "HKCR\\CLSID\\{11111111-0000-0000-0000-000000000001}\\InprocServer32"
        );
        assert_eq!(calls[2].value_name.as_deref(), Some("ThreadingModel"));
        assert_eq!(calls[2].string_data().as_deref(), Some("Apartment"));
    }

    #[test]
    fn open_issues_handle_without_logging() {
        let mut rec = Recorder::new(false);
        let h = rec.key_open(KeyRef::Root(ROOT_CLASSES), "CLSID");
        rec.set_value(KeyRef::Handle(h), None, ValueKind::String, &utf16("x"));

        let calls = rec.into_log().into_vec();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, RegistryOp::KeySetValue);
        assert_eq!(calls[0].key_path, "HKCR\\CLSID");
    }

    #[test]
    fn close_retires_the_handle() {
        let mut rec = Recorder::new(false);
        let h = rec.key_create(KeyRef::Root(ROOT_CLASSES), "Foo.Bar");
        rec.key_close(KeyRef::Handle(h));
        rec.set_value(KeyRef::Handle(h), None, ValueKind::String, &utf16("late"));

        let calls = rec.into_log().into_vec();
        assert_eq!(calls[1].op, RegistryOp::KeyClose);
        assert_eq!(calls[1].key_path, "HKCR\\Foo.Bar");
        // A set after close lands under the external pseudo-root.
        assert_eq!(calls[2].key_path, ROOT_EXTERNAL);
    }

    #[test]
    fn unknown_handle_records_under_external_root() {
        let mut rec = Recorder::new(false);
        rec.set_value(KeyRef::Handle(0xdead), None, ValueKind::Dword, &[1, 0, 0, 0]);
        let calls = rec.into_log().into_vec();
        assert_eq!(calls[0].key_path, ROOT_EXTERNAL);
    }

    #[test]
    fn delete_logs_the_resolved_path() {
        let mut rec = Recorder::new(false);
        rec.key_delete(KeyRef::Root(ROOT_CLASSES), "CLSID\\{X}");
        let calls = rec.into_log().into_vec();
        assert_eq!(calls[0].op, RegistryOp::KeyDelete);
        assert_eq!(calls[0].key_path, "HKCR\\CLSID\\{X}");
    }

    #[test]
    fn handles_are_unique_and_clear_of_roots() {
        let mut rec = Recorder::new(false);
        let a = rec.key_create(KeyRef::Root(ROOT_CLASSES), "A");
        let b = rec.key_create(KeyRef::Root(ROOT_CLASSES), "B");
        assert_ne!(a, b);
        assert!(a >= HANDLE_BASE);
    }
}

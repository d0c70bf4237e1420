//! Folds an ordered registration call log into the manifest model.
//!
//! Routing is by key-path shape under the class-registration roots. An
//! identifier's entry is created on first sight and later calls merge into
//! it field by field, most recent call winning — the same last-write-wins
//! outcome the real store would produce. Calls whose path matches no
//! recognized shape are not errors; they are simply not representable in the
//! descriptor format and are skipped.

use std::path::Path;

use regshadow_common::{RegistrationCall, RegistrationLog, RegistryOp};
use tracing::debug;

use crate::digest::{DigestSet, FileDigests};
use crate::error::ManifestError;
use crate::model::{
    AssemblyIdentity, ComClassEntry, FileDeclaration, InterfaceEntry, ManifestModel, TypeLibEntry,
};

pub struct ManifestBuilder {
    model: ManifestModel,
}

impl ManifestBuilder {
    pub fn new(identity: AssemblyIdentity) -> Self {
        Self {
            model: ManifestModel {
                identity,
                files: Vec::new(),
                classes: Default::default(),
                interfaces: Default::default(),
                typelibs: Default::default(),
            },
        }
    }

    pub fn identity(&self) -> &AssemblyIdentity {
        &self.model.identity
    }

    /// Declare a contributing file, computing its content addressing.
    pub fn add_file(
        &mut self,
        path: &Path,
        algos: &DigestSet,
    ) -> Result<&FileDeclaration, ManifestError> {
        let digests = FileDigests::compute(path, algos)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.model.files.push(FileDeclaration { name, digests });
        Ok(self.model.files.last().expect("just pushed"))
    }

    /// Fold one file's call log into the model, in call order.
    pub fn apply_log(&mut self, file_name: &str, log: &RegistrationLog) {
        for call in log {
            match call.op {
                RegistryOp::KeyCreate | RegistryOp::KeySetValue => self.route(file_name, call),
                // Closes are handle bookkeeping; deletes are the component
                // resetting state it rewrites within the same log.
                RegistryOp::KeyClose | RegistryOp::KeyDelete => {}
            }
        }
    }

    /// Consume the builder; the model cannot be mutated afterwards.
    pub fn finalize(self) -> ManifestModel {
        self.model
    }

    fn route(&mut self, file_name: &str, call: &RegistrationCall) {
        let Some(segments) = classes_relative(&call.key_path) else {
            debug!(path = %call.key_path, "call outside class registration roots");
            return;
        };
        match segments.as_slice() {
            [root, guid, rest @ ..] if eq(root, "CLSID") && is_guid(guid) => {
                self.route_class(file_name, guid, rest, call);
            }
            [root, guid, rest @ ..] if eq(root, "Interface") && is_guid(guid) => {
                self.route_interface(guid, rest, call);
            }
            [root, guid, version, rest @ ..] if eq(root, "TypeLib") && is_guid(guid) => {
                self.route_typelib(file_name, guid, version, rest, call);
            }
            [progid, rest @ ..] if looks_like_progid(progid) => {
                self.route_progid(file_name, progid, rest, call);
            }
            _ => {
                debug!(path = %call.key_path, "no matching registration pattern");
            }
        }
    }

    fn class_entry(&mut self, file_name: &str, clsid: &str) -> &mut ComClassEntry {
        let clsid = canonical_guid(clsid);
        self.model
            .classes
            .entry(clsid.clone())
            .or_insert_with(|| ComClassEntry {
                clsid,
                file: file_name.to_string(),
                ..Default::default()
            })
    }

    fn route_class(&mut self, file_name: &str, guid: &str, rest: &[&str], call: &RegistrationCall) {
        let entry = self.class_entry(file_name, guid);
        match rest {
            [] => {
                if call.value_name.is_none() {
                    if let Some(text) = call.string_data() {
                        entry.description = Some(text);
                    }
                }
            }
            [sub] if eq(sub, "InprocServer32") => {
                let named = call.value_name.as_deref().unwrap_or("");
                if named.eq_ignore_ascii_case("ThreadingModel") {
                    if let Some(text) = call.string_data() {
                        entry.threading_model = Some(text);
                    }
                }
                // The default value is the server path; the manifest's file
                // declaration already carries it.
            }
            [sub] if eq(sub, "ProgID") => {
                if call.value_name.is_none() {
                    if let Some(text) = call.string_data() {
                        entry.progid = Some(text);
                    }
                }
            }
            [sub] if eq(sub, "TypeLib") => {
                if call.value_name.is_none() {
                    if let Some(text) = call.string_data() {
                        entry.tlbid = Some(canonical_guid(&text));
                    }
                }
            }
            _ => {}
        }
    }

    fn route_interface(&mut self, guid: &str, rest: &[&str], call: &RegistrationCall) {
        let iid = canonical_guid(guid);
        let entry = self
            .model
            .interfaces
            .entry(iid.clone())
            .or_insert_with(|| InterfaceEntry {
                iid,
                ..Default::default()
            });
        match rest {
            [] => {
                if call.value_name.is_none() {
                    if let Some(text) = call.string_data() {
                        entry.name = Some(text);
                    }
                }
            }
            [sub] if eq(sub, "ProxyStubClsid32") || eq(sub, "ProxyStubClsid") => {
                if call.value_name.is_none() {
                    if let Some(text) = call.string_data() {
                        entry.proxy_stub_clsid32 = Some(canonical_guid(&text));
                    }
                }
            }
            [sub] if eq(sub, "NumMethods") => {
                if call.value_name.is_none() {
                    let count = call
                        .string_data()
                        .or_else(|| call.dword_data().map(|d| d.to_string()));
                    if let Some(count) = count {
                        entry.num_methods = Some(count);
                    }
                }
            }
            [sub] if eq(sub, "TypeLib") => {
                if call.value_name.is_none() {
                    if let Some(text) = call.string_data() {
                        entry.tlbid = Some(canonical_guid(&text));
                    }
                }
            }
            _ => {}
        }
    }

    fn route_typelib(
        &mut self,
        file_name: &str,
        guid: &str,
        version: &str,
        rest: &[&str],
        call: &RegistrationCall,
    ) {
        let tlbid = canonical_guid(guid);
        let key = (tlbid.clone(), version.to_string());
        let entry = self
            .model
            .typelibs
            .entry(key)
            .or_insert_with(|| TypeLibEntry {
                tlbid,
                version: version.to_string(),
                file: file_name.to_string(),
                ..Default::default()
            });
        match rest {
            [sub] if eq(sub, "HELPDIR") => {
                if call.value_name.is_none() {
                    if let Some(text) = call.string_data() {
                        entry.helpdir = Some(text);
                    }
                }
            }
            [sub] if eq(sub, "FLAGS") => {
                if call.value_name.is_none() {
                    if let Some(text) = call.string_data() {
                        entry.flags = Some(text);
                    }
                }
            }
            // The version key's default value is a docstring and the nested
            // resource keys name on-disk paths; neither is representable.
            _ => {}
        }
    }

    fn route_progid(
        &mut self,
        file_name: &str,
        progid: &str,
        rest: &[&str],
        call: &RegistrationCall,
    ) {
        // `<ProgId>\CLSID` default names the class this progid activates.
        if let [sub] = rest {
            if eq(sub, "CLSID") && call.value_name.is_none() {
                if let Some(text) = call.string_data() {
                    if is_guid(text.trim()) {
                        let progid = progid.to_string();
                        self.class_entry(file_name, text.trim()).progid = Some(progid);
                    }
                }
            }
        }
    }
}

fn eq(segment: &str, name: &str) -> bool {
    segment.eq_ignore_ascii_case(name)
}

fn is_guid(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('{') && s.ends_with('}')
}

/// Canonical identifier spelling: braced, uppercase hex.
fn canonical_guid(s: &str) -> String {
    let trimmed = s.trim();
    let braced = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        format!("{{{trimmed}}}")
    };
    braced.to_ascii_uppercase()
}

fn looks_like_progid(segment: &str) -> bool {
    segment.contains('.') && !segment.starts_with('{')
}

/// Split a normalized key path into components relative to a class
/// registration root, or `None` when the path lives elsewhere.
fn classes_relative(path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = path.split('\\').collect();
    match segments.as_slice() {
        [root, rest @ ..] if eq(root, "HKCR") => Some(rest.to_vec()),
        [root, software, classes, rest @ ..]
            if (eq(root, "HKLM") || eq(root, "HKCU"))
                && eq(software, "Software")
                && eq(classes, "Classes") =>
        {
            Some(rest.to_vec())
        }
        _ => None,
    }
}

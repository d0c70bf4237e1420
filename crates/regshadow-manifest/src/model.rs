//! In-memory manifest model: one assembly identity, ordered file
//! declarations, and keyed class/interface/typelib tables.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::digest::FileDigests;
use crate::error::ManifestError;

/// Four-part assembly version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssemblyVersion(pub [u16; 4]);

impl AssemblyVersion {
    pub const DEFAULT: Self = Self([1, 0, 0, 0]);

    pub fn from_parts(major: u16, minor: u16, patch: u16, build: u16) -> Self {
        Self([major, minor, patch, build])
    }

    /// Same version with the build number zeroed.
    pub fn without_build(self) -> Self {
        Self([self.0[0], self.0[1], self.0[2], 0])
    }
}

impl Default for AssemblyVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl FromStr for AssemblyVersion {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ManifestError::InvalidVersion {
            value: s.to_string(),
        };
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 {
            return Err(invalid());
        }
        let mut out = [0_u16; 4];
        for (slot, part) in out.iter_mut().zip(&parts) {
            *slot = part.trim().parse().map_err(|_| invalid())?;
        }
        Ok(Self(out))
    }
}

/// Identity of the manifest under construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyIdentity {
    pub name: String,
    pub version: AssemblyVersion,
    /// Short architecture tag (`x86`, `amd64`, `arm64`) when requested.
    pub processor_architecture: Option<&'static str>,
}

impl AssemblyIdentity {
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        Self {
            name: name.into(),
            version,
            processor_architecture: None,
        }
    }

    pub fn with_architecture(mut self) -> Self {
        self.processor_architecture = Some(current_architecture());
        self
    }
}

/// Architecture tag for the running build, in manifest spelling.
pub fn current_architecture() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "amd64"
    } else if cfg!(target_arch = "x86") {
        "x86"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "unknown"
    }
}

/// One contributing file with its content addressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDeclaration {
    pub name: String,
    pub digests: FileDigests,
}

/// One activatable class, keyed by clsid within the assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComClassEntry {
    pub clsid: String,
    pub description: Option<String>,
    pub threading_model: Option<String>,
    pub progid: Option<String>,
    pub tlbid: Option<String>,
    /// File whose registration first declared this class.
    pub file: String,
}

/// One interface proxy/stub declaration, keyed by iid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceEntry {
    pub iid: String,
    pub name: Option<String>,
    pub proxy_stub_clsid32: Option<String>,
    pub num_methods: Option<String>,
    pub tlbid: Option<String>,
}

/// One type library declaration, keyed by tlbid plus version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeLibEntry {
    pub tlbid: String,
    pub version: String,
    pub helpdir: Option<String>,
    pub flags: Option<String>,
    /// File whose registration first declared this type library.
    pub file: String,
}

/// Completed, read-only model produced by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestModel {
    pub identity: AssemblyIdentity,
    pub files: Vec<FileDeclaration>,
    pub classes: BTreeMap<String, ComClassEntry>,
    pub interfaces: BTreeMap<String, InterfaceEntry>,
    pub typelibs: BTreeMap<(String, String), TypeLibEntry>,
}

/// A generated manifest another manifest can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyInfo {
    pub assembly_name: String,
    pub assembly_version: AssemblyVersion,
}

//! Deterministic rendering of a finalized model to the on-disk descriptor.
//!
//! Rendering is pure string assembly over already-sorted tables, so the same
//! model always produces the same bytes. Writes go to a sibling temp file
//! first and are promoted by rename; a failed write never leaves a partial
//! manifest at the destination.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::ManifestError;
use crate::model::{DependencyInfo, ManifestModel};

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";
const ASSEMBLY_OPEN: &str =
    "<assembly xmlns=\"urn:schemas-microsoft-com:asm.v1\" manifestVersion=\"1.0\">\n";

/// Render the assembly manifest for a finalized model.
pub fn render_assembly_manifest(model: &ManifestModel) -> String {
    let mut out = String::new();
    out.push_str(XML_HEADER);
    out.push_str(ASSEMBLY_OPEN);

    let identity = &model.identity;
    let _ = write!(
        out,
        "    <assemblyIdentity type=\"win32\" name=\"{}\" version=\"{}\"",
        escape(&identity.name),
        identity.version
    );
    if let Some(arch) = identity.processor_architecture {
        let _ = write!(out, " processorArchitecture=\"{arch}\"");
    }
    out.push_str("/>\n");

    for file in &model.files {
        let _ = write!(out, "    <file name=\"{}\"", escape(&file.name));
        if let Some(size) = file.digests.size {
            let _ = write!(out, " size=\"{size}\"");
        }
        if let Some(sha1) = &file.digests.sha1 {
            let _ = write!(out, " sha1=\"{sha1}\"");
        }
        if let Some(sha256) = &file.digests.sha256 {
            let _ = write!(out, " sha256=\"{sha256}\"");
        }

        let classes = model
            .classes
            .values()
            .filter(|c| c.file == file.name)
            .collect::<Vec<_>>();
        let typelibs = model
            .typelibs
            .values()
            .filter(|t| t.file == file.name)
            .collect::<Vec<_>>();

        if classes.is_empty() && typelibs.is_empty() {
            out.push_str("/>\n");
            continue;
        }
        out.push_str(">\n");

        for class in classes {
            let _ = write!(out, "        <comClass clsid=\"{}\"", escape(&class.clsid));
            if let Some(description) = &class.description {
                let _ = write!(out, " description=\"{}\"", escape(description));
            }
            if let Some(model_attr) = &class.threading_model {
                let _ = write!(out, " threadingModel=\"{}\"", escape(model_attr));
            }
            if let Some(progid) = &class.progid {
                let _ = write!(out, " progid=\"{}\"", escape(progid));
            }
            if let Some(tlbid) = &class.tlbid {
                let _ = write!(out, " tlbid=\"{}\"", escape(tlbid));
            }
            out.push_str("/>\n");
        }

        for typelib in typelibs {
            let _ = write!(
                out,
                "        <typelib tlbid=\"{}\" version=\"{}\"",
                escape(&typelib.tlbid),
                escape(&typelib.version)
            );
            if let Some(helpdir) = &typelib.helpdir {
                let _ = write!(out, " helpdir=\"{}\"", escape(helpdir));
            }
            if let Some(flags) = &typelib.flags {
                let _ = write!(out, " flags=\"{}\"", escape(flags));
            }
            out.push_str("/>\n");
        }

        out.push_str("    </file>\n");
    }

    // Class and typelib elements live under their declaring file; an entry
    // whose file was never declared cannot be activated and is dropped.
    for class in model.classes.values() {
        if !model.files.iter().any(|f| f.name == class.file) {
            warn!(clsid = %class.clsid, file = %class.file, "class entry has no file declaration");
        }
    }
    for typelib in model.typelibs.values() {
        if !model.files.iter().any(|f| f.name == typelib.file) {
            warn!(tlbid = %typelib.tlbid, file = %typelib.file, "typelib entry has no file declaration");
        }
    }

    for interface in model.interfaces.values() {
        let _ = write!(
            out,
            "    <comInterfaceExternalProxyStub iid=\"{}\"",
            escape(&interface.iid)
        );
        if let Some(name) = &interface.name {
            let _ = write!(out, " name=\"{}\"", escape(name));
        }
        if let Some(clsid) = &interface.proxy_stub_clsid32 {
            let _ = write!(out, " proxyStubClsid32=\"{}\"", escape(clsid));
        }
        if let Some(num_methods) = &interface.num_methods {
            let _ = write!(out, " numMethods=\"{}\"", escape(num_methods));
        }
        if let Some(tlbid) = &interface.tlbid {
            let _ = write!(out, " tlbid=\"{}\"", escape(tlbid));
        }
        out.push_str("/>\n");
    }

    out.push_str("</assembly>\n");
    out
}

/// Render a client manifest: dependency references only.
pub fn render_client_manifest(dependencies: &[DependencyInfo]) -> String {
    let mut out = String::new();
    out.push_str(XML_HEADER);
    out.push_str(ASSEMBLY_OPEN);
    for dependency in dependencies {
        out.push_str("    <dependency>\n");
        out.push_str("        <dependentAssembly>\n");
        let _ = write!(
            out,
            "            <assemblyIdentity type=\"win32\" name=\"{}\" version=\"{}\"/>\n",
            escape(&dependency.assembly_name),
            dependency.assembly_version
        );
        out.push_str("        </dependentAssembly>\n");
        out.push_str("    </dependency>\n");
    }
    out.push_str("</assembly>\n");
    out
}

pub fn write_assembly_manifest(model: &ManifestModel, path: &Path) -> Result<(), ManifestError> {
    write_atomic(path, &render_assembly_manifest(model))?;
    info!(path = %path.display(), "wrote assembly manifest");
    Ok(())
}

pub fn write_client_manifest(
    path: &Path,
    dependencies: &[DependencyInfo],
) -> Result<(), ManifestError> {
    write_atomic(path, &render_client_manifest(dependencies))?;
    info!(path = %path.display(), "wrote client manifest");
    Ok(())
}

fn write_atomic(path: &Path, content: &str) -> Result<(), ManifestError> {
    let failed = |source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };

    let temp_path = path.with_extension("manifest.tmp");
    fs::write(&temp_path, content).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        failed(e)
    })?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        failed(e)
    })
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_the_reserved_set() {
        assert_eq!(escape("a&b<c>d\"e'f"), "a&amp;b&lt;c&gt;d&quot;e&apos;f");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn client_manifest_lists_each_dependency_once() {
        use crate::model::AssemblyVersion;
        let deps = vec![
            DependencyInfo {
                assembly_name: "alpha.sxs".into(),
                assembly_version: AssemblyVersion::DEFAULT,
            },
            DependencyInfo {
                assembly_name: "beta.sxs".into(),
                assembly_version: "2.0.0.0".parse().unwrap(),
            },
        ];
        let xml = render_client_manifest(&deps);
        assert_eq!(xml.matches("<dependency>").count(), 2);
        assert!(xml.contains("name=\"alpha.sxs\" version=\"1.0.0.0\""));
        assert!(xml.contains("name=\"beta.sxs\" version=\"2.0.0.0\""));
        assert!(!xml.contains("<file"));
        assert!(!xml.contains("<comClass"));
    }
}

//! Manifest synthesis: fold a captured registration call log into a
//! normalized per-assembly model and render it to the activation descriptor
//! format, including content-addressed file declarations.

mod error;
pub use error::ManifestError;

mod digest;
pub use digest::{DigestAlgo, DigestSet, FileDigests};

mod model;
pub use model::{
    current_architecture, AssemblyIdentity, AssemblyVersion, ComClassEntry, DependencyInfo,
    FileDeclaration, InterfaceEntry, ManifestModel, TypeLibEntry,
};

mod builder;
pub use builder::ManifestBuilder;

mod writer;
pub use writer::{
    render_assembly_manifest, render_client_manifest, write_assembly_manifest,
    write_client_manifest,
};

//! Orchestration: capture each requested module, fold its log into a
//! manifest, and write the outputs. Per-module failures are isolated so a
//! batch or directory run continues past one bad file; session-integrity
//! failures abort the whole run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use regshadow_capture::{CaptureConfig, CaptureError, CaptureSession, ComModule};
use regshadow_common::RegistrationLog;
use regshadow_manifest::{
    write_assembly_manifest, write_client_manifest, AssemblyIdentity, AssemblyVersion,
    DependencyInfo, DigestSet, ManifestBuilder,
};

use crate::args::Cli;
use crate::batch;
use crate::exit_codes;
use crate::version_info::VersionSpec;

struct Job {
    trace: bool,
    digests: DigestSet,
    arch: bool,
    /// Directory manifests are written into when a client target is given.
    client_dir: Option<PathBuf>,
}

pub fn run(cli: Cli) -> i32 {
    let version_spec = match cli.assembly_version.as_deref().map(VersionSpec::parse) {
        Some(Ok(spec)) => Some(spec),
        Some(Err(err)) => {
            error!("{err:#}");
            return exit_codes::INTERNAL_ERROR;
        }
        None => None,
    };

    let job = Job {
        trace: cli.trace,
        digests: cli.digest_set(),
        arch: cli.arch,
        client_dir: cli
            .client
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf),
    };

    let mut dependencies: Vec<DependencyInfo> = Vec::new();
    let mut failures = 0_usize;

    if let Some(batch_path) = &cli.batch {
        match run_batch(batch_path, &job, &mut dependencies, &mut failures) {
            Ok(()) => {}
            Err(err) => return fatal(&err),
        }
    } else if let Some(dir) = &cli.dir {
        let name = base_name(dir);
        let version = version_spec
            .unwrap_or(VersionSpec::Literal(AssemblyVersion::DEFAULT))
            .resolve(dir);
        let output = output_path(&job, None, &name);
        match process_directory(dir, &name, version, &job, &output) {
            Ok(dependency) => dependencies.push(dependency),
            Err(err) if is_fatal(&err) => return fatal(&err),
            Err(err) => {
                error!("{err:#}");
                failures += 1;
            }
        }
    } else if let Some(module) = &cli.module {
        let name = cli.name.clone().unwrap_or_else(|| derived_name(module));
        let version = version_spec
            .unwrap_or(VersionSpec::Literal(AssemblyVersion::DEFAULT))
            .resolve(module);
        let output = output_path(&job, module.parent(), &name);
        match process_module(module, &name, version, &job, &output) {
            Ok(dependency) => dependencies.push(dependency),
            Err(err) if is_fatal(&err) => return fatal(&err),
            Err(err) => {
                error!("{err:#}");
                failures += 1;
            }
        }
    } else {
        error!("no module, batch file, or directory given");
        return exit_codes::INTERNAL_ERROR;
    }

    if let Some(client) = &cli.client {
        let target = client_manifest_path(client);
        if let Err(err) = write_client_manifest(&target, &dependencies) {
            error!("{err}");
            failures += 1;
        }
    }

    if failures > 0 {
        exit_codes::MODULE_FAILED
    } else {
        exit_codes::SUCCESS
    }
}

fn run_batch(
    batch_path: &Path,
    job: &Job,
    dependencies: &mut Vec<DependencyInfo>,
    failures: &mut usize,
) -> Result<()> {
    let content = fs::read_to_string(batch_path)
        .with_context(|| format!("reading batch file {}", batch_path.display()))?;

    for line in content.lines().filter_map(batch::parse_line) {
        let result = if line.path.is_dir() {
            // An explicit name on a directory line is ignored; the directory
            // name wins.
            let name = base_name(&line.path);
            let version = resolve_line_version(line.version.as_deref(), &line.path);
            let output = output_path(job, None, &name);
            process_directory(&line.path, &name, version, job, &output)
        } else {
            let name = line
                .name
                .clone()
                .unwrap_or_else(|| derived_name(&line.path));
            let version = resolve_line_version(line.version.as_deref(), &line.path);
            let output = output_path(job, None, &name);
            process_module(&line.path, &name, version, job, &output)
        };
        match result {
            Ok(dependency) => dependencies.push(dependency),
            Err(err) if is_fatal(&err) => return Err(err),
            Err(err) => {
                error!("{err:#}");
                *failures += 1;
            }
        }
    }
    Ok(())
}

/// Batch lines default to 1.0.0.0; a malformed version is reported and the
/// default used, keeping the rest of the line processable.
fn resolve_line_version(version: Option<&str>, module: &Path) -> AssemblyVersion {
    match version {
        None => AssemblyVersion::DEFAULT,
        Some(raw) => match VersionSpec::parse(raw) {
            Ok(spec) => spec.resolve(module),
            Err(err) => {
                warn!("{err:#}; using {}", AssemblyVersion::DEFAULT);
                AssemblyVersion::DEFAULT
            }
        },
    }
}

fn process_module(
    path: &Path,
    name: &str,
    version: AssemblyVersion,
    job: &Job,
    output: &Path,
) -> Result<DependencyInfo> {
    info!(module = %path.display(), "processing module");

    let mut builder = ManifestBuilder::new(identity(name, version, job));
    builder
        .add_file(path, &job.digests)
        .with_context(|| format!("declaring {}", path.display()))?;

    let log = capture_module_log(path, job.trace)
        .with_context(|| format!("capturing registration of {}", path.display()))?;
    if log.is_empty() {
        warn!(module = %path.display(), "registration made no registry calls");
    }
    builder.apply_log(&file_name(path), &log);

    write_assembly_manifest(&builder.finalize(), output)?;
    Ok(DependencyInfo {
        assembly_name: name.to_string(),
        assembly_version: version,
    })
}

fn process_directory(
    dir: &Path,
    name: &str,
    version: AssemblyVersion,
    job: &Job,
    output: &Path,
) -> Result<DependencyInfo> {
    info!(directory = %dir.display(), "processing directory");

    let mut builder = ManifestBuilder::new(identity(name, version, job));

    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    for path in entries {
        match capture_module_log(&path, job.trace) {
            Ok(log) if log.is_empty() => {
                debug!(module = %path.display(), "no registration data");
            }
            Ok(log) => {
                if let Err(err) = builder.add_file(&path, &job.digests) {
                    warn!(module = %path.display(), error = %err, "skipping module");
                    continue;
                }
                builder.apply_log(&file_name(&path), &log);
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                warn!(module = %path.display(), error = %err, "skipping module");
            }
        }
    }

    write_assembly_manifest(&builder.finalize(), output)?;
    Ok(DependencyInfo {
        assembly_name: name.to_string(),
        assembly_version: version,
    })
}

/// Load the module and capture its registration pass.
///
/// The component is asked to unregister first so the capture starts from a
/// clean state; that pass runs unhooked and its result is ignored. The
/// register pass runs hooked; a second unregister inside the capture window
/// undoes nothing real (its calls are suppressed and the fold ignores
/// deletes) but mirrors components that expect the paired call.
fn capture_module_log(path: &Path, trace: bool) -> Result<RegistrationLog, CaptureError> {
    let _apartment = platform::ComApartment::new();
    platform::add_module_search_path(path);

    let module = ComModule::load(path)?;

    match module.unregister() {
        Ok(0) => {}
        Ok(code) => debug!(code, "unregister reported failure"),
        Err(CaptureError::EntryPointMissing { .. }) => {}
        Err(err) => return Err(err),
    }

    let session = CaptureSession::begin(&module, CaptureConfig { trace })?;
    let registered = module.register();
    if registered.is_ok() {
        let _ = module.unregister();
    }
    let log = session.finish()?;

    match registered {
        Ok(0) => Ok(log),
        Ok(code) => {
            warn!(
                module = %path.display(),
                code,
                "registration returned failure; keeping partial log"
            );
            Ok(log)
        }
        Err(err) => Err(err),
    }
}

fn identity(name: &str, version: AssemblyVersion, job: &Job) -> AssemblyIdentity {
    let identity = AssemblyIdentity::new(name, version);
    if job.arch {
        identity.with_architecture()
    } else {
        identity
    }
}

fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CaptureError>()
        .is_some_and(CaptureError::is_fatal)
}

fn fatal(err: &anyhow::Error) -> i32 {
    error!("{err:#}");
    exit_codes::INTERNAL_ERROR
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "assembly".to_string())
}

fn derived_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "assembly".to_string());
    format!("{stem}.sxs")
}

/// Manifest placement: next to the module unless a client target directory
/// takes precedence; directory and batch outputs land in the client target's
/// directory or the working directory.
fn output_path(job: &Job, module_dir: Option<&Path>, name: &str) -> PathBuf {
    let file = format!("{name}.manifest");
    match (&job.client_dir, module_dir) {
        (Some(client_dir), _) => client_dir.join(file),
        (None, Some(dir)) if !dir.as_os_str().is_empty() => dir.join(file),
        _ => PathBuf::from(file),
    }
}

fn client_manifest_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "client".to_string());
    name.push_str(".manifest");
    match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => PathBuf::from(name),
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
mod platform {
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use tracing::warn;
    use windows_sys::Win32::System::Com::{
        CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED,
    };
    use windows_sys::Win32::System::LibraryLoader::SetDllDirectoryW;

    /// Apartment guard around one module's registration pass.
    pub struct ComApartment;

    impl ComApartment {
        pub fn new() -> Self {
            // SAFETY: paired with CoUninitialize in Drop on the same thread.
            unsafe {
                CoInitializeEx(std::ptr::null(), COINIT_APARTMENTTHREADED);
            }
            Self
        }
    }

    impl Drop for ComApartment {
        fn drop(&mut self) {
            // SAFETY: balances the CoInitializeEx in new().
            unsafe { CoUninitialize() };
        }
    }

    /// Point the loader's DLL search at the module's directory so dependent
    /// DLLs next to it resolve.
    pub fn add_module_search_path(module: &Path) {
        let Some(parent) = module.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return;
        };
        let wide: Vec<u16> = parent
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        // SAFETY: `wide` is NUL-terminated and outlives the call.
        if unsafe { SetDllDirectoryW(wide.as_ptr()) } == 0 {
            warn!(path = %parent.display(), "SetDllDirectory failed");
        }
    }
}

#[cfg(not(windows))]
mod platform {
    use std::path::Path;

    pub struct ComApartment;

    impl ComApartment {
        pub fn new() -> Self {
            Self
        }
    }

    pub fn add_module_search_path(_module: &Path) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_name_appends_the_sxs_suffix() {
        assert_eq!(derived_name(Path::new("widgets.dll")), "widgets.sxs");
        assert_eq!(derived_name(Path::new("c:/libs/widgets.dll")), "widgets.sxs");
    }

    #[test]
    fn directory_names_take_the_base_name_unsuffixed() {
        assert_eq!(base_name(Path::new("out/components")), "components");
    }

    #[test]
    fn output_lands_next_to_the_module_by_default() {
        let job = Job {
            trace: false,
            digests: DigestSet::new(),
            arch: false,
            client_dir: None,
        };
        assert_eq!(
            output_path(&job, Some(Path::new("libs")), "widgets.sxs"),
            PathBuf::from("libs/widgets.sxs.manifest")
        );
        assert_eq!(
            output_path(&job, None, "components"),
            PathBuf::from("components.manifest")
        );
    }

    #[test]
    fn client_target_directory_wins() {
        let job = Job {
            trace: false,
            digests: DigestSet::new(),
            arch: false,
            client_dir: Some(PathBuf::from("apps")),
        };
        assert_eq!(
            output_path(&job, Some(Path::new("libs")), "widgets.sxs"),
            PathBuf::from("apps/widgets.sxs.manifest")
        );
    }

    #[test]
    fn client_manifest_is_named_after_the_target() {
        assert_eq!(
            client_manifest_path(Path::new("apps/viewer.exe")),
            PathBuf::from("apps/viewer.exe.manifest")
        );
        assert_eq!(
            client_manifest_path(Path::new("viewer.exe")),
            PathBuf::from("viewer.exe.manifest")
        );
    }
}

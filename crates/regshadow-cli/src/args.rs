use clap::Parser;
use std::path::PathBuf;

use regshadow_manifest::{DigestAlgo, DigestSet};

#[derive(Parser, Debug)]
#[command(
    name = "regshadow",
    version,
    about = "Spy on a component's self-registration and synthesize a registration-free activation manifest"
)]
pub struct Cli {
    /// Component module to process
    #[arg(conflicts_with_all = ["batch", "dir"])]
    pub module: Option<PathBuf>,

    /// Print a line for every captured registration call
    #[arg(long)]
    pub trace: bool,

    /// Assembly name (default: module base name plus ".sxs")
    #[arg(long, conflicts_with_all = ["batch", "dir"])]
    pub name: Option<String>,

    /// Assembly version: a dotted quad (default 1.0.0.0), or ProductVersion /
    /// FileVersion to read the module's version resource (append '*' to zero
    /// the build number)
    #[arg(long = "assembly-version", value_name = "VERSION", conflicts_with = "batch")]
    pub assembly_version: Option<String>,

    /// Include the processor architecture in the assembly identity
    #[arg(long)]
    pub arch: bool,

    /// Add a SHA-1 digest to file declarations
    #[arg(long, alias = "hash")]
    pub sha1: bool,

    /// Add a SHA-256 digest to file declarations
    #[arg(long)]
    pub sha256: bool,

    /// Add the byte length to file declarations
    #[arg(long)]
    pub size: bool,

    /// Also write <TARGET>.manifest declaring every generated assembly as a
    /// dependency
    #[arg(long, value_name = "TARGET")]
    pub client: Option<PathBuf>,

    /// Process modules listed in FILE, one per line: path|name|version
    /// (name and version optional; directories process in directory mode)
    #[arg(long, value_name = "FILE", conflicts_with = "dir")]
    pub batch: Option<PathBuf>,

    /// Process every file in DIR into one manifest named after the directory
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

impl Cli {
    pub fn digest_set(&self) -> DigestSet {
        let mut set = DigestSet::new();
        if self.size {
            set.insert(DigestAlgo::Size);
        }
        if self.sha1 {
            set.insert(DigestAlgo::Sha1);
        }
        if self.sha256 {
            set.insert(DigestAlgo::Sha256);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_flags_combine_into_a_set() {
        let cli = Cli::parse_from(["regshadow", "--size", "--sha256", "x.dll"]);
        let set = cli.digest_set();
        assert!(set.contains(DigestAlgo::Size));
        assert!(set.contains(DigestAlgo::Sha256));
        assert!(!set.contains(DigestAlgo::Sha1));
    }

    #[test]
    fn hash_is_an_alias_for_sha1() {
        let cli = Cli::parse_from(["regshadow", "--hash", "x.dll"]);
        assert!(cli.digest_set().contains(DigestAlgo::Sha1));
    }

    #[test]
    fn name_is_rejected_in_directory_mode() {
        assert!(Cli::try_parse_from(["regshadow", "--dir", "d", "--name", "n"]).is_err());
    }

    #[test]
    fn batch_and_dir_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["regshadow", "--batch", "b", "--dir", "d"]).is_err());
    }

    #[test]
    fn version_is_rejected_in_batch_mode() {
        assert!(
            Cli::try_parse_from(["regshadow", "--batch", "b", "--assembly-version", "1.0.0.0"])
                .is_err()
        );
    }
}

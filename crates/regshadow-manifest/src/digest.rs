//! Content addressing for file declarations: byte length plus cryptographic
//! digests, selected by an order-independent algorithm set.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::ManifestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DigestAlgo {
    Size,
    Sha1,
    Sha256,
}

/// Combinable, order-independent selection of digest algorithms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestSet(BTreeSet<DigestAlgo>);

impl DigestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, algo: DigestAlgo) {
        self.0.insert(algo);
    }

    pub fn with(mut self, algo: DigestAlgo) -> Self {
        self.insert(algo);
        self
    }

    pub fn contains(&self, algo: DigestAlgo) -> bool {
        self.0.contains(&algo)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<DigestAlgo> for DigestSet {
    fn from_iter<T: IntoIterator<Item = DigestAlgo>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Computed digests for one file, fields present per the requested set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileDigests {
    pub size: Option<u64>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
}

impl FileDigests {
    /// Stream the file once, feeding every requested hasher.
    pub fn compute(path: &Path, algos: &DigestSet) -> Result<Self, ManifestError> {
        if algos.is_empty() {
            return Ok(Self::default());
        }

        let unreadable = |source| ManifestError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(unreadable)?;
        let mut sha1 = algos.contains(DigestAlgo::Sha1).then(Sha1::new);
        let mut sha256 = algos.contains(DigestAlgo::Sha256).then(Sha256::new);
        let mut total: u64 = 0;
        let mut buf = [0_u8; 8192];

        loop {
            let n = file.read(&mut buf).map_err(unreadable)?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if let Some(h) = sha1.as_mut() {
                h.update(&buf[..n]);
            }
            if let Some(h) = sha256.as_mut() {
                h.update(&buf[..n]);
            }
        }

        Ok(Self {
            size: algos.contains(DigestAlgo::Size).then_some(total),
            sha1: sha1.map(|h| hex::encode(h.finalize())),
            sha256: sha256.map(|h| hex::encode(h.finalize())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        f.write_all(content).expect("write");
        f
    }

    #[test]
    fn empty_set_computes_nothing() {
        let f = write_temp(b"abc");
        let d = FileDigests::compute(f.path(), &DigestSet::new()).unwrap();
        assert_eq!(d, FileDigests::default());
    }

    #[test]
    fn known_vectors() {
        // Reference digests for the ASCII string "abc".
        let f = write_temp(b"abc");
        let algos: DigestSet = [DigestAlgo::Size, DigestAlgo::Sha1, DigestAlgo::Sha256]
            .into_iter()
            .collect();
        let d = FileDigests::compute(f.path(), &algos).unwrap();
        assert_eq!(d.size, Some(3));
        assert_eq!(
            d.sha1.as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(
            d.sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn size_only_skips_hashing() {
        let f = write_temp(&[0_u8; 10_000]);
        let d =
            FileDigests::compute(f.path(), &DigestSet::new().with(DigestAlgo::Size)).unwrap();
        assert_eq!(d.size, Some(10_000));
        assert_eq!(d.sha1, None);
        assert_eq!(d.sha256, None);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = FileDigests::compute(
            Path::new("does/not/exist.dll"),
            &DigestSet::new().with(DigestAlgo::Sha256),
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::FileUnreadable { .. }));
    }

    #[test]
    fn set_is_order_independent() {
        let a: DigestSet = [DigestAlgo::Sha256, DigestAlgo::Size].into_iter().collect();
        let b: DigestSet = [DigestAlgo::Size, DigestAlgo::Sha256].into_iter().collect();
        assert_eq!(a, b);
    }
}

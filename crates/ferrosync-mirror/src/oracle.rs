//! Content equality checks

use crate::fs::FileSystem;
use ferrosync_types::{BufferSize, DigestAlgorithm};
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Decides whether two files hold the same bytes
pub trait ContentOracle: Send + Sync {
    /// Compare the contents of two existing files
    ///
    /// An `Err` means the comparison could not be made. Callers treat that as
    /// "different" and copy.
    fn equal(&self, a: &Path, b: &Path) -> io::Result<bool>;
}

/// How [`DigestOracle`] compares files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationOptions {
    /// Digest used for the full content comparison
    pub algorithm: DigestAlgorithm,
    /// Report differing sizes as unequal without reading any content
    pub size_fast_path: bool,
    /// Chunk size used while streaming file contents
    pub buffer_size: BufferSize,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::Blake3,
            size_fast_path: true,
            buffer_size: BufferSize::default(),
        }
    }
}

/// Oracle comparing streamed content digests
#[derive(Debug)]
pub struct DigestOracle<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    options: VerificationOptions,
}

impl<'a, F: FileSystem + ?Sized> DigestOracle<'a, F> {
    /// Create an oracle reading through `fs`
    pub fn new(fs: &'a F, options: VerificationOptions) -> Self {
        Self { fs, options }
    }

    /// Digest of the full contents of a file
    pub fn digest(&self, path: &Path) -> io::Result<[u8; 32]> {
        let mut reader = self.fs.open_read(path)?;
        let mut buffer = vec![0u8; self.options.buffer_size.get()];

        match self.options.algorithm {
            DigestAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                stream(&mut reader, &mut buffer, |chunk| {
                    hasher.update(chunk);
                })?;
                Ok(*hasher.finalize().as_bytes())
            }
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                stream(&mut reader, &mut buffer, |chunk| hasher.update(chunk))?;
                let mut digest = [0u8; 32];
                digest.copy_from_slice(&hasher.finalize());
                Ok(digest)
            }
        }
    }
}

fn stream<R: Read + ?Sized>(
    reader: &mut R,
    buffer: &mut [u8],
    mut update: impl FnMut(&[u8]),
) -> io::Result<()> {
    loop {
        match reader.read(buffer) {
            Ok(0) => return Ok(()),
            Ok(read) => update(&buffer[..read]),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}

impl<F: FileSystem + ?Sized> ContentOracle for DigestOracle<'_, F> {
    fn equal(&self, a: &Path, b: &Path) -> io::Result<bool> {
        if self.options.size_fast_path {
            let size_a = self.fs.metadata(a)?.size;
            let size_b = self.fs.metadata(b)?.size;
            if size_a != size_b {
                debug!(
                    "Size mismatch: {} ({size_a}) vs {} ({size_b})",
                    a.display(),
                    b.display()
                );
                return Ok(false);
            }
        }

        let equal = self.digest(a)? == self.digest(b)?;
        debug!(
            "Compared {} and {} with {}: {}",
            a.display(),
            b.display(),
            self.options.algorithm,
            if equal { "equal" } else { "different" }
        );
        Ok(equal)
    }
}

//! Filesystem abstraction used by the mirror engine
//!
//! Every read and write the engine performs goes through [`FileSystem`], so the
//! diff logic can run against [`LocalFs`] in production and against
//! [`MemoryFs`](crate::memfs::MemoryFs) in tests.

use ferrosync_types::{EntryKind, EntryMetadata};
use filetime::FileTime;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Options controlling how a file copy preserves metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Copy access and modification times onto the replica file
    pub preserve_timestamps: bool,
    /// Copy permission bits onto the replica file
    pub preserve_permissions: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            preserve_timestamps: true,
            preserve_permissions: true,
        }
    }
}

/// One entry produced by a tree walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Absolute path of the entry
    pub path: PathBuf,
    /// Metadata of the entry itself (links are not followed)
    pub metadata: EntryMetadata,
}

/// A directory or entry that could not be read during a walk
#[derive(Debug)]
pub struct WalkError {
    /// Path that failed
    pub path: PathBuf,
    /// Underlying error
    pub error: io::Error,
}

/// Operations the mirror engine needs from a filesystem
pub trait FileSystem: Send + Sync {
    /// Metadata of `path` without following a final symbolic link
    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata>;

    /// Immediate children of a directory
    fn read_dir(&self, path: &Path) -> io::Result<Vec<WalkEntry>>;

    /// Open a file for reading
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>>;

    /// Create a directory and all missing parents
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Copy `from` over `to`, returning the number of bytes written
    fn copy_file(&self, from: &Path, to: &Path, options: CopyOptions) -> io::Result<u64>;

    /// Remove a file, symbolic link or special file
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory and everything below it
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Resolve a path to its absolute, link-free form
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Walk everything below `root`, top-down and depth-first
    ///
    /// Within a directory, subdirectories come before files and siblings are
    /// sorted by name. Symbolic links are reported, never followed. A
    /// directory that cannot be listed yields one [`WalkError`] and the walk
    /// carries on with its siblings.
    fn walk(&self, root: &Path) -> Vec<Result<WalkEntry, WalkError>> {
        let mut items = Vec::new();
        walk_into(self, root, &mut items);
        items
    }
}

fn walk_into<F: FileSystem + ?Sized>(
    fs: &F,
    dir: &Path,
    items: &mut Vec<Result<WalkEntry, WalkError>>,
) {
    let mut children = match fs.read_dir(dir) {
        Ok(children) => children,
        Err(error) => {
            items.push(Err(WalkError {
                path: dir.to_path_buf(),
                error,
            }));
            return;
        }
    };
    children.sort_by(|a, b| {
        b.metadata
            .is_dir()
            .cmp(&a.metadata.is_dir())
            .then_with(|| a.path.cmp(&b.path))
    });

    for child in children {
        let descend = child.metadata.is_dir();
        let path = child.path.clone();
        items.push(Ok(child));
        if descend {
            walk_into(fs, &path, items);
        }
    }
}

/// The local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    /// Create a handle to the local filesystem
    pub fn new() -> Self {
        Self
    }
}

fn convert_metadata(metadata: &fs::Metadata) -> EntryMetadata {
    let file_type = metadata.file_type();
    let kind = if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };

    EntryMetadata {
        kind,
        size: if kind == EntryKind::File {
            metadata.len()
        } else {
            0
        },
        modified: metadata.modified().ok(),
        accessed: metadata.accessed().ok(),
        permissions: permission_bits(metadata),
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
fn reset_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn reset_permissions(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

/// Hidden sibling the copy is staged in before it replaces the target
///
/// The name has a fixed length so any target name valid on the filesystem
/// can be staged.
fn staging_path(target: &Path) -> io::Result<PathBuf> {
    if target.file_name().is_none() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' has no file name", target.display()),
        ));
    }
    Ok(target.with_file_name(format!(
        ".ferrosync-{}.tmp",
        uuid::Uuid::new_v4().simple()
    )))
}

impl LocalFs {
    fn write_staged(
        &self,
        from: &Path,
        staged: &Path,
        target: &Path,
        options: CopyOptions,
    ) -> io::Result<u64> {
        // std::fs::copy carries the permission bits over
        let bytes = fs::copy(from, staged)?;

        if !options.preserve_permissions {
            reset_permissions(staged)?;
        }

        if options.preserve_timestamps {
            let source_metadata = fs::metadata(from)?;
            filetime::set_file_times(
                staged,
                FileTime::from_last_access_time(&source_metadata),
                FileTime::from_last_modification_time(&source_metadata),
            )?;
        }

        fs::rename(staged, target)?;
        Ok(bytes)
    }
}

impl FileSystem for LocalFs {
    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        fs::symlink_metadata(path).map(|metadata| convert_metadata(&metadata))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<WalkEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(WalkEntry {
                path: entry.path(),
                metadata: convert_metadata(&metadata),
            });
        }
        Ok(entries)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn copy_file(&self, from: &Path, to: &Path, options: CopyOptions) -> io::Result<u64> {
        let staged = staging_path(to)?;
        match self.write_staged(from, &staged, to, options) {
            Ok(bytes) => {
                debug!("Copied: {} -> {}", from.display(), to.display());
                Ok(bytes)
            }
            Err(error) => {
                // Never leave a staged file behind
                let _ = fs::remove_file(&staged);
                Err(error)
            }
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn walk(&self, root: &Path) -> Vec<Result<WalkEntry, WalkError>> {
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by(|a, b| {
                b.file_type()
                    .is_dir()
                    .cmp(&a.file_type().is_dir())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            });

        walker
            .into_iter()
            .map(|item| match item {
                Ok(entry) => match entry.metadata() {
                    Ok(metadata) => Ok(WalkEntry {
                        path: entry.into_path(),
                        metadata: convert_metadata(&metadata),
                    }),
                    Err(error) => Err(WalkError {
                        path: entry.into_path(),
                        error: error.into_io_error().unwrap_or_else(|| {
                            io::Error::new(io::ErrorKind::Other, "failed to read metadata")
                        }),
                    }),
                },
                Err(error) => {
                    let path = error
                        .path()
                        .map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                    let message = error.to_string();
                    Err(WalkError {
                        path,
                        error: error
                            .into_io_error()
                            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message)),
                    })
                }
            })
            .collect()
    }
}

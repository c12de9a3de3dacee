//! In-memory filesystem with fault injection
//!
//! [`MemoryFs`] implements [`FileSystem`] over a path-keyed map so that the
//! planner, applier and driver can be exercised without touching the disk.
//! Individual operations on individual paths can be made to fail with
//! [`MemoryFs::fail`].

use crate::fs::{CopyOptions, FileSystem, WalkEntry};
use ferrosync_types::{EntryKind, EntryMetadata};
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

/// Operation that can be made to fail on a given path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Opening the file for reading
    Read,
    /// Listing the directory
    List,
    /// Creating the directory
    CreateDir,
    /// Writing a copy to this destination
    Copy,
    /// Removing the file
    RemoveFile,
    /// Removing the directory tree
    RemoveDir,
}

/// Contents of one node, as seen by test assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryEntry {
    /// A directory
    Directory,
    /// A regular file and its bytes
    File(Vec<u8>),
    /// A symbolic link and its target
    Symlink(PathBuf),
}

#[derive(Debug, Clone)]
struct Node {
    entry: MemoryEntry,
    modified: SystemTime,
    accessed: SystemTime,
    permissions: u32,
}

impl Node {
    fn new(entry: MemoryEntry, now: SystemTime) -> Self {
        let permissions = match entry {
            MemoryEntry::Directory => 0o755,
            MemoryEntry::File(_) => 0o644,
            MemoryEntry::Symlink(_) => 0o777,
        };
        Self {
            entry,
            modified: now,
            accessed: now,
            permissions,
        }
    }

    fn metadata(&self) -> EntryMetadata {
        let (kind, size) = match &self.entry {
            MemoryEntry::Directory => (EntryKind::Directory, 0),
            MemoryEntry::File(data) => (EntryKind::File, data.len() as u64),
            MemoryEntry::Symlink(_) => (EntryKind::Other, 0),
        };
        EntryMetadata {
            kind,
            size,
            modified: Some(self.modified),
            accessed: Some(self.accessed),
            permissions: self.permissions,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.entry, MemoryEntry::Directory)
    }
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    faults: HashSet<(PathBuf, Fault)>,
    // Monotonic fake clock so every write gets a distinct timestamp
    ticks: u64,
}

impl State {
    fn now(&mut self) -> SystemTime {
        self.ticks += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 + self.ticks)
    }

    fn check(&self, path: &Path, fault: Fault) -> io::Result<()> {
        if self.faults.contains(&(path.to_path_buf(), fault)) {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected {fault:?} failure on '{}'", path.display()),
            ))
        } else {
            Ok(())
        }
    }

    fn node(&self, path: &Path) -> io::Result<&Node> {
        self.nodes.get(path).ok_or_else(|| not_found(path))
    }

    fn ensure_dir(&mut self, path: &Path) -> io::Result<()> {
        let mut missing = Vec::new();
        for ancestor in path.ancestors() {
            match self.nodes.get(ancestor) {
                Some(node) if node.is_dir() => break,
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("'{}' exists and is not a directory", ancestor.display()),
                    ))
                }
                None => missing.push(ancestor.to_path_buf()),
            }
        }
        for dir in missing.into_iter().rev() {
            let now = self.now();
            self.nodes.insert(dir, Node::new(MemoryEntry::Directory, now));
        }
        Ok(())
    }

    fn insert(&mut self, path: &Path, entry: MemoryEntry) {
        if let Some(parent) = path.parent() {
            // Test setup helpers replace whatever sits in the way
            if self.ensure_dir(parent).is_err() {
                self.remove_tree(parent);
                let _ = self.ensure_dir(parent);
            }
        }
        self.remove_tree(path);
        let now = self.now();
        self.nodes.insert(path.to_path_buf(), Node::new(entry, now));
    }

    fn remove_tree(&mut self, path: &Path) {
        self.nodes.retain(|key, _| !key.starts_with(path));
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("'{}' does not exist", path.display()),
    )
}

/// Filesystem held entirely in memory
///
/// Paths are used verbatim as keys, so tests should use absolute, normalized
/// paths such as `/src/a/x.txt`. The root `/` always exists.
#[derive(Debug)]
pub struct MemoryFs {
    state: Mutex<State>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create an empty filesystem containing only `/`
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            PathBuf::from("/"),
            Node::new(MemoryEntry::Directory, SystemTime::UNIX_EPOCH),
        );
        Self {
            state: Mutex::new(State {
                nodes,
                faults: HashSet::new(),
                ticks: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a directory and its parents
    pub fn add_dir<P: AsRef<Path>>(&self, path: P) -> &Self {
        let path = path.as_ref();
        let mut state = self.lock();
        if !state.nodes.get(path).is_some_and(Node::is_dir) {
            state.insert(path, MemoryEntry::Directory);
        }
        drop(state);
        self
    }

    /// Create or replace a file, creating its parents
    pub fn add_file<P: AsRef<Path>, C: AsRef<[u8]>>(&self, path: P, contents: C) -> &Self {
        self.lock()
            .insert(path.as_ref(), MemoryEntry::File(contents.as_ref().to_vec()));
        self
    }

    /// Create a symbolic link pointing at `target`
    pub fn add_symlink<P: AsRef<Path>, T: Into<PathBuf>>(&self, path: P, target: T) -> &Self {
        self.lock()
            .insert(path.as_ref(), MemoryEntry::Symlink(target.into()));
        self
    }

    /// Remove a node and everything below it
    pub fn remove<P: AsRef<Path>>(&self, path: P) {
        self.lock().remove_tree(path.as_ref());
    }

    /// Contents of a file, if `path` is a file
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Option<Vec<u8>> {
        match self.lock().nodes.get(path.as_ref()) {
            Some(Node {
                entry: MemoryEntry::File(data),
                ..
            }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Kind of the node at `path`
    pub fn kind<P: AsRef<Path>>(&self, path: P) -> Option<EntryKind> {
        self.lock()
            .nodes
            .get(path.as_ref())
            .map(|node| node.metadata().kind)
    }

    /// Modification time of the node at `path`
    pub fn modified<P: AsRef<Path>>(&self, path: P) -> Option<SystemTime> {
        self.lock().nodes.get(path.as_ref()).map(|node| node.modified)
    }

    /// Override the modification time of the node at `path`
    pub fn set_modified<P: AsRef<Path>>(&self, path: P, modified: SystemTime) {
        if let Some(node) = self.lock().nodes.get_mut(path.as_ref()) {
            node.modified = modified;
        }
    }

    /// Every node strictly below `root`, keyed by path relative to `root`
    pub fn entries_under<P: AsRef<Path>>(&self, root: P) -> BTreeMap<PathBuf, MemoryEntry> {
        let root = root.as_ref();
        self.lock()
            .nodes
            .iter()
            .filter_map(|(path, node)| {
                let relative = path.strip_prefix(root).ok()?;
                if relative.as_os_str().is_empty() {
                    None
                } else {
                    Some((relative.to_path_buf(), node.entry.clone()))
                }
            })
            .collect()
    }

    /// Make `fault` fail on `path` until cleared
    pub fn fail<P: Into<PathBuf>>(&self, path: P, fault: Fault) -> &Self {
        self.lock().faults.insert((path.into(), fault));
        self
    }

    /// Remove every injected fault
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }
}

impl FileSystem for MemoryFs {
    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        self.lock().node(path).map(Node::metadata)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<WalkEntry>> {
        let state = self.lock();
        if !state.node(path)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("'{}' is not a directory", path.display()),
            ));
        }
        state.check(path, Fault::List)?;

        Ok(state
            .nodes
            .iter()
            .filter(|(child, _)| child.parent() == Some(path))
            .map(|(child, node)| WalkEntry {
                path: child.clone(),
                metadata: node.metadata(),
            })
            .collect())
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        let state = self.lock();
        state.check(path, Fault::Read)?;
        match &state.node(path)?.entry {
            MemoryEntry::File(data) => Ok(Box::new(Cursor::new(data.clone()))),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("'{}' is not a file", path.display()),
            )),
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.check(path, Fault::CreateDir)?;
        state.ensure_dir(path)
    }

    fn copy_file(&self, from: &Path, to: &Path, options: CopyOptions) -> io::Result<u64> {
        let mut state = self.lock();
        state.check(from, Fault::Read)?;
        state.check(to, Fault::Copy)?;

        let source = state.node(from)?.clone();
        let MemoryEntry::File(data) = &source.entry else {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("'{}' is not a file", from.display()),
            ));
        };
        let parent = to.parent().ok_or_else(|| not_found(to))?;
        if !state.node(parent)?.is_dir() {
            return Err(not_found(parent));
        }
        if state.nodes.get(to).is_some_and(Node::is_dir) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("'{}' is a directory", to.display()),
            ));
        }

        let bytes = data.len() as u64;
        let now = state.now();
        let mut node = Node::new(MemoryEntry::File(data.clone()), now);
        if options.preserve_timestamps {
            node.modified = source.modified;
            node.accessed = source.accessed;
        }
        if options.preserve_permissions {
            node.permissions = source.permissions;
        }
        state.nodes.insert(to.to_path_buf(), node);
        Ok(bytes)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.check(path, Fault::RemoveFile)?;
        if state.node(path)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("'{}' is a directory", path.display()),
            ));
        }
        state.nodes.remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.check(path, Fault::RemoveDir)?;
        if !state.node(path)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("'{}' is not a directory", path.display()),
            ));
        }
        state.remove_tree(path);
        Ok(())
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let state = self.lock();
        match &state.node(path)?.entry {
            MemoryEntry::Symlink(target) => {
                state.node(target)?;
                Ok(target.clone())
            }
            _ => Ok(path.to_path_buf()),
        }
    }
}

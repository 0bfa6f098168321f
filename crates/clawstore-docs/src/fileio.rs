//! File I/O abstraction
//!
//! The persistence layer talks to storage only through [`FileIo`]. Paths are
//! relative to the database root, e.g. `players/definition` or
//! `players/0f3c...`.
//!
//! - [`DiskIo`] writes each file with the atomic replace pattern:
//!   1. write `.{name}.tmp` next to the target
//!   2. sync the temp file
//!   3. rename over the target (atomic on POSIX)
//!   4. sync the parent directory
//!
//!   A crash before the rename leaves the old file intact and an orphaned
//!   hidden temp file, which listings skip.
//! - [`MemoryIo`] keeps everything in RAM and can inject read/write/delete
//!   failures for retry-budget tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::platform_durability::replace_durably;

/// Storage operations used by the persistence layer.
pub trait FileIo: Send + Sync {
    /// Contents of `path`, or `None` if it does not exist.
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;
    /// Replace `path` with `bytes` as a whole.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
    /// Remove a file. Removing a missing file succeeds.
    fn delete(&self, path: &Path) -> io::Result<()>;
    /// Names of the regular files directly inside `dir`.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<String>>;
    /// Names of the directories directly inside `dir`.
    fn list_dirs(&self, dir: &Path) -> io::Result<Vec<String>>;
    /// Create `path` and any missing parents.
    fn create_dir(&self, path: &Path) -> io::Result<()>;
    fn dir_exists(&self, path: &Path) -> bool;
    /// Remove a directory and everything below it. Removing a missing directory succeeds.
    fn delete_dir(&self, path: &Path) -> io::Result<()>;
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Real filesystem rooted at the database directory.
#[derive(Debug, Clone)]
pub struct DiskIo {
    root: PathBuf,
}

impl DiskIo {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn list(&self, dir: &Path, want_dirs: bool) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(self.resolve(dir)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() != want_dirs {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !is_hidden(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl FileIo for DiskIo {
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.resolve(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let target = self.resolve(path);
        let parent = target.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let temp = parent.join(format!(".{}.tmp", file_name));

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp)?;
        if let Err(e) = file.write_all(bytes) {
            drop(file);
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        replace_durably(file, &temp, &target)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        ignore_not_found(fs::remove_file(self.resolve(path)))
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<String>> {
        self.list(dir, false)
    }

    fn list_dirs(&self, dir: &Path) -> io::Result<Vec<String>> {
        self.list(dir, true)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path))
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }

    fn delete_dir(&self, path: &Path) -> io::Result<()> {
        ignore_not_found(fs::remove_dir_all(self.resolve(path)))
    }
}

/// In-memory filesystem with fault injection.
///
/// Each `fail_next_*` call arms that many consecutive failures of the matching
/// operation class. Listing counts as a read.
#[derive(Debug, Default)]
pub struct MemoryIo {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: RwLock<BTreeSet<PathBuf>>,
    read_faults: AtomicU32,
    write_faults: AtomicU32,
    delete_faults: AtomicU32,
}

impl MemoryIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.read_faults.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.write_faults.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_deletes(&self, count: u32) {
        self.delete_faults.store(count, Ordering::SeqCst);
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    fn trip(counter: &AtomicU32, op: &str) -> io::Result<()> {
        let armed = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            Err(io::Error::new(io::ErrorKind::Other, format!("injected {} fault", op)))
        } else {
            Ok(())
        }
    }

    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) if parent.as_os_str().is_empty() => true,
            Some(parent) => self.dirs.read().contains(parent),
        }
    }

    fn children<'a, I>(paths: I, dir: &Path) -> Vec<String>
    where
        I: Iterator<Item = &'a PathBuf>,
    {
        paths
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect()
    }
}

impl FileIo for MemoryIo {
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        Self::trip(&self.read_faults, "read")?;
        Ok(self.files.read().get(path).cloned())
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        Self::trip(&self.write_faults, "write")?;
        if !self.parent_exists(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "parent directory does not exist"));
        }
        self.files.write().insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        Self::trip(&self.delete_faults, "delete")?;
        self.files.write().remove(path);
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<String>> {
        Self::trip(&self.read_faults, "read")?;
        let files = self.files.read();
        Ok(Self::children(files.keys(), dir))
    }

    fn list_dirs(&self, dir: &Path) -> io::Result<Vec<String>> {
        Self::trip(&self.read_faults, "read")?;
        let dirs = self.dirs.read();
        Ok(Self::children(dirs.iter(), dir))
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        Self::trip(&self.write_faults, "write")?;
        let mut dirs = self.dirs.write();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.as_os_str().is_empty() || self.dirs.read().contains(path)
    }

    fn delete_dir(&self, path: &Path) -> io::Result<()> {
        Self::trip(&self.delete_faults, "delete")?;
        self.files.write().retain(|p, _| !p.starts_with(path));
        self.dirs.write().retain(|p| !p.starts_with(path));
        Ok(())
    }
}

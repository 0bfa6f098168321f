//! Platform-specific durable file replacement
//!
//! Document files are replaced by writing a temp file, syncing it, renaming it
//! over the old file and then syncing the parent directory so the rename itself
//! survives a power cut. Each platform maps to its strongest available primitive.

use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Flush a file's data to the device.
///
/// - Linux: fdatasync()
/// - macOS/iOS: fcntl(F_FULLFSYNC), plain fsync only reaches the drive cache there
/// - Windows: FlushFileBuffers()
/// - Other: file.sync_data()
fn sync_file_data(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fd comes from a live File reference and stays open for the call.
        let result = unsafe { libc::fdatasync(fd) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fd comes from a live File reference and stays open for the call.
        let result = unsafe { libc::fcntl(fd, libc::F_FULLFSYNC) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        let handle = file.as_raw_handle();
        // SAFETY: handle comes from a live File reference and stays open for the call.
        let result = unsafe { FlushFileBuffers(handle as *mut _) };
        if result != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows")))]
    {
        file.sync_data()
    }
}

/// Make a completed rename inside `dir` durable.
///
/// Directories cannot be opened for syncing on Windows; NTFS journals the
/// rename itself, so this is a no-op there.
fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        let handle = File::open(dir)?;
        handle.sync_all()
    }

    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(())
    }
}

/// Replace `target` with the fully written `temp` file so that after a crash
/// either the old or the new document is on disk, never a torn one.
///
/// Syncs the temp file, renames it over `target`, then syncs the parent
/// directory. The temp file is removed if the sync or rename fails. May block
/// for a long time under heavy I/O.
pub fn replace_durably(temp_file: File, temp: &Path, target: &Path) -> io::Result<()> {
    let synced = sync_file_data(&temp_file);
    drop(temp_file);
    if let Err(e) = synced.and_then(|()| fs::rename(temp, target)) {
        let _ = fs::remove_file(temp);
        return Err(e);
    }

    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => sync_dir(parent),
        _ => Ok(()),
    }
}

//! Platform-specific durable sync implementations
//!
//! Atomic record replacement needs two distinct flushes: the temp file's
//! contents before the rename, and the directory entry after it. Each
//! platform exposes these with different guarantees; this module maps both
//! operations to the strongest primitive available.

use std::fs::File;
use std::io;
use std::path::Path;

/// Ensures file contents are durably written to persistent storage before
/// returning.
///
/// Platform behaviors:
/// - Linux: fdatasync() - syncs data but not metadata (faster than fsync)
/// - macOS/iOS: fcntl(F_FULLFSYNC) - bypasses disk cache, ensures data reaches physical media
/// - Windows: FlushFileBuffers() - flushes internal buffers and requests device flush
/// - Other: file.sync_data() - Rust stdlib fallback
///
/// # Safety
/// This function makes system calls that may block for extended periods
/// during heavy I/O. The caller must not hold locks shared with other file
/// operations while syncing.
pub fn sync_file(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        // Linux: fdatasync() skips metadata (atime, mtime), which the
        // record format never relies on.
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fdatasync is a POSIX system call that operates on a valid file descriptor.
        // We obtain the fd from a valid File reference, so it is guaranteed to be open.
        let result = unsafe { libc::fdatasync(fd) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        // macOS/iOS: standard fsync() only reaches the disk's volatile write
        // cache, which can be lost on power failure. F_FULLFSYNC is the only
        // primitive with a real durability guarantee on Apple platforms.
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fcntl with F_FULLFSYNC is a macOS system call that operates on a valid fd.
        // We obtain the fd from a valid File reference, so it is guaranteed to be open.
        let result = unsafe { libc::fcntl(fd, libc::F_FULLFSYNC) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(target_os = "windows")]
    {
        // Windows: FlushFileBuffers() flushes internal buffers and requests
        // a device flush, the closest equivalent of fsync().
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        let handle = file.as_raw_handle();
        // SAFETY: FlushFileBuffers is a Windows API call on a valid file handle.
        // We obtain the handle from a valid File reference.
        let result = unsafe { FlushFileBuffers(handle as *mut _) };
        if result != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows")))]
    {
        // Fallback for other platforms (FreeBSD, etc.): Rust's sync_data()
        // maps to the best available sync primitive.
        file.sync_data()
    }
}

/// Flushes a directory so a rename performed inside it survives power loss.
///
/// On Unix a directory can be opened read-only and synced like a regular
/// file. Windows offers no stable way to flush a directory handle through
/// the standard file API, so this is a no-op there; NTFS journals metadata
/// updates on its own.
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        let handle = File::open(dir)?;
        sync_file(&handle)
    }

    #[cfg(windows)]
    {
        let _ = dir;
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    {
        let handle = File::open(dir)?;
        handle.sync_data()
    }
}

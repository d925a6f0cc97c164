//! Injected file-system capability.
//!
//! The timeline never calls `std::fs` directly. Everything it needs from
//! storage goes through [`FileSystem`], so hosts can supply sandboxed storage
//! and tests can capture every written line with [`MemoryFileSystem`].

mod disk;
mod memory;

pub use disk::DiskFileSystem;
pub use memory::MemoryFileSystem;

use std::io;
use std::sync::Arc;

/// An append-only text file handle.
pub trait LogFile: Send {
    /// Append one line. The line must not contain a newline.
    ///
    /// The line is durable when this returns.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Flush and release the handle. Further writes fail.
    fn close(&mut self) -> io::Result<()>;
}

/// Storage operations used by the timeline.
pub trait FileSystem: Send + Sync {
    /// Open `path` for appending, creating it if needed.
    fn open_file(&self, path: &str) -> io::Result<Box<dyn LogFile>>;

    /// All lines of `path`, first to last.
    fn read_lines(&self, path: &str) -> io::Result<Vec<String>>;

    /// All lines of `path`, last to first.
    fn read_lines_reverse(&self, path: &str) -> io::Result<Vec<String>> {
        let mut lines = self.read_lines(path)?;
        lines.reverse();
        Ok(lines)
    }

    /// Remove `path`. Succeeds if it does not exist.
    fn delete_file(&self, path: &str) -> io::Result<()>;

    /// Replace the contents of `old_path` with the file at `new_path`, removing `new_path`.
    fn replace_file(&self, old_path: &str, new_path: &str) -> io::Result<()>;

    /// Size of `path` in bytes.
    fn file_length(&self, path: &str) -> io::Result<u64>;
}

/// Shared handle to a file system implementation.
pub type SharedFileSystem = Arc<dyn FileSystem>;

pub(crate) fn closed_handle() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "file handle is closed")
}

/// Lines must not break the one-record-per-line layout.
pub(crate) fn check_line(line: &str) -> io::Result<()> {
    if line.contains(['\n', '\r']) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "log line contains a line break",
        ));
    }
    Ok(())
}

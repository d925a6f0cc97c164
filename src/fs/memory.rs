//! In-memory file system.
//!
//! Files are vectors of lines behind a shared lock. Cloning the file system
//! shares the same storage, so a test can keep a clone and inspect exactly
//! what a machine wrote.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{check_line, closed_handle, FileSystem, LogFile};

type Files = Arc<Mutex<HashMap<String, Vec<String>>>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Files,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a file with the given lines.
    pub fn insert<I, S>(&self, path: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files
            .lock()
            .insert(path.to_string(), lines.into_iter().map(Into::into).collect());
    }

    /// Snapshot of a file's lines, empty if it does not exist.
    pub fn lines(&self, path: &str) -> Vec<String> {
        self.files.lock().get(path).cloned().unwrap_or_default()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    /// While set, every line written through any handle fails as if the disk were full.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

struct MemoryLogFile {
    path: String,
    files: Option<Files>,
    fail_writes: Arc<AtomicBool>,
}

impl LogFile for MemoryLogFile {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let files = self.files.as_ref().ok_or_else(closed_handle)?;
        check_line(line)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        files
            .lock()
            .entry(self.path.clone())
            .or_default()
            .push(line.to_string());
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.files = None;
        Ok(())
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path))
}

impl FileSystem for MemoryFileSystem {
    fn open_file(&self, path: &str) -> io::Result<Box<dyn LogFile>> {
        self.files.lock().entry(path.to_string()).or_default();
        Ok(Box::new(MemoryLogFile {
            path: path.to_string(),
            files: Some(self.files.clone()),
            fail_writes: self.fail_writes.clone(),
        }))
    }

    fn read_lines(&self, path: &str) -> io::Result<Vec<String>> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn delete_file(&self, path: &str) -> io::Result<()> {
        self.files.lock().remove(path);
        Ok(())
    }

    fn replace_file(&self, old_path: &str, new_path: &str) -> io::Result<()> {
        let mut files = self.files.lock();
        let lines = files.remove(new_path).ok_or_else(|| not_found(new_path))?;
        files.insert(old_path.to_string(), lines);
        Ok(())
    }

    fn file_length(&self, path: &str) -> io::Result<u64> {
        let files = self.files.lock();
        let lines = files.get(path).ok_or_else(|| not_found(path))?;
        Ok(lines.iter().map(|l| l.len() as u64 + 1).sum())
    }
}

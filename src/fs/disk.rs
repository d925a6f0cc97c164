//! `std::fs` backed file system.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use super::{check_line, closed_handle, FileSystem, LogFile};

/// File system rooted at an optional base directory.
///
/// Relative paths are resolved against the base; absolute paths are used as-is.
#[derive(Debug, Clone, Default)]
pub struct DiskFileSystem {
    base: Option<PathBuf>,
}

impl DiskFileSystem {
    /// Resolve paths against the process working directory.
    pub fn new() -> Self {
        Self { base: None }
    }

    /// Resolve relative paths against `base`.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.base {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        }
    }
}

struct DiskLogFile {
    file: Option<File>,
}

impl LogFile for DiskLogFile {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed_handle)?;
        check_line(line)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }
}

impl FileSystem for DiskFileSystem {
    fn open_file(&self, path: &str) -> io::Result<Box<dyn LogFile>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path))?;
        Ok(Box::new(DiskLogFile { file: Some(file) }))
    }

    fn read_lines(&self, path: &str) -> io::Result<Vec<String>> {
        let reader = BufReader::new(File::open(self.resolve(path))?);
        reader
            .lines()
            .map(|line| line.map(|l| l.trim_end_matches('\r').to_string()))
            .collect()
    }

    fn delete_file(&self, path: &str) -> io::Result<()> {
        match fs::remove_file(self.resolve(path)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn replace_file(&self, old_path: &str, new_path: &str) -> io::Result<()> {
        fs::rename(self.resolve(new_path), self.resolve(old_path))
    }

    fn file_length(&self, path: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.resolve(path))?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_read_replace() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DiskFileSystem::with_base(dir.path());

        let mut file = fs.open_file("a.log").unwrap();
        file.write_line("one").unwrap();
        file.write_line("two").unwrap();
        file.close().unwrap();
        assert!(file.write_line("three").is_err());

        assert_eq!(fs.read_lines("a.log").unwrap(), vec!["one", "two"]);
        assert_eq!(fs.read_lines_reverse("a.log").unwrap(), vec!["two", "one"]);
        assert_eq!(fs.file_length("a.log").unwrap(), 8);

        let mut tmp = fs.open_file("a.log.tmp").unwrap();
        tmp.write_line("new").unwrap();
        tmp.close().unwrap();
        fs.replace_file("a.log", "a.log.tmp").unwrap();

        assert_eq!(fs.read_lines("a.log").unwrap(), vec!["new"]);
        assert!(fs.read_lines("a.log.tmp").is_err());
    }

    #[test]
    fn test_delete_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DiskFileSystem::with_base(dir.path());
        fs.delete_file("missing.log").unwrap();
    }
}

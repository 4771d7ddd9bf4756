use std::fs::{self, File};
use std::io::{self, Stdout, Write};
use std::path::PathBuf;

/// A created file that is deleted again when dropped, unless it was marked to
/// persist. Half-written output never survives a failed run.
pub struct TransientFile {
    file: File,
    path: PathBuf,
    persist: bool,
}

impl TransientFile {
    pub fn create<P: Into<PathBuf>>(path: P) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self {
            file,
            path,
            persist: false,
        })
    }

    pub fn set_persist(&mut self, persist: bool) {
        self.persist = persist;
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if !self.persist {
            // We can't report an error or panic here, so just ignore the result.
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Write for TransientFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Where a command-line tool sends its result.
pub enum Output {
    File(TransientFile),
    Stdout(Stdout),
}

impl Output {
    /// Keep the output: a no-op for stdout.
    pub fn persist(&mut self) {
        if let Output::File(f) = self {
            f.set_persist(true);
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::File(f) => f.write(buf),
            Output::Stdout(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::File(f) => f.flush(),
            Output::Stdout(s) => s.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_file() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("dropped");
        let kept = dir.path().join("kept");

        {
            let mut f = TransientFile::create(&dropped).unwrap();
            f.write_all(b"gone").unwrap();
        }
        assert!(fs::metadata(&dropped).is_err());

        {
            let mut f = Output::File(TransientFile::create(&kept).unwrap());
            f.write_all(b"here").unwrap();
            f.persist();
        }
        assert_eq!(fs::read(&kept).unwrap(), b"here");
    }
}

// Regular-file sink backed by the mounted filesystem

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::UploadError;
use crate::sink::{SinkReport, UploadSink};

pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
}

impl FileSink {
    /// Open the sink at `path`: missing parent directories are created
    /// (already-existing ones are fine), a pre-existing file is removed,
    /// and the file is created fresh in truncate mode.
    pub fn create(path: &Path) -> Result<Self, UploadError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    UploadError::SinkOpenFailed(format!("create folder {}: {e}", parent.display()))
                })?;
            }
        }
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(UploadError::SinkOpenFailed(format!(
                    "remove stale {}: {e}",
                    path.display()
                )))
            }
        }
        let file = File::create(path)
            .map_err(|e| UploadError::SinkOpenFailed(format!("open {}: {e}", path.display())))?;
        log::info!("Receiving file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            bytes_written: 0,
        })
    }
}

impl UploadSink for FileSink {
    fn write(&mut self, data: &[u8]) -> Result<(), UploadError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| UploadError::SinkWriteFailed("file already closed".into()))?;
        file.write_all(data)
            .map_err(|e| UploadError::SinkWriteFailed(format!("{}: {e}", self.path.display())))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<SinkReport, UploadError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .map_err(|e| UploadError::SinkWriteFailed(format!("{}: {e}", self.path.display())))?;
        }
        log::info!("Closed {} ({} bytes)", self.path.display(), self.bytes_written);
        Ok(SinkReport {
            bytes_written: self.bytes_written,
            sha256: None,
        })
    }

    fn abort(&mut self) {
        self.file.take();
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Could not remove partial file {}: {e}", self.path.display());
        } else {
            log::warn!("Removed partial file {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("serviceweb-core-{}-{tag}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = scratch_dir("parents");
        let path = dir.join("a/b/c.txt");
        let mut sink = FileSink::create(&path).unwrap();
        sink.write(b"nested").unwrap();
        let report = sink.finalize().unwrap();
        assert_eq!(report.bytes_written, 6);
        assert_eq!(fs::read(&path).unwrap(), b"nested");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn replaces_a_pre_existing_file() {
        let dir = scratch_dir("replace");
        let path = dir.join("f.bin");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, b"old contents that are longer").unwrap();
        let mut sink = FileSink::create(&path).unwrap();
        sink.write(b"new").unwrap();
        sink.finalize().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn abort_removes_the_partial_file() {
        let dir = scratch_dir("abort");
        let path = dir.join("partial.bin");
        let mut sink = FileSink::create(&path).unwrap();
        sink.write(b"half an upl").unwrap();
        sink.abort();
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}

// Upload byte sinks: where decoded bytes go

pub mod file;
pub mod flash;

pub use file::FileSink;
pub use flash::{FlashRegionSink, Partition};

use crate::error::UploadError;

/// Completion bookkeeping returned by [`UploadSink::finalize`].
#[derive(Debug, Clone)]
pub struct SinkReport {
    pub bytes_written: u64,
    /// Digest of every byte written, where the sink computes one.
    pub sha256: Option<[u8; 32]>,
}

/// Polymorphic destination for decoded upload bytes.
pub trait UploadSink {
    fn write(&mut self, data: &[u8]) -> Result<(), UploadError>;

    /// Close out a completed part.
    fn finalize(&mut self) -> Result<SinkReport, UploadError>;

    /// Best-effort teardown after a fatal request error; never fails.
    fn abort(&mut self);
}

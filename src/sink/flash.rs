// Flash-region sink for firmware and web-asset images

use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::UploadError;
use crate::sink::{SinkReport, UploadSink};

/// A writable flash region, as exposed by the platform's partition driver.
/// The OTA app slot and the web-asset partition both look like this.
pub trait Partition {
    type Error: fmt::Display;

    fn capacity(&self) -> usize;

    /// Erase the full region.
    fn erase(&mut self) -> Result<(), Self::Error>;

    /// Program `data` at `offset`. Offsets are sink-managed and strictly
    /// sequential.
    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error>;
}

/// Sequential-write sink over a [`Partition`]. Erases the region exactly
/// once when opened, tracks the write offset itself, and refuses writes
/// past capacity. Whether the region becomes bootable is decided by the
/// OTA layer after it has seen the completion report.
pub struct FlashRegionSink<P: Partition> {
    partition: P,
    written: usize,
    digest: Sha256,
}

impl<P: Partition> FlashRegionSink<P> {
    pub fn open(mut partition: P) -> Result<Self, UploadError> {
        partition
            .erase()
            .map_err(|e| UploadError::SinkOpenFailed(format!("erase failed: {e}")))?;
        log::info!("Flash region erased, capacity {} bytes", partition.capacity());
        Ok(Self {
            partition,
            written: 0,
            digest: Sha256::new(),
        })
    }

    pub fn bytes_written(&self) -> usize {
        self.written
    }
}

impl<P: Partition> UploadSink for FlashRegionSink<P> {
    fn write(&mut self, data: &[u8]) -> Result<(), UploadError> {
        if self.written + data.len() > self.partition.capacity() {
            return Err(UploadError::RegionFull);
        }
        self.partition
            .write_at(self.written, data)
            .map_err(|e| UploadError::SinkWriteFailed(format!("flash write at {}: {e}", self.written)))?;
        self.digest.update(data);
        self.written += data.len();
        Ok(())
    }

    fn finalize(&mut self) -> Result<SinkReport, UploadError> {
        log::info!("Flash image complete, {} bytes", self.written);
        Ok(SinkReport {
            bytes_written: self.written as u64,
            sha256: Some(self.digest.finalize_reset().into()),
        })
    }

    fn abort(&mut self) {
        // Nothing to roll back; the region is simply left incomplete and
        // must not be marked bootable.
        log::warn!("Flash upload aborted after {} bytes", self.written);
    }
}

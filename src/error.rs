// Request-level error taxonomy for the upload pipeline

use std::fmt;

/// Fatal outcome of an upload request. The external router turns this into
/// a 4xx/5xx response via [`UploadError::status`]; all sinks opened by the
/// request have been finalized or aborted by the time this is returned.
#[derive(Debug)]
pub enum UploadError {
    /// No `boundary=` in the content type, or the body ended before the
    /// first boundary was seen. No file has been created.
    MissingBoundary,
    /// A part header block could not be used (terminator never arrived
    /// within the size cap).
    MalformedHeader,
    /// Directory, file or partition could not be opened for writing.
    SinkOpenFailed(String),
    /// Writing decoded bytes to the sink failed.
    SinkWriteFailed(String),
    /// The image is larger than the target flash region.
    RegionFull,
    /// Reading the request body failed mid-transfer.
    TransportReadError,
}

impl UploadError {
    /// HTTP status code and plaintext reason for the error response.
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            UploadError::MissingBoundary => (400, "Boundary not found in content type"),
            UploadError::MalformedHeader => (400, "Malformed multipart header"),
            UploadError::SinkOpenFailed(_) => (500, "Failed to open destination for writing"),
            UploadError::SinkWriteFailed(_) => (500, "Failed to write received data"),
            UploadError::RegionFull => (500, "Image larger than target partition"),
            UploadError::TransportReadError => (500, "File reception failed"),
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::MissingBoundary => write!(f, "boundary not found in content type"),
            UploadError::MalformedHeader => write!(f, "malformed multipart header"),
            UploadError::SinkOpenFailed(why) => write!(f, "failed to open sink: {why}"),
            UploadError::SinkWriteFailed(why) => write!(f, "failed to write to sink: {why}"),
            UploadError::RegionFull => write!(f, "flash region capacity exceeded"),
            UploadError::TransportReadError => write!(f, "request body read failed"),
        }
    }
}

impl std::error::Error for UploadError {}

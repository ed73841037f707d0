// Per-request upload drivers. Routing, query parsing and response writing
// live in the platform HTTP layer; these take the already-extracted pieces
// (content type, destination, partition) and drive the body to completion.

use std::path::{Path, PathBuf};

use crate::error::UploadError;
use crate::multipart::{MultipartDecoder, PartProvider, PartSummary};
use crate::sink::{FileSink, FlashRegionSink, Partition, UploadSink};
use crate::transport::{ChunkReadError, ChunkSource};

/// Boundary tokens beyond this are not something the HTTP layer produces.
const BOUNDARY_MAX_LEN: usize = 100;

/// Per-read buffer, matching the platform server's receive buffer.
const CHUNK_BUF_LEN: usize = 512;

/// Outcome of a completed file upload, one entry per decoded file part.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub parts: Vec<PartSummary>,
}

/// Outcome of a completed image upload (firmware or web assets). The OTA
/// layer checks the digest before marking anything bootable.
#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub bytes_written: u64,
    pub sha256: [u8; 32],
}

impl ImageSummary {
    pub fn sha256_hex(&self) -> String {
        self.sha256.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Extract the bare boundary token from a Content-Type header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    let rest = &content_type[content_type.find("boundary=")? + "boundary=".len()..];
    let token = rest.split(';').next().unwrap_or(rest).trim();
    let token = token.strip_prefix('"').unwrap_or(token);
    let token = token.strip_suffix('"').unwrap_or(token);
    if token.is_empty() || token.len() > BOUNDARY_MAX_LEN {
        return None;
    }
    Some(token)
}

/// `POST /upload?dir=…` — decode every file part into `dest_dir`.
pub fn handle_file_upload<C: ChunkSource>(
    source: &mut C,
    content_type: &str,
    dest_dir: &Path,
) -> Result<UploadSummary, UploadError> {
    let boundary = boundary_from_content_type(content_type).ok_or_else(|| {
        log::error!("Boundary not found in content type");
        UploadError::MissingBoundary
    })?;
    let parts = run_multipart(source, boundary, DirectoryParts::new(dest_dir))?;
    Ok(UploadSummary { parts })
}

/// `POST /update/firmware` — stream the single firmware part into the
/// inactive app partition. On success the caller hands the summary to the
/// OTA layer, which alone decides to mark the partition bootable.
pub fn handle_firmware_upload<C, P>(
    source: &mut C,
    content_type: &str,
    partition: P,
) -> Result<ImageSummary, UploadError>
where
    C: ChunkSource,
    P: Partition + 'static,
{
    let boundary = boundary_from_content_type(content_type).ok_or_else(|| {
        log::error!("Boundary not found in content type");
        UploadError::MissingBoundary
    })?;
    let provider = SingleImageParts {
        sink: Some(FlashRegionSink::open(partition)?),
    };
    let parts = run_multipart(source, boundary, provider)?;
    image_summary(parts)
}

/// `POST /update/web` — raw, non-multipart body straight into the asset
/// partition.
pub fn handle_web_upload<C, P>(source: &mut C, partition: P) -> Result<ImageSummary, UploadError>
where
    C: ChunkSource,
    P: Partition,
{
    let mut sink = FlashRegionSink::open(partition)?;
    let mut buf = [0u8; CHUNK_BUF_LEN];
    loop {
        match source.read_chunk(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = sink.write(&buf[..n]) {
                    sink.abort();
                    return Err(e);
                }
            }
            Err(ChunkReadError::TimedOut) => continue,
            Err(ChunkReadError::Closed) => {
                log::error!("File reception failed");
                sink.abort();
                return Err(UploadError::TransportReadError);
            }
        }
    }
    let report = sink.finalize()?;
    image_summary(vec![PartSummary {
        filename: String::new(),
        bytes_written: report.bytes_written,
        sha256: report.sha256,
    }])
}

fn run_multipart<C: ChunkSource, P: PartProvider>(
    source: &mut C,
    boundary: &str,
    provider: P,
) -> Result<Vec<PartSummary>, UploadError> {
    let mut decoder = MultipartDecoder::new(boundary, provider);
    let mut buf = [0u8; CHUNK_BUF_LEN];
    loop {
        match source.read_chunk(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = decoder.push_chunk(&buf[..n]) {
                    decoder.abort();
                    return Err(e);
                }
            }
            Err(ChunkReadError::TimedOut) => continue,
            Err(ChunkReadError::Closed) => {
                log::error!("File reception failed");
                decoder.abort();
                return Err(UploadError::TransportReadError);
            }
        }
    }
    decoder.finish()
}

fn image_summary(parts: Vec<PartSummary>) -> Result<ImageSummary, UploadError> {
    let part = parts.into_iter().next().ok_or_else(|| {
        log::error!("Upload contained no image part");
        UploadError::MalformedHeader
    })?;
    let sha256 = match part.sha256 {
        Some(d) => d,
        None => return Err(UploadError::SinkWriteFailed("image digest missing".into())),
    };
    Ok(ImageSummary {
        bytes_written: part.bytes_written,
        sha256,
    })
}

/// Opens one [`FileSink`] per part underneath the request's target
/// directory.
struct DirectoryParts {
    dest_dir: PathBuf,
}

impl DirectoryParts {
    fn new(dest_dir: &Path) -> Self {
        Self {
            dest_dir: dest_dir.to_path_buf(),
        }
    }
}

impl PartProvider for DirectoryParts {
    fn open(&mut self, filename: &str) -> Result<Box<dyn UploadSink>, UploadError> {
        let sink = FileSink::create(&self.dest_dir.join(filename))?;
        Ok(Box::new(sink))
    }
}

/// Yields the flash sink for the first file part; a second part means the
/// client sent something other than one firmware image.
struct SingleImageParts<P: Partition> {
    sink: Option<FlashRegionSink<P>>,
}

impl<P: Partition + 'static> PartProvider for SingleImageParts<P> {
    fn open(&mut self, _filename: &str) -> Result<Box<dyn UploadSink>, UploadError> {
        match self.sink.take() {
            Some(sink) => Ok(Box::new(sink)),
            None => Err(UploadError::SinkOpenFailed(
                "firmware image already received".into(),
            )),
        }
    }
}

//! Multipart body decoder.
//!
//! Turns a stream of body chunks into opened sinks and streamed part bytes.
//! The opening delimiter is `--<boundary>`; part bodies end at
//! `\r\n--<boundary>`, so the CRLF that terminates a body is not written and
//! the decoded bytes are identical to what the client sent. Parts without a
//! usable filename are discarded up to the next delimiter.

use crate::error::UploadError;
use crate::multipart::scanner::{BoundaryScanner, Scan};
use crate::sink::UploadSink;

/// A part header block is a few short ASCII lines; anything bigger than
/// this without a terminator is garbage.
const MAX_PART_HEADER_LEN: usize = 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Opens the destination sink for each file part.
pub trait PartProvider {
    fn open(&mut self, filename: &str) -> Result<Box<dyn UploadSink>, UploadError>;
}

/// Bookkeeping for one completed file part.
#[derive(Debug, Clone)]
pub struct PartSummary {
    pub filename: String,
    pub bytes_written: u64,
    pub sha256: Option<[u8; 32]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    SeekingBoundary,
    ReadingHeaders,
    StreamingBody,
}

pub struct MultipartDecoder<P: PartProvider> {
    provider: P,
    open_token: Vec<u8>,
    close_token: Vec<u8>,
    scanner: BoundaryScanner,
    phase: Phase,
    sink: Option<Box<dyn UploadSink>>,
    filename: String,
    saw_boundary: bool,
    parts: Vec<PartSummary>,
}

impl<P: PartProvider> MultipartDecoder<P> {
    /// `boundary` is the bare token from the content type, without dashes.
    pub fn new(boundary: &str, provider: P) -> Self {
        let open_token = format!("--{boundary}").into_bytes();
        let close_token = format!("\r\n--{boundary}").into_bytes();
        let scanner = BoundaryScanner::new(&open_token);
        Self {
            provider,
            open_token,
            close_token,
            scanner,
            phase: Phase::SeekingBoundary,
            sink: None,
            filename: String::new(),
            saw_boundary: false,
            parts: Vec::new(),
        }
    }

    /// Feed the next body chunk through the state machine.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        self.scanner.push(chunk);
        loop {
            let progressed = match self.phase {
                Phase::SeekingBoundary => self.seek_boundary(),
                Phase::ReadingHeaders => self.read_headers()?,
                Phase::StreamingBody => self.stream_body()?,
            };
            if !progressed {
                return Ok(());
            }
        }
    }

    /// End of body. Implicitly closes a still-open part; a body that never
    /// contained a boundary is a protocol error.
    pub fn finish(mut self) -> Result<Vec<PartSummary>, UploadError> {
        if self.phase == Phase::StreamingBody {
            // The retained possible-delimiter tail turned out to be data.
            let tail = self.scanner.window().to_vec();
            self.write_body(&tail)?;
            self.close_part()?;
        }
        if !self.saw_boundary {
            return Err(UploadError::MissingBoundary);
        }
        log::info!("File reception complete, {} part(s)", self.parts.len());
        Ok(self.parts)
    }

    /// Tear down after a fatal error; any open sink is aborted.
    pub fn abort(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.abort();
        }
    }

    fn seek_boundary(&mut self) -> bool {
        match self.scanner.scan() {
            Scan::Found { at } => {
                self.saw_boundary = true;
                self.scanner.consume(at + self.scanner.token_len());
                self.scanner.retarget(HEADER_TERMINATOR);
                self.phase = Phase::ReadingHeaders;
                true
            }
            Scan::NotFound { released } => {
                // Preamble, or the trailing "--" of the final delimiter.
                self.scanner.consume(released);
                false
            }
        }
    }

    fn read_headers(&mut self) -> Result<bool, UploadError> {
        match self.scanner.scan() {
            Scan::Found { at } => {
                let headers = self.scanner.window()[..at].to_vec();
                self.scanner.consume(at + HEADER_TERMINATOR.len());
                self.begin_part(&headers)?;
                self.scanner.retarget(&self.close_token);
                self.phase = Phase::StreamingBody;
                Ok(true)
            }
            Scan::NotFound { .. } => {
                // The header block must stay contiguous until its terminator
                // arrives, however many chunks that takes.
                if self.scanner.window().len() > MAX_PART_HEADER_LEN {
                    return Err(UploadError::MalformedHeader);
                }
                Ok(false)
            }
        }
    }

    fn stream_body(&mut self) -> Result<bool, UploadError> {
        match self.scanner.scan() {
            Scan::Found { at } => {
                let body = self.scanner.window()[..at].to_vec();
                self.write_body(&body)?;
                self.close_part()?;
                // Leave the delimiter in the window; the seek phase consumes
                // it and positions us for the next part or the final "--".
                self.scanner.consume(at);
                self.scanner.retarget(&self.open_token);
                self.phase = Phase::SeekingBoundary;
                Ok(true)
            }
            Scan::NotFound { released } => {
                let body = self.scanner.window()[..released].to_vec();
                self.write_body(&body)?;
                self.scanner.consume(released);
                Ok(false)
            }
        }
    }

    fn begin_part(&mut self, headers: &[u8]) -> Result<(), UploadError> {
        match extract_filename(headers) {
            Some(filename) => {
                let sink = self.provider.open(&filename)?;
                self.sink = Some(sink);
                self.filename = filename;
            }
            None => {
                // Not a file part (or an unusable filename): discard its body.
                log::info!("Skipping part without usable filename");
                self.sink = None;
            }
        }
        Ok(())
    }

    fn write_body(&mut self, data: &[u8]) -> Result<(), UploadError> {
        if data.is_empty() {
            return Ok(());
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.write(data)?;
        }
        Ok(())
    }

    fn close_part(&mut self) -> Result<(), UploadError> {
        if let Some(mut sink) = self.sink.take() {
            let report = sink.finalize()?;
            self.parts.push(PartSummary {
                filename: std::mem::take(&mut self.filename),
                bytes_written: report.bytes_written,
                sha256: report.sha256,
            });
        }
        Ok(())
    }
}

/// Pull the `filename="…"` attribute out of a part header block. Returns
/// None for non-file parts and for filenames an upload must not honor
/// (empty, absolute, or climbing out of the destination directory).
fn extract_filename(headers: &[u8]) -> Option<String> {
    let headers = std::str::from_utf8(headers).ok()?;
    let disposition = headers
        .split("\r\n")
        .find(|line| line.to_ascii_lowercase().starts_with("content-disposition:"))?;
    let rest = disposition.split_once("filename=\"")?.1;
    let filename = rest.split_once('"')?.0;
    if filename.is_empty() || filename.starts_with('/') || filename.contains('\\') {
        log::warn!("Rejecting filename {filename:?}");
        return None;
    }
    if filename.split('/').any(|seg| seg == "..") {
        log::warn!("Rejecting filename {filename:?}");
        return None;
    }
    Some(filename.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkReport;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    type Files = Rc<RefCell<BTreeMap<String, Vec<u8>>>>;

    #[derive(Default)]
    struct MemProvider {
        files: Files,
        aborted: Rc<RefCell<Vec<String>>>,
    }

    struct MemSink {
        name: String,
        buf: Vec<u8>,
        files: Files,
        aborted: Rc<RefCell<Vec<String>>>,
    }

    impl PartProvider for MemProvider {
        fn open(&mut self, filename: &str) -> Result<Box<dyn UploadSink>, UploadError> {
            Ok(Box::new(MemSink {
                name: filename.to_string(),
                buf: Vec::new(),
                files: self.files.clone(),
                aborted: self.aborted.clone(),
            }))
        }
    }

    impl UploadSink for MemSink {
        fn write(&mut self, data: &[u8]) -> Result<(), UploadError> {
            self.buf.extend_from_slice(data);
            Ok(())
        }

        fn finalize(&mut self) -> Result<SinkReport, UploadError> {
            let bytes = self.buf.len() as u64;
            self.files
                .borrow_mut()
                .insert(self.name.clone(), std::mem::take(&mut self.buf));
            Ok(SinkReport {
                bytes_written: bytes,
                sha256: None,
            })
        }

        fn abort(&mut self) {
            self.aborted.borrow_mut().push(self.name.clone());
        }
    }

    fn decode_chunked(body: &[u8], chunk_len: usize) -> (Result<Vec<PartSummary>, UploadError>, Files) {
        let provider = MemProvider::default();
        let files = provider.files.clone();
        let mut decoder = MultipartDecoder::new("BND", provider);
        for chunk in body.chunks(chunk_len.max(1)) {
            if let Err(e) = decoder.push_chunk(chunk) {
                return (Err(e), files);
            }
        }
        (decoder.finish(), files)
    }

    fn one_part_body(filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--BND\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n--BND--\r\n");
        body
    }

    #[test]
    fn decodes_single_part() {
        let body = one_part_body("a.txt", b"hello world");
        let (parts, files) = decode_chunked(&body, body.len());
        let parts = parts.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].filename, "a.txt");
        assert_eq!(parts[0].bytes_written, 11);
        assert_eq!(files.borrow()["a.txt"], b"hello world");
    }

    #[test]
    fn decodes_two_parts_with_distinct_contents() {
        let mut body = Vec::new();
        body.extend_from_slice(
            b"--BND\r\nContent-Disposition: form-data; name=\"files\"; filename=\"one.bin\"\r\n\r\nfirst",
        );
        body.extend_from_slice(
            b"\r\n--BND\r\nContent-Disposition: form-data; name=\"files\"; filename=\"two.bin\"\r\n\r\nsecond part",
        );
        body.extend_from_slice(b"\r\n--BND--\r\n");
        for chunk_len in [1, 3, 7, body.len()] {
            let (parts, files) = decode_chunked(&body, chunk_len);
            assert_eq!(parts.unwrap().len(), 2, "chunk_len {chunk_len}");
            assert_eq!(files.borrow()["one.bin"], b"first");
            assert_eq!(files.borrow()["two.bin"], b"second part");
        }
    }

    #[test]
    fn body_without_boundary_is_a_protocol_error() {
        let (result, files) = decode_chunked(b"just some bytes, no delimiter", 8);
        assert!(matches!(result, Err(UploadError::MissingBoundary)));
        assert!(files.borrow().is_empty());
    }

    #[test]
    fn part_without_filename_is_skipped() {
        let mut body = Vec::new();
        body.extend_from_slice(
            b"--BND\r\nContent-Disposition: form-data; name=\"comment\"\r\n\r\nnot a file",
        );
        body.extend_from_slice(
            b"\r\n--BND\r\nContent-Disposition: form-data; name=\"files\"; filename=\"keep.txt\"\r\n\r\nkept",
        );
        body.extend_from_slice(b"\r\n--BND--\r\n");
        let (parts, files) = decode_chunked(&body, 5);
        assert_eq!(parts.unwrap().len(), 1);
        assert_eq!(files.borrow().len(), 1);
        assert_eq!(files.borrow()["keep.txt"], b"kept");
    }

    #[test]
    fn traversal_filenames_are_skipped() {
        for bad in ["../../etc/passwd", "/etc/passwd", "a/../../b"] {
            let body = one_part_body(bad, b"payload");
            let (parts, files) = decode_chunked(&body, 16);
            assert!(parts.unwrap().is_empty(), "{bad}");
            assert!(files.borrow().is_empty(), "{bad}");
        }
    }

    #[test]
    fn subdirectory_filenames_are_allowed() {
        let body = one_part_body("sub/dir/file.txt", b"nested");
        let (parts, _) = decode_chunked(&body, 9);
        assert_eq!(parts.unwrap()[0].filename, "sub/dir/file.txt");
    }

    #[test]
    fn missing_final_boundary_still_finalizes_the_open_part() {
        let mut body =
            b"--BND\r\nContent-Disposition: form-data; name=\"f\"; filename=\"cut.bin\"\r\n\r\n"
                .to_vec();
        body.extend_from_slice(b"truncated payload");
        let (parts, files) = decode_chunked(&body, 4);
        let parts = parts.unwrap();
        assert_eq!(parts[0].filename, "cut.bin");
        assert_eq!(files.borrow()["cut.bin"], b"truncated payload");
    }

    #[test]
    fn unterminated_header_block_is_malformed() {
        let mut body = b"--BND\r\nContent-Disposition: form-data".to_vec();
        body.extend_from_slice(&vec![b'x'; MAX_PART_HEADER_LEN + 64]);
        let (result, files) = decode_chunked(&body, 32);
        assert!(matches!(result, Err(UploadError::MalformedHeader)));
        assert!(files.borrow().is_empty());
    }

    #[test]
    fn abort_reaches_the_open_sink() {
        let provider = MemProvider::default();
        let aborted = provider.aborted.clone();
        let mut decoder = MultipartDecoder::new("BND", provider);
        decoder
            .push_chunk(
                b"--BND\r\nContent-Disposition: form-data; name=\"f\"; filename=\"part.bin\"\r\n\r\nsome data",
            )
            .unwrap();
        decoder.abort();
        assert_eq!(aborted.borrow().as_slice(), ["part.bin"]);
    }

    proptest! {
        // Any content, any chunking, including splits inside the delimiter,
        // the header terminator and the payload: decoded bytes match.
        #[test]
        fn chunking_round_trip(
            content in proptest::collection::vec(any::<u8>().prop_map(|b| if b == b'-' { b'x' } else { b }), 0..300),
            chunk_len in 1usize..64,
        ) {
            let body = one_part_body("data.bin", &content);
            let (parts, files) = decode_chunked(&body, chunk_len);
            let parts = parts.unwrap();
            prop_assert_eq!(parts.len(), 1);
            prop_assert_eq!(parts[0].bytes_written as usize, content.len());
            let files_ref = files.borrow();
            prop_assert_eq!(files_ref["data.bin"].as_slice(), content.as_slice());
        }
    }
}

// Streaming multipart/form-data decoding

pub mod decoder;
pub mod scanner;

pub use decoder::{MultipartDecoder, PartProvider, PartSummary};
pub use scanner::{BoundaryScanner, Scan};

//! Serviceweb Core - Hardware-independent device control-plane logic
//!
//! This crate contains the web-service logic that can be tested on the host
//! platform without requiring device hardware: streaming multipart upload
//! decoding into file or flash sinks, and the websocket parameter pub/sub
//! engine. The HTTP server, the flash driver and the parameter subsystem are
//! reached through the seams in [`transport`], [`sink::flash`] and
//! [`params`].

pub mod error;
pub mod multipart;
pub mod params;
pub mod sink;
pub mod transport;
pub mod upload;

pub use error::UploadError;
pub use upload::{handle_file_upload, handle_firmware_upload, handle_web_upload};

// Collaborator seams: websocket send primitives and request body reads.
// The platform HTTP server implements these; everything in this crate is
// written against the traits so it can run host-side under test.

use std::fmt;
use std::sync::Arc;

/// Connection handle as issued by the HTTP server (the socket descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(pub i32);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound websocket frames. Send failures mean the connection is dead;
/// the caller feeds them into subscription cleanup.
pub trait Transport: Send {
    /// Send a text frame. Returns false if the send failed.
    fn send_text(&self, conn: ConnId, payload: &str) -> bool;

    /// Send a text frame immediately followed by a binary frame, as one
    /// logical message. Returns false if either send failed.
    fn send_binary(&self, conn: ConnId, header: &[u8], payload: &[u8]) -> bool;
}

impl<T: Transport + ?Sized + Sync> Transport for Arc<T> {
    fn send_text(&self, conn: ConnId, payload: &str) -> bool {
        (**self).send_text(conn, payload)
    }

    fn send_binary(&self, conn: ConnId, header: &[u8], payload: &[u8]) -> bool {
        (**self).send_binary(conn, header, payload)
    }
}

/// Failure reading the next request-body chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkReadError {
    /// Socket timeout; the read may be retried.
    TimedOut,
    /// The peer went away mid-body.
    Closed,
}

/// Source of HTTP request body bytes, delivered in bounded chunks.
pub trait ChunkSource {
    /// Read the next chunk into `buf`. `Ok(0)` signals end of body.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ChunkReadError>;
}

//! Token matching across chunk seams.
//!
//! Request bodies arrive in bounded reads, and a multipart delimiter can
//! straddle any two of them. The scanner keeps unconsumed bytes in a window;
//! on a miss it reports how many leading bytes can never be part of a future
//! match, so the caller can consume them while the possible token prefix
//! (at most `token_len - 1` bytes) stays behind for the next chunk.

use heapless::Vec as BoundedVec;

/// Longest token this scanner accepts: the boundary from the content type
/// (capped at 100 bytes by the upload layer) plus the `\r\n--` prefix.
pub const MAX_TOKEN_LEN: usize = 104;

/// Result of scanning the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// Token found at this offset into the window.
    Found { at: usize },
    /// No token. The first `released` window bytes cannot be part of a
    /// future match and may be consumed.
    NotFound { released: usize },
}

pub struct BoundaryScanner {
    token: BoundedVec<u8, MAX_TOKEN_LEN>,
    window: Vec<u8>,
}

impl BoundaryScanner {
    /// `token` must be non-empty and at most [`MAX_TOKEN_LEN`] bytes.
    pub fn new(token: &[u8]) -> Self {
        let mut scanner = Self {
            token: BoundedVec::new(),
            window: Vec::new(),
        };
        scanner.retarget(token);
        scanner
    }

    /// Switch to a different token, keeping the window as-is.
    pub fn retarget(&mut self, token: &[u8]) {
        self.token.clear();
        self.token.extend_from_slice(token).ok();
    }

    pub fn token_len(&self) -> usize {
        self.token.len()
    }

    /// Append a chunk and scan.
    pub fn feed(&mut self, chunk: &[u8]) -> Scan {
        self.push(chunk);
        self.scan()
    }

    /// Append input without scanning.
    pub fn push(&mut self, chunk: &[u8]) {
        self.window.extend_from_slice(chunk);
    }

    /// Scan the window for the token.
    pub fn scan(&self) -> Scan {
        match find(&self.window, &self.token) {
            Some(at) => Scan::Found { at },
            None => {
                // Retain only a possible token prefix at the tail.
                let keep = self.window.len().min(self.token.len().saturating_sub(1));
                Scan::NotFound {
                    released: self.window.len() - keep,
                }
            }
        }
    }

    /// Unconsumed bytes, oldest first.
    pub fn window(&self) -> &[u8] {
        &self.window
    }

    /// Drop the first `n` window bytes.
    pub fn consume(&mut self, n: usize) {
        self.window.drain(..n);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

use std::{collections::VecDeque, ops::Range};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("unable to get bytes from outside the window")]
    OutOfRange,

    #[error("unable to advance to a position outside the window")]
    BadAdvance,
}

/// A dynamically resizable buffer that acts like a window being moved over
/// a larger input stream. All positions are absolute to that stream.
#[derive(Default)]
pub struct Window {
    pos: usize,
    buf: VecDeque<u8>,
}

impl Window {
    /// Append data to the window (i.e. make it larger)
    pub fn extend(&mut self, buf: &[u8]) {
        self.buf.extend(buf);
    }

    /// The absolute position of the first byte still retained
    pub fn start(&self) -> usize {
        self.pos
    }

    /// The absolute position just past the last byte fed so far
    pub fn end(&self) -> usize {
        self.pos + self.buf.len()
    }

    /// Return a copy of the bytes in the given absolute range
    pub fn get_bytes(&self, range: Range<usize>) -> Result<Vec<u8>, WindowError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }

        if range.start < self.pos || range.end > self.end() {
            return Err(WindowError::OutOfRange);
        }

        let start = range.start - self.pos;
        let end = range.end - self.pos;

        Ok(self
            .buf
            .iter()
            .skip(start)
            .take(end - start)
            .copied()
            .collect())
    }

    /// Declare that no bytes before `pos` will be requested again and drop
    /// them from the front of the window
    pub fn advance_to(&mut self, pos: usize) -> Result<(), WindowError> {
        if pos < self.pos || pos > self.end() {
            return Err(WindowError::BadAdvance);
        }

        self.buf.drain(0..pos - self.pos);
        self.pos = pos;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Window;

    /// Check if an empty window behaves correctly
    #[test]
    fn empty() {
        let mut w = Window::default();
        assert_eq!(w.get_bytes(0..0).unwrap(), &[] as &[u8]);
        assert!(w.get_bytes(0..1).is_err());
        assert!(w.advance_to(10).is_err());
    }

    /// Get full contents of the window
    #[test]
    fn full() {
        let data = "Hello".as_bytes();
        let mut w = Window::default();
        w.extend(data);
        assert_eq!(w.get_bytes(0..5).unwrap(), data);
    }

    /// Test range checks before and after advancing
    #[test]
    fn range_checks() {
        let data = "Hello".as_bytes();
        let mut w = Window::default();
        w.extend(data);

        assert_eq!(w.get_bytes(1..2).unwrap(), &[b'e']);
        assert_eq!(w.get_bytes(2..4).unwrap(), &[b'l', b'l']);
        assert!(w.get_bytes(4..6).is_err());

        w.advance_to(3).unwrap();
        assert_eq!(w.start(), 3);

        assert!(w.advance_to(2).is_err());
        assert_eq!(w.get_bytes(3..5).unwrap(), &[b'l', b'o']);
        assert!(w.get_bytes(2..3).is_err());

        w.advance_to(5).unwrap();
        assert!(w.advance_to(6).is_err());
    }

    /// The window keeps growing while more data is fed
    #[test]
    fn extend_after_advance() {
        let mut w = Window::default();
        w.extend(b"abc");
        w.advance_to(3).unwrap();
        w.extend(b"def");
        assert_eq!(w.get_bytes(3..6).unwrap(), b"def");
        assert_eq!(w.end(), 6);
    }
}

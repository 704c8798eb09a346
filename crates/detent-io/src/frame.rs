//! Ring-buffer decoder for the framed serial link.
//!
//! A frame is `START, payload..., END`. Payload bytes never take the marker
//! values or `0xFF`.

use smallvec::SmallVec;

pub const FRAME_START: u8 = 0xEA;
pub const FRAME_END: u8 = 0xFB;
const FRAME_FILL: u8 = 0xFF;

pub type Payload = SmallVec<[u8; 8]>;

/// Outcome of [`FrameRing::try_extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    Payload(Payload),
    /// Fewer than one frame of bytes since the last flush.
    Incomplete,
    /// Framing was valid but a payload byte was reserved. Ring flushed.
    Corrupt,
    /// A full window did not start and end with the markers. Ring flushed.
    Desync,
}

impl Extract {
    /// True when the caller should discard what the byte source has buffered.
    #[inline]
    pub fn needs_source_flush(&self) -> bool {
        matches!(self, Extract::Corrupt | Extract::Desync)
    }
}

/// Circular buffer holding exactly one frame.
#[derive(Debug, Clone)]
pub struct FrameRing {
    buf: Box<[u8]>,
    /// Next write position; the oldest byte once the ring is full.
    head: usize,
    len: usize,
}

impl FrameRing {
    pub fn new(payload_len: usize) -> Self {
        Self {
            buf: vec![0; payload_len + 2].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.buf.len() - 2
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Insert a byte, overwriting the oldest once full.
    pub fn push(&mut self, byte: u8) {
        self.buf[self.head] = byte;
        self.head = (self.head + 1) % self.buf.len();
        if self.len < self.buf.len() {
            self.len += 1;
        }
    }

    pub fn flush(&mut self) {
        self.buf.fill(0);
        self.head = 0;
        self.len = 0;
    }

    pub fn try_extract(&mut self) -> Extract {
        if !self.is_full() {
            return Extract::Incomplete;
        }

        let cap = self.buf.len();
        let tail = self.head;
        let newest = (self.head + cap - 1) % cap;
        if self.buf[tail] != FRAME_START || self.buf[newest] != FRAME_END {
            self.flush();
            return Extract::Desync;
        }

        let payload: Payload = (1..cap - 1).map(|i| self.buf[(tail + i) % cap]).collect();
        self.flush();

        if payload
            .iter()
            .any(|&b| b == FRAME_START || b == FRAME_END || b == FRAME_FILL)
        {
            return Extract::Corrupt;
        }
        Extract::Payload(payload)
    }
}

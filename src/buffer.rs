// buffer.rs

use tracing::{trace, warn};

use crate::frame::Timestamp;

/// Receive-direction byte accumulator shared by all framers.
///
/// Owns the bytes seen since the last extracted frame, the arrival time of the last
/// byte and the limits that decide when buffered bytes are given up on.
#[derive(Debug, Clone)]
pub struct ReceiveBuffer {
    data: Vec<u8>,
    last_byte_at: Option<Timestamp>,
    inter_frame_timeout_ms: u64,
    max_len: usize,
    discarded_bytes: u64,
    overflows: u64,
}

impl ReceiveBuffer {
    pub fn new(inter_frame_timeout_ms: u64, max_len: usize) -> Self {
        ReceiveBuffer {
            data: Vec::with_capacity(max_len),
            last_byte_at: None,
            inter_frame_timeout_ms,
            max_len,
            discarded_bytes: 0,
            overflows: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn last_byte_at(&self) -> Option<Timestamp> {
        self.last_byte_at
    }

    pub fn inter_frame_timeout_ms(&self) -> u64 {
        self.inter_frame_timeout_ms
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Total bytes dropped without becoming part of a frame.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    /// Number of times the buffer outgrew `max_len` and was dropped.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// True when buffered bytes have waited longer than the inter-frame timeout.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        match self.last_byte_at {
            Some(last) if !self.data.is_empty() => {
                now.saturating_sub(last) > self.inter_frame_timeout_ms
            }
            _ => false,
        }
    }

    pub(crate) fn set_inter_frame_timeout(&mut self, timeout_ms: u64) {
        self.inter_frame_timeout_ms = timeout_ms;
    }

    pub(crate) fn append(&mut self, bytes: &[u8], now: Timestamp) {
        if bytes.is_empty() {
            return;
        }
        self.data.extend_from_slice(bytes);
        self.last_byte_at = Some(now);
        trace!(added = bytes.len(), buffered = self.data.len(), "receive buffer grew");
    }

    /// Remove and return the first `len` bytes.
    pub(crate) fn take(&mut self, len: usize) -> Vec<u8> {
        self.data.drain(..len).collect()
    }

    /// Drop the first `len` bytes: a delimited candidate that did not decode.
    pub(crate) fn reject(&mut self, len: usize) {
        let len = len.min(self.data.len());
        self.data.drain(..len);
        self.discarded_bytes += len as u64;
    }

    /// Drop the first `len` bytes as noise.
    pub(crate) fn skip(&mut self, len: usize) {
        let len = len.min(self.data.len());
        if len == 0 {
            return;
        }
        self.data.drain(..len);
        self.discarded_bytes += len as u64;
        trace!(skipped = len, "skipped bytes outside any frame");
    }

    /// Drop everything left over from a frame that never completed.
    pub(crate) fn discard_stale(&mut self) {
        if self.data.is_empty() {
            return;
        }
        warn!(
            bytes = self.data.len(),
            timeout_ms = self.inter_frame_timeout_ms,
            "discarding stale partial frame"
        );
        self.discarded_bytes += self.data.len() as u64;
        self.data.clear();
    }

    /// Drop the whole buffer because it can no longer hold a legal frame.
    pub(crate) fn overflow(&mut self) {
        warn!(
            bytes = self.data.len(),
            max_len = self.max_len,
            "receive buffer overflow, discarding"
        );
        self.discarded_bytes += self.data.len() as u64;
        self.overflows += 1;
        self.data.clear();
    }

    /// Apply the size cap after an extraction pass.
    pub(crate) fn enforce_cap(&mut self) {
        if self.data.len() > self.max_len {
            self.overflow();
        }
    }

    /// Forget buffered bytes without counting them, e.g. on connection teardown.
    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.last_byte_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_never_stale() {
        let buffer = ReceiveBuffer::new(10, 16);
        assert!(!buffer.is_stale(1_000));
    }

    #[test]
    fn stale_only_after_timeout_elapses() {
        let mut buffer = ReceiveBuffer::new(10, 16);
        buffer.append(&[0x01, 0x03], 100);
        assert!(!buffer.is_stale(110));
        assert!(buffer.is_stale(111));
    }

    #[test]
    fn clock_going_backwards_is_not_stale() {
        let mut buffer = ReceiveBuffer::new(10, 16);
        buffer.append(&[0x01], 500);
        assert!(!buffer.is_stale(100));
    }

    #[test]
    fn empty_append_keeps_arrival_time() {
        let mut buffer = ReceiveBuffer::new(10, 16);
        buffer.append(&[0x01], 100);
        buffer.append(&[], 200);
        assert_eq!(buffer.last_byte_at(), Some(100));
    }

    #[test]
    fn discards_are_counted() {
        let mut buffer = ReceiveBuffer::new(10, 4);
        buffer.append(&[1, 2, 3, 4, 5, 6], 0);
        buffer.skip(1);
        assert_eq!(buffer.discarded_bytes(), 1);

        buffer.enforce_cap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.discarded_bytes(), 6);
        assert_eq!(buffer.overflows(), 1);
    }

    #[test]
    fn rejected_candidate_is_counted() {
        let mut buffer = ReceiveBuffer::new(10, 16);
        buffer.append(b":01G3\r\n:", 0);
        buffer.reject(7);
        assert_eq!(buffer.as_slice(), b":");
        assert_eq!(buffer.discarded_bytes(), 7);
    }

    #[test]
    fn take_returns_prefix() {
        let mut buffer = ReceiveBuffer::new(10, 16);
        buffer.append(&[1, 2, 3, 4], 0);
        assert_eq!(buffer.take(3), vec![1, 2, 3]);
        assert_eq!(buffer.as_slice(), &[4]);
        assert_eq!(buffer.discarded_bytes(), 0);
    }
}

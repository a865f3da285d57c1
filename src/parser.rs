// parser.rs

use serde::Serialize;
use tracing::{debug, warn};

use crate::buffer::ReceiveBuffer;
use crate::config::ConfigError;
use crate::frame::{Adu, Direction, Frame, Timestamp, Transport};
use crate::interpreter::function_name;
use crate::modbus_ascii::AsciiFramer;
use crate::modbus_rtu::RtuFramer;
use crate::modbus_tcp::TcpFramer;

/// Transport-specific frame boundary detection.
///
/// Implementors cut complete ADUs out of their [`ReceiveBuffer`] and split them into
/// header, payload and checksum. The buffering discipline (stale timeout, size cap) is
/// shared through the provided `push` and `flush` methods.
pub trait Framer {
    fn transport(&self) -> Transport;

    fn buffer(&self) -> &ReceiveBuffer;

    fn buffer_mut(&mut self) -> &mut ReceiveBuffer;

    /// Remove every complete ADU currently at the front of the buffer.
    fn extract(&mut self) -> Vec<Adu>;

    /// Build an ADU from one chunk of send-direction bytes without buffering.
    fn send_adu(&self, bytes: &[u8]) -> Option<Adu>;

    /// Append receive-direction bytes and return the ADUs they complete.
    ///
    /// A stale buffer is drained of complete frames and emptied before the new bytes
    /// are appended, so a fragment that timed out never merges with the next frame.
    fn push(&mut self, bytes: &[u8], now: Timestamp) -> Vec<Adu> {
        let mut adus = self.flush(now);
        self.buffer_mut().append(bytes, now);
        adus.extend(self.extract());
        self.buffer_mut().enforce_cap();
        adus
    }

    /// Complete whatever a stale buffer holds and drop the rest.
    fn flush(&mut self, now: Timestamp) -> Vec<Adu> {
        if !self.buffer().is_stale(now) {
            return Vec::new();
        }
        let adus = self.extract();
        self.buffer_mut().discard_stale();
        adus
    }
}

/// Running counters of a parser.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParserStats {
    pub frames: u64,
    pub checksum_errors: u64,
    /// Frames too short or garbled to carry a checksum.
    pub malformed: u64,
    pub exceptions: u64,
    pub discarded_bytes: u64,
    pub overflows: u64,
}

/// The surface the rest of the application talks to: bytes in, frames out.
///
/// A parser instance belongs to exactly one connection and must only be driven by one
/// caller at a time.
pub trait FrameParser {
    fn transport(&self) -> Transport;

    /// Feed bytes observed on the wire.
    ///
    /// Send-direction bytes are taken as one complete frame built by our own encoder.
    /// Receive-direction bytes are buffered until frame boundaries are found.
    fn ingest(&mut self, bytes: &[u8], direction: Direction, now: Timestamp) -> Vec<Frame>;

    /// Resolve a buffer that has been idle past the inter-frame timeout.
    ///
    /// Meant to be called from a periodic tick so a trailing partial frame does not
    /// wait for the next `ingest`.
    fn flush(&mut self, now: Timestamp) -> Vec<Frame>;

    /// Drop all buffered bytes.
    fn reset(&mut self);

    /// Change the stale timeout of a live parser. Zero is rejected like in
    /// [`ParserConfig`](crate::ParserConfig).
    fn set_inter_frame_timeout(&mut self, timeout_ms: u64) -> Result<(), ConfigError>;

    fn stats(&self) -> ParserStats;
}

/// Framer → checksum → interpreter pipeline for one transport.
#[derive(Debug, Clone)]
pub struct Parser<F> {
    framer: F,
    frames: u64,
    checksum_errors: u64,
    malformed: u64,
    exceptions: u64,
}

pub type RtuParser = Parser<RtuFramer>;
pub type AsciiParser = Parser<AsciiFramer>;
pub type TcpParser = Parser<TcpFramer>;

impl<F: Framer> Parser<F> {
    pub fn new(framer: F) -> Self {
        Parser {
            framer,
            frames: 0,
            checksum_errors: 0,
            malformed: 0,
            exceptions: 0,
        }
    }

    pub fn framer(&self) -> &F {
        &self.framer
    }

    fn emit(&mut self, adus: Vec<Adu>, direction: Direction, now: Timestamp) -> Vec<Frame> {
        let transport = self.framer.transport();
        adus.into_iter()
            .map(|adu| {
                let frame = Frame::new(adu, transport, direction, now);
                self.record(&frame);
                frame
            })
            .collect()
    }

    fn record(&mut self, frame: &Frame) {
        self.frames += 1;
        if frame.is_exception() {
            self.exceptions += 1;
        }

        let checksum = frame.checksum();
        if !checksum.is_present() {
            self.malformed += 1;
            warn!(
                transport = %frame.transport(),
                direction = %frame.direction(),
                raw = %frame.raw_hex(),
                "frame has no usable checksum"
            );
            return;
        }
        if !checksum.is_valid {
            self.checksum_errors += 1;
            warn!(
                transport = %frame.transport(),
                direction = %frame.direction(),
                received = checksum.received,
                computed = checksum.computed,
                raw = %frame.raw_hex(),
                "checksum mismatch"
            );
            return;
        }

        debug!(
            transport = %frame.transport(),
            direction = %frame.direction(),
            slave = ?frame.slave_address(),
            function = frame.function_code().map(function_name).unwrap_or("-"),
            len = frame.raw().len(),
            "frame decoded"
        );
    }
}

impl<F: Framer> FrameParser for Parser<F> {
    fn transport(&self) -> Transport {
        self.framer.transport()
    }

    fn ingest(&mut self, bytes: &[u8], direction: Direction, now: Timestamp) -> Vec<Frame> {
        let adus = match direction {
            Direction::Send => self.framer.send_adu(bytes).into_iter().collect(),
            Direction::Receive => self.framer.push(bytes, now),
        };
        self.emit(adus, direction, now)
    }

    fn flush(&mut self, now: Timestamp) -> Vec<Frame> {
        let adus = self.framer.flush(now);
        self.emit(adus, Direction::Receive, now)
    }

    fn reset(&mut self) {
        self.framer.buffer_mut().clear();
    }

    fn set_inter_frame_timeout(&mut self, timeout_ms: u64) -> Result<(), ConfigError> {
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        self.framer.buffer_mut().set_inter_frame_timeout(timeout_ms);
        Ok(())
    }

    fn stats(&self) -> ParserStats {
        let buffer = self.framer.buffer();
        ParserStats {
            frames: self.frames,
            checksum_errors: self.checksum_errors,
            malformed: self.malformed,
            exceptions: self.exceptions,
            discarded_bytes: buffer.discarded_bytes(),
            overflows: buffer.overflows(),
        }
    }
}

impl<F: Framer + Default> Default for Parser<F> {
    fn default() -> Self {
        Parser::new(F::default())
    }
}

//! MPEG transport-stream packet framing.
//!
//! A TS packet is a fixed 188-byte unit starting with the sync byte
//! `0x47`. Live sources can hand us a byte stream that isn't aligned on
//! packet boundaries (a mid-packet prefix from a producer that started
//! writing before we attached, a dropped byte on a flaky link); the
//! [`Framer`] re-synchronizes on the fly rather than erroring out.
//!
//! Grounded on the teacher's `socket::framing::FrameDecoder` (`cli/src/socket/framing.rs`):
//! a struct holding one scratch buffer, a `feed`-style incremental read that
//! returns "not enough yet" rather than an error on a partial unit, and
//! byte-at-a-time reassembly tested the same way (`test_byte_at_a_time`
//! there, `consecutive_no_sync_windows_consume_188_bytes_each` here).

use std::sync::Arc;

use crate::error::FramerError;
use crate::source::Source;

/// Size in bytes of one MPEG transport-stream packet.
pub const PACKET_SIZE: usize = 188;

/// The byte that must begin every TS packet.
pub const SYNC_BYTE: u8 = 0x47;

/// An immutable TS packet, cheaply shared across every subscriber queue.
pub type Packet = Arc<[u8; PACKET_SIZE]>;

/// Result of one `read_packet` attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A full, sync-aligned packet was read.
    Packet(Packet),
    /// No sync byte was found in this round; not an error, call again.
    NoPacketThisRound,
    /// The source has no more data and was at a packet boundary.
    EndOfStream,
}

/// Re-synchronizing reader that turns an arbitrary byte stream into
/// aligned 188-byte TS packets.
///
/// Holds a single scratch buffer and never looks ahead more than one
/// packet's worth of bytes to find alignment.
pub struct Framer {
    buf: [u8; PACKET_SIZE],
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    /// Create a fresh framer with an empty scratch buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: [0u8; PACKET_SIZE] }
    }

    /// Read and return the next aligned TS packet from `source`.
    ///
    /// On [`ReadOutcome::NoPacketThisRound`] the caller should simply call
    /// this again; the framer has already discarded the misaligned bytes
    /// it scanned and is ready to read a fresh window.
    pub async fn read_packet(&mut self, source: &mut dyn Source) -> Result<ReadOutcome, FramerError> {
        match fill(source, &mut self.buf, 0).await? {
            Fill::Eof => return Ok(ReadOutcome::EndOfStream),
            Fill::ShortRead => return Err(FramerError::UnexpectedEnd),
            Fill::Full => {}
        }

        if self.buf[0] == SYNC_BYTE {
            return Ok(ReadOutcome::Packet(Arc::new(self.buf)));
        }

        let Some(offset) = self.buf.iter().position(|&b| b == SYNC_BYTE) else {
            // No sync byte anywhere in this window. Discard it; the next
            // call starts a fresh read rather than scanning byte-by-byte
            // forever on a truly sync-less stream.
            return Ok(ReadOutcome::NoPacketThisRound);
        };

        // Sync found at `offset` > 0: keep the tail, pull in enough bytes
        // to complete the packet from there.
        self.buf.copy_within(offset.., 0);
        match fill(source, &mut self.buf, PACKET_SIZE - offset).await? {
            Fill::Eof | Fill::ShortRead => Err(FramerError::UnexpectedEnd),
            Fill::Full => Ok(ReadOutcome::Packet(Arc::new(self.buf))),
        }
    }
}

enum Fill {
    Full,
    /// Zero bytes were ever read for this call.
    Eof,
    /// Some bytes were read but the source ended before the buffer filled.
    ShortRead,
}

/// Read repeatedly until `buf[start..]` is full or the source is exhausted.
async fn fill(source: &mut dyn Source, buf: &mut [u8; PACKET_SIZE], start: usize) -> Result<Fill, FramerError> {
    let mut filled = start;
    while filled < PACKET_SIZE {
        let n = source.read(&mut buf[filled..]).await.map_err(FramerError::Source)?;
        if n == 0 {
            return Ok(if filled == start { Fill::Eof } else { Fill::ShortRead });
        }
        filled += n;
    }
    Ok(Fill::Full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_support::ByteVecSource;

    #[tokio::test]
    async fn aligned_packet_is_returned_whole() {
        let mut data = vec![SYNC_BYTE];
        data.extend(std::iter::repeat(0xAB).take(PACKET_SIZE - 1));
        let mut src = ByteVecSource::new(data.clone());
        let mut framer = Framer::new();
        match framer.read_packet(&mut src).await.unwrap() {
            ReadOutcome::Packet(p) => assert_eq!(p.as_ref(), data.as_slice()),
            other => panic!("expected packet, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resyncs_on_misaligned_prefix() {
        let prefix = vec![0x00u8; 40];
        let mut packet = vec![SYNC_BYTE];
        packet.extend(std::iter::repeat(0x11).take(PACKET_SIZE - 1));
        let mut data = prefix;
        data.extend(packet.iter().copied());
        let mut src = ByteVecSource::new(data);
        let mut framer = Framer::new();
        match framer.read_packet(&mut src).await.unwrap() {
            ReadOutcome::Packet(p) => assert_eq!(p.as_ref(), packet.as_slice()),
            other => panic!("expected packet, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_sync_byte_is_not_an_error() {
        let data = vec![0x00u8; PACKET_SIZE];
        let mut src = ByteVecSource::new(data);
        let mut framer = Framer::new();
        match framer.read_packet(&mut src).await.unwrap() {
            ReadOutcome::NoPacketThisRound => {}
            other => panic!("expected NoPacketThisRound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_source_is_end_of_stream() {
        let mut src = ByteVecSource::new(Vec::new());
        let mut framer = Framer::new();
        match framer.read_packet(&mut src).await.unwrap() {
            ReadOutcome::EndOfStream => {}
            other => panic!("expected EndOfStream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_mid_packet_is_unexpected_end() {
        let mut data = vec![SYNC_BYTE];
        data.extend(std::iter::repeat(0x22).take(50));
        let mut src = ByteVecSource::new(data);
        let mut framer = Framer::new();
        let err = framer.read_packet(&mut src).await.unwrap_err();
        assert!(matches!(err, FramerError::UnexpectedEnd));
    }

    #[tokio::test]
    async fn consecutive_no_sync_windows_consume_188_bytes_each() {
        // Two back-to-back sync-less windows followed by an aligned packet.
        let mut data = vec![0x00u8; PACKET_SIZE * 2];
        data.push(SYNC_BYTE);
        data.extend(std::iter::repeat(0x33).take(PACKET_SIZE - 1));
        let mut src = ByteVecSource::new(data);
        let mut framer = Framer::new();
        for _ in 0..2 {
            assert!(matches!(
                framer.read_packet(&mut src).await.unwrap(),
                ReadOutcome::NoPacketThisRound
            ));
        }
        assert!(matches!(
            framer.read_packet(&mut src).await.unwrap(),
            ReadOutcome::Packet(_)
        ));
    }
}

//! Source-agnostic byte source abstraction.
//!
//! Every upstream, whatever its transport, is reduced to a blocking-style
//! async read plus a close operation. Per-scheme implementations live in
//! sibling modules; [`open`] is the single entry point the puller calls.

mod descriptor;
mod file;
mod fork;
mod http;
mod tcp;
mod udp;
mod unix;

pub use descriptor::{parse_descriptor, SourceDescriptor};

use async_trait::async_trait;
use std::io;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::error::SourceError;

/// A byte source opened from a [`SourceDescriptor`].
///
/// `read` behaves like a blocking read: it returns `Ok(0)` only at true
/// end-of-stream, and otherwise waits for at least one byte. `close` is
/// called once, from the owning puller, during teardown; it must make any
/// concurrently in-flight or future read fail promptly.
#[async_trait]
pub trait Source: Send {
    /// Read at least one byte into `buf`, returning the number read, or
    /// `Ok(0)` at end-of-stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release any OS resources held by this source (socket, file, child
    /// process). Idempotent.
    async fn close(&mut self);
}

/// Timeouts applied while opening a source.
#[derive(Debug, Clone, Copy)]
pub struct OpenDeadlines {
    /// Applies to TCP dial, TLS handshake, response-header wait, and
    /// 100-continue wait for HTTP(S); to dial/bind for everything else.
    pub connect_timeout: Duration,
}

/// Open `descriptor`, returning a boxed [`Source`] ready for reads.
pub async fn open(
    descriptor: &SourceDescriptor,
    deadlines: OpenDeadlines,
    config: &StreamConfig,
) -> Result<Box<dyn Source>, SourceError> {
    match descriptor {
        SourceDescriptor::File { path } => file::open(path).await,
        SourceDescriptor::Http { url } => http::open(url, deadlines).await,
        SourceDescriptor::Tcp { host, port } => tcp::open(host, *port, deadlines).await,
        SourceDescriptor::Udp { host, port } => udp::open(host, *port, config).await,
        SourceDescriptor::Unix { path } => unix::open_stream(path).await,
        SourceDescriptor::Unixgram { path } => unix::open_datagram(path, config).await,
        SourceDescriptor::Unixpacket { path } => unix::open_seqpacket(path, config).await,
        SourceDescriptor::Fork { program, args } => fork::open(program, args).await,
    }
}

/// Small internal helper shared by datagram-oriented sources (UDP,
/// unixgram, unixpacket, HTTP response chunks): buffers one inbound chunk
/// at a time so that a caller asking for fewer bytes than the chunk
/// doesn't lose the remainder, while never merging two chunks together.
#[derive(Default)]
pub(crate) struct ChunkBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl ChunkBuffer {
    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn fill(&mut self, data: Vec<u8>) {
        self.data = data;
        self.pos = 0;
    }

    pub(crate) fn take(&mut self, buf: &mut [u8]) -> usize {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        n
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// An in-memory [`Source`] that yields the bytes of a fixed `Vec<u8>`
    /// a few at a time, then ends the stream.
    pub struct ByteVecSource {
        data: Vec<u8>,
        pos: usize,
    }

    impl ByteVecSource {
        pub fn new(data: Vec<u8>) -> Self {
            Self { data, pos: 0 }
        }
    }

    #[async_trait]
    impl Source for ByteVecSource {
        async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let remaining = &self.data[self.pos..];
            if remaining.is_empty() {
                return Ok(0);
            }
            let n = remaining.len().min(buf.len()).max(1).min(remaining.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }

        async fn close(&mut self) {
            self.pos = self.data.len();
        }
    }
}

//! `unix` / `unixgram` / `unixpacket` schemes: local domain sockets.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixDatagram, UnixStream};

use crate::config::StreamConfig;
use crate::error::SourceError;
use crate::source::{ChunkBuffer, Source};
use crate::ts::PACKET_SIZE;

pub(super) async fn open_stream(path: &Path) -> Result<Box<dyn Source>, SourceError> {
    let stream = UnixStream::connect(path).await.map_err(SourceError::Connect)?;
    Ok(Box::new(UnixStreamSource { stream }))
}

pub(super) async fn open_datagram(path: &Path, config: &StreamConfig) -> Result<Box<dyn Source>, SourceError> {
    open_seqpacket(path, config).await
}

pub(super) async fn open_seqpacket(path: &Path, config: &StreamConfig) -> Result<Box<dyn Source>, SourceError> {
    let local = tempfile_socket_path();
    let socket = UnixDatagram::bind(&local).map_err(SourceError::Connect)?;
    socket.connect(path).map_err(SourceError::Connect)?;
    let packet_size = config.udp_packet_size.unwrap_or(PACKET_SIZE);
    Ok(Box::new(UnixDatagramSource {
        socket,
        local,
        chunk: ChunkBuffer::default(),
        datagram_cap: packet_size.max(PACKET_SIZE) * 8,
    }))
}

fn tempfile_socket_path() -> std::path::PathBuf {
    static NEXT: AtomicU32 = AtomicU32::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("tspx-unixgram-{}-{n}.sock", std::process::id()))
}

struct UnixStreamSource {
    stream: UnixStream,
}

#[async_trait]
impl Source for UnixStreamSource {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn close(&mut self) {
        use tokio::io::AsyncWriteExt;
        let _ = self.stream.shutdown().await;
    }
}

struct UnixDatagramSource {
    socket: UnixDatagram,
    local: std::path::PathBuf,
    chunk: ChunkBuffer,
    datagram_cap: usize,
}

#[async_trait]
impl Source for UnixDatagramSource {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.chunk.is_empty() {
            let mut datagram = vec![0u8; self.datagram_cap];
            let n = self.socket.recv(&mut datagram).await?;
            datagram.truncate(n);
            self.chunk.fill(datagram);
        }
        Ok(self.chunk.take(buf))
    }

    async fn close(&mut self) {
        let _ = std::fs::remove_file(&self.local);
    }
}

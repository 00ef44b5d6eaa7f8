//! `tcp` scheme: a plain dialed TCP connection.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::SourceError;
use crate::source::{OpenDeadlines, Source};

pub(super) async fn open(host: &str, port: u16, deadlines: OpenDeadlines) -> Result<Box<dyn Source>, SourceError> {
    let addr = format!("{host}:{port}");
    let stream = tokio::time::timeout(deadlines.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| SourceError::Connect(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(SourceError::Connect)?;
    Ok(Box::new(TcpSource { stream }))
}

struct TcpSource {
    stream: TcpStream,
}

#[async_trait]
impl Source for TcpSource {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

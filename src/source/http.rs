//! `http` / `https` scheme: a long-lived GET against an upstream origin.

use std::io;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;

use crate::error::SourceError;
use crate::source::{ChunkBuffer, OpenDeadlines, Source};

pub(super) async fn open(url: &url::Url, deadlines: OpenDeadlines) -> Result<Box<dyn Source>, SourceError> {
    // Streams are long-lived; keep-alive connection reuse has no value and
    // only costs an idle pooled socket per stream, so it is disabled.
    let client = Client::builder()
        .connect_timeout(deadlines.connect_timeout)
        .pool_max_idle_per_host(0)
        .build()
        .map_err(SourceError::Http)?;

    // `send()` resolves once status + headers (and any 100-continue wait)
    // are in; bounding it with the same deadline covers dial, TLS
    // handshake, and the header wait in one timeout, matching the
    // connect-timeout contract for every other scheme.
    let response = tokio::time::timeout(deadlines.connect_timeout, client.get(url.clone()).send())
        .await
        .map_err(|_| SourceError::Connect(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(SourceError::Http)?;

    // Any response status is streamed through; framing errors downstream
    // (e.g. an HTML error page with no 0x47 sync byte) surface as ordinary
    // resync/read failures rather than being special-cased here.
    let stream = response.bytes_stream();
    Ok(Box::new(HttpSource { stream: Box::pin(stream), chunk: ChunkBuffer::default() }))
}

type BytesStream = std::pin::Pin<Box<dyn futures_util::Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

struct HttpSource {
    stream: BytesStream,
    chunk: ChunkBuffer,
}

#[async_trait]
impl Source for HttpSource {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.chunk.is_empty() {
            match self.stream.next().await {
                Some(Ok(bytes)) => self.chunk.fill(bytes.to_vec()),
                Some(Err(e)) => return Err(io::Error::new(io::ErrorKind::Other, e)),
                None => return Ok(0),
            }
        }
        Ok(self.chunk.take(buf))
    }

    async fn close(&mut self) {
        // Dropping the stream drops the underlying connection.
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::source::OpenDeadlines;

    #[tokio::test]
    async fn streams_the_response_body_through_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xAA; 400]))
            .mount(&server)
            .await;

        let url = url::Url::parse(&format!("{}/live.ts", server.uri())).unwrap();
        let deadlines = OpenDeadlines { connect_timeout: Duration::from_secs(2) };
        let mut source = open(&url, deadlines).await.unwrap();

        let mut total = Vec::new();
        let mut buf = [0u8; 128];
        loop {
            let n = source.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            total.extend_from_slice(&buf[..n]);
        }
        assert_eq!(total, vec![0xAA; 400]);
    }

    #[tokio::test]
    async fn a_non_200_status_streams_through_rather_than_erroring() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.ts"))
            .respond_with(ResponseTemplate::new(404).set_body_bytes(b"not found".to_vec()))
            .mount(&server)
            .await;

        let url = url::Url::parse(&format!("{}/missing.ts", server.uri())).unwrap();
        let deadlines = OpenDeadlines { connect_timeout: Duration::from_secs(2) };
        let mut source = open(&url, deadlines).await.unwrap();

        let mut buf = [0u8; 128];
        let n = source.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"not found");
    }
}

//! Shared error types for the core pipeline.
//!
//! Library seams (framer, source opener, puller) use `thiserror`-derived
//! enums so callers can match on failure kind per the error taxonomy in
//! the design notes. The process-lifecycle shell (`main.rs`) wraps these
//! in `anyhow::Context` at the point it only needs to log-and-retry or
//! print-and-exit.

use std::io;

/// Errors raised while re-synchronizing TS packets from a byte source.
#[derive(Debug, thiserror::Error)]
pub enum FramerError {
    /// The underlying source returned an I/O error.
    #[error("source read error: {0}")]
    Source(#[from] io::Error),
    /// The source ended with a partially read packet.
    #[error("unexpected end of stream mid-packet")]
    UnexpectedEnd,
}

/// Errors raised while opening a configured upstream source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The descriptor's scheme has no opener.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// Failed to resolve a hostname.
    #[error("could not resolve {host}: {source}")]
    Resolve {
        /// Host that failed to resolve.
        host: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Failed to establish the connection itself.
    #[error("connect error: {0}")]
    Connect(#[from] io::Error),
    /// The OS denied the operation (bind, open, join multicast group, ...).
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// An HTTP-level failure opening the upstream.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised while parsing an upstream URL into a [`crate::source::SourceDescriptor`].
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// The URL could not be parsed at all.
    #[error("invalid source url {0:?}: {1}")]
    Malformed(String, #[source] url::ParseError),
    /// The URL parsed but named an unrecognized scheme.
    #[error("unrecognized scheme {0:?}")]
    UnknownScheme(String),
    /// A scheme-specific required field (host, path, port) was missing.
    #[error("source url {0:?} is missing required field: {1}")]
    MissingField(String, &'static str),
}

/// Terminal failures of a stream's [`crate::puller::Puller`] task. Every
/// other failure the puller sees (a single connect failure, a single read
/// error, a framer resync miss) is transient and handled by looping back
/// to `Backoff`/`Connecting`; these two are the only ones that end the
/// puller task for good, per §4.C/§7's error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum PullerError {
    /// The stream was configured with no usable candidate source at all.
    #[error("[{path}] no candidate sources configured")]
    InvalidSourceList {
        /// Client-visible path of the affected stream.
        path: String,
    },
    /// Every candidate was tried and failed, and `reconnect_delay == 0`
    /// means no further attempt will be made.
    #[error("[{path}] all candidate sources exhausted and reconnection is disabled")]
    AllSourcesExhaustedAndNoReconnect {
        /// Client-visible path of the affected stream.
        path: String,
    },
}

/// Fatal configuration errors, raised at stream construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A stream had no usable candidate source.
    #[error("stream {0:?} has no remotes configured")]
    EmptyRemoteList(String),
    /// One of the stream's remotes failed to parse.
    #[error("stream {path:?}: {source}")]
    InvalidSource {
        /// Client-visible path of the offending stream.
        path: String,
        /// The underlying parse failure.
        #[source]
        source: DescriptorError,
    },
    /// Two streams claim the same client-visible path.
    #[error("duplicate stream path: {0:?}")]
    DuplicatePath(String),
}

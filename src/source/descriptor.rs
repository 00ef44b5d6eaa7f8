//! Upstream URL grammar (configuration).
//!
//! Scheme-qualified locators, one per candidate remote in a stream's
//! configuration. `fork` abuses the URL authority/query components to
//! carry a program name and a space-separated argument list.

use std::path::PathBuf;

use crate::error::DescriptorError;

/// A parsed upstream locator, one recognized scheme per variant.
#[derive(Debug, Clone)]
pub enum SourceDescriptor {
    /// `file:///path/to/fifo-or-regular-file`
    File {
        /// Filesystem path to open.
        path: PathBuf,
    },
    /// `http://` or `https://` URL.
    Http {
        /// The URL to GET.
        url: url::Url,
    },
    /// `tcp://host:port`
    Tcp {
        /// Hostname or address to dial.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// `udp://host:port` — multicast if `host` is a multicast address.
    Udp {
        /// Hostname or address to bind/join.
        host: String,
        /// UDP port.
        port: u16,
    },
    /// `unix:///path/to.sock` — stream-oriented.
    Unix {
        /// Socket path.
        path: PathBuf,
    },
    /// `unixgram:///path/to.sock` — datagram-oriented.
    Unixgram {
        /// Socket path.
        path: PathBuf,
    },
    /// `unixpacket:///path/to.sock` — connection-oriented datagrams.
    Unixpacket {
        /// Socket path.
        path: PathBuf,
    },
    /// `fork://program?arg1 arg2` — spawn `program` with the given args.
    Fork {
        /// Program to execute.
        program: String,
        /// Arguments, split from the raw query string by literal spaces.
        args: Vec<String>,
    },
}

/// Parse one candidate remote URL into a [`SourceDescriptor`].
pub fn parse_descriptor(raw: &str) -> Result<SourceDescriptor, DescriptorError> {
    let url = url::Url::parse(raw).map_err(|e| DescriptorError::Malformed(raw.to_owned(), e))?;

    match url.scheme() {
        "file" => {
            let path = url.to_file_path().unwrap_or_else(|()| PathBuf::from(url.path()));
            Ok(SourceDescriptor::File { path })
        }
        "http" | "https" => Ok(SourceDescriptor::Http { url }),
        "tcp" => {
            let host = url
                .host_str()
                .ok_or(DescriptorError::MissingField(raw.to_owned(), "host"))?
                .to_owned();
            let port = url.port().ok_or(DescriptorError::MissingField(raw.to_owned(), "port"))?;
            Ok(SourceDescriptor::Tcp { host, port })
        }
        "udp" => {
            let host = url
                .host_str()
                .ok_or(DescriptorError::MissingField(raw.to_owned(), "host"))?
                .to_owned();
            let port = url.port().ok_or(DescriptorError::MissingField(raw.to_owned(), "port"))?;
            Ok(SourceDescriptor::Udp { host, port })
        }
        "unix" => Ok(SourceDescriptor::Unix { path: socket_path(&url) }),
        "unixgram" => Ok(SourceDescriptor::Unixgram { path: socket_path(&url) }),
        "unixpacket" => Ok(SourceDescriptor::Unixpacket { path: socket_path(&url) }),
        "fork" => {
            let program = url
                .host_str()
                .ok_or(DescriptorError::MissingField(raw.to_owned(), "program"))?
                .to_owned();
            // Raw (non-percent-decoded) query string, split on literal spaces.
            // Arguments containing spaces are not supported, per the grammar.
            let args = url
                .query()
                .unwrap_or("")
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            Ok(SourceDescriptor::Fork { program, args })
        }
        other => Err(DescriptorError::UnknownScheme(other.to_owned())),
    }
}

fn socket_path(url: &url::Url) -> PathBuf {
    PathBuf::from(url.path())
}

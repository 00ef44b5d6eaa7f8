//! `udp` scheme: unicast or multicast UDP reception.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;

use crate::config::StreamConfig;
use crate::error::SourceError;
use crate::source::{ChunkBuffer, Source};
use crate::ts::PACKET_SIZE;

pub(super) async fn open(host: &str, port: u16, config: &StreamConfig) -> Result<Box<dyn Source>, SourceError> {
    let group: IpAddr = host
        .parse()
        .map_err(|_| SourceError::Resolve { host: host.to_owned(), source: io::Error::new(io::ErrorKind::InvalidInput, "not an IP literal") })?;

    let bind_addr = match group {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
    };

    let domain = if bind_addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, None).map_err(SourceError::Connect)?;
    socket.set_reuse_address(true).map_err(SourceError::Connect)?;
    socket.bind(&bind_addr.into()).map_err(SourceError::Connect)?;

    // §4.B sizes the receive buffer to packet_size × N unconditionally,
    // where N is "the configured input buffer count"; `udp_buffer_size`
    // only overrides that N, it doesn't gate whether sizing happens at all.
    let packet_size = config.udp_packet_size.unwrap_or(PACKET_SIZE);
    let buffer_packets = config.udp_buffer_size.unwrap_or(config.input_buffer);
    let bytes = buffer_packets.saturating_mul(packet_size);
    if let Err(e) = socket.set_recv_buffer_size(bytes) {
        log::warn!("could not set UDP receive buffer to {bytes} bytes: {e}");
    }

    if group.is_multicast() {
        join_multicast(&socket, group, config.multicast_interface.as_deref())?;
    }

    socket.set_nonblocking(true).map_err(SourceError::Connect)?;
    let socket = UdpSocket::from_std(socket.into()).map_err(SourceError::Connect)?;

    Ok(Box::new(UdpSource { socket, chunk: ChunkBuffer::default() }))
}

fn join_multicast(socket: &Socket, group: IpAddr, interface: Option<&str>) -> Result<(), SourceError> {
    match group {
        IpAddr::V4(group) => {
            let interface = match interface {
                Some(s) => s.parse().map_err(|_| SourceError::Resolve {
                    host: s.to_owned(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "not an IPv4 interface address"),
                })?,
                None => Ipv4Addr::UNSPECIFIED,
            };
            socket.join_multicast_v4(&group, &interface).map_err(SourceError::Connect)
        }
        IpAddr::V6(group) => {
            let interface_index = interface.and_then(|s| s.parse().ok()).unwrap_or(0);
            socket.join_multicast_v6(&group, interface_index).map_err(SourceError::Connect)
        }
    }
}

struct UdpSource {
    socket: UdpSocket,
    chunk: ChunkBuffer,
}

#[async_trait]
impl Source for UdpSource {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.chunk.is_empty() {
            let mut datagram = vec![0u8; 64 * 1024];
            let n = self.socket.recv(&mut datagram).await?;
            datagram.truncate(n);
            self.chunk.fill(datagram);
        }
        Ok(self.chunk.take(buf))
    }

    async fn close(&mut self) {
        // UDP sockets have no shutdown(); dropping the handle releases it.
    }
}

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream, UdpSocket};
use tokio::time::timeout;

use dns_model::message::Message;

use crate::transport::{Transport, TransportError};

/// The biggest datagram reply we are prepared to receive.  EDNS lets
/// servers exceed the classic 512-octet limit, so size for the worst case.
const MAX_DATAGRAM_SIZE: usize = 65535;

/// Turns messages into octets and back.  The wire format lives entirely
/// behind this seam: supply an implementation to get a working
/// `SocketTransport`.
pub trait WireCodec: Send + Sync {
    /// Serialise a message.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, TransportError>;

    /// Deserialise a reply.  A reply that cannot be decoded should be a
    /// `TransportError::FormatError`.
    fn decode(&self, octets: &[u8]) -> Result<Message, TransportError>;
}

/// A `Transport` over real UDP and TCP sockets.
///
/// Sockets are scoped to a single exchange: bound (or connected) before the
/// send and dropped on every exit path.  Each exchange is bounded by the
/// caller's per-attempt timeout.
pub struct SocketTransport<C> {
    codec: C,
}

impl<C> SocketTransport<C> {
    pub fn new(codec: C) -> Self {
        SocketTransport { codec }
    }
}

#[async_trait]
impl<C: WireCodec> Transport for SocketTransport<C> {
    async fn datagram_query(
        &self,
        request: &Message,
        nameserver: IpAddr,
        port: u16,
        source: Option<IpAddr>,
        source_port: u16,
        attempt_timeout: Duration,
        raise_on_truncation: bool,
    ) -> Result<Message, TransportError> {
        let payload = self.codec.encode(request)?;
        let target = SocketAddr::new(nameserver, port);

        tracing::trace!(id = %request.id, %target, "sending datagram query");
        let reply = match timeout(
            attempt_timeout,
            datagram_exchange(&payload, target, source, source_port),
        )
        .await
        {
            Ok(reply) => reply?,
            Err(_) => return Err(TransportError::Timeout),
        };

        let response = self.codec.decode(&reply)?;
        if response.id != request.id || !response.flags.qr {
            return Err(TransportError::FormatError);
        }
        if response.flags.tc && raise_on_truncation {
            return Err(TransportError::Truncated);
        }
        Ok(response)
    }

    async fn stream_query(
        &self,
        request: &Message,
        nameserver: IpAddr,
        port: u16,
        source: Option<IpAddr>,
        source_port: u16,
        attempt_timeout: Duration,
    ) -> Result<Message, TransportError> {
        let payload = self.codec.encode(request)?;
        let target = SocketAddr::new(nameserver, port);

        tracing::trace!(id = %request.id, %target, "sending stream query");
        let reply = match timeout(
            attempt_timeout,
            stream_exchange(&payload, target, source, source_port),
        )
        .await
        {
            Ok(reply) => reply?,
            Err(_) => return Err(TransportError::Timeout),
        };

        let response = self.codec.decode(&reply)?;
        if response.id != request.id || !response.flags.qr {
            return Err(TransportError::FormatError);
        }
        Ok(response)
    }
}

async fn datagram_exchange(
    payload: &[u8],
    target: SocketAddr,
    source: Option<IpAddr>,
    source_port: u16,
) -> Result<Vec<u8>, TransportError> {
    let socket = UdpSocket::bind(local_bind_address(target, source, source_port))
        .await
        .map_err(TransportError::Io)?;
    socket.connect(target).await.map_err(TransportError::Io)?;
    socket.send(payload).await.map_err(TransportError::Io)?;

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let received = socket.recv(&mut buf).await.map_err(TransportError::Io)?;
    buf.truncate(received);
    Ok(buf)
}

async fn stream_exchange(
    payload: &[u8],
    target: SocketAddr,
    source: Option<IpAddr>,
    source_port: u16,
) -> Result<BytesMut, TransportError> {
    let mut stream = connect_from(target, source, source_port)
        .await
        .map_err(TransportError::Io)?;
    send_tcp_bytes(&mut stream, payload)
        .await
        .map_err(TransportError::Io)?;
    read_tcp_bytes(&mut stream).await
}

/// The local address to bind an outgoing socket to: the caller's choice, or
/// the unspecified address of the right family.
fn local_bind_address(target: SocketAddr, source: Option<IpAddr>, source_port: u16) -> SocketAddr {
    let address = source.unwrap_or(if target.is_ipv4() {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    });
    SocketAddr::new(address, source_port)
}

async fn connect_from(
    target: SocketAddr,
    source: Option<IpAddr>,
    source_port: u16,
) -> io::Result<TcpStream> {
    if source.is_none() && source_port == 0 {
        return TcpStream::connect(target).await;
    }

    let socket = if target.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.bind(local_bind_address(target, source, source_port))?;
    socket.connect(target).await
}

/// Read a DNS message from a TCP stream.
///
/// A DNS TCP message is slightly different to a DNS UDP message: it has a
/// big-endian u16 prefix giving the total length of the message.  This is
/// redundant (the message says how many fields it has, and the fields
/// carry length information), but it means the entire message can be read
/// before decoding begins.
pub async fn read_tcp_bytes(stream: &mut TcpStream) -> Result<BytesMut, TransportError> {
    let size = match stream.read_u16().await {
        Ok(size) => size,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::EndOfStream)
        }
        Err(err) => return Err(TransportError::Io(err)),
    };

    let expected = size as usize;
    let mut bytes = BytesMut::with_capacity(expected);
    while bytes.len() < expected {
        match stream.read_buf(&mut bytes).await {
            Ok(0) => return Err(TransportError::EndOfStream),
            Ok(_) => (),
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
    Ok(bytes)
}

/// Write a serialised message to a TCP stream, with the two-byte length
/// prefix (big-endian u16).
pub async fn send_tcp_bytes(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    let len = match u16::try_from(bytes.len()) {
        Ok(len) => len,
        Err(_) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "message too large for stream framing",
            ))
        }
    };

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn tcp_bytes_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let bytes = read_tcp_bytes(&mut stream).await.unwrap();
            send_tcp_bytes(&mut stream, &bytes).await.unwrap();
        });

        let mut stream = TcpStream::connect(address).await.unwrap();
        send_tcp_bytes(&mut stream, b"hello there").await.unwrap();
        let echoed = read_tcp_bytes(&mut stream).await.unwrap();

        assert_eq!(&b"hello there"[..], &echoed[..]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn short_stream_is_end_of_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // claim 100 octets, send 4, hang up
            stream.write_all(&100u16.to_be_bytes()).await.unwrap();
            stream.write_all(b"oops").await.unwrap();
        });

        let mut stream = TcpStream::connect(address).await.unwrap();
        let result = read_tcp_bytes(&mut stream).await;

        assert!(matches!(result, Err(TransportError::EndOfStream)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn closed_stream_is_end_of_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut stream = TcpStream::connect(address).await.unwrap();
        let result = read_tcp_bytes(&mut stream).await;

        assert!(matches!(result, Err(TransportError::EndOfStream)));
        server.await.unwrap();
    }

    #[test]
    fn bind_address_matches_target_family() {
        let v4: SocketAddr = "192.0.2.1:53".parse().unwrap();
        let v6: SocketAddr = "[2001:db8::1]:53".parse().unwrap();

        assert!(local_bind_address(v4, None, 0).is_ipv4());
        assert!(local_bind_address(v6, None, 0).is_ipv6());
        assert_eq!(
            "10.0.0.9:5353".parse::<SocketAddr>().unwrap(),
            local_bind_address(v4, Some("10.0.0.9".parse().unwrap()), 5353)
        );
    }
}

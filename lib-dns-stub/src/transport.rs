use std::fmt;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use dns_model::message::Message;

/// The capability the resolution driver uses to exchange messages with a
/// nameserver.  Implementations own the sockets and the wire codec; the
/// driver only ever sees deserialised `Message`s.
///
/// Both operations send a single query and await a single reply, giving up
/// after `timeout`.  Implementations must not hold sockets beyond one call:
/// the driver treats every attempt as independent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` over a datagram transport and await the reply.
    ///
    /// With `raise_on_truncation`, a reply with the TC flag set surfaces as
    /// `TransportError::Truncated` so the caller can retry over a stream.
    #[allow(clippy::too_many_arguments)]
    async fn datagram_query(
        &self,
        request: &Message,
        nameserver: IpAddr,
        port: u16,
        source: Option<IpAddr>,
        source_port: u16,
        timeout: Duration,
        raise_on_truncation: bool,
    ) -> Result<Message, TransportError>;

    /// Send `request` over a stream transport and await the reply.  Streams
    /// carry whole messages, so this never reports truncation.
    async fn stream_query(
        &self,
        request: &Message,
        nameserver: IpAddr,
        port: u16,
        source: Option<IpAddr>,
        source_port: u16,
        timeout: Duration,
    ) -> Result<Message, TransportError>;
}

/// How a single exchange with a nameserver can fail.
#[derive(Debug)]
pub enum TransportError {
    /// No reply arrived within the attempt deadline.
    Timeout,
    /// The reply had the TC flag set (datagram transport only).
    Truncated,
    /// The peer closed the stream before a whole message arrived.
    EndOfStream,
    /// The reply could not be decoded, or did not match the request.
    FormatError,
    /// The endpoint is of a kind this transport cannot speak to.
    NotImplemented,
    /// Any other I/O failure.
    Io(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "timed out"),
            TransportError::Truncated => write!(f, "response truncated"),
            TransportError::EndOfStream => write!(f, "unexpected end of stream"),
            TransportError::FormatError => write!(f, "malformed response"),
            TransportError::NotImplemented => write!(f, "unsupported nameserver endpoint"),
            TransportError::Io(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(error) => Some(error),
            _ => None,
        }
    }
}

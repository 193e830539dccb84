//! Transport binding for one media channel

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::context::ChannelKind;

/// Type-erased read half
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Type-erased write half
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One media channel bound to one live connection
///
/// The connection is split so the send and receive loops each own one half
/// and never contend for the transport.
pub struct Channel {
    kind: ChannelKind,
    reader: BoxedReader,
    writer: BoxedWriter,
    peer_addr: Option<SocketAddr>,
}

impl Channel {
    /// Bind a channel to separate read and write halves
    pub fn new<R, W>(kind: ChannelKind, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            kind,
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer_addr: None,
        }
    }

    /// Bind a channel to a TCP connection
    pub fn from_tcp(kind: ChannelKind, stream: TcpStream) -> Self {
        let peer_addr = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();
        Self {
            peer_addr,
            ..Self::new(kind, reader, writer)
        }
    }

    /// Bind a channel to any bidirectional stream
    pub fn from_stream<S>(kind: ChannelKind, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(kind, reader, writer)
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Remote address, for TCP channels
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Hand out the two halves
    pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("kind", &self.kind)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

//! Transport abstraction for peer streams.
//!
//! Abstracts over byte-stream transports that can accept inbound connections
//! and dial peers by [`PeerAddress`]. Production uses tokio TCP, tests use
//! turmoil's simulated TCP.

use std::io;

use async_trait::async_trait;
use peerlock_proto::PeerAddress;
use tokio::io::{AsyncRead, AsyncWrite};

/// Abstract stream transport between nodes.
///
/// Each direction of peer traffic uses its own connection: a node writes to
/// a peer over a stream it dialed and reads from that peer over a stream it
/// accepted. Streams only ever carry whole frames.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Bidirectional byte stream to a peer.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Accept an incoming connection.
    ///
    /// Returns the stream and a printable description of the remote end.
    async fn accept(&self) -> io::Result<(Self::Stream, String)>;

    /// Connect to a peer.
    async fn connect(&self, address: &PeerAddress) -> io::Result<Self::Stream>;
}

//! Turmoil-backed transport.

use std::io;

use async_trait::async_trait;
use peerlock_core::{PeerAddress, Transport};
use turmoil::net::{TcpListener, TcpStream};

/// [`Transport`] over turmoil's simulated TCP.
///
/// Host names resolve through turmoil, so a node advertised as
/// `node1:7000` is reachable from every other simulated host.
pub struct SimTransport {
    listener: TcpListener,
}

impl SimTransport {
    /// Bind a listener inside the current simulated host.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl Transport for SimTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, String)> {
        let (stream, remote) = self.listener.accept().await?;
        Ok((stream, remote.to_string()))
    }

    async fn connect(&self, address: &PeerAddress) -> io::Result<TcpStream> {
        let target = address.to_string();
        TcpStream::connect(target.as_str()).await
    }
}

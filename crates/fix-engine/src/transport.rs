//! TCP transport for FIX sessions.
//!
//! FIX runs over plain TCP in production (TLS, when present, terminates
//! transparently below the session layer and is out of scope for a core
//! engine). One listener per configured port, one connection handle passed
//! to the per-connection task, built on `tokio::net`.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::error::EngineError;

/// A bound TCP acceptor for one listening port.
///
/// One acceptor may serve multiple sessions: which session a freshly
/// accepted connection belongs to is decided after reading the peer's
/// Logon and matching its `SenderCompID`/`TargetCompID` pair, not by port.
pub struct FixListener {
    listener: TcpListener,
}

impl FixListener {
    /// Binds a new listener.
    pub async fn bind(address: &str) -> Result<Self, EngineError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| EngineError::Configuration(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("FIX transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accepts the next inbound connection.
    pub async fn accept(&self) -> Result<FixConnection, EngineError> {
        let (stream, remote_addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(FixConnection { stream, remote_addr })
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, EngineError> {
        Ok(self.listener.local_addr()?)
    }
}

/// A connected (accepted or dialed) TCP socket carrying one FIX session.
pub struct FixConnection {
    /// The underlying TCP stream.
    pub stream: TcpStream,
    /// The peer's address, for logging.
    pub remote_addr: SocketAddr,
}

impl FixConnection {
    /// Dials out to an `Initiator` session's configured counterparty.
    pub async fn connect(host: &str, port: u16) -> Result<Self, EngineError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        let remote_addr = stream.peer_addr()?;
        tracing::info!("Connected to {}", remote_addr);
        Ok(Self { stream, remote_addr })
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn listener_binds_and_accepts() {
        let listener = FixListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let accept_task = tokio::spawn(async move { listener.accept().await });
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"8=FIX.4.4").await.unwrap();

        let accepted = accept_task.await.unwrap().unwrap();
        assert_eq!(accepted.remote_addr.ip(), addr.ip());
    }

    #[tokio::test]
    async fn listener_rejects_invalid_address() {
        let result = FixListener::bind("not-an-address").await;
        assert!(result.is_err());
    }
}

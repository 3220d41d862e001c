use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "runtime-tokio")]
mod tokio_socket;
#[cfg(feature = "runtime-tokio")]
pub use tokio_socket::Tokio;

/// Largest datagram we ever expect from a STUN server.
pub const UDP_MAX_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum BindError {
    #[cfg(feature = "runtime-tokio")]
    #[error("tokio bind error: {0}")]
    Tokio(#[from] tokio::io::Error),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[cfg(feature = "runtime-tokio")]
    #[error("tokio connect error: {0}")]
    Tokio(#[from] tokio::io::Error),
}

/// An unconnected UDP socket, abstracted over the async runtime.
///
/// Everything the prober needs from the runtime goes through here: sending,
/// receiving with a bounded wait, and name resolution. That keeps the
/// transport free of any particular executor or timer.
#[async_trait::async_trait]
pub trait UdpSocket: Sized + Send + Sync {
    async fn bind(address: SocketAddr) -> Result<Self, BindError>;

    async fn connect(&self, address: SocketAddr) -> Result<(), ConnectError>;

    async fn send_to(&self, message: &[u8], target: SocketAddr) -> io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Wait at most `wait` for one datagram. `Ok(None)` means the wait elapsed.
    async fn recv_from_timeout(
        &self,
        buf: &mut [u8],
        wait: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Resolve `host:port` using the runtime's resolver.
    async fn resolve(host: &str) -> io::Result<Vec<SocketAddr>>;

    fn address(&self) -> io::Result<SocketAddr>;
}

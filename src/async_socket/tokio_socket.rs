use crate::async_socket::{BindError, ConnectError, UdpSocket};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

pub struct Tokio {
    sock: tokio::net::UdpSocket
}

#[async_trait::async_trait]
impl UdpSocket for Tokio {
    async fn bind(address: SocketAddr) -> Result<Self, BindError> {
        let sock = tokio::net::UdpSocket::bind(address)
            .await?;

        Ok(Tokio {
            sock
        })
    }

    async fn connect(&self, address: SocketAddr) -> Result<(), ConnectError> {
        self.sock.connect(address).await?;
        Ok(())
    }

    async fn send_to(&self, message: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.sock.send_to(message, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.sock.recv_from(buf).await
    }

    async fn recv_from_timeout(
        &self,
        buf: &mut [u8],
        wait: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        match tokio::time::timeout(wait, self.sock.recv_from(buf)).await {
            Ok(res) => res.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn resolve(host: &str) -> io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host(host).await?.collect())
    }

    fn address(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use crate::async_socket::{Tokio, UdpSocket};
    use std::time::Duration;

    #[tokio::test]
    async fn recv_times_out_without_traffic() {
        let socket = Tokio::bind(([127, 0, 0, 1], 0).into()).await.unwrap();
        let mut buf = [0u8; 16];

        let res = socket.recv_from_timeout(&mut buf, Duration::from_millis(20)).await.unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn send_and_receive_on_loopback() {
        let a = Tokio::bind(([127, 0, 0, 1], 0).into()).await.unwrap();
        let b = Tokio::bind(([127, 0, 0, 1], 0).into()).await.unwrap();

        a.send_to(b"ping", b.address().unwrap()).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = b
            .recv_from_timeout(&mut buf, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, a.address().unwrap());
    }

    #[tokio::test]
    async fn resolve_literal_address() {
        let addrs = Tokio::resolve("127.0.0.1:3478").await.unwrap();
        assert_eq!(addrs, vec![([127, 0, 0, 1], 3478).into()]);
    }
}

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::async_socket::UdpSocket;

/// Any public address works; connecting a UDP socket sends nothing.
const ROUTE_PROBE: ([u8; 4], u16) = ([8, 8, 8, 8], 80);

/// Our address and port as seen from our side of the NAT.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LocalEndpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl LocalEndpoint {
    pub fn new(ip: impl Into<Ipv4Addr>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

/// The local IPv4 address the OS would use to reach the internet.
///
/// Falls back to loopback when there is no route.
pub async fn outbound_ipv4<S: UdpSocket>() -> Ipv4Addr {
    match route_lookup::<S>().await {
        Some(ip) => ip,
        None => {
            log::debug!("no outbound route, assuming {}", Ipv4Addr::LOCALHOST);
            Ipv4Addr::LOCALHOST
        }
    }
}

async fn route_lookup<S: UdpSocket>() -> Option<Ipv4Addr> {
    let socket = S::bind(([0, 0, 0, 0], 0).into()).await.ok()?;
    socket.connect(SocketAddr::from(ROUTE_PROBE)).await.ok()?;

    match socket.address().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

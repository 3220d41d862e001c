//! NAT type detection on top of the STUN transport.

use std::io;
use thiserror::Error;

use crate::async_socket::{BindError, UdpSocket};
use crate::stun::Transport;

pub mod classifier;
pub mod config;
pub mod local_info;
pub mod nat_type;
pub mod servers;

pub use classifier::Classifier;
pub use config::ProbeConfig;
pub use local_info::LocalEndpoint;
pub use nat_type::{MappingBehavior, NatType, NatVerdict};
pub use servers::ServerList;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("couldn't open a local UDP socket: {0}")]
    SocketSetup(#[from] BindError),

    #[error("couldn't read the local socket address: {0}")]
    LocalAddress(#[from] io::Error),
}

/// Run one full detection over a fresh tokio socket.
#[cfg(feature = "runtime-tokio")]
pub async fn detect(config: ProbeConfig) -> Result<NatVerdict, DetectError> {
    detect_with::<crate::async_socket::Tokio>(config).await
}

/// Run one full detection over a fresh socket of type `S`.
///
/// Every probe of the run goes out through that one socket, so servers always
/// see the same source port. The socket is closed when this returns.
pub async fn detect_with<S: UdpSocket>(config: ProbeConfig) -> Result<NatVerdict, DetectError> {
    let socket = S::bind(([0, 0, 0, 0], 0).into()).await?;
    let port = socket.address()?.port();
    let ip = local_info::outbound_ipv4::<S>().await;
    log::info!("local endpoint {}:{}", ip, port);

    let transport = transport_for(socket, &config);
    let mut classifier = Classifier::new(transport, config, LocalEndpoint::new(ip, port));
    Ok(classifier.classify().await)
}

fn transport_for<S: UdpSocket>(socket: S, config: &ProbeConfig) -> Transport<S> {
    Transport::new(socket)
        .with_retransmit(config.retransmit)
        .with_variant(config.variant)
        .trust_changed_address(config.trust_changed_address)
}

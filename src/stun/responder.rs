use futures::channel;
use futures::FutureExt;
use std::net::SocketAddr;
use thiserror::Error;

use crate::async_socket::{BindError, UdpSocket, UDP_MAX_SIZE};
use crate::stun::attribute::{Attribute, ChangeRequest, MappedAddress, CHANGE_REQUEST};
use crate::stun::message::{Message, MessageType, TransactionId};

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("bind socket: {0}")]
    BindSocket(#[from] BindError),

    #[error("couldn't read bound address: {0}")]
    Address(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("responder closed while waiting for startup")]
    ResponderClosed,
}

pub enum StopStatus {
    NotYetStarted,
    AlreadyStopped,
    Stopped,
}

/// The addresses a running responder answers from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ResponderAddresses {
    /// Where requests should be sent.
    pub primary: SocketAddr,
    /// Where CHANGE-REQUEST answers come from.
    pub alternate: SocketAddr,
}

pub struct Communicator {
    stop_channel: Option<channel::oneshot::Sender<()>>,
    addresses: Result<ResponderAddresses, channel::oneshot::Receiver<ResponderAddresses>>,
}

impl Communicator {
    /// Signals the responder to stop.
    pub fn stop_server(&mut self) -> StopStatus {
        if let Some(i) = self.stop_channel.take() {
            if let Ok(_) = i.send(()) {
                StopStatus::Stopped
            } else {
                StopStatus::AlreadyStopped
            }
        } else {
            StopStatus::NotYetStarted
        }
    }

    /// Wait until the responder is listening and return its addresses.
    /// Useful when binding to port 0.
    pub async fn addresses(&mut self) -> Result<ResponderAddresses, StartupError> {
        let addresses = match self.addresses {
            Ok(addresses) => return Ok(addresses),
            Err(ref mut chan) => {
                chan.await.map_err(|_| StartupError::ResponderClosed)?
            }
        };

        self.addresses = Ok(addresses);
        Ok(addresses)
    }
}

/// A minimal STUN binding responder.
///
/// Answers every binding request with the address it came from. Requests
/// carrying a CHANGE-REQUEST are answered from the alternate socket. Both
/// sockets live on one host, so a change of IP can't be honoured; those are
/// answered from the alternate port as well.
pub struct StunResponder {
    primary: SocketAddr,
    alternate: SocketAddr,
    honour_change_requests: bool,

    stop_channel: channel::oneshot::Receiver<()>,
    startup: channel::oneshot::Sender<ResponderAddresses>,
}

impl StunResponder {
    pub fn with_addresses(primary: impl Into<SocketAddr>, alternate: impl Into<SocketAddr>) -> (Communicator, Self) {
        let (stop_tx, stop_rx) = channel::oneshot::channel();
        let (start_tx, start_rx) = channel::oneshot::channel();

        (
            Communicator {
                stop_channel: Some(stop_tx),
                addresses: Err(start_rx), // start as Err (we don't have the addresses yet)
            },
            StunResponder {
                primary: primary.into(),
                alternate: alternate.into(),
                honour_change_requests: true,
                stop_channel: stop_rx,
                startup: start_tx,
            }
        )
    }

    /// A responder on two ephemeral loopback ports.
    pub fn local() -> (Communicator, Self) {
        Self::with_addresses(([127, 0, 0, 1], 0), ([127, 0, 0, 1], 0))
    }

    /// Silently drop requests that carry a CHANGE-REQUEST, like most public
    /// servers do nowadays.
    pub fn ignore_change_requests(mut self) -> Self {
        self.honour_change_requests = false;
        self
    }

    pub async fn start<S: UdpSocket>(mut self) -> Result<(), ResponderError> {
        let primary = S::bind(self.primary).await?;
        let alternate = S::bind(self.alternate).await?;

        // if this errors, nobody is holding the communicator anymore
        let _ = self.startup.send(ResponderAddresses {
            primary: primary.address()?,
            alternate: alternate.address()?,
        });

        let mut buf = vec![0u8; UDP_MAX_SIZE];
        loop {
            let msg = futures::select! {
                _ = &mut self.stop_channel => break,
                msg = primary.recv_from(&mut buf).fuse() => msg
            };

            let (len, from) = match msg {
                Ok(i) => i,
                Err(e) => {
                    log::info!("an error occurred: {}", e);
                    continue
                },
            };

            let (change, response) = match answer(&buf[..len], from) {
                Some(i) => i,
                None => continue,
            };

            let socket = match change {
                ChangeRequest::None => &primary,
                _ if self.honour_change_requests => &alternate,
                _ => {
                    log::debug!("ignoring {:?} change request from {}", change, from);
                    continue
                }
            };

            if let Err(e) = socket.send_to(&response, from).await {
                log::info!("an error occurred: {}", e);
                continue
            }
        }

        self.stop_channel.close();
        Ok(())
    }
}

/// Build the response to a raw request, along with the change it asked for.
fn answer(request: &[u8], from: SocketAddr) -> Option<(ChangeRequest, Vec<u8>)> {
    let message = match Message::parse(request) {
        Ok(i) => i,
        Err(e) => {
            log::debug!("ignoring malformed datagram from {}: {}", from, e);
            return None;
        }
    };

    if message.message_type != MessageType::BindingRequest {
        return None;
    }

    let mapped = match from {
        SocketAddr::V4(v4) => MappedAddress::from(v4),
        SocketAddr::V6(_) => return None,
    };

    let change = message
        .attributes
        .iter()
        .find(|a| a.kind == CHANGE_REQUEST && a.value.len() == 4)
        .map(|a| ChangeRequest::from_flags(u32::from_be_bytes([a.value[0], a.value[1], a.value[2], a.value[3]])))
        .unwrap_or(ChangeRequest::None);

    let attribute = match message.transaction_id {
        TransactionId::Rfc5389(_) => Attribute::xor_mapped_address(mapped),
        TransactionId::Rfc3489(_) => Attribute::mapped_address(mapped),
    };

    let response = Message::new(MessageType::BindingResponse, message.transaction_id, vec![attribute]);
    match response.encode() {
        Ok(bytes) => Some((change, bytes)),
        Err(e) => {
            log::info!("couldn't encode response: {}", e);
            None
        }
    }
}

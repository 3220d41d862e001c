use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::async_socket::{UdpSocket, UDP_MAX_SIZE};
use crate::stun::attribute::{Attribute, ChangeRequest, MappedAddress};
use crate::stun::error::ProbeError;
use crate::stun::message::{self, MessageType, Variant};

/// Floor for the gap between two sends of the same request.
pub const MIN_RETRANSMIT_INTERVAL: Duration = Duration::from_millis(10);

/// Retransmission schedule for a single request: send right away, then again
/// after `initial`, then after `initial * multiplier`, and so on until the
/// request's deadline.
///
/// Gaps never shrink below [`MIN_RETRANSMIT_INTERVAL`] and a multiplier of 0
/// behaves like 1.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RetransmitPolicy {
    pub initial: Duration,
    pub multiplier: u32,
}

impl Default for RetransmitPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            multiplier: 2,
        }
    }
}

/// Which source addresses may answer a request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SourceCheck {
    Any,
    /// Same IP as the server, different port.
    ChangedPort,
    /// Different IP and different port.
    ChangedAddress,
    /// Nothing qualifies.
    Never,
}

impl SourceCheck {
    /// The check that goes with a CHANGE-REQUEST.
    ///
    /// A reply from another IP can't be told apart from an unrelated member of
    /// the same DNS pool, so unless told otherwise change-IP replies never count.
    pub fn for_change(change: ChangeRequest, trust_changed_address: bool) -> Self {
        match change {
            ChangeRequest::None => SourceCheck::Any,
            ChangeRequest::Port => SourceCheck::ChangedPort,
            ChangeRequest::IpAndPort if trust_changed_address => SourceCheck::ChangedAddress,
            ChangeRequest::IpAndPort => SourceCheck::Never,
        }
    }

    pub fn accepts(&self, server: SocketAddr, from: SocketAddr) -> bool {
        let same_ip = server.ip() == from.ip();
        let same_port = server.port() == from.port();

        match self {
            SourceCheck::Any => true,
            SourceCheck::ChangedPort => same_ip && !same_port,
            SourceCheck::ChangedAddress => !same_ip && !same_port,
            SourceCheck::Never => false,
        }
    }
}

/// A qualifying response to one request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProbeReply {
    /// `None` when the response carried no address we could decode.
    pub mapped: Option<MappedAddress>,
    /// The resolved address the request was sent to.
    pub server: SocketAddr,
    /// Where the response came from.
    pub source: SocketAddr,
}

/// Something that can send a binding request and wait for its answer.
#[async_trait::async_trait]
pub trait Prober: Send {
    async fn probe(
        &mut self,
        server: &str,
        change: ChangeRequest,
        timeout: Duration,
    ) -> Result<ProbeReply, ProbeError>;
}

/// Sends binding requests over one socket, one at a time.
pub struct Transport<S> {
    socket: S,
    retransmit: RetransmitPolicy,
    variant: Variant,
    trust_changed_address: bool,
}

impl<S: UdpSocket> Transport<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            retransmit: Default::default(),
            variant: Default::default(),
            trust_changed_address: false,
        }
    }

    pub fn with_retransmit(mut self, retransmit: RetransmitPolicy) -> Self {
        self.retransmit = retransmit;
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn trust_changed_address(mut self, trust: bool) -> Self {
        self.trust_changed_address = trust;
        self
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Send one binding request to `server` and wait for a matching response.
    ///
    /// The server name is resolved once per call, so every retransmission and
    /// the source check refer to the same concrete address. Datagrams with a
    /// foreign transaction id, or whose source fails `check`, are dropped and
    /// the wait goes on until `timeout` has passed.
    pub async fn request(
        &self,
        server: &str,
        attributes: Vec<Attribute>,
        timeout: Duration,
        variant: Variant,
        check: SourceCheck,
    ) -> Result<ProbeReply, ProbeError> {
        let target = resolve_v4::<S>(server).await?;
        let (transaction_id, request) = message::encode(MessageType::BindingRequest, attributes, variant)?;

        let deadline = Instant::now() + timeout;
        let mut next_send = Instant::now();
        let mut interval = self.retransmit.initial.max(MIN_RETRANSMIT_INTERVAL);
        let multiplier = self.retransmit.multiplier.max(1);
        let mut attempt = 0;
        let mut buf = vec![0u8; UDP_MAX_SIZE];

        loop {
            let now = Instant::now();
            if now >= deadline {
                log::debug!("{} ({}) gave no answer after {} attempts", server, target, attempt);
                return Err(ProbeError::Timeout);
            }

            if now >= next_send {
                attempt += 1;
                log::trace!("sending binding request to {} (attempt {})", target, attempt);
                self.socket.send_to(&request, target).await?;
                next_send = now + interval;
                interval = interval.saturating_mul(multiplier);
            }

            let wait = next_send.min(deadline).saturating_duration_since(Instant::now());
            let (len, from) = match self.socket.recv_from_timeout(&mut buf, wait).await? {
                Some(i) => i,
                None => continue,
            };
            let datagram = &buf[..len];

            if !transaction_id.matches(datagram) {
                log::trace!("dropping {} byte datagram from {}: not our transaction", len, from);
                continue;
            }

            if !check.accepts(target, from) {
                log::trace!("dropping response from {}: source fails {:?} for {}", from, check, target);
                continue;
            }

            // receiving an answer at all is evidence, even if we can't read it
            let mapped = match message::decode(datagram) {
                Ok(i) => i,
                Err(e) => {
                    log::debug!("response from {} is malformed, treating as no address: {}", from, e);
                    None
                }
            };

            return Ok(ProbeReply {
                mapped,
                server: target,
                source: from,
            });
        }
    }
}

#[async_trait::async_trait]
impl<S: UdpSocket> Prober for Transport<S> {
    async fn probe(
        &mut self,
        server: &str,
        change: ChangeRequest,
        timeout: Duration,
    ) -> Result<ProbeReply, ProbeError> {
        let check = SourceCheck::for_change(change, self.trust_changed_address);
        self.request(server, change.attributes(), timeout, self.variant, check).await
    }
}

async fn resolve_v4<S: UdpSocket>(server: &str) -> Result<SocketAddr, ProbeError> {
    let addresses = S::resolve(server).await.map_err(|source| ProbeError::Resolve {
        server: server.to_string(),
        source,
    })?;

    addresses
        .into_iter()
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| ProbeError::NoIpv4Address(server.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_socket::Tokio;
    use crate::stun::attribute::XOR_MAPPED_ADDRESS;
    use crate::stun::message::{Message, TransactionId};
    use std::net::SocketAddrV4;

    const FAST: RetransmitPolicy = RetransmitPolicy {
        initial: Duration::from_millis(50),
        multiplier: 2,
    };

    async fn transport() -> Transport<Tokio> {
        let socket = Tokio::bind(([127, 0, 0, 1], 0).into()).await.unwrap();
        Transport::new(socket).with_retransmit(FAST)
    }

    async fn fake_server() -> tokio::net::UdpSocket {
        tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn receive_request(server: &tokio::net::UdpSocket) -> (Message, SocketAddr) {
        let mut buf = vec![0u8; UDP_MAX_SIZE];
        let (len, from) = server.recv_from(&mut buf).await.unwrap();
        (Message::parse(&buf[..len]).unwrap(), from)
    }

    /// Arrival time of every datagram, until none has come in for `quiet`.
    async fn arrivals(server: tokio::net::UdpSocket, quiet: Duration) -> Vec<Instant> {
        let mut buf = vec![0u8; UDP_MAX_SIZE];
        let mut seen = Vec::new();
        while let Ok(received) = tokio::time::timeout(quiet, server.recv_from(&mut buf)).await {
            received.unwrap();
            seen.push(Instant::now());
        }
        seen
    }

    fn response_to(id: TransactionId, client: SocketAddr) -> Vec<u8> {
        let client = match client {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => panic!("expected an IPv4 client"),
        };
        Message::new(
            MessageType::BindingResponse,
            id,
            vec![Attribute::xor_mapped_address(client.into())],
        ).encode().unwrap()
    }

    #[test]
    fn change_port_source_check() {
        let server: SocketAddr = "198.51.100.1:3478".parse().unwrap();
        let check = SourceCheck::for_change(ChangeRequest::Port, false);

        assert!(check.accepts(server, "198.51.100.1:3479".parse().unwrap()));
        assert!(!check.accepts(server, server));
        assert!(!check.accepts(server, "198.51.100.2:3479".parse().unwrap()));
        assert!(!check.accepts(server, "198.51.100.2:3478".parse().unwrap()));
    }

    #[test]
    fn change_address_source_check() {
        let server: SocketAddr = "198.51.100.1:3478".parse().unwrap();
        let other: SocketAddr = "198.51.100.2:3479".parse().unwrap();

        assert!(!SourceCheck::for_change(ChangeRequest::IpAndPort, false).accepts(server, other));

        let trusted = SourceCheck::for_change(ChangeRequest::IpAndPort, true);
        assert!(trusted.accepts(server, other));
        assert!(!trusted.accepts(server, "198.51.100.1:3479".parse().unwrap()));
        assert!(!trusted.accepts(server, "198.51.100.2:3478".parse().unwrap()));
    }

    #[test]
    fn plain_request_accepts_anyone() {
        let check = SourceCheck::for_change(ChangeRequest::None, false);
        let server: SocketAddr = "198.51.100.1:3478".parse().unwrap();
        assert!(check.accepts(server, server));
        assert!(check.accepts(server, "203.0.113.5:1".parse().unwrap()));
    }

    #[tokio::test]
    async fn foreign_transaction_is_ignored() {
        let server = fake_server().await;
        let server_addr = server.local_addr().unwrap();
        let mut t = transport().await;

        tokio::spawn(async move {
            let (req, from) = receive_request(&server).await;
            // a well formed answer from the right server, just not to our request
            let stray = response_to(TransactionId::random(Variant::Rfc5389), "192.0.2.1:1".parse().unwrap());
            server.send_to(&stray, from).await.unwrap();
            server.send_to(&response_to(req.transaction_id, from), from).await.unwrap();
        });

        let reply = t
            .probe(&server_addr.to_string(), ChangeRequest::None, Duration::from_secs(2))
            .await
            .unwrap();

        let local = match t.socket().address().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => unreachable!(),
        };
        assert_eq!(reply.mapped, Some(local.into()));
        assert_eq!(reply.server, server_addr);
    }

    #[tokio::test]
    async fn only_foreign_transactions_time_out() {
        let server = fake_server().await;
        let server_addr = server.local_addr().unwrap();
        let mut t = transport().await;

        tokio::spawn(async move {
            loop {
                let (_, from) = receive_request(&server).await;
                let stray = response_to(TransactionId::random(Variant::Rfc5389), from);
                let _ = server.send_to(&stray, from).await;
            }
        });

        let err = t
            .probe(&server_addr.to_string(), ChangeRequest::None, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn retransmits_until_answered() {
        let server = fake_server().await;
        let server_addr = server.local_addr().unwrap();
        let mut t = transport().await;

        let handle = tokio::spawn(async move {
            // drop the first two attempts on the floor
            let (first, _) = receive_request(&server).await;
            let (second, _) = receive_request(&server).await;
            let (third, from) = receive_request(&server).await;
            server.send_to(&response_to(third.transaction_id, from), from).await.unwrap();
            (first.transaction_id, second.transaction_id, third.transaction_id)
        });

        let reply = t
            .probe(&server_addr.to_string(), ChangeRequest::None, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(reply.mapped.is_some());

        let (a, b, c) = handle.await.unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[tokio::test]
    async fn retransmissions_back_off_until_the_deadline() {
        let server = fake_server().await;
        let server_addr = server.local_addr().unwrap();
        let mut t = transport().await;

        let handle = tokio::spawn(arrivals(server, Duration::from_millis(500)));

        let started = Instant::now();
        let err = t
            .probe(&server_addr.to_string(), ChangeRequest::None, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(500));

        // sends at 0, 50, 150 and 350 ms; the next one would be at 750
        let seen = handle.await.unwrap();
        assert_eq!(seen.len(), 4);

        let gaps: Vec<Duration> = seen.windows(2).map(|w| w[1] - w[0]).collect();
        for (gap, expected) in gaps.iter().zip(&[50u64, 100, 200]) {
            let expected = Duration::from_millis(*expected);
            assert!(*gap + Duration::from_millis(5) >= expected, "gap {:?}, expected {:?}", gap, expected);
            assert!(*gap < expected + Duration::from_millis(40), "gap {:?}, expected {:?}", gap, expected);
        }

        assert!(seen[seen.len() - 1] - seen[0] < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn zero_policy_does_not_flood() {
        let policies = [
            // 10 ms apart at most once floored: at most 31 sends in 300 ms
            (RetransmitPolicy { initial: Duration::from_millis(0), multiplier: 0 }, 31),
            // 0, 10, 30, 70, 150 ms
            (RetransmitPolicy { initial: Duration::from_millis(0), multiplier: 2 }, 5),
        ];

        for (policy, most) in policies.iter() {
            let server = fake_server().await;
            let server_addr = server.local_addr().unwrap();
            let mut t = transport().await.with_retransmit(*policy);

            let handle = tokio::spawn(arrivals(server, Duration::from_millis(300)));

            let err = t
                .probe(&server_addr.to_string(), ChangeRequest::None, Duration::from_millis(300))
                .await
                .unwrap_err();
            assert!(err.is_timeout());

            let seen = handle.await.unwrap();
            assert!(!seen.is_empty());
            assert!(seen.len() <= *most, "{:?} sent {} requests", policy, seen.len());
        }
    }

    #[tokio::test]
    async fn response_without_address_still_counts() {
        let server = fake_server().await;
        let server_addr = server.local_addr().unwrap();
        let mut t = transport().await;

        tokio::spawn(async move {
            let (req, from) = receive_request(&server).await;
            let bare = Message::new(
                MessageType::BindingResponse,
                req.transaction_id,
                vec![Attribute::new(XOR_MAPPED_ADDRESS, vec![0, 0x02, 0, 0])],
            ).encode().unwrap();
            server.send_to(&bare, from).await.unwrap();
        });

        let reply = t
            .probe(&server_addr.to_string(), ChangeRequest::None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply.mapped, None);
    }

    #[tokio::test]
    async fn change_port_needs_the_other_port() {
        let primary = fake_server().await;
        let alternate = fake_server().await;
        let primary_addr = primary.local_addr().unwrap();
        let mut t = transport().await;

        tokio::spawn(async move {
            // first request: answered from the same port, which must be ignored
            let (first, from) = receive_request(&primary).await;
            primary.send_to(&response_to(first.transaction_id, from), from).await.unwrap();

            // second request: answered from the alternate port
            loop {
                let (req, from) = receive_request(&primary).await;
                if req.transaction_id == first.transaction_id {
                    continue;
                }
                alternate.send_to(&response_to(req.transaction_id, from), from).await.unwrap();
                break;
            }
        });

        let err = t
            .probe(&primary_addr.to_string(), ChangeRequest::Port, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let reply = t
            .probe(&primary_addr.to_string(), ChangeRequest::Port, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply.server, primary_addr);
        assert_ne!(reply.source, primary_addr);
    }

    #[tokio::test]
    async fn legacy_variant_round_trip() {
        let server = fake_server().await;
        let server_addr = server.local_addr().unwrap();
        let mut t = transport().await.with_variant(Variant::Rfc3489);

        tokio::spawn(async move {
            let (req, from) = receive_request(&server).await;
            assert_eq!(req.transaction_id.variant(), Variant::Rfc3489);
            let from_v4: SocketAddrV4 = match from {
                SocketAddr::V4(v4) => v4,
                SocketAddr::V6(_) => unreachable!(),
            };
            let resp = Message::new(
                MessageType::BindingResponse,
                req.transaction_id,
                vec![Attribute::mapped_address(from_v4.into())],
            ).encode().unwrap();
            server.send_to(&resp, from).await.unwrap();
        });

        let reply = t
            .probe(&server_addr.to_string(), ChangeRequest::None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply.mapped.map(|m| m.socket_addr()), Some(t.socket().address().unwrap()));
    }

    #[tokio::test]
    async fn unresolvable_server() {
        let mut t = transport().await;
        let err = t
            .probe("definitely not a server", ChangeRequest::None, Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Resolve { .. }));
        assert!(!err.is_timeout());
    }
}

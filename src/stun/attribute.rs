use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::stun::MAGIC_COOKIE;

pub const MAPPED_ADDRESS: u16 = 0x0001;
pub const CHANGE_REQUEST: u16 = 0x0003;
pub const XOR_MAPPED_ADDRESS: u16 = 0x0020;

const FAMILY_IPV4: u8 = 0x01;

/// A single type-length-value entry of a STUN message.
///
/// `value` is stored unpadded; padding is added when the message is encoded.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Attribute {
    pub kind: u16,
    pub value: Vec<u8>,
}

impl Attribute {
    pub fn new(kind: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn change_request(change: ChangeRequest) -> Self {
        Self::new(CHANGE_REQUEST, change.flags().to_be_bytes())
    }

    pub fn mapped_address(addr: MappedAddress) -> Self {
        Self::new(MAPPED_ADDRESS, addr.to_bytes())
    }

    /// XOR-MAPPED-ADDRESS carrying `addr` masked with the magic cookie.
    pub fn xor_mapped_address(addr: MappedAddress) -> Self {
        Self::new(XOR_MAPPED_ADDRESS, addr.xor().to_bytes())
    }

    /// Length on the wire, including the sub-header and padding.
    pub fn encoded_len(&self) -> usize {
        4 + padded(self.value.len())
    }
}

/// Round `len` up to the next multiple of four.
pub(crate) fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Our public address as observed by a STUN server.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MappedAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl MappedAddress {
    pub fn new(ip: impl Into<Ipv4Addr>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Parse the value of a (XOR-)MAPPED-ADDRESS attribute, as is.
    ///
    /// Returns `None` for short values and for anything that isn't IPv4.
    pub fn from_bytes(value: &[u8]) -> Option<Self> {
        if value.len() < 8 || value[1] != FAMILY_IPV4 {
            return None;
        }

        let port = u16::from_be_bytes([value[2], value[3]]);
        let ip = Ipv4Addr::new(value[4], value[5], value[6], value[7]);
        Some(Self { ip, port })
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let port = self.port.to_be_bytes();
        let ip = self.ip.octets();
        [0, FAMILY_IPV4, port[0], port[1], ip[0], ip[1], ip[2], ip[3]]
    }

    /// Apply the XOR-MAPPED-ADDRESS mask. Masking is its own inverse.
    pub fn xor(&self) -> Self {
        let cookie = MAGIC_COOKIE.to_be_bytes();
        let ip = self.ip.octets();

        Self {
            ip: Ipv4Addr::new(
                ip[0] ^ cookie[0],
                ip[1] ^ cookie[1],
                ip[2] ^ cookie[2],
                ip[3] ^ cookie[3],
            ),
            port: self.port ^ (MAGIC_COOKIE >> 16) as u16,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddrV4::new(self.ip, self.port).into()
    }
}

impl From<SocketAddrV4> for MappedAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl fmt::Display for MappedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The CHANGE-REQUEST flags we send.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ChangeRequest {
    /// Plain binding request, no CHANGE-REQUEST attribute at all.
    None,
    /// Ask the server to answer from its other port.
    Port,
    /// Ask the server to answer from its other IP and port.
    IpAndPort,
}

impl ChangeRequest {
    pub const CHANGE_PORT: u32 = 0x02;
    pub const CHANGE_IP: u32 = 0x04;

    pub fn flags(&self) -> u32 {
        match self {
            ChangeRequest::None => 0,
            ChangeRequest::Port => Self::CHANGE_PORT,
            ChangeRequest::IpAndPort => Self::CHANGE_IP | Self::CHANGE_PORT,
        }
    }

    pub fn from_flags(flags: u32) -> Self {
        if flags & Self::CHANGE_IP != 0 {
            ChangeRequest::IpAndPort
        } else if flags & Self::CHANGE_PORT != 0 {
            ChangeRequest::Port
        } else {
            ChangeRequest::None
        }
    }

    /// Attributes to put in a request asking for this change.
    pub fn attributes(&self) -> Vec<Attribute> {
        match self {
            ChangeRequest::None => vec![],
            _ => vec![Attribute::change_request(*self)],
        }
    }
}

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::stun::attribute::{padded, Attribute, MappedAddress, MAPPED_ADDRESS, XOR_MAPPED_ADDRESS};
use crate::stun::error::{DecodeError, EncodeError};
use crate::stun::{HEADER_LEN, MAGIC_COOKIE};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MessageType {
    BindingRequest,
    BindingResponse,
    Unknown(u16),
}

impl From<u16> for MessageType {
    fn from(value: u16) -> Self {
        match value {
            0x0001 => MessageType::BindingRequest,
            0x0101 => MessageType::BindingResponse,
            other => MessageType::Unknown(other),
        }
    }
}

impl From<MessageType> for u16 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::BindingRequest => 0x0001,
            MessageType::BindingResponse => 0x0101,
            MessageType::Unknown(other) => other,
        }
    }
}

/// Header layout. RFC 5389 puts the magic cookie in front of a 12 byte
/// transaction id; RFC 3489 uses all 16 bytes as the id.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Variant {
    Rfc5389,
    Rfc3489,
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Rfc5389
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TransactionId {
    Rfc5389([u8; 12]),
    Rfc3489([u8; 16]),
}

impl TransactionId {
    /// A fresh id from the OS random source, so we don't collide with other
    /// users of the same public server.
    pub fn random(variant: Variant) -> Self {
        match variant {
            Variant::Rfc5389 => {
                let mut id = [0u8; 12];
                OsRng.fill(&mut id[..]);
                TransactionId::Rfc5389(id)
            }
            Variant::Rfc3489 => {
                let mut id = [0u8; 16];
                OsRng.fill(&mut id[..]);
                TransactionId::Rfc3489(id)
            }
        }
    }

    pub fn variant(&self) -> Variant {
        match self {
            TransactionId::Rfc5389(_) => Variant::Rfc5389,
            TransactionId::Rfc3489(_) => Variant::Rfc3489,
        }
    }

    /// Read the id out of a raw header. The buffer must be at least 20 bytes.
    fn from_header(header: &[u8]) -> Self {
        if header[4..8] == MAGIC_COOKIE.to_be_bytes() {
            let mut id = [0u8; 12];
            id.copy_from_slice(&header[8..20]);
            TransactionId::Rfc5389(id)
        } else {
            let mut id = [0u8; 16];
            id.copy_from_slice(&header[4..20]);
            TransactionId::Rfc3489(id)
        }
    }

    /// Does the raw datagram `buf` carry this transaction id?
    pub fn matches(&self, buf: &[u8]) -> bool {
        if buf.len() < HEADER_LEN {
            return false;
        }

        match self {
            TransactionId::Rfc5389(id) => buf[8..20] == id[..],
            TransactionId::Rfc3489(id) => buf[4..20] == id[..],
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            TransactionId::Rfc5389(id) => {
                out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
                out.extend_from_slice(id);
            }
            TransactionId::Rfc3489(id) => out.extend_from_slice(id),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub message_type: MessageType,
    pub transaction_id: TransactionId,
    pub attributes: Vec<Attribute>,
}

impl Message {
    pub fn new(message_type: MessageType, transaction_id: TransactionId, attributes: Vec<Attribute>) -> Self {
        Self {
            message_type,
            transaction_id,
            attributes,
        }
    }

    /// A binding request with a fresh random transaction id.
    pub fn binding_request(attributes: Vec<Attribute>, variant: Variant) -> Self {
        Self::new(MessageType::BindingRequest, TransactionId::random(variant), attributes)
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        for attr in &self.attributes {
            if attr.value.len() > u16::MAX as usize {
                return Err(EncodeError::AttributeTooLong {
                    kind: attr.kind,
                    len: attr.value.len(),
                });
            }
        }

        let body_len: usize = self.attributes.iter().map(Attribute::encoded_len).sum();
        let declared = u16::try_from(body_len).map_err(|_| EncodeError::MessageTooLong(body_len))?;

        let mut out = Vec::with_capacity(HEADER_LEN + body_len);
        out.extend_from_slice(&u16::from(self.message_type).to_be_bytes());
        out.extend_from_slice(&declared.to_be_bytes());
        self.transaction_id.write(&mut out);

        for attr in &self.attributes {
            out.extend_from_slice(&attr.kind.to_be_bytes());
            out.extend_from_slice(&(attr.value.len() as u16).to_be_bytes());
            out.extend_from_slice(&attr.value);
            out.resize(out.len() + padded(attr.value.len()) - attr.value.len(), 0);
        }

        Ok(out)
    }

    /// Parse any STUN message.
    ///
    /// The attribute scan is lenient: an attribute running past the end of the
    /// message ends the scan, keeping whatever was read before it.
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::TooShort(buf.len()));
        }

        let message_type = MessageType::from(u16::from_be_bytes([buf[0], buf[1]]));
        let declared = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if buf.len() < HEADER_LEN + declared {
            return Err(DecodeError::Truncated {
                declared,
                actual: buf.len() - HEADER_LEN,
            });
        }

        let transaction_id = TransactionId::from_header(buf);

        // anything past the declared length is ignored
        let buf = &buf[..HEADER_LEN + declared];

        let mut attributes = Vec::new();
        let mut offset = HEADER_LEN;
        while offset + 4 <= buf.len() {
            let kind = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            let len = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            offset += 4;

            if offset + len > buf.len() {
                log::trace!("attribute 0x{:04x} runs past the end of the message, stopping", kind);
                break;
            }

            attributes.push(Attribute::new(kind, &buf[offset..offset + len]));
            offset += padded(len);
        }

        Ok(Self {
            message_type,
            transaction_id,
            attributes,
        })
    }

    /// The address reported by this message, if any.
    ///
    /// The first XOR-MAPPED-ADDRESS wins; failing that, the first MAPPED-ADDRESS.
    /// XOR-MAPPED-ADDRESS is only unmasked under the magic cookie layout.
    pub fn mapped_address(&self) -> Option<MappedAddress> {
        let find = |kind: u16| {
            self.attributes
                .iter()
                .filter(|a| a.kind == kind)
                .find_map(|a| MappedAddress::from_bytes(&a.value))
        };

        if let Some(addr) = find(XOR_MAPPED_ADDRESS) {
            return Some(match self.transaction_id.variant() {
                Variant::Rfc5389 => addr.xor(),
                Variant::Rfc3489 => addr,
            });
        }

        find(MAPPED_ADDRESS)
    }
}

/// Encode a message with a fresh transaction id.
///
/// Returns the id alongside the bytes so the caller can match the response.
pub fn encode(
    message_type: MessageType,
    attributes: Vec<Attribute>,
    variant: Variant,
) -> Result<(TransactionId, Vec<u8>), EncodeError> {
    let message = Message::new(message_type, TransactionId::random(variant), attributes);
    let bytes = message.encode()?;
    Ok((message.transaction_id, bytes))
}

/// Decode a binding response into the address it reports.
///
/// `Ok(None)` means the response was well formed but carried no usable address.
pub fn decode(buf: &[u8]) -> Result<Option<MappedAddress>, DecodeError> {
    let message = Message::parse(buf)?;
    if message.message_type != MessageType::BindingResponse {
        return Err(DecodeError::NotBindingResponse(message.message_type.into()));
    }

    Ok(message.mapped_address())
}

use std::io;
use thiserror::Error;

/// A datagram that is not a usable STUN binding response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message is {0} bytes, shorter than the 20 byte STUN header")]
    TooShort(usize),

    #[error("expected a binding response, got message type 0x{0:04x}")]
    NotBindingResponse(u16),

    #[error("header declares {declared} attribute bytes but only {actual} are present")]
    Truncated { declared: usize, actual: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("attribute 0x{kind:04x} has a {len} byte value, more than fits in a length field")]
    AttributeTooLong { kind: u16, len: usize },

    #[error("attributes take up {0} bytes, more than fits in the message length field")]
    MessageTooLong(usize),
}

/// Why a single probe produced no response.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no qualifying response before the deadline")]
    Timeout,

    #[error("couldn't resolve {server}: {source}")]
    Resolve {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} has no IPv4 address")]
    NoIpv4Address(String),

    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("couldn't encode request: {0}")]
    Encode(#[from] EncodeError),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout)
    }
}

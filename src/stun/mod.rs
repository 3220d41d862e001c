//! The STUN binding exchange: wire codec and a retransmitting request transport.

pub mod attribute;
pub mod error;
pub mod message;
pub mod responder;
pub mod transport;

pub use attribute::{Attribute, ChangeRequest, MappedAddress};
pub use error::{DecodeError, EncodeError, ProbeError};
pub use message::{decode, encode, Message, MessageType, TransactionId, Variant};
pub use transport::{ProbeReply, Prober, RetransmitPolicy, SourceCheck, Transport};

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const HEADER_LEN: usize = 20;

//! Find out what kind of NAT sits between this host and the internet, using
//! nothing but UDP binding requests to public STUN servers.

pub mod async_socket;
pub mod nat;
pub mod stun;

pub use nat::{detect_with, DetectError, NatType, NatVerdict, ProbeConfig};
#[cfg(feature = "runtime-tokio")]
pub use nat::detect;

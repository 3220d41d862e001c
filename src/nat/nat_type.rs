use serde::{Serialize, Deserialize};
use std::fmt;

use crate::stun::MappedAddress;


/// Detected NAT Type
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum NatType {
    /// Our public address is our local address.
    OpenInternet,
    /// Anyone can reach the mapped address once it exists.
    FullCone,
    /// Only IPs we sent to can reach the mapped address.
    RestrictedCone,
    /// Only IP:port pairs we sent to can reach the mapped address.
    PortRestrictedCone,
    /// A new mapping per destination.
    Symmetric,
    /// No STUN server could be reached over UDP at all.
    UdpBlocked,
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NatType::OpenInternet => "Open Internet",
            NatType::FullCone => "Full Cone NAT",
            NatType::RestrictedCone => "Restricted Cone NAT",
            NatType::PortRestrictedCone => "Port Restricted Cone NAT",
            NatType::Symmetric => "Symmetric NAT",
            NatType::UdpBlocked => "UDP Blocked",
        };
        f.write_str(name)
    }
}

/// Whether the NAT keeps the same mapping regardless of destination.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MappingBehavior {
    EndpointIndependent,
    EndpointDependent,
}

impl fmt::Display for MappingBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingBehavior::EndpointIndependent => f.write_str("Endpoint Independent"),
            MappingBehavior::EndpointDependent => f.write_str("Endpoint Dependent"),
        }
    }
}

/// Outcome of one detection run.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NatVerdict {
    pub nat_type: NatType,
    /// Human readable summary of the evidence.
    pub reason: String,
    pub public_address: Option<MappedAddress>,
}

impl NatVerdict {
    pub fn new(nat_type: NatType, reason: impl Into<String>, public_address: Option<MappedAddress>) -> Self {
        Self {
            nat_type,
            reason: reason.into(),
            public_address,
        }
    }
}

impl fmt::Display for NatVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.nat_type, self.reason)?;
        if let Some(addr) = self.public_address {
            write!(f, ", public address {}", addr)?;
        }
        Ok(())
    }
}

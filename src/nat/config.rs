use serde::{Serialize, Deserialize};
use std::time::Duration;

use crate::nat::servers::ServerList;
use crate::stun::{RetransmitPolicy, Variant};

/// General purpose public STUN servers.
pub const DEFAULT_STUN_SERVERS: &[&str] = &[
    "stun.l.google.com:19302",
    "stun1.l.google.com:19302",
    "stun.stunprotocol.org:3478",
];

/// Public servers known to honour RFC 3489 CHANGE-REQUEST.
pub const DEFAULT_CHANGE_REQUEST_SERVERS: &[&str] = &[
    "stun.sipgate.net:3478",
    "stun.voipstunt.com:3478",
    "stun.schlund.de:3478",
];

/// Everything a detection run needs to know up front.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Used for the connectivity and mapping behavior tests. The first two
    /// entries are tried for connectivity; the rest serve as alternates.
    pub stun_servers: ServerList,
    /// Used only for the cone subtype tests.
    pub change_request_servers: ServerList,
    /// Deadline for connectivity and mapping probes.
    pub connectivity_timeout: Duration,
    /// Deadline for each cone subtype probe.
    pub cone_timeout: Duration,
    pub retransmit: RetransmitPolicy,
    pub variant: Variant,
    /// Accept change-IP replies as evidence of a full cone. Only sound when the
    /// change request servers are single hosts, not DNS pools.
    pub trust_changed_address: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            stun_servers: DEFAULT_STUN_SERVERS.iter().copied().collect(),
            change_request_servers: DEFAULT_CHANGE_REQUEST_SERVERS.iter().copied().collect(),
            connectivity_timeout: Duration::from_secs(3),
            cone_timeout: Duration::from_secs(2),
            retransmit: Default::default(),
            variant: Default::default(),
            trust_changed_address: false,
        }
    }
}

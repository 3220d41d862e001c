use std::time::Duration;

use crate::nat::config::ProbeConfig;
use crate::nat::local_info::LocalEndpoint;
use crate::nat::nat_type::{MappingBehavior, NatType, NatVerdict};
use crate::stun::{ChangeRequest, MappedAddress, ProbeError, ProbeReply, Prober};

/// How many of the general servers are tried for basic connectivity.
const CONNECTIVITY_SERVERS: usize = 2;

/// What we know after the connectivity test.
#[derive(Debug, Copy, Clone)]
struct Connected {
    /// `None` if the server answered without a readable address.
    primary: Option<MappedAddress>,
    /// Index of the server that answered.
    answered_by: usize,
    port_preserved: bool,
}

/// What we know after the mapping behavior test.
#[derive(Debug, Copy, Clone)]
struct Evidence {
    primary: Option<MappedAddress>,
    port_preserved: bool,
    mapping: MappingBehavior,
    /// No alternate server gave us anything to compare against.
    mapping_assumed: bool,
}

#[derive(Debug)]
enum Phase {
    Connectivity,
    MappingBehavior(Connected),
    ConeSubtype(Evidence),
    Done(NatVerdict),
}

/// Runs the probe sequence and turns the answers into a [`NatVerdict`].
///
/// Probes are strictly sequential: the next one is only sent once the previous
/// one has been answered or has timed out. Unreachable servers never abort the
/// run; each phase falls back to the next server or to a conservative default.
pub struct Classifier<P> {
    prober: P,
    config: ProbeConfig,
    local: LocalEndpoint,
}

impl<P: Prober> Classifier<P> {
    pub fn new(prober: P, config: ProbeConfig, local: LocalEndpoint) -> Self {
        Self {
            prober,
            config,
            local,
        }
    }

    pub fn into_inner(self) -> P {
        self.prober
    }

    pub async fn classify(&mut self) -> NatVerdict {
        let mut phase = Phase::Connectivity;

        loop {
            log::debug!("phase: {:?}", phase);
            phase = match phase {
                Phase::Connectivity => self.connectivity().await,
                Phase::MappingBehavior(connected) => self.mapping_behavior(connected).await,
                Phase::ConeSubtype(evidence) => self.cone_subtype(evidence).await,
                Phase::Done(verdict) => {
                    log::info!("detected {}", verdict);
                    return verdict;
                }
            };
        }
    }

    async fn connectivity(&mut self) -> Phase {
        let candidates: Vec<usize> = (0..CONNECTIVITY_SERVERS.min(self.config.stun_servers.len())).collect();
        let timeout = self.config.connectivity_timeout;

        let (answered_by, reply) = match self.first_answer(&candidates, timeout).await {
            Some(i) => i,
            None => {
                return Phase::Done(NatVerdict::new(NatType::UdpBlocked, "All STUN requests failed", None));
            }
        };

        match reply.mapped {
            Some(primary) if primary.ip == self.local.ip => {
                Phase::Done(NatVerdict::new(NatType::OpenInternet, "No NAT detected", Some(primary)))
            }
            primary => Phase::MappingBehavior(Connected {
                primary,
                answered_by,
                port_preserved: primary.map_or(false, |p| p.port == self.local.port),
            }),
        }
    }

    /// Compare the primary mapping with one seen by another server.
    ///
    /// The server that produced the primary mapping is never asked again, so
    /// an answer is never compared with one from the same server.
    async fn mapping_behavior(&mut self, connected: Connected) -> Phase {
        let len = self.config.stun_servers.len();
        let connectivity = CONNECTIVITY_SERVERS.min(len);

        // servers we haven't tried yet first, then whichever connectivity
        // server didn't give us the primary mapping
        let candidates: Vec<usize> = (connectivity..len)
            .chain((0..connectivity).filter(|&i| i != connected.answered_by))
            .collect();
        let timeout = self.config.connectivity_timeout;

        let (mapping, mapping_assumed) = match self.first_answer(&candidates, timeout).await {
            Some((_, reply)) => match (connected.primary, reply.mapped) {
                (Some(primary), Some(other)) if primary != other => {
                    log::debug!("mapping changed from {} to {}", primary, other);
                    (MappingBehavior::EndpointDependent, false)
                }
                (Some(_), Some(_)) => (MappingBehavior::EndpointIndependent, false),
                _ => (MappingBehavior::EndpointIndependent, true),
            },
            // can't prove a symmetric NAT without a second server, so don't claim one
            None => (MappingBehavior::EndpointIndependent, true),
        };

        let evidence = Evidence {
            primary: connected.primary,
            port_preserved: connected.port_preserved,
            mapping,
            mapping_assumed,
        };

        match mapping {
            MappingBehavior::EndpointDependent => Phase::Done(NatVerdict::new(
                NatType::Symmetric,
                reason("Public IP/Port varies by destination", evidence.port_preserved),
                evidence.primary,
            )),
            MappingBehavior::EndpointIndependent => Phase::ConeSubtype(evidence),
        }
    }

    async fn cone_subtype(&mut self, evidence: Evidence) -> Phase {
        log::info!("Detected {} Mapping. Probing for cone subtype...", evidence.mapping);

        let timeout = self.config.cone_timeout;
        let mut nat_type = NatType::PortRestrictedCone;

        for server in self.config.change_request_servers.iter() {
            let reachable = match self.prober.probe(server, ChangeRequest::None, timeout).await {
                Ok(i) => i,
                Err(e) => {
                    log_failure(server, &e);
                    continue;
                }
            };

            // stick to the exact pool member that just answered
            let pinned = reachable.server.to_string();

            if self.prober.probe(&pinned, ChangeRequest::IpAndPort, timeout).await.is_ok() {
                nat_type = NatType::FullCone;
                break;
            }

            if self.prober.probe(&pinned, ChangeRequest::Port, timeout).await.is_ok() {
                nat_type = NatType::RestrictedCone;
                break;
            }

            log::debug!("{} gave no usable change request answer", pinned);
        }

        let summary = if evidence.mapping_assumed {
            format!("{} Mapping (assumed, no alternate server to compare with)", evidence.mapping)
        } else {
            format!("{} Mapping", evidence.mapping)
        };

        Phase::Done(NatVerdict::new(
            nat_type,
            reason(&summary, evidence.port_preserved),
            evidence.primary,
        ))
    }

    /// Plain binding request to each candidate in order until one answers.
    async fn first_answer(&mut self, candidates: &[usize], timeout: Duration) -> Option<(usize, ProbeReply)> {
        for &index in candidates {
            let server = match self.config.stun_servers.get(index) {
                Some(i) => i,
                None => continue,
            };

            match self.prober.probe(server, ChangeRequest::None, timeout).await {
                Ok(reply) => {
                    log::debug!("{} answered with {:?}", server, reply.mapped);
                    return Some((index, reply));
                }
                Err(e) => log_failure(server, &e),
            }
        }

        None
    }
}

fn log_failure(server: &str, e: &ProbeError) {
    if e.is_timeout() {
        log::debug!("{}: {}", server, e);
    } else {
        log::warn!("{}: {}", server, e);
    }
}

fn reason(summary: &str, port_preserved: bool) -> String {
    let mut reason = format!("{}.", summary);
    if port_preserved {
        reason.push_str(" Port Preserved.");
    }
    reason
}

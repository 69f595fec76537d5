//! Live master-side DNS lookups.
//!
//! A zone's master is the SOA `mname`. Its current serial is read by sending
//! the SOA query straight to the master's address, so a lagging recursive
//! cache cannot hide a missed transfer.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{ResolveError, Resolver, TokioResolver};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Key collectors use for the root zone.
pub const ROOT_ZONE_KEY: &str = "root";

const DNS_PORT: u16 = 53;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to create resolver: {0}")]
    Resolver(#[source] ResolveError),

    #[error("unable to resolve {name}: {source}")]
    Resolve {
        name: String,
        #[source]
        source: ResolveError,
    },

    #[error("no {record} record returned for {name}")]
    NoRecords { name: String, record: &'static str },
}

/// Master server and serial observed for a zone at check time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterSerialObservation {
    pub master_host: String,
    pub master_ip: Ipv4Addr,
    pub serial: u32,
}

/// Fully-qualify a zone key for querying: `root` is the apex `.`, anything
/// else gets a trailing dot.
pub fn qualify(domain: &str) -> String {
    if domain == ROOT_ZONE_KEY {
        return ".".to_string();
    }
    if domain.ends_with('.') {
        domain.to_string()
    } else {
        format!("{domain}.")
    }
}

/// Lookups needed to find a zone's master serial.
#[async_trait]
pub trait MasterLookup: Send + Sync {
    /// SOA `mname` of `domain` via the system resolver.
    async fn resolve_master(&self, domain: &str) -> Result<String, LookupError>;

    /// First IPv4 address of `hostname` via the system resolver.
    async fn resolve_address(&self, hostname: &str) -> Result<Ipv4Addr, LookupError>;

    /// SOA serial of `domain` as answered by `server` itself.
    async fn query_serial(&self, domain: &str, server: Ipv4Addr) -> Result<u32, LookupError>;

    /// Resolve master, its address, then ask it for the serial.
    ///
    /// The first failing step ends the chain.
    async fn master_serial(&self, domain: &str) -> Result<MasterSerialObservation, LookupError> {
        let zone = qualify(domain);
        let master_host = self.resolve_master(&zone).await?;
        let master_ip = self.resolve_address(&master_host).await?;
        let serial = self.query_serial(&zone, master_ip).await?;
        Ok(MasterSerialObservation {
            master_host,
            master_ip,
            serial,
        })
    }
}

/// `MasterLookup` backed by hickory and the host's resolver configuration.
pub struct SystemLookup {
    resolver: TokioResolver,
}

impl SystemLookup {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system() -> Result<Self, LookupError> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(LookupError::Resolver)?
            .build();
        Ok(Self { resolver })
    }

    /// Like [`SystemLookup::from_system`], falling back to hickory's default
    /// upstreams when the host has no usable resolver configuration.
    pub fn from_system_or_default() -> Self {
        Self::from_system().unwrap_or_else(|e| {
            warn!(error = %e, "system resolver configuration unavailable, using defaults");
            let resolver = Resolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            )
            .build();
            Self { resolver }
        })
    }

    /// Resolver whose only upstream is `server`.
    fn direct_resolver(server: Ipv4Addr) -> TokioResolver {
        let group = NameServerConfigGroup::from_ips_clear(&[IpAddr::V4(server)], DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        Resolver::builder_with_config(config, TokioConnectionProvider::default()).build()
    }
}

#[async_trait]
impl MasterLookup for SystemLookup {
    async fn resolve_master(&self, domain: &str) -> Result<String, LookupError> {
        debug!(domain, "looking up SOA mname");
        let lookup = self
            .resolver
            .soa_lookup(domain)
            .await
            .map_err(|source| LookupError::Resolve {
                name: domain.to_string(),
                source,
            })?;
        lookup
            .iter()
            .next()
            .map(|soa| soa.mname().to_string())
            .ok_or_else(|| LookupError::NoRecords {
                name: domain.to_string(),
                record: "SOA",
            })
    }

    async fn resolve_address(&self, hostname: &str) -> Result<Ipv4Addr, LookupError> {
        debug!(hostname, "looking up master address");
        let lookup = self
            .resolver
            .ipv4_lookup(hostname)
            .await
            .map_err(|source| LookupError::Resolve {
                name: hostname.to_string(),
                source,
            })?;
        lookup
            .iter()
            .next()
            .map(|a| a.0)
            .ok_or_else(|| LookupError::NoRecords {
                name: hostname.to_string(),
                record: "A",
            })
    }

    async fn query_serial(&self, domain: &str, server: Ipv4Addr) -> Result<u32, LookupError> {
        debug!(domain, %server, "querying master for SOA serial");
        let lookup = Self::direct_resolver(server)
            .soa_lookup(domain)
            .await
            .map_err(|source| LookupError::Resolve {
                name: domain.to_string(),
                source,
            })?;
        lookup
            .iter()
            .next()
            .map(|soa| soa.serial())
            .ok_or_else(|| LookupError::NoRecords {
                name: domain.to_string(),
                record: "SOA",
            })
    }
}

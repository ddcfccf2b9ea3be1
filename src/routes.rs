// Routing table
//
// Every endpoint is one plain entry: a path, the trust tier that decides its
// admission filters and metadata augmentation, and the protocol its handler
// speaks. The server builds its router from a table handed to it at startup.

use crate::augment::AugmentTarget;
use crate::config::RuntimeConfig;
use crate::handlers::legacy::LegacyFamily;
use crate::middleware::{
    BearerAuth, ConcurrencyLimit, Cors, Filter, FilterChain, IpRateLimiter, KillSwitch,
    RateLimit, RequestLogger, RATE_LIMIT_CACHE_SIZE,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const HEALTHCHECK_PATH: &str = "/healthcheck";
pub const ROOT_PATH: &str = "/";
pub const INTAKE_PATH: &str = "/v2/intake";
pub const RUM_INTAKE_PATH: &str = "/v2/rum/intake";

/// Who is expected to call a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Server-side agents, trusted once authenticated.
    Backend,
    /// Browser agents: public, rate limited and origin checked.
    Rum,
    /// The legacy metrics endpoint.
    Metrics,
    Health,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Backend => "backend",
            Tier::Rum => "rum",
            Tier::Metrics => "metrics",
            Tier::Health => "health",
        }
    }

    pub fn augment_target(&self) -> Option<AugmentTarget> {
        match self {
            Tier::Backend | Tier::Metrics => Some(AugmentTarget::System),
            Tier::Rum => Some(AugmentTarget::User),
            Tier::Health => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// NDJSON stream: a metadata line followed by records.
    Streaming,
    /// One JSON payload carrying an array of one record family.
    Legacy(LegacyFamily),
    Health,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub path: &'static str,
    pub tier: Tier,
    pub protocol: Protocol,
}

impl RouteEntry {
    pub const fn new(path: &'static str, tier: Tier, protocol: Protocol) -> Self {
        Self {
            path,
            tier,
            protocol,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        Self { entries }
    }

    /// The full public surface of the intake server.
    pub fn standard() -> Self {
        use LegacyFamily::{Errors, Metrics, Transactions};

        Self::new(vec![
            RouteEntry::new(ROOT_PATH, Tier::Health, Protocol::Health),
            RouteEntry::new(HEALTHCHECK_PATH, Tier::Health, Protocol::Health),
            RouteEntry::new(INTAKE_PATH, Tier::Backend, Protocol::Streaming),
            RouteEntry::new(RUM_INTAKE_PATH, Tier::Rum, Protocol::Streaming),
            RouteEntry::new("/v1/transactions", Tier::Backend, Protocol::Legacy(Transactions)),
            RouteEntry::new("/v1/errors", Tier::Backend, Protocol::Legacy(Errors)),
            RouteEntry::new("/v1/metrics", Tier::Metrics, Protocol::Legacy(Metrics)),
            RouteEntry::new("/v1/rum/transactions", Tier::Rum, Protocol::Legacy(Transactions)),
            RouteEntry::new("/v1/rum/errors", Tier::Rum, Protocol::Legacy(Errors)),
            RouteEntry::new(
                "/v1/client-side/transactions",
                Tier::Rum,
                Protocol::Legacy(Transactions),
            ),
            RouteEntry::new("/v1/client-side/errors", Tier::Rum, Protocol::Legacy(Errors)),
        ])
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }
}

/// Filter chains for each tier, built once per server.
///
/// Routes of the same tier share one chain, and with it one concurrency
/// pool and one rate limiter.
#[derive(Debug, Clone)]
pub struct TierChains {
    backend: FilterChain,
    rum: FilterChain,
    metrics: FilterChain,
    health: FilterChain,
}

impl TierChains {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let logger: Arc<dyn Filter> = Arc::new(RequestLogger);
        let permits = Arc::new(Semaphore::new(config.request.concurrent_requests));
        let concurrency: Arc<dyn Filter> = Arc::new(ConcurrencyLimit::new(
            permits,
            config.request.max_request_queue_time(),
        ));
        let auth: Arc<dyn Filter> = Arc::new(BearerAuth::new(
            config.auth.token().map(str::to_string),
        ));
        let limiter = Arc::new(IpRateLimiter::new(
            config.rum.rate_limit,
            RATE_LIMIT_CACHE_SIZE,
        ));

        Self {
            backend: FilterChain::new(vec![
                Arc::clone(&logger),
                Arc::clone(&concurrency),
                Arc::clone(&auth),
            ]),
            rum: FilterChain::new(vec![
                Arc::clone(&logger),
                Arc::new(KillSwitch::new(config.rum.enabled)),
                Arc::clone(&concurrency),
                Arc::new(RateLimit::new(limiter)),
                Arc::new(Cors::new(config.rum.allow_origins.clone())),
            ]),
            metrics: FilterChain::new(vec![
                Arc::clone(&logger),
                Arc::new(KillSwitch::new(config.metrics.enabled)),
                auth,
            ]),
            health: FilterChain::new(vec![logger]),
        }
    }

    pub fn for_tier(&self, tier: Tier) -> FilterChain {
        match tier {
            Tier::Backend => self.backend.clone(),
            Tier::Rum => self.rum.clone(),
            Tier::Metrics => self.metrics.clone(),
            Tier::Health => self.health.clone(),
        }
    }
}

// Admission control
//
// Each route runs an ordered list of filters before its handler. A filter
// either answers the request itself or passes it on through `Next`, which
// walks the rest of the list and finally reaches the route handler.

mod auth;
mod concurrency;
mod cors;
mod kill_switch;
mod logging;
mod rate_limit;

pub use auth::BearerAuth;
pub use concurrency::ConcurrencyLimit;
pub use cors::{glob_match, Cors};
pub use kill_switch::KillSwitch;
pub use logging::{RequestId, RequestLogger};
pub use rate_limit::{IpRateLimiter, RateLimit, TokenBucket, RATE_LIMIT_CACHE_SIZE};

use async_trait::async_trait;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Extensions, HeaderMap};
use axum::middleware;
use axum::response::Response;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// One admission stage with a uniform (request, next) contract.
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn call(&self, req: Request, next: Next<'_>) -> Response;
}

/// The remaining filters of a chain plus the route handler behind them.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Filter>],
    endpoint: middleware::Next,
}

impl<'a> Next<'a> {
    pub async fn run(self, req: Request) -> Response {
        match self.rest.split_first() {
            Some((filter, rest)) => {
                filter
                    .call(
                        req,
                        Next {
                            rest,
                            endpoint: self.endpoint,
                        },
                    )
                    .await
            }
            None => self.endpoint.run(req).await,
        }
    }
}

/// Ordered filters for one route, outermost first.
#[derive(Clone)]
pub struct FilterChain {
    filters: Arc<[Arc<dyn Filter>]>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self {
            filters: filters.into(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub async fn run(&self, req: Request, endpoint: middleware::Next) -> Response {
        Next {
            rest: &self.filters,
            endpoint,
        }
        .run(req)
        .await
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Adapter for `axum::middleware::from_fn_with_state`.
pub async fn apply_chain(
    State(chain): State<FilterChain>,
    req: Request,
    next: middleware::Next,
) -> Response {
    chain.run(req, next).await
}

/// Best guess at the client address: proxy headers first, then the socket peer.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return Some(ip.to_string());
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

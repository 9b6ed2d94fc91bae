use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::KeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};

/// Per-endpoint rate limit, expressed as `N` requests per `period_secs`
/// seconds, keyed by source IP.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests: u64,
    pub period_secs: u64,
    pub burst: u32,
}

impl RateLimitConfig {
    pub const fn new(requests: u64, period_secs: u64, burst: u32) -> Self {
        Self {
            requests,
            period_secs,
            burst,
        }
    }

    /// `/token`: 100 requests per 5 seconds.
    pub const fn token() -> Self {
        Self::new(100, 5, 20)
    }

    /// `/register`: 10 requests per minute.
    pub const fn register() -> Self {
        Self::new(10, 60, 5)
    }

    /// The mock upstream IdP surface: 20 requests per minute.
    pub const fn mock_upstream_idp() -> Self {
        Self::new(20, 60, 5)
    }

    fn per_second(&self) -> u64 {
        std::cmp::max(1, self.requests / self.period_secs.max(1))
    }
}

/// Keys a request by its source IP: proxy-forwarded headers first, then the
/// socket's peer address. A request with neither (a unit test driving the
/// router directly) falls back to loopback rather than erroring — the limit
/// still applies, just shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceIpKeyExtractor;

impl KeyExtractor for SourceIpKeyExtractor {
    type Key = IpAddr;

    fn name(&self) -> &'static str {
        "source IP"
    }

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(forwarded
            .or(real_ip)
            .or(peer)
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)))
    }
}

/// Build a source-IP rate-limiting layer from a [`RateLimitConfig`].
pub fn layer_for(
    config: RateLimitConfig,
) -> GovernorLayer<SourceIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body> {
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(SourceIpKeyExtractor)
            .per_second(config.per_second())
            .burst_size(config.burst)
            .finish()
            .expect("static governor config is always valid"),
    );

    GovernorLayer::new(governor_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_header_wins_over_fallback() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        let key = SourceIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(key, "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn missing_source_falls_back_to_loopback() {
        let req = Request::builder().body(()).unwrap();
        let key = SourceIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(key, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn limits_reduce_to_at_least_one_request_per_second() {
        assert_eq!(RateLimitConfig::register().per_second(), 1);
        assert_eq!(RateLimitConfig::token().per_second(), 20);
    }
}

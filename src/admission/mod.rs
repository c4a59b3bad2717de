//! Transport-agnostic admission boundary.
//!
//! Turns the identity hints a request carries into a `(key, tier)` pair for
//! the limiter and shapes the limiter's answer into what a transport layer
//! surfaces to clients.

pub mod handler;

pub use handler::{Admission, AdmissionController, RateLimitStatus};

use crate::config::{Tier, TierTable};
use crate::errors::{RateLimitError, Result};
use std::net::IpAddr;

pub const CUSTOMER_ID_HEADER: &str = "X-Customer-Id";
pub const CUSTOMER_TYPE_HEADER: &str = "X-Customer-Type";
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
pub const RETRY_AFTER_HEADER: &str = "X-RateLimit-Retry-After-Seconds";

/// Identity hints extracted from an incoming request
#[derive(Debug, Clone, Default)]
pub struct AdmissionRequest<'a> {
    pub customer_id: Option<&'a str>,
    pub customer_type: Option<&'a str>,
    pub forwarded_for: Option<&'a str>,
    pub remote_addr: Option<IpAddr>,
}

impl<'a> AdmissionRequest<'a> {
    /// Collect identity hints from request headers. Header names match
    /// case-insensitively; the first occurrence wins.
    pub fn from_headers<I>(headers: I, remote_addr: Option<IpAddr>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut request = Self {
            remote_addr,
            ..Self::default()
        };

        for (name, value) in headers {
            let slot = if name.eq_ignore_ascii_case(CUSTOMER_ID_HEADER) {
                &mut request.customer_id
            } else if name.eq_ignore_ascii_case(CUSTOMER_TYPE_HEADER) {
                &mut request.customer_type
            } else if name.eq_ignore_ascii_case(FORWARDED_FOR_HEADER) {
                &mut request.forwarded_for
            } else {
                continue;
            };
            slot.get_or_insert(value);
        }

        request
    }

    pub fn customer(mut self, id: &'a str) -> Self {
        self.customer_id = Some(id);
        self
    }

    pub fn customer_type(mut self, tier: &'a str) -> Self {
        self.customer_type = Some(tier);
        self
    }

    pub fn forwarded_for(mut self, value: &'a str) -> Self {
        self.forwarded_for = Some(value);
        self
    }

    pub fn remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

/// Resolved rate limit identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub key: String,
    pub tier: Tier,
    /// Whether the key was derived from the network origin
    pub anonymous: bool,
}

impl Identity {
    /// Resolve the identity of a request.
    ///
    /// Identified customers use their id as key and their presented tier,
    /// or the default tier when none is presented. Requests without an id
    /// are keyed by origin (first `X-Forwarded-For` hop, else the remote
    /// address) and always use the anonymous tier.
    pub fn resolve(request: &AdmissionRequest<'_>, tiers: &TierTable) -> Result<Self> {
        if let Some(id) = non_empty(request.customer_id) {
            let tier = match non_empty(request.customer_type) {
                Some(name) => tiers.parse_tier(name)?,
                None => tiers.default_tier(),
            };
            return Ok(Self {
                key: id.to_string(),
                tier,
                anonymous: false,
            });
        }

        let origin = non_empty(request.forwarded_for)
            .and_then(|hops| non_empty(hops.split(',').next()))
            .map(str::to_string)
            .or_else(|| request.remote_addr.map(|addr| addr.to_string()))
            .ok_or(RateLimitError::EmptyKey)?;

        Ok(Self {
            key: origin,
            tier: tiers.anonymous_tier(),
            anonymous: true,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

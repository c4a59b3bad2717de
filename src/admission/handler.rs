use crate::admission::{AdmissionRequest, Identity, REMAINING_HEADER, RETRY_AFTER_HEADER};
use crate::config::{Tier, TierTable};
use crate::errors::Result;
use crate::limiter::RateLimiter;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed { identity: Identity, remaining: u64 },
    Denied { identity: Identity, retry_after_secs: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }

    pub fn identity(&self) -> &Identity {
        match self {
            Admission::Allowed { identity, .. } | Admission::Denied { identity, .. } => identity,
        }
    }

    /// HTTP status a transport should answer with when denying; `None` lets
    /// the request through.
    pub fn rejection_status(&self) -> Option<u16> {
        match self {
            Admission::Allowed { .. } => None,
            Admission::Denied { .. } => Some(429),
        }
    }

    /// Response headers describing the decision
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Admission::Allowed { remaining, .. } => {
                vec![(REMAINING_HEADER, remaining.to_string())]
            }
            Admission::Denied {
                retry_after_secs, ..
            } => vec![(RETRY_AFTER_HEADER, retry_after_secs.to_string())],
        }
    }

    /// Response body for a denied request
    pub fn message(&self) -> Option<String> {
        match self {
            Admission::Allowed { .. } => None,
            Admission::Denied {
                retry_after_secs, ..
            } => Some(format!(
                "Rate limit exceeded. Please try again in {} seconds.",
                retry_after_secs
            )),
        }
    }
}

/// Rate limit status reported to a customer, without consuming
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub customer_id: String,
    pub customer_type: Tier,
    pub remaining_requests: u64,
    pub seconds_until_refill: u64,
    pub message: String,
}

/// Admission control in front of a [`RateLimiter`]
pub struct AdmissionController<L: RateLimiter> {
    limiter: Arc<L>,
    tiers: Arc<ArcSwap<TierTable>>,
}

impl<L: RateLimiter> AdmissionController<L> {
    pub fn new(limiter: Arc<L>, tiers: Arc<ArcSwap<TierTable>>) -> Self {
        Self { limiter, tiers }
    }

    /// Resolve the request's identity against the current tier table
    pub fn identify(&self, request: &AdmissionRequest<'_>) -> Result<Identity> {
        Identity::resolve(request, &self.tiers.load())
    }

    /// Decide whether the request may proceed, consuming one token if so
    pub fn admit(&self, request: &AdmissionRequest<'_>) -> Result<Admission> {
        let identity = self.identify(request)?;
        debug!(
            "Checking rate limit for customer: {} (tier: {})",
            identity.key, identity.tier
        );

        let decision = self.limiter.check(&identity.key, identity.tier);
        if decision.allowed {
            Ok(Admission::Allowed {
                identity,
                remaining: decision.remaining,
            })
        } else {
            warn!(
                "Rate limit exceeded for customer: {} (retry in {}s)",
                identity.key, decision.retry_after_secs
            );
            Ok(Admission::Denied {
                identity,
                retry_after_secs: decision.retry_after_secs,
            })
        }
    }

    /// Report the request identity's allowance without consuming
    pub fn status(&self, request: &AdmissionRequest<'_>) -> Result<RateLimitStatus> {
        let identity = self.identify(request)?;
        let remaining = self.limiter.remaining_tokens(&identity.key, identity.tier);
        let wait = self.limiter.seconds_until_refill(&identity.key, identity.tier);

        Ok(RateLimitStatus {
            message: format!(
                "You can place {} more requests in the current window",
                remaining
            ),
            customer_id: identity.key,
            customer_type: identity.tier,
            remaining_requests: remaining,
            seconds_until_refill: wait,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::errors::RateLimitError;
    use crate::limiter::clock::ManualClock;
    use crate::limiter::registry::LimiterRegistry;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn controller() -> (AdmissionController<LimiterRegistry>, ManualClock) {
        let clock = ManualClock::new();
        let config = RateLimitConfig::default();
        let settings = config.registry.clone();
        let tiers = Arc::new(ArcSwap::from_pointee(TierTable::new(config).unwrap()));
        let registry = Arc::new(LimiterRegistry::with_clock(
            Arc::clone(&tiers),
            &settings,
            Arc::new(clock.clone()),
        ));
        (AdmissionController::new(registry, tiers), clock)
    }

    #[test]
    fn test_admit_standard_customer() {
        let (controller, clock) = controller();
        let request = AdmissionRequest::default().customer("c1");

        for expected in (0..5).rev() {
            let admission = controller.admit(&request).unwrap();
            assert!(admission.is_allowed());
            assert_eq!(
                admission.headers(),
                vec![(REMAINING_HEADER, expected.to_string())]
            );
            assert_eq!(admission.rejection_status(), None);
        }

        let denied = controller.admit(&request).unwrap();
        assert!(!denied.is_allowed());
        assert_eq!(denied.rejection_status(), Some(429));
        assert_eq!(denied.headers(), vec![(RETRY_AFTER_HEADER, "12".to_string())]);
        assert_eq!(
            denied.message().unwrap(),
            "Rate limit exceeded. Please try again in 12 seconds."
        );

        clock.advance(Duration::from_secs(12));
        assert!(controller.admit(&request).unwrap().is_allowed());
    }

    #[test]
    fn test_anonymous_requests_share_origin_bucket() {
        let (controller, _) = controller();
        let origin = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 2));
        let request = AdmissionRequest::default().remote_addr(origin);

        assert!(controller.admit(&request).unwrap().is_allowed());
        assert!(controller.admit(&request).unwrap().is_allowed());

        let denied = controller.admit(&request).unwrap();
        assert!(!denied.is_allowed());
        assert_eq!(denied.identity().key, "198.51.100.2");
        assert_eq!(denied.identity().tier, Tier::Guest);
    }

    #[test]
    fn test_status_does_not_consume() {
        let (controller, _) = controller();
        let request = AdmissionRequest::default()
            .customer("vip1")
            .customer_type("PREMIUM");

        controller.admit(&request).unwrap();
        let status = controller.status(&request).unwrap();
        assert_eq!(status.remaining_requests, 19);
        assert_eq!(status.seconds_until_refill, 0);
        assert_eq!(controller.status(&request).unwrap().remaining_requests, 19);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["customerId"], "vip1");
        assert_eq!(json["customerType"], "PREMIUM");
        assert_eq!(json["remainingRequests"], 19);
    }

    #[test]
    fn test_admit_without_identity_fails() {
        let (controller, _) = controller();
        assert!(matches!(
            controller.admit(&AdmissionRequest::default()),
            Err(RateLimitError::EmptyKey)
        ));
    }
}

pub mod admission;
pub mod config;
pub mod driver;
pub mod errors;
pub mod limiter;
pub mod metrics;
pub mod metrics_server;

// Re-export commonly used types
pub use admission::{Admission, AdmissionController, AdmissionRequest, Identity};
pub use config::{AppConfig, RateLimitConfig, Tier, TierTable};
pub use driver::LineDriver;
pub use errors::{RateLimitError, Result};
pub use limiter::registry::LimiterRegistry;
pub use limiter::token_bucket::{Bucket, BucketLimits, ConsumptionProbe};
pub use limiter::{Decision, RateLimiter};

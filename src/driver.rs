//! Line-oriented front end for the admission controller.
//!
//! Each input line is one command and each answer is one JSON line.
//! Arguments are `name=value` pairs: request header names, plus `remote`
//! for the peer address.
//!
//! ```text
//! admit X-Customer-Id=c1 X-Customer-Type=PREMIUM
//! admit X-Forwarded-For=203.0.113.7,10.0.0.1
//! admit remote=198.51.100.2
//! status X-Customer-Id=c1
//! stats
//! ```

use crate::admission::{Admission, AdmissionController, AdmissionRequest};
use crate::config::Tier;
use crate::errors::{RateLimitError, Result};
use crate::limiter::registry::LimiterRegistry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

const REMOTE_ADDR_FIELD: &str = "remote";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Consume one token for the request's identity
    Admit,
    /// Report the identity's allowance without consuming
    Status,
    /// Registry statistics
    Stats,
}

impl FromStr for Command {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("admit") {
            Ok(Command::Admit)
        } else if s.eq_ignore_ascii_case("status") {
            Ok(Command::Status)
        } else if s.eq_ignore_ascii_case("stats") {
            Ok(Command::Stats)
        } else {
            Err(RateLimitError::InvalidCommand(format!(
                "unknown command '{}'",
                s
            )))
        }
    }
}

/// Answer to an `admit` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReply {
    pub allowed: bool,
    pub key: String,
    pub tier: Tier,
    pub anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub headers: BTreeMap<&'static str, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&Admission> for AdmissionReply {
    fn from(admission: &Admission) -> Self {
        let identity = admission.identity();
        Self {
            allowed: admission.is_allowed(),
            key: identity.key.clone(),
            tier: identity.tier,
            anonymous: identity.anonymous,
            status: admission.rejection_status(),
            headers: admission.headers().into_iter().collect(),
            message: admission.message(),
        }
    }
}

/// Executes text commands against a registry
pub struct LineDriver {
    controller: AdmissionController<LimiterRegistry>,
    registry: Arc<LimiterRegistry>,
}

impl LineDriver {
    pub fn new(registry: Arc<LimiterRegistry>) -> Self {
        let controller = AdmissionController::new(Arc::clone(&registry), registry.tiers());
        Self {
            controller,
            registry,
        }
    }

    /// Answer one input line. Blank lines and `#` comments yield nothing;
    /// failures are answered with an `{"error": ...}` line.
    pub fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let reply = match self.execute(line) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Rejected command '{}': {}", line, e);
                serde_json::json!({ "error": e.to_string() }).to_string()
            }
        };
        Some(reply)
    }

    fn execute(&self, line: &str) -> Result<String> {
        let mut tokens = line.split_whitespace();
        let command = tokens
            .next()
            .ok_or_else(|| RateLimitError::InvalidCommand("empty command".to_string()))?
            .parse::<Command>()?;
        let request = parse_request(tokens)?;

        let reply = match command {
            Command::Admit => {
                serde_json::to_string(&AdmissionReply::from(&self.controller.admit(&request)?))?
            }
            Command::Status => serde_json::to_string(&self.controller.status(&request)?)?,
            Command::Stats => serde_json::to_string(&self.registry.stats())?,
        };
        Ok(reply)
    }
}

/// Build a request from `name=value` arguments
pub fn parse_request<'a, I>(tokens: I) -> Result<AdmissionRequest<'a>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut headers = Vec::new();
    let mut remote_addr = None;

    for token in tokens {
        let (name, value) = token.split_once('=').ok_or_else(|| {
            RateLimitError::InvalidCommand(format!("expected name=value, got '{}'", token))
        })?;

        if name.eq_ignore_ascii_case(REMOTE_ADDR_FIELD) {
            let addr = value.parse::<IpAddr>().map_err(|_| {
                RateLimitError::InvalidCommand(format!("invalid remote address '{}'", value))
            })?;
            remote_addr = Some(addr);
        } else {
            headers.push((name, value));
        }
    }

    Ok(AdmissionRequest::from_headers(headers, remote_addr))
}

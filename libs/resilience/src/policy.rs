//! A named bundle of resilience configuration for one downstream service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{
    BulkheadConfig, CircuitBreakerConfig, RateLimitConfig, RetryConfig, TimeoutConfig,
};
use crate::error::{CodecError, ConfigError};

/// Everything the runtime needs to protect calls to one service. Each
/// section is optional but a policy must carry at least one. `version`
/// increments on every mutation so stale copies are detectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulkhead: Option<BulkheadConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// An empty policy shell; attach at least one section before use.
    pub fn new(service_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            service_name: service_name.into(),
            circuit_breaker: None,
            retry: None,
            rate_limit: None,
            bulkhead: None,
            timeout: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::new(
                "policy.service_name",
                "must not be empty".to_string(),
            ));
        }
        if self.circuit_breaker.is_none()
            && self.retry.is_none()
            && self.rate_limit.is_none()
            && self.bulkhead.is_none()
            && self.timeout.is_none()
        {
            return Err(ConfigError::new(
                "policy",
                "must configure at least one pattern".to_string(),
            ));
        }
        if let Some(cb) = &self.circuit_breaker {
            cb.validate()?;
        }
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        if let Some(rl) = &self.rate_limit {
            rl.validate()?;
        }
        if let Some(bh) = &self.bulkhead {
            bh.validate()?;
        }
        if let Some(t) = &self.timeout {
            t.validate()?;
        }
        Ok(())
    }

    pub fn set_circuit_breaker(&mut self, config: CircuitBreakerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.circuit_breaker = Some(config);
        self.touch();
        Ok(())
    }

    pub fn set_retry(&mut self, config: RetryConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.retry = Some(config);
        self.touch();
        Ok(())
    }

    pub fn set_rate_limit(&mut self, config: RateLimitConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.rate_limit = Some(config);
        self.touch();
        Ok(())
    }

    pub fn set_bulkhead(&mut self, config: BulkheadConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.bulkhead = Some(config);
        self.touch();
        Ok(())
    }

    pub fn set_timeout(&mut self, config: TimeoutConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.timeout = Some(config);
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(raw)?)
    }
}

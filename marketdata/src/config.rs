//! Cache configuration, validated once at construction.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CacheConfigError {
    #[error("ttl_ms must be > 0")]
    ZeroTtl,

    #[error("fresh_ms ({fresh_ms}) must not exceed ttl_ms ({ttl_ms})")]
    FreshAboveTtl { fresh_ms: u64, ttl_ms: u64 },

    #[error("pricing_fresh_ms ({pricing_fresh_ms}) must not exceed fresh_ms ({fresh_ms})")]
    PricingAboveFresh { pricing_fresh_ms: u64, fresh_ms: u64 },

    #[error("strict_timeout_ms must be > 0")]
    ZeroStrictTimeout,

    #[error("default_depth must be > 0")]
    ZeroDepth,
}

/// Freshness thresholds and refresh behaviour for the market-data cache.
///
/// Threshold ordering: `pricing_fresh_ms <= fresh_ms <= ttl_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hard staleness bound. Beyond this a general-mode read blocks for one
    /// refresh cycle instead of serving stale.
    pub ttl_ms: u64,
    /// Below this age an entry is fresh for every mode. Between `fresh_ms`
    /// and `ttl_ms` a general-mode read serves stale while revalidating.
    pub fresh_ms: u64,
    /// Stricter freshness bound for pricing-mode reads.
    pub pricing_fresh_ms: u64,
    /// Bounded wait for a strict-mode synchronous refresh.
    pub strict_timeout_ms: u64,
    /// Depth used when refreshing without an explicit depth requirement.
    pub default_depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 100,
            fresh_ms: 50,
            pricing_fresh_ms: 30,
            strict_timeout_ms: 50,
            default_depth: 50,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.ttl_ms == 0 {
            return Err(CacheConfigError::ZeroTtl);
        }
        if self.fresh_ms > self.ttl_ms {
            return Err(CacheConfigError::FreshAboveTtl {
                fresh_ms: self.fresh_ms,
                ttl_ms: self.ttl_ms,
            });
        }
        if self.pricing_fresh_ms > self.fresh_ms {
            return Err(CacheConfigError::PricingAboveFresh {
                pricing_fresh_ms: self.pricing_fresh_ms,
                fresh_ms: self.fresh_ms,
            });
        }
        if self.strict_timeout_ms == 0 {
            return Err(CacheConfigError::ZeroStrictTimeout);
        }
        if self.default_depth == 0 {
            return Err(CacheConfigError::ZeroDepth);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let cfg = CacheConfig {
            fresh_ms: 200,
            ttl_ms: 100,
            ..CacheConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(CacheConfigError::FreshAboveTtl {
                fresh_ms: 200,
                ttl_ms: 100
            })
        );

        let cfg = CacheConfig {
            pricing_fresh_ms: 80,
            fresh_ms: 50,
            ..CacheConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(CacheConfigError::PricingAboveFresh { .. })
        ));
    }

    #[test]
    fn rejects_zero_fields() {
        let cfg = CacheConfig {
            ttl_ms: 0,
            ..CacheConfig::default()
        };
        assert_eq!(cfg.validate(), Err(CacheConfigError::ZeroTtl));

        let cfg = CacheConfig {
            strict_timeout_ms: 0,
            ..CacheConfig::default()
        };
        assert_eq!(cfg.validate(), Err(CacheConfigError::ZeroStrictTimeout));

        let cfg = CacheConfig {
            default_depth: 0,
            ..CacheConfig::default()
        };
        assert_eq!(cfg.validate(), Err(CacheConfigError::ZeroDepth));
    }
}

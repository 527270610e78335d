//! Configuration Module
//!
//! Handles loading the primitives' configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::limiter::LimiterConfig;
use crate::telemetry::LogConfig;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Defaults for caches built by the service
    pub cache: CacheConfig,
    /// Limiter queue bound and idle slot expiry
    pub limiter: LimiterConfig,
    /// Namespace of the job runner's lock keys
    pub jobs_service_key: String,
    pub log: LogConfig,
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_SECS` - Default cache TTL (default: 30)
    /// - `CACHE_CLEANUP_INTERVAL_SECS` - Janitor interval, 0 disables it (default: 15)
    /// - `CACHE_CAPACITY` - Max cache entries, 0 = unbounded (default: 0)
    /// - `LIMITER_QUEUE` - Max in-flight acquires per slot set (default: 100)
    /// - `LIMITER_TTL_SECS` - Idle slot set expiry (default: 600)
    /// - `JOBS_SERVICE_KEY` - Lock key namespace (default: jobs)
    /// - `LOG_LEVEL` - Log filter when `RUST_LOG` is unset (default: info)
    /// - `DEBUG` - Verbose log format (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cleanup_interval = match parse_env::<u64>("CACHE_CLEANUP_INTERVAL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.cache.cleanup_interval,
        };

        Self {
            cache: CacheConfig {
                ttl: parse_env("CACHE_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.cache.ttl),
                cleanup_interval,
                capacity: parse_env("CACHE_CAPACITY").unwrap_or(defaults.cache.capacity),
                auto_refresh: defaults.cache.auto_refresh,
            },
            limiter: LimiterConfig {
                queue: parse_env("LIMITER_QUEUE").unwrap_or(defaults.limiter.queue),
                ttl: parse_env("LIMITER_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.limiter.ttl),
            },
            jobs_service_key: env::var("JOBS_SERVICE_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.jobs_service_key),
            log: LogConfig {
                debug: parse_env("DEBUG").unwrap_or(defaults.log.debug),
                level: env::var("LOG_LEVEL").unwrap_or(defaults.log.level),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            limiter: LimiterConfig::default(),
            jobs_service_key: "jobs".to_string(),
            log: LogConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 8] = [
        "CACHE_TTL_SECS",
        "CACHE_CLEANUP_INTERVAL_SECS",
        "CACHE_CAPACITY",
        "LIMITER_QUEUE",
        "LIMITER_TTL_SECS",
        "JOBS_SERVICE_KEY",
        "LOG_LEVEL",
        "DEBUG",
    ];

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache.ttl, Duration::from_secs(30));
        assert_eq!(config.cache.cleanup_interval, Some(Duration::from_secs(15)));
        assert_eq!(config.cache.capacity, 0);
        assert_eq!(config.limiter.queue, 100);
        assert_eq!(config.limiter.ttl, Duration::from_secs(600));
        assert_eq!(config.jobs_service_key, "jobs");
        assert_eq!(config.log.level, "info");
    }

    // Single test touching the process environment so nothing races on it
    #[test]
    fn test_config_from_env() {
        for var in VARS {
            env::remove_var(var);
        }
        assert_eq!(Config::from_env(), Config::default());

        env::set_var("CACHE_TTL_SECS", "5");
        env::set_var("CACHE_CLEANUP_INTERVAL_SECS", "0");
        env::set_var("CACHE_CAPACITY", "not-a-number");
        env::set_var("LIMITER_QUEUE", "3");
        env::set_var("JOBS_SERVICE_KEY", "billing");
        env::set_var("DEBUG", "true");

        let config = Config::from_env();
        assert_eq!(config.cache.ttl, Duration::from_secs(5));
        assert_eq!(config.cache.cleanup_interval, None);
        assert_eq!(config.cache.capacity, 0);
        assert_eq!(config.limiter.queue, 3);
        assert_eq!(config.limiter.ttl, Duration::from_secs(600));
        assert_eq!(config.jobs_service_key, "billing");
        assert!(config.log.debug);

        for var in VARS {
            env::remove_var(var);
        }
    }
}

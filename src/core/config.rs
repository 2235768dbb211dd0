//! # Configuration Module
//!
//! Service configuration loaded from YAML with environment overrides.
//!
//! ## Key Features
//! - YAML parsing with serde; every section has defaults
//! - `CAMPUS_*` environment variable overrides, durations in humantime form
//!   (`90s`, `5m`, `1day`)
//! - Validation that collects every problem before failing

use crate::caching::{CacheConfig, TtlConfig, TtlPolicy};
use crate::core::error::{ServiceError, ServiceResult};
use crate::observability::LogConfig;
use crate::predictor::PredictorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Cache tiers and timeouts
    pub cache: CacheConfig,

    /// TTL policy per read family
    pub ttl: TtlConfig,

    /// Prediction engine settings
    pub predictor: PredictorConfig,

    /// Logging settings
    pub logging: LogConfig,
}

impl ServiceConfig {
    /// Load configuration from a YAML file, apply environment overrides and
    /// validate the result
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ServiceResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| ServiceError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without overrides or validation
    pub fn from_yaml(content: &str) -> ServiceResult<Self> {
        serde_yaml::from_str(content).map_err(|e| ServiceError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply `CAMPUS_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> ServiceResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ServiceResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Cache tiers
        if let Some(enabled) = lookup("CAMPUS_REDIS_ENABLED") {
            self.cache.redis_enabled = parse("CAMPUS_REDIS_ENABLED", &enabled)?;
        }
        if let Some(url) = lookup("CAMPUS_REDIS_URL") {
            self.cache.redis.url = url;
        }
        if let Some(prefix) = lookup("CAMPUS_REDIS_KEY_PREFIX") {
            self.cache.redis.key_prefix = prefix;
        }
        if let Some(enabled) = lookup("CAMPUS_CACHE_LOCAL_ENABLED") {
            self.cache.in_memory_enabled = parse("CAMPUS_CACHE_LOCAL_ENABLED", &enabled)?;
        }
        if let Some(entries) = lookup("CAMPUS_CACHE_MAX_ENTRIES") {
            self.cache.in_memory.max_entries = parse("CAMPUS_CACHE_MAX_ENTRIES", &entries)?;
        }
        if let Some(timeout) = lookup("CAMPUS_CACHE_OPERATION_TIMEOUT") {
            self.cache.operation_timeout = duration("CAMPUS_CACHE_OPERATION_TIMEOUT", &timeout)?;
        }
        if let Some(timeout) = lookup("CAMPUS_CACHE_STORE_TIMEOUT") {
            self.cache.store_timeout = duration("CAMPUS_CACHE_STORE_TIMEOUT", &timeout)?;
        }

        // TTL policies: CAMPUS_TTL_<FAMILY>_LOCAL / CAMPUS_TTL_<FAMILY>_SHARED
        for (family, policy) in [
            ("DASHBOARD", &mut self.ttl.dashboard),
            ("LISTING", &mut self.ttl.listing),
            ("DETAIL", &mut self.ttl.detail),
            ("PREDICTOR", &mut self.ttl.predictor),
        ] {
            override_ttl(&lookup, family, policy)?;
        }

        // Predictor
        if let Some(size) = lookup("CAMPUS_PREDICTOR_BATCH_SIZE") {
            self.predictor.batch_size = parse("CAMPUS_PREDICTOR_BATCH_SIZE", &size)?;
        }
        if let Some(size) = lookup("CAMPUS_PREDICTOR_MAX_PAGE_SIZE") {
            self.predictor.max_page_size = parse("CAMPUS_PREDICTOR_MAX_PAGE_SIZE", &size)?;
        }

        // Logging
        if let Some(level) = lookup("CAMPUS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CAMPUS_LOG_FORMAT") {
            self.logging.format = format
                .parse()
                .map_err(|e| ServiceError::config(format!("Invalid CAMPUS_LOG_FORMAT: {}", e)))?;
        }

        Ok(())
    }

    /// Check the configuration, reporting every problem at once.
    ///
    /// A local TTL longer than the shared TTL is allowed; the tiers expire
    /// independently.
    pub fn validate(&self) -> ServiceResult<()> {
        let mut errors = Vec::new();

        if !self.cache.in_memory_enabled && !self.cache.redis_enabled {
            errors.push("at least one cache tier must be enabled".to_string());
        }
        if self.cache.in_memory_enabled && self.cache.in_memory.max_entries == 0 {
            errors.push("cache.in_memory.max_entries must be greater than 0".to_string());
        }
        if self.cache.in_memory.cleanup_interval.is_zero() {
            errors.push("cache.in_memory.cleanup_interval must be greater than 0".to_string());
        }
        if self.cache.redis_enabled && self.cache.redis.url.is_empty() {
            errors.push("cache.redis.url cannot be empty".to_string());
        }
        if self.cache.operation_timeout.is_zero() {
            errors.push("cache.operation_timeout must be greater than 0".to_string());
        }
        if self.cache.store_timeout.is_zero() {
            errors.push("cache.store_timeout must be greater than 0".to_string());
        }
        if self.cache.max_key_length < 64 {
            errors.push("cache.max_key_length must be at least 64".to_string());
        }

        for (family, policy) in self.ttl.policies() {
            if policy.local.is_zero() || policy.shared.is_zero() {
                errors.push(format!("ttl.{} must have non-zero local and shared TTLs", family));
            }
        }

        let predictor = &self.predictor;
        if predictor.batch_size == 0 {
            errors.push("predictor.batch_size must be greater than 0".to_string());
        }
        if predictor.max_page_size == 0 {
            errors.push("predictor.max_page_size must be greater than 0".to_string());
        }
        if predictor.default_page_size == 0 || predictor.default_page_size > predictor.max_page_size {
            errors.push("predictor.default_page_size must be between 1 and max_page_size".to_string());
        }
        if !(0.0..=100.0).contains(&predictor.default_weight) {
            errors.push("predictor.default_weight must be between 0 and 100".to_string());
        }
        if matches!(&predictor.years, Some(years) if years.is_empty()) {
            errors.push("predictor.years cannot be an empty list".to_string());
        }

        if self.logging.level.trim().is_empty() {
            errors.push("logging.level cannot be empty".to_string());
        }

        if !errors.is_empty() {
            return Err(ServiceError::config(format!(
                "Configuration validation failed: {}",
                errors.join("; ")
            )));
        }
        Ok(())
    }
}

fn parse<T>(name: &str, value: &str) -> ServiceResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ServiceError::config(format!("Invalid {}: {}", name, e)))
}

fn duration(name: &str, value: &str) -> ServiceResult<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| ServiceError::config(format!("Invalid {}: {}", name, e)))
}

fn override_ttl<F>(lookup: &F, family: &str, policy: &mut TtlPolicy) -> ServiceResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let local = format!("CAMPUS_TTL_{}_LOCAL", family);
    if let Some(value) = lookup(&local) {
        policy.local = duration(&local, &value)?;
    }
    let shared = format!("CAMPUS_TTL_{}_SHARED", family);
    if let Some(value) = lookup(&shared) {
        policy.shared = duration(&shared, &value)?;
    }
    Ok(())
}

//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::chunk::AES_BLOCK_SIZE;
use crate::crypto::default_key_directory;
use crate::error::{Result, StoreError};
use crate::retry::{RetryConfig, MAX_RETRY_ATTEMPTS};

/// Default chunk size for multipart transfers (5 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default concurrency for store HTTP calls
pub const DEFAULT_HTTP_CONCURRENCY: usize = 10;

/// Default concurrency for internal tasks (file I/O, encryption, retries)
pub const DEFAULT_INTERNAL_CONCURRENCY: usize = 50;

/// Client configuration.
///
/// Captured once at client construction; operations snapshot what they need
/// at start, so mutating a config after the client is built has no effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// AWS region (e.g. "us-east-1"); falls back to the ambient provider chain
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services (MinIO, Ceph, ...)
    pub endpoint: Option<String>,

    /// Access key ID (optional; uses the ambient credential chain if absent)
    pub access_key: Option<String>,

    /// Secret access key
    pub secret_key: Option<String>,

    /// Session token for temporary credentials
    pub session_token: Option<String>,

    /// Path-style addressing, required by some S3-compatible services
    pub force_path_style: bool,

    /// Plaintext chunk size in bytes for multipart transfers
    pub chunk_size: u64,

    /// Bound on concurrent store HTTP calls
    pub http_concurrency: usize,

    /// Bound on concurrent internal tasks
    pub internal_concurrency: usize,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Attempt cap for retried operations
    pub retry_attempts: u32,

    /// Retry client-classified (4xx) errors too
    pub retry_client_errors: bool,

    /// Directory the key provider loads key pairs from
    pub key_directory: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            session_token: None,
            force_path_style: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            http_concurrency: DEFAULT_HTTP_CONCURRENCY,
            internal_concurrency: DEFAULT_INTERNAL_CONCURRENCY,
            timeout_seconds: 300,
            retry_attempts: crate::retry::DEFAULT_RETRY_ATTEMPTS,
            retry_client_errors: false,
            key_directory: default_key_directory(),
        }
    }
}

impl ClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StoreError::Usage("chunk size must be positive".to_string()));
        }
        // Encrypted transfers require block-aligned chunks; enforcing it
        // globally keeps one config valid for both modes.
        if self.chunk_size % AES_BLOCK_SIZE != 0 {
            return Err(StoreError::Usage(format!(
                "chunk size {} is not a multiple of the AES block size ({})",
                self.chunk_size, AES_BLOCK_SIZE
            )));
        }
        if self.http_concurrency == 0 || self.internal_concurrency == 0 {
            return Err(StoreError::Usage(
                "pool concurrency must be at least 1".to_string(),
            ));
        }
        if self.retry_attempts == 0 || self.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(StoreError::Usage(format!(
                "retry attempts must be in 1..={}",
                MAX_RETRY_ATTEMPTS
            )));
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(StoreError::Usage(
                "access_key and secret_key must be provided together".to_string(),
            ));
        }
        Ok(())
    }

    /// The retry configuration this client hands to its call sites
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            retry_client_errors: self.retry_client_errors,
            ..RetryConfig::default()
        }
        .with_max_attempts(self.retry_attempts)
    }

    /// Per-request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Builder for [`ClientConfig`]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a builder with default values
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the region
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    /// Set a custom endpoint (MinIO, LocalStack, ...)
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    /// Set explicit credentials
    pub fn credentials(mut self, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.config.access_key = Some(access_key.into());
        self.config.secret_key = Some(secret_key.into());
        self
    }

    /// Set a session token for temporary credentials
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.config.session_token = Some(token.into());
        self
    }

    /// Enable path-style addressing
    pub fn force_path_style(mut self, force: bool) -> Self {
        self.config.force_path_style = force;
        self
    }

    /// Set the multipart chunk size in bytes
    pub fn chunk_size(mut self, size: u64) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the store HTTP concurrency bound
    pub fn http_concurrency(mut self, n: usize) -> Self {
        self.config.http_concurrency = n;
        self
    }

    /// Set the internal task concurrency bound
    pub fn internal_concurrency(mut self, n: usize) -> Self {
        self.config.internal_concurrency = n;
        self
    }

    /// Set the per-request timeout
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    /// Set the retry attempt cap
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    /// Retry client-classified errors too
    pub fn retry_client_errors(mut self, retry: bool) -> Self {
        self.config.retry_client_errors = retry;
        self
    }

    /// Set the key directory
    pub fn key_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.key_directory = dir.into();
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.http_concurrency, 10);
        assert_eq!(config.internal_concurrency, 50);
        assert_eq!(config.retry_attempts, 10);
        assert!(!config.retry_client_errors);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfigBuilder::new()
            .region("us-west-2")
            .endpoint("http://localhost:9000")
            .credentials("ak", "sk")
            .force_path_style(true)
            .chunk_size(4 * 1024 * 1024)
            .retry_attempts(7)
            .build()
            .unwrap();

        assert_eq!(config.region.as_deref(), Some("us-west-2"));
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.force_path_style);
        assert_eq!(config.chunk_size, 4 * 1024 * 1024);
        assert_eq!(config.retry_config().max_attempts, 7);
    }

    #[test]
    fn test_chunk_size_must_be_block_aligned() {
        let err = ClientConfigBuilder::new().chunk_size(1000).build().unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));

        assert!(ClientConfigBuilder::new().chunk_size(0).build().is_err());
        assert!(ClientConfigBuilder::new().chunk_size(1024).build().is_ok());
    }

    #[test]
    fn test_concurrency_validation() {
        assert!(ClientConfigBuilder::new().http_concurrency(0).build().is_err());
        assert!(ClientConfigBuilder::new().internal_concurrency(0).build().is_err());
    }

    #[test]
    fn test_retry_bounds() {
        assert!(ClientConfigBuilder::new().retry_attempts(0).build().is_err());
        assert!(ClientConfigBuilder::new().retry_attempts(51).build().is_err());
        assert!(ClientConfigBuilder::new().retry_attempts(50).build().is_ok());
    }

    #[test]
    fn test_credentials_must_come_together() {
        let mut config = ClientConfig::default();
        config.access_key = Some("ak".to_string());
        assert!(config.validate().is_err());

        config.secret_key = Some("sk".to_string());
        assert!(config.validate().is_ok());
    }
}

//! Uploader configuration.
//!
//! With the `config` feature every field can be set from the command line
//! or the environment:
//!
//! ```bash
//! SPACES_NAME=media SPACES_MAX_PART_SIZE=8000000 spaces-uploader upload movie.mkv
//! ```

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;

use crate::error::{Result, UploadError};

/// Default service endpoint.
pub const DEFAULT_SERVICE_URL: &str = "https://nyc3.digitaloceanspaces.com";

/// Default signing region. S3-compatible services generally accept it.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default number of attempts per part.
pub const DEFAULT_MAX_PART_RETRY: u32 = 3;

/// Default maximum part size in bytes.
pub const DEFAULT_MAX_PART_SIZE: u64 = 6_000_000;

/// Space, endpoint and part policy for an [`UploadManager`](crate::UploadManager).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct UploaderConfig {
    /// Space (bucket) to upload into.
    #[cfg_attr(feature = "config", arg(long = "space", env = "SPACES_NAME"))]
    pub space_name: String,

    /// Service endpoint URL.
    #[cfg_attr(
        feature = "config",
        arg(long = "endpoint", env = "SPACES_ENDPOINT", default_value = DEFAULT_SERVICE_URL)
    )]
    pub service_url: String,

    /// Region used for request signing.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SPACES_REGION", default_value = DEFAULT_REGION)
    )]
    pub region: String,

    /// Total attempts per part before the upload is aborted.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SPACES_MAX_PART_RETRY", default_value_t = DEFAULT_MAX_PART_RETRY)
    )]
    pub max_part_retry: u32,

    /// Maximum part size in bytes.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SPACES_MAX_PART_SIZE", default_value_t = DEFAULT_MAX_PART_SIZE)
    )]
    pub max_part_size: u64,

    /// Base delay between part attempts in milliseconds, doubled per attempt.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SPACES_RETRY_DELAY_MS", default_value_t = 0)
    )]
    pub retry_delay_ms: u64,
}

impl UploaderConfig {
    /// Configuration for `space_name` with every other field at its default.
    pub fn new(space_name: impl Into<String>) -> Self {
        Self {
            space_name: space_name.into(),
            service_url: DEFAULT_SERVICE_URL.to_owned(),
            region: DEFAULT_REGION.to_owned(),
            max_part_retry: DEFAULT_MAX_PART_RETRY,
            max_part_size: DEFAULT_MAX_PART_SIZE,
            retry_delay_ms: 0,
        }
    }

    pub fn with_service_url(mut self, service_url: impl Into<String>) -> Self {
        self.service_url = service_url.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_max_part_retry(mut self, max_part_retry: u32) -> Self {
        self.max_part_retry = max_part_retry;
        self
    }

    pub fn with_max_part_size(mut self, max_part_size: u64) -> Self {
        self.max_part_size = max_part_size;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay before attempt `attempt + 1`, given that `attempt` just failed.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor))
    }

    pub fn validate(&self) -> Result<()> {
        if self.space_name.trim().is_empty() {
            return Err(UploadError::invalid_argument(
                "space_name",
                "must not be empty",
            ));
        }
        if self.service_url.trim().is_empty() {
            return Err(UploadError::invalid_argument(
                "service_url",
                "must not be empty",
            ));
        }
        validate_part_policy(self.max_part_retry, self.max_part_size)
    }
}

pub(crate) fn validate_part_policy(max_part_retry: u32, max_part_size: u64) -> Result<()> {
    if max_part_retry < 1 {
        return Err(UploadError::invalid_argument(
            "max_part_retry",
            "needs to be greater than or equal to 1",
        ));
    }
    if max_part_size < 1 {
        return Err(UploadError::invalid_argument(
            "max_part_size",
            "needs to be greater than 0",
        ));
    }
    Ok(())
}

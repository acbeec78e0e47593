//! Configuration for the report desk.
//!
//! # Example
//!
//! ```
//! use tipline_core::config::{DeskConfig, DeskConfigBuilder};
//! use std::time::Duration;
//!
//! // Use defaults
//! let config = DeskConfig::default();
//! assert_eq!(config.session.ttl, Duration::from_secs(24 * 60 * 60));
//!
//! // Or use builder for customization
//! let config = DeskConfigBuilder::new()
//!     .with_in_memory_storage()
//!     .with_session_ttl(Duration::from_secs(3600))
//!     .disable_annotation()
//!     .build();
//! assert!(!config.annotation.enabled);
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tipline_jury::{JuryPolicy, TieBreak};

/// Default session lifetime (24 hours).
const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Default session code length.
const DEFAULT_CODE_LENGTH: usize = 8;

/// Default number of attempts to allocate an unused session code.
const DEFAULT_ALLOCATION_ATTEMPTS: u32 = 5;

/// Default advisory annotation cache capacity.
const DEFAULT_ANNOTATION_CACHE: usize = 256;

/// Shortest code that still leaves a useful keyspace.
const MIN_CODE_LENGTH: usize = 6;

/// Main desk configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Session allocation and expiry.
    pub session: SessionConfig,

    /// Record storage.
    pub storage: StorageConfig,

    /// Reporter reputation deltas.
    pub reputation: ReputationPolicy,

    /// Juror reputation deltas and tie-break.
    pub jury: JuryPolicy,

    /// Advisory annotation.
    pub annotation: AnnotationConfig,
}

impl DeskConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration builder.
    pub fn builder() -> DeskConfigBuilder {
        DeskConfigBuilder::new()
    }

    /// Configuration for in-memory operation (tests, demos).
    pub fn in_memory() -> Self {
        DeskConfigBuilder::new().with_in_memory_storage().build()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.ttl.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.ttl".into(),
                reason: "session lifetime must be greater than zero".into(),
            });
        }

        if self.session.code_length < MIN_CODE_LENGTH {
            return Err(ConfigError::InvalidValue {
                field: "session.code_length".into(),
                reason: format!("session codes must be at least {MIN_CODE_LENGTH} characters"),
            });
        }

        if self.session.allocation_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.allocation_attempts".into(),
                reason: "at least one allocation attempt is required".into(),
            });
        }

        if !self.storage.in_memory && self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.data_dir".into(),
                reason: "data directory cannot be empty when not using in-memory storage".into(),
            });
        }

        if self.reputation.verified_delta < 0 {
            return Err(ConfigError::InvalidValue {
                field: "reputation.verified_delta".into(),
                reason: "a verified report cannot lower reporter reputation".into(),
            });
        }

        if self.reputation.rejected_delta > 0 {
            return Err(ConfigError::InvalidValue {
                field: "reputation.rejected_delta".into(),
                reason: "a rejected report cannot raise reporter reputation".into(),
            });
        }

        if self.jury.majority_bonus < 0 || self.jury.minority_penalty > 0 {
            return Err(ConfigError::InvalidValue {
                field: "jury".into(),
                reason: "majority bonus must be non-negative and minority penalty non-positive"
                    .into(),
            });
        }

        if self.annotation.enabled && self.annotation.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "annotation.cache_capacity".into(),
                reason: "cache capacity must be greater than zero".into(),
            });
        }

        Ok(())
    }
}

/// Session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a pending session accepts a submission.
    #[serde(with = "duration_serde")]
    pub ttl: Duration,

    /// Length of generated session codes.
    pub code_length: usize,

    /// Attempts to find an unused code before giving up.
    pub allocation_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            code_length: DEFAULT_CODE_LENGTH,
            allocation_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
        }
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the sled database.
    ///
    /// Defaults to the platform data directory:
    /// - Linux: `~/.local/share/tipline`
    /// - macOS: `~/Library/Application Support/tipline`
    /// - Windows: `C:\Users\<User>\AppData\Roaming\tipline`
    pub data_dir: PathBuf,

    /// Keep records in memory instead of on disk.
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            in_memory: false,
        }
    }
}

/// Reporter reputation deltas applied at adjudication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationPolicy {
    /// Applied when a report is verified.
    pub verified_delta: i32,
    /// Applied when a report is rejected.
    pub rejected_delta: i32,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self {
            verified_delta: 10,
            rejected_delta: -5,
        }
    }
}

/// Advisory annotation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// Annotate reports when they are opened.
    pub enabled: bool,

    /// Entries kept by the annotation cache.
    pub cache_capacity: usize,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_capacity: DEFAULT_ANNOTATION_CACHE,
        }
    }
}

/// Builder for `DeskConfig`.
#[derive(Clone, Debug, Default)]
pub struct DeskConfigBuilder {
    config: DeskConfig,
}

impl DeskConfigBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: DeskConfig::default(),
        }
    }

    /// Build the final configuration.
    pub fn build(self) -> DeskConfig {
        self.config
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<DeskConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }

    // ===== Session Configuration =====

    /// Set the session lifetime.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session.ttl = ttl;
        self
    }

    /// Set the session code length.
    pub fn with_code_length(mut self, length: usize) -> Self {
        self.config.session.code_length = length;
        self
    }

    /// Set how many codes to try before giving up.
    pub fn with_allocation_attempts(mut self, attempts: u32) -> Self {
        self.config.session.allocation_attempts = attempts;
        self
    }

    // ===== Storage Configuration =====

    /// Set the data directory.
    pub fn with_data_dir(mut self, path: PathBuf) -> Self {
        self.config.storage.data_dir = path;
        self
    }

    /// Use in-memory storage.
    pub fn with_in_memory_storage(mut self) -> Self {
        self.config.storage.in_memory = true;
        self
    }

    /// Use disk storage (default).
    pub fn with_disk_storage(mut self) -> Self {
        self.config.storage.in_memory = false;
        self
    }

    // ===== Reputation Configuration =====

    /// Set the reporter deltas for verified and rejected reports.
    pub fn with_reporter_deltas(mut self, verified: i32, rejected: i32) -> Self {
        self.config.reputation.verified_delta = verified;
        self.config.reputation.rejected_delta = rejected;
        self
    }

    /// Replace the jury policy.
    pub fn with_jury_policy(mut self, policy: JuryPolicy) -> Self {
        self.config.jury = policy;
        self
    }

    /// Set the tie-break rule.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.config.jury.tie_break = tie_break;
        self
    }

    // ===== Annotation Configuration =====

    /// Enable advisory annotation (default).
    pub fn enable_annotation(mut self) -> Self {
        self.config.annotation.enabled = true;
        self
    }

    /// Disable advisory annotation.
    pub fn disable_annotation(mut self) -> Self {
        self.config.annotation.enabled = false;
        self
    }

    /// Set the annotation cache capacity.
    pub fn with_annotation_cache(mut self, capacity: usize) -> Self {
        self.config.annotation.cache_capacity = capacity;
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The field name.
        field: String,
        /// The reason it's invalid.
        reason: String,
    },
}

/// Default data directory for the current platform.
fn default_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("tipline");
    }

    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".tipline");
    }

    PathBuf::from(".tipline")
}

/// Durations as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

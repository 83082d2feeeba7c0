//! Configuration module for wisync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for wisync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub documents: DocumentsConfig,
    pub state: StateConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Remote work-tracking connection settings.
///
/// Credentials are not stored here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Organization (account) hosting the project. `None` until configured.
    pub organization: Option<String>,
    /// Project whose work items are mirrored. `None` until configured.
    pub project: Option<String>,
}

/// Backing note storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Directory holding one markdown note per work item.
    pub root: PathBuf,
}

/// Durable state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// SQLite database holding the key-value store.
    pub database: PathBuf,
    /// Key under which the pending change snapshot is stored.
    pub pending_key: String,
}

/// Change tracking and push settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Drop restored pending changes that no longer make sense against the
    /// freshly rebuilt tree (unknown ids, cycles, already-applied moves).
    pub drop_stale_pending: bool,
    /// Milliseconds a note must be quiet before a modification is reported.
    pub watch_debounce_ms: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/wisync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("wisync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default key for the pending change snapshot.
pub const DEFAULT_PENDING_KEY: &str = "wisync.pending_changes";

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("wisync")
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("notes"),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            database: data_dir().join("state.db"),
            pending_key: DEFAULT_PENDING_KEY.to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drop_stale_pending: true,
            watch_debounce_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RemoteConfig {
    /// Returns true if both organization and project are set and non-blank.
    pub fn is_configured(&self) -> bool {
        self.require().is_ok()
    }

    /// Checks that the connection settings are present.
    ///
    /// Remote operations call this first; a missing setting is surfaced as
    /// [`DomainError::ValidationFailed`] before any state is touched.
    pub fn require(&self) -> Result<(), DomainError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !present(&self.organization) {
            return Err(DomainError::ValidationFailed(
                "remote.organization is not set".into(),
            ));
        }
        if !present(&self.project) {
            return Err(DomainError::ValidationFailed(
                "remote.project is not set".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"state.pending_key"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. An unconfigured
    /// remote is not an error here; it only blocks remote operations.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- remote ---
        for (field, value) in [
            ("remote.organization", &self.remote.organization),
            ("remote.project", &self.remote.project),
        ] {
            if value.as_deref().is_some_and(|s| s.trim().is_empty()) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must not be blank when set".into(),
                });
            }
        }

        // --- documents ---
        if self.documents.root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "documents.root".into(),
                message: "must not be empty".into(),
            });
        }

        // --- state ---
        if self.state.database.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "state.database".into(),
                message: "must not be empty".into(),
            });
        }
        if self.state.pending_key.trim().is_empty() {
            errors.push(ValidationError {
                field: "state.pending_key".into(),
                message: "must not be empty".into(),
            });
        }

        // --- sync ---
        if self.sync.watch_debounce_ms == 0 {
            errors.push(ValidationError {
                field: "sync.watch_debounce_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use wisync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .remote_organization("acme")
///     .remote_project("platform")
///     .documents_root(PathBuf::from("/home/user/notes"))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- remote ---

    pub fn remote_organization(mut self, organization: impl Into<String>) -> Self {
        self.config.remote.organization = Some(organization.into());
        self
    }

    pub fn remote_project(mut self, project: impl Into<String>) -> Self {
        self.config.remote.project = Some(project.into());
        self
    }

    // --- documents ---

    pub fn documents_root(mut self, root: PathBuf) -> Self {
        self.config.documents.root = root;
        self
    }

    // --- state ---

    pub fn state_database(mut self, database: PathBuf) -> Self {
        self.config.state.database = database;
        self
    }

    pub fn state_pending_key(mut self, key: impl Into<String>) -> Self {
        self.config.state.pending_key = key.into();
        self
    }

    // --- sync ---

    pub fn sync_drop_stale_pending(mut self, drop_stale: bool) -> Self {
        self.config.sync.drop_stale_pending = drop_stale;
        self
    }

    pub fn sync_watch_debounce_ms(mut self, ms: u64) -> Self {
        self.config.sync.watch_debounce_ms = ms;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

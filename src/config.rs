//! Backend configuration.
//!
//! Configuration is a JSON document selecting one backend:
//!
//! ```json
//! { "backend": { "kind": "local", "tasks_root": ".taskplane/tasks" } }
//! ```
//!
//! Relative paths are resolved against the root passed to
//! [`TaskplaneConfig::open_backend_in`].

use crate::task::{
    adapters::{
        local::{LocalTaskStore, OccPolicy, TaskIndexCache},
        remote::{BatchPolicy, FieldMapping, RedmineClient, RedmineClientConfig, RemoteTaskBackend},
    },
    domain::{TaskId, TaskStatus},
    ports::{IdRequest, IssueTrackerError, TaskBackend},
};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use mockable::DefaultClock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration or opening a backend.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Configuration file.
        path: Utf8PathBuf,
        /// Underlying error.
        source: Arc<std::io::Error>,
    },

    /// The configuration is not valid JSON of the expected shape.
    #[error("invalid configuration: {0}")]
    Parse(String),

    /// A setting has an unusable value.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting {
        /// Setting name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The environment variable named by `api_key_env` is not set.
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),

    /// A backend directory could not be opened.
    #[error("failed to open {path}: {source}")]
    Storage {
        /// Directory being opened.
        path: Utf8PathBuf,
        /// Underlying error.
        source: Arc<std::io::Error>,
    },

    /// The tracker client could not be built.
    #[error(transparent)]
    Tracker(#[from] IssueTrackerError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskplaneConfig {
    /// Selected backend.
    pub backend: BackendConfig,
}

/// Backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Git-tracked task documents.
    Local(LocalSettings),
    /// Redmine issue tracker.
    Redmine(RedmineSettings),
}

fn default_tasks_root() -> Utf8PathBuf {
    Utf8PathBuf::from(".taskplane/tasks")
}

fn default_cache_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(".taskplane/cache")
}

const fn default_occ_max_attempts() -> u32 {
    2
}

const fn default_id_suffix_length() -> usize {
    6
}

const fn default_id_attempts() -> usize {
    1000
}

const fn default_page_size() -> u64 {
    100
}

const fn default_timeout_ms() -> u64 {
    30_000
}

/// Settings of the local document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Directory holding one sub-directory per task.
    #[serde(default = "default_tasks_root")]
    pub tasks_root: Utf8PathBuf,
    /// Directory holding the index cache.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: Utf8PathBuf,
    /// Optimistic concurrency attempts per update.
    #[serde(default = "default_occ_max_attempts")]
    pub occ_max_attempts: u32,
    /// Length of generated id suffixes.
    #[serde(default = "default_id_suffix_length")]
    pub id_suffix_length: usize,
    /// Id candidates tried before giving up.
    #[serde(default = "default_id_attempts")]
    pub id_attempts: usize,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            tasks_root: default_tasks_root(),
            cache_dir: default_cache_dir(),
            occ_max_attempts: default_occ_max_attempts(),
            id_suffix_length: default_id_suffix_length(),
            id_attempts: default_id_attempts(),
        }
    }
}

/// Custom field ids used by the Redmine backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldIds {
    /// Field holding the task id.
    pub task_id: u64,
    /// Field holding the rendered task header.
    #[serde(default)]
    pub doc: Option<u64>,
}

/// Settings of the Redmine backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedmineSettings {
    /// Tracker root URL.
    pub base_url: String,
    /// Project identifier.
    pub project_id: String,
    /// API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key, used when `api_key` is
    /// absent.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Custom field ids.
    pub custom_fields: CustomFieldIds,
    /// Tracker status id per task status.
    #[serde(default)]
    pub status_map: BTreeMap<TaskStatus, u64>,
    /// Issues fetched per page.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Tasks written per batch. Must be a non-negative integer.
    #[serde(default)]
    pub batch_size: Option<Value>,
    /// Pause between batches in milliseconds. Must be a non-negative
    /// integer.
    #[serde(default)]
    pub batch_pause_ms: Option<Value>,
    /// Local store used as an offline mirror.
    #[serde(default)]
    pub mirror: Option<LocalSettings>,
}

impl RedmineSettings {
    /// Returns the validated bulk write pacing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] when either value is not a
    /// non-negative integer.
    pub fn batch_policy(&self) -> ConfigResult<BatchPolicy> {
        let batch_size = self
            .batch_size
            .as_ref()
            .map(|value| non_negative("batch_size", value))
            .transpose()?
            .map(|size| usize::try_from(size).unwrap_or(usize::MAX));
        let pause = self
            .batch_pause_ms
            .as_ref()
            .map(|value| non_negative("batch_pause_ms", value))
            .transpose()?
            .map(Duration::from_millis);
        Ok(BatchPolicy { batch_size, pause })
    }

    /// Returns the field mapping.
    #[must_use]
    pub fn field_mapping(&self) -> FieldMapping {
        let mut mapping = FieldMapping::new(self.custom_fields.task_id);
        mapping.doc_field = self.custom_fields.doc;
        mapping.status_map.clone_from(&self.status_map);
        mapping
    }

    fn resolve_api_key(&self) -> ConfigResult<Option<String>> {
        if let Some(key) = &self.api_key {
            return Ok(Some(key.clone()));
        }
        match &self.api_key_env {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::MissingApiKey(name.clone())),
            None => Ok(None),
        }
    }
}

fn non_negative(field: &'static str, value: &Value) -> ConfigResult<u64> {
    let invalid = |reason: &str| ConfigError::InvalidSetting {
        field,
        reason: reason.to_owned(),
    };
    match value {
        Value::Number(number) => number.as_u64().ok_or_else(|| {
            if number.as_i64().is_some() {
                invalid("must not be negative")
            } else {
                invalid("must be an integer")
            }
        }),
        _ => Err(invalid("must be a non-negative integer")),
    }
}

impl TaskplaneConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, and the
    /// errors of [`TaskplaneConfig::from_json`] otherwise.
    pub fn load(path: &Utf8Path) -> ConfigResult<Self> {
        let read_error = |err: std::io::Error| ConfigError::Read {
            path: path.to_owned(),
            source: Arc::new(err),
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path.file_name().ok_or_else(|| {
            read_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "configuration path has no file name",
            ))
        })?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
        let text = dir.read_to_string(file_name).map_err(read_error)?;
        Self::from_json(&text)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::InvalidSetting`] for out-of-range values.
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks setting ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] for the first invalid value.
    pub fn validate(&self) -> ConfigResult<()> {
        match &self.backend {
            BackendConfig::Local(local) => validate_local(local),
            BackendConfig::Redmine(remote) => {
                if remote.base_url.trim().is_empty() {
                    return Err(ConfigError::InvalidSetting {
                        field: "base_url",
                        reason: "must not be empty".to_owned(),
                    });
                }
                if remote.page_size == 0 {
                    return Err(ConfigError::InvalidSetting {
                        field: "page_size",
                        reason: "must be at least 1".to_owned(),
                    });
                }
                remote.batch_policy()?;
                remote.mirror.as_ref().map_or(Ok(()), validate_local)
            }
        }
    }

    /// Opens the configured backend relative to the working directory.
    ///
    /// # Errors
    ///
    /// See [`TaskplaneConfig::open_backend_in`].
    pub fn open_backend(&self) -> ConfigResult<Arc<dyn TaskBackend>> {
        self.open_backend_in(Utf8Path::new("."))
    }

    /// Opens the configured backend, resolving relative paths against
    /// `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Storage`] when a directory cannot be created,
    /// [`ConfigError::MissingApiKey`] when the key variable is unset, and
    /// [`ConfigError::Tracker`] when the HTTP client cannot be built.
    pub fn open_backend_in(&self, root: &Utf8Path) -> ConfigResult<Arc<dyn TaskBackend>> {
        self.validate()?;
        let clock = Arc::new(DefaultClock);
        match &self.backend {
            BackendConfig::Local(local) => open_local(local, root, &clock),
            BackendConfig::Redmine(remote) => {
                let client = RedmineClient::new(RedmineClientConfig {
                    base_url: remote.base_url.clone(),
                    project_id: remote.project_id.clone(),
                    api_key: remote.resolve_api_key()?,
                    timeout: Duration::from_millis(remote.timeout_ms),
                })?;
                let mut backend = RemoteTaskBackend::new(
                    Arc::new(client),
                    remote.field_mapping(),
                    Arc::clone(&clock),
                )
                .with_page_size(remote.page_size)
                .with_batch_policy(remote.batch_policy()?);
                if let Some(mirror) = &remote.mirror {
                    backend = backend.with_mirror(open_local(mirror, root, &clock)?);
                }
                Ok(Arc::new(backend))
            }
        }
    }
}

fn validate_local(local: &LocalSettings) -> ConfigResult<()> {
    if local.occ_max_attempts == 0 {
        return Err(ConfigError::InvalidSetting {
            field: "occ_max_attempts",
            reason: "must be at least 1".to_owned(),
        });
    }
    if local.id_suffix_length == 0 || local.id_suffix_length > TaskId::MAX_SUFFIX_LEN {
        return Err(ConfigError::InvalidSetting {
            field: "id_suffix_length",
            reason: format!("must be between 1 and {}", TaskId::MAX_SUFFIX_LEN),
        });
    }
    Ok(())
}

fn open_local(
    local: &LocalSettings,
    root: &Utf8Path,
    clock: &Arc<DefaultClock>,
) -> ConfigResult<Arc<dyn TaskBackend>> {
    let storage_error = |path: Utf8PathBuf| {
        move |err: std::io::Error| ConfigError::Storage {
            path,
            source: Arc::new(err),
        }
    };
    let tasks_root = root.join(&local.tasks_root);
    let cache_dir = root.join(&local.cache_dir);

    let index = TaskIndexCache::open(&cache_dir).map_err(storage_error(cache_dir.clone()))?;
    let store = LocalTaskStore::open(&tasks_root, Arc::clone(clock))
        .map_err(storage_error(tasks_root.clone()))?
        .with_index(index)
        .with_occ_policy(OccPolicy::new(local.occ_max_attempts))
        .with_id_request(IdRequest {
            suffix_length: local.id_suffix_length,
            attempts: local.id_attempts,
        });
    Ok(Arc::new(store))
}

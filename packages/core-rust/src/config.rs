//! Configuration store consumed by configure hooks.
//!
//! Components look up their configuration by name. [`JsonConfigStore`] reads
//! a stream of concatenated JSON objects whose top-level keys are the lookup
//! names; typed decoding happens at lookup time through
//! [`ConfigureContext::config`](crate::ConfigureContext::config).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde_json::Value;

/// Errors returned by configuration stores.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration stream: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("configuration document {index} is not a JSON object")]
    InvalidDocument { index: usize },
    #[error("{key} key not found")]
    NotFound { key: String },
    #[error("failed to decode {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read access to named configuration values.
pub trait ConfigStore: Send + Sync {
    /// Returns the raw value stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the store has no such key.
    fn get_value(&self, name: &str) -> Result<Value, ConfigError>;

    /// Returns `true` if the store holds a value under `name`.
    fn contains(&self, name: &str) -> bool {
        self.get_value(name).is_ok()
    }
}

// ---------------------------------------------------------------------------
// EmptyConfigStore
// ---------------------------------------------------------------------------

/// Store with no keys. Used by groups created without explicit configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyConfigStore;

impl ConfigStore for EmptyConfigStore {
    fn get_value(&self, name: &str) -> Result<Value, ConfigError> {
        Err(ConfigError::NotFound {
            key: name.to_string(),
        })
    }

    fn contains(&self, _name: &str) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// JsonConfigStore
// ---------------------------------------------------------------------------

/// Configuration store backed by a stream of JSON objects.
///
/// Each document in the stream must be an object. Keys from later documents
/// override the same keys from earlier ones.
#[derive(Debug, Clone, Default)]
pub struct JsonConfigStore {
    values: HashMap<String, Value>,
}

impl JsonConfigStore {
    /// Reads every document from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::InvalidDocument`] for a document that is not an object.
    pub fn open<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        let documents = serde_json::Deserializer::from_reader(reader).into_iter::<Value>();
        for (index, document) in documents.enumerate() {
            match document.map_err(ConfigError::Parse)? {
                Value::Object(map) => values.extend(map),
                _ => return Err(ConfigError::InvalidDocument { index }),
            }
        }
        tracing::debug!(keys = values.len(), "configuration loaded");
        Ok(Self { values })
    }

    /// Reads the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be opened, otherwise
    /// the same errors as [`open`](Self::open).
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file))
    }

    /// Parses configuration from an in-memory string.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::open(json.as_bytes())
    }

    /// Inserts or replaces a value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Returns the number of top-level keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigStore for JsonConfigStore {
    fn get_value(&self, name: &str) -> Result<Value, ConfigError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound {
                key: name.to_string(),
            })
    }

    fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

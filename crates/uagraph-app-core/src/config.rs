// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and storage port for uagraph hosts.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

impl<S: ConfigStore + ?Sized> ConfigStore for &S {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        (**self).load_raw(key)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        (**self).save_raw(key, data)
    }
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// Key contains characters a store cannot map to a location.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Returns `true` for keys made only of ASCII alphanumerics, `-`, `_` and `.`,
/// not starting with `.`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Thin service that serializes config values and delegates storage to a `ConfigStore`.
#[derive(Debug)]
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Borrow the inner store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize a config value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        if !is_valid_key(key) {
            return Err(ConfigError::InvalidKey(key.to_owned()));
        }
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(ConfigError::NotFound) => {
                debug!(key, "config key missing");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist a config value for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        if !is_valid_key(key) {
            return Err(ConfigError::InvalidKey(key.to_owned()));
        }
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde::Deserialize;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory store shared by the crate's unit tests.
    #[derive(Debug, Default)]
    pub(crate) struct MemStore {
        pub(crate) blobs: RefCell<HashMap<String, Vec<u8>>>,
    }

    impl ConfigStore for MemStore {
        fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
            self.blobs
                .borrow()
                .get(key)
                .cloned()
                .ok_or(ConfigError::NotFound)
        }

        fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
            self.blobs.borrow_mut().insert(key.to_owned(), data.to_vec());
            Ok(())
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Window {
        width: u32,
        title: String,
    }

    #[test]
    fn missing_and_empty_keys_load_as_none() {
        let svc = ConfigService::new(MemStore::default());
        assert!(svc.load::<Window>("window").unwrap().is_none());
        svc.store().save_raw("window", &[]).unwrap();
        assert!(svc.load::<Window>("window").unwrap().is_none());
    }

    #[test]
    fn saved_values_load_back() {
        let svc = ConfigService::new(MemStore::default());
        let w = Window {
            width: 640,
            title: "tree".into(),
        };
        svc.save("window", &w).unwrap();
        assert_eq!(svc.load::<Window>("window").unwrap(), Some(w));
    }

    #[test]
    fn corrupt_blobs_surface_as_serde_errors() {
        let svc = ConfigService::new(MemStore::default());
        svc.store().save_raw("window", b"{not json").unwrap();
        assert!(matches!(
            svc.load::<Window>("window"),
            Err(ConfigError::Serde(_))
        ));
    }

    #[test]
    fn path_like_keys_are_rejected() {
        let svc = ConfigService::new(MemStore::default());
        for key in ["", "../escape", ".hidden", "a/b", "a b"] {
            assert!(
                matches!(svc.save(key, &1u8), Err(ConfigError::InvalidKey(_))),
                "{key:?}"
            );
        }
        assert!(is_valid_key("model-settings.v1"));
    }
}

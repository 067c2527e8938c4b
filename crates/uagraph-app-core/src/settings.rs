// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted engine settings.

use tracing::{info, warn};
use uagraph_core::{Model, ModelSettings};

use crate::config::{ConfigError, ConfigService, ConfigStore};

/// Key under which [`ModelSettings`] are stored.
pub const MODEL_SETTINGS_KEY: &str = "model-settings";

/// Loads and saves [`ModelSettings`] through a [`ConfigStore`].
#[derive(Debug)]
pub struct SettingsService<S> {
    config: ConfigService<S>,
}

impl<S: ConfigStore> SettingsService<S> {
    /// Wrap `store`.
    pub fn new(store: S) -> Self {
        Self {
            config: ConfigService::new(store),
        }
    }

    /// Stored settings, or defaults when none were saved yet.
    pub fn load(&self) -> Result<ModelSettings, ConfigError> {
        Ok(self
            .config
            .load(MODEL_SETTINGS_KEY)?
            .unwrap_or_default())
    }

    /// Like [`load`](Self::load) but falls back to defaults on any error.
    pub fn load_or_default(&self) -> ModelSettings {
        self.load().unwrap_or_else(|err| {
            warn!(%err, "model settings unreadable; using defaults");
            ModelSettings::default()
        })
    }

    /// Persist `settings`.
    pub fn save(&self, settings: &ModelSettings) -> Result<(), ConfigError> {
        self.config.save(MODEL_SETTINGS_KEY, settings)?;
        info!(
            first_numeric_id = settings.first_numeric_id,
            max_node_limit = ?settings.max_node_limit,
            "model settings saved"
        );
        Ok(())
    }

    /// A fresh [`Model`] configured from the stored settings.
    pub fn open_model(&self) -> Model {
        Model::with_settings(self.load_or_default())
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.config.into_inner()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::tests::MemStore;
    use uagraph_core::standard::ids;
    use uagraph_core::AddNodeParams;

    #[test]
    fn defaults_until_saved() {
        let svc = SettingsService::new(MemStore::default());
        assert_eq!(svc.load().unwrap(), ModelSettings::default());
        let custom = ModelSettings {
            first_numeric_id: 5000,
            default_locale: Some("en".into()),
            ..ModelSettings::default()
        };
        svc.save(&custom).unwrap();
        assert_eq!(svc.load().unwrap(), custom);
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let store = MemStore::default();
        store
            .save_raw(MODEL_SETTINGS_KEY, br#"{ "max_node_limit": 7 }"#)
            .unwrap();
        let svc = SettingsService::new(store);
        let loaded = svc.load().unwrap();
        assert_eq!(loaded.max_node_limit, Some(7));
        assert_eq!(loaded.first_numeric_id, 1000);
    }

    #[test]
    fn unreadable_settings_fall_back_to_defaults() {
        let store = MemStore::default();
        store.save_raw(MODEL_SETTINGS_KEY, b"[1, 2").unwrap();
        let svc = SettingsService::new(store);
        assert!(svc.load().is_err());
        assert_eq!(svc.load_or_default(), ModelSettings::default());
    }

    #[test]
    fn opened_models_use_stored_ids() {
        let svc = SettingsService::new(MemStore::default());
        svc.save(&ModelSettings {
            first_numeric_id: 4242,
            ..ModelSettings::default()
        })
        .unwrap();
        let model = svc.open_model();
        let ns = model.create_namespace("urn:settings", "1.0").unwrap();
        let id = model
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("First", ns))
            .unwrap();
        assert_eq!(id, uagraph_core::NodeId::numeric(ns, 4242));
    }
}

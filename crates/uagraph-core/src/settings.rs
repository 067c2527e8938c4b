// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine-level settings (persisted by the host through a config store).

use serde::{Deserialize, Serialize};

/// Tunables consumed by the address space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// First numeric identifier handed out when creation parameters omit a NodeId.
    pub first_numeric_id: u32,
    /// Upper bound on total node count; `None` is unbounded.
    pub max_node_limit: Option<usize>,
    /// Locale stamped on display names generated from browse names.
    pub default_locale: Option<String>,
    /// Version given to namespaces created implicitly.
    pub implicit_namespace_version: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            first_numeric_id: 1000,
            max_node_limit: None,
            default_locale: None,
            implicit_namespace_version: "1.0.0".to_owned(),
        }
    }
}

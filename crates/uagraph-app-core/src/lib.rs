// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for uagraph hosts (config storage, model settings).
//! Keeps host adapters thin: storage lives behind [`config::ConfigStore`].

pub mod config;
pub mod settings;

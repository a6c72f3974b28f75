// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./palaver.toml` > `~/.config/palaver/palaver.toml` > `/etc/palaver/palaver.toml`
//! with environment variable overrides via `PALAVER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::PalaverConfig;

/// Top-level sections that environment variables may address.
const ENV_SECTIONS: &[&str] = &[
    "server", "storage", "whatsapp", "anthropic", "routing", "cache", "flow", "pipeline",
    "admin",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/palaver/palaver.toml` (system-wide)
/// 3. `~/.config/palaver/palaver.toml` (user XDG config)
/// 4. `./palaver.toml` (local directory)
/// 5. `PALAVER_*` environment variables
pub fn load_config() -> Result<PalaverConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<PalaverConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PalaverConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PalaverConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PalaverConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(PalaverConfig::default()))
        .merge(Toml::file("/etc/palaver/palaver.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("palaver/palaver.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("palaver.toml"))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config key.
///
/// Only the leading section name is split off, so `whatsapp_auth_token`
/// becomes `whatsapp.auth_token` rather than `whatsapp.auth.token`.
pub fn env_key_to_path(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("PALAVER_").map(|key| env_key_to_path(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_only_on_section() {
        assert_eq!(env_key_to_path("whatsapp_auth_token"), "whatsapp.auth_token");
        assert_eq!(
            env_key_to_path("routing_tier1_confidence_threshold"),
            "routing.tier1_confidence_threshold"
        );
        assert_eq!(env_key_to_path("pipeline_db_timeout_ms"), "pipeline.db_timeout_ms");
        assert_eq!(env_key_to_path("admin_bearer_token"), "admin.bearer_token");
        assert_eq!(env_key_to_path("unknown"), "unknown");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("palaver.toml", "[server]\nport = 9000\n")?;
            jail.set_env("PALAVER_SERVER_PORT", "9100");
            jail.set_env("PALAVER_WHATSAPP_AUTH_TOKEN", "secret");
            let config = load_config_from_path(Path::new("palaver.toml"))?;
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.whatsapp.auth_token.as_deref(), Some("secret"));
            Ok(())
        });
    }
}

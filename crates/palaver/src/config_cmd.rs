// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `palaver config show`.

use palaver_config::PalaverConfig;
use palaver_core::PalaverError;

const REDACTED: &str = "[redacted]";

/// Copy of `config` with every secret replaced.
fn redacted(config: &PalaverConfig) -> PalaverConfig {
    let mut config = config.clone();
    for secret in [
        &mut config.whatsapp.auth_token,
        &mut config.anthropic.api_key,
        &mut config.admin.bearer_token,
    ] {
        if secret.is_some() {
            *secret = Some(REDACTED.to_string());
        }
    }
    config
}

pub fn render(config: &PalaverConfig) -> Result<String, PalaverError> {
    toml::to_string_pretty(&redacted(config))
        .map_err(|e| PalaverError::Internal(format!("failed to render configuration: {e}")))
}

pub fn show(config: &PalaverConfig) -> Result<(), PalaverError> {
    print!("{}", render(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_never_reach_the_output() {
        let mut config = PalaverConfig::default();
        config.whatsapp.auth_token = Some("twilio-secret".into());
        config.anthropic.api_key = Some("sk-ant-secret".into());
        config.admin.bearer_token = Some("admin-secret".into());

        let rendered = render(&config).unwrap();
        assert!(!rendered.contains("twilio-secret"));
        assert!(!rendered.contains("sk-ant-secret"));
        assert!(!rendered.contains("admin-secret"));
        assert!(rendered.contains(REDACTED));
        assert!(rendered.contains("[server]"));
    }
}

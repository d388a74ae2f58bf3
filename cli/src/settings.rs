//! Loading the handoff configuration file.

use std::path::Path;

use anyhow::{Context, Result};

use beatit_nfc::NfcConfig;

/// Read `path` as TOML into an [`NfcConfig`]. No path gives the defaults.
pub fn load_config(path: Option<&Path>) -> Result<NfcConfig> {
    let Some(path) = path else {
        return Ok(NfcConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: NfcConfig =
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?;
    tracing::info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

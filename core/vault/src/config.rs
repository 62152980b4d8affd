//! Service configuration.

use serde::{Deserialize, Serialize};

use strongroom_common::{Error, Result, MAX_TTL_SECS};
use strongroom_crypto::KdfParams;

/// Default unlock window in seconds.
pub const DEFAULT_UNLOCK_TTL_SECS: u64 = 600;

/// Maximum characters returned by a text preview.
pub const DEFAULT_PREVIEW_MAX_CHARS: usize = 5000;

/// Marker appended to truncated text previews.
pub const TRUNCATION_MARKER: &str = "\n\n... (content truncated)";

/// Tunables shared by the vault services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Unlock TTL for vaults created without an explicit one.
    pub default_unlock_ttl_secs: u64,
    /// Character cap for textual previews.
    pub preview_max_chars: usize,
    /// Page size when the caller omits `limit`.
    pub history_default_limit: usize,
    /// Largest page size accepted.
    pub history_max_limit: usize,
    /// How long a member's PIN approval counts toward the unlock quorum.
    pub unlock_approval_window_secs: u64,
    /// Argon2id cost for new ciphertexts and credential hashes.
    pub kdf_params: KdfParams,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_unlock_ttl_secs: DEFAULT_UNLOCK_TTL_SECS,
            preview_max_chars: DEFAULT_PREVIEW_MAX_CHARS,
            history_default_limit: 50,
            history_max_limit: 200,
            unlock_approval_window_secs: 300,
            kdf_params: KdfParams::default(),
        }
    }
}

impl ServiceConfig {
    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.default_unlock_ttl_secs == 0 {
            return Err(Error::Validation(
                "default_unlock_ttl_secs must be positive".to_string(),
            ));
        }
        if self.preview_max_chars == 0 {
            return Err(Error::Validation(
                "preview_max_chars must be positive".to_string(),
            ));
        }
        if self.history_max_limit == 0
            || self.history_default_limit == 0
            || self.history_default_limit > self.history_max_limit
        {
            return Err(Error::Validation(
                "history limits must satisfy 0 < default <= max".to_string(),
            ));
        }
        if self.unlock_approval_window_secs == 0
            || self.unlock_approval_window_secs > MAX_TTL_SECS
        {
            return Err(Error::Validation(format!(
                "unlock_approval_window_secs must be between 1 and {}",
                MAX_TTL_SECS
            )));
        }
        self.kdf_params.validate()
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize and validate configuration from JSON.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

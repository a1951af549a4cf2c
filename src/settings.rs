//! Variant Compiler Settings
//!
//! [`FfpSettings`] is fixed when the graphics subsystem starts: the cache
//! capacity cannot change afterwards.
//!
//! ```rust,ignore
//! use myth_ffp::FfpSettings;
//!
//! let settings = FfpSettings {
//!     cache_capacity: 64,
//!     persistent_store_dir: Some("cache/ffp".into()),
//!     ..Default::default()
//! };
//!
//! // Or from a JSON config file
//! let settings = FfpSettings::from_json_str(r#"{ "cache_capacity": 16 }"#)?;
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{FfpError, Result};
use crate::synth::template;

/// Default number of in-memory variant slots.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfpSettings {
    /// Number of variants kept in memory.
    pub cache_capacity: usize,
    /// Directory of the persistent variant store; `None` disables it.
    pub persistent_store_dir: Option<PathBuf>,
    /// Mixed into persistent-store keys. Entries written under a different id
    /// are never read.
    pub build_id: String,
    /// Log every synthesized program at `debug` level.
    pub dump_generated_source: bool,
}

impl Default for FfpSettings {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            persistent_store_dir: None,
            build_id: default_build_id(),
            dump_generated_source: false,
        }
    }
}

impl FfpSettings {
    /// Parses settings from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(FfpError::InvalidSettings(
                "cache_capacity must be at least 1".into(),
            ));
        }
        if self.build_id.is_empty() {
            return Err(FfpError::InvalidSettings("build_id must not be empty".into()));
        }
        Ok(())
    }
}

/// Crate name, version and template revision.
#[must_use]
pub fn default_build_id() -> String {
    format!(
        "{}-{}-{:016x}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        template::revision()
    )
}

//! # Grid Configuration
//!
//! Startup-time settings, loadable from TOML. Everything has a usable
//! default so tests and demos can build a grid from a literal.

use serde::Deserialize;

use crate::error::{GridError, GridResult};

/// Grid assembly settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Grid width, in tiles.
    pub width: u32,
    /// Grid height, in tiles.
    pub height: u32,
    /// Master seed; each tile derives its own stream from this.
    pub seed: u64,
    /// Bounded capacity of each link direction, in packets.
    pub link_capacity: usize,
    /// Barrier patience: polling rounds before a pause attempt gives up.
    pub barrier_patience: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            seed: 0,
            link_capacity: tessera_itc::LINK_CAPACITY,
            barrier_patience: 10_000,
        }
    }
}

impl GridConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml(text: &str) -> GridResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects unusable settings.
    pub fn validate(&self) -> GridResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GridError::BadDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

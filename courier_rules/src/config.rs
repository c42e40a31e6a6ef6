//! Engine configuration: queue capacity, leverage tables, and action costs.
//!
//! Every field has a default, so a TOML file only needs the values it changes:
//!
//! ```toml
//! [queue]
//! capacity = 10
//!
//! [costs]
//! purge_cost = 4
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::mechanics::RelationshipCategory;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// One value per relationship category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable<T> {
    pub trust: T,
    pub commerce: T,
    pub status: T,
    pub shadow: T,
    pub common: T,
}

impl<T: Copy> CategoryTable<T> {
    pub fn get(&self, category: RelationshipCategory) -> T {
        match category {
            RelationshipCategory::Trust => self.trust,
            RelationshipCategory::Commerce => self.commerce,
            RelationshipCategory::Status => self.status,
            RelationshipCategory::Shadow => self.shadow,
            RelationshipCategory::Common => self.common,
        }
    }
}

/// A leverage tier: at or above `threshold`, entry is no lower than `max_position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTier {
    pub threshold: i32,
    pub max_position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeverageConfig {
    /// Entry position with zero leverage.
    pub base_positions: CategoryTable<usize>,
    /// Evaluated top-down; the first tier whose threshold is met applies.
    pub position_tiers: Vec<PositionTier>,
    pub displacement_base_cost: i32,
    pub displacement_multipliers: CategoryTable<f32>,
    /// Leverage at which displacement cost doubles.
    pub extreme_threshold: i32,
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            base_positions: CategoryTable {
                trust: 6,
                commerce: 5,
                status: 3,
                shadow: 7,
                common: 8,
            },
            position_tiers: vec![
                PositionTier {
                    threshold: 10,
                    max_position: 1,
                },
                PositionTier {
                    threshold: 5,
                    max_position: 2,
                },
                PositionTier {
                    threshold: 3,
                    max_position: 3,
                },
            ],
            displacement_base_cost: 2,
            displacement_multipliers: CategoryTable {
                trust: 0.8,
                commerce: 1.0,
                status: 1.5,
                shadow: 1.3,
                common: 1.0,
            },
            extreme_threshold: 10,
        }
    }
}

/// Token costs and relationship penalties of queue actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Tokens lost with the sender of an obligation pushed out of the queue.
    pub eviction_penalty: u32,
    /// Tokens lost with the sender of each obligation jumped by a skip.
    pub skip_penalty: u32,
    /// Flat total, any mix of categories.
    pub purge_cost: u32,
    pub priority_move_cost: u32,
    pub extension_cost: u32,
    pub extension_minutes: i32,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            eviction_penalty: 2,
            skip_penalty: 1,
            purge_cost: 3,
            priority_move_cost: 5,
            extension_cost: 2,
            extension_minutes: 2 * 24 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandingConfig {
    /// Lowest entry position under a priority entry effect.
    pub guaranteed_position: usize,
    pub bonus_payment: u32,
    pub breaking_penalty: u32,
    pub forced_insertion_interval_days: u32,
    pub patron_interval_days: u32,
}

impl Default for StandingConfig {
    fn default() -> Self {
        Self {
            guaranteed_position: 5,
            bonus_payment: 10,
            breaking_penalty: 5,
            forced_insertion_interval_days: 3,
            patron_interval_days: 30,
        }
    }
}

/// Consequences of letting a deadline lapse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub failure_leverage: i32,
    pub token_penalty: u32,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            failure_leverage: 2,
            token_penalty: 1,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub queue: QueueConfig,
    pub leverage: LeverageConfig,
    pub costs: CostConfig,
    pub standing: StandingConfig,
    pub expiry: ExpiryConfig,
}

impl EngineConfig {
    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with a different queue capacity and defaults elsewhere.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut config = Self::default();
        config.queue.capacity = capacity;
        config.standing.guaranteed_position = config.standing.guaranteed_position.min(capacity);
        config
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.queue.capacity;
        if capacity < 2 {
            return Err(ConfigError::Invalid(
                "queue.capacity must be at least 2".to_string(),
            ));
        }

        for category in RelationshipCategory::ALL {
            let base = self.leverage.base_positions.get(category);
            if base == 0 {
                return Err(ConfigError::Invalid(format!(
                    "leverage.base_positions.{} must be > 0",
                    category.to_string().to_lowercase()
                )));
            }
            if self.leverage.displacement_multipliers.get(category) <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "leverage.displacement_multipliers.{} must be > 0",
                    category.to_string().to_lowercase()
                )));
            }
        }

        let tiers = &self.leverage.position_tiers;
        if tiers.windows(2).any(|pair| pair[0].threshold <= pair[1].threshold) {
            return Err(ConfigError::Invalid(
                "leverage.position_tiers must be sorted by descending threshold".to_string(),
            ));
        }
        if tiers.iter().any(|tier| tier.max_position == 0) {
            return Err(ConfigError::Invalid(
                "leverage.position_tiers max_position must be > 0".to_string(),
            ));
        }

        if self.costs.purge_cost == 0 {
            return Err(ConfigError::Invalid(
                "costs.purge_cost must be > 0".to_string(),
            ));
        }
        if self.costs.extension_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "costs.extension_minutes must be > 0".to_string(),
            ));
        }

        let guaranteed = self.standing.guaranteed_position;
        if guaranteed == 0 || guaranteed > capacity {
            return Err(ConfigError::Invalid(format!(
                "standing.guaranteed_position must be within 1..={}",
                capacity
            )));
        }

        Ok(())
    }
}

/// Load engine configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = EngineConfig::from_toml_str(&content)?;
    debug!(
        path = %path.display(),
        capacity = config.capacity(),
        "loaded engine config"
    );
    Ok(config)
}

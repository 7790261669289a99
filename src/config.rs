//! Game configuration
//!
//! Everything tunable about the simulation lives here so tests can shrink
//! the field or crank drop rates without touching constants.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::ConfigError;

/// Play field dimensions. The origin is the top-left corner; y grows
/// downward. There is no bottom wall - the bottom edge is the loss boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub width: f32,
    pub height: f32,
}

impl Field {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Tunable simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Play field size
    pub field_width: f32,
    pub field_height: f32,
    /// Fixed frame interval in seconds; delta time is clamped to this
    pub frame_interval: f32,
    /// Broad-phase grid cell size (memory/rebuild cost vs false positives)
    pub cell_size: f32,
    /// Lives granted on a fresh run
    pub initial_lives: u32,
    /// Stages per round; clearing the last stage of a round emits RoundClear
    pub stages_per_round: u32,
    /// Hard cap on live particle entities (oldest evicted beyond this)
    pub max_particles: usize,
    /// Ticks between paddle shots
    pub fire_cooldown_ticks: u32,
    /// Chance a destroyed brick drops an item
    pub item_drop_chance: f64,
    /// Chance a destroyed brick pays out bonus coins
    pub coin_drop_chance: f64,
    /// Maximum paddle-bounce deflection angle (radians from straight up)
    pub max_deflect_angle: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            field_width: FIELD_WIDTH,
            field_height: FIELD_HEIGHT,
            frame_interval: FRAME_DT,
            cell_size: CELL_SIZE,
            initial_lives: 4,
            stages_per_round: 5,
            max_particles: 256,
            fire_cooldown_ticks: 20,
            item_drop_chance: 0.05,
            coin_drop_chance: 0.10,
            max_deflect_angle: MAX_DEFLECT_ANGLE,
        }
    }
}

impl GameConfig {
    pub fn field(&self) -> Field {
        Field::new(self.field_width, self.field_height)
    }

    /// Check invariants that would make the simulation nonsensical.
    /// This is the fatal error class: nothing past construction may fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.field_width <= 0.0 || self.field_height <= 0.0 {
            return Err(ConfigError::EmptyField {
                width: self.field_width,
                height: self.field_height,
            });
        }
        if self.cell_size <= 0.0 {
            return Err(ConfigError::BadCellSize(self.cell_size));
        }
        if self.frame_interval <= 0.0 {
            return Err(ConfigError::BadFrameInterval(self.frame_interval));
        }
        if self.stages_per_round == 0 {
            return Err(ConfigError::NoStages);
        }
        Ok(())
    }
}

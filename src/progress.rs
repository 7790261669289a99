//! Persisted player progress
//!
//! Loaded at state entry, written on mutation. Absence or corruption of the
//! stored record yields defaults - persistence problems never throw into
//! the game loop.

use serde::{Deserialize, Serialize};

use crate::platform::Persistence;

/// Player progress across stages and runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub lives: u32,
    pub score: u64,
    pub coins: u64,
    /// 1-based stage within the current round
    pub stage: u32,
    /// 1-based round counter
    pub round: u32,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            lives: 4,
            score: 0,
            coins: 0,
            stage: 1,
            round: 1,
        }
    }
}

impl Progress {
    /// Storage category key
    pub const CATEGORY: &'static str = "player";

    /// Load progress, substituting defaults for a missing or malformed
    /// record.
    pub fn load(store: &dyn Persistence) -> Self {
        match store.load(Self::CATEGORY) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(progress) => {
                    log::info!("loaded player progress");
                    progress
                }
                Err(err) => {
                    log::warn!("corrupt player progress, using defaults: {err}");
                    Self::default()
                }
            },
            Ok(None) => {
                log::info!("no saved progress, starting fresh");
                Self::default()
            }
            Err(err) => {
                log::warn!("progress load failed, using defaults: {err}");
                Self::default()
            }
        }
    }

    /// Save progress. Failures are logged and dropped.
    pub fn save(&self, store: &mut dyn Persistence) {
        match serde_json::to_value(self) {
            Ok(value) => {
                if let Err(err) = store.save(Self::CATEGORY, &value) {
                    log::warn!("progress save failed: {err}");
                }
            }
            Err(err) => log::warn!("progress serialize failed: {err}"),
        }
    }

    pub fn add_score(&mut self, points: u32) {
        self.score += u64::from(points);
    }

    pub fn add_coins(&mut self, coins: u32) {
        self.coins += u64::from(coins);
    }
}

//! Neon Breaker - brick-breaker simulation core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (entities, collision, physics, game loop)
//! - `config`: Tunable game configuration
//! - `progress`: Persisted player progress (lives, score, coins)
//! - `platform`: Collaborator traits (persistence, input, audio)
//!
//! Rendering is intentionally absent: the engine exposes entity state in
//! render order and an external consumer paints it.

pub mod config;
pub mod error;
pub mod platform;
pub mod progress;
pub mod sim;

pub use config::{Field, GameConfig};
pub use progress::Progress;
pub use sim::{GameEngine, GamePhase};

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz, the cadence all speeds are tuned for)
    pub const FRAME_DT: f32 = 1.0 / 60.0;

    /// Play field dimensions
    pub const FIELD_WIDTH: f32 = 800.0;
    pub const FIELD_HEIGHT: f32 = 600.0;

    /// Broad-phase grid cell size
    pub const CELL_SIZE: f32 = 100.0;

    /// Paddle defaults
    pub const PADDLE_WIDTH: f32 = 80.0;
    pub const PADDLE_HEIGHT: f32 = 12.0;
    pub const PADDLE_SPEED: f32 = 2.5;
    /// Bottom margin between paddle and the loss edge
    pub const PADDLE_MARGIN: f32 = 30.0;

    /// Ball defaults (velocities are px/frame at 60 Hz)
    pub const BALL_RADIUS: f32 = 7.0;
    pub const BALL_SPEED: f32 = 4.0;
    /// Trail history length (oldest evicted first)
    pub const TRAIL_LENGTH: usize = 8;

    /// Maximum paddle-bounce deflection from straight up (radians, 60 degrees)
    pub const MAX_DEFLECT_ANGLE: f32 = std::f32::consts::FRAC_PI_3;

    /// Brick grid defaults
    pub const BRICK_WIDTH: f32 = 60.0;
    pub const BRICK_HEIGHT: f32 = 20.0;
    pub const BRICK_PADDING: f32 = 5.0;
    pub const BRICK_TOP_OFFSET: f32 = 60.0;

    /// Bullet defaults
    pub const BULLET_WIDTH: f32 = 4.0;
    pub const BULLET_HEIGHT: f32 = 10.0;
    pub const BULLET_SPEED: f32 = 8.0;

    /// Item defaults
    pub const ITEM_SIZE: f32 = 16.0;
    pub const ITEM_FALL_SPEED: f32 = 2.0;
    /// Extra hit-box margin that eases item pickup
    pub const ITEM_PICKUP_MARGIN: f32 = 10.0;

    /// Timed paddle modifiers last 5 seconds
    pub const MODIFIER_DURATION_TICKS: u64 = 300;
    /// Piercing balls last 5 seconds
    pub const PIERCING_DURATION_TICKS: u32 = 300;

    /// Widen modifier adds this many pixels of paddle width
    pub const WIDEN_DELTA: f32 = 24.0;
    /// Speed-boost modifier adds this much paddle speed
    pub const SPEED_BOOST_DELTA: f32 = 1.5;
}

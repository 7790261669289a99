//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies beyond the collaborator traits

pub mod collision;
pub mod engine;
pub mod entity;
pub mod events;
pub mod grid;
pub mod physics;
pub mod registry;

pub use collision::{CollisionRecord, CollisionSystem, Contact, HandlerCtx, Side};
pub use engine::{Collaborators, GameEngine, GamePhase};
pub use entity::{
    Ball, Body, Brick, BrickKind, Capabilities, CapabilityKind, Entity, EntityId, EntityKind,
    EntityType, ItemKind, Paddle, render_priority,
};
pub use events::{EventBus, GameEvent, ListenerId};
pub use grid::SpatialGrid;
pub use physics::PhysicsSystem;
pub use registry::EntityRegistry;

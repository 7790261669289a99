//! Physics integration
//!
//! Advances every entity that carries a `Body`. Velocities are expressed
//! in px/frame at 60 Hz, so integration scales the delta time by 60 - a
//! tick at exactly the frame interval moves an entity by exactly its
//! velocity. Friction, speed clamping, gravity and boundary containment
//! are opt-in per body.

use crate::config::Field;
use crate::consts::FRAME_DT;

use super::entity::{Entity, EntityKind};
use super::registry::EntityRegistry;

#[derive(Debug, Clone)]
pub struct PhysicsSystem {
    /// Velocity damping factor per tick for bodies with friction
    pub friction: f32,
    /// Velocity magnitude cap for bodies with the speed clamp
    pub max_speed: f32,
    /// Constant added to vertical velocity per tick for gravity bodies
    pub gravity: f32,
    /// Fraction of velocity preserved on a containment bounce
    /// (1.0 = perfectly elastic)
    pub restitution: f32,
    /// Upper bound on the delta time fed to one step
    pub frame_interval: f32,
}

impl Default for PhysicsSystem {
    fn default() -> Self {
        Self {
            friction: 0.98,
            max_speed: 20.0,
            gravity: 0.15,
            restitution: 1.0,
            frame_interval: FRAME_DT,
        }
    }
}

impl PhysicsSystem {
    /// Step every active, non-destroyed entity with a body
    pub fn update(&self, registry: &mut EntityRegistry, field: Field, dt: f32) {
        for entity in registry.iter_mut() {
            if !entity.active || entity.destroyed {
                continue;
            }
            self.step(entity, field, dt);
        }
    }

    /// Advance one entity. Attached balls track the paddle instead and are
    /// skipped entirely.
    pub fn step(&self, entity: &mut Entity, field: Field, dt: f32) {
        if let EntityKind::Ball(ball) = &entity.kind
            && ball.attached
        {
            return;
        }
        let Some(body) = &mut entity.body else {
            return;
        };

        // Clamp against long frame stalls (tab backgrounding and the like)
        let scale = dt.min(self.frame_interval) * 60.0;

        entity.pos += body.vel * scale;

        if body.friction {
            body.vel *= self.friction;
        }

        if body.clamp_speed {
            let speed = body.vel.length();
            if speed > self.max_speed {
                body.vel *= self.max_speed / speed;
            }
        }

        if body.gravity {
            body.vel.y += self.gravity * scale;
        }

        if body.contained {
            // Left/right/top only; the bottom edge is the loss boundary
            if entity.pos.x < 0.0 {
                entity.pos.x = 0.0;
                body.vel.x = body.vel.x.abs() * self.restitution;
            } else if entity.pos.x + entity.size.x > field.width {
                entity.pos.x = field.width - entity.size.x;
                body.vel.x = -body.vel.x.abs() * self.restitution;
            }
            if entity.pos.y < 0.0 {
                entity.pos.y = 0.0;
                body.vel.y = body.vel.y.abs() * self.restitution;
            }
        }
    }
}

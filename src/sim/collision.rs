//! Collision detection and dispatch
//!
//! Broad-phase candidates come from the spatial grid; each unchecked pair
//! runs the type-specific narrow-phase test and becomes a
//! `CollisionRecord` carrying the geometry the handlers need (impact side,
//! reflection angle, penetration). The system only classifies and routes -
//! gameplay response lives in the registered handlers.
//!
//! Pair de-duplication is once per tick: the checked-pair set is local to
//! one `detect` call, so a ball resting against a wall keeps producing a
//! record every tick.

use std::collections::{HashMap, HashSet};

use glam::Vec2;
use rand_pcg::Pcg32;

use crate::config::{Field, GameConfig};
use crate::consts::ITEM_PICKUP_MARGIN;
use crate::error::HandlerFault;
use crate::platform::AudioSink;
use crate::progress::Progress;

use super::entity::{Entity, EntityId, EntityType};
use super::grid::SpatialGrid;
use super::registry::EntityRegistry;

/// Impact side of a rectangular surface, from the rectangle's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

/// Geometry-specific collision metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contact {
    /// Reflection angle from straight up, scaled by the ball's offset from
    /// the paddle center
    BallPaddle { angle: f32 },
    BallBrick { side: Side, penetration: f32 },
    BallWall { side: Side },
    BulletBrick,
    ItemPaddle,
}

/// One detected collision, produced and consumed within a single tick.
/// Entities are referenced by id; `a` is the canonical first type of the
/// pair (ball before paddle/brick/wall, bullet before brick, item before
/// paddle).
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionRecord {
    pub a: EntityId,
    pub b: EntityId,
    pub pair: (EntityType, EntityType),
    pub contact: Contact,
}

/// Mutable game state handed to collision handlers
pub struct HandlerCtx<'a> {
    pub registry: &'a mut EntityRegistry,
    pub progress: &'a mut Progress,
    pub audio: &'a mut dyn AudioSink,
    pub rng: &'a mut Pcg32,
    /// Entities to register after the dispatch pass completes
    pub spawns: &'a mut Vec<Entity>,
    pub config: &'a GameConfig,
    /// Current tick counter
    pub now: u64,
}

pub type CollisionHandler =
    Box<dyn FnMut(&mut HandlerCtx<'_>, &CollisionRecord) -> Result<(), HandlerFault>>;

pub struct CollisionSystem {
    /// Both orderings of a pair resolve to the same table slot
    keys: HashMap<(EntityType, EntityType), usize>,
    table: Vec<CollisionHandler>,
    enabled: bool,
}

impl CollisionSystem {
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
            table: Vec::new(),
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Register a handler for a type pair. Stored under both orderings so
    /// either arrival order dispatches identically.
    pub fn register_handler(&mut self, a: EntityType, b: EntityType, handler: CollisionHandler) {
        let slot = self.table.len();
        self.table.push(handler);
        self.keys.insert((a, b), slot);
        self.keys.insert((b, a), slot);
    }

    /// Run narrow-phase tests over broad-phase candidates. Each unordered
    /// pair is tested at most once per call.
    pub fn detect(
        &self,
        registry: &EntityRegistry,
        grid: &SpatialGrid,
        field: Field,
        max_deflect: f32,
    ) -> Vec<CollisionRecord> {
        if !self.enabled {
            return Vec::new();
        }

        let mut records = Vec::new();
        let mut checked: HashSet<(EntityId, EntityId)> = HashSet::new();

        for entity in registry.iter() {
            if !entity.active || entity.destroyed {
                continue;
            }
            for other_id in grid.query(entity) {
                let Some(other) = registry.get(other_id) else {
                    continue;
                };
                if !other.active || other.destroyed {
                    continue;
                }
                let key = (entity.id.min(other_id), entity.id.max(other_id));
                if !checked.insert(key) {
                    continue;
                }
                if let Some(record) = classify(entity, other, field, max_deflect) {
                    records.push(record);
                }
            }
        }

        records
    }

    /// Route records to their handlers. A failing handler is logged and
    /// skipped; detection of the remaining pairs is never aborted.
    pub fn dispatch(&mut self, records: &[CollisionRecord], ctx: &mut HandlerCtx<'_>) {
        for record in records {
            let Some(&slot) = self.keys.get(&record.pair) else {
                continue;
            };
            if let Err(fault) = (self.table[slot])(ctx, record) {
                log::warn!(
                    "collision handler failed for {:?}: {fault}",
                    record.pair
                );
            }
        }
    }
}

/// Narrow-phase test for one candidate pair, canonicalizing argument order
fn classify(a: &Entity, b: &Entity, field: Field, max_deflect: f32) -> Option<CollisionRecord> {
    use EntityType::*;
    match (a.entity_type(), b.entity_type()) {
        (Ball, Paddle) => ball_paddle(a, b, max_deflect),
        (Paddle, Ball) => ball_paddle(b, a, max_deflect),
        (Ball, Brick) => ball_brick(a, b),
        (Brick, Ball) => ball_brick(b, a),
        (Ball, Wall) => ball_wall(a, b, field),
        (Wall, Ball) => ball_wall(b, a, field),
        (Bullet, Brick) => bullet_brick(a, b),
        (Brick, Bullet) => bullet_brick(b, a),
        (Item, Paddle) => item_paddle(a, b),
        (Paddle, Item) => item_paddle(b, a),
        _ => None,
    }
}

/// Ball vs paddle: vertical extent overlaps the paddle's top band and the
/// ball's center lies within the paddle's horizontal extent. The
/// reflection angle scales with the offset from the paddle center,
/// symmetric about straight up.
fn ball_paddle(ball: &Entity, paddle: &Entity, max_deflect: f32) -> Option<CollisionRecord> {
    let ball_data = ball.as_ball()?;
    if ball_data.attached {
        return None;
    }

    let center = ball.center();
    let radius = ball_data.radius;
    let bounds = paddle.bounds();

    let in_band = center.y + radius >= bounds.top && center.y - radius <= bounds.bottom;
    let in_extent = center.x >= bounds.left && center.x <= bounds.right;
    if !(in_band && in_extent) {
        return None;
    }

    let half_width = paddle.size.x / 2.0;
    let relative = ((center.x - bounds.center().x) / half_width).clamp(-1.0, 1.0);

    Some(CollisionRecord {
        a: ball.id,
        b: paddle.id,
        pair: (EntityType::Ball, EntityType::Paddle),
        contact: Contact::BallPaddle {
            angle: relative * max_deflect,
        },
    })
}

/// Ball vs brick: circle against rectangle via the closest point on the
/// brick's bounds. The impact side follows the larger of the center
/// offsets; an exact tie resolves to vertical.
fn ball_brick(ball: &Entity, brick: &Entity) -> Option<CollisionRecord> {
    let ball_data = ball.as_ball()?;
    if ball_data.attached {
        return None;
    }

    let center = ball.center();
    let radius = ball_data.radius;
    let bounds = brick.bounds();

    let closest = Vec2::new(
        center.x.clamp(bounds.left, bounds.right),
        center.y.clamp(bounds.top, bounds.bottom),
    );
    // No normalization anywhere here, so the zero-distance case (ball
    // center inside the brick) degrades to the offset comparison below
    // instead of a NaN
    let distance = center.distance(closest);
    if distance >= radius {
        return None;
    }

    let offset = center - bounds.center();
    let side = if offset.x.abs() > offset.y.abs() {
        if offset.x > 0.0 { Side::Right } else { Side::Left }
    } else if offset.y > 0.0 {
        Side::Bottom
    } else {
        Side::Top
    };

    Some(CollisionRecord {
        a: ball.id,
        b: brick.id,
        pair: (EntityType::Ball, EntityType::Brick),
        contact: Contact::BallBrick {
            side,
            penetration: radius - distance,
        },
    })
}

/// Ball vs play field edges. There is no bottom wall: the bottom edge is
/// the life-loss boundary and belongs to state evaluation.
fn ball_wall(ball: &Entity, wall: &Entity, field: Field) -> Option<CollisionRecord> {
    let ball_data = ball.as_ball()?;
    if ball_data.attached {
        return None;
    }

    let bounds = ball.bounds();
    let side = if bounds.left <= 0.0 {
        Side::Left
    } else if bounds.right >= field.width {
        Side::Right
    } else if bounds.top <= 0.0 {
        Side::Top
    } else {
        return None;
    };

    Some(CollisionRecord {
        a: ball.id,
        b: wall.id,
        pair: (EntityType::Ball, EntityType::Wall),
        contact: Contact::BallWall { side },
    })
}

fn bullet_brick(bullet: &Entity, brick: &Entity) -> Option<CollisionRecord> {
    if !bullet.bounds().overlaps(&brick.bounds()) {
        return None;
    }
    Some(CollisionRecord {
        a: bullet.id,
        b: brick.id,
        pair: (EntityType::Bullet, EntityType::Brick),
        contact: Contact::BulletBrick,
    })
}

/// Item vs paddle, with a modestly expanded item hit box to ease pickup
fn item_paddle(item: &Entity, paddle: &Entity) -> Option<CollisionRecord> {
    if !item
        .bounds()
        .expanded(ITEM_PICKUP_MARGIN)
        .overlaps(&paddle.bounds())
    {
        return None;
    }
    Some(CollisionRecord {
        a: item.id,
        b: paddle.id,
        pair: (EntityType::Item, EntityType::Paddle),
        contact: Contact::ItemPaddle,
    })
}

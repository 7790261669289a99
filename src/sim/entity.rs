//! Entity model
//!
//! Every simulated object shares one geometric/lifecycle contract and
//! carries its variant data in a closed `EntityKind` union, so collision
//! dispatch and render ordering match exhaustively instead of branching on
//! string tags. Cross-cutting behavior (shield, magnet) composes through
//! the capability slots without reshaping the type set.

use std::collections::VecDeque;

use glam::Vec2;

use crate::config::Field;
use crate::consts::*;
use crate::platform::InputSource;

/// Opaque entity identifier, unique among currently-registered entities
pub type EntityId = u32;

/// Closed set of entity types, used as dispatch/query keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Ball,
    Paddle,
    Brick,
    Bullet,
    Item,
    Particle,
    Wall,
}

/// Render priority for a type (lower paints first). Walls are invisible
/// collision geometry and sort below everything.
pub fn render_priority(entity_type: EntityType) -> u8 {
    match entity_type {
        EntityType::Wall => 0,
        EntityType::Brick => 1,
        EntityType::Paddle => 2,
        EntityType::Ball => 3,
        EntityType::Bullet => 4,
        EntityType::Item => 5,
        EntityType::Particle => 6,
    }
}

/// Axis-aligned bounds derived from position and size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Bounds {
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    pub fn overlaps(&self, other: &Bounds) -> bool {
        !(self.right < other.left
            || self.left > other.right
            || self.bottom < other.top
            || self.top > other.bottom)
    }

    /// Grow the box by `margin` on every side
    pub fn expanded(&self, margin: f32) -> Bounds {
        Bounds {
            left: self.left - margin,
            top: self.top - margin,
            right: self.right + margin,
            bottom: self.bottom + margin,
        }
    }
}

/// Physics participation. Velocities are px/frame at 60 Hz; the integrator
/// applies the opt-in flags each step.
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub vel: Vec2,
    /// Damp velocity by the system friction factor each tick
    pub friction: bool,
    /// Clamp velocity magnitude to the system maximum
    pub clamp_speed: bool,
    /// Add the system gravity constant to vertical velocity each tick
    pub gravity: bool,
    /// Correct out-of-bounds position against the left/right/top edges and
    /// reflect the velocity axis. The bottom edge is never contained - it
    /// is the loss boundary.
    pub contained: bool,
}

/// Capability slot keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Shield,
    Magnet,
}

/// One-shot save when all balls are lost
#[derive(Debug, Clone, Copy)]
pub struct Shield {
    pub charges: u32,
}

/// Balls re-attach to the paddle on contact while charges remain
#[derive(Debug, Clone, Copy)]
pub struct Magnet {
    pub catches: u32,
}

/// Closed set of optional capabilities. Attach/detach/query are O(1) slot
/// accesses; detaching an absent capability is a no-op.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    shield: Option<Shield>,
    magnet: Option<Magnet>,
}

impl Capabilities {
    pub fn attach_shield(&mut self, shield: Shield) {
        self.shield = Some(shield);
    }

    pub fn attach_magnet(&mut self, magnet: Magnet) {
        self.magnet = Some(magnet);
    }

    pub fn shield(&self) -> Option<&Shield> {
        self.shield.as_ref()
    }

    pub fn shield_mut(&mut self) -> Option<&mut Shield> {
        self.shield.as_mut()
    }

    pub fn magnet(&self) -> Option<&Magnet> {
        self.magnet.as_ref()
    }

    pub fn magnet_mut(&mut self) -> Option<&mut Magnet> {
        self.magnet.as_mut()
    }

    pub fn has(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::Shield => self.shield.is_some(),
            CapabilityKind::Magnet => self.magnet.is_some(),
        }
    }

    pub fn detach(&mut self, kind: CapabilityKind) {
        match kind {
            CapabilityKind::Shield => self.shield = None,
            CapabilityKind::Magnet => self.magnet = None,
        }
    }

    /// Release every attached capability. The sweep calls this before an
    /// entity is physically removed.
    pub fn release_all(&mut self) {
        self.shield = None;
        self.magnet = None;
    }
}

/// Ball variant data
#[derive(Debug, Clone)]
pub struct Ball {
    pub radius: f32,
    /// Scalar speed the reflection handlers rescale to
    pub speed: f32,
    /// Tracks the paddle and ignores physics while true
    pub attached: bool,
    /// Remaining piercing ticks; 0 means off
    pub piercing_ticks: u32,
    /// Recent positions, newest last, oldest evicted first
    pub trail: VecDeque<Vec2>,
}

impl Ball {
    pub fn piercing(&self) -> bool {
        self.piercing_ticks > 0
    }

    fn record_trail(&mut self, pos: Vec2) {
        self.trail.push_back(pos);
        if self.trail.len() > TRAIL_LENGTH {
            self.trail.pop_front();
        }
    }
}

/// Brick types with fixed hit points and point values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrickKind {
    #[default]
    Normal,
    Glass,
    Strong,
    Metal,
    Bomb,
    Bonus,
}

impl BrickKind {
    pub fn hit_points(self) -> u8 {
        match self {
            BrickKind::Strong => 2,
            BrickKind::Metal => 3,
            BrickKind::Normal | BrickKind::Glass | BrickKind::Bomb | BrickKind::Bonus => 1,
        }
    }

    pub fn points(self) -> u32 {
        match self {
            BrickKind::Strong => 20,
            BrickKind::Metal => 30,
            BrickKind::Bomb => 15,
            BrickKind::Bonus => 50,
            BrickKind::Normal | BrickKind::Glass => 10,
        }
    }
}

/// Brick variant data
#[derive(Debug, Clone)]
pub struct Brick {
    pub kind: BrickKind,
    pub hp: u8,
    pub max_hp: u8,
    pub points: u32,
    /// Shake animation ticks remaining after a non-lethal hit
    pub shake_ticks: u32,
    /// Hit flash intensity, 0..=1, decays in update
    pub hit_flash: f32,
}

/// Timed paddle modifier reverting at an absolute tick timestamp
#[derive(Debug, Clone, Copy)]
pub struct Modifier {
    pub delta: f32,
    pub expires_at: u64,
}

/// Paddle variant data
#[derive(Debug, Clone)]
pub struct Paddle {
    /// Desired x position, driven by input
    pub target_x: f32,
    /// Base movement speed (px/frame)
    pub speed: f32,
    pub speed_boost: Option<Modifier>,
    pub widen: Option<Modifier>,
}

impl Paddle {
    /// Movement speed including any active boost
    pub fn effective_speed(&self) -> f32 {
        self.speed + self.speed_boost.map_or(0.0, |m| m.delta)
    }
}

/// Bullet variant data
#[derive(Debug, Clone)]
pub struct Bullet {
    pub damage: u8,
}

/// Item types dropped by destroyed bricks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Life,
    MultiBall,
    Widen,
    Boost,
    Coin,
    Shield,
    Magnet,
    Piercing,
}

/// Item variant data
#[derive(Debug, Clone)]
pub struct Item {
    pub kind: ItemKind,
}

/// Particle variant data (visual only, never affects gameplay)
#[derive(Debug, Clone)]
pub struct Particle {
    pub color: u32,
    /// Remaining life in seconds
    pub life: f32,
    pub size: f32,
}

/// Per-variant payload
#[derive(Debug, Clone)]
pub enum EntityKind {
    Ball(Ball),
    Paddle(Paddle),
    Brick(Brick),
    Bullet(Bullet),
    Item(Item),
    Particle(Particle),
    Wall,
}

impl EntityKind {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityKind::Ball(_) => EntityType::Ball,
            EntityKind::Paddle(_) => EntityType::Paddle,
            EntityKind::Brick(_) => EntityType::Brick,
            EntityKind::Bullet(_) => EntityType::Bullet,
            EntityKind::Item(_) => EntityType::Item,
            EntityKind::Particle(_) => EntityType::Particle,
            EntityKind::Wall => EntityType::Wall,
        }
    }
}

/// Read-only paddle geometry handed to entity updates (attached balls
/// follow it)
#[derive(Debug, Clone, Copy)]
pub struct PaddleSnapshot {
    pub pos: Vec2,
    pub size: Vec2,
}

impl PaddleSnapshot {
    pub fn center_x(&self) -> f32 {
        self.pos.x + self.size.x / 2.0
    }
}

/// Context for per-entity updates
pub struct UpdateCtx<'a> {
    pub dt: f32,
    /// Current tick counter (modifier expiries are absolute ticks)
    pub now: u64,
    pub field: Field,
    pub input: &'a dyn InputSource,
    pub paddle: Option<PaddleSnapshot>,
}

/// A simulated game object
#[derive(Debug, Clone)]
pub struct Entity {
    /// Assigned by the registry; stable for the entity's lifetime
    pub id: EntityId,
    /// Top-left corner
    pub pos: Vec2,
    pub size: Vec2,
    pub kind: EntityKind,
    pub body: Option<Body>,
    pub caps: Capabilities,
    /// Participates in update
    pub active: bool,
    /// Participates in render
    pub visible: bool,
    /// Terminal; removed from the registry at the next sweep
    pub destroyed: bool,
}

impl Entity {
    fn new(pos: Vec2, size: Vec2, kind: EntityKind, body: Option<Body>) -> Self {
        Self {
            id: 0,
            pos,
            size,
            kind,
            body,
            caps: Capabilities::default(),
            active: true,
            visible: true,
            destroyed: false,
        }
    }

    /// A ball attached to nothing yet, positioned by center
    pub fn ball(center: Vec2, radius: f32, speed: f32) -> Self {
        Self::new(
            center - Vec2::splat(radius),
            Vec2::splat(radius * 2.0),
            EntityKind::Ball(Ball {
                radius,
                speed,
                attached: true,
                piercing_ticks: 0,
                trail: VecDeque::with_capacity(TRAIL_LENGTH),
            }),
            Some(Body {
                contained: true,
                ..Body::default()
            }),
        )
    }

    pub fn paddle(pos: Vec2, width: f32, height: f32) -> Self {
        Self::new(
            pos,
            Vec2::new(width, height),
            EntityKind::Paddle(Paddle {
                target_x: pos.x,
                speed: PADDLE_SPEED,
                speed_boost: None,
                widen: None,
            }),
            None,
        )
    }

    pub fn brick(pos: Vec2, width: f32, height: f32, kind: BrickKind) -> Self {
        let hp = kind.hit_points();
        Self::new(
            pos,
            Vec2::new(width, height),
            EntityKind::Brick(Brick {
                kind,
                hp,
                max_hp: hp,
                points: kind.points(),
                shake_ticks: 0,
                hit_flash: 0.0,
            }),
            None,
        )
    }

    /// A bullet rising from `center_x` at the given top edge
    pub fn bullet(center_x: f32, top: f32) -> Self {
        Self::new(
            Vec2::new(center_x - BULLET_WIDTH / 2.0, top),
            Vec2::new(BULLET_WIDTH, BULLET_HEIGHT),
            EntityKind::Bullet(Bullet { damage: 1 }),
            Some(Body {
                vel: Vec2::new(0.0, -BULLET_SPEED),
                ..Body::default()
            }),
        )
    }

    /// An item falling from `center`
    pub fn item(center: Vec2, kind: ItemKind) -> Self {
        Self::new(
            center - Vec2::splat(ITEM_SIZE / 2.0),
            Vec2::splat(ITEM_SIZE),
            EntityKind::Item(Item { kind }),
            Some(Body {
                vel: Vec2::new(0.0, ITEM_FALL_SPEED),
                ..Body::default()
            }),
        )
    }

    pub fn particle(pos: Vec2, vel: Vec2, color: u32, life: f32, size: f32) -> Self {
        Self::new(
            pos,
            Vec2::splat(size),
            EntityKind::Particle(Particle { color, life, size }),
            Some(Body {
                vel,
                friction: true,
                gravity: true,
                ..Body::default()
            }),
        )
    }

    /// The invisible boundary entity the ball-wall classifier tests against
    pub fn wall(field: Field) -> Self {
        let mut wall = Self::new(
            Vec2::ZERO,
            Vec2::new(field.width, field.height),
            EntityKind::Wall,
            None,
        );
        wall.visible = false;
        wall
    }

    pub fn entity_type(&self) -> EntityType {
        self.kind.entity_type()
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            left: self.pos.x,
            top: self.pos.y,
            right: self.pos.x + self.size.x,
            bottom: self.pos.y + self.size.y,
        }
    }

    pub fn center(&self) -> Vec2 {
        self.pos + self.size / 2.0
    }

    /// Mark terminal. The registry sweep performs the physical removal.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.active = false;
    }

    pub fn as_ball(&self) -> Option<&Ball> {
        match &self.kind {
            EntityKind::Ball(ball) => Some(ball),
            _ => None,
        }
    }

    pub fn as_ball_mut(&mut self) -> Option<&mut Ball> {
        match &mut self.kind {
            EntityKind::Ball(ball) => Some(ball),
            _ => None,
        }
    }

    pub fn as_paddle(&self) -> Option<&Paddle> {
        match &self.kind {
            EntityKind::Paddle(paddle) => Some(paddle),
            _ => None,
        }
    }

    pub fn as_paddle_mut(&mut self) -> Option<&mut Paddle> {
        match &mut self.kind {
            EntityKind::Paddle(paddle) => Some(paddle),
            _ => None,
        }
    }

    pub fn as_brick(&self) -> Option<&Brick> {
        match &self.kind {
            EntityKind::Brick(brick) => Some(brick),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<&Item> {
        match &self.kind {
            EntityKind::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_bullet(&self) -> Option<&Bullet> {
        match &self.kind {
            EntityKind::Bullet(bullet) => Some(bullet),
            _ => None,
        }
    }

    /// Apply one hit to a brick. Returns true when this call destroyed it.
    /// No-op on non-bricks and on already-destroyed bricks, so destruction
    /// is idempotent and reward side effects cannot double-fire.
    pub fn hit(&mut self, damage: u8) -> bool {
        if self.destroyed {
            return false;
        }
        let EntityKind::Brick(brick) = &mut self.kind else {
            return false;
        };
        brick.hp = brick.hp.saturating_sub(damage);
        brick.hit_flash = 1.0;
        if brick.hp == 0 {
            self.destroy();
            true
        } else {
            brick.shake_ticks = 12;
            false
        }
    }

    /// Re-attach a ball to the paddle, clearing its trail and motion
    pub fn attach_ball(&mut self) {
        if let EntityKind::Ball(ball) = &mut self.kind {
            ball.attached = true;
            ball.trail.clear();
            if let Some(body) = &mut self.body {
                body.vel = Vec2::ZERO;
            }
        }
    }

    /// Launch an attached ball along `dir`. A zero-length direction falls
    /// back to straight up rather than producing NaN velocity.
    pub fn launch_ball(&mut self, dir: Vec2) {
        let EntityKind::Ball(ball) = &mut self.kind else {
            return;
        };
        if !ball.attached {
            return;
        }
        ball.attached = false;
        let dir = if dir.length_squared() < 1e-6 {
            Vec2::new(0.0, -1.0)
        } else {
            dir.normalize()
        };
        if let Some(body) = &mut self.body {
            body.vel = dir * ball.speed;
        }
    }

    /// Per-entity update, run once per tick for active non-destroyed
    /// entities after the systems pass
    pub fn update(&mut self, ctx: &UpdateCtx<'_>) {
        match &mut self.kind {
            EntityKind::Ball(_) => self.update_ball(ctx),
            EntityKind::Paddle(_) => self.update_paddle(ctx),
            EntityKind::Brick(brick) => {
                brick.shake_ticks = brick.shake_ticks.saturating_sub(1);
                brick.hit_flash = (brick.hit_flash - ctx.dt * 3.0).max(0.0);
            }
            EntityKind::Bullet(_) => {
                if self.bounds().bottom < 0.0 {
                    self.destroy();
                }
            }
            EntityKind::Item(_) => {
                if self.bounds().top > ctx.field.height {
                    self.destroy();
                }
            }
            EntityKind::Particle(particle) => {
                particle.life -= ctx.dt;
                particle.size *= 0.99;
                if particle.life <= 0.0 {
                    self.destroy();
                }
            }
            EntityKind::Wall => {}
        }
    }

    fn update_ball(&mut self, ctx: &UpdateCtx<'_>) {
        let pos = self.pos;
        let size = self.size;
        let EntityKind::Ball(ball) = &mut self.kind else {
            return;
        };

        if ball.attached {
            if let Some(paddle) = ctx.paddle {
                self.pos = Vec2::new(
                    paddle.center_x() - size.x / 2.0,
                    paddle.pos.y - size.y,
                );
            }
            ball.trail.clear();
            return;
        }

        ball.record_trail(pos + size / 2.0);
        ball.piercing_ticks = ball.piercing_ticks.saturating_sub(1);

        // Past the loss boundary
        if pos.y > ctx.field.height {
            self.destroy();
        }
    }

    fn update_paddle(&mut self, ctx: &UpdateCtx<'_>) {
        let width = self.size.x;
        let EntityKind::Paddle(paddle) = &mut self.kind else {
            return;
        };

        // Poll directional intent
        let mut direction = 0.0;
        if ctx.input.left_pressed() {
            direction -= 1.0;
        }
        if ctx.input.right_pressed() {
            direction += 1.0;
        }
        if direction != 0.0 {
            paddle.target_x += direction * paddle.effective_speed() * ctx.dt * 60.0;
        }
        if let Some(pointer) = ctx.input.pointer() {
            paddle.target_x = pointer.x - width / 2.0;
        }

        paddle.target_x = paddle.target_x.clamp(0.0, ctx.field.width - width);

        // Smoothed approach toward the target
        self.pos.x += (paddle.target_x - self.pos.x) * 0.2;
        self.pos.x = self.pos.x.clamp(0.0, ctx.field.width - width);

        // Expire timed modifiers exactly once
        if paddle.speed_boost.is_some_and(|m| ctx.now >= m.expires_at) {
            paddle.speed_boost = None;
        }
        if let Some(widen) = paddle.widen
            && ctx.now >= widen.expires_at
        {
            paddle.widen = None;
            self.size.x -= widen.delta;
            self.pos.x += widen.delta / 2.0;
        }
    }

    /// Widen the paddle until `expires_at`, keeping its center fixed
    pub fn apply_widen(&mut self, delta: f32, expires_at: u64) {
        let EntityKind::Paddle(paddle) = &mut self.kind else {
            return;
        };
        // Refreshing an active widen only extends the deadline
        match &mut paddle.widen {
            Some(modifier) => modifier.expires_at = expires_at,
            None => {
                paddle.widen = Some(Modifier { delta, expires_at });
                self.size.x += delta;
                self.pos.x -= delta / 2.0;
            }
        }
    }
}

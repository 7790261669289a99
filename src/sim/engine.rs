//! Game loop and state machine
//!
//! Owns the entity registry and the systems, and drives the fixed per-tick
//! sequence: clamp delta time, run the systems in registration order
//! (physics, collision, input, audio), run per-entity updates, sweep
//! destroyed entities, detect and dispatch collisions, then evaluate
//! win/loss. Collision detection always runs after physics-driven
//! movement, so a frame's render never observes partially-integrated
//! state.
//!
//! All collaborator dependencies are handed in once at construction and
//! threaded through the tick explicitly - no ambient globals.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::config::GameConfig;
use crate::consts::*;
use crate::error::{ConfigError, HandlerFault};
use crate::platform::{AudioSink, InputSource, Persistence, SoundCue};
use crate::progress::Progress;

use super::collision::{
    CollisionHandler, CollisionRecord, CollisionSystem, Contact, HandlerCtx, Side,
};
use super::entity::{
    BrickKind, CapabilityKind, Entity, EntityId, EntityType, ItemKind, Magnet, PaddleSnapshot,
    Shield, UpdateCtx, render_priority,
};
use super::events::{EventBus, EventListener, GameEvent, ListenerId};
use super::grid::SpatialGrid;
use super::physics::PhysicsSystem;
use super::registry::EntityRegistry;

/// Top-level game states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Menu,
    Playing,
    Paused,
    GameOver,
    StageClear,
    RoundClear,
}

/// External collaborators, constructed once and passed in
pub struct Collaborators {
    pub persistence: Box<dyn Persistence>,
    pub input: Box<dyn InputSource>,
    pub audio: Box<dyn AudioSink>,
}

impl Collaborators {
    /// No-op collaborators for tests and headless runs
    pub fn null() -> Self {
        use crate::platform::{NullAudio, NullInput, NullPersistence};
        Self {
            persistence: Box::new(NullPersistence),
            input: Box::new(NullInput),
            audio: Box::new(NullAudio),
        }
    }
}

pub struct GameEngine {
    config: GameConfig,
    phase: GamePhase,
    registry: EntityRegistry,
    grid: SpatialGrid,
    physics: PhysicsSystem,
    collision: CollisionSystem,
    bus: EventBus,
    progress: Progress,
    rng: Pcg32,
    time_ticks: u64,
    running: bool,
    fire_cooldown: u32,
    prev_fire: bool,
    /// Records from the most recent collision pass (debug/render overlay)
    last_collisions: Vec<CollisionRecord>,
    persistence: Box<dyn Persistence>,
    input: Box<dyn InputSource>,
    audio: Box<dyn AudioSink>,
}

impl GameEngine {
    /// Build an engine. Configuration problems are the only fatal error
    /// class and abort here, before the loop ever starts.
    pub fn new(
        config: GameConfig,
        collaborators: Collaborators,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut engine = Self {
            grid: SpatialGrid::new(config.cell_size),
            physics: PhysicsSystem {
                frame_interval: config.frame_interval,
                ..PhysicsSystem::default()
            },
            config,
            phase: GamePhase::Menu,
            registry: EntityRegistry::new(),
            collision: CollisionSystem::new(),
            bus: EventBus::new(),
            progress: Progress::default(),
            rng: Pcg32::seed_from_u64(seed),
            time_ticks: 0,
            running: false,
            fire_cooldown: 0,
            prev_fire: false,
            last_collisions: Vec::new(),
            persistence: collaborators.persistence,
            input: collaborators.input,
            audio: collaborators.audio,
        };
        engine.register_default_handlers();
        Ok(engine)
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn time_ticks(&self) -> u64 {
        self.time_ticks
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        self.registry.register(entity)
    }

    /// Mark an entity terminal; the end-of-tick sweep removes it
    pub fn remove_entity(&mut self, id: EntityId) {
        self.registry.destroy(id);
    }

    pub fn last_collisions(&self) -> &[CollisionRecord] {
        &self.last_collisions
    }

    pub fn subscribe(&mut self, listener: EventListener) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Wire a gameplay response for a collision type pair
    pub fn register_handler(&mut self, a: EntityType, b: EntityType, handler: CollisionHandler) {
        self.collision.register_handler(a, b, handler);
    }

    /// Arm the loop. The host scheduler keeps calling `tick` while
    /// `is_running` holds.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Prevent the next continuation from being armed. Entity state is
    /// preserved across a stop/start gap, but never mid-tick.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// External pause/resume toggle
    pub fn toggle_pause(&mut self) {
        match self.phase {
            GamePhase::Playing => self.set_phase(GamePhase::Paused),
            GamePhase::Paused => self.set_phase(GamePhase::Playing),
            _ => {}
        }
    }

    /// Advance to the next stage layout after a stage/round clear
    pub fn advance_stage(&mut self) {
        if !matches!(self.phase, GamePhase::StageClear | GamePhase::RoundClear) {
            return;
        }
        self.registry.clear();
        self.set_phase(GamePhase::Playing);
    }

    /// Back to the menu for a fresh run
    pub fn restart(&mut self) {
        self.progress = Progress::default();
        self.progress.lives = self.config.initial_lives;
        self.set_phase(GamePhase::Menu);
    }

    /// Transition the state machine, emitting the state-change
    /// notification and running entry side effects
    pub fn set_phase(&mut self, new: GamePhase) {
        if new == self.phase {
            return;
        }
        let old = self.phase;
        self.phase = new;
        self.bus.emit(&GameEvent::StateChange { old, new });

        match new {
            GamePhase::Menu => {
                self.registry.clear();
            }
            GamePhase::Playing => {
                if old == GamePhase::Menu {
                    self.progress = Progress::load(self.persistence.as_ref());
                    if self.progress.lives == 0 {
                        // A dead save starts a fresh run
                        self.progress.lives = self.config.initial_lives;
                    }
                }
                if self.registry.by_type(EntityType::Paddle).next().is_none() {
                    self.seed_playfield();
                }
            }
            GamePhase::Paused => {
                self.bus.emit(&GameEvent::Pause);
            }
            GamePhase::GameOver => {
                self.audio.play(SoundCue::GameOver);
                self.bus.emit(&GameEvent::GameOver);
                self.progress.save(self.persistence.as_mut());
            }
            GamePhase::StageClear => {
                self.bus.emit(&GameEvent::StageClear);
                self.progress.save(self.persistence.as_mut());
            }
            GamePhase::RoundClear => {
                self.bus.emit(&GameEvent::RoundClear);
                self.progress.save(self.persistence.as_mut());
            }
        }
    }

    /// Entities in render order: visible, active, non-destroyed, sorted by
    /// type priority then id
    pub fn render_order(&self) -> Vec<&Entity> {
        let mut out: Vec<&Entity> = self
            .registry
            .iter()
            .filter(|e| e.visible && e.active && !e.destroyed)
            .collect();
        out.sort_by_key(|e| (render_priority(e.entity_type()), e.id));
        out
    }

    /// Advance the simulation by one tick. The sequence is fixed; no phase
    /// may be reordered.
    pub fn tick(&mut self, dt: f32) {
        let dt = dt.min(self.config.frame_interval);
        if self.phase != GamePhase::Playing {
            return;
        }
        self.time_ticks += 1;

        // Systems, in registration order. The collision system's per-tick
        // slot is empty - detection runs in its dedicated phase below -
        // and audio is purely event-driven.
        self.physics
            .update(&mut self.registry, self.config.field(), dt);
        self.update_input();

        // Per-entity updates
        self.update_entities(dt);

        // Destroyed entities leave the registry here; nothing below this
        // line can observe them
        self.registry.sweep();

        // Collision detection and dispatch
        self.run_collisions();

        // Win/loss evaluation
        self.evaluate_state();
    }

    fn paddle_snapshot(&self) -> Option<PaddleSnapshot> {
        self.registry
            .by_type(EntityType::Paddle)
            .find(|e| e.active && !e.destroyed)
            .map(|e| PaddleSnapshot {
                pos: e.pos,
                size: e.size,
            })
    }

    /// Poll fire intent: launch attached balls on a fresh press, otherwise
    /// shoot a bullet from the paddle under the fire cooldown
    fn update_input(&mut self) {
        self.fire_cooldown = self.fire_cooldown.saturating_sub(1);
        let fire = self.input.fire_pressed();
        let rising = fire && !self.prev_fire;
        self.prev_fire = fire;
        if !fire {
            return;
        }

        let attached: Vec<EntityId> = self
            .registry
            .by_type(EntityType::Ball)
            .filter(|e| e.active && !e.destroyed)
            .filter(|e| e.as_ball().is_some_and(|b| b.attached))
            .map(|e| e.id)
            .collect();

        if !attached.is_empty() {
            if rising {
                // Launch roughly upward with a little deterministic spread
                let angle = (self.rng.random::<f32>() - 0.5) * std::f32::consts::FRAC_PI_3;
                for id in attached {
                    if let Some(ball) = self.registry.get_mut(id) {
                        ball.launch_ball(Vec2::new(angle.sin(), -angle.cos()));
                    }
                }
                self.audio.play(SoundCue::Launch);
            }
            return;
        }

        if self.fire_cooldown == 0
            && let Some(paddle) = self.paddle_snapshot()
        {
            let bullet = Entity::bullet(
                paddle.center_x(),
                paddle.pos.y - BULLET_HEIGHT,
            );
            self.registry.register(bullet);
            self.fire_cooldown = self.config.fire_cooldown_ticks;
        }
    }

    fn update_entities(&mut self, dt: f32) {
        let paddle = self.paddle_snapshot();
        let Self {
            registry,
            input,
            config,
            time_ticks,
            ..
        } = self;
        let ctx = UpdateCtx {
            dt,
            now: *time_ticks,
            field: config.field(),
            input: input.as_ref(),
            paddle,
        };
        for entity in registry.iter_mut() {
            if entity.active && !entity.destroyed {
                entity.update(&ctx);
            }
        }
    }

    fn run_collisions(&mut self) {
        self.grid.rebuild(&self.registry);
        let records = self.collision.detect(
            &self.registry,
            &self.grid,
            self.config.field(),
            self.config.max_deflect_angle,
        );

        let mut spawns = Vec::new();
        {
            let Self {
                registry,
                progress,
                audio,
                rng,
                config,
                collision,
                time_ticks,
                ..
            } = self;
            let mut ctx = HandlerCtx {
                registry,
                progress,
                audio: audio.as_mut(),
                rng,
                spawns: &mut spawns,
                config,
                now: *time_ticks,
            };
            collision.dispatch(&records, &mut ctx);
        }
        for entity in spawns {
            self.registry.register(entity);
        }
        self.last_collisions = records;
    }

    /// Win/loss rules, evaluated once per tick after collision dispatch
    fn evaluate_state(&mut self) {
        if self.phase != GamePhase::Playing {
            return;
        }

        if self.registry.count_live(EntityType::Brick) == 0 {
            let round_done = self.progress.stage >= self.config.stages_per_round;
            if round_done {
                self.progress.round += 1;
                self.progress.stage = 1;
            } else {
                self.progress.stage += 1;
            }
            self.set_phase(if round_done {
                GamePhase::RoundClear
            } else {
                GamePhase::StageClear
            });
            return;
        }

        if self.registry.count_live(EntityType::Ball) == 0 {
            if self.consume_shield() {
                self.spawn_attached_ball();
                return;
            }
            if self.progress.lives > 0 {
                self.progress.lives -= 1;
                let remaining = self.progress.lives;
                self.spawn_attached_ball();
                self.audio.play(SoundCue::LifeLost);
                self.bus.emit(&GameEvent::LifeLost { remaining });
                self.progress.save(self.persistence.as_mut());
            } else {
                self.set_phase(GamePhase::GameOver);
            }
        }
    }

    /// Spend one shield charge if the paddle carries one
    fn consume_shield(&mut self) -> bool {
        let paddle_id = self
            .registry
            .by_type(EntityType::Paddle)
            .find(|e| e.caps.shield().is_some_and(|s| s.charges > 0))
            .map(|e| e.id);
        let Some(id) = paddle_id else {
            return false;
        };
        if let Some(paddle) = self.registry.get_mut(id)
            && let Some(shield) = paddle.caps.shield_mut()
        {
            shield.charges -= 1;
            if shield.charges == 0 {
                paddle.caps.detach(CapabilityKind::Shield);
            }
            return true;
        }
        false
    }

    fn spawn_attached_ball(&mut self) {
        let field = self.config.field();
        let center = match self.paddle_snapshot() {
            Some(paddle) => Vec2::new(
                paddle.center_x(),
                paddle.pos.y - BALL_RADIUS,
            ),
            None => Vec2::new(field.width / 2.0, field.height / 2.0),
        };
        self.registry
            .register(Entity::ball(center, BALL_RADIUS, BALL_SPEED));
    }

    /// Seed the paddle, an attached ball, the boundary wall and the stage's
    /// brick layout
    fn seed_playfield(&mut self) {
        let field = self.config.field();
        log::info!(
            "seeding playfield for round {} stage {}",
            self.progress.round,
            self.progress.stage
        );

        self.registry.register(Entity::wall(field));

        let paddle_pos = Vec2::new(
            field.width / 2.0 - PADDLE_WIDTH / 2.0,
            field.height - PADDLE_MARGIN,
        );
        self.registry
            .register(Entity::paddle(paddle_pos, PADDLE_WIDTH, PADDLE_HEIGHT));

        self.spawn_attached_ball();

        let stage = self.progress.stage;
        let rows = (2 + stage as usize).min(6);
        let cols = 10;
        self.create_bricks(rows, cols);
    }

    /// Lay out the brick grid, centered horizontally
    fn create_bricks(&mut self, rows: usize, cols: usize) {
        let field = self.config.field();
        let stride_x = BRICK_WIDTH + BRICK_PADDING;
        let stride_y = BRICK_HEIGHT + BRICK_PADDING;
        let offset_x = (field.width - cols as f32 * stride_x + BRICK_PADDING) / 2.0;

        let stage = self.progress.stage;
        for row in 0..rows {
            for col in 0..cols {
                let pos = Vec2::new(
                    offset_x + col as f32 * stride_x,
                    BRICK_TOP_OFFSET + row as f32 * stride_y,
                );
                let kind = brick_kind_for(stage, row, col);
                self.registry
                    .register(Entity::brick(pos, BRICK_WIDTH, BRICK_HEIGHT, kind));
            }
        }
    }

    fn register_default_handlers(&mut self) {
        self.collision.register_handler(
            EntityType::Ball,
            EntityType::Paddle,
            Box::new(handle_ball_paddle),
        );
        self.collision.register_handler(
            EntityType::Ball,
            EntityType::Brick,
            Box::new(handle_ball_brick),
        );
        self.collision.register_handler(
            EntityType::Ball,
            EntityType::Wall,
            Box::new(handle_ball_wall),
        );
        self.collision.register_handler(
            EntityType::Bullet,
            EntityType::Brick,
            Box::new(handle_bullet_brick),
        );
        self.collision.register_handler(
            EntityType::Item,
            EntityType::Paddle,
            Box::new(handle_item_paddle),
        );
    }
}

/// Brick kind by stage and grid position. Later stages mix in tougher and
/// special bricks.
fn brick_kind_for(stage: u32, row: usize, col: usize) -> BrickKind {
    let mix = row + col + stage as usize;
    match stage {
        1 => BrickKind::Normal,
        2 => {
            if mix % 4 == 0 {
                BrickKind::Strong
            } else {
                BrickKind::Normal
            }
        }
        3 => {
            if row == 0 && col % 3 == 0 {
                BrickKind::Metal
            } else if mix % 3 == 0 {
                BrickKind::Strong
            } else {
                BrickKind::Glass
            }
        }
        _ => match mix % 8 {
            0 => BrickKind::Metal,
            1 | 4 => BrickKind::Strong,
            2 => BrickKind::Bomb,
            6 => BrickKind::Bonus,
            3 | 5 => BrickKind::Glass,
            _ => BrickKind::Normal,
        },
    }
}

fn handle_ball_paddle(
    ctx: &mut HandlerCtx<'_>,
    record: &CollisionRecord,
) -> Result<(), HandlerFault> {
    let Contact::BallPaddle { angle } = record.contact else {
        return Err(HandlerFault::new("ball-paddle record with wrong contact"));
    };
    let paddle = ctx
        .registry
        .get(record.b)
        .ok_or_else(|| HandlerFault::new("paddle vanished before dispatch"))?;
    let paddle_top = paddle.bounds().top;
    let magnet_active = paddle.caps.magnet().is_some_and(|m| m.catches > 0);

    let ball = ctx
        .registry
        .get_mut(record.a)
        .ok_or_else(|| HandlerFault::new("ball vanished before dispatch"))?;
    // Rest the ball on the paddle's top edge so it cannot sink in
    ball.pos.y = paddle_top - ball.size.y;

    if magnet_active {
        ball.attach_ball();
        if let Some(paddle) = ctx.registry.get_mut(record.b)
            && let Some(magnet) = paddle.caps.magnet_mut()
        {
            magnet.catches -= 1;
            if magnet.catches == 0 {
                paddle.caps.detach(CapabilityKind::Magnet);
            }
        }
        ctx.audio.play(SoundCue::PaddleHit);
        return Ok(());
    }

    let speed = ball.as_ball().map_or(BALL_SPEED, |b| b.speed);
    if let Some(body) = &mut ball.body {
        body.vel.x = angle.sin() * speed;
        body.vel.y = -body.vel.y.abs();
    }
    ctx.audio.play(SoundCue::PaddleHit);
    Ok(())
}

fn handle_ball_brick(
    ctx: &mut HandlerCtx<'_>,
    record: &CollisionRecord,
) -> Result<(), HandlerFault> {
    let Contact::BallBrick { side, .. } = record.contact else {
        return Err(HandlerFault::new("ball-brick record with wrong contact"));
    };

    let piercing = ctx
        .registry
        .get(record.a)
        .and_then(Entity::as_ball)
        .is_some_and(|b| b.piercing());

    if !piercing
        && let Some(ball) = ctx.registry.get_mut(record.a)
        && let Some(body) = &mut ball.body
    {
        match side {
            Side::Left => body.vel.x = -body.vel.x.abs(),
            Side::Right => body.vel.x = body.vel.x.abs(),
            Side::Top => body.vel.y = -body.vel.y.abs(),
            Side::Bottom => body.vel.y = body.vel.y.abs(),
        }
    }

    damage_brick(ctx, record.b, 1)
}

fn handle_ball_wall(
    ctx: &mut HandlerCtx<'_>,
    record: &CollisionRecord,
) -> Result<(), HandlerFault> {
    let Contact::BallWall { side } = record.contact else {
        return Err(HandlerFault::new("ball-wall record with wrong contact"));
    };
    let field = ctx.config.field();
    let ball = ctx
        .registry
        .get_mut(record.a)
        .ok_or_else(|| HandlerFault::new("ball vanished before dispatch"))?;
    let size = ball.size;
    if let Some(body) = &mut ball.body {
        match side {
            Side::Left => {
                ball.pos.x = 0.0;
                body.vel.x = body.vel.x.abs();
            }
            Side::Right => {
                ball.pos.x = field.width - size.x;
                body.vel.x = -body.vel.x.abs();
            }
            Side::Top => {
                ball.pos.y = 0.0;
                body.vel.y = body.vel.y.abs();
            }
            // No bottom wall exists; a bottom record would be a classifier bug
            Side::Bottom => {
                return Err(HandlerFault::new("ball-wall record for the open edge"));
            }
        }
    }
    ctx.audio.play(SoundCue::WallBounce);
    Ok(())
}

fn handle_bullet_brick(
    ctx: &mut HandlerCtx<'_>,
    record: &CollisionRecord,
) -> Result<(), HandlerFault> {
    let damage = ctx
        .registry
        .get(record.a)
        .and_then(Entity::as_bullet)
        .map_or(1, |b| b.damage);
    ctx.registry.destroy(record.a);
    damage_brick(ctx, record.b, damage)
}

fn handle_item_paddle(
    ctx: &mut HandlerCtx<'_>,
    record: &CollisionRecord,
) -> Result<(), HandlerFault> {
    let kind = ctx
        .registry
        .get(record.a)
        .and_then(Entity::as_item)
        .ok_or_else(|| HandlerFault::new("item vanished before dispatch"))?
        .kind;
    ctx.registry.destroy(record.a);

    match kind {
        ItemKind::Life => {
            ctx.progress.lives += 1;
        }
        ItemKind::Coin => {
            ctx.progress.add_coins(25);
        }
        ItemKind::MultiBall => {
            let clones: Vec<Entity> = ctx
                .registry
                .by_type(EntityType::Ball)
                .filter(|e| {
                    !e.destroyed && e.as_ball().is_some_and(|b| !b.attached)
                })
                .map(|e| {
                    let mut clone = e.clone();
                    if let Some(ball) = clone.as_ball_mut() {
                        ball.trail.clear();
                    }
                    if let Some(body) = &mut clone.body {
                        body.vel.x = -body.vel.x;
                    }
                    clone
                })
                .collect();
            ctx.spawns.extend(clones);
        }
        ItemKind::Widen => {
            let expires_at = ctx.now + MODIFIER_DURATION_TICKS;
            if let Some(paddle) = ctx.registry.get_mut(record.b) {
                paddle.apply_widen(WIDEN_DELTA, expires_at);
            }
        }
        ItemKind::Boost => {
            let expires_at = ctx.now + MODIFIER_DURATION_TICKS;
            if let Some(paddle) = ctx
                .registry
                .get_mut(record.b)
                .and_then(Entity::as_paddle_mut)
            {
                paddle.speed_boost = Some(super::entity::Modifier {
                    delta: SPEED_BOOST_DELTA,
                    expires_at,
                });
            }
        }
        ItemKind::Shield => {
            if let Some(paddle) = ctx.registry.get_mut(record.b) {
                paddle.caps.attach_shield(Shield { charges: 1 });
            }
        }
        ItemKind::Magnet => {
            if let Some(paddle) = ctx.registry.get_mut(record.b) {
                paddle.caps.attach_magnet(Magnet { catches: 3 });
            }
        }
        ItemKind::Piercing => {
            let ball_ids: Vec<EntityId> = ctx
                .registry
                .by_type(EntityType::Ball)
                .map(|e| e.id)
                .collect();
            for id in ball_ids {
                if let Some(ball) = ctx.registry.get_mut(id).and_then(Entity::as_ball_mut) {
                    ball.piercing_ticks = PIERCING_DURATION_TICKS;
                }
            }
        }
    }

    ctx.audio.play(SoundCue::ItemPickup);
    Ok(())
}

/// Apply damage to a brick, paying out score/coins/item drops exactly once
/// when this hit destroys it
fn damage_brick(
    ctx: &mut HandlerCtx<'_>,
    brick_id: EntityId,
    damage: u8,
) -> Result<(), HandlerFault> {
    let brick = ctx
        .registry
        .get_mut(brick_id)
        .ok_or_else(|| HandlerFault::new("brick vanished before dispatch"))?;
    let center = brick.center();
    let (kind, points) = brick
        .as_brick()
        .map(|b| (b.kind, b.points))
        .ok_or_else(|| HandlerFault::new("brick record on a non-brick"))?;

    if !brick.hit(damage) {
        ctx.audio.play(SoundCue::BrickHit);
        return Ok(());
    }

    ctx.progress.add_score(points);
    ctx.audio.play(SoundCue::BrickBreak);

    if ctx.rng.random::<f64>() < ctx.config.coin_drop_chance {
        let coins = if kind == BrickKind::Bonus { 50 } else { 10 };
        ctx.progress.add_coins(coins);
    }

    if ctx.rng.random::<f64>() < ctx.config.item_drop_chance {
        const DROPS: [ItemKind; 8] = [
            ItemKind::Life,
            ItemKind::MultiBall,
            ItemKind::Widen,
            ItemKind::Coin,
            ItemKind::Boost,
            ItemKind::Shield,
            ItemKind::Magnet,
            ItemKind::Piercing,
        ];
        let kind = DROPS[ctx.rng.random_range(0..DROPS.len())];
        ctx.spawns.push(Entity::item(center, kind));
    }

    let particles = if kind == BrickKind::Bomb { 20 } else { 8 };
    spawn_particles(ctx, center, kind as u32, particles);
    Ok(())
}

/// Spawn a burst of particles, evicting the oldest live particles beyond
/// the configured cap. The cap is policy, not physics: unbounded particle
/// growth is the one resource the core must bound itself.
fn spawn_particles(ctx: &mut HandlerCtx<'_>, origin: Vec2, color: u32, count: usize) {
    let cap = ctx.config.max_particles;
    let pending = ctx
        .spawns
        .iter()
        .filter(|e| e.entity_type() == EntityType::Particle)
        .count();
    let live: Vec<EntityId> = ctx
        .registry
        .by_type(EntityType::Particle)
        .filter(|e| !e.destroyed)
        .map(|e| e.id)
        .collect();

    // Evict oldest first until the burst fits, then shrink the burst to
    // whatever room remains
    let mut occupied = live.len() + pending;
    let mut evictable = live.into_iter();
    while occupied + count > cap {
        let Some(id) = evictable.next() else { break };
        ctx.registry.destroy(id);
        occupied -= 1;
    }
    let count = count.min(cap.saturating_sub(occupied));

    for i in 0..count {
        let angle = std::f32::consts::TAU * i as f32 / count as f32;
        let speed = ctx.rng.random_range(1.0f32..3.0);
        let vel = Vec2::new(angle.cos() * speed, angle.sin() * speed - 1.5);
        let life = ctx.rng.random_range(0.4f32..1.0);
        let size = ctx.rng.random_range(2.0f32..5.0);
        ctx.spawns
            .push(Entity::particle(origin, vel, color, life, size));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{InputState, MemoryStore, NullAudio, SharedInput};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn playing_engine() -> GameEngine {
        playing_engine_with(GameConfig::default())
    }

    fn playing_engine_with(config: GameConfig) -> GameEngine {
        let mut engine = GameEngine::new(config, Collaborators::null(), 42).unwrap();
        engine.set_phase(GamePhase::Playing);
        engine
    }

    fn engine_with_saved_progress(progress: Progress) -> GameEngine {
        let mut store = MemoryStore::new();
        progress.save(&mut store);
        let collaborators = Collaborators {
            persistence: Box::new(store),
            input: Box::new(crate::platform::NullInput),
            audio: Box::new(NullAudio),
        };
        let mut engine = GameEngine::new(GameConfig::default(), collaborators, 42).unwrap();
        engine.set_phase(GamePhase::Playing);
        engine
    }

    fn collect_events(engine: &mut GameEngine) -> Rc<RefCell<Vec<GameEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        engine.subscribe(Box::new(move |event| {
            sink.borrow_mut().push(*event);
            Ok(())
        }));
        events
    }

    /// Free the seeded ball and park it at `center` with the given velocity
    fn place_free_ball(engine: &mut GameEngine, center: Vec2, vel: Vec2) -> EntityId {
        let id = engine
            .registry()
            .by_type(EntityType::Ball)
            .next()
            .unwrap()
            .id;
        let ball = engine.registry_mut().get_mut(id).unwrap();
        ball.launch_ball(Vec2::new(0.0, -1.0));
        ball.pos = center - ball.size / 2.0;
        ball.body.as_mut().unwrap().vel = vel;
        id
    }

    fn destroy_all(engine: &mut GameEngine, entity_type: EntityType) {
        let ids: Vec<EntityId> = engine
            .registry()
            .by_type(entity_type)
            .map(|e| e.id)
            .collect();
        for id in ids {
            engine.remove_entity(id);
        }
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = GameConfig {
            cell_size: -1.0,
            ..Default::default()
        };
        assert!(GameEngine::new(config, Collaborators::null(), 1).is_err());
    }

    #[test]
    fn test_playing_entry_seeds_playfield() {
        let engine = playing_engine();
        assert_eq!(engine.registry().by_type(EntityType::Paddle).count(), 1);
        assert_eq!(engine.registry().by_type(EntityType::Wall).count(), 1);
        assert!(engine.registry().by_type(EntityType::Brick).count() > 0);

        let ball = engine
            .registry()
            .by_type(EntityType::Ball)
            .next()
            .unwrap();
        assert!(ball.as_ball().unwrap().attached);
    }

    #[test]
    fn test_menu_entry_clears_entities() {
        let mut engine = playing_engine();
        assert!(!engine.registry().is_empty());
        engine.set_phase(GamePhase::Menu);
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_pause_freezes_ticks() {
        let mut engine = playing_engine();
        engine.tick(FRAME_DT);
        assert_eq!(engine.time_ticks(), 1);

        engine.toggle_pause();
        assert_eq!(engine.phase(), GamePhase::Paused);
        engine.tick(FRAME_DT);
        assert_eq!(engine.time_ticks(), 1);

        engine.toggle_pause();
        assert_eq!(engine.phase(), GamePhase::Playing);
        engine.tick(FRAME_DT);
        assert_eq!(engine.time_ticks(), 2);
    }

    #[test]
    fn test_stage_clear_exactly_once() {
        let mut engine = playing_engine();
        let events = collect_events(&mut engine);

        destroy_all(&mut engine, EntityType::Brick);
        engine.tick(FRAME_DT);
        assert_eq!(engine.phase(), GamePhase::StageClear);
        assert_eq!(engine.progress().stage, 2);

        let changes: Vec<GameEvent> = events
            .borrow()
            .iter()
            .filter(|e| matches!(e, GameEvent::StateChange { .. }))
            .copied()
            .collect();
        assert_eq!(
            changes,
            vec![GameEvent::StateChange {
                old: GamePhase::Playing,
                new: GamePhase::StageClear,
            }]
        );
        assert_eq!(
            events
                .borrow()
                .iter()
                .filter(|e| matches!(e, GameEvent::StageClear))
                .count(),
            1
        );

        // Further ticks in StageClear change nothing
        engine.tick(FRAME_DT);
        assert_eq!(engine.phase(), GamePhase::StageClear);
        assert_eq!(
            events
                .borrow()
                .iter()
                .filter(|e| matches!(e, GameEvent::StateChange { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_round_clear_after_last_stage() {
        let config = GameConfig {
            stages_per_round: 1,
            ..Default::default()
        };
        let mut engine = playing_engine_with(config);
        destroy_all(&mut engine, EntityType::Brick);
        engine.tick(FRAME_DT);
        assert_eq!(engine.phase(), GamePhase::RoundClear);
        assert_eq!(engine.progress().round, 2);
        assert_eq!(engine.progress().stage, 1);
    }

    #[test]
    fn test_advance_stage_reseeds() {
        let mut engine = playing_engine();
        destroy_all(&mut engine, EntityType::Brick);
        engine.tick(FRAME_DT);
        assert_eq!(engine.phase(), GamePhase::StageClear);

        engine.advance_stage();
        assert_eq!(engine.phase(), GamePhase::Playing);
        assert!(engine.registry().by_type(EntityType::Brick).count() > 0);
    }

    #[test]
    fn test_life_loss_respawns_attached_ball() {
        let mut engine = engine_with_saved_progress(Progress {
            lives: 2,
            ..Default::default()
        });
        let events = collect_events(&mut engine);
        assert_eq!(engine.progress().lives, 2);

        destroy_all(&mut engine, EntityType::Ball);
        engine.tick(FRAME_DT);

        assert_eq!(engine.phase(), GamePhase::Playing);
        assert_eq!(engine.progress().lives, 1);
        let ball = engine
            .registry()
            .by_type(EntityType::Ball)
            .next()
            .expect("a new ball spawns");
        assert!(ball.as_ball().unwrap().attached);
        assert!(
            events
                .borrow()
                .contains(&GameEvent::LifeLost { remaining: 1 })
        );
    }

    #[test]
    fn test_game_over_when_out_of_lives() {
        let mut engine = engine_with_saved_progress(Progress {
            lives: 1,
            ..Default::default()
        });

        destroy_all(&mut engine, EntityType::Ball);
        engine.tick(FRAME_DT);
        assert_eq!(engine.phase(), GamePhase::Playing);
        assert_eq!(engine.progress().lives, 0);

        destroy_all(&mut engine, EntityType::Ball);
        engine.tick(FRAME_DT);
        assert_eq!(engine.phase(), GamePhase::GameOver);
        // No ball spawns on the losing evaluation
        assert_eq!(engine.registry().count_live(EntityType::Ball), 0);

        // GameOver is terminal until an external restart
        engine.tick(FRAME_DT);
        assert_eq!(engine.phase(), GamePhase::GameOver);
        engine.restart();
        assert_eq!(engine.phase(), GamePhase::Menu);
    }

    #[test]
    fn test_wall_reflection_through_tick() {
        let mut engine = playing_engine();
        let id = place_free_ball(
            &mut engine,
            Vec2::new(5.0, 300.0),
            Vec2::new(-3.0, 0.0),
        );
        engine.tick(FRAME_DT);

        let ball = engine.registry().get(id).unwrap();
        assert!(ball.body.as_ref().unwrap().vel.x >= 0.0);
        assert!(ball.center().x >= BALL_RADIUS);
    }

    #[test]
    fn test_paddle_center_bounce() {
        let mut engine = playing_engine();
        let paddle = engine
            .registry()
            .by_type(EntityType::Paddle)
            .next()
            .unwrap();
        let paddle_center_x = paddle.center().x;
        let paddle_top = paddle.bounds().top;

        let id = place_free_ball(
            &mut engine,
            Vec2::new(paddle_center_x, paddle_top - BALL_RADIUS),
            Vec2::new(0.0, 2.0),
        );
        engine.tick(FRAME_DT);

        let body = engine.registry().get(id).unwrap().body.as_ref().unwrap();
        assert!(body.vel.x.abs() < 1e-4);
        assert!((body.vel.y - (-2.0)).abs() < 1e-4);
    }

    #[test]
    fn test_brick_destruction_rewards_once() {
        let config = GameConfig {
            item_drop_chance: 0.0,
            coin_drop_chance: 0.0,
            ..Default::default()
        };
        let mut engine = playing_engine_with(config);
        let brick = engine
            .registry()
            .by_type(EntityType::Brick)
            .next()
            .unwrap();
        let brick_id = brick.id;
        let brick_center = brick.center();
        let points = brick.as_brick().unwrap().points;

        place_free_ball(&mut engine, brick_center, Vec2::ZERO);
        engine.tick(FRAME_DT);
        assert_eq!(engine.progress().score, u64::from(points));
        assert!(engine.registry().get(brick_id).unwrap().destroyed);

        // The destroyed brick cannot award again
        engine.tick(FRAME_DT);
        assert_eq!(engine.progress().score, u64::from(points));
    }

    #[test]
    fn test_sweep_invariant_for_collision_records() {
        let config = GameConfig {
            item_drop_chance: 0.0,
            ..Default::default()
        };
        let mut engine = playing_engine_with(config);
        let brick_id = engine
            .registry()
            .by_type(EntityType::Brick)
            .next()
            .unwrap()
            .id;
        let brick_center = engine.registry().get(brick_id).unwrap().center();

        place_free_ball(&mut engine, brick_center, Vec2::ZERO);
        engine.tick(FRAME_DT);
        assert!(
            engine
                .last_collisions()
                .iter()
                .any(|r| r.a == brick_id || r.b == brick_id)
        );

        // Destroyed at tick T: absent from the registry and from every
        // record produced in tick T+1 onward
        engine.tick(FRAME_DT);
        assert!(engine.registry().get(brick_id).is_none());
        assert!(
            engine
                .last_collisions()
                .iter()
                .all(|r| r.a != brick_id && r.b != brick_id)
        );
    }

    #[test]
    fn test_fire_launches_attached_ball() {
        let input = SharedInput::new();
        let collaborators = Collaborators {
            persistence: Box::new(crate::platform::NullPersistence),
            input: Box::new(input.clone()),
            audio: Box::new(NullAudio),
        };
        let mut engine =
            GameEngine::new(GameConfig::default(), collaborators, 42).unwrap();
        engine.set_phase(GamePhase::Playing);

        input.set(InputState {
            fire: true,
            ..Default::default()
        });
        engine.tick(FRAME_DT);

        let ball = engine
            .registry()
            .by_type(EntityType::Ball)
            .next()
            .unwrap();
        assert!(!ball.as_ball().unwrap().attached);
        // Launched upward
        assert!(ball.body.as_ref().unwrap().vel.y < 0.0);
    }

    #[test]
    fn test_fire_spawns_bullet_with_cooldown() {
        let input = SharedInput::new();
        let collaborators = Collaborators {
            persistence: Box::new(crate::platform::NullPersistence),
            input: Box::new(input.clone()),
            audio: Box::new(NullAudio),
        };
        let mut engine =
            GameEngine::new(GameConfig::default(), collaborators, 42).unwrap();
        engine.set_phase(GamePhase::Playing);
        // No attached balls left: fire becomes a weapon trigger
        place_free_ball(&mut engine, Vec2::new(400.0, 300.0), Vec2::ZERO);

        input.set(InputState {
            fire: true,
            ..Default::default()
        });
        engine.tick(FRAME_DT);
        assert_eq!(engine.registry().by_type(EntityType::Bullet).count(), 1);

        // Held fire respects the cooldown
        engine.tick(FRAME_DT);
        assert_eq!(engine.registry().by_type(EntityType::Bullet).count(), 1);
    }

    #[test]
    fn test_widen_item_applies_and_expires() {
        let mut engine = playing_engine();
        let paddle = engine
            .registry()
            .by_type(EntityType::Paddle)
            .next()
            .unwrap();
        let paddle_id = paddle.id;
        let paddle_center = paddle.center();
        let base_width = paddle.size.x;

        engine.add_entity(Entity::item(paddle_center, ItemKind::Widen));
        engine.tick(FRAME_DT);

        let widened = engine.registry().get(paddle_id).unwrap().size.x;
        assert!((widened - (base_width + WIDEN_DELTA)).abs() < 1e-4);

        for _ in 0..=MODIFIER_DURATION_TICKS {
            engine.tick(FRAME_DT);
        }
        let reverted = engine.registry().get(paddle_id).unwrap().size.x;
        assert!((reverted - base_width).abs() < 1e-4);
    }

    #[test]
    fn test_shield_item_saves_one_ball_loss() {
        let mut engine = playing_engine();
        let paddle_id = engine
            .registry()
            .by_type(EntityType::Paddle)
            .next()
            .unwrap()
            .id;
        let paddle_center = engine.registry().get(paddle_id).unwrap().center();
        let lives_before = engine.progress().lives;

        engine.add_entity(Entity::item(paddle_center, ItemKind::Shield));
        engine.tick(FRAME_DT);
        assert!(
            engine
                .registry()
                .get(paddle_id)
                .unwrap()
                .caps
                .has(CapabilityKind::Shield)
        );

        destroy_all(&mut engine, EntityType::Ball);
        engine.tick(FRAME_DT);

        // Shield absorbed the loss: no life spent, ball respawned, shield gone
        assert_eq!(engine.progress().lives, lives_before);
        assert_eq!(engine.registry().count_live(EntityType::Ball), 1);
        assert!(
            !engine
                .registry()
                .get(paddle_id)
                .unwrap()
                .caps
                .has(CapabilityKind::Shield)
        );
    }

    #[test]
    fn test_multiball_item_clones_free_balls() {
        let mut engine = playing_engine();
        let paddle_center = engine
            .registry()
            .by_type(EntityType::Paddle)
            .next()
            .unwrap()
            .center();

        place_free_ball(&mut engine, Vec2::new(400.0, 300.0), Vec2::new(2.0, -2.0));
        engine.add_entity(Entity::item(paddle_center, ItemKind::MultiBall));
        engine.tick(FRAME_DT);

        assert_eq!(engine.registry().count_live(EntityType::Ball), 2);
    }

    #[test]
    fn test_particle_cap_enforced() {
        let config = GameConfig {
            max_particles: 5,
            item_drop_chance: 0.0,
            ..Default::default()
        };
        let mut engine = playing_engine_with(config);
        let brick_center = engine
            .registry()
            .by_type(EntityType::Brick)
            .next()
            .unwrap()
            .center();

        place_free_ball(&mut engine, brick_center, Vec2::ZERO);
        engine.tick(FRAME_DT);

        assert!(engine.registry().by_type(EntityType::Particle).count() <= 5);
    }

    #[test]
    fn test_render_order_by_type_priority() {
        let engine = playing_engine();
        let order = engine.render_order();
        assert!(!order.is_empty());
        // Invisible wall is excluded
        assert!(order.iter().all(|e| e.entity_type() != EntityType::Wall));
        let priorities: Vec<u8> = order
            .iter()
            .map(|e| render_priority(e.entity_type()))
            .collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_stop_disarms_loop() {
        let mut engine = playing_engine();
        engine.start();
        assert!(engine.is_running());
        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_determinism_same_seed_same_run() {
        let run = |seed: u64| -> (u64, u64, usize) {
            let mut engine =
                GameEngine::new(GameConfig::default(), Collaborators::null(), seed).unwrap();
            engine.set_phase(GamePhase::Playing);
            place_free_ball(
                &mut engine,
                Vec2::new(400.0, 300.0),
                Vec2::new(2.5, -3.0),
            );
            for _ in 0..600 {
                engine.tick(FRAME_DT);
            }
            (
                engine.progress().score,
                engine.time_ticks(),
                engine.registry().len(),
            )
        };
        assert_eq!(run(1234), run(1234));
    }
}

//! Neon Breaker entry point
//!
//! Headless demo driver: runs the simulation at the fixed frame cadence
//! with a simple ball-tracking input source, logging state transitions and
//! the final score. Rendering is someone else's job; this exercises the
//! whole core without one.

use std::time::{Duration, Instant};

use neon_breaker::config::GameConfig;
use neon_breaker::consts::FRAME_DT;
use neon_breaker::platform::{InputState, MemoryStore, NullAudio, SharedInput};
use neon_breaker::sim::{Collaborators, EntityType, GameEngine, GamePhase};

/// Demo run length cap (2 minutes of simulated time)
const MAX_DEMO_TICKS: u64 = 120 * 60;

fn main() {
    env_logger::init();

    let seed = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(2024);

    let input = SharedInput::new();
    let collaborators = Collaborators {
        persistence: Box::new(MemoryStore::new()),
        input: Box::new(input.clone()),
        audio: Box::new(NullAudio),
    };

    let mut engine = match GameEngine::new(GameConfig::default(), collaborators, seed) {
        Ok(engine) => engine,
        Err(err) => {
            log::error!("engine init failed: {err}");
            std::process::exit(1);
        }
    };

    engine.subscribe(Box::new(|event| {
        log::info!("event: {event:?}");
        Ok(())
    }));

    log::info!("starting demo run with seed {seed}");
    engine.set_phase(GamePhase::Playing);
    engine.start();

    let mut last = Instant::now();
    while engine.is_running() {
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        steer(&engine, &input);
        engine.tick(dt);

        match engine.phase() {
            GamePhase::GameOver => engine.stop(),
            GamePhase::StageClear | GamePhase::RoundClear => engine.advance_stage(),
            _ => {}
        }
        if engine.time_ticks() >= MAX_DEMO_TICKS {
            engine.stop();
        }

        std::thread::sleep(Duration::from_secs_f32(FRAME_DT));
    }

    let progress = engine.progress();
    log::info!(
        "run over after {} ticks: score {}, coins {}, round {}, stage {}, lives {}",
        engine.time_ticks(),
        progress.score,
        progress.coins,
        progress.round,
        progress.stage,
        progress.lives
    );
}

/// Idle-mode pilot: chase the lowest free ball with the pointer, serve
/// whenever every ball is attached
fn steer(engine: &GameEngine, input: &SharedInput) {
    let lowest_free = engine
        .registry()
        .by_type(EntityType::Ball)
        .filter(|e| e.active && !e.destroyed)
        .filter(|e| e.as_ball().is_some_and(|b| !b.attached))
        .max_by(|a, b| a.center().y.total_cmp(&b.center().y));

    match lowest_free {
        Some(ball) => input.set(InputState {
            pointer: Some(ball.center()),
            ..Default::default()
        }),
        None => input.set(InputState {
            fire: true,
            ..Default::default()
        }),
    }
}

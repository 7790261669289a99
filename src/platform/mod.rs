//! Platform collaborator traits
//!
//! The engine never reaches for ambient globals: persistence, input and
//! audio are handed in once at construction and polled from the tick.
//! Null implementations keep tests and the headless bin dependency-free.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec2;

use crate::error::PersistenceError;

/// Durable key/value storage for player progress.
///
/// `load` returning `Ok(None)` means "nothing saved yet"; callers substitute
/// defaults for both that and any `Err` - corruption never reaches the loop.
pub trait Persistence {
    fn load(&self, category: &str) -> Result<Option<serde_json::Value>, PersistenceError>;
    fn save(&mut self, category: &str, value: &serde_json::Value) -> Result<(), PersistenceError>;
}

/// Directional/fire intents, polled once per tick (never pushed).
pub trait InputSource {
    fn left_pressed(&self) -> bool;
    fn right_pressed(&self) -> bool;
    fn fire_pressed(&self) -> bool;
    /// Pointer position in field coordinates, if a pointer is active
    fn pointer(&self) -> Option<Vec2>;
}

/// Sound cues the gameplay layer can trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    PaddleHit,
    BrickHit,
    BrickBreak,
    WallBounce,
    ItemPickup,
    Launch,
    LifeLost,
    GameOver,
}

/// Fire-and-forget audio output. Implementations must swallow their own
/// failures; `play` is infallible by contract so nothing propagates into
/// the tick.
pub trait AudioSink {
    fn play(&mut self, cue: SoundCue);
}

/// In-memory persistence for tests and the headless bin
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryStore {
    fn load(&self, category: &str) -> Result<Option<serde_json::Value>, PersistenceError> {
        Ok(self.records.get(category).cloned())
    }

    fn save(&mut self, category: &str, value: &serde_json::Value) -> Result<(), PersistenceError> {
        self.records.insert(category.to_owned(), value.clone());
        Ok(())
    }
}

/// Persistence that stores nothing and remembers nothing
#[derive(Debug, Default)]
pub struct NullPersistence;

impl Persistence for NullPersistence {
    fn load(&self, _category: &str) -> Result<Option<serde_json::Value>, PersistenceError> {
        Ok(None)
    }

    fn save(&mut self, _category: &str, _value: &serde_json::Value) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Input source that never presses anything
#[derive(Debug, Default)]
pub struct NullInput;

impl InputSource for NullInput {
    fn left_pressed(&self) -> bool {
        false
    }

    fn right_pressed(&self) -> bool {
        false
    }

    fn fire_pressed(&self) -> bool {
        false
    }

    fn pointer(&self) -> Option<Vec2> {
        None
    }
}

/// Audio sink that drops every cue
#[derive(Debug, Default)]
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn play(&mut self, _cue: SoundCue) {}
}

/// Mutable input state shared between a driver and the engine.
///
/// The engine owns its `InputSource` box, so a driver that wants to steer
/// mid-run (the demo bin, scripted tests) keeps a clone of the inner `Rc`
/// and writes intents between ticks.
#[derive(Debug, Clone, Default)]
pub struct SharedInput {
    state: Rc<RefCell<InputState>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub fire: bool,
    pub pointer: Option<Vec2>,
}

impl SharedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: InputState) {
        *self.state.borrow_mut() = state;
    }

    pub fn set_fire(&self, fire: bool) {
        self.state.borrow_mut().fire = fire;
    }

    pub fn set_pointer(&self, pointer: Option<Vec2>) {
        self.state.borrow_mut().pointer = pointer;
    }
}

impl InputSource for SharedInput {
    fn left_pressed(&self) -> bool {
        self.state.borrow().left
    }

    fn right_pressed(&self) -> bool {
        self.state.borrow().right
    }

    fn fire_pressed(&self) -> bool {
        self.state.borrow().fire
    }

    fn pointer(&self) -> Option<Vec2> {
        self.state.borrow().pointer
    }
}

//! Game event bus
//!
//! Explicit subscription registry: `subscribe` returns a `ListenerId`
//! handle that `unsubscribe` takes back. Every listener runs behind its
//! own error boundary, so one faulty listener never starves the rest.

use crate::error::HandlerFault;

use super::engine::GamePhase;

/// Events the engine publishes on state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    StateChange { old: GamePhase, new: GamePhase },
    Pause,
    GameOver,
    StageClear,
    RoundClear,
    LifeLost { remaining: u32 },
}

/// Unsubscribe handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub type EventListener = Box<dyn FnMut(&GameEvent) -> Result<(), HandlerFault>>;

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerId, EventListener)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener. Returns false when the handle was already gone.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Notify every listener. A failing listener is logged and the rest
    /// still run.
    pub fn emit(&mut self, event: &GameEvent) {
        for (id, listener) in &mut self.listeners {
            if let Err(fault) = listener(event) {
                log::warn!("event listener {id:?} failed on {event:?}: {fault}");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

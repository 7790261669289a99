//! Entity registry
//!
//! Owns every live entity, keyed by id. A `BTreeMap` keeps iteration in
//! ascending id order, so every pass over the registry is deterministic.
//! Destruction is two-phase: `destroy` marks the terminal flag, `sweep`
//! performs the physical removal one pass later.

use std::collections::BTreeMap;

use super::entity::{Entity, EntityId, EntityType};

#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, Entity>,
    next_id: EntityId,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register an entity, assigning it the next unique id
    pub fn register(&mut self, mut entity: Entity) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        entity.id = id;
        self.entities.insert(id, entity);
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// All entities of one type, in id order
    pub fn by_type(&self, entity_type: EntityType) -> impl Iterator<Item = &Entity> {
        self.entities
            .values()
            .filter(move |e| e.entity_type() == entity_type)
    }

    /// Count of active, non-destroyed entities of one type
    pub fn count_live(&self, entity_type: EntityType) -> usize {
        self.by_type(entity_type)
            .filter(|e| e.active && !e.destroyed)
            .count()
    }

    /// Mark an entity terminal. Unknown ids are ignored.
    pub fn destroy(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.destroy();
        }
    }

    /// Remove every destroyed entity, releasing attached capabilities
    /// first. Returns the number removed.
    pub fn sweep(&mut self) -> usize {
        let doomed: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, e)| e.destroyed)
            .map(|(&id, _)| id)
            .collect();
        for id in &doomed {
            if let Some(mut entity) = self.entities.remove(id) {
                entity.caps.release_all();
            }
        }
        doomed.len()
    }

    /// Drop every entity immediately (state-entry reset, not a sweep)
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::*;
    use crate::sim::entity::BrickKind;
    use glam::Vec2;

    fn some_ball() -> Entity {
        Entity::ball(Vec2::new(400.0, 300.0), BALL_RADIUS, BALL_SPEED)
    }

    #[test]
    fn test_register_assigns_unique_ids() {
        let mut registry = EntityRegistry::new();
        let a = registry.register(some_ball());
        let b = registry.register(some_ball());
        assert_ne!(a, b);
        assert_eq!(registry.get(a).unwrap().id, a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_by_type_filters() {
        let mut registry = EntityRegistry::new();
        registry.register(some_ball());
        registry.register(Entity::brick(Vec2::ZERO, 60.0, 20.0, BrickKind::Normal));
        registry.register(Entity::brick(
            Vec2::new(65.0, 0.0),
            60.0,
            20.0,
            BrickKind::Glass,
        ));

        assert_eq!(registry.by_type(EntityType::Brick).count(), 2);
        assert_eq!(registry.by_type(EntityType::Ball).count(), 1);
        assert_eq!(registry.by_type(EntityType::Paddle).count(), 0);
    }

    #[test]
    fn test_destroy_marks_sweep_removes() {
        let mut registry = EntityRegistry::new();
        let id = registry.register(some_ball());

        registry.destroy(id);
        // Still present until the sweep
        assert!(registry.get(id).is_some());
        assert!(registry.get(id).unwrap().destroyed);
        assert_eq!(registry.count_live(EntityType::Ball), 0);

        let removed = registry.sweep();
        assert_eq!(removed, 1);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_sweep_leaves_live_entities() {
        let mut registry = EntityRegistry::new();
        let keep = registry.register(some_ball());
        let drop = registry.register(some_ball());
        registry.destroy(drop);

        registry.sweep();
        assert!(registry.get(keep).is_some());
        assert!(registry.get(drop).is_none());
    }

    #[test]
    fn test_ids_ascend() {
        let mut registry = EntityRegistry::new();
        for _ in 0..5 {
            registry.register(some_ball());
        }
        let ids: Vec<_> = registry.ids().collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }
}

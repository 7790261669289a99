//! Uniform-grid broad phase
//!
//! Buckets entities into fixed-size cells so candidate queries run in
//! near-linear time instead of all-pairs quadratic. The grid holds no
//! state across ticks: entities move every frame, so it is rebuilt from
//! scratch at the start of each collision pass.
//!
//! Guarantee: `query` returns a superset of the truly AABB-overlapping
//! entities (no false negatives, for any positive cell size). False
//! positives are expected and filtered by the narrow phase.

use std::collections::HashMap;

use super::entity::{Bounds, Entity, EntityId};
use super::registry::EntityRegistry;

#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<EntityId>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
        }
    }

    /// Cell index range covered by a bounding box (inclusive)
    fn cell_range(&self, bounds: &Bounds) -> (i32, i32, i32, i32) {
        (
            (bounds.left / self.cell_size).floor() as i32,
            (bounds.right / self.cell_size).floor() as i32,
            (bounds.top / self.cell_size).floor() as i32,
            (bounds.bottom / self.cell_size).floor() as i32,
        )
    }

    /// Clear and re-insert every active, non-destroyed entity. An entity
    /// spanning multiple cells is registered in all of them.
    pub fn rebuild(&mut self, registry: &EntityRegistry) {
        self.cells.clear();

        for entity in registry.iter() {
            if !entity.active || entity.destroyed {
                continue;
            }
            let (x0, x1, y0, y1) = self.cell_range(&entity.bounds());
            for x in x0..=x1 {
                for y in y0..=y1 {
                    self.cells.entry((x, y)).or_default().push(entity.id);
                }
            }
        }
    }

    /// Every other entity sharing at least one cell with `entity`,
    /// deduplicated and in ascending id order
    pub fn query(&self, entity: &Entity) -> Vec<EntityId> {
        let mut nearby = Vec::new();
        let (x0, x1, y0, y1) = self.cell_range(&entity.bounds());

        for x in x0..=x1 {
            for y in y0..=y1 {
                if let Some(ids) = self.cells.get(&(x, y)) {
                    nearby.extend(ids.iter().copied().filter(|&id| id != entity.id));
                }
            }
        }

        nearby.sort_unstable();
        nearby.dedup();
        nearby
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::entity::BrickKind;
    use glam::Vec2;

    fn brick_at(registry: &mut EntityRegistry, x: f32, y: f32) -> EntityId {
        registry.register(Entity::brick(
            Vec2::new(x, y),
            60.0,
            20.0,
            BrickKind::Normal,
        ))
    }

    #[test]
    fn test_query_finds_cell_mates() {
        let mut registry = EntityRegistry::new();
        let a = brick_at(&mut registry, 10.0, 10.0);
        let b = brick_at(&mut registry, 30.0, 30.0);
        // Far away, different cell
        let far = brick_at(&mut registry, 700.0, 500.0);

        let mut grid = SpatialGrid::new(100.0);
        grid.rebuild(&registry);

        let nearby = grid.query(registry.get(a).unwrap());
        assert!(nearby.contains(&b));
        assert!(!nearby.contains(&far));
        // Never returns the probe itself
        assert!(!nearby.contains(&a));
    }

    #[test]
    fn test_spanning_entity_registered_in_all_cells() {
        let mut registry = EntityRegistry::new();
        // 250 wide: spans three 100px columns
        let wide = registry.register(Entity::brick(
            Vec2::new(0.0, 0.0),
            250.0,
            20.0,
            BrickKind::Normal,
        ));
        let right = brick_at(&mut registry, 220.0, 5.0);

        let mut grid = SpatialGrid::new(100.0);
        grid.rebuild(&registry);

        let nearby = grid.query(registry.get(right).unwrap());
        assert!(nearby.contains(&wide));
    }

    #[test]
    fn test_query_deduplicates_spanning_neighbor() {
        let mut registry = EntityRegistry::new();
        let wide = registry.register(Entity::brick(
            Vec2::new(0.0, 0.0),
            250.0,
            20.0,
            BrickKind::Normal,
        ));
        // Also spans several cells, shares more than one with `wide`
        let probe = registry.register(Entity::brick(
            Vec2::new(50.0, 5.0),
            180.0,
            20.0,
            BrickKind::Normal,
        ));

        let mut grid = SpatialGrid::new(100.0);
        grid.rebuild(&registry);

        let nearby = grid.query(registry.get(probe).unwrap());
        assert_eq!(nearby.iter().filter(|&&id| id == wide).count(), 1);
    }

    #[test]
    fn test_destroyed_entities_absent() {
        let mut registry = EntityRegistry::new();
        let a = brick_at(&mut registry, 10.0, 10.0);
        let b = brick_at(&mut registry, 30.0, 30.0);
        registry.destroy(b);

        let mut grid = SpatialGrid::new(100.0);
        grid.rebuild(&registry);

        assert!(!grid.query(registry.get(a).unwrap()).contains(&b));
    }

    #[test]
    fn test_negative_coordinates_bucket_correctly() {
        let mut registry = EntityRegistry::new();
        let a = brick_at(&mut registry, -30.0, -30.0);
        let b = brick_at(&mut registry, -90.0, -25.0);

        let mut grid = SpatialGrid::new(100.0);
        grid.rebuild(&registry);

        assert!(grid.query(registry.get(a).unwrap()).contains(&b));
    }
}

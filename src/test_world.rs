//! Axis-aligned box level used by unit tests in place of a physics app.
//!
//! Swept shapes are approximated by their world-space AABB, which is exact
//! for the flat floors, walls and steps the tests build.

use bevy_ecs::world::World;

use crate::{
    GameRigidBody,
    prelude::*,
    sweep::{CastHit, RayHit, SweepWorld},
};

const TOUCH_EPSILON: f32 = 1e-5;

struct Obstacle {
    entity: Entity,
    min: Vec3,
    max: Vec3,
    /// Reported instead of the face normal, to stand in for a sloped surface.
    surface_normal: Option<Vec3>,
}

pub(crate) struct BoxWorld {
    entities: World,
    obstacles: Vec<Obstacle>,
}

struct SlabHit {
    enter: f32,
    exit: f32,
    normal: Vec3,
}

impl BoxWorld {
    pub(crate) fn new() -> Self {
        Self {
            entities: World::new(),
            obstacles: Vec::new(),
        }
    }

    pub(crate) fn spawn(&mut self) -> Entity {
        self.entities.spawn_empty().id()
    }

    pub(crate) fn add_box(&mut self, min: Vec3, max: Vec3) -> Entity {
        let entity = self.spawn();
        self.obstacles.push(Obstacle {
            entity,
            min,
            max,
            surface_normal: None,
        });
        entity
    }

    /// A box that reports `normal` for every hit, as if its surface were tilted.
    pub(crate) fn add_slope(&mut self, min: Vec3, max: Vec3, normal: Vec3) -> Entity {
        let entity = self.add_box(min, max);
        if let Some(obstacle) = self.obstacles.last_mut() {
            obstacle.surface_normal = Some(normal.normalize());
        }
        entity
    }

    /// A wide slab whose top face sits at `top`.
    pub(crate) fn add_floor(&mut self, top: f32) -> Entity {
        self.add_box(Vec3::new(-50.0, top - 1.0, -50.0), Vec3::new(50.0, top, 50.0))
    }

    fn obstacles_except(&self, exclude: Option<Entity>) -> impl Iterator<Item = &Obstacle> {
        self.obstacles
            .iter()
            .filter(move |obstacle| Some(obstacle.entity) != exclude)
    }

    /// Slab test of a ray against `[min, max]`. Rays grazing a face count as misses.
    fn slab(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3) -> Option<SlabHit> {
        let mut enter = f32::NEG_INFINITY;
        let mut exit = f32::INFINITY;
        let mut normal = Vec3::ZERO;
        for axis in 0..3 {
            let d = direction[axis];
            if d.abs() < 1e-8 {
                if origin[axis] <= min[axis] || origin[axis] >= max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (min[axis] - origin[axis]) / d;
            let t2 = (max[axis] - origin[axis]) / d;
            let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            if near > enter {
                enter = near;
                normal = Vec3::ZERO;
                normal[axis] = -d.signum();
            }
            exit = exit.min(far);
        }
        (enter <= exit && exit > 0.0).then_some(SlabHit {
            enter,
            exit,
            normal,
        })
    }
}

impl SweepWorld for BoxWorld {
    fn shape_hits(
        &self,
        shape: &Collider,
        origin: Vec3,
        rotation: Quat,
        direction: Dir3,
        max_distance: f32,
        _mask: LayerMask,
        exclude: Option<Entity>,
    ) -> Vec<CastHit> {
        let aabb = shape.aabb(origin, rotation);
        let half = (aabb.max - aabb.min) * 0.5;
        let center = (aabb.max + aabb.min) * 0.5;

        let mut hits = Vec::new();
        for obstacle in self.obstacles_except(exclude) {
            let min = obstacle.min - half;
            let max = obstacle.max + half;
            let inside = (center - min).min_element() > TOUCH_EPSILON
                && (max - center).min_element() > TOUCH_EPSILON;
            if inside {
                hits.push(CastHit::overlap(obstacle.entity));
                continue;
            }
            let Some(slab) = Self::slab(center, *direction, min, max) else {
                continue;
            };
            let distance = slab.enter.max(0.0);
            if distance > max_distance || slab.exit <= TOUCH_EPSILON {
                continue;
            }
            let contact_center = center + *direction * distance;
            hits.push(CastHit {
                entity: obstacle.entity,
                distance,
                point: contact_center.clamp(obstacle.min, obstacle.max),
                normal: obstacle.surface_normal.unwrap_or(slab.normal),
            });
        }
        hits
    }

    fn ray_hit(
        &self,
        origin: Vec3,
        direction: Dir3,
        max_distance: f32,
        _mask: LayerMask,
        exclude: Option<Entity>,
    ) -> Option<RayHit> {
        self.obstacles_except(exclude)
            .filter_map(|obstacle| {
                let slab = Self::slab(origin, *direction, obstacle.min, obstacle.max)?;
                let distance = slab.enter.max(0.0);
                (distance <= max_distance).then_some(RayHit {
                    entity: obstacle.entity,
                    distance,
                    normal: obstacle.surface_normal.unwrap_or(slab.normal),
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Standard test body: capsule of radius 0.5 and height 2 with a 0.05 skin.
pub(crate) fn capsule_body() -> GameRigidBody {
    GameRigidBody::new(BodyShape::capsule(0.5, 2.0)).unwrap()
}

/// Translation that rests a standard capsule `skin` above a floor whose top is at `floor_top`.
pub(crate) fn resting_on(floor_top: f32, x: f32, z: f32) -> Transform {
    Transform::from_xyz(x, floor_top + 1.0 + 0.05, z)
}

pub(crate) fn assert_near(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}

pub(crate) fn assert_vec_near(actual: Vec3, expected: Vec3) {
    assert!(
        actual.distance(expected) < 1e-4,
        "expected {expected}, got {actual}"
    );
}

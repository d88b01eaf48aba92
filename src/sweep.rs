//! The boundary between bodies and the physics world they sweep through.

use bevy_ecs::system::SystemParam;

use crate::prelude::*;

/// Upper bound on the hits a single sweep reports.
const MAX_SWEEP_HITS: u32 = 32;

/// One obstruction found by a shape sweep.
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct CastHit {
    /// The collider that was hit.
    pub entity: Entity,
    /// Distance along the cast direction at which contact happens.
    pub distance: f32,
    /// Contact point on the hit collider, in world space.
    pub point: Vec3,
    /// Outward surface normal of the hit collider, in world space.
    pub normal: Vec3,
}

impl CastHit {
    /// The record reported when the swept shape already overlaps `entity`.
    pub fn overlap(entity: Entity) -> Self {
        Self {
            entity,
            distance: 0.0,
            point: Vec3::ZERO,
            normal: Vec3::ZERO,
        }
    }

    /// Whether this is the overlap sentinel: zero distance at the world origin.
    pub fn is_crush(&self) -> bool {
        self.distance == 0.0 && self.point == Vec3::ZERO
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub entity: Entity,
    pub distance: f32,
    pub normal: Vec3,
}

/// Geometric queries a body needs from the world.
///
/// Hits come back in no particular order. Trigger volumes and the `exclude`d
/// entity must not be reported.
pub trait SweepWorld {
    /// Sweeps `shape` from `origin` along `direction` for `max_distance` and
    /// reports everything it touches on the way.
    fn shape_hits(
        &self,
        shape: &Collider,
        origin: Vec3,
        rotation: Quat,
        direction: Dir3,
        max_distance: f32,
        mask: LayerMask,
        exclude: Option<Entity>,
    ) -> Vec<CastHit>;

    fn ray_hit(
        &self,
        origin: Vec3,
        direction: Dir3,
        max_distance: f32,
        mask: LayerMask,
        exclude: Option<Entity>,
    ) -> Option<RayHit>;
}

/// [`SweepWorld`] backed by Avian's spatial query pipeline.
#[derive(SystemParam)]
pub struct PhysicsSweeper<'w, 's> {
    pub spatial_query: SpatialQuery<'w, 's>,
    pub sensors: Query<'w, 's, (), With<Sensor>>,
}

impl SweepWorld for PhysicsSweeper<'_, '_> {
    fn shape_hits(
        &self,
        shape: &Collider,
        origin: Vec3,
        rotation: Quat,
        direction: Dir3,
        max_distance: f32,
        mask: LayerMask,
        exclude: Option<Entity>,
    ) -> Vec<CastHit> {
        let config = ShapeCastConfig {
            max_distance,
            compute_contact_on_penetration: false,
            ..default()
        };
        let filter = SpatialQueryFilter::from_mask(mask).with_excluded_entities(exclude);
        self.spatial_query
            .shape_hits(
                shape,
                origin,
                rotation,
                direction,
                MAX_SWEEP_HITS,
                &config,
                &filter,
            )
            .into_iter()
            .filter(|hit| !self.sensors.contains(hit.entity))
            .map(|hit| {
                if hit.distance <= 0.0 {
                    CastHit::overlap(hit.entity)
                } else {
                    CastHit {
                        entity: hit.entity,
                        distance: hit.distance,
                        point: hit.point1,
                        normal: hit.normal1,
                    }
                }
            })
            .collect()
    }

    fn ray_hit(
        &self,
        origin: Vec3,
        direction: Dir3,
        max_distance: f32,
        mask: LayerMask,
        exclude: Option<Entity>,
    ) -> Option<RayHit> {
        let filter = SpatialQueryFilter::from_mask(mask).with_excluded_entities(exclude);
        self.spatial_query
            .cast_ray_predicate(origin, direction, max_distance, true, &filter, &|entity| {
                !self.sensors.contains(entity)
            })
            .map(|hit| RayHit {
                entity: hit.entity,
                distance: hit.distance,
                normal: hit.normal,
            })
    }
}

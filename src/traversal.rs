//! Free 3D movement over the ground plane: air control, stairs, wall sliding
//! and slipping off ledges.

use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};
use tracing::{debug, error};

use crate::{
    body::{BodyMover, SlipperyMove, project_on_plane},
    intent::BodyIntent,
    platformer::record_standing,
    prelude::*,
    renderer::face_direction,
    sweep::{PhysicsSweeper, SweepWorld},
};

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(PreUpdate, validate_body_shapes).add_systems(
            schedule,
            (
                resolve_horizontal.in_set(LeapSystems::ResolveHorizontal),
                (handle_edge_slip, clear_velocity_on_landing)
                    .chain()
                    .in_set(LeapSystems::PostResolve)
                    .before(record_standing),
            ),
        );
    }
}

/// Horizontal leftovers below this (in units per second) are not worth resolving.
const MIN_LEFTOVER_SPEED: f32 = 0.001;
/// An edge slip only happens if a cast this many times its length is clear.
const EDGE_SLIP_CLEARANCE_SCALE: f32 = 1.5;

/// 3D traversal tuning. Needs a capsule body.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(PlatformerBody)]
pub struct Platformer3d {
    /// Acceleration toward the requested direction while airborne.
    pub air_acceleration: f32,
    /// Horizontal drag while airborne, per second.
    pub air_horizontal_drag: f32,
    /// How far below the feet the center ray looks before the body counts as
    /// hanging off an edge.
    pub edge_slip_cast_distance: f32,
    /// Extra distance added to every edge slip.
    pub edge_overslip: f32,
    pub max_step_height: f32,
    /// Stair climbs that can't rise at least this far are abandoned.
    pub min_step_rise: f32,
    /// Slow down when walking into a wall at an angle.
    pub reduce_parallel_wall_speed: bool,
    /// Steepest floor, in radians from the body's up axis, a stair climb may land on.
    pub max_slope_angle: f32,
    pub climb_stairs: bool,
    /// Radians per second.
    pub renderer_max_twist_speed: f32,
}

impl Default for Platformer3d {
    fn default() -> Self {
        Self {
            air_acceleration: 6.0,
            air_horizontal_drag: 0.8,
            edge_slip_cast_distance: 0.9,
            edge_overslip: 0.05,
            max_step_height: 0.25,
            min_step_rise: 0.1,
            reduce_parallel_wall_speed: true,
            max_slope_angle: 45f32.to_radians(),
            climb_stairs: true,
            renderer_max_twist_speed: 520f32.to_radians(),
        }
    }
}

impl Platformer3d {
    /// Turns the intent into horizontal relative velocity: set directly on
    /// the ground, accelerated with drag in the air.
    pub fn update_horizontal_velocity(
        &self,
        cfg: &PlatformerBody,
        state: &mut PlatformerState,
        rotation: Quat,
        target: Vec3,
        standing: bool,
        dt: f32,
    ) {
        let target = Vec3::new(target.x, 0.0, target.z).clamp_length_max(1.0);
        let mut velocity = state.relative_velocity(rotation);
        if standing {
            velocity.x = target.x * cfg.walking_speed;
            velocity.z = target.z * cfg.walking_speed;
        } else {
            let drag = (1.0 - self.air_horizontal_drag * dt).clamp(0.0, 1.0);
            velocity.x = drag * (velocity.x + target.x * self.air_acceleration * dt);
            velocity.z = drag * (velocity.z + target.z * self.air_acceleration * dt);
        }
        state.set_relative_velocity(rotation, velocity);
    }

    /// Moves by the horizontal relative `velocity` for `dt`. Whatever is
    /// obstructed goes to stair climbing (when `climb` is set) and then to
    /// sliding along the obstruction. Returns whether the body climbed.
    pub fn horizontal_move<W: SweepWorld + ?Sized>(
        &self,
        mover: &mut BodyMover<W>,
        velocity: Vec3,
        dt: f32,
        climb: bool,
    ) -> bool {
        let direction = Vec3::new(velocity.x, 0.0, velocity.z);
        let target_speed = direction.length();
        if target_speed == 0.0 || dt <= 0.0 {
            return false;
        }

        let achieved = mover.move_relative(direction, target_speed * dt) / dt;
        let mut leftover = target_speed - achieved;
        if leftover <= MIN_LEFTOVER_SPEED {
            return false;
        }

        let mut climbed = false;
        if climb && self.climb_stairs {
            let remaining = self.climb_stairs(mover, direction / target_speed, leftover * dt) / dt;
            climbed = remaining < leftover;
            leftover = remaining;
        }
        if leftover > f32::EPSILON {
            mover.slippery_move(
                SlipperyMove::new(direction, leftover * dt)
                    .clamped_to(Vec3::Y)
                    .reduce_on_slide(self.reduce_parallel_wall_speed)
                    .skip_initial_move(),
            );
        }
        climbed
    }

    /// Tries to step up onto whatever blocks the normalized relative
    /// `direction`. Returns the part of `magnitude` left to travel; the full
    /// `magnitude` means the body was not moved.
    pub fn climb_stairs<W: SweepWorld + ?Sized>(
        &self,
        mover: &mut BodyMover<W>,
        direction: Vec3,
        magnitude: f32,
    ) -> f32 {
        let Ok(radius) = mover.body().shape.radius() else {
            return magnitude;
        };
        let up = mover.up();
        let mut imagined = mover.position();

        let mut rise = self.max_step_height;
        if let Some(hit) = mover.absolute_cast_from(up, rise, imagined) {
            rise = hit.distance;
        }
        if rise <= self.min_step_rise {
            return magnitude;
        }
        imagined += up * rise;

        let mut forward = radius.min(magnitude);
        if let Some(hit) = mover.cast_from(direction, forward, imagined) {
            forward = hit.distance;
        }
        if forward <= f32::EPSILON {
            return magnitude;
        }
        imagined += mover.relative_to_absolute_rotation() * (direction * forward);

        let mut drop = rise;
        // Nothing below counts as level ground.
        let mut floor_normal = up;
        if let Some(hit) = mover.absolute_cast_from(-up, drop, imagined) {
            if hit.is_crush() {
                return magnitude;
            }
            drop = hit.distance;
            floor_normal = hit.normal;
        }
        imagined -= up * drop;

        if up.angle_between(floor_normal) >= self.max_slope_angle {
            return magnitude;
        }

        mover.teleport(imagined);
        let remaining = magnitude - forward;
        remaining - mover.move_relative(direction, remaining)
    }

    /// Nudges a standing body off a ledge it is balancing on with only the
    /// rim of its footprint. Returns whether the body moved.
    pub fn handle_edge_slip<W: SweepWorld + ?Sized>(
        &self,
        cfg: &PlatformerBody,
        state: &mut PlatformerState,
        mover: &mut BodyMover<W>,
        now: f32,
    ) -> bool {
        let shape = &mover.body().shape;
        let (Ok(radius), Ok(feet)) = (shape.radius(), shape.feet_offset()) else {
            return false;
        };
        let support = state.is_standing_on(cfg, mover, now).to_vec();
        if support.is_empty() {
            return false;
        }
        let max_distance = feet.length() + self.edge_slip_cast_distance;
        if mover
            .ray(mover.position(), -mover.up(), max_distance)
            .is_some()
        {
            return false;
        }

        let mut slipped = false;
        for hit in support.iter().filter(|hit| !hit.is_crush()) {
            let offset = mover.absolute_to_relative_rotation() * (mover.position() - hit.point);
            let slip = project_on_plane(offset, Vec3::Y);
            let magnitude = radius - slip.length() + self.edge_overslip;
            if magnitude <= 0.0 || slip.length_squared() < f32::EPSILON {
                continue;
            }
            if mover.cast(slip, magnitude * EDGE_SLIP_CLEARANCE_SCALE).is_some() {
                continue;
            }
            let moved = mover.move_relative(slip, magnitude);
            debug!(
                "{} slipped off an edge by {moved} along {}",
                mover.entity(),
                slip.normalize()
            );
            slipped |= moved != 0.0;
        }
        if slipped {
            state.standing.invalidate();
        }
        slipped
    }

    /// Drops horizontal velocity on the tick the body touches down.
    pub fn clear_velocity_on_landing(state: &mut PlatformerState, rotation: Quat, standing: bool) {
        if standing && !state.was_standing {
            let velocity = state.relative_velocity(rotation);
            state.set_relative_velocity(rotation, Vec3::new(0.0, velocity.y, 0.0));
        }
    }
}

fn validate_body_shapes(
    bodies: Query<
        (Entity, &GameRigidBody),
        (
            With<Platformer3d>,
            Or<(Added<Platformer3d>, Changed<GameRigidBody>)>,
        ),
    >,
) -> Result {
    for (entity, body) in &bodies {
        body.shape.radius().map_err(|err| {
            error!("{entity} needs a capsule to use Platformer3d: {err}");
            err
        })?;
    }
    Ok(())
}

fn resolve_horizontal(
    mut bodies: Query<(
        Entity,
        &GameRigidBody,
        &PlatformerBody,
        &Platformer3d,
        &mut PlatformerState,
        &BodyIntent,
        &mut Transform,
        Option<&BodyRenderer>,
    )>,
    mut renderers: Query<&mut Transform, (With<RendererOf>, Without<GameRigidBody>)>,
    sweeper: PhysicsSweeper,
    time: Res<Time>,
    mut commands: Commands,
) {
    let dt = time.delta_secs();
    let now = time.elapsed_secs();
    for (entity, body, cfg, traversal, mut state, intent, mut transform, renderer) in &mut bodies {
        let mut mover = BodyMover::new(&sweeper, entity, body, &mut transform);
        let standing = state.is_standing(cfg, &mover, now);
        let target = intent.horizontal();

        if standing && target != Vec3::ZERO {
            if let Some(mut renderer) = renderer.and_then(|r| renderers.get_mut(r.get()).ok()) {
                face_direction(&mut renderer, target, traversal.renderer_max_twist_speed * dt);
            }
        }

        let rotation = mover.rotation();
        traversal.update_horizontal_velocity(cfg, &mut state, rotation, target, standing, dt);
        let velocity = state.relative_velocity(rotation);
        if traversal.horizontal_move(&mut mover, velocity, dt, standing) {
            state.standing.invalidate();
        }
        mover.report_crushes(&mut commands);
    }
}

fn handle_edge_slip(
    mut bodies: Query<(
        Entity,
        &GameRigidBody,
        &PlatformerBody,
        &Platformer3d,
        &mut PlatformerState,
        &mut Transform,
    )>,
    sweeper: PhysicsSweeper,
    time: Res<Time>,
    mut commands: Commands,
) {
    for (entity, body, cfg, traversal, mut state, mut transform) in &mut bodies {
        let mut mover = BodyMover::new(&sweeper, entity, body, &mut transform);
        traversal.handle_edge_slip(cfg, &mut state, &mut mover, time.elapsed_secs());
        mover.report_crushes(&mut commands);
    }
}

fn clear_velocity_on_landing(
    mut bodies: Query<
        (Entity, &GameRigidBody, &PlatformerBody, &mut PlatformerState, &mut Transform),
        With<Platformer3d>,
    >,
    sweeper: PhysicsSweeper,
    time: Res<Time>,
) {
    for (entity, body, cfg, mut state, mut transform) in &mut bodies {
        let mover = BodyMover::new(&sweeper, entity, body, transform.bypass_change_detection());
        let standing = state.is_standing(cfg, &mover, time.elapsed_secs());
        Platformer3d::clear_velocity_on_landing(&mut state, mover.rotation(), standing);
    }
}

#[cfg(test)]
mod tests {
    use core::f32::consts::FRAC_1_SQRT_2;

    use super::*;
    use crate::test_world::*;

    /// Floor at y = 0 and a step starting at x = 3 whose top is at `step_top`.
    fn stair_scene(step_top: f32) -> (BoxWorld, Entity) {
        let mut world = BoxWorld::new();
        let entity = world.spawn();
        world.add_floor(0.0);
        world.add_box(Vec3::new(3.0, -1.0, -50.0), Vec3::new(10.0, step_top, 50.0));
        (world, entity)
    }

    #[test]
    fn ground_velocity_is_set_directly() {
        let traversal = Platformer3d::default();
        let cfg = PlatformerBody::default();
        let mut state = PlatformerState {
            absolute_velocity: Vec3::new(10.0, -1.0, 10.0),
            ..default()
        };

        traversal.update_horizontal_velocity(
            &cfg,
            &mut state,
            Quat::IDENTITY,
            Vec3::new(3.0, 0.0, 4.0),
            true,
            0.1,
        );

        assert_vec_near(state.absolute_velocity, Vec3::new(3.6, -1.0, 4.8));
    }

    #[test]
    fn air_velocity_accelerates_with_drag() {
        let traversal = Platformer3d::default();
        let cfg = PlatformerBody::default();
        let mut state = PlatformerState {
            absolute_velocity: Vec3::new(1.0, 2.0, 0.0),
            ..default()
        };

        traversal.update_horizontal_velocity(&cfg, &mut state, Quat::IDENTITY, Vec3::X, false, 0.5);

        // (1 - 0.8 * 0.5) * (1 + 6 * 0.5)
        assert_vec_near(state.absolute_velocity, Vec3::new(0.6 * 4.0, 2.0, 0.0));
    }

    #[test]
    fn climbs_a_low_step() {
        let (world, entity) = stair_scene(0.2);
        let body = capsule_body();
        let traversal = Platformer3d::default();
        let mut transform = resting_on(0.0, 2.45, 0.0);
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        let remaining = traversal.climb_stairs(&mut mover, Vec3::X, 0.5);

        assert_near(remaining, 0.0);
        assert_vec_near(mover.position(), Vec3::new(2.95, 1.25, 0.0));
    }

    #[test]
    fn climbing_spends_the_rest_on_a_direct_move() {
        let (world, entity) = stair_scene(0.2);
        let body = capsule_body();
        let traversal = Platformer3d::default();
        let mut transform = resting_on(0.0, 2.45, 0.0);
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        let remaining = traversal.climb_stairs(&mut mover, Vec3::X, 0.8);

        assert_near(remaining, 0.0);
        assert_vec_near(mover.position(), Vec3::new(3.25, 1.25, 0.0));
    }

    #[test]
    fn a_tall_step_blocks_the_climb() {
        let (world, entity) = stair_scene(0.4);
        let body = capsule_body();
        let traversal = Platformer3d::default();
        let start = resting_on(0.0, 2.45, 0.0);
        let mut transform = start;
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        assert_eq!(traversal.climb_stairs(&mut mover, Vec3::X, 0.5), 0.5);
        assert_eq!(mover.position(), start.translation);
    }

    #[test]
    fn a_low_ceiling_blocks_the_climb() {
        let (mut world, entity) = stair_scene(0.2);
        world.add_box(Vec3::new(-50.0, 2.15, -50.0), Vec3::new(50.0, 3.0, 50.0));
        let body = capsule_body();
        let traversal = Platformer3d::default();
        let start = resting_on(0.0, 2.45, 0.0);
        let mut transform = start;
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        assert_eq!(traversal.climb_stairs(&mut mover, Vec3::X, 0.5), 0.5);
        assert_eq!(mover.position(), start.translation);
    }

    #[test]
    fn a_steep_landing_blocks_the_climb() {
        let mut world = BoxWorld::new();
        let entity = world.spawn();
        world.add_floor(0.0);
        world.add_slope(
            Vec3::new(3.0, -1.0, -50.0),
            Vec3::new(10.0, 0.2, 50.0),
            Vec3::new(-2.0, 1.0, 0.0),
        );
        let body = capsule_body();
        let traversal = Platformer3d::default();
        let start = resting_on(0.0, 2.45, 0.0);
        let mut transform = start;
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        assert_eq!(traversal.climb_stairs(&mut mover, Vec3::X, 0.5), 0.5);
        assert_eq!(mover.position(), start.translation);

        let lenient = Platformer3d {
            max_slope_angle: 70f32.to_radians(),
            ..default()
        };
        assert_near(lenient.climb_stairs(&mut mover, Vec3::X, 0.5), 0.0);
    }

    #[test]
    fn stairs_are_not_tried_for_box_bodies() {
        let (world, entity) = stair_scene(0.2);
        let body = GameRigidBody::new(BodyShape::cuboid(Vec3::new(0.5, 1.0, 0.5))).unwrap();
        let traversal = Platformer3d::default();
        let mut transform = resting_on(0.0, 2.45, 0.0);
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        assert_eq!(traversal.climb_stairs(&mut mover, Vec3::X, 0.5), 0.5);
    }

    #[test]
    fn walking_into_a_step_climbs_it() {
        let (world, entity) = stair_scene(0.2);
        let body = capsule_body();
        let traversal = Platformer3d::default();
        let mut transform = resting_on(0.0, 2.25, 0.0);
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        let climbed = traversal.horizontal_move(&mut mover, Vec3::new(6.0, 0.0, 0.0), 0.1, true);

        assert!(climbed);
        assert_near(mover.position().y, 1.25);
        assert_near(mover.position().x, 2.85);
    }

    #[test]
    fn airborne_bodies_slide_instead_of_climbing() {
        let (world, entity) = stair_scene(0.2);
        let body = capsule_body();
        let traversal = Platformer3d::default();
        let mut transform = resting_on(0.0, 2.25, 0.0);
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        let climbed = traversal.horizontal_move(&mut mover, Vec3::new(6.0, 0.0, 6.0), 0.1, false);

        assert!(!climbed);
        assert_near(mover.position().y, 1.05);
        // The skin is kept along the diagonal approach.
        assert_near(mover.position().x, 2.5 - 0.05 * FRAC_1_SQRT_2);
        assert!(mover.position().z > 0.0);
    }

    fn ledge_scene() -> (BoxWorld, Entity) {
        let mut world = BoxWorld::new();
        let entity = world.spawn();
        // A ledge ending at x = 0 with nothing beyond it.
        world.add_box(Vec3::new(-50.0, -1.0, -50.0), Vec3::new(0.0, 0.0, 50.0));
        (world, entity)
    }

    #[test]
    fn hanging_off_a_ledge_slips_off() {
        let (world, entity) = ledge_scene();
        let body = capsule_body();
        let cfg = PlatformerBody::default();
        let traversal = Platformer3d::default();
        let mut state = PlatformerState::default();
        let mut transform = resting_on(0.0, 0.3, 2.0);
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        assert!(traversal.handle_edge_slip(&cfg, &mut state, &mut mover, 0.0));

        // Pushed until the footprint clears the rim, plus the overslip.
        assert_vec_near(mover.position(), Vec3::new(0.55, 1.05, 2.0));
    }

    #[test]
    fn own_collider_does_not_hold_the_body_on_a_ledge() {
        let (mut world, _) = ledge_scene();
        let body = capsule_body();
        let cfg = PlatformerBody::default();
        let traversal = Platformer3d::default();
        let mut state = PlatformerState::default();
        let mut transform = resting_on(0.0, 0.3, 2.0);
        // The body's own collider surrounds the center ray's origin.
        let own = world.add_box(
            transform.translation - Vec3::new(0.5, 1.0, 0.5),
            transform.translation + Vec3::new(0.5, 1.0, 0.5),
        );
        let mut mover = BodyMover::new(&world, own, &body, &mut transform);

        assert!(traversal.handle_edge_slip(&cfg, &mut state, &mut mover, 0.0));
        assert_vec_near(mover.position(), Vec3::new(0.55, 1.05, 2.0));
    }

    #[test]
    fn supported_center_does_not_slip() {
        let (world, entity) = ledge_scene();
        let body = capsule_body();
        let cfg = PlatformerBody::default();
        let traversal = Platformer3d::default();
        let mut state = PlatformerState::default();
        let start = resting_on(0.0, -0.3, 2.0);
        let mut transform = start;
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        assert!(!traversal.handle_edge_slip(&cfg, &mut state, &mut mover, 0.0));
        assert_eq!(mover.position(), start.translation);
    }

    #[test]
    fn edge_slip_never_pushes_into_a_wall() {
        let (mut world, entity) = ledge_scene();
        world.add_box(Vec3::new(1.0, -5.0, -50.0), Vec3::new(2.0, 5.0, 50.0));
        let body = capsule_body();
        let cfg = PlatformerBody::default();
        let traversal = Platformer3d::default();
        let mut state = PlatformerState::default();
        let start = resting_on(0.0, 0.3, 2.0);
        let mut transform = start;
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        assert!(!traversal.handle_edge_slip(&cfg, &mut state, &mut mover, 0.0));
        assert_eq!(mover.position(), start.translation);
    }

    #[test]
    fn edge_slip_needs_room_beyond_the_push() {
        let (mut world, entity) = ledge_scene();
        // The slip is 0.25 long; the wall leaves 0.3 of clearance, less than the scaled check.
        world.add_box(Vec3::new(1.15, -5.0, -50.0), Vec3::new(2.0, 5.0, 50.0));
        let body = capsule_body();
        let cfg = PlatformerBody::default();
        let traversal = Platformer3d::default();
        let mut state = PlatformerState::default();
        let start = resting_on(0.0, 0.3, 2.0);
        let mut transform = start;
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        assert!(!traversal.handle_edge_slip(&cfg, &mut state, &mut mover, 0.0));
        assert_eq!(mover.position(), start.translation);
    }

    #[test]
    fn airborne_bodies_never_slip() {
        let (world, entity) = ledge_scene();
        let body = capsule_body();
        let cfg = PlatformerBody::default();
        let traversal = Platformer3d::default();
        let mut state = PlatformerState::default();
        let start = Transform::from_xyz(0.3, 3.0, 2.0);
        let mut transform = start;
        let mut mover = BodyMover::new(&world, entity, &body, &mut transform);

        assert!(!traversal.handle_edge_slip(&cfg, &mut state, &mut mover, 0.0));
        assert_eq!(mover.position(), start.translation);
    }

    #[test]
    fn landing_clears_horizontal_velocity() {
        let mut state = PlatformerState {
            absolute_velocity: Vec3::new(3.0, -4.0, 1.0),
            was_standing: false,
            ..default()
        };
        Platformer3d::clear_velocity_on_landing(&mut state, Quat::IDENTITY, false);
        assert_eq!(state.absolute_velocity, Vec3::new(3.0, -4.0, 1.0));

        Platformer3d::clear_velocity_on_landing(&mut state, Quat::IDENTITY, true);
        assert_eq!(state.absolute_velocity, Vec3::new(0.0, -4.0, 0.0));

        state.absolute_velocity = Vec3::new(3.0, 0.0, 0.0);
        state.was_standing = true;
        Platformer3d::clear_velocity_on_landing(&mut state, Quat::IDENTITY, true);
        assert_eq!(state.absolute_velocity, Vec3::new(3.0, 0.0, 0.0));
    }
}

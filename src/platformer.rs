//! Jumping, gravity and ground detection shared by every platformer body.

use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};
use tracing::warn;

use crate::{
    body::BodyMover,
    intent::BodyIntent,
    prelude::*,
    renderer::{twist, twist_toward},
    sweep::{CastHit, PhysicsSweeper, SweepWorld},
};

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(
            schedule,
            (
                apply_intent.in_set(LeapSystems::ApplyIntent),
                integrate_gravity.in_set(LeapSystems::Integrate),
                resolve_vertical.in_set(LeapSystems::ResolveVertical),
                record_standing.in_set(LeapSystems::PostResolve),
            ),
        );
    }
}

/// Seconds a standing check stays valid.
const STAND_CHECK_INTERVAL: f32 = 0.25;
/// Moving further than this since the last standing check forces a new one.
const STAND_FORCE_REFRESH_DISTANCE: f32 = 0.2;

/// Jump and fall tuning.
///
/// The jump arc is specified by how high it peaks and how far the body has
/// walked (at `walking_speed`) when it does; gravity and launch speed follow
/// from the projectile equations.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(GameRigidBody, PlatformerState, BodyIntent)]
pub struct PlatformerBody {
    /// Units per second. Also used in the air.
    pub walking_speed: f32,
    /// How far below the body to look for ground.
    pub foot_check_depth: f32,
    /// Peak height of a full jump. Zero disables jumping.
    pub jump_height: f32,
    /// Horizontal distance covered when the jump peaks.
    pub jump_peak_distance: f32,
    /// Multiplier on the jump gravity used when falling.
    pub normal_gravity_scale: f32,
    /// Vertical drag while falling, per second.
    pub falling_drag: f32,
}

impl Default for PlatformerBody {
    fn default() -> Self {
        Self {
            walking_speed: 6.0,
            foot_check_depth: 0.05,
            jump_height: 3.45,
            jump_peak_distance: 4.0,
            normal_gravity_scale: 2.0,
            falling_drag: 0.85,
        }
    }
}

impl PlatformerBody {
    pub fn jump_max_height(&self) -> f32 {
        self.jump_height
    }

    /// Horizontal distance of a full jump.
    ///
    /// Not derived yet: this is the distance to the peak, not to the landing.
    pub fn jump_max_distance(&self) -> f32 {
        warn!("jump_max_distance is approximated by jump_peak_distance");
        self.jump_peak_distance
    }

    pub fn jump_velocity(&self) -> f32 {
        if self.jump_peak_distance == 0.0 {
            return 0.0;
        }
        2.0 * self.jump_height * self.walking_speed / self.jump_peak_distance
    }

    pub fn jump_gravity(&self) -> f32 {
        if self.jump_peak_distance == 0.0 {
            return 0.0;
        }
        -2.0 * self.jump_height * self.walking_speed * self.walking_speed
            / (self.jump_peak_distance * self.jump_peak_distance)
    }

    pub fn normal_gravity(&self) -> f32 {
        self.normal_gravity_scale * self.jump_gravity()
    }

    pub fn current_gravity(&self, is_jumping: bool) -> f32 {
        if is_jumping {
            self.jump_gravity()
        } else {
            self.normal_gravity()
        }
    }

    pub fn current_drag(&self, is_jumping: bool) -> f32 {
        if is_jumping { 0.0 } else { self.falling_drag }
    }

    /// Moves directly along the relative `direction` at up to `max_speed`
    /// (the walking speed if `None`), scaled by `magnitude` in `[-1, 1]`.
    /// Returns the fraction of the full step that was achieved.
    pub fn walk<W: SweepWorld + ?Sized>(
        &self,
        mover: &mut BodyMover<W>,
        direction: Vec3,
        magnitude: f32,
        dt: f32,
        max_speed: Option<f32>,
    ) -> f32 {
        let magnitude = magnitude.clamp(-1.0, 1.0);
        let max_step = max_speed.unwrap_or(self.walking_speed) * dt;
        if max_step <= 0.0 {
            return 0.0;
        }
        mover.move_relative(direction, magnitude * max_step) / max_step
    }
}

/// Last result of the downward standing sweep.
#[derive(Clone, Reflect, Default, Debug)]
pub struct StandingCache {
    hits: Vec<CastHit>,
    checked_at: Option<f32>,
    checked_position: Vec3,
}

impl StandingCache {
    fn is_stale(&self, now: f32, position: Vec3) -> bool {
        match self.checked_at {
            None => true,
            Some(checked_at) => {
                now > checked_at + STAND_CHECK_INTERVAL
                    || self.checked_position.distance(position) > STAND_FORCE_REFRESH_DISTANCE
            }
        }
    }

    /// Forces the next standing query to sweep again.
    pub fn invalidate(&mut self) {
        self.checked_at = None;
    }
}

#[derive(Component, Clone, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct PlatformerState {
    /// World-space velocity.
    pub absolute_velocity: Vec3,
    /// Jump gravity applies while set. Cleared once the body starts falling.
    pub is_jumping: bool,
    /// Standing result at the end of the previous tick.
    pub was_standing: bool,
    pub standing: StandingCache,
}

impl PlatformerState {
    pub fn relative_velocity(&self, rotation: Quat) -> Vec3 {
        rotation.inverse() * self.absolute_velocity
    }

    pub fn set_relative_velocity(&mut self, rotation: Quat, velocity: Vec3) {
        self.absolute_velocity = rotation * velocity;
    }

    /// Whatever the standing sweep touched, refreshed when the cache is stale.
    pub fn is_standing_on<W: SweepWorld + ?Sized>(
        &mut self,
        cfg: &PlatformerBody,
        mover: &BodyMover<W>,
        now: f32,
    ) -> &[CastHit] {
        let position = mover.position();
        if self.standing.is_stale(now, position) {
            self.standing.hits = mover.cast_all(Vec3::NEG_Y, cfg.foot_check_depth);
            self.standing.checked_at = Some(now);
            self.standing.checked_position = position;
        }
        &self.standing.hits
    }

    pub fn is_standing<W: SweepWorld + ?Sized>(
        &mut self,
        cfg: &PlatformerBody,
        mover: &BodyMover<W>,
        now: f32,
    ) -> bool {
        !self.is_standing_on(cfg, mover, now).is_empty()
    }

    /// Starts a jump if the body is on the ground. Returns whether it did.
    pub fn jump_begin<W: SweepWorld + ?Sized>(
        &mut self,
        cfg: &PlatformerBody,
        mover: &BodyMover<W>,
        now: f32,
    ) -> bool {
        if !self.is_standing(cfg, mover, now) {
            return false;
        }
        self.is_jumping = true;
        let rotation = mover.rotation();
        let velocity = self.relative_velocity(rotation) + Vec3::Y * cfg.jump_velocity();
        self.set_relative_velocity(rotation, velocity);
        self.standing.invalidate();
        true
    }

    /// Ends a jump early. Safe to call at any time, including never.
    pub fn jump_end(&mut self) {
        self.is_jumping = false;
        self.standing.invalidate();
    }

    /// Switches to falling gravity once the jump has peaked.
    pub fn update_jump_state(&mut self, rotation: Quat) {
        if self.is_jumping && self.relative_velocity(rotation).y <= 0.0 {
            self.is_jumping = false;
        }
    }

    /// Applies drag and the active gravity to the vertical relative velocity.
    pub fn apply_gravity(&mut self, cfg: &PlatformerBody, rotation: Quat, dt: f32) {
        let mut velocity = self.relative_velocity(rotation);
        let drag = (1.0 - cfg.current_drag(self.is_jumping) * dt).clamp(0.0, 1.0);
        velocity.y = drag * (velocity.y + cfg.current_gravity(self.is_jumping) * dt);
        self.set_relative_velocity(rotation, velocity);
    }

    /// Moves along the body's up axis by the vertical velocity and keeps only
    /// the speed that was actually achieved.
    pub fn resolve_vertical<W: SweepWorld + ?Sized>(&mut self, mover: &mut BodyMover<W>, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let rotation = mover.rotation();
        let mut velocity = self.relative_velocity(rotation);
        let moved = mover.move_relative(Vec3::Y, velocity.y * dt);
        velocity.y = moved / dt;
        self.set_relative_velocity(rotation, velocity);
        if moved.abs() > f32::EPSILON {
            self.standing.invalidate();
        }
    }

    fn validate_velocity(&mut self) {
        for i in 0..3 {
            if !self.absolute_velocity[i].is_finite() {
                warn!(
                    "velocity[{i}] is not finite: {}, setting to 0",
                    self.absolute_velocity[i]
                );
                self.absolute_velocity[i] = 0.0;
            }
        }
    }
}

fn apply_intent(
    mut bodies: Query<(
        Entity,
        &GameRigidBody,
        &PlatformerBody,
        &mut PlatformerState,
        &mut BodyIntent,
        &mut Transform,
        Option<&BodyRenderer>,
    )>,
    mut renderers: Query<&mut Transform, (With<RendererOf>, Without<GameRigidBody>)>,
    sweeper: PhysicsSweeper,
    time: Res<Time>,
) {
    for (entity, body, cfg, mut state, mut intent, mut transform, renderer) in &mut bodies {
        // Several ticks may run per frame; only the first one turns or jumps.
        let requests = intent.take_requests();
        let mut renderer = renderer.and_then(|r| renderers.get_mut(r.get()).ok());
        if requests.twist != 0.0 {
            twist(&mut transform, renderer.as_deref_mut(), requests.twist);
        }
        if let Some(target) = requests.twist_toward {
            twist_toward(&mut transform, renderer.as_deref_mut(), target);
        }

        let mover = BodyMover::new(&sweeper, entity, body, &mut transform);
        if requests.jump_began {
            state.jump_begin(cfg, &mover, time.elapsed_secs());
        }
        if requests.jump_ended {
            state.jump_end();
        }
        state.update_jump_state(mover.rotation());
    }
}

fn integrate_gravity(
    mut bodies: Query<(&PlatformerBody, &mut PlatformerState, &Transform)>,
    time: Res<Time>,
) {
    for (cfg, mut state, transform) in &mut bodies {
        state.apply_gravity(cfg, transform.rotation, time.delta_secs());
    }
}

fn resolve_vertical(
    mut bodies: Query<
        (Entity, &GameRigidBody, &mut PlatformerState, &mut Transform),
        With<PlatformerBody>,
    >,
    sweeper: PhysicsSweeper,
    time: Res<Time>,
    mut commands: Commands,
) {
    for (entity, body, mut state, mut transform) in &mut bodies {
        let mut mover = BodyMover::new(&sweeper, entity, body, &mut transform);
        state.resolve_vertical(&mut mover, time.delta_secs());
        state.validate_velocity();
        mover.report_crushes(&mut commands);
    }
}

/// Stores this tick's standing result for landing detection on the next one.
pub(crate) fn record_standing(
    mut bodies: Query<(
        Entity,
        &GameRigidBody,
        &PlatformerBody,
        &mut PlatformerState,
        &mut Transform,
    )>,
    sweeper: PhysicsSweeper,
    time: Res<Time>,
) {
    for (entity, body, cfg, mut state, mut transform) in &mut bodies {
        // Only casts; the pose is left untouched.
        let transform = transform.bypass_change_detection();
        let mover = BodyMover::new(&sweeper, entity, body, transform);
        state.was_standing = state.is_standing(cfg, &mover, time.elapsed_secs());
    }
}

//! Blob shadows that glide along the ground under their body.

use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};

use crate::{
    prelude::*,
    sweep::{PhysicsSweeper, SweepWorld},
};

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(schedule, follow_ground.in_set(LeapSystems::PostResolve));
    }
}

/// Keeps this entity on the ground straight below `body`.
///
/// The shadow is placed in world space, so it should not be a child of the body.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(Transform)]
pub struct BodyShadow {
    pub body: Entity,
    /// What the shadow can land on.
    pub mask: LayerMask,
    /// Units per second the shadow may travel toward the ground point.
    pub speed: f32,
}

impl BodyShadow {
    pub fn new(body: Entity) -> Self {
        Self {
            body,
            mask: LayerMask::ALL,
            speed: 20.0,
        }
    }

    pub fn with_mask(mut self, mask: impl Into<LayerMask>) -> Self {
        self.mask = mask.into();
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Moves `shadow` toward the ground below `body`. Leaves it where it is
    /// when there is no ground. Returns whether ground was found.
    pub fn follow<W: SweepWorld + ?Sized>(
        &self,
        world: &W,
        body: &Transform,
        shadow: &mut Transform,
        dt: f32,
    ) -> bool {
        let Ok(down) = Dir3::new(body.rotation * Vec3::NEG_Y) else {
            return false;
        };
        let Some(hit) = world.ray_hit(
            body.translation,
            down,
            f32::MAX,
            self.mask,
            Some(self.body),
        ) else {
            return false;
        };
        let ground = body.translation + *down * hit.distance;
        shadow.translation = shadow.translation.move_towards(ground, self.speed * dt);
        true
    }
}

fn follow_ground(
    mut shadows: Query<(&BodyShadow, &mut Transform), Without<GameRigidBody>>,
    bodies: Query<&Transform, With<GameRigidBody>>,
    sweeper: PhysicsSweeper,
    time: Res<Time>,
) {
    for (shadow, mut transform) in &mut shadows {
        let Ok(body) = bodies.get(shadow.body) else {
            continue;
        };
        shadow.follow(&sweeper, body, &mut transform, time.delta_secs());
    }
}

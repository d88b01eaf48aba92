//! Side-scrolling movement: walking along the body's X axis only.

use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};

use crate::{
    body::BodyMover,
    intent::BodyIntent,
    prelude::*,
    sweep::{PhysicsSweeper, SweepWorld},
};

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(
            schedule,
            walk_along_x.in_set(LeapSystems::ResolveHorizontal),
        );
    }
}

/// 2D traversal. Any body shape works.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(PlatformerBody, Facing)]
pub struct Platformer2d {
    /// Local rotation of the renderer while facing right.
    pub right_rotation: Quat,
    /// Local rotation of the renderer while facing left.
    pub left_rotation: Quat,
    /// Flip the axis reported by [`forward`](Self::forward).
    pub invert_forward: bool,
    pub invert_right: bool,
    pub invert_up: bool,
}

impl Default for Platformer2d {
    fn default() -> Self {
        Self {
            right_rotation: Quat::IDENTITY,
            left_rotation: Quat::from_rotation_y(core::f32::consts::PI),
            invert_forward: false,
            invert_right: false,
            invert_up: false,
        }
    }
}

impl Platformer2d {
    pub fn renderer_rotation(&self, facing: Facing) -> Quat {
        match facing {
            Facing::Right => self.right_rotation,
            Facing::Left => self.left_rotation,
        }
    }

    /// World-space forward of the renderer for `facing` on a body rotated by `body_rotation`.
    pub fn forward(&self, body_rotation: Quat, facing: Facing) -> Vec3 {
        self.renderer_axis(body_rotation, facing, Vec3::NEG_Z, self.invert_forward)
    }

    pub fn right(&self, body_rotation: Quat, facing: Facing) -> Vec3 {
        self.renderer_axis(body_rotation, facing, Vec3::X, self.invert_right)
    }

    pub fn up(&self, body_rotation: Quat, facing: Facing) -> Vec3 {
        self.renderer_axis(body_rotation, facing, Vec3::Y, self.invert_up)
    }

    fn renderer_axis(
        &self,
        body_rotation: Quat,
        facing: Facing,
        local: Vec3,
        invert: bool,
    ) -> Vec3 {
        let axis = body_rotation * self.renderer_rotation(facing) * local;
        if invert { -axis } else { axis }
    }

    /// Walks along relative X by `magnitude` in `[-1, 1]` of the walking
    /// speed and turns toward the requested side. Returns the achieved fraction.
    pub fn move_x<W: SweepWorld + ?Sized>(
        &self,
        cfg: &PlatformerBody,
        mover: &mut BodyMover<W>,
        facing: &mut Facing,
        magnitude: f32,
        dt: f32,
    ) -> f32 {
        if let Some(side) = Facing::from_input(magnitude) {
            *facing = side;
        }
        cfg.walk(mover, Vec3::X, magnitude, dt, None)
    }
}

/// Which way a 2D body looks. Holding still keeps the last side.
#[derive(Component, Clone, Copy, Reflect, Default, Debug, PartialEq, Eq)]
#[reflect(Component)]
pub enum Facing {
    #[default]
    Right,
    Left,
}

impl Facing {
    pub fn from_input(magnitude: f32) -> Option<Self> {
        if magnitude > 0.0 {
            Some(Self::Right)
        } else if magnitude < 0.0 {
            Some(Self::Left)
        } else {
            None
        }
    }
}

fn walk_along_x(
    mut bodies: Query<(
        Entity,
        &GameRigidBody,
        &PlatformerBody,
        &Platformer2d,
        &mut Facing,
        &BodyIntent,
        &mut Transform,
        Option<&BodyRenderer>,
    )>,
    mut renderers: Query<&mut Transform, (With<RendererOf>, Without<GameRigidBody>)>,
    sweeper: PhysicsSweeper,
    time: Res<Time>,
    mut commands: Commands,
) {
    for (entity, body, cfg, planar, mut facing, intent, mut transform, renderer) in &mut bodies {
        let mut mover = BodyMover::new(&sweeper, entity, body, &mut transform);
        if intent.move_x != 0.0 {
            planar.move_x(cfg, &mut mover, &mut facing, intent.move_x, time.delta_secs());
        }
        mover.report_crushes(&mut commands);

        if let Some(mut renderer) = renderer.and_then(|r| renderers.get_mut(r.get()).ok()) {
            renderer.rotation = planar.renderer_rotation(*facing);
        }
    }
}

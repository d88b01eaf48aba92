//! The visual child of a body, which turns independently of the body's heading.

use crate::{body::project_on_plane, prelude::*};

/// Marks the visual sub-transform of a body. The entity is expected to be a
/// child of the body so that its [`Transform`] is relative to it.
#[derive(Component, Clone, Copy)]
#[relationship(relationship_target = BodyRenderer)]
pub struct RendererOf(pub Entity);

#[derive(Component, Clone, Copy)]
#[relationship_target(relationship = RendererOf)]
pub struct BodyRenderer(Entity);

impl BodyRenderer {
    pub fn get(self) -> Entity {
        self.0
    }
}

/// Signed angle in radians turning `from` onto `to` about `axis`.
pub fn signed_angle(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    axis.dot(from.cross(to)).atan2(from.dot(to))
}

/// Turns the body about its own up axis by `angle` radians. The renderer's
/// world rotation is restored afterwards, so only the physical heading changes.
pub fn twist(body: &mut Transform, renderer: Option<&mut Transform>, angle: f32) {
    let old_body = body.rotation;
    body.rotate_local_y(angle);
    if let Some(renderer) = renderer {
        let world = old_body * renderer.rotation;
        renderer.rotation = body.rotation.inverse() * world;
    }
}

/// Turns the body about its up axis until its forward axis faces the
/// world-space `target`, seen from above.
pub fn twist_toward(body: &mut Transform, renderer: Option<&mut Transform>, target: Vec3) {
    let up = body.up();
    let to_target = project_on_plane(target - body.translation, *up);
    if to_target.length_squared() < f32::EPSILON {
        return;
    }
    let angle = signed_angle(*body.forward(), to_target, *up);
    twist(body, renderer, angle);
}

/// Rotates the renderer toward the body-local `direction` by at most `max_angle` radians.
pub fn face_direction(renderer: &mut Transform, direction: Vec3, max_angle: f32) {
    let direction = Vec3::new(direction.x, 0.0, direction.z);
    let Ok(direction) = Dir3::new(direction) else {
        return;
    };
    let target = Transform::IDENTITY.looking_to(direction, Vec3::Y).rotation;
    renderer.rotation = renderer.rotation.rotate_towards(target, max_angle);
}

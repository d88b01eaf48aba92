use crate::{fixed_update_utils::did_fixed_timestep_run_this_frame, prelude::*};

pub(super) fn plugin(app: &mut App) {
    app.add_systems(
        RunFixedMainLoop,
        clear_intent
            .run_if(did_fixed_timestep_run_this_frame)
            .in_set(RunFixedMainLoopSystems::AfterFixedMainLoop),
    );
}

/// What the body has been asked to do since the last fixed update loop.
/// Cleared after every fixed update loop that ran.
#[derive(Component, Clone, Reflect, Default, Debug, PartialEq)]
#[reflect(Component)]
pub struct BodyIntent {
    /// Sideways input in `[-1, 1]`.
    pub move_x: f32,
    /// Input along the body's local Z axis in `[-1, 1]`. Forward is negative.
    pub move_z: f32,
    pub jump_began: bool,
    pub jump_ended: bool,
    /// Radians to turn about the body's up axis. Accumulates.
    pub twist: f32,
    /// World-space point the body should turn to face.
    pub twist_toward: Option<Vec3>,
}

impl BodyIntent {
    pub fn move_x(&mut self, magnitude: f32) {
        self.move_x = magnitude.clamp(-1.0, 1.0);
    }

    pub fn move_z(&mut self, magnitude: f32) {
        self.move_z = magnitude.clamp(-1.0, 1.0);
    }

    pub fn jump_begin(&mut self) {
        self.jump_began = true;
    }

    pub fn jump_end(&mut self) {
        self.jump_ended = true;
    }

    pub fn twist(&mut self, angle: f32) {
        self.twist += angle;
    }

    pub fn twist_toward(&mut self, target: Vec3) {
        self.twist_toward = Some(target);
    }

    /// Horizontal intent in the body's frame, limited to the unit circle.
    pub fn horizontal(&self) -> Vec3 {
        Vec3::new(self.move_x, 0.0, self.move_z).clamp_length_max(1.0)
    }

    /// Removes the requests that must only be honoured once, leaving the held
    /// movement input in place for the remaining ticks of the frame.
    pub fn take_requests(&mut self) -> Self {
        Self {
            jump_began: core::mem::take(&mut self.jump_began),
            jump_ended: core::mem::take(&mut self.jump_ended),
            twist: core::mem::take(&mut self.twist),
            twist_toward: self.twist_toward.take(),
            ..default()
        }
    }

    pub fn clear(&mut self) {
        *self = default();
    }
}

fn clear_intent(mut intents: Query<&mut BodyIntent>) {
    for mut intent in &mut intents {
        intent.clear();
    }
}

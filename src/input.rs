//! Optional actions for [`bevy_enhanced_input`] that feed [`BodyIntent`].
//! Bind them on an entity that also carries the body.

use crate::{intent::BodyIntent, prelude::*};

pub(super) fn plugin(app: &mut App) {
    app.add_observer(apply_movement)
        .add_observer(begin_jump)
        .add_observer(end_jump)
        .add_observer(apply_turn);
}

/// Walking input. `y` is forward.
#[derive(Debug, InputAction)]
#[action_output(Vec2)]
pub struct Movement;

#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Jump;

/// Turn rate in radians per second; positive turns left.
#[derive(Debug, InputAction)]
#[action_output(f32)]
pub struct Turn;

fn apply_movement(movement: On<Fire<Movement>>, mut intents: Query<&mut BodyIntent>) {
    if let Ok(mut intent) = intents.get_mut(movement.context) {
        intent.move_x(movement.value.x);
        // Forward is the body's -Z.
        intent.move_z(-movement.value.y);
    }
}

fn begin_jump(jump: On<Start<Jump>>, mut intents: Query<&mut BodyIntent>) {
    if let Ok(mut intent) = intents.get_mut(jump.context) {
        intent.jump_begin();
    }
}

fn end_jump(jump: On<Complete<Jump>>, mut intents: Query<&mut BodyIntent>) {
    if let Ok(mut intent) = intents.get_mut(jump.context) {
        intent.jump_end();
    }
}

fn apply_turn(turn: On<Fire<Turn>>, mut intents: Query<&mut BodyIntent>, time: Res<Time>) {
    if let Ok(mut intent) = intents.get_mut(turn.context) {
        intent.twist(turn.value * time.delta_secs());
    }
}

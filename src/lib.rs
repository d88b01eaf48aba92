#![doc = include_str!("../readme.md")]

/// Everything you need to get started with `bevy_leap`
pub mod prelude {
    pub(crate) use {
        avian3d::prelude::*,
        bevy_app::prelude::*,
        bevy_derive::{Deref, DerefMut},
        bevy_ecs::prelude::*,
        bevy_enhanced_input::prelude::*,
        bevy_math::prelude::*,
        bevy_reflect::prelude::*,
        bevy_time::prelude::*,
        bevy_transform::prelude::*,
        bevy_utils::prelude::*,
    };

    pub use crate::{
        LeapPlugin, LeapSystems,
        body::{BodyMover, Crushed, GameRigidBody, SlipperyMove},
        input::{Jump, Movement, Turn},
        intent::BodyIntent,
        planar::{Facing, Platformer2d},
        platformer::{PlatformerBody, PlatformerState},
        renderer::{BodyRenderer, RendererOf},
        shadow::BodyShadow,
        shape::{BodyShape, CapsuleAxis, ShapeError},
        sweep::{CastHit, PhysicsSweeper, SweepWorld},
        traversal::Platformer3d,
    };
}

use crate::prelude::*;
use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};

pub mod body;
mod fixed_update_utils;
pub mod input;
pub mod intent;
pub mod planar;
pub mod platformer;
pub mod renderer;
pub mod shadow;
pub mod shape;
pub mod sweep;
#[cfg(test)]
mod test_world;
pub mod traversal;

pub use body::{BodyMover, Crushed, GameRigidBody, MAX_SLIDE_SWEEPS, SlipperyMove};

/// Also requires you to add [`PhysicsPlugins`] and [`EnhancedInputPlugin`] to work properly.
pub struct LeapPlugin {
    schedule: Interned<dyn ScheduleLabel>,
}

impl LeapPlugin {
    /// Create a new plugin in the given schedule. The default is [`FixedPostUpdate`].
    pub fn new(schedule: impl ScheduleLabel) -> Self {
        Self {
            schedule: schedule.intern(),
        }
    }
}

impl Default for LeapPlugin {
    fn default() -> Self {
        Self {
            schedule: FixedPostUpdate.intern(),
        }
    }
}

impl Plugin for LeapPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            self.schedule,
            (
                LeapSystems::ApplyIntent,
                LeapSystems::Integrate,
                LeapSystems::ResolveHorizontal,
                LeapSystems::ResolveVertical,
                LeapSystems::PostResolve,
            )
                .chain()
                .in_set(PhysicsSystems::First),
        )
        .add_plugins((
            body::plugin,
            input::plugin,
            intent::plugin,
            platformer::plugin(self.schedule),
            traversal::plugin(self.schedule),
            planar::plugin(self.schedule),
            shadow::plugin(self.schedule),
            fixed_update_utils::plugin,
        ));
    }
}

/// The phases every platformer body runs through each tick, in order.
/// Add your own systems to these sets to extend a phase.
#[derive(SystemSet, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum LeapSystems {
    /// Twists, jump requests and the switch to falling once a jump peaks.
    ApplyIntent,
    /// Gravity and drag.
    Integrate,
    ResolveHorizontal,
    ResolveVertical,
    /// Edge slipping, landing bookkeeping and shadows.
    PostResolve,
}

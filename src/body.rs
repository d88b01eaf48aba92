//! The shape-cast rigid body: casting, obstructed moves and wall sliding.

use tracing::error;

use crate::{
    prelude::*,
    shape::ShapeError,
    sweep::{CastHit, RayHit, SweepWorld},
};

pub(super) fn plugin(app: &mut App) {
    app.add_systems(PreUpdate, refresh_cast_colliders);
}

/// Fraction of the pre-sweep budget a slide has to consume before the
/// obstructions are swept again.
const RECAST_MIN_DELTA: f32 = 0.1;

/// Hard cap on the re-sweeps a single [`BodyMover::slippery_move`] may perform.
pub const MAX_SLIDE_SWEEPS: usize = 16;

/// A kinematic body that only moves as far as its shape can be swept.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(Transform)]
pub struct GameRigidBody {
    pub shape: BodyShape,
    /// Padding added to every cast and removed from every reported distance.
    pub skin_thickness: f32,
    pub collision_mask: LayerMask,
    /// Drop hits against the body's own collider.
    pub ignore_self_collision: bool,
    /// Trigger [`Crushed`] instead of logging an error when the body ends up inside something.
    pub notify_crush: bool,
    #[reflect(ignore)]
    cast_collider: Collider,
}

impl Default for GameRigidBody {
    fn default() -> Self {
        // Swept form of the default 0.5 x 2.0 capsule.
        let cast_collider = Collider::capsule_endpoints(0.5, Vec3::NEG_Y * 0.5, Vec3::Y * 0.5);
        Self {
            shape: BodyShape::default(),
            skin_thickness: Self::DEFAULT_SKIN,
            collision_mask: LayerMask::ALL,
            ignore_self_collision: true,
            notify_crush: false,
            cast_collider,
        }
    }
}

impl GameRigidBody {
    pub const DEFAULT_SKIN: f32 = 0.05;

    /// Fails if `shape` cannot be swept with the default skin.
    pub fn new(shape: BodyShape) -> Result<Self, ShapeError> {
        let cast_collider = shape.cast_collider(Self::DEFAULT_SKIN)?;
        Ok(Self {
            shape,
            cast_collider,
            ..default()
        })
    }

    pub fn with_skin(mut self, skin_thickness: f32) -> Result<Self, ShapeError> {
        self.cast_collider = self.shape.cast_collider(skin_thickness)?;
        self.skin_thickness = skin_thickness;
        Ok(self)
    }

    pub fn with_mask(mut self, mask: impl Into<LayerMask>) -> Self {
        self.collision_mask = mask.into();
        self
    }

    pub fn with_crush_notifications(mut self) -> Self {
        self.notify_crush = true;
        self
    }

    /// Rebuilds the swept collider after `shape` or `skin_thickness` changed.
    pub fn rebuild_cast_collider(&mut self) -> Result<(), ShapeError> {
        self.cast_collider = self.shape.cast_collider(self.skin_thickness)?;
        Ok(())
    }

    pub fn cast_collider(&self) -> &Collider {
        &self.cast_collider
    }
}

/// Fired at a body whose move started inside another collider.
#[derive(EntityEvent, Clone, Copy, Debug)]
pub struct Crushed {
    pub entity: Entity,
    pub obstacle: Entity,
}

fn refresh_cast_colliders(
    mut bodies: Query<(Entity, &mut GameRigidBody), Changed<GameRigidBody>>,
) -> Result {
    for (entity, mut body) in &mut bodies {
        body.bypass_change_detection()
            .rebuild_cast_collider()
            .map_err(|err| {
                error!("{entity} has an unusable body shape: {err}");
                err
            })?;
    }
    Ok(())
}

/// `v` with its component along `normal` removed.
pub(crate) fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let len_sq = normal.length_squared();
    if len_sq < f32::EPSILON {
        return v;
    }
    v - normal * (v.dot(normal) / len_sq)
}

/// Everything one body needs to cast and move during a tick.
///
/// Directions taken by the plain methods are relative to the body's rotation;
/// the `absolute_*` methods take world-space directions.
pub struct BodyMover<'a, W: SweepWorld + ?Sized> {
    world: &'a W,
    entity: Entity,
    body: &'a GameRigidBody,
    transform: &'a mut Transform,
    crushes: Vec<Entity>,
}

impl<'a, W: SweepWorld + ?Sized> BodyMover<'a, W> {
    pub fn new(
        world: &'a W,
        entity: Entity,
        body: &'a GameRigidBody,
        transform: &'a mut Transform,
    ) -> Self {
        Self {
            world,
            entity,
            body,
            transform,
            crushes: Vec::new(),
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn body(&self) -> &GameRigidBody {
        self.body
    }

    pub fn position(&self) -> Vec3 {
        self.transform.translation
    }

    pub fn rotation(&self) -> Quat {
        self.transform.rotation
    }

    /// The body's up axis in world space.
    pub fn up(&self) -> Vec3 {
        self.transform.rotation * Vec3::Y
    }

    /// Places the body without any collision checks.
    pub fn teleport(&mut self, position: Vec3) {
        self.transform.translation = position;
    }

    pub fn relative_to_absolute_rotation(&self) -> Quat {
        self.transform.rotation
    }

    pub fn absolute_to_relative_rotation(&self) -> Quat {
        self.relative_to_absolute_rotation().inverse()
    }

    /// Obstacles this body was found overlapping since the mover was created.
    pub fn crushes(&self) -> &[Entity] {
        &self.crushes
    }

    /// Triggers [`Crushed`] for every overlap recorded by this mover.
    pub fn report_crushes(&mut self, commands: &mut Commands) {
        for obstacle in self.crushes.drain(..) {
            commands.trigger(Crushed {
                entity: self.entity,
                obstacle,
            });
        }
    }

    /// The entity every query of this body skips.
    fn excluded(&self) -> Option<Entity> {
        self.body.ignore_self_collision.then_some(self.entity)
    }

    fn core_cast(&self, start: Vec3, direction: Vec3, distance: f32) -> Vec<CastHit> {
        let (direction, distance, flipped) = if distance < 0.0 {
            (-direction, -distance, true)
        } else {
            (direction, distance, false)
        };
        let Ok(direction) = Dir3::new(direction) else {
            return Vec::new();
        };
        if !distance.is_finite() {
            return Vec::new();
        }

        let skin = self.body.skin_thickness;
        let clamp = self.body.shape.clamps_skin_correction();
        let mut hits = self.world.shape_hits(
            &self.body.cast_collider,
            start,
            self.transform.rotation,
            direction,
            distance + skin,
            self.body.collision_mask,
            self.excluded(),
        );
        for hit in hits.iter_mut().filter(|hit| !hit.is_crush()) {
            hit.distance -= skin;
            if clamp {
                hit.distance = hit.distance.max(0.0);
            }
            if flipped {
                hit.distance = -hit.distance;
            }
        }
        hits
    }

    /// Every hit the body's shape would meet travelling `distance` along the
    /// world-space `direction` from `start`. Negative distances sweep backwards
    /// and report negative hit distances.
    pub fn absolute_cast_all_from(
        &self,
        direction: Vec3,
        distance: f32,
        start: Vec3,
    ) -> Vec<CastHit> {
        self.core_cast(start, direction, distance)
    }

    pub fn absolute_cast_all(&self, direction: Vec3, distance: f32) -> Vec<CastHit> {
        self.absolute_cast_all_from(direction, distance, self.position())
    }

    /// The nearest hit, if anything is in the way.
    pub fn absolute_cast_from(
        &self,
        direction: Vec3,
        distance: f32,
        start: Vec3,
    ) -> Option<CastHit> {
        self.absolute_cast_all_from(direction, distance, start)
            .into_iter()
            .min_by(|a, b| a.distance.abs().total_cmp(&b.distance.abs()))
    }

    pub fn absolute_cast(&self, direction: Vec3, distance: f32) -> Option<CastHit> {
        self.absolute_cast_from(direction, distance, self.position())
    }

    pub fn cast_all_from(&self, direction: Vec3, distance: f32, start: Vec3) -> Vec<CastHit> {
        let direction = self.relative_to_absolute_rotation() * direction;
        self.absolute_cast_all_from(direction, distance, start)
    }

    pub fn cast_all(&self, direction: Vec3, distance: f32) -> Vec<CastHit> {
        self.cast_all_from(direction, distance, self.position())
    }

    pub fn cast_from(&self, direction: Vec3, distance: f32, start: Vec3) -> Option<CastHit> {
        let direction = self.relative_to_absolute_rotation() * direction;
        self.absolute_cast_from(direction, distance, start)
    }

    pub fn cast(&self, direction: Vec3, distance: f32) -> Option<CastHit> {
        self.cast_from(direction, distance, self.position())
    }

    /// Plain ray along the world-space `direction`, for checks that must not
    /// be widened by the body's shape.
    pub fn ray(&self, origin: Vec3, direction: Vec3, distance: f32) -> Option<RayHit> {
        let direction = Dir3::new(direction).ok()?;
        self.world.ray_hit(
            origin,
            direction,
            distance,
            self.body.collision_mask,
            self.excluded(),
        )
    }

    /// Applies as much of the relative `motion` as is unobstructed and returns
    /// the motion actually made.
    pub fn move_by(&mut self, motion: Vec3) -> Vec3 {
        let direction = motion.normalize_or_zero();
        direction * self.move_relative(direction, motion.length())
    }

    /// Moves along the relative `direction` by up to `magnitude`, stopping short
    /// of the nearest obstruction. Returns the distance travelled.
    pub fn move_relative(&mut self, direction: Vec3, magnitude: f32) -> f32 {
        self.move_absolute(self.relative_to_absolute_rotation() * direction, magnitude, false)
    }

    /// World-space variant of [`move_relative`](Self::move_relative). With
    /// `all_or_nothing` the body only moves if the whole path is clear.
    pub fn move_absolute(&mut self, direction: Vec3, magnitude: f32, all_or_nothing: bool) -> f32 {
        let Some(direction) = direction.try_normalize() else {
            return 0.0;
        };
        if magnitude == 0.0 || magnitude.is_nan() {
            return 0.0;
        }

        let mut travel = magnitude;
        for hit in self.absolute_cast_all(direction, magnitude) {
            if hit.is_crush() {
                self.crush(hit.entity);
                travel = 0.0;
                break;
            }
            if hit.distance.abs() < travel.abs() {
                travel = hit.distance;
            }
        }

        if travel.is_nan() || (all_or_nothing && travel.abs() < magnitude.abs()) {
            return 0.0;
        }
        if travel != 0.0 {
            self.transform.translation += direction * travel;
        }
        travel
    }

    fn crush(&mut self, obstacle: Entity) {
        if self.body.notify_crush {
            self.crushes.push(obstacle);
        } else {
            error!(
                "{} is stuck inside {obstacle}; it will not move until it is freed",
                self.entity
            );
        }
    }

    /// Moves along `request.direction`, sliding along whatever is in the way.
    /// Returns the budget that could not be spent; non-zero means the body is stuck.
    pub fn slippery_move(&mut self, request: SlipperyMove) -> f32 {
        let Some(direction) = request.direction.try_normalize() else {
            return request.magnitude;
        };

        let mut remaining = request.magnitude;
        if !request.skip_initial_move {
            remaining -= self.move_relative(direction, request.magnitude);
        }

        let mut moved = true;
        let mut sweeps = 0;
        while remaining > 0.0 && moved && sweeps < MAX_SLIDE_SWEEPS {
            sweeps += 1;
            moved = false;

            let at_cast = remaining;
            let min_delta = at_cast * RECAST_MIN_DELTA;
            for hit in self.cast_all(direction, remaining) {
                if hit.is_crush() {
                    continue;
                }
                // Points into the obstruction, in our frame.
                let mut normal = self.absolute_to_relative_rotation() * -hit.normal;
                if let Some(clamp) = request.clamp_normal {
                    normal = project_on_plane(normal, clamp).normalize_or_zero();
                }
                let parallel = direction - normal * direction.dot(normal);

                if request.reduce_on_slide && normal != Vec3::ZERO {
                    remaining *= normal.angle_between(direction).sin();
                }
                remaining -= self.move_relative(parallel, remaining);

                if at_cast - remaining >= min_delta {
                    moved = true;
                    break;
                }
            }
        }
        remaining
    }
}

/// Arguments of [`BodyMover::slippery_move`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlipperyMove {
    /// Relative heading. The body never travels against it.
    pub direction: Vec3,
    pub magnitude: f32,
    /// Relative normal of a plane the slide directions are flattened onto.
    pub clamp_normal: Option<Vec3>,
    /// Scale the budget down by how directly the body pushes into a surface.
    pub reduce_on_slide: bool,
    /// Only slide; assume the direct move was already attempted.
    pub skip_initial_move: bool,
}

impl SlipperyMove {
    pub fn new(direction: Vec3, magnitude: f32) -> Self {
        Self {
            direction,
            magnitude,
            clamp_normal: None,
            reduce_on_slide: true,
            skip_initial_move: false,
        }
    }

    pub fn clamped_to(mut self, normal: Vec3) -> Self {
        self.clamp_normal = Some(normal);
        self
    }

    pub fn reduce_on_slide(mut self, reduce: bool) -> Self {
        self.reduce_on_slide = reduce;
        self
    }

    pub fn skip_initial_move(mut self) -> Self {
        self.skip_initial_move = true;
        self
    }
}

//! Collider shapes a [`GameRigidBody`](crate::GameRigidBody) can sweep with.

use crate::prelude::*;
use thiserror::Error;

/// Local axis a capsule's segment runs along.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CapsuleAxis {
    X,
    #[default]
    Y,
    Z,
}

impl CapsuleAxis {
    pub fn local_direction(self) -> Vec3 {
        match self {
            Self::X => Vec3::X,
            Self::Y => Vec3::Y,
            Self::Z => Vec3::Z,
        }
    }
}

/// The shape swept through the world whenever a body casts or moves.
///
/// Only the capsule answers [`radius`](Self::radius) and the feet/head offsets.
/// Stair climbing and edge slipping depend on those, so a box or convex body
/// can only be used with the 2D strategy or the bare [`BodyMover`](crate::BodyMover).
#[derive(Reflect, Clone, Debug, PartialEq)]
pub enum BodyShape {
    Cuboid {
        half_extents: Vec3,
    },
    Capsule {
        radius: f32,
        /// Total height, including both caps.
        height: f32,
        axis: CapsuleAxis,
        center: Vec3,
    },
    Convex {
        points: Vec<Vec3>,
    },
}

impl Default for BodyShape {
    fn default() -> Self {
        Self::capsule(0.5, 2.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("{capability} is not implemented for {shape} bodies")]
    Unimplemented {
        shape: &'static str,
        capability: &'static str,
    },
    #[error("capsule of radius {radius} is too short: height {height} is below its diameter")]
    CapsuleTooShort { radius: f32, height: f32 },
    #[error("shape dimensions must be positive and finite")]
    InvalidDimensions,
    #[error("cuboid half extents {half_extents} do not leave room for a skin of {skin}")]
    SkinTooThick { half_extents: Vec3, skin: f32 },
    #[error("skin thickness must be non-negative and finite, got {0}")]
    NegativeSkin(f32),
    #[error("could not build a convex hull from {0} points")]
    DegenerateHull(usize),
}

impl BodyShape {
    /// Upright capsule centered on the body origin.
    pub fn capsule(radius: f32, height: f32) -> Self {
        Self::Capsule {
            radius,
            height,
            axis: CapsuleAxis::Y,
            center: Vec3::ZERO,
        }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::Cuboid { half_extents }
    }

    pub fn convex(points: impl Into<Vec<Vec3>>) -> Self {
        Self::Convex {
            points: points.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cuboid { .. } => "cuboid",
            Self::Capsule { .. } => "capsule",
            Self::Convex { .. } => "convex",
        }
    }

    fn unimplemented(&self, capability: &'static str) -> ShapeError {
        ShapeError::Unimplemented {
            shape: self.name(),
            capability,
        }
    }

    pub fn radius(&self) -> Result<f32, ShapeError> {
        match self {
            Self::Capsule { radius, .. } => Ok(*radius),
            _ => Err(self.unimplemented("radius")),
        }
    }

    /// Offset from the body origin to the bottom of the shape, in the body's local frame.
    pub fn feet_offset(&self) -> Result<Vec3, ShapeError> {
        match self {
            Self::Capsule {
                height,
                axis,
                center,
                ..
            } => Ok(*center - axis.local_direction() * (height * 0.5)),
            _ => Err(self.unimplemented("feet offset")),
        }
    }

    /// Offset from the body origin to the top of the shape, in the body's local frame.
    pub fn head_offset(&self) -> Result<Vec3, ShapeError> {
        match self {
            Self::Capsule {
                height,
                axis,
                center,
                ..
            } => Ok(*center + axis.local_direction() * (height * 0.5)),
            _ => Err(self.unimplemented("head offset")),
        }
    }

    /// Distance from the capsule center to either hemisphere center.
    pub fn segment_half_length(&self) -> Result<f32, ShapeError> {
        match self {
            Self::Capsule { radius, height, .. } => Ok(height * 0.5 - radius),
            _ => Err(self.unimplemented("segment length")),
        }
    }

    /// Capsule casts never report a distance below zero once the skin is removed.
    /// Boxes and hulls do, which lets a body that sank into the skin back out.
    pub fn clamps_skin_correction(&self) -> bool {
        matches!(self, Self::Capsule { .. })
    }

    pub fn validate(&self, skin: f32) -> Result<(), ShapeError> {
        if !skin.is_finite() || skin < 0.0 {
            return Err(ShapeError::NegativeSkin(skin));
        }
        match self {
            Self::Cuboid { half_extents } => {
                if !half_extents.is_finite() || half_extents.min_element() <= 0.0 {
                    return Err(ShapeError::InvalidDimensions);
                }
                if half_extents.min_element() <= skin {
                    return Err(ShapeError::SkinTooThick {
                        half_extents: *half_extents,
                        skin,
                    });
                }
            }
            Self::Capsule {
                radius,
                height,
                center,
                ..
            } => {
                if !radius.is_finite() || !height.is_finite() || !center.is_finite() {
                    return Err(ShapeError::InvalidDimensions);
                }
                if *radius <= 0.0 {
                    return Err(ShapeError::InvalidDimensions);
                }
                if *height < radius * 2.0 {
                    return Err(ShapeError::CapsuleTooShort {
                        radius: *radius,
                        height: *height,
                    });
                }
            }
            Self::Convex { points } => {
                if points.len() < 4 || points.iter().any(|p| !p.is_finite()) {
                    return Err(ShapeError::DegenerateHull(points.len()));
                }
            }
        }
        Ok(())
    }

    /// Builds the collider that is actually swept. Cuboids are shrunk by `skin`
    /// on every side; the other shapes are swept at full size.
    pub fn cast_collider(&self, skin: f32) -> Result<Collider, ShapeError> {
        self.validate(skin)?;
        match self {
            Self::Cuboid { half_extents } => {
                let size = (*half_extents - Vec3::splat(skin)) * 2.0;
                Ok(Collider::cuboid(size.x, size.y, size.z))
            }
            Self::Capsule {
                radius,
                axis,
                center,
                ..
            } => {
                let half_segment = self.segment_half_length()?;
                let dir = axis.local_direction();
                Ok(Collider::capsule_endpoints(
                    *radius,
                    *center - dir * half_segment,
                    *center + dir * half_segment,
                ))
            }
            Self::Convex { points } => Collider::convex_hull(points.clone())
                .ok_or(ShapeError::DegenerateHull(points.len())),
        }
    }
}

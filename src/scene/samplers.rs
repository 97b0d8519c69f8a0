//! Placement and articulation samplers.
//!
//! Three placement flavors mirror the three kinds of initial-state
//! constraints: unconditional region sampling in the workspace frame,
//! site-conditioned sampling relative to a live site pose, and
//! object-conditioned sampling relative to another object's pose.
//! Articulation samplers draw initial joint values for open/close and
//! turn-on/off constraints.

use rand::{Rng, RngExt};

use crate::error::SceneError;
use crate::scene::camera::sample_uniform;
use crate::scene::catalog::RotationAxis;
use crate::states::SimQuery;
use crate::utils::yaw_quat;

/// Clearance above a support surface when dropping an object into place.
const PLACEMENT_DROP_HEIGHT: f64 = 0.02;

/// Vertical offset when stacking one object directly on another.
const STACK_HEIGHT: f64 = 0.05;

/// One sampled world-frame placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub name: String,
    pub pos: [f64; 3],
    /// Unit quaternion, `[w, x, y, z]`.
    pub quat: [f64; 4],
    pub is_fixture: bool,
}

/// Uniform sampling over one or more workspace rectangles with yaw rotation.
#[derive(Debug, Clone)]
pub struct RegionRandomSampler {
    pub object: String,
    pub is_fixture: bool,
    /// Parallel x/y interval lists; one index is drawn per sample.
    pub x_ranges: Vec<(f64, f64)>,
    pub y_ranges: Vec<(f64, f64)>,
    pub rotation: (f64, f64),
    pub rotation_axis: RotationAxis,
    pub z_offset: f64,
    pub reference_pos: [f64; 3],
}

impl RegionRandomSampler {
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<Placement, SceneError> {
        if self.x_ranges.is_empty() || self.x_ranges.len() != self.y_ranges.len() {
            return Err(SceneError::EmptyRanges {
                region: self.object.clone(),
            });
        }
        let idx = rng.random_range(0..self.x_ranges.len());
        let x = sample_uniform(self.x_ranges[idx], rng);
        let y = sample_uniform(self.y_ranges[idx], rng);
        let angle = sample_uniform(self.rotation, rng);
        Ok(Placement {
            name: self.object.clone(),
            pos: [
                self.reference_pos[0] + x,
                self.reference_pos[1] + y,
                self.reference_pos[2] + self.z_offset,
            ],
            quat: axis_quat(self.rotation_axis, angle),
            is_fixture: self.is_fixture,
        })
    }
}

/// Sampling relative to a live site pose (an object's interior or surface
/// region). Resolved against the simulation at reset time, after the parent
/// has been placed.
#[derive(Debug, Clone)]
pub struct SiteConditionedSampler {
    pub object: String,
    /// Site the placement is conditioned on.
    pub site: String,
    /// Entity the site belongs to.
    pub reference: String,
    /// Site xy half-extents; offsets are drawn within them.
    pub half_size: [f64; 2],
    /// True for containment (`in`) constraints, placing at the site center
    /// height rather than above the surface.
    pub inside: bool,
    pub rotation: (f64, f64),
    pub rotation_axis: RotationAxis,
}

impl SiteConditionedSampler {
    pub fn sample<R: Rng>(
        &self,
        rng: &mut R,
        sim: &dyn SimQuery,
    ) -> Result<Placement, SceneError> {
        let site_pose = sim
            .site_pose(&self.site)
            .ok_or_else(|| SceneError::PlacementFailed {
                object: self.object.clone(),
                reason: format!("site '{}' has no pose", self.site),
            })?;
        let dx = sample_uniform((-self.half_size[0], self.half_size[0]), rng);
        let dy = sample_uniform((-self.half_size[1], self.half_size[1]), rng);
        let dz = if self.inside { 0.0 } else { PLACEMENT_DROP_HEIGHT };
        let angle = sample_uniform(self.rotation, rng);
        Ok(Placement {
            name: self.object.clone(),
            pos: [
                site_pose.pos[0] + dx,
                site_pose.pos[1] + dy,
                site_pose.pos[2] + dz,
            ],
            quat: axis_quat(self.rotation_axis, angle),
            is_fixture: false,
        })
    }
}

/// Sampling directly on top of another object's live pose.
#[derive(Debug, Clone)]
pub struct ObjectConditionedSampler {
    pub object: String,
    /// Object the placement is stacked on.
    pub reference: String,
    pub rotation: (f64, f64),
    pub rotation_axis: RotationAxis,
}

impl ObjectConditionedSampler {
    pub fn sample<R: Rng>(
        &self,
        rng: &mut R,
        sim: &dyn SimQuery,
    ) -> Result<Placement, SceneError> {
        let reference_pose =
            sim.body_pose(&self.reference)
                .ok_or_else(|| SceneError::PlacementFailed {
                    object: self.object.clone(),
                    reason: format!("reference '{}' has no pose", self.reference),
                })?;
        let angle = sample_uniform(self.rotation, rng);
        Ok(Placement {
            name: self.object.clone(),
            pos: [
                reference_pose.pos[0],
                reference_pose.pos[1],
                reference_pose.pos[2] + STACK_HEIGHT,
            ],
            quat: axis_quat(self.rotation_axis, angle),
            is_fixture: false,
        })
    }
}

/// Kind of articulation constraint a joint sampler realizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointInitKind {
    Open,
    Close,
    TurnOn,
    TurnOff,
}

/// Draws an initial joint value inside the range that realizes an
/// articulation constraint from the initial state.
#[derive(Debug, Clone)]
pub struct JointSampler {
    pub name: String,
    pub joints: Vec<String>,
    pub kind: JointInitKind,
    pub range: (f64, f64),
}

impl JointSampler {
    /// Samples one value applied to all of the entity's joints.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        sample_uniform(self.range, rng)
    }
}

fn axis_quat(axis: RotationAxis, angle: f64) -> [f64; 4] {
    let half = angle / 2.0;
    match axis {
        RotationAxis::X => [half.cos(), half.sin(), 0.0, 0.0],
        RotationAxis::Y => [half.cos(), 0.0, half.sin(), 0.0],
        RotationAxis::Z => yaw_quat(angle),
    }
}

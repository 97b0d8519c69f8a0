//! Runtime state wrappers bound to simulation entities.
//!
//! One handle is created per entity at scene load and destroyed on teardown.
//! The "tracked" subset (entities whose category visibly changes, e.g.
//! switches) is refreshed every physics step via [`ObjectState::update_state`].

use std::sync::Arc;

use crate::error::PredicateError;
use crate::states::queries::{Pose, SimQuery};
use crate::utils::quat_rotate;

/// Max xy distance between centers for an on-top check to hold.
const ON_TOP_XY_TOLERANCE: f64 = 0.03;

/// Vertical band above a site surface within which an object counts as on it.
const SITE_ON_TOP_Z_BAND: f64 = 0.10;

/// Minimum vertical half-extent used for flat (zero-height) zone containment.
const MIN_CONTAIN_HALF_HEIGHT: f64 = 0.05;

/// Minimum world-z alignment of the local up axis for an upright check.
const UP_ALIGNMENT_THRESHOLD: f64 = 0.9;

/// Alternate finger-geometry subsets for the tolerant grasp check. Slippery
/// or irregular geometry (e.g. mug handles) often touches only one pad.
const TOLERANT_GRASP_GEOM_SETS: [[&str; 2]; 2] = [
    ["gripper0_finger1_collision", "gripper0_finger2_pad_collision"],
    ["gripper0_finger2_collision", "gripper0_finger1_pad_collision"],
];

/// Joint-position thresholds for articulated entities.
///
/// Pure data: each physical asset differs only in these constants, so
/// articulation behavior is parameterized rather than subclassed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArticulationSpec {
    /// Joint range in which the entity counts as open.
    pub open_ranges: (f64, f64),
    /// Joint range in which the entity counts as closed.
    pub close_ranges: (f64, f64),
    /// Joint range in which the entity counts as switched on, if it has a
    /// turn-on affordance.
    pub turnon_ranges: Option<(f64, f64)>,
    /// Joint range in which the entity counts as switched off.
    pub turnoff_ranges: Option<(f64, f64)>,
}

impl ArticulationSpec {
    pub fn is_open(&self, qpos: f64) -> bool {
        in_range(self.open_ranges, qpos)
    }

    pub fn is_close(&self, qpos: f64) -> bool {
        in_range(self.close_ranges, qpos)
    }

    pub fn is_on(&self, qpos: f64) -> Option<bool> {
        self.turnon_ranges.map(|r| in_range(r, qpos))
    }

    pub fn is_off(&self, qpos: f64) -> Option<bool> {
        self.turnoff_ranges.map(|r| in_range(r, qpos))
    }

    /// True if the spec carries a turn-on affordance.
    pub fn has_turnon_affordance(&self) -> bool {
        self.turnon_ranges.is_some()
    }
}

fn in_range(range: (f64, f64), qpos: f64) -> bool {
    let lo = range.0.min(range.1);
    let hi = range.0.max(range.1);
    qpos >= lo && qpos <= hi
}

/// Live wrapper around one movable object or fixture.
#[derive(Clone)]
pub struct ObjectState {
    name: String,
    joints: Vec<String>,
    is_fixture: bool,
    articulation: Option<ArticulationSpec>,
    half_extents: [f64; 3],
    sim: Arc<dyn SimQuery>,
    latched_on: bool,
}

impl ObjectState {
    pub fn new(
        name: impl Into<String>,
        sim: Arc<dyn SimQuery>,
        joints: Vec<String>,
        articulation: Option<ArticulationSpec>,
        half_extents: [f64; 3],
        is_fixture: bool,
    ) -> Self {
        Self {
            name: name.into(),
            joints,
            is_fixture,
            articulation,
            half_extents,
            sim,
            latched_on: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_fixture(&self) -> bool {
        self.is_fixture
    }

    pub fn joints(&self) -> &[String] {
        &self.joints
    }

    pub fn articulation(&self) -> Option<&ArticulationSpec> {
        self.articulation.as_ref()
    }

    /// World pose of the entity's root body.
    pub fn geom_state(&self) -> Result<Pose, PredicateError> {
        self.sim
            .body_pose(&self.name)
            .ok_or_else(|| PredicateError::UnknownEntity(self.name.clone()))
    }

    /// Current positions of all articulation joints.
    pub fn joint_state(&self) -> Result<Vec<f64>, PredicateError> {
        if self.joints.is_empty() {
            return Err(PredicateError::NoJoints(self.name.clone()));
        }
        self.joints
            .iter()
            .map(|joint| {
                self.sim
                    .joint_position(joint)
                    .ok_or_else(|| PredicateError::UnknownEntity(joint.clone()))
            })
            .collect()
    }

    pub fn check_contact(&self, other_name: &str) -> bool {
        self.sim.in_contact(&self.name, other_name)
    }

    /// True if `other_pos` lies inside this entity's bounding box.
    pub fn check_contain(&self, other_pos: [f64; 3]) -> Result<bool, PredicateError> {
        let pose = self.geom_state()?;
        let hz = self.half_extents[2].max(MIN_CONTAIN_HALF_HEIGHT);
        Ok((other_pos[0] - pose.pos[0]).abs() <= self.half_extents[0]
            && (other_pos[1] - pose.pos[1]).abs() <= self.half_extents[1]
            && (other_pos[2] - pose.pos[2]).abs() <= hz)
    }

    /// True if the entity named `other_name` at `other_pos` rests on top of
    /// this entity: contact, this entity below, and centers within 3 cm in xy.
    pub fn check_ontop(
        &self,
        other_name: &str,
        other_pos: [f64; 3],
    ) -> Result<bool, PredicateError> {
        let pose = self.geom_state()?;
        let xy_dist = ((pose.pos[0] - other_pos[0]).powi(2)
            + (pose.pos[1] - other_pos[1]).powi(2))
        .sqrt();
        Ok(pose.pos[2] <= other_pos[2]
            && self.check_contact(other_name)
            && xy_dist < ON_TOP_XY_TOLERANCE)
    }

    /// True if the local up axis is aligned with world up.
    pub fn is_upright(&self) -> Result<bool, PredicateError> {
        let pose = self.geom_state()?;
        let up = quat_rotate(pose.quat, [0.0, 0.0, 1.0]);
        Ok(up[2] > UP_ALIGNMENT_THRESHOLD)
    }

    /// Open if any joint is inside the open range.
    pub fn is_open(&self) -> Result<bool, PredicateError> {
        let spec = self.require_articulation()?;
        Ok(self.joint_state()?.iter().any(|&q| spec.is_open(q)))
    }

    /// Closed only if every joint is inside the close range.
    pub fn is_close(&self) -> Result<bool, PredicateError> {
        let spec = self.require_articulation()?;
        Ok(self.joint_state()?.iter().all(|&q| spec.is_close(q)))
    }

    /// Switched on if any joint is inside the turn-on range, or if the
    /// entity latched on earlier (a pressed switch stays on).
    pub fn turn_on(&self) -> Result<bool, PredicateError> {
        if self.latched_on {
            return Ok(true);
        }
        let spec = self.require_articulation()?;
        let states = self.joint_state()?;
        Ok(states.iter().any(|&q| spec.is_on(q).unwrap_or(false)))
    }

    /// Switched off only if every joint is inside the turn-off range and the
    /// entity has not latched on.
    pub fn turn_off(&self) -> Result<bool, PredicateError> {
        if self.latched_on {
            return Ok(false);
        }
        let spec = self.require_articulation()?;
        let states = self.joint_state()?;
        Ok(states.iter().all(|&q| spec.is_off(q).unwrap_or(false)))
    }

    /// Per-step refresh for tracked entities: once the turn-on range is
    /// observed, the on state latches so a momentary press is not missed
    /// between predicate checks.
    pub fn update_state(&mut self) {
        if let Some(spec) = &self.articulation {
            if spec.has_turnon_affordance() {
                if let Ok(states) = self.joint_state() {
                    if states.iter().any(|&q| spec.is_on(q).unwrap_or(false)) {
                        self.latched_on = true;
                    }
                }
            }
        }
    }

    /// Grasp detection against the default gripper geometry set.
    pub fn check_grasp(&self) -> bool {
        self.sim.check_grasp(&[], &self.name)
    }

    /// Tolerant grasp detection: also accepts contact with either
    /// finger/pad subset to reduce false negatives on irregular geometry.
    pub fn check_grasp_tolerant(&self) -> bool {
        if self.check_grasp() {
            return true;
        }
        TOLERANT_GRASP_GEOM_SETS
            .iter()
            .any(|geoms| self.sim.check_grasp(geoms, &self.name))
    }

    fn require_articulation(&self) -> Result<&ArticulationSpec, PredicateError> {
        self.articulation
            .as_ref()
            .ok_or_else(|| PredicateError::NoJoints(self.name.clone()))
    }
}

impl std::fmt::Debug for ObjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectState")
            .field("name", &self.name)
            .field("joints", &self.joints)
            .field("is_fixture", &self.is_fixture)
            .field("latched_on", &self.latched_on)
            .finish()
    }
}

/// Live wrapper around a named site (region zone) attached to a parent entity.
#[derive(Clone)]
pub struct SiteObjectState {
    name: String,
    parent_name: String,
    half_size: [f64; 3],
    joints: Vec<String>,
    articulation: Option<ArticulationSpec>,
    sim: Arc<dyn SimQuery>,
}

impl SiteObjectState {
    pub fn new(
        name: impl Into<String>,
        parent_name: impl Into<String>,
        sim: Arc<dyn SimQuery>,
        half_size: [f64; 3],
        joints: Vec<String>,
        articulation: Option<ArticulationSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            parent_name: parent_name.into(),
            half_size,
            joints,
            articulation,
            sim,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_name(&self) -> &str {
        &self.parent_name
    }

    /// World pose of the site.
    pub fn geom_state(&self) -> Result<Pose, PredicateError> {
        self.sim
            .site_pose(&self.name)
            .ok_or_else(|| PredicateError::UnknownEntity(self.name.clone()))
    }

    /// True if `other_pos` lies inside the site's box.
    pub fn check_contain(&self, other_pos: [f64; 3]) -> Result<bool, PredicateError> {
        let pose = self.geom_state()?;
        let hz = self.half_size[2].max(MIN_CONTAIN_HALF_HEIGHT);
        Ok((other_pos[0] - pose.pos[0]).abs() <= self.half_size[0]
            && (other_pos[1] - pose.pos[1]).abs() <= self.half_size[1]
            && (other_pos[2] - pose.pos[2]).abs() <= hz)
    }

    /// True if `other_pos` rests on the site surface: within the xy bounds
    /// and in a narrow band above the site plane.
    pub fn check_ontop(&self, other_pos: [f64; 3]) -> Result<bool, PredicateError> {
        let pose = self.geom_state()?;
        Ok((other_pos[0] - pose.pos[0]).abs() <= self.half_size[0]
            && (other_pos[1] - pose.pos[1]).abs() <= self.half_size[1]
            && other_pos[2] >= pose.pos[2] - 1e-6
            && other_pos[2] <= pose.pos[2] + SITE_ON_TOP_Z_BAND)
    }

    /// Open if any of the parent's joints is inside the open range.
    pub fn is_open(&self) -> Result<bool, PredicateError> {
        let spec = self.require_articulation()?;
        Ok(self.joint_state()?.iter().any(|&q| spec.is_open(q)))
    }

    /// Closed only if every parent joint is inside the close range.
    pub fn is_close(&self) -> Result<bool, PredicateError> {
        let spec = self.require_articulation()?;
        Ok(self.joint_state()?.iter().all(|&q| spec.is_close(q)))
    }

    fn joint_state(&self) -> Result<Vec<f64>, PredicateError> {
        if self.joints.is_empty() {
            return Err(PredicateError::NoJoints(self.name.clone()));
        }
        self.joints
            .iter()
            .map(|joint| {
                self.sim
                    .joint_position(joint)
                    .ok_or_else(|| PredicateError::UnknownEntity(joint.clone()))
            })
            .collect()
    }

    fn require_articulation(&self) -> Result<&ArticulationSpec, PredicateError> {
        self.articulation
            .as_ref()
            .ok_or_else(|| PredicateError::NoJoints(self.name.clone()))
    }
}

impl std::fmt::Debug for SiteObjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteObjectState")
            .field("name", &self.name)
            .field("parent_name", &self.parent_name)
            .field("half_size", &self.half_size)
            .finish()
    }
}

/// Either kind of state handle; predicates take these as arguments.
#[derive(Debug, Clone)]
pub enum EntityState {
    Object(ObjectState),
    Site(SiteObjectState),
}

impl EntityState {
    pub fn name(&self) -> &str {
        match self {
            EntityState::Object(o) => o.name(),
            EntityState::Site(s) => s.name(),
        }
    }

    /// World position of the entity.
    pub fn position(&self) -> Result<[f64; 3], PredicateError> {
        Ok(match self {
            EntityState::Object(o) => o.geom_state()?.pos,
            EntityState::Site(s) => s.geom_state()?.pos,
        })
    }

    /// True if `other`'s position lies inside this entity's bounds.
    pub fn check_contain(&self, other: &EntityState) -> Result<bool, PredicateError> {
        let other_pos = other.position()?;
        match self {
            EntityState::Object(o) => o.check_contain(other_pos),
            EntityState::Site(s) => s.check_contain(other_pos),
        }
    }

    /// True if `other` rests on top of this entity.
    pub fn check_ontop(&self, other: &EntityState) -> Result<bool, PredicateError> {
        let other_pos = other.position()?;
        match self {
            EntityState::Object(o) => o.check_ontop(other.name(), other_pos),
            EntityState::Site(s) => s.check_ontop(other_pos),
        }
    }

    pub fn is_upright(&self) -> Result<bool, PredicateError> {
        match self {
            EntityState::Object(o) => o.is_upright(),
            EntityState::Site(s) => Err(PredicateError::UnknownEntity(s.name().to_string())),
        }
    }

    pub fn is_open(&self) -> Result<bool, PredicateError> {
        match self {
            EntityState::Object(o) => o.is_open(),
            EntityState::Site(s) => s.is_open(),
        }
    }

    pub fn is_close(&self) -> Result<bool, PredicateError> {
        match self {
            EntityState::Object(o) => o.is_close(),
            EntityState::Site(s) => s.is_close(),
        }
    }

    pub fn turn_on(&self) -> Result<bool, PredicateError> {
        match self {
            EntityState::Object(o) => o.turn_on(),
            EntityState::Site(s) => Err(PredicateError::NoJoints(s.name().to_string())),
        }
    }

    pub fn turn_off(&self) -> Result<bool, PredicateError> {
        match self {
            EntityState::Object(o) => o.turn_off(),
            EntityState::Site(s) => Err(PredicateError::NoJoints(s.name().to_string())),
        }
    }

    pub fn check_grasp(&self) -> Result<bool, PredicateError> {
        match self {
            EntityState::Object(o) => Ok(o.check_grasp()),
            EntityState::Site(s) => Err(PredicateError::UnknownEntity(s.name().to_string())),
        }
    }

    pub fn check_grasp_tolerant(&self) -> Result<bool, PredicateError> {
        match self {
            EntityState::Object(o) => Ok(o.check_grasp_tolerant()),
            EntityState::Site(s) => Err(PredicateError::UnknownEntity(s.name().to_string())),
        }
    }

    /// Joint positions, for the diagnostic predicate.
    pub fn joint_state(&self) -> Result<Vec<f64>, PredicateError> {
        match self {
            EntityState::Object(o) => o.joint_state(),
            EntityState::Site(s) => s.joint_state(),
        }
    }
}

//! Simulation driver boundary.
//!
//! The physics engine, renderer, and robot bindings live outside this crate;
//! the task domain drives them through this trait. All methods take `&self`
//! because real simulation handles wrap foreign state with interior
//! mutability.

use crate::error::DomainError;
use crate::recorder::Observation;
use crate::scene::TextureSample;
use crate::states::{Pose, SimQuery};

/// External simulation driver.
///
/// The scene builder guarantees that every entity referenced by the parsed
/// problem has a valid pose/joint/contact handle before the first `step`.
pub trait Simulation: SimQuery {
    /// Advances physics by one control step.
    fn step(&self, action: &[f64]) -> Result<(), DomainError>;

    /// Current observation map (per-key arrays).
    fn observation(&self) -> Observation;

    /// Flattened simulator state snapshot.
    fn state_vec(&self) -> Vec<f64>;

    /// Scene model snapshot (XML) recorded as episode metadata.
    fn model_snapshot(&self) -> String;

    /// Applies a sampled placement.
    fn set_body_pose(&self, name: &str, pose: Pose) -> Result<(), DomainError>;

    /// Sets an articulation joint position.
    fn set_joint_position(&self, joint: &str, qpos: f64) -> Result<(), DomainError>;

    /// Propagates pending placement writes through the simulation, so
    /// conditional samplers observe the poses set so far.
    fn forward(&self) {}

    /// Renderer hook: applies a sampled camera pose.
    fn set_camera_pose(&self, _pose: Pose) {}

    /// Renderer hook: applies a sampled light direction.
    fn set_light_direction(&self, _direction: [f64; 3]) {}

    /// Renderer hook: applies sampled texture values to a target.
    fn apply_texture(&self, _target: &str, _sample: TextureSample) {}
}

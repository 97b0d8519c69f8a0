//! Capability interfaces for querying live simulation state.
//!
//! Object-state handles hold these capabilities instead of a back-pointer to
//! a monolithic environment object; the simulation driver implements all of
//! them behind one `Arc`.

/// Position and orientation of a body or site in world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub pos: [f64; 3],
    /// Unit quaternion, `[w, x, y, z]`.
    pub quat: [f64; 4],
}

impl Pose {
    pub fn new(pos: [f64; 3], quat: [f64; 4]) -> Self {
        Self { pos, quat }
    }

    /// Identity-orientation pose at a position.
    pub fn at(pos: [f64; 3]) -> Self {
        Self {
            pos,
            quat: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Body and site pose lookups.
pub trait PoseQuery {
    /// World pose of a named body, or `None` if the body is unknown.
    fn body_pose(&self, name: &str) -> Option<Pose>;

    /// World pose of a named site, or `None` if the site is unknown.
    fn site_pose(&self, name: &str) -> Option<Pose>;
}

/// Articulation joint position lookups.
pub trait JointQuery {
    /// Current position of a named joint, or `None` if unknown.
    fn joint_position(&self, joint: &str) -> Option<f64>;
}

/// Pairwise contact lookups.
pub trait ContactQuery {
    /// True if the two named entities are currently in contact.
    fn in_contact(&self, a: &str, b: &str) -> bool;
}

/// End-effector grasp detection.
pub trait GraspQuery {
    /// True if the gripper holds the named object. An empty geometry list
    /// selects the default gripper geometry set; a non-empty list restricts
    /// the check to that subset of finger geometries.
    fn check_grasp(&self, gripper_geoms: &[&str], object: &str) -> bool;
}

/// Everything an object-state handle needs from the simulation.
pub trait SimQuery: PoseQuery + JointQuery + ContactQuery + GraspQuery + Send + Sync {}

impl<T: PoseQuery + JointQuery + ContactQuery + GraspQuery + Send + Sync> SimQuery for T {}

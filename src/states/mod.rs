//! Object state interfaces for predicate checking.
//!
//! State handles wrap one simulation entity each and expose the pose,
//! articulation, contact, containment, and grasp checks the predicate
//! evaluator needs. Handles query the simulation through the capability
//! traits in [`queries`] rather than holding an environment back-pointer.

pub mod object_state;
pub mod queries;

pub use object_state::{ArticulationSpec, EntityState, ObjectState, SiteObjectState};
pub use queries::{ContactQuery, GraspQuery, JointQuery, Pose, PoseQuery, SimQuery};

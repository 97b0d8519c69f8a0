//! Shared geometry helpers.

pub mod transform;

pub use transform::{quat_rotate, spherical_to_pos_quat, yaw_quat};

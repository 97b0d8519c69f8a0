//! Scene and placement construction.
//!
//! This module turns parsed problems into instantiated scenes:
//! - A data-driven asset catalog mapping categories to configuration records
//! - Placement samplers (unconditional region, site-conditioned,
//!   object-conditioned) plus articulation joint samplers
//! - Camera, lighting, and texture randomization

pub mod builder;
pub mod camera;
pub mod catalog;
pub mod samplers;

pub use builder::{JointInit, SceneBuilder, SceneEntity, SceneLayout, SiteSpec};
pub use camera::{sample_camera_pose, sample_light_direction, sample_texture, TextureSample};
pub use catalog::{AssetCatalog, AssetSpec, RotationAxis};
pub use samplers::{
    JointInitKind, JointSampler, ObjectConditionedSampler, Placement, RegionRandomSampler,
    SiteConditionedSampler,
};

//! Data-driven asset catalog.
//!
//! Each category maps to one [`AssetSpec`] configuration record; per-asset
//! behavior differences (joint thresholds, asset paths, rotation defaults)
//! are data, not subclasses. The catalog is populated by explicit
//! registration calls at startup, never as an import side effect.

use std::collections::HashMap;

use crate::error::SceneError;
use crate::states::ArticulationSpec;

/// Axis an object may be rotated about during placement sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationAxis {
    X,
    Y,
    #[default]
    Z,
}

/// Static configuration for one asset category.
#[derive(Debug, Clone)]
pub struct AssetSpec {
    pub category: String,
    /// Model file path, relative to the asset root.
    pub asset_path: String,
    /// Bounding half-extents used for containment checks.
    pub half_extents: [f64; 3],
    /// Joint-name suffixes; instance joints are `<instance>_<suffix>`.
    pub joint_suffixes: Vec<String>,
    /// Articulation thresholds, for categories with joints.
    pub articulation: Option<ArticulationSpec>,
    /// Category-level yaw rotation range; overrides the region's yaw spec.
    pub rotation: Option<(f64, f64)>,
    pub rotation_axis: RotationAxis,
    /// Whether instances visibly change state and must be re-checked every
    /// step (e.g. switches).
    pub tracked_visual_change: bool,
}

impl AssetSpec {
    /// A rigid (joint-free) category.
    pub fn rigid(category: &str, asset_path: &str, half_extents: [f64; 3]) -> Self {
        Self {
            category: category.to_string(),
            asset_path: asset_path.to_string(),
            half_extents,
            joint_suffixes: Vec::new(),
            articulation: None,
            rotation: None,
            rotation_axis: RotationAxis::Z,
            tracked_visual_change: false,
        }
    }

    /// An articulated category with one named joint.
    pub fn articulated(
        category: &str,
        asset_path: &str,
        half_extents: [f64; 3],
        joint_suffix: &str,
        articulation: ArticulationSpec,
    ) -> Self {
        Self {
            category: category.to_string(),
            asset_path: asset_path.to_string(),
            half_extents,
            joint_suffixes: vec![joint_suffix.to_string()],
            articulation: Some(articulation),
            rotation: None,
            rotation_axis: RotationAxis::Z,
            tracked_visual_change: false,
        }
    }

    pub fn with_rotation(mut self, rotation: (f64, f64)) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_tracked_visual_change(mut self) -> Self {
        self.tracked_visual_change = true;
        self
    }

    /// Instance joint names for a named instance of this category.
    pub fn instance_joints(&self, instance: &str) -> Vec<String> {
        self.joint_suffixes
            .iter()
            .map(|suffix| format!("{instance}_{suffix}"))
            .collect()
    }
}

/// Registry of asset categories available to the scene builder.
pub struct AssetCatalog {
    specs: HashMap<String, AssetSpec>,
}

impl AssetCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// Creates a catalog pre-populated with the standard tabletop categories.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.register_defaults();
        catalog
    }

    /// Registers a category spec, replacing any existing registration.
    pub fn register(&mut self, spec: AssetSpec) {
        self.specs.insert(spec.category.clone(), spec);
    }

    /// Looks up a category, failing fast on unknown names.
    pub fn get(&self, category: &str) -> Result<&AssetSpec, SceneError> {
        self.specs
            .get(category)
            .ok_or_else(|| SceneError::UnknownCategory(category.to_string()))
    }

    pub fn contains(&self, category: &str) -> bool {
        self.specs.contains_key(category)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Standard tabletop manipulation categories.
    pub fn register_defaults(&mut self) {
        let drawer_articulation = ArticulationSpec {
            open_ranges: (-0.16, -0.10),
            close_ranges: (-0.005, 0.0),
            turnon_ranges: None,
            turnoff_ranges: None,
        };
        let door_articulation = ArticulationSpec {
            open_ranges: (1.0, 1.6),
            close_ranges: (0.0, 0.06),
            turnon_ranges: None,
            turnoff_ranges: None,
        };
        let knob_articulation = ArticulationSpec {
            open_ranges: (0.0, 0.0),
            close_ranges: (0.0, 0.0),
            turnon_ranges: Some((-0.005, 0.633)),
            turnoff_ranges: Some((-1.0, -0.4)),
        };

        self.register(AssetSpec::rigid(
            "milk",
            "objects/milk.xml",
            [0.035, 0.035, 0.082],
        ));
        self.register(AssetSpec::rigid(
            "bread",
            "objects/bread.xml",
            [0.045, 0.035, 0.03],
        ));
        self.register(
            AssetSpec::rigid("mug", "objects/mug.xml", [0.045, 0.045, 0.055])
                .with_rotation((0.0, std::f64::consts::PI)),
        );
        self.register(AssetSpec::rigid(
            "bowl",
            "objects/bowl.xml",
            [0.08, 0.08, 0.04],
        ));
        self.register(AssetSpec::rigid(
            "plate",
            "objects/plate.xml",
            [0.09, 0.09, 0.015],
        ));
        self.register(AssetSpec::rigid(
            "basket",
            "objects/basket.xml",
            [0.12, 0.12, 0.08],
        ));
        self.register(AssetSpec::articulated(
            "wooden_cabinet",
            "fixtures/wooden_cabinet.xml",
            [0.15, 0.18, 0.35],
            "top_drawer_joint",
            drawer_articulation,
        ));
        self.register(AssetSpec::articulated(
            "microwave",
            "fixtures/microwave.xml",
            [0.2, 0.25, 0.15],
            "door_joint",
            door_articulation,
        ));
        self.register(
            AssetSpec::articulated(
                "flat_stove",
                "fixtures/flat_stove.xml",
                [0.15, 0.15, 0.05],
                "knob_joint",
                knob_articulation,
            )
            .with_tracked_visual_change(),
        );
    }
}

impl Default for AssetCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_fails_fast() {
        let catalog = AssetCatalog::with_defaults();
        assert!(catalog.get("milk").is_ok());
        assert!(matches!(
            catalog.get("antigravity_plate"),
            Err(SceneError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_explicit_registration() {
        let mut catalog = AssetCatalog::new();
        assert!(catalog.is_empty());
        catalog.register(AssetSpec::rigid("widget", "objects/widget.xml", [0.1; 3]));
        assert!(catalog.contains("widget"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_instance_joint_names() {
        let catalog = AssetCatalog::with_defaults();
        let cabinet = catalog.get("wooden_cabinet").expect("spec");
        assert_eq!(
            cabinet.instance_joints("wooden_cabinet_1"),
            vec!["wooden_cabinet_1_top_drawer_joint"]
        );
    }

    #[test]
    fn test_tracked_visual_change_flag() {
        let catalog = AssetCatalog::with_defaults();
        assert!(catalog.get("flat_stove").expect("spec").tracked_visual_change);
        assert!(!catalog.get("milk").expect("spec").tracked_visual_change);
    }
}

//! Scene construction from a parsed problem.
//!
//! Consumes a [`ParsedProblem`] and an [`AssetCatalog`] to instantiate
//! object/fixture/site records and configure the placement plan: every
//! initial-state constraint becomes either an unconditional region sampler,
//! a site-conditioned sampler, an object-conditioned sampler, or an
//! articulation joint sampler.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::bddl::types::{ParsedProblem, RegionSpec};
use crate::error::SceneError;
use crate::scene::catalog::{AssetCatalog, AssetSpec};
use crate::scene::samplers::{
    JointInitKind, JointSampler, ObjectConditionedSampler, Placement, RegionRandomSampler,
    SiteConditionedSampler,
};
use crate::states::{EntityState, ObjectState, SimQuery, SiteObjectState};

/// Entities whose category or region name contains this keyword belong to
/// the workspace surface provided by the arena, not the catalog.
const WORKSPACE_KEYWORD: &str = "table";

/// One instantiated object or fixture.
#[derive(Debug, Clone)]
pub struct SceneEntity {
    pub name: String,
    pub category: String,
    pub spec: AssetSpec,
    /// Instance joint names derived from the spec's joint suffixes.
    pub joints: Vec<String>,
    pub is_fixture: bool,
}

/// One instantiated site (region zone).
#[derive(Debug, Clone)]
pub struct SiteSpec {
    pub name: String,
    /// Entity the site is attached to; workspace zones name the arena table.
    pub parent: String,
    pub half_size: [f64; 3],
    pub rgba: [f64; 4],
    /// Static world centroid for workspace zones. Object-attached sites are
    /// resolved against the live simulation instead.
    pub zone_centroid: Option<[f64; 3]>,
}

/// A sampled initial joint value realizing an articulation constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct JointInit {
    pub name: String,
    pub joints: Vec<String>,
    pub qpos: f64,
}

/// The instantiated scene: entity records plus the placement plan.
pub struct SceneLayout {
    pub objects: BTreeMap<String, SceneEntity>,
    pub fixtures: BTreeMap<String, SceneEntity>,
    pub sites: BTreeMap<String, SiteSpec>,
    pub region_samplers: Vec<RegionRandomSampler>,
    pub site_samplers: Vec<SiteConditionedSampler>,
    pub object_samplers: Vec<ObjectConditionedSampler>,
    pub joint_samplers: Vec<JointSampler>,
    pub workspace_offset: [f64; 3],
}

impl SceneLayout {
    /// Samples all unconditional placements (workspace regions).
    pub fn sample_unconditional<R: Rng>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<Placement>, SceneError> {
        self.region_samplers
            .iter()
            .map(|sampler| sampler.sample(rng))
            .collect()
    }

    /// Samples all conditional placements (site- and object-relative),
    /// resolving reference poses against the live simulation. Must run after
    /// unconditional placements have been applied.
    pub fn sample_conditional<R: Rng>(
        &self,
        rng: &mut R,
        sim: &dyn SimQuery,
    ) -> Result<Vec<Placement>, SceneError> {
        let mut placements = Vec::new();
        for sampler in &self.site_samplers {
            placements.push(sampler.sample(rng, sim)?);
        }
        for sampler in &self.object_samplers {
            placements.push(sampler.sample(rng, sim)?);
        }
        Ok(placements)
    }

    /// Samples initial joint values for articulation constraints.
    pub fn sample_joint_inits<R: Rng>(&self, rng: &mut R) -> Vec<JointInit> {
        self.joint_samplers
            .iter()
            .map(|sampler| JointInit {
                name: sampler.name.clone(),
                joints: sampler.joints.clone(),
                qpos: sampler.sample(rng),
            })
            .collect()
    }

    /// Builds the entity-state registry for predicate checking, plus the
    /// names of tracked entities (those re-checked every step).
    pub fn entity_states(
        &self,
        sim: Arc<dyn SimQuery>,
    ) -> (BTreeMap<String, EntityState>, Vec<String>) {
        let mut states = BTreeMap::new();
        let mut tracked = Vec::new();

        for entity in self.objects.values().chain(self.fixtures.values()) {
            let state = ObjectState::new(
                entity.name.clone(),
                sim.clone(),
                entity.joints.clone(),
                entity.spec.articulation,
                entity.spec.half_extents,
                entity.is_fixture,
            );
            if entity.spec.tracked_visual_change {
                tracked.push(entity.name.clone());
            }
            states.insert(entity.name.clone(), EntityState::Object(state));
        }

        for site in self.sites.values() {
            let parent = self
                .objects
                .get(&site.parent)
                .or_else(|| self.fixtures.get(&site.parent));
            let (joints, articulation) = match parent {
                Some(entity) => (entity.joints.clone(), entity.spec.articulation),
                None => (Vec::new(), None),
            };
            let state = SiteObjectState::new(
                site.name.clone(),
                site.parent.clone(),
                sim.clone(),
                site.half_size,
                joints,
                articulation,
            );
            states.insert(site.name.clone(), EntityState::Site(state));
        }

        (states, tracked)
    }

    fn entity(&self, name: &str) -> Option<&SceneEntity> {
        self.objects.get(name).or_else(|| self.fixtures.get(name))
    }
}

/// Builds a [`SceneLayout`] from a parsed problem.
pub struct SceneBuilder {
    /// World position of the workspace surface center.
    pub workspace_offset: [f64; 3],
    /// Vertical offset applied to fixtures placed on the arena floor.
    pub fixture_z_offset: f64,
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self {
            workspace_offset: [0.0, 0.0, 0.90],
            fixture_z_offset: -0.04,
        }
    }
}

impl SceneBuilder {
    pub fn new(workspace_offset: [f64; 3], fixture_z_offset: f64) -> Self {
        Self {
            workspace_offset,
            fixture_z_offset,
        }
    }

    pub fn build(
        &self,
        problem: &ParsedProblem,
        catalog: &AssetCatalog,
    ) -> Result<SceneLayout, SceneError> {
        let mut layout = SceneLayout {
            objects: BTreeMap::new(),
            fixtures: BTreeMap::new(),
            sites: BTreeMap::new(),
            region_samplers: Vec::new(),
            site_samplers: Vec::new(),
            object_samplers: Vec::new(),
            joint_samplers: Vec::new(),
            workspace_offset: self.workspace_offset,
        };

        self.instantiate_entities(problem, catalog, &mut layout)?;
        self.instantiate_sites(problem, &mut layout)?;
        self.wire_placements(problem, &mut layout)?;

        debug!(
            objects = layout.objects.len(),
            fixtures = layout.fixtures.len(),
            sites = layout.sites.len(),
            samplers = layout.region_samplers.len()
                + layout.site_samplers.len()
                + layout.object_samplers.len(),
            "scene built"
        );
        Ok(layout)
    }

    fn instantiate_entities(
        &self,
        problem: &ParsedProblem,
        catalog: &AssetCatalog,
        layout: &mut SceneLayout,
    ) -> Result<(), SceneError> {
        for (category, instances) in &problem.fixtures {
            // the workspace surface comes from the arena, not the catalog
            if category.contains(WORKSPACE_KEYWORD) {
                continue;
            }
            let spec = catalog.get(category)?;
            for instance in instances {
                layout.fixtures.insert(
                    instance.clone(),
                    SceneEntity {
                        name: instance.clone(),
                        category: category.clone(),
                        spec: spec.clone(),
                        joints: spec.instance_joints(instance),
                        is_fixture: true,
                    },
                );
            }
        }
        for (category, instances) in &problem.objects {
            let spec = catalog.get(category)?;
            for instance in instances {
                layout.objects.insert(
                    instance.clone(),
                    SceneEntity {
                        name: instance.clone(),
                        category: category.clone(),
                        spec: spec.clone(),
                        joints: spec.instance_joints(instance),
                        is_fixture: false,
                    },
                );
            }
        }
        Ok(())
    }

    fn instantiate_sites(
        &self,
        problem: &ParsedProblem,
        layout: &mut SceneLayout,
    ) -> Result<(), SceneError> {
        for (region_name, region) in &problem.regions {
            if region_name.contains(WORKSPACE_KEYWORD) {
                let ranges = region
                    .ranges
                    .first()
                    .ok_or_else(|| SceneError::EmptyRanges {
                        region: region_name.clone(),
                    })?;
                let half_x = (ranges[2] - ranges[0]) / 2.0;
                let half_y = (ranges[3] - ranges[1]) / 2.0;
                let centroid = [
                    (ranges[2] + ranges[0]) / 2.0 + self.workspace_offset[0],
                    (ranges[3] + ranges[1]) / 2.0 + self.workspace_offset[1],
                    self.workspace_offset[2],
                ];
                layout.sites.insert(
                    region_name.clone(),
                    SiteSpec {
                        name: region_name.clone(),
                        parent: region.target.clone(),
                        half_size: [half_x, half_y, 0.0],
                        rgba: region.rgba,
                        zone_centroid: Some(centroid),
                    },
                );
            } else {
                let parent =
                    layout
                        .entity(&region.target)
                        .ok_or_else(|| SceneError::UnknownRegion(region_name.clone()))?;
                layout.sites.insert(
                    region_name.clone(),
                    SiteSpec {
                        name: region_name.clone(),
                        parent: region.target.clone(),
                        half_size: parent.spec.half_extents,
                        rgba: region.rgba,
                        zone_centroid: None,
                    },
                );
            }
        }
        Ok(())
    }

    fn wire_placements(
        &self,
        problem: &ParsedProblem,
        layout: &mut SceneLayout,
    ) -> Result<(), SceneError> {
        for state in &problem.initial_state {
            match (state.name.as_str(), state.args.as_slice()) {
                ("on", [object, target]) if layout.objects.contains_key(target) => {
                    let spec = self.object_spec(layout, object)?;
                    layout.object_samplers.push(ObjectConditionedSampler {
                        object: object.clone(),
                        reference: target.clone(),
                        rotation: spec.rotation.unwrap_or((0.0, 0.0)),
                        rotation_axis: spec.rotation_axis,
                    });
                }
                ("in", [object, region_name]) if problem.regions.contains_key(region_name) => {
                    // containment assumes the region is the target's
                    // containing volume, declared by the task author
                    let spec = self.object_spec(layout, object)?;
                    let site = layout.sites.get(region_name).ok_or_else(|| {
                        SceneError::UnknownRegion(region_name.clone())
                    })?;
                    layout.site_samplers.push(SiteConditionedSampler {
                        object: object.clone(),
                        site: region_name.clone(),
                        reference: site.parent.clone(),
                        half_size: [site.half_size[0], site.half_size[1]],
                        inside: true,
                        rotation: spec.rotation.unwrap_or((0.0, 0.0)),
                        rotation_axis: spec.rotation_axis,
                    });
                }
                ("on", [object, region_name]) if problem.regions.contains_key(region_name) => {
                    self.wire_region_placement(problem, layout, object, region_name)?;
                }
                ("open", [entity]) | ("close", [entity]) => {
                    self.wire_joint_init(
                        layout,
                        entity,
                        if state.name == "open" {
                            JointInitKind::Open
                        } else {
                            JointInitKind::Close
                        },
                    );
                }
                ("turnon", [entity]) | ("turnoff", [entity]) => {
                    self.wire_joint_init(
                        layout,
                        entity,
                        if state.name == "turnon" {
                            JointInitKind::TurnOn
                        } else {
                            JointInitKind::TurnOff
                        },
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn wire_region_placement(
        &self,
        problem: &ParsedProblem,
        layout: &mut SceneLayout,
        object: &str,
        region_name: &str,
    ) -> Result<(), SceneError> {
        let region = &problem.regions[region_name];
        let target_instantiated = layout.entity(&region.target).is_some();

        if target_instantiated {
            let spec = self.object_spec(layout, object)?;
            let site = layout
                .sites
                .get(region_name)
                .ok_or_else(|| SceneError::UnknownRegion(region_name.to_string()))?;
            layout.site_samplers.push(SiteConditionedSampler {
                object: object.to_string(),
                site: region_name.to_string(),
                reference: site.parent.clone(),
                half_size: [site.half_size[0], site.half_size[1]],
                inside: false,
                rotation: spec.rotation.unwrap_or(region.yaw_rotation),
                rotation_axis: spec.rotation_axis,
            });
            return Ok(());
        }

        let (x_ranges, y_ranges) = rectangles_to_xy_ranges(region);
        if layout.fixtures.contains_key(object) {
            // environment fixtures skip boundary and validity checks
            let spec = self.object_spec(layout, object)?;
            layout.region_samplers.push(RegionRandomSampler {
                object: object.to_string(),
                is_fixture: true,
                x_ranges,
                y_ranges,
                rotation: region.yaw_rotation,
                rotation_axis: spec.rotation_axis,
                z_offset: self.fixture_z_offset,
                reference_pos: self.workspace_offset,
            });
        } else {
            let spec = self.object_spec(layout, object)?;
            // a category-level rotation overrides the region's yaw spec
            let rotation = spec.rotation.unwrap_or(region.yaw_rotation);
            layout.region_samplers.push(RegionRandomSampler {
                object: object.to_string(),
                is_fixture: false,
                x_ranges,
                y_ranges,
                rotation,
                rotation_axis: spec.rotation_axis,
                z_offset: 0.0,
                reference_pos: self.workspace_offset,
            });
        }
        Ok(())
    }

    fn wire_joint_init(&self, layout: &mut SceneLayout, entity: &str, kind: JointInitKind) {
        let Some(record) = layout.entity(entity) else {
            return;
        };
        let Some(articulation) = record.spec.articulation else {
            return;
        };
        let range = match kind {
            JointInitKind::Open => Some(articulation.open_ranges),
            JointInitKind::Close => Some(articulation.close_ranges),
            JointInitKind::TurnOn => articulation.turnon_ranges,
            JointInitKind::TurnOff => articulation.turnoff_ranges,
        };
        if let Some(range) = range {
            layout.joint_samplers.push(JointSampler {
                name: entity.to_string(),
                joints: record.joints.clone(),
                kind,
                range,
            });
        }
    }

    fn object_spec<'a>(
        &self,
        layout: &'a SceneLayout,
        name: &str,
    ) -> Result<&'a AssetSpec, SceneError> {
        layout
            .entity(name)
            .map(|e| &e.spec)
            .ok_or_else(|| SceneError::PlacementFailed {
                object: name.to_string(),
                reason: "not instantiated".to_string(),
            })
    }
}

/// Splits `[x_lo, y_lo, x_hi, y_hi]` rectangles into parallel x/y intervals.
fn rectangles_to_xy_ranges(region: &RegionSpec) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    let x_ranges = region.ranges.iter().map(|r| (r[0], r[2])).collect();
    let y_ranges = region.ranges.iter().map(|r| (r[1], r[3])).collect();
    (x_ranges, y_ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bddl::parse_str;

    const PROBLEM: &str = r#"
    (define (problem tabletop_scene)
      (:domain robosuite)
      (:fixtures main_table - table cabinet_1 - wooden_cabinet stove_1 - flat_stove)
      (:objects milk_1 - milk mug_1 - mug plate_1 - plate)
      (:regions
        (table_zone
          (:target main_table)
          (:ranges ((-0.2 -0.2 0.2 0.2)))
          (:yaw_rotation ((0.0 1.57)))
          (:rgba (0 1 0 0.2))
        )
        (cabinet_drawer_region
          (:target cabinet_1)
          (:ranges ((-0.1 -0.1 0.1 0.1)))
        )
      )
      (:init
        (on milk_1 table_zone)
        (on cabinet_1 table_zone)
        (in mug_1 cabinet_drawer_region)
        (on plate_1 milk_1)
        (open cabinet_1)
        (turnon stove_1)
      )
      (:goal (and (in mug_1 cabinet_drawer_region)))
    )
    "#;

    fn build_layout() -> SceneLayout {
        let problem = parse_str(PROBLEM).expect("parse");
        let catalog = AssetCatalog::with_defaults();
        SceneBuilder::default()
            .build(&problem, &catalog)
            .expect("build")
    }

    #[test]
    fn test_entities_instantiated() {
        let layout = build_layout();
        assert!(layout.objects.contains_key("milk_1"));
        assert!(layout.objects.contains_key("mug_1"));
        assert!(layout.fixtures.contains_key("cabinet_1"));
        // the workspace table is not a catalog entity
        assert!(!layout.fixtures.contains_key("main_table"));
        assert_eq!(
            layout.fixtures["cabinet_1"].joints,
            vec!["cabinet_1_top_drawer_joint"]
        );
    }

    #[test]
    fn test_workspace_zone_site() {
        let layout = build_layout();
        let zone = &layout.sites["table_zone"];
        assert_eq!(zone.half_size[0], 0.2);
        assert_eq!(zone.half_size[1], 0.2);
        let centroid = zone.zone_centroid.expect("workspace zone");
        assert_eq!(centroid[2], 0.90);

        let drawer = &layout.sites["cabinet_drawer_region"];
        assert_eq!(drawer.parent, "cabinet_1");
        assert!(drawer.zone_centroid.is_none());
    }

    #[test]
    fn test_placement_wiring() {
        let layout = build_layout();
        // milk on workspace zone + cabinet on workspace zone
        assert_eq!(layout.region_samplers.len(), 2);
        let fixture_sampler = layout
            .region_samplers
            .iter()
            .find(|s| s.object == "cabinet_1")
            .expect("fixture sampler");
        assert!(fixture_sampler.is_fixture);
        assert!(fixture_sampler.z_offset < 0.0);

        // mug inside the cabinet drawer region
        assert_eq!(layout.site_samplers.len(), 1);
        assert!(layout.site_samplers[0].inside);
        assert_eq!(layout.site_samplers[0].reference, "cabinet_1");

        // plate stacked on the milk carton
        assert_eq!(layout.object_samplers.len(), 1);
        assert_eq!(layout.object_samplers[0].reference, "milk_1");
    }

    #[test]
    fn test_joint_samplers() {
        let layout = build_layout();
        assert_eq!(layout.joint_samplers.len(), 2);
        let open = &layout.joint_samplers[0];
        assert_eq!(open.name, "cabinet_1");
        assert_eq!(open.kind, JointInitKind::Open);
        let turnon = &layout.joint_samplers[1];
        assert_eq!(turnon.name, "stove_1");
        assert_eq!(turnon.kind, JointInitKind::TurnOn);
    }

    #[test]
    fn test_unknown_category_propagates() {
        let source = "(define (problem p) (:domain robosuite) (:objects x - levitating_orb))";
        let problem = parse_str(source).expect("parse");
        let catalog = AssetCatalog::with_defaults();
        assert!(matches!(
            SceneBuilder::default().build(&problem, &catalog),
            Err(SceneError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_entity_states_and_tracking() {
        use crate::states::mock::MockSim;
        let layout = build_layout();
        let sim = MockSim::arc();
        let (states, tracked) = layout.entity_states(sim);
        assert!(states.contains_key("milk_1"));
        assert!(states.contains_key("cabinet_drawer_region"));
        assert!(matches!(
            states["cabinet_drawer_region"],
            EntityState::Site(_)
        ));
        // the stove visibly changes state, so it is tracked
        assert_eq!(tracked, vec!["stove_1"]);
    }
}

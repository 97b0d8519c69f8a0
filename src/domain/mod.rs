//! Task domain state machine.
//!
//! Orchestrates reset, per-step goal checking, and subtask progression over
//! an external simulation driver. Phases per episode:
//! `Uninitialized -> Ready (post-reset) -> Running -> {Succeeded, Running}`.
//! There is no failed phase; failure is signaled externally by discarding
//! the demonstration.

pub mod sim;

pub use sim::Simulation;

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::bddl::types::{Connective, ParsedProblem, Predicate};
use crate::bddl::validate_problem;
use crate::error::{ConfigError, DomainError, PredicateError};
use crate::predicates::PredicateRegistry;
use crate::recorder::Observation;
use crate::scene::{sample_camera_pose, sample_light_direction, sample_texture, SceneLayout};
use crate::states::{EntityState, SimQuery};

/// Episode phase of the domain state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    Uninitialized,
    Ready,
    Running,
    Succeeded,
}

/// Step metadata returned alongside the observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo {
    pub phase: EpisodePhase,
    pub subtask_index: usize,
}

/// Result of one control step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub observation: Observation,
    /// Sparse reward: `reward_scale` iff the goal currently holds, else 0.
    pub reward: f64,
    pub success: bool,
    pub info: StepInfo,
}

/// Drives one task: placement reset, goal checking, subtask progression.
pub struct TaskDomain {
    problem: ParsedProblem,
    layout: SceneLayout,
    sim: Arc<dyn Simulation>,
    query: Arc<dyn SimQuery>,
    registry: PredicateRegistry,
    states: BTreeMap<String, EntityState>,
    tracked: Vec<String>,
    phase: EpisodePhase,
    subtask_index: usize,
    reward_scale: f64,
    rng: ChaCha8Rng,
}

impl TaskDomain {
    /// Builds a domain over a validated problem. Fails fast on entity
    /// references that do not resolve.
    pub fn new<S: Simulation + 'static>(
        problem: ParsedProblem,
        layout: SceneLayout,
        sim: Arc<S>,
        registry: PredicateRegistry,
    ) -> Result<Self, ConfigError> {
        validate_problem(&problem)?;
        Ok(Self {
            problem,
            layout,
            query: sim.clone(),
            sim,
            registry,
            states: BTreeMap::new(),
            tracked: Vec::new(),
            phase: EpisodePhase::Uninitialized,
            subtask_index: 0,
            reward_scale: 1.0,
            rng: ChaCha8Rng::seed_from_u64(0),
        })
    }

    /// Reseeds placement and randomization sampling.
    pub fn seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn set_reward_scale(&mut self, scale: f64) {
        self.reward_scale = scale;
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn problem(&self) -> &ParsedProblem {
        &self.problem
    }

    pub fn language_instruction(&self) -> &str {
        &self.problem.language_instruction
    }

    /// Scene model snapshot recorded as episode metadata.
    pub fn model_snapshot(&self) -> String {
        self.sim.model_snapshot()
    }

    /// Flattened simulator state snapshot for the recorder's `states` stream.
    pub fn state_vec(&self) -> Vec<f64> {
        self.sim.state_vec()
    }

    /// The mutable predicate registry, for third-party registration.
    pub fn registry_mut(&mut self) -> &mut PredicateRegistry {
        &mut self.registry
    }

    /// Re-randomizes placements, articulation, camera, lighting, and
    /// textures, rebuilds the entity-state registry, and transitions to
    /// `Ready`.
    pub fn reset(&mut self) -> Result<Observation, DomainError> {
        // unconditional placements first, so conditional samplers can
        // resolve their reference poses against the live scene
        for placement in self.layout.sample_unconditional(&mut self.rng)? {
            self.sim.set_body_pose(&placement.name, crate::states::Pose {
                pos: placement.pos,
                quat: placement.quat,
            })?;
        }
        for init in self.layout.sample_joint_inits(&mut self.rng) {
            for joint in &init.joints {
                self.sim.set_joint_position(joint, init.qpos)?;
            }
        }
        self.sim.forward();
        for placement in self
            .layout
            .sample_conditional(&mut self.rng, self.query.as_ref())?
        {
            self.sim.set_body_pose(&placement.name, crate::states::Pose {
                pos: placement.pos,
                quat: placement.quat,
            })?;
        }
        self.sim.forward();

        if let Some(pose) = sample_camera_pose(&self.problem.camera, &mut self.rng) {
            self.sim.set_camera_pose(pose);
        }
        let direction = sample_light_direction(&self.problem.lighting, &mut self.rng);
        self.sim.set_light_direction(direction);
        for (target, spec) in &self.problem.textures {
            if let Some(sample) = sample_texture(spec, &mut self.rng) {
                self.sim.apply_texture(target, sample);
            }
        }

        let (states, tracked) = self.layout.entity_states(self.query.clone());
        self.states = states;
        self.tracked = tracked;
        self.subtask_index = 0;
        self.phase = EpisodePhase::Ready;
        debug!(entities = self.states.len(), "domain reset");
        Ok(self.sim.observation())
    }

    /// Delegates one physics step, refreshes tracked entity states, and
    /// evaluates the goal. Reward is sparse.
    pub fn step(&mut self, action: &[f64]) -> Result<StepOutcome, DomainError> {
        if self.phase == EpisodePhase::Uninitialized {
            return Err(DomainError::NotReady);
        }
        self.sim.step(action)?;

        for name in &self.tracked {
            if let Some(EntityState::Object(state)) = self.states.get_mut(name) {
                state.update_state();
            }
        }

        let success = self.check_success()?;
        self.phase = if success {
            EpisodePhase::Succeeded
        } else {
            EpisodePhase::Running
        };
        Ok(StepOutcome {
            observation: self.sim.observation(),
            reward: if success { self.reward_scale } else { 0.0 },
            success,
            info: StepInfo {
                phase: self.phase,
                subtask_index: self.subtask_index,
            },
        })
    }

    /// Folds the goal's alternating connective/predicate list left to right.
    ///
    /// The accumulator starts as `None` and is seeded by the first clause's
    /// raw result, so the first connective is never applied against a cold
    /// boolean. Existing task files rely on this asymmetry; it is not a
    /// standard fold-with-identity.
    pub fn check_success(&self) -> Result<bool, DomainError> {
        let mut final_result: Option<bool> = None;
        for clause in &self.problem.goal_state {
            let result = self.eval_predicate(&clause.predicate)?;
            final_result = Some(match final_result {
                None => result,
                Some(acc) => match clause.connective {
                    Connective::And => acc && result,
                    Connective::Or => acc || result,
                },
            });
        }
        Ok(final_result.unwrap_or(false))
    }

    /// Evaluates one predicate against the live entity-state registry.
    pub fn eval_predicate(&self, predicate: &Predicate) -> Result<bool, DomainError> {
        let args: Vec<&EntityState> = predicate
            .args
            .iter()
            .map(|name| {
                self.states
                    .get(name)
                    .ok_or_else(|| PredicateError::UnknownEntity(name.clone()))
            })
            .collect::<Result<_, _>>()?;
        Ok(self.registry.evaluate(&predicate.name, &args)?)
    }

    /// The subtask predicate the demonstration is currently working toward,
    /// or `None` once all subtasks are complete.
    pub fn current_subtask(&self) -> Option<&Predicate> {
        self.problem.demonstration_states.get(self.subtask_index)
    }

    pub fn subtask_index(&self) -> usize {
        self.subtask_index
    }

    pub fn subtasks_complete(&self) -> bool {
        self.subtask_index >= self.problem.demonstration_states.len()
    }

    /// Advances the subtask index by at most one if the current subtask
    /// predicate holds. The index never regresses.
    pub fn update_subtask_progress(&mut self) -> Result<bool, DomainError> {
        let Some(predicate) = self.current_subtask().cloned() else {
            return Ok(false);
        };
        if self.eval_predicate(&predicate)? {
            self.subtask_index += 1;
            debug!(subtask = %predicate, index = self.subtask_index, "subtask complete");
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bddl::parse_str;
    use crate::scene::{AssetCatalog, SceneBuilder};
    use crate::states::mock::MockSim;
    use crate::states::Pose;

    const PROBLEM: &str = r#"
    (define (problem tabletop_goal)
      (:domain robosuite)
      (:language put the milk in the basket region)
      (:fixtures main_table - table)
      (:objects milk_1 - milk basket_1 - basket)
      (:regions
        (table_zone
          (:target main_table)
          (:ranges ((-0.2 -0.2 0.2 0.2)))
        )
        (basket_contain_region
          (:target basket_1)
          (:ranges ((-0.05 -0.05 0.05 0.05)))
        )
      )
      (:init (on milk_1 table_zone) (on basket_1 table_zone))
      (:goal (and (in milk_1 basket_contain_region)))
      (:demonstration (grasp milk_1) (in milk_1 basket_contain_region))
    )
    "#;

    fn domain_with_sim() -> (TaskDomain, Arc<MockSim>) {
        let problem = parse_str(PROBLEM).expect("parse");
        let catalog = AssetCatalog::with_defaults();
        let layout = SceneBuilder::default()
            .build(&problem, &catalog)
            .expect("build");
        let sim = MockSim::arc();
        // poses/sites the mock needs before reset
        sim.set_site("basket_contain_region", Pose::at([0.4, 0.0, 0.92]));
        sim.set_body("milk_1", Pose::at([0.0, 0.0, 0.93]));
        sim.set_body("basket_1", Pose::at([0.4, 0.0, 0.9]));
        let domain = TaskDomain::new(
            problem,
            layout,
            sim.clone(),
            PredicateRegistry::with_builtins(),
        )
        .expect("domain");
        (domain, sim)
    }

    #[test]
    fn test_phase_machine() {
        let (mut domain, _sim) = domain_with_sim();
        assert_eq!(domain.phase(), EpisodePhase::Uninitialized);
        assert!(matches!(domain.step(&[0.0; 7]), Err(DomainError::NotReady)));

        domain.reset().expect("reset");
        assert_eq!(domain.phase(), EpisodePhase::Ready);

        let outcome = domain.step(&[0.0; 7]).expect("step");
        assert!(!outcome.success);
        assert_eq!(outcome.reward, 0.0);
        assert_eq!(domain.phase(), EpisodePhase::Running);
    }

    #[test]
    fn test_success_and_sparse_reward() {
        let (mut domain, sim) = domain_with_sim();
        domain.set_reward_scale(2.0);
        domain.reset().expect("reset");

        // milk moves into the basket region
        sim.set_body("milk_1", Pose::at([0.4, 0.0, 0.93]));
        let outcome = domain.step(&[0.0; 7]).expect("step");
        assert!(outcome.success);
        assert_eq!(outcome.reward, 2.0);
        assert_eq!(domain.phase(), EpisodePhase::Succeeded);
    }

    #[test]
    fn test_check_success_deterministic() {
        let (mut domain, sim) = domain_with_sim();
        domain.reset().expect("reset");
        sim.set_body("milk_1", Pose::at([0.4, 0.0, 0.93]));
        let first = domain.check_success().expect("check");
        for _ in 0..10 {
            assert_eq!(domain.check_success().expect("check"), first);
        }
    }

    #[test]
    fn test_goal_fold_seeds_from_first_clause() {
        let source = r#"
        (define (problem fold_seed)
          (:domain robosuite)
          (:fixtures main_table - table)
          (:objects milk_1 - milk)
          (:regions (table_zone (:target main_table) (:ranges ((-0.1 -0.1 0.1 0.1)))))
          (:goal (or (false milk_1) (true milk_1)))
        )
        "#;
        let problem = parse_str(source).expect("parse");
        let catalog = AssetCatalog::with_defaults();
        let layout = SceneBuilder::default()
            .build(&problem, &catalog)
            .expect("build");
        let sim = MockSim::arc();
        sim.set_body("milk_1", Pose::at([0.0; 3]));
        let mut domain =
            TaskDomain::new(problem, layout, sim, PredicateRegistry::with_builtins())
                .expect("domain");
        domain.reset().expect("reset");
        // first clause seeds the fold with `false`; the second `or` clause
        // then recovers it: false || true == true
        assert!(domain.check_success().expect("check"));
    }

    #[test]
    fn test_empty_goal_never_succeeds() {
        let source = r#"
        (define (problem no_goal)
          (:domain robosuite)
          (:fixtures main_table - table)
          (:objects milk_1 - milk)
          (:regions (table_zone (:target main_table) (:ranges ((-0.1 -0.1 0.1 0.1)))))
        )
        "#;
        let problem = parse_str(source).expect("parse");
        let catalog = AssetCatalog::with_defaults();
        let layout = SceneBuilder::default()
            .build(&problem, &catalog)
            .expect("build");
        let sim = MockSim::arc();
        let mut domain =
            TaskDomain::new(problem, layout, sim, PredicateRegistry::with_builtins())
                .expect("domain");
        domain.reset().expect("reset");
        assert!(!domain.check_success().expect("check"));
    }

    #[test]
    fn test_subtask_progression_never_regresses() {
        let (mut domain, sim) = domain_with_sim();
        domain.reset().expect("reset");
        assert_eq!(domain.subtask_index(), 0);
        assert!(!domain.update_subtask_progress().expect("progress"));

        // first subtask: grasp the milk
        sim.set_grasped("milk_1", true);
        assert!(domain.update_subtask_progress().expect("progress"));
        assert_eq!(domain.subtask_index(), 1);

        // releasing the milk must not move the index backwards
        sim.set_grasped("milk_1", false);
        assert!(!domain.update_subtask_progress().expect("progress"));
        assert_eq!(domain.subtask_index(), 1);

        // second subtask: milk in the basket region
        sim.set_body("milk_1", Pose::at([0.4, 0.0, 0.93]));
        assert!(domain.update_subtask_progress().expect("progress"));
        assert!(domain.subtasks_complete());
        assert!(!domain.update_subtask_progress().expect("progress"));
    }

    #[test]
    fn test_unknown_predicate_propagates() {
        let source = r#"
        (define (problem bad_goal)
          (:domain robosuite)
          (:fixtures main_table - table)
          (:objects milk_1 - milk)
          (:regions (table_zone (:target main_table) (:ranges ((-0.1 -0.1 0.1 0.1)))))
          (:goal (and (levitates milk_1)))
        )
        "#;
        let problem = parse_str(source).expect("parse");
        let catalog = AssetCatalog::with_defaults();
        let layout = SceneBuilder::default()
            .build(&problem, &catalog)
            .expect("build");
        let sim = MockSim::arc();
        sim.set_body("milk_1", Pose::at([0.0; 3]));
        let mut domain =
            TaskDomain::new(problem, layout, sim, PredicateRegistry::with_builtins())
                .expect("domain");
        domain.reset().expect("reset");
        assert!(matches!(
            domain.check_success(),
            Err(DomainError::Predicate(PredicateError::UnknownPredicate(_)))
        ));
    }

    #[test]
    fn test_construction_rejects_unresolved_entities() {
        let source = r#"
        (define (problem ghost)
          (:domain robosuite)
          (:objects milk_1 - milk)
          (:goal (and (on milk_1 ghost_zone)))
        )
        "#;
        let problem = parse_str(source).expect("parse");
        let catalog = AssetCatalog::with_defaults();
        let layout = SceneBuilder::default()
            .build(&problem, &catalog)
            .expect("build");
        let sim = MockSim::arc();
        assert!(matches!(
            TaskDomain::new(problem, layout, sim, PredicateRegistry::with_builtins()),
            Err(ConfigError::UnresolvedEntity { .. })
        ));
    }
}

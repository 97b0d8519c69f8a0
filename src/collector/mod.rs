//! Teleoperated data-collection sessions.
//!
//! A [`CollectionSession`] glues a [`TaskDomain`] to a [`DemoRecorder`]: the
//! external teleoperation driver calls [`CollectionSession::record_step`]
//! once per control step, and the session steps the domain, appends the
//! sample, tracks subtask transitions, and applies the
//! collect-N-more-steps-after-success rule before reporting the episode
//! complete. Each episode ends in exactly one of `save` or `abort`.

use std::mem;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::{CollectConfig, EnvArgs};
use crate::domain::TaskDomain;
use crate::error::SessionError;
use crate::recorder::{Dataset, DemoRecorder, Observation, Sample};

/// Outcome of one recorded control step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub reward: f64,
    /// True while the goal currently holds.
    pub success: bool,
    /// True if this step completed the current subtask.
    pub subtask_advanced: bool,
    pub subtask_index: usize,
    /// True once the post-success settle steps have all been collected; the
    /// driver should stop stepping and call `save`.
    pub complete: bool,
}

/// One teleoperation session: repeated episodes over a single task.
pub struct CollectionSession {
    domain: TaskDomain,
    config: CollectConfig,
    env_args: EnvArgs,
    recorder: Option<DemoRecorder>,
    /// Observation and state captured before the next step, so each sample
    /// pairs the pre-step observation with the action taken from it.
    pending_obs: Observation,
    pending_state: Vec<f64>,
    settle_remaining: Option<usize>,
    episode_index: usize,
    started_at: DateTime<Utc>,
}

impl CollectionSession {
    pub fn new(mut domain: TaskDomain, config: CollectConfig, env_args: EnvArgs) -> Self {
        domain.set_reward_scale(config.reward_scale);
        Self {
            domain,
            config,
            env_args,
            recorder: None,
            pending_obs: Observation::new(),
            pending_state: Vec::new(),
            settle_remaining: None,
            episode_index: 0,
            started_at: Utc::now(),
        }
    }

    pub fn domain(&self) -> &TaskDomain {
        &self.domain
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Samples recorded in the open episode, or 0 if none is open.
    pub fn sample_count(&self) -> usize {
        self.recorder
            .as_ref()
            .map(DemoRecorder::sample_count)
            .unwrap_or(0)
    }

    /// Resets the domain and opens a new episode file in the save directory.
    /// Episode files are numbered `demo_<i>.tar`, skipping names already on
    /// disk so reruns never clobber earlier demos.
    pub fn start(&mut self) -> Result<Observation, SessionError> {
        if self.recorder.is_some() {
            return Err(SessionError::AlreadyRecording);
        }
        let obs = self.domain.reset()?;
        std::fs::create_dir_all(&self.config.save_dir)?;
        let path = self.next_episode_path();
        let recorder = DemoRecorder::create(
            &path,
            &self.env_args,
            &self.domain.model_snapshot(),
            self.config.flush_interval,
        )?;
        info!(
            episode = self.episode_index,
            path = %path.display(),
            session_started = %self.started_at,
            task = self.domain.language_instruction(),
            "episode started"
        );
        self.recorder = Some(recorder);
        self.pending_state = self.domain.state_vec();
        self.pending_obs = obs.clone();
        self.settle_remaining = None;
        Ok(obs)
    }

    /// Steps the domain with `action`, records the sample, and advances
    /// subtask progress. `action_abs` is the same command in the absolute
    /// frame, stored alongside for retargeting.
    pub fn record_step(
        &mut self,
        action: &[f64],
        action_abs: &[f64],
    ) -> Result<StepReport, SessionError> {
        let recorder = self.recorder.as_mut().ok_or(SessionError::NotStarted)?;
        let outcome = self.domain.step(action)?;

        let sample = Sample {
            obs: mem::take(&mut self.pending_obs),
            actions: Dataset::from_f64(action.to_vec()),
            actions_abs: Dataset::from_f64(action_abs.to_vec()),
            states: Dataset::from_f64(mem::take(&mut self.pending_state)),
        };
        recorder.append(sample)?;

        let subtask_advanced = self.domain.update_subtask_progress()?;
        if subtask_advanced {
            info!(index = self.domain.subtask_index(), "subtask complete");
        } else if let Some(subtask) = self.domain.current_subtask() {
            tracing::debug!(subtask = %subtask, "current subtask");
        }

        self.pending_obs = outcome.observation;
        self.pending_state = self.domain.state_vec();

        if let Some(remaining) = self.settle_remaining.as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
            }
        } else if outcome.success {
            self.settle_remaining = Some(self.config.collect_more);
            info!(
                more = self.config.collect_more,
                "task done, collecting extra settle steps"
            );
        }

        Ok(StepReport {
            reward: outcome.reward,
            success: outcome.success,
            subtask_advanced,
            subtask_index: self.domain.subtask_index(),
            complete: self.settle_remaining == Some(0),
        })
    }

    /// Finalizes the open episode and returns the merged file path. The
    /// session can then `start` the next episode.
    pub fn save(&mut self) -> Result<PathBuf, SessionError> {
        let recorder = self.recorder.take().ok_or(SessionError::NotStarted)?;
        let path = recorder.finalize()?;
        self.episode_index += 1;
        Ok(path)
    }

    /// Discards the open episode, deleting its backing file. Safe to call at
    /// any point; without an open episode it is a no-op.
    pub fn abort(&mut self) -> Result<(), SessionError> {
        let Some(recorder) = self.recorder.take() else {
            return Ok(());
        };
        warn!(episode = self.episode_index, "discarding current demo");
        recorder.discard()?;
        Ok(())
    }

    fn next_episode_path(&mut self) -> PathBuf {
        loop {
            let path = self
                .config
                .save_dir
                .join(format!("demo_{}.tar", self.episode_index));
            if !path.exists() {
                return path;
            }
            self.episode_index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::bddl::parse_str;
    use crate::predicates::PredicateRegistry;
    use crate::recorder::DemoFile;
    use crate::scene::{AssetCatalog, SceneBuilder};
    use crate::states::mock::MockSim;
    use crate::states::Pose;
    use tempfile::TempDir;

    const PROBLEM: &str = r#"
    (define (problem tabletop_session)
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

    fn session(save_dir: &std::path::Path, collect_more: usize) -> (CollectionSession, Arc<MockSim>) {
        let problem = parse_str(PROBLEM).expect("parse");
        let catalog = AssetCatalog::with_defaults();
        let layout = SceneBuilder::default()
            .build(&problem, &catalog)
            .expect("build");
        let sim = MockSim::arc();
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
        let config = CollectConfig {
            flush_interval: 3,
            collect_more,
            save_dir: save_dir.to_path_buf(),
            ..CollectConfig::default()
        };
        let env_args = EnvArgs::new("Tabletop", serde_json::json!({"robots": ["Panda"]}));
        (CollectionSession::new(domain, config, env_args), sim)
    }

    #[test]
    fn test_record_before_start_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let (mut session, _sim) = session(dir.path(), 5);
        assert!(matches!(
            session.record_step(&[0.0; 7], &[0.0; 7]),
            Err(SessionError::NotStarted)
        ));
    }

    #[test]
    fn test_episode_collects_settle_steps_then_completes() {
        let dir = TempDir::new().expect("temp dir");
        let (mut session, sim) = session(dir.path(), 3);
        session.start().expect("start");

        // task not yet done
        let report = session.record_step(&[0.1; 7], &[1.1; 7]).expect("step");
        assert!(!report.success);
        assert!(!report.complete);

        // milk moves into the basket region
        sim.set_body("milk_1", Pose::at([0.4, 0.0, 0.93]));
        let report = session.record_step(&[0.2; 7], &[1.2; 7]).expect("step");
        assert!(report.success);
        assert!(!report.complete);

        // exactly collect_more settle steps follow
        for i in 0..3 {
            let report = session.record_step(&[0.0; 7], &[0.0; 7]).expect("step");
            assert_eq!(report.complete, i == 2, "settle step {i}");
        }

        let path = session.save().expect("save");
        let demo = DemoFile::read_tar(&path).expect("read");
        let episode = &demo.episodes["demo_0"];
        assert_eq!(episode.num_samples, Some(5));
        assert_eq!(episode.streams["actions"].shape(), &[5, 7]);
        assert_eq!(episode.streams["rewards"].shape(), &[5]);
    }

    #[test]
    fn test_abort_leaves_no_file() {
        let dir = TempDir::new().expect("temp dir");
        let (mut session, _sim) = session(dir.path(), 5);
        session.start().expect("start");
        session.record_step(&[0.0; 7], &[0.0; 7]).expect("step");
        let recorded: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .collect();
        assert_eq!(recorded.len(), 1);

        session.abort().expect("abort");
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
        // a second abort without an open episode is a no-op
        session.abort().expect("abort again");
    }

    #[test]
    fn test_episode_files_numbered_sequentially() {
        let dir = TempDir::new().expect("temp dir");
        let (mut session, sim) = session(dir.path(), 0);

        for _ in 0..2 {
            sim.set_body("milk_1", Pose::at([0.0, 0.0, 0.93]));
            session.start().expect("start");
            sim.set_body("milk_1", Pose::at([0.4, 0.0, 0.93]));
            let report = session.record_step(&[0.0; 7], &[0.0; 7]).expect("step");
            assert!(report.complete);
            session.save().expect("save");
        }

        assert!(dir.path().join("demo_0.tar").exists());
        assert!(dir.path().join("demo_1.tar").exists());
    }

    #[test]
    fn test_subtask_transitions_reported() {
        let dir = TempDir::new().expect("temp dir");
        let (mut session, sim) = session(dir.path(), 5);
        session.start().expect("start");

        let report = session.record_step(&[0.0; 7], &[0.0; 7]).expect("step");
        assert!(!report.subtask_advanced);
        assert_eq!(report.subtask_index, 0);

        sim.set_grasped("milk_1", true);
        let report = session.record_step(&[0.0; 7], &[0.0; 7]).expect("step");
        assert!(report.subtask_advanced);
        assert_eq!(report.subtask_index, 1);

        session.abort().expect("abort");
    }

    #[test]
    fn test_double_start_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let (mut session, _sim) = session(dir.path(), 5);
        session.start().expect("start");
        assert!(matches!(
            session.start(),
            Err(SessionError::AlreadyRecording)
        ));
    }
}

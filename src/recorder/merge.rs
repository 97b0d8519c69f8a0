//! Multi-file consolidation of single-episode demonstrations.
//!
//! A collection session leaves one finalized `.tar` file per episode in its
//! save directory; consolidation concatenates them into one compressed file
//! with episodes renumbered `demo_0..demo_{N-1}` and the first file's
//! `env_args` as the shared top-level attribute.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::RecorderError;
use crate::recorder::store::{
    episode_attrs_path, store_attrs_path, stream_entry_path, ContainerWriter, DemoFile,
    EpisodeAttrs, StoreAttrs,
};

/// Default output filename inside the session directory.
pub const DEFAULT_MERGED_NAME: &str = "merged.tar.gz";

/// Consolidates every single-episode `.tar` file in `dir` into one
/// gzip-compressed container. Inputs are taken in filename order; each must
/// contain exactly one episode. Returns the output path.
pub fn merge_sessions(
    dir: impl AsRef<Path>,
    out_name: Option<&str>,
) -> Result<PathBuf, RecorderError> {
    let dir = dir.as_ref();
    let mut inputs: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("tar"))
        .collect();
    inputs.sort();

    if inputs.is_empty() {
        return Err(RecorderError::NoEpisodes(dir.display().to_string()));
    }
    debug!(count = inputs.len(), dir = %dir.display(), "consolidating episode files");

    let out_path = dir.join(out_name.unwrap_or(DEFAULT_MERGED_NAME));
    let file = File::create(&out_path)?;
    let mut writer = ContainerWriter::new(GzEncoder::new(file, Compression::default()));

    let mut shared_env_args: Option<String> = None;
    for (index, input) in inputs.iter().enumerate() {
        let source = DemoFile::read_tar(input)?;
        if source.episodes.len() != 1 {
            return Err(RecorderError::NotSingleEpisode {
                path: input.display().to_string(),
                count: source.episodes.len(),
            });
        }
        let (_, episode) = source.episodes.into_iter().next().expect("one episode");
        if episode.streams.is_empty() {
            return Err(RecorderError::EmptyEpisode(input.display().to_string()));
        }

        if shared_env_args.is_none() {
            // all inputs are assumed to share one episode layout, so the
            // first file's env_args stands for the whole session
            shared_env_args = Some(source.env_args.clone());
            writer.write_json(
                &store_attrs_path(),
                &StoreAttrs {
                    env_args: source.env_args,
                },
            )?;
        }

        let episode_name = format!("demo_{index}");
        writer.write_json(
            &episode_attrs_path(&episode_name),
            &EpisodeAttrs {
                model_file: episode.model_file.clone(),
                num_samples: episode.num_samples,
            },
        )?;
        for (stream, dataset) in &episode.streams {
            writer.write_json(&stream_entry_path(&episode_name, stream), dataset)?;
        }
    }

    let encoder = writer.finish()?;
    let file = encoder.finish()?;
    file.sync_all()?;
    info!(count = inputs.len(), out = %out_path.display(), "merged session demos");
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::dataset::Dataset;
    use tempfile::TempDir;

    fn write_single_episode(path: &Path, episode_name: &str, env_name: &str, marker: f64) {
        let file = File::create(path).expect("create");
        let mut writer = ContainerWriter::new(file);
        writer
            .write_json(
                &store_attrs_path(),
                &StoreAttrs {
                    env_args: format!(r#"{{"env_name":"{env_name}"}}"#),
                },
            )
            .expect("attrs");
        writer
            .write_json(
                &episode_attrs_path(episode_name),
                &EpisodeAttrs {
                    model_file: "<mujoco/>".to_string(),
                    num_samples: Some(1),
                },
            )
            .expect("episode attrs");
        writer
            .write_json(
                &stream_entry_path(episode_name, "actions"),
                &Dataset::stack("actions", &[&Dataset::from_f64(vec![marker])]).expect("stack"),
            )
            .expect("stream");
        let file = writer.finish().expect("finish");
        file.sync_all().expect("sync");
    }

    #[test]
    fn test_renumbering_and_shared_env_args() {
        let dir = TempDir::new().expect("temp dir");
        // episode names inside the inputs are deliberately inconsistent
        write_single_episode(&dir.path().join("a.tar"), "demo_0", "EnvA", 1.0);
        write_single_episode(&dir.path().join("b.tar"), "demo_7", "EnvB", 2.0);
        write_single_episode(&dir.path().join("c.tar"), "episode", "EnvC", 3.0);

        let out = merge_sessions(dir.path(), None).expect("merge");
        let merged = DemoFile::read_tar_gz(&out).expect("read");

        assert_eq!(
            merged.episodes.keys().cloned().collect::<Vec<_>>(),
            vec!["demo_0", "demo_1", "demo_2"]
        );
        // the first input's env_args is the shared attribute
        assert_eq!(merged.env_args, r#"{"env_name":"EnvA"}"#);

        for (i, name) in ["demo_0", "demo_1", "demo_2"].iter().enumerate() {
            let actions = merged.episodes[*name].streams["actions"]
                .as_f64()
                .expect("f64");
            assert_eq!(actions[[0, 0]], (i + 1) as f64);
        }
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        assert!(matches!(
            merge_sessions(dir.path(), None),
            Err(RecorderError::NoEpisodes(_))
        ));
    }

    #[test]
    fn test_multi_episode_input_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("multi.tar");
        let file = File::create(&path).expect("create");
        let mut writer = ContainerWriter::new(file);
        writer
            .write_json(
                &store_attrs_path(),
                &StoreAttrs {
                    env_args: "{}".to_string(),
                },
            )
            .expect("attrs");
        for name in ["demo_0", "demo_1"] {
            writer
                .write_json(
                    &episode_attrs_path(name),
                    &EpisodeAttrs {
                        model_file: String::new(),
                        num_samples: Some(0),
                    },
                )
                .expect("episode attrs");
        }
        writer.finish().expect("finish");

        assert!(matches!(
            merge_sessions(dir.path(), None),
            Err(RecorderError::NotSingleEpisode { count: 2, .. })
        ));
    }

    #[test]
    fn test_output_file_not_treated_as_input() {
        let dir = TempDir::new().expect("temp dir");
        write_single_episode(&dir.path().join("a.tar"), "demo_0", "EnvA", 1.0);
        merge_sessions(dir.path(), None).expect("first merge");
        // rerunning must not pick up merged.tar.gz as an input
        let out = merge_sessions(dir.path(), None).expect("second merge");
        let merged = DemoFile::read_tar_gz(&out).expect("read");
        assert_eq!(merged.episodes.len(), 1);
    }
}

//! Chunked demonstration recorder.
//!
//! Buffers per-timestep samples, flushes fixed-size chunks to the backing
//! container, and on completion merges all chunks into one contiguous
//! episode record. Chunk boundaries are a durability/memory detail;
//! logically the episode is one contiguous stream.
//!
//! Single-writer and synchronous: one recorder exclusively owns its backing
//! store from `create` until `finalize`/`discard`, and all I/O blocks.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EnvArgs;
use crate::error::RecorderError;
use crate::recorder::dataset::{Dataset, Sample};
use crate::recorder::store::{
    chunk_entry_path, episode_attrs_path, store_attrs_path, stream_entry_path, ContainerWriter,
    DemoFile, EpisodeAttrs, StoreAttrs,
};

/// Episode group name used while recording; renumbering happens at
/// multi-file consolidation time.
pub const EPISODE_NAME: &str = "demo_0";

/// Non-observation streams carried by every sample.
const SAMPLE_STREAMS: [&str; 3] = ["actions", "actions_abs", "states"];

/// Recorder lifecycle states. Terminal states close and release the backing
/// store; there is no reopening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Open,
    Finalized,
    Discarded,
}

/// Records one episode to a chunked on-disk container.
pub struct DemoRecorder {
    path: PathBuf,
    flush_interval: usize,
    writer: Option<ContainerWriter<File>>,
    buffer: Vec<Sample>,
    chunk_count: u64,
    state: RecorderState,
}

impl DemoRecorder {
    /// Opens a new backing store and writes the container and episode
    /// attributes. The store exists on disk from this point until
    /// `finalize` or `discard`.
    pub fn create(
        path: impl AsRef<Path>,
        env_args: &EnvArgs,
        model_file: &str,
        flush_interval: usize,
    ) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = ContainerWriter::new(file);
        writer.write_json(
            &store_attrs_path(),
            &StoreAttrs {
                env_args: env_args.to_json()?,
            },
        )?;
        writer.write_json(
            &episode_attrs_path(EPISODE_NAME),
            &EpisodeAttrs {
                model_file: model_file.to_string(),
                num_samples: None,
            },
        )?;
        Ok(Self {
            path,
            flush_interval: flush_interval.max(1),
            writer: Some(writer),
            buffer: Vec::new(),
            chunk_count: 0,
            state: RecorderState::Open,
        })
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Samples recorded so far, flushed or buffered.
    pub fn sample_count(&self) -> usize {
        self.chunk_count as usize * self.flush_interval + self.buffer.len()
    }

    /// Appends one sample, flushing a chunk when the buffer is full.
    pub fn append(&mut self, sample: Sample) -> Result<(), RecorderError> {
        if self.state != RecorderState::Open {
            return Err(RecorderError::Closed);
        }
        self.buffer.push(sample);
        if self.buffer.len() == self.flush_interval {
            self.flush_chunk()?;
        }
        Ok(())
    }

    /// Releases the store handle and deletes the backing file. No partial
    /// episode is left addressable.
    pub fn discard(mut self) -> Result<(), RecorderError> {
        self.state = RecorderState::Discarded;
        self.buffer.clear();
        // dropping the builder closes the file handle before the unlink
        drop(self.writer.take());
        fs::remove_file(&self.path)?;
        info!(path = %self.path.display(), "episode discarded");
        Ok(())
    }

    /// Flushes the tail chunk, closes the store, and merges all chunks into
    /// one contiguous episode with `num_samples`, sparse terminal `rewards`,
    /// and `dones`. Returns the merged file path.
    pub fn finalize(mut self) -> Result<PathBuf, RecorderError> {
        if self.state != RecorderState::Open {
            return Err(RecorderError::Closed);
        }
        if self.chunk_count == 0 && self.buffer.is_empty() {
            return Err(RecorderError::EmptyEpisode(EPISODE_NAME.to_string()));
        }
        self.flush_chunk()?;
        let writer = self.writer.take().ok_or(RecorderError::Closed)?;
        let file = writer.finish()?;
        file.sync_all()?;
        drop(file);

        merge_chunked_file(&self.path)?;
        self.state = RecorderState::Finalized;
        info!(path = %self.path.display(), "episode finalized");
        Ok(self.path.clone())
    }

    fn flush_chunk(&mut self) -> Result<(), RecorderError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(RecorderError::Closed)?;
        debug!(
            chunk = self.chunk_count,
            size = self.buffer.len(),
            "flushing chunk to disk"
        );

        let actions: Vec<&Dataset> = self.buffer.iter().map(|s| &s.actions).collect();
        let actions_abs: Vec<&Dataset> = self.buffer.iter().map(|s| &s.actions_abs).collect();
        let states: Vec<&Dataset> = self.buffer.iter().map(|s| &s.states).collect();
        for (stream, items) in [
            ("actions", actions),
            ("actions_abs", actions_abs),
            ("states", states),
        ] {
            let stacked = Dataset::stack(stream, &items)?;
            writer.write_json(
                &chunk_entry_path(EPISODE_NAME, self.chunk_count, stream),
                &stacked,
            )?;
        }

        // per-observation-key sub-streams are stacked independently
        let obs_keys: Vec<String> = self.buffer[0].obs.keys().cloned().collect();
        for key in obs_keys {
            let items: Vec<&Dataset> = self
                .buffer
                .iter()
                .map(|s| {
                    s.obs
                        .get(&key)
                        .ok_or_else(|| RecorderError::MissingStream(format!("obs/{key}")))
                })
                .collect::<Result<_, _>>()?;
            let stacked = Dataset::stack(&format!("obs/{key}"), &items)?;
            writer.write_json(
                &chunk_entry_path(EPISODE_NAME, self.chunk_count, &format!("obs/{key}")),
                &stacked,
            )?;
        }

        self.buffer.clear();
        self.chunk_count += 1;
        Ok(())
    }
}

/// Merges a chunked single-episode container into its contiguous form.
///
/// The merge renames the chunked file to a unique sibling, builds the merged
/// file at the original path, and deletes the temporary last, so a crash
/// mid-merge leaves the pre-merge chunked file recoverable instead of
/// silently destroying data.
fn merge_chunked_file(path: &Path) -> Result<(), RecorderError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "demo.tar".to_string());
    let tmp_path = path.with_file_name(format!("{file_name}.premerge-{}", Uuid::new_v4()));
    fs::rename(path, &tmp_path)?;

    let source = DemoFile::read_tar(&tmp_path)?;
    let episode = source
        .episodes
        .get(EPISODE_NAME)
        .ok_or_else(|| RecorderError::EmptyEpisode(EPISODE_NAME.to_string()))?;
    if episode.chunks.is_empty() {
        return Err(RecorderError::EmptyEpisode(EPISODE_NAME.to_string()));
    }

    // union of stream names across chunks; BTreeMap keys give numeric order
    let mut stream_names = BTreeSet::new();
    for chunk in episode.chunks.values() {
        stream_names.extend(chunk.keys().cloned());
    }

    let file = File::create(path)?;
    let mut writer = ContainerWriter::new(file);
    writer.write_json(
        &store_attrs_path(),
        &StoreAttrs {
            env_args: source.env_args.clone(),
        },
    )?;

    let mut merged_actions_len = None;
    let mut merged: Vec<(String, Dataset)> = Vec::new();
    for stream in &stream_names {
        let parts: Vec<&Dataset> = episode
            .chunks
            .iter()
            .map(|(index, chunk)| {
                chunk.get(stream).ok_or_else(|| RecorderError::MissingStream(
                    format!("{stream} in chunk_{index}"),
                ))
            })
            .collect::<Result<_, _>>()?;
        let dataset = Dataset::concat(stream, &parts)?;
        if stream == "actions" {
            merged_actions_len = Some(dataset.leading_len());
        }
        merged.push((stream.clone(), dataset));
    }

    let num_samples =
        merged_actions_len.ok_or_else(|| RecorderError::MissingStream("actions".to_string()))?;
    writer.write_json(
        &episode_attrs_path(EPISODE_NAME),
        &EpisodeAttrs {
            model_file: episode.model_file.clone(),
            num_samples: Some(num_samples as u64),
        },
    )?;
    for (stream, dataset) in &merged {
        writer.write_json(&stream_entry_path(EPISODE_NAME, stream), dataset)?;
    }

    // sparse terminal reward convention: zero everywhere except the end
    let mut rewards = vec![0.0; num_samples];
    let mut dones = vec![0i64; num_samples];
    if let (Some(r), Some(d)) = (rewards.last_mut(), dones.last_mut()) {
        *r = 1.0;
        *d = 1;
    }
    writer.write_json(
        &stream_entry_path(EPISODE_NAME, "rewards"),
        &Dataset::from_f64(rewards),
    )?;
    writer.write_json(
        &stream_entry_path(EPISODE_NAME, "dones"),
        &Dataset::from_i64(dones),
    )?;

    let file = writer.finish()?;
    file.sync_all()?;
    drop(file);

    fs::remove_file(&tmp_path)?;
    Ok(())
}

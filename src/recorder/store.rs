//! Tar-backed hierarchical demonstration container.
//!
//! The on-disk layout mirrors the episode group structure:
//!
//! ```text
//! data/attrs.json                         env_args (JSON string)
//! data/demo_<i>/attrs.json                model_file, num_samples
//! data/demo_<i>/chunk_<j>/actions.json    pre-merge chunked streams
//! data/demo_<i>/chunk_<j>/obs/<key>.json
//! data/demo_<i>/actions.json              post-merge contiguous streams
//! data/demo_<i>/obs/<key>.json
//! ```
//!
//! Entries are appended in write order; chunk entries are immutable once
//! written, which is what makes a partially-written episode recoverable.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RecorderError;
use crate::recorder::dataset::Dataset;

/// Root group name inside the container.
pub const DATA_GROUP: &str = "data";

/// Attribute entry filename within a group.
pub const ATTRS_ENTRY: &str = "attrs.json";

/// Top-level container attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreAttrs {
    /// JSON-encoded environment name + construction kwargs, shared by all
    /// episodes in a merged file.
    pub env_args: String,
}

/// Per-episode attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeAttrs {
    /// Scene XML snapshot taken at episode start.
    pub model_file: String,
    /// Total sample count; set by the finalize merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_samples: Option<u64>,
}

/// Append-only writer over a tar stream.
pub struct ContainerWriter<W: Write> {
    builder: tar::Builder<W>,
}

impl<W: Write> ContainerWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            builder: tar::Builder::new(writer),
        }
    }

    /// Serializes `value` as JSON and appends it under `path`.
    pub fn write_json<T: Serialize>(&mut self, path: &str, value: &T) -> Result<(), RecorderError> {
        let payload = serde_json::to_vec(value)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        self.builder.append_data(&mut header, path, payload.as_slice())?;
        Ok(())
    }

    /// Writes the terminating blocks and returns the inner writer.
    pub fn finish(mut self) -> Result<W, RecorderError> {
        self.builder.finish()?;
        Ok(self.builder.into_inner()?)
    }
}

/// One episode read back from a container.
#[derive(Debug, Clone, Default)]
pub struct Episode {
    pub model_file: String,
    pub num_samples: Option<u64>,
    /// Contiguous streams (post-merge), keyed by stream path
    /// (`actions`, `obs/<key>`, `rewards`, ...).
    pub streams: BTreeMap<String, Dataset>,
    /// Chunked streams (pre-merge), keyed by numeric chunk index.
    pub chunks: BTreeMap<u64, BTreeMap<String, Dataset>>,
}

impl Episode {
    /// Chunk indices in increasing numeric order. Chunk names are parsed,
    /// not compared lexically, so `chunk_10` sorts after `chunk_2`.
    pub fn chunk_indices(&self) -> Vec<u64> {
        self.chunks.keys().copied().collect()
    }
}

/// A demonstration container read fully into memory.
#[derive(Debug, Clone, Default)]
pub struct DemoFile {
    /// JSON-encoded environment args.
    pub env_args: String,
    pub episodes: BTreeMap<String, Episode>,
}

impl DemoFile {
    /// Reads an uncompressed `.tar` container.
    pub fn read_tar(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Reads a gzip-compressed `.tar.gz` container.
    pub fn read_tar_gz(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let file = File::open(path)?;
        Self::from_reader(GzDecoder::new(file))
    }

    fn from_reader<R: Read>(reader: R) -> Result<Self, RecorderError> {
        let mut archive = tar::Archive::new(reader);
        let mut demo = DemoFile::default();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let components: Vec<String> = path.split('/').map(str::to_string).collect();
            if components.first().map(String::as_str) != Some(DATA_GROUP) {
                return Err(RecorderError::MalformedEntry {
                    path,
                    reason: format!("expected leading '{DATA_GROUP}/' group"),
                });
            }
            match components.as_slice() {
                [_, attrs] if attrs == ATTRS_ENTRY => {
                    let attrs: StoreAttrs = read_json(&mut entry, &path)?;
                    demo.env_args = attrs.env_args;
                }
                [_, episode, attrs] if attrs == ATTRS_ENTRY => {
                    let attrs: EpisodeAttrs = read_json(&mut entry, &path)?;
                    let ep = demo.episodes.entry(episode.clone()).or_default();
                    ep.model_file = attrs.model_file;
                    ep.num_samples = attrs.num_samples;
                }
                [_, episode, maybe_chunk, rest @ ..]
                    if !rest.is_empty() && parse_chunk_index(maybe_chunk).is_some() =>
                {
                    let index = parse_chunk_index(maybe_chunk).expect("checked above");
                    let stream = stream_key(rest, &path)?;
                    let dataset: Dataset = read_json(&mut entry, &path)?;
                    demo.episodes
                        .entry(episode.clone())
                        .or_default()
                        .chunks
                        .entry(index)
                        .or_default()
                        .insert(stream, dataset);
                }
                [_, episode, rest @ ..] if !rest.is_empty() => {
                    let stream = stream_key(rest, &path)?;
                    let dataset: Dataset = read_json(&mut entry, &path)?;
                    demo.episodes
                        .entry(episode.clone())
                        .or_default()
                        .streams
                        .insert(stream, dataset);
                }
                _ => {
                    return Err(RecorderError::MalformedEntry {
                        path,
                        reason: "unrecognized entry layout".to_string(),
                    });
                }
            }
        }

        Ok(demo)
    }
}

/// Parses a `chunk_<i>` group name into its numeric index.
pub fn parse_chunk_index(name: &str) -> Option<u64> {
    static CHUNK_RE: OnceLock<Regex> = OnceLock::new();
    let re = CHUNK_RE.get_or_init(|| Regex::new(r"^chunk_(\d+)$").expect("valid regex"));
    re.captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Tar entry path for a chunk stream.
pub fn chunk_entry_path(episode: &str, chunk: u64, stream: &str) -> String {
    format!("{DATA_GROUP}/{episode}/chunk_{chunk}/{stream}.json")
}

/// Tar entry path for a merged stream.
pub fn stream_entry_path(episode: &str, stream: &str) -> String {
    format!("{DATA_GROUP}/{episode}/{stream}.json")
}

/// Tar entry path for the container attributes.
pub fn store_attrs_path() -> String {
    format!("{DATA_GROUP}/{ATTRS_ENTRY}")
}

/// Tar entry path for an episode's attributes.
pub fn episode_attrs_path(episode: &str) -> String {
    format!("{DATA_GROUP}/{episode}/{ATTRS_ENTRY}")
}

fn stream_key(rest: &[String], path: &str) -> Result<String, RecorderError> {
    let joined = rest.join("/");
    joined
        .strip_suffix(".json")
        .map(str::to_string)
        .ok_or_else(|| RecorderError::MalformedEntry {
            path: path.to_string(),
            reason: "stream entry must end in .json".to_string(),
        })
}

fn read_json<T: DeserializeOwned, R: Read>(reader: &mut R, path: &str) -> Result<T, RecorderError> {
    let mut contents = Vec::new();
    reader.read_to_end(&mut contents)?;
    serde_json::from_slice(&contents).map_err(|e| RecorderError::MalformedEntry {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_chunk_index() {
        assert_eq!(parse_chunk_index("chunk_0"), Some(0));
        assert_eq!(parse_chunk_index("chunk_10"), Some(10));
        assert_eq!(parse_chunk_index("chunk_"), None);
        assert_eq!(parse_chunk_index("chunky_1"), None);
        assert_eq!(parse_chunk_index("obs"), None);
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("demo.tar");

        let file = File::create(&path).expect("create");
        let mut writer = ContainerWriter::new(file);
        writer
            .write_json(
                &store_attrs_path(),
                &StoreAttrs {
                    env_args: r#"{"env_name":"Tabletop"}"#.to_string(),
                },
            )
            .expect("attrs");
        writer
            .write_json(
                &episode_attrs_path("demo_0"),
                &EpisodeAttrs {
                    model_file: "<mujoco/>".to_string(),
                    num_samples: None,
                },
            )
            .expect("episode attrs");
        writer
            .write_json(
                &chunk_entry_path("demo_0", 0, "actions"),
                &Dataset::from_f64(vec![1.0, 2.0]),
            )
            .expect("chunk");
        writer
            .write_json(
                &chunk_entry_path("demo_0", 0, "obs/low_dim"),
                &Dataset::from_f64(vec![0.5]),
            )
            .expect("obs chunk");
        let file = writer.finish().expect("finish");
        file.sync_all().expect("sync");

        let demo = DemoFile::read_tar(&path).expect("read");
        assert_eq!(demo.env_args, r#"{"env_name":"Tabletop"}"#);
        let episode = &demo.episodes["demo_0"];
        assert_eq!(episode.model_file, "<mujoco/>");
        assert_eq!(episode.chunks.len(), 1);
        assert!(episode.chunks[&0].contains_key("actions"));
        assert!(episode.chunks[&0].contains_key("obs/low_dim"));
    }

    #[test]
    fn test_chunk_indices_sorted_numerically() {
        let mut episode = Episode::default();
        for index in [2u64, 10, 1] {
            episode.chunks.insert(index, BTreeMap::new());
        }
        assert_eq!(episode.chunk_indices(), vec![1, 2, 10]);
    }
}

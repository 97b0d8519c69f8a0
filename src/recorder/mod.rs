//! Demonstration recording and consolidation.
//!
//! This module provides:
//! - Dataset arrays with stack/concatenate operations
//! - The tar-backed hierarchical episode container
//! - The chunked recorder (`create`/`append`/`discard`/`finalize`)
//! - Multi-file session consolidation

pub mod dataset;
pub mod merge;
pub mod store;
pub mod writer;

pub use dataset::{Dataset, Observation, Sample};
pub use merge::{merge_sessions, DEFAULT_MERGED_NAME};
pub use store::{parse_chunk_index, ContainerWriter, DemoFile, Episode, EpisodeAttrs, StoreAttrs};
pub use writer::{DemoRecorder, RecorderState, EPISODE_NAME};

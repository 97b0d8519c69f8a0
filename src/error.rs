//! Error types for labforge operations.
//!
//! Defines error types for all major subsystems:
//! - BDDL problem parsing
//! - Parsed-value and configuration validation
//! - Predicate registry lookup and evaluation
//! - Scene construction and placement sampling
//! - Demonstration recording and chunk merging

use thiserror::Error;

/// Errors that can occur while parsing a BDDL problem description.
///
/// Parse errors indicate authoring bugs in the task file and are fatal:
/// they surface before any simulation state is built and are never retried.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Problem file does not start with 'define'")]
    MissingDefine,

    #[error("Unbalanced parentheses at token {0}")]
    UnbalancedParens(usize),

    #[error("Different domain specified in problem file: expected '{expected}', got '{actual}'")]
    DomainMismatch { expected: String, actual: String },

    #[error("Malformed predicate '{0}': expected arity 1 or 2")]
    MalformedPredicate(String),

    #[error("Malformed '{section}' section: {reason}")]
    MalformedSection { section: String, reason: String },

    #[error("Invalid numeric literal '{0}'")]
    InvalidNumber(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors for structurally valid but semantically invalid parsed values.
///
/// Raised at construction time, before the first `reset()`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Camera jitter mode '{0}' not supported (expected 'uniform' or 'normal')")]
    UnsupportedJitterMode(String),

    #[error("Camera pose unit '{0}' not supported (expected 'radians' or 'degrees')")]
    UnsupportedUnit(String),

    #[error("Entity '{name}' referenced in {section} does not resolve to an object, fixture, or region")]
    UnresolvedEntity { name: String, section: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during predicate evaluation.
#[derive(Debug, Error)]
pub enum PredicateError {
    /// The registry has no predicate under this name. Never downgraded to a
    /// default boolean, since that would mask authoring errors in task files.
    #[error("Predicate '{0}' is not registered")]
    UnknownPredicate(String),

    #[error("Predicate '{name}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Entity '{0}' has no object state handle")]
    UnknownEntity(String),

    #[error("Entity '{0}' has no articulation joints")]
    NoJoints(String),
}

/// Errors that can occur while building a scene from a parsed problem.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Category '{0}' is not registered in the asset catalog")]
    UnknownCategory(String),

    #[error("Region '{0}' is not defined in the problem")]
    UnknownRegion(String),

    #[error("Region '{region}' has no placement ranges")]
    EmptyRanges { region: String },

    #[error("Object '{0}' has no rotation axis configured")]
    MissingRotationAxis(String),

    #[error("Placement for '{object}' failed: {reason}")]
    PlacementFailed { object: String, reason: String },
}

/// Errors surfaced by the task domain state machine.
///
/// Predicate failures (unresolvable entity, malformed arity, unknown name)
/// are fatal to the current episode and never retried.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Domain has not been reset")]
    NotReady,

    #[error("Simulation step failed: {0}")]
    Simulation(String),

    #[error(transparent)]
    Predicate(#[from] PredicateError),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Errors surfaced by a data-collection session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session has no open episode; call start() first")]
    NotStarted,

    #[error("An episode is already being recorded; save or abort it first")]
    AlreadyRecording,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while recording or merging demonstrations.
///
/// I/O failures are surfaced to the caller and never retried automatically;
/// the caller decides whether to retry the whole episode.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Recorder is closed (finalized or discarded); no further operations allowed")]
    Closed,

    #[error("Sample is missing required stream '{0}'")]
    MissingStream(String),

    #[error("Dataset shape mismatch in stream '{stream}': {reason}")]
    ShapeMismatch { stream: String, reason: String },

    #[error("Dataset dtype mismatch in stream '{0}'")]
    DtypeMismatch(String),

    #[error("Episode '{0}' contains no samples")]
    EmptyEpisode(String),

    #[error("Malformed container entry '{path}': {reason}")]
    MalformedEntry { path: String, reason: String },

    #[error("Expected exactly one episode in '{path}', found {count}")]
    NotSingleEpisode { path: String, count: usize },

    #[error("No episode files found in '{0}'")]
    NoEpisodes(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

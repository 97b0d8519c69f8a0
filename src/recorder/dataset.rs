//! Dataset arrays for demonstration streams.
//!
//! A [`Dataset`] is a dtype-tagged n-dimensional array. Per-step samples are
//! stacked along a new leading axis when a chunk is flushed, and chunk
//! arrays are concatenated along axis 0 during the finalize merge, so every
//! stream in a finished episode has leading length `num_samples`.

use std::collections::BTreeMap;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::RecorderError;

/// A dtype-tagged n-dimensional array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "array", rename_all = "lowercase")]
pub enum Dataset {
    F64(ArrayD<f64>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
}

/// Per-observation-key sub-streams within one sample or chunk.
pub type Observation = BTreeMap<String, Dataset>;

impl Dataset {
    /// A 1-D f64 dataset, the common case for actions and state vectors.
    pub fn from_f64(values: Vec<f64>) -> Self {
        let len = values.len();
        Dataset::F64(ArrayD::from_shape_vec(IxDyn(&[len]), values).expect("1-D shape"))
    }

    /// A 1-D i64 dataset.
    pub fn from_i64(values: Vec<i64>) -> Self {
        let len = values.len();
        Dataset::I64(ArrayD::from_shape_vec(IxDyn(&[len]), values).expect("1-D shape"))
    }

    /// A 1-D u8 dataset (e.g. flattened image bytes).
    pub fn from_u8(values: Vec<u8>) -> Self {
        let len = values.len();
        Dataset::U8(ArrayD::from_shape_vec(IxDyn(&[len]), values).expect("1-D shape"))
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Dataset::F64(a) => a.shape(),
            Dataset::I64(a) => a.shape(),
            Dataset::U8(a) => a.shape(),
        }
    }

    /// Leading-axis length; 0 for zero-dimensional arrays.
    pub fn leading_len(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            Dataset::F64(_) => "f64",
            Dataset::I64(_) => "i64",
            Dataset::U8(_) => "u8",
        }
    }

    /// The f64 payload, if this dataset holds one.
    pub fn as_f64(&self) -> Option<&ArrayD<f64>> {
        match self {
            Dataset::F64(a) => Some(a),
            _ => None,
        }
    }

    /// The i64 payload, if this dataset holds one.
    pub fn as_i64(&self) -> Option<&ArrayD<i64>> {
        match self {
            Dataset::I64(a) => Some(a),
            _ => None,
        }
    }

    /// Stacks per-step datasets along a new leading axis.
    pub fn stack(stream: &str, items: &[&Dataset]) -> Result<Dataset, RecorderError> {
        if items.is_empty() {
            return Err(RecorderError::ShapeMismatch {
                stream: stream.to_string(),
                reason: "cannot stack zero datasets".to_string(),
            });
        }
        match items[0] {
            Dataset::F64(_) => {
                let views = collect_views(stream, items, Dataset::as_f64_view)?;
                ndarray::stack(Axis(0), &views)
                    .map(Dataset::F64)
                    .map_err(|e| shape_error(stream, e))
            }
            Dataset::I64(_) => {
                let views = collect_views(stream, items, Dataset::as_i64_view)?;
                ndarray::stack(Axis(0), &views)
                    .map(Dataset::I64)
                    .map_err(|e| shape_error(stream, e))
            }
            Dataset::U8(_) => {
                let views = collect_views(stream, items, Dataset::as_u8_view)?;
                ndarray::stack(Axis(0), &views)
                    .map(Dataset::U8)
                    .map_err(|e| shape_error(stream, e))
            }
        }
    }

    /// Concatenates chunk datasets along axis 0.
    pub fn concat(stream: &str, items: &[&Dataset]) -> Result<Dataset, RecorderError> {
        if items.is_empty() {
            return Err(RecorderError::ShapeMismatch {
                stream: stream.to_string(),
                reason: "cannot concatenate zero datasets".to_string(),
            });
        }
        match items[0] {
            Dataset::F64(_) => {
                let views = collect_views(stream, items, Dataset::as_f64_view)?;
                ndarray::concatenate(Axis(0), &views)
                    .map(Dataset::F64)
                    .map_err(|e| shape_error(stream, e))
            }
            Dataset::I64(_) => {
                let views = collect_views(stream, items, Dataset::as_i64_view)?;
                ndarray::concatenate(Axis(0), &views)
                    .map(Dataset::I64)
                    .map_err(|e| shape_error(stream, e))
            }
            Dataset::U8(_) => {
                let views = collect_views(stream, items, Dataset::as_u8_view)?;
                ndarray::concatenate(Axis(0), &views)
                    .map(Dataset::U8)
                    .map_err(|e| shape_error(stream, e))
            }
        }
    }

    fn as_f64_view(&self) -> Option<ArrayViewD<'_, f64>> {
        match self {
            Dataset::F64(a) => Some(a.view()),
            _ => None,
        }
    }

    fn as_i64_view(&self) -> Option<ArrayViewD<'_, i64>> {
        match self {
            Dataset::I64(a) => Some(a.view()),
            _ => None,
        }
    }

    fn as_u8_view(&self) -> Option<ArrayViewD<'_, u8>> {
        match self {
            Dataset::U8(a) => Some(a.view()),
            _ => None,
        }
    }
}

fn collect_views<'a, T>(
    stream: &str,
    items: &[&'a Dataset],
    view: impl Fn(&'a Dataset) -> Option<ArrayViewD<'a, T>>,
) -> Result<Vec<ArrayViewD<'a, T>>, RecorderError> {
    items
        .iter()
        .map(|item| view(item).ok_or_else(|| RecorderError::DtypeMismatch(stream.to_string())))
        .collect()
}

fn shape_error(stream: &str, err: ndarray::ShapeError) -> RecorderError {
    RecorderError::ShapeMismatch {
        stream: stream.to_string(),
        reason: err.to_string(),
    }
}

/// One per-timestep sample fed to the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Named observation arrays (image, low-dim state, ...), stacked
    /// independently per key.
    pub obs: Observation,
    /// Delta-frame action.
    pub actions: Dataset,
    /// Absolute-frame action.
    pub actions_abs: Dataset,
    /// Full simulator state snapshot.
    pub states: Dataset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_adds_leading_axis() {
        let a = Dataset::from_f64(vec![1.0, 2.0, 3.0]);
        let b = Dataset::from_f64(vec![4.0, 5.0, 6.0]);
        let stacked = Dataset::stack("actions", &[&a, &b]).expect("stack");
        assert_eq!(stacked.shape(), &[2, 3]);
        assert_eq!(stacked.leading_len(), 2);
    }

    #[test]
    fn test_concat_preserves_trailing_shape() {
        let a = Dataset::from_f64(vec![1.0, 2.0]);
        let b = Dataset::from_f64(vec![3.0, 4.0, 5.0]);
        let a2 = Dataset::stack("s", &[&a, &a]).expect("stack");
        let b2 = Dataset::stack("s", &[&b.clone()]).expect("stack");
        // trailing shapes differ, so concatenation must fail
        assert!(Dataset::concat("s", &[&a2, &b2]).is_err());

        let c = Dataset::stack("s", &[&a]).expect("stack");
        let merged = Dataset::concat("s", &[&a2, &c]).expect("concat");
        assert_eq!(merged.shape(), &[3, 2]);
    }

    #[test]
    fn test_dtype_mismatch() {
        let f = Dataset::from_f64(vec![1.0]);
        let i = Dataset::from_i64(vec![1]);
        assert!(matches!(
            Dataset::stack("mixed", &[&f, &i]),
            Err(RecorderError::DtypeMismatch(_))
        ));
    }

    #[test]
    fn test_empty_stack_is_error() {
        assert!(Dataset::stack("empty", &[]).is_err());
        assert!(Dataset::concat("empty", &[]).is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let d = Dataset::from_u8(vec![0, 128, 255]);
        let json = serde_json::to_string(&d).expect("serialize");
        assert!(json.contains(r#""dtype":"u8""#));
        let back: Dataset = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, d);
    }
}

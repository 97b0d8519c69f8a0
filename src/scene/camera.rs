//! Camera, lighting, and texture randomization.
//!
//! Samples one concrete camera pose, light direction, and per-target HSV
//! texture values from the ranges a parsed problem declares. The samples are
//! handed to the external renderer; no image processing happens here.

use rand::{Rng, RngExt};
use rand_distr::{Distribution, Normal};

use crate::bddl::types::{AngleUnit, CameraSpec, JitterMode, LightingSpec, TextureSpec};
use crate::states::Pose;
use crate::utils::spherical_to_pos_quat;

/// Default top-down light source range used when the problem declares none.
const DEFAULT_LIGHT_SOURCE: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Concrete HSV texture values sampled for one target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureSample {
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
}

/// Samples a camera pose from the problem's spherical ranges, or `None` when
/// the problem declares no camera ranges (callers keep the scene default).
pub fn sample_camera_pose<R: Rng>(spec: &CameraSpec, rng: &mut R) -> Option<Pose> {
    if spec.ranges.is_empty() {
        return None;
    }
    let range = spec.ranges[rng.random_range(0..spec.ranges.len())];
    let r = sample_within(spec.jitter_mode, (range[0], range[3]), rng);
    let mut theta = sample_within(spec.jitter_mode, (range[1], range[4]), rng);
    let mut phi = sample_within(spec.jitter_mode, (range[2], range[5]), rng);
    if spec.unit == AngleUnit::Degrees {
        theta = theta.to_radians();
        phi = phi.to_radians();
    }
    Some(spherical_to_pos_quat(r, theta, phi))
}

/// Samples a light direction (a unit vector pointing at the origin) from the
/// problem's source ranges, defaulting to a top-down source.
pub fn sample_light_direction<R: Rng>(spec: &LightingSpec, rng: &mut R) -> [f64; 3] {
    let ranges: &[[f64; 6]] = if spec.source.is_empty() {
        &[DEFAULT_LIGHT_SOURCE]
    } else {
        &spec.source
    };
    let range = ranges[rng.random_range(0..ranges.len())];
    let r = sample_uniform((range[0], range[3]), rng);
    let theta = sample_uniform((range[1], range[4]), rng);
    let phi = sample_uniform((range[2], range[5]), rng);
    let pose = spherical_to_pos_quat(r, theta, phi);
    [-pose.pos[0], -pose.pos[1], -pose.pos[2]]
}

/// Samples concrete HSV values from one texture spec's ranges.
pub fn sample_texture<R: Rng>(spec: &TextureSpec, rng: &mut R) -> Option<TextureSample> {
    if spec.hsv.is_empty() {
        return None;
    }
    let range = spec.hsv[rng.random_range(0..spec.hsv.len())];
    Some(TextureSample {
        hue: sample_uniform((range[0], range[3]), rng),
        saturation: sample_uniform((range[1], range[4]), rng),
        value: sample_uniform((range[2], range[5]), rng),
    })
}

fn sample_within<R: Rng>(mode: JitterMode, range: (f64, f64), rng: &mut R) -> f64 {
    match mode {
        JitterMode::Uniform => sample_uniform(range, rng),
        JitterMode::Normal => {
            let (lo, hi) = ordered(range);
            if hi <= lo {
                return lo;
            }
            let mean = (hi + lo) / 2.0;
            let std = (hi - lo) / 6.0;
            match Normal::new(mean, std) {
                Ok(dist) => dist.sample(rng).clamp(lo, hi),
                Err(_) => mean,
            }
        }
    }
}

pub(crate) fn sample_uniform<R: Rng>(range: (f64, f64), rng: &mut R) -> f64 {
    let (lo, hi) = ordered(range);
    if hi <= lo {
        return lo;
    }
    rng.random_range(lo..hi)
}

fn ordered(range: (f64, f64)) -> (f64, f64) {
    (range.0.min(range.1), range.0.max(range.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_no_ranges_means_no_camera_sample() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let spec = CameraSpec::default();
        assert!(sample_camera_pose(&spec, &mut rng).is_none());
    }

    #[test]
    fn test_uniform_sample_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let spec = CameraSpec {
            ranges: vec![[1.0, 0.1, -0.5, 2.0, 0.4, 0.5]],
            jitter_mode: JitterMode::Uniform,
            unit: AngleUnit::Radians,
        };
        for _ in 0..100 {
            let pose = sample_camera_pose(&spec, &mut rng).expect("pose");
            let r = (pose.pos[0].powi(2) + pose.pos[1].powi(2) + pose.pos[2].powi(2)).sqrt();
            assert!((1.0..=2.0).contains(&r), "radius {r} out of range");
        }
    }

    #[test]
    fn test_normal_sample_is_clipped() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let spec = CameraSpec {
            ranges: vec![[1.0, 0.0, 0.0, 1.2, 0.0, 0.0]],
            jitter_mode: JitterMode::Normal,
            unit: AngleUnit::Radians,
        };
        for _ in 0..200 {
            let pose = sample_camera_pose(&spec, &mut rng).expect("pose");
            // theta = phi = 0, so the position is straight up and z == r
            assert!(pose.pos[2] >= 1.0 - 1e-9 && pose.pos[2] <= 1.2 + 1e-9);
        }
    }

    #[test]
    fn test_degenerate_range_returns_endpoint() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(sample_uniform((0.7, 0.7), &mut rng), 0.7);
    }

    #[test]
    fn test_light_direction_points_at_origin() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let spec = LightingSpec {
            shadow: false,
            source: vec![[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]],
        };
        let dir = sample_light_direction(&spec, &mut rng);
        // source straight above the origin, so the light points down
        assert!(dir[2] < 0.0);
    }

    #[test]
    fn test_texture_sample_in_hsv_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let spec = TextureSpec {
            texture_type: "color".to_string(),
            hsv: vec![[10.0, 50.0, 50.0, 20.0, 100.0, 100.0]],
            turbulence: None,
            sigma: None,
        };
        let sample = sample_texture(&spec, &mut rng).expect("sample");
        assert!((10.0..=20.0).contains(&sample.hue));
        assert!((50.0..=100.0).contains(&sample.saturation));
        assert!((50.0..=100.0).contains(&sample.value));
    }
}

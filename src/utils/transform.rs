//! Quaternion and spherical-coordinate conversions.
//!
//! Just enough rotation math for placement sampling and camera pose
//! synthesis; the physics engine owns everything else. Quaternions are
//! `[w, x, y, z]` throughout.

use std::f64::consts::FRAC_PI_2;

use crate::states::Pose;

/// Quaternion for a rotation of `angle` radians about the world z axis.
pub fn yaw_quat(angle: f64) -> [f64; 4] {
    let half = angle / 2.0;
    [half.cos(), 0.0, 0.0, half.sin()]
}

/// Rotates `v` by the unit quaternion `q`.
pub fn quat_rotate(q: [f64; 4], v: [f64; 3]) -> [f64; 3] {
    // v' = v + w*t + u x t, with u the vector part and t = 2 (u x v)
    let u = [q[1], q[2], q[3]];
    let t = scale(cross(u, v), 2.0);
    add(add(v, scale(t, q[0])), cross(u, t))
}

/// Converts spherical coordinates (physics convention: polar angle `theta`
/// from +z, azimuth `phi` from +x) into a world pose whose local -z axis
/// points at the origin.
pub fn spherical_to_pos_quat(r: f64, theta: f64, phi: f64) -> Pose {
    let pos = [
        r * theta.sin() * phi.cos(),
        r * theta.sin() * phi.sin(),
        r * theta.cos(),
    ];
    // intrinsic z-x rotation: yaw by pi/2 + phi, then tilt by theta
    let (cz, sz) = half_trig(FRAC_PI_2 + phi);
    let (cx, sx) = half_trig(theta);
    Pose::new(pos, [cz * cx, cz * sx, sz * sx, sz * cx])
}

fn half_trig(angle: f64) -> (f64, f64) {
    let half = angle / 2.0;
    (half.cos(), half.sin())
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn scale(v: [f64; 3], s: f64) -> [f64; 3] {
    [v[0] * s, v[1] * s, v[2] * s]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn assert_close(a: [f64; 3], b: [f64; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-9, "component {i}: {a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_identity_rotation() {
        let v = [0.3, -0.7, 1.1];
        assert_close(quat_rotate([1.0, 0.0, 0.0, 0.0], v), v);
    }

    #[test]
    fn test_yaw_quarter_turn_maps_x_to_y() {
        let q = yaw_quat(FRAC_PI_2);
        assert_close(quat_rotate(q, [1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]);
        assert_close(quat_rotate(q, [0.0, 0.0, 1.0]), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_yaw_half_turn_flips_xy() {
        let q = yaw_quat(PI);
        assert_close(quat_rotate(q, [1.0, 2.0, 3.0]), [-1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_spherical_pole_is_straight_up() {
        let pose = spherical_to_pos_quat(2.0, 0.0, 0.0);
        assert_close(pose.pos, [0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_spherical_camera_looks_at_origin() {
        for (theta, phi) in [
            (0.0, 0.0),
            (FRAC_PI_2, 0.0),
            (0.7, 1.3),
            (2.2, -0.4),
        ] {
            let pose = spherical_to_pos_quat(1.5, theta, phi);
            let forward = quat_rotate(pose.quat, [0.0, 0.0, -1.0]);
            let expected = [
                -pose.pos[0] / 1.5,
                -pose.pos[1] / 1.5,
                -pose.pos[2] / 1.5,
            ];
            assert_close(forward, expected);
        }
    }
}

use nalgebra::{Matrix4, Point3};

/// Apply a homogeneous ego pose to sensor-frame points, giving points in the
/// scene's world frame.
pub fn transform_points(points: &[Point3<f32>], ego: &Matrix4<f32>) -> Vec<Point3<f32>> {
    points.iter().map(|p| ego.transform_point(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Translation3, Vector3};

    #[test]
    fn test_identity_pose() {
        let points = vec![Point3::new(1.0, 2.0, 3.0)];
        assert_eq!(transform_points(&points, &Matrix4::identity()), points);
    }

    #[test]
    fn test_rotation_and_translation() {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        let ego = Translation3::new(10.0, 0.0, 0.0).to_homogeneous() * rotation.to_homogeneous();

        let moved = transform_points(&[Point3::new(1.0, 0.0, 0.0)], &ego);
        assert!((moved[0] - Point3::new(10.0, 1.0, 0.0)).norm() < 1e-5);
    }
}

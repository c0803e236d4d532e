use bon::Builder;
use nalgebra::Vector3;
use sheen_utils::EngineArgs;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// One of the six cube faces in layer order +X, -X, +Y, -Y, +Z, -Z.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub const fn layer(self) -> u32 {
        self as u32
    }

    /// View basis of a 90 degree camera looking through this face.
    ///
    /// A texel at face coordinates `u` (left to right) and `v` (top to bottom),
    /// both in -1..1, looks along `forward + u * right + v * down`.
    pub fn basis(self) -> FaceBasis {
        let (forward, right, down) = match self {
            CubeFace::PositiveX => ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, -1.0, 0.0]),
            CubeFace::NegativeX => ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]),
            CubeFace::PositiveY => ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            CubeFace::NegativeY => ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            CubeFace::PositiveZ => ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
            CubeFace::NegativeZ => ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
        };

        FaceBasis {
            forward: Vector3::from(forward),
            right: Vector3::from(right),
            down: Vector3::from(down),
        }
    }

    pub fn direction(self, u: f32, v: f32) -> Vector3<f32> {
        let basis = self.basis();
        (basis.forward + basis.right * u + basis.down * v).normalize()
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FaceBasis {
    pub forward: Vector3<f32>,
    pub right: Vector3<f32>,
    pub down: Vector3<f32>,
}

/// Equirectangular texture coordinate for a unit direction, (0,0) at the top left.
pub fn equirect_uv(dir: &Vector3<f32>) -> [f32; 2] {
    let theta = dir.z.atan2(dir.x);
    let phi = dir.y.clamp(-1.0, 1.0).acos();
    [(theta + PI) / TAU, phi / PI]
}

/// Smallest integration step the irradiance convolution accepts.
///
/// The irradiance shader clamps to the same bound.
pub const MIN_SAMPLE_DELTA: f32 = 0.01;

/// Number of hemisphere samples the irradiance convolution takes per texel.
///
/// Steps below [`MIN_SAMPLE_DELTA`] count as the minimum, like on the GPU.
pub fn irradiance_sample_count(sample_delta: f32) -> u64 {
    let delta = sample_delta.max(MIN_SAMPLE_DELTA);
    let steps = |range: f32| (range / delta).ceil() as u64;
    steps(TAU) * steps(FRAC_PI_2)
}

#[derive(Debug, Copy, Clone, PartialEq, Builder)]
pub struct EnvironmentSettings {
    /// Edge length of the environment cubemap faces.
    #[builder(default = 512)]
    pub face_size: u32,
    /// Edge length of the irradiance cubemap faces.
    #[builder(default = 32)]
    pub irradiance_size: u32,
    /// Angular step in radians of the hemisphere integration.
    #[builder(default = 0.025)]
    pub sample_delta: f32,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        EnvironmentSettings::builder().build()
    }
}

impl EnvironmentSettings {
    pub fn from_args() -> Self {
        let args = EngineArgs::get();
        let defaults = EnvironmentSettings::default();

        EnvironmentSettings {
            face_size: args.env_face_size.unwrap_or(defaults.face_size).max(1),
            irradiance_size: args
                .irradiance_size
                .unwrap_or(defaults.irradiance_size)
                .max(1),
            sample_delta: args
                .irradiance_sample_delta
                .filter(|delta| *delta >= MIN_SAMPLE_DELTA)
                .unwrap_or(defaults.sample_delta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn face_centers_look_down_their_axis() {
        let axes = [
            Vector3::x(),
            -Vector3::x(),
            Vector3::y(),
            -Vector3::y(),
            Vector3::z(),
            -Vector3::z(),
        ];

        for (face, axis) in CubeFace::ALL.into_iter().zip(axes) {
            assert!((face.direction(0.0, 0.0) - axis).norm() < EPSILON);
            assert_eq!(
                face.layer() as usize,
                CubeFace::ALL.iter().position(|f| *f == face).unwrap()
            );
        }
    }

    #[test]
    fn face_bases_are_orthogonal() {
        for face in CubeFace::ALL {
            let b = face.basis();
            assert!(b.forward.dot(&b.right).abs() < EPSILON);
            assert!(b.forward.dot(&b.down).abs() < EPSILON);
            assert!(b.right.dot(&b.down).abs() < EPSILON);
            // a 90 degree field of view reaches the face edge at 45 degrees
            let edge = face.direction(1.0, 0.0);
            assert!((edge.dot(&b.forward) - 0.5f32.sqrt()).abs() < EPSILON);
        }
    }

    #[test]
    fn adjacent_faces_share_edges() {
        // right edge of +Z is the left edge of +X
        let a = CubeFace::PositiveZ.direction(1.0, 0.3);
        let b = CubeFace::PositiveX.direction(-1.0, 0.3);
        assert!((a - b).norm() < EPSILON);

        // top edge of +Z is the bottom edge of +Y
        let a = CubeFace::PositiveZ.direction(0.2, -1.0);
        let b = CubeFace::PositiveY.direction(0.2, 1.0);
        assert!((a - b).norm() < EPSILON);
    }

    #[test]
    fn equirect_mapping_poles_and_seam() {
        let [_, v] = equirect_uv(&Vector3::y());
        assert!(v.abs() < EPSILON);
        let [_, v] = equirect_uv(&-Vector3::y());
        assert!((v - 1.0).abs() < EPSILON);

        let [u, v] = equirect_uv(&Vector3::x());
        assert!((u - 0.5).abs() < EPSILON);
        assert!((v - 0.5).abs() < EPSILON);

        let [u, _] = equirect_uv(&Vector3::z());
        assert!((u - 0.75).abs() < EPSILON);
    }

    #[test]
    fn settings_defaults() {
        let settings = EnvironmentSettings::default();
        assert_eq!(settings.face_size, 512);
        assert_eq!(settings.irradiance_size, 32);
        assert_eq!(irradiance_sample_count(settings.sample_delta), 252 * 63);
    }

    #[test]
    fn tiny_steps_count_as_the_minimum() {
        let floor = irradiance_sample_count(MIN_SAMPLE_DELTA);
        assert_eq!(floor, 629 * 158);

        for delta in [1e-5, 0.0, -1.0, f32::NAN] {
            assert_eq!(irradiance_sample_count(delta), floor, "delta {delta}");
        }

        let small = EnvironmentSettings::builder().face_size(16).build();
        assert_eq!(small.face_size, 16);
        assert_eq!(small.irradiance_size, 32);
    }
}

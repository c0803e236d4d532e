use crate::uniforms::{UniformSlot, UniformTable};
use nalgebra::{Rotation3, Vector3};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum LightType {
    #[default]
    Directional,
    Point,
    Spot,
}

impl LightType {
    /// Value of the `light_type` uniform.
    pub const fn shader_id(self) -> u32 {
        match self {
            LightType::Directional => 0,
            LightType::Point => 1,
            LightType::Spot => 2,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LightState {
    pub light_type: LightType,
    /// Direction the light travels in, for directional and spot lights.
    pub direction: Vector3<f32>,
    pub position: Vector3<f32>,
    pub color: Vector3<f32>,
    pub ambient: Vector3<f32>,
    pub spot_cos_inner: f32,
    pub spot_cos_outer: f32,
}

impl Default for LightState {
    fn default() -> Self {
        LightState {
            light_type: LightType::Directional,
            direction: Vector3::new(-0.4, -1.0, -0.6).normalize(),
            position: Vector3::new(2.0, 2.0, 2.0),
            color: Vector3::new(3.0, 3.0, 3.0),
            ambient: Vector3::new(0.03, 0.03, 0.03),
            spot_cos_inner: 12.5f32.to_radians().cos(),
            spot_cos_outer: 17.5f32.to_radians().cos(),
        }
    }
}

impl LightState {
    /// The same light swung around the world Y axis by `angle` radians.
    pub fn rotated_about_y(&self, angle: f32) -> LightState {
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), angle);
        LightState {
            direction: rotation * self.direction,
            position: rotation * self.position,
            ..*self
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LightSlots {
    pub light_type: UniformSlot,
    pub direction: UniformSlot,
    pub position: UniformSlot,
    pub color: UniformSlot,
    pub ambient: UniformSlot,
    pub spot_cos_inner: UniformSlot,
    pub spot_cos_outer: UniformSlot,
}

impl LightSlots {
    pub fn resolve(table: &UniformTable) -> Self {
        LightSlots {
            light_type: table.resolve("light_type"),
            direction: table.resolve("light.direction"),
            position: table.resolve("light.position"),
            color: table.resolve("light.color"),
            ambient: table.resolve("light.ambient"),
            spot_cos_inner: table.resolve("spot_cos_inner"),
            spot_cos_outer: table.resolve("spot_cos_outer"),
        }
    }

    pub fn write(&self, table: &mut UniformTable, light: &LightState) {
        table.write(self.light_type, light.light_type.shader_id());
        table.write(self.direction, light.direction);
        table.write(self.position, light.position);
        table.write(self.color, light.color);
        table.write(self.ambient, light.ambient);
        table.write(self.spot_cos_inner, light.spot_cos_inner);
        table.write(self.spot_cos_outer, light.spot_cos_outer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn default_light_is_directional_with_ordered_cone() {
        let light = LightState::default();
        assert_eq!(light.light_type, LightType::Directional);
        assert!((light.direction.norm() - 1.0).abs() < 1e-6);
        assert!(light.spot_cos_inner > light.spot_cos_outer);
    }

    #[test]
    fn half_turn_flips_horizontal_direction() {
        let light = LightState {
            direction: Vector3::new(1.0, -1.0, 0.0),
            ..LightState::default()
        };
        let turned = light.rotated_about_y(PI);
        assert!((turned.direction - Vector3::new(-1.0, -1.0, 0.0)).norm() < 1e-5);
        assert_eq!(turned.color, light.color);
    }
}

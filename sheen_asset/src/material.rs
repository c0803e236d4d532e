use crate::uniforms::{UniformSlot, UniformTable};
use nalgebra::Vector3;

/// Which map a texture unit holds.
///
/// This is the one place that pairs shader texture names with unit numbers;
/// both the program setup and the per-frame binding read it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureRole {
    BaseColor,
    Normal,
    Roughness,
    Metallic,
    Irradiance,
    Environment,
}

impl TextureRole {
    pub const ALL: [TextureRole; 6] = [
        TextureRole::BaseColor,
        TextureRole::Normal,
        TextureRole::Roughness,
        TextureRole::Metallic,
        TextureRole::Irradiance,
        TextureRole::Environment,
    ];

    pub const MATERIAL: [TextureRole; 4] = [
        TextureRole::BaseColor,
        TextureRole::Normal,
        TextureRole::Roughness,
        TextureRole::Metallic,
    ];

    pub const UNIT_COUNT: usize = Self::ALL.len();

    pub const fn unit(self) -> u32 {
        match self {
            TextureRole::BaseColor => 0,
            TextureRole::Normal => 1,
            TextureRole::Roughness => 2,
            TextureRole::Metallic => 3,
            TextureRole::Irradiance => 4,
            TextureRole::Environment => 5,
        }
    }

    /// Name of the texture binding in the shaders. Its sampler is `<name>_sampler`.
    pub const fn binding_name(self) -> &'static str {
        match self {
            TextureRole::BaseColor => "base_color_tex",
            TextureRole::Normal => "normal_tex",
            TextureRole::Roughness => "roughness_tex",
            TextureRole::Metallic => "metallic_tex",
            TextureRole::Irradiance => "irradiance_map",
            TextureRole::Environment => "environment_map",
        }
    }

    pub const fn is_cube(self) -> bool {
        matches!(self, TextureRole::Irradiance | TextureRole::Environment)
    }

    /// Points every texture binding of `table` at its role's unit.
    pub fn assign_units(table: &mut UniformTable) {
        for role in Self::ALL {
            table.assign_texture_unit(role.binding_name(), role.unit());
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MaterialState {
    pub use_base_texture: bool,
    pub use_normal_map: bool,
    pub use_roughness_map: bool,
    pub use_metallic_map: bool,
    pub use_ibl: bool,
    pub roughness: f32,
    pub metallic: f32,
    pub base_color_tint: Vector3<f32>,
    /// Reflectance at normal incidence for non-metals.
    pub dielectric_f0: f32,
}

impl Default for MaterialState {
    fn default() -> Self {
        MaterialState {
            use_base_texture: true,
            use_normal_map: false,
            use_roughness_map: false,
            use_metallic_map: false,
            use_ibl: true,
            roughness: 0.5,
            metallic: 0.0,
            base_color_tint: Vector3::new(1.0, 1.0, 1.0),
            dielectric_f0: 0.04,
        }
    }
}

/// Material uniform slots of one program, resolved once after linking.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaterialSlots {
    pub use_base_texture: UniformSlot,
    pub use_normal_map: UniformSlot,
    pub use_roughness_map: UniformSlot,
    pub use_metallic_map: UniformSlot,
    pub use_ibl: UniformSlot,
    pub roughness: UniformSlot,
    pub metallic: UniformSlot,
    pub base_color_tint: UniformSlot,
    pub dielectric_f0: UniformSlot,
}

impl MaterialSlots {
    pub fn resolve(table: &UniformTable) -> Self {
        MaterialSlots {
            use_base_texture: table.resolve("use_base_color_tex"),
            use_normal_map: table.resolve("use_normal_tex"),
            use_roughness_map: table.resolve("use_roughness_tex"),
            use_metallic_map: table.resolve("use_metallic_tex"),
            use_ibl: table.resolve("use_ibl"),
            roughness: table.resolve("roughness"),
            metallic: table.resolve("metallic"),
            base_color_tint: table.resolve("base_color_tint"),
            dielectric_f0: table.resolve("dielectric_f0"),
        }
    }

    pub fn write(&self, table: &mut UniformTable, material: &MaterialState) {
        table.write(self.use_base_texture, material.use_base_texture);
        table.write(self.use_normal_map, material.use_normal_map);
        table.write(self.use_roughness_map, material.use_roughness_map);
        table.write(self.use_metallic_map, material.use_metallic_map);
        table.write(self.use_ibl, material.use_ibl);
        table.write(self.roughness, material.roughness);
        table.write(self.metallic, material.metallic);
        table.write(self.base_color_tint, material.base_color_tint);
        table.write(self.dielectric_f0, material.dielectric_f0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_are_unique() {
        let mut units: Vec<_> = TextureRole::ALL.iter().map(|r| r.unit()).collect();
        units.sort_unstable();
        units.dedup();
        assert_eq!(units.len(), TextureRole::UNIT_COUNT);
        assert!(units.iter().all(|&u| (u as usize) < TextureRole::UNIT_COUNT));
    }

    #[test]
    fn material_roles_are_flat_textures() {
        assert!(TextureRole::MATERIAL.iter().all(|r| !r.is_cube()));
        assert_eq!(TextureRole::BaseColor.unit(), 0);
        assert_eq!(TextureRole::Metallic.unit(), 3);
    }

    #[test]
    fn empty_table_resolves_nothing() {
        let mut table = UniformTable::empty();
        let slots = MaterialSlots::resolve(&table);
        assert!(slots.roughness.is_absent());
        slots.write(&mut table, &MaterialState::default());
        assert!(table.blocks().is_empty());
    }
}

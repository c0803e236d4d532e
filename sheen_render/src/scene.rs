//! Everything the frame driver draws, owned in one place.
//!
//! Reload entry points and the draw path both take this by reference. A
//! reload always finishes building its replacement before the handle it
//! replaces is released.

use crate::environment::{Environment, EnvironmentError};
use crate::program::ProgramManager;
use crate::resources::{GpuResources, TextureId, VertexArrayId};
use sheen_asset::{EnvironmentSettings, Mesh, Texture2D, TextureRole};
use std::path::Path;
use tracing::debug;

/// The four material maps, indexed by their texture unit.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct MaterialTextures {
    maps: [Option<TextureId>; TextureRole::MATERIAL.len()],
}

impl MaterialTextures {
    /// Map of `role`. Environment roles never hold a material map.
    pub fn get(&self, role: TextureRole) -> Option<TextureId> {
        self.maps.get(role.unit() as usize).copied().flatten()
    }

    fn replace(&mut self, role: TextureRole, texture: Option<TextureId>) -> Option<TextureId> {
        let slot = self.maps.get_mut(role.unit() as usize)?;
        std::mem::replace(slot, texture)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureRole, TextureId)> + '_ {
        TextureRole::MATERIAL
            .into_iter()
            .filter_map(|role| Some((role, self.get(role)?)))
    }
}

pub struct SceneResources {
    mesh: VertexArrayId,
    textures: MaterialTextures,
    environment: Environment,
}

impl SceneResources {
    pub fn new(resources: &mut GpuResources, mesh: &Mesh) -> Self {
        SceneResources {
            mesh: resources.create_vertex_array("Scene Mesh", mesh),
            textures: MaterialTextures::default(),
            environment: Environment::new(),
        }
    }

    pub fn mesh(&self) -> VertexArrayId {
        self.mesh
    }

    pub fn textures(&self) -> &MaterialTextures {
        &self.textures
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    /// Installs `texture` as the map of `role` and releases the one it replaces.
    ///
    /// Returns false, releasing nothing, when `role` isn't a material map.
    pub fn set_texture(
        &mut self,
        resources: &mut GpuResources,
        role: TextureRole,
        texture: TextureId,
    ) -> bool {
        if !TextureRole::MATERIAL.contains(&role) {
            debug!("{role:?} is not a material map");
            return false;
        }

        if let Some(old) = self.textures.replace(role, Some(texture))
            && old != texture
        {
            resources.release_texture(old);
        }
        true
    }

    /// Loads the map of `role` from `path`, falling back to white when it doesn't decode.
    pub fn reload_texture(
        &mut self,
        resources: &mut GpuResources,
        role: TextureRole,
        path: impl AsRef<Path>,
        generate_mips: bool,
        flip_y: bool,
    ) -> Option<TextureId> {
        if !TextureRole::MATERIAL.contains(&role) {
            debug!("{role:?} is not a material map");
            return None;
        }

        let texture = resources.load_2d(path, generate_mips, flip_y);
        self.set_texture(resources, role, texture);
        Some(texture)
    }

    pub fn upload_texture(
        &mut self,
        resources: &mut GpuResources,
        role: TextureRole,
        image: &Texture2D,
        generate_mips: bool,
    ) -> Option<TextureId> {
        if !TextureRole::MATERIAL.contains(&role) {
            return None;
        }

        let texture = resources.upload_2d(image, generate_mips);
        self.set_texture(resources, role, texture);
        Some(texture)
    }

    pub fn clear_texture(&mut self, resources: &mut GpuResources, role: TextureRole) {
        if let Some(old) = self.textures.replace(role, None) {
            resources.release_texture(old);
        }
    }

    pub fn reload_environment(
        &mut self,
        resources: &mut GpuResources,
        programs: &mut ProgramManager,
        path: impl AsRef<Path>,
        settings: &EnvironmentSettings,
    ) -> Result<(), EnvironmentError> {
        self.environment.reload(resources, programs, path, settings)
    }

    pub fn reload_mesh(&mut self, resources: &mut GpuResources, mesh: &Mesh) {
        let next = resources.create_vertex_array("Scene Mesh", mesh);
        let old = std::mem::replace(&mut self.mesh, next);
        resources.release_vertex_array(old);
    }

    /// Releases every handle the scene owns.
    pub fn release(mut self, resources: &mut GpuResources, programs: &mut ProgramManager) {
        for role in TextureRole::MATERIAL {
            self.clear_texture(resources, role);
        }
        self.environment.destroy(resources, programs);
        resources.release_vertex_array(self.mesh);
    }
}

use crate::mesh::{Mesh, Vertex3D, compute_tangents};

pub struct MeshBuilder {
    vertices: Vec<Vertex3D>,
    indices: Option<Vec<u32>>,
    tangents: bool,
}

impl MeshBuilder {
    pub fn new(vertices: Vec<Vertex3D>) -> Self {
        MeshBuilder {
            vertices,
            indices: None,
            tangents: false,
        }
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    /// Derive vertex tangents from positions and uvs when building.
    pub fn with_tangents(mut self) -> Self {
        self.tangents = true;
        self
    }

    pub fn build(self) -> Mesh {
        let mut vertices = self.vertices;
        let indices = self
            .indices
            .unwrap_or_else(|| (0..vertices.len() as u32).collect());

        debug_assert!(
            indices.len() % 3 == 0,
            "Triangle list index count {} is not a multiple of 3",
            indices.len()
        );

        if self.tangents {
            compute_tangents(&mut vertices, &indices);
        }

        Mesh { vertices, indices }
    }
}

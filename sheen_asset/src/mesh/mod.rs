mod builder;
mod tangent;
mod vertex;

pub use builder::MeshBuilder;
pub use tangent::compute_tangents;
pub use vertex::Vertex3D;

use nalgebra::{Vector2, Vector3};

/// An indexed triangle list.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex3D>,
    indices: Vec<u32>,
}

impl Mesh {
    pub fn builder(vertices: Vec<Vertex3D>) -> MeshBuilder {
        MeshBuilder::new(vertices)
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex3D] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn indices_count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// A quad in the XY plane spanning -1..1 and facing +Z.
    ///
    /// Uvs are (0,0), (1,0), (0,1), (1,1) in bottom-left, bottom-right,
    /// top-left, top-right order.
    pub fn unit_quad() -> Mesh {
        let normal = Vector3::z();
        let vertices = vec![
            Vertex3D::new(Vector3::new(-1.0, -1.0, 0.0), normal, Vector2::new(0.0, 0.0)),
            Vertex3D::new(Vector3::new(1.0, -1.0, 0.0), normal, Vector2::new(1.0, 0.0)),
            Vertex3D::new(Vector3::new(-1.0, 1.0, 0.0), normal, Vector2::new(0.0, 1.0)),
            Vertex3D::new(Vector3::new(1.0, 1.0, 0.0), normal, Vector2::new(1.0, 1.0)),
        ];

        Mesh::builder(vertices)
            .with_indices(vec![0, 1, 2, 2, 1, 3])
            .with_tangents()
            .build()
    }

    /// A cube spanning -1..1 on every axis with per-face normals and uvs.
    pub fn unit_cube() -> Mesh {
        // (normal, right, up) with right x up == normal, so faces wind counter-clockwise
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, right, up) in FACES {
            let normal = Vector3::from(normal);
            let right = Vector3::from(right);
            let up = Vector3::from(up);
            let base = vertices.len() as u32;

            for (s, t) in CORNERS {
                let position = normal + right * s + up * t;
                let uv = Vector2::new((s + 1.0) * 0.5, (t + 1.0) * 0.5);
                vertices.push(Vertex3D::new(position, normal, uv));
            }

            indices.extend([0, 1, 2, 2, 1, 3].map(|i| base + i));
        }

        Mesh::builder(vertices)
            .with_indices(indices)
            .with_tangents()
            .build()
    }

    /// A single upright triangle with its base along the X axis.
    pub fn triangle() -> Mesh {
        let normal = Vector3::z();
        let vertices = vec![
            Vertex3D::new(Vector3::new(-0.5, -0.5, 0.0), normal, Vector2::new(0.0, 0.0)),
            Vertex3D::new(Vector3::new(0.5, -0.5, 0.0), normal, Vector2::new(1.0, 0.0)),
            Vertex3D::new(Vector3::new(0.0, 0.5, 0.0), normal, Vector2::new(0.5, 1.0)),
        ];

        Mesh::builder(vertices).with_tangents().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_triangle_lists() {
        for mesh in [Mesh::unit_quad(), Mesh::unit_cube(), Mesh::triangle()] {
            assert_eq!(mesh.indices_count() % 3, 0);
            assert!(mesh.indices().iter().all(|&i| (i as usize) < mesh.vertex_count()));
        }
        assert_eq!(Mesh::unit_cube().triangle_count(), 12);
        assert_eq!(Mesh::triangle().indices(), &[0, 1, 2]);
    }

    #[test]
    fn cube_faces_wind_outwards() {
        let cube = Mesh::unit_cube();
        for tri in cube.indices().chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| cube.vertices()[tri[i] as usize]);
            let face_normal = (b.position - a.position).cross(&(c.position - a.position));
            assert!(face_normal.dot(&a.normal) > 0.0);
        }
    }

    #[test]
    fn cube_tangents_lie_in_face_plane() {
        for v in Mesh::unit_cube().vertices() {
            assert!((v.tangent.norm() - 1.0).abs() < 1e-5);
            assert!(v.tangent.dot(&v.normal).abs() < 1e-5);
        }
    }
}

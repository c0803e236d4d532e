use crate::mesh::Vertex3D;
use nalgebra::Vector3;
use tracing::warn;

/// Derives a per-vertex tangent from the triangle list's positions and uvs.
///
/// Every triangle adds its un-normalized tangent to each of its three
/// vertices. After all triangles are accumulated, every vertex tangent is
/// normalized exactly once. Vertices that received no contribution keep a
/// zero tangent.
///
/// Triangles with a degenerate uv mapping (zero uv-space area) produce
/// non-finite tangents. Meshes must not contain them.
#[profiling::function]
pub fn compute_tangents(vertices: &mut [Vertex3D], indices: &[u32]) {
    let mut accumulated = vec![Vector3::<f32>::zeros(); vertices.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];

        let (Some(v0), Some(v1), Some(v2)) = (vertices.get(i0), vertices.get(i1), vertices.get(i2))
        else {
            warn!("Skipping triangle {triangle:?} referencing vertices out of range");
            continue;
        };

        let tangent = triangle_tangent(v0, v1, v2);

        accumulated[i0] += tangent;
        accumulated[i1] += tangent;
        accumulated[i2] += tangent;
    }

    for (vertex, tangent) in vertices.iter_mut().zip(accumulated) {
        vertex.tangent = if tangent.norm_squared() > 0.0 {
            tangent.normalize()
        } else {
            tangent
        };
    }
}

fn triangle_tangent(v0: &Vertex3D, v1: &Vertex3D, v2: &Vertex3D) -> Vector3<f32> {
    let e1 = v1.position - v0.position;
    let e2 = v2.position - v0.position;
    let delta_uv1 = v1.uv - v0.uv;
    let delta_uv2 = v2.uv - v0.uv;

    let f = 1.0 / (delta_uv1.x * delta_uv2.y - delta_uv2.x * delta_uv1.y);

    (e1 * delta_uv2.y - e2 * delta_uv1.y) * f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use nalgebra::Vector2;

    const EPSILON: f32 = 1e-5;

    fn vertex(x: f32, y: f32, z: f32, u: f32, v: f32) -> Vertex3D {
        Vertex3D::new(Vector3::new(x, y, z), Vector3::z(), Vector2::new(u, v))
    }

    #[test]
    fn planar_quad_has_uniform_orthogonal_tangents() {
        let quad = Mesh::unit_quad();
        let first = quad.vertices()[0].tangent;

        for v in quad.vertices() {
            assert!((v.tangent.norm() - 1.0).abs() < EPSILON);
            assert!(v.tangent.dot(&v.normal).abs() < EPSILON);
            assert!((v.tangent - first).norm() < EPSILON);
        }
        assert!((first - Vector3::x()).norm() < EPSILON);
    }

    #[test]
    fn triangle_order_does_not_change_tangents() {
        let base = vec![
            vertex(0.0, 0.0, 0.0, 0.0, 0.0),
            vertex(1.0, 0.0, 0.2, 1.0, 0.0),
            vertex(0.0, 1.0, -0.3, 0.0, 1.0),
            vertex(1.0, 1.0, 0.5, 1.0, 1.0),
            vertex(2.0, 0.5, 0.1, 1.5, 0.4),
        ];
        let indices = [0, 1, 2, 2, 1, 3, 1, 4, 3];
        let permuted = [1, 4, 3, 0, 1, 2, 2, 1, 3];

        let mut a = base.clone();
        compute_tangents(&mut a, &indices);
        let mut b = base;
        compute_tangents(&mut b, &permuted);

        for (a, b) in a.iter().zip(&b) {
            assert!((a.tangent - b.tangent).norm() < EPSILON);
        }
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let mut a = Mesh::unit_cube().vertices().to_vec();
        let indices = Mesh::unit_cube().indices().to_vec();
        let mut b = a.clone();

        compute_tangents(&mut a, &indices);
        compute_tangents(&mut b, &indices);

        assert_eq!(a, b);
    }

    #[test]
    fn shared_vertex_sums_unnormalized_contributions() {
        // the second triangle has a uv scale half the size, so its tangent is twice as long
        // vertex 0 is shared between a tangent along +X and one along +Y
        let mut vertices = vec![
            vertex(0.0, 0.0, 0.0, 0.0, 0.0),
            vertex(1.0, 0.0, 0.0, 1.0, 0.0),
            vertex(0.0, 1.0, 0.0, 0.0, 1.0),
            vertex(0.0, 1.0, 0.0, 0.5, 0.0),
            vertex(1.0, 0.0, 0.0, 0.0, 0.5),
        ];
        let indices = [0, 1, 2, 0, 3, 4];

        compute_tangents(&mut vertices, &indices);

        let expected = Vector3::new(1.0, 2.0, 0.0).normalize();
        assert!((vertices[0].tangent - expected).norm() < EPSILON);
    }

    #[test]
    fn unreferenced_vertex_keeps_zero_tangent() {
        let mut vertices = vec![
            vertex(0.0, 0.0, 0.0, 0.0, 0.0),
            vertex(1.0, 0.0, 0.0, 1.0, 0.0),
            vertex(0.0, 1.0, 0.0, 0.0, 1.0),
            vertex(5.0, 5.0, 5.0, 0.3, 0.3),
        ];

        compute_tangents(&mut vertices, &[0, 1, 2]);

        assert_eq!(vertices[3].tangent, Vector3::zeros());
    }
}

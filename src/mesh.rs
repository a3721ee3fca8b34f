use crate::math::{Aabb, Float, Point3, Ray, Vec2, Vec3};

/// A single triangle with the quantities the intersection test and the
/// shading pipeline need precomputed: the two edges from `v0`, the geometric
/// face normal, the owning mesh, per-corner vertex indices and UVs, and a
/// bounding box of the three vertices. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub v0: Point3,
    pub v1: Point3,
    pub v2: Point3,
    pub e1: Vec3,
    pub e2: Vec3,
    pub normal: Vec3,
    pub vertex_indices: [usize; 3],
    pub mesh_idx: usize,
    pub uvs: [Vec2; 3],
    pub bbox: Aabb,
}

impl Triangle {
    pub fn new(
        v0: Point3,
        v1: Point3,
        v2: Point3,
        vertex_indices: [usize; 3],
        mesh_idx: usize,
        uvs: [Vec2; 3],
    ) -> Self {
        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let mut bbox = Aabb::empty();
        bbox.expand(v0);
        bbox.expand(v1);
        bbox.expand(v2);
        Self {
            v0,
            v1,
            v2,
            e1,
            e2,
            normal: e1.cross(e2).normalized(),
            vertex_indices,
            mesh_idx,
            uvs,
            bbox,
        }
    }

    /// Scalar Möller–Trumbore test. Returns `(t, u, v)` for a hit with
    /// `t > eps`; the hit position is `origin + t·direction`, equivalently
    /// `v0 + u·e1 + v·e2`. With `backface_culling` the determinant must be
    /// positive, rejecting triangles wound away from the ray.
    pub fn intersect(
        &self,
        ray: &Ray,
        backface_culling: bool,
        eps: Float,
    ) -> Option<(Float, Float, Float)> {
        let pvec = ray.direction.cross(self.e2);
        let det = self.e1.dot(pvec);

        if backface_culling {
            if det <= eps {
                return None;
            }
        } else if det.abs() <= eps {
            return None;
        }

        let inv_det = 1.0 / det;
        let tvec = ray.origin - self.v0;

        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let qvec = tvec.cross(self.e1);
        let v = ray.direction.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = self.e2.dot(qvec) * inv_det;
        if t <= eps {
            return None;
        }

        Some((t, u, v))
    }
}

/// A triangle mesh owning its vertex and triangle arrays. Vertex normals are
/// the unweighted average of every incident face normal, used for smooth
/// shading interpolation.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub material_idx: usize,
    pub vertices: Vec<Point3>,
    pub vertex_normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub triangles: Vec<Triangle>,
    pub face_normals: Vec<Vec3>,
    pub bbox: Aabb,
}

impl Mesh {
    pub fn new(
        material_idx: usize,
        vertices: Vec<Point3>,
        uvs: Vec<Vec2>,
        triangles: Vec<Triangle>,
    ) -> Self {
        let mut bbox = Aabb::empty();
        let mut face_normals = Vec::with_capacity(triangles.len());
        let mut vertex_normals = vec![Vec3::zero(); vertices.len()];

        for triangle in &triangles {
            bbox.unite(&triangle.bbox);
            face_normals.push(triangle.normal);
            for idx in triangle.vertex_indices {
                vertex_normals[idx] += triangle.normal;
            }
        }

        for normal in &mut vertex_normals {
            *normal = normal.normalized();
        }

        Self {
            material_idx,
            vertices,
            vertex_normals,
            uvs,
            triangles,
            face_normals,
            bbox,
        }
    }
}

use std::sync::Arc;

use tracing::debug;

use crate::math::{Aabb, Float, Point3, Ray, Vec2, Vec3};
use crate::mesh::Triangle;
use crate::scene::Scene;
use crate::simd::{self, FloatX, Mask, LANES};
use wide::{CmpEq, CmpGe, CmpGt, CmpLe};

/// Depth at which recursion stops regardless of subset size.
pub const MAX_TREE_DEPTH: usize = 8;
/// Subsets at or below this size become leaves.
pub const MAX_LEAF_SIZE: usize = 64;

/// Sentinel for an absent child / pack reference.
const EMPTY: usize = usize::MAX;

/// Everything the integrator needs to shade one surface point: the
/// originating ray, the world-space position, the barycentric-interpolated
/// shading normal next to the geometric face normal, the triangle's corner
/// UVs, the hit distance, the barycentrics themselves and the owning mesh.
#[derive(Debug, Clone)]
pub struct Hit {
    pub ray: Ray,
    pub position: Point3,
    pub normal: Vec3,
    pub face_normal: Vec3,
    pub uvs: [Vec2; 3],
    pub t: Float,
    pub u: Float,
    pub v: Float,
    pub w: Float,
    pub mesh_idx: usize,
}

/// A structure-of-arrays bundle of [`LANES`] triangles tested against one ray
/// in parallel. Underfilled packets duplicate the last valid triangle into
/// the spare lanes; duplicates can never become the unique minimum because
/// the traversal replaces masked-lane distances with the current best.
pub struct TrianglePacket {
    v0x: FloatX,
    v0y: FloatX,
    v0z: FloatX,
    e1x: FloatX,
    e1y: FloatX,
    e1z: FloatX,
    e2x: FloatX,
    e2y: FloatX,
    e2z: FloatX,
    triangle_indices: [usize; LANES],
}

impl TrianglePacket {
    /// Packs up to [`LANES`] triangles referenced by `subset` out of the
    /// global triangle array, duplicating the last entry into unused lanes.
    fn pack(triangles: &[Triangle], subset: &[usize]) -> Self {
        let mut v0 = [[0.0; LANES]; 3];
        let mut e1 = [[0.0; LANES]; 3];
        let mut e2 = [[0.0; LANES]; 3];
        let mut triangle_indices = [0; LANES];

        for lane in 0..LANES {
            let triangle_idx = subset[lane.min(subset.len() - 1)];
            let triangle = &triangles[triangle_idx];
            for axis in 0..3 {
                v0[axis][lane] = triangle.v0[axis];
                e1[axis][lane] = triangle.e1[axis];
                e2[axis][lane] = triangle.e2[axis];
            }
            triangle_indices[lane] = triangle_idx;
        }

        Self {
            v0x: simd::from_lanes(v0[0]),
            v0y: simd::from_lanes(v0[1]),
            v0z: simd::from_lanes(v0[2]),
            e1x: simd::from_lanes(e1[0]),
            e1y: simd::from_lanes(e1[1]),
            e1z: simd::from_lanes(e1[2]),
            e2x: simd::from_lanes(e2[0]),
            e2y: simd::from_lanes(e2[1]),
            e2z: simd::from_lanes(e2[2]),
            triangle_indices,
        }
    }

    /// Lane-parallel Möller–Trumbore. Returns the active-lane mask and the
    /// per-lane `(u, v, t)`; inactive lanes hold garbage and must be ignored
    /// through the mask.
    fn intersect(
        &self,
        ray: &Ray,
        backface_culling: bool,
        eps: Float,
    ) -> (Mask, FloatX, FloatX, FloatX) {
        let dir_x = simd::splat(ray.direction.x);
        let dir_y = simd::splat(ray.direction.y);
        let dir_z = simd::splat(ray.direction.z);

        let pvec_x = dir_y * self.e2z - dir_z * self.e2y;
        let pvec_y = dir_z * self.e2x - dir_x * self.e2z;
        let pvec_z = dir_x * self.e2y - dir_y * self.e2x;

        let det = self.e1x * pvec_x + self.e1y * pvec_y + self.e1z * pvec_z;

        let eps_x = simd::splat(eps);
        let mut mask = if backface_culling {
            det.cmp_ge(eps_x)
        } else {
            det.abs().cmp_ge(eps_x)
        };

        let inv_det = simd::splat(1.0) / det;

        let tvec_x = simd::splat(ray.origin.x) - self.v0x;
        let tvec_y = simd::splat(ray.origin.y) - self.v0y;
        let tvec_z = simd::splat(ray.origin.z) - self.v0z;

        let zero = simd::splat(0.0);
        let one = simd::splat(1.0);

        let u = (tvec_x * pvec_x + tvec_y * pvec_y + tvec_z * pvec_z) * inv_det;
        mask = mask & u.cmp_ge(zero) & u.cmp_le(one);

        let qvec_x = tvec_y * self.e1z - tvec_z * self.e1y;
        let qvec_y = tvec_z * self.e1x - tvec_x * self.e1z;
        let qvec_z = tvec_x * self.e1y - tvec_y * self.e1x;

        let v = (dir_x * qvec_x + dir_y * qvec_y + dir_z * qvec_z) * inv_det;
        mask = mask & v.cmp_ge(zero) & (u + v).cmp_le(one);

        let t = (self.e2x * qvec_x + self.e2y * qvec_y + self.e2z * qvec_z) * inv_det;
        mask = mask & t.cmp_gt(eps_x);

        (mask, u, v, t)
    }
}

/// One tree node. Interior nodes carry child indices and `start_idx ==
/// EMPTY`; leaves reference a contiguous run of the packet array.
struct Node {
    bbox: Aabb,
    child0: usize,
    child1: usize,
    start_idx: usize,
    pack_count: usize,
}

impl Node {
    fn interior(bbox: Aabb) -> Self {
        Self {
            bbox,
            child0: EMPTY,
            child1: EMPTY,
            start_idx: EMPTY,
            pack_count: 0,
        }
    }
}

/// A spatial k-d tree over the union of all mesh triangles, with SIMD
/// triangle packets at the leaves. Built once from the scene, read-only
/// afterwards; nodes live in one contiguous array, leaves in another.
///
/// Triangles straddling a split plane are referenced from both children;
/// the query loop tolerates the duplicates because a second encounter can
/// never beat the distance recorded at the first.
pub struct KdTree {
    scene: Arc<Scene>,
    triangles: Vec<Triangle>,
    nodes: Vec<Node>,
    packs: Vec<TrianglePacket>,
}

impl KdTree {
    pub fn build(scene: Arc<Scene>) -> Self {
        let mut root_box = Aabb::empty();
        let mut triangles = Vec::with_capacity(scene.triangle_count());
        let mut subset = Vec::with_capacity(scene.triangle_count());

        for mesh in &scene.meshes {
            root_box.unite(&mesh.bbox);
            let start = triangles.len();
            triangles.extend(mesh.triangles.iter().cloned());
            subset.extend(start..triangles.len());
        }

        let mut tree = Self {
            scene,
            triangles,
            nodes: vec![Node::interior(root_box)],
            packs: Vec::new(),
        };
        tree.build_node(0, 0, &subset);

        debug!(
            triangles = tree.triangles.len(),
            nodes = tree.nodes.len(),
            packets = tree.packs.len(),
            "k-d tree built"
        );

        tree
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    fn build_node(&mut self, node_idx: usize, depth: usize, subset: &[usize]) {
        if depth == MAX_TREE_DEPTH || subset.len() <= MAX_LEAF_SIZE {
            self.build_leaf(node_idx, subset);
            return;
        }

        let (box0, box1) = self.nodes[node_idx].bbox.split(depth % 3);

        let mut subset0 = Vec::with_capacity(subset.len());
        let mut subset1 = Vec::with_capacity(subset.len());
        for &triangle_idx in subset {
            let triangle_box = &self.triangles[triangle_idx].bbox;
            if box0.overlaps(triangle_box) {
                subset0.push(triangle_idx);
            }
            if box1.overlaps(triangle_box) {
                subset1.push(triangle_idx);
            }
        }

        if !subset0.is_empty() {
            let child = self.nodes.len();
            self.nodes.push(Node::interior(box0));
            self.nodes[node_idx].child0 = child;
            self.build_node(child, depth + 1, &subset0);
        }

        if !subset1.is_empty() {
            let child = self.nodes.len();
            self.nodes.push(Node::interior(box1));
            self.nodes[node_idx].child1 = child;
            self.build_node(child, depth + 1, &subset1);
        }
    }

    fn build_leaf(&mut self, node_idx: usize, subset: &[usize]) {
        let first_pack = self.packs.len();
        for chunk in subset.chunks(LANES) {
            self.packs.push(TrianglePacket::pack(&self.triangles, chunk));
        }
        self.nodes[node_idx].start_idx = first_pack;
        self.nodes[node_idx].pack_count = self.packs.len() - first_pack;
    }

    /// Closest-hit query. `stack` is the caller's scratch traversal stack,
    /// cleared on entry and reused across calls to keep the hot loop free of
    /// allocation. Push order is unspecified; correctness relies on pruning
    /// subtrees whose box entry cannot improve the best hit.
    pub fn closest_hit(
        &self,
        ray: &Ray,
        backface_culling: bool,
        eps: Float,
        stack: &mut Vec<usize>,
    ) -> Option<Hit> {
        let mut best_t = Float::MAX;
        let mut best_u = Float::MAX;
        let mut best_v = Float::MAX;
        let mut best_pack = EMPTY;
        let mut best_lane = EMPTY;

        stack.clear();
        stack.push(0);

        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];

            let Some(entry) = node.bbox.intersect(ray, best_t) else {
                continue;
            };
            if best_t <= entry {
                continue;
            }

            if node.start_idx == EMPTY {
                if node.child0 != EMPTY {
                    stack.push(node.child0);
                }
                if node.child1 != EMPTY {
                    stack.push(node.child1);
                }
                continue;
            }

            for pack_idx in node.start_idx..node.start_idx + node.pack_count {
                let pack = &self.packs[pack_idx];

                let (mask, u, v, t) = pack.intersect(ray, backface_culling, eps);
                if !simd::any_active(mask) {
                    continue;
                }

                // Inactive lanes take the current best so they can never win
                // the horizontal minimum.
                let t = mask.blend(t, simd::splat(best_t));
                let t_min = simd::hmin(t);
                if best_t <= t_min {
                    continue;
                }

                // Lowest lane index wins distance ties.
                let winners = mask & t.cmp_eq(simd::splat(t_min));
                let Some(lane) = simd::first_active(winners) else {
                    continue;
                };

                best_pack = pack_idx;
                best_lane = lane;
                best_u = u.to_array()[lane];
                best_v = v.to_array()[lane];
                best_t = t_min;
            }
        }

        if best_t == Float::MAX {
            return None;
        }

        let pack = &self.packs[best_pack];
        let triangle_idx = pack.triangle_indices[best_lane];
        let triangle = &self.triangles[triangle_idx];
        let mesh = &self.scene.meshes[triangle.mesh_idx];

        let w = 1.0 - best_u - best_v;
        let [i0, i1, i2] = triangle.vertex_indices;
        let normal = (best_u * mesh.vertex_normals[i1]
            + best_v * mesh.vertex_normals[i2]
            + w * mesh.vertex_normals[i0])
            .normalized();

        Some(Hit {
            ray: *ray,
            position: ray.at(best_t),
            normal,
            face_normal: triangle.normal,
            uvs: triangle.uvs,
            t: best_t,
            u: best_u,
            v: best_v,
            w,
            mesh_idx: triangle.mesh_idx,
        })
    }
}

use std::collections::HashMap;

use crate::image::Image;
use crate::math::{Color, Float, Mat3, Point3, Vec2};
use crate::mesh::Mesh;

/// Render settings parsed from the scene file's `settings` block.
#[derive(Debug, Clone)]
pub struct Settings {
    pub background_color: Color,
    pub image_height: usize,
    pub image_width: usize,
    pub bucket_size: usize,
}

/// A pinhole camera: a position and a row-major orientation matrix whose
/// transpose maps camera-local axes to world axes.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Point3,
    pub matrix: Mat3,
}

/// A point light radiating `intensity` uniformly over the sphere.
#[derive(Debug, Clone)]
pub struct Light {
    pub position: Point3,
    pub intensity: Float,
}

/// Surface material. The set is closed, so shading dispatch is a dense match
/// rather than virtual calls. Only `Refractive` is transmissive.
#[derive(Debug, Clone)]
pub enum Material {
    Diffuse { albedo: Color, smooth: bool },
    Textured { texture: String, smooth: bool },
    Reflective { albedo: Color, smooth: bool },
    Refractive { ior: Float, smooth: bool },
    Constant { albedo: Color, smooth: bool },
}

impl Material {
    /// Whether shadow rays pass through this material (attenuated by the
    /// occlusion walk) instead of being blocked outright.
    pub fn is_transmissive(&self) -> bool {
        matches!(self, Material::Refractive { .. })
    }
}

/// Procedural or bitmap-backed surface color, evaluated from the hit's
/// barycentric coordinates and the triangle's per-corner UVs.
#[derive(Debug, Clone)]
pub enum Texture {
    Albedo {
        color: Color,
    },
    Edge {
        edge_color: Color,
        inner_color: Color,
        edge_width: Float,
    },
    Checker {
        color_a: Color,
        color_b: Color,
        square_size: Float,
    },
    Bitmap {
        image: Image,
    },
}

impl Texture {
    /// Evaluates the texture at barycentric `(u, v, w)` with the triangle's
    /// corner UVs `(uv0, uv1, uv2)`. The interpolated coordinate weights the
    /// corners by `(w, u, v)` — the barycentric weight of each vertex.
    pub fn sample(&self, u: Float, v: Float, w: Float, uvs: &[Vec2; 3]) -> Color {
        match self {
            Texture::Albedo { color } => *color,

            Texture::Edge {
                edge_color,
                inner_color,
                edge_width,
            } => {
                if u < *edge_width || v < *edge_width || w < *edge_width {
                    *edge_color
                } else {
                    *inner_color
                }
            }

            Texture::Checker {
                color_a,
                color_b,
                square_size,
            } => {
                let uv = w * uvs[0] + u * uvs[1] + v * uvs[2];
                // floor keeps the cell parity continuous across zero;
                // truncation would mirror the board around the origin.
                let cell_u = (uv.x / square_size).floor() as i64;
                let cell_v = (uv.y / square_size).floor() as i64;
                if (cell_u + cell_v).rem_euclid(2) == 0 {
                    *color_a
                } else {
                    *color_b
                }
            }

            Texture::Bitmap { image } => {
                let uv = w * uvs[0] + u * uvs[1] + v * uvs[2];
                let row = ((1.0 - uv.y) * image.height() as Float) as i64;
                let col = (uv.x * image.width() as Float) as i64;
                let row = row.clamp(0, image.height() as i64 - 1) as usize;
                let col = col.clamp(0, image.width() as i64 - 1) as usize;
                image.get(row, col)
            }
        }
    }
}

/// The fully-loaded scene: read-only once the parser returns it, shared by
/// reference among all render workers.
#[derive(Debug, Clone)]
pub struct Scene {
    pub settings: Settings,
    pub camera: Camera,
    pub lights: Vec<Light>,
    pub textures: HashMap<String, Texture>,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
}

impl Scene {
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.triangles.len()).sum()
    }
}

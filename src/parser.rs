use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::SceneError;
use crate::image::load_bitmap;
use crate::math::{Float, Mat3, Point3, Vec2, Vec3};
use crate::mesh::{Mesh, Triangle};
use crate::scene::{Camera, Light, Material, Scene, Settings, Texture};

const DEFAULT_BUCKET_SIZE: usize = 64;

// Raw schema types mirroring the JSON layout; converted into domain types
// with explicit validation so error messages can name the offending field.

#[derive(Deserialize)]
struct SceneFile {
    settings: RawSettings,
    camera: RawCamera,
    lights: Vec<RawLight>,
    #[serde(default)]
    textures: Vec<RawTexture>,
    materials: Vec<RawMaterial>,
    objects: Vec<RawObject>,
}

#[derive(Deserialize)]
struct RawSettings {
    background_color: [Float; 3],
    image_settings: RawImageSettings,
}

#[derive(Deserialize)]
struct RawImageSettings {
    width: usize,
    height: usize,
    bucket_size: Option<usize>,
}

#[derive(Deserialize)]
struct RawCamera {
    position: [Float; 3],
    matrix: [Float; 9],
}

#[derive(Deserialize)]
struct RawLight {
    position: [Float; 3],
    intensity: Float,
}

#[derive(Deserialize)]
struct RawTexture {
    name: String,
    #[serde(flatten)]
    kind: RawTextureKind,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawTextureKind {
    Albedo {
        albedo: [Float; 3],
    },
    Edges {
        edge_color: [Float; 3],
        inner_color: [Float; 3],
        edge_width: Float,
    },
    Checker {
        #[serde(rename = "color_A")]
        color_a: [Float; 3],
        #[serde(rename = "color_B")]
        color_b: [Float; 3],
        square_size: Float,
    },
    Bitmap {
        file_path: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawMaterial {
    /// `albedo` carries either an RGB array or a texture name.
    Diffuse {
        albedo: RawAlbedo,
        smooth_shading: bool,
    },
    Reflective {
        albedo: [Float; 3],
        smooth_shading: bool,
    },
    Refractive {
        ior: Float,
        smooth_shading: bool,
    },
    Constant {
        albedo: [Float; 3],
        smooth_shading: bool,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAlbedo {
    Color([Float; 3]),
    Texture(String),
}

#[derive(Deserialize)]
struct RawObject {
    material_index: usize,
    vertices: Vec<Float>,
    #[serde(default)]
    uvs: Vec<Float>,
    triangles: Vec<usize>,
}

fn vec3(a: [Float; 3]) -> Vec3 {
    Vec3::new(a[0], a[1], a[2])
}

/// Loads and validates a scene file. Bitmap texture paths are resolved
/// relative to the scene file's directory.
pub fn parse_scene_file(path: &Path) -> Result<Scene, SceneError> {
    let text = fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_scene_str(&text, base_dir)
}

/// Parses a scene from a JSON string, resolving bitmap paths against
/// `base_dir`.
pub fn parse_scene_str(text: &str, base_dir: &Path) -> Result<Scene, SceneError> {
    let raw: SceneFile = serde_json::from_str(text)?;
    build_scene(raw, base_dir)
}

fn build_scene(raw: SceneFile, base_dir: &Path) -> Result<Scene, SceneError> {
    let settings = Settings {
        background_color: vec3(raw.settings.background_color),
        image_height: raw.settings.image_settings.height,
        image_width: raw.settings.image_settings.width,
        bucket_size: raw
            .settings
            .image_settings
            .bucket_size
            .unwrap_or(DEFAULT_BUCKET_SIZE),
    };

    let camera = Camera {
        position: vec3(raw.camera.position),
        matrix: Mat3::from_rows(raw.camera.matrix),
    };

    let lights = raw
        .lights
        .into_iter()
        .map(|light| Light {
            position: vec3(light.position),
            intensity: light.intensity,
        })
        .collect();

    let mut textures = HashMap::new();
    for texture in raw.textures {
        let loaded = match texture.kind {
            RawTextureKind::Albedo { albedo } => Texture::Albedo {
                color: vec3(albedo),
            },
            RawTextureKind::Edges {
                edge_color,
                inner_color,
                edge_width,
            } => Texture::Edge {
                edge_color: vec3(edge_color),
                inner_color: vec3(inner_color),
                edge_width,
            },
            RawTextureKind::Checker {
                color_a,
                color_b,
                square_size,
            } => Texture::Checker {
                color_a: vec3(color_a),
                color_b: vec3(color_b),
                square_size,
            },
            RawTextureKind::Bitmap { file_path } => Texture::Bitmap {
                image: load_bitmap(&base_dir.join(file_path))?,
            },
        };
        textures.insert(texture.name, loaded);
    }

    let mut materials = Vec::with_capacity(raw.materials.len());
    for (material_idx, material) in raw.materials.into_iter().enumerate() {
        materials.push(match material {
            RawMaterial::Diffuse {
                albedo: RawAlbedo::Color(color),
                smooth_shading,
            } => Material::Diffuse {
                albedo: vec3(color),
                smooth: smooth_shading,
            },
            RawMaterial::Diffuse {
                albedo: RawAlbedo::Texture(name),
                smooth_shading,
            } => {
                if !textures.contains_key(&name) {
                    return Err(SceneError::UnknownTexture {
                        material: material_idx,
                        name,
                    });
                }
                Material::Textured {
                    texture: name,
                    smooth: smooth_shading,
                }
            }
            RawMaterial::Reflective {
                albedo,
                smooth_shading,
            } => Material::Reflective {
                albedo: vec3(albedo),
                smooth: smooth_shading,
            },
            RawMaterial::Refractive { ior, smooth_shading } => Material::Refractive {
                ior,
                smooth: smooth_shading,
            },
            RawMaterial::Constant {
                albedo,
                smooth_shading,
            } => Material::Constant {
                albedo: vec3(albedo),
                smooth: smooth_shading,
            },
        });
    }

    let mut meshes = Vec::with_capacity(raw.objects.len());
    for (object_idx, object) in raw.objects.into_iter().enumerate() {
        meshes.push(build_mesh(object, object_idx, materials.len())?);
    }

    let scene = Scene {
        settings,
        camera,
        lights,
        textures,
        materials,
        meshes,
    };

    debug!(
        meshes = scene.meshes.len(),
        triangles = scene.triangle_count(),
        materials = scene.materials.len(),
        textures = scene.textures.len(),
        lights = scene.lights.len(),
        "scene loaded"
    );

    Ok(scene)
}

fn build_mesh(
    object: RawObject,
    object_idx: usize,
    material_count: usize,
) -> Result<Mesh, SceneError> {
    if object.material_index >= material_count {
        return Err(SceneError::MaterialIndex {
            object: object_idx,
            index: object.material_index,
            count: material_count,
        });
    }

    if object.vertices.len() % 3 != 0 {
        return Err(SceneError::BufferLength {
            object: object_idx,
            field: "vertices",
            len: object.vertices.len(),
        });
    }
    let vertices: Vec<Point3> = object
        .vertices
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect();

    // UVs arrive as (u, v, w) triples; the third component is ignored.
    if object.uvs.len() % 3 != 0 {
        return Err(SceneError::BufferLength {
            object: object_idx,
            field: "uvs",
            len: object.uvs.len(),
        });
    }
    let uvs: Vec<Vec2> = object
        .uvs
        .chunks_exact(3)
        .map(|c| Vec2::new(c[0], c[1]))
        .collect();

    if object.triangles.len() % 3 != 0 {
        return Err(SceneError::BufferLength {
            object: object_idx,
            field: "triangles",
            len: object.triangles.len(),
        });
    }

    let mut triangles = Vec::with_capacity(object.triangles.len() / 3);
    for corner_indices in object.triangles.chunks_exact(3) {
        let indices = [corner_indices[0], corner_indices[1], corner_indices[2]];
        for &index in &indices {
            if index >= vertices.len() || (!uvs.is_empty() && index >= uvs.len()) {
                return Err(SceneError::VertexIndex {
                    object: object_idx,
                    index,
                    count: vertices.len(),
                });
            }
        }

        let triangle_uvs = if uvs.is_empty() {
            [Vec2::default(); 3]
        } else {
            [uvs[indices[0]], uvs[indices[1]], uvs[indices[2]]]
        };

        triangles.push(Triangle::new(
            vertices[indices[0]],
            vertices[indices[1]],
            vertices[indices[2]],
            indices,
            object_idx,
            triangle_uvs,
        ));
    }

    Ok(Mesh::new(
        object.material_index,
        vertices,
        uvs,
        triangles,
    ))
}

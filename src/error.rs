use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while loading a scene. Rendering is never attempted once
/// any of these surfaces; the variants name the offending field so a bad
/// scene file can be fixed without a debugger.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to read scene file `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed scene JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("object {object}: `{field}` length {len} is not a multiple of 3")]
    BufferLength {
        object: usize,
        field: &'static str,
        len: usize,
    },

    #[error("object {object}: triangle index {index} out of range (mesh has {count} vertices)")]
    VertexIndex {
        object: usize,
        index: usize,
        count: usize,
    },

    #[error("object {object}: material_index {index} out of range ({count} materials)")]
    MaterialIndex {
        object: usize,
        index: usize,
        count: usize,
    },

    #[error("material {material}: unknown texture `{name}`")]
    UnknownTexture { material: usize, name: String },

    #[error("failed to load bitmap `{}`", path.display())]
    Bitmap {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

use std::io::{self, Write};
use std::path::Path;

use crate::error::SceneError;
use crate::math::{Color, Float};

/// A 2-D buffer of linear-space colors, addressed by (row, column) with row 0
/// at the top of the frame. Dimensions are fixed at construction; workers
/// write disjoint tile regions and the writer consumes the result after join.
#[derive(Debug, Clone)]
pub struct Image {
    height: usize,
    width: usize,
    pixels: Vec<Color>,
}

impl Image {
    pub fn new(height: usize, width: usize, fill: Color) -> Self {
        Self {
            height,
            width,
            pixels: vec![fill; height * width],
        }
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Color {
        self.pixels[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, color: Color) {
        self.pixels[row * self.width + col] = color;
    }
}

/// Writes the image as ASCII PPM (P3): header, then one line per row with
/// space-separated channel triples and a tab after each pixel. Channels are
/// clamped to [0, 1] and quantized through ⌊255.999·c⌋.
pub fn write_ppm<W: Write>(img: &Image, out: &mut W) -> io::Result<()> {
    write!(out, "P3\n{} {}\n255\n", img.width(), img.height())?;
    for row in 0..img.height() {
        for col in 0..img.width() {
            let (r, g, b) = img.get(row, col).to_rgb8();
            write!(out, "{r} {g} {b}\t")?;
        }
        writeln!(out)?;
    }
    out.flush()
}

/// Decodes an 8-bit bitmap into linear [0, 1] colors for texture sampling.
pub fn load_bitmap(path: &Path) -> Result<Image, SceneError> {
    let decoded = image::open(path)
        .map_err(|source| SceneError::Bitmap {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();

    let (width, height) = decoded.dimensions();
    let scale: Float = 1.0 / 255.0;

    let mut img = Image::new(height as usize, width as usize, Color::zero());
    for row in 0..height {
        for col in 0..width {
            let p = decoded.get_pixel(col, row);
            img.set(
                row as usize,
                col as usize,
                Color::new(
                    Float::from(p[0]) * scale,
                    Float::from(p[1]) * scale,
                    Float::from(p[2]) * scale,
                ),
            );
        }
    }

    Ok(img)
}

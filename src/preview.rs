//! Optional post-render terminal preview of the frame. Purely cosmetic: the
//! PPM on disk stays linear; the preview gamma-corrects for display.

use std::io::{self, Write};

use crossterm::style::{self, Stylize};

use crate::image::Image;
use crate::math::Float;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewMode {
    /// Half-block characters (▀) with separate fg/bg colors — 2 vertical
    /// pixels per cell.
    HalfBlock,
    /// ASCII grayscale density ramp.
    Ascii,
}

pub fn display(img: &Image, mode: PreviewMode) {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    match mode {
        PreviewMode::HalfBlock => display_halfblock(&mut out, img),
        PreviewMode::Ascii => display_ascii(&mut out, img),
    }
    let _ = out.flush();
}

fn display_halfblock(out: &mut impl Write, img: &Image) {
    for row_pair in 0..img.height() / 2 {
        for col in 0..img.width() {
            let (tr, tg, tb) = img.get(row_pair * 2, col).gamma_correct().to_rgb8();
            let (br, bg, bb) = img.get(row_pair * 2 + 1, col).gamma_correct().to_rgb8();
            let _ = write!(
                out,
                "{}",
                "▀".with(style::Color::Rgb {
                    r: tr,
                    g: tg,
                    b: tb
                })
                .on(style::Color::Rgb {
                    r: br,
                    g: bg,
                    b: bb
                })
            );
        }
        let _ = writeln!(out);
    }
}

fn display_ascii(out: &mut impl Write, img: &Image) {
    const RAMP: &[u8] = b" .:-=+*#%@";
    for row in 0..img.height() {
        for col in 0..img.width() {
            let c = img.get(row, col);
            let lum: Float = 0.2126 * c.x + 0.7152 * c.y + 0.0722 * c.z;
            let idx = (lum.clamp(0.0, 0.999) * RAMP.len() as Float) as usize;
            let _ = write!(out, "{}", RAMP[idx] as char);
        }
        let _ = writeln!(out);
    }
}

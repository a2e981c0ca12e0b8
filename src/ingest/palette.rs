//! Dominant-color extraction by median cut.

use image::{DynamicImage, RgbaImage};
use std::path::Path;
use thiserror::Error;

use crate::store::Palette;

pub const MAX_PALETTE_COLORS: usize = 5;

/// Images are shrunk to fit this box before sampling.
const SAMPLE_EDGE: u32 = 256;
/// Every n-th pixel of the shrunk image is sampled.
const SAMPLE_STEP: usize = 4;
const MIN_ALPHA: u8 = 125;
const WHITE_CUTOFF: u8 = 250;

#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("No usable pixels")]
    Empty,
}

/// Best-effort palette: any failure yields an empty palette.
pub fn palette_or_empty(path: &Path) -> Palette {
    match extract_palette(path) {
        Ok(palette) => palette,
        Err(e) => {
            tracing::debug!("No palette for {}: {}", path.display(), e);
            Palette::default()
        }
    }
}

pub fn extract_palette(path: &Path) -> Result<Palette, PaletteError> {
    let image = image::open(path)?;
    palette_from_image(&image, MAX_PALETTE_COLORS)
}

/// Up to `max_colors` colors as lowercase `#rrggbb`, most populous first.
pub fn palette_from_image(
    image: &DynamicImage,
    max_colors: usize,
) -> Result<Palette, PaletteError> {
    let sample = if image.width() > SAMPLE_EDGE || image.height() > SAMPLE_EDGE {
        image.thumbnail(SAMPLE_EDGE, SAMPLE_EDGE).to_rgba8()
    } else {
        image.to_rgba8()
    };

    let pixels = sample_pixels(&sample);
    if pixels.is_empty() || max_colors == 0 {
        return Err(PaletteError::Empty);
    }

    let mut boxes = vec![ColorBox::new(pixels)];
    while boxes.len() < max_colors {
        // Split the most populous box that still has more than one color.
        let Some(index) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_splittable())
            .max_by_key(|(_, b)| b.pixels.len())
            .map(|(i, _)| i)
        else {
            break;
        };

        let target = boxes.swap_remove(index);
        let (left, right) = target.split();
        boxes.push(left);
        boxes.push(right);
    }

    boxes.sort_by(|a, b| b.pixels.len().cmp(&a.pixels.len()));

    let mut colors: Vec<String> = Vec::with_capacity(boxes.len());
    for color_box in &boxes {
        let hex = to_hex(color_box.average());
        if !colors.contains(&hex) {
            colors.push(hex);
        }
    }

    Ok(Palette(colors))
}

fn sample_pixels(image: &RgbaImage) -> Vec<[u8; 3]> {
    image
        .pixels()
        .step_by(SAMPLE_STEP)
        .filter(|p| p[3] >= MIN_ALPHA)
        .filter(|p| !(p[0] > WHITE_CUTOFF && p[1] > WHITE_CUTOFF && p[2] > WHITE_CUTOFF))
        .map(|p| [p[0], p[1], p[2]])
        .collect()
}

fn to_hex([r, g, b]: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

struct ColorBox {
    pixels: Vec<[u8; 3]>,
}

impl ColorBox {
    fn new(pixels: Vec<[u8; 3]>) -> Self {
        Self { pixels }
    }

    /// (channel, range) of the widest channel.
    fn widest_channel(&self) -> (usize, u8) {
        let mut min = [u8::MAX; 3];
        let mut max = [u8::MIN; 3];
        for pixel in &self.pixels {
            for c in 0..3 {
                min[c] = min[c].min(pixel[c]);
                max[c] = max[c].max(pixel[c]);
            }
        }

        (0..3)
            .map(|c| (c, max[c].saturating_sub(min[c])))
            .max_by_key(|&(_, range)| range)
            .unwrap_or((0, 0))
    }

    fn is_splittable(&self) -> bool {
        self.pixels.len() > 1 && self.widest_channel().1 > 0
    }

    fn split(mut self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        self.pixels.sort_unstable_by_key(|p| p[channel]);

        let mut mid = self.pixels.len() / 2;
        // Keep equal values on one side so both halves differ in color.
        let pivot = self.pixels[mid][channel];
        let first_of_pivot = self.pixels.partition_point(|p| p[channel] < pivot);
        if first_of_pivot > 0 {
            mid = first_of_pivot;
        } else {
            mid = self.pixels.partition_point(|p| p[channel] <= pivot);
        }

        let right = self.pixels.split_off(mid);
        (ColorBox::new(self.pixels), ColorBox::new(right))
    }

    fn average(&self) -> [u8; 3] {
        let mut sum = [0u64; 3];
        for pixel in &self.pixels {
            for c in 0..3 {
                sum[c] += u64::from(pixel[c]);
            }
        }
        let n = self.pixels.len().max(1) as u64;
        [
            (sum[0] / n) as u8,
            (sum[1] / n) as u8,
            (sum[2] / n) as u8,
        ]
    }
}

use std::path::Path;

use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::params::WaveParameters;
use crate::render::{self, Trace};

pub const BACKGROUND: [u8; 3] = [10, 12, 16];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot size {width}x{height} is empty")]
    EmptySize { width: u32, height: u32 },
    #[error("could not write image: {0}")]
    Write(#[from] image::ImageError),
}

/// Rasterizes one frame of the visualization.
pub fn render_frame(params: &WaveParameters, phase: f64, width: u32, height: u32, max_lines: u32) -> RgbaImage {
    let [r, g, b] = BACKGROUND;
    let mut img = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));
    let traces = render::wave_traces(params, phase, width as f32, height as f32, max_lines);
    for trace in &traces {
        stroke_trace(&mut img, trace, params.line_width);
    }
    img
}

pub fn save_png(
    path: &Path,
    params: &WaveParameters,
    phase: f64,
    width: u32,
    height: u32,
    max_lines: u32,
) -> Result<(), SnapshotError> {
    if width == 0 || height == 0 {
        return Err(SnapshotError::EmptySize { width, height });
    }
    let img = render_frame(params, phase, width, height, max_lines);
    img.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

fn stroke_trace(img: &mut RgbaImage, trace: &Trace, line_width: f32) {
    let color = [
        (trace.color.r * 255.0).round() as u8,
        (trace.color.g * 255.0).round() as u8,
        (trace.color.b * 255.0).round() as u8,
    ];
    let alpha = trace.color.a.clamp(0.0, 1.0);
    let half = (line_width / 2.0).max(0.5);
    // endpoints are pulled into the image plus a margin, which bounds `steps`
    let (w, h) = img.dimensions();
    let margin = half + 1.0;
    let clip = |(x, y): (f32, f32)| (x.clamp(-margin, w as f32 + margin), y.clamp(-margin, h as f32 + margin));

    for pair in trace.points.windows(2) {
        if !pair.iter().all(|&(x, y)| x.is_finite() && y.is_finite()) {
            continue;
        }
        let (x0, y0) = clip(pair[0]);
        let (x1, y1) = clip(pair[1]);
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as usize;
        // skip the shared endpoint so joints are not blended twice
        for s in 0..steps {
            let t = s as f32 / steps as f32;
            stamp(img, x0 + (x1 - x0) * t, y0 + (y1 - y0) * t, half, color, alpha);
        }
    }
    if let Some(&(x, y)) = trace.points.last().filter(|(x, y)| x.is_finite() && y.is_finite()) {
        let (x, y) = clip((x, y));
        stamp(img, x, y, half, color, alpha);
    }
}

fn stamp(img: &mut RgbaImage, cx: f32, cy: f32, half: f32, color: [u8; 3], alpha: f32) {
    let (w, h) = img.dimensions();
    let x_min = (cx - half).floor().max(0.0) as i64;
    let y_min = (cy - half).floor().max(0.0) as i64;
    let x_max = ((cx + half).ceil() as i64).min(w as i64 - 1);
    let y_max = ((cy + half).ceil() as i64).min(h as i64 - 1);
    for y in y_min..=y_max {
        for x in x_min..=x_max {
            let px = img.get_pixel_mut(x as u32, y as u32);
            blend(px, color, alpha);
        }
    }
}

fn blend(px: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    for c in 0..3 {
        let dst = px.0[c] as f32;
        let src = color[c] as f32;
        px.0[c] = (src * alpha + dst * (1.0 - alpha)).round().clamp(0.0, 255.0) as u8;
    }
    px.0[3] = 255;
}

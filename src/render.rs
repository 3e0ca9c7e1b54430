use std::f64::consts::TAU;

use crate::params::{sanitize_lines, WaveParameters};

/// Hue shift per radian of phase offset, in degrees.
const HUE_SHIFT_PER_RADIAN: f64 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

pub struct Trace {
    pub offset: f64,
    pub color: Rgba,
    pub points: Vec<(f32, f32)>,
}

/// Line count as used at draw time: at least one, at most `max_lines`.
pub fn effective_lines(lines: u32, max_lines: u32) -> u32 {
    sanitize_lines(lines as f64).min(max_lines.max(1))
}

pub fn trace_offset(index: u32, lines: u32) -> f64 {
    index as f64 * TAU / lines.max(1) as f64
}

pub fn trace_hue(base_hue: f64, offset: f64) -> f64 {
    (base_hue + offset * HUE_SHIFT_PER_RADIAN).rem_euclid(360.0)
}

pub fn wave_y(x: f64, params: &WaveParameters, phase: f64, offset: f64, height: f64) -> f64 {
    (x * params.frequency + phase + offset).sin() * params.base_amplitude + height / 2.0
}

/// Builds one polyline per line, one vertex per horizontal pixel.
pub fn wave_traces(params: &WaveParameters, phase: f64, width: f32, height: f32, max_lines: u32) -> Vec<Trace> {
    let lines = effective_lines(params.lines, max_lines);
    let columns = if width.is_finite() && width > 0.0 { width.ceil() as usize } else { 0 };
    let height = height as f64;

    (0..lines)
        .map(|i| {
            let offset = trace_offset(i, lines);
            let hue = trace_hue(params.hue, offset);
            let (r, g, b) = hsl_to_rgb(hue, params.saturation, params.lightness);
            let points = (0..columns)
                .map(|x| {
                    let y = wave_y(x as f64, params, phase, offset, height);
                    (x as f32, y as f32)
                })
                .collect();
            Trace {
                offset,
                color: Rgba { r, g, b, a: params.alpha },
                points,
            }
        })
        .collect()
}

/// Hue in degrees, saturation and lightness in percent; channels come back in `[0, 1]`.
pub fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> (f32, f32, f32) {
    let h = hue.rem_euclid(360.0) / 360.0;
    let s = (saturation / 100.0).clamp(0.0, 1.0);
    let l = (lightness / 100.0).clamp(0.0, 1.0);

    if s == 0.0 {
        return (l as f32, l as f32, l as f32);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let r = hue_to_channel(p, q, h + 1.0 / 3.0);
    let g = hue_to_channel(p, q, h);
    let b = hue_to_channel(p, q, h - 1.0 / 3.0);
    (r as f32, g as f32, b as f32)
}

fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn draw_time_clamp_keeps_at_least_one_line() {
        assert_eq!(effective_lines(0, 64), 1);
        assert_eq!(effective_lines(5, 64), 5);
        assert_eq!(effective_lines(500, 64), 64);
        assert_eq!(effective_lines(3, 0), 1);
    }

    #[test]
    fn one_trace_per_line_and_one_point_per_column() {
        let mut params = WaveParameters::default();
        params.update(0.5, 0.5);
        let traces = wave_traces(&params, 0.0, 320.0, 200.0, 64);
        assert_eq!(traces.len(), 5);
        assert!(traces.iter().all(|t| t.points.len() == 320));
        assert_eq!(traces[0].points[0].0, 0.0);
        assert_eq!(traces[0].points[319].0, 319.0);
    }

    #[test]
    fn traces_are_evenly_phase_shifted() {
        let mut params = WaveParameters::default();
        params.update(0.375, 0.0);
        let traces = wave_traces(&params, 0.0, 1.0, 100.0, 64);
        assert_eq!(traces.len(), 4);
        assert!((traces[1].offset - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        // sin(pi/2) * amplitude above the centre line
        let expected = (params.base_amplitude + 50.0) as f32;
        assert!(close(traces[1].points[0].1, expected));
    }

    #[test]
    fn empty_surface_has_no_points() {
        let params = WaveParameters::default();
        let traces = wave_traces(&params, 0.0, 0.0, 100.0, 64);
        assert!(traces.iter().all(|t| t.points.is_empty()));
    }

    #[test]
    fn hue_shift_follows_offset() {
        assert!((trace_hue(350.0, 1.0) - 20.0).abs() < 1e-9);
        assert!((trace_hue(0.0, 0.0)).abs() < 1e-9);
    }

    #[test]
    fn hsl_primaries() {
        let (r, g, b) = hsl_to_rgb(0.0, 100.0, 50.0);
        assert!(close(r, 1.0) && close(g, 0.0) && close(b, 0.0));
        let (r, g, b) = hsl_to_rgb(120.0, 100.0, 50.0);
        assert!(close(r, 0.0) && close(g, 1.0) && close(b, 0.0));
        let (r, g, b) = hsl_to_rgb(240.0, 0.0, 25.0);
        assert!(close(r, 0.25) && close(g, 0.25) && close(b, 0.25));
    }
}

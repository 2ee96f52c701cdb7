// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Heatmap renderer: the shared blue → yellow → red colour ramp every
// analyzer uses for its visual evidence.

use image::{Rgba, RgbaImage};
use verifdoc_core::{EncodedImage, Result, ScalarField};

use crate::image::codec;

/// Map a normalized value in `[0, 255]` onto the two-segment ramp.
///
/// - `v <= 127`: `r = g = 2v`, `b = 255 - 2v` (blue → yellow)
/// - `v > 127`: `r = 255`, `g = 255 - 2(v - 127)`, `b = 0` (yellow → red)
///
/// At `v = 255` the green term reaches -1 and saturates to 0.
pub fn ramp(value: u8) -> Rgba<u8> {
    let v = value as i32;
    let (r, g, b) = if v <= 127 {
        (2 * v, 2 * v, 255 - 2 * v)
    } else {
        (255, 255 - 2 * (v - 127), 0)
    };
    Rgba([channel(r), channel(g), channel(b), 255])
}

fn channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Colour a field whose values are already normalized to `[0, 255]`.
/// Values are rounded and clamped before the ramp lookup.
pub fn colorize(field: &ScalarField) -> RgbaImage {
    let width = field.width();
    RgbaImage::from_fn(width, field.height(), |x, y| {
        let v = field.get(x, y).round().clamp(0.0, 255.0) as u8;
        ramp(v)
    })
}

/// Render a normalized field to a PNG heatmap with the field's dimensions.
pub fn render(field: &ScalarField) -> Result<EncodedImage> {
    codec::encode_png(colorize(field))
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Noise-residual analysis. Isolates the high-frequency noise pattern with a
// 3x3 Laplacian-style kernel and measures how unevenly it is distributed
// across fixed-size blocks. Spliced regions carry a different sensor noise
// signature than their surroundings.

use tracing::{debug, info, instrument};
use verifdoc_core::config::NoiseConfig;
use verifdoc_core::{AnalysisError, CancelFlag, ModuleResult, PixelBuffer, Result, ScalarField};

use crate::heatmap;
use crate::image::codec;

/// High-pass kernel applied to interior pixels.
const HIGH_PASS: [[i32; 3]; 3] = [[-1, -1, -1], [-1, 8, -1], [-1, -1, -1]];

/// Variance of a uniform distribution over 0..=255: `255² / 4`.
const MAX_VARIANCE: f64 = 255.0 * 255.0 / 4.0;

/// Level used for every pixel when the residual has no spread.
const FLAT_LEVEL: f32 = 127.0;

pub fn analyze(buffer: &PixelBuffer, config: &NoiseConfig) -> Result<ModuleResult> {
    analyze_with_cancel(buffer, config, &CancelFlag::never())
}

#[instrument(skip_all, fields(
    width = buffer.width(),
    height = buffer.height(),
    block_size = config.block_size,
))]
pub fn analyze_with_cancel(
    buffer: &PixelBuffer,
    config: &NoiseConfig,
    cancel: &CancelFlag,
) -> Result<ModuleResult> {
    if config.block_size == 0 {
        return Err(AnalysisError::InvalidConfig(
            "noise block size must be non-zero".into(),
        ));
    }
    info!("Starting noise-residual analysis");

    let gray = codec::to_gray_image(buffer)?;
    let (width, height) = gray.dimensions();
    let residual = high_pass_residual(gray.as_raw(), width, height, cancel)?;
    let normalized = normalize_residual(&residual);

    let stats = block_variance(&normalized, config.block_size);
    let score = (stats.mean_variance / MAX_VARIANCE * 100.0).min(100.0) as f32;
    debug!(
        min_noise = ?residual.min,
        max_noise = ?residual.max,
        block_count = stats.block_count,
        mean_block_variance = stats.mean_variance,
        "Block variance computed"
    );

    let heatmap = heatmap::render(&normalized)?;

    info!(score, "Noise-residual analysis complete");
    Ok(ModuleResult::scored(score)
        .with_heatmap(heatmap)
        .with_diagnostic("width", width)
        .with_diagnostic("height", height)
        .with_diagnostic("blockCount", stats.block_count)
        .with_diagnostic("meanBlockVariance", format!("{:.4}", stats.mean_variance)))
}

/// Raw convolution output plus the range observed over interior pixels.
#[derive(Debug, Clone)]
pub struct Residual {
    pub field: ScalarField,
    /// `None` when the image has no interior (width or height below 3).
    pub min: Option<f32>,
    pub max: Option<f32>,
}

/// Convolve the interior with [`HIGH_PASS`]. Border pixels stay at 0 and do
/// not contribute to the min/max range.
pub fn high_pass_residual(
    gray: &[u8],
    width: u32,
    height: u32,
    cancel: &CancelFlag,
) -> Result<Residual> {
    let mut field = ScalarField::new(width, height);
    let mut min: Option<f32> = None;
    let mut max: Option<f32> = None;
    let w = width as usize;

    for y in 1..height.saturating_sub(1) {
        cancel.check()?;
        for x in 1..width.saturating_sub(1) {
            let mut sum = 0i32;
            for (ky, row) in HIGH_PASS.iter().enumerate() {
                for (kx, &k) in row.iter().enumerate() {
                    let px = x as usize + kx - 1;
                    let py = y as usize + ky - 1;
                    sum += gray[py * w + px] as i32 * k;
                }
            }
            let value = sum as f32;
            field.set(x, y, value);
            min = Some(min.map_or(value, |m| m.min(value)));
            max = Some(max.map_or(value, |m| m.max(value)));
        }
    }

    Ok(Residual { field, min, max })
}

/// Stretch the residual linearly onto `[0, 255]` using the interior range.
///
/// Border zeros that fall outside the interior range saturate at the ends.
/// A zero (or absent) range maps every pixel to mid-gray 127.
pub fn normalize_residual(residual: &Residual) -> ScalarField {
    let (width, height) = (residual.field.width(), residual.field.height());
    let mut out = ScalarField::new(width, height);
    let range = match (residual.min, residual.max) {
        (Some(min), Some(max)) if max > min => Some((min, max - min)),
        _ => None,
    };

    for (dst, &src) in out.values_mut().iter_mut().zip(residual.field.values()) {
        *dst = match range {
            Some((min, span)) => ((src - min) / span * 255.0).round().clamp(0.0, 255.0),
            None => FLAT_LEVEL,
        };
    }
    out
}

/// Summary of the block partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockStats {
    pub block_count: usize,
    pub mean_variance: f64,
}

/// Mean of per-block population variances over non-overlapping
/// `block_size` squares. Partial blocks at the right and bottom edges are
/// included with their actual pixel counts.
pub fn block_variance(field: &ScalarField, block_size: u32) -> BlockStats {
    let (width, height) = (field.width(), field.height());
    let mut block_count = 0usize;
    let mut total_variance = 0.0f64;

    for by in (0..height).step_by(block_size as usize) {
        for bx in (0..width).step_by(block_size as usize) {
            let x_end = (bx + block_size).min(width);
            let y_end = (by + block_size).min(height);
            let count = ((x_end - bx) * (y_end - by)) as f64;

            let mut sum = 0.0f64;
            for y in by..y_end {
                for x in bx..x_end {
                    sum += field.get(x, y) as f64;
                }
            }
            let mean = sum / count;

            let mut squared = 0.0f64;
            for y in by..y_end {
                for x in bx..x_end {
                    let d = field.get(x, y) as f64 - mean;
                    squared += d * d;
                }
            }

            total_variance += squared / count;
            block_count += 1;
        }
    }

    let mean_variance = if block_count > 0 {
        total_variance / block_count as f64
    } else {
        0.0
    };
    BlockStats {
        block_count,
        mean_variance,
    }
}

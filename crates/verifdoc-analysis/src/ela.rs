// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error-level analysis. Quantifies recompression artifacts by re-encoding
// the image as JPEG and measuring how far each pixel moves.
//
// Regions that were pasted in or retouched after the last save respond to
// recompression differently from the rest of the image, so they stand out in
// the normalized difference field.

use image::RgbImage;
use tracing::{debug, info, instrument};
use verifdoc_core::config::ElaConfig;
use verifdoc_core::{
    AnalysisError, CancelFlag, Finding, FindingKind, ModuleResult, PixelBuffer, Result,
    ScalarField, Severity,
};

use crate::heatmap;
use crate::image::codec;

/// Run ELA on `buffer` with no external deadline.
pub fn analyze(buffer: &PixelBuffer, config: &ElaConfig) -> Result<ModuleResult> {
    analyze_with_cancel(buffer, config, &CancelFlag::never())
}

/// Run ELA, polling `cancel` once per image row.
///
/// Score = mean of the max-normalized difference field, as a percentage of
/// 255. Deterministic for identical input and quality.
#[instrument(skip_all, fields(
    width = buffer.width(),
    height = buffer.height(),
    quality = config.quality,
))]
pub fn analyze_with_cancel(
    buffer: &PixelBuffer,
    config: &ElaConfig,
    cancel: &CancelFlag,
) -> Result<ModuleResult> {
    if !(1..=100).contains(&config.quality) {
        return Err(AnalysisError::InvalidConfig(format!(
            "ELA quality must be 1-100, got {}",
            config.quality
        )));
    }
    info!("Starting error-level analysis");

    let original = codec::to_rgb_image(buffer)?;
    let recompressed = codec::jpeg_round_trip(&original, config.quality)?;
    let diff = difference_field(&original, &recompressed, cancel)?;

    let max_diff = diff.max();
    let mean_diff = diff.mean();
    let normalized = diff.normalized_by_max();
    let score = (normalized.mean() / 255.0 * 100.0) as f32;
    debug!(max_diff, mean_diff, "Difference field computed");

    let regions = suspicious_regions(&diff, config);
    let heatmap = heatmap::render(&normalized)?;

    info!(score, regions = regions.len(), "Error-level analysis complete");
    Ok(ModuleResult::scored(score)
        .with_heatmap(heatmap)
        .with_diagnostic("width", buffer.width())
        .with_diagnostic("height", buffer.height())
        .with_diagnostic("quality", config.quality)
        .with_diagnostic("maxDiff", format!("{max_diff:.4}"))
        .with_diagnostic("meanDiff", format!("{mean_diff:.4}"))
        .with_diagnostic("suspiciousRegions", regions.len())
        .with_findings(regions))
}

/// Per-pixel mean absolute channel difference between two same-sized
/// RGB images: `(|R1-R2| + |G1-G2| + |B1-B2|) / 3`.
pub fn difference_field(
    original: &RgbImage,
    recompressed: &RgbImage,
    cancel: &CancelFlag,
) -> Result<ScalarField> {
    if original.dimensions() != recompressed.dimensions() {
        return Err(AnalysisError::UnsupportedFormat(format!(
            "recompressed image is {:?}, expected {:?}",
            recompressed.dimensions(),
            original.dimensions()
        )));
    }
    let (width, height) = original.dimensions();
    let mut field = ScalarField::new(width, height);

    for y in 0..height {
        cancel.check()?;
        for x in 0..width {
            let a = original.get_pixel(x, y).0;
            let b = recompressed.get_pixel(x, y).0;
            let sum: u32 = a
                .iter()
                .zip(b.iter())
                .map(|(&p, &q)| p.abs_diff(q) as u32)
                .sum();
            field.set(x, y, sum as f32 / 3.0);
        }
    }

    Ok(field)
}

/// Minimum pattern similarity for another block to count as a copy.
const COPY_SIMILARITY: f64 = 0.7;

/// What the error pattern around a suspicious block suggests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionPattern {
    /// Another block carries a near-identical error pattern.
    Copy { similar: usize },
    /// High error with quiet surroundings: pasted content that never went
    /// through the same compression.
    Add,
    Unknown,
}

impl RegionPattern {
    pub fn label(self) -> &'static str {
        match self {
            Self::Copy { .. } => "copy",
            Self::Add => "add",
            Self::Unknown => "unknown",
        }
    }

    pub fn description(self) -> String {
        match self {
            Self::Copy { similar } => {
                format!("Duplicated content detected ({similar} similar regions found)")
            }
            Self::Add => "New content added without matching compression artifacts".to_string(),
            Self::Unknown => "Suspicious compression pattern detected".to_string(),
        }
    }
}

/// Flag square blocks whose mean error is far above the image-wide mean.
///
/// Block side is `max(region_block_min, min(w, h) / 50)`; only full blocks
/// are scanned. The threshold is `region_factor × mean error`, so a field
/// with no error at all yields no regions. Each region is labelled with its
/// [`RegionPattern`].
pub fn suspicious_regions(diff: &ScalarField, config: &ElaConfig) -> Vec<Finding> {
    let (width, height) = (diff.width(), diff.height());
    let block = config.region_block_min.max(width.min(height) / 50);
    let threshold = diff.mean() * config.region_factor as f64;
    if threshold <= 0.0 || block == 0 {
        return Vec::new();
    }

    let mut regions = Vec::new();
    let mut y = 0;
    while y + block <= height {
        let mut x = 0;
        while x + block <= width {
            let block_mean = block_mean(diff, x, y, block);
            if block_mean > threshold {
                let confidence = ((block_mean / threshold) * 50.0).round().min(100.0) as u32;
                let pattern = classify_region(diff, x, y, block, threshold);
                regions.push(
                    Finding::new(
                        FindingKind::ElaRegion,
                        region_severity(confidence),
                        format!("Abnormal error level in {block}x{block} block at ({x}, {y})"),
                    )
                    .with_detail("x", x)
                    .with_detail("y", y)
                    .with_detail("width", block)
                    .with_detail("height", block)
                    .with_detail("errorLevel", format!("{block_mean:.2}"))
                    .with_detail("confidence", confidence)
                    .with_detail("pattern", pattern.label())
                    .with_detail("explanation", pattern.description()),
                );
            }
            x += block;
        }
        y += block;
    }

    regions
}

/// Look for the same error pattern on a coarse grid (step `2 × block`), then
/// fall back to comparing the block with its one-block-wide surroundings.
pub fn classify_region(
    diff: &ScalarField,
    x: u32,
    y: u32,
    block: u32,
    threshold: f64,
) -> RegionPattern {
    let (width, height) = (diff.width(), diff.height());
    let step = (block * 2) as usize;
    let mut similar = 0;
    for sy in (0..height.saturating_sub(block)).step_by(step) {
        for sx in (0..width.saturating_sub(block)).step_by(step) {
            if (sx, sy) == (x, y) {
                continue;
            }
            if pattern_similarity(diff, (x, y), (sx, sy), block) > COPY_SIMILARITY {
                similar += 1;
            }
        }
    }
    if similar > 0 {
        return RegionPattern::Copy { similar };
    }

    if surrounding_mean(diff, x, y, block) < threshold * 0.5 {
        RegionPattern::Add
    } else {
        RegionPattern::Unknown
    }
}

/// `1 - Σ(a - b)² / Σa²` over two full blocks; 0 when `a` is all zero.
fn pattern_similarity(field: &ScalarField, a: (u32, u32), b: (u32, u32), block: u32) -> f64 {
    let mut squared_diff = 0.0f64;
    let mut squared_a = 0.0f64;
    for dy in 0..block {
        for dx in 0..block {
            let p = field.get(a.0 + dx, a.1 + dy) as f64;
            let q = field.get(b.0 + dx, b.1 + dy) as f64;
            squared_diff += (p - q) * (p - q);
            squared_a += p * p;
        }
    }
    if squared_a == 0.0 {
        return 0.0;
    }
    1.0 - squared_diff / squared_a
}

/// Mean error in the ring of width `block` around a block, clipped to the
/// field.
fn surrounding_mean(field: &ScalarField, x0: u32, y0: u32, block: u32) -> f64 {
    let (width, height) = (field.width(), field.height());
    let (x1, y1) = (x0 + block, y0 + block);
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in y0.saturating_sub(block)..height.min(y1 + block) {
        for x in x0.saturating_sub(block)..width.min(x1 + block) {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                continue;
            }
            sum += field.get(x, y) as f64;
            count += 1;
        }
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn block_mean(field: &ScalarField, x0: u32, y0: u32, block: u32) -> f64 {
    let mut sum = 0.0f64;
    for y in y0..y0 + block {
        for x in x0..x0 + block {
            sum += field.get(x, y) as f64;
        }
    }
    sum / (block as f64 * block as f64)
}

fn region_severity(confidence: u32) -> Severity {
    match confidence {
        90.. => Severity::High,
        60..=89 => Severity::Medium,
        _ => Severity::Low,
    }
}

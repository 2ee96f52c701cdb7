// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Copy-move detection: finds blocks of the image that reappear, nearly
// unchanged, somewhere else in the same image.
//
// ## Pipeline
//
// 1. Convert to grayscale and downscale to at most `max_width` columns
// 2. Cut overlapping `block_size` squares every `stride` pixels; each block's
//    descriptor is its raw intensities in row-major order
// 3. Compare every pair of blocks whose origins are further apart than
//    `block_size * min_distance_factor`; cosine similarity above the
//    threshold marks both blocks as duplicated
// 4. Accumulate +50 (capped at 255) over every duplicated block's pixels and
//    render the accumulation normalized by its own maximum
//
// The pairwise scan is exhaustive. Rows of the comparison matrix are split
// across the rayon pool and per-block norms are computed once, which keeps
// the detected pair set identical to a serial scan.

use std::collections::BTreeSet;

use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, info, instrument};
use verifdoc_core::config::CopyMoveConfig;
use verifdoc_core::{
    AnalysisError, CancelFlag, Finding, FindingKind, ModuleResult, PixelBuffer, Result,
    ScalarField, Severity,
};

use crate::heatmap;
use crate::image::codec;

/// Amount added to the accumulation field for each duplicated block.
const ACCUMULATION_STEP: f32 = 50.0;
const ACCUMULATION_CAP: f32 = 255.0;

/// A square patch of the analysis image.
#[derive(Debug, Clone)]
pub struct Block {
    pub x: u32,
    pub y: u32,
    descriptor: Vec<f32>,
    /// Euclidean norm of the descriptor.
    norm: f64,
}

impl Block {
    fn new(x: u32, y: u32, descriptor: Vec<f32>) -> Self {
        let norm = descriptor
            .iter()
            .map(|&v| v as f64 * v as f64)
            .sum::<f64>()
            .sqrt();
        Self {
            x,
            y,
            descriptor,
            norm,
        }
    }

    pub fn descriptor(&self) -> &[f32] {
        &self.descriptor
    }

    /// Euclidean distance between block origins (equal to the distance
    /// between centres, since all blocks share one size).
    pub fn distance_to(&self, other: &Block) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Cosine similarity of the two descriptors; 0 when either is all zeros.
    pub fn similarity(&self, other: &Block) -> f64 {
        let magnitude = self.norm * other.norm;
        if magnitude == 0.0 {
            return 0.0;
        }
        let dot: f64 = self
            .descriptor
            .iter()
            .zip(&other.descriptor)
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        dot / magnitude
    }
}

/// Everything the detector computed, before it is packed into a result.
#[derive(Debug, Clone)]
pub struct CopyMoveReport {
    pub analysis_width: u32,
    pub analysis_height: u32,
    pub total_blocks: usize,
    /// Indices of blocks that belong to at least one duplicate pair.
    pub duplicated: BTreeSet<usize>,
    /// Every `(i, j)` pair with `i < j` that exceeded the threshold.
    pub pairs: Vec<(usize, usize)>,
    pub accumulation: ScalarField,
}

impl CopyMoveReport {
    pub fn score(&self) -> f32 {
        if self.total_blocks == 0 {
            return 0.0;
        }
        (self.duplicated.len() as f64 / self.total_blocks as f64 * 100.0) as f32
    }
}

pub fn analyze(buffer: &PixelBuffer, config: &CopyMoveConfig) -> Result<ModuleResult> {
    analyze_with_cancel(buffer, config, &CancelFlag::never())
}

#[instrument(skip_all, fields(width = buffer.width(), height = buffer.height()))]
pub fn analyze_with_cancel(
    buffer: &PixelBuffer,
    config: &CopyMoveConfig,
    cancel: &CancelFlag,
) -> Result<ModuleResult> {
    if config.block_size == 0 || config.stride == 0 {
        return Err(AnalysisError::InvalidConfig(
            "copy-move block size and stride must be non-zero".into(),
        ));
    }
    info!("Starting copy-move detection");

    let gray = codec::downscale_to_width(codec::to_gray_image(buffer)?, config.max_width);
    let report = detect(&gray, config, cancel)?;
    let score = report.score();

    let heatmap = heatmap::render(&report.accumulation.normalized_by_max())?;

    let mut findings = Vec::new();
    if !report.duplicated.is_empty() {
        findings.push(
            Finding::new(
                FindingKind::DuplicatedBlocks,
                duplication_severity(score),
                format!(
                    "{} of {} blocks duplicated elsewhere in the image",
                    report.duplicated.len(),
                    report.total_blocks
                ),
            )
            .with_detail("duplicatedBlocks", report.duplicated.len())
            .with_detail("totalBlocks", report.total_blocks)
            .with_detail("pairs", report.pairs.len()),
        );
    }

    info!(
        score,
        duplicated = report.duplicated.len(),
        total = report.total_blocks,
        "Copy-move detection complete"
    );
    Ok(ModuleResult::scored(score)
        .with_heatmap(heatmap)
        .with_diagnostic("analysisWidth", report.analysis_width)
        .with_diagnostic("analysisHeight", report.analysis_height)
        .with_diagnostic("downscaled", report.analysis_width != buffer.width())
        .with_diagnostic("duplicatedBlocks", report.duplicated.len())
        .with_diagnostic("totalBlocks", report.total_blocks)
        .with_diagnostic("pairs", report.pairs.len())
        .with_findings(findings))
}

/// Run the detector on an already-prepared grayscale image.
pub fn detect(
    gray: &GrayImage,
    config: &CopyMoveConfig,
    cancel: &CancelFlag,
) -> Result<CopyMoveReport> {
    let (width, height) = gray.dimensions();
    let blocks = extract_blocks(gray, config.block_size, config.stride);
    debug!(blocks = blocks.len(), "Blocks extracted");

    let pairs = find_duplicate_pairs(
        &blocks,
        config.min_distance(),
        config.similarity_threshold,
        cancel,
    )?;
    let duplicated: BTreeSet<usize> = pairs.iter().flat_map(|&(i, j)| [i, j]).collect();
    debug!(pairs = pairs.len(), duplicated = duplicated.len(), "Duplicate pairs found");

    let accumulation = accumulate(width, height, config.block_size, &blocks, &duplicated);

    Ok(CopyMoveReport {
        analysis_width: width,
        analysis_height: height,
        total_blocks: blocks.len(),
        duplicated,
        pairs,
        accumulation,
    })
}

/// Cut overlapping square blocks. An image narrower or shorter than
/// `block_size` yields no blocks.
pub fn extract_blocks(gray: &GrayImage, block_size: u32, stride: u32) -> Vec<Block> {
    let (width, height) = gray.dimensions();
    if width < block_size || height < block_size {
        return Vec::new();
    }

    let raw = gray.as_raw();
    let w = width as usize;
    let side = block_size as usize;
    let mut blocks = Vec::new();

    for y in (0..=height - block_size).step_by(stride as usize) {
        for x in (0..=width - block_size).step_by(stride as usize) {
            let mut descriptor = Vec::with_capacity(side * side);
            for by in 0..side {
                let start = (y as usize + by) * w + x as usize;
                descriptor.extend(raw[start..start + side].iter().map(|&p| p as f32));
            }
            blocks.push(Block::new(x, y, descriptor));
        }
    }

    blocks
}

/// Exhaustive pairwise scan. Returns every `(i, j)` with `i < j`, distance
/// strictly above `min_distance` and similarity strictly above `threshold`,
/// in ascending order.
pub fn find_duplicate_pairs(
    blocks: &[Block],
    min_distance: f64,
    threshold: f64,
    cancel: &CancelFlag,
) -> Result<Vec<(usize, usize)>> {
    let rows: Vec<Vec<(usize, usize)>> = (0..blocks.len())
        .into_par_iter()
        .map(|i| -> Result<Vec<(usize, usize)>> {
            cancel.check()?;
            let anchor = &blocks[i];
            Ok(blocks[i + 1..]
                .iter()
                .enumerate()
                .filter(|(_, other)| anchor.distance_to(other) > min_distance)
                .filter(|(_, other)| anchor.similarity(other) > threshold)
                .map(|(offset, _)| (i, i + 1 + offset))
                .collect())
        })
        .collect::<Result<_>>()?;

    Ok(rows.into_iter().flatten().collect())
}

/// Build the similarity-accumulation field: each duplicated block adds
/// [`ACCUMULATION_STEP`] to the pixels it covers, saturating at 255.
pub fn accumulate(
    width: u32,
    height: u32,
    block_size: u32,
    blocks: &[Block],
    duplicated: &BTreeSet<usize>,
) -> ScalarField {
    let mut field = ScalarField::new(width, height);
    for &idx in duplicated {
        let block = &blocks[idx];
        for y in block.y..(block.y + block_size).min(height) {
            for x in block.x..(block.x + block_size).min(width) {
                let value = (field.get(x, y) + ACCUMULATION_STEP).min(ACCUMULATION_CAP);
                field.set(x, y, value);
            }
        }
    }
    field
}

fn duplication_severity(score: f32) -> Severity {
    if score > 40.0 {
        Severity::High
    } else if score > 10.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use verifdoc_core::Channels;

    fn gray_buffer(img: GrayImage) -> PixelBuffer {
        let (w, h) = img.dimensions();
        PixelBuffer::new(w, h, Channels::Gray, img.into_raw()).unwrap()
    }

    /// Deterministic hash noise; independent 16x16 patches of it are far
    /// below the 0.95 similarity threshold.
    fn noise(width: u32, height: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let mut h = x
                .wrapping_mul(374761393)
                .wrapping_add(y.wrapping_mul(668265263))
                .wrapping_add(seed.wrapping_mul(2246822519));
            h = (h ^ (h >> 13)).wrapping_mul(1274126177);
            h ^= h >> 16;
            Luma([(h & 0xff) as u8])
        })
    }

    fn paste(img: &mut GrayImage, src: (u32, u32), dst: (u32, u32), side: u32) {
        for dy in 0..side {
            for dx in 0..side {
                let p = *img.get_pixel(src.0 + dx, src.1 + dy);
                img.put_pixel(dst.0 + dx, dst.1 + dy, p);
            }
        }
    }

    /// Straightforward serial reference scan.
    fn naive_pairs(blocks: &[Block], min_distance: f64, threshold: f64) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..blocks.len() {
            for j in i + 1..blocks.len() {
                if blocks[i].distance_to(&blocks[j]) > min_distance
                    && blocks[i].similarity(&blocks[j]) > threshold
                {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    #[test]
    fn similarity_of_scaled_descriptor_is_one() {
        let a = Block::new(0, 0, vec![1.0, 2.0, 3.0]);
        let b = Block::new(0, 0, vec![2.0, 4.0, 6.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn similarity_with_zero_descriptor_is_zero() {
        let a = Block::new(0, 0, vec![0.0; 4]);
        let b = Block::new(0, 0, vec![5.0; 4]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn block_grid_counts() {
        let blocks = extract_blocks(&GrayImage::new(64, 64), 16, 8);
        assert_eq!(blocks.len(), 49);
        assert_eq!((blocks[1].x, blocks[1].y), (8, 0));
        assert_eq!(blocks[0].descriptor().len(), 256);
    }

    #[test]
    fn image_smaller_than_block_scores_zero() {
        let buffer = gray_buffer(GrayImage::from_pixel(10, 40, Luma([77])));
        let result = analyze(&buffer, &CopyMoveConfig::default()).unwrap();
        assert!(result.success());
        assert_eq!(result.score(), Some(0.0));
        assert_eq!(result.diagnostic("totalBlocks"), Some("0"));
        assert!(result.findings().is_empty());
    }

    #[test]
    fn uniform_gray_is_maximally_self_similar() {
        // 49 blocks; the 13 near the centre have no partner further than 48px.
        let buffer = gray_buffer(GrayImage::from_pixel(64, 64, Luma([128])));
        let result = analyze(&buffer, &CopyMoveConfig::default()).unwrap();
        let score = result.score().unwrap();
        assert!((score - 36.0 / 49.0 * 100.0).abs() < 1e-3, "got {score}");
        assert_eq!(result.diagnostic("duplicatedBlocks"), Some("36"));
    }

    #[test]
    fn uniform_black_has_no_signal() {
        let buffer = gray_buffer(GrayImage::new(64, 64));
        let result = analyze(&buffer, &CopyMoveConfig::default()).unwrap();
        assert_eq!(result.score(), Some(0.0));
    }

    #[test]
    fn pasted_region_is_detected() {
        let mut img = noise(128, 64, 7);
        paste(&mut img, (8, 8), (72, 16), 32);
        let result = analyze(&gray_buffer(img), &CopyMoveConfig::default()).unwrap();

        assert!(result.score().unwrap() > 0.0);
        let finding = result
            .findings()
            .iter()
            .find(|f| f.kind == FindingKind::DuplicatedBlocks)
            .expect("duplicated-blocks finding");
        let duplicated: usize = finding.detail["duplicatedBlocks"].parse().unwrap();
        assert!(duplicated >= 18, "expected both copies of 9 blocks, got {duplicated}");
    }

    #[test]
    fn parallel_scan_matches_serial_reference() {
        let mut img = noise(96, 80, 3);
        paste(&mut img, (0, 0), (56, 40), 32);
        paste(&mut img, (40, 8), (8, 56), 16);
        let blocks = extract_blocks(&img, 16, 8);

        let fast = find_duplicate_pairs(&blocks, 48.0, 0.95, &CancelFlag::never()).unwrap();
        assert_eq!(fast, naive_pairs(&blocks, 48.0, 0.95));
        assert!(!fast.is_empty());
    }

    #[test]
    fn accumulation_saturates() {
        let blocks: Vec<Block> = (0..6).map(|_| Block::new(0, 0, vec![1.0])).collect();
        let duplicated: BTreeSet<usize> = (0..6).collect();
        let field = accumulate(4, 4, 2, &blocks, &duplicated);
        assert_eq!(field.get(0, 0), 255.0);
        assert_eq!(field.get(3, 3), 0.0);
    }

    #[test]
    fn wide_images_are_downscaled_for_analysis() {
        let buffer = gray_buffer(GrayImage::from_pixel(1000, 40, Luma([90])));
        let config = CopyMoveConfig::default();
        let result = analyze(&buffer, &config).unwrap();
        let heatmap = result.heatmap().unwrap();
        assert_eq!((heatmap.width, heatmap.height), (800, 32));
        assert_eq!(result.diagnostic("downscaled"), Some("true"));
    }

    #[test]
    fn cancellation_stops_the_scan() {
        let cancel = CancelFlag::with_deadline(1);
        cancel.cancel();
        let err = analyze_with_cancel(
            &gray_buffer(noise(64, 64, 1)),
            &CopyMoveConfig::default(),
            &cancel,
        )
        .unwrap_err();
        assert_eq!(err.code(), "timeout");
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Analysis configuration. Every analyzer takes its section explicitly; there
// is no instance state between calls.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Error-level analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElaConfig {
    /// JPEG recompression quality (1-100).
    pub quality: u8,
    /// Smallest side of a suspicious-region block, in pixels.
    pub region_block_min: u32,
    /// A block is suspicious when its mean error exceeds this multiple of
    /// the global mean error.
    pub region_factor: f32,
}

impl Default for ElaConfig {
    fn default() -> Self {
        Self {
            quality: 90,
            region_block_min: 8,
            region_factor: 2.5,
        }
    }
}

/// Noise-residual parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Side of the non-overlapping variance blocks.
    pub block_size: u32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self { block_size: 32 }
    }
}

/// Copy-move detector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyMoveConfig {
    pub block_size: u32,
    pub stride: u32,
    /// Images wider than this are downscaled (aspect-preserving) first.
    pub max_width: u32,
    /// Cosine similarity strictly above this marks a duplicate pair.
    pub similarity_threshold: f64,
    /// Minimum block separation as a multiple of `block_size`.
    pub min_distance_factor: u32,
}

impl Default for CopyMoveConfig {
    fn default() -> Self {
        Self {
            block_size: 16,
            stride: 8,
            max_width: 800,
            similarity_threshold: 0.95,
            min_distance_factor: 3,
        }
    }
}

impl CopyMoveConfig {
    /// Centre-to-centre distance a pair must exceed to be compared.
    pub fn min_distance(&self) -> f64 {
        self.block_size as f64 * self.min_distance_factor as f64
    }
}

/// OCR logic-anomaly heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Words with confidence strictly below this are "low confidence".
    pub low_confidence_threshold: f32,
    /// Score deduction per low-confidence word.
    pub low_confidence_penalty: u32,
    /// Count at which the low-confidence finding escalates to MEDIUM.
    pub low_confidence_medium_count: usize,
    pub date_format_penalty: u32,
    pub name_variant_penalty: u32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: 70.0,
            low_confidence_penalty: 2,
            low_confidence_medium_count: 5,
            date_format_penalty: 10,
            name_variant_penalty: 10,
        }
    }
}

/// Dispatch settings for the concurrent orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-module deadline. `None` waits indefinitely.
    pub module_timeout_ms: Option<u64>,
}

/// Complete analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub ela: ElaConfig,
    pub noise: NoiseConfig,
    pub copy_move: CopyMoveConfig,
    pub text: TextConfig,
    pub orchestrator: OrchestratorConfig,
}

impl AnalysisConfig {
    /// Parse a JSON document, filling unspecified fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the analyzers cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.ela.quality) {
            return Err(invalid(format!(
                "ela.quality must be 1-100, got {}",
                self.ela.quality
            )));
        }
        if self.ela.region_block_min == 0 {
            return Err(invalid("ela.region_block_min must be non-zero"));
        }
        if !(self.ela.region_factor > 0.0) {
            return Err(invalid("ela.region_factor must be positive"));
        }
        if self.noise.block_size == 0 {
            return Err(invalid("noise.block_size must be non-zero"));
        }
        let cm = &self.copy_move;
        if cm.block_size == 0 || cm.stride == 0 {
            return Err(invalid("copy_move.block_size and stride must be non-zero"));
        }
        if cm.max_width < cm.block_size {
            return Err(invalid(format!(
                "copy_move.max_width ({}) must be at least block_size ({})",
                cm.max_width, cm.block_size
            )));
        }
        if cm.block_size.checked_mul(cm.min_distance_factor).is_none() {
            return Err(invalid(format!(
                "copy_move.min_distance_factor ({}) is too large for block_size ({})",
                cm.min_distance_factor, cm.block_size
            )));
        }
        if !(cm.similarity_threshold > 0.0 && cm.similarity_threshold <= 1.0) {
            return Err(invalid(format!(
                "copy_move.similarity_threshold must be in (0, 1], got {}",
                cm.similarity_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.text.low_confidence_threshold) {
            return Err(invalid("text.low_confidence_threshold must be 0-100"));
        }
        if self.orchestrator.module_timeout_ms == Some(0) {
            return Err(invalid("orchestrator.module_timeout_ms must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::InvalidConfig(msg.into())
}

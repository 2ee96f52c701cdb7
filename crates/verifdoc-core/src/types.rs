// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the VerifDoc forensic engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Number of interleaved channels in a [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channels {
    /// Single luma channel.
    Gray,
    /// Interleaved R, G, B.
    Rgb,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
        }
    }

    /// Map a raw channel count onto the supported layouts.
    pub fn from_count(count: u8) -> Result<Self> {
        match count {
            1 => Ok(Self::Gray),
            3 => Ok(Self::Rgb),
            other => Err(AnalysisError::UnsupportedFormat(format!(
                "{other} channels (expected 1 or 3)"
            ))),
        }
    }
}

/// A decoded raster image, row-major with a top-left origin.
///
/// Immutable once built. The length invariant
/// `data.len() == width * height * channels` is checked at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: Channels,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(AnalysisError::InvalidMetadata(format!(
                "missing width/height ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * channels.count();
        if data.len() != expected {
            return Err(AnalysisError::InvalidMetadata(format!(
                "pixel data length {} does not match {}x{}x{} = {}",
                data.len(),
                width,
                height,
                channels.count(),
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Per-pixel `f32` signal produced by one analyzer (difference magnitude,
/// noise residual, similarity accumulation).
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl ScalarField {
    /// A zero-filled field.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        if values.len() != width as usize * height as usize {
            return Err(AnalysisError::InvalidMetadata(format!(
                "field length {} does not match {}x{}",
                values.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let idx = y as usize * self.width as usize + x as usize;
        self.values[idx] = value;
    }

    /// Largest value in the field, or 0 for an empty field.
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Arithmetic mean of all values, or 0 for an empty field.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().map(|&v| v as f64).sum::<f64>() / self.values.len() as f64
    }

    /// Rescale so the maximum maps to 255: `round(v / max * 255)`.
    /// A field whose maximum is zero normalizes to all zeros.
    pub fn normalized_by_max(&self) -> ScalarField {
        let max = self.max();
        let values = self
            .values
            .iter()
            .map(|&v| {
                if max > 0.0 {
                    (v / max * 255.0).round().min(255.0)
                } else {
                    0.0
                }
            })
            .collect();
        ScalarField {
            width: self.width,
            height: self.height,
            values,
        }
    }
}

/// Encoding of a rendered raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Png,
}

impl ImageEncoding {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
        }
    }
}

/// An encoded raster image (heatmap) ready for a report layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub encoding: ImageEncoding,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// How serious an indicator is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// What a [`Finding`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    // -- Module-level evidence --
    ElaRegion,
    DuplicatedBlocks,
    MultipleDateFormats,
    LowConfidenceWords,
    NameVariants,

    // -- Fusion indicators --
    ElaAnomalyZones,
    NoiseInconsistency,
    ClonedRegions,
    OcrLogicAnomalies,
}

/// A discrete, labelled anomaly surfaced to the final explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detail: BTreeMap<String, String>,
}

impl Finding {
    pub fn new(kind: FindingKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            detail: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.detail.insert(key.into(), value.to_string());
        self
    }
}

/// The built-in analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleKind {
    Ela,
    NoiseResidual,
    CopyMove,
    TextAnomaly,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 4] = [
        ModuleKind::Ela,
        ModuleKind::NoiseResidual,
        ModuleKind::CopyMove,
        ModuleKind::TextAnomaly,
    ];

    /// Key under which this module's result is stored and fused.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ela => "ela",
            Self::NoiseResidual => "noiseprint",
            Self::CopyMove => "copymove",
            Self::TextAnomaly => "ocr",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one analyzer invocation. Never mutated after it is returned.
///
/// A failed result never carries a score; the constructors are the only way
/// to build one, so `success == false` implies `score == None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleResult {
    success: bool,
    score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heatmap: Option<EncodedImage>,
    diagnostics: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    findings: Vec<Finding>,
}

impl ModuleResult {
    /// A successful result. The score is clamped to `[0, 100]`; NaN maps to 0.
    pub fn scored(score: f32) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 100.0) };
        Self {
            success: true,
            score: Some(score),
            heatmap: None,
            diagnostics: BTreeMap::new(),
            findings: Vec::new(),
        }
    }

    /// A failed result carrying the error code and its message.
    pub fn failed(err: &AnalysisError) -> Self {
        let mut diagnostics = BTreeMap::new();
        diagnostics.insert("error".to_string(), err.code().to_string());
        diagnostics.insert("detail".to_string(), err.to_string());
        Self {
            success: false,
            score: None,
            heatmap: None,
            diagnostics,
            findings: Vec::new(),
        }
    }

    /// Fold an analyzer outcome into a result.
    pub fn from_outcome(outcome: Result<ModuleResult>) -> Self {
        outcome.unwrap_or_else(|err| Self::failed(&err))
    }

    pub fn with_heatmap(mut self, heatmap: EncodedImage) -> Self {
        if self.success {
            self.heatmap = Some(heatmap);
        }
        self
    }

    pub fn with_diagnostic(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.diagnostics.insert(key.into(), value.to_string());
        self
    }

    pub fn with_findings(mut self, findings: impl IntoIterator<Item = Finding>) -> Self {
        self.findings.extend(findings);
        self
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn score(&self) -> Option<f32> {
        self.score
    }

    pub fn heatmap(&self) -> Option<&EncodedImage> {
        self.heatmap.as_ref()
    }

    pub fn diagnostics(&self) -> &BTreeMap<String, String> {
        &self.diagnostics
    }

    pub fn diagnostic(&self, key: &str) -> Option<&str> {
        self.diagnostics.get(key).map(String::as_str)
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Drop the encoded heatmap, keeping everything else.
    pub fn without_heatmap(mut self) -> Self {
        self.heatmap = None;
        self
    }
}

/// Risk band derived from the global score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Global score above 75.
    LikelyAuthentic,
    /// Global score in `[40, 75]`.
    PossibleAlteration,
    /// Global score below 40.
    StronglySuspect,
}

impl RiskLevel {
    pub fn from_score(score: f32) -> Self {
        if score > 75.0 {
            Self::LikelyAuthentic
        } else if score >= 40.0 {
            Self::PossibleAlteration
        } else {
            Self::StronglySuspect
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::LikelyAuthentic => "Document likely authentic.",
            Self::PossibleAlteration => "Document shows possible signs of alteration.",
            Self::StronglySuspect => "Document strongly suspect or altered.",
        }
    }
}

/// Aggregate verdict over all module results. Derived, never persisted by
/// the engine itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionResult {
    pub global_score: f32,
    pub risk_level: RiskLevel,
    pub indicators: Vec<Finding>,
    pub summary: String,
    pub per_module_heatmaps: BTreeMap<String, EncodedImage>,
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR logic checks. Text recognition itself happens outside the engine; this
// module only consumes the recognized text and per-word confidences.

pub mod anomaly;

use serde::{Deserialize, Serialize};

pub use anomaly::{DateFormat, DateMatch, TextAnomalyScorer, TextExtraction, analyze};

/// One recognized word with the engine's confidence in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
}

/// Output of an external OCR engine for a single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrRecord {
    pub text: String,
    #[serde(default)]
    pub words: Vec<OcrWord>,
}

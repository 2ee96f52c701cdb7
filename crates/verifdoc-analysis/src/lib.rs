// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// verifdoc-analysis — Pixel-level forensic analyzers for VerifDoc.
//
// Provides error-level analysis, noise-residual analysis, copy-move detection,
// OCR logic-anomaly scoring, and the shared heatmap renderer. Every analyzer is
// a pure function of an immutable `PixelBuffer` (or OCR record) and its
// config, so callers may run them in parallel without coordination.

pub mod copy_move;
pub mod ela;
pub mod heatmap;
pub mod image;
pub mod noise;
pub mod text;

pub use self::image::codec::decode;
pub use text::{OcrRecord, OcrWord, TextAnomalyScorer};

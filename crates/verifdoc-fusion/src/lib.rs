// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// verifdoc-fusion — Runs the analyzers concurrently and fuses their results
// into a global verdict.

pub mod fusion;
pub mod inference;
pub mod orchestrator;

pub use fusion::fuse;
pub use inference::{ForgeryModel, ModelPrediction, ModelRegistry, StaticRegistry};
pub use orchestrator::{AnalysisReport, AnalysisRequest, Orchestrator};

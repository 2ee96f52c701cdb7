// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// VerifDoc — Core types, errors, and configuration shared across all crates.

pub mod cancel;
pub mod config;
pub mod error;
pub mod human_errors;
pub mod integrity;
pub mod types;

pub use cancel::CancelFlag;
pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use types::*;

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for VerifDoc.

use thiserror::Error;

/// Top-level error type for all VerifDoc analysis operations.
///
/// Analyzers never let these escape to sibling modules: each one is folded
/// into a failed [`ModuleResult`](crate::ModuleResult) by the caller.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // -- Input boundary --
    #[error("invalid image metadata: {0}")]
    InvalidMetadata(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    // -- Execution --
    #[error("analysis timed out after {0} ms")]
    Timeout(u64),

    #[error("extraction failed: {0}")]
    ExtractionFailure(String),

    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),

    // -- Caller layer (file I/O, report serialization) --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Stable, lowercase diagnostic code recorded under the `error` key of a
    /// failed module's diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMetadata(_) => "invalid metadata",
            Self::UnsupportedFormat(_) => "unsupported format",
            Self::Timeout(_) => "timeout",
            Self::ExtractionFailure(_) => "extraction failure",
            Self::InvalidConfig(_) => "invalid config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AnalysisError>;

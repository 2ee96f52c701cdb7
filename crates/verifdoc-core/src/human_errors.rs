// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable explanations of analysis failures for report readers.
//
// A failed module still appears in the final report; these messages tell the
// reader why its evidence is missing and what they can do about it.

use crate::error::AnalysisError;

/// Severity of a failure from the report reader's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSeverity {
    /// The module ran out of time or hit a transient engine problem.
    Transient,
    /// The submitted file must be replaced or re-exported.
    ActionRequired,
    /// Nothing the submitter can change fixes this.
    Permanent,
}

/// A plain-language explanation of a module failure.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the submitter should try.
    pub suggestion: String,
    /// Whether the caller may reasonably run the analysis again.
    pub retriable: bool,
    pub severity: FailureSeverity,
}

/// Convert an `AnalysisError` into a `HumanError`.
pub fn humanize_error(err: &AnalysisError) -> HumanError {
    match err {
        AnalysisError::InvalidMetadata(_) => HumanError {
            message: "The image has no usable dimensions.".into(),
            suggestion: "The file may be truncated. Export it again from the original source and resubmit.".into(),
            retriable: false,
            severity: FailureSeverity::ActionRequired,
        },

        AnalysisError::UnsupportedFormat(detail) => HumanError {
            message: "This image format can't be analysed.".into(),
            suggestion: format!("Convert the document to PNG or JPEG and try again. ({detail})"),
            retriable: false,
            severity: FailureSeverity::ActionRequired,
        },

        AnalysisError::Timeout(ms) => HumanError {
            message: "One check took too long and was stopped.".into(),
            suggestion: format!(
                "The verdict was computed without it. Very large images can exceed the {ms} ms limit; a smaller scan may help."
            ),
            retriable: true,
            severity: FailureSeverity::Transient,
        },

        AnalysisError::ExtractionFailure(_) => HumanError {
            message: "Text or model extraction didn't work on this document.".into(),
            suggestion: "Try a sharper scan with good lighting so the text is clearly legible.".into(),
            retriable: true,
            severity: FailureSeverity::Transient,
        },

        AnalysisError::InvalidConfig(detail) => HumanError {
            message: "The analysis settings are not valid.".into(),
            suggestion: format!("Fix the configuration and run the analysis again. ({detail})"),
            retriable: false,
            severity: FailureSeverity::Permanent,
        },

        AnalysisError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "The file couldn't be found.".into(),
                    suggestion: "It may have been moved or deleted. Check the path and try again.".into(),
                    retriable: false,
                    severity: FailureSeverity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, check permissions and free disk space.".into(),
                    retriable: true,
                    severity: FailureSeverity::Transient,
                }
            }
        }

        AnalysisError::Serialization(_) => HumanError {
            message: "A data file could not be read.".into(),
            suggestion: "Check that the OCR or configuration file is valid JSON.".into(),
            retriable: false,
            severity: FailureSeverity::ActionRequired,
        },
    }
}

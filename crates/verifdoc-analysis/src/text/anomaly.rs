// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text anomaly scoring. Regex heuristics over OCR output that catch the
// logical slips edited documents tend to carry: dates written in several
// formats, words the OCR engine could barely read, and the same name spelled
// more than one way.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument};
use verifdoc_core::config::TextConfig;
use verifdoc_core::{AnalysisError, Finding, FindingKind, ModuleResult, Result, Severity};

use super::OcrRecord;

const START_SCORE: i64 = 100;

/// Numeric `DD/MM/YYYY`, ISO `YYYY-MM-DD`, or `Month DD, YYYY`.
const DATE_PATTERN: &str = r"(?i)\b(?:(?P<numeric>\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4})|(?P<iso>\d{4}[-/.]\d{1,2}[-/.]\d{1,2})|(?P<textual>(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s\d{1,2},?\s\d{4}))\b";
const NUMBER_PATTERN: &str = r"\b\d[\d\s-]*\d\b";
/// Two or more capitalized words in a row, the first-name last-name shape.
const NAME_PATTERN: &str = r"\b[A-Z][A-Za-z]+(?: [A-Z][A-Za-z]+)+\b";

/// How a date was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    Numeric,
    Iso,
    Textual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateMatch {
    pub text: String,
    pub format: DateFormat,
}

/// Fields pulled out of the recognized text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextExtraction {
    /// Whitespace-collapsed text the patterns ran over.
    pub normalized: String,
    /// Distinct dates, in order of first appearance.
    pub dates: Vec<DateMatch>,
    pub numbers: Vec<String>,
    /// Distinct name-like tokens, in order of first appearance.
    pub names: Vec<String>,
}

impl TextExtraction {
    pub fn date_formats(&self) -> BTreeSet<DateFormat> {
        self.dates.iter().map(|d| d.format).collect()
    }

    /// Lowercase forms that appear with more than one spelling, mapped to
    /// the spellings seen.
    pub fn name_variants(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for name in &self.names {
            groups
                .entry(name.to_lowercase())
                .or_default()
                .insert(name.clone());
        }
        groups.retain(|_, spellings| spellings.len() > 1);
        groups
    }
}

/// Compiled heuristics plus the penalties they apply.
pub struct TextAnomalyScorer {
    dates: Regex,
    numbers: Regex,
    names: Regex,
    config: TextConfig,
}

impl TextAnomalyScorer {
    pub fn new(config: TextConfig) -> Result<Self> {
        Ok(Self {
            dates: compile(DATE_PATTERN)?,
            numbers: compile(NUMBER_PATTERN)?,
            names: compile(NAME_PATTERN)?,
            config,
        })
    }

    pub fn extract(&self, text: &str) -> TextExtraction {
        let normalized = normalize(text);

        let mut dates: Vec<DateMatch> = Vec::new();
        for caps in self.dates.captures_iter(&normalized) {
            let (matched, format) = if let Some(m) = caps.name("numeric") {
                (m.as_str(), DateFormat::Numeric)
            } else if let Some(m) = caps.name("iso") {
                (m.as_str(), DateFormat::Iso)
            } else if let Some(m) = caps.name("textual") {
                (m.as_str(), DateFormat::Textual)
            } else {
                continue;
            };
            if !dates.iter().any(|d| d.text == matched) {
                dates.push(DateMatch {
                    text: matched.to_string(),
                    format,
                });
            }
        }

        let numbers = self
            .numbers
            .find_iter(&normalized)
            .map(|m| m.as_str().to_string())
            .collect();

        let mut names: Vec<String> = Vec::new();
        for m in self.names.find_iter(&normalized) {
            if !names.iter().any(|n| n == m.as_str()) {
                names.push(m.as_str().to_string());
            }
        }

        TextExtraction {
            normalized,
            dates,
            numbers,
            names,
        }
    }

    /// Score a record. Starts at 100, each heuristic subtracts its penalty,
    /// and the result never drops below 0.
    #[instrument(skip_all, fields(words = record.words.len(), text_len = record.text.len()))]
    pub fn analyze(&self, record: &OcrRecord) -> ModuleResult {
        info!("Starting OCR logic analysis");
        let extraction = self.extract(&record.text);
        let mut penalty = 0i64;
        let mut findings = Vec::new();

        let formats = extraction.date_formats();
        if extraction.dates.len() > 1 && formats.len() > 1 {
            penalty += self.config.date_format_penalty as i64;
            let listed: Vec<&str> = extraction.dates.iter().map(|d| d.text.as_str()).collect();
            findings.push(
                Finding::new(
                    FindingKind::MultipleDateFormats,
                    Severity::Medium,
                    format!(
                        "Dates written in {} different formats: {}",
                        formats.len(),
                        listed.join(", ")
                    ),
                )
                .with_detail("dates", listed.join(", "))
                .with_detail("formats", formats.len()),
            );
        }

        let low_confidence: Vec<&str> = record
            .words
            .iter()
            .filter(|w| w.confidence < self.config.low_confidence_threshold)
            .map(|w| w.text.as_str())
            .collect();
        if !low_confidence.is_empty() {
            penalty += self.config.low_confidence_penalty as i64 * low_confidence.len() as i64;
            let severity = if low_confidence.len() >= self.config.low_confidence_medium_count {
                Severity::Medium
            } else {
                Severity::Low
            };
            findings.push(
                Finding::new(
                    FindingKind::LowConfidenceWords,
                    severity,
                    format!(
                        "{} words recognized with confidence below {}",
                        low_confidence.len(),
                        self.config.low_confidence_threshold
                    ),
                )
                .with_detail("count", low_confidence.len())
                .with_detail("words", low_confidence.join(" ")),
            );
        }

        let variants = extraction.name_variants();
        if !variants.is_empty() {
            penalty += self.config.name_variant_penalty as i64;
            let described: Vec<String> = variants
                .values()
                .map(|spellings| spellings.iter().cloned().collect::<Vec<_>>().join("/"))
                .collect();
            findings.push(
                Finding::new(
                    FindingKind::NameVariants,
                    Severity::Medium,
                    format!("Names spelled inconsistently: {}", described.join(", ")),
                )
                .with_detail("variants", described.join(", ")),
            );
        }

        let score = (START_SCORE - penalty).max(0) as f32;
        debug!(
            dates = extraction.dates.len(),
            low_confidence = low_confidence.len(),
            name_variants = variants.len(),
            penalty,
            "Heuristics evaluated"
        );
        info!(score, findings = findings.len(), "OCR logic analysis complete");

        ModuleResult::scored(score)
            .with_diagnostic("wordCount", record.words.len())
            .with_diagnostic("lowConfidenceWords", low_confidence.len())
            .with_diagnostic("dateCount", extraction.dates.len())
            .with_diagnostic("dateFormats", formats.len())
            .with_diagnostic("numberCount", extraction.numbers.len())
            .with_diagnostic("nameCount", extraction.names.len())
            .with_findings(findings)
    }
}

/// Build a scorer for `config` and run it once.
pub fn analyze(record: &OcrRecord, config: &TextConfig) -> Result<ModuleResult> {
    Ok(TextAnomalyScorer::new(config.clone())?.analyze(record))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|err| AnalysisError::ExtractionFailure(format!("invalid text pattern: {}", err)))
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Score fusion. Reduces the per-module results into one global score, a
// risk band, and a short explanation. Pure and deterministic; never fails.

use std::collections::BTreeMap;

use tracing::debug;
use verifdoc_core::{
    Finding, FindingKind, FusionResult, ModuleKind, ModuleResult, RiskLevel, Severity,
};

/// Summary used when no module produced a score.
pub const NO_SIGNAL_SUMMARY: &str = "No usable analysis signal was available.";

/// A threshold rule that turns one module's result into an indicator.
struct IndicatorRule {
    module: ModuleKind,
    kind: FindingKind,
    severity: Severity,
    label: &'static str,
    fires: fn(&ModuleResult) -> bool,
}

const RULES: [IndicatorRule; 4] = [
    IndicatorRule {
        module: ModuleKind::Ela,
        kind: FindingKind::ElaAnomalyZones,
        severity: Severity::High,
        label: "strong ELA anomaly zones",
        fires: |r| r.score().is_some_and(|s| s > 60.0),
    },
    IndicatorRule {
        module: ModuleKind::NoiseResidual,
        kind: FindingKind::NoiseInconsistency,
        severity: Severity::Medium,
        label: "PRNU/noise inconsistencies detected",
        fires: |r| r.score().is_some_and(|s| s > 50.0),
    },
    IndicatorRule {
        module: ModuleKind::CopyMove,
        kind: FindingKind::ClonedRegions,
        severity: Severity::High,
        label: "cloned/duplicated regions",
        fires: |r| r.score().is_some_and(|s| s > 40.0),
    },
    IndicatorRule {
        module: ModuleKind::TextAnomaly,
        kind: FindingKind::OcrLogicAnomalies,
        severity: Severity::Medium,
        label: "logical OCR anomalies",
        fires: |r| !r.findings().is_empty(),
    },
];

/// Fuse whichever modules ran. Failed modules contribute neither a score nor
/// an indicator; they are excluded, not counted as zero.
pub fn fuse(modules: &BTreeMap<String, ModuleResult>) -> FusionResult {
    let scores: Vec<f32> = modules
        .values()
        .filter(|r| r.success())
        .filter_map(ModuleResult::score)
        .collect();

    let global_score = if scores.is_empty() {
        0.0
    } else {
        (scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64) as f32
    };
    let risk_level = RiskLevel::from_score(global_score);

    let mut indicators = Vec::new();
    let mut labels = Vec::new();
    for rule in &RULES {
        let Some(result) = modules.get(rule.module.name()) else {
            continue;
        };
        if !result.success() || !(rule.fires)(result) {
            continue;
        }
        let mut finding = Finding::new(rule.kind, rule.severity, rule.label)
            .with_detail("module", rule.module.name());
        if let Some(score) = result.score() {
            finding = finding.with_detail("score", format!("{score:.2}"));
        }
        indicators.push(finding);
        labels.push(rule.label);
    }

    let summary = if scores.is_empty() {
        NO_SIGNAL_SUMMARY.to_string()
    } else if labels.is_empty() {
        risk_level.description().to_string()
    } else {
        format!("{} Indicators: {}.", risk_level.description(), labels.join(", "))
    };

    let per_module_heatmaps = modules
        .iter()
        .filter_map(|(name, r)| r.heatmap().map(|h| (name.clone(), h.clone())))
        .collect();

    debug!(
        modules = modules.len(),
        scored = scores.len(),
        global_score,
        indicators = indicators.len(),
        "Fusion complete"
    );

    FusionResult {
        global_score,
        risk_level,
        indicators,
        summary,
        per_module_heatmaps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verifdoc_core::AnalysisError;

    fn modules(entries: &[(ModuleKind, ModuleResult)]) -> BTreeMap<String, ModuleResult> {
        entries
            .iter()
            .map(|(kind, r)| (kind.name().to_string(), r.clone()))
            .collect()
    }

    fn labels(result: &FusionResult) -> Vec<&str> {
        result.indicators.iter().map(|f| f.message.as_str()).collect()
    }

    #[test]
    fn empty_input_has_no_signal() {
        let result = fuse(&BTreeMap::new());
        assert_eq!(result.global_score, 0.0);
        assert_eq!(result.risk_level, RiskLevel::StronglySuspect);
        assert_eq!(result.summary, NO_SIGNAL_SUMMARY);
        assert!(result.indicators.is_empty());
    }

    #[test]
    fn only_failures_is_the_same_as_nothing() {
        let input = modules(&[
            (ModuleKind::Ela, ModuleResult::failed(&AnalysisError::Timeout(10))),
            (
                ModuleKind::CopyMove,
                ModuleResult::failed(&AnalysisError::UnsupportedFormat("x".into())),
            ),
        ]);
        let result = fuse(&input);
        assert_eq!(result.global_score, 0.0);
        assert_eq!(result.summary, NO_SIGNAL_SUMMARY);
    }

    #[test]
    fn global_score_is_mean_of_successful_scores() {
        let input = modules(&[
            (ModuleKind::Ela, ModuleResult::scored(10.0)),
            (ModuleKind::NoiseResidual, ModuleResult::scored(20.0)),
            (ModuleKind::CopyMove, ModuleResult::scored(60.0)),
            (ModuleKind::TextAnomaly, ModuleResult::failed(&AnalysisError::Timeout(5))),
        ]);
        let result = fuse(&input);
        assert!((result.global_score - 30.0).abs() < 1e-5);
        assert_eq!(result.risk_level, RiskLevel::StronglySuspect);
    }

    #[test]
    fn thresholds_are_strict() {
        let at_threshold = modules(&[
            (ModuleKind::Ela, ModuleResult::scored(60.0)),
            (ModuleKind::NoiseResidual, ModuleResult::scored(50.0)),
            (ModuleKind::CopyMove, ModuleResult::scored(40.0)),
        ]);
        assert!(fuse(&at_threshold).indicators.is_empty());

        let above = modules(&[
            (ModuleKind::Ela, ModuleResult::scored(60.5)),
            (ModuleKind::NoiseResidual, ModuleResult::scored(50.5)),
            (ModuleKind::CopyMove, ModuleResult::scored(40.5)),
        ]);
        assert_eq!(
            labels(&fuse(&above)),
            vec![
                "strong ELA anomaly zones",
                "PRNU/noise inconsistencies detected",
                "cloned/duplicated regions",
            ]
        );
    }

    #[test]
    fn text_findings_raise_ocr_indicator() {
        let text = ModuleResult::scored(90.0).with_findings([Finding::new(
            FindingKind::NameVariants,
            Severity::Medium,
            "Dupont/DUPONT",
        )]);
        let result = fuse(&modules(&[(ModuleKind::TextAnomaly, text)]));
        assert_eq!(labels(&result), vec!["logical OCR anomalies"]);
        assert_eq!(result.indicators[0].kind, FindingKind::OcrLogicAnomalies);
        assert_eq!(
            result.summary,
            "Document likely authentic. Indicators: logical OCR anomalies."
        );
    }

    #[test]
    fn risk_band_boundaries() {
        let band = |score: f32| fuse(&modules(&[(ModuleKind::Ela, ModuleResult::scored(score))]));
        assert_eq!(band(75.5).risk_level, RiskLevel::LikelyAuthentic);
        assert_eq!(band(75.0).risk_level, RiskLevel::PossibleAlteration);
        assert_eq!(band(40.0).risk_level, RiskLevel::PossibleAlteration);
        assert_eq!(band(39.9).risk_level, RiskLevel::StronglySuspect);
    }

    #[test]
    fn summary_without_indicators_is_band_description() {
        let result = fuse(&modules(&[(ModuleKind::Ela, ModuleResult::scored(50.0))]));
        assert_eq!(result.summary, RiskLevel::PossibleAlteration.description());
    }

    #[test]
    fn unknown_module_names_still_count_toward_the_mean() {
        let mut input = modules(&[(ModuleKind::Ela, ModuleResult::scored(20.0))]);
        input.insert("ml:trufor".into(), ModuleResult::scored(80.0));
        let result = fuse(&input);
        assert!((result.global_score - 50.0).abs() < 1e-5);
        assert!(result.indicators.is_empty());
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// VerifDoc — forensic document image analysis
//
// Entry point. Initialises logging, reads the input files, runs the
// orchestrator, and prints the fused report. All file I/O lives here; the
// library crates never touch the filesystem.

mod cli;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde_json::{Value, json};
use tracing::{error, info};
use verifdoc_analysis::text::OcrRecord;
use verifdoc_core::human_errors::humanize_error;
use verifdoc_core::{AnalysisConfig, EncodedImage, ModuleKind, ModuleResult, Result};
use verifdoc_fusion::{AnalysisReport, AnalysisRequest, Orchestrator};

use cli::{Cli, Commands, ModuleArg};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(cli.command).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "verifdoc failed");
            let human = humanize_error(&err);
            eprintln!("{}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands) -> Result<String> {
    match command {
        Commands::DefaultConfig => Ok(serde_json::to_string_pretty(&AnalysisConfig::default())?),
        Commands::Analyze {
            image,
            ocr,
            config,
            heatmaps,
            timeout_ms,
            skip,
        } => {
            let options = AnalyzeOptions {
                image,
                ocr,
                config,
                heatmaps,
                timeout_ms,
                skip,
            };
            analyze(options).await
        }
    }
}

struct AnalyzeOptions {
    image: PathBuf,
    ocr: Option<PathBuf>,
    config: Option<PathBuf>,
    heatmaps: Option<PathBuf>,
    timeout_ms: Option<u64>,
    skip: Vec<ModuleArg>,
}

async fn analyze(options: AnalyzeOptions) -> Result<String> {
    let mut config = match &options.config {
        Some(path) => AnalysisConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => AnalysisConfig::default(),
    };
    if let Some(ms) = options.timeout_ms {
        config.orchestrator.module_timeout_ms = Some(ms);
    }
    let orchestrator = Orchestrator::new(config)?;

    let bytes = std::fs::read(&options.image)?;
    let buffer = verifdoc_analysis::decode(&bytes)?;
    info!(
        path = %options.image.display(),
        width = buffer.width(),
        height = buffer.height(),
        "Image loaded"
    );

    let mut request = AnalysisRequest::new(buffer).with_document_bytes(bytes);
    for module in &options.skip {
        request = request.skip(ModuleKind::from(*module));
    }
    if let Some(path) = &options.ocr {
        let record: OcrRecord = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        request = request.with_ocr(record);
    }

    let report = orchestrator.run(request).await;

    let written = match &options.heatmaps {
        Some(dir) => write_heatmaps(dir, &report)?,
        None => BTreeMap::new(),
    };

    Ok(serde_json::to_string_pretty(&render_report(&report, &written)?)?)
}

/// Write one PNG per module heatmap. Returns module name → file path.
fn write_heatmaps(dir: &Path, report: &AnalysisReport) -> Result<BTreeMap<String, PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = BTreeMap::new();
    for (name, heatmap) in &report.fusion.per_module_heatmaps {
        let file_name = format!("{}.{}", name.replace(':', "_"), heatmap.encoding.extension());
        let path = dir.join(file_name);
        std::fs::write(&path, &heatmap.bytes)?;
        info!(module = %name, path = %path.display(), "Heatmap written");
        written.insert(name.clone(), path);
    }
    Ok(written)
}

/// Serialize the report without embedded heatmap bytes. Module entries drop
/// their heatmap; the fused heatmap table keeps a small reference
/// (dimensions, byte length, written path) per module.
fn render_report(report: &AnalysisReport, written: &BTreeMap<String, PathBuf>) -> Result<Value> {
    let modules: BTreeMap<String, ModuleResult> = report
        .modules
        .iter()
        .map(|(name, result)| (name.clone(), result.clone().without_heatmap()))
        .collect();
    let references: BTreeMap<&str, Value> = report
        .fusion
        .per_module_heatmaps
        .iter()
        .map(|(name, heatmap)| (name.as_str(), heatmap_reference(heatmap, written.get(name))))
        .collect();

    let mut value = serde_json::to_value(AnalysisReport {
        modules,
        ..report.clone()
    })?;
    if let Some(slot) = value.pointer_mut("/fusion/per_module_heatmaps") {
        *slot = serde_json::to_value(references)?;
    }
    Ok(value)
}

fn heatmap_reference(heatmap: &EncodedImage, path: Option<&PathBuf>) -> Value {
    json!({
        "encoding": heatmap.encoding,
        "width": heatmap.width,
        "height": heatmap.height,
        "byteLength": heatmap.bytes.len(),
        "path": path.map(|p| p.display().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let img = GrayImage::from_fn(48, 48, |x, y| Luma([((x * 5 + y * 11) % 256) as u8]));
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn options(image: PathBuf) -> AnalyzeOptions {
        AnalyzeOptions {
            image,
            ocr: None,
            config: None,
            heatmaps: None,
            timeout_ms: None,
            skip: Vec::new(),
        }
    }

    #[test]
    fn parses_skip_list() {
        let cli = Cli::try_parse_from(["verifdoc", "analyze", "scan.png", "--skip", "ela", "noise"])
            .unwrap();
        match cli.command {
            Commands::Analyze { image, skip, .. } => {
                assert_eq!(image, PathBuf::from("scan.png"));
                assert_eq!(skip, vec![ModuleArg::Ela, ModuleArg::Noise]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn analyze_writes_heatmaps_and_strips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_png(dir.path(), "doc.png");
        let maps = dir.path().join("maps");

        let output = analyze(AnalyzeOptions {
            heatmaps: Some(maps.clone()),
            ..options(image)
        })
        .await
        .unwrap();

        let report: Value = serde_json::from_str(&output).unwrap();
        assert!(report["fusion"]["global_score"].is_number());
        assert!(!output.contains("\"bytes\""));
        for name in ["ela", "noiseprint", "copymove"] {
            assert!(maps.join(format!("{name}.png")).exists(), "{name}");
            assert!(report["modules"][name].get("heatmap").is_none(), "{name}");
            let reference = &report["fusion"]["per_module_heatmaps"][name];
            assert_eq!(reference["width"], 48);
            assert_eq!(reference["encoding"], "png");
            assert!(reference["byteLength"].as_u64().unwrap() > 0);
            assert!(reference["path"].is_string());
        }
    }

    #[tokio::test]
    async fn ocr_file_enables_text_module() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_png(dir.path(), "doc.png");
        let ocr = dir.path().join("words.json");
        std::fs::write(
            &ocr,
            r#"{"text": "Paid 2024-01-05", "words": [{"text": "Paid", "confidence": 42.0}]}"#,
        )
        .unwrap();

        let output = analyze(AnalyzeOptions {
            ocr: Some(ocr),
            skip: vec![ModuleArg::Copymove],
            ..options(image)
        })
        .await
        .unwrap();

        let report: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["modules"]["ocr"]["score"], 98.0);
        assert!(report["modules"].get("copymove").is_none());
    }

    #[tokio::test]
    async fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_png(dir.path(), "doc.png");
        let config = dir.path().join("cfg.json");
        std::fs::write(&config, r#"{"ela": {"quality": 75}}"#).unwrap();

        let output = analyze(AnalyzeOptions {
            config: Some(config),
            skip: vec![ModuleArg::Noise, ModuleArg::Copymove],
            ..options(image)
        })
        .await
        .unwrap();

        let report: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["modules"]["ela"]["diagnostics"]["quality"], "75");
    }

    #[tokio::test]
    async fn missing_image_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = analyze(options(dir.path().join("absent.png"))).await.unwrap_err();
        assert_eq!(err.code(), "io");
    }

    #[tokio::test]
    async fn undecodable_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = analyze(options(path)).await.unwrap_err();
        assert_eq!(err.code(), "unsupported format");
    }

    #[tokio::test]
    async fn default_config_round_trips() {
        let output = execute(Commands::DefaultConfig).await.unwrap();
        let parsed = AnalysisConfig::from_json(&output).unwrap();
        assert_eq!(parsed, AnalysisConfig::default());
    }
}

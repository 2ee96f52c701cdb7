// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Concurrent analysis orchestrator.
//
// Every enabled analyzer runs on its own blocking worker over a shared,
// immutable `PixelBuffer`. The orchestrator joins all of them (each bounded
// by the module deadline) before handing the complete set to fusion; a
// failing, panicking or timed-out module becomes a failed `ModuleResult`
// and never affects its siblings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use verifdoc_analysis::text::{self, OcrRecord};
use verifdoc_analysis::{copy_move, ela, noise};
use verifdoc_core::integrity::hash_bytes;
use verifdoc_core::{
    AnalysisConfig, AnalysisError, CancelFlag, FusionResult, ModuleKind, ModuleResult,
    PixelBuffer, Result,
};

use crate::fusion;
use crate::inference::{self, ModelRegistry};

type Job = Box<dyn FnOnce(&CancelFlag) -> Result<ModuleResult> + Send + 'static>;

/// One document to analyze.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    image: Arc<PixelBuffer>,
    document: Option<Arc<Vec<u8>>>,
    ocr: Option<OcrRecord>,
    skip: BTreeSet<ModuleKind>,
    models: Vec<String>,
}

impl AnalysisRequest {
    pub fn new(image: PixelBuffer) -> Self {
        Self {
            image: Arc::new(image),
            document: None,
            ocr: None,
            skip: BTreeSet::new(),
            models: Vec::new(),
        }
    }

    /// Attach the submitted file so the report fingerprints it instead of
    /// the decoded pixels.
    pub fn with_document_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.document = Some(Arc::new(bytes));
        self
    }

    /// Enable the text module with output from an external OCR engine.
    pub fn with_ocr(mut self, record: OcrRecord) -> Self {
        self.ocr = Some(record);
        self
    }

    pub fn skip(mut self, module: ModuleKind) -> Self {
        self.skip.insert(module);
        self
    }

    /// Run the named registry model as an extra `ml:<name>` module.
    pub fn with_model(mut self, name: impl Into<String>) -> Self {
        self.models.push(name.into());
        self
    }
}

/// Everything one analysis run produced.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub document_sha256: String,
    pub width: u32,
    pub height: u32,
    pub modules: BTreeMap<String, ModuleResult>,
    pub fusion: FusionResult,
}

/// Dispatches analyzers and fuses their results.
pub struct Orchestrator {
    config: Arc<AnalysisConfig>,
    registry: Option<Arc<dyn ModelRegistry>>,
}

impl Orchestrator {
    /// Validates `config` up front so no worker starts with bad settings.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            registry: None,
        })
    }

    pub fn with_registry(mut self, registry: Arc<dyn ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Run every enabled module, wait for all of them, and fuse.
    #[instrument(skip_all, fields(
        width = request.image.width(),
        height = request.image.height(),
    ))]
    pub async fn run(&self, request: AnalysisRequest) -> AnalysisReport {
        let timeout_ms = self.config.orchestrator.module_timeout_ms;
        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        info!(?timeout_ms, "Starting analysis run");

        let mut modules = BTreeMap::new();
        let mut pending: Vec<(String, CancelFlag, JoinHandle<Result<ModuleResult>>)> = Vec::new();

        for (name, job) in self.jobs(&request, &mut modules) {
            let cancel = CancelFlag::with_deadline(timeout_ms.unwrap_or_default());
            let worker_cancel = cancel.clone();
            let handle = tokio::task::spawn_blocking(move || job(&worker_cancel));
            pending.push((name, cancel, handle));
        }

        for (name, cancel, handle) in pending {
            let result = join_module(&name, handle, &cancel, deadline, timeout_ms).await;
            modules.insert(name, result);
        }

        let fusion = fusion::fuse(&modules);
        let document_sha256 = match &request.document {
            Some(bytes) => hash_bytes(bytes),
            None => hash_bytes(request.image.data()),
        };

        info!(
            modules = modules.len(),
            global_score = fusion.global_score,
            risk_level = ?fusion.risk_level,
            "Analysis run complete"
        );

        AnalysisReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            document_sha256,
            width: request.image.width(),
            height: request.image.height(),
            modules,
            fusion,
        }
    }

    /// Build the job list. Modules that cannot start (unknown model names)
    /// are recorded straight into `failed`.
    fn jobs(
        &self,
        request: &AnalysisRequest,
        failed: &mut BTreeMap<String, ModuleResult>,
    ) -> Vec<(String, Job)> {
        let mut jobs: Vec<(String, Job)> = Vec::new();
        let enabled = |kind: ModuleKind| !request.skip.contains(&kind);

        if enabled(ModuleKind::Ela) {
            let (image, config) = (Arc::clone(&request.image), Arc::clone(&self.config));
            jobs.push((
                ModuleKind::Ela.name().to_string(),
                Box::new(move |cancel: &CancelFlag| {
                    ela::analyze_with_cancel(&image, &config.ela, cancel)
                }),
            ));
        }

        if enabled(ModuleKind::NoiseResidual) {
            let (image, config) = (Arc::clone(&request.image), Arc::clone(&self.config));
            jobs.push((
                ModuleKind::NoiseResidual.name().to_string(),
                Box::new(move |cancel: &CancelFlag| {
                    noise::analyze_with_cancel(&image, &config.noise, cancel)
                }),
            ));
        }

        if enabled(ModuleKind::CopyMove) {
            let (image, config) = (Arc::clone(&request.image), Arc::clone(&self.config));
            jobs.push((
                ModuleKind::CopyMove.name().to_string(),
                Box::new(move |cancel: &CancelFlag| {
                    copy_move::analyze_with_cancel(&image, &config.copy_move, cancel)
                }),
            ));
        }

        if enabled(ModuleKind::TextAnomaly) {
            if let Some(record) = request.ocr.clone() {
                let config = Arc::clone(&self.config);
                jobs.push((
                    ModuleKind::TextAnomaly.name().to_string(),
                    Box::new(move |_cancel: &CancelFlag| text::analyze(&record, &config.text)),
                ));
            }
        }

        for model_name in &request.models {
            let name = inference::module_name(model_name);
            let model = self.registry.as_ref().and_then(|r| r.get(model_name));
            match model {
                Some(model) => {
                    let image = Arc::clone(&request.image);
                    jobs.push((
                        name,
                        Box::new(move |cancel: &CancelFlag| {
                            inference::run_model(model.as_ref(), &image, cancel)
                        }),
                    ));
                }
                None => {
                    warn!(model = %model_name, "Model not found in registry");
                    let err = AnalysisError::ExtractionFailure(format!(
                        "no model named '{}' in the registry",
                        model_name
                    ));
                    failed.insert(name, ModuleResult::failed(&err));
                }
            }
        }

        jobs
    }
}

/// Wait for one worker, bounded by the shared deadline.
async fn join_module(
    name: &str,
    handle: JoinHandle<Result<ModuleResult>>,
    cancel: &CancelFlag,
    deadline: Option<Instant>,
    timeout_ms: Option<u64>,
) -> ModuleResult {
    let joined = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                // The worker notices the raised flag at its next check and
                // exits; its output is discarded.
                cancel.cancel();
                let ms = timeout_ms.unwrap_or_default();
                warn!(module = name, timeout_ms = ms, "Module timed out");
                return ModuleResult::failed(&AnalysisError::Timeout(ms));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(outcome) => {
            if let Err(err) = &outcome {
                warn!(module = name, error = %err, "Module failed");
            }
            ModuleResult::from_outcome(outcome)
        }
        Err(err) => {
            warn!(module = name, error = %err, "Module worker did not complete");
            ModuleResult::failed(&AnalysisError::ExtractionFailure(format!(
                "{} worker did not complete: {}",
                name, err
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verifdoc_core::Channels;
    use verifdoc_core::config::OrchestratorConfig;

    use crate::inference::{ForgeryModel, ModelPrediction, StaticRegistry};

    fn gray(width: u32, height: u32, value: u8) -> PixelBuffer {
        PixelBuffer::new(
            width,
            height,
            Channels::Gray,
            vec![value; (width * height) as usize],
        )
        .unwrap()
    }

    struct Panicking;

    impl ForgeryModel for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn predict(&self, _buffer: &PixelBuffer, _cancel: &CancelFlag) -> Result<ModelPrediction> {
            panic!("model crashed")
        }
    }

    #[tokio::test]
    async fn runs_pixel_modules_without_ocr() {
        let orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();
        let report = orchestrator.run(AnalysisRequest::new(gray(32, 32, 128))).await;

        let names: Vec<&str> = report.modules.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["copymove", "ela", "noiseprint"]);
        assert!(report.modules.values().all(ModuleResult::success));
        assert_eq!((report.width, report.height), (32, 32));
    }

    #[tokio::test]
    async fn skipped_modules_are_absent() {
        let orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();
        let request = AnalysisRequest::new(gray(16, 16, 10))
            .skip(ModuleKind::Ela)
            .skip(ModuleKind::CopyMove)
            .with_ocr(OcrRecord::default());
        let report = orchestrator.run(request).await;

        let names: Vec<&str> = report.modules.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["noiseprint", "ocr"]);
    }

    #[tokio::test]
    async fn unknown_model_fails_alone() {
        let orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();
        let request = AnalysisRequest::new(gray(16, 16, 10))
            .skip(ModuleKind::Ela)
            .with_model("missing");
        let report = orchestrator.run(request).await;

        let model = &report.modules["ml:missing"];
        assert!(!model.success());
        assert_eq!(model.diagnostic("error"), Some("extraction failure"));
        assert!(report.modules["noiseprint"].success());
    }

    #[tokio::test]
    async fn panicking_model_becomes_extraction_failure() {
        let registry = StaticRegistry::new().with_model(Arc::new(Panicking));
        let orchestrator = Orchestrator::new(AnalysisConfig::default())
            .unwrap()
            .with_registry(Arc::new(registry));
        let request = AnalysisRequest::new(gray(16, 16, 10)).with_model("panicking");
        let report = orchestrator.run(request).await;

        let model = &report.modules["ml:panicking"];
        assert_eq!(model.score(), None);
        assert_eq!(model.diagnostic("error"), Some("extraction failure"));
        assert!(report.modules["ela"].success());
    }

    #[tokio::test]
    async fn document_bytes_are_fingerprinted() {
        let orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();
        let request = AnalysisRequest::new(gray(8, 8, 0))
            .skip(ModuleKind::Ela)
            .with_document_bytes(b"original file".to_vec());
        let report = orchestrator.run(request).await;
        assert_eq!(report.document_sha256, hash_bytes(b"original file"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AnalysisConfig {
            orchestrator: OrchestratorConfig {
                module_timeout_ms: Some(0),
            },
            ..Default::default()
        };
        assert!(Orchestrator::new(config).is_err());
    }
}

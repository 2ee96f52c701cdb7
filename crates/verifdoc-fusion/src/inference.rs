// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Injected model inference. The engine owns no neural network: callers hand
// the orchestrator a registry of already-loaded models, looked up by name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument};
use verifdoc_analysis::heatmap;
use verifdoc_core::{CancelFlag, ModuleResult, PixelBuffer, Result, ScalarField};

/// Prefix of the module key a model's result is stored under.
pub const MODEL_MODULE_PREFIX: &str = "ml:";

/// Output of a single forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPrediction {
    /// Score in `[0, 100]`, fused alongside the built-in analyzers.
    pub score: f32,
    /// Per-pixel activation already normalized to `[0, 255]`.
    pub activation: Option<ScalarField>,
}

/// A loaded forgery-detection model.
///
/// Implementations should poll `cancel` if a prediction can take long; the
/// orchestrator raises it when the module deadline passes.
pub trait ForgeryModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, buffer: &PixelBuffer, cancel: &CancelFlag) -> Result<ModelPrediction>;
}

/// Lookup capability for models by name.
pub trait ModelRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn ForgeryModel>>;
}

/// In-memory registry filled by the caller before analysis starts.
#[derive(Default)]
pub struct StaticRegistry {
    models: HashMap<String, Arc<dyn ForgeryModel>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model` under its own name, replacing any previous entry.
    pub fn register(&mut self, model: Arc<dyn ForgeryModel>) {
        self.models.insert(model.name().to_string(), model);
    }

    pub fn with_model(mut self, model: Arc<dyn ForgeryModel>) -> Self {
        self.register(model);
        self
    }
}

impl ModelRegistry for StaticRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn ForgeryModel>> {
        self.models.get(name).cloned()
    }
}

pub fn module_name(model_name: &str) -> String {
    format!("{MODEL_MODULE_PREFIX}{model_name}")
}

/// Run one model and wrap its prediction as a module result, rendering the
/// activation with the shared heatmap ramp.
#[instrument(skip_all, fields(model = model.name()))]
pub fn run_model(
    model: &dyn ForgeryModel,
    buffer: &PixelBuffer,
    cancel: &CancelFlag,
) -> Result<ModuleResult> {
    let prediction = model.predict(buffer, cancel)?;
    cancel.check()?;

    let mut result = ModuleResult::scored(prediction.score).with_diagnostic("model", model.name());
    if let Some(activation) = &prediction.activation {
        result = result
            .with_heatmap(heatmap::render(activation)?)
            .with_diagnostic("activationWidth", activation.width())
            .with_diagnostic("activationHeight", activation.height());
    }

    info!(score = prediction.score, "Model prediction complete");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use verifdoc_core::Channels;

    struct Constant {
        score: f32,
        with_activation: bool,
    }

    impl ForgeryModel for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn predict(&self, buffer: &PixelBuffer, _cancel: &CancelFlag) -> Result<ModelPrediction> {
            let activation = self
                .with_activation
                .then(|| ScalarField::new(buffer.width(), buffer.height()));
            Ok(ModelPrediction {
                score: self.score,
                activation,
            })
        }
    }

    fn buffer() -> PixelBuffer {
        PixelBuffer::new(8, 6, Channels::Gray, vec![0; 48]).unwrap()
    }

    #[test]
    fn registry_lookup_by_name() {
        let registry = StaticRegistry::new().with_model(Arc::new(Constant {
            score: 10.0,
            with_activation: false,
        }));
        assert!(registry.get("constant").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn prediction_becomes_scored_module() {
        let model = Constant {
            score: 140.0,
            with_activation: true,
        };
        let result = run_model(&model, &buffer(), &CancelFlag::never()).unwrap();
        assert_eq!(result.score(), Some(100.0));
        let heatmap = result.heatmap().unwrap();
        assert_eq!((heatmap.width, heatmap.height), (8, 6));
        assert_eq!(result.diagnostic("model"), Some("constant"));
    }

    #[test]
    fn module_names_are_prefixed() {
        assert_eq!(module_name("trufor"), "ml:trufor");
    }
}

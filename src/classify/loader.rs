use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use super::backend::ModelHandle;
use super::backends::ColorHeuristicBackend;
use crate::config::{ClassifierSettings, ModelBackendKind};

/// Load the configured model once at startup.
///
/// Any failure here is fatal to the caller: the monitor never starts
/// without a working model.
pub fn load_model(settings: &ClassifierSettings) -> Result<ModelHandle> {
    let model: ModelHandle = match settings.backend {
        ModelBackendKind::Heuristic => Arc::new(ColorHeuristicBackend::new()),
        ModelBackendKind::Tract => load_tract(settings)?,
    };
    model
        .warm_up()
        .with_context(|| format!("{} model failed warm-up", model.name()))?;
    log::info!(
        "loaded {} classifier (input {}x{})",
        model.name(),
        model.input_size().0,
        model.input_size().1
    );
    Ok(model)
}

#[cfg(feature = "backend-tract")]
fn load_tract(settings: &ClassifierSettings) -> Result<ModelHandle> {
    use super::backends::TractBackend;

    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires a model_path"))?;
    if !path.is_file() {
        return Err(anyhow!("model file {} does not exist", path.display()));
    }
    let backend = TractBackend::new(
        path,
        settings.input_size,
        settings.input_size,
        settings.layout,
        settings.input_scale,
    )?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(_settings: &ClassifierSettings) -> Result<ModelHandle> {
    Err(anyhow!(
        "tract backend not compiled in; rebuild with --features backend-tract or use the heuristic backend"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_loads_without_model_file() {
        let settings = ClassifierSettings {
            backend: ModelBackendKind::Heuristic,
            ..ClassifierSettings::default()
        };
        let model = load_model(&settings).unwrap();
        assert_eq!(model.name(), "heuristic");
    }

    #[test]
    fn tract_with_missing_model_is_fatal() {
        let settings = ClassifierSettings {
            backend: ModelBackendKind::Tract,
            model_path: Some("/nonexistent/waste.onnx".into()),
            ..ClassifierSettings::default()
        };
        assert!(load_model(&settings).is_err());
    }
}

#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::classify::backend::{ClassifierBackend, InputScale, ModelInput};
use crate::config::TensorLayout;

/// Tract-based backend for ONNX image classifiers.
///
/// Loads a local model file once and runs it on 1x224x224x3 inputs (or the
/// NCHW equivalent). Performs no network I/O and writes nothing to disk.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    layout: TensorLayout,
    scale: InputScale,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        layout: TensorLayout,
        scale: InputScale,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let shape = match layout {
            TensorLayout::Nhwc => tvec!(1, height as usize, width as usize, 3),
            TensorLayout::Nchw => tvec!(1, 3, height as usize, width as usize),
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            layout,
            scale,
        })
    }

    fn build_input(&self, input: &ModelInput) -> Result<Tensor> {
        if input.width != self.width || input.height != self.height {
            return Err(anyhow!(
                "input size {}x{} does not match model input {}x{}",
                input.width,
                input.height,
                self.width,
                self.height
            ));
        }
        let expected_len = (input.width as usize) * (input.height as usize) * 3;
        if input.data.len() != expected_len {
            return Err(anyhow!(
                "expected {} input values, received {}",
                expected_len,
                input.data.len()
            ));
        }

        let (h, w) = (self.height as usize, self.width as usize);
        let scale = self.scale;
        let tensor = match self.layout {
            TensorLayout::Nhwc => {
                tract_ndarray::Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
                    scale.apply(input.at(y, x, c))
                })
                .into_tensor()
            }
            TensorLayout::Nchw => {
                tract_ndarray::Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
                    scale.apply(input.at(y, x, c))
                })
                .into_tensor()
            }
        };
        Ok(tensor)
    }
}

impl ClassifierBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn predict(&self, input: &ModelInput) -> Result<Vec<f32>> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok(scores.iter().copied().collect())
    }

    fn warm_up(&self) -> Result<()> {
        let blank = ModelInput {
            width: self.width,
            height: self.height,
            data: vec![0.0; (self.width as usize) * (self.height as usize) * 3],
        };
        self.predict(&blank).map(|_| ())
    }
}

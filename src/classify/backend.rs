use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Model input edge length in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// How 0..255 pixel values are presented to the model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputScale {
    /// Raw 0..255 floats, as produced by a Keras `img_to_array`.
    #[default]
    Raw,
    /// Values divided by 255.
    Unit,
}

impl InputScale {
    pub fn apply(self, value: f32) -> f32 {
        match self {
            InputScale::Raw => value,
            InputScale::Unit => value / 255.0,
        }
    }
}

/// Batch-of-one RGB image, NHWC order, unscaled 0..255 values.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ModelInput {
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }

    /// Value at (y, x, channel).
    pub fn at(&self, y: usize, x: usize, channel: usize) -> f32 {
        self.data[(y * self.width as usize + x) * 3 + channel]
    }
}

/// Image classification model.
///
/// Backends are loaded once and shared read-only across threads, so
/// `predict` takes `&self`. Implementations must not write to disk or keep
/// the input beyond the call.
pub trait ClassifierBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Expected (width, height) of the input image.
    fn input_size(&self) -> (u32, u32) {
        (DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
    }

    /// Return one score per category in `Category::ALL` order.
    fn predict(&self, input: &ModelInput) -> Result<Vec<f32>>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Process-wide, immutable model handle.
pub type ModelHandle = Arc<dyn ClassifierBackend>;

use anyhow::{anyhow, Result};

use crate::classify::backend::{ClassifierBackend, ModelInput};
use crate::classify::classifier::softmax;

/// Colour-statistics fallback model.
///
/// Used when no trained model is deployed (bench setups, demos, CI). It scores
/// each category from mean colour and saturation:
/// - organic: green/brown dominance
/// - paper: bright, unsaturated
/// - plastic: strongly saturated
/// - mixed: constant baseline
#[derive(Clone, Copy, Debug, Default)]
pub struct ColorHeuristicBackend;

impl ColorHeuristicBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ClassifierBackend for ColorHeuristicBackend {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn predict(&self, input: &ModelInput) -> Result<Vec<f32>> {
        let pixels = input.data.len() / 3;
        if pixels == 0 {
            return Err(anyhow!("empty model input"));
        }

        let mut mean = [0f32; 3];
        let mut saturation = 0f32;
        for px in input.data.chunks_exact(3) {
            let (r, g, b) = (px[0] / 255.0, px[1] / 255.0, px[2] / 255.0);
            mean[0] += r;
            mean[1] += g;
            mean[2] += b;
            let max = r.max(g).max(b);
            let min = r.min(g).min(b);
            if max > 0.0 {
                saturation += (max - min) / max;
            }
        }
        for channel in mean.iter_mut() {
            *channel /= pixels as f32;
        }
        saturation /= pixels as f32;
        let brightness = (mean[0] + mean[1] + mean[2]) / 3.0;

        let organic = (mean[1] - mean[2]) * 6.0 + (mean[0] - mean[2]) * 2.0 - saturation * 0.5;
        let paper = brightness * 4.0 - saturation * 4.0 - 1.5;
        let plastic = saturation * 5.0 - 1.5;
        let mixed = 0.5;

        Ok(softmax(&[mixed, organic, paper, plastic]))
    }
}

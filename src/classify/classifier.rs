use std::any::Any;
use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use image::imageops::FilterType;
use image::ImageReader;

use super::backend::{ModelHandle, ModelInput};
use super::error::ClassifyError;
use super::result::{Category, ClassificationOutcome, Prediction, Unavailable};

/// Tolerance when deciding whether model scores already form a distribution.
const DISTRIBUTION_EPSILON: f32 = 1e-3;

/// Classification boundary.
///
/// Turns an image artifact into a `ClassificationOutcome`. Nothing that goes
/// wrong below this boundary (I/O, decode, inference errors, backend panics)
/// escapes as an error: it becomes `ClassificationOutcome::Unavailable`.
#[derive(Clone)]
pub struct Classifier {
    model: ModelHandle,
}

impl Classifier {
    pub fn new(model: ModelHandle) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Classify the image at `path`. Failures are logged with their cause.
    pub fn classify(&self, path: &Path) -> ClassificationOutcome {
        match self.try_classify(path) {
            Ok(prediction) => {
                log::debug!(
                    "classified {} as {} ({:.2}%) using {}",
                    path.display(),
                    prediction.category,
                    prediction.confidence * 100.0,
                    self.model.name()
                );
                ClassificationOutcome::Classified(prediction)
            }
            Err(e) => {
                log::warn!("classification unavailable for {}: {}", path.display(), e);
                ClassificationOutcome::Unavailable(Unavailable {
                    cause: e.cause(),
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Same as `classify` but keeps the typed error.
    pub fn try_classify(&self, path: &Path) -> Result<Prediction, ClassifyError> {
        let input = self.prepare_input(path)?;
        let model = &self.model;
        let scores = catch_unwind(AssertUnwindSafe(|| model.predict(&input)))
            .map_err(|payload| ClassifyError::Panic(panic_message(payload.as_ref())))?
            .map_err(ClassifyError::Inference)?;
        select_prediction(&scores)
    }

    /// Load, decode and resize the image to the model's input geometry.
    pub fn prepare_input(&self, path: &Path) -> Result<ModelInput, ClassifyError> {
        let bytes = std::fs::read(path).map_err(|source| ClassifyError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let image = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|source| ClassifyError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?
            .decode()
            .map_err(|source| ClassifyError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        let (width, height) = self.model.input_size();
        let rgb = image
            .resize_exact(width, height, FilterType::Nearest)
            .into_rgb8();
        let data = rgb.into_raw().into_iter().map(f32::from).collect();
        Ok(ModelInput {
            width,
            height,
            data,
        })
    }
}

/// Pick the arg-max category from raw model scores.
///
/// Scores already in [0, 1] are taken as probabilities; anything else is
/// treated as logits and passed through softmax first.
pub fn select_prediction(scores: &[f32]) -> Result<Prediction, ClassifyError> {
    if scores.len() != Category::ALL.len() {
        return Err(ClassifyError::Output(format!(
            "expected {} scores, got {}",
            Category::ALL.len(),
            scores.len()
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ClassifyError::Output("non-finite score".to_string()));
    }

    let is_distribution = scores
        .iter()
        .all(|&s| (-DISTRIBUTION_EPSILON..=1.0 + DISTRIBUTION_EPSILON).contains(&s));
    let probabilities = if is_distribution {
        scores.to_vec()
    } else {
        softmax(scores)
    };

    let (index, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |best, (i, p)| {
            if p > best.1 {
                (i, p)
            } else {
                best
            }
        });
    let category = Category::from_index(index)
        .ok_or_else(|| ClassifyError::Output(format!("no category for index {}", index)))?;
    Ok(Prediction {
        category,
        confidence: confidence.clamp(0.0, 1.0),
    })
}

pub(crate) fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::backend::ClassifierBackend;
    use crate::classify::result::FailureCause;
    use anyhow::{anyhow, Result};
    use std::sync::Arc;

    struct FixedBackend(Vec<f32>);

    impl ClassifierBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn input_size(&self) -> (u32, u32) {
            (8, 8)
        }

        fn predict(&self, input: &ModelInput) -> Result<Vec<f32>> {
            assert_eq!(input.shape(), [1, 8, 8, 3]);
            Ok(self.0.clone())
        }
    }

    struct FailingBackend;

    impl ClassifierBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn predict(&self, _input: &ModelInput) -> Result<Vec<f32>> {
            Err(anyhow!("tensor shape mismatch"))
        }
    }

    struct PanickingBackend;

    impl ClassifierBackend for PanickingBackend {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn predict(&self, _input: &ModelInput) -> Result<Vec<f32>> {
            panic!("kernel exploded")
        }
    }

    fn write_png(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let image = image::RgbImage::from_pixel(32, 24, image::Rgb([10, 200, 30]));
        image.save(&path).unwrap();
        path
    }

    #[test]
    fn arg_max_of_distribution() -> Result<()> {
        let prediction = select_prediction(&[0.1, 0.2, 0.6, 0.1])?;
        assert_eq!(prediction.category, Category::Paper);
        assert!((prediction.confidence - 0.6).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn logits_are_softmaxed() -> Result<()> {
        let prediction = select_prediction(&[-3.0, 4.0, 1.0, 0.5])?;
        assert_eq!(prediction.category, Category::Organic);
        assert!(prediction.confidence > 0.5 && prediction.confidence <= 1.0);
        Ok(())
    }

    #[test]
    fn wrong_length_or_nan_is_output_error() {
        let err = select_prediction(&[0.5, 0.5]).unwrap_err();
        assert_eq!(err.cause(), FailureCause::Output);
        let err = select_prediction(&[0.1, f32::NAN, 0.2, 0.3]).unwrap_err();
        assert_eq!(err.cause(), FailureCause::Output);
    }

    #[test]
    fn classifies_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "drop.png");
        let classifier = Classifier::new(Arc::new(FixedBackend(vec![0.05, 0.05, 0.1, 0.8])));

        let outcome = classifier.classify(&path);
        assert_eq!(outcome.category(), Some(Category::Plastic));
        assert!((outcome.confidence().unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn prepared_input_is_resized_and_unscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "drop.png");
        let classifier = Classifier::new(Arc::new(FixedBackend(vec![0.25; 4])));

        let input = classifier.prepare_input(&path).unwrap();
        assert_eq!((input.width, input.height), (8, 8));
        assert_eq!(input.data.len(), 8 * 8 * 3);
        assert_eq!(input.at(3, 5, 1), 200.0);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Classifier::new(Arc::new(FixedBackend(vec![0.25; 4])));
        match classifier.classify(&dir.path().join("missing.jpg")) {
            ClassificationOutcome::Unavailable(u) => assert_eq!(u.cause, FailureCause::Unreadable),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn corrupt_file_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"\xFF\xD8 definitely not a jpeg").unwrap();
        let classifier = Classifier::new(Arc::new(FixedBackend(vec![0.25; 4])));
        match classifier.classify(&path) {
            ClassificationOutcome::Unavailable(u) => assert_eq!(u.cause, FailureCause::Decode),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn backend_error_and_panic_are_contained() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "drop.png");

        let outcome = Classifier::new(Arc::new(FailingBackend)).classify(&path);
        match outcome {
            ClassificationOutcome::Unavailable(u) => {
                assert_eq!(u.cause, FailureCause::Inference);
                assert!(u.detail.contains("tensor shape mismatch"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let outcome = Classifier::new(Arc::new(PanickingBackend)).classify(&path);
        match outcome {
            ClassificationOutcome::Unavailable(u) => {
                assert_eq!(u.cause, FailureCause::Panic);
                assert!(u.detail.contains("kernel exploded"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

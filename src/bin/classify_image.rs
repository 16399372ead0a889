//! classify_image - classify image files with the configured model.
//!
//! Prints one line per file:
//! `<path>\t<category>\t<confidence%>` or `<path>\tunavailable\t<cause>: <detail>`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use bin_sentry::classify::InputScale;
use bin_sentry::config::{ClassifierSettings, ModelBackendKind, TensorLayout};
use bin_sentry::{load_model, ClassificationOutcome, Classifier};

#[derive(Parser, Debug)]
#[command(author, version, about = "Classify waste images (mixed/organic/paper/plastic)")]
struct Args {
    /// Image files to classify.
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Classifier backend: tract or heuristic.
    #[arg(long, env = "SORTER_MODEL_BACKEND", default_value = "heuristic")]
    backend: ModelBackendKind,
    /// ONNX model path (tract backend).
    #[arg(long, env = "SORTER_MODEL_PATH")]
    model: Option<PathBuf>,
    /// Model input edge length in pixels.
    #[arg(long, default_value_t = bin_sentry::classify::DEFAULT_INPUT_SIZE)]
    input_size: u32,
    /// Divide pixel values by 255 before inference.
    #[arg(long)]
    unit_scale: bool,
    /// Model expects NCHW instead of NHWC input.
    #[arg(long)]
    nchw: bool,
    /// Emit JSON lines instead of tab-separated text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.backend == ModelBackendKind::Tract && args.model.is_none() {
        return Err(anyhow!("--model is required for the tract backend"));
    }

    let settings = ClassifierSettings {
        backend: args.backend,
        model_path: args.model,
        input_size: args.input_size,
        input_scale: if args.unit_scale {
            InputScale::Unit
        } else {
            InputScale::Raw
        },
        layout: if args.nchw {
            TensorLayout::Nchw
        } else {
            TensorLayout::Nhwc
        },
    };
    let classifier = Classifier::new(load_model(&settings)?);

    let mut unavailable = 0usize;
    for path in &args.images {
        let outcome = classifier.classify(path);
        if !outcome.is_classified() {
            unavailable += 1;
        }
        if args.json {
            let line = serde_json::json!({
                "path": path.display().to_string(),
                "outcome": outcome,
            });
            println!("{}", line);
            continue;
        }
        match &outcome {
            ClassificationOutcome::Classified(p) => println!(
                "{}\t{}\t{:.2}%",
                path.display(),
                p.category,
                p.confidence * 100.0
            ),
            ClassificationOutcome::Unavailable(u) => {
                println!("{}\tunavailable\t{}: {}", path.display(), u.cause, u.detail)
            }
        }
    }

    if unavailable == args.images.len() {
        return Err(anyhow!("no image could be classified"));
    }
    Ok(())
}

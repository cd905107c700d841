use std::fs;
use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};
use thiserror::Error;
use tracing::{error, info};

/// Side length the leaf classifier was trained on.
pub const INPUT_SIZE: u32 = 224;
/// Scores at or below this value mean the image shows a leaf.
pub const LEAF_THRESHOLD: f32 = 0.5;

const CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("tensorflow error: {0}")]
    Tensorflow(#[from] tensorflow::Status),
    #[error("operation '{0}' not found in graph")]
    MissingOperation(String),
    #[error("input has {actual} values, expected {expected}")]
    InputShape { expected: usize, actual: usize },
    #[error("model produced no output")]
    EmptyOutput,
    #[error("model session lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Leaf,
    NotLeaf,
    Error,
}

impl Verdict {
    pub fn from_score(score: f32) -> Self {
        if score <= LEAF_THRESHOLD {
            Verdict::Leaf
        } else {
            Verdict::NotLeaf
        }
    }
}

/// A binary leaf / not-leaf model.
///
/// `forward` receives one preprocessed image as a flat NHWC buffer of
/// `INPUT_SIZE * INPUT_SIZE * 3` values in `[0, 1]` and returns the score at
/// output index 0.
pub trait LeafClassifier: Send + Sync {
    fn forward(&self, input: &[f32]) -> Result<f32, ModelError>;
}

pub fn input_len() -> usize {
    (INPUT_SIZE * INPUT_SIZE) as usize * CHANNELS
}

/// Decodes the image at `path` and turns it into the model's input buffer.
pub fn preprocess(path: &Path) -> Result<Vec<f32>, ModelError> {
    let img = image::io::Reader::open(path)?
        .with_guessed_format()?
        .decode()?;

    let resized = img
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Nearest)
        .to_rgb8();

    let mut flat_img = Vec::with_capacity(input_len());
    for pixel in resized.pixels() {
        flat_img.push(pixel[0] as f32 / 255.0);
        flat_img.push(pixel[1] as f32 / 255.0);
        flat_img.push(pixel[2] as f32 / 255.0);
    }

    Ok(flat_img)
}

/// Runs the local model on one image file. Failures are logged and reported
/// as `Verdict::Error` so a bad upload never takes the worker down.
pub fn classify_image(classifier: &dyn LeafClassifier, path: &Path) -> Verdict {
    let score = preprocess(path).and_then(|input| classifier.forward(&input));
    match score {
        Ok(score) => {
            let verdict = Verdict::from_score(score);
            info!(score, ?verdict, "local classification finished");
            verdict
        }
        Err(err) => {
            error!("Error classifying image {}: {}", path.display(), err);
            Verdict::Error
        }
    }
}

struct Inner {
    session: Session,
    graph: Graph,
}

/// Leaf classifier backed by a frozen TensorFlow graph.
pub struct TensorflowLeafModel {
    inner: Mutex<Inner>,
    input_op: String,
    output_op: String,
}

impl TensorflowLeafModel {
    pub fn load(model_path: &Path, input_op: &str, output_op: &str) -> Result<Self, ModelError> {
        let model_bytes = fs::read(model_path)?;

        let mut graph = Graph::new();
        graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;

        for name in [input_op, output_op] {
            if graph.operation_by_name(name).map_err(tensorflow::Status::from)?.is_none() {
                return Err(ModelError::MissingOperation(name.to_string()));
            }
        }

        let session = Session::new(&SessionOptions::new(), &graph)?;

        Ok(TensorflowLeafModel {
            inner: Mutex::new(Inner { session, graph }),
            input_op: input_op.to_string(),
            output_op: output_op.to_string(),
        })
    }
}

impl LeafClassifier for TensorflowLeafModel {
    fn forward(&self, input: &[f32]) -> Result<f32, ModelError> {
        if input.len() != input_len() {
            return Err(ModelError::InputShape {
                expected: input_len(),
                actual: input.len(),
            });
        }

        let size = INPUT_SIZE as u64;
        let input_tensor =
            Tensor::<f32>::new(&[1, size, size, CHANNELS as u64]).with_values(input)?;

        let inner = self.inner.lock().map_err(|_| ModelError::Poisoned)?;

        let input_operation = inner
            .graph
            .operation_by_name(&self.input_op).map_err(tensorflow::Status::from)?
            .ok_or_else(|| ModelError::MissingOperation(self.input_op.clone()))?;
        let output_operation = inner
            .graph
            .operation_by_name(&self.output_op).map_err(tensorflow::Status::from)?
            .ok_or_else(|| ModelError::MissingOperation(self.output_op.clone()))?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_operation, 0, &input_tensor);
        let output_token = args.request_fetch(&output_operation, 0);
        inner.session.run(&mut args)?;

        let output_tensor: Tensor<f32> = args.fetch(output_token)?;
        output_tensor.first().copied().ok_or(ModelError::EmptyOutput)
    }
}

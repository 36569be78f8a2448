// src/inference.rs

use anyhow::{Context, Result};
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

/// ONNX Runtime session shared by the detector and the text recognizer.
pub struct InferenceEngine {
    session: Session,
    model_path: String,
}

impl InferenceEngine {
    pub fn new(model_path: &str, num_threads: usize) -> Result<Self> {
        info!("Loading ONNX model: {}", model_path);

        #[allow(unused_mut)]
        let mut session_builder = Session::builder()?;

        #[cfg(feature = "cuda")]
        {
            info!("Enabling CUDA execution provider");
            session_builder = session_builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()])?;
        }

        let session = session_builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads.max(1))?
            .with_inter_threads(1)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load model {}", model_path))?;

        Ok(Self {
            session,
            model_path: model_path.to_string(),
        })
    }

    /// Run a single NCHW float tensor through the model and return the first
    /// output as `(shape, data)`.
    pub fn infer(&mut self, shape: [usize; 4], input: Vec<f32>) -> Result<(Vec<i64>, Vec<f32>)> {
        debug!("Running inference on {} with input {:?}", self.model_path, shape);

        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs![input_value])?;

        let output = &outputs[0];
        let (output_shape, data_slice) = output.try_extract_tensor::<f32>()?;

        Ok((output_shape.to_vec(), data_slice.to_vec()))
    }
}

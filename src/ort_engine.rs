//! ONNX Runtime adapter for the engine capability interface.
//!
//! Targets detection models exported with the decoupled
//! coordinates/confidence head (for example Ultralytics exports with NMS
//! baked in), which matches the tensor contract the decoder expects. The
//! model file is compiled once at load time; prediction is synchronous.
//!
//! Scalar threshold slots are not declared: ONNX exports of this family
//! bake thresholds into the graph, so the invoker has nothing to forward.

use std::path::Path;

use ndarray::Axis;
use ort::{GraphOptimizationLevel, Session};
use tracing::info;

use crate::engine::{FeatureSet, InferenceEngine, ModelInputSpec, ModelLoader, RawOutput};
use crate::error::{InferenceError, LoadError};
use crate::preprocess::chw_tensor;

pub struct OrtEngine {
    session: Session,
    spec: ModelInputSpec,
}

impl InferenceEngine for OrtEngine {
    fn input_spec(&self) -> &ModelInputSpec {
        &self.spec
    }

    fn predict(&self, features: &FeatureSet<'_>) -> Result<RawOutput, InferenceError> {
        let tensor = chw_tensor(features.image);
        let outputs = self
            .session
            .run(
                ort::inputs![features.image_name => tensor.view()]
                    .map_err(|e| InferenceError::new(e.to_string()))?,
            )
            .map_err(|e| InferenceError::new(e.to_string()))?;

        let mut raw = RawOutput::new();
        for name in [&self.spec.coordinates_output, &self.spec.confidence_output] {
            let value = outputs
                .get(name.as_str())
                .ok_or_else(|| InferenceError::new(format!("model emitted no `{name}` output")))?;
            let mut tensor = value
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::new(e.to_string()))?
                .view()
                .into_owned();
            // Drop a leading batch dimension of one.
            if tensor.ndim() == 3 && tensor.shape()[0] == 1 {
                tensor = tensor.index_axis(Axis(0), 0).to_owned();
            }
            raw.insert(name.clone(), tensor);
        }
        Ok(raw)
    }
}

/// Loads an ONNX model file into an [`OrtEngine`]. The input spec (image
/// geometry and tensor names) comes from the caller, since ONNX metadata
/// does not carry the pixel-format contract.
pub struct OrtLoader {
    pub spec: ModelInputSpec,
    pub intra_threads: usize,
}

impl Default for OrtLoader {
    fn default() -> Self {
        Self {
            spec: ModelInputSpec {
                iou_input: None,
                confidence_input: None,
                image_input: "images".to_string(),
                width: 640,
                height: 640,
                ..ModelInputSpec::default()
            },
            intra_threads: 4,
        }
    }
}

impl ModelLoader for OrtLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceEngine>, LoadError> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(self.intra_threads))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| LoadError::new(e.to_string()))?;
        info!(model = %path.display(), "onnx session ready");
        Ok(Box::new(OrtEngine {
            session,
            spec: self.spec.clone(),
        }))
    }
}

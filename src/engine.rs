//! Capability interface over the external inference engine.
//!
//! The core never touches a concrete runtime type: it sees a loaded model as
//! something that exposes an input spec and answers predictions. Adapters
//! (the `ort` module, the synthetic engine below) implement [`InferenceEngine`]
//! over whatever backend actually runs the network.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ndarray::{Array2, ArrayD};

use crate::error::{InferenceError, LoadError};
use crate::frame::PixelFormat;
use crate::pool::PixelBuffer;

/// Immutable descriptor of what the loaded model expects and produces.
/// Obtained once at load time and shared read-only by every invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputSpec {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Named slot receiving the prepared image buffer.
    pub image_input: String,
    /// Optional scalar threshold slots. `None` means the model does not
    /// declare the slot and nothing is forwarded.
    pub iou_input: Option<String>,
    pub confidence_input: Option<String>,
    /// Named output tensors the decoder reads.
    pub coordinates_output: String,
    pub confidence_output: String,
}

impl Default for ModelInputSpec {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb8,
            width: 416,
            height: 416,
            image_input: "image".to_string(),
            iou_input: Some("iouThreshold".to_string()),
            confidence_input: Some("confidenceThreshold".to_string()),
            coordinates_output: "coordinates".to_string(),
            confidence_output: "confidence".to_string(),
        }
    }
}

/// Named-feature input set for a single prediction: the prepared image plus
/// any scalar thresholds the model declares.
pub struct FeatureSet<'a> {
    pub image_name: &'a str,
    pub image: &'a PixelBuffer,
    pub scalars: Vec<(&'a str, f32)>,
}

/// Raw engine result: named output tensors. The decoder pulls the
/// coordinates and confidence tensors out by name.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    tensors: HashMap<String, ArrayD<f32>>,
}

impl RawOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn tensor(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(name)
    }
}

/// A loaded model, ready to predict. Implementations must be callable from
/// the pipeline worker thread; prediction is synchronous per call.
pub trait InferenceEngine: Send + Sync {
    fn input_spec(&self) -> &ModelInputSpec;

    fn predict(&self, features: &FeatureSet<'_>) -> Result<RawOutput, InferenceError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for std::sync::Arc<E> {
    fn input_spec(&self) -> &ModelInputSpec {
        (**self).input_spec()
    }

    fn predict(&self, features: &FeatureSet<'_>) -> Result<RawOutput, InferenceError> {
        (**self).predict(features)
    }
}

/// Loads and compiles a model file into an engine. May take seconds; called
/// once at startup.
pub trait ModelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceEngine>, LoadError>;
}

/// Deterministic in-process engine: answers every prediction with a canned
/// output after an optional artificial latency.
///
/// Used by the `simulate` binary and by the pipeline tests, which need an
/// engine slower than the frame cadence to provoke backpressure.
pub struct SyntheticEngine {
    spec: ModelInputSpec,
    latency: Duration,
    coordinates: Array2<f32>,
    confidence: Array2<f32>,
    invocations: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl SyntheticEngine {
    pub fn new(spec: ModelInputSpec, latency: Duration) -> Self {
        // One mid-frame candidate over two classes by default.
        Self::with_output(
            spec,
            latency,
            vec![[0.5, 0.5, 0.2, 0.4]],
            vec![vec![0.1, 0.9]],
        )
    }

    pub fn with_output(
        spec: ModelInputSpec,
        latency: Duration,
        boxes: Vec<[f32; 4]>,
        scores: Vec<Vec<f32>>,
    ) -> Self {
        let n = boxes.len();
        let c = scores.first().map_or(0, Vec::len);
        let coordinates =
            Array2::from_shape_vec((n, 4), boxes.into_iter().flatten().collect()).unwrap();
        let rows = scores.len();
        let confidence =
            Array2::from_shape_vec((rows, c), scores.into_iter().flatten().collect()).unwrap();
        Self {
            spec,
            latency,
            coordinates,
            confidence,
            invocations: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
        }
    }

    /// Number of predictions served so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently running predictions observed. The
    /// pipeline contract says this never exceeds one.
    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for SyntheticEngine {
    fn input_spec(&self) -> &ModelInputSpec {
        &self.spec
    }

    fn predict(&self, features: &FeatureSet<'_>) -> Result<RawOutput, InferenceError> {
        let image = features.image;
        if image.width() != self.spec.width || image.height() != self.spec.height {
            return Err(InferenceError::new(format!(
                "input is {}x{}, model expects {}x{}",
                image.width(),
                image.height(),
                self.spec.width,
                self.spec.height
            )));
        }
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let mut output = RawOutput::new();
        output.insert(
            self.spec.coordinates_output.clone(),
            self.coordinates.clone().into_dyn(),
        );
        output.insert(
            self.spec.confidence_output.clone(),
            self.confidence.clone().into_dyn(),
        );
        Ok(output)
    }
}

/// Loader producing [`SyntheticEngine`]s; the path is ignored.
pub struct SyntheticLoader {
    pub spec: ModelInputSpec,
    pub latency: Duration,
}

impl ModelLoader for SyntheticLoader {
    fn load(&self, _path: &Path) -> Result<Box<dyn InferenceEngine>, LoadError> {
        Ok(Box::new(SyntheticEngine::new(
            self.spec.clone(),
            self.latency,
        )))
    }
}

//! Real-time on-device video-frame object detection.
//!
//! A continuous stream of camera frames flows through preprocess ->
//! inference -> decode, and the latest result is published for a renderer
//! running on its own cadence. The frame source is never blocked: when
//! inference falls behind, newly arrived frames are dropped, not queued.

pub mod config; // pipeline tunables + CLI args
pub mod decode; // raw tensors -> typed detections
pub mod engine; // inference engine capability interface
pub mod error; // typed error taxonomy
pub mod frame; // raw frames, orientation, rotation table
pub mod invoke; // single wrapped engine call
pub mod overlay; // normalized boxes -> viewport pixels
pub mod pipeline; // per-frame orchestrator
pub mod pool; // bounded pixel buffer pool
pub mod preprocess; // convert / rotate / crop-and-scale
pub mod report; // structured fault reporting

#[cfg(feature = "ort")]
pub mod ort_engine;

pub use crate::config::{Args, PipelineConfig, ScalarParams};
pub use crate::decode::{Decoder, Detection, NormalizedBox};
pub use crate::engine::{
    FeatureSet, InferenceEngine, ModelInputSpec, ModelLoader, RawOutput, SyntheticEngine,
    SyntheticLoader,
};
pub use crate::error::{
    ConversionError, DecodeError, FrameError, InferenceError, LoadError, PipelineFault,
};
pub use crate::frame::{rotation_for, Orientation, PixelFormat, RawFrame, Resolution, Rotation};
pub use crate::overlay::{map_detections, map_frame, Viewport, ViewportBox};
pub use crate::pipeline::{
    spawn, FrameInlet, FrameOutcome, FrameResult, Phase, Pipeline, PipelineStats,
};
pub use crate::pool::{ExhaustionPolicy, PixelBuffer, PixelBufferPool, PooledBuffer};
pub use crate::preprocess::{PreparedInput, Preprocessor};
pub use crate::report::{CollectingSink, FaultReport, FaultSink, TracingSink};

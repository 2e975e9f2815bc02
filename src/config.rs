//! Pipeline tunables and the CLI argument surface of the demo binaries.

use clap::Parser;

use crate::pool::ExhaustionPolicy;

/// Scalar thresholds forwarded to the model, unchanged, when the model
/// declares the matching input slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarParams {
    pub iou_threshold: f32,
    pub confidence_threshold: f32,
}

impl Default for ScalarParams {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            confidence_threshold: 0.3,
        }
    }
}

/// Per-instance pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub scalars: ScalarParams,
    /// Destination buffers kept by the preprocessor pool.
    pub pool_capacity: usize,
    /// What an acquire does when every pool buffer is in flight.
    pub exhaustion: ExhaustionPolicy,
    /// Consecutive decode failures tolerated before the pipeline is
    /// declared mismatched with the model and halted.
    pub decode_failure_limit: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scalars: ScalarParams::default(),
            pool_capacity: 10,
            exhaustion: ExhaustionPolicy::FailFast,
            decode_failure_limit: 30,
        }
    }
}

/// Command-line arguments shared by the demo binaries.
#[derive(Parser, Debug, Clone)]
#[command(name = "framesight")]
pub struct Args {
    /// Path to the model file (ONNX for the `detect` binary).
    #[arg(long, default_value = "")]
    pub model: String,

    /// IoU threshold forwarded to the model.
    #[arg(long, default_value_t = 0.5)]
    pub iou: f32,

    /// Confidence threshold forwarded to the model.
    #[arg(long, default_value_t = 0.3)]
    pub conf: f32,

    /// Preprocessor pool capacity.
    #[arg(long, default_value_t = 10)]
    pub pool: usize,

    /// Frames delivered per second by the synthetic source.
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// Frames to deliver before exiting (simulate binary).
    #[arg(long, default_value_t = 120)]
    pub frames: u64,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            scalars: ScalarParams {
                iou_threshold: self.iou,
                confidence_threshold: self.conf,
            },
            pool_capacity: self.pool,
            ..PipelineConfig::default()
        }
    }
}

//! Error taxonomy for the detection pipeline.
//!
//! Per-frame errors (`ConversionError`, `InferenceError`, `DecodeError`) are
//! recoverable: the orchestrator reports them and keeps the previously
//! published result. `LoadError` is fatal at startup, and a `DecodeError`
//! recurring on every frame escalates to `PipelineFault::DecoderMismatch`.

use thiserror::Error;

/// Preprocessing failure: the raw frame could not be converted into the
/// buffer the model requires.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("unsupported source pixel format {0:?}")]
    UnsupportedFormat(crate::frame::PixelFormat),

    #[error("source frame data is {actual} bytes, format requires {expected}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("buffer pool exhausted ({capacity} buffers in flight)")]
    PoolExhausted { capacity: usize },

    #[error("source frame has zero dimension {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },
}

/// The engine reported a failure while executing a prediction.
#[derive(Debug, Error)]
#[error("inference failed: {reason}")]
pub struct InferenceError {
    pub reason: String,
}

impl InferenceError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The engine's raw output could not be interpreted as detections.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("missing output tensor `{0}`")]
    MissingOutput(String),

    #[error("tensor `{name}` has rank {rank}, expected 2")]
    BadRank { name: String, rank: usize },

    #[error("coordinates tensor has {cols} columns, expected 4")]
    BadCoordinateWidth { cols: usize },

    #[error("coordinates rows ({coords}) and confidence rows ({scores}) differ")]
    RowCountMismatch { coords: usize, scores: usize },

    #[error("confidence tensor declares zero classes")]
    NoClasses,

    #[error("non-finite value in candidate row {row}")]
    NonFinite { row: usize },
}

/// The model failed to load or compile. Fatal: the pipeline never leaves
/// the idle state.
#[derive(Debug, Error)]
#[error("model load failed: {reason}")]
pub struct LoadError {
    pub reason: String,
}

impl LoadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Terminal pipeline faults. Once raised, the orchestrator stops accepting
/// frames and surfaces "pipeline unavailable" instead of a frozen overlay.
#[derive(Debug, Error)]
pub enum PipelineFault {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("decoder/model mismatch: {consecutive} consecutive decode failures, last: {last}")]
    DecoderMismatch {
        consecutive: u32,
        #[source]
        last: DecodeError,
    },
}

/// Any single-frame failure, as seen by the orchestrator.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl FrameError {
    /// Stable label used in structured fault reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::Conversion(_) => "conversion",
            FrameError::Inference(_) => "inference",
            FrameError::Decode(_) => "decode",
        }
    }
}

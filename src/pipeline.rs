//! Frame pipeline orchestrator.
//!
//! Sequences preprocess -> invoke -> decode for every delivered frame and
//! owns the one piece of published state: the latest [`FrameResult`].
//!
//! State machine: idle until a model loads, then ready; exactly one frame
//! may be processing at a time. A frame arriving while one is in flight is
//! dropped, never queued: video always outruns inference on-device, and a
//! queued frame would be stale before its turn came. The frame source is
//! never blocked and an in-flight prediction is never cancelled.
//!
//! Per-frame failures become fault reports and the previous result stays
//! published. A model load failure, or a decode failure recurring past the
//! configured streak, is fatal: the pipeline stops admitting frames.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::bounded;
use tracing::info;

use crate::config::PipelineConfig;
use crate::decode::{Decoder, Detection};
use crate::engine::{InferenceEngine, ModelLoader};
use crate::error::{FrameError, LoadError, PipelineFault};
use crate::frame::{Orientation, RawFrame};
use crate::invoke;
use crate::preprocess::Preprocessor;
use crate::report::{FaultReport, FaultSink, TracingSink};

/// The published, externally observed artifact of one processed frame.
/// Immutable once published; readers see either the previous complete
/// result or this one, never a partial state.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub frame_id: u64,
    pub detections: Vec<Detection>,
    pub inference: Duration,
    pub orientation: Option<Orientation>,
}

impl FrameResult {
    /// Inference throughput implied by this frame alone.
    pub fn inference_fps(&self) -> f64 {
        let secs = self.inference.as_secs_f64();
        if secs > 0.0 {
            1.0 / secs
        } else {
            0.0
        }
    }
}

/// Observable pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No model loaded yet.
    Idle,
    /// Model loaded, waiting for a frame.
    Ready,
    /// One frame in flight.
    Processing,
    /// Terminal fault; no further frames are admitted.
    Faulted,
}

/// What happened to one delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Processed and published.
    Processed,
    /// Claimed and handed to the worker thread (inlet delivery).
    Accepted,
    /// Processing failed; the frame was dropped and the previous result
    /// kept.
    Failed,
    /// A frame was already in flight; this one was dropped (backpressure).
    DroppedBusy,
    /// The pipeline is idle or faulted.
    NotReady,
}

/// Intake and processing counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub delivered: u64,
    pub processed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub rejected: u64,
}

/// A failed frame plus the inference duration, when the failure happened
/// after predict returned.
struct FrameFailure {
    error: FrameError,
    inference: Option<Duration>,
}

impl FrameFailure {
    fn before_predict(error: impl Into<FrameError>) -> Self {
        Self {
            error: error.into(),
            inference: None,
        }
    }
}

struct Loaded {
    engine: Box<dyn InferenceEngine>,
    preprocessor: Preprocessor,
    decoder: Decoder,
}

struct Inner {
    config: PipelineConfig,
    sink: Arc<dyn FaultSink>,
    loaded: RwLock<Option<Loaded>>,
    busy: AtomicBool,
    faulted: AtomicBool,
    fault: Mutex<Option<PipelineFault>>,
    latest: Mutex<Option<Arc<FrameResult>>>,
    version: AtomicU64,
    decode_streak: AtomicU32,
    delivered: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

/// One pipeline instance: model handle, buffer pool, last published result.
/// Instances share nothing, so two models mean two pipelines.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(config: PipelineConfig, sink: Arc<dyn FaultSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sink,
                loaded: RwLock::new(None),
                busy: AtomicBool::new(false),
                faulted: AtomicBool::new(false),
                fault: Mutex::new(None),
                latest: Mutex::new(None),
                version: AtomicU64::new(0),
                decode_streak: AtomicU32::new(0),
                delivered: AtomicU64::new(0),
                processed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
        }
    }

    /// Load the model and move idle -> ready. A loader failure is fatal,
    /// reported exactly once, and leaves the pipeline refusing frames.
    pub fn load_model(
        &self,
        loader: &dyn ModelLoader,
        path: &std::path::Path,
    ) -> Result<(), LoadError> {
        let inner = &self.inner;
        if inner.faulted.load(Ordering::SeqCst) {
            return Err(LoadError::new("pipeline faulted"));
        }
        if inner.loaded.read().unwrap().is_some() {
            return Err(LoadError::new("model already loaded"));
        }
        match loader.load(path) {
            Ok(engine) => {
                let spec = engine.input_spec().clone();
                info!(
                    width = spec.width,
                    height = spec.height,
                    format = ?spec.pixel_format,
                    "model loaded"
                );
                let preprocessor =
                    Preprocessor::new(spec, inner.config.pool_capacity, inner.config.exhaustion);
                let decoder = Decoder::new(preprocessor.spec());
                *inner.loaded.write().unwrap() = Some(Loaded {
                    engine,
                    preprocessor,
                    decoder,
                });
                Ok(())
            }
            Err(err) => {
                inner
                    .sink
                    .report(&FaultReport::new("load", true, err.to_string()));
                *inner.fault.lock().unwrap() = Some(PipelineFault::Load(LoadError::new(
                    err.reason.clone(),
                )));
                inner.faulted.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    pub fn phase(&self) -> Phase {
        let inner = &self.inner;
        if inner.faulted.load(Ordering::SeqCst) {
            Phase::Faulted
        } else if inner.loaded.read().unwrap().is_none() {
            Phase::Idle
        } else if inner.busy.load(Ordering::SeqCst) {
            Phase::Processing
        } else {
            Phase::Ready
        }
    }

    /// The terminal fault, if one occurred.
    pub fn fault(&self) -> Option<String> {
        self.inner
            .fault
            .lock()
            .unwrap()
            .as_ref()
            .map(|f| f.to_string())
    }

    /// Latest published result, if any frame has completed yet.
    pub fn latest(&self) -> Option<Arc<FrameResult>> {
        self.inner.latest.lock().unwrap().clone()
    }

    /// Publication counter: bumps once per published result, so a renderer
    /// on its own cadence can cheaply detect staleness.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PipelineStats {
        let inner = &self.inner;
        PipelineStats {
            delivered: inner.delivered.load(Ordering::SeqCst),
            processed: inner.processed.load(Ordering::SeqCst),
            failed: inner.failed.load(Ordering::SeqCst),
            dropped: inner.dropped.load(Ordering::SeqCst),
            rejected: inner.rejected.load(Ordering::SeqCst),
        }
    }

    /// Deliver one frame and process it on the calling thread. The busy
    /// gate still applies, so concurrent callers get drop-newest behavior.
    pub fn submit(&self, frame: RawFrame) -> FrameOutcome {
        match self.admit() {
            Ok(frame_id) => self.run_claimed(frame_id, frame),
            Err(outcome) => outcome,
        }
    }

    /// Account for one delivered frame and try to claim the processing
    /// slot. Returns the frame sequence number on success.
    fn admit(&self) -> Result<u64, FrameOutcome> {
        let inner = &self.inner;
        let frame_id = inner.delivered.fetch_add(1, Ordering::SeqCst) + 1;
        if inner.faulted.load(Ordering::SeqCst) || inner.loaded.read().unwrap().is_none() {
            inner.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(FrameOutcome::NotReady);
        }
        if inner
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            inner.dropped.fetch_add(1, Ordering::SeqCst);
            return Err(FrameOutcome::DroppedBusy);
        }
        Ok(frame_id)
    }

    /// Run the full chain for a frame whose processing slot is already
    /// claimed, then release the slot.
    fn run_claimed(&self, frame_id: u64, frame: RawFrame) -> FrameOutcome {
        let inner = &self.inner;
        let outcome = match self.process(frame_id, &frame) {
            Ok(result) => {
                inner.decode_streak.store(0, Ordering::SeqCst);
                inner.processed.fetch_add(1, Ordering::SeqCst);
                *inner.latest.lock().unwrap() = Some(Arc::new(result));
                inner.version.fetch_add(1, Ordering::SeqCst);
                FrameOutcome::Processed
            }
            Err(failure) => {
                inner.failed.fetch_add(1, Ordering::SeqCst);
                let err = failure.error;
                let mut report =
                    FaultReport::new(err.kind(), false, err.to_string()).with_frame(frame_id);
                if let Some(inference) = failure.inference {
                    report = report.with_inference(inference);
                }
                inner.sink.report(&report);
                if let FrameError::Decode(decode_err) = err {
                    let streak = inner.decode_streak.fetch_add(1, Ordering::SeqCst) + 1;
                    if streak >= inner.config.decode_failure_limit {
                        let fault = PipelineFault::DecoderMismatch {
                            consecutive: streak,
                            last: decode_err,
                        };
                        inner
                            .sink
                            .report(&FaultReport::new("decoder-mismatch", true, fault.to_string()));
                        *inner.fault.lock().unwrap() = Some(fault);
                        inner.faulted.store(true, Ordering::SeqCst);
                    }
                } else {
                    inner.decode_streak.store(0, Ordering::SeqCst);
                }
                FrameOutcome::Failed
            }
        };
        inner.busy.store(false, Ordering::SeqCst);
        outcome
    }

    fn process(&self, frame_id: u64, frame: &RawFrame) -> Result<FrameResult, FrameFailure> {
        let guard = self.inner.loaded.read().unwrap();
        let loaded = guard.as_ref().expect("claimed only when loaded");

        let input = loaded
            .preprocessor
            .prepare(frame)
            .map_err(FrameFailure::before_predict)?;
        let invocation = invoke::invoke(loaded.engine.as_ref(), &input, &self.inner.config.scalars)
            .map_err(FrameFailure::before_predict)?;
        drop(input); // buffer back to the pool before decode
        let detections = loaded
            .decoder
            .decode(&invocation.output)
            .map_err(|err| FrameFailure {
                error: FrameError::Decode(err),
                inference: Some(invocation.duration),
            })?;

        Ok(FrameResult {
            frame_id,
            detections,
            inference: invocation.duration,
            orientation: frame.orientation,
        })
    }
}

/// Registered delivery target for an external frame source. `on_frame`
/// returns immediately: it either claims the processing slot and hands the
/// frame to the worker thread, or drops the frame.
pub struct FrameInlet {
    pipeline: Pipeline,
    tx: crossbeam_channel::Sender<(u64, RawFrame)>,
}

impl FrameInlet {
    pub fn on_frame(&self, frame: RawFrame) -> FrameOutcome {
        match self.pipeline.admit() {
            Ok(frame_id) => {
                // The slot is claimed, so the bounded channel always has
                // room; a send failure means the worker is gone.
                if self.tx.send((frame_id, frame)).is_err() {
                    self.pipeline.inner.busy.store(false, Ordering::SeqCst);
                    return FrameOutcome::NotReady;
                }
                FrameOutcome::Accepted
            }
            Err(outcome) => outcome,
        }
    }
}

/// Spawn the processing worker and return the inlet to register with the
/// frame source. Dropping the inlet shuts the worker down.
pub fn spawn(pipeline: Pipeline) -> (FrameInlet, JoinHandle<()>) {
    let (tx, rx) = bounded::<(u64, RawFrame)>(1);
    let worker_pipeline = pipeline.clone();
    let handle = std::thread::spawn(move || {
        while let Ok((frame_id, frame)) = rx.recv() {
            worker_pipeline.run_claimed(frame_id, frame);
        }
    });
    (FrameInlet { pipeline, tx }, handle)
}

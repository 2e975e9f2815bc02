//! Inference invoker: one wrapped call into the engine.
//!
//! Assembles the named-feature set (prepared image plus whatever scalar
//! threshold slots the model declares) and times the prediction. The clock
//! runs strictly around `predict`; preprocessing is never included. Engine
//! failures surface as `InferenceError` and are never retried here, since a
//! failed frame is already stale by the time a retry could run.

use std::time::{Duration, Instant};

use crate::config::ScalarParams;
use crate::engine::{FeatureSet, InferenceEngine, RawOutput};
use crate::error::InferenceError;
use crate::preprocess::PreparedInput;

/// One completed engine call.
pub struct Invocation {
    pub output: RawOutput,
    pub duration: Duration,
}

/// Run a single prediction over a prepared input.
pub fn invoke(
    engine: &dyn InferenceEngine,
    input: &PreparedInput,
    scalars: &ScalarParams,
) -> Result<Invocation, InferenceError> {
    let spec = engine.input_spec();

    let mut scalar_features = Vec::with_capacity(2);
    if let Some(name) = spec.iou_input.as_deref() {
        scalar_features.push((name, scalars.iou_threshold));
    }
    if let Some(name) = spec.confidence_input.as_deref() {
        scalar_features.push((name, scalars.confidence_threshold));
    }

    let features = FeatureSet {
        image_name: &spec.image_input,
        image: input.buffer(),
        scalars: scalar_features,
    };

    let start = Instant::now();
    let output = engine.predict(&features)?;
    let duration = start.elapsed();

    Ok(Invocation { output, duration })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ModelInputSpec, SyntheticEngine};
    use crate::frame::{PixelFormat, RawFrame};
    use crate::pool::ExhaustionPolicy;
    use crate::preprocess::Preprocessor;
    use std::sync::{Arc, Mutex};

    fn spec() -> ModelInputSpec {
        ModelInputSpec {
            pixel_format: PixelFormat::Rgb8,
            width: 2,
            height: 2,
            ..ModelInputSpec::default()
        }
    }

    fn prepared(pre: &Preprocessor) -> PreparedInput {
        let frame = RawFrame::new(
            Arc::new(vec![0u8; 2 * 2 * 3]),
            PixelFormat::Rgb8,
            2,
            2,
            None,
        );
        pre.prepare(&frame).unwrap()
    }

    /// Engine that records the scalars it was handed.
    struct Recording {
        spec: ModelInputSpec,
        seen: Mutex<Vec<(String, f32)>>,
    }

    impl InferenceEngine for Recording {
        fn input_spec(&self) -> &ModelInputSpec {
            &self.spec
        }

        fn predict(&self, features: &FeatureSet<'_>) -> Result<RawOutput, InferenceError> {
            let mut seen = self.seen.lock().unwrap();
            *seen = features
                .scalars
                .iter()
                .map(|(n, v)| (n.to_string(), *v))
                .collect();
            Ok(RawOutput::new())
        }
    }

    #[test]
    fn declared_scalars_pass_through_unchanged() {
        let engine = Recording {
            spec: spec(),
            seen: Mutex::new(vec![]),
        };
        let pre = Preprocessor::new(spec(), 1, ExhaustionPolicy::FailFast);
        let input = prepared(&pre);
        let params = ScalarParams {
            iou_threshold: 0.41,
            confidence_threshold: 0.27,
        };
        invoke(&engine, &input, &params).unwrap();
        let seen = engine.seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("iouThreshold".to_string(), 0.41),
                ("confidenceThreshold".to_string(), 0.27)
            ]
        );
    }

    #[test]
    fn undeclared_scalars_are_not_forwarded() {
        let engine = Recording {
            spec: ModelInputSpec {
                iou_input: None,
                confidence_input: None,
                ..spec()
            },
            seen: Mutex::new(vec![("stale".to_string(), 0.0)]),
        };
        let pre = Preprocessor::new(spec(), 1, ExhaustionPolicy::FailFast);
        let input = prepared(&pre);
        invoke(&engine, &input, &ScalarParams::default()).unwrap();
        assert!(engine.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn duration_covers_the_prediction() {
        let engine = SyntheticEngine::new(spec(), Duration::from_millis(25));
        let pre = Preprocessor::new(spec(), 1, ExhaustionPolicy::FailFast);
        let input = prepared(&pre);
        let inv = invoke(&engine, &input, &ScalarParams::default()).unwrap();
        assert!(inv.duration >= Duration::from_millis(25));
    }
}

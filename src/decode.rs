//! Detection decoder: raw output tensors to typed detections.
//!
//! The engine hands back a `[N, 4]` coordinates tensor (center-x, center-y,
//! width, height, normalized to [0, 1]) and a `[N, C]` confidence tensor.
//! Each row becomes one detection: the box converts to top-left-origin form
//! and the class is the argmax of the confidence row.
//!
//! Axis convention: boxes are image-top-down, `y = cy - h/2`. This matches
//! the model export convention where row 0 of the image is y = 0; the
//! bottom-up variant (`y = 1 - cy - h/2`) is deliberately not used.
//!
//! This is a plain O(N*C) scan. No sorting and no non-max suppression
//! happen here; suppression belongs to the model via its threshold inputs.

use ndarray::ArrayD;

use crate::engine::{ModelInputSpec, RawOutput};
use crate::error::DecodeError;

/// Axis-aligned box in normalized coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One decoded candidate: class, score, normalized box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: NormalizedBox,
}

/// Decodes raw outputs for one loaded model. Holds only the output tensor
/// names from the model spec.
#[derive(Debug, Clone)]
pub struct Decoder {
    coordinates_name: String,
    confidence_name: String,
}

impl Decoder {
    pub fn new(spec: &ModelInputSpec) -> Self {
        Self {
            coordinates_name: spec.coordinates_output.clone(),
            confidence_name: spec.confidence_output.clone(),
        }
    }

    pub fn decode(&self, output: &RawOutput) -> Result<Vec<Detection>, DecodeError> {
        let coords = require_matrix(output, &self.coordinates_name)?;
        let scores = require_matrix(output, &self.confidence_name)?;

        let n = coords.shape()[0];
        if coords.shape()[1] != 4 {
            return Err(DecodeError::BadCoordinateWidth {
                cols: coords.shape()[1],
            });
        }
        if scores.shape()[0] != n {
            return Err(DecodeError::RowCountMismatch {
                coords: n,
                scores: scores.shape()[0],
            });
        }
        let c = scores.shape()[1];
        if c == 0 && n > 0 {
            return Err(DecodeError::NoClasses);
        }

        let mut detections = Vec::with_capacity(n);
        for i in 0..n {
            let (cx, cy, w, h) = (
                coords[[i, 0]],
                coords[[i, 1]],
                coords[[i, 2]],
                coords[[i, 3]],
            );
            if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
                return Err(DecodeError::NonFinite { row: i });
            }
            let w = w.max(0.0);
            let h = h.max(0.0);

            let (class_id, confidence) = argmax_row(scores, i, c);
            if !confidence.is_finite() {
                return Err(DecodeError::NonFinite { row: i });
            }

            detections.push(Detection {
                class_id,
                confidence,
                bbox: NormalizedBox {
                    x: cx - w / 2.0,
                    y: cy - h / 2.0,
                    width: w,
                    height: h,
                },
            });
        }
        Ok(detections)
    }
}

fn require_matrix<'a>(
    output: &'a RawOutput,
    name: &str,
) -> Result<&'a ArrayD<f32>, DecodeError> {
    let tensor = output
        .tensor(name)
        .ok_or_else(|| DecodeError::MissingOutput(name.to_string()))?;
    if tensor.ndim() != 2 {
        return Err(DecodeError::BadRank {
            name: name.to_string(),
            rank: tensor.ndim(),
        });
    }
    Ok(tensor)
}

/// Index and value of the row maximum. A linear scan keeping the first
/// maximum found, so ties resolve to the lowest index.
fn argmax_row(scores: &ArrayD<f32>, row: usize, cols: usize) -> (usize, f32) {
    let mut best_id = 0;
    let mut best = scores[[row, 0]];
    for j in 1..cols {
        let v = scores[[row, j]];
        if v > best {
            best = v;
            best_id = j;
        }
    }
    (best_id, best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn output(coords: Vec<[f32; 4]>, scores: Vec<Vec<f32>>) -> (RawOutput, Decoder) {
        let spec = ModelInputSpec::default();
        let n = coords.len();
        let c = scores.first().map_or(0, Vec::len);
        let mut out = RawOutput::new();
        out.insert(
            "coordinates",
            Array2::from_shape_vec((n, 4), coords.into_iter().flatten().collect())
                .unwrap()
                .into_dyn(),
        );
        out.insert(
            "confidence",
            Array2::from_shape_vec((n, c), scores.into_iter().flatten().collect())
                .unwrap()
                .into_dyn(),
        );
        (out, Decoder::new(&spec))
    }

    #[test]
    fn decodes_single_candidate() {
        let (out, decoder) = output(vec![[0.5, 0.5, 0.2, 0.4]], vec![vec![0.1, 0.9]]);
        let dets = decoder.decode(&out).unwrap();
        assert_eq!(dets.len(), 1);
        let det = dets[0];
        assert_eq!(det.class_id, 1);
        assert!((det.confidence - 0.9).abs() < 1e-6);
        assert!((det.bbox.x - 0.4).abs() < 1e-6);
        assert!((det.bbox.y - 0.3).abs() < 1e-6);
        assert!((det.bbox.width - 0.2).abs() < 1e-6);
        assert!((det.bbox.height - 0.4).abs() < 1e-6);
    }

    #[test]
    fn argmax_ties_resolve_to_lowest_index() {
        let (out, decoder) = output(
            vec![[0.5, 0.5, 0.1, 0.1]],
            vec![vec![0.2, 0.7, 0.7, 0.1]],
        );
        let dets = decoder.decode(&out).unwrap();
        assert_eq!(dets[0].class_id, 1);
    }

    #[test]
    fn every_row_matches_brute_force_max() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let n = 40;
        let c = 13;
        let coords: Vec<[f32; 4]> = (0..n)
            .map(|_| [rng.gen(), rng.gen(), rng.gen(), rng.gen()])
            .collect();
        let scores: Vec<Vec<f32>> = (0..n)
            .map(|_| (0..c).map(|_| rng.gen()).collect())
            .collect();
        let (out, decoder) = output(coords, scores.clone());
        let dets = decoder.decode(&out).unwrap();
        assert_eq!(dets.len(), n);
        for (det, row) in dets.iter().zip(&scores) {
            let best = row.iter().cloned().fold(f32::MIN, f32::max);
            assert!(det.class_id < c);
            assert_eq!(det.confidence, best);
            assert_eq!(det.confidence, row[det.class_id]);
        }
    }

    #[test]
    fn row_count_mismatch_is_an_error() {
        let spec = ModelInputSpec::default();
        let mut out = RawOutput::new();
        out.insert("coordinates", Array2::<f32>::zeros((3, 4)).into_dyn());
        out.insert("confidence", Array2::<f32>::zeros((2, 5)).into_dyn());
        assert!(matches!(
            Decoder::new(&spec).decode(&out),
            Err(DecodeError::RowCountMismatch {
                coords: 3,
                scores: 2
            })
        ));
    }

    #[test]
    fn missing_tensor_is_an_error() {
        let spec = ModelInputSpec::default();
        let mut out = RawOutput::new();
        out.insert("coordinates", Array2::<f32>::zeros((1, 4)).into_dyn());
        assert!(matches!(
            Decoder::new(&spec).decode(&out),
            Err(DecodeError::MissingOutput(name)) if name == "confidence"
        ));
    }

    #[test]
    fn wrong_rank_is_an_error() {
        let spec = ModelInputSpec::default();
        let mut out = RawOutput::new();
        out.insert("coordinates", ndarray::Array1::<f32>::zeros(4).into_dyn());
        out.insert("confidence", Array2::<f32>::zeros((1, 2)).into_dyn());
        assert!(matches!(
            Decoder::new(&spec).decode(&out),
            Err(DecodeError::BadRank { rank: 1, .. })
        ));
    }

    #[test]
    fn zero_classes_is_an_error() {
        let spec = ModelInputSpec::default();
        let mut out = RawOutput::new();
        out.insert("coordinates", Array2::<f32>::zeros((2, 4)).into_dyn());
        out.insert("confidence", Array2::<f32>::zeros((2, 0)).into_dyn());
        assert!(matches!(
            Decoder::new(&spec).decode(&out),
            Err(DecodeError::NoClasses)
        ));
    }

    #[test]
    fn non_finite_coordinates_are_an_error() {
        let (out, decoder) = output(
            vec![[0.5, f32::NAN, 0.1, 0.1]],
            vec![vec![0.2, 0.8]],
        );
        assert!(matches!(
            decoder.decode(&out),
            Err(DecodeError::NonFinite { row: 0 })
        ));
    }

    #[test]
    fn empty_output_decodes_to_no_detections() {
        let spec = ModelInputSpec::default();
        let mut out = RawOutput::new();
        out.insert("coordinates", Array2::<f32>::zeros((0, 4)).into_dyn());
        out.insert("confidence", Array2::<f32>::zeros((0, 0)).into_dyn());
        assert!(Decoder::new(&spec).decode(&out).unwrap().is_empty());
    }

    #[test]
    fn negative_extents_clamp_to_zero() {
        let (out, decoder) = output(vec![[0.5, 0.5, -0.2, 0.1]], vec![vec![1.0]]);
        let dets = decoder.decode(&out).unwrap();
        assert_eq!(dets[0].bbox.width, 0.0);
        assert!(dets[0].bbox.height > 0.0);
    }
}

//! Face-landmark model adapter

use crate::detection::{
    Detection, FaceLandmarks, EYE_LOOK_DOWN_LEFT, EYE_LOOK_DOWN_RIGHT, MOUTH_OPEN, NOSE_TIP_INDEX,
};
use crate::{PerceptionError, VideoFrame};
use serde::Deserialize;
use std::io::BufRead;
use tracing::{debug, info};

/// Opaque face-landmark model.
///
/// Returns zero or more faces for a frame. Timestamps passed in are strictly
/// increasing.
pub trait LandmarkModel: Send {
    fn detect_for_video(
        &mut self,
        frame: &VideoFrame,
        timestamp_ms: u64,
    ) -> Result<Vec<FaceLandmarks>, PerceptionError>;
}

impl<F> LandmarkModel for F
where
    F: FnMut(&VideoFrame, u64) -> Result<Vec<FaceLandmarks>, PerceptionError> + Send,
{
    fn detect_for_video(
        &mut self,
        frame: &VideoFrame,
        timestamp_ms: u64,
    ) -> Result<Vec<FaceLandmarks>, PerceptionError> {
        self(frame, timestamp_ms)
    }
}

/// Build a model from a closure
pub fn from_fn<F>(f: F) -> F
where
    F: FnMut(&VideoFrame, u64) -> Result<Vec<FaceLandmarks>, PerceptionError> + Send,
{
    f
}

/// Converts raw model output into a [`Detection`]
pub struct PerceptionAdapter<M> {
    model: M,
    last_timestamp_ms: Option<u64>,
}

impl<M: LandmarkModel> PerceptionAdapter<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            last_timestamp_ms: None,
        }
    }

    /// Run the model on one frame.
    ///
    /// Errors are transient: callers skip the frame rather than treating it
    /// as a missing face.
    pub fn detect(&mut self, frame: &VideoFrame, timestamp_ms: u64) -> Result<Detection, PerceptionError> {
        // Video-mode models reject non-increasing timestamps
        let timestamp_ms = match self.last_timestamp_ms {
            Some(last) if timestamp_ms <= last => last + 1,
            _ => timestamp_ms,
        };
        self.last_timestamp_ms = Some(timestamp_ms);

        let faces = self.model.detect_for_video(frame, timestamp_ms)?;
        let Some(face) = faces.first() else {
            return Ok(Detection::absent(timestamp_ms));
        };

        let nose = face
            .points
            .get(NOSE_TIP_INDEX)
            .ok_or(PerceptionError::MissingLandmark(NOSE_TIP_INDEX))?;

        let eye_down_avg = (face.score(EYE_LOOK_DOWN_LEFT) + face.score(EYE_LOOK_DOWN_RIGHT)) / 2.0;

        let detection = Detection {
            present: true,
            nose_x: unit(nose.x, "nose x")?,
            nose_y: unit(nose.y, "nose y")?,
            eye_down_avg: unit(eye_down_avg, "eye-down score")?,
            mouth_open: unit(face.score(MOUTH_OPEN), "mouth-open score")?,
            timestamp_ms,
        };
        debug!(
            "Detection nose=({:.2},{:.2}) eye_down={:.2} mouth={:.2}",
            detection.nose_x, detection.nose_y, detection.eye_down_avg, detection.mouth_open
        );
        Ok(detection)
    }
}

// NaN would slip past every threshold comparison
fn unit(value: f32, what: &'static str) -> Result<f32, PerceptionError> {
    if value.is_finite() {
        Ok(value.clamp(0.0, 1.0))
    } else {
        Err(PerceptionError::NonFinite(what))
    }
}

/// One line of a replay file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayRecord {
    Faces { faces: Vec<FaceLandmarks> },
    Error { error: String },
}

/// Model replaying recorded landmark results from JSON lines.
///
/// Each line is either `{"faces": [...]}` or `{"error": "..."}`.
pub struct ReplayModel {
    records: Vec<ReplayRecord>,
    cursor: usize,
    looped: bool,
}

impl ReplayModel {
    /// Parse a JSON-lines replay source
    pub fn from_reader(reader: impl BufRead, looped: bool) -> Result<Self, PerceptionError> {
        let mut records = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| PerceptionError::Replay(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .map_err(|e| PerceptionError::Replay(format!("line {}: {}", n + 1, e)))?;
            records.push(record);
        }
        info!("Loaded {} replay records", records.len());
        Ok(Self {
            records,
            cursor: 0,
            looped,
        })
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LandmarkModel for ReplayModel {
    fn detect_for_video(
        &mut self,
        _frame: &VideoFrame,
        _timestamp_ms: u64,
    ) -> Result<Vec<FaceLandmarks>, PerceptionError> {
        if self.cursor >= self.records.len() {
            if self.looped && !self.records.is_empty() {
                self.cursor = 0;
            } else {
                return Err(PerceptionError::Replay("replay exhausted".to_string()));
            }
        }
        let record = &self.records[self.cursor];
        self.cursor += 1;
        match record {
            ReplayRecord::Faces { faces } => Ok(faces.clone()),
            ReplayRecord::Error { error } => Err(PerceptionError::Inference(error.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Blendshape, Landmark};

    fn face(nose_x: f32, nose_y: f32, eye_l: f32, eye_r: f32, mouth: f32) -> FaceLandmarks {
        FaceLandmarks {
            points: vec![Landmark::default(), Landmark { x: nose_x, y: nose_y, z: 0.0 }],
            blendshapes: vec![
                Blendshape { category_name: EYE_LOOK_DOWN_LEFT.into(), score: eye_l },
                Blendshape { category_name: EYE_LOOK_DOWN_RIGHT.into(), score: eye_r },
                Blendshape { category_name: MOUTH_OPEN.into(), score: mouth },
            ],
        }
    }

    fn frame() -> VideoFrame {
        VideoFrame::filled(4, 4, [0, 0, 0], 0, 0)
    }

    #[test]
    fn test_maps_nose_and_blendshapes() {
        let mut adapter = PerceptionAdapter::new(from_fn(|_, _| {
            Ok(vec![face(0.3, 0.6, 0.5, 0.7, 0.1)])
        }));
        let d = adapter.detect(&frame(), 100).unwrap();
        assert!(d.present);
        assert_eq!(d.nose_x, 0.3);
        assert_eq!(d.nose_y, 0.6);
        assert!((d.eye_down_avg - 0.6).abs() < 1e-6);
        assert_eq!(d.mouth_open, 0.1);
    }

    #[test]
    fn test_no_faces_is_absent() {
        let mut adapter = PerceptionAdapter::new(from_fn(|_, _| Ok(vec![])));
        let d = adapter.detect(&frame(), 100).unwrap();
        assert!(!d.present);
    }

    #[test]
    fn test_timestamps_forced_increasing() {
        let mut adapter = PerceptionAdapter::new(from_fn(|_, _| Ok(vec![])));
        assert_eq!(adapter.detect(&frame(), 100).unwrap().timestamp_ms, 100);
        assert_eq!(adapter.detect(&frame(), 100).unwrap().timestamp_ms, 101);
        assert_eq!(adapter.detect(&frame(), 50).unwrap().timestamp_ms, 102);
    }

    #[test]
    fn test_truncated_mesh_is_error() {
        let mut adapter = PerceptionAdapter::new(from_fn(|_, _| {
            Ok(vec![FaceLandmarks { points: vec![Landmark::default()], blendshapes: vec![] }])
        }));
        assert!(matches!(
            adapter.detect(&frame(), 1),
            Err(PerceptionError::MissingLandmark(1))
        ));
    }

    #[test]
    fn test_non_finite_values_are_errors() {
        let mut adapter = PerceptionAdapter::new(from_fn(|_, ts| {
            Ok(vec![if ts == 1 {
                face(f32::NAN, 0.5, 0.0, 0.0, 0.0)
            } else {
                face(0.5, 0.5, 0.0, 0.0, f32::INFINITY)
            }])
        }));
        assert!(matches!(
            adapter.detect(&frame(), 1),
            Err(PerceptionError::NonFinite("nose x"))
        ));
        assert!(matches!(
            adapter.detect(&frame(), 2),
            Err(PerceptionError::NonFinite("mouth-open score"))
        ));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let mut adapter = PerceptionAdapter::new(from_fn(|_, _| {
            Ok(vec![face(1.4, -0.2, 0.0, 0.0, 2.0)])
        }));
        let d = adapter.detect(&frame(), 1).unwrap();
        assert_eq!(d.nose_x, 1.0);
        assert_eq!(d.nose_y, 0.0);
        assert_eq!(d.mouth_open, 1.0);
    }

    #[test]
    fn test_replay_model_yields_faces_and_errors() {
        let source = concat!(
            r#"{"faces":[{"points":[{"x":0,"y":0},{"x":0.5,"y":0.5}]}]}"#, "\n",
            "\n",
            r#"{"error":"gpu context lost"}"#, "\n",
            r#"{"faces":[]}"#, "\n",
        );
        let model = ReplayModel::from_reader(source.as_bytes(), false).unwrap();
        assert_eq!(model.len(), 3);

        let mut adapter = PerceptionAdapter::new(model);
        assert!(adapter.detect(&frame(), 1).unwrap().present);
        assert!(matches!(adapter.detect(&frame(), 2), Err(PerceptionError::Inference(_))));
        assert!(!adapter.detect(&frame(), 3).unwrap().present);
        assert!(matches!(adapter.detect(&frame(), 4), Err(PerceptionError::Replay(_))));
    }

    #[test]
    fn test_replay_model_loops() {
        let source = r#"{"faces":[]}"#;
        let mut model = ReplayModel::from_reader(source.as_bytes(), true).unwrap();
        for ts in 0..3 {
            assert!(model.detect_for_video(&frame(), ts).unwrap().is_empty());
        }
    }
}

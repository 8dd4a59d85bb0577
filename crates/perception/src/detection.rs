//! Landmark results and per-frame detections

use serde::{Deserialize, Serialize};

/// Index of the nose-tip point in the 478-point face mesh
pub const NOSE_TIP_INDEX: usize = 1;

/// Blendshape category: left eye looking down
pub const EYE_LOOK_DOWN_LEFT: &str = "eyeLookDownLeft";
/// Blendshape category: right eye looking down
pub const EYE_LOOK_DOWN_RIGHT: &str = "eyeLookDownRight";
/// Blendshape category: mouth open
pub const MOUTH_OPEN: &str = "mouthOpen";

/// Normalized landmark point (0-1 in image space)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

/// Blendshape score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blendshape {
    #[serde(rename = "categoryName", alias = "category_name")]
    pub category_name: String,
    pub score: f32,
}

/// Raw model output for one face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    /// Mesh points
    pub points: Vec<Landmark>,
    /// Expression scores (may be empty if the model has no blendshape head)
    #[serde(default)]
    pub blendshapes: Vec<Blendshape>,
}

impl FaceLandmarks {
    /// Score for a blendshape category, 0 when absent
    pub fn score(&self, category: &str) -> f32 {
        self.blendshapes
            .iter()
            .find(|b| b.category_name == category)
            .map(|b| b.score)
            .unwrap_or(0.0)
    }
}

/// One frame's face-presence, pose and expression reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Whether a face was found
    pub present: bool,
    /// Nose-tip horizontal position (0 = left edge, 1 = right edge)
    pub nose_x: f32,
    /// Nose-tip vertical position (0 = top, 1 = bottom)
    pub nose_y: f32,
    /// Mean of the two eye-look-down scores
    pub eye_down_avg: f32,
    /// Mouth-open score
    pub mouth_open: f32,
    /// Frame timestamp (milliseconds)
    pub timestamp_ms: u64,
}

impl Detection {
    /// A frame without a face
    pub fn absent(timestamp_ms: u64) -> Self {
        Self {
            present: false,
            nose_x: 0.0,
            nose_y: 0.0,
            eye_down_avg: 0.0,
            mouth_open: 0.0,
            timestamp_ms,
        }
    }

    /// A face looking straight at the screen
    pub fn centered(timestamp_ms: u64) -> Self {
        Self {
            present: true,
            nose_x: 0.5,
            nose_y: 0.5,
            eye_down_avg: 0.0,
            mouth_open: 0.0,
            timestamp_ms,
        }
    }

    /// Same frame with a different nose position
    pub fn with_nose(mut self, x: f32, y: f32) -> Self {
        self.nose_x = x;
        self.nose_y = y;
        self
    }

    /// Same frame with different expression scores
    pub fn with_scores(mut self, eye_down_avg: f32, mouth_open: f32) -> Self {
        self.eye_down_avg = eye_down_avg;
        self.mouth_open = mouth_open;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_blendshape_scores_zero() {
        let face = FaceLandmarks {
            points: vec![Landmark::default(); 2],
            blendshapes: vec![Blendshape {
                category_name: MOUTH_OPEN.to_string(),
                score: 0.3,
            }],
        };
        assert_eq!(face.score(MOUTH_OPEN), 0.3);
        assert_eq!(face.score(EYE_LOOK_DOWN_LEFT), 0.0);
    }

    #[test]
    fn test_blendshape_accepts_model_field_name() {
        let json = r#"{"categoryName":"mouthOpen","score":0.2}"#;
        let shape: Blendshape = serde_json::from_str(json).unwrap();
        assert_eq!(shape.category_name, MOUTH_OPEN);
    }
}

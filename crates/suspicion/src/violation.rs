//! Violation categories and learner guidance

use serde::{Deserialize, Serialize};
use std::fmt;

/// Single-frame violation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Face not visible
    NoFace,

    /// Head turned past the left bound
    TurningLeft,

    /// Head turned past the right bound
    TurningRight,

    /// Eyes and head both down (strict mode only)
    LookingDown,

    /// Mouth open (strict mode only)
    Talking,
}

/// Corrective guidance shown with a warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Guidance {
    pub message: &'static str,
    pub instructions: &'static [&'static str],
}

impl ViolationKind {
    /// Label used in logs and evidence reasons
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "No Face",
            ViolationKind::TurningLeft => "Turning Left",
            ViolationKind::TurningRight => "Turning Right",
            ViolationKind::LookingDown => "Looking Down",
            ViolationKind::Talking => "Talking",
        }
    }

    /// Whether this kind is only evaluated in strict mode
    pub fn requires_strict(&self) -> bool {
        matches!(self, ViolationKind::LookingDown | ViolationKind::Talking)
    }

    /// Guidance for the learner
    pub fn guidance(&self) -> Guidance {
        match self {
            ViolationKind::TurningLeft => Guidance {
                message: "Your head is turned too far to the left",
                instructions: &[
                    "Slowly turn your head back to the center",
                    "Look directly at the screen",
                    "Keep your face straight and centered in the camera",
                    "The warning will disappear when positioned correctly",
                ],
            },
            ViolationKind::TurningRight => Guidance {
                message: "Your head is turned too far to the right",
                instructions: &[
                    "Slowly turn your head back to the center",
                    "Look directly at the screen",
                    "Keep your face straight and centered in the camera",
                    "The warning will disappear when positioned correctly",
                ],
            },
            ViolationKind::LookingDown => Guidance {
                message: "You are looking down - eyes must face the screen",
                instructions: &[
                    "Lift your head and look up at the screen",
                    "Keep your eyes on the exam questions",
                    "Adjust your chair height if the screen is too high or low",
                    "Maintain eye contact with the screen",
                ],
            },
            ViolationKind::Talking => Guidance {
                message: "Verbal communication detected during exam",
                instructions: &[
                    "Close your mouth - no talking allowed",
                    "Maintain complete silence",
                    "Ensure no other person is in the room",
                    "Repeated talking will result in exam suspension",
                ],
            },
            ViolationKind::NoFace => Guidance {
                message: "Your face is not visible in the camera",
                instructions: &[
                    "Position yourself in front of the camera",
                    "Ensure adequate lighting on your face",
                    "Remove any objects blocking the camera",
                    "Your face must be fully visible at all times",
                ],
            },
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

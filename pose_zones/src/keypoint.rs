//! Keypoints as delivered by the pose source (PoseNet layout).

use serde::{Deserialize, Serialize};

/// The 17 body parts a single-person pose model reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl BodyPart {
    /// Parts above the waist; the only ones worth sending over the wire.
    pub const UPPER_BODY: [BodyPart; 11] = [
        BodyPart::Nose,
        BodyPart::LeftEye,
        BodyPart::RightEye,
        BodyPart::LeftEar,
        BodyPart::RightEar,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
    ];

    pub fn is_upper_body(self) -> bool {
        Self::UPPER_BODY.contains(&self)
    }
}

/// Pixel position in the (already mirrored) video frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self { Point { x, y } }

    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub part:     BodyPart,
    pub position: Point,
    pub score:    f32,
}

impl Keypoint {
    pub fn new(part: BodyPart, x: f32, y: f32, score: f32) -> Self {
        Keypoint { part, position: Point::new(x, y), score }
    }

    /// True when the part was detected with more than `min_score` confidence.
    pub fn is_confident(&self, min_score: f32) -> bool {
        self.score > min_score
    }
}

/// One detected person.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub score:     f32,
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    pub fn part(&self, part: BodyPart) -> Option<&Keypoint> {
        self.keypoints.iter().find(|k| k.part == part)
    }

    /// The part, only if it clears `min_score`.
    pub fn confident(&self, part: BodyPart, min_score: f32) -> Option<&Keypoint> {
        self.part(part).filter(|k| k.is_confident(min_score))
    }

    /// Upper-body keypoints only, in their original order.
    pub fn upper_body(&self) -> Vec<Keypoint> {
        self.keypoints.iter().filter(|k| k.part.is_upper_body()).copied().collect()
    }
}

/// Everything the pose source knows about one video frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub width:  u32,
    pub height: u32,
    #[serde(default)]
    pub poses:  Vec<Pose>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_use_camel_case() {
        let k = Keypoint::new(BodyPart::LeftWrist, 1.0, 2.0, 0.9);
        let json = serde_json::to_string(&k).unwrap();
        assert!(json.contains("\"leftWrist\""), "{}", json);
    }

    #[test]
    fn frame_parses_posenet_shape() {
        let json = r#"{"width":800,"height":600,"poses":[{"score":0.8,"keypoints":[
            {"part":"nose","position":{"x":400.0,"y":120.0},"score":0.99}
        ]}]}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.poses[0].part(BodyPart::Nose).unwrap().position.x, 400.0);
    }

    #[test]
    fn confidence_is_strict() {
        let pose = Pose {
            score: 1.0,
            keypoints: vec![Keypoint::new(BodyPart::Nose, 0.0, 0.0, 0.5)],
        };
        assert!(pose.confident(BodyPart::Nose, 0.5).is_none());
        assert!(pose.confident(BodyPart::Nose, 0.4).is_some());
    }

    #[test]
    fn upper_body_drops_legs() {
        let pose = Pose {
            score: 1.0,
            keypoints: vec![
                Keypoint::new(BodyPart::Nose, 0.0, 0.0, 1.0),
                Keypoint::new(BodyPart::LeftKnee, 0.0, 0.0, 1.0),
                Keypoint::new(BodyPart::RightWrist, 0.0, 0.0, 1.0),
            ],
        };
        let parts: Vec<_> = pose.upper_body().iter().map(|k| k.part).collect();
        assert_eq!(parts, vec![BodyPart::Nose, BodyPart::RightWrist]);
    }
}

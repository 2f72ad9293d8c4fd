//! Distance and heading estimates from nose and shoulder keypoints.
//!
//! A pinhole camera with a known horizontal field of view turns pixel
//! measurements into angles; the apparent shoulder width stands in for
//! range.

use serde::Serialize;

use crate::keypoint::{BodyPart, Pose};

/// Horizontal camera model for one frame size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraModel {
    pub width:       f32,
    pub fov_degrees: f32,
}

impl CameraModel {
    pub fn new(width: u32, fov_degrees: f32) -> Self {
        CameraModel { width: width as f32, fov_degrees }
    }

    /// Focal length in pixels, or `None` for an unusable field of view.
    pub fn focal_px(&self) -> Option<f32> {
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) || self.width <= 0.0 {
            return None;
        }
        let half = (self.fov_degrees / 2.0).to_radians();
        Some((self.width / 2.0) / half.tan())
    }
}

/// Pixel distance between the two shoulders, if both are confident.
pub fn shoulder_width(pose: &Pose, min_score: f32) -> Option<f32> {
    let l = pose.confident(BodyPart::LeftShoulder, min_score)?;
    let r = pose.confident(BodyPart::RightShoulder, min_score)?;
    let w = l.position.distance(r.position);
    (w > 0.0).then_some(w)
}

/// Range estimate: `multiplier * focal / shoulder_px`.
///
/// With `multiplier` set to the real shoulder width (≈ 0.4 m) the result is
/// in metres.
pub fn distance(camera: &CameraModel, shoulder_px: f32, multiplier: f32) -> Option<f32> {
    if !(shoulder_px > 0.0) {
        return None;
    }
    let d = multiplier * camera.focal_px()? / shoulder_px;
    d.is_finite().then_some(d)
}

/// Horizontal angle of the nose from the optical axis, in degrees.
/// Positive is to the right of the image centre.
pub fn angle(camera: &CameraModel, nose_x: f32) -> Option<f32> {
    let focal = camera.focal_px()?;
    let a = ((nose_x - camera.width / 2.0) / focal).atan().to_degrees();
    a.is_finite().then_some(a)
}

/// Everything derivable from one pose, for telemetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyReading {
    /// Nose position as a fraction of the frame (x, y).
    pub nose:           Option<(f32, f32)>,
    pub shoulder_width: Option<f32>,
    pub distance:       Option<f32>,
    pub angle:          Option<f32>,
}

impl BodyReading {
    pub fn from_pose(
        pose: &Pose,
        frame: (u32, u32),
        camera: &CameraModel,
        multiplier: f32,
        min_score: f32,
    ) -> Self {
        let (w, h) = (frame.0.max(1) as f32, frame.1.max(1) as f32);
        let nose = pose.confident(BodyPart::Nose, min_score);
        let shoulders = shoulder_width(pose, min_score);

        BodyReading {
            nose:           nose.map(|k| (k.position.x / w, k.position.y / h)),
            shoulder_width: shoulders,
            distance:       shoulders.and_then(|s| distance(camera, s, multiplier)),
            angle:          nose.and_then(|k| angle(camera, k.position.x)),
        }
    }
}

//! # pose_zones
//!
//! The spatial half of the instrument.  A pose source hands us one
//! [`Frame`] per rendered video frame; this crate answers three questions
//! about it:
//!
//! * where is each wrist inside its hand zone ([`ZoneMapper`]),
//! * how far away is the player ([`geometry::distance`]),
//! * which way is the player turned ([`geometry::angle`]).
//!
//! ## Mirroring
//!
//! The video is flipped horizontally so the screen behaves like a mirror.
//! The physical **right** wrist therefore lands in the **left** zone and
//! drives pitch; the physical **left** wrist lands in the **right** zone and
//! drives volume.
//!
//! | Zone | Wrist | Axis used |
//! |---|---|---|
//! | Left  | `rightWrist` | vertical → pitch |
//! | Right | `leftWrist`  | vertical → volume |

pub mod geometry;
pub mod keypoint;
pub mod zone;

pub use geometry::{BodyReading, CameraModel};
pub use keypoint::{BodyPart, Frame, Keypoint, Point, Pose};
pub use zone::{Hand, NormalizedPosition, PitchWindow, Zone, ZoneLayout, ZoneMapper};

//! Hand zones and wrist → ratio mapping.
//!
//! ```text
//!  margin                split                 width-margin
//!    ┌─────────────────────┬─────────────────────┐  margin
//!    │   LEFT zone         │   RIGHT zone        │
//!    │   (right wrist,     │   (left wrist,      │
//!    │    pitch)           │    volume)          │
//!    └─────────────────────┴─────────────────────┘  height * height_factor
//! ```

use gesture_midi::percentage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::keypoint::{BodyPart, Point};

/// Axis-aligned rectangle in frame pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Zone {
    pub left:   f32,
    pub top:    f32,
    pub right:  f32,
    pub bottom: f32,
}

impl Zone {
    pub fn width(&self) -> f32 { self.right - self.left }
    pub fn height(&self) -> f32 { self.bottom - self.top }

    pub fn contains_x(&self, x: f32) -> bool { x >= self.left && x <= self.right }
    pub fn contains_y(&self, y: f32) -> bool { y >= self.top && y <= self.bottom }

    pub fn contains(&self, p: Point) -> bool { self.contains_x(p.x) && self.contains_y(p.y) }
}

/// Which zone, named by screen side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    /// The wrist that shows up in this zone of the mirrored image.
    pub fn wrist(self) -> BodyPart {
        match self {
            Hand::Left  => BodyPart::RightWrist,
            Hand::Right => BodyPart::LeftWrist,
        }
    }
}

/// Wrist position inside its zone.  0.0 on an axis means "outside".
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct NormalizedPosition {
    pub horizontal: f32,
    pub vertical:   f32,
}

impl NormalizedPosition {
    pub const OUTSIDE: NormalizedPosition = NormalizedPosition { horizontal: 0.0, vertical: 0.0 };
}

/// Vertical sub-range of a zone that spans the full pitch range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchWindow {
    pub top:    f32,
    pub bottom: f32,
}

/// Zone geometry relative to the frame size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoneLayout {
    /// Inset from the frame edges, in pixels.
    pub margin:        f32,
    /// Horizontal split between the zones, as a fraction of the width.
    pub split:         f32,
    /// Zone bottom, as a fraction of the height.
    pub height_factor: f32,
}

impl Default for ZoneLayout {
    fn default() -> Self {
        ZoneLayout { margin: 10.0, split: 0.5, height_factor: 0.667 }
    }
}

pub const MIN_RANGE_SCALE: f32 = 0.6;
pub const MAX_RANGE_SCALE: f32 = 8.0;

// ════════════════════════════════════════════════════════════════════════════
// ZoneMapper
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct ZoneMapper {
    layout: ZoneLayout,
    width:  u32,
    height: u32,
    left:   Zone,
    right:  Zone,
}

impl ZoneMapper {
    pub fn new(layout: ZoneLayout, width: u32, height: u32) -> Self {
        let (left, right) = compute_zones(&layout, width, height);
        ZoneMapper { layout, width, height, left, right }
    }

    /// Recompute the zones for new frame dimensions.  Returns true if the
    /// size actually changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if (width, height) == (self.width, self.height) {
            return false;
        }
        debug!(width, height, "resizing hand zones");
        self.width  = width;
        self.height = height;
        (self.left, self.right) = compute_zones(&self.layout, width, height);
        true
    }

    pub fn set_layout(&mut self, layout: ZoneLayout) {
        self.layout = layout;
        (self.left, self.right) = compute_zones(&self.layout, self.width, self.height);
    }

    pub fn size(&self) -> (u32, u32) { (self.width, self.height) }

    pub fn zone(&self, hand: Hand) -> Zone {
        match hand {
            Hand::Left  => self.left,
            Hand::Right => self.right,
        }
    }

    /// The vertical window of `hand`'s zone spanning the full note range.
    ///
    /// `scale` (0.6–8) shrinks the window to `height / scale`; `offset`
    /// (0–1) slides it from the top of the zone to the bottom.
    pub fn pitch_window(&self, hand: Hand, scale: f32, offset: f32) -> PitchWindow {
        let zone   = self.zone(hand);
        let scale  = if scale.is_finite() { scale.clamp(MIN_RANGE_SCALE, MAX_RANGE_SCALE) } else { 1.0 };
        let offset = if offset.is_finite() { offset.clamp(0.0, 1.0) } else { 0.0 };
        let span   = zone.height() / scale;
        let top    = zone.top + (zone.height() - span) * offset;
        PitchWindow { top, bottom: top + span }
    }

    /// Normalize a wrist position inside `hand`'s zone.
    ///
    /// Each axis is only filled in when the raw coordinate lies inside the
    /// zone; otherwise it stays at 0.  The vertical axis is measured inside
    /// `window` and grows upward.
    pub fn position(&self, hand: Hand, wrist: Point, window: PitchWindow) -> NormalizedPosition {
        let zone = self.zone(hand);
        let mut pos = NormalizedPosition::OUTSIDE;

        if zone.contains_x(wrist.x) {
            pos.horizontal = percentage(wrist.x, zone.left, zone.right);
        }
        if zone.contains_y(wrist.y) {
            pos.vertical = 1.0 - percentage(wrist.y, window.top, window.bottom);
        }
        pos
    }
}

fn compute_zones(layout: &ZoneLayout, width: u32, height: u32) -> (Zone, Zone) {
    let w = width as f32;
    let h = height as f32;
    let split  = w * layout.split.clamp(0.0, 1.0);
    let bottom = h * layout.height_factor.clamp(0.0, 1.0);
    let m = layout.margin.max(0.0);

    let left  = Zone { left: m,     top: m, right: split,  bottom };
    let right = Zone { left: split, top: m, right: w - m,  bottom };
    (left, right)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> ZoneMapper {
        ZoneMapper::new(ZoneLayout::default(), 800, 600)
    }

    fn full(m: &ZoneMapper, hand: Hand) -> PitchWindow {
        m.pitch_window(hand, 1.0, 0.0)
    }

    #[test]
    fn zones_split_the_frame() {
        let m = mapper();
        let l = m.zone(Hand::Left);
        let r = m.zone(Hand::Right);
        assert_eq!((l.left, l.top, l.right), (10.0, 10.0, 400.0));
        assert_eq!((r.left, r.right), (400.0, 790.0));
        assert!((l.bottom - 400.2).abs() < 1e-3);
        assert_eq!(l.bottom, r.bottom);
    }

    #[test]
    fn mirrored_wrists() {
        assert_eq!(Hand::Left.wrist(), BodyPart::RightWrist);
        assert_eq!(Hand::Right.wrist(), BodyPart::LeftWrist);
    }

    #[test]
    fn resize_recomputes() {
        let mut m = mapper();
        assert!(!m.resize(800, 600));
        assert!(m.resize(1600, 1200));
        assert_eq!(m.zone(Hand::Right).right, 1590.0);
    }

    #[test]
    fn inside_point_normalizes() {
        let m = mapper();
        let win = full(&m, Hand::Left);
        let p = m.position(Hand::Left, Point::new(205.0, 205.1), win);
        assert!((p.horizontal - 0.5).abs() < 1e-3);
        assert!((p.vertical - 0.5).abs() < 1e-3);
    }

    #[test]
    fn raised_hand_is_high() {
        let m = mapper();
        let win = full(&m, Hand::Right);
        let high = m.position(Hand::Right, Point::new(500.0, 20.0), win);
        let low  = m.position(Hand::Right, Point::new(500.0, 390.0), win);
        assert!(high.vertical > low.vertical);
    }

    #[test]
    fn outside_both_zones_is_sentinel() {
        let m = mapper();
        let win = full(&m, Hand::Left);
        let p = m.position(Hand::Left, Point::new(900.0, 590.0), win);
        assert_eq!(p, NormalizedPosition::OUTSIDE);
    }

    #[test]
    fn axes_are_independent() {
        let m = mapper();
        let win = full(&m, Hand::Left);
        // x inside the left zone, y below it
        let p = m.position(Hand::Left, Point::new(100.0, 550.0), win);
        assert!(p.horizontal > 0.0);
        assert_eq!(p.vertical, 0.0);
    }

    #[test]
    fn scaled_window_saturates_but_stays_in_range() {
        let m = mapper();
        let win = m.pitch_window(Hand::Left, 4.0, 0.5);
        assert!(win.top > m.zone(Hand::Left).top);
        assert!(win.bottom < m.zone(Hand::Left).bottom);
        for y in [12.0, 100.0, 205.0, 300.0, 399.0] {
            let p = m.position(Hand::Left, Point::new(200.0, y), win);
            assert!((0.0..=1.0).contains(&p.vertical), "y={} v={}", y, p.vertical);
        }
        let top = m.position(Hand::Left, Point::new(200.0, 12.0), win);
        assert_eq!(top.vertical, 1.0);
    }

    #[test]
    fn window_scale_is_clamped() {
        let m = mapper();
        let a = m.pitch_window(Hand::Left, 100.0, 0.0);
        let b = m.pitch_window(Hand::Left, MAX_RANGE_SCALE, 0.0);
        assert_eq!(a, b);
    }
}

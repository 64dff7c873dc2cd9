//! Plain geometry primitives shared by the metering pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Same size with width and height swapped.
    pub const fn flip(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub fn aspect_ratio(self) -> AspectRatio {
        AspectRatio::of(self)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A width:height ratio reduced by the greatest common divisor, so that
/// 1920x1080 and 1280x720 compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectRatio {
    x: u32,
    y: u32,
}

impl AspectRatio {
    pub fn of(size: Size) -> Self {
        let divisor = gcd(size.width, size.height).max(1);
        Self {
            x: size.width / divisor,
            y: size.height / divisor,
        }
    }

    pub fn to_f32(self) -> f32 {
        if self.y == 0 {
            0.0
        } else {
            self.x as f32 / self.y as f32
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Floating point rectangle, `left <= right` and `top <= bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle of the given size centered on `center`.
    pub fn centered(center: PointF, width: f32, height: f32) -> Self {
        Self::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            center.x + width / 2.0,
            center.y + height / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> PointF {
        PointF::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Corners in clockwise order starting at the top left.
    pub fn corners(&self) -> [PointF; 4] {
        [
            PointF::new(self.left, self.top),
            PointF::new(self.right, self.top),
            PointF::new(self.right, self.bottom),
            PointF::new(self.left, self.bottom),
        ]
    }

    /// Smallest rectangle containing every point.
    pub fn bounding(points: &[PointF]) -> Self {
        let mut rect = Self::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for point in points {
            rect.left = rect.left.min(point.x);
            rect.top = rect.top.min(point.y);
            rect.right = rect.right.max(point.x);
            rect.bottom = rect.bottom.max(point.y);
        }
        rect
    }

    /// Clamps every edge into `[0, bounds.width] x [0, bounds.height]`.
    pub fn clip(&self, bounds: Size) -> Self {
        let (width, height) = (bounds.width as f32, bounds.height as f32);
        Self::new(
            self.left.clamp(0.0, width),
            self.top.clamp(0.0, height),
            self.right.clamp(0.0, width),
            self.bottom.clamp(0.0, height),
        )
    }

    pub fn round(&self) -> Rect {
        Rect::new(
            self.left.round() as i32,
            self.top.round() as i32,
            self.right.round() as i32,
            self.bottom.round() as i32,
        )
    }
}

/// Integer rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn size(&self) -> Size {
        Size::new(self.width().max(0) as u32, self.height().max(0) as u32)
    }
}

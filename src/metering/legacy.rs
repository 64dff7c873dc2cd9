use super::region::MeteringTransform;
use crate::angles::{Angles, Axis, Reference};
use crate::geometry::{PointF, Rect, RectF, Size};

/// A weighted area in the legacy `[-1000, 1000]` coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyArea {
    pub rect: Rect,
    pub weight: i32,
}

/// Maps view points into the legacy API's normalized space, where the
/// sensor spans `-1000..=1000` on both axes regardless of its size.
#[derive(Debug, Clone, Copy)]
pub struct LegacyMeteringTransform {
    angles: Angles,
    preview_size: Size,
}

impl LegacyMeteringTransform {
    const BOUND: f32 = 1000.0;

    pub fn new(angles: Angles, preview_size: Size) -> Self {
        Self { angles, preview_size }
    }
}

impl MeteringTransform<LegacyArea> for LegacyMeteringTransform {
    fn transform_point(&self, point: PointF) -> PointF {
        let width = self.preview_size.width.max(1) as f32;
        let height = self.preview_size.height.max(1) as f32;
        let x = -Self::BOUND + point.x / width * 2.0 * Self::BOUND;
        let y = -Self::BOUND + point.y / height * 2.0 * Self::BOUND;

        let angle = self
            .angles
            .offset(Reference::Sensor, Reference::View, Axis::Absolute);
        let theta = -(angle as f32).to_radians();
        let (sin, cos) = theta.sin_cos();
        PointF::new(x * cos - y * sin, x * sin + y * cos)
    }

    fn metering_region(&self, region: RectF, weight: i32) -> LegacyArea {
        let rect = region.round();
        let bound = Self::BOUND as i32;
        LegacyArea {
            rect: Rect::new(
                rect.left.clamp(-bound, bound),
                rect.top.clamp(-bound, bound),
                rect.right.clamp(-bound, bound),
                rect.bottom.clamp(-bound, bound),
            ),
            weight,
        }
    }
}

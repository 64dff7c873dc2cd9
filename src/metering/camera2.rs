use tracing::trace;

use super::region::MeteringTransform;
use crate::angles::{Angles, Axis, Reference};
use crate::capture::MeteringRectangle;
use crate::geometry::{PointF, Rect, RectF, Size};

/// Snapshot of the sizes and regions a metering transform depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeteringGeometry {
    /// Size of the preview surface in view coordinates.
    pub preview_surface: Size,
    /// Size of the hardware preview stream, expressed in the VIEW reference.
    pub preview_stream: Size,
    /// Whether the surface crops the stream to fill itself (as opposed to letterboxing).
    pub preview_is_cropping: bool,
    /// The request's crop region, in active-array coordinates.
    pub crop_region: Option<Rect>,
    /// The sensor active array.
    pub active_array: Option<Rect>,
}

impl MeteringGeometry {
    /// Builds the geometry from a stream size in SENSOR coordinates, flipping
    /// it into the VIEW reference when the two are rotated by 90 or 270 degrees.
    pub fn new(
        angles: &Angles,
        preview_surface: Size,
        sensor_stream: Size,
        preview_is_cropping: bool,
    ) -> Self {
        let preview_stream = if angles.flip(Reference::Sensor, Reference::View) {
            sensor_stream.flip()
        } else {
            sensor_stream
        };
        Self {
            preview_surface,
            preview_stream,
            preview_is_cropping,
            crop_region: None,
            active_array: None,
        }
    }

    pub fn with_crop_region(mut self, crop_region: Option<Rect>) -> Self {
        self.crop_region = crop_region;
        self
    }

    pub fn with_active_array(mut self, active_array: Option<Rect>) -> Self {
        self.active_array = active_array;
        self
    }
}

/// Maps view points into sensor active-array coordinates.
///
/// A point goes through five corrections, each updating the point and the
/// size of the frame it lives in: surface cropping, scale to the stream,
/// rotation into the sensor frame, crop region, and active array offset.
#[derive(Debug, Clone, Copy)]
pub struct Camera2MeteringTransform {
    angles: Angles,
    geometry: MeteringGeometry,
}

impl Camera2MeteringTransform {
    pub fn new(angles: Angles, geometry: MeteringGeometry) -> Self {
        Self { angles, geometry }
    }

    fn apply_preview_cropping(&self, point: &mut PointF, size: Size) -> Size {
        if !self.geometry.preview_is_cropping {
            return size;
        }
        let stream_ratio = self.geometry.preview_stream.aspect_ratio().to_f32();
        let surface_ratio = size.aspect_ratio().to_f32();
        if stream_ratio > surface_ratio {
            // The stream is wider: its left and right margins are hidden.
            let scale = stream_ratio / surface_ratio;
            point.x += size.width as f32 * (scale - 1.0) / 2.0;
            Size::new((size.width as f32 * scale).round() as u32, size.height)
        } else {
            // The stream is taller: its top and bottom margins are hidden.
            let scale = surface_ratio / stream_ratio;
            point.y += size.height as f32 * (scale - 1.0) / 2.0;
            Size::new(size.width, (size.height as f32 * scale).round() as u32)
        }
    }

    fn apply_preview_scale(&self, point: &mut PointF, size: Size) -> Size {
        let stream = self.geometry.preview_stream;
        if size.width > 0 && size.height > 0 {
            point.x *= stream.width as f32 / size.width as f32;
            point.y *= stream.height as f32 / size.height as f32;
        }
        stream
    }

    fn apply_sensor_rotation(&self, point: &mut PointF, size: Size) -> Size {
        let angle = self
            .angles
            .offset(Reference::View, Reference::Sensor, Axis::Absolute);
        let (width, height) = (size.width as f32, size.height as f32);
        let (x, y) = (point.x, point.y);
        *point = match angle {
            90 => PointF::new(height - y, x),
            180 => PointF::new(width - x, height - y),
            270 => PointF::new(y, width - x),
            _ => PointF::new(x, y),
        };
        if angle % 180 != 0 { size.flip() } else { size }
    }

    fn apply_crop_region(&self, point: &mut PointF, size: Size) -> Size {
        let crop = self.geometry.crop_region.map_or(size, |crop| crop.size());
        point.x += (crop.width as f32 - size.width as f32) / 2.0;
        point.y += (crop.height as f32 - size.height as f32) / 2.0;
        crop
    }

    fn apply_active_array(&self, point: &mut PointF, size: Size) -> Size {
        if let Some(crop) = self.geometry.crop_region {
            point.x += crop.left as f32;
            point.y += crop.top as f32;
        }
        self.geometry.active_array.map_or(size, |active| active.size())
    }
}

impl MeteringTransform<MeteringRectangle> for Camera2MeteringTransform {
    fn transform_point(&self, point: PointF) -> PointF {
        let mut mapped = point;
        let mut size = self.geometry.preview_surface;
        size = self.apply_preview_cropping(&mut mapped, size);
        size = self.apply_preview_scale(&mut mapped, size);
        size = self.apply_sensor_rotation(&mut mapped, size);
        size = self.apply_crop_region(&mut mapped, size);
        size = self.apply_active_array(&mut mapped, size);

        mapped.x = mapped.x.clamp(0.0, size.width as f32);
        mapped.y = mapped.y.clamp(0.0, size.height as f32);
        trace!(?point, ?mapped, %size, "metering point mapped");
        mapped
    }

    fn metering_region(&self, region: RectF, weight: i32) -> MeteringRectangle {
        MeteringRectangle::new(region.round(), weight)
    }
}

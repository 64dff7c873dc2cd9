use std::cmp::Reverse;

use crate::geometry::{PointF, RectF, Size};

/// Engine-specific mapping from view coordinates to hardware metering areas.
pub trait MeteringTransform<T> {
    fn transform_point(&self, point: PointF) -> PointF;

    fn metering_region(&self, region: RectF, weight: i32) -> T;
}

/// A weighted rectangle in some reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeteringRegion {
    pub region: RectF,
    pub weight: i32,
}

impl MeteringRegion {
    pub const MAX_WEIGHT: i32 = 1000;

    pub fn new(region: RectF, weight: i32) -> Self {
        Self { region, weight }
    }

    pub fn clip(&self, bounds: Size) -> Self {
        Self::new(self.region.clip(bounds), self.weight)
    }

    /// Maps all four corners and keeps their bounding box, so rotated
    /// regions stay axis aligned.
    pub fn transform<T>(&self, transform: &impl MeteringTransform<T>) -> Self {
        let corners = self.region.corners().map(|corner| transform.transform_point(corner));
        Self::new(RectF::bounding(&corners), self.weight)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeteringRegions {
    regions: Vec<MeteringRegion>,
}

impl MeteringRegions {
    /// Background region size, relative to the main one.
    const BLUR_FACTOR_SIZE: f32 = 1.5;
    /// Background region weight, relative to the main one.
    const BLUR_FACTOR_WEIGHT: f32 = 0.1;
    /// Size of a point region, relative to the bounds.
    const POINT_AREA: f32 = 0.05;

    pub fn new(regions: Vec<MeteringRegion>) -> Self {
        Self { regions }
    }

    /// Small region around `center`, plus a larger, lighter background region.
    pub fn from_point(bounds: Size, center: PointF, weight: i32) -> Self {
        Self::from_point_with_blur(bounds, center, weight, true)
    }

    pub fn from_point_with_blur(bounds: Size, center: PointF, weight: i32, blur: bool) -> Self {
        let width = Self::POINT_AREA * bounds.width as f32;
        let height = Self::POINT_AREA * bounds.height as f32;
        let area = RectF::centered(center, width, height);
        Self::from_area(bounds, area, weight, blur)
    }

    pub fn from_area(bounds: Size, area: RectF, weight: i32, blur: bool) -> Self {
        let mut regions = vec![MeteringRegion::new(area, weight)];
        if blur {
            let background = RectF::centered(
                area.center(),
                Self::BLUR_FACTOR_SIZE * area.width(),
                Self::BLUR_FACTOR_SIZE * area.height(),
            );
            let background_weight = (Self::BLUR_FACTOR_WEIGHT * weight as f32) as i32;
            regions.push(MeteringRegion::new(background, background_weight));
        }
        Self::new(regions.iter().map(|region| region.clip(bounds)).collect())
    }

    pub fn regions(&self) -> &[MeteringRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn transform<T>(&self, transform: &impl MeteringTransform<T>) -> Self {
        Self::new(
            self.regions
                .iter()
                .map(|region| region.transform(transform))
                .collect(),
        )
    }

    /// Up to `at_most` hardware regions, heaviest first.
    pub fn get<T>(&self, at_most: usize, transform: &impl MeteringTransform<T>) -> Vec<T> {
        let mut sorted = self.regions.clone();
        sorted.sort_by_key(|region| Reverse(region.weight));
        sorted
            .into_iter()
            .take(at_most)
            .map(|region| transform.metering_region(region.region, region.weight))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Leaves points alone and yields the raw region.
    struct Identity;

    impl MeteringTransform<MeteringRegion> for Identity {
        fn transform_point(&self, point: PointF) -> PointF {
            point
        }

        fn metering_region(&self, region: RectF, weight: i32) -> MeteringRegion {
            MeteringRegion::new(region, weight)
        }
    }

    /// Quarter turn inside a frame `height` pixels tall.
    struct Rotate90 {
        height: f32,
    }

    impl MeteringTransform<MeteringRegion> for Rotate90 {
        fn transform_point(&self, point: PointF) -> PointF {
            PointF::new(self.height - point.y, point.x)
        }

        fn metering_region(&self, region: RectF, weight: i32) -> MeteringRegion {
            MeteringRegion::new(region, weight)
        }
    }

    #[test]
    fn point_region_is_centered_and_clipped() {
        let regions = MeteringRegions::from_point(
            Size::new(1000, 1000),
            PointF::new(500.0, 500.0),
            MeteringRegion::MAX_WEIGHT,
        );
        assert_eq!(regions.len(), 2);

        let top = regions.get(1, &Identity);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].weight, 1000);
        assert_eq!(top[0].region, RectF::new(475.0, 475.0, 525.0, 525.0));
        assert_eq!(top[0].region.center(), PointF::new(500.0, 500.0));
    }

    #[test]
    fn blur_region_is_larger_and_lighter() {
        let regions = MeteringRegions::from_point(
            Size::new(1000, 1000),
            PointF::new(500.0, 500.0),
            1000,
        );
        let all = regions.get(5, &Identity);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].weight, 100);
        assert_eq!(all[1].region, RectF::new(462.5, 462.5, 537.5, 537.5));

        let sharp = MeteringRegions::from_point_with_blur(
            Size::new(1000, 1000),
            PointF::new(500.0, 500.0),
            1000,
            false,
        );
        assert_eq!(sharp.len(), 1);
    }

    #[test]
    fn background_weight_is_truncated() {
        let regions = MeteringRegions::from_point(Size::new(1000, 1000), PointF::new(500.0, 500.0), 15);
        assert_eq!(regions.regions()[0].weight, 15);
        assert_eq!(regions.regions()[1].weight, 1);
    }

    #[test]
    fn regions_near_the_edge_are_clipped_to_bounds() {
        let regions = MeteringRegions::from_point(Size::new(200, 100), PointF::new(0.0, 100.0), 500);
        for region in regions.regions() {
            assert!(region.region.left >= 0.0 && region.region.right <= 200.0);
            assert!(region.region.top >= 0.0 && region.region.bottom <= 100.0);
        }
        assert_eq!(regions.regions()[0].region, RectF::new(0.0, 97.5, 5.0, 100.0));
    }

    #[test]
    fn get_prefers_heaviest_regions_after_sorting() {
        let rect = RectF::new(0.0, 0.0, 10.0, 10.0);
        let regions = MeteringRegions::new(vec![
            MeteringRegion::new(rect, 10),
            MeteringRegion::new(rect, 90),
            MeteringRegion::new(rect, 50),
        ]);
        let weights: Vec<i32> = regions
            .get(2, &Identity)
            .iter()
            .map(|region| region.weight)
            .collect();
        assert_eq!(weights, vec![90, 50]);
        assert!(regions.get(0, &Identity).is_empty());
    }

    #[test]
    fn transform_keeps_the_bounding_box_of_mapped_corners() {
        let regions = MeteringRegions::from_area(
            Size::new(100, 50),
            RectF::new(10.0, 5.0, 30.0, 15.0),
            700,
            false,
        );
        let rotated = regions.transform(&Rotate90 { height: 50.0 });
        assert_eq!(rotated.regions()[0].region, RectF::new(35.0, 10.0, 45.0, 30.0));
        assert_eq!(rotated.regions()[0].weight, 700);
    }
}

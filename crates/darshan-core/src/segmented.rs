//! A raster paired with the registry that gives its values meaning.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::coords::{LatLon, Pixel};
use crate::ids::{ClusterId, NODATA, UNLABELED_PATH};
use crate::raster::Raster;
use crate::registry::{ClusterRecord, ClusterRegistry};
use crate::transform;

/// Classification and color assigned to a cluster when (re)building a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterLabel {
    pub classification_path: String,
    pub color: Option<Rgb>,
}

impl ClusterLabel {
    pub fn new(classification_path: impl Into<String>, color: Option<Rgb>) -> Self {
        Self { classification_path: classification_path.into(), color }
    }

    pub fn unlabeled(color: Option<Rgb>) -> Self {
        Self::new(UNLABELED_PATH, color)
    }
}

/// Raster + registry. Every cluster lookup goes through here so values are
/// always interpreted against the registry built for them.
///
/// Ids present in the raster but missing from the registry resolve to
/// `None` / `"unlabeled"`, which tolerates partially built state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedRaster {
    raster: Raster,
    registry: ClusterRegistry,
}

impl SegmentedRaster {
    pub fn new(raster: Raster, registry: ClusterRegistry) -> Self {
        Self { raster, registry }
    }

    /// NODATA-filled raster shaped like `reference`, with an empty registry.
    pub fn empty_like(reference: &Raster) -> Self {
        Self::new(reference.create_empty(NODATA), ClusterRegistry::new())
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    pub fn width(&self) -> usize {
        self.raster.width()
    }

    pub fn height(&self) -> usize {
        self.raster.height()
    }

    /// Split into owned parts for a single writer.
    pub(crate) fn parts_mut(&mut self) -> (&mut Raster, &mut ClusterRegistry) {
        (&mut self.raster, &mut self.registry)
    }

    pub fn into_parts(self) -> (Raster, ClusterRegistry) {
        (self.raster, self.registry)
    }

    pub fn cluster_id(&self, x: isize, y: isize) -> Option<ClusterId> {
        self.raster.get(x, y)
    }

    pub fn cluster(&self, x: isize, y: isize) -> Option<&ClusterRecord> {
        self.raster.get(x, y).and_then(|id| self.registry.get(id))
    }

    pub fn cluster_by_id(&self, id: ClusterId) -> Option<&ClusterRecord> {
        self.registry.get(id)
    }

    /// Classification at (x, y); `"unlabeled"` out of bounds or for unknown ids.
    pub fn classification(&self, x: isize, y: isize) -> &str {
        match self.raster.get(x, y) {
            Some(id) => self.registry.classification(id),
            None => UNLABELED_PATH,
        }
    }

    /// Classification at a geographic position; `None` outside the raster.
    pub fn classification_at(&self, ll: LatLon) -> Option<&str> {
        let p = self.raster.latlon_to_pixel(ll)?;
        Some(self.classification(p.x as isize, p.y as isize))
    }

    pub fn color(&self, x: isize, y: isize) -> Option<Rgb> {
        self.raster.get(x, y).and_then(|id| self.registry.color(id))
    }

    /// A new value with `id` reclassified. The raster is shared, the registry
    /// is copied on write; `self` is left untouched. Unknown ids leave the
    /// registry as-is.
    pub fn set_classification(&self, id: ClusterId, classification_path: &str, color: Option<Rgb>) -> Self {
        let registry = self
            .registry
            .with_classification(id, classification_path, color)
            .unwrap_or_else(|| self.registry.clone());
        Self::new(self.raster.clone(), registry)
    }

    pub fn with_registry(&self, registry: ClusterRegistry) -> Self {
        Self::new(self.raster.clone(), registry)
    }

    /// Transform the cells; the registry is kept, so its pixel counts go stale.
    pub fn map_raster(&self, f: impl FnMut(Pixel, ClusterId) -> ClusterId) -> Self {
        Self::new(self.raster.map(f), self.registry.clone())
    }

    /// Recount pixels per id (NODATA excluded) and label each id with `f`.
    pub fn rebuild_registry(&self, mut f: impl FnMut(ClusterId) -> ClusterLabel) -> Self {
        let mut counts: Vec<(ClusterId, u64)> = transform::count_pixels(&self.raster, NODATA).into_iter().collect();
        counts.sort_unstable_by_key(|&(id, _)| id);
        let registry = counts
            .into_iter()
            .map(|(id, n)| {
                let label = f(id);
                ClusterRecord::new(id, n, label.classification_path, label.color)
            })
            .collect();
        self.with_registry(registry)
    }

    pub fn color_map(&self) -> HashMap<ClusterId, Option<Rgb>> {
        self.registry.to_color_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;

    fn seg() -> SegmentedRaster {
        let raster = Raster::from_rows(
            vec![vec![1, 1, 2], vec![NODATA, 2, 2]],
            GeoTransform::from_bounds(0.0, 0.0, 3.0, 2.0, 3, 2),
        )
        .unwrap();
        SegmentedRaster::new(raster, ClusterRegistry::new())
            .rebuild_registry(|id| ClusterLabel::unlabeled(Some(Rgb::new(id as u8, 0, 0))))
    }

    #[test]
    fn rebuild_counts_pixels_and_skips_nodata() {
        let s = seg();
        assert_eq!(s.registry().ids(), vec![1, 2]);
        assert_eq!(s.cluster_by_id(1).unwrap().pixel_count, 2);
        assert_eq!(s.cluster_by_id(2).unwrap().pixel_count, 3);
        assert!(s.cluster(0, 1).is_none());
    }

    #[test]
    fn set_classification_does_not_touch_original() {
        let s = seg();
        let labeled = s.set_classification(2, "water", Some(Rgb::new(0, 0, 255)));
        assert_eq!(labeled.classification(2, 0), "water");
        assert_eq!(s.classification(2, 0), "unlabeled");
        assert_eq!(labeled.raster(), s.raster());
    }

    #[test]
    fn out_of_bounds_lookups_are_soft() {
        let s = seg();
        assert_eq!(s.classification(-1, 0), "unlabeled");
        assert!(s.color(5, 5).is_none());
        assert!(s.classification_at(LatLon::new(50.0, 50.0)).is_none());
        assert_eq!(s.classification_at(LatLon::new(1.5, 0.5)), Some("unlabeled"));
    }

    #[test]
    fn empty_like_is_all_nodata() {
        let s = SegmentedRaster::empty_like(seg().raster());
        assert!(s.raster().data().iter().all(|&v| v == NODATA));
        assert!(s.registry().is_empty());
    }
}

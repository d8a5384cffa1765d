//! Interactive region labeling on a live composite.
//!
//! A [`RegionLabeler`] is the single writer of the composite it owns: the
//! value grid and registry are edited in place, and nothing else holds a
//! reference into them while the session lives. Callers serialize
//! operations; there is no internal locking.
//!
//! Registry pixel counts are kept equal to a rescan of the grid after every
//! repaint (labeling and merging alike), so they never go stale.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::color::Rgb;
use crate::compositor::{Composite, LabelTable};
use crate::coords::{Connectivity, LatLon, Pixel};
use crate::error::{Error, Result};
use crate::ids::{self, ClusterId, FINE_GRAIN_START, NODATA, SYNTHETIC_START};
use crate::raster::Raster;
use crate::segmented::SegmentedRaster;
use crate::taxonomy::ClassificationHierarchy;
use crate::transform::{self, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerOptions {
    /// Flood-fill cap; bounds interactive latency.
    pub max_region_pixels: usize,
    /// 8-connectivity when true, 4 otherwise.
    pub diagonal: bool,
    /// Depth at which synthetic cluster colors are resolved.
    pub hierarchy_level: Option<usize>,
}

impl Default for LabelerOptions {
    fn default() -> Self {
        Self { max_region_pixels: 10_000, diagonal: true, hierarchy_level: None }
    }
}

/// A classification seen next to a region, with how many neighbour lookups hit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeighborLabel {
    pub classification_path: String,
    pub count: usize,
}

#[derive(Debug)]
pub struct RegionLabeler {
    composite: SegmentedRaster,
    provenance: Raster,
    order: Vec<String>,
    sources: HashMap<String, SegmentedRaster>,
    labels: HashMap<String, LabelTable>,
    synthetic_labels: LabelTable,
    hierarchy: Arc<ClassificationHierarchy>,
    options: LabelerOptions,
    next_synthetic_id: ClusterId,
}

impl RegionLabeler {
    /// Take ownership of a composite. The synthetic counter starts one past
    /// the largest synthetic id found in the grid or registry, or at
    /// `SYNTHETIC_START` when there is none.
    pub fn new(
        composite: Composite,
        sources: HashMap<String, SegmentedRaster>,
        labels: HashMap<String, LabelTable>,
        hierarchy: Arc<ClassificationHierarchy>,
        options: LabelerOptions,
    ) -> Self {
        let Composite { segmented, provenance, order, .. } = composite;

        let max_synthetic = segmented
            .raster()
            .data()
            .iter()
            .copied()
            .chain(segmented.registry().ids())
            .filter(|&id| ids::is_synthetic(id))
            .max();
        let next_synthetic_id = max_synthetic.map_or(SYNTHETIC_START, |m| m + 1);

        let synthetic_labels = segmented
            .registry()
            .clusters()
            .into_iter()
            .filter(|c| ids::is_synthetic(c.id))
            .map(|c| (c.id, c.classification_path.clone()))
            .collect();

        debug!(next_synthetic_id, sources = sources.len(), "labeling session opened");

        Self {
            composite: segmented,
            provenance,
            order,
            sources,
            labels,
            synthetic_labels,
            hierarchy,
            options,
            next_synthetic_id,
        }
    }

    pub fn composite(&self) -> &SegmentedRaster {
        &self.composite
    }

    pub fn provenance(&self) -> &Raster {
        &self.provenance
    }

    /// Labels recorded for synthetic clusters, by id.
    pub fn synthetic_labels(&self) -> &LabelTable {
        &self.synthetic_labels
    }

    pub fn next_synthetic_id(&self) -> ClusterId {
        self.next_synthetic_id
    }

    pub fn options(&self) -> &LabelerOptions {
        &self.options
    }

    /// Switch the color depth and recolor every synthetic cluster at it, so
    /// the registry's color exports follow the level. Fails without changing
    /// anything when some synthetic label has no color at the new depth.
    pub fn set_hierarchy_level(&mut self, level: Option<usize>) -> Result<()> {
        let mut recolored = Vec::with_capacity(self.synthetic_labels.len());
        for (&id, path) in &self.synthetic_labels {
            let color = if ids::is_unlabeled_path(path) {
                None
            } else {
                Some(self.hierarchy.color_for_path(path, level)?)
            };
            recolored.push((id, color));
        }

        let registry = self.composite.parts_mut().1;
        for (id, color) in recolored {
            if let Some(path) = self.synthetic_labels.get(&id) {
                registry.update_classification(id, path, color);
            }
        }
        self.options.hierarchy_level = level;
        debug!(?level, clusters = self.synthetic_labels.len(), "recolored synthetic clusters");
        Ok(())
    }

    /// End the session and hand the composite back.
    pub fn into_composite(self) -> SegmentedRaster {
        self.composite
    }

    pub fn latlon_to_pixel(&self, ll: LatLon) -> Option<Pixel> {
        self.composite.raster().latlon_to_pixel(ll)
    }

    pub fn pixel_to_latlon(&self, p: Pixel) -> LatLon {
        self.composite.raster().pixel_to_latlon(p)
    }

    /// True when the pixel holds a non-synthetic id whose owning segmentation
    /// has no label (or an `"unlabeled"` label) for the raw cluster there.
    /// NODATA, synthetic pixels and out-of-bounds pixels are never unlabeled.
    pub fn is_pixel_unlabeled(&self, p: Pixel) -> bool {
        let Some(value) = self.composite.raster().at(p) else {
            return false;
        };
        if value == NODATA || value >= SYNTHETIC_START {
            return false;
        }
        if ids::is_unlabeled(value) {
            return true;
        }
        let Some(key) = self
            .provenance
            .at(p)
            .and_then(|rank| usize::try_from(rank).ok())
            .and_then(|rank| self.order.get(rank))
        else {
            return true;
        };
        let raw = self.sources.get(key).and_then(|s| s.raster().at(p));
        let label = raw.and_then(|raw| self.labels.get(key).and_then(|t| t.get(&raw)));
        label.map_or(true, |path| ids::is_unlabeled_path(path))
    }

    /// Grow the unlabeled region around `seed`, capped at `max_pixels`.
    pub fn find_contiguous_region(&self, seed: Pixel, max_pixels: usize) -> Region {
        let connectivity = Connectivity::from_diagonal(self.options.diagonal);
        let region = transform::find_region_where(self.composite.raster(), seed, max_pixels, connectivity, |p| {
            self.is_pixel_unlabeled(p)
        });
        if region.truncated {
            warn!(x = seed.x, y = seed.y, max_pixels, "region growth hit the pixel cap");
        }
        region
    }

    /// [`Self::find_contiguous_region`] at a geographic position with the
    /// configured cap; `None` outside the raster.
    pub fn region_at(&self, ll: LatLon) -> Option<Region> {
        let p = self.latlon_to_pixel(ll)?;
        Some(self.find_contiguous_region(p, self.options.max_region_pixels))
    }

    /// Labeled synthetic clusters the region already covers.
    pub fn check_for_overlaps(&self, region: &Region) -> BTreeMap<ClusterId, String> {
        let raster = self.composite.raster();
        region
            .iter()
            .filter_map(|p| raster.at(p))
            .filter(|&v| ids::is_synthetic(v))
            .filter_map(|v| {
                self.synthetic_labels
                    .get(&v)
                    .filter(|path| !ids::is_unlabeled_path(path))
                    .map(|path| (v, path.clone()))
            })
            .collect()
    }

    /// Paint `region` with the synthetic cluster for `path`, reusing the
    /// cluster that already carries exactly this path or allocating a new
    /// id. NODATA pixels are left alone. Returns the id painted.
    ///
    /// A region with no in-bounds, non-NODATA pixel fails with
    /// [`Error::EmptyRegion`] and registers nothing.
    pub fn label_region(&mut self, region: &Region, path: &str) -> Result<ClusterId> {
        let color = self.resolve_color(path)?;
        if !self.has_paintable_pixel(region) {
            return Err(Error::EmptyRegion);
        }
        let id = match self.synthetic_id_for(path) {
            Some(id) => id,
            None => self.allocate_synthetic_id()?,
        };

        self.composite.parts_mut().1.upsert(id, path, color);
        let painted = self.paint(region, id);
        self.synthetic_labels.insert(id, path.to_string());
        self.next_synthetic_id = self.next_synthetic_id.max(id + 1);

        info!(id, path, pixels = painted, "labeled region");
        Ok(id)
    }

    /// Repaint `region` into an existing synthetic cluster. Returns false,
    /// changing nothing, when `existing_id` is not a registered synthetic id.
    pub fn handle_merge_with_existing(&mut self, region: &Region, existing_id: ClusterId) -> bool {
        if !ids::is_synthetic(existing_id) || !self.composite.registry().has(existing_id) {
            return false;
        }
        let painted = self.paint(region, existing_id);
        info!(id = existing_id, pixels = painted, "merged region into existing cluster");
        true
    }

    /// Classifications bordering the region (8-neighbourhood), most frequent
    /// first; unlabeled neighbours are not counted.
    pub fn analyze_neighborhood(&self, region: &Region) -> Vec<NeighborLabel> {
        let raster = self.composite.raster();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for p in region.iter() {
            for n in raster.neighbors(p, Connectivity::Eight) {
                let Some(v) = raster.at(n) else { continue };
                let path = self.composite.registry().classification(v);
                if !ids::is_unlabeled_path(path) {
                    *counts.entry(path).or_insert(0) += 1;
                }
            }
        }
        let mut out: Vec<NeighborLabel> = counts
            .into_iter()
            .map(|(path, count)| NeighborLabel { classification_path: path.to_string(), count })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.classification_path.cmp(&b.classification_path)));
        out
    }

    /// Rebuild every registry pixel count from the grid.
    pub fn recount_pixels(&mut self) {
        let (raster, registry) = self.composite.parts_mut();
        let counts = transform::count_pixels(raster, NODATA);
        for id in registry.ids() {
            registry.update_pixel_count(id, counts.get(&id).copied().unwrap_or(0));
        }
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn resolve_color(&self, path: &str) -> Result<Option<Rgb>> {
        if ids::is_unlabeled_path(path) {
            return Ok(None);
        }
        self.hierarchy
            .color_for_path(path, self.options.hierarchy_level)
            .map(Some)
    }

    fn has_paintable_pixel(&self, region: &Region) -> bool {
        let raster = self.composite.raster();
        region.iter().any(|p| raster.at(p).is_some_and(|v| v != NODATA))
    }

    fn synthetic_id_for(&self, path: &str) -> Option<ClusterId> {
        self.synthetic_labels
            .iter()
            .find(|(_, p)| p.as_str() == path)
            .map(|(&id, _)| id)
    }

    fn allocate_synthetic_id(&self) -> Result<ClusterId> {
        if self.next_synthetic_id >= FINE_GRAIN_START {
            return Err(Error::IdSpaceExhausted { what: "synthetic cluster ids" });
        }
        Ok(self.next_synthetic_id)
    }

    /// Write `id` into every in-bounds, non-NODATA pixel of `region`, moving
    /// pixel counts from the previous owners. Returns how many cells changed.
    fn paint(&mut self, region: &Region, id: ClusterId) -> u64 {
        let (raster, registry) = self.composite.parts_mut();
        let width = raster.width();
        let height = raster.height();
        let provenance = self.provenance.data_mut();
        let cells = raster.data_mut();

        let mut moved: HashMap<ClusterId, i64> = HashMap::new();
        let mut painted = 0u64;
        for p in region.iter().filter(|p| p.x < width && p.y < height) {
            let i = p.y * width + p.x;
            let old = cells[i];
            if old == NODATA || old == id {
                continue;
            }
            cells[i] = id;
            provenance[i] = NODATA;
            *moved.entry(old).or_insert(0) -= 1;
            painted += 1;
        }
        for (old, delta) in moved {
            registry.adjust_pixel_count(old, delta);
        }
        registry.adjust_pixel_count(id, painted as i64);
        painted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{CompositeRules, Compositor};
    use crate::raster::GeoTransform;
    use crate::segmented::ClusterLabel;
    use crate::taxonomy::tests::hierarchy;
    use crate::transform::create_segmented;

    fn source(rows: Vec<Vec<ClusterId>>) -> SegmentedRaster {
        let (w, h) = (rows[0].len(), rows.len());
        let r = Raster::from_rows(rows, GeoTransform::from_bounds(0.0, 0.0, w as f64, h as f64, w, h)).unwrap();
        create_segmented(r, |_| ClusterLabel::unlabeled(None))
    }

    /// 4x3 grid: cluster 1 (left column) labeled water; everything else unlabeled.
    fn session() -> RegionLabeler {
        let k5 = source(vec![vec![1, 2, 2, 2], vec![1, 2, 2, 2], vec![1, 3, 3, NODATA]]);
        let labels: HashMap<String, LabelTable> =
            [("k5".to_string(), [(1, "water".to_string())].into_iter().collect())].into_iter().collect();
        let h = Arc::new(hierarchy());
        let composite = Compositor::new(Arc::clone(&h), CompositeRules::default())
            .compose(&[("k5", &k5)], &labels)
            .unwrap();
        let sources = [("k5".to_string(), k5)].into_iter().collect();
        RegionLabeler::new(composite, sources, labels, h, LabelerOptions::default())
    }

    fn assert_counts_match_rescan(l: &RegionLabeler) {
        let counts = transform::count_pixels(l.composite().raster(), NODATA);
        for c in l.composite().registry().clusters() {
            assert_eq!(c.pixel_count, counts.get(&c.id).copied().unwrap_or(0), "count for {}", c.id);
        }
    }

    #[test]
    fn unlabeled_predicate() {
        let l = session();
        assert!(!l.is_pixel_unlabeled(Pixel::new(0, 0)), "water");
        assert!(l.is_pixel_unlabeled(Pixel::new(1, 0)));
        assert!(!l.is_pixel_unlabeled(Pixel::new(3, 2)), "nodata");
        assert!(!l.is_pixel_unlabeled(Pixel::new(9, 9)), "out of bounds");
    }

    #[test]
    fn region_excludes_labeled_and_nodata() {
        let l = session();
        let region = l.find_contiguous_region(Pixel::new(2, 1), 100);
        assert_eq!(region.len(), 8);
        assert!(region.iter().all(|p| p.x > 0));
        assert!(!region.truncated);

        let capped = l.find_contiguous_region(Pixel::new(2, 1), 3);
        assert_eq!(capped.len(), 3);
        assert!(capped.truncated);
    }

    #[test]
    fn same_path_reuses_synthetic_id() {
        let mut l = session();
        let a: Region = [Pixel::new(1, 0), Pixel::new(2, 0)].into_iter().collect();
        let b: Region = [Pixel::new(1, 2)].into_iter().collect();
        let id_a = l.label_region(&a, "land.forest").unwrap();
        let id_b = l.label_region(&b, "land.forest").unwrap();
        assert_eq!(id_a, SYNTHETIC_START);
        assert_eq!(id_a, id_b);
        assert_eq!(l.composite().cluster_by_id(id_a).unwrap().pixel_count, 3);
        assert_eq!(l.next_synthetic_id(), SYNTHETIC_START + 1);

        let other = l.label_region(&[Pixel::new(3, 0)].into_iter().collect(), "water").unwrap();
        assert_eq!(other, SYNTHETIC_START + 1);
        assert_counts_match_rescan(&l);
    }

    #[test]
    fn labeled_pixels_leave_the_unlabeled_pool() {
        let mut l = session();
        let region = l.find_contiguous_region(Pixel::new(1, 0), 100);
        l.label_region(&region, "land").unwrap();
        assert!(!l.is_pixel_unlabeled(Pixel::new(1, 0)));
        assert!(l.find_contiguous_region(Pixel::new(2, 2), 100).is_empty());
        assert_eq!(l.composite().classification(2, 2), "land");
    }

    #[test]
    fn failed_label_leaves_state_untouched() {
        let mut l = session();
        let before = l.composite().clone();
        let region: Region = [Pixel::new(1, 0)].into_iter().collect();
        assert!(matches!(l.label_region(&region, "sky"), Err(Error::NoColorMapping { .. })));
        assert_eq!(l.composite(), &before);
        assert!(l.synthetic_labels().is_empty());
    }

    #[test]
    fn region_without_paintable_pixels_registers_nothing() {
        let mut l = session();
        let before = l.composite().clone();
        let empty = Region::default();
        assert!(matches!(l.label_region(&empty, "water"), Err(Error::EmptyRegion)));
        let off_grid: Region = [Pixel::new(3, 2), Pixel::new(9, 9)].into_iter().collect();
        assert!(matches!(l.label_region(&off_grid, "water"), Err(Error::EmptyRegion)));

        assert_eq!(l.composite(), &before);
        assert!(!l.composite().registry().has(SYNTHETIC_START));
        assert_eq!(l.next_synthetic_id(), SYNTHETIC_START);
        assert!(l.synthetic_labels().is_empty());
    }

    #[test]
    fn level_change_recolors_synthetic_clusters() {
        let mut l = session();
        let id = l.label_region(&[Pixel::new(1, 0)].into_iter().collect(), "land.cropland.rice").unwrap();
        assert_eq!(l.composite().registry().color(id), Some(Rgb::new(250, 220, 0)));

        l.set_hierarchy_level(Some(1)).unwrap();
        assert_eq!(l.options().hierarchy_level, Some(1));
        assert_eq!(l.composite().registry().color(id), Some(Rgb::new(0xa0, 0x52, 0x2d)));
        assert_eq!(l.composite().registry().to_color_map().get(&id), Some(&Some(Rgb::new(0xa0, 0x52, 0x2d))));
        assert_eq!(l.composite().classification(1, 0), "land.cropland.rice");

        l.set_hierarchy_level(None).unwrap();
        assert_eq!(l.composite().registry().color(id), Some(Rgb::new(250, 220, 0)));
        assert_counts_match_rescan(&l);
    }

    #[test]
    fn overlaps_report_labeled_synthetic_clusters() {
        let mut l = session();
        let id = l.label_region(&[Pixel::new(1, 0)].into_iter().collect(), "land.forest").unwrap();
        let drawn: Region = [Pixel::new(0, 0), Pixel::new(1, 0), Pixel::new(2, 0)].into_iter().collect();
        let overlaps = l.check_for_overlaps(&drawn);
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps.get(&id).map(String::as_str), Some("land.forest"));
    }

    #[test]
    fn merge_keeps_counts_exact() {
        let mut l = session();
        let id = l.label_region(&[Pixel::new(1, 0)].into_iter().collect(), "land").unwrap();
        let more: Region = [Pixel::new(2, 0), Pixel::new(3, 0), Pixel::new(3, 2)].into_iter().collect();
        assert!(l.handle_merge_with_existing(&more, id));
        assert_eq!(l.composite().cluster_by_id(id).unwrap().pixel_count, 3, "nodata pixel skipped");
        assert_counts_match_rescan(&l);

        assert!(!l.handle_merge_with_existing(&more, 1));
        assert!(!l.handle_merge_with_existing(&more, SYNTHETIC_START + 40));
    }

    #[test]
    fn counter_resumes_after_existing_synthetic_ids() {
        let mut l = session();
        l.label_region(&[Pixel::new(1, 0)].into_iter().collect(), "land").unwrap();
        l.label_region(&[Pixel::new(2, 0)].into_iter().collect(), "water").unwrap();
        let composite = l.into_composite();

        let reopened = RegionLabeler::new(
            Composite {
                provenance: composite.raster().create_empty(NODATA),
                segmented: composite,
                order: Vec::new(),
                assignments: Vec::new(),
            },
            HashMap::new(),
            HashMap::new(),
            Arc::new(hierarchy()),
            LabelerOptions::default(),
        );
        assert_eq!(reopened.next_synthetic_id(), SYNTHETIC_START + 2);
        assert_eq!(reopened.synthetic_labels().len(), 2);
    }

    #[test]
    fn neighborhood_is_sorted_by_frequency() {
        let l = session();
        let region: Region = [Pixel::new(1, 1)].into_iter().collect();
        let n = l.analyze_neighborhood(&region);
        assert_eq!(n, vec![NeighborLabel { classification_path: "water".into(), count: 3 }]);
    }

    #[test]
    fn recount_is_idempotent_after_incremental_updates() {
        let mut l = session();
        l.label_region(&l.find_contiguous_region(Pixel::new(1, 0), 100), "land").unwrap();
        let before = l.composite().registry().clone();
        l.recount_pixels();
        assert_eq!(l.composite().registry(), &before);
    }
}

//! Stateless raster algebra: merge, aggregation, region growth, remapping and
//! pixel counting. Every function returns a new value and leaves its inputs
//! untouched.
pub mod aggregate;
pub mod count;
pub mod region;

use std::collections::{BTreeSet, HashMap};

use crate::coords::Pixel;
use crate::error::Result;
use crate::ids::{ClusterId, NODATA};
use crate::raster::Raster;
use crate::registry::{ClusterRecord, ClusterRegistry};
use crate::segmented::{ClusterLabel, SegmentedRaster};

pub use aggregate::{aggregate, Aggregate, Assignment};
#[cfg(feature = "threading")]
pub use count::ParallelCounter;
pub use count::{count_pixels, PixelCounter, ScalarCounter};
pub use region::{find_region, find_region_where, Region};

/// Pixel-wise combination of two equal-shaped rasters. The result keeps
/// `a`'s georeferencing and metadata.
pub fn merge(
    a: &Raster,
    b: &Raster,
    mut decide: impl FnMut(ClusterId, ClusterId, Pixel) -> ClusterId,
) -> Result<Raster> {
    a.ensure_same_shape(b)?;
    let data = a
        .pixels()
        .zip(b.data())
        .map(|((p, va), &vb)| decide(va, vb, p))
        .collect();
    Ok(a.with_data(data))
}

/// Collapse clusters that share a derived key into one cluster each.
///
/// New ids start at 1 in first-seen (row-major) order. Each group takes its
/// classification and color from the first registered cluster seen for it.
/// NODATA stays NODATA.
pub fn aggregate_by_key(
    seg: &SegmentedRaster,
    mut key_fn: impl FnMut(ClusterId, Option<&ClusterRecord>) -> String,
) -> SegmentedRaster {
    let mut key_to_id: HashMap<String, ClusterId> = HashMap::new();
    let mut id_cache: HashMap<ClusterId, ClusterId> = HashMap::new();
    let mut labels: HashMap<ClusterId, Option<ClusterLabel>> = HashMap::new();
    let mut next_id: ClusterId = 1;

    let raster = seg.raster().map(|_, v| {
        if v == NODATA {
            return NODATA;
        }
        if let Some(&id) = id_cache.get(&v) {
            return id;
        }
        let record = seg.cluster_by_id(v);
        let id = *key_to_id.entry(key_fn(v, record)).or_insert_with(|| {
            next_id += 1;
            next_id - 1
        });
        let label = labels.entry(id).or_insert(None);
        if label.is_none() {
            *label = record.map(|c| ClusterLabel::new(c.classification_path.clone(), c.color));
        }
        id_cache.insert(v, id);
        id
    });

    SegmentedRaster::new(raster, ClusterRegistry::new()).rebuild_registry(|id| {
        labels
            .get(&id)
            .cloned()
            .flatten()
            .unwrap_or_else(|| ClusterLabel::unlabeled(None))
    })
}

/// Apply `f` to every value.
pub fn remap(raster: &Raster, mut f: impl FnMut(ClusterId) -> ClusterId) -> Raster {
    raster.map(|_, v| f(v))
}

/// Copy of `raster` with every in-bounds pixel of `region` set to `value`.
pub fn fill_region(raster: &Raster, region: &[Pixel], value: ClusterId) -> Raster {
    let mut out = raster.clone();
    let w = out.width();
    let h = out.height();
    let data = out.data_mut();
    for p in region.iter().filter(|p| p.x < w && p.y < h) {
        data[p.y * w + p.x] = value;
    }
    out
}

/// Keep only `keep`; every other pixel becomes `fill`. Registry entries of
/// kept ids are carried over unchanged.
pub fn filter_clusters(seg: &SegmentedRaster, keep: &BTreeSet<ClusterId>, fill: ClusterId) -> SegmentedRaster {
    let raster = seg.raster().map(|_, v| if keep.contains(&v) { v } else { fill });
    let registry = keep
        .iter()
        .filter_map(|&id| seg.cluster_by_id(id).cloned())
        .collect();
    SegmentedRaster::new(raster, registry)
}

/// Register every non-NODATA id in `raster` with its pixel count and the
/// label `f` picks for it.
pub fn create_segmented(raster: Raster, f: impl FnMut(ClusterId) -> ClusterLabel) -> SegmentedRaster {
    SegmentedRaster::new(raster, ClusterRegistry::new()).rebuild_registry(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::raster::GeoTransform;

    fn raster(rows: Vec<Vec<ClusterId>>) -> Raster {
        let (w, h) = (rows[0].len(), rows.len());
        Raster::from_rows(rows, GeoTransform::from_bounds(0.0, 0.0, w as f64, h as f64, w, h)).unwrap()
    }

    #[test]
    fn merge_applies_decision_with_coordinates() {
        let a = raster(vec![vec![1, 2], vec![3, 4]]);
        let b = raster(vec![vec![10, 20], vec![30, 40]]);
        let m = merge(&a, &b, |x, y, p| x + y + (p.x * 100 + p.y * 1000) as ClusterId).unwrap();
        assert_eq!(m.to_rows(), vec![vec![11, 122], vec![1033, 1144]]);
    }

    #[test]
    fn merge_rejects_mismatched_shapes() {
        let a = raster(vec![vec![1, 2]]);
        let b = raster(vec![vec![1], vec![2]]);
        assert!(merge(&a, &b, |x, _, _| x).is_err());
    }

    #[test]
    fn aggregate_by_key_renumbers_in_first_seen_order() {
        let seg = create_segmented(raster(vec![vec![7, 3, NODATA], vec![3, 9, 7]]), |id| match id {
            7 | 9 => ClusterLabel::new("water", Some(Rgb::new(0, 0, 255))),
            _ => ClusterLabel::new("land", Some(Rgb::new(0, 255, 0))),
        });
        let out = aggregate_by_key(&seg, |_, c| c.map_or(String::new(), |c| c.classification_path.clone()));
        assert_eq!(out.raster().to_rows(), vec![vec![1, 2, NODATA], vec![2, 1, 1]]);
        assert_eq!(out.cluster_by_id(1).unwrap().pixel_count, 3);
        assert_eq!(out.cluster_by_id(1).unwrap().classification_path, "water");
        assert_eq!(out.cluster_by_id(2).unwrap().color, Some(Rgb::new(0, 255, 0)));
        assert_eq!(out.registry().len(), 2);
    }

    #[test]
    fn fill_region_ignores_out_of_bounds_and_preserves_source() {
        let r = raster(vec![vec![0, 0], vec![0, 0]]);
        let filled = fill_region(&r, &[Pixel::new(1, 1), Pixel::new(5, 5)], 8);
        assert_eq!(filled.to_rows(), vec![vec![0, 0], vec![0, 8]]);
        assert_eq!(r.get(1, 1), Some(0));
    }

    #[test]
    fn filter_clusters_keeps_selected_ids() {
        let seg = create_segmented(raster(vec![vec![1, 2, 3]]), |_| ClusterLabel::unlabeled(None));
        let keep: BTreeSet<ClusterId> = [1, 3, 42].into_iter().collect();
        let out = filter_clusters(&seg, &keep, NODATA);
        assert_eq!(out.raster().data(), &[1, NODATA, 3]);
        assert_eq!(out.registry().ids(), vec![1, 3]);
    }

    #[test]
    fn remap_is_value_only() {
        let r = raster(vec![vec![1, 2, 3]]);
        assert_eq!(remap(&r, |v| v * 10).data(), &[10, 20, 30]);
    }
}

//! Constructors for the segmented rasters the labeling workflow uses.
use crate::error::Result;
use crate::ids::{self, NODATA, UNLABELED_PATH};
use crate::raster::Raster;
use crate::registry::{ClusterRegistry, ColorTable};
use crate::segmented::{ClusterLabel, SegmentedRaster};
use crate::transform;

/// A source segmentation as delivered by the loader: every cluster starts
/// unlabeled with its color from `table`. The table's no-data value is
/// normalized to NODATA.
pub fn from_color_table(raster: Raster, table: &ColorTable) -> SegmentedRaster {
    let raster = if table.nodata_value != NODATA {
        let nodata = table.nodata_value;
        transform::remap(&raster, |v| if v == nodata { NODATA } else { v })
    } else {
        raster
    };
    transform::create_segmented(raster, |id| ClusterLabel::unlabeled(table.color(id)))
}

/// An all-NODATA raster shaped like `reference`, ready to receive synthetic clusters.
pub fn synthetic(reference: &Raster) -> SegmentedRaster {
    SegmentedRaster::empty_like(reference)
}

/// The composite overlaid on the segmentation currently on screen.
///
/// Labeled composite pixels keep their ids. `UNLABELED` pixels take the
/// current segmentation's id shifted into the fine-grain range, so the
/// analyst still sees cluster boundaries there. Labeled clusters are then
/// collapsed to one id per classification path; unlabeled fine-grain
/// clusters stay distinct.
pub fn interactive(composite: &SegmentedRaster, current: &SegmentedRaster) -> Result<SegmentedRaster> {
    let merged = transform::merge(composite.raster(), current.raster(), |c, v, _| {
        if ids::is_nodata(c) || (ids::is_nodata(v) && ids::is_unlabeled(c)) {
            NODATA
        } else if ids::is_unlabeled(c) {
            v + ids::FINE_GRAIN_START
        } else {
            c
        }
    })?;

    let mut registry: ClusterRegistry = composite
        .registry()
        .clusters()
        .into_iter()
        .filter(|c| !ids::is_unlabeled(c.id))
        .cloned()
        .collect();
    for c in current.registry().clusters() {
        registry.add(c.id + ids::FINE_GRAIN_START, c.pixel_count, UNLABELED_PATH, c.color);
    }

    let merged = SegmentedRaster::new(merged, registry);
    Ok(transform::aggregate_by_key(&merged, |id, c| match c {
        Some(c) if c.is_labeled() => c.classification_path.clone(),
        _ => format!("{UNLABELED_PATH}#{id}"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::ids::UNLABELED;
    use crate::raster::GeoTransform;

    fn raster(rows: Vec<Vec<i32>>) -> Raster {
        let (w, h) = (rows[0].len(), rows.len());
        Raster::from_rows(rows, GeoTransform::from_bounds(0.0, 0.0, w as f64, h as f64, w, h)).unwrap()
    }

    #[test]
    fn color_table_sources_start_unlabeled() {
        let table: ColorTable =
            serde_json::from_str(r#"{"colors": [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]], "nodataValue": 255}"#).unwrap();
        let seg = from_color_table(raster(vec![vec![0, 1, 255]]), &table);
        assert_eq!(seg.raster().data(), &[0, 1, NODATA]);
        assert_eq!(seg.registry().ids(), vec![0, 1]);
        assert_eq!(seg.color(1, 0), Some(Rgb::new(0, 0, 255)));
        assert!(seg.registry().clusters().iter().all(|c| !c.is_labeled()));
    }

    #[test]
    fn synthetic_is_empty() {
        let s = synthetic(&raster(vec![vec![1, 2]]));
        assert_eq!(s.raster().data(), &[NODATA, NODATA]);
        assert!(s.registry().is_empty());
    }

    #[test]
    fn interactive_keeps_labels_and_exposes_fine_grain() {
        let mut reg = ClusterRegistry::new();
        reg.add(1, 2, "water", Some(Rgb::new(0, 0, 255)));
        reg.add(2, 1, "water", Some(Rgb::new(0, 0, 255)));
        reg.add(UNLABELED, 2, UNLABELED_PATH, None);
        let composite = SegmentedRaster::new(raster(vec![vec![1, 1, UNLABELED, UNLABELED, 2, NODATA]]), reg);
        let current = transform::create_segmented(raster(vec![vec![4, 4, 4, 5, 5, 5]]), |_| ClusterLabel::unlabeled(None));

        let out = interactive(&composite, &current).unwrap();
        let data = out.raster().data();
        assert_eq!(data[0], data[1]);
        assert_eq!(data[0], data[4], "both water clusters collapse");
        assert_ne!(data[2], data[3], "fine-grain clusters stay distinct");
        assert_eq!(data[5], NODATA);
        assert_eq!(out.classification(4, 0), "water");
        assert_eq!(out.classification(2, 0), "unlabeled");
        assert_eq!(out.cluster_by_id(data[0]).unwrap().pixel_count, 3);
    }
}

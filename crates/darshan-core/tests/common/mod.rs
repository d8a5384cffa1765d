#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use darshan_core::{
    ClassificationHierarchy, ClusterId, ClusterLabel, GeoTransform, LabelTable, ProjectionMetadata, Raster,
    RasterMetadata, SegmentedRaster,
};

pub const TREE: &str = r#"{
    "a": { "b": { "c": {} }, "d": {} },
    "land": { "cropland": { "rice": {} }, "forest": {} },
    "water": { "_description": "open water" }
}"#;

pub const COLORS: &str = r##"{
    "a": "#112233",
    "land": "rgb(160, 82, 45)",
    "land.forest": "#0b6623",
    "water": "#0000ff"
}"##;

pub fn hierarchy() -> Arc<ClassificationHierarchy> {
    Arc::new(ClassificationHierarchy::from_json(TREE, COLORS).unwrap())
}

/// Deterministic pseudo-random stream (Knuth MMIX constants).
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    pub fn below(&mut self, n: u32) -> u32 {
        self.next_u32() % n
    }
}

/// A 1°-per-pixel WGS84 raster whose upper-left corner sits at (0, h).
pub fn raster(rows: Vec<Vec<ClusterId>>) -> Raster {
    let (w, h) = (rows[0].len(), rows.len());
    Raster::from_rows(rows, GeoTransform::from_bounds(0.0, 0.0, w as f64, h as f64, w, h))
        .unwrap()
        .with_metadata(RasterMetadata {
            nodata_value: Some(-1),
            projection: Some(ProjectionMetadata::wgs84(0.0, h as f64, 1.0, 1.0)),
        })
}

pub fn random_raster(rng: &mut Lcg, w: usize, h: usize, ids: u32) -> Raster {
    let rows = (0..h)
        .map(|_| (0..w).map(|_| rng.below(ids) as ClusterId).collect())
        .collect();
    raster(rows)
}

pub fn source(rows: Vec<Vec<ClusterId>>) -> SegmentedRaster {
    darshan_core::transform::create_segmented(raster(rows), |_| ClusterLabel::unlabeled(None))
}

pub fn labels(entries: &[(&str, &[(ClusterId, &str)])]) -> HashMap<String, LabelTable> {
    entries
        .iter()
        .map(|(key, table)| {
            let table: LabelTable = table.iter().map(|&(id, p)| (id, p.to_string())).collect();
            (key.to_string(), table)
        })
        .collect()
}

//! Priority aggregation of several labeled segmentations into one raster.
//!
//! Two passes, deterministic for a given source list and priority:
//!
//! 1. Walk sources in priority order and give every labeled cluster
//!    (`classification_path != "unlabeled"`) a fresh id counting up from 1.
//! 2. For every pixel take the first source, in priority order, whose cluster
//!    there is labeled. Pixels nobody labeled become `UNLABELED`; pixels that
//!    are NODATA in the top-priority source stay NODATA.
//!
//! Pixel counts are recomputed from the final grid.
use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::compositor::Priority;
use crate::error::{Error, Result};
use crate::ids::{ClusterId, NODATA, UNLABELED, UNLABELED_PATH};
use crate::raster::Raster;
use crate::registry::{ClusterRecord, ClusterRegistry};
use crate::segmented::SegmentedRaster;

/// One labeled source cluster and the composite id it received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub composite_id: ClusterId,
    pub source_key: String,
    pub source_id: ClusterId,
    pub classification_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub composite: SegmentedRaster,
    /// Per pixel: index into `order` of the source that supplied the label,
    /// or NODATA when no source did.
    pub provenance: Raster,
    /// Source keys in priority order.
    pub order: Vec<String>,
    /// Pass-1 assignments in id order.
    pub assignments: Vec<Assignment>,
}

pub fn aggregate(sources: &[(&str, &SegmentedRaster)], priority: Priority) -> Result<Aggregate> {
    let Some(&(_, first)) = sources.first() else {
        return Err(Error::EmptyInput);
    };
    for (_, s) in &sources[1..] {
        first.raster().ensure_same_shape(s.raster())?;
    }

    let keys: Vec<&str> = sources.iter().map(|&(k, _)| k).collect();
    let order = priority.order(&keys);
    let ordered: Vec<(&str, &SegmentedRaster)> = order.iter().map(|&i| sources[i]).collect();

    // ── Pass 1: unique ids for labeled clusters ──────────────────────────────
    let mut next_id: ClusterId = 1;
    let mut assignments = Vec::new();
    let mut lookup: Vec<HashMap<ClusterId, ClusterId>> = Vec::with_capacity(ordered.len());
    let mut records = Vec::new();

    for &(key, seg) in &ordered {
        let mut map = HashMap::new();
        for c in seg.registry().clusters() {
            if !c.is_labeled() {
                continue;
            }
            if next_id >= UNLABELED {
                return Err(Error::IdSpaceExhausted { what: "composite cluster ids" });
            }
            map.insert(c.id, next_id);
            records.push(ClusterRecord::new(next_id, 0, c.classification_path.clone(), c.color));
            assignments.push(Assignment {
                composite_id: next_id,
                source_key: key.to_string(),
                source_id: c.id,
                classification_path: c.classification_path.clone(),
            });
            next_id += 1;
        }
        lookup.push(map);
    }

    // ── Pass 2: first labeled source wins per pixel ──────────────────────────
    let reference = ordered[0].1.raster();
    let len = reference.data().len();
    let mut values = Vec::with_capacity(len);
    let mut origin = Vec::with_capacity(len);

    for idx in 0..len {
        if reference.data()[idx] == NODATA {
            values.push(NODATA);
            origin.push(NODATA);
            continue;
        }
        let hit = ordered.iter().zip(&lookup).enumerate().find_map(|(rank, ((_, seg), map))| {
            map.get(&seg.raster().data()[idx]).map(|&id| (id, rank as ClusterId))
        });
        match hit {
            Some((id, rank)) => {
                values.push(id);
                origin.push(rank);
            }
            None => {
                values.push(UNLABELED);
                origin.push(NODATA);
            }
        }
    }

    let raster = reference.with_data(values);
    let provenance = reference.with_data(origin);

    let counts = super::count_pixels(&raster, NODATA);
    let mut registry: ClusterRegistry = records.into_iter().collect();
    for (&id, &n) in &counts {
        registry.update_pixel_count(id, n);
    }
    if let Some(&n) = counts.get(&UNLABELED) {
        registry.add(UNLABELED, n, UNLABELED_PATH, None);
    }

    debug!(
        sources = ordered.len(),
        labeled_clusters = assignments.len(),
        unlabeled_pixels = counts.get(&UNLABELED).copied().unwrap_or(0),
        "aggregated segmentations"
    );

    Ok(Aggregate {
        composite: SegmentedRaster::new(raster, registry),
        provenance,
        order: ordered.iter().map(|&(k, _)| k.to_string()).collect(),
        assignments,
    })
}

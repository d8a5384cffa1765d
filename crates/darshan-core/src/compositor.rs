//! Composite building: apply analyst label tables to each source segmentation
//! and aggregate them by priority.
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::ids::{self, ClusterId};
use crate::raster::Raster;
use crate::segmented::SegmentedRaster;
use crate::taxonomy::ClassificationHierarchy;
use crate::transform::{self, Assignment};

/// Analyst labels for one segmentation: source cluster id → classification path.
pub type LabelTable = BTreeMap<ClusterId, String>;

// ── Configuration ────────────────────────────────────────────────────────────

/// Total order over segmentation keys used to break per-pixel conflicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Finest granularity (largest k) first.
    #[default]
    HighestK,
    /// Coarsest granularity first.
    LowestK,
    /// Most specific segmentation first; ordered like `HighestK`.
    MostSpecific,
}

impl Priority {
    /// Indices of `keys` in priority order. Keys without a k-value go last;
    /// equal ranks keep their input order.
    pub fn order(self, keys: &[&str]) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..keys.len()).collect();
        match self {
            Priority::HighestK | Priority::MostSpecific => idx.sort_by_key(|&i| {
                let k = k_value(keys[i]);
                (k.is_none(), Reverse(k.unwrap_or(0)))
            }),
            Priority::LowestK => idx.sort_by_key(|&i| {
                let k = k_value(keys[i]);
                (k.is_none(), k.unwrap_or(0))
            }),
        }
        idx
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeRules {
    pub priority: Priority,
}

/// Granularity encoded in a segmentation key: the digits after the first
/// `k` that is followed by a digit (`"k10"` → 10, `"seg_k25_v2"` → 25).
pub fn k_value(key: &str) -> Option<u32> {
    let bytes = key.as_bytes();
    let start = bytes
        .windows(2)
        .position(|w| w[0] == b'k' && w[1].is_ascii_digit())?
        + 1;
    let len = bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count();
    key[start..start + len].parse().ok()
}

// ── Composite ────────────────────────────────────────────────────────────────

/// Output of [`Compositor::compose`].
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub segmented: SegmentedRaster,
    /// Per pixel: index into `order` of the segmentation that supplied the
    /// label, NODATA where none did.
    pub provenance: Raster,
    /// Segmentation keys in priority order.
    pub order: Vec<String>,
    pub assignments: Vec<Assignment>,
}

impl Composite {
    /// Key of the segmentation that labeled `(x, y)`, if any.
    pub fn owner(&self, x: isize, y: isize) -> Option<&str> {
        let rank = self.provenance.get(x, y)?;
        usize::try_from(rank).ok().and_then(|r| self.order.get(r)).map(String::as_str)
    }
}

/// Builds composites against one taxonomy.
#[derive(Debug, Clone)]
pub struct Compositor {
    hierarchy: Arc<ClassificationHierarchy>,
    rules: CompositeRules,
}

impl Compositor {
    pub fn new(hierarchy: Arc<ClassificationHierarchy>, rules: CompositeRules) -> Self {
        Self { hierarchy, rules }
    }

    pub fn rules(&self) -> CompositeRules {
        self.rules
    }

    /// Combine `sources` under their label tables.
    ///
    /// A source without a label table contributes nothing. Labels are
    /// colored at full depth; every path must resolve or the whole call fails
    /// before anything is built. The sources themselves are not modified.
    pub fn compose(
        &self,
        sources: &[(&str, &SegmentedRaster)],
        labels: &HashMap<String, LabelTable>,
    ) -> Result<Composite> {
        let empty = LabelTable::new();
        let mut labeled = Vec::with_capacity(sources.len());
        for &(key, seg) in sources {
            let table = labels.get(key).unwrap_or(&empty);
            labeled.push(self.apply_labels(seg, table)?);
            debug!(segmentation = key, labels = table.len(), "applied label table");
        }

        let refs: Vec<(&str, &SegmentedRaster)> = sources
            .iter()
            .zip(&labeled)
            .map(|(&(key, _), seg)| (key, seg))
            .collect();
        let agg = transform::aggregate(&refs, self.rules.priority)?;

        info!(
            sources = agg.order.len(),
            priority = ?self.rules.priority,
            clusters = agg.assignments.len(),
            width = agg.composite.width(),
            height = agg.composite.height(),
            "composite built"
        );

        Ok(Composite {
            segmented: agg.composite,
            provenance: agg.provenance,
            order: agg.order,
            assignments: agg.assignments,
        })
    }

    /// Copy of `seg` whose registry reflects `table`: listed ids take their
    /// path and hierarchy color, every other id becomes unlabeled.
    fn apply_labels(&self, seg: &SegmentedRaster, table: &LabelTable) -> Result<SegmentedRaster> {
        let mut registry = seg.registry().clone();
        for id in registry.ids() {
            if !table.contains_key(&id) {
                let color = registry.color(id);
                registry.update_classification(id, ids::UNLABELED_PATH, color);
            }
        }
        for (&id, path) in table {
            if ids::is_unlabeled_path(path) {
                let color = registry.color(id);
                registry.upsert(id, ids::UNLABELED_PATH, color);
                continue;
            }
            let color = self.hierarchy.color_for_path(path, None)?;
            registry.upsert(id, path, Some(color));
        }
        Ok(seg.with_registry(registry))
    }
}

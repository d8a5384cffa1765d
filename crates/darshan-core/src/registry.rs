//! Cluster id → metadata table.
//!
//! Records sit behind a shared pointer: cloning a registry is O(1), and the
//! first write through a shared handle copies the table (copy-on-write). A
//! registry handed to another owner therefore never observes later edits.
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::ids::{self, ClusterId, NODATA, UNLABELED_PATH};

/// Metadata for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub pixel_count: u64,
    /// Dot-separated taxonomy path, or `"unlabeled"`.
    pub classification_path: String,
    /// `None` only for sentinel / unlabeled entries.
    pub color: Option<Rgb>,
}

impl ClusterRecord {
    pub fn new(id: ClusterId, pixel_count: u64, classification_path: impl Into<String>, color: Option<Rgb>) -> Self {
        let path = classification_path.into();
        Self {
            id,
            pixel_count,
            classification_path: if path.is_empty() { UNLABELED_PATH.to_string() } else { path },
            color,
        }
    }

    pub fn is_labeled(&self) -> bool {
        !ids::is_unlabeled_path(&self.classification_path)
    }

    /// Area in hectares at the nominal 10 m pixel size.
    pub fn area_ha(&self) -> f64 {
        self.pixel_count as f64 * 0.01
    }
}

/// Per-segmentation color table as exchanged with the data loader:
/// `colors_rgb[id]` is `[r, g, b]` in `0..=1`, or null when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorTable {
    #[serde(default = "cluster_specific")]
    pub method: String,
    #[serde(alias = "colors")]
    pub colors_rgb: Vec<Option<[f32; 3]>>,
    #[serde(alias = "nodataValue", default = "default_nodata")]
    pub nodata_value: ClusterId,
}

fn cluster_specific() -> String {
    "cluster_specific".to_string()
}

fn default_nodata() -> ClusterId {
    NODATA
}

impl ColorTable {
    pub fn color(&self, id: ClusterId) -> Option<Rgb> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.colors_rgb.get(i).copied().flatten())
            .map(Rgb::from_unit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterRegistry {
    clusters: Arc<HashMap<ClusterId, ClusterRecord>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn records_mut(&mut self) -> &mut HashMap<ClusterId, ClusterRecord> {
        Arc::make_mut(&mut self.clusters)
    }

    /// Insert or replace the record for `id`.
    pub fn add(&mut self, id: ClusterId, pixel_count: u64, classification_path: impl Into<String>, color: Option<Rgb>) {
        self.records_mut()
            .insert(id, ClusterRecord::new(id, pixel_count, classification_path, color));
    }

    /// Reclassify `id`, registering it with a zero pixel count first if absent.
    pub fn upsert(&mut self, id: ClusterId, classification_path: &str, color: Option<Rgb>) {
        if !self.update_classification(id, classification_path, color) {
            self.add(id, 0, classification_path, color);
        }
    }

    pub fn get(&self, id: ClusterId) -> Option<&ClusterRecord> {
        self.clusters.get(&id)
    }

    pub fn has(&self, id: ClusterId) -> bool {
        self.clusters.contains_key(&id)
    }

    /// Classification path of `id`; `"unlabeled"` for unknown ids.
    pub fn classification(&self, id: ClusterId) -> &str {
        self.clusters
            .get(&id)
            .map_or(UNLABELED_PATH, |c| c.classification_path.as_str())
    }

    pub fn color(&self, id: ClusterId) -> Option<Rgb> {
        self.clusters.get(&id).and_then(|c| c.color)
    }

    /// Reclassify an existing cluster. Returns false when `id` is not
    /// registered; ids must be added before they can be classified.
    pub fn update_classification(&mut self, id: ClusterId, classification_path: &str, color: Option<Rgb>) -> bool {
        if !self.has(id) {
            return false;
        }
        if let Some(c) = self.records_mut().get_mut(&id) {
            c.classification_path = if classification_path.is_empty() {
                UNLABELED_PATH.to_string()
            } else {
                classification_path.to_string()
            };
            c.color = color;
        }
        true
    }

    /// A new registry with `id` reclassified; `self` is unchanged.
    /// `None` when `id` is not registered.
    pub fn with_classification(&self, id: ClusterId, classification_path: &str, color: Option<Rgb>) -> Option<Self> {
        let mut next = self.clone();
        next.update_classification(id, classification_path, color).then_some(next)
    }

    pub fn update_pixel_count(&mut self, id: ClusterId, pixel_count: u64) -> bool {
        if !self.has(id) {
            return false;
        }
        if let Some(c) = self.records_mut().get_mut(&id) {
            c.pixel_count = pixel_count;
        }
        true
    }

    /// Shift the pixel count of `id` by `delta`, saturating at zero.
    pub(crate) fn adjust_pixel_count(&mut self, id: ClusterId, delta: i64) -> bool {
        if !self.has(id) {
            return false;
        }
        if let Some(c) = self.records_mut().get_mut(&id) {
            c.pixel_count = c.pixel_count.saturating_add_signed(delta);
        }
        true
    }

    pub fn remove(&mut self, id: ClusterId) -> bool {
        if !self.has(id) {
            return false;
        }
        self.records_mut().remove(&id).is_some()
    }

    /// Registered ids, ascending.
    pub fn ids(&self) -> Vec<ClusterId> {
        let mut ids: Vec<ClusterId> = self.clusters.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Records ordered by id.
    pub fn clusters(&self) -> Vec<&ClusterRecord> {
        let mut v: Vec<&ClusterRecord> = self.clusters.values().collect();
        v.sort_unstable_by_key(|c| c.id);
        v
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn to_color_map(&self) -> HashMap<ClusterId, Option<Rgb>> {
        self.clusters.iter().map(|(&id, c)| (id, c.color)).collect()
    }

    /// Dense `colors_rgb` array indexed by id; negative ids are skipped.
    pub fn to_legacy_color_mapping(&self) -> ColorTable {
        let len = self
            .clusters
            .keys()
            .filter_map(|&id| usize::try_from(id).ok())
            .max()
            .map_or(0, |m| m + 1);
        let mut colors_rgb = vec![None; len];
        for (&id, c) in self.clusters.iter() {
            if let Ok(i) = usize::try_from(id) {
                colors_rgb[i] = c.color.map(Rgb::to_unit);
            }
        }
        ColorTable { method: cluster_specific(), colors_rgb, nodata_value: NODATA }
    }
}

impl FromIterator<ClusterRecord> for ClusterRegistry {
    fn from_iter<I: IntoIterator<Item = ClusterRecord>>(iter: I) -> Self {
        Self {
            clusters: Arc::new(iter.into_iter().map(|c| (c.id, c)).collect()),
        }
    }
}

//! Land-cover export: a small-integer classification raster plus the id →
//! path and id → color tables that give it meaning, and the projection tags
//! copied from the source imagery.
//!
//! Only WGS84 geographic sources are accepted. Validation runs every check
//! and reports all failures together.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ids::{ClusterId, NODATA, UNLABELED_PATH};
use crate::raster::GeoTransform;
use crate::segmented::SegmentedRaster;
use crate::taxonomy::{truncate_path, ClassificationHierarchy};

// ── GeoTIFF keys ─────────────────────────────────────────────────────────────

pub const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
pub const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
pub const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;

pub const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
pub const RASTER_PIXEL_IS_AREA: u16 = 1;
pub const GCS_WGS_84: u16 = 4326;

/// Export id for unlabeled and no-data pixels.
pub const EXPORT_UNLABELED: i16 = -1;

/// The three geo keys the export cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoKeys {
    #[serde(rename = "GTModelTypeGeoKey")]
    pub model_type: Option<u16>,
    #[serde(rename = "GTRasterTypeGeoKey")]
    pub raster_type: Option<u16>,
    #[serde(rename = "GeographicTypeGeoKey")]
    pub geographic_type: Option<u16>,
}

impl GeoKeys {
    pub fn wgs84() -> Self {
        Self {
            model_type: Some(MODEL_TYPE_GEOGRAPHIC),
            raster_type: Some(RASTER_PIXEL_IS_AREA),
            geographic_type: Some(GCS_WGS_84),
        }
    }

    /// Read the short-valued keys from a `GeoKeyDirectoryTag` array:
    /// a 4-entry header, then `[key, location, count, value]` per key.
    /// Keys stored out of line (location != 0) are ignored.
    pub fn from_directory(dir: &[u16]) -> Self {
        let mut keys = Self::default();
        let n = dir.get(3).copied().unwrap_or(0) as usize;
        for entry in dir.get(4..).unwrap_or(&[]).chunks_exact(4).take(n) {
            if entry[1] != 0 {
                continue;
            }
            match entry[0] {
                GT_MODEL_TYPE_GEO_KEY => keys.model_type = Some(entry[3]),
                GT_RASTER_TYPE_GEO_KEY => keys.raster_type = Some(entry[3]),
                GEOGRAPHIC_TYPE_GEO_KEY => keys.geographic_type = Some(entry[3]),
                _ => {}
            }
        }
        keys
    }

    /// Encode as a `GeoKeyDirectoryTag` array (version 1.1.0), keys ascending.
    pub fn to_directory(&self) -> Vec<u16> {
        let entries: Vec<[u16; 4]> = [
            (GT_MODEL_TYPE_GEO_KEY, self.model_type),
            (GT_RASTER_TYPE_GEO_KEY, self.raster_type),
            (GEOGRAPHIC_TYPE_GEO_KEY, self.geographic_type),
        ]
        .into_iter()
        .filter_map(|(key, v)| v.map(|v| [key, 0, 1, v]))
        .collect();
        let mut dir = vec![1, 1, 0, entries.len() as u16];
        dir.extend(entries.into_iter().flatten());
        dir
    }
}

/// Projection tags of a source GeoTIFF, copied verbatim on export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionMetadata {
    pub geo_keys: Option<GeoKeys>,
    /// `ModelPixelScaleTag`: `[sx, sy, sz]`.
    #[serde(default)]
    pub model_pixel_scale: Vec<f64>,
    /// `ModelTiepointTag`: `[i, j, k, x, y, z]`.
    #[serde(default)]
    pub model_tiepoint: Vec<f64>,
}

impl ProjectionMetadata {
    /// WGS84 metadata for a north-up raster whose upper-left corner is at
    /// (`origin_lon`, `origin_lat`).
    pub fn wgs84(origin_lon: f64, origin_lat: f64, scale_x: f64, scale_y: f64) -> Self {
        Self {
            geo_keys: Some(GeoKeys::wgs84()),
            model_pixel_scale: vec![scale_x, scale_y, 0.0],
            model_tiepoint: vec![0.0, 0.0, 0.0, origin_lon, origin_lat, 0.0],
        }
    }

    /// Every failed export check; empty when the metadata is usable.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let keys = self.geo_keys.unwrap_or_default();
        if self.geo_keys.is_none() {
            issues.push("missing geoKeys".to_string());
        }
        if self.model_pixel_scale.len() < 3 {
            issues.push("invalid ModelPixelScale".to_string());
        }
        if self.model_tiepoint.len() < 6 {
            issues.push("invalid ModelTiepoint".to_string());
        }
        if keys.geographic_type != Some(GCS_WGS_84) {
            issues.push(format!("not WGS84 (got {})", fmt_key(keys.geographic_type)));
        }
        if keys.model_type != Some(MODEL_TYPE_GEOGRAPHIC) {
            issues.push(format!("not geographic model (got {})", fmt_key(keys.model_type)));
        }
        if keys.raster_type != Some(RASTER_PIXEL_IS_AREA) {
            issues.push(format!("not pixel area (got {})", fmt_key(keys.raster_type)));
        }
        issues
    }

    pub fn validate(&self) -> Result<()> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidProjectionMetadata { issues })
        }
    }

    /// Bounds implied by the tiepoint and pixel scale, assuming the tiepoint
    /// anchors raster (0, 0).
    pub fn geo_transform(&self, width: usize, height: usize) -> Option<GeoTransform> {
        let (&sx, &sy) = (self.model_pixel_scale.first()?, self.model_pixel_scale.get(1)?);
        let (&lon, &lat) = (self.model_tiepoint.get(3)?, self.model_tiepoint.get(4)?);
        Some(GeoTransform::from_origin(lon, lat, sx, sy, width, height))
    }
}

fn fmt_key(v: Option<u16>) -> String {
    v.map_or_else(|| "none".to_string(), |v| v.to_string())
}

/// Validate optional metadata; absent metadata fails every check.
pub fn validate_projection(projection: Option<&ProjectionMetadata>) -> Result<&ProjectionMetadata> {
    match projection {
        Some(p) => p.validate().map(|()| p),
        None => {
            let mut issues = vec!["missing projection metadata".to_string()];
            issues.extend(ProjectionMetadata::default().issues());
            Err(Error::InvalidProjectionMetadata { issues })
        }
    }
}

// ── Classification raster ────────────────────────────────────────────────────

/// Signed sample width of the exported raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    I8,
    I16,
}

impl SampleFormat {
    pub fn for_max_id(max_id: i16) -> Self {
        if max_id < 127 {
            SampleFormat::I8
        } else {
            SampleFormat::I16
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            SampleFormat::I8 => 8,
            SampleFormat::I16 => 16,
        }
    }
}

/// The composite flattened to land-cover ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationExport {
    pub width: usize,
    pub height: usize,
    /// Row-major land-cover ids; `-1` for unlabeled and no-data pixels.
    pub values: Vec<i16>,
    pub sample_format: SampleFormat,
    /// Export id → (level-truncated) classification path. Includes
    /// `-1 → "unlabeled"` when any pixel exports as `-1`.
    pub pixel_mapping: BTreeMap<i16, String>,
    /// Export id → `[r, g, b]` in `0..=1`; `null` for `-1`.
    pub color_mapping: BTreeMap<i16, Option<[f32; 3]>>,
    pub projection: ProjectionMetadata,
    /// Pixels with data but no label; NODATA is not counted.
    pub unlabeled_pixels: u64,
}

impl ClassificationExport {
    /// Distinct labeled paths, truncated to `level`, are sorted and numbered
    /// from 0. Fails on invalid projection metadata, a path with no color,
    /// or more classes than a 16-bit sample holds. Nothing is produced on
    /// failure.
    pub fn build(
        composite: &SegmentedRaster,
        hierarchy: &ClassificationHierarchy,
        level: Option<usize>,
        projection: Option<&ProjectionMetadata>,
    ) -> Result<Self> {
        let projection = validate_projection(projection)?.clone();
        let registry = composite.registry();

        let paths: BTreeSet<&str> = registry
            .clusters()
            .into_iter()
            .filter(|c| c.is_labeled())
            .map(|c| truncate_path(&c.classification_path, level))
            .collect();
        if paths.len() > i16::MAX as usize + 1 {
            return Err(Error::IdSpaceExhausted { what: "export land-cover ids" });
        }

        let mut path_ids: BTreeMap<&str, i16> = BTreeMap::new();
        let mut pixel_mapping = BTreeMap::new();
        let mut color_mapping = BTreeMap::new();
        for (i, path) in paths.into_iter().enumerate() {
            let id = i as i16;
            let color = hierarchy.color_for_path(path, None)?;
            path_ids.insert(path, id);
            pixel_mapping.insert(id, path.to_string());
            color_mapping.insert(id, Some(color.to_unit()));
        }

        let cluster_ids: BTreeMap<ClusterId, i16> = registry
            .clusters()
            .into_iter()
            .filter(|c| c.is_labeled())
            .filter_map(|c| {
                path_ids
                    .get(truncate_path(&c.classification_path, level))
                    .map(|&id| (c.id, id))
            })
            .collect();

        let mut unlabeled_pixels = 0u64;
        let mut nodata_pixels = 0u64;
        let values: Vec<i16> = composite
            .raster()
            .data()
            .iter()
            .map(|v| match cluster_ids.get(v) {
                Some(&id) => id,
                None if *v == NODATA => {
                    nodata_pixels += 1;
                    EXPORT_UNLABELED
                }
                None => {
                    unlabeled_pixels += 1;
                    EXPORT_UNLABELED
                }
            })
            .collect();

        if unlabeled_pixels > 0 {
            warn!(unlabeled_pixels, "exporting unlabeled pixels as -1");
        }
        if unlabeled_pixels + nodata_pixels > 0 {
            pixel_mapping.insert(EXPORT_UNLABELED, UNLABELED_PATH.to_string());
            color_mapping.insert(EXPORT_UNLABELED, None);
        }

        let max_id = pixel_mapping.keys().next_back().copied().unwrap_or(EXPORT_UNLABELED);
        let sample_format = SampleFormat::for_max_id(max_id);
        info!(
            classes = path_ids.len(),
            format = ?sample_format,
            width = composite.width(),
            height = composite.height(),
            "classification export built"
        );

        Ok(Self {
            width: composite.width(),
            height: composite.height(),
            values,
            sample_format,
            pixel_mapping,
            color_mapping,
            projection,
            unlabeled_pixels,
        })
    }

    pub fn value(&self, x: usize, y: usize) -> Option<i16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values.get(y * self.width + x).copied()
    }

    /// Classification path of a pixel, reconstructed from the exported form.
    pub fn classification_at(&self, x: usize, y: usize) -> Option<&str> {
        let v = self.value(x, y)?;
        if v == EXPORT_UNLABELED {
            return Some(UNLABELED_PATH);
        }
        self.pixel_mapping.get(&v).map(String::as_str)
    }

    /// Values narrowed to `i8`; `None` when the sample format is 16-bit.
    pub fn values_i8(&self) -> Option<Vec<i8>> {
        match self.sample_format {
            SampleFormat::I8 => Some(self.values.iter().map(|&v| v as i8).collect()),
            SampleFormat::I16 => None,
        }
    }

    pub fn pixel_mapping_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.pixel_mapping)?)
    }

    pub fn color_mapping_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.color_mapping)?)
    }
}

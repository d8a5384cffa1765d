//! Browser bindings: a labeling session and a one-shot composite builder.
//!
//! Grids cross the boundary as `Int32Array`s in source order; everything
//! else is a JSON document:
//!
//! ```json
//! {
//!   "hierarchy": { "land": { "forest": {} } },
//!   "colors": { "land": "#a0522d" },
//!   "labels": { "k10": { "3": "land.forest" } },
//!   "rules": { "priority": "highest_k" },
//!   "options": { "max_region_pixels": 10000 },
//!   "sources": [ { "key": "k10", "width": 512, "height": 512, "georef": { ... } } ]
//! }
//! ```
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use darshan_core::{
    factory, transform, ClassificationExport, ClassificationHierarchy, ClusterId, ClusterLabel, ColorResolver,
    ColorTable, CompositeRules, Compositor, GeoTransform, LabelTable, LabelerOptions, LatLon, NeighborLabel,
    PixelRenderer, ProjectionMetadata, Raster, RasterMetadata, Region, RegionLabeler, RenderOptions,
    SegmentedRaster, NODATA,
};
use js_sys::{Array, Int32Array};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

// ── Session document ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SessionConfig {
    hierarchy: serde_json::Value,
    #[serde(default)]
    colors: HashMap<String, String>,
    #[serde(default)]
    labels: HashMap<String, LabelTable>,
    #[serde(default)]
    rules: CompositeRules,
    #[serde(default)]
    options: LabelerOptions,
    #[serde(default)]
    render: RenderOptions,
    sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
struct SourceEntry {
    key: String,
    width: usize,
    height: usize,
    georef: GeoTransform,
    #[serde(default)]
    color_table: Option<ColorTable>,
    #[serde(default)]
    projection: Option<ProjectionMetadata>,
}

/// Everything a session needs, decoded and validated.
struct Loaded {
    hierarchy: Arc<ClassificationHierarchy>,
    labels: HashMap<String, LabelTable>,
    rules: CompositeRules,
    options: LabelerOptions,
    render: RenderOptions,
    sources: Vec<(String, SegmentedRaster)>,
}

impl Loaded {
    fn compose(&self) -> darshan_core::Result<darshan_core::Composite> {
        let refs: Vec<(&str, &SegmentedRaster)> = self.sources.iter().map(|(k, s)| (k.as_str(), s)).collect();
        Compositor::new(Arc::clone(&self.hierarchy), self.rules).compose(&refs, &self.labels)
    }
}

fn load(config_json: &str, grids: Vec<Vec<ClusterId>>) -> Result<Loaded, String> {
    let config: SessionConfig = serde_json::from_str(config_json).map_err(|e| format!("invalid session: {e}"))?;
    if config.sources.len() != grids.len() {
        return Err(format!("{} sources but {} grids", config.sources.len(), grids.len()));
    }
    let hierarchy = ClassificationHierarchy::from_parts(&config.hierarchy, &config.colors).map_err(|e| e.to_string())?;

    let mut sources = Vec::with_capacity(grids.len());
    for (entry, data) in config.sources.into_iter().zip(grids) {
        let raster = Raster::new(entry.width, entry.height, data, entry.georef)
            .map_err(|e| format!("source {}: {e}", entry.key))?
            .with_metadata(RasterMetadata { nodata_value: Some(NODATA), projection: entry.projection });
        let seg = match &entry.color_table {
            Some(table) => factory::from_color_table(raster, table),
            None => transform::create_segmented(raster, |_| ClusterLabel::unlabeled(None)),
        };
        sources.push((entry.key, seg));
    }

    Ok(Loaded {
        hierarchy: Arc::new(hierarchy),
        labels: config.labels,
        rules: config.rules,
        options: config.options,
        render: config.render,
        sources,
    })
}

fn grids_from(array: &Array) -> Result<Vec<Vec<ClusterId>>, JsValue> {
    array
        .iter()
        .map(|v| {
            v.dyn_into::<Int32Array>()
                .map(|a| a.to_vec())
                .map_err(|_| JsValue::from_str("grids must be Int32Arrays"))
        })
        .collect()
}

fn js_err(e: impl Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// ── Region summary ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Overlap {
    id: ClusterId,
    classification_path: String,
}

/// What a click found, as handed back to the map widget.
#[derive(Debug, Serialize)]
struct RegionSummary {
    x: usize,
    y: usize,
    pixels: usize,
    truncated: bool,
    overlaps: Vec<Overlap>,
    neighbors: Vec<NeighborLabel>,
}

// ── Bindings ─────────────────────────────────────────────────────────────────

/// Build the composite for a session document and return its grid.
#[wasm_bindgen]
pub fn compose(config_json: &str, grids: &Array) -> Result<Int32Array, JsValue> {
    let loaded = load(config_json, grids_from(grids)?).map_err(js_err)?;
    let composite = loaded.compose().map_err(js_err)?;
    Ok(Int32Array::from(composite.segmented.raster().data()))
}

/// One analyst's click-label-merge loop over a composite.
#[wasm_bindgen]
pub struct LabelingSession {
    labeler: RegionLabeler,
    resolver: ColorResolver,
    render: RenderOptions,
    renderer: Option<PixelRenderer>,
    pending: Option<Region>,
}

#[wasm_bindgen]
impl LabelingSession {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, grids: &Array) -> Result<LabelingSession, JsValue> {
        let loaded = load(config_json, grids_from(grids)?).map_err(js_err)?;
        let composite = loaded.compose().map_err(js_err)?;
        let resolver = ColorResolver::new(Arc::clone(&loaded.hierarchy), loaded.render.hierarchy_level);
        let sources = loaded.sources.into_iter().collect();
        let labeler = RegionLabeler::new(composite, sources, loaded.labels, loaded.hierarchy, loaded.options);
        Ok(Self { labeler, resolver, render: loaded.render, renderer: None, pending: None })
    }

    pub fn width(&self) -> usize {
        self.labeler.composite().width()
    }

    pub fn height(&self) -> usize {
        self.labeler.composite().height()
    }

    /// Current composite grid.
    pub fn grid(&self) -> Int32Array {
        Int32Array::from(self.labeler.composite().raster().data())
    }

    /// Grow the unlabeled region under a click and remember it for
    /// [`Self::label`] / [`Self::merge_into`]. `null` outside the raster.
    pub fn click(&mut self, lat: f64, lon: f64) -> Result<JsValue, JsValue> {
        let ll = LatLon::new(lat, lon);
        let (Some(p), Some(region)) = (self.labeler.latlon_to_pixel(ll), self.labeler.region_at(ll)) else {
            self.pending = None;
            return Ok(JsValue::NULL);
        };
        let summary = RegionSummary {
            x: p.x,
            y: p.y,
            pixels: region.len(),
            truncated: region.truncated,
            overlaps: self
                .labeler
                .check_for_overlaps(&region)
                .into_iter()
                .map(|(id, classification_path)| Overlap { id, classification_path })
                .collect(),
            neighbors: self.labeler.analyze_neighborhood(&region),
        };
        self.pending = (!region.is_empty()).then_some(region);
        serde_wasm_bindgen::to_value(&summary).map_err(js_err)
    }

    /// Label the last clicked region; returns the synthetic id painted.
    pub fn label(&mut self, path: &str) -> Result<i32, JsValue> {
        let region = self.pending.as_ref().ok_or_else(|| JsValue::from_str("no region selected"))?;
        let id = self.labeler.label_region(region, path).map_err(js_err)?;
        self.pending = None;
        self.renderer = None;
        Ok(id)
    }

    /// Fold the last clicked region into an existing synthetic cluster.
    pub fn merge_into(&mut self, id: i32) -> bool {
        let Some(region) = self.pending.take() else {
            return false;
        };
        let merged = self.labeler.handle_merge_with_existing(&region, id);
        if merged {
            self.renderer = None;
        } else {
            self.pending = Some(region);
        }
        merged
    }

    pub fn set_hierarchy_level(&mut self, level: Option<usize>) -> Result<(), JsValue> {
        self.labeler.set_hierarchy_level(level).map_err(js_err)?;
        self.render.hierarchy_level = level;
        self.renderer = None;
        Ok(())
    }

    pub fn select_cluster(&mut self, id: Option<i32>) {
        self.render.selected_cluster = id;
        self.renderer = None;
    }

    /// CSS color for a grid value; `undefined` means transparent.
    pub fn pixel_color(&mut self, value: i32) -> Result<Option<String>, JsValue> {
        if self.renderer.is_none() {
            let renderer =
                PixelRenderer::new(self.labeler.composite(), &mut self.resolver, self.render).map_err(js_err)?;
            self.renderer = Some(renderer);
        }
        Ok(self.renderer.as_ref().and_then(|r| r.render_css(value)))
    }

    /// Export tables and values for the current composite. Projection tags
    /// come from the composite, which carries those of the top-priority
    /// source.
    pub fn export(&self, level: Option<usize>) -> Result<JsValue, JsValue> {
        let composite = self.labeler.composite();
        let export = ClassificationExport::build(
            composite,
            self.resolver.hierarchy(),
            level,
            composite.raster().metadata().projection.as_ref(),
        )
        .map_err(js_err)?;
        serde_wasm_bindgen::to_value(&export).map_err(js_err)
    }
}

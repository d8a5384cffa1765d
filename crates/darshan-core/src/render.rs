//! Pixel value → display color, for an external tile renderer.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::color::{Rgb, Rgba};
use crate::error::Result;
use crate::ids::{ClusterId, NODATA};
use crate::raster::Raster;
use crate::segmented::SegmentedRaster;
use crate::taxonomy::ColorResolver;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Depth at which labeled clusters are colored; `None` = full path.
    pub hierarchy_level: Option<usize>,
    /// Desaturate labeled clusters so unlabeled ones stand out.
    pub grayscale_labeled: bool,
    /// Cluster drawn in opaque black.
    pub selected_cluster: Option<ClusterId>,
    pub alpha: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { hierarchy_level: None, grayscale_labeled: false, selected_cluster: None, alpha: 1.0 }
    }
}

/// Colors resolved once per registered cluster; rendering a pixel is a lookup.
#[derive(Debug, Clone)]
pub struct PixelRenderer {
    colors: HashMap<ClusterId, Rgba>,
    options: RenderOptions,
}

impl PixelRenderer {
    /// Fails if any labeled cluster's path has no color in the hierarchy.
    pub fn new(seg: &SegmentedRaster, resolver: &mut ColorResolver, options: RenderOptions) -> Result<Self> {
        resolver.set_level(options.hierarchy_level);
        let mut colors = HashMap::with_capacity(seg.registry().len());
        for c in seg.registry().clusters() {
            if c.id == NODATA {
                continue;
            }
            let rgba = if c.is_labeled() {
                resolver.color(&c.classification_path)?.map(|rgb| {
                    let rgba = Rgba::new(rgb, options.alpha);
                    if options.grayscale_labeled {
                        rgba.grayscale()
                    } else {
                        rgba
                    }
                })
            } else {
                c.color.map(|rgb| Rgba::new(rgb, options.alpha))
            };
            if let Some(rgba) = rgba {
                colors.insert(c.id, rgba);
            }
        }
        Ok(Self { colors, options })
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// `None` means transparent: NODATA, unknown ids and colorless clusters.
    pub fn render(&self, value: ClusterId) -> Option<Rgba> {
        if value == NODATA {
            return None;
        }
        if self.options.selected_cluster == Some(value) {
            return Some(Rgba::opaque(Rgb::BLACK));
        }
        self.colors.get(&value).copied()
    }

    /// [`Self::render`] as a CSS `rgba(...)` string.
    pub fn render_css(&self, value: ClusterId) -> Option<String> {
        self.render(value).map(|c| c.to_string())
    }

    /// Row-major RGBA8 buffer for a whole raster; transparent pixels are zero.
    pub fn render_rgba8(&self, raster: &Raster) -> Vec<u8> {
        let mut out = Vec::with_capacity(raster.data().len() * 4);
        for &v in raster.data() {
            match self.render(v) {
                Some(c) => out.extend_from_slice(&[c.rgb.r, c.rgb.g, c.rgb.b, (c.alpha * 255.0).round() as u8]),
                None => out.extend_from_slice(&[0, 0, 0, 0]),
            }
        }
        out
    }
}

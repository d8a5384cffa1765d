use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coords::{Connectivity, LatLon, Pixel};
use crate::error::{Error, Result};
use crate::export::ProjectionMetadata;
use crate::ids::ClusterId;

/// Axis-aligned geographic placement of a raster.
///
/// Raster convention: row 0 lies on `ymax` and rows grow southward, so
/// `pixel_height` is a positive extent even though latitude decreases with y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Derive pixel sizes from bounds and grid dimensions.
    pub fn from_bounds(xmin: f64, ymin: f64, xmax: f64, ymax: f64, width: usize, height: usize) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            pixel_width: (xmax - xmin) / width.max(1) as f64,
            pixel_height: (ymax - ymin) / height.max(1) as f64,
        }
    }

    /// Build from a GeoTIFF `ModelTiepoint` origin (upper-left corner) and `ModelPixelScale`.
    pub fn from_origin(origin_lon: f64, origin_lat: f64, scale_x: f64, scale_y: f64, width: usize, height: usize) -> Self {
        Self {
            xmin: origin_lon,
            ymin: origin_lat - scale_y * height as f64,
            xmax: origin_lon + scale_x * width as f64,
            ymax: origin_lat,
            pixel_width: scale_x,
            pixel_height: scale_y,
        }
    }
}

/// Side-channel information carried with a raster but never interpreted by it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RasterMetadata {
    /// No-data value declared by the source file, if any.
    pub nodata_value: Option<ClusterId>,
    /// Projection tags of the source imagery, copied verbatim on export.
    pub projection: Option<ProjectionMetadata>,
}

/// An immutable 2D grid of cluster ids, row-major, with georeferencing.
///
/// Values carry no meaning here; pairing them with cluster metadata is the
/// job of [`crate::segmented::SegmentedRaster`]. Every transform returns a
/// new `Raster`. Cloning is cheap: cells and metadata are shared until a
/// crate-internal writer asks for exclusive access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    data: Arc<Vec<ClusterId>>,
    width: usize,
    height: usize,
    georef: GeoTransform,
    metadata: Arc<RasterMetadata>,
}

impl Raster {
    /// Wrap a row-major buffer. Fails unless `data.len() == width * height`.
    pub fn new(width: usize, height: usize, data: Vec<ClusterId>, georef: GeoTransform) -> Result<Self> {
        let cells = width
            .checked_mul(height)
            .ok_or_else(|| Error::MalformedGrid(format!("{width}x{height} grid is too large")))?;
        if data.len() != cells {
            return Err(Error::MalformedGrid(format!(
                "{width}x{height} grid needs {cells} cells, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data: Arc::new(data),
            width,
            height,
            georef,
            metadata: Arc::new(RasterMetadata::default()),
        })
    }

    /// Build from nested rows. Ragged rows are rejected.
    pub fn from_rows(rows: Vec<Vec<ClusterId>>, georef: GeoTransform) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(width * height);
        for (y, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(Error::MalformedGrid(format!(
                    "row {y} has {} cells, expected {width}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Self::new(width, height, data, georef)
    }

    /// A raster with every cell set to `fill`.
    pub fn filled(width: usize, height: usize, fill: ClusterId, georef: GeoTransform) -> Self {
        Self {
            data: Arc::new(vec![fill; width * height]),
            width,
            height,
            georef,
            metadata: Arc::new(RasterMetadata::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: RasterMetadata) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    /// Same shape, georeferencing and metadata, every cell set to `fill`.
    pub fn create_empty(&self, fill: ClusterId) -> Self {
        Self {
            data: Arc::new(vec![fill; self.data.len()]),
            width: self.width,
            height: self.height,
            georef: self.georef,
            metadata: Arc::clone(&self.metadata),
        }
    }

    /// Same shape, georeferencing and metadata, with replacement cells.
    pub(crate) fn with_data(&self, data: Vec<ClusterId>) -> Self {
        debug_assert_eq!(data.len(), self.data.len());
        Self {
            data: Arc::new(data),
            width: self.width,
            height: self.height,
            georef: self.georef,
            metadata: Arc::clone(&self.metadata),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn georef(&self) -> &GeoTransform {
        &self.georef
    }

    pub fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    /// Row-major cells.
    pub fn data(&self) -> &[ClusterId] {
        &self.data
    }

    /// Exclusive access to the cells; copies them first if they are shared.
    pub(crate) fn data_mut(&mut self) -> &mut [ClusterId] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    #[inline]
    pub fn index(&self, p: Pixel) -> usize {
        p.y * self.width + p.x
    }

    #[inline]
    pub fn pixel_at_index(&self, idx: usize) -> Pixel {
        Pixel::new(idx % self.width, idx / self.width)
    }

    #[inline]
    pub fn contains(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Value at (x, y), or `None` when the position falls outside the grid.
    #[inline]
    pub fn get(&self, x: isize, y: isize) -> Option<ClusterId> {
        if !self.contains(x, y) {
            return None;
        }
        Some(self.data[y as usize * self.width + x as usize])
    }

    #[inline]
    pub fn at(&self, p: Pixel) -> Option<ClusterId> {
        if p.x >= self.width || p.y >= self.height {
            return None;
        }
        Some(self.data[self.index(p)])
    }

    pub fn same_shape(&self, other: &Raster) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn ensure_same_shape(&self, other: &Raster) -> Result<()> {
        if self.same_shape(other) {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: (self.width, self.height),
                found: (other.width, other.height),
            })
        }
    }

    /// Pixel containing `ll`, or `None` outside the raster.
    pub fn latlon_to_pixel(&self, ll: LatLon) -> Option<Pixel> {
        let fx = ((ll.lon - self.georef.xmin) / self.georef.pixel_width).floor();
        let fy = ((self.georef.ymax - ll.lat) / self.georef.pixel_height).floor();
        if !fx.is_finite() || !fy.is_finite() || fx < 0.0 || fy < 0.0 {
            return None;
        }
        let (x, y) = (fx as usize, fy as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(Pixel::new(x, y))
    }

    /// Geographic centre of a pixel.
    pub fn pixel_to_latlon(&self, p: Pixel) -> LatLon {
        LatLon::new(
            self.georef.ymax - (p.y as f64 + 0.5) * self.georef.pixel_height,
            self.georef.xmin + (p.x as f64 + 0.5) * self.georef.pixel_width,
        )
    }

    /// In-bounds neighbours of `p`.
    pub fn neighbors(&self, p: Pixel, connectivity: Connectivity) -> impl Iterator<Item = Pixel> + '_ {
        connectivity.offsets().iter().filter_map(move |&(dx, dy)| {
            let nx = p.x as isize + dx;
            let ny = p.y as isize + dy;
            self.contains(nx, ny).then(|| Pixel::new(nx as usize, ny as usize))
        })
    }

    /// Every (pixel, value) pair in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (Pixel, ClusterId)> + '_ {
        let w = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (Pixel::new(i % w, i / w), v))
    }

    pub fn for_each(&self, mut f: impl FnMut(Pixel, ClusterId)) {
        for (p, v) in self.pixels() {
            f(p, v);
        }
    }

    /// New raster with `f` applied to every cell.
    pub fn map(&self, mut f: impl FnMut(Pixel, ClusterId) -> ClusterId) -> Raster {
        let data = self.pixels().map(|(p, v)| f(p, v)).collect();
        self.with_data(data)
    }

    /// Nested-row copy of the cells.
    pub fn to_rows(&self) -> Vec<Vec<ClusterId>> {
        if self.width == 0 {
            return vec![Vec::new(); self.height];
        }
        self.data.chunks(self.width).map(<[ClusterId]>::to_vec).collect()
    }
}

//! Raster composition and region-labeling engine for multi-granularity
//! land-cover segmentations.
//!
//! Source segmentations enter as [`SegmentedRaster`]s, are combined by the
//! [`Compositor`] under analyst label tables, edited interactively through a
//! [`RegionLabeler`], colored through a [`ClassificationHierarchy`], and
//! flattened for GIS export by [`ClassificationExport`].
pub mod color;
pub mod compositor;
pub mod coords;
pub mod error;
pub mod export;
pub mod factory;
pub mod ids;
pub mod labeler;
pub mod raster;
pub mod registry;
pub mod render;
pub mod segmented;
pub mod taxonomy;
pub mod transform;

pub use color::{Rgb, Rgba};
pub use compositor::{Composite, CompositeRules, Compositor, LabelTable, Priority};
pub use coords::{Connectivity, LatLon, Pixel};
pub use error::{Error, Result};
pub use export::{ClassificationExport, GeoKeys, ProjectionMetadata, SampleFormat};
pub use ids::{ClusterId, FINE_GRAIN_START, NODATA, SYNTHETIC_START, UNLABELED, UNLABELED_PATH};
pub use labeler::{LabelerOptions, NeighborLabel, RegionLabeler};
pub use raster::{GeoTransform, Raster, RasterMetadata};
pub use registry::{ClusterRecord, ClusterRegistry, ColorTable};
pub use render::{PixelRenderer, RenderOptions};
pub use segmented::{ClusterLabel, SegmentedRaster};
pub use taxonomy::{ClassificationHierarchy, ColorResolver};
pub use transform::Region;

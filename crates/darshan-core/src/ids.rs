//! Reserved cluster id ranges shared by every raster in the system.
//!
//! ```text
//!   NODATA        -1
//!   regular       0 ..= 9998
//!   UNLABELED     9999
//!   synthetic     10000 ..< 50000
//!   fine-grain    50000 ..
//! ```

/// Integer cluster id stored in a raster cell.
pub type ClusterId = i32;

/// No source pixel (outside the imaged area).
pub const NODATA: ClusterId = -1;
/// Pixel has a source cluster but no assigned classification.
pub const UNLABELED: ClusterId = 9999;
/// First id an analyst-drawn region may take.
pub const SYNTHETIC_START: ClusterId = 10_000;
/// Offset applied to a base segmentation's native ids when merged under a composite.
pub const FINE_GRAIN_START: ClusterId = 50_000;

/// Classification path meaning "not yet classified".
pub const UNLABELED_PATH: &str = "unlabeled";

#[inline]
pub fn is_nodata(id: ClusterId) -> bool {
    id == NODATA
}

#[inline]
pub fn is_unlabeled(id: ClusterId) -> bool {
    id == UNLABELED
}

#[inline]
pub fn is_regular(id: ClusterId) -> bool {
    (0..SYNTHETIC_START).contains(&id) && id != UNLABELED
}

#[inline]
pub fn is_synthetic(id: ClusterId) -> bool {
    (SYNTHETIC_START..FINE_GRAIN_START).contains(&id)
}

#[inline]
pub fn is_fine_grain(id: ClusterId) -> bool {
    id >= FINE_GRAIN_START
}

/// True for the sentinel path or an empty path.
#[inline]
pub fn is_unlabeled_path(path: &str) -> bool {
    path.is_empty() || path == UNLABELED_PATH
}

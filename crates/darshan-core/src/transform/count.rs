//! Per-id pixel counting behind a swappable backend.
use std::collections::HashMap;

use crate::ids::ClusterId;
use crate::raster::Raster;

/// Counts pixels per cluster id, skipping `exclude`.
///
/// Every implementation must return exactly what [`ScalarCounter`] returns.
pub trait PixelCounter {
    fn count(&self, raster: &Raster, exclude: ClusterId) -> HashMap<ClusterId, u64>;
}

/// Single pass over the cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarCounter;

impl PixelCounter for ScalarCounter {
    fn count(&self, raster: &Raster, exclude: ClusterId) -> HashMap<ClusterId, u64> {
        tally(raster.data(), exclude)
    }
}

/// Row-chunked counting on the rayon pool.
#[cfg(feature = "threading")]
#[derive(Debug, Clone, Copy)]
pub struct ParallelCounter {
    pub rows_per_chunk: usize,
}

#[cfg(feature = "threading")]
impl Default for ParallelCounter {
    fn default() -> Self {
        Self { rows_per_chunk: 256 }
    }
}

#[cfg(feature = "threading")]
impl PixelCounter for ParallelCounter {
    fn count(&self, raster: &Raster, exclude: ClusterId) -> HashMap<ClusterId, u64> {
        use rayon::prelude::*;

        let chunk = (raster.width() * self.rows_per_chunk.max(1)).max(1);
        raster
            .data()
            .par_chunks(chunk)
            .map(|cells| tally(cells, exclude))
            .reduce(HashMap::new, |mut acc, part| {
                for (id, n) in part {
                    *acc.entry(id).or_insert(0) += n;
                }
                acc
            })
    }
}

fn tally(cells: &[ClusterId], exclude: ClusterId) -> HashMap<ClusterId, u64> {
    let mut counts = HashMap::new();
    for &v in cells {
        if v != exclude {
            *counts.entry(v).or_insert(0) += 1;
        }
    }
    counts
}

/// Count with the crate's default backend: row chunks on the rayon pool
/// under the `threading` feature, a single scalar pass otherwise.
pub fn count_pixels(raster: &Raster, exclude: ClusterId) -> HashMap<ClusterId, u64> {
    #[cfg(feature = "threading")]
    {
        ParallelCounter::default().count(raster, exclude)
    }
    #[cfg(not(feature = "threading"))]
    {
        ScalarCounter.count(raster, exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NODATA;
    use crate::raster::GeoTransform;

    fn lcg_raster(w: usize, h: usize, seed: u64) -> Raster {
        let mut s = seed;
        let data = (0..w * h)
            .map(|_| {
                s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((s >> 33) % 7) as ClusterId - 1
            })
            .collect();
        Raster::new(w, h, data, GeoTransform::from_bounds(0.0, 0.0, 1.0, 1.0, w, h)).unwrap()
    }

    #[test]
    fn excludes_nodata_and_sums_to_valid_cells() {
        let r = lcg_raster(37, 23, 7);
        let counts = count_pixels(&r, NODATA);
        assert!(!counts.contains_key(&NODATA));
        let nodata = r.data().iter().filter(|&&v| v == NODATA).count() as u64;
        assert_eq!(counts.values().sum::<u64>() + nodata, 37 * 23);
    }

    #[test]
    fn custom_exclusion_value() {
        let r = lcg_raster(8, 8, 3);
        let counts = ScalarCounter.count(&r, 2);
        assert!(!counts.contains_key(&2));
        assert!(counts.contains_key(&NODATA) || !r.data().contains(&NODATA));
    }

    #[cfg(feature = "threading")]
    #[test]
    fn parallel_matches_scalar() {
        let r = lcg_raster(311, 97, 42);
        let parallel = ParallelCounter { rows_per_chunk: 5 };
        assert_eq!(parallel.count(&r, NODATA), ScalarCounter.count(&r, NODATA));
    }

    #[test]
    fn default_backend_matches_scalar() {
        let r = lcg_raster(600, 300, 11);
        assert_eq!(count_pixels(&r, NODATA), ScalarCounter.count(&r, NODATA));
        let empty = Raster::new(0, 0, Vec::new(), GeoTransform::from_bounds(0.0, 0.0, 1.0, 1.0, 1, 1)).unwrap();
        assert!(count_pixels(&empty, NODATA).is_empty());
    }
}

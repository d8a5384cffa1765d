//! Breadth-first region growth over a raster.
use std::collections::VecDeque;

use serde::Serialize;

use crate::coords::{Connectivity, Pixel};
use crate::ids::ClusterId;
use crate::raster::Raster;

/// Connected pixels discovered from a seed, in BFS order (seed first).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Region {
    pub pixels: Vec<Pixel>,
    /// Growth stopped at the pixel cap while matching pixels remained.
    pub truncated: bool,
}

impl Region {
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.pixels.iter().copied()
    }
}

impl FromIterator<Pixel> for Region {
    fn from_iter<I: IntoIterator<Item = Pixel>>(iter: I) -> Self {
        Self { pixels: iter.into_iter().collect(), truncated: false }
    }
}

/// Flood fill from `(x, y)`.
///
/// A pixel joins iff `matches(seed_value, value)` holds; the predicate always
/// sees the seed's value, never the previous pixel's. Visited state is kept
/// per cell, so regions may sweep over heterogeneous ids. At most
/// `max_pixels` are returned; when more would have matched the region is
/// marked `truncated`. An out-of-bounds or non-matching seed yields an empty
/// region.
pub fn find_region(
    raster: &Raster,
    x: isize,
    y: isize,
    mut matches: impl FnMut(ClusterId, ClusterId) -> bool,
    max_pixels: usize,
    connectivity: Connectivity,
) -> Region {
    let Some(seed_value) = raster.get(x, y) else {
        return Region::default();
    };
    let data = raster.data();
    grow(raster, Pixel::new(x as usize, y as usize), max_pixels, connectivity, |p| {
        matches(seed_value, data[raster.index(p)])
    })
}

/// Flood fill where membership depends on the pixel position rather than
/// its value. Same cap and truncation rules as [`find_region`].
pub fn find_region_where(
    raster: &Raster,
    seed: Pixel,
    max_pixels: usize,
    connectivity: Connectivity,
    member: impl FnMut(Pixel) -> bool,
) -> Region {
    if raster.at(seed).is_none() {
        return Region::default();
    }
    grow(raster, seed, max_pixels, connectivity, member)
}

fn grow(
    raster: &Raster,
    seed: Pixel,
    max_pixels: usize,
    connectivity: Connectivity,
    mut member: impl FnMut(Pixel) -> bool,
) -> Region {
    if !member(seed) {
        return Region::default();
    }

    let mut visited = vec![false; raster.data().len()];
    let mut queue = VecDeque::new();
    let mut region = Region::default();

    visited[raster.index(seed)] = true;
    queue.push_back(seed);

    while let Some(p) = queue.pop_front() {
        // Everything in the queue already matched.
        if region.pixels.len() >= max_pixels {
            region.truncated = true;
            break;
        }
        region.pixels.push(p);
        for n in raster.neighbors(p, connectivity) {
            let i = raster.index(n);
            if visited[i] {
                continue;
            }
            visited[i] = true;
            if member(n) {
                queue.push_back(n);
            }
        }
    }
    region
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;

    fn grid(rows: Vec<Vec<ClusterId>>) -> Raster {
        let (w, h) = (rows[0].len(), rows.len());
        Raster::from_rows(rows, GeoTransform::from_bounds(0.0, 0.0, w as f64, h as f64, w, h)).unwrap()
    }

    #[test]
    fn diagonal_bridge_depends_on_connectivity() {
        let r = grid(vec![vec![1, 0, 0], vec![0, 1, 0], vec![0, 0, 1]]);
        let same = |s: ClusterId, v: ClusterId| s == v;
        assert_eq!(find_region(&r, 0, 0, same, 100, Connectivity::Four).len(), 1);
        assert_eq!(find_region(&r, 0, 0, same, 100, Connectivity::Eight).len(), 3);
    }

    #[test]
    fn predicate_can_span_heterogeneous_ids() {
        let r = grid(vec![vec![1, 2, 3], vec![9, 9, 4], vec![5, 6, 7]]);
        let small = |_: ClusterId, v: ClusterId| v < 9;
        let region = find_region(&r, 0, 0, small, 100, Connectivity::Four);
        assert_eq!(region.pixels.first(), Some(&Pixel::new(0, 0)));
        assert_eq!(region.len(), 7, "the 9s wall off row 1; column 2 links top and bottom");
        assert!(!region.truncated);
    }

    #[test]
    fn cap_is_honored_and_reported() {
        let r = grid(vec![vec![0; 5]; 5]);
        let region = find_region(&r, 2, 2, |s, v| s == v, 7, Connectivity::Eight);
        assert_eq!(region.len(), 7);
        assert!(region.truncated);

        let exact = find_region(&r, 2, 2, |s, v| s == v, 25, Connectivity::Eight);
        assert_eq!(exact.len(), 25);
        assert!(!exact.truncated);
    }

    #[test]
    fn positional_membership() {
        let r = grid(vec![vec![0; 4]; 4]);
        let left_half = find_region_where(&r, Pixel::new(0, 0), 100, Connectivity::Four, |p| p.x < 2);
        assert_eq!(left_half.len(), 8);
        assert!(left_half.iter().all(|p| p.x < 2));
        assert!(find_region_where(&r, Pixel::new(9, 0), 100, Connectivity::Four, |_| true).is_empty());
    }

    #[test]
    fn bad_seed_gives_empty_region() {
        let r = grid(vec![vec![1, 1], vec![1, 1]]);
        assert!(find_region(&r, -1, 0, |_, _| true, 10, Connectivity::Four).is_empty());
        assert!(find_region(&r, 0, 0, |_, v| v == 2, 10, Connectivity::Four).is_empty());
    }
}

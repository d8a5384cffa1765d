//! Cached path → color resolution at a configurable hierarchy level.
use std::collections::HashMap;
use std::sync::Arc;

use crate::color::Rgb;
use crate::error::Result;
use crate::ids;

use super::ClassificationHierarchy;

/// Resolves classification paths to colors, memoizing by `(path, level)`.
///
/// The cache is derived state: changing the level clears it.
#[derive(Debug, Clone)]
pub struct ColorResolver {
    hierarchy: Arc<ClassificationHierarchy>,
    level: Option<usize>,
    cache: HashMap<(String, Option<usize>), Rgb>,
}

impl ColorResolver {
    pub fn new(hierarchy: Arc<ClassificationHierarchy>, level: Option<usize>) -> Self {
        Self { hierarchy, level, cache: HashMap::new() }
    }

    pub fn hierarchy(&self) -> &Arc<ClassificationHierarchy> {
        &self.hierarchy
    }

    pub fn level(&self) -> Option<usize> {
        self.level
    }

    pub fn set_level(&mut self, level: Option<usize>) {
        if self.level != level {
            self.level = level;
            self.cache.clear();
        }
    }

    /// Color for `path` at the current level. Unlabeled paths have no color
    /// (`Ok(None)`); a path with no color on its whole ancestor chain is an error.
    pub fn color(&mut self, path: &str) -> Result<Option<Rgb>> {
        if ids::is_unlabeled_path(path) {
            return Ok(None);
        }
        let key = (path.to_string(), self.level);
        if let Some(&c) = self.cache.get(&key) {
            return Ok(Some(c));
        }
        let c = self.hierarchy.color_for_path(path, self.level)?;
        self.cache.insert(key, c);
        Ok(Some(c))
    }

    pub fn hex(&mut self, path: &str) -> Result<Option<String>> {
        Ok(self.color(path)?.map(Rgb::to_hex))
    }

    /// `[r, g, b]` in `0..=1`, the form used in exported color mappings.
    pub fn rgb_unit(&mut self, path: &str) -> Result<Option<[f32; 3]>> {
        Ok(self.color(path)?.map(Rgb::to_unit))
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::taxonomy::tests::hierarchy;

    fn resolver(level: Option<usize>) -> ColorResolver {
        ColorResolver::new(Arc::new(hierarchy()), level)
    }

    #[test]
    fn unlabeled_has_no_color() {
        let mut r = resolver(None);
        assert_eq!(r.color("unlabeled").unwrap(), None);
        assert_eq!(r.color("").unwrap(), None);
        assert_eq!(r.cached(), 0);
    }

    #[test]
    fn caches_and_invalidates_on_level_change() {
        let mut r = resolver(None);
        assert_eq!(r.color("land.cropland.rice").unwrap(), Some(Rgb::new(250, 220, 0)));
        assert_eq!(r.cached(), 1);
        r.color("land.cropland.rice").unwrap();
        assert_eq!(r.cached(), 1);

        r.set_level(Some(1));
        assert_eq!(r.cached(), 0);
        assert_eq!(r.hex("land.cropland.rice").unwrap().as_deref(), Some("#a0522d"));

        r.set_level(Some(1));
        assert_eq!(r.cached(), 1, "same level keeps the cache");
    }

    #[test]
    fn missing_color_is_not_cached_or_defaulted() {
        let mut r = resolver(None);
        assert!(matches!(r.color("sky.cloud"), Err(Error::NoColorMapping { .. })));
        assert_eq!(r.cached(), 0);
    }
}

//! Classification taxonomy: a static tree of categories plus a flat color
//! table keyed by dotted path.
//!
//! The tree arrives as nested JSON objects. Keys beginning with `_` are
//! metadata (`_color`, `_description`, ...) rather than child categories.
//! Colors are looked up by exact path first, then by each ancestor in turn;
//! a path with no color anywhere on its ancestor chain is an authoring error
//! and fails with [`Error::NoColorMapping`].

pub mod resolver;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::color::Rgb;
use crate::error::{Error, Result};
use crate::ids::UNLABELED_PATH;

pub use resolver::ColorResolver;

/// Prefix marking metadata keys inside the taxonomy tree.
pub const METADATA_PREFIX: char = '_';

#[derive(Debug, Clone)]
struct TaxonNode {
    name: String,
    children: Vec<TaxonNode>,
}

/// One category of the flattened tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyEntry {
    /// Dotted path, e.g. `land.cropland.rice`.
    pub path: String,
    /// Human-readable path, e.g. `land > cropland > rice`.
    pub display_path: String,
    /// Zero-based depth.
    pub level: usize,
    /// Last path segment.
    pub name: String,
    pub is_leaf: bool,
}

/// A category at a requested depth together with its resolved color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelItem {
    pub path: String,
    pub name: String,
    pub display_path: String,
    pub color: Rgb,
}

/// The category tree and its color table. Built once and shared by
/// reference (`Arc`) with every component that resolves colors.
#[derive(Debug, Clone)]
pub struct ClassificationHierarchy {
    roots: Vec<TaxonNode>,
    colors: HashMap<String, Rgb>,
    flat: Vec<HierarchyEntry>,
}

impl ClassificationHierarchy {
    /// Parse the tree JSON and the flat `path -> color` JSON.
    pub fn from_json(tree_json: &str, colors_json: &str) -> Result<Self> {
        let tree: Value = serde_json::from_str(tree_json)?;
        let colors: HashMap<String, String> = serde_json::from_str(colors_json)?;
        Self::from_parts(&tree, &colors)
    }

    /// Build from a parsed tree and an unparsed color table.
    ///
    /// `_color` entries embedded in the tree fill in paths the flat table
    /// does not mention; the flat table wins on conflicts.
    pub fn from_parts(tree: &Value, color_table: &HashMap<String, String>) -> Result<Self> {
        let root = tree
            .as_object()
            .ok_or_else(|| Error::MalformedHierarchy("root must be a JSON object".into()))?;

        let mut colors = HashMap::with_capacity(color_table.len());
        let roots = parse_children(root, &mut Vec::new(), &mut colors)?;
        for (path, raw) in color_table {
            colors.insert(path.clone(), Rgb::parse(raw)?);
        }

        let mut flat = Vec::new();
        flatten_into(&roots, &mut Vec::new(), &mut flat);
        Ok(Self { roots, colors, flat })
    }

    /// Depth-first listing of every category.
    pub fn flatten(&self) -> &[HierarchyEntry] {
        &self.flat
    }

    /// `flatten()` preceded by the `"unlabeled"` choice.
    pub fn selectable_options(&self) -> Vec<HierarchyEntry> {
        let mut out = Vec::with_capacity(self.flat.len() + 1);
        out.push(HierarchyEntry {
            path: UNLABELED_PATH.to_string(),
            display_path: "Unlabeled".to_string(),
            level: 0,
            name: UNLABELED_PATH.to_string(),
            is_leaf: true,
        });
        out.extend(self.flat.iter().cloned());
        out
    }

    pub fn paths_with_prefix(&self, prefix: &str) -> Vec<&HierarchyEntry> {
        self.flat.iter().filter(|e| e.path.starts_with(prefix)).collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.flat.iter().any(|e| e.path == path)
    }

    /// Number of top-level categories.
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Resolve a color, optionally truncating `path` to `level` segments first.
    pub fn color_for_path(&self, path: &str, level: Option<usize>) -> Result<Rgb> {
        let truncated = truncate_path(path, level);
        let mut candidate = truncated;
        loop {
            if let Some(&c) = self.colors.get(candidate) {
                return Ok(c);
            }
            match candidate.rfind('.') {
                Some(i) => candidate = &candidate[..i],
                None => break,
            }
        }
        Err(Error::NoColorMapping { path: truncated.to_string() })
    }

    /// Categories exactly `level` segments deep (1 = top level), sorted by name.
    pub fn items_at_level(&self, level: usize) -> Result<Vec<LevelItem>> {
        let mut items = Vec::new();
        for e in self.flat.iter().filter(|e| e.level + 1 == level) {
            items.push(LevelItem {
                path: e.path.clone(),
                name: e.name.clone(),
                display_path: e.display_path.clone(),
                color: self.color_for_path(&e.path, None)?,
            });
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }
}

/// Keep the first `level` segments of `path`. `None`, `Some(0)`, and levels
/// at or beyond the path's depth return `path` unchanged.
pub fn truncate_path(path: &str, level: Option<usize>) -> &str {
    let Some(level) = level.filter(|&l| l > 0) else {
        return path;
    };
    match path.match_indices('.').nth(level - 1) {
        Some((i, _)) => &path[..i],
        None => path,
    }
}

fn parse_children(
    obj: &serde_json::Map<String, Value>,
    prefix: &mut Vec<String>,
    colors: &mut HashMap<String, Rgb>,
) -> Result<Vec<TaxonNode>> {
    let mut nodes = Vec::new();
    for (key, value) in obj {
        if key.starts_with(METADATA_PREFIX) {
            continue;
        }
        if key.contains('.') {
            return Err(Error::MalformedHierarchy(format!("category name {key:?} contains '.'")));
        }
        prefix.push(key.clone());
        let children = match value {
            Value::Object(child) => {
                if let Some(raw) = child.get("_color").and_then(Value::as_str) {
                    colors.insert(prefix.join("."), Rgb::parse(raw)?);
                }
                parse_children(child, prefix, colors)?
            }
            _ => Vec::new(),
        };
        prefix.pop();
        nodes.push(TaxonNode { name: key.clone(), children });
    }
    Ok(nodes)
}

fn flatten_into(nodes: &[TaxonNode], prefix: &mut Vec<String>, out: &mut Vec<HierarchyEntry>) {
    for node in nodes {
        prefix.push(node.name.clone());
        out.push(HierarchyEntry {
            path: prefix.join("."),
            display_path: prefix.join(" > "),
            level: prefix.len() - 1,
            name: node.name.clone(),
            is_leaf: node.children.is_empty(),
        });
        flatten_into(&node.children, prefix, out);
        prefix.pop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TREE: &str = r##"{
        "land": {
            "_description": "terrestrial",
            "cropland": { "rice": {}, "wheat": {} },
            "forest": { "_color": "#0b6623" }
        },
        "water": {}
    }"##;

    pub(crate) const COLORS: &str = r##"{
        "land": "#a0522d",
        "land.cropland": "rgb(250, 220, 0)",
        "water": "0000ff"
    }"##;

    pub(crate) fn hierarchy() -> ClassificationHierarchy {
        ClassificationHierarchy::from_json(TREE, COLORS).unwrap()
    }

    #[test]
    fn flatten_skips_metadata_and_marks_leaves() {
        let h = hierarchy();
        let paths: Vec<&str> = h.flatten().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["land", "land.cropland", "land.cropland.rice", "land.cropland.wheat", "land.forest", "water"]
        );
        let rice = &h.flatten()[2];
        assert_eq!(rice.level, 2);
        assert!(rice.is_leaf);
        assert_eq!(rice.display_path, "land > cropland > rice");
        assert!(!h.flatten()[0].is_leaf);
        assert!(h.flatten()[4].is_leaf, "forest has only metadata keys");
        assert_eq!(h.root_count(), 2);
    }

    #[test]
    fn color_falls_back_to_ancestors() {
        let h = hierarchy();
        let cropland = Rgb::new(250, 220, 0);
        assert_eq!(h.color_for_path("land.cropland.rice", None).unwrap(), cropland);
        assert_eq!(h.color_for_path("land.cropland.rice", Some(1)).unwrap(), Rgb::new(0xa0, 0x52, 0x2d));
        assert_eq!(h.color_for_path("land.forest", None).unwrap(), Rgb::new(0x0b, 0x66, 0x23));
    }

    #[test]
    fn unregistered_root_is_an_error() {
        let h = hierarchy();
        let err = h.color_for_path("x.y", None).unwrap_err();
        assert!(matches!(err, Error::NoColorMapping { ref path } if path == "x.y"));
    }

    #[test]
    fn truncation_counts_segments() {
        assert_eq!(truncate_path("a.b.c", Some(1)), "a");
        assert_eq!(truncate_path("a.b.c", Some(2)), "a.b");
        assert_eq!(truncate_path("a.b.c", Some(3)), "a.b.c");
        assert_eq!(truncate_path("a.b", Some(5)), "a.b");
        assert_eq!(truncate_path("a.b", Some(0)), "a.b");
        assert_eq!(truncate_path("a.b", None), "a.b");
    }

    #[test]
    fn items_at_level_are_sorted_with_colors() {
        let h = hierarchy();
        let items = h.items_at_level(2).unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["cropland", "forest"]);
        assert_eq!(items[1].color, Rgb::new(0x0b, 0x66, 0x23));
    }

    #[test]
    fn selectable_options_start_with_unlabeled() {
        let h = hierarchy();
        let opts = h.selectable_options();
        assert_eq!(opts[0].path, "unlabeled");
        assert_eq!(opts.len(), h.flatten().len() + 1);
        assert_eq!(h.paths_with_prefix("land.crop").len(), 3);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(ClassificationHierarchy::from_json("[]", "{}").is_err());
        assert!(ClassificationHierarchy::from_json(r#"{"a.b": {}}"#, "{}").is_err());
        assert!(matches!(
            ClassificationHierarchy::from_json(r#"{"a": {}}"#, r#"{"a": "nope"}"#),
            Err(Error::InvalidColor(_))
        ));
    }
}

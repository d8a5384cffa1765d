use thiserror::Error;

/// Fatal failures of the composition and labeling core.
///
/// Routine misses (out-of-bounds lookups, unregistered cluster ids) are not
/// errors; they surface as `None` or the `"unlabeled"` sentinel instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("raster dimensions differ: expected {}x{}, found {}x{}", expected.0, expected.1, found.0, found.1)]
    DimensionMismatch {
        /// (width, height) of the reference raster.
        expected: (usize, usize),
        /// (width, height) of the offending raster.
        found: (usize, usize),
    },

    #[error("malformed grid: {0}")]
    MalformedGrid(String),

    #[error("cannot aggregate an empty set of rasters")]
    EmptyInput,

    #[error("no color mapping found for path: {path}")]
    NoColorMapping { path: String },

    #[error("invalid source raster: {}", issues.join(", "))]
    InvalidProjectionMetadata { issues: Vec<String> },

    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error("malformed classification hierarchy: {0}")]
    MalformedHierarchy(String),

    #[error("region has no pixels that can be labeled")]
    EmptyRegion,

    #[error("{what} id space exhausted")]
    IdSpaceExhausted { what: &'static str },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_error_lists_every_issue() {
        let err = Error::InvalidProjectionMetadata {
            issues: vec!["missing geoKeys".into(), "invalid ModelTiepoint".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid source raster: missing geoKeys, invalid ModelTiepoint"
        );
    }
}

//! Removal regions and request-boundary validation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A rectangular pixel area of the source video targeted for removal.
///
/// Coordinates are absolute pixels in the source frame, origin at the
/// top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Region {
    /// X coordinate of the top-left corner
    pub x: u32,
    /// Y coordinate of the top-left corner
    pub y: u32,
    /// Width in pixels (must be positive)
    pub width: u32,
    /// Height in pixels (must be positive)
    pub height: u32,
}

impl Region {
    /// Create a new region.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check that the region has a positive extent.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Errors produced while validating the `regions` request field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("regions must be a non-empty JSON array of {{x, y, width, height}} objects")]
    Empty,

    #[error("region {index} has zero {dimension}; width and height must be positive")]
    ZeroDimension {
        index: usize,
        dimension: &'static str,
    },

    #[error("regions must be a JSON array of {{x, y, width, height}} objects: {0}")]
    Malformed(String),
}

/// Parse and validate the raw `regions` form field.
pub fn parse_regions(raw: &str) -> Result<Vec<Region>, RegionError> {
    let regions: Vec<Region> =
        serde_json::from_str(raw).map_err(|e| RegionError::Malformed(e.to_string()))?;
    validate_regions(&regions)?;
    Ok(regions)
}

/// Validate an already-parsed region list.
///
/// The list must be non-empty and every region must have a positive
/// width and height. Order carries no meaning.
pub fn validate_regions(regions: &[Region]) -> Result<(), RegionError> {
    if regions.is_empty() {
        return Err(RegionError::Empty);
    }

    for (index, region) in regions.iter().enumerate() {
        if region.width == 0 {
            return Err(RegionError::ZeroDimension {
                index,
                dimension: "width",
            });
        }
        if region.height == 0 {
            return Err(RegionError::ZeroDimension {
                index,
                dimension: "height",
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_regions() {
        let regions = parse_regions(r#"[{"x":10,"y":10,"width":100,"height":50}]"#).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0], Region::new(10, 10, 100, 50));
    }

    #[test]
    fn test_empty_array_rejected() {
        let err = parse_regions("[]").unwrap_err();
        assert_eq!(err, RegionError::Empty);
        assert!(err.to_string().contains("{x, y, width, height}"));
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = parse_regions(r#"[{"x":1,"y":2,"width":3}]"#).unwrap_err();
        assert!(matches!(err, RegionError::Malformed(_)));
        assert!(err.to_string().contains("{x, y, width, height}"));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = validate_regions(&[Region::new(0, 0, 100, 0)]).unwrap_err();
        assert_eq!(
            err,
            RegionError::ZeroDimension {
                index: 0,
                dimension: "height"
            }
        );
    }

    #[test]
    fn test_multiple_regions_keep_order() {
        let regions = parse_regions(
            r#"[{"x":0,"y":0,"width":10,"height":10},{"x":50,"y":60,"width":5,"height":5}]"#,
        )
        .unwrap();
        assert_eq!(regions[1].x, 50);
    }
}

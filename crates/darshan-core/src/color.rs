//! 8-bit colors and the string formats the taxonomy and renderer exchange.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An opaque sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`, `rrggbb` or `rgb(r, g, b)`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("rgb(").and_then(|t| t.strip_suffix(')')) {
            let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
            if parts.len() != 3 {
                return Err(Error::InvalidColor(s.to_string()));
            }
            let mut c = [0u8; 3];
            for (slot, part) in c.iter_mut().zip(&parts) {
                *slot = part.parse().map_err(|_| Error::InvalidColor(s.to_string()))?;
            }
            return Ok(Self::new(c[0], c[1], c[2]));
        }

        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidColor(s.to_string()));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| Error::InvalidColor(s.to_string()));
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// From `[r, g, b]` in `0..=1`, as found in segmentation color tables.
    pub fn from_unit(c: [f32; 3]) -> Self {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(q(c[0]), q(c[1]), q(c[2]))
    }

    pub fn to_unit(self) -> [f32; 3] {
        [self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0]
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Luminance-weighted gray: `0.299 r + 0.587 g + 0.114 b`, rounded.
    pub fn grayscale(self) -> Self {
        let g = (0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64).round() as u8;
        Self::new(g, g, g)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Rgb::parse(s)
    }
}

/// A color with straight alpha in `0..=1`, as handed to the tile renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub rgb: Rgb,
    pub alpha: f32,
}

impl Rgba {
    pub fn new(rgb: Rgb, alpha: f32) -> Self {
        Self { rgb, alpha: alpha.clamp(0.0, 1.0) }
    }

    pub fn opaque(rgb: Rgb) -> Self {
        Self::new(rgb, 1.0)
    }

    /// Desaturate the color channels; alpha is preserved.
    pub fn grayscale(self) -> Self {
        Self { rgb: self.rgb.grayscale(), alpha: self.alpha }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.rgb.r, self.rgb.g, self.rgb.b, self.alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_table_formats() {
        let want = Rgb::new(0x2e, 0x8b, 0x57);
        assert_eq!(Rgb::parse("#2e8b57").unwrap(), want);
        assert_eq!(Rgb::parse("2E8B57").unwrap(), want);
        assert_eq!(Rgb::parse("rgb(46, 139, 87)").unwrap(), want);
        assert_eq!("rgb(46,139,87)".parse::<Rgb>().unwrap(), want);
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "#12345", "rgb(1,2)", "rgb(300, 0, 0)", "#gg0000", "gray"] {
            assert!(Rgb::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn display_and_hex_formats() {
        let c = Rgb::new(255, 128, 0);
        assert_eq!(c.to_string(), "rgb(255, 128, 0)");
        assert_eq!(c.to_hex(), "#ff8000");
        assert_eq!(Rgba::new(c, 0.5).to_string(), "rgba(255, 128, 0, 0.5)");
    }

    #[test]
    fn grayscale_uses_luminance_weights() {
        assert_eq!(Rgb::new(255, 0, 0).grayscale(), Rgb::new(76, 76, 76));
        assert_eq!(Rgb::new(0, 255, 0).grayscale(), Rgb::new(150, 150, 150));
        assert_eq!(Rgb::new(0, 0, 255).grayscale(), Rgb::new(29, 29, 29));
        let c = Rgba::new(Rgb::new(10, 200, 30), 0.7);
        let g = c.grayscale();
        assert_eq!(g.alpha, 0.7);
        assert_eq!(g.rgb.r, g.rgb.g);
        assert_eq!(g.rgb.g, g.rgb.b);
    }

    #[test]
    fn unit_floats_quantize_to_nearest_byte() {
        assert_eq!(Rgb::from_unit([0.0, 0.5, 1.0]), Rgb::new(0, 128, 255));
        let back = Rgb::new(51, 102, 153).to_unit();
        assert!((back[0] - 0.2).abs() < 1e-6);
    }
}

//! Color space helpers
//!
//! sRGB colors, hex formatting, and CIELAB conversion for perceptual
//! distance (ΔE76) comparisons.

use palette::{FromColor, Lab, Srgb, white_point::D65};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ColorParseError;

/// CIELAB color under the D65 white point
pub type LabColor = Lab<D65, f32>;

/// An opaque 8-bit sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
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

    pub const fn gray(value: u8) -> Self {
        Self::new(value, value, value)
    }

    /// Format as uppercase `#RRGGBB`
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Parse `#RRGGBB`, `RRGGBB`, `#RGB` or `RGB`
    pub fn from_hex(hex: &str) -> Result<Self, ColorParseError> {
        let digits = hex.trim();
        let digits = digits.strip_prefix('#').unwrap_or(digits);
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError::InvalidDigit(digits.to_string()));
        }
        let channel = |s: &str| {
            u8::from_str_radix(s, 16).map_err(|_| ColorParseError::InvalidDigit(digits.to_string()))
        };
        match digits.len() {
            6 => Ok(Self::new(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => Ok(Self::new(
                channel(&digits[0..1])? * 17,
                channel(&digits[1..2])? * 17,
                channel(&digits[2..3])? * 17,
            )),
            n => Err(ColorParseError::InvalidLength(n)),
        }
    }

    pub fn to_lab(&self) -> LabColor {
        rgb_to_lab(*self)
    }

    /// Squared Euclidean distance in RGB space
    #[inline]
    pub fn distance_sq(&self, other: &Rgb) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }

    pub fn is_gray(&self) -> bool {
        self.r == self.g && self.g == self.b
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgb::from_hex(s)
    }
}

impl From<image::Rgba<u8>> for Rgb {
    fn from(px: image::Rgba<u8>) -> Self {
        Rgb::new(px[0], px[1], px[2])
    }
}

impl From<Rgb> for image::Rgba<u8> {
    fn from(c: Rgb) -> Self {
        image::Rgba([c.r, c.g, c.b, 255])
    }
}

/// Convert an 8-bit sRGB color to CIELAB (D65)
pub fn rgb_to_lab(rgb: Rgb) -> LabColor {
    let srgb = Srgb::new(
        rgb.r as f32 / 255.0,
        rgb.g as f32 / 255.0,
        rgb.b as f32 / 255.0,
    );
    Lab::from_color(srgb)
}

/// CIE76 ΔE: Euclidean distance between two CIELAB colors
#[inline]
pub fn delta_e(a: &LabColor, b: &LabColor) -> f32 {
    let dl = a.l - b.l;
    let da = a.a - b.a;
    let db = a.b - b.b;
    (dl * dl + da * da + db * db).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let c = Rgb::new(255, 8, 160);
        assert_eq!(c.to_hex(), "#FF08A0");
        assert_eq!(Rgb::from_hex("#FF08A0").unwrap(), c);
        assert_eq!(Rgb::from_hex("ff08a0").unwrap(), c);
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(Rgb::from_hex("#f0a").unwrap(), Rgb::new(255, 0, 170));
    }

    #[test]
    fn test_malformed_hex() {
        assert_eq!(
            Rgb::from_hex("#12345"),
            Err(ColorParseError::InvalidLength(5))
        );
        assert!(matches!(
            Rgb::from_hex("#GG0000"),
            Err(ColorParseError::InvalidDigit(_))
        ));
        assert!(Rgb::from_hex("not a color").is_err());
    }

    #[test]
    fn test_lab_of_white_and_black() {
        let white = rgb_to_lab(Rgb::gray(255));
        let black = rgb_to_lab(Rgb::BLACK);
        assert!((white.l - 100.0).abs() < 0.1);
        assert!(white.a.abs() < 0.1 && white.b.abs() < 0.1);
        assert!(black.l.abs() < 0.1);
        assert!((delta_e(&white, &black) - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_delta_e_identical_is_zero() {
        let red = Rgb::new(255, 0, 0).to_lab();
        assert_eq!(delta_e(&red, &red), 0.0);
    }

    #[test]
    fn test_near_colors_are_perceptually_close() {
        let a = Rgb::new(200, 30, 30).to_lab();
        let b = Rgb::new(205, 32, 28).to_lab();
        let c = Rgb::new(30, 30, 200).to_lab();
        assert!(delta_e(&a, &b) < 15.0);
        assert!(delta_e(&a, &c) > 15.0);
    }

    #[test]
    fn test_rgb_distance() {
        assert_eq!(Rgb::new(0, 0, 0).distance_sq(&Rgb::new(3, 4, 0)), 25);
    }
}

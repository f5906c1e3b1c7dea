//! RGBA colors and their HLS/HSV views.

use crate::error::InvalidValue;
use serde::{Deserialize, Serialize};

/// An RGBA color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

const ONE_THIRD: f64 = 1.0 / 3.0;
const ONE_SIXTH: f64 = 1.0 / 6.0;
const TWO_THIRDS: f64 = 2.0 / 3.0;

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// An opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Build a color from channels in `0.0..=1.0`.
    pub fn from_fractions(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self::new(channel(r), channel(g), channel(b), channel(a))
    }

    /// Build a color from hue, luminance and saturation (all in `0.0..=1.0`).
    pub fn from_hls(h: f64, l: f64, s: f64, a: f64) -> Self {
        if s == 0.0 {
            return Self::from_fractions(l, l, l, a);
        }
        let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let m1 = 2.0 * l - m2;
        Self::from_fractions(
            hls_value(m1, m2, h + ONE_THIRD),
            hls_value(m1, m2, h),
            hls_value(m1, m2, h - ONE_THIRD),
            a,
        )
    }

    /// Build a color from hue, saturation and value (all in `0.0..=1.0`).
    pub fn from_hsv(h: f64, s: f64, v: f64, a: f64) -> Self {
        if s == 0.0 {
            return Self::from_fractions(v, v, v, a);
        }
        let sector = (h * 6.0).floor();
        let f = h * 6.0 - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        let (r, g, b) = match (sector as i64).rem_euclid(6) {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self::from_fractions(r, g, b, a)
    }

    /// Parse the eight hex digits `rrggbbaa`.
    pub fn from_hex8(text: &str) -> Result<Self, InvalidValue> {
        let malformed = || InvalidValue::Malformed {
            kind: "color",
            text: text.to_string(),
        };
        if text.len() != 8 || !text.is_ascii() {
            return Err(malformed());
        }
        let byte = |i: usize| u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| malformed());
        Ok(Self::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?))
    }

    /// The eight lowercase hex digits `rrggbbaa`.
    pub fn to_hex8(self) -> String {
        format!("{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }

    fn fractions(self) -> (f64, f64, f64) {
        (
            f64::from(self.r) / 255.0,
            f64::from(self.g) / 255.0,
            f64::from(self.b) / 255.0,
        )
    }

    /// Hue, luminance and saturation.
    pub fn hls(self) -> (f64, f64, f64) {
        let (r, g, b) = self.fractions();
        let maxc = r.max(g).max(b);
        let minc = r.min(g).min(b);
        let l = (minc + maxc) / 2.0;
        if minc == maxc {
            return (0.0, l, 0.0);
        }
        let s = if l <= 0.5 {
            (maxc - minc) / (maxc + minc)
        } else {
            (maxc - minc) / (2.0 - maxc - minc)
        };
        (hue(r, g, b, maxc, minc), l, s)
    }

    /// Hue, luminance, saturation and alpha (in `0.0..=1.0`).
    pub fn hlsa(self) -> (f64, f64, f64, f64) {
        let (h, l, s) = self.hls();
        (h, l, s, f64::from(self.a) / 255.0)
    }

    /// Hue, saturation and value.
    pub fn hsv(self) -> (f64, f64, f64) {
        let (r, g, b) = self.fractions();
        let maxc = r.max(g).max(b);
        let minc = r.min(g).min(b);
        if minc == maxc {
            return (0.0, 0.0, maxc);
        }
        let s = (maxc - minc) / maxc;
        (hue(r, g, b, maxc, minc), s, maxc)
    }

    /// Hue, saturation, value and alpha (in `0.0..=1.0`).
    pub fn hsva(self) -> (f64, f64, f64, f64) {
        let (h, s, v) = self.hsv();
        (h, s, v, f64::from(self.a) / 255.0)
    }

    /// Luminance in `0.0..=1.0`.
    pub fn lum(self) -> f64 {
        self.hls().1
    }

    /// The same color with alpha replaced.
    pub fn witha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// The same hue and saturation with luminance replaced.
    pub fn withlum(self, lum: f64) -> Self {
        let (h, _, s) = self.hls();
        Self::from_hls(h, lum, s, f64::from(self.a) / 255.0)
    }
}

fn channel(fraction: f64) -> u8 {
    (fraction * 255.0).round().clamp(0.0, 255.0) as u8
}

fn hue(r: f64, g: f64, b: f64, maxc: f64, minc: f64) -> f64 {
    let span = maxc - minc;
    let rc = (maxc - r) / span;
    let gc = (maxc - g) / span;
    let bc = (maxc - b) / span;
    let h = if r == maxc {
        bc - gc
    } else if g == maxc {
        2.0 + rc - bc
    } else {
        4.0 + gc - rc
    };
    (h / 6.0).rem_euclid(1.0)
}

fn hls_value(m1: f64, m2: f64, hue: f64) -> f64 {
    let hue = hue.rem_euclid(1.0);
    if hue < ONE_SIXTH {
        m1 + (m2 - m1) * hue * 6.0
    } else if hue < 0.5 {
        m2
    } else if hue < TWO_THIRDS {
        m1 + (m2 - m1) * (TWO_THIRDS - hue) * 6.0
    } else {
        m1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_hls(c: Color) -> Color {
        let (h, l, s, a) = c.hlsa();
        Color::from_hls(h, l, s, a)
    }

    fn roundtrip_hsv(c: Color) -> Color {
        let (h, s, v, a) = c.hsva();
        Color::from_hsv(h, s, v, a)
    }

    #[test]
    fn test_hls_roundtrip() {
        for c in [
            Color::new(255, 0, 0, 255),
            Color::new(128, 128, 128, 255),
            Color::new(10, 200, 40, 128),
        ] {
            assert_eq!(roundtrip_hls(c), c);
        }
    }

    #[test]
    fn test_hsv_roundtrip() {
        for c in [
            Color::new(255, 0, 0, 255),
            Color::new(128, 128, 128, 255),
            Color::new(10, 200, 40, 128),
        ] {
            assert_eq!(roundtrip_hsv(c), c);
        }
    }

    #[test]
    fn test_achromatic_short_circuit() {
        let grey = Color::rgb(128, 128, 128);
        let (h, _, s) = grey.hls();
        assert_eq!((h, s), (0.0, 0.0));
        let (h, s, v) = grey.hsv();
        assert_eq!((h, s), (0.0, 0.0));
        assert!((v - 128.0 / 255.0).abs() < 1e-12);
    }

    #[test]
    fn test_red_hue_is_zero() {
        let (h, l, s) = Color::rgb(255, 0, 0).hls();
        assert_eq!(h, 0.0);
        assert_eq!(l, 0.5);
        assert_eq!(s, 1.0);
    }

    #[test]
    fn test_withlum_keeps_hue() {
        let c = Color::rgb(255, 0, 0).withlum(0.25);
        assert_eq!(c, Color::rgb(128, 0, 0));
        assert_eq!(Color::rgb(0, 0, 0).withlum(1.0), Color::rgb(255, 255, 255));
    }

    #[test]
    fn test_witha() {
        assert_eq!(Color::rgb(1, 2, 3).witha(4), Color::new(1, 2, 3, 4));
    }

    #[test]
    fn test_hex8() {
        let c = Color::new(0x12, 0xab, 0x00, 0xff);
        assert_eq!(c.to_hex8(), "12ab00ff");
        assert_eq!(Color::from_hex8("12ab00ff"), Ok(c));
        assert!(Color::from_hex8("12ab00f").is_err());
        assert!(Color::from_hex8("12ab00fg").is_err());
    }
}

//! RGB parsing and CIELAB conversion.
//!
//! Colors are matched by Euclidean distance in CIELAB (ΔE*76), which is
//! close to perceptually uniform, instead of raw RGB distance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// An 8-bit sRGB color.
///
/// Serializes as its `#RRGGBB` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Creates a color from its channels.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses a color value.
    ///
    /// Accepted forms (case-insensitive, surrounding whitespace ignored):
    /// `#RRGGBB`, `RRGGBB`, `#RGB`, `RGB` and `rgb(r, g, b)`.
    ///
    /// ```rust
    /// use gallerydb::Rgb;
    ///
    /// assert_eq!(Rgb::parse("#FF0000").unwrap(), Rgb::new(255, 0, 0));
    /// assert_eq!(Rgb::parse("0f0").unwrap(), Rgb::new(0, 255, 0));
    /// assert_eq!(Rgb::parse("rgb(0, 0, 255)").unwrap(), Rgb::new(0, 0, 255));
    /// assert!(Rgb::parse("blue").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let value = input.trim();
        if value.is_empty() {
            return Err(ValidationError::invalid_color(input, "empty color value"));
        }

        let lower = value.to_ascii_lowercase();
        if let Some(body) = lower
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return Self::parse_functional(input, body);
        }

        let hex = value.strip_prefix('#').unwrap_or(value);
        Self::parse_hex(input, hex)
    }

    fn parse_hex(input: &str, hex: &str) -> Result<Self, ValidationError> {
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ValidationError::invalid_color(
                input,
                "expected hexadecimal digits",
            ));
        }

        match hex.len() {
            6 => {
                let channel = |i: usize| {
                    u8::from_str_radix(&hex[i..i + 2], 16)
                        .map_err(|e| ValidationError::invalid_color(input, e.to_string()))
                };
                Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
            }
            3 => {
                let channel = |i: usize| {
                    u8::from_str_radix(&hex[i..i + 1], 16)
                        .map(|v| v * 17)
                        .map_err(|e| ValidationError::invalid_color(input, e.to_string()))
                };
                Ok(Self::new(channel(0)?, channel(1)?, channel(2)?))
            }
            n => Err(ValidationError::invalid_color(
                input,
                format!("expected 3 or 6 hex digits, got {}", n),
            )),
        }
    }

    fn parse_functional(input: &str, body: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ValidationError::invalid_color(
                input,
                format!("expected 3 channels, got {}", parts.len()),
            ));
        }

        let mut channels = [0u8; 3];
        for (slot, part) in channels.iter_mut().zip(&parts) {
            *slot = part.parse::<u8>().map_err(|_| {
                ValidationError::invalid_color(
                    input,
                    format!("channel '{}' is not an integer in 0..=255", part),
                )
            })?;
        }

        Ok(Self::new(channels[0], channels[1], channels[2]))
    }

    /// Returns the `#RRGGBB` form (uppercase).
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Converts to CIELAB under the D65 white point.
    pub fn to_lab(&self) -> Lab {
        let r = srgb_to_linear(self.r);
        let g = srgb_to_linear(self.g);
        let b = srgb_to_linear(self.b);

        let x = (0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / WHITE_X;
        let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
        let z = (0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b) / WHITE_Z;

        let fx = lab_f(x);
        let fy = lab_f(y);
        let fz = lab_f(z);

        Lab {
            l: (116.0 * fy - 16.0) as f32,
            a: (500.0 * (fx - fy)) as f32,
            b: (200.0 * (fy - fz)) as f32,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Rgb {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Rgb> for String {
    fn from(color: Rgb) -> Self {
        color.to_hex()
    }
}

// D65 reference white, normalized so Y = 1.
const WHITE_X: f64 = 0.950_47;
const WHITE_Z: f64 = 1.088_83;

const EPSILON: f64 = 216.0 / 24_389.0;
const KAPPA: f64 = 24_389.0 / 27.0;

fn srgb_to_linear(channel: u8) -> f64 {
    let c = channel as f64 / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

/// A color in CIELAB space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lab {
    /// Lightness, 0..=100.
    pub l: f32,
    /// Green–red axis.
    pub a: f32,
    /// Blue–yellow axis.
    pub b: f32,
}

impl Lab {
    /// Euclidean distance (ΔE*76).
    #[inline]
    pub fn distance(&self, other: &Lab) -> f32 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        (dl * dl + da * da + db * db).sqrt()
    }
}

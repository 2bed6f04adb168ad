//! Colour model – tagged colour values and their PDF operator encoding.
//!
//! Channel ranges follow the conventions of the fragment translator:
//! gray and RGB channels are 0–255, CMYK channels, spot tints and alpha are
//! 0–100. Operators print every channel scaled to 0..1 with three decimals.

use serde::{Deserialize, Serialize};

use crate::error::Warning;

/// A colour in one of the supported colour spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorValue {
    Gray(u8),
    Rgb(u8, u8, u8),
    /// RGB plus alpha (0–100).
    Rgba(u8, u8, u8, u8),
    Cmyk(u8, u8, u8, u8),
    /// CMYK plus alpha (0–100).
    Cmyka(u8, u8, u8, u8, u8),
    /// Registered spot colour (see [`SpotColors`]) at a tint of 0–100.
    Spot { index: usize, tint: u8 },
}

/// Whether a colour operator targets the fill or the stroke colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paint {
    Fill,
    Stroke,
}

impl ColorValue {
    pub const BLACK: ColorValue = ColorValue::Gray(0);
    pub const WHITE: ColorValue = ColorValue::Gray(255);

    pub fn cmyk(c: u8, m: u8, y: u8, k: u8) -> Self {
        ColorValue::Cmyk(c.min(100), m.min(100), y.min(100), k.min(100))
    }

    pub fn spot(index: usize, tint: u8) -> Self {
        ColorValue::Spot { index, tint: tint.min(100) }
    }

    /// Alpha component as 0..1 for the alpha-carrying variants.
    pub fn alpha(&self) -> Option<f32> {
        match *self {
            ColorValue::Rgba(_, _, _, a) | ColorValue::Cmyka(_, _, _, _, a) => {
                Some(f32::from(a.min(100)) / 100.0)
            }
            _ => None,
        }
    }

    /// Drop the alpha component, keeping the colour space.
    pub fn opaque(&self) -> ColorValue {
        match *self {
            ColorValue::Rgba(r, g, b, _) => ColorValue::Rgb(r, g, b),
            ColorValue::Cmyka(c, m, y, k, _) => ColorValue::Cmyk(c, m, y, k),
            other => other,
        }
    }

    /// Encode as a PDF colour operator (without trailing newline).
    pub fn encode(&self, paint: Paint) -> String {
        let stroke = paint == Paint::Stroke;
        match *self {
            ColorValue::Gray(v) => {
                format!("{:.3} {}", unit(v, 255.0), if stroke { "G" } else { "g" })
            }
            ColorValue::Rgb(r, g, b) | ColorValue::Rgba(r, g, b, _) => format!(
                "{:.3} {:.3} {:.3} {}",
                unit(r, 255.0),
                unit(g, 255.0),
                unit(b, 255.0),
                if stroke { "RG" } else { "rg" }
            ),
            ColorValue::Cmyk(c, m, y, k) | ColorValue::Cmyka(c, m, y, k, _) => format!(
                "{:.3} {:.3} {:.3} {:.3} {}",
                unit(c, 100.0),
                unit(m, 100.0),
                unit(y, 100.0),
                unit(k, 100.0),
                if stroke { "K" } else { "k" }
            ),
            ColorValue::Spot { index, tint } => {
                if stroke {
                    format!("/CS{} CS {:.3} SCN", index + 1, unit(tint, 100.0))
                } else {
                    format!("/CS{} cs {:.3} scn", index + 1, unit(tint, 100.0))
                }
            }
        }
    }

    /// Parse an operator produced by [`ColorValue::encode`] back into a value.
    pub fn decode(op: &str) -> Option<(ColorValue, Paint)> {
        let tokens: Vec<&str> = op.split_whitespace().collect();
        let (operator, operands) = tokens.split_last()?;
        let nums = |slice: &[&str], scale: f32| -> Option<Vec<u8>> {
            slice
                .iter()
                .map(|t| t.parse::<f32>().ok().map(|v| (v * scale).round().clamp(0.0, scale) as u8))
                .collect()
        };
        match *operator {
            "g" | "G" if operands.len() == 1 => {
                let v = nums(operands, 255.0)?;
                Some((ColorValue::Gray(v[0]), paint_of(operator)))
            }
            "rg" | "RG" if operands.len() == 3 => {
                let v = nums(operands, 255.0)?;
                Some((ColorValue::Rgb(v[0], v[1], v[2]), paint_of(operator)))
            }
            "k" | "K" if operands.len() == 4 => {
                let v = nums(operands, 100.0)?;
                Some((ColorValue::Cmyk(v[0], v[1], v[2], v[3]), paint_of(operator)))
            }
            "scn" | "SCN" if operands.len() == 3 => {
                let index = operands[0]
                    .strip_prefix("/CS")?
                    .parse::<usize>()
                    .ok()?
                    .checked_sub(1)?;
                let tint = nums(&operands[2..], 100.0)?;
                Some((ColorValue::spot(index, tint[0]), paint_of(operator)))
            }
            _ => None,
        }
    }

    /// Convert to device CMYK. Spot colours keep their identity.
    pub fn to_cmyk(&self) -> ColorValue {
        match *self {
            ColorValue::Rgb(r, g, b) => rgb_to_cmyk(r, g, b),
            ColorValue::Rgba(r, g, b, a) => match rgb_to_cmyk(r, g, b) {
                ColorValue::Cmyk(c, m, y, k) => ColorValue::Cmyka(c, m, y, k, a),
                other => other,
            },
            other => other,
        }
    }

    /// Convert to device RGB. Spot colours keep their identity.
    pub fn to_rgb(&self) -> ColorValue {
        match *self {
            ColorValue::Cmyk(c, m, y, k) => cmyk_to_rgb(c, m, y, k),
            ColorValue::Cmyka(c, m, y, k, a) => match cmyk_to_rgb(c, m, y, k) {
                ColorValue::Rgb(r, g, b) => ColorValue::Rgba(r, g, b, a),
                other => other,
            },
            other => other,
        }
    }
}

fn unit(v: u8, max: f32) -> f32 {
    (f32::from(v) / max).clamp(0.0, 1.0)
}

fn paint_of(operator: &str) -> Paint {
    if operator.chars().all(|c| c.is_ascii_uppercase()) {
        Paint::Stroke
    } else {
        Paint::Fill
    }
}

fn rgb_to_cmyk(r: u8, g: u8, b: u8) -> ColorValue {
    let (r, g, b) = (unit(r, 255.0), unit(g, 255.0), unit(b, 255.0));
    let k = 1.0 - r.max(g).max(b);
    if k >= 1.0 {
        return ColorValue::Cmyk(0, 0, 0, 100);
    }
    let chan = |v: f32| (((1.0 - v - k) / (1.0 - k)) * 100.0).round() as u8;
    ColorValue::Cmyk(chan(r), chan(g), chan(b), (k * 100.0).round() as u8)
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> ColorValue {
    let k = unit(k, 100.0);
    let chan = |v: u8| (255.0 * (1.0 - unit(v, 100.0)) * (1.0 - k)).round() as u8;
    ColorValue::Rgb(chan(c), chan(m), chan(y))
}

/// A named separation colour with its CMYK alternate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotColor {
    pub name: String,
    pub cmyk: [u8; 4],
}

/// Registry of spot colours; the index is the position of registration.
#[derive(Debug, Clone, Default)]
pub struct SpotColors {
    colors: Vec<SpotColor>,
}

impl SpotColors {
    /// Register a spot colour. Names are case-insensitive; registering an
    /// existing name returns its index unchanged.
    pub fn add(&mut self, name: &str, c: u8, m: u8, y: u8, k: u8) -> usize {
        let key = name.trim().to_uppercase();
        if let Some(idx) = self.index_of(&key) {
            return idx;
        }
        self.colors.push(SpotColor {
            name: key,
            cmyk: [c.min(100), m.min(100), y.min(100), k.min(100)],
        });
        self.colors.len() - 1
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        let key = name.trim().to_uppercase();
        self.colors.iter().position(|s| s.name == key)
    }

    pub fn get(&self, index: usize) -> Option<&SpotColor> {
        self.colors.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &SpotColor)> {
        self.colors.iter().enumerate()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Colour spaces permitted by the active output profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorSpaceRestriction {
    #[default]
    Unrestricted,
    /// Print-oriented profile: RGB is converted to CMYK.
    CmykOnly,
    /// Screen-oriented archival profile: CMYK is converted to RGB.
    RgbOnly,
}

/// Bring a colour into the permitted colour space, reporting a conversion.
pub fn restrict(
    color: ColorValue,
    restriction: ColorSpaceRestriction,
) -> (ColorValue, Option<Warning>) {
    let converted = match (restriction, color) {
        (ColorSpaceRestriction::CmykOnly, ColorValue::Rgb(..) | ColorValue::Rgba(..)) => {
            color.to_cmyk()
        }
        (ColorSpaceRestriction::RgbOnly, ColorValue::Cmyk(..) | ColorValue::Cmyka(..)) => {
            color.to_rgb()
        }
        _ => return (color, None),
    };
    let warning = Warning::ComplianceViolation(format!(
        "colour {color:?} converted to {converted:?} for the output profile"
    ));
    (converted, Some(warning))
}

/// Colour state tracked per document and re-emitted after a page break.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorState {
    pub text: ColorValue,
    pub draw: ColorValue,
    pub fill: ColorValue,
}

impl Default for ColorState {
    fn default() -> Self {
        Self {
            text: ColorValue::BLACK,
            draw: ColorValue::BLACK,
            fill: ColorValue::WHITE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_device_operators() {
        assert_eq!(ColorValue::Gray(0).encode(Paint::Fill), "0.000 g");
        assert_eq!(ColorValue::Rgb(255, 0, 0).encode(Paint::Stroke), "1.000 0.000 0.000 RG");
        assert_eq!(
            ColorValue::cmyk(0, 0, 0, 100).encode(Paint::Fill),
            "0.000 0.000 0.000 1.000 k"
        );
        assert_eq!(ColorValue::spot(0, 50).encode(Paint::Fill), "/CS1 cs 0.500 scn");
    }

    #[test]
    fn cmyk_black_is_not_gray_black() {
        assert_ne!(
            ColorValue::cmyk(0, 0, 0, 100).encode(Paint::Fill),
            ColorValue::Gray(0).encode(Paint::Fill)
        );
    }

    #[test]
    fn alpha_is_not_part_of_the_operator() {
        let c = ColorValue::Rgba(10, 20, 30, 40);
        assert_eq!(c.encode(Paint::Fill), ColorValue::Rgb(10, 20, 30).encode(Paint::Fill));
        assert_eq!(c.alpha(), Some(0.4));
    }

    #[test]
    fn spot_registry_deduplicates() {
        let mut spots = SpotColors::default();
        let a = spots.add("PANTONE 300 C", 100, 44, 0, 0);
        let b = spots.add("pantone 300 c", 1, 2, 3, 4);
        assert_eq!(a, b);
        assert_eq!(spots.get(a).map(|s| s.cmyk), Some([100, 44, 0, 0]));
    }

    #[test]
    fn restriction_converts_and_warns() {
        let (c, w) = restrict(ColorValue::Rgb(255, 0, 0), ColorSpaceRestriction::CmykOnly);
        assert_eq!(c, ColorValue::Cmyk(0, 100, 100, 0));
        assert!(matches!(w, Some(Warning::ComplianceViolation(_))));
        let (g, none) = restrict(ColorValue::Gray(7), ColorSpaceRestriction::CmykOnly);
        assert_eq!(g, ColorValue::Gray(7));
        assert!(none.is_none());
    }

    proptest! {
        #[test]
        fn rgb_round_trips(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let c = ColorValue::Rgb(r, g, b);
            let (decoded, paint) = ColorValue::decode(&c.encode(Paint::Fill)).unwrap();
            prop_assert_eq!(decoded, c);
            prop_assert_eq!(paint, Paint::Fill);
        }

        #[test]
        fn cmyk_round_trips(c in 0u8..=100, m in 0u8..=100, y in 0u8..=100, k in 0u8..=100) {
            let v = ColorValue::cmyk(c, m, y, k);
            let (decoded, paint) = ColorValue::decode(&v.encode(Paint::Stroke)).unwrap();
            prop_assert_eq!(decoded, v);
            prop_assert_eq!(paint, Paint::Stroke);
        }

        #[test]
        fn gray_and_spot_round_trip(v in any::<u8>(), idx in 0usize..8, tint in 0u8..=100) {
            let gray = ColorValue::Gray(v);
            prop_assert_eq!(ColorValue::decode(&gray.encode(Paint::Fill)).unwrap().0, gray);
            let spot = ColorValue::spot(idx, tint);
            prop_assert_eq!(ColorValue::decode(&spot.encode(Paint::Stroke)).unwrap().0, spot);
        }
    }
}

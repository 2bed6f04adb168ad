//! Width measurement.
//!
//! Advances are kept in 1/1000 em until the last step, where they are scaled
//! by the font size and converted to millimetres.

use crate::fonts::{FontEntry, FALLBACK_MISSING_WIDTH};
use crate::units::PT_PER_MM;

pub const SOFT_HYPHEN: char = '\u{00AD}';

/// Extra spacing applied on top of glyph advances, in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Spacing {
    /// Added after every character.
    pub char_spacing: f32,
    /// Added after every ASCII space.
    pub word_spacing: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureOptions {
    pub kerning: bool,
    /// Scale for lower-case letters rendered as small capitals.
    pub small_caps: Option<f32>,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        Self {
            kerning: true,
            small_caps: None,
        }
    }
}

/// Advance of one character in 1/1000 em.
pub fn char_width(entry: &FontEntry, c: char) -> f32 {
    if c == SOFT_HYPHEN && !entry.symbolic {
        return 0.0;
    }
    let w = entry
        .metrics
        .widths
        .get(&(c as u32))
        .copied()
        .or(entry.metrics.missing_width)
        .unwrap_or(FALLBACK_MISSING_WIDTH);
    f32::from(w)
}

/// Advance `c` adds after `prev`, in 1/1000 em: its width plus the kerning
/// pair it forms with `prev`.
pub fn char_advance(entry: &FontEntry, prev: Option<char>, c: char, opts: &MeasureOptions) -> f32 {
    let width = match opts.small_caps {
        Some(scale) if c.is_lowercase() => {
            char_width(entry, c.to_uppercase().next().unwrap_or(c)) * scale
        }
        _ => char_width(entry, c),
    };
    let kern = match prev {
        Some(p) if opts.kerning && opts.small_caps.is_none() => {
            f32::from(entry.metrics.kern(p as u32, c as u32))
        }
        _ => 0.0,
    };
    width + kern
}

/// Sum of advances plus kerning for `text`, in 1/1000 em.
pub fn glyph_units(entry: &FontEntry, text: &str, opts: &MeasureOptions) -> f32 {
    let mut total = 0.0;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        total += char_advance(entry, prev, c, opts);
        prev = Some(c);
    }
    total
}

/// Number of characters and ASCII spaces in `text`.
pub fn count_chars(text: &str) -> (usize, usize) {
    text.chars().fold((0, 0), |(n, s), c| (n + 1, s + usize::from(c == ' ')))
}

/// Rendered width of `text` at `size_pt`, in millimetres.
pub fn text_width(
    entry: &FontEntry,
    size_pt: f32,
    text: &str,
    spacing: Spacing,
    opts: &MeasureOptions,
) -> f32 {
    let (chars, spaces) = count_chars(text);
    units_to_mm(glyph_units(entry, text, opts), size_pt)
        + chars as f32 * spacing.char_spacing
        + spaces as f32 * spacing.word_spacing
}

/// Width, mm, that appending `c` after `prev` adds to a run.
pub fn appended_width(
    entry: &FontEntry,
    size_pt: f32,
    prev: Option<char>,
    c: char,
    spacing: Spacing,
    opts: &MeasureOptions,
) -> f32 {
    let word = if c == ' ' { spacing.word_spacing } else { 0.0 };
    units_to_mm(char_advance(entry, prev, c, opts), size_pt) + spacing.char_spacing + word
}

pub fn units_to_mm(units: f32, size_pt: f32) -> f32 {
    units * size_pt / 1000.0 / PT_PER_MM
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{FontManager, FontOptions, FontStyle};
    use proptest::prelude::*;

    fn helvetica() -> FontEntry {
        let mut fonts = FontManager::new(FontOptions::default());
        let r = fonts.load_font("helvetica", FontStyle::empty()).unwrap();
        fonts.entry(r.id).clone()
    }

    #[test]
    fn known_helvetica_width() {
        let f = helvetica();
        // H e l l o = 722 + 556 + 222 + 222 + 556
        assert_eq!(glyph_units(&f, "Hello", &MeasureOptions::default()), 2278.0);
        let mm = text_width(&f, 12.0, "Hello", Spacing::default(), &MeasureOptions::default());
        assert!((mm - 2278.0 * 12.0 / 1000.0 / PT_PER_MM).abs() < 1e-4);
    }

    #[test]
    fn soft_hyphen_is_zero_width() {
        let f = helvetica();
        assert_eq!(char_width(&f, SOFT_HYPHEN), 0.0);
    }

    #[test]
    fn missing_glyph_uses_fallback() {
        let f = helvetica();
        let w = char_width(&f, '\u{4E2D}');
        assert_eq!(w, f32::from(f.metrics.missing_width.unwrap_or(FALLBACK_MISSING_WIDTH)));
    }

    #[test]
    fn small_caps_scale_upper_case_width() {
        let f = helvetica();
        let opts = MeasureOptions {
            kerning: false,
            small_caps: Some(0.75),
        };
        assert_eq!(glyph_units(&f, "a", &opts), 667.0 * 0.75);
        assert_eq!(glyph_units(&f, "A", &opts), 667.0);
    }

    #[test]
    fn appending_matches_measuring_the_whole_run() {
        let f = helvetica();
        let opts = MeasureOptions::default();
        let spacing = Spacing { char_spacing: 0.2, word_spacing: 1.0 };
        let text = "AVATAR To wit";
        let mut total = 0.0;
        let mut prev = None;
        for c in text.chars() {
            total += appended_width(&f, 11.0, prev, c, spacing, &opts);
            prev = Some(c);
        }
        assert!((total - text_width(&f, 11.0, text, spacing, &opts)).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn width_is_sum_of_parts(text in "[ -~]{0,40}", cs in 0.0f32..2.0, ws in 0.0f32..4.0) {
            let f = helvetica();
            let opts = MeasureOptions::default();
            let spacing = Spacing { char_spacing: cs, word_spacing: ws };
            let per_char: f32 = text.chars().map(|c| units_to_mm(char_width(&f, c), 10.0)).sum();
            let (n, s) = count_chars(&text);
            let expected = per_char + n as f32 * cs + s as f32 * ws;
            let actual = text_width(&f, 10.0, &text, spacing, &opts);
            prop_assert!((actual - expected).abs() < 1e-2);
        }
    }
}

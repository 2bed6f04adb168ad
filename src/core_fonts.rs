//! Built-in metrics for the PDF core-14 fonts.
//!
//! Widths are the standard Adobe AFM advances (1/1000 em) for the printable
//! ASCII range plus the WinAnsi punctuation that fragment text commonly
//! carries. Core fonts are never embedded, so no glyph data is needed.

use std::collections::HashMap;

use crate::fonts::{FontMetrics, FontStyle};

/// Canonical core family names.
pub const CORE_FAMILIES: [&str; 5] = ["helvetica", "times", "courier", "symbol", "zapfdingbats"];

/// Map common aliases of core families onto the canonical names.
pub fn core_alias(family: &str) -> &str {
    match family {
        "arial" | "helvetica" => "helvetica",
        "times" | "timesnewroman" | "timesroman" => "times",
        "courier" | "couriernew" => "courier",
        "symbol" => "symbol",
        "zapfdingbats" | "dingbats" => "zapfdingbats",
        other => other,
    }
}

pub fn is_core_family(family: &str) -> bool {
    CORE_FAMILIES.contains(&family)
}

/// Whether the core family is one of the two symbolic fonts.
pub fn is_symbolic(family: &str) -> bool {
    matches!(family, "symbol" | "zapfdingbats")
}

/// PostScript name of a core font.
pub fn postscript_name(family: &str, style: FontStyle) -> Option<&'static str> {
    let bold = style.contains(FontStyle::BOLD);
    let italic = style.contains(FontStyle::ITALIC);
    Some(match (family, bold, italic) {
        ("helvetica", false, false) => "Helvetica",
        ("helvetica", true, false) => "Helvetica-Bold",
        ("helvetica", false, true) => "Helvetica-Oblique",
        ("helvetica", true, true) => "Helvetica-BoldOblique",
        ("times", false, false) => "Times-Roman",
        ("times", true, false) => "Times-Bold",
        ("times", false, true) => "Times-Italic",
        ("times", true, true) => "Times-BoldItalic",
        ("courier", false, false) => "Courier",
        ("courier", true, false) => "Courier-Bold",
        ("courier", false, true) => "Courier-Oblique",
        ("courier", true, true) => "Courier-BoldOblique",
        ("symbol", false, false) => "Symbol",
        ("zapfdingbats", false, false) => "ZapfDingbats",
        _ => return None,
    })
}

// Advances for U+0020..=U+007E.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, //
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, //
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, //
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, //
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, //
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, //
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, //
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, //
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500, //
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, //
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

const TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500, //
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778, //
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500, //
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500, //
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

const TIMES_ITALIC: [u16; 95] = [
    250, 333, 420, 500, 500, 833, 778, 214, 333, 333, 500, 675, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 675, 675, 675, 500, //
    920, 611, 611, 667, 722, 611, 611, 722, 722, 333, 444, 667, 556, 833, 667, 722, //
    611, 722, 611, 500, 556, 722, 611, 833, 611, 556, 556, 389, 278, 389, 422, 500, //
    333, 500, 500, 444, 500, 444, 278, 500, 500, 278, 278, 444, 278, 722, 500, 500, //
    500, 500, 389, 389, 278, 500, 444, 667, 444, 444, 389, 400, 275, 400, 541,
];

const TIMES_BOLD_ITALIC: [u16; 95] = [
    250, 389, 555, 500, 500, 833, 778, 278, 333, 333, 500, 570, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500, //
    832, 667, 667, 667, 722, 667, 667, 722, 778, 389, 500, 667, 611, 889, 722, 722, //
    611, 722, 667, 556, 611, 722, 667, 889, 667, 611, 611, 333, 278, 333, 570, 500, //
    333, 500, 500, 444, 500, 444, 333, 500, 556, 278, 278, 500, 278, 778, 556, 500, //
    500, 500, 389, 389, 278, 556, 444, 667, 500, 444, 389, 348, 220, 348, 570,
];

/// WinAnsi extras shared by the proportional families: (codepoint, helvetica, times).
const EXTRAS: [(u32, u16, u16); 12] = [
    (0x00A0, 278, 250), // no-break space
    (0x00AD, 333, 333), // soft hyphen
    (0x00B7, 278, 250), // middle dot
    (0x2013, 556, 500), // en dash
    (0x2014, 1000, 1000), // em dash
    (0x2018, 222, 333), // left single quote
    (0x2019, 222, 333), // right single quote
    (0x201C, 333, 444), // left double quote
    (0x201D, 333, 444), // right double quote
    (0x2022, 350, 350), // bullet
    (0x2026, 1000, 1000), // ellipsis
    (0x20AC, 556, 500), // euro
];

/// Build the metrics record for one core font.
pub fn core_metrics(family: &str, style: FontStyle) -> Option<FontMetrics> {
    let name = postscript_name(family, style)?;
    let bold = style.contains(FontStyle::BOLD);
    let italic = style.contains(FontStyle::ITALIC);

    let table: Option<&[u16; 95]> = match (family, bold, italic) {
        ("helvetica", false, _) => Some(&HELVETICA),
        ("helvetica", true, _) => Some(&HELVETICA_BOLD),
        ("times", false, false) => Some(&TIMES_ROMAN),
        ("times", true, false) => Some(&TIMES_BOLD),
        ("times", false, true) => Some(&TIMES_ITALIC),
        ("times", true, true) => Some(&TIMES_BOLD_ITALIC),
        _ => None,
    };

    let mut widths: HashMap<u32, u16> = HashMap::new();
    match (family, table) {
        ("courier", _) => {
            for cp in 0x20..=0x7E {
                widths.insert(cp, 600);
            }
            for (cp, _, _) in EXTRAS {
                widths.insert(cp, 600);
            }
        }
        (_, Some(table)) => {
            for (i, w) in table.iter().enumerate() {
                widths.insert(0x20 + i as u32, *w);
            }
            let helvetica = family == "helvetica";
            for (cp, hw, tw) in EXTRAS {
                widths.insert(cp, if helvetica { hw } else { tw });
            }
        }
        // Symbol fonts: only the space is relied upon; everything else uses
        // the missing width.
        _ => {
            widths.insert(0x20, 250);
        }
    }

    let (ascent, descent, cap_height, x_height) = match (family, bold) {
        ("helvetica", false) => (718, -207, 718, 523),
        ("helvetica", true) => (718, -207, 718, 532),
        ("times", false) => (683, -217, 662, 450),
        ("times", true) => (676, -205, 676, 461),
        ("courier", false) => (629, -157, 562, 426),
        ("courier", true) => (626, -142, 562, 439),
        _ => (800, -200, 700, 500),
    };

    let italic_angle = match (family, italic) {
        ("times", true) => -15.5,
        (_, true) => -12.0,
        _ => 0.0,
    };

    Some(FontMetrics {
        postscript_name: name.to_string(),
        units_per_em: 1000,
        widths,
        glyph_ids: HashMap::new(),
        kerning: HashMap::new(),
        ascent,
        descent,
        cap_height,
        x_height,
        missing_width: None,
        underline_position: Some(-100),
        underline_thickness: Some(50),
        italic_angle,
        bbox: [-200, descent, 1000, ascent],
        stem_v: if bold { 120 } else { 70 },
        flags: if is_symbolic(family) { 4 } else { 32 },
        num_glyphs: 0,
        has_smp: false,
        has_sip: false,
    })
}

/// CP1252 code points in 0x80..=0x9F that differ from Latin-1.
const WINANSI_HIGH: [(u8, char); 12] = [
    (0x80, '\u{20AC}'),
    (0x82, '\u{201A}'),
    (0x84, '\u{201E}'),
    (0x85, '\u{2026}'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '\u{2022}'),
    (0x96, '\u{2013}'),
    (0x97, '\u{2014}'),
    (0x99, '\u{2122}'),
];

/// Encode a character into WinAnsi (CP1252) for single-byte core fonts.
/// Characters outside the code page map to `?`.
pub fn winansi_byte(c: char) -> u8 {
    if let Some((b, _)) = WINANSI_HIGH.iter().find(|(_, ch)| *ch == c) {
        return *b;
    }
    match c as u32 {
        0x80..=0x9F => b'?',
        cp if cp < 256 => cp as u8,
        _ => b'?',
    }
}

/// The character a WinAnsi byte stands for.
pub fn winansi_char(b: u8) -> char {
    WINANSI_HIGH
        .iter()
        .find(|(byte, _)| *byte == b)
        .map(|(_, c)| *c)
        .unwrap_or(char::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helvetica_widths() {
        let m = core_metrics("helvetica", FontStyle::empty()).unwrap();
        assert_eq!(m.widths.get(&('H' as u32)), Some(&722));
        assert_eq!(m.widths.get(&('e' as u32)), Some(&556));
        assert_eq!(m.widths.get(&(' ' as u32)), Some(&278));
        assert_eq!(m.postscript_name, "Helvetica");
    }

    #[test]
    fn courier_is_monospaced() {
        let m = core_metrics("courier", FontStyle::BOLD).unwrap();
        assert!(m.widths.values().all(|w| *w == 600));
        assert_eq!(m.postscript_name, "Courier-Bold");
    }

    #[test]
    fn symbol_has_no_styles() {
        assert!(postscript_name("symbol", FontStyle::BOLD).is_none());
        assert!(core_metrics("zapfdingbats", FontStyle::empty()).is_some());
    }

    #[test]
    fn winansi_maps_punctuation() {
        assert_eq!(winansi_byte('\u{2014}'), 0x97);
        assert_eq!(winansi_byte('é'), 0xE9);
        assert_eq!(winansi_char(0x80), '\u{20AC}');
        assert_eq!(winansi_char(b'A'), 'A');
        assert_eq!(winansi_byte('\u{4E2D}'), b'?');
    }
}

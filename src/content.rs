//! Content-stream assembly.
//!
//! All coordinates passed in here are already PDF points with the origin at
//! the bottom-left; conversion from user space happens in the renderer.
//! Numbers are written with three decimals.

use std::fmt::Write as _;

use crate::core_fonts::winansi_byte;
use crate::fonts::{FontEntry, FontKind};

/// Format a number the way every operator in the stream expects it.
pub fn num(v: f32) -> String {
    let s = format!("{v:.3}");
    if s == "-0.000" {
        "0.000".to_string()
    } else {
        s
    }
}

/// Painting mode of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintMode {
    Fill,
    Stroke,
    FillStroke,
}

impl PaintMode {
    pub fn operator(self) -> &'static str {
        match self {
            PaintMode::Fill => "f",
            PaintMode::Stroke => "S",
            PaintMode::FillStroke => "B",
        }
    }

    /// Parse `"F"`, `"D"`/`"S"`, `"FD"`/`"DF"`/`"B"`.
    pub fn parse(style: &str) -> Self {
        match style.to_ascii_uppercase().as_str() {
            "F" => PaintMode::Fill,
            "FD" | "DF" | "B" => PaintMode::FillStroke,
            _ => PaintMode::Stroke,
        }
    }
}

/// A page content stream under construction.
#[derive(Debug, Clone, Default)]
pub struct ContentStream {
    buf: Vec<u8>,
}

impl ContentStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one operator line.
    pub fn op(&mut self, line: &str) {
        self.buf.extend_from_slice(line.as_bytes());
        self.buf.push(b'\n');
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn save(&mut self) {
        self.op("q");
    }

    pub fn restore(&mut self) {
        self.op("Q");
    }

    pub fn line_width(&mut self, pt: f32) {
        self.op(&format!("{} w", num(pt)));
    }

    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, mode: PaintMode) {
        self.op(&format!("{} {} {} {} re {}", num(x), num(y), num(w), num(h), mode.operator()));
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.op(&format!("{} {} m {} {} l S", num(x1), num(y1), num(x2), num(y2)));
    }

    pub fn dash(&mut self, on: f32, off: f32) {
        if on <= 0.0 {
            self.op("[] 0 d");
        } else {
            self.op(&format!("[{} {}] 0 d", num(on), num(off)));
        }
    }

    pub fn graphics_state(&mut self, name: &str) {
        self.op(&format!("/{name} gs"));
    }

    /// Move everything written from byte `from` onwards back to byte `to`,
    /// so it is painted beneath what lies in between.
    pub fn relocate_tail(&mut self, from: usize, to: usize) {
        if to >= from || from > self.buf.len() {
            return;
        }
        let tail = self.buf.split_off(from);
        self.buf.splice(to..to, tail);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Escape bytes for a PDF literal string, including the parentheses.
pub fn literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            b'\r' => out.push_str("\\r"),
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{b:03o}");
            }
        }
    }
    out.push(')');
    out
}

fn glyph_id(entry: &FontEntry, c: char) -> u16 {
    entry.metrics.glyph_ids.get(&(c as u32)).copied().unwrap_or(0)
}

fn single_byte(entry: &FontEntry, c: char) -> u8 {
    if entry.symbolic && matches!(entry.kind, FontKind::Core) && (c as u32) < 256 {
        c as u8
    } else {
        winansi_byte(c)
    }
}

/// Encode `text` as a string operand for `entry`: a literal string of
/// WinAnsi bytes for single-byte fonts, or a hex string of 2-byte glyph ids.
pub fn encode_text(entry: &FontEntry, text: &str) -> String {
    if entry.is_multibyte() {
        let mut out = String::with_capacity(text.len() * 4 + 2);
        out.push('<');
        for c in text.chars() {
            let _ = write!(out, "{:04X}", glyph_id(entry, c));
        }
        out.push('>');
        out
    } else {
        let bytes: Vec<u8> = text.chars().map(|c| single_byte(entry, c)).collect();
        literal(&bytes)
    }
}

/// Build a `TJ` array with character spacing, word spacing and kerning
/// baked in as displacements. `char_spacing` and `word_spacing` are in
/// points; kerning is taken from the font when `kerning` is set.
pub fn tj_array(
    entry: &FontEntry,
    size_pt: f32,
    text: &str,
    char_spacing: f32,
    word_spacing: f32,
    kerning: bool,
) -> String {
    let mut out = String::from("[");
    let mut run = String::new();
    let chars: Vec<char> = text.chars().collect();
    let flush = |out: &mut String, run: &mut String| {
        if !run.is_empty() {
            out.push_str(&encode_text(entry, run));
            run.clear();
        }
    };
    for (i, c) in chars.iter().enumerate() {
        run.push(*c);
        let Some(next) = chars.get(i + 1) else { break };
        let mut adjust = 0.0f32;
        if size_pt > 0.0 {
            adjust -= char_spacing * 1000.0 / size_pt;
            if *c == ' ' {
                adjust -= word_spacing * 1000.0 / size_pt;
            }
        }
        if kerning {
            adjust -= f32::from(entry.metrics.kern(*c as u32, *next as u32));
        }
        if adjust.abs() >= 0.0005 {
            flush(&mut out, &mut run);
            out.push_str(&num(adjust));
        }
    }
    flush(&mut out, &mut run);
    out.push(']');
    out
}

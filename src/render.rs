//! Cell and border renderer – turns boxes and text runs into content-stream
//! operators on one page.
//!
//! Inputs are user-space millimetres (origin top-left); the painter converts
//! to points and flips y. Colours are set inside `q … Q` pairs so a drawing
//! primitive never leaks state into the next one.

use std::f32::consts::PI;

use crate::color::{ColorValue, Paint};
use crate::content::{encode_text, num, tj_array, PaintMode};
use crate::fonts::{FontEntry, FontHandle};
use crate::layout::Align;
use crate::metrics::{self, MeasureOptions, Spacing};
use crate::pagination::{Link, LinkAnnotation, Page};
use crate::units::PT_PER_MM;

/// Shear applied to emulate a missing italic face.
const SYNTHETIC_ITALIC_SHEAR: f32 = 0.261;
/// Underline metrics used when a font declares none (1/1000 em).
const DEFAULT_UNDERLINE_POSITION: i16 = -100;
const DEFAULT_UNDERLINE_THICKNESS: i16 = 50;

// ---------------------------------------------------------------------------
// Borders and decoration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
    Double,
}

/// One edge of a border.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderEdge {
    /// Width in mm.
    pub width: f32,
    pub style: BorderStyle,
    pub color: ColorValue,
}

impl BorderEdge {
    pub fn solid(width: f32, color: ColorValue) -> Self {
        Self {
            width,
            style: BorderStyle::Solid,
            color,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Border {
    pub left: Option<BorderEdge>,
    pub top: Option<BorderEdge>,
    pub right: Option<BorderEdge>,
    pub bottom: Option<BorderEdge>,
}

impl Border {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all(edge: BorderEdge) -> Self {
        Self {
            left: Some(edge),
            top: Some(edge),
            right: Some(edge),
            bottom: Some(edge),
        }
    }

    /// Parse a border code: `"1"` for a full frame, `"0"`/`""` for none, or
    /// any combination of `L`, `T`, `R`, `B`.
    pub fn from_code(code: &str, edge: BorderEdge) -> Self {
        if code == "1" {
            return Self::all(edge);
        }
        let upper = code.to_ascii_uppercase();
        let has = |c: char| upper.contains(c).then_some(edge);
        Self {
            left: has('L'),
            top: has('T'),
            right: has('R'),
            bottom: has('B'),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.top.is_none() && self.right.is_none() && self.bottom.is_none()
    }

    /// The same edge on all four sides, solid.
    fn uniform_solid(&self) -> Option<BorderEdge> {
        let first = self.left?;
        let all = [self.top, self.right, self.bottom];
        let uniform = all.iter().all(|e| *e == Some(first));
        (first.style == BorderStyle::Solid && uniform).then_some(first)
    }

    /// Width the border occupies on the bottom edge.
    pub fn bottom_width(&self) -> f32 {
        self.bottom.map(|e| e.width).unwrap_or(0.0)
    }

    pub fn top_width(&self) -> f32 {
        self.top.map(|e| e.width).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Decoration {
    pub underline: bool,
    pub strike: bool,
    /// Outline-only text with this stroke width, mm.
    pub outline: Option<f32>,
}

// ---------------------------------------------------------------------------
// Text runs and cells
// ---------------------------------------------------------------------------

/// Everything needed to draw one run of text in one font.
#[derive(Debug, Clone)]
pub struct TextRun<'a> {
    pub entry: &'a FontEntry,
    pub font: FontHandle,
    pub text: &'a str,
    pub color: ColorValue,
    /// Total spacing including justification, mm.
    pub spacing: Spacing,
    pub decoration: Decoration,
    pub kerning: bool,
    pub small_caps: Option<f32>,
}

impl TextRun<'_> {
    fn measure_options(&self) -> MeasureOptions {
        MeasureOptions {
            kerning: self.kerning,
            small_caps: self.small_caps,
        }
    }

    /// Visible width: advances plus spacing between characters.
    pub fn width(&self) -> f32 {
        let opts = self.measure_options();
        let size = self.font.size_pt;
        let full = metrics::text_width(self.entry, size, self.text, self.spacing, &opts);
        if self.text.is_empty() {
            full
        } else {
            full - self.spacing.char_spacing
        }
    }
}

/// A cell box.
#[derive(Debug, Clone)]
pub struct CellBox<'a> {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub border: Border,
    pub align: Align,
    pub fill: Option<ColorValue>,
    pub link: Option<&'a Link>,
    /// Horizontal text padding, mm.
    pub padding: f32,
    pub baseline_constant: f32,
    /// Extra baseline shift, mm (down is positive).
    pub vertical_adjust: f32,
}

/// Paints on one page.
pub struct Painter<'a> {
    page: &'a mut Page,
}

impl<'a> Painter<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    fn x(&self, x: f32) -> f32 {
        self.page.pt_x(x)
    }

    fn y(&self, y: f32) -> f32 {
        self.page.pt_y(y)
    }

    pub fn op(&mut self, line: &str) {
        self.page.content.op(line);
    }

    /// Colour operator for `color`, registering spot colour resources.
    pub fn color_op(&mut self, color: ColorValue, paint: Paint) -> String {
        if let ColorValue::Spot { index, .. } = color {
            self.page.resources.spot_colors.insert(index);
        }
        color.encode(paint)
    }

    pub fn set_color(&mut self, color: ColorValue, paint: Paint) {
        let op = self.color_op(color, paint);
        self.op(&op);
    }

    /// Activate graphics state `/GS{index+1}`.
    pub fn graphics_state(&mut self, index: usize) {
        self.page.resources.graphics_states.insert(index);
        self.page.content.graphics_state(&format!("GS{}", index + 1));
    }

    pub fn line_width(&mut self, mm: f32) {
        self.page.content.line_width(mm * PT_PER_MM);
    }

    /// Rectangle with the current colours.
    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, mode: PaintMode) {
        let (px, py) = (self.x(x), self.y(y + h));
        self.page.content.rect(px, py, w * PT_PER_MM, h * PT_PER_MM, mode);
    }

    /// Straight line with the current stroke colour.
    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        let (a, b, c, d) = (self.x(x1), self.y(y1), self.x(x2), self.y(y2));
        self.page.content.line(a, b, c, d);
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: ColorValue) {
        self.page.content.save();
        self.set_color(color, Paint::Fill);
        self.rect(x, y, w, h, PaintMode::Fill);
        self.page.content.restore();
    }

    /// Line with an arrow head of `head` mm at the end point, in `color`.
    pub fn arrow(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        head: f32,
        width: f32,
        color: ColorValue,
    ) {
        let angle = (y2 - y1).atan2(x2 - x1);
        let spread = PI / 7.0;
        let (ax, ay) = (x2 - head * (angle - spread).cos(), y2 - head * (angle - spread).sin());
        let (bx, by) = (x2 - head * (angle + spread).cos(), y2 - head * (angle + spread).sin());
        // Stop the shaft where the head begins so the tip stays sharp.
        let (sx, sy) = (x2 - head * 0.8 * angle.cos(), y2 - head * 0.8 * angle.sin());
        self.page.content.save();
        self.set_color(color, Paint::Stroke);
        self.set_color(color, Paint::Fill);
        self.line_width(width);
        self.line(x1, y1, sx, sy);
        let path = format!(
            "{} {} m {} {} l {} {} l h f",
            num(self.x(x2)),
            num(self.y(y2)),
            num(self.x(ax)),
            num(self.y(ay)),
            num(self.x(bx)),
            num(self.y(by))
        );
        self.op(&path);
        self.page.content.restore();
    }

    // -- borders ----------------------------------------------------------

    pub fn border(&mut self, x: f32, y: f32, w: f32, h: f32, border: &Border) {
        if border.is_empty() {
            return;
        }
        if let Some(edge) = border.uniform_solid() {
            self.page.content.save();
            self.set_color(edge.color, Paint::Stroke);
            self.line_width(edge.width);
            self.rect(x, y, w, h, PaintMode::Stroke);
            self.page.content.restore();
            return;
        }
        let double_w = |e: Option<BorderEdge>| match e {
            Some(e) if e.style == BorderStyle::Double => e.width / 3.0,
            _ => 0.0,
        };
        let half = |e: Option<BorderEdge>| e.map(|e| e.width / 2.0).unwrap_or(0.0);
        let (l, t, r, b) = (border.left, border.top, border.right, border.bottom);
        let horizontal_insets = (double_w(l), double_w(r));
        let vertical_insets = (double_w(t), double_w(b));
        if let Some(e) = t {
            self.edge(e, (x - half(l), y), (x + w + half(r), y), horizontal_insets, 1.0, true);
        }
        if let Some(e) = b {
            let (from, to) = ((x - half(l), y + h), (x + w + half(r), y + h));
            self.edge(e, from, to, horizontal_insets, -1.0, true);
        }
        if let Some(e) = l {
            self.edge(e, (x, y - half(t)), (x, y + h + half(b)), vertical_insets, 1.0, false);
        }
        if let Some(e) = r {
            let (from, to) = ((x + w, y - half(t)), (x + w, y + h + half(b)));
            self.edge(e, from, to, vertical_insets, -1.0, false);
        }
    }

    /// One border edge from `a` to `b`. `inward` is the sign pointing into
    /// the box; `adjacent` holds the double-line inset of the neighbouring
    /// edges at each end.
    fn edge(
        &mut self,
        edge: BorderEdge,
        a: (f32, f32),
        b: (f32, f32),
        adjacent: (f32, f32),
        inward: f32,
        horizontal: bool,
    ) {
        self.page.content.save();
        self.set_color(edge.color, Paint::Stroke);
        match edge.style {
            BorderStyle::Solid => {
                self.line_width(edge.width);
                self.line(a.0, a.1, b.0, b.1);
            }
            BorderStyle::Dashed => {
                self.line_width(edge.width);
                let unit = edge.width * 3.0 * PT_PER_MM;
                self.page.content.dash(unit, unit);
                self.line(a.0, a.1, b.0, b.1);
            }
            BorderStyle::Dotted => {
                self.line_width(edge.width);
                self.op("1 J");
                self.page.content.dash(0.001, edge.width * 2.0 * PT_PER_MM);
                self.line(a.0, a.1, b.0, b.1);
            }
            BorderStyle::Double => {
                let third = edge.width / 3.0;
                self.line_width(third);
                // Outer stroke reaches the outer corners, the inner one stops
                // at the neighbours' inner strokes.
                let (o, i) = (-inward * third, inward * third);
                if horizontal {
                    self.line(a.0 - adjacent.0, a.1 + o, b.0 + adjacent.1, b.1 + o);
                    self.line(a.0 + adjacent.0, a.1 + i, b.0 - adjacent.1, b.1 + i);
                } else {
                    self.line(a.0 + o, a.1 - adjacent.0, b.0 + o, b.1 + adjacent.1);
                    self.line(a.0 + i, a.1 + adjacent.0, b.0 + i, b.1 - adjacent.1);
                }
            }
        }
        self.page.content.restore();
    }

    // -- text -------------------------------------------------------------

    /// Draw `run` with its baseline at (`x`, `baseline`).
    pub fn text(&mut self, x: f32, baseline: f32, run: &TextRun) {
        if run.text.is_empty() {
            return;
        }
        self.page.resources.fonts.insert(run.font.id);
        let size = run.font.size_pt;
        let k = PT_PER_MM;

        self.page.content.save();
        let fill = self.color_op(run.color, Paint::Fill);
        self.op(&fill);
        if run.font.synthetic_bold || run.decoration.outline.is_some() {
            let stroke = self.color_op(run.color, Paint::Stroke);
            self.op(&stroke);
            match run.decoration.outline {
                Some(w) => {
                    self.line_width(w);
                    self.op("1 Tr");
                }
                None => {
                    self.page.content.line_width(size / 30.0);
                    self.op("2 Tr");
                }
            }
        }

        let segments: Vec<(String, f32)> = match run.small_caps {
            Some(scale) => small_caps_segments(run.text, size, scale),
            None => vec![(run.text.to_string(), size)],
        };
        let mut cursor = x;
        for (segment, seg_size) in &segments {
            let px = self.x(cursor);
            let py = self.y(baseline);
            let mut ops = String::from("BT\n");
            ops.push_str(&format!("/{} {} Tf\n", run.entry.resource_name(), num(*seg_size)));
            if run.font.synthetic_italic {
                let shear = num(SYNTHETIC_ITALIC_SHEAR);
                ops.push_str(&format!("1 0 {shear} 1 {} {} Tm\n", num(px), num(py)));
            } else {
                ops.push_str(&format!("{} {} Td\n", num(px), num(py)));
            }
            let cs = run.spacing.char_spacing * k;
            let ws = run.spacing.word_spacing * k;
            let kerned =
                run.kerning && run.small_caps.is_none() && !run.entry.metrics.kerning.is_empty();
            if run.entry.is_multibyte() {
                if cs != 0.0 || ws != 0.0 || kerned {
                    let array = tj_array(run.entry, *seg_size, segment, cs, ws, kerned);
                    ops.push_str(&format!("{array} TJ\n"));
                } else {
                    ops.push_str(&format!("{} Tj\n", encode_text(run.entry, segment)));
                }
            } else {
                if cs != 0.0 {
                    ops.push_str(&format!("{} Tc\n", num(cs)));
                }
                if ws != 0.0 {
                    ops.push_str(&format!("{} Tw\n", num(ws)));
                }
                if kerned {
                    let array = tj_array(run.entry, *seg_size, segment, 0.0, 0.0, true);
                    ops.push_str(&format!("{array} TJ\n"));
                } else {
                    ops.push_str(&format!("{} Tj\n", encode_text(run.entry, segment)));
                }
            }
            ops.push_str("ET");
            self.op(&ops);
            let seg_opts = MeasureOptions {
                kerning: run.kerning,
                small_caps: None,
            };
            cursor += metrics::text_width(run.entry, *seg_size, segment, run.spacing, &seg_opts);
        }
        self.page.content.restore();

        if run.decoration.underline || run.decoration.strike {
            self.decorate(x, baseline, run);
        }
    }

    fn decorate(&mut self, x: f32, baseline: f32, run: &TextRun) {
        let m = &run.entry.metrics;
        let scale = run.font.size_pt / 1000.0 / PT_PER_MM;
        let thickness =
            f32::from(m.underline_thickness.unwrap_or(DEFAULT_UNDERLINE_THICKNESS)) * scale;
        let width = run.width();
        self.page.content.save();
        self.set_color(run.color, Paint::Stroke);
        self.line_width(thickness);
        if run.decoration.underline {
            let position = m.underline_position.unwrap_or(DEFAULT_UNDERLINE_POSITION);
            let y = baseline - f32::from(position) * scale;
            self.line(x, y, x + width, y);
        }
        if run.decoration.strike {
            let rise = if m.x_height > 0 {
                f32::from(m.x_height) / 2.0 * scale
            } else {
                250.0 * scale
            };
            self.line(x, baseline - rise, x + width, baseline - rise);
        }
        self.page.content.restore();
    }

    /// Background band behind a span: the font's ascent-to-descent box,
    /// padded by `pad` mm.
    pub fn span_background(
        &mut self,
        x: f32,
        baseline: f32,
        w: f32,
        run: &TextRun,
        pad: f32,
        color: ColorValue,
    ) {
        let (top, height) = span_band(baseline, run, pad);
        self.fill_rect(x - pad, top, w + 2.0 * pad, height, color);
    }

    pub fn span_border(
        &mut self,
        x: f32,
        baseline: f32,
        w: f32,
        run: &TextRun,
        pad: f32,
        edge: BorderEdge,
    ) {
        let (top, height) = span_band(baseline, run, pad);
        self.border(x - pad, top, w + 2.0 * pad, height, &Border::all(edge));
    }

    /// Text set along the top of a circle centred at (`cx`, `cy`).
    pub fn circular_text(&mut self, cx: f32, cy: f32, radius: f32, run: &TextRun) {
        if run.text.is_empty() || radius <= 0.0 {
            return;
        }
        self.page.resources.fonts.insert(run.font.id);
        let opts = run.measure_options();
        let total = metrics::text_width(run.entry, run.font.size_pt, run.text, run.spacing, &opts);
        let sweep = total / radius;
        let mut angle = PI / 2.0 + sweep / 2.0;
        let fill = self.color_op(run.color, Paint::Fill);
        let (name, size) = (run.entry.resource_name(), num(run.font.size_pt));
        let mut ops = format!("q\n{fill}\nBT\n/{name} {size} Tf\n");
        for c in run.text.chars() {
            let glyph = c.to_string();
            let cw = metrics::text_width(run.entry, run.font.size_pt, &glyph, run.spacing, &opts);
            let mid = angle - cw / radius / 2.0;
            // Point on the circle in user space (y grows downwards).
            let (px, py) = (cx + radius * mid.cos(), cy - radius * mid.sin());
            let rot = mid - PI / 2.0;
            let (cos, sin) = (rot.cos(), rot.sin());
            let sx = px - cw / 2.0 * cos;
            let sy = py + cw / 2.0 * sin;
            ops.push_str(&format!(
                "{} {} {} {} {} {} Tm {} Tj\n",
                num(cos),
                num(sin),
                num(-sin),
                num(cos),
                num(self.x(sx)),
                num(self.y(sy)),
                encode_text(run.entry, &c.to_string())
            ));
            angle -= cw / radius;
        }
        ops.push_str("ET\nQ");
        self.op(&ops);
    }

    // -- images and links ---------------------------------------------------

    pub fn image(&mut self, index: usize, x: f32, y: f32, w: f32, h: f32) {
        self.page.resources.images.insert(index);
        let line = format!(
            "q {} 0 0 {} {} {} cm /I{} Do Q",
            num(w * PT_PER_MM),
            num(h * PT_PER_MM),
            num(self.x(x)),
            num(self.y(y + h)),
            index + 1
        );
        self.op(&line);
    }

    pub fn link(&mut self, x: f32, y: f32, w: f32, h: f32, target: &Link) {
        let rect = [self.x(x), self.y(y + h), self.x(x + w), self.y(y)];
        self.page.links.push(LinkAnnotation {
            rect,
            target: target.clone(),
        });
    }

    pub fn horizontal_rule(&mut self, x: f32, y: f32, w: f32, thickness: f32, color: ColorValue) {
        self.page.content.save();
        self.set_color(color, Paint::Stroke);
        self.line_width(thickness);
        self.line(x, y, x + w, y);
        self.page.content.restore();
    }

    pub fn dot_leader(&mut self, x: f32, y: f32, w: f32, color: ColorValue) {
        if w <= 0.0 {
            return;
        }
        self.page.content.save();
        self.set_color(color, Paint::Stroke);
        self.line_width(0.3);
        self.op("1 J");
        self.page.content.dash(0.001, 1.0 * PT_PER_MM);
        self.line(x, y, x + w, y);
        self.page.content.restore();
    }
}

fn span_band(baseline: f32, run: &TextRun, pad: f32) -> (f32, f32) {
    let m = &run.entry.metrics;
    let scale = run.font.size_pt / 1000.0 / PT_PER_MM;
    let ascent = f32::from(m.ascent) * scale;
    let descent = f32::from(m.descent).abs() * scale;
    (baseline - ascent - pad, ascent + descent + 2.0 * pad)
}

/// Split text into runs of lower-case letters (drawn as scaled capitals) and
/// everything else.
fn small_caps_segments(text: &str, size: f32, scale: f32) -> Vec<(String, f32)> {
    let mut out: Vec<(String, f32)> = Vec::new();
    for c in text.chars() {
        let (glyph, s) = if c.is_lowercase() {
            (c.to_uppercase().next().unwrap_or(c), size * scale)
        } else {
            (c, size)
        };
        match out.last_mut() {
            Some((seg, seg_size)) if *seg_size == s => seg.push(glyph),
            _ => out.push((glyph.to_string(), s)),
        }
    }
    out
}

/// Text x position inside a cell for `align`.
pub fn aligned_x(x: f32, w: f32, text_width: f32, align: Align, padding: f32) -> f32 {
    match align {
        Align::Right => x + w - padding - text_width,
        Align::Center => x + (w - text_width) / 2.0,
        Align::Left | Align::Justify => x + padding,
    }
}

/// Baseline of text in a cell: the cell's vertical centre plus a fraction
/// of the font size.
pub fn cell_baseline(
    y: f32,
    h: f32,
    size_pt: f32,
    baseline_constant: f32,
    vertical_adjust: f32,
) -> f32 {
    y + h / 2.0 + baseline_constant * size_pt / PT_PER_MM + vertical_adjust
}

/// Paint a cell: fill, border, text, then its link. Returns the x at which
/// the text starts.
pub fn draw_cell(painter: &mut Painter, cell: &CellBox, run: Option<&TextRun>) -> f32 {
    if let Some(fill) = cell.fill {
        painter.fill_rect(cell.x, cell.y, cell.w, cell.h, fill);
    }
    painter.border(cell.x, cell.y, cell.w, cell.h, &cell.border);
    let Some(run) = run else {
        if let Some(link) = cell.link {
            painter.link(cell.x, cell.y, cell.w, cell.h, link);
        }
        return cell.x + cell.padding;
    };
    let width = run.width();
    let tx = aligned_x(cell.x, cell.w, width, cell.align, cell.padding);
    let baseline = cell_baseline(
        cell.y,
        cell.h,
        run.font.size_pt,
        cell.baseline_constant,
        cell.vertical_adjust,
    );
    painter.text(tx, baseline, run);
    if let Some(link) = cell.link {
        let size_mm = run.font.size_pt / PT_PER_MM;
        painter.link(tx, cell.y + cell.h / 2.0 - size_mm / 2.0, width, size_mm, link);
    }
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{FontManager, FontOptions, FontStyle};
    use crate::layout_config::LayoutConfig;
    use crate::pagination::PageController;

    fn page() -> Page {
        let mut pc = PageController::new(&LayoutConfig::default());
        pc.open_page(None);
        pc.page().unwrap().clone()
    }

    fn helvetica() -> (FontManager, FontHandle) {
        let mut fonts = FontManager::new(FontOptions::default());
        let r = fonts.load_font("helvetica", FontStyle::empty()).unwrap();
        let handle = FontHandle {
            id: r.id,
            size_pt: 12.0,
            synthetic_bold: false,
            synthetic_italic: false,
        };
        (fonts, handle)
    }

    fn stream(page: &Page) -> String {
        String::from_utf8(page.content.as_bytes().to_vec()).unwrap()
    }

    fn run<'a>(entry: &'a FontEntry, font: FontHandle, text: &'a str) -> TextRun<'a> {
        TextRun {
            entry,
            font,
            text,
            color: ColorValue::BLACK,
            spacing: Spacing::default(),
            decoration: Decoration::default(),
            kerning: true,
            small_caps: None,
        }
    }

    #[test]
    fn centred_cell_offsets_by_half_the_free_width() {
        let (fonts, font) = helvetica();
        let entry = fonts.entry(font.id);
        let mut p = page();
        let r = run(entry, font, "Hello");
        let cell = CellBox {
            x: 10.0,
            y: 10.0,
            w: 100.0,
            h: 10.0,
            border: Border::none(),
            align: Align::Center,
            fill: None,
            link: None,
            padding: 0.0,
            baseline_constant: 0.35,
            vertical_adjust: 0.0,
        };
        let tx = draw_cell(&mut Painter::new(&mut p), &cell, Some(&r));
        let opts = MeasureOptions::default();
        let width = metrics::text_width(entry, 12.0, "Hello", Spacing::default(), &opts);
        assert!((tx - (10.0 + (100.0 - width) / 2.0)).abs() < 1e-4);
        assert!(stream(&p).contains("(Hello) Tj"));
    }

    #[test]
    fn uniform_border_is_one_rectangle() {
        let mut p = page();
        let edge = BorderEdge::solid(0.2, ColorValue::BLACK);
        Painter::new(&mut p).border(0.0, 0.0, 10.0, 10.0, &Border::from_code("1", edge));
        let s = stream(&p);
        assert!(s.contains(" re S"));
        assert_eq!(s.matches(" l S").count(), 0);
    }

    #[test]
    fn double_border_draws_two_strokes_per_edge() {
        let mut p = page();
        let edge = BorderEdge {
            width: 0.9,
            style: BorderStyle::Double,
            color: ColorValue::BLACK,
        };
        Painter::new(&mut p).border(0.0, 0.0, 10.0, 10.0, &Border::from_code("T", edge));
        let s = stream(&p);
        assert_eq!(s.matches(" l S").count(), 2);
        assert!(s.contains("0.850 w"));
    }

    #[test]
    fn synthetic_styles_use_shear_and_stroke() {
        let (fonts, mut font) = helvetica();
        font.synthetic_bold = true;
        font.synthetic_italic = true;
        let mut p = page();
        Painter::new(&mut p).text(10.0, 20.0, &run(fonts.entry(font.id), font, "x"));
        let s = stream(&p);
        assert!(s.contains("2 Tr"));
        assert!(s.contains("1 0 0.261 1 "));
        assert!(s.contains(" Tm"));
    }

    #[test]
    fn underline_uses_font_metrics() {
        let (fonts, font) = helvetica();
        let mut p = page();
        let mut r = run(fonts.entry(font.id), font, "under");
        r.decoration.underline = true;
        Painter::new(&mut p).text(10.0, 20.0, &r);
        let s = stream(&p);
        // 50/1000 em at 12 pt
        assert!(s.contains("0.600 w"));
        assert!(s.ends_with("l S\nQ\n"));
    }

    #[test]
    fn spot_colour_registers_resource() {
        let mut p = page();
        Painter::new(&mut p).fill_rect(0.0, 0.0, 1.0, 1.0, ColorValue::spot(0, 50));
        assert!(p.resources.spot_colors.contains(&0));
        assert!(stream(&p).contains("/CS1 cs 0.500 scn"));
    }

    #[test]
    fn link_rect_is_in_points() {
        let mut p = page();
        Painter::new(&mut p).link(0.0, 0.0, 25.4, 25.4, &Link::Uri("https://example.com".into()));
        let rect = p.links[0].rect;
        assert!((rect[2] - 72.0).abs() < 1e-3);
        assert!((rect[3] - 297.0 * PT_PER_MM).abs() < 1e-2);
    }
}

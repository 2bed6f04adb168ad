//! Flowing-block layout engine.
//!
//! A block accumulates styled fragments character by character. When the
//! running width passes the block width the pending line is broken at its
//! last space and handed back as a [`FinishedLine`]; drawing is left to the
//! caller. The step function is pure: it takes the block state by value and
//! returns the new state together with any lines that were completed.

use serde::{Deserialize, Serialize};

use crate::color::ColorValue;
use crate::error::Warning;
use crate::fonts::{FontHandle, FontManager};
use crate::justify::{self, JustifyParams, SpacingSplit};
use crate::metrics::{self, MeasureOptions, Spacing};
use crate::object_buffer::{InlineObject, LineMetrics, ObjectBuffer, ObjectBufferEntry, ObjectKind};
use crate::pagination::Link;
use crate::render::{BorderEdge, Decoration};
use crate::units::PT_PER_MM;

/// Slack allowed when comparing accumulated widths against the line width.
const FIT_TOLERANCE: f32 = 1e-3;

/// Characters that may hang past the right edge instead of forcing a break.
const ORPHAN_CHARS: &[char] = &[
    '.', ',', ':', ';', '!', '?', ')', ']', '}', '"', '\'', '\u{2019}', '\u{201D}', '\u{00BB}',
    '\u{2026}', '%',
];

// ---------------------------------------------------------------------------
// Block parameters and styles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Align {
    #[default]
    Left,
    Right,
    Center,
    Justify,
}

impl Align {
    /// Parse the single-letter codes `L`, `R`, `C`, `J`.
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "R" => Align::Right,
            "C" => Align::Center,
            "J" => Align::Justify,
            _ => Align::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LineHeight {
    /// Multiple of the font size.
    Factor(f32),
    /// Fixed height in millimetres.
    Fixed(f32),
}

impl LineHeight {
    pub fn for_size(&self, size_pt: f32) -> f32 {
        match *self {
            LineHeight::Factor(f) => size_pt / PT_PER_MM * f,
            LineHeight::Fixed(h) => h,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerticalAlign {
    #[default]
    Baseline,
    Super,
    Sub,
    Middle,
    Top,
    Bottom,
    TextTop,
    TextBottom,
}

/// Resolved presentation of a text fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: FontHandle,
    pub color: ColorValue,
    pub background: Option<ColorValue>,
    pub border: Option<BorderEdge>,
    pub decoration: Decoration,
    /// Letter and word spacing, mm.
    pub spacing: Spacing,
    pub small_caps: bool,
    pub vertical: VerticalAlign,
    pub link: Option<Link>,
}

impl TextStyle {
    pub fn new(font: FontHandle, color: ColorValue) -> Self {
        Self {
            font,
            color,
            background: None,
            border: None,
            decoration: Decoration::default(),
            spacing: Spacing::default(),
            small_caps: false,
            vertical: VerticalAlign::Baseline,
            link: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text { text: String, style: TextStyle },
    Object(InlineObject),
}

/// Engine tunables used while breaking lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutParams {
    pub orphans_allowed: usize,
    pub justify: JustifyParams,
    pub justify_before_break: bool,
    pub force_wrap: bool,
    pub kerning: bool,
    pub small_caps_scale: f32,
    pub baseline_constant: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            orphans_allowed: 5,
            justify: JustifyParams::default(),
            justify_before_break: false,
            force_wrap: false,
            kerning: true,
            small_caps_scale: 0.75,
            baseline_constant: 0.35,
        }
    }
}

/// Read-only inputs of a layout step.
pub struct LayoutContext<'a> {
    pub fonts: &'a FontManager,
    pub params: &'a LayoutParams,
}

impl LayoutContext<'_> {
    fn measure_options(&self, style: &TextStyle) -> MeasureOptions {
        MeasureOptions {
            kerning: self.params.kerning,
            small_caps: style.small_caps.then_some(self.params.small_caps_scale),
        }
    }

    /// Width of `text` in `style`, mm.
    pub fn measure(&self, text: &str, style: &TextStyle) -> f32 {
        let entry = self.fonts.entry(style.font.id);
        let opts = self.measure_options(style);
        metrics::text_width(entry, style.font.size_pt, text, style.spacing, &opts)
    }

    /// Width `c` adds when appended after `prev` in `style`, mm.
    fn measure_next(&self, prev: Option<char>, c: char, style: &TextStyle) -> f32 {
        let entry = self.fonts.entry(style.font.id);
        let opts = self.measure_options(style);
        metrics::appended_width(entry, style.font.size_pt, prev, c, style.spacing, &opts)
    }
}

// ---------------------------------------------------------------------------
// Line content
// ---------------------------------------------------------------------------

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq)]
pub struct LineChunk {
    pub text: String,
    pub style: TextStyle,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
enum LineItem {
    Text(LineChunk),
    Object(InlineObject),
}

impl LineItem {
    fn width(&self) -> f32 {
        match self {
            LineItem::Text(c) => c.width,
            LineItem::Object(o) => o.width,
        }
    }
}

/// A text chunk with its offset inside the finished line.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedChunk {
    pub chunk: LineChunk,
    /// Offset from the line start before justification, mm.
    pub x: f32,
    pub chars_before: usize,
    pub spaces_before: usize,
    /// Baseline correction for mixed sizes and super/subscript, mm (down
    /// is positive).
    pub vertical_adjust: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEnd {
    /// Wrapped at the block width.
    Soft,
    /// Explicit newline in the text.
    Hard,
    /// Last line of the block.
    Last,
}

/// A completed line, ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedLine {
    /// Chunks in visual order.
    pub chunks: Vec<PositionedChunk>,
    pub objects: ObjectBuffer,
    /// Natural width of the content, mm.
    pub width: f32,
    pub max_width: f32,
    pub align: Align,
    pub direction: Direction,
    pub metrics: LineMetrics,
    /// Offset of the text band from the line top and its height.
    pub text_top: f32,
    pub text_height: f32,
    /// Extra spacing from justification (negative when compressing an
    /// orphan overflow).
    pub spacing: SpacingSplit,
    pub n_chars: usize,
    pub n_spaces: usize,
}

impl FinishedLine {
    pub fn text(&self) -> String {
        self.chunks.iter().map(|c| c.chunk.text.as_str()).collect()
    }

    pub fn height(&self) -> f32 {
        self.metrics.height
    }

    /// Width after justification spacing; the spacing after the last
    /// character does not count.
    pub fn rendered_width(&self) -> f32 {
        let gaps = self.n_chars.saturating_sub(1) as f32;
        self.width
            + self.spacing.char_spacing * gaps
            + self.spacing.word_spacing * self.n_spaces as f32
    }

    /// Horizontal offset of the content inside the block for its alignment.
    pub fn align_offset(&self) -> f32 {
        let free = self.max_width - self.rendered_width();
        let align = match (self.align, self.direction) {
            (Align::Justify, Direction::Rtl) => Align::Right,
            (a, _) => a,
        };
        match align {
            Align::Left | Align::Justify => 0.0,
            Align::Right => free,
            Align::Center => free / 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Block state
// ---------------------------------------------------------------------------

/// State of the open flowing block.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowState {
    pub max_width: f32,
    pub line_height: LineHeight,
    pub align: Align,
    pub direction: Direction,
    items: Vec<LineItem>,
    width: f32,
    /// Orphan characters currently hanging past the edge.
    orphan_run: usize,
    /// The pending line holds a word wider than the block.
    overflowing_word: bool,
    /// Previous line was wrapped; leading spaces are dropped.
    after_wrap: bool,
    /// Font size used for empty lines, pt.
    base_size: f32,
    pub warnings: Vec<Warning>,
}

impl FlowState {
    pub fn new(
        max_width: f32,
        line_height: LineHeight,
        align: Align,
        direction: Direction,
        base_size: f32,
    ) -> Self {
        Self {
            max_width,
            line_height,
            align,
            direction,
            items: Vec::new(),
            width: 0.0,
            orphan_run: 0,
            overflowing_word: false,
            after_wrap: false,
            base_size,
            warnings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Width of the pending line, mm.
    pub fn pending_width(&self) -> f32 {
        self.width
    }

    fn recompute_width(&mut self) {
        self.width = self.items.iter().map(LineItem::width).sum();
    }

    fn char_count(&self) -> usize {
        self.items
            .iter()
            .map(|i| match i {
                LineItem::Text(c) => c.text.chars().count(),
                LineItem::Object(_) => 1,
            })
            .sum()
    }

    fn append(&mut self, c: char, style: &TextStyle, ctx: &LayoutContext) {
        let added = match self.items.last_mut() {
            Some(LineItem::Text(chunk)) if chunk.style == *style => {
                let added = ctx.measure_next(chunk.text.chars().next_back(), c, style);
                chunk.text.push(c);
                chunk.width += added;
                added
            }
            _ => {
                let width = ctx.measure_next(None, c, style);
                self.items.push(LineItem::Text(LineChunk {
                    text: c.to_string(),
                    style: style.clone(),
                    width,
                }));
                width
            }
        };
        self.base_size = style.font.size_pt;
        self.width += added;
    }

    fn pop_char(&mut self, ctx: &LayoutContext) -> Option<char> {
        let LineItem::Text(chunk) = self.items.last_mut()? else {
            return None;
        };
        let c = chunk.text.pop()?;
        if chunk.text.is_empty() {
            self.items.pop();
        } else {
            chunk.width = ctx.measure(&chunk.text, &chunk.style);
        }
        self.recompute_width();
        Some(c)
    }

    /// Position of the last space: (item index, byte offset).
    fn last_space(&self) -> Option<(usize, usize)> {
        self.items.iter().enumerate().rev().find_map(|(i, item)| match item {
            LineItem::Text(c) => c.text.rfind(' ').map(|b| (i, b)),
            LineItem::Object(_) => None,
        })
    }

    /// Split the pending line at the space at `at`, dropping the space, and
    /// return the tail items.
    fn split_at_space(&mut self, at: (usize, usize), ctx: &LayoutContext) -> Vec<LineItem> {
        let (idx, byte) = at;
        let mut tail: Vec<LineItem> = self.items.split_off(idx + 1);
        if let Some(LineItem::Text(chunk)) = self.items.get_mut(idx) {
            let rest = chunk.text[byte + 1..].to_string();
            chunk.text.truncate(byte);
            chunk.width = ctx.measure(&chunk.text, &chunk.style);
            if !rest.is_empty() {
                let width = ctx.measure(&rest, &chunk.style);
                tail.insert(
                    0,
                    LineItem::Text(LineChunk {
                        text: rest,
                        style: chunk.style.clone(),
                        width,
                    }),
                );
            }
        }
        self.recompute_width();
        tail
    }

    fn trim_trailing_spaces(&mut self, ctx: &LayoutContext) {
        while let Some(LineItem::Text(chunk)) = self.items.last_mut() {
            let trimmed = chunk.text.trim_end_matches(' ').len();
            if trimmed == chunk.text.len() {
                break;
            }
            chunk.text.truncate(trimmed);
            if chunk.text.is_empty() {
                self.items.pop();
            } else {
                chunk.width = ctx.measure(&chunk.text, &chunk.style);
                break;
            }
        }
        self.recompute_width();
    }

    fn push_char(
        &mut self,
        c: char,
        style: &TextStyle,
        ctx: &LayoutContext,
        lines: &mut Vec<FinishedLine>,
    ) {
        match c {
            '\r' => return,
            '\n' => {
                lines.push(self.take_line(ctx, LineEnd::Hard));
                return;
            }
            ' ' if self.after_wrap && self.items.is_empty() => return,
            _ => {}
        }
        self.after_wrap = false;

        let width_before = self.width;
        self.append(c, style, ctx);
        if c == ' ' {
            if self.width > self.max_width + FIT_TOLERANCE {
                self.wrap(ctx, lines);
            }
            return;
        }
        if self.width <= self.max_width + FIT_TOLERANCE {
            return;
        }

        let orphanable = ORPHAN_CHARS.contains(&c)
            || matches!(style.vertical, VerticalAlign::Super | VerticalAlign::Sub);
        if orphanable
            && self.orphan_run < ctx.params.orphans_allowed
            && (self.orphan_run > 0 || width_before <= self.max_width + FIT_TOLERANCE)
        {
            self.orphan_run += 1;
            return;
        }
        self.orphan_run = 0;

        if let Some(at) = self.last_space() {
            let tail = self.split_at_space(at, ctx);
            lines.push(self.take_line(ctx, LineEnd::Soft));
            self.items = tail;
            self.recompute_width();
            return;
        }

        if ctx.params.force_wrap && self.char_count() > 1 {
            if let Some(last) = self.pop_char(ctx) {
                lines.push(self.take_line(ctx, LineEnd::Soft));
                self.append(last, style, ctx);
            }
            return;
        }
        self.overflowing_word = true;
    }

    /// Break the pending line at its trailing space.
    fn wrap(&mut self, ctx: &LayoutContext, lines: &mut Vec<FinishedLine>) {
        lines.push(self.take_line(ctx, LineEnd::Soft));
        self.after_wrap = true;
    }

    fn push_object(
        &mut self,
        object: &InlineObject,
        ctx: &LayoutContext,
        lines: &mut Vec<FinishedLine>,
    ) {
        self.after_wrap = false;
        let fits = self.width + object.width <= self.max_width + FIT_TOLERANCE;
        if !fits && !self.items.is_empty() {
            // The object cannot join this line: move the trailing word (if
            // any) with it when there is a space to break at.
            let tail = match self.last_space() {
                Some(at) if !self.ends_with_space() => self.split_at_space(at, ctx),
                _ => Vec::new(),
            };
            lines.push(self.take_line(ctx, LineEnd::Soft));
            self.items = tail;
            self.recompute_width();
        }
        self.items.push(LineItem::Object(object.clone()));
        self.recompute_width();
    }

    fn ends_with_space(&self) -> bool {
        matches!(self.items.last(), Some(LineItem::Text(c)) if c.text.ends_with(' '))
    }

    /// Close the pending line and reset the per-line state.
    fn take_line(&mut self, ctx: &LayoutContext, end: LineEnd) -> FinishedLine {
        self.trim_trailing_spaces(ctx);
        let orphaned = self.orphan_run > 0 && self.width > self.max_width + FIT_TOLERANCE;
        if self.overflowing_word {
            let word: String = self
                .items
                .iter()
                .filter_map(|i| match i {
                    LineItem::Text(c) => Some(c.text.as_str()),
                    LineItem::Object(_) => None,
                })
                .collect();
            let warning = Warning::WordTooWideForCell {
                word: word.split(' ').next_back().unwrap_or_default().to_string(),
                available: self.max_width,
            };
            log::warn!("{warning}");
            self.warnings.push(warning);
        }
        let items = std::mem::take(&mut self.items);
        let line = finish_line(items, self, ctx, end, orphaned);
        self.width = 0.0;
        self.orphan_run = 0;
        self.overflowing_word = false;
        line
    }
}

// ---------------------------------------------------------------------------
// Line finalisation
// ---------------------------------------------------------------------------

fn finish_line(
    mut items: Vec<LineItem>,
    state: &FlowState,
    ctx: &LayoutContext,
    end: LineEnd,
    orphaned: bool,
) -> FinishedLine {
    let mut width: f32 = items.iter().map(LineItem::width).sum();

    // Dot leaders take whatever the line leaves free.
    let leaders = items
        .iter()
        .filter(|i| matches!(i, LineItem::Object(o) if matches!(o.kind, ObjectKind::DotTab { .. })))
        .count();
    if leaders > 0 && width < state.max_width {
        let share = (state.max_width - width) / leaders as f32;
        for item in &mut items {
            if let LineItem::Object(o) = item {
                if matches!(o.kind, ObjectKind::DotTab { .. }) {
                    o.width = share;
                }
            }
        }
        width = state.max_width;
    }

    if state.direction == Direction::Rtl {
        items.reverse();
    }

    // Vertical metrics of the text band.
    let k = PT_PER_MM;
    let mut text_height: f32 = 0.0;
    let mut main_size: f32 = 0.0;
    let mut ascent: f32 = 0.0;
    let mut descent: f32 = 0.0;
    let mut x_height: f32 = 0.0;
    for item in &items {
        if let LineItem::Text(c) = item {
            let size = c.style.font.size_pt;
            let m = &ctx.fonts.entry(c.style.font.id).metrics;
            text_height = text_height.max(state.line_height.for_size(size));
            if !matches!(c.style.vertical, VerticalAlign::Super | VerticalAlign::Sub) {
                main_size = main_size.max(size);
            }
            ascent = ascent.max(size * f32::from(m.ascent) / 1000.0 / k);
            descent = descent.max(size * f32::from(m.descent).abs() / 1000.0 / k);
            x_height = x_height.max(size * f32::from(m.x_height) / 1000.0 / k);
        }
    }
    if main_size == 0.0 {
        main_size = items
            .iter()
            .filter_map(|i| match i {
                LineItem::Text(c) => Some(c.style.font.size_pt),
                LineItem::Object(_) => None,
            })
            .fold(state.base_size, f32::max);
    }
    if text_height == 0.0 {
        text_height = state.line_height.for_size(main_size);
    }
    let text_baseline = text_height / 2.0 + ctx.params.baseline_constant * main_size / k;

    let mut above = text_baseline;
    let mut below = text_height - text_baseline;
    for item in &items {
        if let LineItem::Object(o) = item {
            let (a, b) = ObjectBuffer::extent(o, ascent, descent, x_height);
            above = above.max(a);
            below = below.max(b);
        }
    }
    let mut height = above + below;
    for item in &items {
        if let LineItem::Object(o) = item {
            if o.height > height {
                match o.valign {
                    VerticalAlign::Top => below += o.height - height,
                    VerticalAlign::Bottom => above += o.height - height,
                    _ => {}
                }
                height = above + below;
            }
        }
    }

    // Horizontal positions and counts.
    let mut chunks = Vec::new();
    let mut objects = ObjectBuffer::default();
    let mut x = 0.0;
    let mut n_chars = 0;
    let mut n_spaces = 0;
    for item in items {
        match item {
            LineItem::Text(chunk) => {
                let chars = chunk.text.chars().count();
                let spaces = chunk.text.chars().filter(|c| *c == ' ').count();
                let size = chunk.style.font.size_pt;
                let shift = match chunk.style.vertical {
                    VerticalAlign::Super => -0.35 * main_size / k,
                    VerticalAlign::Sub => 0.15 * main_size / k,
                    _ => 0.0,
                };
                let vertical_adjust = ctx.params.baseline_constant * (main_size - size) / k + shift;
                let w = chunk.width;
                chunks.push(PositionedChunk {
                    chunk,
                    x,
                    chars_before: n_chars,
                    spaces_before: n_spaces,
                    vertical_adjust,
                });
                x += w;
                n_chars += chars;
                n_spaces += spaces;
            }
            LineItem::Object(object) => {
                let w = object.width;
                objects.push(ObjectBufferEntry {
                    object,
                    x,
                    chars_before: n_chars,
                    spaces_before: n_spaces,
                });
                x += w;
            }
        }
    }

    let has_leaders = leaders > 0;
    let justified = state.align == Align::Justify
        && !has_leaders
        && (end == LineEnd::Soft || (end == LineEnd::Hard && ctx.params.justify_before_break));
    let spacing = if orphaned {
        let overflow = width - state.max_width;
        let mut params = ctx.params.justify;
        params.max_char_spacing = 0.0;
        justify::split(n_chars, n_spaces, overflow, &params).negated()
    } else if justified {
        justify::split(n_chars, n_spaces, state.max_width - width, &ctx.params.justify)
    } else {
        SpacingSplit::default()
    };

    FinishedLine {
        chunks,
        objects,
        width,
        max_width: state.max_width,
        align: state.align,
        direction: state.direction,
        metrics: LineMetrics {
            height,
            baseline: above,
            ascent,
            descent,
            x_height,
        },
        text_top: above - text_baseline,
        text_height,
        spacing,
        n_chars,
        n_spaces,
    }
}

// ---------------------------------------------------------------------------
// Step functions
// ---------------------------------------------------------------------------

/// Feed one fragment into the block.
pub fn layout_step(
    mut state: FlowState,
    fragment: &Fragment,
    ctx: &LayoutContext,
) -> (Vec<FinishedLine>, FlowState) {
    let mut lines = Vec::new();
    match fragment {
        Fragment::Text { text, style } => {
            for c in text.chars() {
                state.push_char(c, style, ctx, &mut lines);
            }
        }
        Fragment::Object(object) => state.push_object(object, ctx, &mut lines),
    }
    (lines, state)
}

/// Close the block, returning its last line if anything is pending.
pub fn finish_block(
    mut state: FlowState,
    ctx: &LayoutContext,
) -> (Option<FinishedLine>, FlowState) {
    if state.items.is_empty() {
        return (None, state);
    }
    let line = state.take_line(ctx, LineEnd::Last);
    (Some(line), state)
}

/// Lay out `fragments` in a block of `max_width` and return every line.
pub fn layout_all(
    fragments: &[Fragment],
    max_width: f32,
    line_height: LineHeight,
    align: Align,
    ctx: &LayoutContext,
) -> (Vec<FinishedLine>, Vec<Warning>) {
    let base = fragments
        .iter()
        .find_map(|f| match f {
            Fragment::Text { style, .. } => Some(style.font.size_pt),
            Fragment::Object(_) => None,
        })
        .unwrap_or(12.0);
    let mut state = FlowState::new(max_width, line_height, align, Direction::Ltr, base);
    let mut out = Vec::new();
    for fragment in fragments {
        let (lines, next) = layout_step(state, fragment, ctx);
        out.extend(lines);
        state = next;
    }
    let (last, state) = finish_block(state, ctx);
    out.extend(last);
    (out, state.warnings)
}

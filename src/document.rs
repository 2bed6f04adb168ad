//! Document – the public drawing API.
//!
//! A [`Document`] wires the font manager, the page controller, the layout
//! engine and the image registry together and keeps the drawing state
//! (current font, colours, line width, alpha) that survives page breaks.
//! Coordinates are millimetres from the top-left corner of the page.

use serde::{Deserialize, Serialize};

use crate::color::{restrict, ColorState, ColorValue, Paint, SpotColors};
use crate::error::{EngineError, Result, Warning};
use crate::fonts::{FontHandle, FontManager, FontStyle};
use crate::images::ImageRegistry;
use crate::layout::{
    finish_block, layout_all, layout_step, Align, Direction, FinishedLine, FlowState, Fragment,
    LayoutContext, LayoutParams, LineHeight, TextStyle, VerticalAlign,
};
use crate::layout_config::LayoutConfig;
use crate::metrics::{self, MeasureOptions, Spacing};
use crate::object_buffer::{InlineObject, ObjectKind};
use crate::pagination::{BreakTarget, Link, Page, PageController, PageState};
use crate::render::{draw_cell, Border, BorderEdge, CellBox, Decoration, Painter, TextRun};
use crate::content::PaintMode;
use crate::units::PageOrientation;
use crate::writer::{write_pdf, AlphaState, OutlineEntry, WriterInput};

/// Padding around span backgrounds and borders, mm.
const SPAN_PADDING: f32 = 0.5;
const DEFAULT_LINE_WIDTH: f32 = 0.2;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Where the cursor goes after a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellLn {
    /// To the right of the cell.
    #[default]
    Right,
    /// To the start of the next line.
    NextLine,
    /// Below the cell, same x.
    Below,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellOptions {
    /// Border code: `"1"`, `"0"`/`""` or a combination of `L`, `T`, `R`, `B`.
    pub border: String,
    pub ln: CellLn,
    pub align: Align,
    pub fill: bool,
    pub link: Option<Link>,
}

/// Background and border painted around a flowing block, split across
/// columns and pages as the block breaks.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockFrame {
    pub border: Border,
    pub background: Option<ColorValue>,
    /// Inner padding, mm.
    pub padding: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockOptions {
    /// Outer width, mm; the rest of the line when `None`.
    pub width: Option<f32>,
    pub line_height: Option<LineHeight>,
    pub align: Align,
    pub direction: Direction,
    pub frame: Option<BlockFrame>,
}

/// Which colour an alpha value applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMode {
    Fill,
    Stroke,
    Both,
}

impl AlphaMode {
    /// `"F"` fill, `"S"` stroke, anything else both.
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "F" => AlphaMode::Fill,
            "S" => AlphaMode::Stroke,
            _ => AlphaMode::Both,
        }
    }

    fn fill(self) -> bool {
        matches!(self, AlphaMode::Fill | AlphaMode::Both)
    }

    fn stroke(self) -> bool {
        matches!(self, AlphaMode::Stroke | AlphaMode::Both)
    }
}

/// Per-page header and footer callbacks.
///
/// While a callback runs, automatic page breaks are suppressed and
/// [`Document::add_page`] fails with `InvalidState`.
pub trait PageDecorator {
    fn header(&mut self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }

    fn footer(&mut self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Header,
    Footer,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// Drawing state saved across a page break.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    font: FontHandle,
    decoration: Decoration,
    colors: ColorState,
    line_width: f32,
    alpha: AlphaState,
}

/// The part of a framed block painted on one page or column.
#[derive(Debug, Clone, Copy)]
struct FrameSegment {
    page: usize,
    top: f32,
    /// Content-stream offset at which the frame is slotted in.
    offset: usize,
    first: bool,
}

struct OpenBlock {
    state: FlowState,
    /// Offset of the outer frame edge from the column's left edge.
    indent: f32,
    outer_width: f32,
    frame: Option<BlockFrame>,
    segment: Option<FrameSegment>,
}

impl OpenBlock {
    fn inset_left(&self) -> f32 {
        self.frame
            .as_ref()
            .map(|f| f.padding + f.border.left.map(|e| e.width).unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    fn inset_bottom(&self) -> f32 {
        self.frame
            .as_ref()
            .map(|f| f.padding + f.border.bottom_width())
            .unwrap_or(0.0)
    }
}

pub struct Document {
    config: LayoutConfig,
    params: LayoutParams,
    fonts: FontManager,
    pages: PageController,
    images: ImageRegistry,
    spot_colors: SpotColors,

    font: FontHandle,
    decoration: Decoration,
    spacing: Spacing,
    small_caps: bool,
    colors: ColorState,
    line_width: f32,
    alpha: AlphaState,
    alpha_states: Vec<AlphaState>,
    cell_padding: f32,
    last_height: f32,

    block: Option<OpenBlock>,
    decorator: Option<Box<dyn PageDecorator>>,
    in_decorator: bool,
    outlines: Vec<OutlineEntry>,
    /// Tags of the open marked-content sequences, outermost first.
    marked_tags: Vec<String>,
    marked: bool,
    finalized: bool,
    warnings: Vec<Warning>,
}

impl Document {
    /// Build a document from `config`. Fails with `FontNotFound` when the
    /// default font cannot be resolved.
    pub fn new(config: LayoutConfig) -> Result<Self> {
        let mut fonts = FontManager::new(config.font_options());
        for registration in &config.fonts {
            fonts.register(registration);
        }
        let resolved = fonts.load_font(&config.default_font, FontStyle::empty())?;
        let font = FontHandle {
            id: resolved.id,
            size_pt: config.default_font_size,
            synthetic_bold: resolved.synthetic_bold,
            synthetic_italic: resolved.synthetic_italic,
        };
        let pages = PageController::new(&config);
        log::debug!(
            "document created ({:?}, default font '{}')",
            config.page_size,
            config.default_font
        );
        Ok(Self {
            params: config.layout_params(),
            fonts,
            pages,
            images: ImageRegistry::new(),
            spot_colors: SpotColors::default(),
            font,
            decoration: Decoration::default(),
            spacing: Spacing::default(),
            small_caps: false,
            colors: ColorState::default(),
            line_width: DEFAULT_LINE_WIDTH,
            alpha: AlphaState { fill: 1.0, stroke: 1.0 },
            alpha_states: Vec::new(),
            cell_padding: 0.0,
            last_height: 0.0,
            block: None,
            decorator: None,
            in_decorator: false,
            outlines: Vec::new(),
            marked_tags: Vec::new(),
            marked: false,
            finalized: false,
            warnings: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Font table, e.g. for registering faces from memory.
    pub fn fonts_mut(&mut self) -> &mut FontManager {
        &mut self.fonts
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn set_decorator(&mut self, decorator: Box<dyn PageDecorator>) {
        self.decorator = Some(decorator);
    }

    // -- cursor -------------------------------------------------------------

    pub fn x(&self) -> f32 {
        self.pages.x
    }

    pub fn y(&self) -> f32 {
        self.pages.y
    }

    pub fn set_xy(&mut self, x: f32, y: f32) {
        self.pages.x = x;
        self.pages.y = y;
    }

    /// Line feed: back to the left edge and down by `h` (the last cell
    /// height by default).
    pub fn ln(&mut self, h: Option<f32>) {
        self.pages.x = self.pages.column_left();
        self.pages.y += h.unwrap_or(self.last_height);
    }

    pub fn page_no(&self) -> usize {
        self.pages.page_no()
    }

    pub fn page_count(&self) -> usize {
        self.pages.page_count()
    }

    pub fn set_auto_page_break(&mut self, on: bool) {
        self.pages.auto_page_break = on;
    }

    /// Lay content out in `count` columns from the cursor down.
    pub fn set_columns(&mut self, count: usize, gap: f32) -> Result<()> {
        self.ensure_page()?;
        self.pages.set_columns(count, gap);
        Ok(())
    }

    pub fn set_cell_padding(&mut self, mm: f32) {
        self.cell_padding = mm.max(0.0);
    }

    // -- fonts --------------------------------------------------------------

    /// Select a font. `style` may contain `B`, `I`, `U` (underline) and
    /// `S` (strike-through); `size_pt` keeps the current size when `None`.
    pub fn set_font(&mut self, family: &str, style: &str, size_pt: Option<f32>) -> Result<()> {
        let size = size_pt.unwrap_or(self.font.size_pt);
        if !(size > 0.0) {
            return Err(EngineError::geometry(format!("font size {size} must be positive")));
        }
        let resolved = self.fonts.load_font(family, FontStyle::parse(style))?;
        self.font = FontHandle {
            id: resolved.id,
            size_pt: size,
            synthetic_bold: resolved.synthetic_bold,
            synthetic_italic: resolved.synthetic_italic,
        };
        let upper = style.to_ascii_uppercase();
        self.decoration.underline = upper.contains('U');
        self.decoration.strike = upper.contains('S');
        Ok(())
    }

    pub fn set_font_size(&mut self, size_pt: f32) -> Result<()> {
        if !(size_pt > 0.0) {
            return Err(EngineError::geometry(format!("font size {size_pt} must be positive")));
        }
        self.font.size_pt = size_pt;
        Ok(())
    }

    pub fn set_spacing(&mut self, spacing: Spacing) {
        self.spacing = spacing;
    }

    pub fn set_small_caps(&mut self, on: bool) {
        self.small_caps = on;
    }

    /// Draw text as outlines with the given stroke width, or filled again
    /// with `None`.
    pub fn set_text_outline(&mut self, width: Option<f32>) {
        self.decoration.outline = width;
    }

    pub fn font(&self) -> FontHandle {
        self.font
    }

    /// Width of `text` in the current font, mm.
    pub fn string_width(&self, text: &str) -> f32 {
        metrics::text_width(
            self.fonts.entry(self.font.id),
            self.font.size_pt,
            text,
            self.spacing,
            &self.measure_options(),
        )
    }

    fn measure_options(&self) -> MeasureOptions {
        MeasureOptions {
            kerning: self.params.kerning,
            small_caps: self.small_caps.then_some(self.params.small_caps_scale),
        }
    }

    /// Style of text written with the current settings.
    pub fn text_style(&self) -> TextStyle {
        let mut style = TextStyle::new(self.font, self.colors.text);
        style.decoration = self.decoration;
        style.spacing = self.spacing;
        style.small_caps = self.small_caps;
        style
    }

    /// Text style for a fragment in `family`/`style` at `size_pt`, based on
    /// the current settings. The current font is left untouched.
    pub fn style_for(&mut self, family: &str, style: &str, size_pt: f32) -> Result<TextStyle> {
        if !(size_pt > 0.0) {
            return Err(EngineError::geometry(format!("font size {size_pt} must be positive")));
        }
        let resolved = self.fonts.load_font(family, FontStyle::parse(style))?;
        let mut text_style = self.text_style();
        text_style.font = FontHandle {
            id: resolved.id,
            size_pt,
            synthetic_bold: resolved.synthetic_bold,
            synthetic_italic: resolved.synthetic_italic,
        };
        let upper = style.to_ascii_uppercase();
        text_style.decoration.underline = upper.contains('U');
        text_style.decoration.strike = upper.contains('S');
        Ok(text_style)
    }

    // -- colours and alpha --------------------------------------------------

    /// Bring `color` in line with the archival profile. Alpha carried by the
    /// colour is applied through a graphics state for `mode`.
    fn comply(&mut self, color: ColorValue, mode: AlphaMode) -> Result<ColorValue> {
        let color = self.restrict_color(color);
        if let Some(alpha) = color.alpha() {
            self.set_alpha(alpha, mode)?;
        }
        Ok(color.opaque())
    }

    /// `color` converted to the colour space the archival profile allows.
    pub fn restrict_color(&mut self, color: ColorValue) -> ColorValue {
        let (color, warning) = restrict(color, self.config.archival_profile.color_restriction());
        if let Some(w) = warning {
            self.warn(w);
        }
        color
    }

    pub fn set_text_color(&mut self, color: ColorValue) -> Result<()> {
        self.colors.text = self.comply(color, AlphaMode::Fill)?;
        Ok(())
    }

    pub fn set_draw_color(&mut self, color: ColorValue) -> Result<()> {
        self.colors.draw = self.comply(color, AlphaMode::Stroke)?;
        if self.pages.state() != PageState::NoPage {
            let color = self.colors.draw;
            Painter::new(self.pages.page_mut()?).set_color(color, Paint::Stroke);
        }
        Ok(())
    }

    pub fn set_fill_color(&mut self, color: ColorValue) -> Result<()> {
        self.colors.fill = self.comply(color, AlphaMode::Fill)?;
        if self.pages.state() != PageState::NoPage {
            let color = self.colors.fill;
            Painter::new(self.pages.page_mut()?).set_color(color, Paint::Fill);
        }
        Ok(())
    }

    pub fn colors(&self) -> ColorState {
        self.colors
    }

    /// Register a spot colour and return its index.
    pub fn add_spot_color(&mut self, name: &str, c: u8, m: u8, y: u8, k: u8) -> usize {
        self.spot_colors.add(name, c, m, y, k)
    }

    /// A registered spot colour at `tint` percent.
    pub fn spot_color(&self, name: &str, tint: u8) -> Option<ColorValue> {
        self.spot_colors.index_of(name).map(|i| ColorValue::spot(i, tint))
    }

    /// Set transparency for fills, strokes or both. Archival profiles do not
    /// allow transparency: the value is recorded as a compliance violation
    /// and left opaque.
    pub fn set_alpha(&mut self, alpha: f32, mode: AlphaMode) -> Result<()> {
        let alpha = alpha.clamp(0.0, 1.0);
        if !self.config.archival_profile.allows_transparency() {
            if alpha < 1.0 {
                self.warn(Warning::ComplianceViolation(format!(
                    "alpha {alpha:.2} is not allowed by {:?}; drawing opaque",
                    self.config.archival_profile
                )));
            }
            return Ok(());
        }
        if mode.fill() {
            self.alpha.fill = alpha;
        }
        if mode.stroke() {
            self.alpha.stroke = alpha;
        }
        if self.pages.state() != PageState::NoPage {
            self.emit_alpha()?;
        }
        Ok(())
    }

    fn alpha_index(&mut self) -> usize {
        match self.alpha_states.iter().position(|a| *a == self.alpha) {
            Some(i) => i,
            None => {
                self.alpha_states.push(self.alpha);
                self.alpha_states.len() - 1
            }
        }
    }

    fn emit_alpha(&mut self) -> Result<()> {
        let index = self.alpha_index();
        Painter::new(self.pages.page_mut()?).graphics_state(index);
        Ok(())
    }

    pub fn set_line_width(&mut self, mm: f32) -> Result<()> {
        if !(mm >= 0.0) {
            return Err(EngineError::geometry(format!("line width {mm} must not be negative")));
        }
        self.line_width = mm;
        if self.pages.state() != PageState::NoPage {
            Painter::new(self.pages.page_mut()?).line_width(mm);
        }
        Ok(())
    }

    fn edge(&self) -> BorderEdge {
        BorderEdge::solid(self.line_width, self.colors.draw)
    }

    // -- pages --------------------------------------------------------------

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            font: self.font,
            decoration: self.decoration,
            colors: self.colors,
            line_width: self.line_width,
            alpha: self.alpha,
        }
    }

    fn restore(&mut self, s: &Snapshot) {
        self.font = s.font;
        self.decoration = s.decoration;
        self.colors = s.colors;
        self.line_width = s.line_width;
        self.alpha = s.alpha;
    }

    /// Re-emit colours, line width and alpha at the top of a page.
    fn emit_state(&mut self) -> Result<()> {
        let (draw, fill, width) = (self.colors.draw, self.colors.fill, self.line_width);
        let opaque = AlphaState { fill: 1.0, stroke: 1.0 };
        let alpha = (self.alpha != opaque).then(|| self.alpha_index());
        let mut painter = Painter::new(self.pages.page_mut()?);
        painter.set_color(draw, Paint::Stroke);
        painter.set_color(fill, Paint::Fill);
        painter.line_width(width);
        if let Some(index) = alpha {
            painter.graphics_state(index);
        }
        Ok(())
    }

    fn ensure_page(&mut self) -> Result<()> {
        if self.pages.state() == PageState::NoPage {
            self.new_page(None)?;
        }
        Ok(())
    }

    /// Start a new page. Fails when called from a header or footer.
    pub fn add_page(&mut self, orientation: Option<PageOrientation>) -> Result<()> {
        if self.in_decorator {
            return Err(EngineError::InvalidState("add_page called from a header or footer"));
        }
        if self.finalized {
            return Err(EngineError::InvalidState("document already finalised"));
        }
        self.new_page(orientation)
    }

    fn new_page(&mut self, orientation: Option<PageOrientation>) -> Result<()> {
        let saved = self.snapshot();
        self.close_frame_segment(false)?;
        self.suspend_marked_content()?;
        let indent = self.pages.x - self.pages.column_left();
        let closed = self.pages.open_page(orientation);

        self.emit_state()?;
        self.pages.y = self.pages.header_y();
        self.run_decorator(Hook::Header)?;
        self.restore(&saved);
        self.emit_state()?;
        self.resume_marked_content()?;

        let top = self.pages.margins().top;
        self.pages.y = top;
        if let Some(index) = closed {
            self.run_footer_on(index)?;
            self.restore(&saved);
        }
        self.pages.x = self.pages.column_left() + if self.block.is_some() { indent } else { 0.0 };
        self.open_frame_segment();
        Ok(())
    }

    fn run_decorator(&mut self, hook: Hook) -> Result<()> {
        let Some(mut decorator) = self.decorator.take() else {
            return Ok(());
        };
        self.in_decorator = true;
        let result = match hook {
            Hook::Header => decorator.header(self),
            Hook::Footer => decorator.footer(self),
        };
        self.in_decorator = false;
        self.decorator = Some(decorator);
        result
    }

    /// Run the footer with drawing redirected to page `index`.
    fn run_footer_on(&mut self, index: usize) -> Result<()> {
        let Some(current) = self.pages.current_index() else {
            return Ok(());
        };
        let (x, y) = (self.pages.x, self.pages.y);
        self.pages.set_target(index);
        self.pages.x = self.pages.margins().left;
        self.pages.y = self.pages.footer_y()?;
        let result = self.run_decorator(Hook::Footer);
        self.pages.set_target(current);
        self.pages.footer_done();
        self.pages.x = x;
        self.pages.y = y;
        result
    }

    /// Break before content of height `h` when it would cross the trigger.
    /// Returns whether a break happened.
    fn break_for(&mut self, h: f32) -> Result<bool> {
        if !self.pages.auto_page_break
            || self.in_decorator
            || self.pages.at_column_top()
            || !self.pages.would_break(h)
        {
            return Ok(false);
        }
        match self.pages.break_target() {
            BreakTarget::NextColumn => {
                let indent = self.pages.x - self.pages.column_left();
                self.close_frame_segment(false)?;
                self.pages.next_column();
                self.pages.x += indent;
                self.open_frame_segment();
            }
            BreakTarget::NewPage => {
                let x_offset = self.pages.x - self.pages.column_left();
                self.new_page(None)?;
                self.pages.x = self.pages.column_left() + x_offset;
            }
        }
        Ok(true)
    }

    fn open_frame_segment(&mut self) {
        let Some(index) = self.pages.current_index() else {
            return;
        };
        let offset = self.pages.page().map(|p| p.content.len()).unwrap_or(0);
        let top = self.pages.y;
        if let Some(block) = self.block.as_mut() {
            if block.frame.is_some() && block.segment.is_none() {
                block.segment = Some(FrameSegment {
                    page: index,
                    top,
                    offset,
                    first: false,
                });
            }
        }
    }

    /// Paint the frame of the open block from its segment top down to the
    /// cursor, slotted beneath the text drawn since the segment started.
    fn close_frame_segment(&mut self, last: bool) -> Result<()> {
        let Some(block) = self.block.as_mut() else {
            return Ok(());
        };
        let (Some(frame), Some(segment)) = (block.frame.clone(), block.segment.take()) else {
            return Ok(());
        };
        let x = self.pages.column_left() + block.indent;
        let width = block.outer_width;
        let bottom = self.pages.y;
        let page = self
            .pages
            .page_at_mut(segment.page)
            .ok_or(EngineError::InvalidState("frame segment on a missing page"))?;
        let start = page.content.len();
        let mut painter = Painter::new(page);
        let height = bottom - segment.top;
        if let Some(background) = frame.background {
            painter.fill_rect(x, segment.top, width, height, background);
        }
        let border = Border {
            top: frame.border.top.filter(|_| segment.first),
            bottom: frame.border.bottom.filter(|_| last),
            ..frame.border
        };
        painter.border(x, segment.top, width, height, &border);
        page.content.relocate_tail(start, segment.offset);
        Ok(())
    }

    // -- cells --------------------------------------------------------------

    fn border_from_code(&self, code: &str) -> Border {
        Border::from_code(code, self.edge())
    }

    /// A single-line cell at the cursor. `w == 0` extends to the right edge.
    pub fn cell(&mut self, w: f32, h: f32, text: &str, options: &CellOptions) -> Result<()> {
        if w < 0.0 || h < 0.0 {
            return Err(EngineError::geometry(format!("cell size {w}x{h} must not be negative")));
        }
        self.ensure_page()?;
        self.break_for(h)?;
        let w = if w == 0.0 { self.pages.right_edge() - self.pages.x } else { w };
        if !text.is_empty() {
            self.fonts.entry_mut(self.font.id).mark_used(text, self.small_caps);
        }
        let cell = CellBox {
            x: self.pages.x,
            y: self.pages.y,
            w,
            h,
            border: self.border_from_code(&options.border),
            align: options.align,
            fill: options.fill.then_some(self.colors.fill),
            link: options.link.as_ref(),
            padding: self.cell_padding,
            baseline_constant: self.params.baseline_constant,
            vertical_adjust: 0.0,
        };
        let run = TextRun {
            entry: self.fonts.entry(self.font.id),
            font: self.font,
            text,
            color: self.colors.text,
            spacing: self.spacing,
            decoration: self.decoration,
            kerning: self.params.kerning,
            small_caps: self.small_caps.then_some(self.params.small_caps_scale),
        };
        let page = self.pages.page_mut()?;
        draw_cell(&mut Painter::new(page), &cell, (!text.is_empty()).then_some(&run));

        self.last_height = h;
        match options.ln {
            CellLn::Right => self.pages.x += w,
            CellLn::NextLine => {
                self.pages.x = self.pages.column_left();
                self.pages.y += h;
            }
            CellLn::Below => self.pages.y += h,
        }
        Ok(())
    }

    /// Wrapped text in cells of height `h` stacked down the page. The border
    /// code applies to the whole box: `T` on the first line, `B` on the last.
    pub fn multi_cell(
        &mut self,
        w: f32,
        h: f32,
        text: &str,
        border: &str,
        align: Align,
        fill: bool,
    ) -> Result<()> {
        if w < 0.0 || h <= 0.0 {
            return Err(EngineError::geometry(format!("multi-cell size {w}x{h} is invalid")));
        }
        self.ensure_page()?;
        let w = if w == 0.0 { self.pages.right_edge() - self.pages.x } else { w };
        let inner = w - 2.0 * self.cell_padding;
        if inner <= 0.0 {
            return Err(EngineError::geometry("multi-cell is narrower than its padding"));
        }
        let fragment = Fragment::Text {
            text: text.to_string(),
            style: self.text_style(),
        };
        let (lines, warnings) = {
            let ctx = LayoutContext {
                fonts: &self.fonts,
                params: &self.params,
            };
            layout_all(std::slice::from_ref(&fragment), inner, LineHeight::Fixed(h), align, &ctx)
        };
        self.warnings.extend(warnings);
        self.fonts.entry_mut(self.font.id).mark_used(text, self.small_caps);

        let full = self.border_from_code(border);
        let count = lines.len().max(1);
        let x = self.pages.x;
        for i in 0..count {
            self.break_for(h)?;
            let edges = Border {
                top: full.top.filter(|_| i == 0),
                bottom: full.bottom.filter(|_| i + 1 == count),
                ..full
            };
            let cell = CellBox {
                x,
                y: self.pages.y,
                w,
                h,
                border: edges,
                align,
                fill: fill.then_some(self.colors.fill),
                link: None,
                padding: self.cell_padding,
                baseline_constant: self.params.baseline_constant,
                vertical_adjust: 0.0,
            };
            draw_cell(&mut Painter::new(self.pages.page_mut()?), &cell, None);
            if let Some(line) = lines.get(i) {
                let y = self.pages.y;
                self.draw_line(line, x + self.cell_padding, y)?;
            }
            self.pages.y += h;
        }
        self.last_height = h;
        self.pages.x = self.pages.column_left();
        Ok(())
    }

    /// Text with its baseline at (`x`, `y`), outside the flow.
    pub fn text(&mut self, x: f32, y: f32, text: &str) -> Result<()> {
        self.ensure_page()?;
        self.fonts.entry_mut(self.font.id).mark_used(text, self.small_caps);
        let run = TextRun {
            entry: self.fonts.entry(self.font.id),
            font: self.font,
            text,
            color: self.colors.text,
            spacing: self.spacing,
            decoration: self.decoration,
            kerning: self.params.kerning,
            small_caps: self.small_caps.then_some(self.params.small_caps_scale),
        };
        Painter::new(self.pages.page_mut()?).text(x, y, &run);
        Ok(())
    }

    // -- flowing blocks -----------------------------------------------------

    /// Open a flowing block at the cursor.
    pub fn new_flowing_block(&mut self, options: BlockOptions) -> Result<()> {
        if self.block.is_some() {
            return Err(EngineError::InvalidState("a flowing block is already open"));
        }
        self.ensure_page()?;
        let outer_width = options.width.unwrap_or(self.pages.right_edge() - self.pages.x);
        let (pad, left, right, top) = match &options.frame {
            Some(f) => (
                f.padding,
                f.border.left.map(|e| e.width).unwrap_or(0.0),
                f.border.right.map(|e| e.width).unwrap_or(0.0),
                f.border.top_width(),
            ),
            None => (0.0, 0.0, 0.0, 0.0),
        };
        let inner = outer_width - 2.0 * pad - left - right;
        if !(inner > 0.0) {
            return Err(EngineError::geometry(format!(
                "flowing block width {outer_width} leaves no room for text"
            )));
        }
        let line_height = options
            .line_height
            .unwrap_or(LineHeight::Factor(self.config.line_height));
        let state = FlowState::new(
            inner,
            line_height,
            options.align,
            options.direction,
            self.font.size_pt,
        );
        let segment = match (&options.frame, self.pages.current_index()) {
            (Some(_), Some(page)) => Some(FrameSegment {
                page,
                top: self.pages.y,
                offset: self.pages.page()?.content.len(),
                first: true,
            }),
            _ => None,
        };
        self.block = Some(OpenBlock {
            state,
            indent: self.pages.x - self.pages.column_left(),
            outer_width,
            frame: options.frame,
            segment,
        });
        self.pages.y += pad + top;
        Ok(())
    }

    /// Write text into the open block with the current style.
    pub fn write(&mut self, text: &str) -> Result<()> {
        let fragment = Fragment::Text {
            text: text.to_string(),
            style: self.text_style(),
        };
        self.write_fragment(&fragment)
    }

    /// Write an already resolved fragment into the open block.
    pub fn write_fragment(&mut self, fragment: &Fragment) -> Result<()> {
        let mut block = self
            .block
            .take()
            .ok_or(EngineError::InvalidState("write called without an open flowing block"))?;
        let ctx = LayoutContext {
            fonts: &self.fonts,
            params: &self.params,
        };
        let (lines, state) = layout_step(block.state, fragment, &ctx);
        block.state = state;
        self.warnings.append(&mut block.state.warnings);
        self.block = Some(block);
        self.draw_lines(lines, false)
    }

    pub fn write_object(&mut self, object: InlineObject) -> Result<()> {
        self.write_fragment(&Fragment::Object(object))
    }

    /// Close the open block, drawing its last line and the end of its frame.
    pub fn finish_flowing_block(&mut self) -> Result<()> {
        let mut block = self
            .block
            .take()
            .ok_or(EngineError::InvalidState("no flowing block is open"))?;
        let ctx = LayoutContext {
            fonts: &self.fonts,
            params: &self.params,
        };
        let (last, state) = finish_block(block.state, &ctx);
        block.state = state;
        self.warnings.append(&mut block.state.warnings);
        let inset = block.inset_bottom();
        self.block = Some(block);
        self.draw_lines(last.into_iter().collect(), true)?;
        self.pages.y += inset;
        self.close_frame_segment(true)?;
        self.block = None;
        self.pages.x = self.pages.column_left();
        Ok(())
    }

    fn draw_lines(&mut self, lines: Vec<FinishedLine>, last: bool) -> Result<()> {
        let count = lines.len();
        for (i, line) in lines.into_iter().enumerate() {
            let mut needed = line.height();
            if last && i + 1 == count {
                needed += self.block.as_ref().map(OpenBlock::inset_bottom).unwrap_or(0.0);
            }
            self.break_for(needed)?;
            let x = match &self.block {
                Some(b) => self.pages.column_left() + b.indent + b.inset_left(),
                None => self.pages.x,
            };
            let y = self.pages.y;
            self.draw_line(&line, x, y)?;
            self.pages.y += line.height();
            self.last_height = line.height();
        }
        Ok(())
    }

    /// Paint one finished line with its top-left corner at (`x`, `y`).
    fn draw_line(&mut self, line: &FinishedLine, x: f32, y: f32) -> Result<()> {
        for chunk in &line.chunks {
            let style = &chunk.chunk.style;
            self.fonts.entry_mut(style.font.id).mark_used(&chunk.chunk.text, style.small_caps);
        }
        for entry in line.objects.entries() {
            if let ObjectKind::TextCircle { text, font, .. } = &entry.object.kind {
                self.fonts.entry_mut(font.id).mark_used(text, false);
            }
        }

        let line_x = x + line.align_offset();
        let extra = line.spacing;
        let page_no = self.pages.page_no();
        let kerning = self.params.kerning;
        let small_caps_scale = self.params.small_caps_scale;
        let fonts = &self.fonts;
        let mut painter = Painter::new(self.pages.page_mut()?);

        for pc in &line.chunks {
            let style = &pc.chunk.style;
            let cx = line_x
                + pc.x
                + extra.char_spacing * pc.chars_before as f32
                + extra.word_spacing * pc.spaces_before as f32;
            let baseline = y + line.metrics.baseline + pc.vertical_adjust;
            let run = TextRun {
                entry: fonts.entry(style.font.id),
                font: style.font,
                text: &pc.chunk.text,
                color: style.color,
                spacing: Spacing {
                    char_spacing: style.spacing.char_spacing + extra.char_spacing,
                    word_spacing: style.spacing.word_spacing + extra.word_spacing,
                },
                decoration: style.decoration,
                kerning,
                small_caps: style.small_caps.then_some(small_caps_scale),
            };
            let width = run.width();
            if let Some(background) = style.background {
                painter.span_background(cx, baseline, width, &run, SPAN_PADDING, background);
            }
            if let Some(edge) = style.border {
                painter.span_border(cx, baseline, width, &run, SPAN_PADDING, edge);
            }
            painter.text(cx, baseline, &run);
            if let Some(link) = &style.link {
                painter.link(cx, y + line.text_top, width, line.text_height, link);
            }
        }

        for placed in line.objects.place(line_x, y, &line.metrics, extra, None) {
            match placed.kind {
                ObjectKind::Image { image } => {
                    painter.image(image, placed.x, placed.y, placed.width, placed.height)
                }
                ObjectKind::HorizontalRule { color, thickness } => {
                    let mid = placed.y + placed.height / 2.0;
                    painter.horizontal_rule(placed.x, mid, placed.width, thickness, color)
                }
                ObjectKind::DotTab { color } => {
                    painter.dot_leader(placed.x, y + line.metrics.baseline, placed.width, color)
                }
                ObjectKind::TextCircle { text, font, color } => {
                    let run = TextRun {
                        entry: fonts.entry(font.id),
                        font,
                        text: &text,
                        color,
                        spacing: Spacing::default(),
                        decoration: Decoration::default(),
                        kerning,
                        small_caps: None,
                    };
                    let r = placed.width / 2.0;
                    painter.circular_text(placed.x + r, placed.y + placed.height / 2.0, r, &run);
                }
                ObjectKind::Bookmark { title, level } => self.outlines.push(OutlineEntry {
                    title,
                    level,
                    page: page_no,
                    y: placed.y,
                }),
            }
        }
        Ok(())
    }

    // -- inline objects -----------------------------------------------------

    /// An image object for the open block; size follows the image's aspect
    /// ratio for a missing side.
    pub fn image_object(
        &mut self,
        src: &str,
        w: Option<f32>,
        h: Option<f32>,
        valign: VerticalAlign,
    ) -> InlineObject {
        let index = self.images.register(src, &mut self.warnings);
        let (width, height) = self
            .images
            .get(index)
            .map(|img| img.resolve_size(w, h))
            .unwrap_or((w.unwrap_or(0.0), h.unwrap_or(0.0)));
        InlineObject {
            kind: ObjectKind::Image { image: index },
            width,
            height,
            valign,
        }
    }

    /// A horizontal rule spanning the open block (or `width`).
    pub fn rule_object(&self, width: Option<f32>, thickness: f32) -> InlineObject {
        let full = self.block.as_ref().map(|b| b.state.max_width).unwrap_or(0.0);
        InlineObject {
            kind: ObjectKind::HorizontalRule {
                color: self.colors.draw,
                thickness,
            },
            width: width.unwrap_or(full),
            height: thickness.max(1.0),
            valign: VerticalAlign::Middle,
        }
    }

    /// Text set around a circle of `diameter` in the current font.
    pub fn text_circle_object(&self, text: &str, diameter: f32) -> InlineObject {
        InlineObject {
            kind: ObjectKind::TextCircle {
                text: text.to_string(),
                font: self.font,
                color: self.colors.text,
            },
            width: diameter,
            height: diameter,
            valign: VerticalAlign::Middle,
        }
    }

    // -- images and shapes --------------------------------------------------

    /// Place an image. Without `y` it flows at the cursor (breaking the page
    /// if needed) and moves the cursor below it. Returns the drawn size.
    pub fn image(
        &mut self,
        src: &str,
        x: Option<f32>,
        y: Option<f32>,
        w: Option<f32>,
        h: Option<f32>,
        link: Option<Link>,
    ) -> Result<(f32, f32)> {
        self.ensure_page()?;
        let index = self.images.register(src, &mut self.warnings);
        let (width, height) = self
            .images
            .get(index)
            .map(|img| img.resolve_size(w, h))
            .ok_or(EngineError::InvalidState("image registry returned no image"))?;
        let y = match y {
            Some(y) => y,
            None => {
                self.break_for(height)?;
                let top = self.pages.y;
                self.pages.y += height;
                top
            }
        };
        let x = x.unwrap_or(self.pages.x);
        let mut painter = Painter::new(self.pages.page_mut()?);
        painter.image(index, x, y, width, height);
        if let Some(link) = &link {
            painter.link(x, y, width, height, link);
        }
        Ok((width, height))
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<()> {
        self.ensure_page()?;
        let (color, width) = (self.colors.draw, self.line_width);
        let mut painter = Painter::new(self.pages.page_mut()?);
        painter.op("q");
        painter.set_color(color, Paint::Stroke);
        painter.line_width(width);
        painter.line(x1, y1, x2, y2);
        painter.op("Q");
        Ok(())
    }

    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, mode: PaintMode) -> Result<()> {
        if w < 0.0 || h < 0.0 {
            return Err(EngineError::geometry(format!("rectangle {w}x{h} must not be negative")));
        }
        self.ensure_page()?;
        let (draw, fill, width) = (self.colors.draw, self.colors.fill, self.line_width);
        let mut painter = Painter::new(self.pages.page_mut()?);
        painter.op("q");
        if mode != PaintMode::Stroke {
            painter.set_color(fill, Paint::Fill);
        }
        if mode != PaintMode::Fill {
            painter.set_color(draw, Paint::Stroke);
            painter.line_width(width);
        }
        painter.rect(x, y, w, h, mode);
        painter.op("Q");
        Ok(())
    }

    /// Line from (`x1`, `y1`) with an arrow head of `head` mm at (`x2`, `y2`).
    pub fn arrow(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, head: f32) -> Result<()> {
        if !(head > 0.0) {
            return Err(EngineError::geometry("arrow head size must be positive"));
        }
        self.ensure_page()?;
        let (color, width) = (self.colors.draw, self.line_width);
        Painter::new(self.pages.page_mut()?).arrow(x1, y1, x2, y2, head, width, color);
        Ok(())
    }

    /// Link area on the current page.
    pub fn link(&mut self, x: f32, y: f32, w: f32, h: f32, target: Link) -> Result<()> {
        self.ensure_page()?;
        Painter::new(self.pages.page_mut()?).link(x, y, w, h, &target);
        Ok(())
    }

    // -- structure ----------------------------------------------------------

    /// Outline entry pointing at `y` (the cursor by default) on this page.
    pub fn bookmark(&mut self, title: &str, level: u8, y: Option<f32>) -> Result<()> {
        self.ensure_page()?;
        self.outlines.push(OutlineEntry {
            title: title.to_string(),
            level,
            page: self.pages.page_no(),
            y: y.unwrap_or(self.pages.y),
        });
        Ok(())
    }

    /// Open a marked-content sequence; returns its MCID on this page.
    ///
    /// A sequence still open at a page break is closed on the old page and
    /// reopened with a fresh MCID on the new one.
    pub fn begin_marked_content(&mut self, tag: &str) -> Result<u32> {
        self.ensure_page()?;
        let mcid = open_marked(self.pages.page_mut()?, tag);
        self.marked_tags.push(tag.to_string());
        self.marked = true;
        Ok(mcid)
    }

    pub fn end_marked_content(&mut self) -> Result<()> {
        if self.marked_tags.is_empty() {
            return Err(EngineError::InvalidState("end_marked_content without a matching begin"));
        }
        self.pages.page_mut()?.content.op("EMC");
        self.marked_tags.pop();
        Ok(())
    }

    fn suspend_marked_content(&mut self) -> Result<()> {
        if self.marked_tags.is_empty() || self.pages.current_index().is_none() {
            return Ok(());
        }
        let page = self.pages.page_mut()?;
        for _ in &self.marked_tags {
            page.content.op("EMC");
        }
        Ok(())
    }

    fn resume_marked_content(&mut self) -> Result<()> {
        if self.marked_tags.is_empty() {
            return Ok(());
        }
        let page = self.pages.page_mut()?;
        for tag in &self.marked_tags {
            open_marked(page, tag);
        }
        log::debug!(
            "reopened {} marked-content sequence(s) on page {}",
            self.marked_tags.len(),
            self.pages.page_no()
        );
        Ok(())
    }

    // -- output -------------------------------------------------------------

    /// Finish the document and serialise it.
    pub fn output(&mut self) -> Result<Vec<u8>> {
        if self.block.is_some() {
            self.finish_flowing_block()?;
        }
        if !self.marked_tags.is_empty() {
            return Err(EngineError::InvalidState("unbalanced marked-content sequence"));
        }
        self.ensure_page()?;
        if !self.finalized {
            if let Some(index) = self.pages.current_index() {
                self.run_footer_on(index)?;
            }
            self.finalized = true;
        }
        log::info!(
            "writing document: {} page(s), {} warning(s)",
            self.pages.page_count(),
            self.warnings.len()
        );
        write_pdf(&WriterInput {
            pages: self.pages.pages(),
            fonts: &self.fonts,
            images: &self.images,
            alpha_states: &self.alpha_states,
            spot_colors: &self.spot_colors,
            outlines: &self.outlines,
            metadata: &self.config.metadata,
            profile: self.config.archival_profile,
            compress: self.config.compress,
            marked: self.marked,
        })
    }

    /// Uncompressed content stream of page `number` (1-based).
    pub fn page_content(&self, number: usize) -> Option<&[u8]> {
        let index = number.checked_sub(1)?;
        self.pages.pages().get(index).map(|p| p.content.as_bytes())
    }

    pub fn outlines(&self) -> &[OutlineEntry] {
        &self.outlines
    }
}

/// Emit `BDC` for `tag` with the page's next MCID.
fn open_marked(page: &mut Page, tag: &str) -> u32 {
    let mcid = page.next_mcid;
    page.next_mcid += 1;
    page.content.op(&format!("/{tag} <</MCID {mcid}>> BDC"));
    mcid
}

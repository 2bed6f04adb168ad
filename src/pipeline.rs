//! Pipeline – folds a serialised stream of drawing events into a PDF.
//!
//! Events arrive already resolved (font family and style, colour, spacing,
//! border) from whatever translated the source markup. Each event maps onto
//! one [`Document`] call; header and footer event lists are replayed on
//! every page with `{page}` replaced by the page number.

use serde::{Deserialize, Serialize};

use crate::color::ColorValue;
use crate::content::PaintMode;
use crate::document::{
    AlphaMode, BlockFrame, BlockOptions, CellLn, CellOptions, Document, PageDecorator,
};
use crate::error::{EngineError, Result, Warning};
use crate::layout::{Align, Direction, Fragment, LineHeight, VerticalAlign};
use crate::layout_config::LayoutConfig;
use crate::metrics::Spacing;
use crate::object_buffer::InlineObject;
use crate::pagination::Link;
use crate::render::{Border, BorderEdge};
use crate::units::PageOrientation;

/// A colour given directly or by spot colour name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorRef {
    Value(ColorValue),
    Spot { spot: String, tint: u8 },
}

/// Resolved style of a [`Event::Fragment`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentStyle {
    /// Current font family when `None`.
    pub family: Option<String>,
    /// `B`, `I`, `U`, `S` in any combination.
    pub style: String,
    pub size: Option<f32>,
    pub color: Option<ColorRef>,
    pub background: Option<ColorRef>,
    /// Border width around the span, mm.
    pub border: Option<f32>,
    pub char_spacing: f32,
    pub word_spacing: f32,
    pub small_caps: bool,
    pub vertical: VerticalAlign,
    pub link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameStyle {
    #[serde(default = "all_edges")]
    pub border: String,
    #[serde(default)]
    pub border_width: Option<f32>,
    #[serde(default)]
    pub background: Option<ColorRef>,
    #[serde(default)]
    pub padding: f32,
}

fn all_edges() -> String {
    "1".to_string()
}

fn both() -> String {
    "B".to_string()
}

fn stroke() -> String {
    "D".to_string()
}

fn default_head() -> f32 {
    3.0
}

/// One drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Event {
    AddPage {
        #[serde(default)]
        orientation: Option<PageOrientation>,
    },
    SetFont {
        family: String,
        #[serde(default)]
        style: String,
        #[serde(default)]
        size: Option<f32>,
    },
    SetFontSize {
        size: f32,
    },
    SetTextColor {
        color: ColorRef,
    },
    SetDrawColor {
        color: ColorRef,
    },
    SetFillColor {
        color: ColorRef,
    },
    AddSpotColor {
        name: String,
        c: u8,
        m: u8,
        y: u8,
        k: u8,
    },
    SetAlpha {
        alpha: f32,
        #[serde(default = "both")]
        mode: String,
    },
    SetLineWidth {
        width: f32,
    },
    Cell {
        w: f32,
        h: f32,
        #[serde(default)]
        text: String,
        #[serde(default)]
        border: String,
        #[serde(default)]
        ln: CellLn,
        #[serde(default)]
        align: Align,
        #[serde(default)]
        fill: bool,
        #[serde(default)]
        link: Option<Link>,
    },
    MultiCell {
        w: f32,
        h: f32,
        text: String,
        #[serde(default)]
        border: String,
        #[serde(default)]
        align: Align,
        #[serde(default)]
        fill: bool,
    },
    Text {
        x: f32,
        y: f32,
        text: String,
    },
    BeginBlock {
        #[serde(default)]
        width: Option<f32>,
        #[serde(default)]
        line_height: Option<LineHeight>,
        #[serde(default)]
        align: Align,
        #[serde(default)]
        direction: Direction,
        #[serde(default)]
        frame: Option<FrameStyle>,
    },
    Write {
        text: String,
    },
    Fragment {
        text: String,
        #[serde(default)]
        style: FragmentStyle,
    },
    InlineImage {
        src: String,
        #[serde(default)]
        w: Option<f32>,
        #[serde(default)]
        h: Option<f32>,
        #[serde(default)]
        valign: VerticalAlign,
    },
    Rule {
        #[serde(default)]
        width: Option<f32>,
        thickness: f32,
    },
    DotTab {},
    TextCircle {
        text: String,
        diameter: f32,
    },
    InlineBookmark {
        title: String,
        #[serde(default)]
        level: u8,
    },
    EndBlock {},
    Image {
        src: String,
        #[serde(default)]
        x: Option<f32>,
        #[serde(default)]
        y: Option<f32>,
        #[serde(default)]
        w: Option<f32>,
        #[serde(default)]
        h: Option<f32>,
        #[serde(default)]
        link: Option<Link>,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        /// `D`/`S` stroke, `F` fill, `DF`/`FD`/`B` both.
        #[serde(default = "stroke")]
        style: String,
    },
    Arrow {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        #[serde(default = "default_head")]
        head: f32,
    },
    Ln {
        #[serde(default)]
        h: Option<f32>,
    },
    SetXY {
        x: f32,
        y: f32,
    },
    SetColumns {
        count: usize,
        #[serde(default)]
        gap: f32,
    },
    Bookmark {
        title: String,
        #[serde(default)]
        level: u8,
        #[serde(default)]
        y: Option<f32>,
    },
    Link {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        target: Link,
    },
    BeginMarkedContent {
        tag: String,
    },
    EndMarkedContent {},
    SetHeader {
        events: Vec<Event>,
    },
    SetFooter {
        events: Vec<Event>,
    },
}

// ---------------------------------------------------------------------------
// Header / footer replay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct EventDecorator {
    header: Vec<Event>,
    footer: Vec<Event>,
}

impl EventDecorator {
    fn replay(events: &[Event], doc: &mut Document) -> Result<()> {
        let page = doc.page_no().to_string();
        for event in events {
            apply(doc, &substitute(event, &page))?;
        }
        Ok(())
    }
}

impl PageDecorator for EventDecorator {
    fn header(&mut self, doc: &mut Document) -> Result<()> {
        Self::replay(&self.header, doc)
    }

    fn footer(&mut self, doc: &mut Document) -> Result<()> {
        Self::replay(&self.footer, doc)
    }
}

/// Replace `{page}` in the text of text-bearing events.
fn substitute(event: &Event, page: &str) -> Event {
    let mut event = event.clone();
    match &mut event {
        Event::Cell { text, .. }
        | Event::MultiCell { text, .. }
        | Event::Text { text, .. }
        | Event::Write { text }
        | Event::Fragment { text, .. } => *text = text.replace("{page}", page),
        _ => {}
    }
    event
}

// ---------------------------------------------------------------------------
// Event application
// ---------------------------------------------------------------------------

fn color(doc: &Document, color: &ColorRef) -> Result<ColorValue> {
    match color {
        ColorRef::Value(v) => Ok(*v),
        ColorRef::Spot { spot, tint } => doc
            .spot_color(spot, *tint)
            .ok_or_else(|| {
                EngineError::geometry(format!("spot colour '{spot}' is not registered"))
            }),
    }
}

fn fragment(doc: &mut Document, text: &str, requested: &FragmentStyle) -> Result<Fragment> {
    let mut style = match &requested.family {
        Some(family) => {
            let size = requested.size.unwrap_or(doc.font().size_pt);
            doc.style_for(family, &requested.style, size)?
        }
        None => {
            let mut style = doc.text_style();
            if let Some(size) = requested.size {
                style.font.size_pt = size;
            }
            style
        }
    };
    if let Some(c) = &requested.color {
        let value = color(doc, c)?;
        style.color = doc.restrict_color(value).opaque();
    }
    if let Some(c) = &requested.background {
        let value = color(doc, c)?;
        style.background = Some(doc.restrict_color(value).opaque());
    }
    style.border = requested.border.map(|w| BorderEdge::solid(w, doc.colors().draw));
    style.spacing = Spacing {
        char_spacing: requested.char_spacing,
        word_spacing: requested.word_spacing,
    };
    style.small_caps = requested.small_caps;
    style.vertical = requested.vertical;
    style.link = requested.link.clone();
    Ok(Fragment::Text {
        text: text.to_string(),
        style,
    })
}

fn frame(doc: &mut Document, requested: &FrameStyle) -> Result<BlockFrame> {
    let colors = doc.colors();
    let edge = BorderEdge::solid(requested.border_width.unwrap_or(0.2), colors.draw);
    let background = match &requested.background {
        Some(c) => {
            let value = color(doc, c)?;
            Some(doc.restrict_color(value).opaque())
        }
        None => None,
    };
    Ok(BlockFrame {
        border: Border::from_code(&requested.border, edge),
        background,
        padding: requested.padding,
    })
}

/// Apply one event to `doc`. Header and footer events are handled by
/// [`generate`]; inside a header or footer they are ignored.
pub fn apply(doc: &mut Document, event: &Event) -> Result<()> {
    match event {
        Event::AddPage { orientation } => doc.add_page(*orientation),
        Event::SetFont { family, style, size } => doc.set_font(family, style, *size),
        Event::SetFontSize { size } => doc.set_font_size(*size),
        Event::SetTextColor { color: c } => {
            let value = color(doc, c)?;
            doc.set_text_color(value)
        }
        Event::SetDrawColor { color: c } => {
            let value = color(doc, c)?;
            doc.set_draw_color(value)
        }
        Event::SetFillColor { color: c } => {
            let value = color(doc, c)?;
            doc.set_fill_color(value)
        }
        Event::AddSpotColor { name, c, m, y, k } => {
            doc.add_spot_color(name, *c, *m, *y, *k);
            Ok(())
        }
        Event::SetAlpha { alpha, mode } => doc.set_alpha(*alpha, AlphaMode::parse(mode)),
        Event::SetLineWidth { width } => doc.set_line_width(*width),
        Event::Cell {
            w,
            h,
            text,
            border,
            ln,
            align,
            fill,
            link,
        } => {
            let options = CellOptions {
                border: border.clone(),
                ln: *ln,
                align: *align,
                fill: *fill,
                link: link.clone(),
            };
            doc.cell(*w, *h, text, &options)
        }
        Event::MultiCell {
            w,
            h,
            text,
            border,
            align,
            fill,
        } => doc.multi_cell(*w, *h, text, border, *align, *fill),
        Event::Text { x, y, text } => doc.text(*x, *y, text),
        Event::BeginBlock {
            width,
            line_height,
            align,
            direction,
            frame: requested,
        } => {
            let frame = match requested {
                Some(requested) => Some(frame(doc, requested)?),
                None => None,
            };
            doc.new_flowing_block(BlockOptions {
                width: *width,
                line_height: *line_height,
                align: *align,
                direction: *direction,
                frame,
            })
        }
        Event::Write { text } => doc.write(text),
        Event::Fragment { text, style } => {
            let fragment = fragment(doc, text, style)?;
            doc.write_fragment(&fragment)
        }
        Event::InlineImage { src, w, h, valign } => {
            let object = doc.image_object(src, *w, *h, *valign);
            doc.write_object(object)
        }
        Event::Rule { width, thickness } => {
            let object = doc.rule_object(*width, *thickness);
            doc.write_object(object)
        }
        Event::DotTab {} => {
            let object = InlineObject::dot_tab(doc.colors().text);
            doc.write_object(object)
        }
        Event::TextCircle { text, diameter } => {
            let object = doc.text_circle_object(text, *diameter);
            doc.write_object(object)
        }
        Event::InlineBookmark { title, level } => {
            doc.write_object(InlineObject::bookmark(title.as_str(), *level))
        }
        Event::EndBlock {} => doc.finish_flowing_block(),
        Event::Image { src, x, y, w, h, link } => {
            doc.image(src, *x, *y, *w, *h, link.clone()).map(|_| ())
        }
        Event::Line { x1, y1, x2, y2 } => doc.line(*x1, *y1, *x2, *y2),
        Event::Rect { x, y, w, h, style } => doc.rect(*x, *y, *w, *h, PaintMode::parse(style)),
        Event::Arrow { x1, y1, x2, y2, head } => doc.arrow(*x1, *y1, *x2, *y2, *head),
        Event::Ln { h } => {
            doc.ln(*h);
            Ok(())
        }
        Event::SetXY { x, y } => {
            doc.set_xy(*x, *y);
            Ok(())
        }
        Event::SetColumns { count, gap } => doc.set_columns(*count, *gap),
        Event::Bookmark { title, level, y } => doc.bookmark(title, *level, *y),
        Event::Link { x, y, w, h, target } => doc.link(*x, *y, *w, *h, target.clone()),
        Event::BeginMarkedContent { tag } => doc.begin_marked_content(tag).map(|_| ()),
        Event::EndMarkedContent {} => doc.end_marked_content(),
        Event::SetHeader { .. } | Event::SetFooter { .. } => {
            log::warn!("header/footer events are ignored inside a header or footer");
            Ok(())
        }
    }
}

/// Run `events` against a fresh document and return it unserialised.
pub fn generate(events: &[Event], config: &LayoutConfig) -> Result<Document> {
    let mut doc = Document::new(config.clone())?;
    let mut decorator = EventDecorator::default();
    for event in events {
        match event {
            Event::SetHeader { events } => {
                decorator.header = events.clone();
                doc.set_decorator(Box::new(decorator.clone()));
            }
            Event::SetFooter { events } => {
                decorator.footer = events.clone();
                doc.set_decorator(Box::new(decorator.clone()));
            }
            other => apply(&mut doc, other)?,
        }
    }
    log::debug!("applied {} event(s)", events.len());
    Ok(doc)
}

/// Full pipeline: events → PDF bytes.
pub fn generate_pdf(events: &[Event], config: &LayoutConfig) -> Result<Vec<u8>> {
    generate_pdf_with_warnings(events, config).map(|(bytes, _)| bytes)
}

/// Like [`generate_pdf`], also returning the recovered warnings.
pub fn generate_pdf_with_warnings(
    events: &[Event],
    config: &LayoutConfig,
) -> Result<(Vec<u8>, Vec<Warning>)> {
    let mut doc = generate(events, config)?;
    let bytes = doc.output()?;
    Ok((bytes, doc.warnings().to_vec()))
}

/// Parse a JSON array of events.
pub fn parse_events(json: &str) -> Result<Vec<Event>> {
    Ok(serde_json::from_str(json)?)
}

/// Convenience: JSON events with the default A4 configuration.
pub fn generate_pdf_from_json(json: &str) -> Result<Vec<u8>> {
    generate_pdf(&parse_events(json)?, &LayoutConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_basic() {
        let json = r#"[
            {"op": "SetFont", "family": "helvetica", "style": "B", "size": 16},
            {"op": "Cell", "w": 0, "h": 10, "text": "Hello", "ln": "NextLine"},
            {"op": "BeginBlock"},
            {"op": "Write", "text": "World"},
            {"op": "EndBlock"}
        ]"#;
        let bytes = generate_pdf_from_json(json).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn footer_gets_page_numbers() {
        let events = vec![
            Event::SetFooter {
                events: vec![Event::Cell {
                    w: 0.0,
                    h: 5.0,
                    text: "Page {page}".to_string(),
                    border: String::new(),
                    ln: CellLn::Right,
                    align: Align::Center,
                    fill: false,
                    link: None,
                }],
            },
            Event::AddPage { orientation: None },
            Event::AddPage { orientation: None },
        ];
        let doc = {
            let mut doc = generate(&events, &LayoutConfig::default()).unwrap();
            doc.output().unwrap();
            doc
        };
        let page = |n| String::from_utf8_lossy(doc.page_content(n).unwrap()).into_owned();
        assert!(page(1).contains("(Page 1) Tj"));
        assert!(page(2).contains("(Page 2) Tj"));
    }

    #[test]
    fn spot_colours_resolve_by_name() {
        let json = r#"[
            {"op": "AddSpotColor", "name": "Brand", "c": 100, "m": 50, "y": 0, "k": 0},
            {"op": "SetFillColor", "color": {"spot": "Brand", "tint": 80}},
            {"op": "Rect", "x": 10, "y": 10, "w": 20, "h": 20, "style": "F"}
        ]"#;
        let mut doc = generate(&parse_events(json).unwrap(), &LayoutConfig::default()).unwrap();
        assert_eq!(doc.colors().fill, ColorValue::spot(0, 80));
        assert!(doc.output().is_ok());

        let missing = r#"[{"op": "SetTextColor", "color": {"spot": "Nope", "tint": 10}}]"#;
        assert!(generate(&parse_events(missing).unwrap(), &LayoutConfig::default()).is_err());
    }

    #[test]
    fn fragments_carry_their_own_font() {
        let json = r#"[
            {"op": "BeginBlock", "width": 100},
            {"op": "Fragment", "text": "serif ", "style": {"family": "serif", "style": "I", "size": 12}},
            {"op": "Fragment", "text": "mono", "style": {"family": "courier", "color": {"Rgb": [255, 0, 0]}}},
            {"op": "EndBlock"}
        ]"#;
        let doc = generate(&parse_events(json).unwrap(), &LayoutConfig::default()).unwrap();
        let content = String::from_utf8_lossy(doc.page_content(1).unwrap()).into_owned();
        assert!(content.contains("(serif ) Tj"));
        assert!(content.contains("1.000 0.000 0.000 rg"));
        assert_eq!(doc.font().size_pt, 11.0);
    }

    #[test]
    fn unknown_op_is_a_json_error() {
        let err = parse_events(r#"[{"op": "Explode"}]"#).unwrap_err();
        assert!(matches!(err, EngineError::Json(_)));
    }
}

//! Object placement buffer.
//!
//! Inline non-text objects are collected per line with their natural offset
//! from the start of the line. Once the line is finished and its geometry is
//! known, [`ObjectBuffer::place`] turns each entry into an absolute box.

use crate::color::ColorValue;
use crate::fonts::FontHandle;
use crate::justify::SpacingSplit;
use crate::layout::VerticalAlign;

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    /// Index into the document image registry.
    Image { image: usize },
    HorizontalRule { color: ColorValue, thickness: f32 },
    /// Dotted leader; its width is whatever the line leaves free.
    DotTab { color: ColorValue },
    /// Text set around a circle of the object's width.
    TextCircle {
        text: String,
        font: FontHandle,
        color: ColorValue,
    },
    /// Outline entry at the line's position; zero-sized.
    Bookmark { title: String, level: u8 },
}

/// An object as written into a flowing block.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineObject {
    pub kind: ObjectKind,
    pub width: f32,
    pub height: f32,
    pub valign: VerticalAlign,
}

impl InlineObject {
    pub fn bookmark(title: impl Into<String>, level: u8) -> Self {
        Self {
            kind: ObjectKind::Bookmark {
                title: title.into(),
                level,
            },
            width: 0.0,
            height: 0.0,
            valign: VerticalAlign::Top,
        }
    }

    pub fn dot_tab(color: ColorValue) -> Self {
        Self {
            kind: ObjectKind::DotTab { color },
            width: 0.0,
            height: 0.0,
            valign: VerticalAlign::Baseline,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectBufferEntry {
    pub object: InlineObject,
    /// Offset from the line start before justification, mm.
    pub x: f32,
    /// Characters and spaces preceding the object on the line; justification
    /// shifts the object by the spacing they receive.
    pub chars_before: usize,
    pub spaces_before: usize,
}

/// Vertical metrics of a finished line, relative to its top edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub height: f32,
    /// Distance from the line top to the baseline.
    pub baseline: f32,
    pub ascent: f32,
    pub descent: f32,
    pub x_height: f32,
}

/// An object resolved to an absolute box in user space.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedObject {
    pub kind: ObjectKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectBuffer {
    entries: Vec<ObjectBufferEntry>,
}

impl ObjectBuffer {
    pub fn push(&mut self, entry: ObjectBufferEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ObjectBufferEntry] {
        &self.entries
    }

    /// Space an object claims above and below the baseline.
    pub fn extent(object: &InlineObject, ascent: f32, descent: f32, x_height: f32) -> (f32, f32) {
        let h = object.height;
        match object.valign {
            VerticalAlign::Baseline | VerticalAlign::Super | VerticalAlign::Sub => (h, 0.0),
            VerticalAlign::Middle => (h / 2.0 + x_height / 2.0, h / 2.0 - x_height / 2.0),
            VerticalAlign::TextTop => (ascent, h - ascent),
            VerticalAlign::TextBottom => (h - descent, descent),
            // Resolved against the final line box.
            VerticalAlign::Top | VerticalAlign::Bottom => (0.0, 0.0),
        }
    }

    /// Convert entries to absolute boxes for a line whose top-left corner is
    /// at (`x`, `top`). `rtl_width` mirrors positions across the line width.
    pub fn place(
        &self,
        x: f32,
        top: f32,
        line: &LineMetrics,
        spacing: SpacingSplit,
        rtl_width: Option<f32>,
    ) -> Vec<PlacedObject> {
        self.entries
            .iter()
            .map(|e| {
                let o = &e.object;
                let mut dx = e.x
                    + spacing.char_spacing * e.chars_before as f32
                    + spacing.word_spacing * e.spaces_before as f32;
                if let Some(width) = rtl_width {
                    dx = width - dx - o.width;
                }
                let dy = match o.valign {
                    VerticalAlign::Top => 0.0,
                    VerticalAlign::Bottom => line.height - o.height,
                    _ => {
                        let (above, _) = Self::extent(o, line.ascent, line.descent, line.x_height);
                        line.baseline - above
                    }
                };
                PlacedObject {
                    kind: o.kind.clone(),
                    x: x + dx,
                    y: top + dy,
                    width: o.width,
                    height: o.height,
                }
            })
            .collect()
    }
}

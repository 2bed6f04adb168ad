//! Layout config – engine settings shared by the document, the layout engine
//! and the writer. Every field has a default, so a config file only needs to
//! name what it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::color::ColorSpaceRestriction;
use crate::error::Result;
use crate::fonts::{FontOptions, FontRegistration};
use crate::justify::JustifyParams;
use crate::layout::LayoutParams;
use crate::units::{PageOrientation, PageSize};

/// Archival output profiles. Both forbid transparency; each restricts the
/// colour spaces that may appear in content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArchivalProfile {
    #[default]
    None,
    /// PDF/A-1b: RGB output intent, no CMYK.
    PdfA1b,
    /// PDF/X-1a: CMYK output, no RGB.
    PdfX1a,
}

impl ArchivalProfile {
    pub fn allows_transparency(&self) -> bool {
        matches!(self, ArchivalProfile::None)
    }

    pub fn color_restriction(&self) -> ColorSpaceRestriction {
        match self {
            ArchivalProfile::None => ColorSpaceRestriction::Unrestricted,
            ArchivalProfile::PdfA1b => ColorSpaceRestriction::RgbOnly,
            ArchivalProfile::PdfX1a => ColorSpaceRestriction::CmykOnly,
        }
    }
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(10.0)
    }
}

impl Margins {
    pub fn uniform(mm: f32) -> Self {
        Self {
            left: mm,
            top: mm,
            right: mm,
            bottom: mm,
        }
    }
}

/// Document information dictionary entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub page_size: PageSize,
    pub orientation: PageOrientation,
    pub margins: Margins,
    /// Distance of the header start from the top edge.
    pub header_offset: f32,
    /// Distance of the footer start from the bottom edge.
    pub footer_offset: f32,
    /// Swap left/right margins on even pages.
    pub mirror_margins: bool,
    /// Keep portrait margins on pages whose orientation differs from the
    /// document default.
    pub force_portrait_margins: bool,
    pub auto_page_break: bool,

    pub default_font: String,
    pub default_font_size: f32,
    /// Unitless multiple of the font size.
    pub line_height: f32,
    /// Characters of trailing punctuation allowed past the right edge.
    pub orphans_allowed: usize,
    pub justify_word_ratio: f32,
    /// Upper bound for justification character spacing, mm.
    pub justify_max_char_spacing: f32,
    /// Justify lines that end with an explicit newline.
    pub justify_before_break: bool,
    /// Baseline position as a fraction of the font size below the cell
    /// centre.
    pub baseline_constant: f32,
    pub small_caps_scale: f32,
    pub use_kerning: bool,
    /// Cut words that are wider than the line instead of overflowing.
    pub force_wrap: bool,

    pub archival_profile: ArchivalProfile,
    pub compress: bool,

    pub use_core_fonts: bool,
    pub subset_fonts: bool,
    pub fonts: Vec<FontRegistration>,
    pub sans_fonts: Vec<String>,
    pub serif_fonts: Vec<String>,
    pub mono_fonts: Vec<String>,
    pub font_cache_dir: Option<PathBuf>,

    pub metadata: Metadata,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let fonts = FontOptions::default();
        Self {
            page_size: PageSize::A4,
            orientation: PageOrientation::Portrait,
            margins: Margins::default(),
            header_offset: 5.0,
            footer_offset: 15.0,
            mirror_margins: false,
            force_portrait_margins: false,
            auto_page_break: true,
            default_font: "helvetica".to_string(),
            default_font_size: 11.0,
            line_height: 1.3,
            orphans_allowed: 5,
            justify_word_ratio: 0.4,
            justify_max_char_spacing: 2.0,
            justify_before_break: false,
            baseline_constant: 0.35,
            small_caps_scale: 0.75,
            use_kerning: true,
            force_wrap: false,
            archival_profile: ArchivalProfile::None,
            compress: true,
            use_core_fonts: fonts.core_fonts,
            subset_fonts: fonts.subsetting,
            fonts: Vec::new(),
            sans_fonts: fonts.sans_fonts,
            serif_fonts: fonts.serif_fonts,
            mono_fonts: fonts.mono_fonts,
            font_cache_dir: None,
            metadata: Metadata::default(),
        }
    }
}

impl LayoutConfig {
    pub fn font_options(&self) -> FontOptions {
        FontOptions {
            use_kerning: self.use_kerning,
            subsetting: self.subset_fonts,
            core_fonts: self.use_core_fonts,
            sans_fonts: self.sans_fonts.clone(),
            serif_fonts: self.serif_fonts.clone(),
            mono_fonts: self.mono_fonts.clone(),
            cache_dir: self.font_cache_dir.clone(),
        }
    }

    pub fn justify_params(&self) -> JustifyParams {
        JustifyParams {
            word_ratio: self.justify_word_ratio,
            max_char_spacing: self.justify_max_char_spacing,
            words_only: false,
        }
    }

    pub fn layout_params(&self) -> LayoutParams {
        LayoutParams {
            orphans_allowed: self.orphans_allowed,
            justify: self.justify_params(),
            justify_before_break: self.justify_before_break,
            force_wrap: self.force_wrap,
            kerning: self.use_kerning,
            small_caps_scale: self.small_caps_scale,
            baseline_constant: self.baseline_constant,
        }
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialise from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

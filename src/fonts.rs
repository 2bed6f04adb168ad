//! Font loading, fallback resolution and subset tracking.
//!
//! Core-14 fonts come from built-in AFM metrics ([`crate::core_fonts`]);
//! TrueType fonts are parsed once with `ttf-parser` and their metrics are
//! optionally persisted in a disk cache ([`crate::font_cache`]). Every loaded
//! face becomes an immutable [`FontEntry`] in an owned table; callers hold a
//! copied [`FontHandle`] (index + size) rather than a reference into it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use ttf_parser::GlyphId;

use crate::core_fonts;
use crate::error::{EngineError, Result};
use crate::font_cache::{source_signature, MetricsCache};

/// Advance used when a font has no glyph and no declared missing width.
pub const FALLBACK_MISSING_WIDTH: u16 = 500;

bitflags! {
    /// Font style bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct FontStyle: u8 {
        const BOLD = 0b01;
        const ITALIC = 0b10;
    }
}

impl FontStyle {
    /// Parse a style code such as `""`, `"B"`, `"I"` or `"BI"` (any case/order).
    pub fn parse(code: &str) -> Self {
        let mut style = FontStyle::empty();
        for c in code.chars() {
            match c.to_ascii_uppercase() {
                'B' => style |= FontStyle::BOLD,
                'I' => style |= FontStyle::ITALIC,
                _ => {}
            }
        }
        style
    }

    /// Canonical style code.
    pub fn code(&self) -> &'static str {
        match (self.contains(FontStyle::BOLD), self.contains(FontStyle::ITALIC)) {
            (false, false) => "",
            (true, false) => "B",
            (false, true) => "I",
            (true, true) => "BI",
        }
    }

    /// Styles to try, in order, when this exact style is unavailable.
    fn degraded(&self) -> &'static [FontStyle] {
        const B: FontStyle = FontStyle::BOLD;
        const I: FontStyle = FontStyle::ITALIC;
        const R: FontStyle = FontStyle::empty();
        match (self.contains(B), self.contains(I)) {
            (true, true) => &[B, I, R],
            (true, false) | (false, true) => &[R],
            (false, false) => &[],
        }
    }
}

/// Metrics of one font face in 1/1000 em units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontMetrics {
    pub postscript_name: String,
    pub units_per_em: u16,
    /// Codepoint → advance.
    pub widths: HashMap<u32, u16>,
    /// Codepoint → glyph id (empty for core fonts).
    pub glyph_ids: HashMap<u32, u16>,
    /// Left codepoint → right codepoint → adjustment.
    pub kerning: HashMap<u32, HashMap<u32, i16>>,
    pub ascent: i16,
    pub descent: i16,
    pub cap_height: i16,
    pub x_height: i16,
    pub missing_width: Option<u16>,
    pub underline_position: Option<i16>,
    pub underline_thickness: Option<i16>,
    pub italic_angle: f32,
    pub bbox: [i16; 4],
    pub stem_v: u16,
    pub flags: u32,
    pub num_glyphs: u16,
    /// Font maps characters in the Supplementary Multilingual Plane.
    pub has_smp: bool,
    /// Font maps characters in the Supplementary Ideographic Plane.
    pub has_sip: bool,
}

impl FontMetrics {
    pub fn kern(&self, left: u32, right: u32) -> i16 {
        self.kerning
            .get(&left)
            .and_then(|row| row.get(&right))
            .copied()
            .unwrap_or(0)
    }
}

/// How a face is represented in the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    /// One of the core-14 fonts; never embedded.
    Core,
    /// Embedded TrueType. Unicode faces use 2-byte glyph ids, the others
    /// a single-byte WinAnsi encoding.
    TrueType { unicode: bool },
}

/// How much of the font program ends up in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Embedding {
    None,
    Whole,
    Subset,
}

/// Index of a face in the [`FontManager`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontId(pub usize);

/// A loaded font face.
#[derive(Debug, Clone)]
pub struct FontEntry {
    /// Normalised family name.
    pub family: String,
    pub style: FontStyle,
    pub kind: FontKind,
    /// Resource index; the face is referenced as `/F<index>`.
    pub index: usize,
    pub metrics: Arc<FontMetrics>,
    /// Codepoints drawn with this face.
    pub used: BTreeSet<u32>,
    pub data: Option<Arc<Vec<u8>>>,
    pub symbolic: bool,
    pub subsetting: bool,
}

impl FontEntry {
    pub fn resource_name(&self) -> String {
        format!("F{}", self.index)
    }

    /// Whether text in this face is written as 2-byte codes.
    pub fn is_multibyte(&self) -> bool {
        matches!(self.kind, FontKind::TrueType { unicode: true })
    }

    pub fn embedding(&self) -> Embedding {
        match self.kind {
            FontKind::Core => Embedding::None,
            FontKind::TrueType { .. } if self.metrics.has_sip || self.metrics.has_smp => {
                Embedding::Whole
            }
            FontKind::TrueType { .. } if !self.subsetting => Embedding::Whole,
            FontKind::TrueType { .. } => Embedding::Subset,
        }
    }

    pub fn has_glyph(&self, c: char) -> bool {
        match self.kind {
            FontKind::Core => self.metrics.widths.contains_key(&(c as u32)),
            FontKind::TrueType { .. } => self.metrics.glyph_ids.contains_key(&(c as u32)),
        }
    }

    /// Record characters as drawn; embedded faces write widths, the
    /// ToUnicode map and the subset from this set. Small caps draw lower-case
    /// letters with their capital glyphs.
    pub fn mark_used(&mut self, text: &str, small_caps: bool) {
        if self.kind == FontKind::Core {
            return;
        }
        self.used.extend(text.chars().map(|c| {
            let drawn = if small_caps && c.is_lowercase() {
                c.to_uppercase().next().unwrap_or(c)
            } else {
                c
            };
            drawn as u32
        }));
    }
}

/// A copied reference to a face at a given size, with the style emulation
/// the renderer has to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontHandle {
    pub id: FontId,
    pub size_pt: f32,
    pub synthetic_bold: bool,
    pub synthetic_italic: bool,
}

/// Result of resolving a (family, style) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFont {
    pub id: FontId,
    pub synthetic_bold: bool,
    pub synthetic_italic: bool,
}

/// Where the bytes of a TrueType face come from.
#[derive(Debug, Clone)]
pub enum FontSource {
    File(PathBuf),
    Bytes(Arc<Vec<u8>>),
}

/// A TrueType family declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontRegistration {
    pub family: String,
    #[serde(default)]
    pub regular: Option<PathBuf>,
    #[serde(default)]
    pub bold: Option<PathBuf>,
    #[serde(default)]
    pub italic: Option<PathBuf>,
    #[serde(default)]
    pub bold_italic: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub unicode: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
struct FamilySources {
    faces: BTreeMap<FontStyle, FontSource>,
    unicode: bool,
}

/// Options that affect how faces are parsed and embedded.
#[derive(Debug, Clone)]
pub struct FontOptions {
    pub use_kerning: bool,
    pub subsetting: bool,
    pub core_fonts: bool,
    pub sans_fonts: Vec<String>,
    pub serif_fonts: Vec<String>,
    pub mono_fonts: Vec<String>,
    pub cache_dir: Option<PathBuf>,
}

impl Default for FontOptions {
    fn default() -> Self {
        Self {
            use_kerning: true,
            subsetting: true,
            core_fonts: true,
            sans_fonts: vec!["dejavusans".into(), "freesans".into(), "helvetica".into()],
            serif_fonts: vec!["dejavuserif".into(), "freeserif".into(), "times".into()],
            mono_fonts: vec!["dejavusansmono".into(), "freemono".into(), "courier".into()],
            cache_dir: None,
        }
    }
}

/// Owns every loaded face.
pub struct FontManager {
    entries: Vec<FontEntry>,
    loaded: HashMap<(String, FontStyle), FontId>,
    sources: HashMap<String, FamilySources>,
    /// Registration order of TrueType families, used for the last-resort
    /// Unicode fallback.
    registration_order: Vec<String>,
    options: FontOptions,
    cache: Option<MetricsCache>,
}

/// Normalise a family name: lowercase, without spaces, hyphens, underscores
/// or quotes.
pub fn normalize_family(family: &str) -> String {
    family
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '"' | '\''))
        .flat_map(char::to_lowercase)
        .collect()
}

impl FontManager {
    pub fn new(options: FontOptions) -> Self {
        let cache = options.cache_dir.clone().map(MetricsCache::new);
        Self {
            entries: Vec::new(),
            loaded: HashMap::new(),
            sources: HashMap::new(),
            registration_order: Vec::new(),
            options,
            cache,
        }
    }

    /// Declare a TrueType family from configuration.
    pub fn register(&mut self, reg: &FontRegistration) {
        let faces = [
            (FontStyle::empty(), &reg.regular),
            (FontStyle::BOLD, &reg.bold),
            (FontStyle::ITALIC, &reg.italic),
            (FontStyle::BOLD | FontStyle::ITALIC, &reg.bold_italic),
        ];
        for (style, path) in faces {
            if let Some(path) = path {
                let source = FontSource::File(path.clone());
                self.register_source(&reg.family, style, source, reg.unicode);
            }
        }
    }

    /// Declare one TrueType face from memory.
    pub fn register_bytes(
        &mut self,
        family: &str,
        style: FontStyle,
        bytes: Vec<u8>,
        unicode: bool,
    ) {
        self.register_source(family, style, FontSource::Bytes(Arc::new(bytes)), unicode);
    }

    fn register_source(
        &mut self,
        family: &str,
        style: FontStyle,
        source: FontSource,
        unicode: bool,
    ) {
        let family = normalize_family(family);
        if !self.sources.contains_key(&family) {
            self.registration_order.push(family.clone());
        }
        let entry = self.sources.entry(family).or_default();
        entry.unicode = unicode;
        entry.faces.insert(style, source);
    }

    pub fn entry(&self, id: FontId) -> &FontEntry {
        &self.entries[id.0]
    }

    pub fn entry_mut(&mut self, id: FontId) -> &mut FontEntry {
        &mut self.entries[id.0]
    }

    pub fn entries(&self) -> impl Iterator<Item = &FontEntry> {
        self.entries.iter()
    }

    /// Resolve `(family, style)` to a loaded face.
    ///
    /// Order: exact match → generic alias (sans/serif/mono) → same family
    /// with a dropped style → first registered Unicode font. A registered
    /// face that fails to load is skipped; its error is returned only when
    /// nothing else resolves.
    pub fn load_font(&mut self, family: &str, style: FontStyle) -> Result<ResolvedFont> {
        let normalized = normalize_family(family);
        let family_key = core_fonts::core_alias(&normalized).to_string();

        let candidates: Vec<String> = match family_key.as_str() {
            "sans" | "sansserif" => self.options.sans_fonts.clone(),
            "serif" => self.options.serif_fonts.clone(),
            "mono" | "monospace" => self.options.mono_fonts.clone(),
            _ => vec![family_key.clone()],
        };
        let candidates: Vec<String> = candidates
            .iter()
            .map(|c| core_fonts::core_alias(&normalize_family(c)).to_string())
            .collect();

        let mut failure = None;
        for candidate in &candidates {
            if let Some(id) = self.try_candidate(candidate, style, &mut failure) {
                return Ok(resolved(id, style, style));
            }
        }
        for candidate in &candidates {
            for fallback in style.degraded() {
                if let Some(id) = self.try_candidate(candidate, *fallback, &mut failure) {
                    log::debug!(
                        "font '{family}' style '{}' degraded to '{}'",
                        style.code(),
                        fallback.code()
                    );
                    return Ok(resolved(id, style, *fallback));
                }
            }
        }

        let unicode_families: Vec<String> = self
            .registration_order
            .iter()
            .filter(|f| self.sources.get(*f).map(|s| s.unicode).unwrap_or(false))
            .cloned()
            .collect();
        for candidate in &unicode_families {
            let mut styles = vec![style];
            styles.extend_from_slice(style.degraded());
            for s in styles {
                if let Some(id) = self.try_candidate(candidate, s, &mut failure) {
                    log::warn!("font '{family}' not available; substituting '{candidate}'");
                    return Ok(resolved(id, style, s));
                }
            }
        }

        Err(failure.unwrap_or_else(|| EngineError::FontNotFound {
            family: family.to_string(),
            style: style.code().to_string(),
        }))
    }

    fn try_candidate(
        &mut self,
        family: &str,
        style: FontStyle,
        failure: &mut Option<EngineError>,
    ) -> Option<FontId> {
        match self.try_exact(family, style) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("skipping font '{family}' style '{}': {e}", style.code());
                failure.get_or_insert(e);
                None
            }
        }
    }

    fn try_exact(&mut self, family: &str, style: FontStyle) -> Result<Option<FontId>> {
        if let Some(id) = self.loaded.get(&(family.to_string(), style)) {
            return Ok(Some(*id));
        }
        let source = self
            .sources
            .get(family)
            .and_then(|s| s.faces.get(&style).cloned().map(|src| (src, s.unicode)));
        if let Some((source, unicode)) = source {
            let id = self.load_truetype(family, style, source, unicode)?;
            return Ok(Some(id));
        }
        if self.options.core_fonts && core_fonts::is_core_family(family) {
            if let Some(metrics) = core_fonts::core_metrics(family, style) {
                let id = self.push_entry(FontEntry {
                    family: family.to_string(),
                    style,
                    kind: FontKind::Core,
                    index: 0,
                    metrics: Arc::new(metrics),
                    used: BTreeSet::new(),
                    data: None,
                    symbolic: core_fonts::is_symbolic(family),
                    subsetting: false,
                });
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn load_truetype(
        &mut self,
        family: &str,
        style: FontStyle,
        source: FontSource,
        unicode: bool,
    ) -> Result<FontId> {
        let bytes = match source {
            FontSource::Bytes(b) => b,
            FontSource::File(path) => Arc::new(std::fs::read(&path)?),
        };
        let signature = source_signature(&bytes);
        let kerning = self.options.use_kerning;
        let subsetting = self.options.subsetting;

        let cached = self
            .cache
            .as_ref()
            .and_then(|c| c.load(family, style, &signature, kerning, subsetting));
        let metrics = match cached {
            Some(m) => m,
            None => {
                let m = parse_truetype(family, &bytes, kerning)?;
                if let Some(cache) = &self.cache {
                    let stored = cache.store(family, style, &signature, kerning, subsetting, &m);
                    if let Err(e) = stored {
                        log::warn!("could not write metrics cache for '{family}': {e}");
                    }
                }
                m
            }
        };

        let mut used = BTreeSet::new();
        if !unicode {
            used.extend(32u32..=127);
        }
        Ok(self.push_entry(FontEntry {
            family: family.to_string(),
            style,
            kind: FontKind::TrueType { unicode },
            index: 0,
            symbolic: metrics.flags & 4 != 0,
            metrics: Arc::new(metrics),
            used,
            data: Some(bytes),
            subsetting,
        }))
    }

    fn push_entry(&mut self, mut entry: FontEntry) -> FontId {
        let id = FontId(self.entries.len());
        entry.index = id.0 + 1;
        log::debug!(
            "loaded font {} ({}{}) as /F{}",
            entry.metrics.postscript_name,
            entry.family,
            entry.style.code(),
            entry.index
        );
        self.loaded.insert((entry.family.clone(), entry.style), id);
        self.entries.push(entry);
        id
    }
}

fn resolved(id: FontId, requested: FontStyle, found: FontStyle) -> ResolvedFont {
    let missing = requested - found;
    ResolvedFont {
        id,
        synthetic_bold: missing.contains(FontStyle::BOLD),
        synthetic_italic: missing.contains(FontStyle::ITALIC),
    }
}

/// Characters whose kerning pairs are extracted (Basic Latin through
/// Latin Extended-A plus general punctuation quotes).
fn kerning_candidate(cp: u32) -> bool {
    (0x20..=0x17F).contains(&cp) || (0x2018..=0x201E).contains(&cp)
}

/// A face is symbolic when it carries a (3,0) Symbol cmap or maps none of
/// the Basic Latin letters.
fn is_symbolic_cmap(symbol_cmap: bool, glyph_ids: &HashMap<u32, u16>) -> bool {
    symbol_cmap || !('A'..='Z').chain('a'..='z').any(|c| glyph_ids.contains_key(&(c as u32)))
}

/// Parse the metrics of a TrueType/OpenType face.
pub fn parse_truetype(family: &str, bytes: &[u8], use_kerning: bool) -> Result<FontMetrics> {
    let face = ttf_parser::Face::parse(bytes, 0).map_err(|e| EngineError::FontParse {
        family: family.to_string(),
        reason: e.to_string(),
    })?;

    let upem = face.units_per_em().max(1);
    let scale = 1000.0 / f32::from(upem);
    let to_em = |v: i16| (f32::from(v) * scale).round() as i16;

    let mut glyph_ids: HashMap<u32, u16> = HashMap::new();
    let mut symbol_cmap = false;
    if let Some(cmap) = face.tables().cmap {
        for subtable in cmap.subtables {
            let windows = subtable.platform_id == ttf_parser::PlatformId::Windows;
            if windows && subtable.encoding_id == 0 {
                symbol_cmap = true;
            }
            if !subtable.is_unicode() {
                continue;
            }
            subtable.codepoints(|cp| {
                if let Some(gid) = subtable.glyph_index(cp) {
                    glyph_ids.entry(cp).or_insert(gid.0);
                }
            });
        }
    }

    let widths: HashMap<u32, u16> = glyph_ids
        .iter()
        .map(|(cp, gid)| {
            let adv = face.glyph_hor_advance(GlyphId(*gid)).unwrap_or(0);
            (*cp, (f32::from(adv) * scale).round() as u16)
        })
        .collect();

    let mut kerning: HashMap<u32, HashMap<u32, i16>> = HashMap::new();
    if use_kerning {
        if let Some(kern) = face.tables().kern {
            let mut latin: Vec<(u32, u16)> = glyph_ids
                .iter()
                .filter(|(cp, _)| kerning_candidate(**cp))
                .map(|(cp, gid)| (*cp, *gid))
                .collect();
            latin.sort_unstable();
            for subtable in kern.subtables {
                if !subtable.horizontal || subtable.variable {
                    continue;
                }
                for (lcp, lgid) in &latin {
                    for (rcp, rgid) in &latin {
                        if let Some(v) = subtable.glyphs_kerning(GlyphId(*lgid), GlyphId(*rgid)) {
                            if v != 0 {
                                kerning.entry(*lcp).or_default().insert(*rcp, to_em(v));
                            }
                        }
                    }
                }
            }
        }
    }

    let postscript_name = face
        .names()
        .into_iter()
        .find(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME && n.is_unicode())
        .and_then(|n| n.to_string())
        .unwrap_or_else(|| family.to_string())
        .replace(' ', "");

    let ascent = to_em(face.ascender());
    let descent = to_em(face.descender());
    let bbox = face.global_bounding_box();
    let italic_angle = face.italic_angle();

    let mut flags = if is_symbolic_cmap(symbol_cmap, &glyph_ids) { 4 } else { 32 };
    if face.is_monospaced() {
        flags |= 1;
    }
    if italic_angle != 0.0 {
        flags |= 64;
    }

    let underline = face.underline_metrics();

    Ok(FontMetrics {
        postscript_name,
        units_per_em: upem,
        missing_width: face
            .glyph_hor_advance(GlyphId(0))
            .map(|adv| (f32::from(adv) * scale).round() as u16),
        has_smp: glyph_ids.keys().any(|cp| (0x10000..0x20000).contains(cp)),
        has_sip: glyph_ids.keys().any(|cp| (0x20000..0x30000).contains(cp)),
        widths,
        glyph_ids,
        kerning,
        ascent,
        descent,
        cap_height: face.capital_height().map(to_em).unwrap_or(ascent),
        x_height: face.x_height().map(to_em).unwrap_or(ascent / 2),
        underline_position: underline.map(|m| to_em(m.position)),
        underline_thickness: underline.map(|m| to_em(m.thickness)),
        italic_angle,
        bbox: [to_em(bbox.x_min), to_em(bbox.y_min), to_em(bbox.x_max), to_em(bbox.y_max)],
        stem_v: if face.is_bold() { 120 } else { 70 },
        flags,
        num_glyphs: face.number_of_glyphs(),
    })
}

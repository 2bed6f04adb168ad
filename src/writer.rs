//! PDF stream writer – serialises pages and their registered resources into
//! a `lopdf` object graph and saves it.
//!
//! Everything is written in one pass, in a fixed order, so identical input
//! produces identical bytes.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use sha2::{Digest, Sha256};

use crate::color::SpotColors;
use crate::core_fonts::winansi_char;
use crate::error::{EngineError, Result};
use crate::fonts::{Embedding, FontEntry, FontId, FontKind, FontManager, FALLBACK_MISSING_WIDTH};
use crate::images::{deflate, ImageData, ImageRegistry};
use crate::layout_config::{ArchivalProfile, Metadata};
use crate::pagination::{Link, Page};
use crate::subset::subset_font;
use crate::units::mm_to_pt;

/// Alpha pair of one `/GS{n}` graphics state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaState {
    pub fill: f32,
    pub stroke: f32,
}

/// One document outline entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineEntry {
    pub title: String,
    /// 0 for top-level entries.
    pub level: u8,
    /// 1-based page number.
    pub page: usize,
    /// Target y in mm from the top of the page.
    pub y: f32,
}

/// Everything the writer needs from a finished document.
pub struct WriterInput<'a> {
    pub pages: &'a [Page],
    pub fonts: &'a FontManager,
    pub images: &'a ImageRegistry,
    pub alpha_states: &'a [AlphaState],
    pub spot_colors: &'a SpotColors,
    pub outlines: &'a [OutlineEntry],
    pub metadata: &'a Metadata,
    pub profile: ArchivalProfile,
    pub compress: bool,
    /// Content streams use marked-content sequences.
    pub marked: bool,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn write_pdf(input: &WriterInput) -> Result<Vec<u8>> {
    if input.pages.is_empty() {
        return Err(EngineError::InvalidState("document has no pages"));
    }
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    // -- shared resources ----------------------------------------------------
    let used_fonts: BTreeSet<FontId> = input
        .pages
        .iter()
        .flat_map(|p| p.resources.fonts.iter().copied())
        .collect();
    let mut font_ids: BTreeMap<FontId, ObjectId> = BTreeMap::new();
    for id in used_fonts {
        let entry = input.fonts.entry(id);
        let object_id = write_font(&mut doc, entry, input.compress)?;
        font_ids.insert(id, object_id);
    }

    let used_images: BTreeSet<usize> = input
        .pages
        .iter()
        .flat_map(|p| p.resources.images.iter().copied())
        .collect();
    let mut image_ids: BTreeMap<usize, ObjectId> = BTreeMap::new();
    for index in used_images {
        let image = input
            .images
            .get(index)
            .ok_or(EngineError::InvalidState("page references an unregistered image"))?;
        image_ids.insert(index, write_image(&mut doc, image));
    }

    let gs_ids: Vec<ObjectId> = input
        .alpha_states
        .iter()
        .map(|a| {
            doc.add_object(dictionary! {
                "Type" => "ExtGState",
                "ca" => a.fill,
                "CA" => a.stroke,
                "BM" => "Normal",
            })
        })
        .collect();

    let spot_ids: BTreeMap<usize, ObjectId> = input
        .spot_colors
        .iter()
        .map(|(index, spot)| {
            let [c, m, y, k] = spot.cmyk.map(|v| Object::Real(f32::from(v) / 100.0));
            let function = doc.add_object(dictionary! {
                "FunctionType" => 2,
                "Domain" => vec![0.into(), 1.into()],
                "C0" => vec![0.into(), 0.into(), 0.into(), 0.into()],
                "C1" => vec![c, m, y, k],
                "N" => 1,
            });
            let space = doc.add_object(vec![
                "Separation".into(),
                Object::Name(spot.name.as_bytes().to_vec()),
                "DeviceCMYK".into(),
                function.into(),
            ]);
            (index, space)
        })
        .collect();

    // -- pages ---------------------------------------------------------------
    let page_ids: Vec<ObjectId> = input.pages.iter().map(|_| doc.new_object_id()).collect();
    for (page, &page_id) in input.pages.iter().zip(&page_ids) {
        let content = page.content.as_bytes().to_vec();
        let stream = if input.compress {
            Stream::new(dictionary! { "Filter" => "FlateDecode" }, deflate(&content))
        } else {
            Stream::new(dictionary! {}, content)
        };
        let content_id = doc.add_object(stream);

        let mut resources = Dictionary::new();
        let proc_set: Vec<Object> =
            ["PDF", "Text", "ImageB", "ImageC"].into_iter().map(Object::from).collect();
        resources.set("ProcSet", proc_set);
        let fonts: Dictionary = page
            .resources
            .fonts
            .iter()
            .filter_map(|id| {
                let oid = font_ids.get(id)?;
                Some((input.fonts.entry(*id).resource_name(), *oid))
            })
            .fold(Dictionary::new(), |mut d, (name, oid)| {
                d.set(name, oid);
                d
            });
        if !fonts.is_empty() {
            resources.set("Font", fonts);
        }
        let mut xobjects = Dictionary::new();
        for index in &page.resources.images {
            if let Some(oid) = image_ids.get(index) {
                xobjects.set(format!("I{}", index + 1), *oid);
            }
        }
        if !xobjects.is_empty() {
            resources.set("XObject", xobjects);
        }
        let mut states = Dictionary::new();
        for index in &page.resources.graphics_states {
            if let Some(oid) = gs_ids.get(*index) {
                states.set(format!("GS{}", index + 1), *oid);
            }
        }
        if !states.is_empty() {
            resources.set("ExtGState", states);
        }
        let mut spaces = Dictionary::new();
        for index in &page.resources.spot_colors {
            if let Some(oid) = spot_ids.get(index) {
                spaces.set(format!("CS{}", index + 1), *oid);
            }
        }
        if !spaces.is_empty() {
            resources.set("ColorSpace", spaces);
        }

        let media_box: Vec<Object> = vec![
            0.into(),
            0.into(),
            mm_to_pt(page.width).into(),
            mm_to_pt(page.height).into(),
        ];
        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => media_box,
            "Contents" => content_id,
            "Resources" => resources,
        };

        if !page.links.is_empty() {
            let mut annots = Vec::with_capacity(page.links.len());
            for link in &page.links {
                let action = match &link.target {
                    Link::Uri(uri) => dictionary! {
                        "S" => "URI",
                        "URI" => Object::String(uri.as_bytes().to_vec(), StringFormat::Literal),
                    },
                    Link::Page { page: target, y } => {
                        let Some(dest) = destination(input.pages, &page_ids, *target, *y) else {
                            log::warn!("link to page {target} skipped: no such page");
                            continue;
                        };
                        dictionary! { "S" => "GoTo", "D" => dest }
                    }
                };
                let rect: Vec<Object> = link.rect.iter().map(|v| Object::Real(*v)).collect();
                annots.push(Object::Reference(doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Link",
                    "Rect" => rect,
                    "Border" => vec![0.into(), 0.into(), 0.into()],
                    "A" => action,
                })));
            }
            if !annots.is_empty() {
                page_dict.set("Annots", annots);
            }
        }
        doc.objects.insert(page_id, Object::Dictionary(page_dict));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
        }),
    );

    // -- catalog -------------------------------------------------------------
    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    if let Some(outlines_id) = write_outlines(&mut doc, input, &page_ids) {
        catalog.set("Outlines", outlines_id);
        catalog.set("PageMode", "UseOutlines");
    }
    if input.marked {
        catalog.set("MarkInfo", dictionary! { "Marked" => true });
    }
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(info_dictionary(input.metadata, input.profile));
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    log::info!("wrote {} page(s), {} bytes", input.pages.len(), bytes.len());
    Ok(bytes)
}

fn destination(pages: &[Page], page_ids: &[ObjectId], page: usize, y: f32) -> Option<Vec<Object>> {
    let index = page.checked_sub(1)?;
    let target = pages.get(index)?;
    Some(vec![
        Object::Reference(page_ids[index]),
        "FitH".into(),
        mm_to_pt(target.height - y).into(),
    ])
}

/// PDF text string: plain literal for ASCII, UTF-16BE with a BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in s.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn info_dictionary(meta: &Metadata, profile: ArchivalProfile) -> Dictionary {
    let mut info = Dictionary::new();
    let fields = [
        ("Title", &meta.title),
        ("Author", &meta.author),
        ("Subject", &meta.subject),
        ("Keywords", &meta.keywords),
        ("Creator", &meta.creator),
    ];
    for (key, value) in fields {
        if let Some(v) = value {
            info.set(key, text_string(v));
        }
    }
    info.set("Producer", text_string(concat!("flowpdf ", env!("CARGO_PKG_VERSION"))));
    if profile == ArchivalProfile::PdfX1a {
        info.set("GTS_PDFXVersion", text_string("PDF/X-1:2001"));
        info.set("GTS_PDFXConformance", text_string("PDF/X-1a:2001"));
        info.set("Trapped", "False");
    }
    info
}

// ---------------------------------------------------------------------------
// Outlines
// ---------------------------------------------------------------------------

struct OutlineNode {
    id: ObjectId,
    entry: usize,
    children: Vec<usize>,
}

/// State shared by every level of the outline tree.
struct OutlineCtx<'a> {
    nodes: &'a [OutlineNode],
    entries: &'a [&'a OutlineEntry],
    pages: &'a [Page],
    page_ids: &'a [ObjectId],
}

impl OutlineCtx<'_> {
    fn write_level(&self, doc: &mut Document, items: &[usize], parent: ObjectId) {
        for (i, &n) in items.iter().enumerate() {
            let node = &self.nodes[n];
            let entry = self.entries[node.entry];
            let mut dict = dictionary! {
                "Title" => text_string(&entry.title),
                "Parent" => parent,
            };
            if let Some(dest) = destination(self.pages, self.page_ids, entry.page, entry.y) {
                dict.set("Dest", dest);
            }
            if i > 0 {
                dict.set("Prev", self.nodes[items[i - 1]].id);
            }
            if let Some(&next) = items.get(i + 1) {
                dict.set("Next", self.nodes[next].id);
            }
            if let (Some(&first), Some(&last)) = (node.children.first(), node.children.last()) {
                dict.set("First", self.nodes[first].id);
                dict.set("Last", self.nodes[last].id);
                dict.set("Count", node.children.len() as i64);
                self.write_level(doc, &node.children, node.id);
            }
            doc.objects.insert(node.id, Object::Dictionary(dict));
        }
    }
}

fn write_outlines(
    doc: &mut Document,
    input: &WriterInput,
    page_ids: &[ObjectId],
) -> Option<ObjectId> {
    let entries: Vec<&OutlineEntry> = input
        .outlines
        .iter()
        .filter(|e| e.page >= 1 && e.page <= page_ids.len())
        .collect();
    if entries.is_empty() {
        return None;
    }

    // Flat nodes with a parent stack; a deeper level nests under the last
    // shallower entry.
    let mut nodes: Vec<OutlineNode> = Vec::with_capacity(entries.len());
    let mut roots: Vec<usize> = Vec::new();
    let mut stack: Vec<(u8, usize)> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        while stack.last().is_some_and(|(level, _)| *level >= entry.level) {
            stack.pop();
        }
        let node = nodes.len();
        nodes.push(OutlineNode {
            id: doc.new_object_id(),
            entry: i,
            children: Vec::new(),
        });
        match stack.last() {
            Some(&(_, parent)) => nodes[parent].children.push(node),
            None => roots.push(node),
        }
        stack.push((entry.level, node));
    }

    let root_id = doc.new_object_id();
    let first = nodes[roots[0]].id;
    let last = nodes[roots[roots.len() - 1]].id;
    doc.objects.insert(
        root_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => first,
            "Last" => last,
            "Count" => entries.len() as i64,
        }),
    );

    let ctx = OutlineCtx {
        nodes: &nodes,
        entries: &entries,
        pages: input.pages,
        page_ids,
    };
    ctx.write_level(doc, &roots, root_id);
    Some(root_id)
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

fn write_image(doc: &mut Document, image: &ImageData) -> ObjectId {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(image.width),
        "Height" => i64::from(image.height),
        "ColorSpace" => image.color_space.pdf_name(),
        "BitsPerComponent" => 8,
        "Filter" => image.filter.pdf_name(),
    };
    if let Some(mask) = &image.soft_mask {
        let mask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width),
                "Height" => i64::from(image.height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            mask.clone(),
        ));
        dict.set("SMask", mask_id);
    }
    doc.add_object(Stream::new(dict, image.data.clone()))
}

// ---------------------------------------------------------------------------
// Fonts
// ---------------------------------------------------------------------------

fn write_font(doc: &mut Document, entry: &FontEntry, compress: bool) -> Result<ObjectId> {
    match entry.kind {
        FontKind::Core => {
            let mut dict = dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => entry.metrics.postscript_name.as_str(),
            };
            if !entry.symbolic {
                dict.set("Encoding", "WinAnsiEncoding");
            }
            Ok(doc.add_object(dict))
        }
        FontKind::TrueType { unicode: true } => write_cid_font(doc, entry, compress),
        FontKind::TrueType { unicode: false } => write_simple_truetype(doc, entry, compress),
    }
}

/// Six upper-case letters naming a subset, derived from the glyphs it holds.
pub fn subset_tag(glyphs: &BTreeSet<u16>) -> String {
    let mut hasher = Sha256::new();
    for g in glyphs {
        hasher.update(g.to_be_bytes());
    }
    hasher.finalize().iter().take(6).map(|b| char::from(b'A' + b % 26)).collect()
}

fn font_program(
    doc: &mut Document,
    entry: &FontEntry,
    glyphs: &BTreeSet<u16>,
    compress: bool,
) -> Result<(String, ObjectId)> {
    let data = entry
        .data
        .as_ref()
        .ok_or(EngineError::InvalidState("embedded font has no program data"))?;
    let ps = entry.metrics.postscript_name.replace(' ', "");
    let (name, program) = match entry.embedding() {
        Embedding::Subset => match subset_font(data, glyphs) {
            Ok(bytes) => (format!("{}+{ps}", subset_tag(glyphs)), bytes),
            Err(e) => {
                log::warn!("subsetting '{}' failed ({e}); embedding the whole font", entry.family);
                (ps, data.to_vec())
            }
        },
        Embedding::Whole | Embedding::None => (ps, data.to_vec()),
    };
    let length1 = program.len() as i64;
    let stream = if compress {
        let dict = dictionary! { "Length1" => length1, "Filter" => "FlateDecode" };
        Stream::new(dict, deflate(&program))
    } else {
        Stream::new(dictionary! { "Length1" => length1 }, program)
    };
    Ok((name, doc.add_object(stream)))
}

fn font_descriptor(entry: &FontEntry, name: &str, file_id: ObjectId) -> Dictionary {
    let m = &entry.metrics;
    let bbox: Vec<Object> = m.bbox.iter().map(|v| Object::Integer(i64::from(*v))).collect();
    dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => name,
        "Flags" => i64::from(m.flags),
        "FontBBox" => bbox,
        "ItalicAngle" => m.italic_angle,
        "Ascent" => i64::from(m.ascent),
        "Descent" => i64::from(m.descent),
        "CapHeight" => i64::from(m.cap_height),
        "StemV" => i64::from(m.stem_v),
        "MissingWidth" => i64::from(m.missing_width.unwrap_or(FALLBACK_MISSING_WIDTH)),
        "FontFile2" => file_id,
    }
}

/// Glyph id → (codepoint, advance) for every drawn character the face maps.
fn used_glyphs(entry: &FontEntry) -> BTreeMap<u16, (u32, u16)> {
    let m = &entry.metrics;
    let missing = m.missing_width.unwrap_or(FALLBACK_MISSING_WIDTH);
    entry
        .used
        .iter()
        .filter_map(|cp| {
            let gid = *m.glyph_ids.get(cp)?;
            Some((gid, (*cp, m.widths.get(cp).copied().unwrap_or(missing))))
        })
        .collect()
}

/// `W` array: runs of consecutive glyph ids share one width list.
pub fn cid_widths(glyphs: &BTreeMap<u16, (u32, u16)>) -> Vec<Object> {
    let mut out = Vec::new();
    let mut run: Option<(u16, Vec<Object>)> = None;
    let mut prev: Option<u16> = None;
    for (&gid, &(_, width)) in glyphs {
        let contiguous = prev.is_some_and(|p| p + 1 == gid);
        match (&mut run, contiguous) {
            (Some((_, widths)), true) => widths.push(Object::Integer(i64::from(width))),
            _ => {
                if let Some((start, widths)) = run.take() {
                    out.push(Object::Integer(i64::from(start)));
                    out.push(Object::Array(widths));
                }
                run = Some((gid, vec![Object::Integer(i64::from(width))]));
            }
        }
        prev = Some(gid);
    }
    if let Some((start, widths)) = run {
        out.push(Object::Integer(i64::from(start)));
        out.push(Object::Array(widths));
    }
    out
}

/// ToUnicode CMap mapping 2-byte glyph codes back to text.
pub fn to_unicode_cmap(glyphs: &BTreeMap<u16, (u32, u16)>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let pairs: Vec<(u16, u32)> = glyphs.iter().map(|(gid, (cp, _))| (*gid, *cp)).collect();
    for chunk in pairs.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for &(gid, cp) in chunk {
            let mut units = [0u16; 2];
            let text: String = char::from_u32(cp)
                .map(|c| c.encode_utf16(&mut units).iter().map(|u| format!("{u:04X}")).collect())
                .unwrap_or_else(|| "FFFD".to_string());
            cmap.push_str(&format!("<{gid:04X}> <{text}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

fn write_cid_font(doc: &mut Document, entry: &FontEntry, compress: bool) -> Result<ObjectId> {
    let glyphs = used_glyphs(entry);
    let mut keep: BTreeSet<u16> = glyphs.keys().copied().collect();
    keep.insert(0);
    let (name, file_id) = font_program(doc, entry, &keep, compress)?;
    let descriptor_id = doc.add_object(font_descriptor(entry, &name, file_id));

    let cmap = to_unicode_cmap(&glyphs).into_bytes();
    let to_unicode = if compress {
        Stream::new(dictionary! { "Filter" => "FlateDecode" }, deflate(&cmap))
    } else {
        Stream::new(dictionary! {}, cmap)
    };
    let to_unicode_id = doc.add_object(to_unicode);

    let descendant_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => name.as_str(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => i64::from(entry.metrics.missing_width.unwrap_or(FALLBACK_MISSING_WIDTH)),
        "W" => cid_widths(&glyphs),
        "CIDToGIDMap" => "Identity",
    });

    log::debug!("embedding '{name}' as Type0 with {} glyph(s)", glyphs.len());
    Ok(doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => name.as_str(),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![descendant_id.into()],
        "ToUnicode" => to_unicode_id,
    }))
}

fn write_simple_truetype(
    doc: &mut Document,
    entry: &FontEntry,
    compress: bool,
) -> Result<ObjectId> {
    let m = &entry.metrics;
    let missing = m.missing_width.unwrap_or(FALLBACK_MISSING_WIDTH);
    let mut keep: BTreeSet<u16> = BTreeSet::from([0]);
    let widths: Vec<Object> = (32u8..=255)
        .map(|b| {
            let cp = winansi_char(b) as u32;
            if entry.used.contains(&cp) {
                if let Some(gid) = m.glyph_ids.get(&cp) {
                    keep.insert(*gid);
                }
            }
            Object::Integer(i64::from(m.widths.get(&cp).copied().unwrap_or(missing)))
        })
        .collect();
    let (name, file_id) = font_program(doc, entry, &keep, compress)?;
    let descriptor_id = doc.add_object(font_descriptor(entry, &name, file_id));
    let mut dict = dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => name.as_str(),
        "FirstChar" => 32,
        "LastChar" => 255,
        "Widths" => widths,
        "FontDescriptor" => descriptor_id,
    };
    if !entry.symbolic {
        dict.set("Encoding", "WinAnsiEncoding");
    }
    Ok(doc.add_object(dict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{FontOptions, FontStyle};
    use crate::layout_config::LayoutConfig;
    use crate::pagination::{LinkAnnotation, PageController};

    fn one_page() -> (Vec<Page>, FontManager) {
        let mut fonts = FontManager::new(FontOptions::default());
        let r = fonts.load_font("helvetica", FontStyle::empty()).unwrap();
        let mut pc = PageController::new(&LayoutConfig::default());
        pc.open_page(None);
        let page = pc.page_mut().unwrap();
        page.content.op("BT /F1 12.000 Tf 10.000 10.000 Td (Hi) Tj ET");
        page.resources.fonts.insert(r.id);
        (pc.pages().to_vec(), fonts)
    }

    fn registries() -> (ImageRegistry, SpotColors, Metadata) {
        (ImageRegistry::new(), SpotColors::default(), Metadata::default())
    }

    fn input<'a>(
        pages: &'a [Page],
        fonts: &'a FontManager,
        images: &'a ImageRegistry,
        spots: &'a SpotColors,
        outlines: &'a [OutlineEntry],
        meta: &'a Metadata,
    ) -> WriterInput<'a> {
        WriterInput {
            pages,
            fonts,
            images,
            alpha_states: &[],
            spot_colors: spots,
            outlines,
            metadata: meta,
            profile: ArchivalProfile::None,
            compress: false,
            marked: false,
        }
    }

    #[test]
    fn writes_a_loadable_document() {
        let (pages, fonts) = one_page();
        let (images, spots, meta) = registries();
        let bytes = write_pdf(&input(&pages, &fonts, &images, &spots, &[], &meta)).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let base_fonts: Vec<Vec<u8>> = doc
            .objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .filter_map(|d| d.get(b"BaseFont").and_then(|b| b.as_name()).ok())
            .map(<[u8]>::to_vec)
            .collect();
        assert_eq!(base_fonts, vec![b"Helvetica".to_vec()]);
    }

    #[test]
    fn output_is_deterministic() {
        let (pages, fonts) = one_page();
        let (images, spots, meta) = registries();
        let a = write_pdf(&input(&pages, &fonts, &images, &spots, &[], &meta)).unwrap();
        let b = write_pdf(&input(&pages, &fonts, &images, &spots, &[], &meta)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn links_spots_and_outlines_are_written() {
        let (mut pages, fonts) = one_page();
        pages[0].links.push(LinkAnnotation {
            rect: [0.0, 0.0, 10.0, 10.0],
            target: Link::Uri("https://example.com".into()),
        });
        pages[0].resources.spot_colors.insert(0);
        let mut spots = SpotColors::default();
        spots.add("PANTONE 300 C", 100, 44, 0, 0);
        let outlines = vec![
            OutlineEntry { title: "Intro".into(), level: 0, page: 1, y: 10.0 },
            OutlineEntry { title: "Detail".into(), level: 1, page: 1, y: 50.0 },
        ];
        let (images, meta) = (ImageRegistry::new(), Metadata::default());
        let bytes = write_pdf(&input(&pages, &fonts, &images, &spots, &outlines, &meta)).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Subtype/Link") || text.contains("/Subtype /Link"));
        assert!(text.contains("Separation"));
        assert!(text.contains("(Detail)"));
        assert!(text.contains("UseOutlines"));
    }

    #[test]
    fn widths_group_consecutive_glyphs() {
        let glyphs = BTreeMap::from([(3u16, (65u32, 600u16)), (4, (66, 610)), (9, (67, 500))]);
        let w = cid_widths(&glyphs);
        assert_eq!(
            w,
            vec![
                Object::Integer(3),
                Object::Array(vec![Object::Integer(600), Object::Integer(610)]),
                Object::Integer(9),
                Object::Array(vec![Object::Integer(500)]),
            ]
        );
    }

    #[test]
    fn to_unicode_maps_supplementary_planes_to_surrogates() {
        let glyphs = BTreeMap::from([(5u16, (0x1F600u32, 1000u16)), (6, (0x41, 500))]);
        let cmap = to_unicode_cmap(&glyphs);
        assert!(cmap.contains("<0005> <D83DDE00>"));
        assert!(cmap.contains("<0006> <0041>"));
        assert!(cmap.contains("2 beginbfchar"));
    }

    #[test]
    fn subset_tags_are_stable_capitals() {
        let glyphs = BTreeSet::from([0u16, 36, 72]);
        let tag = subset_tag(&glyphs);
        assert_eq!(tag.len(), 6);
        assert!(tag.chars().all(|c| c.is_ascii_uppercase()));
        assert_eq!(tag, subset_tag(&glyphs));
    }

    #[test]
    fn empty_document_is_rejected() {
        let fonts = FontManager::new(FontOptions::default());
        let (images, spots, meta) = registries();
        let err = write_pdf(&input(&[], &fonts, &images, &spots, &[], &meta)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }
}

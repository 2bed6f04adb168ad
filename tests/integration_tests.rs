//! Integration tests for the flowpdf engine.
//!
//! These tests validate:
//! - PDF output exists, loads back and is deterministic
//! - Cell alignment and flowing-block line breaks land where expected
//! - Page breaks, columns and header/footer replay
//! - Recovered conditions surface as warnings instead of errors
//! - Embedded TrueType faces carry widths, ToUnicode maps and subsets for
//!   the glyphs actually drawn

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use flowpdf::color::ColorValue;
use flowpdf::content::num;
use flowpdf::document::{AlphaMode, BlockOptions, CellLn, CellOptions, Document};
use flowpdf::error::{EngineError, Warning};
use flowpdf::fonts::{FontManager, FontOptions, FontRegistration, FontStyle};
use flowpdf::layout::{Align, LineHeight};
use flowpdf::layout_config::{ArchivalProfile, LayoutConfig};
use flowpdf::metrics::{char_width, SOFT_HYPHEN};
use flowpdf::pagination::Link;
use flowpdf::pipeline::{generate_pdf, generate_pdf_with_warnings, parse_events, Event};
use flowpdf::units::{mm_to_pt, PageOrientation};
use sha2::{Digest, Sha256};

// =====================================================================
// Helpers
// =====================================================================

fn assert_valid_pdf(bytes: &[u8]) -> lopdf::Document {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
    lopdf::Document::load_mem(bytes).expect("output should load back")
}

fn page_text(doc: &Document, page: usize) -> String {
    String::from_utf8_lossy(doc.page_content(page).expect("page exists")).into_owned()
}

fn uncompressed() -> LayoutConfig {
    LayoutConfig {
        compress: false,
        ..LayoutConfig::default()
    }
}

fn base_fonts(pdf: &lopdf::Document) -> Vec<String> {
    pdf.objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .filter(|d| d.get(b"Type").and_then(|t| t.as_name()).ok() == Some(b"Font".as_slice()))
        .filter_map(|d| d.get(b"BaseFont").and_then(|b| b.as_name()).ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .collect()
}

// =====================================================================
// Output
// =====================================================================

#[test]
fn minimal_event_stream_produces_pdf() {
    let events = parse_events(r#"[{"op": "Cell", "w": 40, "h": 10, "text": "Hello"}]"#).unwrap();
    let bytes = generate_pdf(&events, &LayoutConfig::default()).unwrap();
    let pdf = assert_valid_pdf(&bytes);
    assert_eq!(pdf.get_pages().len(), 1);
    assert!(base_fonts(&pdf).contains(&"Helvetica".to_string()));
}

#[test]
fn pdf_output_is_deterministic() {
    let events = parse_events(
        r#"[
            {"op": "SetFont", "family": "times", "style": "BI", "size": 14},
            {"op": "BeginBlock", "width": 60, "align": "Justify"},
            {"op": "Write", "text": "Deterministic output is a property of the whole fold, not of a single call."},
            {"op": "EndBlock"},
            {"op": "Bookmark", "title": "End"}
        ]"#,
    )
    .unwrap();
    let a = generate_pdf(&events, &LayoutConfig::default()).unwrap();
    let b = generate_pdf(&events, &LayoutConfig::default()).unwrap();
    assert_eq!(Sha256::digest(&a), Sha256::digest(&b));
}

#[test]
fn landscape_pages_swap_media_box() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    doc.add_page(Some(PageOrientation::Landscape)).unwrap();
    let bytes = doc.output().unwrap();
    let pdf = assert_valid_pdf(&bytes);
    let (_, page_id) = pdf.get_pages().into_iter().next().unwrap();
    let page = pdf.get_dictionary(page_id).unwrap();
    let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
    let width = media[2].as_float().unwrap();
    assert!((width - mm_to_pt(297.0)).abs() < 0.01);
}

// =====================================================================
// Cells and flowing blocks
// =====================================================================

#[test]
fn centered_cell_offsets_text_by_half_the_free_width() {
    let mut doc = Document::new(uncompressed()).unwrap();
    doc.set_font("helvetica", "", Some(12.0)).unwrap();
    let width = doc.string_width("Hello");
    let options = CellOptions {
        align: Align::Center,
        ..CellOptions::default()
    };
    doc.cell(100.0, 10.0, "Hello", &options).unwrap();
    let expected = mm_to_pt(10.0 + (100.0 - width) / 2.0);
    let content = page_text(&doc, 1);
    assert!(
        content.contains(&format!("{} ", num(expected))),
        "expected x {} in {content}",
        num(expected)
    );
    assert!(content.contains("(Hello) Tj"));
}

#[test]
fn quick_brown_fox_breaks_at_word_boundary() {
    let mut doc = Document::new(uncompressed()).unwrap();
    doc.set_font("helvetica", "", Some(10.0)).unwrap();
    doc.new_flowing_block(BlockOptions {
        width: Some(30.0),
        ..BlockOptions::default()
    })
    .unwrap();
    doc.write("The quick brown fox jumps").unwrap();
    doc.finish_flowing_block().unwrap();
    let content = page_text(&doc, 1);
    assert!(content.contains("(The quick brown) Tj"));
    assert!(content.contains("(fox jumps) Tj"));
    assert!(doc.warnings().is_empty());
}

#[test]
fn multi_cell_stacks_wrapped_lines() {
    let mut doc = Document::new(uncompressed()).unwrap();
    doc.set_font("courier", "", Some(10.0)).unwrap();
    doc.multi_cell(40.0, 6.0, "alpha beta gamma delta epsilon", "1", Align::Left, false)
        .unwrap();
    // Courier 10pt is 2.117 mm per character: 18 characters per 40 mm line.
    assert_eq!(doc.y(), 10.0 + 2.0 * 6.0);
    let content = page_text(&doc, 1);
    assert!(content.contains("(alpha beta gamma) Tj"));
    assert!(content.contains("(delta epsilon) Tj"));
}

#[test]
fn overlong_word_is_reported() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    doc.new_flowing_block(BlockOptions {
        width: Some(10.0),
        ..BlockOptions::default()
    })
    .unwrap();
    doc.write("Donaudampfschifffahrtsgesellschaft").unwrap();
    doc.finish_flowing_block().unwrap();
    assert!(doc
        .warnings()
        .iter()
        .any(|w| matches!(w, Warning::WordTooWideForCell { .. })));
}

// =====================================================================
// Fonts
// =====================================================================

#[test]
fn serif_resolves_to_times_roman() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    doc.set_font("serif", "", None).unwrap();
    doc.cell(0.0, 10.0, "Serif", &CellOptions::default()).unwrap();
    let pdf = assert_valid_pdf(&doc.output().unwrap());
    assert!(base_fonts(&pdf).contains(&"Times-Roman".to_string()));
}

#[test]
fn unknown_font_is_fatal() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    let err = doc.set_font("no-such-family", "", None).unwrap_err();
    assert!(matches!(err, EngineError::FontNotFound { .. }));

    let config = LayoutConfig {
        default_font: "no-such-family".to_string(),
        ..LayoutConfig::default()
    };
    assert!(matches!(Document::new(config), Err(EngineError::FontNotFound { .. })));
}

// =====================================================================
// Pagination
// =====================================================================

#[test]
fn exact_fit_does_not_break_but_epsilon_does() {
    let mut doc = Document::new(uncompressed()).unwrap();
    let below = CellOptions {
        ln: CellLn::Below,
        ..CellOptions::default()
    };
    doc.cell(10.0, 5.0, "", &below).unwrap();
    let room = 287.0 - doc.y();
    doc.cell(10.0, room, "", &below).unwrap();
    assert_eq!(doc.page_count(), 1);

    doc.set_xy(10.0, 15.0);
    doc.cell(10.0, room + 0.01, "", &below).unwrap();
    assert_eq!(doc.page_count(), 2);
}

#[test]
fn long_block_flows_across_pages() {
    let mut doc = Document::new(uncompressed()).unwrap();
    doc.new_flowing_block(BlockOptions {
        line_height: Some(LineHeight::Fixed(10.0)),
        ..BlockOptions::default()
    })
    .unwrap();
    for i in 0..60 {
        doc.write(&format!("Line {i}\n")).unwrap();
    }
    doc.finish_flowing_block().unwrap();
    // 27 lines of 10 mm fit between the 10 mm margins of an A4 page.
    assert_eq!(doc.page_count(), 3);
    assert!(page_text(&doc, 2).contains("(Line 27) Tj"));
}

#[test]
fn columns_fill_left_to_right_before_a_new_page() {
    let mut doc = Document::new(uncompressed()).unwrap();
    doc.set_columns(2, 10.0).unwrap();
    doc.new_flowing_block(BlockOptions {
        line_height: Some(LineHeight::Fixed(100.0)),
        ..BlockOptions::default()
    })
    .unwrap();
    doc.write("one\ntwo\nthree\nfour\nfive").unwrap();
    doc.finish_flowing_block().unwrap();
    assert_eq!(doc.page_count(), 2);
    let first = page_text(&doc, 1);
    // Column two starts at 110 mm.
    assert!(first.contains(&format!("{} ", num(mm_to_pt(110.0)))));
    assert!(first.contains("(four) Tj"));
    assert!(page_text(&doc, 2).contains("(five) Tj"));
}

#[test]
fn header_and_footer_replay_on_every_page() {
    let header = r#"[{"op": "Cell", "w": 0, "h": 5, "text": "Report", "align": "Right"}]"#;
    let footer = r#"[{"op": "Cell", "w": 0, "h": 5, "text": "{page}", "align": "Center"}]"#;
    let events = vec![
        Event::SetHeader {
            events: parse_events(header).unwrap(),
        },
        Event::SetFooter {
            events: parse_events(footer).unwrap(),
        },
        Event::AddPage { orientation: None },
        Event::AddPage { orientation: None },
        Event::AddPage { orientation: None },
    ];
    let mut doc = flowpdf::pipeline::generate(&events, &uncompressed()).unwrap();
    doc.output().unwrap();
    assert_eq!(doc.page_count(), 3);
    for n in 1..=3 {
        let content = page_text(&doc, n);
        assert!(content.contains("(Report) Tj"));
        assert!(content.contains(&format!("({n}) Tj")));
    }
}

// =====================================================================
// Recovered conditions
// =====================================================================

#[test]
fn missing_image_falls_back_to_placeholder() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    let (w, h) = doc
        .image("/definitely/not/here.png", Some(20.0), Some(20.0), Some(30.0), None, None)
        .unwrap();
    assert_eq!(w, 30.0);
    assert_eq!(h, 30.0);
    assert!(matches!(doc.warnings()[0], Warning::ImageNotFound { .. }));
    let pdf = assert_valid_pdf(&doc.output().unwrap());
    assert!(pdf
        .objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .any(|s| {
            s.dict.get(b"Subtype").and_then(|t| t.as_name()).ok() == Some(b"Image".as_slice())
        }));
}

#[test]
fn archival_profile_refuses_transparency() {
    let config = LayoutConfig {
        archival_profile: ArchivalProfile::PdfA1b,
        ..LayoutConfig::default()
    };
    let events = parse_events(
        r#"[
            {"op": "SetAlpha", "alpha": 0.4, "mode": "F"},
            {"op": "SetFillColor", "color": {"Rgba": [255, 0, 0, 50]}},
            {"op": "Rect", "x": 10, "y": 10, "w": 50, "h": 20, "style": "F"}
        ]"#,
    )
    .unwrap();
    let (bytes, warnings) = generate_pdf_with_warnings(&events, &config).unwrap();
    assert!(warnings.iter().all(|w| matches!(w, Warning::ComplianceViolation(_))));
    assert!(warnings.len() >= 2);
    let pdf = assert_valid_pdf(&bytes);
    assert!(!pdf
        .objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .any(|d| d.get(b"Type").and_then(|t| t.as_name()).ok() == Some(b"ExtGState".as_slice())));
}

#[test]
fn alpha_outside_archival_profile_uses_graphics_state() {
    let mut doc = Document::new(uncompressed()).unwrap();
    doc.set_fill_color(ColorValue::Rgb(0, 0, 255)).unwrap();
    doc.set_alpha(0.5, AlphaMode::Fill).unwrap();
    doc.rect(10.0, 10.0, 20.0, 20.0, flowpdf::content::PaintMode::Fill).unwrap();
    assert!(page_text(&doc, 1).contains("/GS1 gs"));
    let pdf = assert_valid_pdf(&doc.output().unwrap());
    let state = pdf
        .objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .find(|d| d.get(b"Type").and_then(|t| t.as_name()).ok() == Some(b"ExtGState".as_slice()))
        .expect("graphics state object");
    assert_eq!(state.get(b"ca").unwrap().as_float().unwrap(), 0.5);
    assert_eq!(state.get(b"CA").unwrap().as_float().unwrap(), 1.0);
}

// =====================================================================
// Navigation
// =====================================================================

#[test]
fn links_and_bookmarks_are_written() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    doc.bookmark("Intro", 0, None).unwrap();
    let options = CellOptions {
        link: Some(Link::Uri("https://example.org".to_string())),
        ..CellOptions::default()
    };
    doc.cell(50.0, 10.0, "Visit", &options).unwrap();
    doc.add_page(None).unwrap();
    doc.bookmark("Details", 1, None).unwrap();
    doc.link(10.0, 10.0, 20.0, 5.0, Link::Page { page: 1, y: 0.0 }).unwrap();
    assert_eq!(doc.outlines().len(), 2);

    let pdf = assert_valid_pdf(&doc.output().unwrap());
    let catalog = pdf.catalog().unwrap();
    assert!(catalog.get(b"Outlines").is_ok());
    let annotated = pdf
        .get_pages()
        .values()
        .filter(|id| pdf.get_dictionary(**id).map(|p| p.has(b"Annots")).unwrap_or(false))
        .count();
    assert_eq!(annotated, 2);
}

// =====================================================================
// TrueType fonts
// =====================================================================

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

fn registration(family: &str, file: &str, unicode: bool) -> FontRegistration {
    FontRegistration {
        family: family.to_string(),
        regular: Some(fixture(file)),
        bold: None,
        italic: None,
        bold_italic: None,
        unicode,
    }
}

fn with_font(family: &str, file: &str, unicode: bool) -> LayoutConfig {
    LayoutConfig {
        fonts: vec![registration(family, file, unicode)],
        ..uncompressed()
    }
}

fn font_dict<'a>(pdf: &'a lopdf::Document, subtype: &[u8]) -> &'a lopdf::Dictionary {
    pdf.objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .find(|d| d.get(b"Subtype").and_then(|t| t.as_name()).ok() == Some(subtype))
        .expect("font dictionary of the requested subtype")
}

/// CID → width from a descendant font's `W` array.
fn cid_widths(descendant: &lopdf::Dictionary) -> BTreeMap<i64, i64> {
    let w = descendant.get(b"W").unwrap().as_array().unwrap();
    let mut out = BTreeMap::new();
    for pair in w.chunks(2) {
        let start = pair[0].as_i64().unwrap();
        for (i, width) in pair[1].as_array().unwrap().iter().enumerate() {
            out.insert(start + i as i64, width.as_i64().unwrap());
        }
    }
    out
}

fn to_unicode(pdf: &lopdf::Document) -> String {
    let type0 = font_dict(pdf, b"Type0");
    let id = type0.get(b"ToUnicode").unwrap().as_reference().unwrap();
    let stream = pdf.get_object(id).unwrap().as_stream().unwrap();
    String::from_utf8_lossy(&stream.content).into_owned()
}

fn embedded_program_length(pdf: &lopdf::Document) -> i64 {
    pdf.objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .find_map(|s| s.dict.get(b"Length1").and_then(|l| l.as_i64()).ok())
        .expect("embedded font program")
}

#[test]
fn unicode_face_embeds_widths_and_text_map_for_drawn_glyphs() {
    let mut doc = Document::new(with_font("Montserrat", "Montserrat-Regular.ttf", true)).unwrap();
    doc.set_font("Montserrat", "", Some(12.0)).unwrap();
    doc.cell(0.0, 10.0, "AVX", &CellOptions::default()).unwrap();
    assert!(page_text(&doc, 1).contains("<000101450153> Tj"));

    let pdf = assert_valid_pdf(&doc.output().unwrap());
    let widths = cid_widths(font_dict(&pdf, b"CIDFontType2"));
    assert_eq!(widths.get(&1), Some(&717));
    assert_eq!(widths.get(&0x145), Some(&698));
    assert_eq!(widths.get(&0x153), Some(&656));

    let cmap = to_unicode(&pdf);
    assert!(cmap.contains("<0001> <0041>"));
    assert!(cmap.contains("<0145> <0056>"));
    assert!(cmap.contains("<0153> <0058>"));

    let base_font = font_dict(&pdf, b"Type0").get(b"BaseFont").unwrap().as_name().unwrap();
    let base = String::from_utf8_lossy(base_font).into_owned();
    let (tag, name) = base.split_once('+').expect("subset tag");
    assert_eq!(tag.len(), 6);
    assert!(tag.chars().all(|c| c.is_ascii_uppercase()));
    assert!(name.contains("Montserrat"));
}

#[test]
fn subset_program_is_smaller_than_the_source_font() {
    let source_len = std::fs::metadata(fixture("Montserrat-Regular.ttf")).unwrap().len() as i64;
    let mut doc = Document::new(with_font("Montserrat", "Montserrat-Regular.ttf", true)).unwrap();
    doc.set_font("Montserrat", "", Some(12.0)).unwrap();
    doc.cell(0.0, 10.0, "Subset me", &CellOptions::default()).unwrap();
    let pdf = assert_valid_pdf(&doc.output().unwrap());
    let length = embedded_program_length(&pdf);
    assert!(length < source_len, "subset {length} bytes, source {source_len}");
}

#[test]
fn small_caps_embed_the_capital_glyphs_they_draw() {
    let mut doc = Document::new(with_font("Montserrat", "Montserrat-Regular.ttf", true)).unwrap();
    doc.set_font("Montserrat", "", Some(12.0)).unwrap();
    doc.set_small_caps(true);
    doc.new_flowing_block(BlockOptions::default()).unwrap();
    doc.write("xyz").unwrap();
    doc.finish_flowing_block().unwrap();
    assert!(page_text(&doc, 1).contains("<015301560163> Tj"));

    let pdf = assert_valid_pdf(&doc.output().unwrap());
    let widths = cid_widths(font_dict(&pdf, b"CIDFontType2"));
    for (gid, width) in [(0x153, 656), (0x156, 635), (0x163, 651)] {
        assert_eq!(widths.get(&gid), Some(&width), "glyph {gid:#x}");
    }
    let cmap = to_unicode(&pdf);
    assert!(cmap.contains("<0153> <0058>"));
    assert!(cmap.contains("<0156> <0059>"));
    assert!(cmap.contains("<0163> <005A>"));
}

#[test]
fn latin_truetype_face_is_nonsymbolic() {
    let mut fonts = FontManager::new(FontOptions::default());
    fonts.register(&registration("DejaVu Serif", "DejaVuSerif.ttf", true));
    let r = fonts.load_font("dejavu serif", FontStyle::empty()).unwrap();
    let entry = fonts.entry(r.id);
    assert!(!entry.symbolic);
    assert_eq!(entry.metrics.flags & 4, 0);
    assert_eq!(entry.metrics.flags & 32, 32);
    assert!(entry.metrics.widths.contains_key(&(SOFT_HYPHEN as u32)));
    assert_eq!(char_width(entry, SOFT_HYPHEN), 0.0);
}

#[test]
fn single_byte_truetype_face_declares_winansi() {
    let mut doc = Document::new(with_font("Montserrat", "Montserrat-Regular.ttf", false)).unwrap();
    doc.set_font("Montserrat", "", Some(12.0)).unwrap();
    doc.cell(0.0, 10.0, "Hello", &CellOptions::default()).unwrap();
    assert!(page_text(&doc, 1).contains("(Hello) Tj"));

    let pdf = assert_valid_pdf(&doc.output().unwrap());
    let font = font_dict(&pdf, b"TrueType");
    assert_eq!(font.get(b"Encoding").unwrap().as_name().unwrap(), b"WinAnsiEncoding");
    let descriptor_id = font.get(b"FontDescriptor").unwrap().as_reference().unwrap();
    let descriptor = pdf.get_dictionary(descriptor_id).unwrap();
    assert_eq!(descriptor.get(b"Flags").unwrap().as_i64().unwrap() & 4, 0);
}

#[test]
fn kern_pairs_become_tj_displacements() {
    let mut fonts = FontManager::new(FontOptions::default());
    fonts.register(&registration("DejaVu Serif", "DejaVuSerif.ttf", true));
    let r = fonts.load_font("dejavuserif", FontStyle::empty()).unwrap();
    assert_eq!(fonts.entry(r.id).metrics.kern('A' as u32, 'V' as u32), -50);

    let mut doc = Document::new(with_font("DejaVu Serif", "DejaVuSerif.ttf", true)).unwrap();
    doc.set_font("DejaVu Serif", "", Some(12.0)).unwrap();
    let kerned = doc.string_width("AV");
    assert!(kerned < doc.string_width("A") + doc.string_width("V"));
    doc.cell(0.0, 10.0, "AV", &CellOptions::default()).unwrap();
    assert!(page_text(&doc, 1).contains("[<0024>50.000<0039>] TJ"));
}

#[test]
fn supplementary_plane_face_embeds_whole() {
    let source_len = std::fs::metadata(fixture("DejaVuSerif.ttf")).unwrap().len() as i64;
    let mut doc = Document::new(with_font("DejaVu Serif", "DejaVuSerif.ttf", true)).unwrap();
    doc.set_font("DejaVu Serif", "", Some(12.0)).unwrap();
    doc.cell(0.0, 10.0, "Whole", &CellOptions::default()).unwrap();
    let pdf = assert_valid_pdf(&doc.output().unwrap());
    assert_eq!(embedded_program_length(&pdf), source_len);
    let base = font_dict(&pdf, b"Type0").get(b"BaseFont").unwrap().as_name().unwrap();
    assert!(!base.contains(&b'+'));
}

#[test]
fn metrics_cache_is_reused_for_the_same_font_file() {
    let dir = tempfile::tempdir().unwrap();
    let options = FontOptions {
        cache_dir: Some(dir.path().to_path_buf()),
        ..FontOptions::default()
    };
    let load = || {
        let mut fonts = FontManager::new(options.clone());
        fonts.register(&registration("Montserrat", "Montserrat-Regular.ttf", true));
        let r = fonts.load_font("montserrat", FontStyle::empty()).unwrap();
        (*fonts.entry(r.id).metrics).clone()
    };
    let parsed = load();
    assert!(dir.path().join("montserrat.mtx.json").exists());
    assert_eq!(load(), parsed);
}

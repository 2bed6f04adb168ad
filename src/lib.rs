//! # flowpdf – fragment-to-PDF layout and rendering engine
//!
//! Styled text and image fragments go in, paginated PDF bytes come out. The
//! stages are:
//!
//! 1. **Measure** – per-glyph advances from core or TrueType metrics ([`metrics`], [`fonts`])
//! 2. **Lay out** – incremental line breaking and justification ([`layout`], [`justify`])
//! 3. **Paginate** – margins, columns and break decisions ([`pagination`])
//! 4. **Render** – cells, borders and text as content-stream operators ([`render`])
//! 5. **Write** – page tree, fonts, images and outlines via lopdf ([`writer`])
//!
//! [`document::Document`] is the drawing API; [`pipeline`] drives it from a
//! serialised event stream.

pub mod color;
pub mod content;
pub mod core_fonts;
pub mod document;
pub mod error;
pub mod font_cache;
pub mod fonts;
pub mod images;
pub mod justify;
pub mod layout;
pub mod layout_config;
pub mod metrics;
pub mod object_buffer;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod subset;
pub mod units;
pub mod writer;

// Re-exports for convenience
pub use document::Document;
pub use error::{EngineError, Result, Warning};
pub use layout_config::LayoutConfig;
pub use pipeline::{generate_pdf, generate_pdf_from_json, Event};

//! Image registry – loads image sources once, decodes them into PDF-ready
//! pixel data, and hands out stable indices for `/I{n}` XObject names.
//!
//! Sources are either file paths or `data:<mime>;base64,<data>` URIs.
//! Anything that cannot be read or decoded is replaced by a small grey
//! placeholder and reported as a [`Warning`]; image problems never abort a
//! build.

use std::collections::HashMap;
use std::io::Write;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{ColorType, DynamicImage, GenericImageView};

use crate::error::Warning;

/// Pixels per inch assumed when an image is placed without explicit size.
pub const IMAGE_DPI: f32 = 96.0;

const PLACEHOLDER_KEY: &str = "\u{0}placeholder";
const PLACEHOLDER_SIZE: u32 = 8;
const PLACEHOLDER_GREY: u8 = 0xC0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageColorSpace {
    DeviceGray,
    DeviceRgb,
}

impl ImageColorSpace {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ImageColorSpace::DeviceGray => "DeviceGray",
            ImageColorSpace::DeviceRgb => "DeviceRGB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    /// JPEG bytes passed through unchanged.
    Dct,
    /// zlib-compressed raw samples.
    Flate,
}

impl ImageFilter {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ImageFilter::Dct => "DCTDecode",
            ImageFilter::Flate => "FlateDecode",
        }
    }
}

/// One image ready to become an XObject.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub color_space: ImageColorSpace,
    pub filter: ImageFilter,
    /// Encoded stream bytes (already filtered).
    pub data: Vec<u8>,
    /// Flate-compressed 8-bit alpha channel, when the source has one.
    pub soft_mask: Option<Vec<u8>>,
}

impl ImageData {
    /// Size in mm at [`IMAGE_DPI`].
    pub fn natural_size(&self) -> (f32, f32) {
        let mm = |px: u32| px as f32 / IMAGE_DPI * 25.4;
        (mm(self.width), mm(self.height))
    }

    /// Resolve a requested size, filling a missing side from the aspect
    /// ratio and both from [`ImageData::natural_size`] when neither is given.
    pub fn resolve_size(&self, width: Option<f32>, height: Option<f32>) -> (f32, f32) {
        let (nw, nh) = self.natural_size();
        let aspect = if nh > 0.0 { nw / nh } else { 1.0 };
        match (width.filter(|w| *w > 0.0), height.filter(|h| *h > 0.0)) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w / aspect),
            (None, Some(h)) => (h * aspect, h),
            (None, None) => (nw, nh),
        }
    }
}

#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: Vec<ImageData>,
    by_src: HashMap<String, usize>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&ImageData> {
        self.images.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ImageData)> {
        self.images.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Register `src` and return its index. A source registered before is
    /// not loaded again. Failures push a warning and return the placeholder.
    pub fn register(&mut self, src: &str, warnings: &mut Vec<Warning>) -> usize {
        if let Some(&index) = self.by_src.get(src) {
            return index;
        }
        match load(src) {
            Ok(image) => {
                log::debug!(
                    "image '{}' registered ({}x{} px)",
                    preview(src),
                    image.width,
                    image.height
                );
                self.insert(src, image)
            }
            Err(warning) => {
                log::warn!("{warning}; using placeholder");
                warnings.push(warning);
                let index = self.placeholder();
                self.by_src.insert(src.to_string(), index);
                index
            }
        }
    }

    fn insert(&mut self, key: &str, image: ImageData) -> usize {
        let index = self.images.len();
        self.images.push(image);
        self.by_src.insert(key.to_string(), index);
        index
    }

    fn placeholder(&mut self) -> usize {
        if let Some(&index) = self.by_src.get(PLACEHOLDER_KEY) {
            return index;
        }
        let pixels = vec![PLACEHOLDER_GREY; (PLACEHOLDER_SIZE * PLACEHOLDER_SIZE) as usize];
        let image = ImageData {
            width: PLACEHOLDER_SIZE,
            height: PLACEHOLDER_SIZE,
            color_space: ImageColorSpace::DeviceGray,
            filter: ImageFilter::Flate,
            data: deflate(&pixels),
            soft_mask: None,
        };
        self.insert(PLACEHOLDER_KEY, image)
    }
}

fn preview(src: &str) -> &str {
    match src.char_indices().nth(60) {
        Some((i, _)) => &src[..i],
        None => src,
    }
}

/// Parse a `data:<mime>;base64,<data>` URI into its decoded bytes. Returns
/// `None` when `src` is not a data URI.
pub fn parse_data_uri(src: &str) -> Option<Result<Vec<u8>, String>> {
    let rest = src.strip_prefix("data:")?;
    let Some((header, data)) = rest.split_once(',') else {
        return Some(Err("missing ',' between data URI header and payload".to_string()));
    };
    if !header.contains(";base64") {
        return Some(Err("only base64-encoded data URIs are supported".to_string()));
    }
    Some(BASE64_STD.decode(data.trim()).map_err(|e| format!("base64 decode error: {e}")))
}

fn load(src: &str) -> Result<ImageData, Warning> {
    let bytes = match parse_data_uri(src) {
        Some(decoded) => decoded.map_err(|reason| Warning::ImageDecodeFailure {
            src: preview(src).to_string(),
            reason,
        })?,
        None => std::fs::read(src).map_err(|_| Warning::ImageNotFound { src: src.to_string() })?,
    };
    decode(&bytes).map_err(|reason| Warning::ImageDecodeFailure {
        src: preview(src).to_string(),
        reason,
    })
}

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
}

/// Decode raw image bytes into stream data.
pub fn decode(bytes: &[u8]) -> Result<ImageData, String> {
    let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err("image has no pixels".to_string());
    }

    if is_jpeg(bytes) {
        let color_space = match img.color() {
            ColorType::L8 | ColorType::L16 => Some(ImageColorSpace::DeviceGray),
            ColorType::Rgb8 | ColorType::Rgb16 => Some(ImageColorSpace::DeviceRgb),
            _ => None,
        };
        if let Some(color_space) = color_space {
            return Ok(ImageData {
                width,
                height,
                color_space,
                filter: ImageFilter::Dct,
                data: bytes.to_vec(),
                soft_mask: None,
            });
        }
    }

    Ok(flate_image(&img))
}

fn flate_image(img: &DynamicImage) -> ImageData {
    let (width, height) = img.dimensions();
    let color = img.color();
    let gray = matches!(color, ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16);

    let soft_mask = color.has_alpha().then(|| {
        let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
        deflate(&alpha)
    });

    let (color_space, samples) = if gray {
        (ImageColorSpace::DeviceGray, img.to_luma8().into_raw())
    } else {
        (ImageColorSpace::DeviceRgb, img.to_rgb8().into_raw())
    };

    ImageData {
        width,
        height,
        color_space,
        filter: ImageFilter::Flate,
        data: deflate(&samples),
        soft_mask,
    }
}

pub(crate) fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(bytes);
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    /// 1×1 RGBA PNG.
    const PIXEL_PNG: &str = concat!(
        "data:image/png;base64,",
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg=="
    );

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn data_uri_png_with_alpha_gets_soft_mask() {
        let mut reg = ImageRegistry::new();
        let mut warnings = Vec::new();
        let i = reg.register(PIXEL_PNG, &mut warnings);
        assert!(warnings.is_empty());
        let img = reg.get(i).unwrap();
        assert_eq!((img.width, img.height), (1, 1));
        assert_eq!(img.filter, ImageFilter::Flate);
        assert_eq!(img.color_space, ImageColorSpace::DeviceRgb);
        assert!(img.soft_mask.is_some());
    }

    #[test]
    fn same_source_is_registered_once() {
        let mut reg = ImageRegistry::new();
        let mut warnings = Vec::new();
        let a = reg.register(PIXEL_PNG, &mut warnings);
        let b = reg.register(PIXEL_PNG, &mut warnings);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn jpeg_passes_through() {
        let bytes = encode(DynamicImage::ImageRgb8(RgbImage::new(4, 2)), ImageFormat::Jpeg);
        let img = decode(&bytes).unwrap();
        assert_eq!(img.filter, ImageFilter::Dct);
        assert_eq!(img.data, bytes);
        assert_eq!((img.width, img.height), (4, 2));
    }

    #[test]
    fn opaque_png_has_no_mask() {
        let bytes = encode(DynamicImage::ImageRgb8(RgbImage::new(2, 2)), ImageFormat::Png);
        let img = decode(&bytes).unwrap();
        assert!(img.soft_mask.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_placeholder() {
        let mut reg = ImageRegistry::new();
        let mut warnings = Vec::new();
        let a = reg.register("/nonexistent/a.png", &mut warnings);
        let b = reg.register("/nonexistent/b.png", &mut warnings);
        assert_eq!(a, b);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(warnings[0], Warning::ImageNotFound { .. }));
        assert_eq!(reg.get(a).unwrap().color_space, ImageColorSpace::DeviceGray);
    }

    #[test]
    fn garbage_bytes_are_a_decode_failure() {
        let mut reg = ImageRegistry::new();
        let mut warnings = Vec::new();
        reg.register("data:image/png;base64,AAAA", &mut warnings);
        assert!(matches!(warnings[0], Warning::ImageDecodeFailure { .. }));
    }

    #[test]
    fn size_follows_aspect_ratio() {
        let img = ImageData {
            width: 96,
            height: 48,
            color_space: ImageColorSpace::DeviceRgb,
            filter: ImageFilter::Flate,
            data: Vec::new(),
            soft_mask: None,
        };
        assert_eq!(img.natural_size(), (25.4, 12.7));
        assert_eq!(img.resolve_size(Some(50.0), None), (50.0, 25.0));
        assert_eq!(img.resolve_size(None, Some(10.0)), (20.0, 10.0));
        assert_eq!(img.resolve_size(Some(1.0), Some(2.0)), (1.0, 2.0));
    }
}

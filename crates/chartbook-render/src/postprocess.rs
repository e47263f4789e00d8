//! Snapshot post-processing: JPEG compression, previews and standalone vector markup.
//!
//! None of these operations fail an export. A raster that cannot be decoded is passed through
//! untouched, and a preview that cannot be produced is simply absent.

use crate::css::{Stylesheet, embeddable_css};
use crate::svg::fmt;
use base64::Engine as _;
use chartbook_core::ContentBounds;
use image::{ImageBuffer, Rgb, RgbaImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl RasterImage {
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

fn jpeg_quality(quality: f32) -> u8 {
    let q = if quality.is_finite() { quality } else { 0.85 };
    (q.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Composites RGBA pixels over white.
fn flatten_on_white(rgba: &RgbaImage) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_jpeg(rgb: &ImageBuffer<Rgb<u8>, Vec<u8>>, quality: u8) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    enc.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )
    .ok()?;
    Some(out)
}

/// Re-encodes `raster` as JPEG over an opaque white background, keeping its pixel size.
///
/// `quality` is in `[0, 1]`. On any decode or encode failure the input is returned unchanged.
pub fn compress(raster: &RasterImage, quality: f32) -> RasterImage {
    let decoded = match image::load_from_memory(&raster.bytes) {
        Ok(img) => img,
        Err(err) => {
            tracing::warn!(error = %err, "could not decode captured raster, keeping original");
            return raster.clone();
        }
    };
    let rgb = flatten_on_white(&decoded.to_rgba8());
    match encode_jpeg(&rgb, jpeg_quality(quality)) {
        Some(bytes) => RasterImage {
            bytes,
            format: ImageFormat::Jpeg,
            width: rgb.width(),
            height: rgb.height(),
        },
        None => {
            tracing::warn!("JPEG encoding failed, keeping original raster");
            raster.clone()
        }
    }
}

/// Produces an aspect-preserving preview at most `target_width` pixels wide.
pub fn preview(raster: &RasterImage, target_width: u32) -> Option<RasterImage> {
    let decoded = image::load_from_memory(&raster.bytes).ok()?;
    let (w, h) = (decoded.width(), decoded.height());
    if w == 0 || h == 0 || target_width == 0 {
        return None;
    }
    let pw = target_width.min(w);
    let ph = ((h as f64 * pw as f64 / w as f64).round() as u32).max(1);
    let resized = image::imageops::resize(
        &decoded.to_rgba8(),
        pw,
        ph,
        image::imageops::FilterType::Triangle,
    );
    let rgb = flatten_on_white(&resized);
    let bytes = encode_jpeg(&rgb, 70)?;
    Some(RasterImage {
        bytes,
        format: ImageFormat::Jpeg,
        width: pw,
        height: ph,
    })
}

/// Byte offset of the `>` closing the root `<svg ...>` tag.
fn root_open_end(markup: &str) -> Option<usize> {
    let start = markup.find("<svg")?;
    let open_end = start + markup[start..].find('>')?;
    // Self-closing root: nothing worth exporting.
    if markup[..open_end].ends_with('/') {
        return None;
    }
    Some(open_end)
}

/// Replaces the root viewport of `markup` with `bounds`, so the document shows only the content.
pub fn crop_to_bounds(markup: &str, bounds: &ContentBounds) -> Option<String> {
    if bounds.is_degenerate() {
        return None;
    }
    let open_end = root_open_end(markup)?;
    let mut out = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" class="chart-canvas" width="{w}" height="{h}" viewBox="{x} {y} {w} {h}">"#,
        x = fmt(bounds.x),
        y = fmt(bounds.y),
        w = fmt(bounds.width),
        h = fmt(bounds.height)
    );
    out.push_str(&markup[open_end + 1..]);
    Some(out)
}

/// Returns a standalone copy of `markup` with node styles inlined as a `<style>` element.
pub fn serialize_vector(markup: &str, stylesheet: &Stylesheet) -> Option<String> {
    let open_end = root_open_end(markup)?;

    let css = embeddable_css(stylesheet);
    let mut out = String::with_capacity(markup.len() + css.len() + 64);
    out.push_str(&markup[..=open_end]);
    out.push_str("<style><![CDATA[\n");
    out.push_str(&css.replace("]]>", "]]]]><![CDATA[>"));
    out.push_str("]]></style>");
    out.push_str(&markup[open_end + 1..]);
    Some(out)
}

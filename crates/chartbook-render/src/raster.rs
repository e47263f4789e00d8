use crate::error::RasterError;
use crate::postprocess::{ImageFormat, RasterImage};
use chartbook_core::ScaleInfo;

pub type Result<T> = std::result::Result<T, RasterError>;

/// Rasterizes SVG documents with `resvg`.
///
/// System fonts are loaded once per rasterizer, not per chart.
pub struct Rasterizer {
    options: usvg::Options<'static>,
    background: tiny_skia::Color,
}

impl Rasterizer {
    pub fn new(background: &str) -> Result<Self> {
        let Some(background) = parse_tiny_skia_color(background) else {
            return Err(RasterError::Background(background.to_string()));
        };
        let mut options = usvg::Options::default();
        // Arial first, any system font after it.
        options.fontdb_mut().load_system_fonts();
        options.font_family = "Arial".to_string();
        Ok(Self {
            options,
            background,
        })
    }

    /// Renders `svg` into a `target_width × target_height` PNG.
    ///
    /// The document's own viewport is scaled by `scale.scale` and placed at
    /// `(scale.offset_x, scale.offset_y)`; the rest of the target is filled with the background.
    pub fn capture(
        &self,
        svg: &str,
        scale: &ScaleInfo,
        target_width: u32,
        target_height: u32,
    ) -> Result<RasterImage> {
        let tree = usvg::Tree::from_str(svg, &self.options).map_err(|_| RasterError::SvgParse)?;

        let mut pixmap = tiny_skia::Pixmap::new(target_width.max(1), target_height.max(1))
            .ok_or(RasterError::PixmapAlloc)?;
        pixmap.fill(self.background);

        let s = scale.scale as f32;
        let transform = tiny_skia::Transform::from_row(
            s,
            0.0,
            0.0,
            s,
            scale.offset_x as f32,
            scale.offset_y as f32,
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        let bytes = pixmap.encode_png().map_err(|_| RasterError::PngEncode)?;
        Ok(RasterImage {
            bytes,
            format: ImageFormat::Png,
            width: pixmap.width(),
            height: pixmap.height(),
        })
    }
}

pub fn parse_tiny_skia_color(text: &str) -> Option<tiny_skia::Color> {
    let s = text.trim().to_ascii_lowercase();
    match s.as_str() {
        "transparent" => return Some(tiny_skia::Color::from_rgba8(0, 0, 0, 0)),
        "white" => return Some(tiny_skia::Color::from_rgba8(255, 255, 255, 255)),
        "black" => return Some(tiny_skia::Color::from_rgba8(0, 0, 0, 255)),
        _ => {}
    }
    let [r, g, b, a] = parse_hex_rgba(&s)?;
    Some(tiny_skia::Color::from_rgba8(r, g, b, a))
}

/// Parses `#rgb`, `#rgba`, `#rrggbb` and `#rrggbbaa`.
pub fn parse_hex_rgba(text: &str) -> Option<[u8; 4]> {
    let hex = text.trim().strip_prefix('#')?;
    fn hex2(b: &[u8]) -> Option<u8> {
        let hi = (*b.first()? as char).to_digit(16)? as u8;
        let lo = (*b.get(1)? as char).to_digit(16)? as u8;
        Some((hi << 4) | lo)
    }
    fn hex1(c: u8) -> Option<u8> {
        let v = (c as char).to_digit(16)? as u8;
        Some((v << 4) | v)
    }

    let bytes = hex.as_bytes();
    match bytes.len() {
        3 => Some([hex1(bytes[0])?, hex1(bytes[1])?, hex1(bytes[2])?, 255]),
        4 => Some([
            hex1(bytes[0])?,
            hex1(bytes[1])?,
            hex1(bytes[2])?,
            hex1(bytes[3])?,
        ]),
        6 => Some([
            hex2(&bytes[0..2])?,
            hex2(&bytes[2..4])?,
            hex2(&bytes[4..6])?,
            255,
        ]),
        8 => Some([
            hex2(&bytes[0..2])?,
            hex2(&bytes[2..4])?,
            hex2(&bytes[4..6])?,
            hex2(&bytes[6..8])?,
        ]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_produces_png_of_target_size() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10" viewBox="0 0 10 10"><rect width="10" height="10" fill="black"/></svg>"#;
        let r = Rasterizer::new("white").unwrap();
        let scale = ScaleInfo {
            scale: 2.0,
            offset_x: 5.0,
            offset_y: 0.0,
            final_width: 20.0,
            final_height: 20.0,
        };
        let img = r.capture(svg, &scale, 30, 20).unwrap();
        assert!(img.bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
        assert_eq!((img.width, img.height), (30, 20));
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_rgba("#fff"), Some([255, 255, 255, 255]));
        assert_eq!(parse_hex_rgba("#2f5d8a"), Some([0x2f, 0x5d, 0x8a, 255]));
        assert_eq!(parse_hex_rgba("2f5d8a"), None);
        assert!(Rasterizer::new("not-a-color").is_err());
    }
}

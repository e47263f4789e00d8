//! Branding assets: the page template and the cover-image mapping.

use chartbook_core::NO_COVER;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The standard PDF fonts every reader ships. Text is never embedded.
const BASE14_FONTS: &[&str] = &[
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
];

/// Page geometry in PDF points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub header_height: f32,
    pub footer_height: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        // A4 landscape.
        Self {
            width: 842.0,
            height: 595.0,
            margin: 36.0,
            header_height: 56.0,
            footer_height: 24.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FontRefs {
    pub regular: String,
    pub bold: String,
}

impl Default for FontRefs {
    fn default() -> Self {
        Self {
            regular: "Helvetica".to_string(),
            bold: "Helvetica-Bold".to_string(),
        }
    }
}

impl FontRefs {
    /// Font names with anything outside the standard 14 replaced by Helvetica.
    pub fn resolved(&self) -> (&str, &str) {
        fn pick<'a>(name: &'a str, fallback: &'static str) -> &'a str {
            if BASE14_FONTS.contains(&name) {
                name
            } else {
                tracing::warn!(font = name, fallback, "unsupported font, using fallback");
                fallback
            }
        }
        (
            pick(&self.regular, "Helvetica"),
            pick(&self.bold, "Helvetica-Bold"),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Palette {
    pub primary: String,
    pub text: String,
    pub muted: String,
    pub band: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            primary: "#2f5d8a".to_string(),
            text: "#1b2a3a".to_string(),
            muted: "#6b7785".to_string(),
            band: "#e8eef4".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FooterLayout {
    /// Right-aligned page label; `{page}` and `{total}` are substituted.
    pub page_label: String,
    /// Left-aligned running text. Empty to omit.
    pub left_text: String,
    pub font_size: f32,
}

impl Default for FooterLayout {
    fn default() -> Self {
        Self {
            page_label: "Page {page} of {total}".to_string(),
            left_text: "Organization charts".to_string(),
            font_size: 9.0,
        }
    }
}

impl FooterLayout {
    pub fn page_text(&self, page: usize, total: usize) -> String {
        self.page_label
            .replace("{page}", &page.to_string())
            .replace("{total}", &total.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateConfig {
    pub page: PageGeometry,
    pub fonts: FontRefs,
    pub palette: Palette,
    pub footer: FooterLayout,
    pub document_title: String,
    pub title_font_size: f32,
    pub subtitle_font_size: f32,
    /// Points per snapshot pixel before the page fit is applied.
    pub px_to_pt: f32,
    /// Extra inset between the content area and the chart image.
    pub image_inset: f32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            page: PageGeometry::default(),
            fonts: FontRefs::default(),
            palette: Palette::default(),
            footer: FooterLayout::default(),
            document_title: "Organization Charts".to_string(),
            title_font_size: 18.0,
            subtitle_font_size: 10.0,
            px_to_pt: 0.75,
            image_inset: 6.0,
        }
    }
}

/// Which cover image introduces each group of charts, and in which order groups appear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoverMapping {
    /// Cover id to image path.
    pub covers: BTreeMap<String, String>,
    pub cover_order: Vec<String>,
    /// Image used for any cover without its own entry.
    pub fallback: Option<String>,
    pub document_cover: Option<String>,
    /// Display titles for section covers. The cover id is used when absent.
    pub titles: BTreeMap<String, String>,
}

impl CoverMapping {
    /// Image path for a group's section cover.
    pub fn image_for(&self, cover_key: &str) -> Option<&str> {
        if cover_key == NO_COVER {
            return None;
        }
        self.covers
            .get(cover_key)
            .or(self.fallback.as_ref())
            .map(String::as_str)
    }

    pub fn document_image(&self) -> Option<&str> {
        self.document_cover
            .as_deref()
            .or(self.fallback.as_deref())
    }

    pub fn title_for<'a>(&'a self, cover_key: &'a str) -> &'a str {
        self.titles
            .get(cover_key)
            .map(String::as_str)
            .unwrap_or(cover_key)
    }

    /// Position of `cover_key` in the explicit group order.
    pub fn order_of(&self, cover_key: &str) -> Option<usize> {
        self.cover_order.iter().position(|k| k == cover_key)
    }

    /// Every image path the mapping can refer to.
    pub fn image_paths(&self) -> impl Iterator<Item = &str> {
        self.covers
            .values()
            .chain(self.fallback.iter())
            .chain(self.document_cover.iter())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_substitutes_numbers() {
        assert_eq!(FooterLayout::default().page_text(3, 9), "Page 3 of 9");
    }

    #[test]
    fn unknown_fonts_fall_back() {
        let fonts = FontRefs {
            regular: "Comic Sans".to_string(),
            bold: "Times-Bold".to_string(),
        };
        assert_eq!(fonts.resolved(), ("Helvetica", "Times-Bold"));
    }

    #[test]
    fn cover_lookup_uses_fallback() {
        let mapping: CoverMapping = serde_json::from_str(
            r#"{ "covers": { "eng": "covers/eng.jpg" }, "coverOrder": ["eng"], "fallback": "covers/default.jpg" }"#,
        )
        .unwrap();
        assert_eq!(mapping.image_for("eng"), Some("covers/eng.jpg"));
        assert_eq!(mapping.image_for("sales"), Some("covers/default.jpg"));
        assert_eq!(mapping.image_for(NO_COVER), None);
        assert_eq!(mapping.document_image(), Some("covers/default.jpg"));
        assert_eq!(mapping.order_of("eng"), Some(0));
        assert_eq!(mapping.title_for("sales"), "sales");
    }

    #[test]
    fn template_parses_partial_json() {
        let t: TemplateConfig =
            serde_json::from_str(r#"{ "page": { "width": 612, "height": 792 } }"#).unwrap();
        assert_eq!(t.page.width, 612.0);
        assert_eq!(t.page.margin, 36.0);
        assert_eq!(t.fonts, FontRefs::default());
    }
}

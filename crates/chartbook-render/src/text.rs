use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use unicode_width::UnicodeWidthChar;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_size: f64,
    pub bold: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 13.0,
            bold: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
}

pub trait TextMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> TextMetrics;
}

/// Font-independent measurer: every column is `font_size * char_width_factor` wide.
///
/// Exports run headless with whatever fonts the host has, so labels are sized against this
/// estimate rather than real glyph metrics.
#[derive(Debug, Clone, Default)]
pub struct DeterministicTextMeasurer {
    pub char_width_factor: f64,
    pub line_height_factor: f64,
}

impl DeterministicTextMeasurer {
    fn char_width(&self, style: &TextStyle) -> f64 {
        let factor = if self.char_width_factor == 0.0 {
            0.6
        } else {
            self.char_width_factor
        };
        let bold = if style.bold { 1.08 } else { 1.0 };
        style.font_size.max(1.0) * factor * bold
    }

    /// Cuts `text` so that it fits into `max_width`, appending an ellipsis when shortened.
    pub fn ellipsize<'a>(&self, text: &'a str, max_width: f64, style: &TextStyle) -> Cow<'a, str> {
        if self.measure(text, style).width <= max_width {
            return Cow::Borrowed(text);
        }
        let cw = self.char_width(style);
        let budget = ((max_width / cw).floor() as usize).saturating_sub(1);
        let mut used = 0usize;
        let mut out = String::new();
        for ch in text.chars() {
            let w = ch.width().unwrap_or(0);
            if used + w > budget {
                break;
            }
            used += w;
            out.push(ch);
        }
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        out.push('…');
        Cow::Owned(out)
    }
}

impl TextMeasurer for DeterministicTextMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> TextMetrics {
        let line_height_factor = if self.line_height_factor == 0.0 {
            1.2
        } else {
            self.line_height_factor
        };

        let mut max_cols = 0usize;
        let mut lines = 0usize;
        for line in text.split('\n') {
            lines += 1;
            let cols: usize = line.chars().map(|c| c.width().unwrap_or(0)).sum();
            max_cols = max_cols.max(cols);
        }

        TextMetrics {
            width: max_cols as f64 * self.char_width(style),
            height: lines.max(1) as f64 * style.font_size.max(1.0) * line_height_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_borrowed() {
        let m = DeterministicTextMeasurer::default();
        let out = m.ellipsize("Ada", 200.0, &TextStyle::default());
        assert!(matches!(out, Cow::Borrowed("Ada")));
    }

    #[test]
    fn long_text_is_cut_to_width() {
        let m = DeterministicTextMeasurer::default();
        let style = TextStyle::default();
        let long = "Vice President of Platform Engineering and Developer Experience";
        let out = m.ellipsize(long, 120.0, &style);
        assert!(out.ends_with('…'));
        assert!(m.measure(&out, &style).width <= 120.0);
    }

    #[test]
    fn wide_glyphs_count_double() {
        let m = DeterministicTextMeasurer::default();
        let style = TextStyle::default();
        let narrow = m.measure("ab", &style).width;
        let wide = m.measure("日本", &style).width;
        assert!((wide - narrow * 2.0).abs() < 1e-9);
    }
}

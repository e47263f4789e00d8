//! Tight content bounds of a rendered surface.
//!
//! Measurement never fails: when nodes cannot be located the surface size is used, and when the
//! markup cannot be read at all the fixed fallback box is returned.

use chartbook_core::ContentBounds;
use std::str::FromStr;

pub const DEFAULT_BOUNDS_PADDING: f64 = 50.0;

#[derive(Debug, Clone, Copy)]
struct Rect {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Rect {
    fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn is_empty(&self) -> bool {
        !(self.min_x.is_finite() && self.max_x >= self.min_x && self.max_y >= self.min_y)
    }
}

fn has_class(node: roxmltree::Node<'_, '_>, class: &str) -> bool {
    node.attribute("class")
        .is_some_and(|c| c.split_whitespace().any(|t| t == class))
}

fn attr_f64(node: roxmltree::Node<'_, '_>, name: &str) -> Option<f64> {
    let raw = node.attribute(name)?.trim();
    let raw = raw.strip_suffix("px").unwrap_or(raw);
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Maps a point from `node`'s local space into document space by applying every transform
/// from `node` up to the root.
fn to_document(node: roxmltree::Node<'_, '_>, x: f64, y: f64) -> (f64, f64) {
    let (mut x, mut y) = (x, y);
    for n in node.ancestors().filter(|n| n.is_element()) {
        let Some(raw) = n.attribute("transform") else {
            continue;
        };
        match svgtypes::Transform::from_str(raw) {
            Ok(t) => {
                (x, y) = (t.a * x + t.c * y + t.e, t.b * x + t.d * y + t.f);
            }
            Err(_) => {
                tracing::warn!(transform = raw, "ignoring unparsable transform");
            }
        }
    }
    (x, y)
}

fn surface_size(root: roxmltree::Node<'_, '_>) -> Option<(f64, f64)> {
    if let (Some(w), Some(h)) = (attr_f64(root, "width"), attr_f64(root, "height")) {
        if w > 0.0 && h > 0.0 {
            return Some((w, h));
        }
    }
    let vb = svgtypes::ViewBox::from_str(root.attribute("viewBox")?).ok()?;
    (vb.w > 0.0 && vb.h > 0.0).then_some((vb.w, vb.h))
}

/// Reads `width`/`height` off the root tag without a full XML parse.
fn surface_size_from_text(markup: &str) -> Option<(f64, f64)> {
    let start = markup.find("<svg")?;
    let tag = &markup[start..start + markup[start..].find('>')?];
    let attr = |name: &str| -> Option<f64> {
        let needle = format!(" {name}=\"");
        let from = tag.find(&needle)? + needle.len();
        let raw = &tag[from..from + tag[from..].find('"')?];
        let v = raw.trim_end_matches("px").parse::<f64>().ok()?;
        (v.is_finite() && v > 0.0).then_some(v)
    };
    Some((attr("width")?, attr("height")?))
}

/// Computes the padded bounding box of every `.node` element in `markup`.
pub fn measure_content_bounds(markup: &str, padding: f64) -> ContentBounds {
    let doc = match roxmltree::Document::parse(markup) {
        Ok(doc) => doc,
        Err(err) => {
            return match surface_size_from_text(markup) {
                Some((w, h)) => {
                    tracing::warn!(error = %err, "surface markup unreadable, using surface size");
                    ContentBounds::full_surface(w, h)
                }
                None => {
                    tracing::warn!(error = %err, "surface markup unreadable, using fallback bounds");
                    ContentBounds::fallback()
                }
            };
        }
    };

    let root = doc.root_element();
    let mut rect = Rect::empty();
    let mut nodes = 0usize;
    for node in doc
        .descendants()
        .filter(|n| n.is_element() && has_class(*n, "node"))
    {
        let Some(container) = node
            .descendants()
            .find(|n| n.tag_name().name() == "rect" && has_class(*n, "node-container"))
        else {
            continue;
        };
        let (Some(w), Some(h)) = (attr_f64(container, "width"), attr_f64(container, "height"))
        else {
            continue;
        };
        let x = attr_f64(container, "x").unwrap_or(0.0);
        let y = attr_f64(container, "y").unwrap_or(0.0);
        for (px, py) in [(x, y), (x + w, y), (x, y + h), (x + w, y + h)] {
            let (dx, dy) = to_document(container, px, py);
            rect.include(dx, dy);
        }
        nodes += 1;
    }

    if nodes == 0 || rect.is_empty() {
        return match surface_size(root) {
            Some((w, h)) => {
                tracing::warn!("no rendered nodes found, using full surface bounds");
                ContentBounds::full_surface(w, h)
            }
            None => {
                tracing::warn!("no rendered nodes and no surface size, using fallback bounds");
                ContentBounds::fallback()
            }
        };
    }

    let padding = if padding.is_finite() { padding.max(0.0) } else { 0.0 };
    let width = rect.max_x - rect.min_x;
    let height = rect.max_y - rect.min_y;
    // Without a declared size, the surface is at least as large as what was drawn on it.
    let (original_width, original_height) = surface_size(root)
        .unwrap_or((rect.max_x.max(0.0) + padding, rect.max_y.max(0.0) + padding));
    ContentBounds {
        x: rect.min_x - padding,
        y: rect.min_y - padding,
        width: width + 2.0 * padding,
        height: height + 2.0 * padding,
        original_width,
        original_height,
        margin: padding,
    }
}

use crate::layout::{NodeBox, TreeLayout};
use crate::text::{DeterministicTextMeasurer, TextMeasurer, TextStyle};
use chartbook_core::{ChartDocument, ChartNode, LayoutDirection};
use std::fmt::Write as _;

const TEXT_INSET: f64 = 12.0;
const LINK_STROKE: &str = "#9aa5b1";

/// Stylesheet the built-in engine injects into its surfaces. It mirrors the editor's sheet,
/// so it also carries interactive rules that have no meaning in an export.
pub const CHART_STYLESHEET: &str = include_str!("../assets/chart.css");

pub(crate) fn fmt(v: f64) -> String {
    // Short, stable number output for SVG attributes: no `-0`, no float noise.
    if !v.is_finite() {
        return "0".to_string();
    }

    let mut v = if v.abs() < 1e-9 { 0.0 } else { v };
    let nearest = v.round();
    if (v - nearest).abs() < 1e-6 {
        v = nearest;
    }
    let s = format!("{}", (v * 1000.0).round() / 1000.0);
    if s == "-0" { "0".to_string() } else { s }
}

pub(crate) fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Root element of a live surface. The body is inserted between this and `</svg>`.
pub fn svg_open_tag(width: f64, height: f64) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" class="chart-canvas" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = fmt(width),
        h = fmt(height)
    )
}

/// Renders links and nodes of `layout`, shifted by `(dx, dy)`.
pub fn render_chart_body(
    chart: &ChartDocument,
    layout: &TreeLayout,
    dx: f64,
    dy: f64,
    measurer: &DeterministicTextMeasurer,
) -> String {
    let mut out = String::new();

    out.push_str(r#"<g class="chart-links">"#);
    for link in &layout.links {
        let (Some(p), Some(c)) = (layout.nodes.get(link.parent), layout.nodes.get(link.child))
        else {
            continue;
        };
        let _ = write!(
            &mut out,
            r#"<path class="chart-link" fill="none" stroke="{LINK_STROKE}" stroke-width="1.5" d="{}"/>"#,
            elbow_path(layout.direction, p, c, dx, dy)
        );
    }
    out.push_str("</g>\n");

    out.push_str(r#"<g class="chart-nodes">"#);
    for b in &layout.nodes {
        if let Some(node) = chart.nodes.get(b.node) {
            render_node(&mut out, node, b, dx, dy, measurer);
        }
    }
    out.push_str("</g>\n");
    out
}

fn elbow_path(dir: LayoutDirection, p: &NodeBox, c: &NodeBox, dx: f64, dy: f64) -> String {
    let (pcx, pcy) = (p.x + p.width / 2.0 + dx, p.y + p.height / 2.0 + dy);
    let (ccx, ccy) = (c.x + c.width / 2.0 + dx, c.y + c.height / 2.0 + dy);
    match dir {
        LayoutDirection::Top | LayoutDirection::Bottom => {
            let (y1, y2) = if dir == LayoutDirection::Top {
                (p.y + p.height + dy, c.y + dy)
            } else {
                (p.y + dy, c.y + c.height + dy)
            };
            let mid = (y1 + y2) / 2.0;
            format!(
                "M{},{} V{} H{} V{}",
                fmt(pcx),
                fmt(y1),
                fmt(mid),
                fmt(ccx),
                fmt(y2)
            )
        }
        LayoutDirection::Left | LayoutDirection::Right => {
            let (x1, x2) = if dir == LayoutDirection::Left {
                (p.x + p.width + dx, c.x + dx)
            } else {
                (p.x + dx, c.x + c.width + dx)
            };
            let mid = (x1 + x2) / 2.0;
            format!(
                "M{},{} H{} V{} H{}",
                fmt(x1),
                fmt(pcy),
                fmt(mid),
                fmt(ccy),
                fmt(x2)
            )
        }
    }
}

fn render_node(
    out: &mut String,
    node: &ChartNode,
    b: &NodeBox,
    dx: f64,
    dy: f64,
    measurer: &DeterministicTextMeasurer,
) {
    let single = node.is_single_person();
    let class = if single { "node single-person" } else { "node" };
    let _ = write!(
        out,
        r#"<g class="{class}" data-node-id="{}" transform="translate({},{})">"#,
        escape_xml(&node.id),
        fmt(b.x + dx),
        fmt(b.y + dy)
    );
    let _ = write!(
        out,
        r#"<rect class="node-container" x="0" y="0" width="{}" height="{}" rx="8" ry="8"/>"#,
        fmt(b.width),
        fmt(b.height)
    );

    let max_text = (b.width - 2.0 * TEXT_INSET).max(1.0);
    let header_style = TextStyle {
        font_size: 15.0,
        bold: true,
    };
    let row_style = TextStyle::default();
    let cx = b.width / 2.0;

    if single {
        let person = &node.members[0].people[0];
        let _ = write!(
            out,
            r#"<text class="person-row single-person-name" x="{}" y="34">{}</text>"#,
            fmt(cx),
            escape_xml(&measurer.ellipsize(&person.name, max_text, &header_style))
        );
        if let Some(title) = person.title.as_deref() {
            let _ = write!(
                out,
                r#"<text class="person-row single-person-title" x="{}" y="56">{}</text>"#,
                fmt(cx),
                escape_xml(&measurer.ellipsize(title, max_text, &row_style))
            );
        }
        out.push_str("</g>");
        return;
    }

    let _ = write!(
        out,
        r#"<text class="node-header" x="{}" y="26">{}</text>"#,
        fmt(cx),
        escape_xml(&measurer.ellipsize(node.display_label(), max_text, &header_style))
    );

    let mut y = 40.0 + 6.0;
    for group in &node.members {
        out.push_str(r#"<g class="role-group">"#);
        if !group.role.trim().is_empty() {
            y += 16.0;
            let _ = write!(
                out,
                r#"<text class="role-title" x="{}" y="{}">{}</text>"#,
                fmt(TEXT_INSET),
                fmt(y),
                escape_xml(&measurer.ellipsize(&group.role, max_text, &row_style))
            );
            y += 6.0;
        }
        for person in &group.people {
            y += 20.0;
            let line = match person.title.as_deref() {
                Some(t) if !t.trim().is_empty() => format!("{} · {}", person.name, t),
                _ => person.name.clone(),
            };
            let _ = write!(
                out,
                r#"<text class="person-row" x="{}" y="{}">{}</text>"#,
                fmt(TEXT_INSET),
                fmt(y),
                escape_xml(&measurer.ellipsize(&line, max_text, &row_style))
            );
        }
        out.push_str("</g>");
    }
    out.push_str("</g>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ExpandPolicy, layout_chart};
    use chartbook_core::{LayoutParams, Person, RoleGroup};

    #[test]
    fn fmt_trims_noise() {
        assert_eq!(fmt(-0.0), "0");
        assert_eq!(fmt(12.0000000001), "12");
        assert_eq!(fmt(1.23456), "1.235");
        assert_eq!(fmt(f64::NAN), "0");
    }

    #[test]
    fn node_markup_escapes_and_classes() {
        let mut chart = ChartDocument::new("c", "C");
        let mut root = ChartNode::new("r<1>", None);
        root.meta.label = Some("R&D".to_string());
        root.members.push(RoleGroup {
            role: "Leads".to_string(),
            people: vec![Person {
                name: "Ada".to_string(),
                title: Some("CTO".to_string()),
            }],
        });
        let mut solo = ChartNode::new("solo", Some("r<1>"));
        solo.members.push(RoleGroup {
            role: String::new(),
            people: vec![Person {
                name: "Grace".to_string(),
                title: None,
            }],
        });
        chart.nodes = vec![root, solo];

        let layout = layout_chart(&chart, &LayoutParams::default(), ExpandPolicy::ExpandAll);
        let body = render_chart_body(
            &chart,
            &layout,
            10.0,
            20.0,
            &DeterministicTextMeasurer::default(),
        );
        assert!(body.contains(r#"data-node-id="r&lt;1&gt;""#));
        assert!(body.contains(">R&amp;D</text>"));
        assert!(body.contains(r#"class="node single-person""#));
        assert!(body.contains("Ada · CTO"));
        assert!(body.contains(r#"transform="translate(10,20)""#));
        assert_eq!(body.matches("chart-link").count(), 2);
    }
}
